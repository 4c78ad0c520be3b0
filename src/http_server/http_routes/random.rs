use std::fmt::Write;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::Html,
};
use serde::Deserialize;

use crate::database::RandomAlbum;
use crate::http_server::error::{ApiError, Report};
use crate::http_server::state::AppState;
use crate::services::random_pick::PickSource;

pub const INDEX_ALBUMS: u32 = 10;
pub const MAX_COUNT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    count: Option<u32>,
}

/// `GET /`: a table of random albums.
pub async fn index(State(app_state): State<Arc<AppState>>) -> Result<Html<String>, Report> {
    let albums = app_state
        .picks
        .random_albums(PickSource::Auto, INDEX_ALBUMS)
        .await?;

    Ok(Html(render_table(&albums)))
}

/// `GET /api/random?count=N`
pub async fn api_random(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<RandomQuery>,
) -> Result<Json<Vec<RandomAlbum>>, Report> {
    let count = query.count.unwrap_or(1);
    if count == 0 || count > MAX_COUNT {
        return Err(ApiError::BadRequest(format!(
            "count must be between 1 and {}",
            MAX_COUNT
        ))
        .into());
    }

    let albums = app_state
        .picks
        .random_albums(PickSource::Auto, count)
        .await?;
    Ok(Json(albums))
}

fn render_table(albums: &[RandomAlbum]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>disq</title></head>\n<body>\n\
         <table>\n<tr><th>Artist</th><th>Album</th></tr>\n",
    );
    for album in albums {
        // Writing to a String cannot fail
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(&album.artist_name),
            escape_html(&album.title)
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("Simon & Garfunkel <live> \"'66'\""),
            "Simon &amp; Garfunkel &lt;live&gt; &quot;&#39;66&#39;&quot;"
        );
    }

    #[test]
    fn test_render_table_rows() {
        let html = render_table(&[RandomAlbum {
            title: "Bridge Over Troubled Water".to_string(),
            artist_name: "Simon & Garfunkel".to_string(),
        }]);

        assert!(html.contains(
            "<tr><td>Simon &amp; Garfunkel</td><td>Bridge Over Troubled Water</td></tr>"
        ));
        assert!(html.ends_with("</html>\n"));
    }
}
