use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ClickHouseConfig;
use crate::database::RandomAlbum;
use crate::ports::columnar::{ColumnarAlbum, ColumnarSink};

// One denormalized row per album. ReplacingMergeTree collapses rows with the
// same key on merge; reads use FINAL to see the collapsed state.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS albums (
    album_id UInt32 NOT NULL,
    artist_id UInt32 NOT NULL,
    artist_name String NOT NULL,
    title String NOT NULL,
    date_added DateTime('UTC') NOT NULL,
    year UInt32,
    rating UInt8
)
ENGINE = ReplacingMergeTree
PRIMARY KEY (artist_name, rating, album_id)
"#;

const INSERT_ALBUMS: &str = "INSERT INTO albums FORMAT JSONEachRow";

#[derive(Debug, thiserror::Error)]
pub enum ClickHouseError {
    #[error("ClickHouse returned {status}: {message}")]
    Server { status: StatusCode, message: String },
    #[error("ClickHouse ping answered '{0}'")]
    UnexpectedPing(String),
}

/// Columnar sink over the ClickHouse HTTP interface.
pub struct ClickHouseSink {
    client: Client,
    url: Url,
    database: String,
    username: String,
    password: Option<String>,
}

impl ClickHouseSink {
    /// Build the sink and check the server answers.
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .wrap_err_with(|| format!("Invalid ClickHouse URL: {}", config.url))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build ClickHouse HTTP client")?;

        let sink = Self {
            client,
            url,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        };
        sink.ping().await?;

        log::info!("Connected to ClickHouse at {}", sink.url);
        Ok(sink)
    }

    async fn ping(&self) -> Result<()> {
        let ping_url = self.url.join("ping").wrap_err("Invalid ClickHouse ping URL")?;
        let body = self
            .client
            .get(ping_url)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to reach ClickHouse at {}", self.url))?
            .text()
            .await
            .wrap_err("Failed to read ClickHouse ping response")?;

        if body.trim() != "Ok." {
            return Err(ClickHouseError::UnexpectedPing(body.trim().to_string()).into());
        }
        Ok(())
    }

    /// Run `query`, sending `body` as the request payload (the data for INSERTs).
    async fn execute(
        &self,
        query: &str,
        params: &[(&str, &str)],
        body: String,
    ) -> Result<String> {
        let mut request = self
            .client
            .post(self.url.clone())
            .query(&[("query", query), ("database", self.database.as_str())])
            .basic_auth(&self.username, self.password.as_ref());
        for (name, value) in params {
            request = request.query(&[(format!("param_{}", name), *value)]);
        }

        let response = request
            .body(body)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to send ClickHouse query: {}", query.trim()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .wrap_err("Failed to read ClickHouse response")?;
        if !status.is_success() {
            return Err(ClickHouseError::Server {
                status,
                message: text.trim().to_string(),
            }
            .into());
        }
        Ok(text)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        query: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let body = self.execute(query, params, String::new()).await?;
        parse_json_each_row(&body)
    }
}

fn parse_json_each_row<T: DeserializeOwned>(body: &str) -> Result<Vec<T>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .wrap_err_with(|| format!("Failed to decode ClickHouse row: {}", line))
        })
        .collect()
}

#[async_trait::async_trait]
impl ColumnarSink for ClickHouseSink {
    async fn ensure_schema(&self) -> Result<()> {
        self.execute(SCHEMA, &[], String::new())
            .await
            .wrap_err("Failed to create ClickHouse albums table")?;
        Ok(())
    }

    async fn insert_batch(&self, rows: &[ColumnarAlbum]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for row in rows {
            let line = serde_json::to_string(row).wrap_err("Failed to encode ClickHouse row")?;
            body.push_str(&line);
            body.push('\n');
        }

        self.execute(INSERT_ALBUMS, &[], body)
            .await
            .wrap_err_with(|| format!("Failed to insert {} rows into ClickHouse", rows.len()))?;
        log::debug!("Sent {} rows to ClickHouse", rows.len());
        Ok(())
    }

    async fn random_albums(&self, limit: u32) -> Result<Vec<RandomAlbum>> {
        let query = format!(
            "SELECT title, artist_name FROM albums FINAL WHERE rating >= 3 \
             ORDER BY rand() LIMIT {} FORMAT JSONEachRow",
            limit
        );
        self.select(&query, &[]).await
    }

    async fn random_album_from_artist(&self, artist: &str) -> Result<Option<String>> {
        let rows: Vec<RandomAlbum> = self
            .select(
                "SELECT title, artist_name FROM albums FINAL WHERE artist_name = {artist:String} \
                 ORDER BY rand() LIMIT 1 FORMAT JSONEachRow",
                &[("artist", artist)],
            )
            .await?;
        Ok(rows.into_iter().next().map(|row| row.title))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{
        Router,
        extract::{Query, State},
        http::HeaderMap,
        routing::get,
    };
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::test_utils::spawn_test_server;

    #[derive(Default)]
    struct Recorded {
        queries: Vec<HashMap<String, String>>,
        bodies: Vec<String>,
        authorization: Option<String>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn fake_query(
        State(recorded): State<Shared>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: String,
    ) -> (axum::http::StatusCode, String) {
        let sql = query.get("query").cloned().unwrap_or_default();
        let mut recorded = recorded.lock().unwrap();
        recorded.queries.push(query);
        recorded.bodies.push(body);
        recorded.authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if sql.contains("broken") {
            return (
                axum::http::StatusCode::BAD_REQUEST,
                "Code: 62. DB::Exception: Syntax error".to_string(),
            );
        }
        if sql.starts_with("SELECT") {
            return (
                axum::http::StatusCode::OK,
                "{\"title\":\"Master Of Puppets\",\"artist_name\":\"Metallica\"}\n\
                 {\"title\":\"Reign In Blood\",\"artist_name\":\"Slayer\"}\n"
                    .to_string(),
            );
        }
        (axum::http::StatusCode::OK, String::new())
    }

    async fn sink_with_server() -> (ClickHouseSink, Shared) {
        let recorded = Shared::default();
        let router = Router::new()
            .route("/", get(fake_query).post(fake_query))
            .route("/ping", get(|| async { "Ok.\n" }))
            .with_state(recorded.clone());
        let url = spawn_test_server(router).await;

        let sink = ClickHouseSink::connect(&ClickHouseConfig {
            url: url.to_string(),
            password: Some("secret".to_string()),
            ..ClickHouseConfig::default()
        })
        .await
        .unwrap();
        (sink, recorded)
    }

    fn row(album_id: u32) -> ColumnarAlbum {
        ColumnarAlbum {
            album_id,
            artist_id: 18839,
            artist_name: "Metallica".to_string(),
            title: "Load".to_string(),
            date_added: Utc.with_ymd_and_hms(2022, 10, 23, 22, 45, 21).unwrap(),
            year: 1996,
            rating: 2,
        }
    }

    #[tokio::test]
    async fn test_insert_batch_sends_json_each_row() {
        let (sink, recorded) = sink_with_server().await;

        sink.insert_batch(&[row(1), row(2)]).await.unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.queries[0]["query"], INSERT_ALBUMS);
        assert_eq!(recorded.queries[0]["database"], "default");

        let lines: Vec<&str> = recorded.bodies[0].lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["album_id"], 1);
        // Unix seconds, independent of the server timezone
        assert_eq!(first["date_added"], 1_666_565_121);
        assert!(recorded.authorization.as_deref().unwrap().starts_with("Basic "));
    }

    #[test]
    fn test_schema_pins_utc() {
        assert!(SCHEMA.contains("date_added DateTime('UTC') NOT NULL"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_sent() {
        let (sink, recorded) = sink_with_server().await;

        sink.insert_batch(&[]).await.unwrap();

        assert!(recorded.lock().unwrap().queries.is_empty());
    }

    #[tokio::test]
    async fn test_random_albums_parses_rows() {
        let (sink, recorded) = sink_with_server().await;

        let albums = sink.random_albums(2).await.unwrap();

        assert_eq!(albums.len(), 2);
        assert_eq!(albums[1].artist_name, "Slayer");
        let recorded = recorded.lock().unwrap();
        assert!(recorded.queries[0]["query"].contains("FINAL"));
        assert!(recorded.queries[0]["query"].contains("LIMIT 2"));
    }

    #[tokio::test]
    async fn test_random_album_from_artist_binds_parameter() {
        let (sink, recorded) = sink_with_server().await;

        let title = sink
            .random_album_from_artist("Metallica'; DROP TABLE albums")
            .await
            .unwrap();

        assert_eq!(title.as_deref(), Some("Master Of Puppets"));
        let recorded = recorded.lock().unwrap();
        assert_eq!(
            recorded.queries[0]["param_artist"],
            "Metallica'; DROP TABLE albums"
        );
        assert!(!recorded.queries[0]["query"].contains("DROP"));
    }

    #[tokio::test]
    async fn test_server_error_is_typed() {
        let (sink, _recorded) = sink_with_server().await;

        let err = sink
            .execute("broken query", &[], String::new())
            .await
            .unwrap_err();

        match err.downcast_ref::<ClickHouseError>() {
            Some(ClickHouseError::Server { message, .. }) => {
                assert!(message.contains("Syntax error"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_fails_on_bad_ping() {
        let router = Router::new().route("/ping", get(|| async { "nope" }));
        let url = spawn_test_server(router).await;

        let result = ClickHouseSink::connect(&ClickHouseConfig {
            url: url.to_string(),
            ..ClickHouseConfig::default()
        })
        .await;

        assert!(result.is_err());
    }
}
