use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/* ---------- Envelope ---------- */

/// One page of `GET /users/{user}/collection/folders/0/releases`.
///
/// Notes
/// - Folder 0 is the "All" folder, so every release in the collection shows up.
/// - When Discogs rate limits an unauthenticated client it answers with a
///   well-formed envelope whose `pagination.pages` is 0. Callers must treat
///   that as an error; see `services::collection_sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionPage {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub items: u32,
}

/* ---------- Releases ---------- */

/// A release instance in a user's collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// RFC3339, e.g. `2022-10-23T15:45:21-07:00`
    pub date_added: String,
    #[serde(default)]
    pub instance_id: i64,
    /// 0 means unrated
    #[serde(default)]
    pub rating: u8,
    pub basic_information: BasicInformation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicInformation {
    pub id: i64,
    /// 0 when the release has no master
    #[serde(default)]
    pub master_id: i64,
    pub title: String,
    /// 0 when unknown
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub labels: Vec<LabelRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRef {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub catno: Option<String>,
}

impl Release {
    pub fn id(&self) -> i64 {
        self.basic_information.id
    }

    pub fn title(&self) -> &str {
        self.basic_information.title.trim()
    }

    /// Ratings are 0 to 5; anything above is stored as 5.
    pub fn clamped_rating(&self) -> u8 {
        self.rating.min(5)
    }

    pub fn year(&self) -> Option<i32> {
        (self.basic_information.year > 0).then_some(self.basic_information.year)
    }

    pub fn master_id(&self) -> Option<i64> {
        (self.basic_information.master_id > 0).then_some(self.basic_information.master_id)
    }

    pub fn date_added_utc(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.date_added)
            .map(|date| date.with_timezone(&Utc))
            .wrap_err_with(|| {
                format!(
                    "Invalid date_added '{}' on release {}",
                    self.date_added,
                    self.id()
                )
            })
    }

    /// The first credited artist, if any.
    pub fn main_artist(&self) -> Option<&ArtistRef> {
        self.basic_information.artists.first()
    }
}

/* ---------- Errors ---------- */

#[derive(Debug, thiserror::Error)]
pub enum DiscogsError {
    #[error("Discogs returned {status} for {url}: {body}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },
}

/* ---------- Requests ---------- */

/// Build the collection URL for `user`. The user name is a single path segment.
pub fn collection_url(base_url: &Url, user: &str) -> Result<Url> {
    let path = format!(
        "users/{}/collection/folders/0/releases",
        urlencoding::encode(user)
    );
    base_url
        .join(&path)
        .wrap_err_with(|| format!("Failed to build collection URL for user '{}'", user))
}

/// Fetch one page of a user's collection.
///
/// Endpoint
/// - `GET /users/{user}/collection/folders/0/releases?page={page}&per_page={per_page}`
///
/// No authentication is required for public collections. When `token` is set
/// it is sent as a Discogs personal access token, which also raises the rate limit.
pub async fn get_collection_page(
    client: &Client,
    base_url: &Url,
    token: Option<&str>,
    user: &str,
    page: u32,
    per_page: u32,
) -> Result<CollectionPage> {
    let url = collection_url(base_url, user)?;

    let mut request = client
        .get(url.clone())
        .query(&[("page", page), ("per_page", per_page)]);
    if let Some(token) = token {
        request = request.header(
            reqwest::header::AUTHORIZATION,
            format!("Discogs token={}", token),
        );
    }

    let response = request
        .send()
        .await
        .wrap_err_with(|| format!("Failed to request collection page {} from {}", page, url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(DiscogsError::Status {
            status,
            url: url.to_string(),
            body,
        }
        .into());
    }

    let page_body: CollectionPage = response
        .json()
        .await
        .wrap_err_with(|| format!("Failed to decode collection page {} from {}", page, url))?;

    log::debug!(
        "Collection page {}/{} for '{}': {} releases",
        page,
        page_body.pagination.pages,
        user,
        page_body.releases.len()
    );

    Ok(page_body)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn release(id: i64, title: &str, rating: u8, artists: &[(i64, &str)]) -> Release {
        Release {
            date_added: "2022-10-23T15:45:21-07:00".to_string(),
            instance_id: id * 10,
            rating,
            basic_information: BasicInformation {
                id,
                master_id: 0,
                title: title.to_string(),
                year: 1990,
                genres: vec!["Rock".to_string()],
                styles: vec!["Thrash".to_string()],
                artists: artists
                    .iter()
                    .map(|(id, name)| ArtistRef {
                        id: *id,
                        name: name.to_string(),
                    })
                    .collect(),
                labels: vec![LabelRef {
                    id: 1,
                    name: "Elektra".to_string(),
                    catno: Some("60439-1".to_string()),
                }],
            },
        }
    }

    pub fn page(page: u32, pages: u32, releases: Vec<Release>) -> CollectionPage {
        CollectionPage {
            pagination: Pagination {
                page,
                pages,
                per_page: 250,
                items: releases.len() as u32,
            },
            releases,
        }
    }
}
