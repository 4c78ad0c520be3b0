use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::database::RandomAlbum;
use crate::discogs_rs::collection::Release;

/// Denormalized album row for the analytics store.
///
/// One row per release, credited to the release's first artist. The store
/// deduplicates on `(artist_name, rating, album_id)`, keeping the last write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnarAlbum {
    pub album_id: u32,
    pub artist_id: u32,
    pub artist_name: String,
    pub title: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date_added: DateTime<Utc>,
    pub year: u32,
    pub rating: u8,
}

impl ColumnarAlbum {
    /// Returns `None` for releases without artists, which cannot be keyed.
    pub fn from_release(release: &Release) -> Result<Option<Self>> {
        let Some(artist) = release.main_artist() else {
            return Ok(None);
        };

        Ok(Some(Self {
            album_id: u32::try_from(release.id())
                .wrap_err_with(|| format!("Release id {} out of range", release.id()))?,
            artist_id: u32::try_from(artist.id)
                .wrap_err_with(|| format!("Artist id {} out of range", artist.id))?,
            artist_name: artist.name.trim().to_string(),
            title: release.title().to_string(),
            date_added: release.date_added_utc()?,
            year: release.year().unwrap_or(0) as u32,
            rating: release.clamped_rating(),
        }))
    }

    pub fn key(&self) -> (&str, u8, u32) {
        (&self.artist_name, self.rating, self.album_id)
    }
}

/// Port trait for the columnar (analytics) copy of the collection.
///
/// Implementations live in `services::clickhouse` (production) or test doubles.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ColumnarSink: Send + Sync {
    /// Create the albums table if it does not exist.
    async fn ensure_schema(&self) -> Result<()>;

    /// Append one batch. Rows sharing a key replace each other.
    async fn insert_batch(&self, rows: &[ColumnarAlbum]) -> Result<()>;

    /// Up to `limit` random albums rated 3 or more.
    async fn random_albums(&self, limit: u32) -> Result<Vec<RandomAlbum>>;

    async fn random_album_from_artist(&self, artist: &str) -> Result<Option<String>>;
}
