use std::sync::Arc;

use color_eyre::eyre::{Result, eyre};

use crate::database::{Database, RandomAlbum};
use crate::ports::columnar::ColumnarSink;

/// Where random picks are read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PickSource {
    /// The columnar store when configured, otherwise SQLite
    #[default]
    Auto,
    Sqlite,
    Clickhouse,
}

/// Picks random albums from whichever store is available.
#[derive(Clone)]
pub struct RandomPickService {
    db: Arc<Database>,
    columnar: Option<Arc<dyn ColumnarSink>>,
}

impl RandomPickService {
    pub fn new(db: Arc<Database>, columnar: Option<Arc<dyn ColumnarSink>>) -> Self {
        Self { db, columnar }
    }

    fn columnar_for(&self, source: PickSource) -> Result<Option<&dyn ColumnarSink>> {
        match (source, &self.columnar) {
            (PickSource::Sqlite, _) => Ok(None),
            (PickSource::Auto, columnar) => Ok(columnar.as_deref()),
            (PickSource::Clickhouse, Some(columnar)) => Ok(Some(columnar.as_ref())),
            (PickSource::Clickhouse, None) => {
                Err(eyre!("No [clickhouse] section in the config file"))
            }
        }
    }

    /// Up to `count` random albums rated 3 or more.
    pub async fn random_albums(&self, source: PickSource, count: u32) -> Result<Vec<RandomAlbum>> {
        match self.columnar_for(source)? {
            Some(columnar) => columnar.random_albums(count).await,
            None => self.db.random_albums(count).await,
        }
    }

    /// A random title credited to `artist`, if they have any.
    pub async fn random_album_from_artist(
        &self,
        source: PickSource,
        artist: &str,
    ) -> Result<Option<String>> {
        match self.columnar_for(source)? {
            Some(columnar) => columnar.random_album_from_artist(artist).await,
            None => self.db.random_album_from_artist(artist).await,
        }
    }
}
