use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use color_eyre::Result;
use sea_orm::Database as SeaDatabase;
use url::Url;

use crate::database::{Database, RandomAlbum};
use crate::ports::columnar::{ColumnarAlbum, ColumnarSink};

pub async fn test_db() -> Arc<Database> {
    let conn = SeaDatabase::connect("sqlite::memory:").await.unwrap();

    Arc::new(Database::from_connection(conn).await.unwrap())
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_test_server(router: axum::Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Url::parse(&format!("http://{}/", addr)).unwrap()
}

type RowKey = (String, u8, u32);

/// In-memory stand-in for a ReplacingMergeTree table: rows sharing
/// `(artist_name, rating, album_id)` collapse to the last one written.
#[derive(Default)]
pub struct MemoryColumnarSink {
    rows: Mutex<BTreeMap<RowKey, ColumnarAlbum>>,
    pub batches: Mutex<Vec<usize>>,
}

impl MemoryColumnarSink {
    pub fn rows(&self) -> Vec<ColumnarAlbum> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ColumnarSink for MemoryColumnarSink {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_batch(&self, rows: &[ColumnarAlbum]) -> Result<()> {
        let mut stored = self.rows.lock().unwrap();
        for row in rows {
            let (artist, rating, album_id) = row.key();
            stored.insert((artist.to_string(), rating, album_id), row.clone());
        }
        self.batches.lock().unwrap().push(rows.len());
        Ok(())
    }

    async fn random_albums(&self, limit: u32) -> Result<Vec<RandomAlbum>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|row| row.rating >= 3)
            .take(limit as usize)
            .map(|row| RandomAlbum {
                title: row.title,
                artist_name: row.artist_name,
            })
            .collect())
    }

    async fn random_album_from_artist(&self, artist: &str) -> Result<Option<String>> {
        Ok(self
            .rows()
            .into_iter()
            .find(|row| row.artist_name == artist)
            .map(|row| row.title))
    }
}
