use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};

use crate::database::{Database, InsertStats};
use crate::discogs_rs::MAX_PER_PAGE;
use crate::ports::columnar::{ColumnarAlbum, ColumnarSink};
use crate::ports::discogs::DiscogsClient;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Discogs answers a rate-limited request with a well-formed envelope
    /// reporting zero pages. An empty collection looks the same; we can't
    /// tell the two apart, so both abort the sync.
    ///
    /// A plain HTTP 429 is not reported here: it surfaces as
    /// [`DiscogsError::Status`](crate::discogs_rs::collection::DiscogsError)
    /// from the client, so match on both when handling rate limits.
    #[error(
        "Discogs reported 0 pages when fetching page {page}: rate limited (or the collection is empty)"
    )]
    RateLimited { page: u32 },
    #[error("Invalid page size {0}: Discogs accepts 1 to {MAX_PER_PAGE} releases per page")]
    InvalidPageSize(u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: u32,
    pub releases: usize,
    pub inserted: InsertStats,
    pub columnar_rows: usize,
}

/// Copies a user's Discogs collection into the local stores, one page at a time.
pub struct CollectionSyncService<C: DiscogsClient> {
    db: Arc<Database>,
    client: C,
    columnar: Option<Arc<dyn ColumnarSink>>,
    page_delay: Duration,
}

impl<C: DiscogsClient> CollectionSyncService<C> {
    pub fn new(
        db: Arc<Database>,
        client: C,
        columnar: Option<Arc<dyn ColumnarSink>>,
        page_delay: Duration,
    ) -> Self {
        Self {
            db,
            client,
            columnar,
            page_delay,
        }
    }

    /// Fetch every page of `user`'s collection and write each one to both sinks.
    ///
    /// Fails fast: the first error from the API or either sink aborts the run.
    /// Pages written before the failure stay written.
    pub async fn sync_collection(&self, user: &str, per_page: u32) -> Result<SyncReport> {
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(SyncError::InvalidPageSize(per_page).into());
        }

        log::info!("Syncing Discogs collection of '{}'", user);

        let mut report = SyncReport::default();
        let mut page = 1;
        loop {
            let body = self
                .client
                .collection_page(user, page, per_page)
                .await
                .wrap_err_with(|| format!("Failed to fetch page {} of {}'s collection", page, user))?;

            if body.pagination.pages == 0 {
                return Err(SyncError::RateLimited { page }.into());
            }
            let last_page = body.pagination.pages;

            report.inserted += self
                .db
                .insert_page(&body.releases)
                .await
                .wrap_err_with(|| format!("Failed to store page {}", page))?;

            if let Some(columnar) = &self.columnar {
                report.columnar_rows += self
                    .write_columnar(columnar.as_ref(), page, &body.releases)
                    .await?;
            }

            report.pages += 1;
            report.releases += body.releases.len();
            log::info!(
                "Synced page {}/{} ({} releases)",
                page,
                last_page,
                body.releases.len()
            );

            page += 1;
            if page > last_page {
                break;
            }

            tokio::time::sleep(self.page_delay).await;
        }

        log::info!(
            "Sync of '{}' complete: {} releases over {} pages, {} new albums",
            user,
            report.releases,
            report.pages,
            report.inserted.albums
        );
        Ok(report)
    }

    async fn write_columnar(
        &self,
        columnar: &dyn ColumnarSink,
        page: u32,
        releases: &[crate::discogs_rs::collection::Release],
    ) -> Result<usize> {
        let mut rows = Vec::with_capacity(releases.len());
        for release in releases {
            match ColumnarAlbum::from_release(release)? {
                Some(row) => rows.push(row),
                None => log::warn!(
                    "Release {} has no artists, skipping columnar row",
                    release.id()
                ),
            }
        }

        columnar
            .insert_batch(&rows)
            .await
            .wrap_err_with(|| format!("Failed to send page {} to the columnar store", page))?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::discogs_rs::collection::fixtures::{page, release};
    use crate::ports::columnar::MockColumnarSink;
    use crate::ports::discogs::MockDiscogsClient;
    use crate::test_utils::{MemoryColumnarSink, test_db};

    /// A three page collection, two releases per page.
    fn three_pages(mut client: MockDiscogsClient) -> MockDiscogsClient {
        client
            .expect_collection_page()
            .times(3)
            .returning(|user, page_number, per_page| {
                assert_eq!(user, "alice");
                assert_eq!(per_page, 2);
                let first = i64::from(page_number) * 10;
                Ok(page(
                    page_number,
                    3,
                    vec![
                        release(first, "A", 4, &[(1, "Artist One")]),
                        release(first + 1, "B", 2, &[(2, "Artist Two")]),
                    ],
                ))
            });
        client
    }

    #[tokio::test]
    async fn test_sync_fetches_every_page_once() {
        let db = test_db().await;
        let columnar = Arc::new(MemoryColumnarSink::default());
        let client = three_pages(MockDiscogsClient::new());

        let service =
            CollectionSyncService::new(db.clone(), client, Some(columnar.clone()), Duration::ZERO);
        let report = service.sync_collection("alice", 2).await.unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.releases, 6);
        assert_eq!(report.inserted.albums, 6);
        assert_eq!(report.columnar_rows, 6);
        assert_eq!(*columnar.batches.lock().unwrap(), vec![2, 2, 2]);
        assert_eq!(db.collection_counts().await.unwrap().albums, 6);
    }

    #[tokio::test]
    async fn test_resync_adds_no_rows() {
        let db = test_db().await;

        let first = CollectionSyncService::new(
            db.clone(),
            three_pages(MockDiscogsClient::new()),
            None,
            Duration::ZERO,
        );
        first.sync_collection("alice", 2).await.unwrap();

        let second = CollectionSyncService::new(
            db.clone(),
            three_pages(MockDiscogsClient::new()),
            None,
            Duration::ZERO,
        );
        let report = second.sync_collection("alice", 2).await.unwrap();

        assert_eq!(report.releases, 6);
        assert_eq!(report.inserted, InsertStats::default());
        let counts = db.collection_counts().await.unwrap();
        assert_eq!(counts.albums, 6);
        assert_eq!(counts.artists, 2);
    }

    #[tokio::test]
    async fn test_zero_pages_is_rate_limited() {
        let db = test_db().await;
        let mut columnar = MockColumnarSink::new();
        columnar.expect_insert_batch().never();
        let mut client = MockDiscogsClient::new();
        client
            .expect_collection_page()
            .times(1)
            .returning(|_, _, _| Ok(page(1, 0, vec![release(1, "Ghost", 5, &[(1, "Nobody")])])));

        let service =
            CollectionSyncService::new(db.clone(), client, Some(Arc::new(columnar)), Duration::ZERO);
        let err = service.sync_collection("alice", 250).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::RateLimited { page: 1 })
        ));
        assert_eq!(db.collection_counts().await.unwrap().albums, 0);
    }

    #[tokio::test]
    async fn test_http_429_is_a_discogs_error() {
        use crate::discogs_rs::collection::DiscogsError;

        let db = test_db().await;
        let mut client = MockDiscogsClient::new();
        client.expect_collection_page().times(1).returning(|_, _, _| {
            Err(DiscogsError::Status {
                status: reqwest::StatusCode::TOO_MANY_REQUESTS,
                url: "https://api.discogs.com/users/alice/collection/folders/0/releases".to_string(),
                body: "{\"message\": \"You are making requests too quickly.\"}".to_string(),
            }
            .into())
        });

        let service = CollectionSyncService::new(db, client, None, Duration::ZERO);
        let err = service.sync_collection("alice", 250).await.unwrap_err();

        assert!(err.downcast_ref::<SyncError>().is_none());
        assert!(matches!(
            err.downcast_ref::<DiscogsError>(),
            Some(DiscogsError::Status { status, .. }) if *status == reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_mid_sync_keeps_earlier_pages() {
        let db = test_db().await;
        let mut client = MockDiscogsClient::new();
        client
            .expect_collection_page()
            .times(2)
            .returning(|_, page_number, _| {
                let pages = if page_number == 1 { 5 } else { 0 };
                Ok(page(
                    page_number,
                    pages,
                    vec![release(i64::from(page_number), "X", 3, &[(1, "A")])],
                ))
            });

        let service = CollectionSyncService::new(db.clone(), client, None, Duration::ZERO);
        let err = service.sync_collection("alice", 1).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::RateLimited { page: 2 })
        ));
        assert!(db.get_album(1).await.unwrap().is_some());
        assert!(db.get_album(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_aborts() {
        let db = test_db().await;
        let mut client = MockDiscogsClient::new();
        client
            .expect_collection_page()
            .times(1)
            .returning(|_, _, _| Err(color_eyre::eyre::eyre!("connection reset")));

        let service = CollectionSyncService::new(db, client, None, Duration::ZERO);
        let err = service.sync_collection("alice", 250).await.unwrap_err();

        assert!(format!("{:?}", err).contains("connection reset"));
    }

    #[tokio::test]
    async fn test_columnar_error_stops_further_pages() {
        let db = test_db().await;
        let mut columnar = MockColumnarSink::new();
        columnar
            .expect_insert_batch()
            .times(1)
            .returning(|_| Err(color_eyre::eyre::eyre!("clickhouse down")));
        let mut client = MockDiscogsClient::new();
        client
            .expect_collection_page()
            .times(1)
            .returning(|_, page_number, _| {
                Ok(page(page_number, 3, vec![release(1, "X", 3, &[(1, "A")])]))
            });

        let service =
            CollectionSyncService::new(db.clone(), client, Some(Arc::new(columnar)), Duration::ZERO);
        let err = service.sync_collection("alice", 250).await.unwrap_err();

        assert!(err.to_string().contains("columnar store"));
        // The relational write for the page had already committed
        assert!(db.get_album(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_page_size_makes_no_request() {
        let db = test_db().await;
        let mut client = MockDiscogsClient::new();
        client.expect_collection_page().never();

        let service = CollectionSyncService::new(db, client, None, Duration::ZERO);

        for per_page in [0, MAX_PER_PAGE + 1] {
            let err = service.sync_collection("alice", per_page).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<SyncError>(),
                Some(SyncError::InvalidPageSize(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_releases_without_artists_skip_columnar_only() {
        let db = test_db().await;
        let columnar = Arc::new(MemoryColumnarSink::default());
        let mut client = MockDiscogsClient::new();
        client.expect_collection_page().times(1).returning(|_, _, _| {
            Ok(page(
                1,
                1,
                vec![
                    release(1, "Credited", 3, &[(1, "A")]),
                    release(2, "Anonymous", 3, &[]),
                ],
            ))
        });

        let service =
            CollectionSyncService::new(db.clone(), client, Some(columnar.clone()), Duration::ZERO);
        let report = service.sync_collection("alice", 250).await.unwrap();

        assert_eq!(report.columnar_rows, 1);
        assert_eq!(columnar.rows().len(), 1);
        assert!(db.get_album(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_columnar_last_write_wins_per_key() {
        let db = test_db().await;
        let columnar = Arc::new(MemoryColumnarSink::default());
        let mut client = MockDiscogsClient::new();
        client
            .expect_collection_page()
            .times(2)
            .returning(|_, page_number, _| {
                let title = if page_number == 1 { "First" } else { "Second" };
                Ok(page(page_number, 2, vec![release(1, title, 4, &[(1, "A")])]))
            });

        let service =
            CollectionSyncService::new(db.clone(), client, Some(columnar.clone()), Duration::ZERO);
        service.sync_collection("alice", 1).await.unwrap();

        let rows = columnar.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Second");
        // The relational store keeps the first write
        assert_eq!(db.get_album(1).await.unwrap().unwrap().title, "First");
    }

    #[tokio::test]
    async fn test_waits_between_pages_but_not_after_last() {
        let db = test_db().await;
        let client = three_pages(MockDiscogsClient::new());
        let delay = Duration::from_millis(200);

        let service = CollectionSyncService::new(db, client, None, delay);
        let started = Instant::now();
        service.sync_collection("alice", 2).await.unwrap();

        // Two gaps for three pages, and no third wait after the last one
        let elapsed = started.elapsed();
        assert!(elapsed >= delay * 2, "waited only {:?}", elapsed);
        assert!(elapsed < delay * 3, "waited {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_single_page_never_waits() {
        let db = test_db().await;
        let mut client = MockDiscogsClient::new();
        client
            .expect_collection_page()
            .times(1)
            .returning(|_, _, _| Ok(page(1, 1, vec![release(1, "Only", 3, &[(1, "A")])])));

        let service = CollectionSyncService::new(db, client, None, Duration::from_secs(60));
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            service.sync_collection("alice", 250),
        )
        .await
        .expect("sync slept after the last page")
        .unwrap();

        assert_eq!(report.pages, 1);
    }
}
