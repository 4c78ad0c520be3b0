use color_eyre::eyre::Result;

use crate::discogs_rs::collection::CollectionPage;

/// Port trait wrapping the Discogs API capabilities used by the sync.
///
/// Implementations live in `services::discogs::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DiscogsClient: Send + Sync {
    /// Fetch page `page` (1-based) of `user`'s collection.
    async fn collection_page(
        &self,
        user: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CollectionPage>;
}
