pub mod collection;

pub const DISCOGS_API_BASE: &str = "https://api.discogs.com/";

/// Discogs rejects requests without a descriptive user agent.
pub const USER_AGENT: &str = concat!("disq/", env!("CARGO_PKG_VERSION"));

/// Releases per page accepted by the collection endpoint.
pub const MAX_PER_PAGE: u32 = 500;
