pub mod clickhouse;
pub mod collection_sync;
pub mod discogs;
pub mod random_pick;
