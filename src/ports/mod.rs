pub mod columnar;
pub mod discogs;
