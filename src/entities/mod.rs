pub mod album;
pub mod album_artist;
pub mod album_genre;
pub mod album_label;
pub mod artist;
pub mod label;
