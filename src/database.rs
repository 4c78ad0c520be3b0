use color_eyre::{Result, eyre::Context};
use migration::MigratorTrait;
use sea_orm::{
    ActiveValue, ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseConnection,
    DbBackend, EntityTrait, FromQueryResult, Statement, TransactionTrait,
    sea_query::OnConflict,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::discogs_rs::collection::Release;
use crate::entities;

pub struct Database {
    pub conn: DatabaseConnection,
}

/// A random pick: album title and its main artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromQueryResult)]
pub struct RandomAlbum {
    pub title: String,
    pub artist_name: String,
}

/// One line of the collection browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
pub struct CollectionRow {
    pub album_id: i64,
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,
    pub rating: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistRating {
    pub artist: String,
    pub avg_rating: f64,
    pub albums: Vec<String>,
}

#[derive(Debug, FromQueryResult)]
struct ArtistRatingRow {
    artist: String,
    avg_rating: f64,
    albums: String,
}

#[derive(Debug, FromQueryResult)]
struct TitleRow {
    title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromQueryResult)]
pub struct CollectionCounts {
    pub albums: i64,
    pub artists: i64,
    pub labels: i64,
}

/// What a single release added to the store. All zero on a re-sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertStats {
    pub albums: u64,
    pub artists: u64,
    pub links: u64,
}

impl std::ops::AddAssign for InsertStats {
    fn add_assign(&mut self, other: Self) {
        self.albums += other.albums;
        self.artists += other.artists;
        self.links += other.links;
    }
}

const ALBUM_SEPARATOR: char = '\t';

// Albums rated 3 or more, credited to their main artist
const SELECT_RANDOM: &str = r#"
SELECT al.title AS title, ar.name AS artist_name
FROM albums al
JOIN albums_artists aa ON aa.album_id = al.id AND aa.position = 0
JOIN artists ar ON ar.id = aa.artist_id
WHERE al.rating >= 3
ORDER BY RANDOM()
LIMIT ?
"#;

const SELECT_RANDOM_FROM_ARTIST: &str = r#"
SELECT al.title AS title
FROM albums al
JOIN albums_artists aa ON aa.album_id = al.id
JOIN artists ar ON ar.id = aa.artist_id
WHERE ar.name = ?
ORDER BY RANDOM()
LIMIT 1
"#;

const SELECT_COLLECTION: &str = r#"
SELECT al.id AS album_id, ar.name AS artist, al.title AS title, al.year AS year, al.rating AS rating
FROM albums al
JOIN albums_artists aa ON aa.album_id = al.id
JOIN artists ar ON ar.id = aa.artist_id
"#;

const SELECT_ARTIST_RATINGS: &str = r#"
SELECT ar.name AS artist, AVG(al.rating) AS avg_rating, GROUP_CONCAT(al.title, char(9)) AS albums
FROM albums al
JOIN albums_artists aa ON aa.album_id = al.id
JOIN artists ar ON ar.id = aa.artist_id
WHERE al.rating > 0
GROUP BY ar.id, ar.name
HAVING COUNT(al.rating) > 1 AND AVG(al.rating) >= 3
ORDER BY avg_rating DESC, artist ASC
"#;

const SELECT_COUNTS: &str = r#"
SELECT
    (SELECT COUNT(*) FROM albums) AS albums,
    (SELECT COUNT(*) FROM artists) AS artists,
    (SELECT COUNT(*) FROM labels) AS labels
"#;

impl Database {
    /// Open or create a database at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        log::debug!("Opening database at: {}", path.display());

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create database directory: {}",
                parent.display()
            ))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(8)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt)
            .await
            .context(format!("Failed to open database: {}", path.display()))?;

        Self::from_connection(conn).await
    }

    /// Wrap an existing connection and run migrations.
    ///
    /// Foreign keys are enforced on every pooled connection by sqlx's SQLite
    /// connect options, which default `foreign_keys` to on.
    pub async fn from_connection(conn: DatabaseConnection) -> Result<Self> {
        log::debug!("Running database migrations");
        migration::Migrator::up(&conn, None)
            .await
            .context("Failed to run database migrations")?;

        Ok(Database { conn })
    }

    // ========== Sync ==========

    /// Insert every release of one page inside a single transaction.
    ///
    /// Either the whole page lands or nothing does.
    pub async fn insert_page(&self, releases: &[Release]) -> Result<InsertStats> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let mut stats = InsertStats::default();
        for release in releases {
            stats += Self::insert_release(&txn, release).await?;
        }

        txn.commit().await.context("Failed to commit transaction")?;

        log::debug!(
            "Stored page of {} releases ({} new albums, {} new artists)",
            releases.len(),
            stats.albums,
            stats.artists
        );
        Ok(stats)
    }

    /// Insert-or-ignore one release and everything hanging off it.
    ///
    /// Existing rows are never updated: the first write for an id wins.
    pub async fn insert_release(
        conn: &impl ConnectionTrait,
        release: &Release,
    ) -> Result<InsertStats> {
        let album_id = release.id();
        let date_added = release.date_added_utc()?.timestamp();
        let mut stats = InsertStats::default();

        let album = entities::album::ActiveModel {
            id: ActiveValue::Set(album_id),
            title: ActiveValue::Set(release.title().to_string()),
            year: ActiveValue::Set(release.year()),
            rating: ActiveValue::Set(release.clamped_rating() as i32),
            date_added: ActiveValue::Set(date_added),
            master_id: ActiveValue::Set(release.master_id()),
            instance_id: ActiveValue::Set(release.instance_id),
        };
        stats.albums += entities::album::Entity::insert(album)
            .on_conflict(
                OnConflict::column(entities::album::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .context(format!("Failed to insert album {}", album_id))?;

        for (position, artist) in release.basic_information.artists.iter().enumerate() {
            let model = entities::artist::ActiveModel {
                id: ActiveValue::Set(artist.id),
                name: ActiveValue::Set(artist.name.trim().to_string()),
            };
            stats.artists += entities::artist::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(entities::artist::Column::Id)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(conn)
                .await
                .context(format!("Failed to insert artist {}", artist.id))?;

            let link = entities::album_artist::ActiveModel {
                album_id: ActiveValue::Set(album_id),
                artist_id: ActiveValue::Set(artist.id),
                position: ActiveValue::Set(position as i32),
            };
            stats.links += entities::album_artist::Entity::insert(link)
                .on_conflict(
                    OnConflict::columns([
                        entities::album_artist::Column::AlbumId,
                        entities::album_artist::Column::ArtistId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await
                .context(format!(
                    "Failed to link album {} to artist {}",
                    album_id, artist.id
                ))?;
        }

        for label in &release.basic_information.labels {
            let model = entities::label::ActiveModel {
                id: ActiveValue::Set(label.id),
                name: ActiveValue::Set(label.name.trim().to_string()),
            };
            entities::label::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(entities::label::Column::Id)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(conn)
                .await
                .context(format!("Failed to insert label {}", label.id))?;

            let link = entities::album_label::ActiveModel {
                album_id: ActiveValue::Set(album_id),
                label_id: ActiveValue::Set(label.id),
                catno: ActiveValue::Set(label.catno.clone().filter(|c| !c.is_empty())),
            };
            stats.links += entities::album_label::Entity::insert(link)
                .on_conflict(
                    OnConflict::columns([
                        entities::album_label::Column::AlbumId,
                        entities::album_label::Column::LabelId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await
                .context(format!(
                    "Failed to link album {} to label {}",
                    album_id, label.id
                ))?;
        }

        let genres = release
            .basic_information
            .genres
            .iter()
            .map(|name| (entities::album_genre::KIND_GENRE, name))
            .chain(
                release
                    .basic_information
                    .styles
                    .iter()
                    .map(|name| (entities::album_genre::KIND_STYLE, name)),
            );
        for (kind, name) in genres {
            let model = entities::album_genre::ActiveModel {
                album_id: ActiveValue::Set(album_id),
                kind: ActiveValue::Set(kind.to_string()),
                name: ActiveValue::Set(name.trim().to_string()),
            };
            stats.links += entities::album_genre::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        entities::album_genre::Column::AlbumId,
                        entities::album_genre::Column::Kind,
                        entities::album_genre::Column::Name,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await
                .context(format!("Failed to tag album {} with {} {}", album_id, kind, name))?;
        }

        Ok(stats)
    }

    // ========== Queries ==========

    pub async fn get_album(&self, id: i64) -> Result<Option<entities::album::Model>> {
        entities::album::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query album")
    }

    /// A random album rated 3 or more.
    pub async fn random_album(&self) -> Result<Option<RandomAlbum>> {
        Ok(self.random_albums(1).await?.into_iter().next())
    }

    pub async fn random_albums(&self, limit: u32) -> Result<Vec<RandomAlbum>> {
        RandomAlbum::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            SELECT_RANDOM,
            [limit.into()],
        ))
        .all(&self.conn)
        .await
        .context("Failed to select random albums")
    }

    /// A random album title credited to `artist`, regardless of rating.
    pub async fn random_album_from_artist(&self, artist: &str) -> Result<Option<String>> {
        let row = TitleRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            SELECT_RANDOM_FROM_ARTIST,
            [artist.into()],
        ))
        .one(&self.conn)
        .await
        .context(format!("Failed to select random album from {}", artist))?;

        Ok(row.map(|row| row.title))
    }

    /// Every album credited to `artist`, oldest first.
    pub async fn albums_by_artist(&self, artist: &str) -> Result<Vec<CollectionRow>> {
        let sql = format!("{SELECT_COLLECTION} WHERE ar.name = ? ORDER BY al.year, al.title");
        CollectionRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            [artist.into()],
        ))
        .all(&self.conn)
        .await
        .context(format!("Failed to select albums from {}", artist))
    }

    /// Collection rows whose artist name contains `filter`, oldest first.
    ///
    /// An empty filter matches everything.
    pub async fn search_collection(&self, filter: &str) -> Result<Vec<CollectionRow>> {
        let sql = format!(
            "{SELECT_COLLECTION} WHERE ar.name LIKE ? ESCAPE '\\' ORDER BY al.year, ar.name, al.title"
        );
        let pattern = format!("%{}%", escape_like(filter.trim()));
        CollectionRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            [pattern.into()],
        ))
        .all(&self.conn)
        .await
        .context(format!("Failed to search collection for '{}'", filter))
    }

    /// Artists with more than one rated album and an average rating of 3 or more.
    pub async fn artist_rating_summary(&self) -> Result<Vec<ArtistRating>> {
        let rows = ArtistRatingRow::find_by_statement(Statement::from_string(
            DbBackend::Sqlite,
            SELECT_ARTIST_RATINGS,
        ))
        .all(&self.conn)
        .await
        .context("Failed to aggregate artist ratings")?;

        Ok(rows
            .into_iter()
            .map(|row| ArtistRating {
                artist: row.artist,
                avg_rating: row.avg_rating,
                albums: row
                    .albums
                    .split(ALBUM_SEPARATOR)
                    .map(str::to_string)
                    .collect(),
            })
            .collect())
    }

    pub async fn collection_counts(&self) -> Result<CollectionCounts> {
        CollectionCounts::find_by_statement(Statement::from_string(
            DbBackend::Sqlite,
            SELECT_COUNTS,
        ))
        .one(&self.conn)
        .await
        .context("Failed to count collection")?
        .ok_or_else(|| color_eyre::eyre::eyre!("Count query returned no rows"))
    }
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
