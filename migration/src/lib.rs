pub use sea_orm_migration::prelude::*;

mod m20241020_000001_create_collection_tables;
mod m20241103_000001_create_label_and_genre_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241020_000001_create_collection_tables::Migration),
            Box::new(m20241103_000001_create_label_and_genre_tables::Migration),
        ]
    }
}
