use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Ids are Discogs ids, never generated locally
        manager
            .create_table(
                Table::create()
                    .table(Albums::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Albums::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Albums::Title).string().not_null())
                    .col(ColumnDef::new(Albums::Year).integer())
                    .col(
                        ColumnDef::new(Albums::Rating)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Albums::DateAdded).integer().not_null())
                    .col(ColumnDef::new(Albums::MasterId).integer())
                    .col(ColumnDef::new(Albums::InstanceId).integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Artists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Artists::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Artists::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlbumsArtists::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AlbumsArtists::AlbumId).integer().not_null())
                    .col(ColumnDef::new(AlbumsArtists::ArtistId).integer().not_null())
                    .col(
                        ColumnDef::new(AlbumsArtists::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .col(AlbumsArtists::AlbumId)
                            .col(AlbumsArtists::ArtistId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_albums_artists_album_id")
                            .from(AlbumsArtists::Table, AlbumsArtists::AlbumId)
                            .to(Albums::Table, Albums::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_albums_artists_artist_id")
                            .from(AlbumsArtists::Table, AlbumsArtists::ArtistId)
                            .to(Artists::Table, Artists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_artists_name")
                    .table(Artists::Table)
                    .col(Artists::Name)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_albums_rating")
                    .table(Albums::Table)
                    .col(Albums::Rating)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlbumsArtists::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Artists::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Albums::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Albums {
    Table,
    Id,
    Title,
    Year,
    Rating,
    DateAdded,
    MasterId,
    InstanceId,
}

#[derive(DeriveIden)]
enum Artists {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum AlbumsArtists {
    Table,
    AlbumId,
    ArtistId,
    Position,
}
