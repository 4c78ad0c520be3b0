use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Labels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Labels::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Labels::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlbumsLabels::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AlbumsLabels::AlbumId).integer().not_null())
                    .col(ColumnDef::new(AlbumsLabels::LabelId).integer().not_null())
                    .col(ColumnDef::new(AlbumsLabels::Catno).string())
                    .primary_key(
                        Index::create()
                            .col(AlbumsLabels::AlbumId)
                            .col(AlbumsLabels::LabelId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_albums_labels_album_id")
                            .from(AlbumsLabels::Table, AlbumsLabels::AlbumId)
                            .to(Albums::Table, Albums::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_albums_labels_label_id")
                            .from(AlbumsLabels::Table, AlbumsLabels::LabelId)
                            .to(Labels::Table, Labels::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Genres and styles share one table, `kind` tells them apart
        manager
            .create_table(
                Table::create()
                    .table(AlbumsGenres::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AlbumsGenres::AlbumId).integer().not_null())
                    .col(ColumnDef::new(AlbumsGenres::Kind).string().not_null())
                    .col(ColumnDef::new(AlbumsGenres::Name).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(AlbumsGenres::AlbumId)
                            .col(AlbumsGenres::Kind)
                            .col(AlbumsGenres::Name),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_albums_genres_album_id")
                            .from(AlbumsGenres::Table, AlbumsGenres::AlbumId)
                            .to(Albums::Table, Albums::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlbumsGenres::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlbumsLabels::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Labels::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Albums {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Labels {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum AlbumsLabels {
    Table,
    AlbumId,
    LabelId,
    Catno,
}

#[derive(DeriveIden)]
enum AlbumsGenres {
    Table,
    AlbumId,
    Kind,
    Name,
}
