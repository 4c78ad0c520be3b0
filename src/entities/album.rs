use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "albums")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub rating: i32,
    /// Unix seconds
    pub date_added: i64,
    pub master_id: Option<i64>,
    pub instance_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::album_artist::Entity")]
    AlbumArtist,
    #[sea_orm(has_many = "super::album_label::Entity")]
    AlbumLabel,
    #[sea_orm(has_many = "super::album_genre::Entity")]
    AlbumGenre,
}

impl Related<super::artist::Entity> for Entity {
    fn to() -> RelationDef {
        super::album_artist::Relation::Artist.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::album_artist::Relation::Album.def().rev())
    }
}

impl Related<super::label::Entity> for Entity {
    fn to() -> RelationDef {
        super::album_label::Relation::Label.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::album_label::Relation::Album.def().rev())
    }
}

impl Related<super::album_genre::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlbumGenre.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
