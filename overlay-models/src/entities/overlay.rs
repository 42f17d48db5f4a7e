//! `SeaORM` Entity for the overlays table.
//!
//! Image overlays keep their asset inline as a BLOB next to its file name and
//! MIME type, so a record and its image are always written together.

use crate::enums::overlay::OverlayType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "overlays")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub short_description: String,
    #[sea_orm(column_name = "type")]
    pub overlay_type: OverlayType,
    /// Widget name; empty for image overlays.
    pub component_name: String,
    /// Sanitized file name of the uploaded image.
    pub image: Option<String>,
    pub image_mime: Option<String>,
    #[serde(skip)]
    pub image_bytes: Option<Vec<u8>>,
    pub active: bool,
    /// Always a JSON object.
    pub parameters: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
