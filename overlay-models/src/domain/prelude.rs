use serde::{Deserialize, Serialize};
use validator::Validate;

pub use crate::domain::overlay::{
    build_asset_url, sanitize_file_name, AssetField, AssetUrlOptions, ImageAsset, NewImage,
    NewOverlay, OverlayListParams, OverlayPatch, OverlayQuery, OverlayRecord, SortDirection,
    SortField, SortKey, SubscriptionTopic,
};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PathId {
    pub id: i32,
}
