//! Overlay domain models.
//!
//! `OverlayRecord` is what every consumer sees: the row without its image
//! bytes. Image bytes travel only through [`ImageAsset`], which the asset
//! endpoint reads on demand.

use crate::{
    constants::{
        ALLOWED_IMAGE_MIMES, ASSET_ROUTE, GIF_SIGNATURES, MAX_DESCRIPTION_LEN, PNG_SIGNATURE,
    },
    entities::prelude::OverlayModel,
    enums::overlay::OverlayType,
};
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sea_orm::{DerivePartialModel, FromQueryResult, ModelTrait};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::{cmp::Ordering, fmt, str::FromStr};
use validator::Validate;

pub const DESCRIPTION_REQUIRED: &str = "Short description is required";
pub const DESCRIPTION_TOO_LONG: &str = "Short description must be at most 256 characters";
pub const TYPE_REQUIRED: &str = "Type is required";
pub const COMPONENT_NAME_REQUIRED: &str = "Component name is required for component overlays";
pub const IMAGE_REQUIRED: &str = "Please choose a PNG or GIF image";

/// Overlay information used for read-only responses and change events
#[derive(
    Debug, Serialize, Clone, PartialEq, Deserialize, FromQueryResult, DerivePartialModel,
)]
#[serde(rename_all = "camelCase")]
#[sea_orm(entity = "<crate::entities::prelude::OverlayModel as ModelTrait>::Entity")]
pub struct OverlayRecord {
    pub id: i32,
    pub short_description: String,
    #[serde(rename = "type")]
    pub overlay_type: OverlayType,
    pub component_name: String,
    pub image: Option<String>,
    pub image_mime: Option<String>,
    pub active: bool,
    pub parameters: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OverlayRecord {
    /// Parameters as a map; anything that is not a JSON object reads as empty.
    pub fn parameters_map(&self) -> Map<String, Json> {
        match &self.parameters {
            Json::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }

    #[inline]
    pub fn is_component(&self) -> bool {
        self.overlay_type == OverlayType::Component
    }
}

impl From<OverlayModel> for OverlayRecord {
    fn from(model: OverlayModel) -> Self {
        Self {
            id: model.id,
            short_description: model.short_description,
            overlay_type: model.overlay_type,
            component_name: model.component_name,
            image: model.image,
            image_mime: model.image_mime,
            active: model.active,
            parameters: model.parameters,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// An uploaded image waiting to be attached to a new overlay.
#[derive(Clone, PartialEq, Eq)]
pub struct NewImage {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for NewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewImage")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl NewImage {
    /// Declared MIME is PNG or GIF and the bytes actually start like one.
    #[inline]
    pub fn is_allowed_mime(&self) -> bool {
        ALLOWED_IMAGE_MIMES.contains(&self.mime.as_str())
            && sniff_image_mime(&self.bytes) == Some(self.mime.as_str())
    }
}

/// MIME type of an image judged by its leading bytes. Only PNG and GIF are known.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        Some("image/png")
    } else if GIF_SIGNATURES.iter().any(|sig| bytes.starts_with(sig)) {
        Some("image/gif")
    } else {
        None
    }
}

/// Payload to create a new overlay. New overlays always start inactive.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOverlay {
    pub short_description: String,
    pub overlay_type: OverlayType,
    pub component_name: String,
    pub image: Option<NewImage>,
    pub parameters: Map<String, Json>,
}

impl NewOverlay {
    pub fn image(short_description: impl Into<String>, image: NewImage) -> Self {
        Self {
            short_description: short_description.into(),
            overlay_type: OverlayType::Image,
            component_name: String::new(),
            image: Some(image),
            parameters: Map::new(),
        }
    }

    pub fn component(short_description: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            short_description: short_description.into(),
            overlay_type: OverlayType::Component,
            component_name: name.into(),
            image: None,
            parameters: Map::new(),
        }
    }

    /// Check the creation rules, returning the first violated one.
    ///
    /// Order: description, component name, image.
    pub fn check(&self) -> Result<(), &'static str> {
        let description = self.short_description.trim();
        if description.is_empty() {
            return Err(DESCRIPTION_REQUIRED);
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(DESCRIPTION_TOO_LONG);
        }
        match self.overlay_type {
            OverlayType::Component => {
                if self.component_name.trim().is_empty() {
                    return Err(COMPONENT_NAME_REQUIRED);
                }
            }
            OverlayType::Image => match &self.image {
                Some(image) if image.is_allowed_mime() && !image.bytes.is_empty() => {}
                _ => return Err(IMAGE_REQUIRED),
            },
        }
        Ok(())
    }

    /// Trim text fields and drop whatever does not belong to the overlay type.
    pub fn normalized(mut self) -> Self {
        self.short_description = self.short_description.trim().to_string();
        match self.overlay_type {
            OverlayType::Component => {
                self.component_name = self.component_name.trim().to_string();
                self.image = None;
            }
            OverlayType::Image => {
                self.component_name.clear();
                if let Some(image) = self.image.as_mut() {
                    image.file_name = sanitize_file_name(&image.file_name);
                }
            }
        }
        self
    }
}

/// Partial update of an overlay. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPatch {
    #[validate(length(min = 1, max = 256, message = "short description length must be 1..=256"))]
    pub short_description: Option<String>,
    pub component_name: Option<String>,
    pub active: Option<bool>,
    pub parameters: Option<Map<String, Json>>,
}

impl OverlayPatch {
    pub fn activate() -> Self {
        Self {
            active: Some(true),
            ..Default::default()
        }
    }

    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            ..Default::default()
        }
    }

    pub fn parameters(parameters: Map<String, Json>) -> Self {
        Self {
            parameters: Some(parameters),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.short_description.is_none()
            && self.component_name.is_none()
            && self.active.is_none()
            && self.parameters.is_none()
    }
}

/// Stored image of an overlay, as served by the asset endpoint.
#[derive(Clone)]
pub struct ImageAsset {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Created,
    Updated,
    ShortDescription,
    Type,
    ComponentName,
    Active,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Created => "created",
            SortField::Updated => "updated",
            SortField::ShortDescription => "short_description",
            SortField::Type => "type",
            SortField::ComponentName => "component_name",
            SortField::Active => "active",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(SortField::Id),
            "created" | "created_at" | "createdAt" => Ok(SortField::Created),
            "updated" | "updated_at" | "updatedAt" => Ok(SortField::Updated),
            "short_description" | "shortDescription" => Ok(SortField::ShortDescription),
            "type" => Ok(SortField::Type),
            "component_name" | "componentName" => Ok(SortField::ComponentName),
            "active" => Ok(SortField::Active),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort criterion, written `-updated` (descending) or `+created` / `created` (ascending).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Parse a comma separated list such as `-updated,-id`.
    pub fn parse_list(s: &str) -> Result<Vec<SortKey>, String> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(SortKey::from_str)
            .collect()
    }

    pub fn compare(&self, a: &OverlayRecord, b: &OverlayRecord) -> Ordering {
        let ord = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Created => a.created_at.cmp(&b.created_at),
            SortField::Updated => a.updated_at.cmp(&b.updated_at),
            SortField::ShortDescription => a.short_description.cmp(&b.short_description),
            SortField::Type => a.overlay_type.as_str().cmp(b.overlay_type.as_str()),
            SortField::ComponentName => a.component_name.cmp(&b.component_name),
            SortField::Active => a.active.cmp(&b.active),
        };
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(field) = s.strip_prefix('-') {
            Ok(SortKey::desc(field.parse()?))
        } else {
            Ok(SortKey::asc(s.strip_prefix('+').unwrap_or(s).parse()?))
        }
    }
}

/// Structured listing filter. Filters combine with AND; an empty sort means by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayQuery {
    pub active: Option<bool>,
    pub overlay_type: Option<OverlayType>,
    pub component_name: Option<String>,
    pub sort: Vec<SortKey>,
}

impl OverlayQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active overlays, most recently updated first, id as the last tie-break.
    pub fn active_newest_first() -> Self {
        Self::new()
            .active(true)
            .sort_by(SortKey::desc(SortField::Updated))
            .sort_by(SortKey::desc(SortField::Id))
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn overlay_type(mut self, overlay_type: OverlayType) -> Self {
        self.overlay_type = Some(overlay_type);
        self
    }

    pub fn component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Whether a record passes every filter of this query.
    pub fn matches(&self, record: &OverlayRecord) -> bool {
        self.active.is_none_or(|active| record.active == active)
            && self.overlay_type.is_none_or(|t| record.overlay_type == t)
            && self
                .component_name
                .as_ref()
                .is_none_or(|name| &record.component_name == name)
    }

    /// Order records the way the database would for this query.
    pub fn sort_records(&self, records: &mut [OverlayRecord]) {
        records.sort_by(|a, b| {
            self.sort
                .iter()
                .map(|key| key.compare(a, b))
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });
    }
}

/// Listing query string, e.g. `?active=true&type=image&sort=-created`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OverlayListParams {
    pub active: Option<bool>,
    pub r#type: Option<String>,
    pub component_name: Option<String>,
    #[validate(length(max = 128, message = "sort expression too long"))]
    pub sort: Option<String>,
}

impl TryFrom<OverlayListParams> for OverlayQuery {
    type Error = String;

    fn try_from(params: OverlayListParams) -> Result<Self, Self::Error> {
        let overlay_type = params
            .r#type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(OverlayType::from_str)
            .transpose()?;
        let sort = match params.sort.as_deref() {
            Some(expr) => SortKey::parse_list(expr)?,
            None => Vec::new(),
        };
        Ok(OverlayQuery {
            active: params.active,
            overlay_type,
            component_name: params.component_name.filter(|n| !n.is_empty()),
            sort,
        })
    }
}

/// Subscription topic: every record, or a single one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTopic {
    All,
    Record(i32),
}

impl SubscriptionTopic {
    #[inline]
    pub fn matches(&self, record_id: i32) -> bool {
        match self {
            SubscriptionTopic::All => true,
            SubscriptionTopic::Record(id) => *id == record_id,
        }
    }
}

impl fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionTopic::All => f.write_str("*"),
            SubscriptionTopic::Record(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for SubscriptionTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "*" => Ok(SubscriptionTopic::All),
            other => other
                .parse::<i32>()
                .map(SubscriptionTopic::Record)
                .map_err(|_| format!("invalid topic: {other}")),
        }
    }
}

impl Serialize for SubscriptionTopic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SubscriptionTopic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// File fields of an overlay that can be addressed by URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetField {
    Image,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetUrlOptions {
    /// Ask the browser to save the file instead of displaying it.
    pub download: bool,
}

const FILE_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

/// Build the public URL of an overlay asset, or `None` when the field is empty.
///
/// The `v` query parameter changes with `updated_at` so browsers refetch replaced files.
pub fn build_asset_url(
    record: &OverlayRecord,
    field: AssetField,
    options: &AssetUrlOptions,
) -> Option<String> {
    let file_name = match field {
        AssetField::Image => record.image.as_deref().filter(|name| !name.is_empty())?,
    };
    let mut url = format!(
        "{}/{}/{}?v={}",
        ASSET_ROUTE,
        record.id,
        utf8_percent_encode(file_name, FILE_NAME_ENCODE_SET),
        record.updated_at.timestamp_millis()
    );
    if options.download {
        url.push_str("&download=1");
    }
    Some(url)
}

/// Reduce an uploaded file name to a safe base name.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".into()
    } else {
        cleaned.to_string()
    }
}
