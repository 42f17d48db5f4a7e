use sea_orm::prelude::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// What an overlay displays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum OverlayType {
    /// A single uploaded PNG or GIF.
    #[sea_orm(string_value = "image")]
    Image,
    /// A registered widget selected by `component_name`.
    #[sea_orm(string_value = "component")]
    #[serde(alias = "react-component")]
    Component,
}

impl OverlayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayType::Image => "image",
            OverlayType::Component => "component",
        }
    }
}

impl fmt::Display for OverlayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "image" => Ok(OverlayType::Image),
            "component" | "react-component" => Ok(OverlayType::Component),
            other => Err(format!("unknown overlay type: {other}")),
        }
    }
}

/// Kind of mutation carried by a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}
