use super::{param_text, Widget};
use crate::templates::PULA_TILE;
use serde_json::{json, Map, Value as Json};

/// Team whose tile is wider and whose caption is letter-spaced.
const GENERAL_TEAM: &str = "ogolna";
/// Team name that renders an empty spacer instead of a tile.
const SPACER_TEAM: &str = "space-waster";

/// Quiz-show prize pool tile: one team's pool (`pula`) under an optional
/// caption (`opis`).
///
/// Parameters: `nazwaDruzyny`, `pula`, `opis`, `customWidth`,
/// `customOpisHeight`, `customOpisClasses`, `customKwotaFontSize`,
/// `customClasses`.
pub struct PulaTile;

impl PulaTile {
    pub const NAME: &'static str = "PulaTile";
}

impl Widget for PulaTile {
    fn template(&self) -> &str {
        PULA_TILE
    }

    fn context(&self, parameters: &Map<String, Json>) -> Json {
        let text = |key| param_text(parameters, key).unwrap_or_default();
        let team = text("nazwaDruzyny");
        if team == SPACER_TEAM {
            return json!({ "spacer": true });
        }

        let general = team == GENERAL_TEAM;
        let width = param_text(parameters, "customWidth")
            .unwrap_or_else(|| if general { "28%" } else { "24%" }.into());
        let mut opis_style = String::new();
        if general {
            opis_style.push_str("letter-spacing:4px;");
        }
        if let Some(height) = param_text(parameters, "customOpisHeight") {
            opis_style.push_str(&format!("height:{height};"));
        }

        json!({
            "spacer": false,
            "team": team,
            "width": width,
            "pula": text("pula"),
            "opis": text("opis"),
            "opisStyle": opis_style,
            "customClasses": text("customClasses"),
            "customOpisClasses": text("customOpisClasses"),
            "customKwotaFontSize": text("customKwotaFontSize"),
        })
    }
}
