//! Public viewer: resolves the active overlay and renders it.

use crate::{
    sync::LiveProjection,
    templates::{Templates, VIEWER_IMAGE, VIEWER_MESSAGE, VIEWER_WIDGET},
    widgets::WidgetRegistry,
};
use async_trait::async_trait;
use overlay_error::StorageResult;
use overlay_models::{
    constants::{INACTIVE_MESSAGE, LOADING_MESSAGE, MISSING_IMAGE_MESSAGE},
    domain::prelude::{AssetField, AssetUrlOptions, OverlayQuery, OverlayRecord},
    enums::overlay::OverlayType,
    OverlayStore,
};
use serde_json::{json, Map, Value as Json};
use std::sync::Arc;

/// What the viewer currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerState {
    Loading,
    Inactive,
    Image { url: String, alt: String },
    Widget { name: String, parameters: Map<String, Json> },
    ComponentNotFound { name: String },
    MissingImage,
}

/// Result of one resolution: the active record, if any, plus its image URL.
#[derive(Debug, Clone, Default)]
pub struct ViewerSnapshot {
    pub record: Option<OverlayRecord>,
    pub image_url: Option<String>,
}

pub struct Viewer {
    registry: Arc<WidgetRegistry>,
    templates: Arc<Templates>,
    state: ViewerState,
}

impl Viewer {
    pub fn new(registry: Arc<WidgetRegistry>, templates: Arc<Templates>) -> Self {
        Self {
            registry,
            templates,
            state: ViewerState::Loading,
        }
    }

    /// Find the overlay to show.
    ///
    /// Newest `updated_at` wins if several records are active at once.
    pub async fn resolve(store: &dyn OverlayStore) -> StorageResult<ViewerSnapshot> {
        let record = store
            .list(&OverlayQuery::active_newest_first())
            .await?
            .into_iter()
            .next();
        let image_url = record.as_ref().and_then(|record| {
            store.asset_url(record, AssetField::Image, &AssetUrlOptions::default())
        });
        Ok(ViewerSnapshot { record, image_url })
    }

    /// Map a resolution onto a render state.
    pub fn dispatch(&self, snapshot: ViewerSnapshot) -> ViewerState {
        let Some(record) = snapshot.record else {
            return ViewerState::Inactive;
        };
        match record.overlay_type {
            OverlayType::Image => match snapshot.image_url {
                Some(url) => ViewerState::Image {
                    url,
                    alt: record.short_description,
                },
                None => ViewerState::MissingImage,
            },
            OverlayType::Component => {
                if self.registry.contains(&record.component_name) {
                    ViewerState::Widget {
                        parameters: record.parameters_map(),
                        name: record.component_name,
                    }
                } else {
                    ViewerState::ComponentNotFound {
                        name: record.component_name,
                    }
                }
            }
        }
    }

    #[inline]
    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    /// HTML fragment for the current state.
    pub fn render(&self) -> String {
        match &self.state {
            ViewerState::Loading => self.message("overlay-message", LOADING_MESSAGE),
            ViewerState::Inactive => self.message("overlay-message", INACTIVE_MESSAGE),
            ViewerState::Image { url, alt } => self
                .templates
                .render(VIEWER_IMAGE, &json!({ "url": url, "alt": alt })),
            ViewerState::Widget { name, parameters } => match self.registry.resolve(name) {
                Some(widget) => {
                    let body = widget.render(&self.templates, parameters);
                    self.templates
                        .render(VIEWER_WIDGET, &json!({ "name": name, "body": body }))
                }
                None => self.not_found(name),
            },
            ViewerState::ComponentNotFound { name } => self.not_found(name),
            ViewerState::MissingImage => self.message("overlay-error", MISSING_IMAGE_MESSAGE),
        }
    }

    fn message(&self, class: &str, text: &str) -> String {
        self.templates
            .render(VIEWER_MESSAGE, &json!({ "class": class, "text": text }))
    }

    fn not_found(&self, name: &str) -> String {
        self.message("overlay-error", &format!("component not found: {name}"))
    }
}

#[async_trait]
impl LiveProjection for Viewer {
    type Snapshot = ViewerSnapshot;

    async fn fetch(store: &dyn OverlayStore) -> StorageResult<ViewerSnapshot> {
        Viewer::resolve(store).await
    }

    fn replace(&mut self, snapshot: ViewerSnapshot) {
        self.state = self.dispatch(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use overlay_models::constants::PNG_SIGNATURE;
    use overlay_models::domain::prelude::{NewImage, NewOverlay, OverlayPatch};
    use serde_json::json;

    fn viewer() -> Viewer {
        Viewer::new(
            Arc::new(WidgetRegistry::builtin()),
            Arc::new(Templates::builtin().unwrap()),
        )
    }

    async fn resolved(store: &MemoryStore) -> Viewer {
        let mut viewer = viewer();
        let snapshot = Viewer::resolve(store).await.unwrap();
        viewer.replace(snapshot);
        viewer
    }

    fn cheer() -> NewOverlay {
        NewOverlay::image(
            "Cheer",
            NewImage {
                file_name: "cheer.png".into(),
                mime: "image/png".into(),
                bytes: [&PNG_SIGNATURE[..], b"IHDR".as_slice()].concat(),
            },
        )
    }

    #[test]
    fn test_loading_before_first_resolution() {
        let viewer = viewer();
        assert_eq!(viewer.state(), &ViewerState::Loading);
        assert!(viewer.render().contains("Loading overlay…"));
    }

    #[tokio::test]
    async fn test_no_active_overlay() {
        let store = MemoryStore::new();
        store.create(cheer()).await.unwrap();
        let viewer = resolved(&store).await;
        assert_eq!(viewer.state(), &ViewerState::Inactive);
        assert!(viewer.render().contains("No active overlay"));
    }

    #[tokio::test]
    async fn test_cheer_scenario() {
        let store = MemoryStore::new();
        let cheer = store.create(cheer()).await.unwrap();
        assert!(!cheer.active);

        store.update(cheer.id, OverlayPatch::activate()).await.unwrap();
        let viewer = resolved(&store).await;
        match viewer.state() {
            ViewerState::Image { url, alt } => {
                assert!(url.starts_with(&format!("/files/overlays/{}/cheer.png", cheer.id)));
                assert_eq!(alt, "Cheer");
            }
            other => panic!("unexpected state: {other:?}"),
        }
        let html = viewer.render();
        assert!(html.contains("object-fit:contain"));
        assert!(html.contains(r#"alt="Cheer""#));

        store.update(cheer.id, OverlayPatch::deactivate()).await.unwrap();
        assert_eq!(resolved(&store).await.state(), &ViewerState::Inactive);
    }

    #[tokio::test]
    async fn test_missing_component() {
        let store = MemoryStore::new();
        let missing = store.create(NewOverlay::component("Ghost", "Missing")).await.unwrap();
        store.update(missing.id, OverlayPatch::activate()).await.unwrap();

        let viewer = resolved(&store).await;
        assert_eq!(
            viewer.state(),
            &ViewerState::ComponentNotFound {
                name: "Missing".into()
            }
        );
        assert!(viewer.render().contains("component not found: Missing"));
    }

    #[tokio::test]
    async fn test_widget_receives_parameters() {
        let store = MemoryStore::new();
        let mut payload = NewOverlay::component("Hello", "ExampleComponent");
        payload.parameters = json!({"text": "Hello stream"}).as_object().unwrap().clone();
        let record = store.create(payload).await.unwrap();
        store.update(record.id, OverlayPatch::activate()).await.unwrap();

        let viewer = resolved(&store).await;
        let html = viewer.render();
        assert!(html.contains(r#"data-widget="ExampleComponent""#));
        assert!(html.contains("Hello stream"));
    }

    #[tokio::test]
    async fn test_newest_active_wins() {
        let store = MemoryStore::new();
        let a = store.create(NewOverlay::component("A", "ExampleComponent")).await.unwrap();
        let b = store.create(NewOverlay::component("B", "PulaTile")).await.unwrap();
        store.force_active(a.id, 10);
        store.force_active(b.id, -10);

        let viewer = resolved(&store).await;
        match viewer.state() {
            ViewerState::Widget { name, .. } => assert_eq!(name, "ExampleComponent"),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pula_tile_overlay_renders() {
        let store = MemoryStore::new();
        let mut payload = NewOverlay::component("Pula ogolna", "PulaTile");
        payload.parameters = json!({"nazwaDruzyny": "ogolna", "pula": 12000, "opis": "PULA"})
            .as_object()
            .unwrap()
            .clone();
        let record = store.create(payload).await.unwrap();
        store.update(record.id, OverlayPatch::activate()).await.unwrap();

        let viewer = resolved(&store).await;
        assert!(matches!(viewer.state(), ViewerState::Widget { name, .. } if name == "PulaTile"));
        let html = viewer.render();
        assert!(html.contains(r#"data-widget="PulaTile""#));
        assert!(html.contains("<p>12000</p>"));
        assert!(html.contains("ogolna-pula"));
        assert!(!html.contains("component not found"));
    }

    #[test]
    fn test_widget_markup_is_not_double_escaped() {
        let mut viewer = viewer();
        viewer.replace(ViewerSnapshot::default());
        assert_eq!(viewer.state(), &ViewerState::Inactive);

        let params = json!({"text": "Tom & Jerry"}).as_object().unwrap().clone();
        viewer.state = ViewerState::Widget {
            name: "ExampleComponent".into(),
            parameters: params,
        };
        let html = viewer.render();
        assert!(html.contains(r#"<div class="example-component"#));
        assert!(html.contains("Tom &amp; Jerry"));
        assert!(!html.contains("&amp;amp;"));
    }

    #[test]
    fn test_image_without_asset() {
        let viewer = viewer();
        let record = OverlayRecord {
            id: 1,
            short_description: "Broken".into(),
            overlay_type: OverlayType::Image,
            component_name: String::new(),
            image: None,
            image_mime: None,
            active: true,
            parameters: json!({}),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let state = viewer.dispatch(ViewerSnapshot {
            record: Some(record),
            image_url: None,
        });
        assert_eq!(state, ViewerState::MissingImage);
    }
}
