//! Handlebars registry shared by the viewer, the widgets and the admin panel.
//!
//! Every fragment the server sends to a browser is a registered template.
//! Values are HTML-escaped by handlebars; only the viewer's widget slot
//! uses a triple-stash, because it embeds another rendered template.

pub use handlebars::TemplateError;

use handlebars::Handlebars;
use serde::Serialize;
use tracing::error;

pub const VIEWER_MESSAGE: &str = "viewer_message";
pub const VIEWER_IMAGE: &str = "viewer_image";
pub const VIEWER_WIDGET: &str = "viewer_widget";
pub const ADMIN_PANEL: &str = "admin_panel";
/// Used as a partial by [`ADMIN_PANEL`].
pub const ADMIN_ROW: &str = "admin_row";
pub const EXAMPLE_COMPONENT: &str = "widget_example_component";
pub const PULA_TILE: &str = "widget_pula_tile";

const BUILTIN: [(&str, &str); 7] = [
    (VIEWER_MESSAGE, include_str!("../templates/viewer/message.hbs")),
    (VIEWER_IMAGE, include_str!("../templates/viewer/image.hbs")),
    (VIEWER_WIDGET, include_str!("../templates/viewer/widget.hbs")),
    (ADMIN_PANEL, include_str!("../templates/admin/panel.hbs")),
    (ADMIN_ROW, include_str!("../templates/admin/row.hbs")),
    (EXAMPLE_COMPONENT, include_str!("../templates/widgets/example_component.hbs")),
    (PULA_TILE, include_str!("../templates/widgets/pula_tile.hbs")),
];

pub struct Templates {
    handlebars: Handlebars<'static>,
}

impl Templates {
    /// Registry holding every fragment template that ships with the service.
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut templates = Self {
            handlebars: Handlebars::new(),
        };
        for (name, source) in BUILTIN {
            templates.register(name, source)?;
        }
        Ok(templates)
    }

    /// Register (or replace) a template. Trailing whitespace of the source is dropped.
    pub fn register(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        self.handlebars.register_template_string(name, source.trim_end())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    /// Render `name` against `data`. Failures are logged and yield an empty fragment.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> String {
        self.handlebars
            .render(name, data)
            .map_err(|e| error!(template = name, "Failed to render template: {e}"))
            .unwrap_or_default()
    }
}
