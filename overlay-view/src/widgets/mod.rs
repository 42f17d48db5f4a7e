//! Widgets and the registry the viewer dispatches through.
//!
//! The registry is an explicit name → factory table filled at startup.
//! Names are matched exactly and case-sensitively; an unknown name is an
//! ordinary render outcome, not an error.

mod example;
mod pula_tile;

pub use example::ExampleComponent;
pub use pula_tile::PulaTile;

use crate::templates::Templates;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// A renderable overlay unit. Parameters come from the overlay record.
pub trait Widget: Send + Sync {
    /// Name of the registered template holding the widget's markup.
    fn template(&self) -> &str;

    /// Template context built from the overlay parameters.
    fn context(&self, parameters: &Map<String, Json>) -> Json;

    fn render(&self, templates: &Templates, parameters: &Map<String, Json>) -> String {
        templates.render(self.template(), &self.context(parameters))
    }
}

pub type WidgetFactory = fn() -> Box<dyn Widget>;

#[derive(Clone, Default)]
pub struct WidgetRegistry {
    factories: BTreeMap<String, WidgetFactory>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every widget that ships with the service.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ExampleComponent::NAME, || Box::new(ExampleComponent));
        registry.register(PulaTile::NAME, || Box::new(PulaTile));
        registry
    }

    /// Register a widget, returning the factory it replaced.
    pub fn register(&mut self, name: impl Into<String>, factory: WidgetFactory) -> Option<WidgetFactory> {
        self.factories.insert(name.into(), factory)
    }

    pub fn resolve(&self, name: &str) -> Option<Box<dyn Widget>> {
        self.factories.get(name).map(|factory| factory())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

/// Read a parameter as text. Numbers and booleans are rendered, everything else is skipped.
pub(crate) fn param_text(parameters: &Map<String, Json>, key: &str) -> Option<String> {
    match parameters.get(key)? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Hello;

    impl Widget for Hello {
        fn template(&self) -> &str {
            "hello"
        }

        fn context(&self, parameters: &Map<String, Json>) -> Json {
            json!({ "who": param_text(parameters, "who").unwrap_or_else(|| "world".into()) })
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = WidgetRegistry::builtin();
        assert_eq!(registry.names(), vec!["ExampleComponent", "PulaTile"]);
    }

    #[test]
    fn test_builtin_widgets_have_templates() {
        let registry = WidgetRegistry::builtin();
        let templates = Templates::builtin().unwrap();
        for name in registry.names() {
            let widget = registry.resolve(name).unwrap();
            assert!(templates.contains(widget.template()), "{name} has no template");
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = WidgetRegistry::builtin();
        assert!(registry.resolve("ExampleComponent").is_some());
        assert!(registry.resolve("examplecomponent").is_none());
        assert!(registry.resolve("pulatile").is_none());
        assert!(registry.resolve("Missing").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = WidgetRegistry::new();
        assert!(registry.register("Hello", || Box::new(Hello)).is_none());
        assert!(registry.register("Hello", || Box::new(Hello)).is_some());

        let mut templates = Templates::builtin().unwrap();
        templates.register("hello", "hello {{who}}").unwrap();
        let widget = registry.resolve("Hello").unwrap();
        assert_eq!(widget.render(&templates, &Map::new()), "hello world");
    }

    #[test]
    fn test_param_text() {
        let params = json!({"a": "x", "n": 3, "b": true, "o": {}});
        let params = params.as_object().unwrap();
        assert_eq!(param_text(params, "a").as_deref(), Some("x"));
        assert_eq!(param_text(params, "n").as_deref(), Some("3"));
        assert_eq!(param_text(params, "b").as_deref(), Some("true"));
        assert_eq!(param_text(params, "o"), None);
        assert_eq!(param_text(params, "missing"), None);
    }
}
