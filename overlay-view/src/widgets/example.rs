use super::{param_text, Widget};
use crate::templates::EXAMPLE_COMPONENT;
use serde_json::{json, Map, Value as Json};

const DEFAULT_TEXT: &str = "This is an example component";

/// Bordered text box. Parameter `text` overrides the default caption.
pub struct ExampleComponent;

impl ExampleComponent {
    pub const NAME: &'static str = "ExampleComponent";
}

impl Widget for ExampleComponent {
    fn template(&self) -> &str {
        EXAMPLE_COMPONENT
    }

    fn context(&self, parameters: &Map<String, Json>) -> Json {
        json!({ "text": param_text(parameters, "text").unwrap_or_else(|| DEFAULT_TEXT.into()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::Templates;

    fn render(params: Json) -> String {
        let templates = Templates::builtin().unwrap();
        ExampleComponent.render(&templates, params.as_object().unwrap())
    }

    #[test]
    fn test_default_text() {
        let html = render(json!({}));
        assert!(html.contains(DEFAULT_TEXT));
        assert!(html.contains("example-component p-4"));
    }

    #[test]
    fn test_text_parameter_is_escaped() {
        let html = render(json!({"text": "<b>hi</b>"}));
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
    }
}
