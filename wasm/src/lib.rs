use crmviz::{OutputFormat, RenderOptions, render_with_options};
use crmviz::theme::Theme;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagramRenderOptions {
    theme: Option<String>,
    font_family: Option<String>,
    min_node_width: Option<f32>,
    /// Browser builds have no system fonts; text is measured heuristically
    /// unless this is explicitly `false`.
    fast_text: Option<bool>,
}

fn build_render_options(options: DiagramRenderOptions, format: OutputFormat) -> RenderOptions {
    let mut render_options = RenderOptions::new(format);
    if let Some(theme) = options.theme.as_deref().and_then(Theme::by_name) {
        render_options.config.render.background = theme.background.clone();
        render_options.config.theme = theme;
    }
    if let Some(font_family) = options.font_family {
        render_options.config.theme.font_family = font_family;
    }
    if let Some(min_width) = options.min_node_width {
        render_options.config.layout.sizing.min_width = min_width;
    }
    render_options.config.layout.fast_text_metrics = options.fast_text.unwrap_or(true);
    render_options
}

fn render(code: &str, options_json: Option<String>, format: OutputFormat) -> Result<String, JsValue> {
    let options = if let Some(raw_options) = options_json {
        serde_json::from_str::<DiagramRenderOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?
    } else {
        DiagramRenderOptions::default()
    };
    render_with_options(code, build_render_options(options, format))
        .map_err(|error| JsValue::from_str(&error.to_string()))
}

#[wasm_bindgen]
pub fn render_drawio(code: &str, options_json: Option<String>) -> Result<String, JsValue> {
    render(code, options_json, OutputFormat::Drawio)
}

#[wasm_bindgen]
pub fn render_svg(code: &str, options_json: Option<String>) -> Result<String, JsValue> {
    render(code, options_json, OutputFormat::Svg)
}

#[wasm_bindgen]
pub fn layout_json(code: &str, options_json: Option<String>) -> Result<String, JsValue> {
    render(code, options_json, OutputFormat::Json)
}

#[cfg(test)]
mod tests {
    use crmviz::render_with_options;

    use crate::{DiagramRenderOptions, OutputFormat, build_render_options};

    #[test]
    fn renders_drawio_with_edge_labels() {
        let code = r#"
A "E21 Person|Alice"
B "E53 Place|Tokyo"
A -> B : P74 has residence
B -> A : P53i is former or current location of
"#;
        let xml = render_with_options(
            code,
            build_render_options(DiagramRenderOptions::default(), OutputFormat::Drawio),
        )
        .expect("diagram should render");

        assert!(xml.contains("<mxfile"));
        assert!(xml.contains("P74 has residence"));
        assert!(xml.contains("E21 Person&#xa;Alice"));
    }

    #[test]
    fn options_override_defaults() {
        let options: DiagramRenderOptions =
            serde_json::from_str(r#"{"theme":"modern","minNodeWidth":300}"#).unwrap();
        let render_options = build_render_options(options, OutputFormat::Svg);
        assert_eq!(render_options.config.layout.sizing.min_width, 300.0);
        assert!(render_options.config.layout.fast_text_metrics);
    }
}
