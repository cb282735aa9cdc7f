#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dot;
pub mod drawio;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod parser;
pub mod render;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, load_config};
pub use ir::{Edge, Graph, Node};
pub use layout::{
    ElkProcessEngine, LaidOutGraph, LayeredEngine, LayoutEngine, LayoutError, LayoutSession,
};
pub use parser::{parse_dsl, parse_dsl_with_diagnostics};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Drawio,
    Json,
    Svg,
    Png,
    Dot,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Drawio => "drawio",
            OutputFormat::Json => "json",
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Dot => "dot",
        }
    }

    /// Whether the format needs geometry from a layout pass.
    pub fn needs_layout(self) -> bool {
        !matches!(self, OutputFormat::Dot)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub config: Config,
    pub format: OutputFormat,
}

impl RenderOptions {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            config: Config::default(),
            format,
        }
    }

    pub fn with_fast_text_metrics(mut self) -> Self {
        self.config.layout.fast_text_metrics = true;
        self
    }
}

/// Serializes a laid-out graph as one of the text formats. PNG is binary and
/// goes through [`render::write_output_png`] instead.
pub fn render_text(
    graph: &Graph,
    layout: &LaidOutGraph,
    format: OutputFormat,
    config: &Config,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Drawio => Ok(drawio::to_drawio_xml(&drawio::DrawioGraph::from_layout(
            graph, layout,
        ))),
        OutputFormat::Json => layout_dump::to_json(layout),
        OutputFormat::Svg => Ok(render::render_svg(layout, &config.theme, &config.layout)),
        OutputFormat::Dot => Ok(dot::to_dot(graph, &config.render.dot_font_family)),
        OutputFormat::Png => anyhow::bail!("PNG output is binary; write it to a file"),
    }
}

/// Parses `dsl`, lays it out with the built-in engine and renders it.
pub fn render_with_options(dsl: &str, options: RenderOptions) -> anyhow::Result<String> {
    let graph = parse_dsl(dsl);
    if !options.format.needs_layout() {
        return render_text(&graph, &LaidOutGraph::default(), options.format, &options.config);
    }
    let mut session = LayoutSession::new(LayeredEngine::new(), options.config.layout.clone());
    let layout = futures::executor::block_on(session.layout(&graph))?;
    render_text(&graph, &layout, options.format, &options.config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSL: &str = r#"
E21 "E21 Person|Alice"
E53 "E53 Place|Tokyo"
E21 -> E53 : P74 has residence
"#;

    #[test]
    fn renders_every_text_format() {
        for format in [
            OutputFormat::Drawio,
            OutputFormat::Json,
            OutputFormat::Svg,
            OutputFormat::Dot,
        ] {
            let out = render_with_options(DSL, RenderOptions::new(format).with_fast_text_metrics())
                .unwrap();
            assert!(out.contains("E21"), "{format:?} output lacks node text");
        }
    }

    #[test]
    fn png_is_not_a_text_format() {
        let result = render_with_options(DSL, RenderOptions::new(OutputFormat::Png).with_fast_text_metrics());
        assert!(result.is_err());
    }
}
