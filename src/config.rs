use crate::text_metrics::FontSpec;
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Node box sizing. Height has two classes: one line or two lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub min_width: f32,
    pub padding_x: f32,
    pub single_line_height: f32,
    pub two_line_height: f32,
    pub top_font: FontSpec,
    pub bottom_font: FontSpec,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_width: 220.0,
            padding_x: 24.0,
            single_line_height: 56.0,
            two_line_height: 96.0,
            top_font: FontSpec::bold("system-ui", 20.0),
            bottom_font: FontSpec::regular("system-ui", 18.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeLabelConfig {
    pub font: FontSpec,
    pub min_width: f32,
    pub padding_x: f32,
    pub height: f32,
}

impl Default for EdgeLabelConfig {
    fn default() -> Self {
        Self {
            font: FontSpec::regular("system-ui", 14.0),
            min_width: 120.0,
            padding_x: 16.0,
            height: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDirection {
    Right,
    Left,
    Down,
    Up,
}

impl FlowDirection {
    pub fn elk_name(self) -> &'static str {
        match self {
            Self::Right => "RIGHT",
            Self::Left => "LEFT",
            Self::Down => "DOWN",
            Self::Up => "UP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeRouting {
    Orthogonal,
    Polyline,
    Splines,
}

impl EdgeRouting {
    pub fn elk_name(self) -> &'static str {
        match self {
            Self::Orthogonal => "ORTHOGONAL",
            Self::Polyline => "POLYLINE",
            Self::Splines => "SPLINES",
        }
    }
}

/// Global options sent with every layout request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub direction: FlowDirection,
    pub node_spacing: f32,
    pub layer_spacing: f32,
    pub edge_routing: EdgeRouting,
    pub edge_spacing_factor: f32,
    /// Prefer the input order of nodes within a layer when free to choose.
    pub consider_model_order: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            direction: FlowDirection::Right,
            node_spacing: 32.0,
            layer_spacing: 72.0,
            edge_routing: EdgeRouting::Orthogonal,
            edge_spacing_factor: 1.3,
            consider_model_order: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub sizing: SizingConfig,
    pub edge_labels: EdgeLabelConfig,
    pub engine: EngineOptions,
    /// Use the character-width heuristic instead of system fonts.
    pub fast_text_metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
    pub background: String,
    /// Font family written into DOT output.
    pub dot_font_family: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            background: "#FFFFFF".to_string(),
            dot_font_family: "Noto Sans CJK JP".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        let theme = Theme::classic();
        let render = RenderConfig {
            background: theme.background.clone(),
            ..Default::default()
        };
        Self {
            theme,
            layout: LayoutConfig::default(),
            render,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    sizing: Option<SizingFile>,
    edge_labels: Option<EdgeLabelFile>,
    layout: Option<EngineFile>,
    fast_text_metrics: Option<bool>,
    render: Option<RenderFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    primary_color: Option<String>,
    primary_text_color: Option<String>,
    secondary_text_color: Option<String>,
    primary_border_color: Option<String>,
    line_color: Option<String>,
    edge_label_background: Option<String>,
    edge_label_text_color: Option<String>,
    background: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SizingFile {
    min_width: Option<f32>,
    padding_x: Option<f32>,
    single_line_height: Option<f32>,
    two_line_height: Option<f32>,
    top_font: Option<FontSpec>,
    bottom_font: Option<FontSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeLabelFile {
    font: Option<FontSpec>,
    min_width: Option<f32>,
    padding_x: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineFile {
    direction: Option<FlowDirection>,
    node_spacing: Option<f32>,
    layer_spacing: Option<f32>,
    edge_routing: Option<EdgeRouting>,
    edge_spacing_factor: Option<f32>,
    consider_model_order: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderFile {
    width: Option<f32>,
    height: Option<f32>,
    background: Option<String>,
    dot_font_family: Option<String>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parses a JSON (or JSON5) config document and overlays it on the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let parsed: ConfigFile = match serde_json::from_str(contents) {
        Ok(parsed) => parsed,
        Err(json_err) => json5::from_str(contents)
            .map_err(|_| anyhow::anyhow!("invalid config file: {json_err}"))?,
    };
    Ok(apply_config_file(Config::default(), parsed))
}

fn apply_config_file(mut config: Config, parsed: ConfigFile) -> Config {
    if let Some(theme) = parsed.theme.as_deref().and_then(Theme::by_name) {
        config.render.background = theme.background.clone();
        config.theme = theme;
    }

    if let Some(vars) = parsed.theme_variables {
        let theme = &mut config.theme;
        if let Some(v) = vars.font_family {
            theme.font_family = v;
        }
        if let Some(v) = vars.primary_color {
            theme.primary_color = v;
        }
        if let Some(v) = vars.primary_text_color {
            theme.primary_text_color = v;
        }
        if let Some(v) = vars.secondary_text_color {
            theme.secondary_text_color = v;
        }
        if let Some(v) = vars.primary_border_color {
            theme.primary_border_color = v;
        }
        if let Some(v) = vars.line_color {
            theme.line_color = v;
        }
        if let Some(v) = vars.edge_label_background {
            theme.edge_label_background = v;
        }
        if let Some(v) = vars.edge_label_text_color {
            theme.edge_label_text_color = v;
        }
        if let Some(v) = vars.background {
            config.render.background = v.clone();
            theme.background = v;
        }
    }

    if let Some(sizing) = parsed.sizing {
        let target = &mut config.layout.sizing;
        if let Some(v) = sizing.min_width {
            target.min_width = v.max(0.0);
        }
        if let Some(v) = sizing.padding_x {
            target.padding_x = v.max(0.0);
        }
        if let Some(v) = sizing.single_line_height {
            target.single_line_height = v.max(0.0);
        }
        if let Some(v) = sizing.two_line_height {
            target.two_line_height = v.max(0.0);
        }
        if let Some(v) = sizing.top_font {
            target.top_font = v;
        }
        if let Some(v) = sizing.bottom_font {
            target.bottom_font = v;
        }
    }

    if let Some(labels) = parsed.edge_labels {
        let target = &mut config.layout.edge_labels;
        if let Some(v) = labels.font {
            target.font = v;
        }
        if let Some(v) = labels.min_width {
            target.min_width = v.max(0.0);
        }
        if let Some(v) = labels.padding_x {
            target.padding_x = v.max(0.0);
        }
        if let Some(v) = labels.height {
            target.height = v.max(0.0);
        }
    }

    if let Some(engine) = parsed.layout {
        let target = &mut config.layout.engine;
        if let Some(v) = engine.direction {
            target.direction = v;
        }
        if let Some(v) = engine.node_spacing {
            target.node_spacing = v.max(0.0);
        }
        if let Some(v) = engine.layer_spacing {
            target.layer_spacing = v.max(0.0);
        }
        if let Some(v) = engine.edge_routing {
            target.edge_routing = v;
        }
        if let Some(v) = engine.edge_spacing_factor {
            target.edge_spacing_factor = v.max(0.0);
        }
        if let Some(v) = engine.consider_model_order {
            target.consider_model_order = v;
        }
    }

    if let Some(v) = parsed.fast_text_metrics {
        config.layout.fast_text_metrics = v;
    }

    if let Some(render) = parsed.render {
        if let Some(v) = render.width {
            config.render.width = v;
        }
        if let Some(v) = render.height {
            config.render.height = v;
        }
        if let Some(v) = render.background {
            config.render.background = v;
        }
        if let Some(v) = render.dot_font_family {
            config.render.dot_font_family = v;
        }
    }

    config
}
