use crate::config::{LayoutConfig, RenderConfig};
use crate::layout::{LaidOutEdge, LaidOutGraph, LaidOutNode, Point};
use crate::theme::Theme;
use anyhow::Result;
use std::path::Path;

pub fn render_svg(layout: &LaidOutGraph, theme: &Theme, config: &LayoutConfig) -> String {
    let mut svg = String::new();
    let width = layout.width.max(1.0);
    let height = layout.height.max(1.0);

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));

    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        theme.background
    ));

    svg.push_str("<defs>");
    svg.push_str(&format!(
        "<marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"8\" markerHeight=\"8\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{}\"/></marker>",
        theme.line_color
    ));
    svg.push_str("</defs>");

    for edge in &layout.edges {
        svg.push_str(&edge_svg(edge, theme));
    }

    for node in &layout.nodes {
        svg.push_str(&node_svg(node, theme, config));
    }

    for edge in &layout.edges {
        if let Some(label) = &edge.label_box {
            svg.push_str(&format!(
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"4\" ry=\"4\" fill=\"{}\"/>",
                label.x, label.y, label.width, label.height, theme.edge_label_background
            ));
            svg.push_str(&format!(
                "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
                label.x + label.width / 2.0,
                label.y + label.height / 2.0,
                escape_xml(&theme.font_family),
                config.edge_labels.font.size,
                theme.edge_label_text_color,
                escape_xml(&label.text)
            ));
        }
    }

    svg.push_str("</svg>");
    svg
}

fn edge_svg(edge: &LaidOutEdge, theme: &Theme) -> String {
    if edge.points.len() < 2 {
        return String::new();
    }
    format!(
        "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.4\" marker-end=\"url(#arrow)\"/>",
        points_to_path(&edge.points),
        theme.line_color
    )
}

fn node_svg(node: &LaidOutNode, theme: &Theme, config: &LayoutConfig) -> String {
    let mut out = format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1.4\"/>",
        node.x, node.y, node.width, node.height, theme.primary_color, theme.primary_border_color
    );
    let center_x = node.x + node.width / 2.0;
    let family = escape_xml(&theme.font_family);
    let top_font = &config.sizing.top_font;
    let weight = if top_font.weight == crate::text_metrics::FontWeight::Bold {
        "bold"
    } else {
        "normal"
    };

    match &node.bottom {
        Some(bottom) => {
            let divider = node.y + node.height / 2.0;
            out.push_str(&format!(
                "<line x1=\"{:.2}\" y1=\"{divider:.2}\" x2=\"{:.2}\" y2=\"{divider:.2}\" stroke=\"{}\" stroke-width=\"1\"/>",
                node.x,
                node.x + node.width,
                theme.primary_border_color
            ));
            out.push_str(&format!(
                "<text x=\"{center_x:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{family}\" font-size=\"{}\" font-weight=\"{weight}\" fill=\"{}\">{}</text>",
                node.y + node.height / 4.0,
                top_font.size,
                theme.primary_text_color,
                escape_xml(&node.top)
            ));
            out.push_str(&format!(
                "<text x=\"{center_x:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{family}\" font-size=\"{}\" fill=\"{}\">{}</text>",
                node.y + node.height * 0.75,
                config.sizing.bottom_font.size,
                theme.secondary_text_color,
                escape_xml(bottom)
            ));
        }
        None => {
            out.push_str(&format!(
                "<text x=\"{center_x:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{family}\" font-size=\"{}\" font-weight=\"{weight}\" fill=\"{}\">{}</text>",
                node.y + node.height / 2.0,
                top_font.size,
                theme.primary_text_color,
                escape_xml(&node.top)
            ));
        }
    }
    out
}

fn points_to_path(points: &[Point]) -> String {
    let mut d = String::new();
    for (idx, point) in points.iter().enumerate() {
        let cmd = if idx == 0 { "M" } else { " L" };
        d.push_str(&format!("{cmd} {:.2} {:.2}", point.x, point.y));
    }
    d
}

#[cfg(feature = "png")]
pub fn write_output_png(
    svg: &str,
    output: &Path,
    render_cfg: &RenderConfig,
    theme: &Theme,
) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = primary_family(&theme.font_family);
    opt.default_size = usvg::Size::from_wh(render_cfg.width, render_cfg.height)
        .or_else(|| usvg::Size::from_wh(800.0, 600.0))
        .ok_or_else(|| anyhow::anyhow!("Invalid default canvas size"))?;
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

/// First entry of a CSS font-family list, unquoted.
#[cfg_attr(not(feature = "png"), allow(dead_code))]
fn primary_family(list: &str) -> String {
    list.split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\''))
        .find(|part| !part.is_empty())
        .unwrap_or("sans-serif")
        .to_string()
}

#[cfg(not(feature = "png"))]
pub fn write_output_png(
    _svg: &str,
    _output: &Path,
    _render_cfg: &RenderConfig,
    _theme: &Theme,
) -> Result<()> {
    anyhow::bail!("PNG output requires the `png` feature")
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
