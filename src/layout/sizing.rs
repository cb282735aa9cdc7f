use crate::config::{EdgeLabelConfig, SizingConfig};
use crate::ir::Node;
use crate::text_metrics::TextMeasurer;

use super::Size;

/// Minimum box for a node: widest line plus padding, never narrower than the
/// configured minimum, and one of two fixed heights.
pub fn size_node(node: &Node, measurer: &dyn TextMeasurer, config: &SizingConfig) -> Size {
    let top_width = measurer.text_width(&node.top, &config.top_font);
    let (bottom_width, height) = match node.bottom.as_deref() {
        Some(bottom) => (
            measurer.text_width(bottom, &config.bottom_font),
            config.two_line_height,
        ),
        None => (0.0, config.single_line_height),
    };
    let content = top_width.max(bottom_width).max(0.0).ceil();
    Size {
        width: config.min_width.max(content + config.padding_x),
        height: height.max(0.0),
    }
}

/// Box reserved for an edge label on the route.
pub fn size_edge_label(label: &str, measurer: &dyn TextMeasurer, config: &EdgeLabelConfig) -> Size {
    let text_width = measurer.text_width(label, &config.font).max(0.0).ceil();
    Size {
        width: config.min_width.max(text_width + config.padding_x),
        height: config.height.max(0.0),
    }
}
