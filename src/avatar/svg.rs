//! SVG avatar output

use crate::color::Rgb;

use super::Style;

fn rgb(color: Rgb) -> String {
    format!("rgb({},{},{})", color.r, color.g, color.b)
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn font_size(side: u32, text: &str) -> u32 {
    let base = side as f64 * 0.6;
    let scaled = match text.chars().count() {
        1 => base,
        2 => base * 0.72,
        _ => base * 0.63,
    };
    scaled as u32
}

/// Builds the SVG document for an avatar.
///
/// A gradient fill is emitted only when the style asks for one and the
/// endpoints actually differ; everything else renders as a solid `rect`.
pub fn render_svg(
    side: u32,
    bg1: Rgb,
    bg2: Rgb,
    text: &str,
    corner_radius: u32,
    text_color: Rgb,
    style: Style,
) -> String {
    let text_svg = if text.is_empty() {
        String::new()
    } else {
        format!(
            r#"
	<text
		x="50%"
		y="50%"
		text-anchor="middle"
		dominant-baseline="central"
		font-family="Inter, system-ui, -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif"
		font-weight="600"
		font-size="{size}"
		fill="{fill}"
		letter-spacing="-0.03em"
	>{content}</text>"#,
            size = font_size(side, text),
            fill = rgb(text_color),
            content = escape_text(text),
        )
    };

    if style == Style::Gradient && bg1 != bg2 {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<svg width="{side}" height="{side}" viewBox="0 0 {side} {side}" xmlns="http://www.w3.org/2000/svg">
	<defs>
		<linearGradient id="gradient" x1="1" y1="1" x2="0" y2="0">
			<stop offset="0%" stop-color="{start}" />
			<stop offset="100%" stop-color="{end}" />
		</linearGradient>
	</defs>
	<rect width="{side}" height="{side}" rx="{rx}" ry="{rx}" fill="url(#gradient)" />
	{text_svg}
</svg>"#,
            start = rgb(bg1),
            end = rgb(bg2),
            rx = corner_radius,
        )
    } else {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<svg width="{side}" height="{side}" viewBox="0 0 {side} {side}" xmlns="http://www.w3.org/2000/svg">
	<rect width="{side}" height="{side}" rx="{rx}" ry="{rx}" fill="{fill}" />
	{text_svg}
</svg>"#,
            rx = corner_radius,
            fill = rgb(bg1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_svg_has_plain_rect() {
        let doc = render_svg(
            64,
            Rgb::new(10, 20, 30),
            Rgb::new(10, 20, 30),
            "AB",
            0,
            Rgb::WHITE,
            Style::Solid,
        );
        assert!(doc.contains(r#"fill="rgb(10,20,30)""#));
        assert!(!doc.contains("linearGradient"));
        assert!(doc.contains(">AB</text>"));
    }

    #[test]
    fn gradient_svg_has_both_stops() {
        let doc = render_svg(
            64,
            Rgb::new(1, 2, 3),
            Rgb::new(4, 5, 6),
            "X",
            8,
            Rgb::WHITE,
            Style::Gradient,
        );
        assert!(doc.contains(r#"stop-color="rgb(1,2,3)""#));
        assert!(doc.contains(r#"stop-color="rgb(4,5,6)""#));
        assert!(doc.contains(r#"rx="8""#));
    }

    #[test]
    fn text_is_escaped() {
        let doc = render_svg(
            64,
            Rgb::BLACK,
            Rgb::BLACK,
            "<&>",
            0,
            Rgb::WHITE,
            Style::Solid,
        );
        assert!(doc.contains("&lt;&amp;&gt;"));
    }

    #[test]
    fn empty_text_omits_text_node() {
        let doc = render_svg(64, Rgb::BLACK, Rgb::BLACK, "", 0, Rgb::WHITE, Style::Solid);
        assert!(!doc.contains("<text"));
    }
}
