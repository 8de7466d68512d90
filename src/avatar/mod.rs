//! Deterministic avatar renderer
//!
//! `render(seed, options, fonts)` is a pure function from a seed string and
//! a validated option set to encoded image bytes plus a MIME type. The
//! raster path paints an RGBA canvas pixel by pixel (diagonal gradient,
//! circular corner mask) and lays initials out with real font metrics; the
//! vector path emits an equivalent SVG document.

mod svg;

use std::collections::HashMap;

use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont};
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::{info, warn};

use crate::color::{self, Palette, Rgb};
use crate::errors::AppError;

/// Hard bounds for the generated image edge length.
pub const MIN_SIZE: u32 = 16;
pub const MAX_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Svg,
}

impl OutputFormat {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Gradient,
    Soft,
    Solid,
}

/// Validated render options.
///
/// Built from the raw query string: unknown keys are ignored and invalid
/// values fall back to defaults, so any query produces a renderable set.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub style: Style,
    pub palette: Palette,
    pub initials: Option<String>,
    pub initials_source: Option<String>,
    pub size: u32,
    pub background: Option<Rgb>,
    pub text_color: Option<String>,
    pub corner_radius: f64,
}

impl RenderOptions {
    pub fn from_query(query: &HashMap<String, String>, default_size: u32) -> Self {
        let get = |key: &str| query.get(key).map(String::as_str).unwrap_or("");

        let format = if get("format") == "svg" || get("type") == "svg" {
            OutputFormat::Svg
        } else {
            OutputFormat::Png
        };

        let (style, palette) = match get("theme") {
            "" => (Style::Solid, Palette::Vivid),
            theme => {
                let mut parts = theme.splitn(2, '/');
                let style = match parts.next().unwrap_or("") {
                    "gradient" => Style::Gradient,
                    "soft" => Style::Soft,
                    _ => Style::Solid,
                };
                let palette = Palette::parse(parts.next().unwrap_or(""));
                (style, palette)
            }
        };

        let initials = match get("initials") {
            "" | "auto" => None,
            explicit => Some(explicit.to_string()),
        };
        let initials_source = match get("iName") {
            "" => None,
            name => Some(name.to_string()),
        };

        let size_raw = match get("size") {
            "" => get("w"),
            v => v,
        };
        let size = match size_raw.parse::<i64>() {
            Ok(v) if v >= 0 => (v as u32).clamp(MIN_SIZE, MAX_SIZE),
            _ => default_size.clamp(MIN_SIZE, MAX_SIZE),
        };

        let background = query.get("bg").and_then(|v| color::parse_color(v));
        let text_color = match get("color") {
            "" => None,
            v => Some(v.to_string()),
        };

        let corner_radius = match get("rounded") {
            "" => 0.0,
            "true" => size as f64 / 16.0,
            raw => match raw.parse::<i64>() {
                Ok(v) => {
                    let v = v.clamp(0, 50) as f64;
                    size as f64 * v / 100.0
                }
                Err(_) => 0.0,
            },
        };

        Self {
            format,
            style,
            palette,
            initials,
            initials_source,
            size,
            background,
            text_color,
            corner_radius,
        }
    }

    pub fn defaults(default_size: u32) -> Self {
        Self::from_query(&HashMap::new(), default_size)
    }
}

/// Font face loaded once at startup and shared by every render.
pub struct FontStore {
    face: Option<FontVec>,
}

impl FontStore {
    /// Loads the configured font file. A missing or unparsable font is not
    /// fatal: raster avatars are then rendered without initials.
    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path else {
            warn!("no font configured, raster avatars will omit initials");
            return Self { face: None };
        };

        match std::fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(face) => {
                    info!("loaded avatar font from {path}");
                    Self { face: Some(face) }
                }
                Err(e) => {
                    warn!("failed to parse font {path}: {e}, rendering without initials");
                    Self { face: None }
                }
            },
            Err(e) => {
                warn!("failed to read font {path}: {e}, rendering without initials");
                Self { face: None }
            }
        }
    }

    pub fn face(&self) -> Option<&FontVec> {
        self.face.as_ref()
    }
}

/// Derives up to two uppercase initials from a name.
///
/// First code point of the first two whitespace-separated tokens; when the
/// name has no tokens, the first code point of the whole string.
pub fn initials_for(name: &str) -> String {
    let mut initials = String::new();
    for word in name.split_whitespace() {
        if let Some(c) = word.chars().next() {
            initials.extend(c.to_uppercase());
        }
        if initials.chars().count() >= 2 {
            break;
        }
    }

    if initials.is_empty() {
        if let Some(c) = name.chars().next() {
            initials.extend(c.to_uppercase());
        }
    }

    initials
}

/// Font pixel size for a given image side and initials length.
fn font_px(side: u32, text: &str) -> f32 {
    let base = side as f32 * 0.6;
    match text.chars().count() {
        1 => base,
        2 => base * 0.72,
        _ => base * 0.63,
    }
}

/// Renders the avatar for `seed`.
pub fn render(
    seed: &str,
    opts: &RenderOptions,
    fonts: &FontStore,
) -> Result<(Bytes, &'static str), AppError> {
    let initials = match &opts.initials {
        Some(explicit) => explicit.clone(),
        None => initials_for(opts.initials_source.as_deref().unwrap_or(seed)),
    };

    // Background pair + text color per style
    let (mut bg1, mut bg2, mut text_color) = match opts.style {
        Style::Soft => {
            let base = match opts.palette {
                Palette::Vivid => color::gradient(seed, Palette::Vivid).0,
                palette => color::palette_color(seed, palette),
            };
            let pair = color::make_soft(base);
            let bg2 = color::soft_darken(pair.background, 0.05);
            (pair.background, bg2, pair.text)
        }
        Style::Gradient => {
            let (c1, c2) = color::gradient(seed, opts.palette);
            let text = color::contrast_text(c1, c2, true, None);
            (c1, c2, text)
        }
        Style::Solid => {
            let c = color::palette_color(seed, opts.palette);
            let text = color::contrast_text(c, c, false, None);
            (c, c, text)
        }
    };

    // Explicit overrides trump the palette
    if let Some(bg) = opts.background {
        bg1 = bg;
        bg2 = bg;
        text_color = color::contrast_text(bg1, bg2, false, opts.text_color.as_deref());
    } else if opts.text_color.is_some() {
        text_color = color::contrast_text(
            bg1,
            bg2,
            opts.style == Style::Gradient,
            opts.text_color.as_deref(),
        );
    }

    if opts.format == OutputFormat::Svg {
        let document = svg::render_svg(
            opts.size,
            bg1,
            bg2,
            &initials,
            opts.corner_radius.round() as u32,
            text_color,
            opts.style,
        );
        return Ok((Bytes::from(document), OutputFormat::Svg.mime()));
    }

    let side = opts.size;
    let mut canvas = RgbaImage::new(side, side);
    let fside = side as f64;
    let radius = opts.corner_radius;
    let radius_sq = radius * radius;

    for y in 0..side {
        let fy = y as f64 + 0.5;
        for x in 0..side {
            if radius > 0.0 {
                let fx = x as f64 + 0.5;
                let corner = if fx < radius && fy < radius {
                    Some((fx - radius, fy - radius))
                } else if fx > fside - radius && fy < radius {
                    Some((fx - (fside - radius), fy - radius))
                } else if fx < radius && fy > fside - radius {
                    Some((fx - radius, fy - (fside - radius)))
                } else if fx > fside - radius && fy > fside - radius {
                    Some((fx - (fside - radius), fy - (fside - radius)))
                } else {
                    None
                };
                if let Some((dx, dy)) = corner {
                    if dx * dx + dy * dy > radius_sq {
                        continue;
                    }
                }
            }

            let pixel = if bg1 == bg2 {
                Rgba([bg1.r, bg1.g, bg1.b, 255])
            } else {
                let ratio = (x as f64 + y as f64) / (2.0 * fside);
                let r = (bg1.r as f64 * (1.0 - ratio) + bg2.r as f64 * ratio) as u8;
                let g = (bg1.g as f64 * (1.0 - ratio) + bg2.g as f64 * ratio) as u8;
                let b = (bg1.b as f64 * (1.0 - ratio) + bg2.b as f64 * ratio) as u8;
                Rgba([r, g, b, 255])
            };
            canvas.put_pixel(x, y, pixel);
        }
    }

    if !initials.is_empty() {
        if let Some(face) = fonts.face() {
            draw_initials(&mut canvas, &initials, text_color, side, face);
        }
    }

    let mut buf = Vec::new();
    canvas
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| AppError::generation(e.to_string()))?;

    Ok((Bytes::from(buf), OutputFormat::Png.mime()))
}

/// Draws centered initials using the face's ascent/descent metrics.
fn draw_initials(canvas: &mut RgbaImage, text: &str, color: Rgb, side: u32, face: &FontVec) {
    let scale = PxScale::from(font_px(side, text));
    let scaled = face.as_scaled(scale);

    // First pass: total advance width
    let mut width = 0.0f32;
    let mut previous = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        previous = Some(id);
    }

    let ascent = scaled.ascent();
    let text_height = ascent - scaled.descent();
    let origin_x = (side as f32 - width) / 2.0;
    let baseline_y = (side as f32 - text_height) / 2.0 + ascent;

    // Second pass: place and rasterize
    let mut caret = origin_x;
    let mut previous = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph: Glyph = id.with_scale_and_position(scale, ab_glyph::point(caret, baseline_y));
        caret += scaled.h_advance(id);
        previous = Some(id);

        if let Some(outlined) = face.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px >= 0 && py >= 0 && (px as u32) < side && (py as u32) < side {
                    blend(canvas.get_pixel_mut(px as u32, py as u32), color, coverage);
                }
            });
        }
    }
}

fn blend(pixel: &mut Rgba<u8>, color: Rgb, coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0);
    let mix = |dst: u8, src: u8| (dst as f32 * (1.0 - alpha) + src as f32 * alpha) as u8;
    pixel.0 = [
        mix(pixel.0[0], color.r),
        mix(pixel.0[1], color.g),
        mix(pixel.0[2], color.b),
        pixel.0[3].max((alpha * 255.0) as u8),
    ];
}
