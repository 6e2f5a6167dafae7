use std::path::Path;

use anyhow::Context as _;
use image::RgbaImage;

use crate::{
    compose,
    config::OverlayStyle,
    error::WitsResult,
    text::{self, InkBox},
};

/// Fraction of the base width the widest text line may occupy.
const MAX_WIDTH_RATIO: f32 = 0.85;
/// Shrink-to-fit bounds for the first (IP) line.
const IP_SIZE_FLOOR: u32 = 10;
const IP_SIZE_STEP: u32 = 2;
/// Shrink-to-fit bounds for the location line.
const LOC_SIZE_FLOOR: u32 = 8;
const LOC_SIZE_STEP: u32 = 1;

/// Render the two-line text block over a copy of the base image.
///
/// The block is sized by a linear shrink-to-fit search, drawn with drop
/// shadow, circular outline stroke and main fill, tilted by the configured
/// angle and centered on the base. Any failure surfaces as an error; no
/// partial image is returned.
pub fn render(
    style: &OverlayStyle,
    font_path: &Path,
    base_image_path: &Path,
    ip_text: &str,
    location_text: &str,
) -> WitsResult<RgbaImage> {
    let base = image::open(base_image_path)
        .with_context(|| format!("open base image '{}'", base_image_path.display()))?
        .to_rgba8();
    let font = text::load_font(font_path)?;

    let max_w = (base.width() as f32 * MAX_WIDTH_RATIO) as u32;
    let layout = plan_layout(
        style,
        max_w,
        |size, s| text::measure(&font, size as f32, s),
        ip_text,
        location_text,
    );

    let mut canvas = RgbaImage::new(layout.canvas_w.max(1), layout.canvas_h.max(1));
    let outline = style.outline_width.max(0) as i64;
    let (sdx, sdy) = (i64::from(style.shadow_offset.0), i64::from(style.shadow_offset.1));

    let lines = [
        (layout.ip_size as f32, layout.ip_pos, ip_text),
        (layout.loc_size as f32, layout.loc_pos, location_text),
    ];

    // Draw order matters: later passes cover earlier ones.
    for (px, (x, y), s) in lines {
        text::draw(&mut canvas, &font, px, x + sdx, y + sdy, style.shadow_color.0, s);
    }
    for (px, (x, y), s) in lines {
        for dx in -outline..=outline {
            for dy in -outline..=outline {
                if dx * dx + dy * dy <= outline * outline {
                    text::draw(&mut canvas, &font, px, x + dx, y + dy, style.outline_color.0, s);
                }
            }
        }
    }
    for (px, (x, y), s) in lines {
        text::draw(&mut canvas, &font, px, x, y, style.text_color.0, s);
    }

    let rotated = compose::rotate_expand(&canvas, style.rotation_angle);

    let mut out = base;
    let paste_x = (i64::from(out.width()) - i64::from(rotated.width())) / 2;
    let paste_y = (i64::from(out.height()) - i64::from(rotated.height())) / 2;
    compose::alpha_composite(&mut out, &rotated, paste_x, paste_y);
    Ok(out)
}

/// Placement of both lines on the working canvas, before rotation.
#[derive(Clone, Copy, Debug)]
struct TextLayout {
    ip_size: u32,
    loc_size: u32,
    canvas_w: u32,
    canvas_h: u32,
    ip_pos: (i64, i64),
    loc_pos: (i64, i64),
}

/// Linear shrink-to-fit: decrement `size` by `step` while the measured width
/// exceeds `max_w` and the size is still above `floor`. Deterministic and
/// monotonic; no binary search.
fn fit_size(start: u32, floor: u32, step: u32, max_w: u32, mut width_at: impl FnMut(u32) -> u32) -> u32 {
    let mut size = start;
    let mut w = width_at(size);
    while w > max_w && size > floor {
        size = size.saturating_sub(step);
        w = width_at(size);
    }
    size
}

fn plan_layout(
    style: &OverlayStyle,
    max_w: u32,
    mut measure: impl FnMut(u32, &str) -> InkBox,
    ip_text: &str,
    loc_text: &str,
) -> TextLayout {
    let ip_size = fit_size(style.font_size, IP_SIZE_FLOOR, IP_SIZE_STEP, max_w, |s| {
        measure(s, ip_text).width
    });
    let ip_box = measure(ip_size, ip_text);

    let loc_start = (ip_size as f32 * 0.6) as u32;
    let loc_size = fit_size(loc_start, LOC_SIZE_FLOOR, LOC_SIZE_STEP, max_w, |s| {
        measure(s, loc_text).width
    });
    let loc_box = measure(loc_size, loc_text);

    let line_gap = (ip_size as f32 * 0.2) as u32;
    let block_h = ip_box.height + line_gap + loc_box.height;
    let max_text_w = ip_box.width.max(loc_box.width);

    // Margins cover the outline stroke, the shadow throw and half the font
    // size on each axis, so the rotated result cannot clip.
    let outline = style.outline_width.max(0) as u32;
    let mx = outline + style.shadow_offset.0.unsigned_abs() + ip_size / 2;
    let my = outline + style.shadow_offset.1.unsigned_abs() + ip_size / 2;

    let canvas_w = max_text_w + 2 * mx;
    let canvas_h = block_h + 2 * my;

    TextLayout {
        ip_size,
        loc_size,
        canvas_w,
        canvas_h,
        ip_pos: (i64::from((canvas_w - ip_box.width) / 2), i64::from(my)),
        loc_pos: (
            i64::from((canvas_w - loc_box.width) / 2),
            i64::from(my + ip_box.height + line_gap),
        ),
    }
}
