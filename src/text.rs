use std::path::Path;

use anyhow::Context as _;
use image::RgbaImage;
use rusttype::{Font, Scale, point};

use crate::{
    compose,
    error::{WitsError, WitsResult},
};

/// Ink bounding box of a laid-out glyph run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InkBox {
    pub width: u32,
    pub height: u32,
}

pub fn load_font(path: &Path) -> WitsResult<Font<'static>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read font '{}'", path.display()))?;
    Font::try_from_vec(bytes).ok_or_else(|| {
        WitsError::render(format!(
            "font '{}' is not a usable TrueType face",
            path.display()
        ))
    })
}

/// Measure the ink extents of `text` at `px` pixels. Whitespace-only or
/// empty text measures zero.
pub fn measure(font: &Font<'_>, px: f32, text: &str) -> InkBox {
    match ink_bounds(font, px, text) {
        Some((min_x, min_y, max_x, max_y)) => InkBox {
            width: (max_x - min_x).max(0) as u32,
            height: (max_y - min_y).max(0) as u32,
        },
        None => InkBox::default(),
    }
}

/// Rasterize `text` so its ink top-left corner lands at `(x, y)`, which may
/// be negative. Coverage is alpha-blended through [`compose::blend_pixel`],
/// so out-of-canvas fragments are clipped, never a panic.
pub fn draw(img: &mut RgbaImage, font: &Font<'_>, px: f32, x: i64, y: i64, color: [u8; 4], text: &str) {
    let Some((min_x, min_y, _, _)) = ink_bounds(font, px, text) else {
        return;
    };
    let scale = Scale::uniform(px);
    let ascent = font.v_metrics(scale).ascent;

    for glyph in font.layout(text, scale, point(0.0, ascent)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, v| {
            let coverage = (v * 255.0).round() as u8;
            if coverage == 0 {
                return;
            }
            let tx = x + i64::from(bb.min.x - min_x) + i64::from(gx);
            let ty = y + i64::from(bb.min.y - min_y) + i64::from(gy);
            compose::blend_pixel(img, tx, ty, color, coverage);
        });
    }
}

fn ink_bounds(font: &Font<'_>, px: f32, text: &str) -> Option<(i32, i32, i32, i32)> {
    let scale = Scale::uniform(px);
    let ascent = font.v_metrics(scale).ascent;

    let mut bounds: Option<(i32, i32, i32, i32)> = None;
    for glyph in font.layout(text, scale, point(0.0, ascent)) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            bounds = Some(match bounds {
                None => (bb.min.x, bb.min.y, bb.max.x, bb.max.y),
                Some((x0, y0, x1, y1)) => (
                    x0.min(bb.min.x),
                    y0.min(bb.min.y),
                    x1.max(bb.max.x),
                    y1.max(bb.max.y),
                ),
            });
        }
    }
    bounds
}
