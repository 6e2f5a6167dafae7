use image::{Rgba, RgbaImage};

/// Straight-alpha source-over blend of one pixel.
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = u32::from(src[3]);
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }

    let da_inv = mul_div255(u32::from(dst[3]), 255 - sa);
    let out_a = sa + da_inv;
    if out_a == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (u32::from(src[i]) * sa + u32::from(dst[i]) * da_inv + out_a / 2) / out_a;
        out[i] = c.min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    out
}

/// Blend `color` into `img` at a possibly out-of-bounds position, scaling its
/// alpha by `coverage` (0..=255). Out-of-bounds writes are skipped.
pub fn blend_pixel(img: &mut RgbaImage, x: i64, y: i64, color: [u8; 4], coverage: u8) {
    if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
        return;
    }
    let src = [
        color[0],
        color[1],
        color[2],
        mul_div255(u32::from(color[3]), u32::from(coverage)) as u8,
    ];
    if src[3] == 0 {
        return;
    }
    let dst = img.get_pixel_mut(x as u32, y as u32);
    dst.0 = over(dst.0, src);
}

/// Alpha-composite `overlay` onto `base` with its top-left corner at
/// `(dx, dy)`. Offsets may be negative or run past the base edges; pixels
/// that land outside the base are skipped rather than wrapped.
pub fn alpha_composite(base: &mut RgbaImage, overlay: &RgbaImage, dx: i64, dy: i64) {
    for (ox, oy, px) in overlay.enumerate_pixels() {
        if px.0[3] == 0 {
            continue;
        }
        let tx = dx + i64::from(ox);
        let ty = dy + i64::from(oy);
        if tx < 0 || ty < 0 || tx >= i64::from(base.width()) || ty >= i64::from(base.height()) {
            continue;
        }
        let dst = base.get_pixel_mut(tx as u32, ty as u32);
        dst.0 = over(dst.0, px.0);
    }
}

/// Rotate `src` by `degrees` (positive is counter-clockwise on screen),
/// expanding the canvas so no corner is clipped. Bilinear sampling with
/// premultiplied accumulation; the area outside the source is transparent.
pub fn rotate_expand(src: &RgbaImage, degrees: f64) -> RgbaImage {
    let (w, h) = (f64::from(src.width()), f64::from(src.height()));
    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();

    let new_w = (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32;
    let new_h = (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32;

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ncx, ncy) = (f64::from(new_w) / 2.0, f64::from(new_h) / 2.0);

    let mut out = RgbaImage::new(new_w, new_h);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let rx = f64::from(x) + 0.5 - ncx;
        let ry = f64::from(y) + 0.5 - ncy;
        // Inverse of the screen-space (y-down) CCW rotation.
        let sx = cos * rx - sin * ry + cx;
        let sy = sin * rx + cos * ry + cy;
        *px = Rgba(sample_bilinear(src, sx - 0.5, sy - 0.5));
    }
    out
}

fn sample_bilinear(src: &RgbaImage, x: f64, y: f64) -> [u8; 4] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let mut acc = [0.0f64; 4]; // premultiplied rgb + alpha
    for (ix, iy, weight) in [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ] {
        if weight <= 0.0 || ix < 0.0 || iy < 0.0 {
            continue;
        }
        let (ix, iy) = (ix as u32, iy as u32);
        if ix >= src.width() || iy >= src.height() {
            continue;
        }
        let p = src.get_pixel(ix, iy).0;
        let a = f64::from(p[3]) / 255.0;
        acc[0] += f64::from(p[0]) * a * weight;
        acc[1] += f64::from(p[1]) * a * weight;
        acc[2] += f64::from(p[2]) * a * weight;
        acc[3] += a * weight;
    }

    if acc[3] <= f64::EPSILON {
        return [0, 0, 0, 0];
    }
    [
        (acc[0] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[1] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[2] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

fn mul_div255(x: u32, y: u32) -> u32 {
    (x * y + 127) / 255
}
