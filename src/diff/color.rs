//! Perceptual color distance in YIQ space.
//!
//! Distances are squared and weighted so that luma changes dominate; the
//! maximum possible value (pure black vs pure white) is [`MAX_YIQ_DELTA`].

/// Largest value [`color_delta`] can return.
pub const MAX_YIQ_DELTA: f64 = 35215.0;

/// Read the RGBA quadruple starting at byte offset `pos`.
#[inline]
pub fn rgba_at(buf: &[u8], pos: usize) -> [u8; 4] {
    [buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]
}

#[inline]
pub fn rgb_to_y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

#[inline]
fn rgb_to_i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

#[inline]
fn rgb_to_q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

/// Composite a channel over white using the pixel's alpha.
#[inline]
fn blend(channel: f64, alpha: f64) -> f64 {
    255.0 + (channel - 255.0) * alpha
}

fn composited(px: [u8; 4]) -> (f64, f64, f64) {
    let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);
    if px[3] < 255 {
        let a = px[3] as f64 / 255.0;
        (blend(r, a), blend(g, a), blend(b, a))
    } else {
        (r, g, b)
    }
}

/// Weighted YIQ distance between pixel `k` of `a` and pixel `m` of `b`
/// (byte offsets).
///
/// The sign encodes direction: negative when the first pixel is brighter.
/// With `y_only` the raw brightness difference is returned instead.
pub fn color_delta(a: &[u8], b: &[u8], k: usize, m: usize, y_only: bool) -> f64 {
    let p1 = rgba_at(a, k);
    let p2 = rgba_at(b, m);
    if p1 == p2 {
        return 0.0;
    }

    let (r1, g1, b1) = composited(p1);
    let (r2, g2, b2) = composited(p2);

    let y1 = rgb_to_y(r1, g1, b1);
    let y2 = rgb_to_y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb_to_i(r1, g1, b1) - rgb_to_i(r2, g2, b2);
    let q = rgb_to_q(r1, g1, b1) - rgb_to_q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

/// Largest delta still considered equal for a tolerance in `[0, 1]`.
pub fn max_delta_for(tolerance: f64) -> f64 {
    let t = tolerance.clamp(0.0, 1.0);
    MAX_YIQ_DELTA * t * t
}

/// Faded grayscale rendition of a pixel, used for unchanged areas of the
/// diff image.
pub fn gray_value(px: [u8; 4], alpha: f64) -> u8 {
    let y = rgb_to_y(px[0] as f64, px[1] as f64, px[2] as f64);
    let v = blend(y, alpha * px[3] as f64 / 255.0);
    v.round().clamp(0.0, 255.0) as u8
}
