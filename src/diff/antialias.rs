//! Anti-aliasing detection over a 3x3 neighborhood.
//!
//! A pixel is considered an anti-aliased edge artifact when its neighbors
//! contain both a darker and a brighter extreme, and one of those extremes
//! sits inside a flat region (three or more identical neighbors) in both
//! images.

use super::color::{color_delta, rgba_at};

#[inline]
fn offset(x: u32, y: u32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

struct Window {
    x0: u32,
    y0: u32,
    x2: u32,
    y2: u32,
    on_edge: bool,
}

fn window(x: u32, y: u32, width: u32, height: u32) -> Window {
    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x2 = (x + 1).min(width - 1);
    let y2 = (y + 1).min(height - 1);
    Window {
        x0,
        y0,
        x2,
        y2,
        on_edge: x == x0 || x == x2 || y == y0 || y == y2,
    }
}

/// Whether pixel `(x, y)` of `img` looks like an anti-aliased edge, using
/// `other` to confirm the flat region around the extremes.
pub fn is_antialiased(img: &[u8], other: &[u8], x: u32, y: u32, width: u32, height: u32) -> bool {
    let w = window(x, y, width, height);
    let pos = offset(x, y, width);

    let mut zeroes: u32 = if w.on_edge { 1 } else { 0 };
    let mut min = 0.0_f64;
    let mut max = 0.0_f64;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0, 0, 0, 0);

    for nx in w.x0..=w.x2 {
        for ny in w.y0..=w.y2 {
            if nx == x && ny == y {
                continue;
            }

            let delta = color_delta(img, img, pos, offset(nx, ny, width), true);

            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_x = nx;
                min_y = ny;
            } else if delta > max {
                max = delta;
                max_x = nx;
                max_y = ny;
            }
        }
    }

    // No darker or no brighter neighbor: not an edge.
    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_x, min_y, width, height)
        && has_many_siblings(other, min_x, min_y, width, height))
        || (has_many_siblings(img, max_x, max_y, width, height)
            && has_many_siblings(other, max_x, max_y, width, height))
}

/// Whether pixel `(x, y)` has at least three neighbors of exactly the same
/// color (edge pixels count the missing side as one).
fn has_many_siblings(img: &[u8], x: u32, y: u32, width: u32, height: u32) -> bool {
    let w = window(x, y, width, height);
    let center = rgba_at(img, offset(x, y, width));

    let mut zeroes: u32 = if w.on_edge { 1 } else { 0 };

    for nx in w.x0..=w.x2 {
        for ny in w.y0..=w.y2 {
            if nx == x && ny == y {
                continue;
            }
            if rgba_at(img, offset(nx, ny, width)) == center {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}
