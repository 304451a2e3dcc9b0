//! Pixel-level image difference.
//!
//! [`compare`] walks two equally-sized RGBA buffers, counts pixels whose
//! perceptual color distance exceeds the tolerance and paints a mask of
//! where they are. It has no side effects and never reconciles sizes:
//! callers resize before comparing.

mod antialias;
pub mod color;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::config::{AA_COLOR, DEFAULT_DIFF_ALPHA, DEFAULT_DIFF_TOLERANCE, DIFF_COLOR};
use antialias::is_antialiased;
use color::{color_delta, gray_value, max_delta_for, rgba_at};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DiffError {
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("{which} buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSize {
        which: &'static str,
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffOptions {
    /// Color tolerance in `[0, 1]`; larger values accept bigger deltas.
    pub tolerance: f64,
    /// Count anti-aliased pixels as different instead of excluding them.
    pub include_aa: bool,
    /// Opacity of the faded original drawn under unchanged pixels.
    pub alpha: f64,
    pub diff_color: [u8; 3],
    pub aa_color: [u8; 3],
    /// Leave unchanged and anti-aliased pixels transparent in the mask.
    pub mask_only: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_DIFF_TOLERANCE,
            include_aa: false,
            alpha: DEFAULT_DIFF_ALPHA,
            diff_color: DIFF_COLOR,
            aa_color: AA_COLOR,
            mask_only: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffOutput {
    pub differing_pixels: u64,
    /// Present only when `differing_pixels > 0`.
    pub mask: Option<RgbaImage>,
}

impl DiffOutput {
    pub fn total_pixels(width: u32, height: u32) -> u64 {
        width as u64 * height as u64
    }
}

fn check_buffer(which: &'static str, buf: &[u8], width: u32, height: u32) -> Result<(), DiffError> {
    let expected = width as usize * height as usize * 4;
    if buf.len() != expected {
        return Err(DiffError::BufferSize {
            which,
            actual: buf.len(),
            expected,
            width,
            height,
        });
    }
    Ok(())
}

fn paint(mask: &mut RgbaImage, x: u32, y: u32, color: [u8; 3]) {
    mask.put_pixel(x, y, Rgba([color[0], color[1], color[2], 255]));
}

fn paint_gray(mask: &mut RgbaImage, x: u32, y: u32, px: [u8; 4], alpha: f64) {
    let v = gray_value(px, alpha);
    mask.put_pixel(x, y, Rgba([v, v, v, 255]));
}

/// Compare two RGBA buffers of identical `width` x `height`.
pub fn compare(
    baseline: &[u8],
    current: &[u8],
    width: u32,
    height: u32,
    options: &DiffOptions,
) -> Result<DiffOutput, DiffError> {
    if width == 0 || height == 0 {
        return Err(DiffError::EmptyImage { width, height });
    }
    check_buffer("baseline", baseline, width, height)?;
    check_buffer("current", current, width, height)?;

    if baseline == current {
        return Ok(DiffOutput {
            differing_pixels: 0,
            mask: None,
        });
    }

    let max_delta = max_delta_for(options.tolerance);
    // Fully transparent by default; unchanged pixels are overwritten below
    // unless only the mask was requested.
    let mut mask = RgbaImage::new(width, height);
    let mut differing: u64 = 0;

    for y in 0..height {
        for x in 0..width {
            let pos = (y as usize * width as usize + x as usize) * 4;
            let delta = color_delta(baseline, current, pos, pos, false);

            if delta.abs() > max_delta {
                let antialiased = !options.include_aa
                    && (is_antialiased(baseline, current, x, y, width, height)
                        || is_antialiased(current, baseline, x, y, width, height));

                if antialiased {
                    if !options.mask_only {
                        paint(&mut mask, x, y, options.aa_color);
                    }
                } else {
                    paint(&mut mask, x, y, options.diff_color);
                    differing += 1;
                }
            } else if !options.mask_only {
                paint_gray(&mut mask, x, y, rgba_at(baseline, pos), options.alpha);
            }
        }
    }

    Ok(DiffOutput {
        differing_pixels: differing,
        mask: (differing > 0).then_some(mask),
    })
}
