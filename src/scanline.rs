//! CPU scanline builder: subpixel→pixel mapping plus the PNG Up filter.
//!
//! This is the reference algorithm that every GPU backend (see
//! [`crate::gpu`]) is required to reproduce byte-for-byte.

use crate::error::{Error, Result};

/// Number of output channels per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Grey = 1,
    Rgb = 3,
}

impl Channels {
    fn count(self) -> u32 {
        self as u32
    }

    pub fn from_count(n: u32) -> Result<Self> {
        match n {
            1 => Ok(Channels::Grey),
            3 => Ok(Channels::Rgb),
            other => Err(Error::invalid(format!(
                "unsupported channel count {other} (only 1 or 3 are supported)"
            ))),
        }
    }
}

/// The size in bytes of one scanline buffer for the given output geometry:
/// `height * (1 + out_width * channels)`.
pub fn scanlines_len(out_width: u32, height: u32, channels: Channels) -> usize {
    let bytes_per_row = out_width as usize * channels.count() as usize;
    (1 + bytes_per_row) * height as usize
}

/// Build PNG scanlines (including the per-row filter-type byte and the Up
/// filter) from a decoded greyscale buffer.
///
/// `grey_pixels` is `src_width * height` bytes, row-major. `out` must be
/// exactly [`scanlines_len`] bytes; it is fully overwritten.
pub fn build_scanlines(
    grey_pixels: &[u8],
    src_width: u32,
    height: u32,
    out_width: u32,
    channels: Channels,
    out: &mut [u8],
) -> Result<()> {
    if src_width == 0 || height == 0 || out_width == 0 {
        return Err(Error::invalid("build_scanlines: zero dimension"));
    }
    if grey_pixels.len() != src_width as usize * height as usize {
        return Err(Error::invalid(
            "build_scanlines: grey buffer length does not match src_width*height",
        ));
    }
    let required = scanlines_len(out_width, height, channels);
    if out.len() != required {
        return Err(Error::invalid(format!(
            "build_scanlines: output buffer is {} bytes, expected {}",
            out.len(),
            required
        )));
    }

    let bytes_per_row = out_width as usize * channels.count() as usize;
    let scanline_size = 1 + bytes_per_row;
    let src_width = src_width as usize;

    let req_subpixels = out_width as i64 * channels.count() as i64;
    let pad_total = req_subpixels - src_width as i64;
    let pad_left = if pad_total > 0 { pad_total / 2 } else { 0 };

    match channels {
        Channels::Rgb => {
            for y in 0..height as usize {
                let row = &grey_pixels[y * src_width..(y + 1) * src_width];
                let dst = &mut out[y * scanline_size..(y + 1) * scanline_size];
                dst[0] = 0; // overwritten by the Up pass below
                for x in 0..out_width as usize {
                    let si = x as i64 * 3 - pad_left;
                    for (c, slot) in dst[1 + x * 3..1 + x * 3 + 3].iter_mut().enumerate() {
                        let idx = si + c as i64;
                        *slot = if idx >= 0 && (idx as usize) < src_width {
                            row[idx as usize]
                        } else {
                            0
                        };
                    }
                }
            }
        }
        Channels::Grey => {
            for y in 0..height as usize {
                let row = &grey_pixels[y * src_width..(y + 1) * src_width];
                let dst = &mut out[y * scanline_size..(y + 1) * scanline_size];
                dst[0] = 0;
                for x in 0..out_width as usize {
                    let si = x as i64 * 2 - pad_left;
                    let sample = |offset: i64| -> u16 {
                        let idx = si + offset;
                        if idx >= 0 && (idx as usize) < src_width {
                            row[idx as usize] as u16
                        } else {
                            0
                        }
                    };
                    let a = sample(0);
                    let b = sample(1);
                    dst[1 + x] = ((a + b) >> 1) as u8;
                }
            }
        }
    }

    apply_up_filter(out, height, scanline_size, bytes_per_row);
    Ok(())
}

/// Apply the PNG "Up" filter (type 2) in place, bottom row to top so the
/// previous row is read before it is itself rewritten.
fn apply_up_filter(out: &mut [u8], height: u32, scanline_size: usize, bytes_per_row: usize) {
    for y in (1..height as usize).rev() {
        let (prev, cur) = out.split_at_mut(y * scanline_size);
        let prev_row = &prev[(y - 1) * scanline_size..];
        let cur_row = &mut cur[..scanline_size];
        cur_row[0] = 2;
        for i in 1..=bytes_per_row {
            cur_row[i] = cur_row[i].wrapping_sub(prev_row[i]);
        }
    }
    out[0] = 2;
}
