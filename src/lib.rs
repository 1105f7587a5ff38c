//! Layer-image processing pipeline for a resin 3D printer slicer.
//!
//! Takes CTB-encoded layer masks and turns them into compressed PNG
//! scanlines plus area statistics, with optional GPU-accelerated scanline
//! building and a STORE-only ZIP writer for packaging the results. See the
//! module tree for the pipeline stages: [`rle`] decodes, [`area`] measures,
//! [`scanline`] and [`gpu`] build pixel rows, [`png`] writes/recompresses
//! the container, [`zip`] packages output, and [`pipeline`] orchestrates a
//! batch of layers end to end.

pub mod analytics;
pub mod area;
pub mod config;
pub(crate) mod crc32;
pub mod error;
pub mod gpu;
pub mod pipeline;
pub mod png;
pub mod rle;
pub mod scanline;
pub mod zip;

pub use area::{compute_area_stats, AreaStats};
pub use error::{Error, Result};
pub use pipeline::{process_layers_batch, process_layers_batch_phased, BatchOutput};
pub use png::{recompress_batch, recompress_single, write_png};
pub use rle::decode_layer;
pub use scanline::{build_scanlines, Channels};
pub use zip::ZipWriter;

/// Decode one layer and build its PNG scanlines in a single call.
#[allow(clippy::too_many_arguments)]
pub fn decode_and_build_scanlines(
    encoded: &[u8],
    layer_index: u32,
    encryption_key: u32,
    src_width: u32,
    height: u32,
    out_width: u32,
    channels: Channels,
    out: &mut [u8],
) -> Result<()> {
    let mut pixels = vec![0u8; src_width as usize * height as usize];
    rle::decode_layer(encoded, layer_index, encryption_key, &mut pixels)?;
    scanline::build_scanlines(&pixels, src_width, height, out_width, channels, out)
}

/// Decode one layer, compute its area statistics, and build its PNG
/// scanlines in a single call.
#[allow(clippy::too_many_arguments)]
pub fn decode_area_and_scanlines(
    encoded: &[u8],
    layer_index: u32,
    encryption_key: u32,
    src_width: u32,
    height: u32,
    out_width: u32,
    channels: Channels,
    x_pixel_size_mm: f64,
    y_pixel_size_mm: f64,
    out: &mut [u8],
) -> Result<AreaStats> {
    let mut pixels = vec![0u8; src_width as usize * height as usize];
    rle::decode_layer(encoded, layer_index, encryption_key, &mut pixels)?;
    let stats = area::compute_area_stats(&pixels, src_width, height, x_pixel_size_mm, y_pixel_size_mm)?;
    scanline::build_scanlines(&pixels, src_width, height, out_width, channels, out)?;
    Ok(stats)
}

pub use config::{set_batch_analytics, set_batch_threads, set_recompress_threads, set_thread_background_priority};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_and_build_scanlines_matches_the_two_step_call() {
        let encoded: Vec<u8> = vec![];
        let mut combined = vec![0u8; scanline::scanlines_len(3, 3, Channels::Grey)];
        decode_and_build_scanlines(&encoded, 0, 0, 3, 3, 3, Channels::Grey, &mut combined).unwrap();

        let mut pixels = vec![0u8; 9];
        rle::decode_layer(&encoded, 0, 0, &mut pixels).unwrap();
        let mut stepwise = vec![0u8; scanline::scanlines_len(3, 3, Channels::Grey)];
        scanline::build_scanlines(&pixels, 3, 3, 3, Channels::Grey, &mut stepwise).unwrap();

        assert_eq!(combined, stepwise);
    }

    #[test]
    fn decode_area_and_scanlines_returns_stats_for_an_empty_layer() {
        let encoded: Vec<u8> = vec![];
        let mut out = vec![0u8; scanline::scanlines_len(2, 2, Channels::Grey)];
        let stats = decode_area_and_scanlines(&encoded, 0, 0, 2, 2, 2, Channels::Grey, 0.05, 0.05, &mut out).unwrap();
        assert_eq!(stats.area_count, 0);
    }
}
