use super::{color_type_for_channels, SIGNATURE};
use crate::crc32::crc32_parts;
use crate::error::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32_parts(chunk_type, data).to_be_bytes());
}

/// Build a single-IDAT PNG from already-filtered scanlines (§4.6).
///
/// `scanlines` is exactly [`crate::scanline::scanlines_len`] bytes: one
/// filter-type byte plus `width*channels` bytes per row, `height` rows.
pub fn write_png(
    width: u32,
    height: u32,
    channels: u32,
    scanlines: &[u8],
    level: i32,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(Error::invalid("write_png: zero dimension"));
    }
    let color_type =
        color_type_for_channels(channels).ok_or_else(|| Error::invalid("write_png: unsupported channel count"))?;
    let expected = height as usize * (1 + width as usize * channels as usize);
    if scanlines.len() != expected {
        return Err(Error::invalid(format!(
            "write_png: scanline buffer is {} bytes, expected {}",
            scanlines.len(),
            expected
        )));
    }

    let level = level.clamp(0, 9) as u32;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(scanlines).map_err(Error::Deflate)?;
    let idat = encoder.finish().map_err(Error::Deflate)?;

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(8); // bit depth
    ihdr.push(color_type);
    ihdr.push(0); // compression method
    ihdr.push(0); // filter method
    ihdr.push(0); // interlace method

    let mut out = Vec::with_capacity(8 + 25 + 12 + idat.len() + 12);
    out.extend_from_slice(&SIGNATURE);
    write_chunk(&mut out, b"IHDR", &ihdr);
    write_chunk(&mut out, b"IDAT", &idat);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png::recompress::recompress_single;
    use crate::scanline::{build_scanlines, scanlines_len, Channels};

    #[test]
    fn written_png_parses_back_to_same_geometry_and_pixels() {
        let grey = vec![10u8, 20, 30, 40, 50, 60];
        let mut scanlines = vec![0u8; scanlines_len(3, 2, Channels::Rgb)];
        build_scanlines(&grey, 3, 2, 3, Channels::Rgb, &mut scanlines).unwrap();

        let png = write_png(3, 2, 3, &scanlines, 6).unwrap();
        assert_eq!(&png[0..8], &SIGNATURE);

        // Recompressing at the same level round-trips to the same scanlines.
        let recompressed = recompress_single(&png, 9).unwrap();
        let reinflated = inflate_idat_for_test(&recompressed);
        assert_eq!(reinflated, scanlines);
    }

    #[test]
    fn rejects_wrong_scanline_length() {
        assert!(write_png(3, 2, 3, &[0u8; 4], 6).is_err());
    }

    #[test]
    fn rejects_unsupported_channels() {
        let scanlines = vec![0u8; scanlines_len(1, 1, Channels::Grey)];
        assert!(write_png(1, 1, 7, &scanlines, 6).is_err());
    }

    fn inflate_idat_for_test(png: &[u8]) -> Vec<u8> {
        use flate2::read::ZlibDecoder;
        use std::io::Read;
        // Minimal re-parse for the test only: find the (single) IDAT chunk.
        let mut offset = 8usize;
        loop {
            let len = u32::from_be_bytes(png[offset..offset + 4].try_into().unwrap()) as usize;
            let chunk_type = &png[offset + 4..offset + 8];
            let data = &png[offset + 8..offset + 8 + len];
            if chunk_type == b"IDAT" {
                let mut decoder = ZlibDecoder::new(data);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out).unwrap();
                return out;
            }
            offset += 8 + len + 4;
        }
    }
}
