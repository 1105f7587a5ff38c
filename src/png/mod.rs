//! PNG container support: writing a fresh single-IDAT file from already-built
//! scanlines, and recompressing the IDAT payload of an existing PNG at a
//! different zlib level.

mod recompress;
mod writer;

pub use recompress::{recompress_batch, recompress_single};
pub use writer::write_png;

pub(crate) const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Colour type byte for IHDR, given an output channel count.
pub(crate) fn color_type_for_channels(channels: u32) -> Option<u8> {
    match channels {
        1 => Some(0),
        2 => Some(4),
        3 => Some(2),
        4 => Some(6),
        _ => None,
    }
}

/// Inverse of [`color_type_for_channels`], as used when parsing an existing
/// PNG's IHDR chunk during recompression.
pub(crate) fn channels_for_color_type(color_type: u8) -> Option<u32> {
    match color_type {
        0 => Some(1),
        2 => Some(3),
        4 => Some(2),
        6 => Some(4),
        _ => None,
    }
}

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// A parsed view into one PNG chunk: `(chunk_type, data, whole_chunk_end_offset)`.
struct ChunkCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ChunkCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        ChunkCursor { data, offset: 8 }
    }
}

impl<'a> Iterator for ChunkCursor<'a> {
    type Item = Option<(&'a [u8; 4], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + 8 > self.data.len() {
            return None;
        }
        let len = read_u32_be(&self.data[self.offset..]) as usize;
        let data_start = self.offset + 8;
        let data_end = data_start.checked_add(len)?;
        let crc_end = data_end.checked_add(4)?;
        if crc_end > self.data.len() {
            return Some(None); // truncated chunk: caller treats as malformed
        }
        let chunk_type: &[u8; 4] = self.data[self.offset + 4..data_start].try_into().ok()?;
        let chunk_data = &self.data[data_start..data_end];
        self.offset = crc_end;
        Some(Some((chunk_type, chunk_data)))
    }
}
