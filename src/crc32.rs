//! IEEE CRC32, used for PNG chunk checksums and ZIP entry checksums.
//!
//! Same polynomial and reflection convention as zlib's `crc32()`: the
//! 256-entry table is built once per process and cached behind a
//! [`std::sync::OnceLock`].

use std::sync::OnceLock;

const POLYNOMIAL: u32 = 0xEDB8_8320;

fn table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mut crc = i as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ POLYNOMIAL
                } else {
                    crc >> 1
                };
            }
            *slot = crc;
        }
        table
    })
}

/// Running CRC32 accumulator, useful when the bytes to checksum arrive in
/// more than one slice (e.g. a chunk type followed by its payload).
#[derive(Debug, Clone, Copy)]
pub struct Crc32(u32);

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub fn new() -> Self {
        Crc32(0xFFFF_FFFF)
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        let table = table();
        let mut crc = self.0;
        for &byte in bytes {
            crc = table[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.0 = crc;
        self
    }

    pub fn finish(self) -> u32 {
        self.0 ^ 0xFFFF_FFFF
    }
}

/// One-shot CRC32 of a single slice.
pub fn crc32(bytes: &[u8]) -> u32 {
    Crc32::new().update(bytes).finish()
}

/// CRC32 over two slices concatenated, without actually concatenating them
/// (used for PNG chunks: CRC is computed over `type ++ data`).
pub fn crc32_parts(a: &[u8], b: &[u8]) -> u32 {
    Crc32::new().update(a).update(b).finish()
}
