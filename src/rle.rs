//! CTB run-length decoding, with optional per-layer XOR-stream decryption.
//!
//! `decode_layer` is the only entry point: it always fully overwrites its
//! output buffer and never fails on truncated input — a layer that runs out
//! of bytes mid-run just leaves the remainder at zero. This mirrors the
//! tolerant behaviour of the reference decoder, which treats truncated cache
//! files as "whatever we got, plus background".

use crate::error::{Error, Result};

/// A per-layer byte-stream cipher. Constructed once per `decode_layer` call
/// when `encryption_key != 0`; advances one byte at a time.
struct Cipher {
    key: u32,
    init: u32,
    key_byte_index: u32,
}

impl Cipher {
    fn new(encryption_key: u32, layer_index: u32) -> Self {
        let init = encryption_key
            .wrapping_mul(0x2D83_CDAC)
            .wrapping_add(0xD8A8_3423);
        let key = layer_index
            .wrapping_mul(0x1E15_30CD)
            .wrapping_add(0xEC3D_47CD)
            .wrapping_mul(init);
        Cipher {
            key,
            init,
            key_byte_index: 0,
        }
    }

    fn decrypt(&mut self, byte: u8) -> u8 {
        let k = ((self.key >> (8 * self.key_byte_index)) & 0xFF) as u8;
        let out = byte ^ k;
        self.key_byte_index += 1;
        if self.key_byte_index & 3 == 0 {
            self.key = self.key.wrapping_add(self.init);
            self.key_byte_index = 0;
        }
        out
    }
}

/// A cursor over the encoded input that optionally decrypts each byte it
/// reads, and reports exhaustion instead of panicking.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    cipher: Option<Cipher>,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], cipher: Option<Cipher>) -> Self {
        Reader {
            data,
            pos: 0,
            cipher,
        }
    }

    fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(match &mut self.cipher {
            Some(cipher) => cipher.decrypt(byte),
            None => byte,
        })
    }
}

/// Decode one CTB-encoded layer into an 8-bit greyscale buffer.
///
/// `out_pixels.len()` is the pixel count (`src_width * height` — the caller
/// owns the geometry; this function only knows a flat pixel count). The
/// buffer is zero-filled on entry, then runs are written in; runs that
/// would overflow the buffer are clipped rather than rejected.
///
/// Returns `Err` only for structurally invalid arguments (empty output,
/// which can never hold a real layer). A truncated or empty `encoded` input
/// is *not* an error — see the module docs.
pub fn decode_layer(
    encoded: &[u8],
    layer_index: u32,
    encryption_key: u32,
    out_pixels: &mut [u8],
) -> Result<()> {
    if out_pixels.is_empty() {
        return Err(Error::invalid("decode_layer: empty output buffer"));
    }

    out_pixels.fill(0);

    if encoded.is_empty() {
        return Ok(());
    }

    let cipher = (encryption_key != 0).then(|| Cipher::new(encryption_key, layer_index));
    let mut reader = Reader::new(encoded, cipher);

    let pixel_count = out_pixels.len();
    let mut pixel = 0usize;

    while pixel < pixel_count {
        let Some(mut code) = reader.read_u8() else {
            break;
        };

        let mut stride: u32 = 1;

        if code & 0x80 != 0 {
            code &= 0x7F;

            let Some(s) = reader.read_u8() else { break };

            stride = if s & 0x80 == 0 {
                s as u32
            } else if s & 0xC0 == 0x80 {
                let Some(b0) = reader.read_u8() else { break };
                (((s & 0x3F) as u32) << 8) | b0 as u32
            } else if s & 0xE0 == 0xC0 {
                let (Some(b0), Some(b1)) = (reader.read_u8(), reader.read_u8()) else {
                    break;
                };
                (((s & 0x1F) as u32) << 16) | ((b0 as u32) << 8) | b1 as u32
            } else if s & 0xF0 == 0xE0 {
                let (Some(b0), Some(b1), Some(b2)) =
                    (reader.read_u8(), reader.read_u8(), reader.read_u8())
                else {
                    break;
                };
                (((s & 0x0F) as u32) << 24)
                    | ((b0 as u32) << 16)
                    | ((b1 as u32) << 8)
                    | b2 as u32
            } else {
                // Legacy tolerance: an unrecognised stride-descriptor shape
                // is treated as a run of length 1.
                1
            };
        }

        let pixel_value: u8 = if code == 0 { 0 } else { (code << 1) | 1 };

        let end = pixel.saturating_add(stride as usize).min(pixel_count);
        if pixel_value != 0 {
            out_pixels[pixel..end].fill(pixel_value);
        }
        pixel = end;
    }

    Ok(())
}
