//! PNG IDAT recompression: inflate the existing scanlines, re-deflate at a
//! different level, re-emit a single-IDAT PNG (§4.7).

use super::{channels_for_color_type, ChunkCursor, SIGNATURE};
use crate::error::{Error, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

struct ParsedPng {
    ihdr: [u8; 13],
    idat: Vec<u8>,
}

fn parse(png: &[u8]) -> Result<ParsedPng> {
    if png.len() < 45 || png[..8] != SIGNATURE {
        return Err(Error::malformed_png("bad PNG signature or truncated file"));
    }

    let mut ihdr: Option<[u8; 13]> = None;
    let mut idat = Vec::new();

    for chunk in ChunkCursor::new(png) {
        let (chunk_type, data) = chunk.ok_or_else(|| Error::malformed_png("truncated chunk"))?;
        match chunk_type {
            b"IHDR" => {
                if data.len() < 13 {
                    return Err(Error::malformed_png("IHDR shorter than 13 bytes"));
                }
                let mut buf = [0u8; 13];
                buf.copy_from_slice(&data[..13]);
                ihdr = Some(buf);
            }
            b"IDAT" => idat.extend_from_slice(data),
            b"IEND" => break,
            _ => {}
        }
    }

    let ihdr = ihdr.ok_or_else(|| Error::malformed_png("missing IHDR chunk"))?;
    if idat.is_empty() {
        return Err(Error::malformed_png("no IDAT data"));
    }
    Ok(ParsedPng { ihdr, idat })
}

/// Recompress the IDAT payload of one PNG at a new zlib level, preserving
/// pixel content (§4.7).
pub fn recompress_single(png: &[u8], level: i32) -> Result<Vec<u8>> {
    let parsed = parse(png)?;
    let width = u32::from_be_bytes(parsed.ihdr[0..4].try_into().unwrap());
    let height = u32::from_be_bytes(parsed.ihdr[4..8].try_into().unwrap());
    let bit_depth = parsed.ihdr[8];
    let color_type = parsed.ihdr[9];

    if width == 0 || height == 0 {
        return Err(Error::malformed_png("zero width or height in IHDR"));
    }
    if bit_depth != 8 {
        return Err(Error::malformed_png(format!(
            "unsupported bit depth {bit_depth} (only 8 is supported)"
        )));
    }
    let channels = channels_for_color_type(color_type)
        .ok_or_else(|| Error::malformed_png(format!("unsupported colour type {color_type}")))?;

    let expected = height as usize * (1 + width as usize * channels as usize);
    let mut scanlines = vec![0u8; expected];
    let mut decoder = ZlibDecoder::new(parsed.idat.as_slice());
    decoder.read_exact(&mut scanlines).map_err(|e| {
        Error::Inflate(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("inflated stream shorter than height*(1+width*channels): {e}"),
        ))
    })?;
    let mut tail = [0u8; 1];
    if decoder.read(&mut tail).map_err(Error::Inflate)? != 0 {
        return Err(Error::Inflate(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "inflated size did not match height*(1+width*channels)",
        )));
    }

    let level = level.clamp(0, 9) as u32;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(&scanlines).map_err(Error::Deflate)?;
    let compressed = encoder.finish().map_err(Error::Deflate)?;

    let mut out = Vec::with_capacity(8 + 25 + 12 + compressed.len() + 12);
    out.extend_from_slice(&SIGNATURE);
    write_chunk(&mut out, b"IHDR", &parsed.ihdr);
    write_chunk(&mut out, b"IDAT", &compressed);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    out.extend_from_slice(&crate::crc32::crc32_parts(chunk_type, data).to_be_bytes());
}

struct BatchWork<'a> {
    inputs: &'a [&'a [u8]],
    level: i32,
    outputs: Vec<Mutex<Option<Vec<u8>>>>,
    next_index: AtomicUsize,
    failed: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

impl<'a> BatchWork<'a> {
    fn claim_range(&self, chunk: usize) -> Option<std::ops::Range<usize>> {
        if self.failed.load(Ordering::Acquire) {
            return None;
        }
        let start = self.next_index.fetch_add(chunk, Ordering::AcqRel);
        if start >= self.inputs.len() {
            return None;
        }
        Some(start..(start + chunk).min(self.inputs.len()))
    }

    fn mark_failed(&self, err: Error) {
        let mut first = self.first_error.lock().unwrap();
        if first.is_none() {
            *first = Some(err);
        }
        self.failed.store(true, Ordering::Release);
    }

    fn process_one(&self, index: usize) {
        match recompress_single(self.inputs[index], self.level) {
            Ok(bytes) => {
                *self.outputs[index].lock().unwrap() = Some(bytes);
            }
            Err(err) => self.mark_failed(err),
        }
    }
}

/// Recompress `inputs` in parallel, a worker pool claiming one index at a
/// time; first error aborts the batch for every worker (§4.7).
pub fn recompress_batch(inputs: &[&[u8]], level: i32, thread_count: Option<usize>) -> Result<Vec<Vec<u8>>> {
    if inputs.is_empty() {
        return Err(Error::invalid("recompress_batch: empty input"));
    }

    let work = BatchWork {
        inputs,
        level,
        outputs: (0..inputs.len()).map(|_| Mutex::new(None)).collect(),
        next_index: AtomicUsize::new(0),
        failed: AtomicBool::new(false),
        first_error: Mutex::new(None),
    };

    let default_hint = crate::config::recompress_threads_default();
    let cpu_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let default_threads = if default_hint > 0 { default_hint as usize } else { cpu_threads };
    let threads = thread_count.unwrap_or(default_threads).max(1).min(inputs.len());

    if threads == 1 {
        for i in 0..inputs.len() {
            if work.failed.load(Ordering::Acquire) {
                break;
            }
            work.process_one(i);
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::capacity(format!("failed to build recompress thread pool: {e}")))?;
        pool.scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|_| {
                    while let Some(range) = work.claim_range(1) {
                        for i in range {
                            work.process_one(i);
                        }
                    }
                });
            }
        });
    }

    if work.failed.load(Ordering::Acquire) {
        let err = work.first_error.lock().unwrap().take().unwrap_or_else(|| {
            Error::capacity("recompress_batch: worker failed with no recorded error")
        });
        return Err(Error::BatchFailed(Box::new(err)));
    }

    work.outputs
        .into_iter()
        .map(|slot| slot.into_inner().unwrap().ok_or_else(|| Error::capacity("recompress_batch: missing output slot")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png::write_png;
    use crate::scanline::{build_scanlines, scanlines_len, Channels};

    fn sample_png(level: i32) -> Vec<u8> {
        let grey = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut scanlines = vec![0u8; scanlines_len(3, 3, Channels::Grey)];
        build_scanlines(&grey, 3, 3, 3, Channels::Grey, &mut scanlines).unwrap();
        write_png(3, 3, 1, &scanlines, level).unwrap()
    }

    #[test]
    fn recompress_preserves_geometry_and_shrinks_or_holds_size() {
        let low = sample_png(0);
        let high = recompress_single(&low, 9).unwrap();
        assert_eq!(&high[0..8], &SIGNATURE);
        assert!(high.len() <= low.len() + 64); // not required to shrink every time, but shouldn't balloon
    }

    #[test]
    fn recompress_batch_matches_single_item_results() {
        let pngs = [sample_png(0), sample_png(3), sample_png(6)];
        let refs: Vec<&[u8]> = pngs.iter().map(|p| p.as_slice()).collect();
        let batch = recompress_batch(&refs, 9, Some(2)).unwrap();
        for (single_input, batch_output) in pngs.iter().zip(batch.iter()) {
            let expected = recompress_single(single_input, 9).unwrap();
            assert_eq!(&expected[0..8], &batch_output[0..8]);
            assert_eq!(expected.len(), batch_output.len());
        }
    }

    #[test]
    fn recompress_batch_aborts_on_first_malformed_item() {
        let pngs = [sample_png(0), vec![0u8; 50]];
        let refs: Vec<&[u8]> = pngs.iter().map(|p| p.as_slice()).collect();
        assert!(recompress_batch(&refs, 9, Some(2)).is_err());
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(recompress_single(&[0u8; 10], 6).is_err());
    }

    #[test]
    fn recompress_handles_scanlines_larger_than_one_inflate_read() {
        // 1920x1080 greyscale is ~2MB of scanline data, well past flate2's
        // internal ~8KiB buffered read — a single `Read::read` call is not
        // guaranteed to fill the output buffer at this size.
        let width = 1920u32;
        let height = 1080u32;
        let grey: Vec<u8> = (0..(width as usize * height as usize)).map(|i| (i % 256) as u8).collect();
        let mut scanlines = vec![0u8; scanlines_len(width, height, Channels::Grey)];
        build_scanlines(&grey, width, height, width, Channels::Grey, &mut scanlines).unwrap();
        let png = write_png(width, height, Channels::Grey as u32, &scanlines, 0).unwrap();

        let recompressed = recompress_single(&png, 9).unwrap();
        assert_eq!(&recompressed[0..8], &SIGNATURE);

        // Decoding the recompressed output must yield the same scanlines.
        let parsed = parse(&recompressed).unwrap();
        let expected = scanlines.len();
        let mut roundtripped = vec![0u8; expected];
        let mut decoder = ZlibDecoder::new(parsed.idat.as_slice());
        decoder.read_exact(&mut roundtripped).unwrap();
        assert_eq!(roundtripped, scanlines);
    }
}
