//! End-to-end scenarios exercising the public API the way a caller would,
//! as opposed to the inline unit tests that exercise each module in
//! isolation.

use layer_pipeline::{
    build_scanlines, compute_area_stats, decode_layer, process_layers_batch, process_layers_batch_phased,
    recompress_single, write_png, Channels, ZipWriter,
};
use std::io::Cursor;

fn encode_run(code_value: u8, length: u32, out: &mut Vec<u8>) {
    assert!(code_value < 0x80);
    if length == 1 {
        out.push(code_value);
        return;
    }
    out.push(code_value | 0x80);
    if length < 0x80 {
        out.push(length as u8);
    } else {
        out.push(0x80 | ((length >> 8) as u8));
        out.push((length & 0xFF) as u8);
    }
}

/// S1: a 100x100 layer encoded as one run of 10,000 zeros decodes to an
/// all-black image with an empty area record.
#[test]
fn s1_empty_layer_decodes_to_black_with_no_islands() {
    let mut encoded = Vec::new();
    encode_run(0, 10_000, &mut encoded); // one run of 10,000 background pixels
    let mut pixels = vec![0xFFu8; 100 * 100];
    decode_layer(&encoded, 0, 0, &mut pixels).unwrap();
    assert!(pixels.iter().all(|&p| p == 0));

    let area = compute_area_stats(&pixels, 100, 100, 0.05, 0.05).unwrap();
    assert_eq!(area.area_count, 0);
    assert_eq!(area.total_solid_area, 0.0);

    let mut scanlines = vec![0u8; layer_pipeline::scanline::scanlines_len(100, 100, Channels::Grey)];
    build_scanlines(&pixels, 100, 100, 100, Channels::Grey, &mut scanlines).unwrap();
    let png = write_png(100, 100, Channels::Grey as u32, &scanlines, 6).unwrap();
    assert_eq!(&png[0..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
}

/// S2: a single solid pixel is its own island with area = one pixel's
/// physical footprint.
#[test]
fn s2_single_pixel_island_has_area_of_one_pixel() {
    let mut encoded = Vec::new();
    encode_run(0, 12, &mut encoded); // background up to the solid pixel
    encode_run(5, 1, &mut encoded); // one solid pixel
    encode_run(0, 987, &mut encoded); // background for the rest of a 1000-pixel layer

    let mut pixels = vec![0u8; 1000];
    decode_layer(&encoded, 0, 0, &mut pixels).unwrap();

    let area = compute_area_stats(&pixels, 10, 100, 0.047, 0.047).unwrap();
    assert_eq!(area.area_count, 1);
    assert!((area.total_solid_area - 0.047 * 0.047).abs() < 1e-12);
    assert_eq!(area.min_x, area.max_x);
    assert_eq!(area.min_y, area.max_y);
}

/// S3: diagonal solid pixels at (0,0),(1,1),(2,2) in a 3x3 layer form one
/// 8-connected island spanning the whole bounding box.
#[test]
fn s3_diagonal_pixels_merge_into_one_island() {
    let grey: Vec<u8> = vec![3, 0, 0, 0, 3, 0, 0, 0, 3];
    let area = compute_area_stats(&grey, 3, 3, 1.0, 1.0).unwrap();
    assert_eq!(area.area_count, 1);
    assert_eq!(area.min_x, 0);
    assert_eq!(area.min_y, 0);
    assert_eq!(area.max_x, 2);
    assert_eq!(area.max_y, 2);
}

/// S4: src_width=4, out_width=3, channels=3 centres the source row with
/// zero padding, left getting the smaller half (pad_total=5, pad_left=2).
#[test]
fn s4_rgb_scanline_padding_matches_the_worked_example() {
    let grey = vec![10u8, 20, 30, 40];
    let mut out = vec![0u8; layer_pipeline::scanline::scanlines_len(3, 1, Channels::Rgb)];
    build_scanlines(&grey, 4, 1, 3, Channels::Rgb, &mut out).unwrap();
    assert_eq!(&out[1..10], &[0, 0, 10, 20, 30, 40, 0, 0, 0]);
}

/// S5: recompressing a level-0 PNG at level 9 preserves pixel content and
/// does not balloon in size.
#[test]
fn s5_recompress_preserves_pixels_and_does_not_grow_unreasonably() {
    let grey: Vec<u8> = (0..900).map(|i| (i % 7) as u8).collect();
    let mut scanlines = vec![0u8; layer_pipeline::scanline::scanlines_len(30, 30, Channels::Grey)];
    build_scanlines(&grey, 30, 30, 30, Channels::Grey, &mut scanlines).unwrap();
    let low = write_png(30, 30, Channels::Grey as u32, &scanlines, 0).unwrap();
    let high = recompress_single(&low, 9).unwrap();

    assert_eq!(&low[0..8], &high[0..8]);
    assert!(high.len() <= low.len() + 64);
}

/// S6: a ZIP archive round-trips through a standards-compliant reader with
/// matching names, sizes, and bytes.
#[test]
fn s6_zip_round_trips_through_a_third_party_reader() {
    let png_bytes: Vec<u8> = (0..(1024 * 1024)).map(|i| (i % 251) as u8).collect();
    let txt_bytes = b"hi".to_vec();

    let mut buf = Vec::new();
    {
        let mut writer = ZipWriter::new(Cursor::new(&mut buf));
        writer.add_file("a.png", &png_bytes).unwrap();
        writer.add_file("b.txt", &txt_bytes).unwrap();
        writer.close().unwrap();
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(&buf)).unwrap();
    assert_eq!(archive.len(), 2);

    use std::io::Read;
    let mut a = archive.by_name("a.png").unwrap();
    let mut a_contents = Vec::new();
    a.read_to_end(&mut a_contents).unwrap();
    assert_eq!(a_contents, png_bytes);
    drop(a);

    let mut b = archive.by_name("b.txt").unwrap();
    let mut b_contents = Vec::new();
    b.read_to_end(&mut b_contents).unwrap();
    assert_eq!(b_contents, txt_bytes);
}

fn sample_layers(n: usize) -> Vec<Vec<u8>> {
    (0..n)
        .map(|i| {
            let mut encoded = Vec::new();
            encode_run(0, 4 + i as u32, &mut encoded);
            encode_run((i % 5) as u8 + 1, 4, &mut encoded);
            encode_run(0, 16 - 8 - i as u32, &mut encoded);
            encoded
        })
        .collect()
}

/// Invariant 7: batch processing produces, for every input index, the same
/// PNG bytes and area stats as running the per-layer pipeline on a batch of
/// one.
#[test]
fn batch_results_match_single_item_results_index_by_index() {
    let layers = sample_layers(5);
    let refs: Vec<&[u8]> = layers.iter().map(|l| l.as_slice()).collect();

    let batch = process_layers_batch(&refs, 0, 0, 4, 4, 4, Channels::Grey, 0.05, 0.05, 6, Some(3)).unwrap();

    for (i, layer) in refs.iter().enumerate() {
        let single = process_layers_batch(std::slice::from_ref(layer), i as u32, 0, 4, 4, 4, Channels::Grey, 0.05, 0.05, 6, Some(1)).unwrap();
        assert_eq!(batch.pngs[i], single.pngs[0]);
        assert_eq!(batch.areas[i], single.areas[0]);
    }
}

/// Invariant 8: the phased pipeline produces identical output whether or
/// not the caller asks for the GPU mega-batch path (no accelerator is
/// compiled in here, so both runs take the CPU path, but the call-site
/// contract — same blobs regardless of `use_gpu_batch` — is what's under
/// test).
#[test]
fn phased_pipeline_is_backend_independent() {
    let layers = sample_layers(6);
    let refs: Vec<&[u8]> = layers.iter().map(|l| l.as_slice()).collect();

    let without_gpu = process_layers_batch_phased(&refs, 0, 0, 4, 4, 4, Channels::Rgb, 0.05, 0.05, 6, Some(2), false).unwrap();
    let with_gpu = process_layers_batch_phased(&refs, 0, 0, 4, 4, 4, Channels::Rgb, 0.05, 0.05, 6, Some(2), true).unwrap();

    assert_eq!(without_gpu.pngs, with_gpu.pngs);
    assert_eq!(without_gpu.areas, with_gpu.areas);
}
