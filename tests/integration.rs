use image::{GrayImage, Rgb, RgbImage};
use video_watermark_removal::detection::prior_region;
use video_watermark_removal::mask::{covers, rasterize};
use video_watermark_removal::{
    Error, MaskMode, MemorySink, MemorySource, NoProgress, ProcessOptions, Reconstructor, Region,
    SequenceDriver, Stage, WatermarkEngine,
};

const SENTINEL: Rgb<u8> = Rgb([255, 0, 255]);

fn textured(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = (x * 7 + y * 13 + seed * 31) % 100;
        #[allow(clippy::cast_possible_truncation)]
        Rgb([v as u8, 50 + v as u8, 100 + (v / 2) as u8])
    })
}

fn paint(img: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    for y in region.y..region.bottom() {
        for x in region.x..region.right() {
            img.put_pixel(x, y, color);
        }
    }
}

fn masked_distance(a: &RgbImage, b: &RgbImage, mask: &GrayImage) -> u64 {
    a.pixels()
        .zip(b.pixels())
        .zip(mask.pixels())
        .filter(|(_, m)| m[0] > 0)
        .map(|((pa, pb), _)| {
            pa.0.iter()
                .zip(pb.0.iter())
                .map(|(&ca, &cb)| u64::from(ca.abs_diff(cb)))
                .sum::<u64>()
        })
        .sum()
}

#[test]
fn mask_always_contains_prior_region() {
    for (w, h) in [(640, 360), (1920, 1080), (100, 100)] {
        let frame = textured(w, h, 1);
        let (mask, regions) = MaskMode::Auto.build(&frame);
        let prior = prior_region(w, h);
        assert_eq!(mask.dimensions(), (w, h));
        assert!(regions.contains(&prior));
        assert!(covers(&mask, &prior), "prior not covered for {w}x{h}");
    }
}

#[test]
fn detected_text_is_masked() {
    let mut frame = textured(640, 360, 2);
    let text = Region::new(470, 320, 36, 14);
    paint(&mut frame, &text, Rgb([240, 240, 240]));

    let (mask, regions) = MaskMode::Auto.build(&frame);
    assert_eq!(regions.len(), 2);
    assert!(covers(&mask, &text));
}

#[test]
fn spatial_reconstruction_keeps_unmasked_pixels() {
    let frame = textured(200, 120, 3);
    let (mask, _) = MaskMode::Auto.build(&frame);

    let out = Reconstructor::default().reconstruct(&frame, &mask, None).unwrap();
    for (x, y, px) in out.enumerate_pixels() {
        if mask.get_pixel(x, y)[0] == 0 {
            assert_eq!(px, frame.get_pixel(x, y), "pixel ({x},{y}) changed");
        }
    }
}

#[test]
fn spatial_reconstruction_removes_sentinel() {
    let mut frame = textured(200, 120, 4);
    let mut mask = GrayImage::new(200, 120);
    let mark = Region::new(150, 100, 30, 10);
    rasterize(&mut mask, &mark);
    paint(&mut frame, &mark, SENTINEL);

    let out = Reconstructor::default().reconstruct(&frame, &mask, None).unwrap();
    for (x, y, px) in out.enumerate_pixels() {
        if mask.get_pixel(x, y)[0] > 0 {
            assert_ne!(*px, SENTINEL, "sentinel left at ({x},{y})");
        }
    }
}

#[test]
fn temporal_reconstruction_is_more_consistent_than_spatial() {
    let (w, h) = (200, 120);
    let mark = Region::new(150, 106, 30, 8);
    let background = |base: u8| {
        RgbImage::from_fn(w, h, |_, y| {
            #[allow(clippy::cast_possible_truncation)]
            let v = base + (y / 4) as u8;
            Rgb([v, v, v])
        })
    };

    let mut first = background(60);
    let mut second = background(140);
    paint(&mut first, &mark, Rgb([250, 250, 250]));
    paint(&mut second, &mark, Rgb([250, 250, 250]));

    let (mask, _) = MaskMode::Auto.build(&first);
    assert!(covers(&mask, &mark));

    let r = Reconstructor::default();
    let clean_first = r.reconstruct(&first, &mask, None).unwrap();
    let temporal = r.reconstruct(&second, &mask, Some(&clean_first)).unwrap();
    let spatial = r.reconstruct(&second, &mask, None).unwrap();

    let d_temporal = masked_distance(&temporal, &clean_first, &mask);
    let d_spatial = masked_distance(&spatial, &clean_first, &mask);
    assert!(
        d_temporal < d_spatial,
        "temporal {d_temporal} should be below spatial {d_spatial}"
    );
}

#[test]
fn mismatched_mask_fails_with_invalid_input() {
    let frame = RgbImage::new(64, 64);
    let mask = GrayImage::new(32, 64);
    let result = Reconstructor::default().reconstruct(&frame, &mask, None);
    assert!(matches!(
        result,
        Err(Error::InvalidInput {
            stage: Stage::Reconstruct,
            expected: (64, 64),
            actual: (32, 64),
        })
    ));
}

#[test]
fn end_to_end_removes_static_rectangle() {
    let background = Rgb([30, 60, 90]);
    let bright = Rgb([250, 250, 250]);
    let mark = Region::new(88, 90, 10, 10);

    let frames: Vec<RgbImage> = (0..5)
        .map(|_| {
            let mut f = RgbImage::from_pixel(100, 100, background);
            paint(&mut f, &mark, bright);
            f
        })
        .collect();

    let mut source = MemorySource::new(frames, 30.0);
    let mut sink = MemorySink::default();
    let mut driver = SequenceDriver::new(Reconstructor::default());
    let report = driver.run(&mut source, &mut sink, &NoProgress).unwrap();

    assert!(covers(driver.mask().unwrap(), &mark));
    assert_eq!(report.frames_processed, 5);
    assert!(sink.is_finished());

    let out = sink.into_frames();
    assert_eq!(out.len(), 5);
    for (i, frame) in out.iter().enumerate() {
        assert_eq!(frame.dimensions(), (100, 100));
        for y in mark.y..mark.bottom() {
            for x in mark.x..mark.right() {
                assert_ne!(*frame.get_pixel(x, y), bright, "frame {i} pixel ({x},{y})");
            }
        }
    }
}

#[test]
fn engine_cleans_image_directory() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("clip");
    std::fs::create_dir_all(&input).unwrap();
    let mark = Region::new(88, 90, 10, 10);
    for i in 0..3 {
        let mut f = RgbImage::from_pixel(100, 100, Rgb([30, 60, 90]));
        paint(&mut f, &mark, Rgb([250, 250, 250]));
        f.save(input.join(format!("{i:04}.png"))).unwrap();
    }

    let output = root.path().join("clean");
    let result = WatermarkEngine::new().process_sequence(
        &input,
        &output,
        &ProcessOptions::default(),
        &NoProgress,
    );
    assert!(result.success, "{}", result.message);
    assert_eq!(result.frames, 3);

    let last = image::open(output.join("frame_000002.png")).unwrap().to_rgb8();
    assert_ne!(*last.get_pixel(92, 94), Rgb([250, 250, 250]));
}
