use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use sightline_pipeline::{
    lock_camera, CameraConfig, FieldValue, ImageFileSource, PipelineResult, VisionContext,
};

fn write_frames(dir: &Path, count: u32) {
    for i in 0..count {
        let mut img = RgbImage::from_pixel(160, 120, Rgb([20, 20, 20]));
        draw_filled_rect_mut(
            &mut img,
            Rect::at(20 + 10 * i as i32, 40).of_size(40, 20),
            Rgb([0, 255, 0]),
        );
        img.save(dir.join(format!("frame_{i:02}.png")))
            .expect("write frame");
    }
}

#[test]
fn worker_replays_image_folder_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_frames(dir.path(), 4);
    std::fs::write(dir.path().join("notes.txt"), "not an image").expect("write");

    let mut ctx = VisionContext::new();
    let camera = ctx
        .add_camera(CameraConfig::new("front", 70.0))
        .expect("camera");
    lock_camera(&camera)
        .manager
        .set_field(0, "hsv_hue", FieldValue::IntPair([50, 70]))
        .expect("hue");

    let source = ImageFileSource::from_dir(dir.path()).expect("source");
    assert_eq!(source.remaining(), 4);
    ctx.attach_source("front", Box::new(source)).expect("attach");

    let (tx, rx) = crossbeam_channel::unbounded::<PipelineResult>();
    let worker = ctx.start("front", Box::new(tx)).expect("start");
    let results: Vec<PipelineResult> = rx.iter().collect();
    let stats = worker.stop();

    assert_eq!(stats.frames, 4);
    assert_eq!(
        results.iter().map(|r| r.sequence).collect::<Vec<_>>(),
        [0, 1, 2, 3]
    );
    let xs: Vec<f64> = results
        .iter()
        .map(|r| {
            assert_eq!(r.targets.len(), 1);
            r.targets[0].centroid.x
        })
        .collect();
    assert!(xs.windows(2).all(|w| w[1] > w[0]), "frames out of order: {xs:?}");
    assert!(results
        .windows(2)
        .all(|w| w[1].capture_timestamp_nanos >= w[0].capture_timestamp_nanos));
}

#[test]
fn context_configs_reflect_live_edits() {
    let mut ctx = VisionContext::new();
    let camera = ctx
        .add_camera(CameraConfig::new("front", 70.0))
        .expect("camera");
    lock_camera(&camera)
        .manager
        .rename(0, "Tape")
        .expect("rename");

    let configs = ctx.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].pipelines[0].nickname(), "Tape");
}
