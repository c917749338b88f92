use std::path::Path;

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use predicates::prelude::*;
use sightline::CameraConfig;

fn sightline() -> Command {
    let mut cmd = Command::cargo_bin("sightline").expect("binary");
    cmd.arg("--log-level").arg("warn");
    cmd
}

fn init_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("front.json");
    sightline()
        .args(["init", "--name", "front", "--out"])
        .arg(&path)
        .assert()
        .success();
    path
}

#[test]
fn init_writes_loadable_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = init_config(dir.path());
    let config = CameraConfig::load_json(&path).expect("load");
    assert_eq!(config.name, "front");
    assert_eq!(config.pipelines.len(), 1);
    assert!(config.build_manager().is_ok());
}

#[test]
fn add_and_list_pipelines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = init_config(dir.path());
    sightline()
        .args(["add", "--kind", "colored-shape", "--name", "Cargo", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("1"));
    sightline()
        .arg("list")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cargo").and(predicate::str::contains("ColoredShape")));
}

#[test]
fn set_rejects_out_of_range_value_and_keeps_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = init_config(dir.path());
    let before = std::fs::read_to_string(&path).expect("read");

    sightline()
        .args(["set", "--field", "hsv_hue", "--value", "[50, 200]", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("hsv_hue"));
    assert_eq!(std::fs::read_to_string(&path).expect("read"), before);

    sightline()
        .args(["set", "--field", "hsv_hue", "--value", "[50, 70]", "--config"])
        .arg(&path)
        .assert()
        .success();
    let config = CameraConfig::load_json(&path).expect("load");
    let manager = config.build_manager().expect("valid");
    assert_eq!(
        manager.current_settings().get_field("hsv_hue").expect("field").to_string(),
        "[50, 70]"
    );
}

#[test]
fn run_prints_one_report_per_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = init_config(dir.path());
    sightline()
        .args(["set", "--field", "hsv_hue", "--value", "[50,70]", "--config"])
        .arg(&path)
        .assert()
        .success();

    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).expect("mkdir");
    for i in 0..3 {
        let mut img = RgbImage::from_pixel(160, 120, Rgb([20, 20, 20]));
        draw_filled_rect_mut(&mut img, Rect::at(40, 40).of_size(40, 20), Rgb([0, 255, 0]));
        img.save(frames.join(format!("{i}.png"))).expect("save");
    }
    let annotated = dir.path().join("annotated");

    let output = sightline()
        .arg("run")
        .arg("--config")
        .arg(&path)
        .arg("--images")
        .arg(&frames)
        .arg("--annotated")
        .arg(&annotated)
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 3);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["sequence"], i as u64);
        assert_eq!(line["targets"].as_array().expect("targets").len(), 1);
    }
    assert_eq!(std::fs::read_dir(&annotated).expect("annotated").count(), 3);
}

#[test]
fn calibrate_without_images_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    sightline()
        .args(["calibrate", "--cols", "7", "--rows", "5", "--square-size", "0.03", "--images"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no images"));
}
