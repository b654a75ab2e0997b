#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn noise_png(path: &Path, w: u32, h: u32) {
    image::GrayImage::from_fn(w, h, |x, y| {
        let mut v = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
        v ^= v >> 15;
        v = v.wrapping_mul(0x2C1B_3C6D);
        v ^= v >> 12;
        image::Luma([(v % 256) as u8])
    })
    .save(path)
    .expect("save png");
}

fn cli() -> Command {
    Command::cargo_bin("nft-marker").expect("binary built")
}

#[test]
fn generate_then_inspect() {
    let root = tempfile::tempdir().expect("tempdir");
    let image = root.path().join("cover.png");
    noise_png(&image, 640, 480);

    let out = cli()
        .args(["generate", "--id", "cover", "--density", "low", "--levels", "2"])
        .arg("--image")
        .arg(&image)
        .arg("--root")
        .arg(root.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).expect("json report");
    assert_eq!(report["marker_id"], "cover");
    assert_eq!(report["feature_counts_per_level"].as_array().unwrap().len(), 2);

    let marker = root.path().join("nft_markers/cover");
    cli()
        .arg("inspect")
        .arg(marker.join("cover.fset"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"fset\""))
        .stdout(predicate::str::contains("\"density\": \"low\""));
    cli()
        .arg("inspect")
        .arg(marker.join("cover.fset3"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"scale\": 2"));
    cli()
        .arg("inspect")
        .arg(marker.join("cover.iset"))
        .assert()
        .success()
        .stdout(predicate::str::contains("cover.png"));
}

#[test]
fn generate_reads_json_config() {
    let root = tempfile::tempdir().expect("tempdir");
    let image = root.path().join("poster.png");
    noise_png(&image, 480, 600);
    let config = root.path().join("marker.json");
    std::fs::write(&config, r#"{ "pyramid_levels": 1, "source_dpi": 150.0 }"#).unwrap();
    let report = root.path().join("report.json");

    cli()
        .args(["generate", "--id", "poster"])
        .arg("--image")
        .arg(&image)
        .arg("--root")
        .arg(root.path())
        .arg("--config")
        .arg(&config)
        .arg("--out")
        .arg(&report)
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&report).unwrap()).expect("json report");
    assert_eq!(report["target_dpi"], 150.0);
    assert_eq!(report["feature_counts_per_level"].as_array().unwrap().len(), 1);
}

#[test]
fn too_small_image_fails_without_output() {
    let root = tempfile::tempdir().expect("tempdir");
    let image = root.path().join("thumb.png");
    noise_png(&image, 400, 400);

    cli()
        .args(["generate", "--id", "thumb"])
        .arg("--image")
        .arg(&image)
        .arg("--root")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("image too small: 400x400"));
    assert!(!root.path().join("nft_markers").exists());
}

#[test]
fn rejects_unsafe_marker_id() {
    let root = tempfile::tempdir().expect("tempdir");
    let image = root.path().join("a.png");
    noise_png(&image, 480, 480);

    cli()
        .args(["generate", "--id", "../escape"])
        .arg("--image")
        .arg(&image)
        .arg("--root")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid marker id"));
}

#[test]
fn inspect_rejects_foreign_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "hello world").unwrap();

    cli()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a marker artifact"));
}

#[test]
fn purge_cache_on_empty_root_removes_nothing() {
    let root = tempfile::tempdir().expect("tempdir");
    cli()
        .args(["purge-cache", "--ttl-days", "0"])
        .arg("--root")
        .arg(root.path())
        .assert()
        .success()
        .stdout("0\n");
}
