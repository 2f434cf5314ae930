use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use fontflow_core::fixtures;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

fn font_dir() -> TempDir {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("family");
    fs::create_dir_all(&nested).expect("mkdir");
    fs::write(
        nested.join("Fixture-Regular.ttf"),
        fixtures::truetype_font("Fixture Sans", "Regular", 400),
    )
    .expect("ttf");
    fs::write(
        nested.join("Fixture-BoldItalic.otf"),
        fixtures::opentype_font("Fixture Sans", "Bold Italic", 700),
    )
    .expect("otf");
    fs::write(tmp.path().join("notes.txt"), b"not a font").expect("txt");
    tmp
}

fn fontflow(args: &[&str], path: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fontflow"))
        .args(args)
        .arg(path)
        .env("RUST_LOG", "error")
        .output()
        .expect("run fontflow")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn inspect_json_lists_every_font() {
    let fonts = font_dir();
    let output = fontflow(&["inspect", "--json"], fonts.path());
    assert_success(&output);

    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let parsed: Value = serde_json::from_str(&stdout).expect("parse json output");
    let arr = parsed.as_array().expect("inspect --json returns a JSON array");
    assert_eq!(arr.len(), 2, "stdout:\n{stdout}");

    let otf = arr
        .iter()
        .find(|entry| entry["format"] == "otf")
        .expect("otf entry");
    assert_eq!(otf["metadata"]["family"], "Fixture Sans");
    assert_eq!(otf["metadata"]["weight"], 700);
    assert!(otf["path"]
        .as_str()
        .is_some_and(|p| p.ends_with("Fixture-BoldItalic.otf")));
}

#[test]
fn inspect_ndjson_emits_one_line_per_font() {
    let fonts = font_dir();
    let output = fontflow(&["inspect", "--ndjson"], fonts.path());
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "stdout:\n{stdout}");
    for line in lines {
        let entry: Value = serde_json::from_str(line).expect("ndjson line");
        assert_eq!(entry["metadata"]["manufacturer"], "Fixture Foundry");
    }
}

#[test]
fn inspect_plain_output_is_ansi_free_when_color_is_off() {
    let fonts = font_dir();
    let output = fontflow(&["inspect", "--color", "never"], fonts.path());
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 2);
    assert!(!stdout.contains("\u{1b}["));
}

#[test]
fn inspect_missing_path_fails() {
    let tmp = tempdir().expect("tempdir");
    let output = fontflow(&["inspect"], &tmp.path().join("missing"));

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
}

#[test]
fn convert_produces_woff2_from_opentype() {
    let fonts = font_dir();
    let input = fonts.path().join("family/Fixture-BoldItalic.otf");
    let output_path = fonts.path().join("out.woff2");

    let output = Command::new(env!("CARGO_BIN_EXE_fontflow"))
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(&output_path)
        .output()
        .expect("run fontflow");
    assert_success(&output);

    let written = fs::read(&output_path).expect("woff2 written");
    assert_eq!(&written[..4], b"wOF2");
    assert_eq!(&written[4..8], &[0, 1, 0, 0]);
}

#[test]
fn convert_rejects_non_fonts() {
    let tmp = tempdir().expect("tempdir");
    let input = tmp.path().join("photo.png");
    fs::write(&input, fixtures::png_bytes()).expect("png");

    let output = fontflow(&["convert"], &input);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error:"), "stderr: {stderr}");
    assert!(!tmp.path().join("photo.woff2").exists());
}
