//! End-to-end tests of the framecut binary

use assert_cmd::Command;
use tempfile::TempDir;

fn framecut() -> Command {
    let mut cmd = Command::cargo_bin("framecut").unwrap();
    for key in [
        "FRAMECUT_LOG_LEVEL",
        "FRAMECUT_LOG_JSON",
        "FRAMECUT_FFMPEG",
        "FRAMECUT_FFPROBE",
        "FRAMECUT_FRAME_COUNT",
        "FRAMECUT_TICK_MS",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn input_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("holiday.mp4");
    std::fs::write(&path, vec![9u8; 256]).unwrap();
    path
}

#[test]
fn test_config_prints_defaults() {
    let dir = TempDir::new().unwrap();
    let output = framecut()
        .current_dir(dir.path())
        .arg("config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("[sampler]"));
    assert!(text.contains("frame_count = 10"));
    assert!(text.contains("tick_ms = 250"));
}

#[test]
fn test_config_precedence() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("framecut.toml"),
        "[sampler]\nframe_count = 3\n\n[trim]\nevent_capacity = 16\n",
    )
    .unwrap();

    let output = framecut()
        .current_dir(dir.path())
        .env("FRAMECUT_FRAME_COUNT", "7")
        .arg("config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("frame_count = 7"));
    assert!(text.contains("event_capacity = 16"));
}

#[test]
fn test_dry_run_strip_writes_frames() {
    let dir = TempDir::new().unwrap();
    let input = input_file(&dir);
    let out_dir = dir.path().join("thumbs");

    let output = framecut()
        .current_dir(dir.path())
        .args(["--dry-run", "strip", "--count", "4", "--json", "--input"])
        .arg(&input)
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let frames: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let times: Vec<f64> = frames
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["time"].as_f64().unwrap())
        .collect();
    assert_eq!(times, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    for index in 0..5 {
        assert!(out_dir.join(format!("frame_{:03}.png", index)).exists());
    }
}

#[test]
fn test_dry_run_trim_saves_artifact() {
    let dir = TempDir::new().unwrap();
    let input = input_file(&dir);

    framecut()
        .current_dir(dir.path())
        .args(["--dry-run", "trim", "--start", "00:02", "--duration", "5", "--input"])
        .arg(&input)
        .assert()
        .success();

    let artifact = dir.path().join("holiday_trim_2s_7s.mp4");
    assert_eq!(std::fs::read(artifact).unwrap(), vec![9u8; 256]);
}

#[test]
fn test_dry_run_trim_json_progress() {
    let dir = TempDir::new().unwrap();
    let input = input_file(&dir);
    let output_path = dir.path().join("out.mp4");

    let output = framecut()
        .current_dir(dir.path())
        .args(["--dry-run", "trim", "--start", "1", "--duration", "2", "--json", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["state"], "running");
    assert_eq!(events.last().unwrap()["state"], "completed");
    assert!(output_path.exists());
}

#[test]
fn test_trim_rejects_start_past_end() {
    let dir = TempDir::new().unwrap();
    let input = input_file(&dir);

    framecut()
        .current_dir(dir.path())
        .args(["--dry-run", "trim", "--start", "30", "--duration", "1", "--input"])
        .arg(&input)
        .assert()
        .failure();
}

#[test]
fn test_invalid_arguments_fail() {
    framecut()
        .args(["trim", "--input", "a.mp4", "--start", "abc", "--duration", "1", "--dry-run"])
        .assert()
        .failure();

    framecut()
        .args(["strip", "--input", "a.mp4", "--count", "0"])
        .assert()
        .failure()
        .code(2);

    framecut().assert().failure();
}

#[test]
fn test_missing_input_file_fails() {
    let dir = TempDir::new().unwrap();
    framecut()
        .current_dir(dir.path())
        .args(["--dry-run", "strip", "--input", "does-not-exist.mp4"])
        .assert()
        .failure();
}
