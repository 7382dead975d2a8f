use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

fn run_burnin(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_burnin"))
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("burnin command should run")
}

#[test]
fn check_summarizes_a_valid_manifest() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(dir.path().join("aries.mp4"), b"stub").expect("clip should write");
    fs::write(dir.path().join("narration.wav"), b"stub").expect("audio should write");
    fs::write(
        dir.path().join("assembly.yaml"),
        r#"
segments:
  - name: मेष
    clip: aries.mp4
aliases:
  mesh: मेष
audio: narration.wav
"#,
    )
    .expect("manifest should write");

    let output = run_burnin(dir.path(), &["check", "assembly.yaml"]);
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("OK:"));
    assert!(stdout.contains("1 segments"));
    assert!(stdout.contains("मेष"));
}

#[test]
fn check_fails_on_missing_clip_with_its_path() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(dir.path().join("narration.wav"), b"stub").expect("audio should write");
    fs::write(
        dir.path().join("assembly.yaml"),
        r#"
segments:
  - name: मेष
    clip: nowhere.mp4
audio: narration.wav
"#,
    )
    .expect("manifest should write");

    let output = run_burnin(dir.path(), &["check", "assembly.yaml"]);
    assert!(!output.status.success(), "missing clip must fail check");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nowhere.mp4"));
}

#[test]
fn tokens_prints_the_timing_table() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(
        dir.path().join("words.json"),
        r#"[
            {"word": "नमस्ते", "start": 0.0, "end": 0.48},
            {"word": "doston", "start": 0.48, "end": 1.02}
        ]"#,
    )
    .expect("tokens should write");

    let output = run_burnin(dir.path(), &["tokens", "words.json"]);
    assert!(output.status.success(), "tokens should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("नमस्ते"));
    assert!(stdout.contains("doston"));
    assert!(stdout.contains("2 tokens"));
}

#[test]
fn tokens_rejects_inverted_intervals() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(
        dir.path().join("words.json"),
        r#"[{"word": "ulta", "start": 2.0, "end": 1.0}]"#,
    )
    .expect("tokens should write");

    let output = run_burnin(dir.path(), &["tokens", "words.json"]);
    assert!(!output.status.success(), "inverted interval must fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ulta"));
}
