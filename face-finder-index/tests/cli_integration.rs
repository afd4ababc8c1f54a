use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the CLI binary from inside `temp_dir` with the given args
fn run_cli(temp_dir: &TempDir, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_face-finder"))
        .current_dir(temp_dir.path())
        .arg("--db")
        .arg(temp_dir.path().join("faces.db"))
        .args(args)
        .output()?;
    Ok(output)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Settings whose provider is a shell script reporting no faces in any image
fn write_faceless_settings(dir: &Path) -> Result<()> {
    let settings = r#"
workers = 2

[provider]
command = "sh"
args = ["-c", "echo '{\"locations\": [], \"encodings\": []}'", "face-embed"]
"#;
    fs::write(dir.join("face-finder.toml"), settings)?;
    Ok(())
}

#[test]
fn test_stats_without_database_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = run_cli(&temp_dir, &["stats"])?;

    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"));
    assert!(!temp_dir.path().join("faces.db").exists());
    Ok(())
}

#[test]
fn test_init_then_stats() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = run_cli(&temp_dir, &["init"])?;
    assert!(output.status.success(), "init failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Initialized face index"));

    let output = run_cli(&temp_dir, &["stats"])?;
    assert!(output.status.success());
    assert!(stdout(&output).contains("Face records: 0"));

    let output = run_cli(&temp_dir, &["--format", "json", "stats"])?;
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(stats["face_rows"], 0);
    Ok(())
}

#[test]
fn test_search_rejects_out_of_range_tolerance() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(temp_dir.path().join("me.jpg"), b"x")?;
    run_cli(&temp_dir, &["init"])?;

    let output = run_cli(&temp_dir, &["search", "me.jpg", "--tolerance", "1.5"])?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Tolerance must be strictly between 0 and 1"));
    Ok(())
}

#[test]
fn test_invalid_format_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = run_cli(&temp_dir, &["--format", "xml", "stats"])?;
    assert!(!output.status.success());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_index_list_and_search_with_script_provider() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_faceless_settings(temp_dir.path())?;
    let photos = temp_dir.path().join("photos");
    fs::create_dir(&photos)?;
    fs::write(photos.join("beach.jpg"), b"x")?;
    fs::write(photos.join("notes.txt"), b"x")?;
    fs::write(temp_dir.path().join("me.jpg"), b"x")?;

    let output = run_cli(&temp_dir, &["index", "photos"])?;
    assert!(output.status.success(), "index failed: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Files successfully processed: 1"), "{text}");
    assert!(text.trim_end().ends_with("DONE"));

    let output = run_cli(&temp_dir, &["list"])?;
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Found 1 files:"));
    assert!(text.contains("beach.jpg | Faces: 0"));

    let output = run_cli(&temp_dir, &["--format", "json", "search", "me.jpg"])?;
    assert!(output.status.success(), "search failed: {}", stderr(&output));
    let text = stdout(&output);
    let last = text.lines().last().unwrap_or_default();
    let outcome: serde_json::Value = serde_json::from_str(last)?;
    assert_eq!(outcome["matches"], serde_json::json!([]));
    assert!(text.contains(r#""kind":"completed""#));
    Ok(())
}
