use std::fs;
use std::path::Path;

use agent_pulse::tail::path_safety::ensure_regular_file;
use agent_pulse::tail::validate_log_path;

fn log_root_with_transcript() -> (tempfile::TempDir, std::path::PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("project");
    fs::create_dir_all(&project).expect("mkdir");
    let transcript = project.join("abc.jsonl");
    fs::write(&transcript, "").expect("write");
    (temp, transcript)
}

#[test]
fn allows_absolute_path_inside_root() {
    let (temp, transcript) = log_root_with_transcript();

    let validated = validate_log_path(temp.path(), &transcript).expect("path valid");

    let canonical_root = temp.path().canonicalize().expect("canonicalize root");
    assert!(validated.starts_with(&canonical_root));
    assert!(validated.ends_with("project/abc.jsonl"));
}

#[test]
fn allows_relative_path_inside_root() {
    let (temp, _) = log_root_with_transcript();

    let validated =
        validate_log_path(temp.path(), Path::new("project/abc.jsonl")).expect("path valid");

    assert!(validated.ends_with("project/abc.jsonl"));
}

#[test]
fn allows_dot_segments_that_stay_inside() {
    let (temp, _) = log_root_with_transcript();

    let result = validate_log_path(temp.path(), Path::new("./project/../project/abc.jsonl"));

    assert!(result.is_ok());
}

#[test]
fn rejects_traversal() {
    let (temp, _) = log_root_with_transcript();

    let result = validate_log_path(temp.path(), Path::new("../secret.jsonl"));

    assert!(result.is_err());
}

#[test]
fn rejects_file_outside_root() {
    let (temp, _) = log_root_with_transcript();
    let other = tempfile::tempdir().expect("tempdir");
    let outside = other.path().join("x.jsonl");
    fs::write(&outside, "").expect("write");

    let err = validate_log_path(temp.path(), &outside).expect_err("outside root");

    assert!(err.to_string().starts_with("path violation:"));
}

#[test]
fn rejects_missing_file() {
    let (temp, _) = log_root_with_transcript();

    assert!(validate_log_path(temp.path(), Path::new("project/missing.jsonl")).is_err());
}

#[test]
fn rejects_directory() {
    let (temp, _) = log_root_with_transcript();

    assert!(validate_log_path(temp.path(), Path::new("project")).is_err());
    assert!(ensure_regular_file(temp.path()).is_err());
}

#[test]
fn rejects_missing_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("nope");

    assert!(validate_log_path(&root, Path::new("a.jsonl")).is_err());
}

#[cfg(unix)]
#[test]
fn rejects_symlinked_transcript() {
    let (temp, transcript) = log_root_with_transcript();
    let link = temp.path().join("project").join("link.jsonl");
    std::os::unix::fs::symlink(&transcript, &link).expect("symlink");

    let err = validate_log_path(temp.path(), &link).expect_err("symlink refused");

    assert!(err.to_string().contains("symlink"));
}
