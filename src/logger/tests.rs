//! Integration tests for the logger writer and rotation path

use crate::logger::config::*;
use crate::logger::writer::RotatingFileWriter;
use std::fs;
use std::io::Write;
use tempfile::tempdir;
use tracing_subscriber::fmt::MakeWriter;

fn file_config(path: std::path::PathBuf, rotation: RotationConfig) -> FileConfig {
    FileConfig {
        enabled: true,
        path,
        append: true,
        format: LogFormat::Full,
        rotation,
    }
}

#[test]
fn writer_creates_missing_log_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("logs").join("app.log");

    let writer = RotatingFileWriter::new(&file_config(path.clone(), RotationConfig::default()));
    assert!(writer.is_ok());
    assert!(path.parent().unwrap().exists());
}

#[test]
fn writer_appends_to_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, "existing line\n").unwrap();

    let writer =
        RotatingFileWriter::new(&file_config(path.clone(), RotationConfig::default())).unwrap();
    {
        let mut guard = writer.make_writer();
        guard.write_all(b"new line\n").unwrap();
        guard.flush().unwrap();
    }

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("existing line\n"));
    assert!(content.ends_with("new line\n"));
}

#[test]
fn writer_truncates_when_append_disabled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, "old content\n").unwrap();

    let mut config = file_config(path.clone(), RotationConfig::default());
    config.append = false;

    let writer = RotatingFileWriter::new(&config).unwrap();
    {
        let mut guard = writer.make_writer();
        guard.write_all(b"fresh\n").unwrap();
        guard.flush().unwrap();
    }

    assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
}

#[test]
fn writer_rotates_once_size_threshold_is_reached() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.log");

    let rotation = RotationConfig {
        strategy: RotationStrategy::Size,
        max_size: 32,
        max_files: 5,
        compress: false,
    };
    let writer = RotatingFileWriter::new(&file_config(path.clone(), rotation)).unwrap();

    {
        let mut guard = writer.make_writer();
        // First write crosses the threshold, second write triggers rotation.
        guard.write_all(&[b'a'; 40]).unwrap();
        guard.flush().unwrap();
        guard.write_all(b"after rotation\n").unwrap();
        guard.flush().unwrap();
    }

    let rotated: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("app.") && name != "app.log")
        .collect();
    assert_eq!(rotated.len(), 1, "expected one rotated file, got {rotated:?}");

    // Active file only holds data written after rotation.
    assert_eq!(fs::read_to_string(&path).unwrap(), "after rotation\n");
    assert!(!writer.is_in_fallback_mode());
}

#[test]
fn writer_falls_back_to_stderr_when_rotation_fails() {
    let dir = tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let path = log_dir.join("app.log");

    let rotation = RotationConfig {
        strategy: RotationStrategy::Size,
        max_size: 8,
        max_files: 2,
        compress: false,
    };
    let writer = RotatingFileWriter::new(&file_config(path, rotation)).unwrap();

    {
        let mut guard = writer.make_writer();
        guard.write_all(b"0123456789abcdef").unwrap();
        let _ = guard.flush();

        // With the directory gone, rotation cannot rename the file. The
        // writer must keep accepting writes instead of erroring out.
        fs::remove_dir_all(&log_dir).unwrap();
        assert!(guard.write_all(b"lost to stderr").is_ok());
    }

    assert!(writer.is_in_fallback_mode());

    // Later writes keep succeeding in fallback mode.
    let mut guard = writer.make_writer();
    assert!(guard.write_all(b"still alive").is_ok());
}

#[test]
fn logger_config_rejects_all_outputs_disabled() {
    let config = LoggerConfig {
        console: ConsoleConfig::new(false, false),
        file: FileConfig::default(),
        level: "info".to_string(),
    };
    assert!(config.validate().is_err());
}
