//! File rotation management for the logger

use crate::logger::compression::CompressionHandler;
use crate::logger::config::{RotationConfig, RotationStrategy, TimeUnit};
use jiff::{Timestamp, Zoned};
use std::fs;
use std::path::{Path, PathBuf};

/// Manages file rotation based on the configured strategy
pub struct RotationManager {
    config: RotationConfig,
    compression: CompressionHandler,
    last_rotation: Timestamp,
}

impl RotationManager {
    pub fn new(config: RotationConfig) -> Self {
        let compression = CompressionHandler::new(config.compress);

        Self {
            config,
            compression,
            last_rotation: Timestamp::now(),
        }
    }

    /// Whether the current file should be rotated before the next write.
    pub fn should_rotate(&self, current_file_size: u64) -> bool {
        match self.config.strategy {
            RotationStrategy::Size => current_file_size >= self.config.max_size,
            RotationStrategy::Time(unit) => self.interval_elapsed(unit),
            // Count-based rotation only trims old files during cleanup.
            RotationStrategy::Count => false,
            RotationStrategy::Combined => {
                current_file_size >= self.config.max_size
                    || self.interval_elapsed(TimeUnit::Daily)
            }
        }
    }

    fn interval_elapsed(&self, unit: TimeUnit) -> bool {
        let now = Timestamp::now();
        now.duration_since(self.last_rotation) >= unit.interval_from(self.last_rotation)
    }

    /// Move the current file aside under a timestamped name, compress it if
    /// configured, and trim old rotated files.
    pub fn rotate(&mut self, current_path: &Path) -> anyhow::Result<()> {
        let rotated_path = self.rotated_path_for(current_path);

        if current_path.exists() {
            fs::rename(current_path, &rotated_path)?;

            if self.config.compress {
                self.compression.compress_file(&rotated_path)?;
            }
        }

        self.last_rotation = Timestamp::now();

        self.cleanup_old_files(current_path)?;

        Ok(())
    }

    /// Timestamped name for a rotated file, `app.20250115_093000.log`.
    fn rotated_path_for(&self, base_path: &Path) -> PathBuf {
        let timestamp = Zoned::now().strftime("%Y%m%d_%H%M%S");
        let stem = base_path.file_stem().unwrap_or_default().to_string_lossy();
        let ext = base_path.extension().unwrap_or_default().to_string_lossy();

        let new_name = if ext.is_empty() {
            format!("{}.{}", stem, timestamp)
        } else {
            format!("{}.{}.{}", stem, timestamp, ext)
        };

        base_path.with_file_name(new_name)
    }

    /// Delete the oldest rotated files until at most `max_files - 1` remain
    /// alongside the active file.
    fn cleanup_old_files(&self, base_path: &Path) -> anyhow::Result<()> {
        let parent = base_path.parent().unwrap_or(Path::new("."));
        let stem = base_path.file_stem().unwrap_or_default().to_string_lossy();

        let mut rotated: Vec<PathBuf> = fs::read_dir(parent)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let file_name = path.file_name().unwrap_or_default().to_string_lossy();
                file_name.starts_with(&*stem) && path != base_path
            })
            .collect();

        // Oldest first by modification time.
        rotated.sort_by(|a, b| {
            let a_time = fs::metadata(a).and_then(|m| m.modified()).ok();
            let b_time = fs::metadata(b).and_then(|m| m.modified()).ok();
            a_time.cmp(&b_time)
        });

        while rotated.len() >= self.config.max_files {
            let oldest = rotated.remove(0);
            fs::remove_file(&oldest)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_should_rotate_by_size() {
        let config = RotationConfig {
            strategy: RotationStrategy::Size,
            max_size: 1024,
            max_files: 5,
            compress: false,
        };
        let manager = RotationManager::new(config);

        assert!(!manager.should_rotate(512));
        assert!(!manager.should_rotate(1023));
        assert!(manager.should_rotate(1024));
        assert!(manager.should_rotate(2048));
    }

    #[test]
    fn test_time_strategy_does_not_rotate_immediately() {
        let config = RotationConfig {
            strategy: RotationStrategy::Time(TimeUnit::Daily),
            max_size: 1024,
            max_files: 5,
            compress: false,
        };
        let manager = RotationManager::new(config);
        assert!(!manager.should_rotate(u64::MAX));
    }

    #[test]
    fn test_count_strategy_never_rotates_on_write() {
        let config = RotationConfig {
            strategy: RotationStrategy::Count,
            max_size: 1,
            max_files: 5,
            compress: false,
        };
        let manager = RotationManager::new(config);
        assert!(!manager.should_rotate(u64::MAX));
    }

    #[test]
    fn test_rotate_moves_file_aside() {
        let dir = tempdir().unwrap();
        let base_path = dir.path().join("app.log");
        fs::write(&base_path, "current content").unwrap();

        let mut manager = RotationManager::new(RotationConfig::default());
        manager.rotate(&base_path).unwrap();

        assert!(!base_path.exists());

        let rotated: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("app.") && name != "app.log")
            .collect();
        assert_eq!(rotated.len(), 1);
        assert!(rotated[0].ends_with(".log"));
    }

    #[test]
    fn test_rotate_compresses_when_enabled() {
        let dir = tempdir().unwrap();
        let base_path = dir.path().join("app.log");
        fs::write(&base_path, "compress me").unwrap();

        let config = RotationConfig {
            compress: true,
            ..Default::default()
        };
        let mut manager = RotationManager::new(config);
        manager.rotate(&base_path).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|name| name.ends_with(".log.gz")));
        assert!(!names.iter().any(|name| name.ends_with(".log")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Size-based rotation triggers exactly when the size threshold is hit.
        #[test]
        fn property_rotation_triggers_when_size_exceeds_max(
            current_size in 1u64..10_000_000u64,
            max_size in 1u64..10_000_000u64
        ) {
            let config = RotationConfig {
                strategy: RotationStrategy::Size,
                max_size,
                max_files: 5,
                compress: false,
            };
            let manager = RotationManager::new(config);

            prop_assert_eq!(manager.should_rotate(current_size), current_size >= max_size);
        }

        /// Rotation keeps the rotated file count under max_files no matter
        /// how many stale files were left behind.
        #[test]
        fn property_file_count_maintained_after_rotation(
            max_files in 2usize..10usize,
            initial_file_count in 1usize..15usize
        ) {
            let dir = tempdir().unwrap();
            let base_path = dir.path().join("test.log");

            // Stale rotated files with explicitly staggered mtimes, oldest first.
            for i in 0..initial_file_count {
                let rotated_path = dir.path().join(format!("test.{:04}.log", i));
                let mut file = fs::File::create(&rotated_path).unwrap();
                writeln!(file, "content {}", i).unwrap();

                let base_time = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_secs();
                let file_time = filetime::FileTime::from_unix_time(
                    (base_time - (initial_file_count - i) as u64 * 60) as i64,
                    0
                );
                filetime::set_file_mtime(&rotated_path, file_time).unwrap();
            }

            fs::write(&base_path, "current log content").unwrap();

            let config = RotationConfig {
                strategy: RotationStrategy::Size,
                max_size: 100,
                max_files,
                compress: false,
            };
            let mut manager = RotationManager::new(config);

            prop_assert!(manager.rotate(&base_path).is_ok());

            let remaining = fs::read_dir(dir.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    name.starts_with("test.") && name != "test.log"
                })
                .count();

            prop_assert!(
                remaining < max_files,
                "File count {} should be less than max_files {}",
                remaining, max_files
            );
        }
    }
}
