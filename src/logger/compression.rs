//! Gzip compression of rotated log files

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Compresses rotated log files in place
pub struct CompressionHandler {
    enabled: bool,
}

impl CompressionHandler {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Compress `file_path` to `<file_path>.gz` and remove the original.
    ///
    /// A no-op when compression is disabled.
    pub fn compress_file(&self, file_path: &Path) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let compressed_path = file_path.with_extension(
            format!(
                "{}.gz",
                file_path.extension().unwrap_or_default().to_string_lossy()
            )
            .trim_start_matches('.'),
        );

        let mut input = File::open(file_path)?;
        let output = File::create(&compressed_path)?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;

        fs::remove_file(file_path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_compression_disabled_leaves_file_untouched() {
        let handler = CompressionHandler::new(false);
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.log");

        fs::write(&file_path, "test content").unwrap();

        handler.compress_file(&file_path).unwrap();
        assert!(file_path.exists());
        assert!(!dir.path().join("test.log.gz").exists());
    }

    #[test]
    fn test_compression_replaces_original() {
        let handler = CompressionHandler::new(true);
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.log");

        fs::write(&file_path, "test content for compression").unwrap();

        handler.compress_file(&file_path).unwrap();
        assert!(!file_path.exists());
        assert!(dir.path().join("test.log.gz").exists());
    }

    #[test]
    fn test_compressed_content_round_trips() {
        let handler = CompressionHandler::new(true);
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.log");
        let content = "line one\nline two\nline three\n";

        fs::write(&file_path, content).unwrap();
        handler.compress_file(&file_path).unwrap();

        let compressed = fs::read(dir.path().join("test.log.gz")).unwrap();
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut decompressed = String::new();
        decoder.read_to_string(&mut decompressed).unwrap();

        assert_eq!(decompressed, content);
    }
}
