//! Size-based rolling log files.
//!
//! `current.log` rotates at the byte budget into `current.log.1`,
//! `.2`, …; the oldest file past the retention count is deleted.
//! Plugs into tracing-subscriber as a `MakeWriter`.

use crate::config::LoggingConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

struct Inner {
    file: File,
    written: u64,
}

#[derive(Clone)]
pub struct RollingFileWriter {
    path: PathBuf,
    max_bytes: u64,
    max_files: u32,
    inner: Arc<Mutex<Inner>>,
}

impl RollingFileWriter {
    pub fn new(config: &LoggingConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.directory)?;
        let path = config.directory.join(&config.file_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes: config.max_file_bytes,
            max_files: config.max_files,
            inner: Arc::new(Mutex::new(Inner { file, written })),
        })
    }

    fn rotated_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&self, inner: &mut Inner) -> io::Result<()> {
        inner.file.flush()?;
        // Shift current.log.{n} -> .{n+1}, dropping the oldest
        let oldest = self.rotated_path(self.max_files.saturating_sub(1));
        let _ = std::fs::remove_file(&oldest);
        for index in (1..self.max_files.saturating_sub(1)).rev() {
            let from = self.rotated_path(index);
            if from.exists() {
                let _ = std::fs::rename(&from, self.rotated_path(index + 1));
            }
        }
        if self.max_files > 1 {
            std::fs::rename(&self.path, self.rotated_path(1))?;
        } else {
            std::fs::remove_file(&self.path)?;
        }
        inner.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        inner.written = 0;
        Ok(())
    }
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.written + buf.len() as u64 > self.max_bytes {
            self.rotate(&mut inner)?;
        }
        let n = inner.file.write(buf)?;
        inner.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RollingFileWriter {
    type Writer = RollingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global subscriber: env-filtered stdout plus the rolling
/// file sink.
pub fn init_logging(config: &LoggingConfig) -> io::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let file_writer = RollingFileWriter::new(config)?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path, max_bytes: u64, max_files: u32) -> LoggingConfig {
        LoggingConfig {
            directory: dir.to_path_buf(),
            file_name: "test.log".into(),
            max_file_bytes: max_bytes,
            max_files,
        }
    }

    #[test]
    fn test_writes_land_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RollingFileWriter::new(&test_config(dir.path(), 1024, 3)).unwrap();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();
        let content = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert_eq!(content, "hello\n");
    }

    #[test]
    fn test_rotation_at_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RollingFileWriter::new(&test_config(dir.path(), 10, 3)).unwrap();
        writer.write_all(b"aaaaaaaa\n").unwrap(); // 9 bytes
        writer.write_all(b"bbbb\n").unwrap(); // would exceed: rotates
        writer.flush().unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("test.log")).unwrap(),
            "bbbb\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("test.log.1")).unwrap(),
            "aaaaaaaa\n"
        );
    }

    #[test]
    fn test_retention_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RollingFileWriter::new(&test_config(dir.path(), 4, 2)).unwrap();
        for chunk in [b"11\n" as &[u8], b"22\n", b"33\n", b"44\n"] {
            writer.write_all(chunk).unwrap();
        }
        writer.flush().unwrap();
        // Only the live file and one rotation survive
        assert!(dir.path().join("test.log").exists());
        assert!(dir.path().join("test.log.1").exists());
        assert!(!dir.path().join("test.log.2").exists());
    }
}
