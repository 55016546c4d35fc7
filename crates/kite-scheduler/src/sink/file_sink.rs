//! Per-segment, append-only file log sink (spec §6's log file format).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use kite_model::LogSink;
use kite_secrets::SecretRegistry;

/// Writes lines of the form `[HH:mm:ss.SSS] [<segment-name>] <message>` to
/// `<logs_dir>/<segment-name>.log`, masking every line through the shared
/// `SecretRegistry` first (spec §4.4: "the logger sink always calls mask
/// before writing segment output to any persistent location").
pub struct FileLogSink {
    segment_name: String,
    secrets: Arc<SecretRegistry>,
    file: Mutex<File>,
}

impl FileLogSink {
    pub fn open(logs_dir: &Path, segment_name: &str, secrets: Arc<SecretRegistry>) -> std::io::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let path: PathBuf = logs_dir.join(format!("{segment_name}.log"));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            segment_name: segment_name.to_string(),
            secrets,
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileLogSink {
    fn write_line(&self, message: &str) {
        let masked = self.secrets.mask(message, true);
        let timestamp = Local::now().format("%H:%M:%S%.3f");
        let line = format!("[{timestamp}] [{}] {masked}\n", self.segment_name);
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}
