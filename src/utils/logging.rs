//! Append-only transcript logging.
//!
//! Logging targets a user-chosen file and can be enabled at startup (config
//! or `--log`) or toggled at runtime with `/log`. Failures to write are
//! reported to the caller; they never interrupt the chat flow.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub struct TranscriptLog {
    file_path: Option<String>,
    is_active: bool,
}

impl TranscriptLog {
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut log = TranscriptLog {
            file_path: None,
            is_active: false,
        };
        if let Some(path) = log_file {
            log.set_log_file(path)?;
        }
        Ok(log)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn std::error::Error>> {
        self.check_writable(&path)?;
        self.file_path = Some(path.clone());
        self.is_active = true;
        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                self.is_active = !self.is_active;
                if self.is_active {
                    Ok(format!("Logging resumed to: {path}"))
                } else {
                    Ok(format!("Logging paused (file: {path})"))
                }
            }
            None => Err("No log file configured. Use /log <filename> first.".into()),
        }
    }

    /// Append one transcript entry, line by line, with a blank separator.
    pub fn log_entry(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let (Some(path), true) = (self.file_path.as_ref(), self.is_active) else {
            return Ok(());
        };

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for line in content.lines() {
            writeln!(file, "{line}")?;
        }
        writeln!(file)?;
        file.flush()?;
        Ok(())
    }

    pub fn status(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!(
                "active ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
            (Some(path), false) => format!(
                "paused ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
        }
    }

    fn check_writable(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| format!("cannot write to {path}: {e}").into())
    }
}
