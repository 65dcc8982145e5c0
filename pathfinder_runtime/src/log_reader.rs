//! Line-delimited audit log reader.
//!
//! Storage format: one JSON object per line, as written by the mapping
//! service's audit logger. Blank lines are ignored. Lines are decoded
//! lazily so a multi-million line log never has to sit in memory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::RuntimeError;

/// One decoded log line and its 1-based position in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub line_no: usize,
    pub value: Value,
}

/// Read-only handle on an audit log file.
#[derive(Debug, Clone)]
pub struct LogReader {
    path: PathBuf,
}

impl LogReader {
    /// Open a log. Fails if the file does not exist or is unreadable.
    pub fn open(path: &Path) -> Result<Self, RuntimeError> {
        File::open(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate decoded lines in file order.
    pub fn lines(&self) -> Result<impl Iterator<Item = Result<LogLine, RuntimeError>>, RuntimeError> {
        let file = File::open(&self.path).map_err(|source| self.io_error(source))?;
        let path = self.path.clone();
        let lines = BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(idx, line)| {
                let line_no = idx + 1;
                match line {
                    Err(source) => Some(Err(RuntimeError::Io {
                        path: path.clone(),
                        source,
                    })),
                    Ok(text) if text.trim().is_empty() => None,
                    Ok(text) => Some(
                        serde_json::from_str(&text)
                            .map(|value| LogLine { line_no, value })
                            .map_err(|source| RuntimeError::Json { line_no, source }),
                    ),
                }
            });
        Ok(lines)
    }

    /// Load and decode every line.
    pub fn load_all(&self) -> Result<Vec<LogLine>, RuntimeError> {
        self.lines()?.collect()
    }

    fn io_error(&self, source: std::io::Error) -> RuntimeError {
        RuntimeError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
