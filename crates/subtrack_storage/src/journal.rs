#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document_store::{DocumentFields, StorageError};

pub const JOURNAL_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOp {
    Insert {
        collection: String,
        id: String,
        seq: u64,
        fields: DocumentFields,
    },
    Replace {
        collection: String,
        id: String,
        fields: DocumentFields,
    },
    Remove {
        collection: String,
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub schema_version: u8,
    pub op: JournalOp,
}

impl JournalEntry {
    pub fn v1(op: JournalOp) -> Self {
        Self {
            schema_version: JOURNAL_SCHEMA_VERSION,
            op,
        }
    }
}

/// Append-only JSON-lines journal. One entry per committed mutation.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: String) -> StorageError {
        StorageError::Journal {
            path: self.path.display().to_string(),
            reason,
        }
    }

    pub fn ensure_ready(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| self.error(format!("failed to create directory: {err}")))?;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| self.error(format!("failed to create journal: {err}")))?;
        Ok(())
    }

    pub fn read_entries(&self) -> Result<Vec<JournalEntry>, StorageError> {
        let file = File::open(&self.path)
            .map_err(|err| self.error(format!("failed to open journal: {err}")))?;
        let mut entries = Vec::new();
        for (line_no, line_result) in BufReader::new(file).lines().enumerate() {
            let line = line_result.map_err(|err| {
                self.error(format!("failed reading line {}: {}", line_no + 1, err))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(&line).map_err(|err| {
                self.error(format!("failed parsing line {}: {}", line_no + 1, err))
            })?;
            if entry.schema_version != JOURNAL_SCHEMA_VERSION {
                return Err(self.error(format!(
                    "unsupported schema_version={} at line {}",
                    entry.schema_version,
                    line_no + 1
                )));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn append(&self, entry: &JournalEntry) -> Result<(), StorageError> {
        let json = serde_json::to_string(entry)
            .map_err(|err| self.error(format!("failed to encode entry: {err}")))?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|err| self.error(format!("failed opening for append: {err}")))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_data())
            .map_err(|err| self.error(format!("failed writing entry: {err}")))?;
        Ok(())
    }
}
