//! Processed-email ledger for inbox mode
//!
//! Emails are `.md` files in a directory. The ledger is a JSON object keyed
//! by file name recording how each one was handled, so a restart picks up
//! the oldest email not yet seen.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Status recorded for a fully processed email
pub const STATUS_COMPLETED: &str = "completed";

/// Error type for inbox operations
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How one email was handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// `completed`, `read_error: ...` or `agent_error: ...`
    pub status: String,
    /// RFC 3339 UTC timestamp
    pub processed_at: String,
}

/// Ledger of processed emails, persisted as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct InboxLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl InboxLedger {
    /// Load the ledger at `path`
    ///
    /// A missing file is an empty ledger. So is a corrupt one; the damage
    /// is logged and the file is rewritten on the next save.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt email ledger");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read email ledger");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_processed(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&LedgerEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a status for an email, stamped with the current time
    pub fn mark(&mut self, name: impl Into<String>, status: impl Into<String>) {
        let entry = LedgerEntry {
            status: status.into(),
            processed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        self.entries.insert(name.into(), entry);
    }

    /// Write the ledger back to disk
    pub fn save(&self) -> Result<(), InboxError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| InboxError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, json).map_err(|source| InboxError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Saved email ledger");
        Ok(())
    }

    /// Unprocessed `.md` files in `dir`, oldest modification time first
    pub fn pending(&self, dir: &Path) -> Result<Vec<PathBuf>, InboxError> {
        let io_err = |source| InboxError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut emails: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if !path.is_file() || path.extension().map(|e| e != "md").unwrap_or(true) {
                continue;
            }
            if self.is_processed(&email_name(&path)) {
                continue;
            }
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            emails.push((modified, path));
        }
        emails.sort();
        Ok(emails.into_iter().map(|(_, path)| path).collect())
    }

    /// The oldest unprocessed email, if any
    pub fn next_pending(&self, dir: &Path) -> Result<Option<PathBuf>, InboxError> {
        Ok(self.pending(dir)?.into_iter().next())
    }
}

/// Ledger key for an email file
pub fn email_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
