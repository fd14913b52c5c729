//! Append-only audit log with a hash chain over its entries

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{utils, PokerError, PokerResult};
use crate::protocol::Envelope;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Whether a recorded message was sent or received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sent => f.write_str("sent"),
            Direction::Received => f.write_str("received"),
        }
    }
}

/// One link of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub prior_hash: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

impl AuditEntry {
    fn link_hash(prior_hash: &str, description: &str) -> String {
        let mut data = Vec::with_capacity(prior_hash.len() + description.len());
        data.extend_from_slice(prior_hash.as_bytes());
        data.extend_from_slice(description.as_bytes());
        utils::sha256_hex(&data)
    }
}

/// Tamper-evident record of every signed exchange of one role
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
    persist_to: Option<PathBuf>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every entry to `path` as a JSON line.
    ///
    /// The file is truncated first so that it holds exactly one chain.
    pub fn with_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        if let Err(e) = File::create(&path) {
            warn!(path = %path.display(), error = %e, "Failed to reset audit file");
        }
        Self {
            entries: Vec::new(),
            persist_to: Some(path),
        }
    }

    /// Append a free-form event
    pub fn append(&mut self, description: impl Into<String>) -> &AuditEntry {
        let description = description.into();
        let prior_hash = self
            .entries
            .last()
            .map(|entry| entry.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let entry = AuditEntry {
            sequence: self.entries.len() as u64,
            hash: AuditEntry::link_hash(&prior_hash, &description),
            prior_hash,
            description,
            timestamp: Utc::now(),
        };

        if let Some(path) = &self.persist_to {
            if let Err(e) = persist(path, &entry) {
                warn!(path = %path.display(), error = %e, "Failed to persist audit entry");
            }
        }

        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Append a sent or received signed message
    pub fn record(&mut self, direction: Direction, envelope: &Envelope) -> &AuditEntry {
        let sender = envelope
            .sender()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "playing area".to_string());
        let signature = envelope
            .signature
            .as_ref()
            .map(|signature| hex::encode(&signature[..signature.len().min(8)]))
            .unwrap_or_else(|| "unsigned".to_string());
        let body = envelope
            .message
            .canonical_bytes()
            .map(|bytes| utils::sha256_hex(&bytes))
            .unwrap_or_default();
        self.append(format!(
            "{} {} from {} sig={} body={}",
            direction,
            envelope.command(),
            sender,
            signature,
            body
        ))
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute every link. False as soon as one entry was altered.
    pub fn verify_chain(&self) -> bool {
        verify_entries(&self.entries)
    }

    /// Operator-facing dump of the log
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "#{:04} {} {} [{}..]\n",
                entry.sequence,
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.description,
                &entry.hash[..12]
            ));
        }
        out
    }

    /// Load entries previously persisted as JSON lines
    pub fn load(path: impl AsRef<Path>) -> PokerResult<Vec<AuditEntry>> {
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(PokerError::from))
            .collect()
    }
}

/// Check a chain of entries from the genesis link onwards
pub fn verify_entries(entries: &[AuditEntry]) -> bool {
    let mut prior = GENESIS_HASH.to_string();
    for (index, entry) in entries.iter().enumerate() {
        if entry.sequence != index as u64
            || entry.prior_hash != prior
            || entry.hash != AuditEntry::link_hash(&entry.prior_hash, &entry.description)
        {
            return false;
        }
        prior = entry.hash.clone();
    }
    true
}

fn persist(path: &Path, entry: &AuditEntry) -> PokerResult<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
