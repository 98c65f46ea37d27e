//! Up/down feedback counter persisted as a small JSON file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as TokioMutex;

use crate::error::{GaiaError, Result};

/// Current vote totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    #[serde(default)]
    pub up: u64,
    #[serde(default)]
    pub down: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Up,
    Down,
}

impl VoteKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "up" => Some(VoteKind::Up),
            "down" => Some(VoteKind::Down),
            _ => None,
        }
    }
}

/// File-backed vote totals shared by all requests
#[derive(Debug)]
pub struct VoteCounter {
    path: PathBuf,
    counts: TokioMutex<VoteCounts>,
}

impl VoteCounter {
    /// Load totals from `path`; a missing or unreadable file starts at zero
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let counts = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed vote file {}: {e}", path.display());
                VoteCounts::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VoteCounts::default(),
            Err(e) => {
                tracing::warn!("Failed to read vote file {}: {e}", path.display());
                VoteCounts::default()
            }
        };
        tracing::debug!(up = counts.up, down = counts.down, "Vote counter loaded");

        Self {
            path,
            counts: TokioMutex::new(counts),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn counts(&self) -> VoteCounts {
        *self.counts.lock().await
    }

    /// Count one vote and persist the new totals
    pub async fn record(&self, kind: VoteKind) -> Result<VoteCounts> {
        // Held across the write so files land in increment order.
        let mut counts = self.counts.lock().await;
        let mut next = *counts;
        match kind {
            VoteKind::Up => next.up = next.up.saturating_add(1),
            VoteKind::Down => next.down = next.down.saturating_add(1),
        }

        self.persist(&next).await?;
        *counts = next;
        Ok(next)
    }

    /// Write to a temp file, then rename over the old one
    async fn persist(&self, counts: &VoteCounts) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, serde_json::to_vec(counts)?).await?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            GaiaError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to replace vote file {}: {e}", self.path.display()),
            ))
        })
    }
}

/// `<data dir>/gaia-proxy/votes.json`, or `votes.json` in the working directory
pub fn default_vote_file() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("gaia-proxy").join("votes.json"))
        .unwrap_or_else(|| PathBuf::from("votes.json"))
}
