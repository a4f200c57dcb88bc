//! Idempotency gate keyed on a fingerprint of the last notified reading.
//!
//! The upstream provider is polled more often than it publishes. The gate keeps
//! the SHA-256 digest of the last reading that triggered a notification and
//! suppresses the send while the reading is unchanged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::model::PollutionReading;
use crate::store::{self, StoreError};

/// Persisted gate state, stored as `{"hash": "<hex digest>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyState {
    /// Fingerprint of the last notified reading.
    pub hash: String,
}

/// Compute the SHA-256 hex digest of the reading's canonical JSON form.
///
/// Object keys are sorted recursively so field order never changes the digest.
///
/// # Errors
///
/// Returns [`StoreError::Json`] if the reading cannot be serialized.
pub fn fingerprint(reading: &PollutionReading) -> Result<String, StoreError> {
    let canonical = serde_json::to_string(&canonicalize(serde_json::to_value(reading)?))?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{digest:x}"))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map
                .into_iter()
                .map(|(key, nested)| (key, canonicalize(nested)))
                .collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// File-backed gate. One instance per state file.
#[derive(Debug, Clone)]
pub struct IdempotencyGate {
    path: PathBuf,
}

impl IdempotencyGate {
    /// Create a gate persisting its state at `path`.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state. A corrupt file counts as no state.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the file exists but cannot be read.
    pub fn load(&self) -> Result<Option<IdempotencyState>, StoreError> {
        match store::read_json::<IdempotencyState>(&self.path) {
            Err(StoreError::Json(err)) => {
                warn!(
                    error = %err,
                    path = %self.path.display(),
                    "Corrupt idempotency state, treating as first run",
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// Decide whether `reading` warrants a notification.
    ///
    /// Returns `false` without touching the file when the fingerprint matches the
    /// stored one. Otherwise the new fingerprint is persisted and `true` returned.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the state cannot be read or written.
    pub fn should_notify(&self, reading: &PollutionReading) -> Result<bool, StoreError> {
        let current = fingerprint(reading)?;

        if let Some(state) = self.load()?
            && state.hash == current
        {
            debug!(hash = %current, "reading unchanged since last notification");
            return Ok(false);
        }

        store::write_json_atomic(&self.path, &IdempotencyState { hash: current.clone() })?;
        info!(hash = %current, path = %self.path.display(), "recorded new reading fingerprint");
        Ok(true)
    }
}
