//! Subscriber list synchronisation against the platform's follower API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::model::SubscriberList;
use crate::ports::{FollowerSource, PortError};
use crate::store::{self, StoreError};

/// Errors that abort a subscriber sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The follower listing failed; the persisted list was left alone.
    #[error("follower listing failed: {0}")]
    Source(#[from] PortError),
    /// The list could not be persisted.
    #[error("could not persist subscriber list: {0}")]
    Store(#[from] StoreError),
}

/// Fetches followers and keeps the local subscriber file in step.
pub struct SubscriberRegistry {
    source: Arc<dyn FollowerSource>,
    path: PathBuf,
}

impl SubscriberRegistry {
    /// Create a registry persisting to `path`.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(source: Arc<dyn FollowerSource>, path: P) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    /// Replace the persisted list with the platform's current followers.
    ///
    /// An empty follower set is persisted as an empty list. Any listing failure,
    /// including authentication, leaves the existing file untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] when the listing or the write fails.
    pub async fn sync(&self) -> Result<SubscriberList, SyncError> {
        let followers = match self.source.followers().await {
            Ok(followers) => followers,
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "subscriber sync aborted, keeping existing list");
                return Err(err.into());
            }
        };

        let list = SubscriberList::from_ids(followers);
        store::write_json_atomic(&self.path, &list)?;

        if list.is_empty() {
            info!(path = %self.path.display(), "no followers, subscriber list cleared");
        } else {
            info!(count = list.len(), path = %self.path.display(), "subscriber list synced");
        }
        Ok(list)
    }

    /// Persisted subscriber list.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the file exists but cannot be read.
    pub fn load(&self) -> Result<SubscriberList, StoreError> {
        load_subscribers(&self.path)
    }
}

/// Read a subscriber file; a missing file is an empty list.
///
/// # Errors
///
/// Returns a [`StoreError`] when the file exists but cannot be read.
pub fn load_subscribers(path: &Path) -> Result<SubscriberList, StoreError> {
    Ok(store::read_json(path)?.unwrap_or_default())
}
