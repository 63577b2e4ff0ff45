//! Error types for tether-sync.

use thiserror::Error;

use tether_host::HostError;

/// Errors that abort a reconciliation before or outside per-object handling.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A host call failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// `sync` was called with no incoming objects.
    #[error("nothing to synchronize: the batch is empty")]
    EmptyBatch,
}
