use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("reconciliation did not finish within {0:?}")]
    Timeout(Duration),
}
