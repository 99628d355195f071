//! Error types for the clustering and sampling core.
//!
//! Only failures that abort an operation live here. Data sparsity (empty
//! sampling pools, sessions that reference unknown tracks) is reported
//! through [`crate::sampler::StageReport`] and
//! [`crate::track::ResolutionReport`] instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid parameters handed to an operation. Never retried.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("cluster {0} not found in the current snapshot")]
    UnknownCluster(usize),

    #[error("invalid track record {uri:?}: {reason}")]
    InvalidTrack { uri: String, reason: String },
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
