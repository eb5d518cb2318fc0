//! Error types shared across the overlay manager.
//!
//! Every failure in this crate is recoverable: at worst a single instance is
//! dropped from the live set. Callers decide whether to surface an error to the
//! user or only log it.

use std::io;

use thiserror::Error;

use crate::instance::{InstanceId, Mode};
use crate::surface::SurfaceHandle;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed store document: {0}")]
    Format(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("window system rejected the surface: {0}")]
    Rejected(String),
    #[error("no such surface: {0:?}")]
    UnknownSurface(SurfaceHandle),
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("instance limit reached ({max} live overlays)")]
    CapacityExceeded { max: usize },
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),
    #[error("instance {0} is already live")]
    DuplicateInstance(InstanceId),
    #[error("invalid setting `{key}` for {mode} mode: {reason}")]
    InvalidSetting {
        key: String,
        mode: Mode,
        reason: String,
    },
    #[error("could not display instance {id}: {source}")]
    SurfaceAttach {
        id: InstanceId,
        #[source]
        source: SurfaceError,
    },
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl OverlayError {
    pub(crate) fn invalid_setting(key: &str, mode: Mode, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.to_string(),
            mode,
            reason: reason.into(),
        }
    }
}
