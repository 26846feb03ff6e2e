//! Error types for the engine API and for animation producers

use std::io;
use std::path::PathBuf;

use crate::animation::ParamKind;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("region `{0}` already exists")]
    DuplicateRegion(String),

    #[error("unknown region `{0}`")]
    UnknownRegion(String),

    #[error("device `{0}` already exists")]
    DuplicateDevice(String),

    #[error("unknown device `{0}`")]
    UnknownDevice(String),

    #[error("invalid geometry for `{id}`: {reason}")]
    InvalidGeometry { id: String, reason: String },

    #[error("region `{region}` does not support {kind}")]
    UnsupportedParam { region: String, kind: ParamKind },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("installation json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mqtt error: {0}")]
    Remote(String),

    #[error("failed to spawn frame thread: {0}")]
    Spawn(#[source] io::Error),
}

impl EngineError {
    pub fn invalid_geometry(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a producer call did not complete
#[derive(thiserror::Error, Debug)]
pub enum ProducerError {
    #[error("animation failed: {0:#}")]
    Failed(#[from] anyhow::Error),

    #[error("animation panicked: {0}")]
    Panicked(String),

    #[error("animation was already torn down")]
    TornDown,
}

impl ProducerError {
    /// Build from a caught panic payload
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}
