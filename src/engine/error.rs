//! Engine-level transformation failures

use thiserror::Error;

use crate::engine::injector::PatchError;
use crate::pool::PoolError;

/// Failure while transforming a registered class.
///
/// Unregistered classes never produce this error, they pass through
/// byte-identical. For a registered class every failure is fatal to the
/// transformation and surfaces here with the class name attached.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transformation of {name} failed: class could not be resolved")]
    UnitUnresolved {
        name: String,
        #[source]
        source: PoolError,
    },

    #[error("transformation of {name} failed: no declared method {method}")]
    MethodNotFound { name: String, method: &'static str },

    #[error("transformation of {name} failed: {source}")]
    Patch {
        name: String,
        #[source]
        source: PatchError,
    },
}

impl TransformError {
    /// Internal name of the class whose transformation failed.
    pub fn class_name(&self) -> &str {
        match self {
            TransformError::UnitUnresolved { name, .. }
            | TransformError::MethodNotFound { name, .. }
            | TransformError::Patch { name, .. } => name,
        }
    }
}
