//! Error taxonomy for the retrieval core.
//!
//! Call sites still return `anyhow::Result` and attach `.context(...)` the
//! way the rest of the crate does; `RagError` is the small set of kinds
//! worth matching on (for example, the incremental indexer treats
//! `ModelInference` failures as per-note, not fatal).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("model inference failed: {0}")]
    ModelInference(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("index corruption detected: {0}")]
    Corruption(String),
}

impl RagError {
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Io(_) => "io",
            RagError::Parse(_) => "parse",
            RagError::ModelLoad(_) => "model_load",
            RagError::ModelInference(_) => "model_inference",
            RagError::Timeout(_) => "timeout",
            RagError::Cancelled => "cancelled",
            RagError::Validation(_) => "validation",
            RagError::Corruption(_) => "corruption",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(RagError::Cancelled.kind(), "cancelled");
        assert_eq!(RagError::Validation("bad".into()).kind(), "validation");
    }
}
