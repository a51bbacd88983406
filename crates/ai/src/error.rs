use std::sync::Arc;
use thiserror::Error;

/// Errors are `Clone` so that a single failed load can be handed to every
/// caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("failed to load model: {0:#}")]
    Load(Arc<anyhow::Error>),

    #[error("failed to generate caption: {0:#}")]
    Invocation(Arc<anyhow::Error>),

    #[error("no caption returned for image")]
    MissingResult,
}

impl ModelError {
    pub(crate) fn load(e: anyhow::Error) -> Self {
        Self::Load(Arc::new(e))
    }

    pub(crate) fn invocation(e: anyhow::Error) -> Self {
        Self::Invocation(Arc::new(e))
    }

    pub fn is_load(&self) -> bool {
        matches!(self, Self::Load(_))
    }
}
