use thiserror::Error;

/// Failure to produce an instance for a binding key.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no binding registered for '{key}'")]
    Unbound { key: String },

    #[error("failed to construct '{key}': {source}")]
    Construction {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("binding '{key}' does not hold an Arc<{expected}>")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("alias cycle detected while resolving '{key}'")]
    AliasCycle { key: String },

    #[error("circular dependency while constructing '{key}'")]
    Circular { key: String },
}

impl ResolutionError {
    pub fn key(&self) -> &str {
        match self {
            ResolutionError::Unbound { key }
            | ResolutionError::Construction { key, .. }
            | ResolutionError::TypeMismatch { key, .. }
            | ResolutionError::AliasCycle { key }
            | ResolutionError::Circular { key } => key,
        }
    }
}

/// Everything a facade call can fail with.
///
/// `Service` carries the resolved instance's own error untouched; downcast it
/// to recover the original type.
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("'{key}' has no method '{method}'")]
    MethodNotFound { key: String, method: String },

    #[error(transparent)]
    Service(anyhow::Error),
}

impl FacadeError {
    /// The instance's error, if the failure came from inside a forwarded call.
    pub fn service_error(&self) -> Option<&anyhow::Error> {
        match self {
            FacadeError::Service(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_service_error(self) -> Result<anyhow::Error, Self> {
        match self {
            FacadeError::Service(e) => Ok(e),
            other => Err(other),
        }
    }
}
