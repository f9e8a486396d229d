//! Error types for apiop-kube

use thiserror::Error;

/// Result type for apiop-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// API status codes worth retrying
const TRANSIENT_STATUS: [u16; 6] = [409, 429, 500, 502, 503, 504];

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Server-side apply of one resource failed
    #[error("failed to apply {resource}: {source}")]
    ApplyFailed {
        resource: String,
        #[source]
        source: kube::Error,
    },

    /// The cluster does not serve this resource type (yet)
    #[error("unknown resource type {api_version}/{kind}")]
    UnknownResource { api_version: String, kind: String },

    /// Manifest document that cannot become a cluster object
    #[error("invalid manifest (document {index}): {message}")]
    InvalidManifest { index: usize, message: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// The underlying client error, if any
    fn client_error(&self) -> Option<&kube::Error> {
        match self {
            KubeError::Api(e) | KubeError::ApplyFailed { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// HTTP status of an API error response
    pub fn status_code(&self) -> Option<u16> {
        match self.client_error() {
            Some(kube::Error::Api(resp)) => Some(resp.code),
            _ => None,
        }
    }

    /// Retryable API status (409, 429, 500, 502, 503, 504) or transport failure
    pub fn is_transient(&self) -> bool {
        if let Some(code) = self.status_code() {
            return TRANSIENT_STATUS.contains(&code);
        }
        matches!(
            self.client_error(),
            Some(kube::Error::HyperError(_) | kube::Error::Service(_))
        )
    }

    /// API group of an unknown resource type (`""` for the core group)
    pub fn unknown_group(&self) -> Option<&str> {
        match self {
            KubeError::UnknownResource { api_version, .. } => Some(
                api_version
                    .rsplit_once('/')
                    .map_or("", |(group, _)| group),
            ),
            _ => None,
        }
    }
}

/// Build an API error response, as the server would return it
pub fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    })
}
