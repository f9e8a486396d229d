//! Error types for remote operations

use apiop_core::CoreError;
use thiserror::Error;

/// Remote endpoint errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limited by server. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Access denied to {url}")]
    AuthFailed { url: String },

    // ============ Content Errors ============
    #[error("Unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Manifest bundle error: {0}")]
    Bundle(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout {
                seconds: crate::http::DEFAULT_TIMEOUT.as_secs(),
            }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

/// Operator version resolution errors
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("'{version}' is not a valid version: {reason}")]
    InvalidVersionFormat { version: String, reason: String },

    #[error("version '{version}' set in {env_var} is not available: {reason}")]
    InvalidOverrideVersion {
        env_var: String,
        version: String,
        reason: String,
    },

    #[error("could not determine the {component} version: {reason}")]
    VersionResolutionFailed { component: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_error_messages() {
        let err = VersionError::InvalidOverrideVersion {
            env_var: "API_OPERATOR_VERSION".to_string(),
            version: "v9.9.9".to_string(),
            reason: "no such release".to_string(),
        };
        insta::assert_snapshot!(
            err.to_string(),
            @"version 'v9.9.9' set in API_OPERATOR_VERSION is not available: no such release"
        );

        let err = VersionError::VersionResolutionFailed {
            component: "API Operator".to_string(),
            reason: "default version v1.2.0 could not be validated".to_string(),
        };
        insta::assert_snapshot!(
            err.to_string(),
            @"could not determine the API Operator version: default version v1.2.0 could not be validated"
        );
    }
}
