//! CLI error types with exit code handling

use miette::Diagnostic;
use thiserror::Error;

use apiop_core::{CoreError, RegistryType, ValidationError};
use apiop_kube::ApplyError;

use crate::exit_codes;
use crate::orchestrator::InstallError;

const RERUN_HELP: &str =
    "the installation is incomplete; re-running the same command is safe";

/// CLI error, carrying the exit code it maps to
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Registry flags or credentials rejected
    #[error("Invalid input: {message}")]
    #[diagnostic(code(apiop::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Operator version or manifest bundle unavailable
    #[error("Release unavailable: {message}")]
    #[diagnostic(code(apiop::cli::release))]
    Release {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Cluster unreachable or a cluster write failed
    #[error("Cluster error: {message}")]
    #[diagnostic(code(apiop::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Configuration file unreadable or not writable
    #[error("IO error: {message}")]
    #[diagnostic(code(apiop::cli::io))]
    Io {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(apiop::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Release { .. } => exit_codes::VERSION_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The cluster could not be reached at all
    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Cluster {
            message: err.to_string(),
            help: Some("check that a kubeconfig is available and the cluster is reachable".to_string()),
        }
    }
}

impl From<InstallError> for CliError {
    fn from(err: InstallError) -> Self {
        let message = err.to_string();
        if err.is_incomplete() {
            let help = Some(RERUN_HELP.to_string());
            return match err {
                InstallError::Mode(_) => CliError::Io { message, help },
                _ => CliError::Cluster { message, help },
            };
        }

        match err.stage() {
            "connect" => CliError::connection(message),
            "version" => CliError::Release {
                message,
                help: Some("pin a published release with the version override variable".to_string()),
            },
            "bundle" => CliError::Release {
                help: Some(bundle_help(&err).to_string()),
                message,
            },
            _ => CliError::Validation {
                help: validation_help(&err),
                message,
            },
        }
    }
}

fn bundle_help(err: &InstallError) -> &'static str {
    match err {
        InstallError::Apply(ApplyError::InvalidManifest { .. }) => {
            "each manifest needs apiVersion, kind and a metadata.name"
        }
        _ => "use --from-file to install from a local manifest bundle",
    }
}

fn validation_help(err: &InstallError) -> Option<String> {
    match err {
        InstallError::Validation(ValidationError::UnknownRegistryType { .. }) => Some(format!(
            "valid registry types: {}",
            RegistryType::ALL
                .iter()
                .map(RegistryType::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )),
        InstallError::Validation(_) => {
            Some("run `apiop install api-operator --help` for the flags each registry type takes".to_string())
        }
        _ => None,
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::Io {
            message: err.to_string(),
            help: Some("check the file named by --config or APIOP_CONFIG".to_string()),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
