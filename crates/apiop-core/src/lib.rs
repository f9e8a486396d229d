//! apiop Core - Core types for installing the API Operator
//!
//! This crate provides the foundational types used throughout apiop:
//! - `RegistryType`: supported image registries and their flag rules
//! - `FlagInput` / `BatchFlags`: batch-mode inputs with provenance
//! - `validate`: pure registry flag validation
//! - `CredentialSet`: normalized registry credentials (batch or interactive)
//! - `ManifestBundle`: controller manifests from a file, directory or archive
//! - `ToolConfig` / `ModeStore`: tool configuration and operating mode

pub mod bundle;
pub mod config;
pub mod credentials;
pub mod error;
pub mod flags;
pub mod prompt;
pub mod registry;
pub mod request;
pub mod validate;

pub use bundle::ManifestBundle;
pub use config::{FileModeStore, MemoryModeStore, ModeStore, OperatingMode, OperatorSettings, ToolConfig};
pub use credentials::{
    CredentialSet, Password, PasswordSource, choose_registry, resolve_batch, resolve_interactive,
};
pub use error::{CoreError, CredentialError, Result, ValidationError};
pub use flags::{BatchFlags, FlagInput};
pub use prompt::{Answer, Prompter, ScriptedPrompter};
pub use registry::{FlagName, FlagRules, PasswordPolicy, RegistryType};
pub use request::{
    ConfigSource, InstallationRequest, OperatorVersion, SecurityProfile, VersionOrigin,
    render_template,
};
pub use validate::{validate, violations};
