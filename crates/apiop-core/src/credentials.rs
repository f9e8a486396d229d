//! Registry credential resolution
//!
//! Both installation modes end in the same [`CredentialSet`]:
//! - batch mode reads already validated flags (and stdin for `--password-stdin`)
//! - interactive mode asks a [`Prompter`] one question at a time
//!
//! Key files are never read here. Their path is checked for readability and
//! recorded; the content is loaded when the credentials are persisted.

use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::error::CredentialError;
use crate::flags::BatchFlags;
use crate::prompt::Prompter;
use crate::registry::{FlagName, RegistryType};

/// Opaque password; never printed, wiped from memory on drop
#[derive(Clone)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Access the secret value
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Where the registry secret came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    /// `--password` or a masked prompt
    Literal,
    /// `--password-stdin`
    Stdin,
    /// `--key-file` (token or password file, or a cloud credentials file)
    File,
}

/// Normalized registry credentials
#[derive(Debug, Clone)]
pub struct CredentialSet {
    pub registry: RegistryType,
    pub repository: String,
    pub username: Option<String>,
    pub password: Option<Password>,
    pub key_file: Option<PathBuf>,
    /// `None` only for anonymous HTTP registries
    pub source: Option<PasswordSource>,
}

impl CredentialSet {
    pub fn is_anonymous(&self) -> bool {
        self.source.is_none()
    }

    /// Load the key file content
    pub fn read_key_file(&self) -> Result<Option<Vec<u8>>, CredentialError> {
        let Some(path) = &self.key_file else {
            return Ok(None);
        };
        std::fs::read(path)
            .map(Some)
            .map_err(|source| CredentialError::KeyFileUnreadable {
                path: path.clone(),
                source,
            })
    }

    /// The registry password, loading it from the key file when that is
    /// where it lives
    pub fn resolve_password(&self) -> Result<Option<Password>, CredentialError> {
        match self.source {
            Some(PasswordSource::File) if self.username.is_some() => {
                let Some(bytes) = self.read_key_file()? else {
                    return Ok(None);
                };
                let text = Zeroizing::new(String::from_utf8_lossy(&bytes).into_owned());
                let password = Password::new(text.trim());
                if password.is_blank() {
                    return Err(CredentialError::MissingCredential { field: "password" });
                }
                Ok(Some(password))
            }
            _ => Ok(self.password.clone()),
        }
    }
}

/// Build credentials from validated batch flags
///
/// `stdin` is only read when `--password-stdin` was given.
pub fn resolve_batch<R: BufRead>(
    registry: RegistryType,
    flags: &BatchFlags,
    stdin: &mut R,
) -> Result<CredentialSet, CredentialError> {
    let repository = required(flags.get(FlagName::Repository).trimmed(), "repository")?;

    match registry {
        RegistryType::AmazonEcr | RegistryType::Gcr => {
            let key_file = checked_key_file(flags.get(FlagName::KeyFile).trimmed())?;
            Ok(CredentialSet {
                registry,
                repository,
                username: None,
                password: None,
                key_file: Some(key_file),
                source: Some(PasswordSource::File),
            })
        }
        RegistryType::Http if !flags.is_provided(FlagName::Username) => Ok(CredentialSet {
            registry,
            repository,
            username: None,
            password: None,
            key_file: None,
            source: None,
        }),
        RegistryType::DockerHub | RegistryType::Http => {
            let username = required(flags.get(FlagName::Username).trimmed(), "username")?;
            let mut creds = CredentialSet {
                registry,
                repository,
                username: Some(username),
                password: None,
                key_file: None,
                source: None,
            };

            if flags.is_provided(FlagName::PasswordStdin) {
                creds.password = Some(read_password_line(stdin)?);
                creds.source = Some(PasswordSource::Stdin);
            } else if flags.is_provided(FlagName::KeyFile) {
                creds.key_file = Some(checked_key_file(flags.get(FlagName::KeyFile).trimmed())?);
                creds.source = Some(PasswordSource::File);
            } else {
                let password = Password::new(flags.get(FlagName::Password).value);
                if password.is_blank() {
                    return Err(CredentialError::MissingCredential { field: "password" });
                }
                creds.password = Some(password);
                creds.source = Some(PasswordSource::Literal);
            }

            tracing::debug!(
                registry = %registry,
                source = ?creds.source,
                "resolved registry credentials from flags"
            );
            Ok(creds)
        }
    }
}

/// Ask for the registry type
pub fn choose_registry(prompter: &mut dyn Prompter) -> Result<RegistryType, CredentialError> {
    let labels: Vec<&str> = RegistryType::ALL.iter().map(|r| r.label()).collect();
    let index = prompter.select("Choose registry type", &labels)?;
    RegistryType::ALL
        .get(index)
        .copied()
        .ok_or(CredentialError::PromptCancelled)
}

/// Ask for the credentials of `registry`, one prompt at a time
pub fn resolve_interactive(
    registry: RegistryType,
    prompter: &mut dyn Prompter,
) -> Result<CredentialSet, CredentialError> {
    let repository = match registry {
        RegistryType::DockerHub => prompter.input("Enter repository name (docker.io/<repository>)")?,
        RegistryType::AmazonEcr => prompter.input("Enter repository URI (<account>.dkr.ecr.<region>.amazonaws.com/<repository>)")?,
        RegistryType::Gcr => prompter.input("Enter repository (gcr.io/<project>)")?,
        RegistryType::Http => prompter.input("Enter private registry (<host>[:port]/<repository>)")?,
    };
    let repository = required(repository.trim(), "repository")?;

    let creds = match registry {
        RegistryType::DockerHub => {
            let username = required(prompter.input("Enter username")?.trim(), "username")?;
            let password = prompter.password("Enter password")?;
            if password.is_blank() {
                return Err(CredentialError::MissingCredential { field: "password" });
            }
            CredentialSet {
                registry,
                repository,
                username: Some(username),
                password: Some(password),
                key_file: None,
                source: Some(PasswordSource::Literal),
            }
        }
        RegistryType::AmazonEcr | RegistryType::Gcr => {
            let prompt = if registry == RegistryType::AmazonEcr {
                "Enter AWS credentials file path"
            } else {
                "Enter GCR service account key file path"
            };
            let path = required(prompter.input(prompt)?.trim(), "credentials file")?;
            CredentialSet {
                registry,
                repository,
                username: None,
                password: None,
                key_file: Some(checked_key_file(&path)?),
                source: Some(PasswordSource::File),
            }
        }
        RegistryType::Http => {
            let username = prompter.input("Enter username (leave empty for anonymous access)")?;
            let username = username.trim();
            if username.is_empty() {
                CredentialSet {
                    registry,
                    repository,
                    username: None,
                    password: None,
                    key_file: None,
                    source: None,
                }
            } else {
                let password = prompter.password("Enter password")?;
                if password.is_blank() {
                    return Err(CredentialError::MissingCredential { field: "password" });
                }
                CredentialSet {
                    registry,
                    repository,
                    username: Some(username.to_string()),
                    password: Some(password),
                    key_file: None,
                    source: Some(PasswordSource::Literal),
                }
            }
        }
    };

    Ok(creds)
}

fn required(value: &str, field: &'static str) -> Result<String, CredentialError> {
    if value.is_empty() {
        Err(CredentialError::MissingCredential { field })
    } else {
        Ok(value.to_string())
    }
}

fn read_password_line<R: BufRead>(stdin: &mut R) -> Result<Password, CredentialError> {
    let mut line = Zeroizing::new(String::new());
    stdin
        .read_line(&mut line)
        .map_err(CredentialError::StdinRead)?;
    let password = Password::new(line.trim_end_matches(['\r', '\n']));
    if password.is_blank() {
        return Err(CredentialError::MissingCredential { field: "password" });
    }
    Ok(password)
}

/// Check that the key file exists and is a regular file, without reading it
fn checked_key_file(path: &str) -> Result<PathBuf, CredentialError> {
    let path = Path::new(required(path, "key file")?.as_str()).to_path_buf();
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok(path),
        Ok(_) => Err(CredentialError::KeyFileUnreadable {
            path,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        }),
        Err(source) => Err(CredentialError::KeyFileUnreadable { path, source }),
    }
}
