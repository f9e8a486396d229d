//! Registry flag validation
//!
//! Pure checks of a batch flag map against the rules of a registry type.
//! Nothing here touches the filesystem, stdin or the network: a key file is
//! only a path at this stage and a `--password-stdin` switch is only a switch.

use crate::error::ValidationError;
use crate::flags::BatchFlags;
use crate::registry::{FlagName, PasswordPolicy, RegistryType};

/// Validate `flags` for `registry`, returning the first violation
pub fn validate(registry: RegistryType, flags: &BatchFlags) -> Result<(), ValidationError> {
    match violations(registry, flags).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Every violation, ordered: unexpected flags, conflicts, missing required
/// flags, missing password source
pub fn violations(registry: RegistryType, flags: &BatchFlags) -> Vec<ValidationError> {
    let rules = registry.rules();
    let mut errors = Vec::new();

    for flag in flags.provided() {
        if !rules.accepts(flag) {
            errors.push(ValidationError::UnexpectedFlag { registry, flag });
        }
    }

    let sources: Vec<FlagName> = FlagName::PASSWORD_SOURCES
        .into_iter()
        .filter(|f| flags.is_provided(*f) && rules.accepts(*f))
        .collect();

    if rules.password != PasswordPolicy::Forbidden && sources.len() > 1 {
        errors.push(ValidationError::ConflictingFlags {
            registry,
            flags: sources.clone(),
        });
    }

    for &flag in rules.required {
        if !flags.get(flag).has_value() {
            errors.push(ValidationError::MissingRequired { registry, flag });
        }
    }

    // A chosen value-carrying source must not be blank
    if rules.password != PasswordPolicy::Forbidden && sources.len() == 1 {
        let source = sources[0];
        if source != FlagName::PasswordStdin && !flags.get(source).has_value() {
            errors.push(ValidationError::MissingRequired {
                registry,
                flag: source,
            });
        }
    }

    match rules.password {
        PasswordPolicy::Required if sources.is_empty() => {
            errors.push(ValidationError::MissingPasswordSource { registry });
        }
        PasswordPolicy::WithUsername => {
            let username = flags.get(FlagName::Username);
            let explicit_blank = username.provided && !username.has_value();
            if explicit_blank || (!sources.is_empty() && !username.has_value()) {
                errors.push(ValidationError::MissingRequired {
                    registry,
                    flag: FlagName::Username,
                });
            } else if username.has_value() && sources.is_empty() {
                errors.push(ValidationError::MissingPasswordSource { registry });
            }
        }
        _ => {}
    }

    errors
}
