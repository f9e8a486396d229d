//! Batch-mode flag values with provenance
//!
//! A flag that was never given and a flag given as an empty string are not
//! the same thing: the former is silently absent, the latter counts as
//! "provided" (and is then rejected wherever it is forbidden).

use std::collections::BTreeMap;

use crate::registry::FlagName;

/// A flag value plus whether the caller explicitly supplied it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagInput {
    pub value: String,
    pub provided: bool,
}

impl FlagInput {
    /// Flag explicitly given on the command line
    pub fn given(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            provided: true,
        }
    }

    /// Flag never touched by the caller
    pub fn absent() -> Self {
        Self::default()
    }

    /// Boolean switch; provided only when turned on
    pub fn switch(on: bool) -> Self {
        Self {
            value: if on { "true" } else { "" }.to_string(),
            provided: on,
        }
    }

    /// From an optional CLI value (`Some("")` is an explicit empty value)
    pub fn from_option(value: Option<String>) -> Self {
        match value {
            Some(v) => Self::given(v),
            None => Self::absent(),
        }
    }

    /// Provided with something other than whitespace
    pub fn has_value(&self) -> bool {
        self.provided && !self.value.trim().is_empty()
    }

    pub fn trimmed(&self) -> &str {
        self.value.trim()
    }
}

/// All registry input flags of one invocation (registry type excluded)
#[derive(Debug, Clone, Default)]
pub struct BatchFlags {
    flags: BTreeMap<FlagName, FlagInput>,
}

impl BatchFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: FlagName, input: FlagInput) -> Self {
        self.insert(name, input);
        self
    }

    pub fn insert(&mut self, name: FlagName, input: FlagInput) {
        self.flags.insert(name, input);
    }

    /// Flag value, absent if never inserted
    pub fn get(&self, name: FlagName) -> FlagInput {
        self.flags.get(&name).cloned().unwrap_or_default()
    }

    pub fn is_provided(&self, name: FlagName) -> bool {
        self.flags.get(&name).is_some_and(|f| f.provided)
    }

    /// Provided flags, in [`FlagName`] order
    pub fn provided(&self) -> impl Iterator<Item = FlagName> + '_ {
        self.flags
            .iter()
            .filter(|(_, input)| input.provided)
            .map(|(name, _)| *name)
    }
}

impl FromIterator<(FlagName, FlagInput)> for BatchFlags {
    fn from_iter<I: IntoIterator<Item = (FlagName, FlagInput)>>(iter: I) -> Self {
        Self {
            flags: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_given_vs_absent() {
        let given = FlagInput::given("");
        let absent = FlagInput::absent();

        assert!(given.provided);
        assert!(!given.has_value());
        assert!(!absent.provided);
        assert_ne!(given, absent);
    }

    #[test]
    fn test_switch() {
        assert!(FlagInput::switch(true).provided);
        assert!(!FlagInput::switch(false).provided);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(FlagInput::from_option(None), FlagInput::absent());
        assert!(FlagInput::from_option(Some(String::new())).provided);
    }

    #[test]
    fn test_provided_iteration_order() {
        let flags = BatchFlags::new()
            .with(FlagName::KeyFile, FlagInput::given("/tmp/key.json"))
            .with(FlagName::Username, FlagInput::absent())
            .with(FlagName::Repository, FlagInput::given("repo"));

        let provided: Vec<_> = flags.provided().collect();
        assert_eq!(provided, vec![FlagName::Repository, FlagName::KeyFile]);
        assert!(!flags.is_provided(FlagName::Password));
        assert_eq!(flags.get(FlagName::Password), FlagInput::absent());
    }
}
