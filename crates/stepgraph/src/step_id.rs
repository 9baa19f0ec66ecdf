//! Validated step identifiers
//!
//! A step ID is the textual key every subsystem agrees on:
//! `provider:action:resource[:...]`. The graph, lockfiles and policy
//! evaluators all key on [`StepId::as_str`], so the accepted grammar is a
//! compatibility contract.
//!
//! Besides `[A-Za-z0-9_-]`, segments accept `@`, `.` and `/` after the first
//! character, so `brew:formula:python@3.12` and `brew:tap:homebrew/cask-fonts`
//! are valid IDs. Consumers matching IDs with a stricter pattern must allow
//! these three characters.

use crate::error::StepIdError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

// Segments may carry `@` and `.` so versioned packages (`python@3.12`) stay addressable.
static STEP_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_/@.\-]*(:[A-Za-z0-9][A-Za-z0-9_/@.\-]*)*$")
        .expect("step ID pattern is valid")
});

/// Immutable, validated identifier of a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(String);

impl StepId {
    /// Parse and validate a step ID
    ///
    /// The input is kept byte-for-byte; nothing is trimmed or normalised.
    pub fn new(raw: &str) -> Result<Self, StepIdError> {
        if raw.trim().is_empty() {
            return Err(StepIdError::Empty);
        }
        if !STEP_ID_PATTERN.is_match(raw) {
            return Err(StepIdError::Invalid(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Build a step ID from a literal known to be valid
    ///
    /// # Panics
    /// Panics if `raw` is not a valid step ID.
    pub fn must(raw: &str) -> Self {
        match Self::new(raw) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }

    /// Join segments with `:` and validate the result
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Result<Self, StepIdError> {
        let joined = parts
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(":");
        Self::new(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First colon-delimited segment
    pub fn provider(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// All colon-delimited segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(':')
    }

    /// True for the default (never-validated) value
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StepId {
    type Err = StepIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for StepId {
    type Error = StepIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for StepId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids_round_trip() {
        for raw in [
            "brew",
            "brew:formula:ripgrep",
            "symlink:link:gitconfig",
            "exec:run:install-rustup",
            "brew:tap:homebrew/cask-fonts",
            "brew:formula:python@3.12",
            "runtime:install:node:20",
            "a_b:c-d:E9",
            "lang:install:node.js",
        ] {
            let id = StepId::new(raw).unwrap();
            assert_eq!(id.to_string(), raw);
            assert_eq!(id.as_str(), raw);
        }
    }

    #[test]
    fn test_empty_and_whitespace_rejected() {
        for raw in ["", " ", "\t", "  \n "] {
            assert_eq!(StepId::new(raw), Err(StepIdError::Empty));
        }
    }

    #[test]
    fn test_invalid_ids_rejected() {
        for raw in [
            ":brew:formula",
            "brew:formula:",
            "brew::formula",
            "brew formula",
            "brew: formula",
            " brew:formula",
            "-brew:formula",
            "brew:formula:rip grep",
        ] {
            assert!(
                matches!(StepId::new(raw), Err(StepIdError::Invalid(_))),
                "expected {raw:?} to be invalid"
            );
        }
    }

    #[test]
    fn test_provider_segment() {
        assert_eq!(StepId::must("brew:formula:jq").provider(), "brew");
        assert_eq!(StepId::must("standalone").provider(), "standalone");
    }

    #[test]
    fn test_equality_is_by_value() {
        let a = StepId::must("ssh:config:github");
        let b: StepId = "ssh:config:github".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, StepId::must("ssh:config:gitlab"));
    }

    #[test]
    fn test_zero_value() {
        assert!(StepId::default().is_zero());
        assert!(!StepId::must("a").is_zero());
    }

    #[test]
    fn test_from_parts() {
        let id = StepId::from_parts(&["symlink", "link", "zshrc"]).unwrap();
        assert_eq!(id.as_str(), "symlink:link:zshrc");
        assert!(StepId::from_parts(&["symlink", "", "zshrc"]).is_err());
    }

    #[test]
    #[should_panic(expected = "invalid step ID")]
    fn test_must_panics_on_invalid() {
        let _ = StepId::must("not valid");
    }

    #[test]
    fn test_serde_validates() {
        let id: StepId = serde_json::from_str("\"brew:formula:jq\"").unwrap();
        assert_eq!(id.provider(), "brew");
        assert!(serde_json::from_str::<StepId>("\"bad id\"").is_err());
    }
}
