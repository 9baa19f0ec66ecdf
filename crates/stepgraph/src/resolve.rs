//! Version resolution seam
//!
//! Providers ask the compile context which version of a package to use.
//! The lockfile subsystem implements [`Resolver`]; without one, every
//! request resolves to the "latest" version the provider asked for.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a resolved version came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    #[default]
    None,
    Latest,
    Lockfile,
}

/// Outcome of resolving one package version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub provider: String,
    pub name: String,
    pub version: String,
    pub source: ResolutionSource,
    /// A lockfile entry exists for this package
    pub locked: bool,
    pub locked_version: String,
    pub available_version: String,
    /// The locked version differs from what is available
    pub drifted: bool,
    /// The lockfile entry was rewritten by this resolution
    pub updated: bool,
    pub failed: bool,
    pub error: Option<String>,
}

impl Resolution {
    /// Resolution used when no resolver is configured
    pub fn latest(provider: &str, name: &str, latest_version: &str) -> Self {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            version: latest_version.to_string(),
            source: ResolutionSource::Latest,
            available_version: latest_version.to_string(),
            ..Self::default()
        }
    }

    /// A failed resolution carrying the resolver's message
    pub fn failure(provider: &str, name: &str, error: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            failed: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Turn a failed resolution into an error a provider can propagate with `?`
    pub fn into_result(self) -> Result<Self, ResolveError> {
        if self.failed {
            return Err(ResolveError {
                provider: self.provider,
                name: self.name,
                message: self.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(self)
    }
}

/// Error raised from a failed [`Resolution`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to resolve {provider}:{name}: {message}")]
pub struct ResolveError {
    pub provider: String,
    pub name: String,
    pub message: String,
}

/// Resolves the version a package should be installed at
pub trait Resolver: Send + Sync + fmt::Debug {
    fn resolve(&self, provider: &str, name: &str, latest_version: &str) -> Resolution;
}
