//! Webhook source registry.
//!
//! A source is a webhook-emitting GitHub entity (enterprise, organization or
//! repository) with its own HMAC secret. Sources are registered once at
//! startup and looked up by an opaque key carried as a query parameter on
//! every webhook and callback URL.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// The kind of GitHub entity a webhook source represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// A GitHub enterprise.
    Enterprise,
    /// A GitHub organization.
    Organization,
    /// A single repository (`owner/repo`).
    Repository,
}

impl SourceType {
    /// The runner group a job from this source is expected to carry.
    ///
    /// Repository-scoped runners always live in GitHub's implicit group 1,
    /// regardless of the configured group id.
    #[must_use]
    pub fn effective_runner_group_id(self, configured: i64) -> i64 {
        match self {
            Self::Repository => 1,
            Self::Enterprise | Self::Organization => configured,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enterprise => write!(f, "enterprise"),
            Self::Organization => write!(f, "organization"),
            Self::Repository => write!(f, "repository"),
        }
    }
}

/// A registered webhook source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Display name: enterprise slug, organization login, or `owner/repo`.
    pub name: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Shared HMAC secret for this source.
    pub secret: String,
}

/// Read-only map from registry key to source, built at startup.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Source>,
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under a key. Duplicate keys are ignored with a
    /// warning, matching first-registration-wins semantics.
    pub fn register(&mut self, key: impl Into<String>, source: Source) {
        let key = key.into();
        if self.sources.contains_key(&key) {
            warn!(key = %key, "Found duplicate webhook source key - will be ignored");
            return;
        }
        info!(key = %key, source_type = %source.source_type, "Registered webhook source");
        self.sources.insert(key, source);
    }

    /// Look up a source by registry key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Source> {
        self.sources.get(key)
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
