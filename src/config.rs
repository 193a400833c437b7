//! Gateway configuration.
//!
//! Loaded from a TOML file with environment overrides:
//!
//! ```toml
//! access_keys = ["primary-key", "secondary-key"]
//! max_nesting_depth = 32
//! ```
//!
//! `HUBWIRE_ACCESS_KEYS` (comma separated) replaces the file's keys.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use crate::codec::{DecodeLimits, DEFAULT_MAX_DEPTH};
use crate::error::ConfigError;

/// Environment variable overriding `access_keys`.
pub const ACCESS_KEYS_ENV: &str = "HUBWIRE_ACCESS_KEYS";

/// Source of the access keys a signature may be produced with.
///
/// Queried on every request so keys can rotate without a restart.
pub trait AccessKeyProvider: Send + Sync + 'static {
    fn candidate_keys(&self) -> Vec<String>;
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayConfig {
    /// Candidate access keys; any one of them may have signed a request.
    #[serde(default)]
    pub access_keys: Vec<String>,

    /// Deepest container nesting accepted in binary payloads.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_max_nesting_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            access_keys: Vec::new(),
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

impl GatewayConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            "Loaded gateway config from {} ({} access keys)",
            path.display(),
            config.access_keys.len()
        );
        Ok(config)
    }

    /// Load from file, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Decode limits derived from this configuration.
    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits::with_max_depth(self.max_nesting_depth)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(keys) = std::env::var(ACCESS_KEYS_ENV) {
            self.override_access_keys(&keys);
        }
    }

    fn override_access_keys(&mut self, raw: &str) {
        self.access_keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
    }
}

impl AccessKeyProvider for GatewayConfig {
    fn candidate_keys(&self) -> Vec<String> {
        self.access_keys.clone()
    }
}

impl AccessKeyProvider for Vec<String> {
    fn candidate_keys(&self) -> Vec<String> {
        self.clone()
    }
}

impl<P: AccessKeyProvider> AccessKeyProvider for Arc<P> {
    fn candidate_keys(&self) -> Vec<String> {
        (**self).candidate_keys()
    }
}

/// Key set that can be replaced at runtime.
///
/// Clones share the same keys.
#[derive(Debug, Clone, Default)]
pub struct RotatingKeys {
    keys: Arc<RwLock<Vec<String>>>,
}

impl RotatingKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(keys)),
        }
    }

    /// Replace the key set; subsequent requests see the new keys.
    pub fn replace(&self, keys: Vec<String>) {
        *self.keys.write().unwrap_or_else(PoisonError::into_inner) = keys;
    }
}

impl AccessKeyProvider for RotatingKeys {
    fn candidate_keys(&self) -> Vec<String> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
