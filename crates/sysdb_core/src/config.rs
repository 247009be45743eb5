//! Domain configuration.
//!
//! # Responsibility
//! - Load the cache location and domain definitions from TOML.
//! - Validate domain names and id ranges before the store is used.
//!
//! # Invariants
//! - A validated config has at least one domain and no duplicate names
//!   (compared case-insensitively).
//! - `min_id <= max_id` whenever `max_id` is set.

use crate::model::validation::PosixId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Domain created by `SysdbConfig::default()`.
pub const DEFAULT_DOMAIN: &str = "LOCAL";

static DOMAIN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid domain name regex"));

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    /// Config file cannot be read.
    Io { path: PathBuf, source: std::io::Error },
    /// Config text is not valid TOML for this schema.
    Parse(toml::de::Error),
    /// Config parsed but violates a semantic rule.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// One naming domain served by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    pub name: String,
    /// Lowest uid/gid accepted for this domain.
    #[serde(default)]
    pub min_id: PosixId,
    /// Highest uid/gid accepted; unbounded when absent.
    #[serde(default)]
    pub max_id: Option<PosixId>,
}

impl DomainConfig {
    /// Unrestricted domain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_id: 0,
            max_id: None,
        }
    }

    pub fn with_id_range(mut self, min_id: PosixId, max_id: Option<PosixId>) -> Self {
        self.min_id = min_id;
        self.max_id = max_id;
        self
    }

    pub fn contains_id(&self, id: PosixId) -> bool {
        id >= self.min_id && self.max_id.map_or(true, |max_id| id <= max_id)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SysdbConfig {
    /// Database file; in-memory when absent.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_domains")]
    pub domains: Vec<DomainConfig>,
}

impl Default for SysdbConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            domains: default_domains(),
        }
    }
}

impl SysdbConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.domains.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one domain must be configured".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for domain in &self.domains {
            if !DOMAIN_NAME_RE.is_match(&domain.name) {
                return Err(ConfigError::Invalid(format!(
                    "domain name `{}` must match [A-Za-z0-9_.-]+",
                    domain.name
                )));
            }
            if !seen.insert(domain.name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "domain `{}` is configured more than once",
                    domain.name
                )));
            }
            if let Some(max_id) = domain.max_id {
                if domain.min_id > max_id {
                    return Err(ConfigError::Invalid(format!(
                        "domain `{}` has min_id {} above max_id {}",
                        domain.name, domain.min_id, max_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Looks up a domain by exact name.
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|domain| domain.name == name)
    }
}

/// Reads, parses and validates a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<SysdbConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    SysdbConfig::from_toml_str(&text)
}

fn default_domains() -> Vec<DomainConfig> {
    vec![DomainConfig::new(DEFAULT_DOMAIN)]
}
