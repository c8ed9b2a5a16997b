//! # Configuration Module
//!
//! Application settings loaded from environment variables or a YAML file.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `NF_ENV` | `development` | `development` or `production`; production disables template reloading and per-request info logs |
//! | `NF_ADDR` | `127.0.0.1:8080` | listen address |
//! | `NF_WORKERS` | available parallelism | listener worker threads |
//! | `NF_MAX_MEMORY` | `10485760` | largest multipart body parsed in memory; decimal or `0x` hex |
//! | `NF_TEMPLATE_DIR` | unset | HTML template directory |
//! | `NF_STATIC_DIR` | unset | directory served by the static middleware |
//! | `NF_INDENT` | `false` | indent JSON and XML output |
//! | `NF_SIGN_SECRET` | unset | enables signed JSON responses |
//!
//! ## YAML
//!
//! ```yaml
//! addr: 0.0.0.0:8080
//! mode: production
//! workers: 8
//! template_dir: ./views
//! ```
//!
//! Values from the file are overridden by any environment variable that is set.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::context::DEFAULT_MAX_MEMORY;

/// Environment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Some(Mode::Development),
            "prod" | "production" => Some(Mode::Production),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub addr: String,
    pub mode: Mode,
    pub workers: usize,
    pub max_memory: usize,
    pub template_dir: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub indent: bool,
    pub sign_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            mode: Mode::Development,
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            max_memory: DEFAULT_MAX_MEMORY,
            template_dir: None,
            static_dir: None,
            indent: false,
            sign_secret: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Yaml { path: PathBuf, source: serde_yaml::Error },
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            ConfigError::Yaml { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: '{value}'"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Yaml { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Decimal or `0x`-prefixed hexadecimal size.
fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Defaults overridden by the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// A YAML file overridden by the environment.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply every `NF_*` variable returned by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: &str| ConfigError::Invalid {
            key,
            value: value.to_string(),
        };
        if let Some(v) = lookup("NF_ENV") {
            self.mode = Mode::parse(&v).ok_or_else(|| invalid("NF_ENV", &v))?;
        }
        if let Some(v) = lookup("NF_ADDR") {
            self.addr = v;
        }
        if let Some(v) = lookup("NF_WORKERS") {
            self.workers = v
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid("NF_WORKERS", &v))?;
        }
        if let Some(v) = lookup("NF_MAX_MEMORY") {
            self.max_memory = parse_size(&v).ok_or_else(|| invalid("NF_MAX_MEMORY", &v))?;
        }
        if let Some(v) = lookup("NF_TEMPLATE_DIR") {
            self.template_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NF_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NF_INDENT") {
            self.indent = parse_bool(&v).ok_or_else(|| invalid("NF_INDENT", &v))?;
        }
        if let Some(v) = lookup("NF_SIGN_SECRET") {
            self.sign_secret = (!v.is_empty()).then_some(v);
        }
        Ok(())
    }
}
