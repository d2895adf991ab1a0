//! Configuration for the mirror engine.
//!
//! [`MirrorConfig`] is what a sync run consumes. [`ConfigFile`] is its
//! persisted INI form, loaded from `config.ini` in the user's config
//! directory; command-line flags override it field by field.
//!
//! ```ini
//! [origin]
//! url = https://repo.packagist.org
//! user_agent = packmirror/0.1
//!
//! [mirrors]
//! urls = https://mirror-a.example.org, https://mirror-b.example.org
//!
//! [sync]
//! max_connections = 25
//! timeout = 30
//! error_limit = 100
//! verify_checksums = true
//! clean = true
//! shard_template = p/%package%$%hash%.json
//! package_template = p/%package%$%hash%.json
//!
//! [output]
//! dir = /srv/mirror
//!
//! [logging]
//! dir = /var/log/packmirror
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use crate::error::{MirrorError, MirrorResult};
use crate::fetch::DEFAULT_MAX_CONNECTIONS;
use crate::http::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::index::{DEFAULT_PACKAGE_TEMPLATE, DEFAULT_SHARD_TEMPLATE};
use crate::mirror::DEFAULT_ERROR_LIMIT;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Base URI of the authoritative repository.
    pub origin_url: String,

    /// Secondary mirrors, tried before the origin for full syncs.
    pub mirrors: Vec<String>,

    /// Root of the local mirror.
    pub output_dir: PathBuf,

    /// Maximum requests in flight.
    pub max_connections: usize,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Cumulative errors after which a mirror is disabled.
    pub error_limit: usize,

    /// Whether to check each body against its expected SHA-256.
    pub verify_checksums: bool,

    /// Whether to emit per-mirror warnings.
    pub verbose: bool,

    /// Whether to delete unreferenced files after publishing.
    pub clean: bool,

    pub shard_template: String,
    pub package_template: String,
    pub user_agent: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            origin_url: String::new(),
            mirrors: Vec::new(),
            output_dir: PathBuf::from("."),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            error_limit: DEFAULT_ERROR_LIMIT,
            verify_checksums: true,
            verbose: false,
            clean: true,
            shard_template: DEFAULT_SHARD_TEMPLATE.to_string(),
            package_template: DEFAULT_PACKAGE_TEMPLATE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl MirrorConfig {
    /// Create a configuration for mirroring `origin_url` into `output_dir`.
    pub fn new(origin_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            origin_url: origin_url.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Add a secondary mirror.
    pub fn with_mirror(mut self, url: impl Into<String>) -> Self {
        self.mirrors.push(url.into());
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn with_shard_template(mut self, template: impl Into<String>) -> Self {
        self.shard_template = template.into();
        self
    }

    pub fn with_package_template(mut self, template: impl Into<String>) -> Self {
        self.package_template = template.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("packmirror")
        .join(CONFIG_FILE_NAME)
}

/// Default output directory when none is configured.
pub fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("packmirror")
        .join("public")
}

/// Persisted settings, as read from `config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub origin_url: Option<String>,
    pub user_agent: String,
    pub mirrors: Vec<String>,
    pub max_connections: usize,
    pub timeout_secs: u64,
    pub error_limit: usize,
    pub verify_checksums: bool,
    pub clean: bool,
    pub shard_template: String,
    pub package_template: String,
    pub output_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            origin_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            mirrors: Vec::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            error_limit: DEFAULT_ERROR_LIMIT,
            verify_checksums: true,
            clean: true,
            shard_template: DEFAULT_SHARD_TEMPLATE.to_string(),
            package_template: DEFAULT_PACKAGE_TEMPLATE.to_string(),
            output_dir: None,
            log_dir: None,
        }
    }
}

impl ConfigFile {
    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> MirrorResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> MirrorResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| {
            MirrorError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> MirrorResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories. Unset keys are omitted.
    pub fn save_to(&self, path: &Path) -> MirrorResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MirrorError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }

        ini.write_to_file(path).map_err(|e| MirrorError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Build a run configuration, requiring an origin.
    pub fn to_mirror_config(&self) -> MirrorResult<MirrorConfig> {
        let origin = self
            .origin_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| MirrorError::Config("no origin url configured".to_string()))?;

        let output_dir = self.output_dir.clone().unwrap_or_else(default_output_dir);

        let mut config = MirrorConfig::new(origin, output_dir)
            .with_max_connections(self.max_connections)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_error_limit(self.error_limit)
            .with_verify_checksums(self.verify_checksums)
            .with_clean(self.clean)
            .with_shard_template(self.shard_template.clone())
            .with_package_template(self.package_template.clone())
            .with_user_agent(self.user_agent.clone());
        for mirror in &self.mirrors {
            config = config.with_mirror(mirror.clone());
        }
        Ok(config)
    }
}

/// A settable `section.key` of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    OriginUrl,
    OriginUserAgent,
    MirrorsUrls,
    SyncMaxConnections,
    SyncTimeout,
    SyncErrorLimit,
    SyncVerifyChecksums,
    SyncClean,
    SyncShardTemplate,
    SyncPackageTemplate,
    OutputDir,
    LoggingDir,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::OriginUrl,
            ConfigKey::OriginUserAgent,
            ConfigKey::MirrorsUrls,
            ConfigKey::SyncMaxConnections,
            ConfigKey::SyncTimeout,
            ConfigKey::SyncErrorLimit,
            ConfigKey::SyncVerifyChecksums,
            ConfigKey::SyncClean,
            ConfigKey::SyncShardTemplate,
            ConfigKey::SyncPackageTemplate,
            ConfigKey::OutputDir,
            ConfigKey::LoggingDir,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::OriginUrl | ConfigKey::OriginUserAgent => "origin",
            ConfigKey::MirrorsUrls => "mirrors",
            ConfigKey::SyncMaxConnections
            | ConfigKey::SyncTimeout
            | ConfigKey::SyncErrorLimit
            | ConfigKey::SyncVerifyChecksums
            | ConfigKey::SyncClean
            | ConfigKey::SyncShardTemplate
            | ConfigKey::SyncPackageTemplate => "sync",
            ConfigKey::OutputDir => "output",
            ConfigKey::LoggingDir => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::OriginUrl => "url",
            ConfigKey::OriginUserAgent => "user_agent",
            ConfigKey::MirrorsUrls => "urls",
            ConfigKey::SyncMaxConnections => "max_connections",
            ConfigKey::SyncTimeout => "timeout",
            ConfigKey::SyncErrorLimit => "error_limit",
            ConfigKey::SyncVerifyChecksums => "verify_checksums",
            ConfigKey::SyncClean => "clean",
            ConfigKey::SyncShardTemplate => "shard_template",
            ConfigKey::SyncPackageTemplate => "package_template",
            ConfigKey::OutputDir | ConfigKey::LoggingDir => "dir",
        }
    }

    /// `section.key`
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        fn path(p: &Option<PathBuf>) -> String {
            p.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        }

        match self {
            ConfigKey::OriginUrl => config.origin_url.clone().unwrap_or_default(),
            ConfigKey::OriginUserAgent => config.user_agent.clone(),
            ConfigKey::MirrorsUrls => config.mirrors.join(", "),
            ConfigKey::SyncMaxConnections => config.max_connections.to_string(),
            ConfigKey::SyncTimeout => config.timeout_secs.to_string(),
            ConfigKey::SyncErrorLimit => config.error_limit.to_string(),
            ConfigKey::SyncVerifyChecksums => config.verify_checksums.to_string(),
            ConfigKey::SyncClean => config.clean.to_string(),
            ConfigKey::SyncShardTemplate => config.shard_template.clone(),
            ConfigKey::SyncPackageTemplate => config.package_template.clone(),
            ConfigKey::OutputDir => path(&config.output_dir),
            ConfigKey::LoggingDir => path(&config.log_dir),
        }
    }

    /// Parse and store a value.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> MirrorResult<()> {
        let value = value.trim();
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

        match self {
            ConfigKey::OriginUrl => config.origin_url = optional(value),
            ConfigKey::OriginUserAgent => {
                config.user_agent = optional(value).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
            }
            ConfigKey::MirrorsUrls => {
                config.mirrors = value
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            ConfigKey::SyncMaxConnections => {
                config.max_connections = self.parse_positive(value)?;
            }
            ConfigKey::SyncTimeout => config.timeout_secs = self.parse_positive(value)? as u64,
            ConfigKey::SyncErrorLimit => config.error_limit = self.parse_positive(value)?,
            ConfigKey::SyncVerifyChecksums => config.verify_checksums = self.parse_bool(value)?,
            ConfigKey::SyncClean => config.clean = self.parse_bool(value)?,
            ConfigKey::SyncShardTemplate => config.shard_template = value.to_string(),
            ConfigKey::SyncPackageTemplate => config.package_template = value.to_string(),
            ConfigKey::OutputDir => config.output_dir = optional(value).map(PathBuf::from),
            ConfigKey::LoggingDir => config.log_dir = optional(value).map(PathBuf::from),
        }
        Ok(())
    }

    fn parse_positive(&self, value: &str) -> MirrorResult<usize> {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(MirrorError::Config(format!(
                "{} must be a positive integer, got '{}'",
                self.name(),
                value
            ))),
        }
    }

    fn parse_bool(&self, value: &str) -> MirrorResult<bool> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(MirrorError::Config(format!(
                "{} must be true or false, got '{}'",
                self.name(),
                value
            ))),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| MirrorError::Config(format!("unknown configuration key '{}'", s)))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}
