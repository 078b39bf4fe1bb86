//! Settings from `revsync.toml`, environment variables and command-line flags.
//!
//! Later layers win: built-in defaults, then the file, then `REVSYNC_*` variables, then flags.
//!
//! ```toml
//! [lock]
//! max_retries = 8
//! stale_after_secs = 600
//!
//! [wait]
//! poll_interval_ms = 1000
//! timeout_secs = 3600
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lock::{DEFAULT_MAX_RETRIES, DEFAULT_STALE_AFTER_SECS, LockConfig};

pub const ENV_LOCK_MAX_RETRIES: &str = "REVSYNC_LOCK_MAX_RETRIES";
pub const ENV_LOCK_STALE_SECS: &str = "REVSYNC_LOCK_STALE_SECS";
pub const ENV_WAIT_POLL_MS: &str = "REVSYNC_WAIT_POLL_MS";
pub const ENV_WAIT_TIMEOUT_SECS: &str = "REVSYNC_WAIT_TIMEOUT_SECS";

pub const KEY_LOCK_MAX_RETRIES: &str = "lock.max_retries";
pub const KEY_LOCK_STALE_SECS: &str = "lock.stale_after_secs";
pub const KEY_WAIT_POLL_MS: &str = "wait.poll_interval_ms";
pub const KEY_WAIT_TIMEOUT_SECS: &str = "wait.timeout_secs";

/// Lock acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSection {
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Age in seconds after which a lock counts as stale (0 disables)
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

/// `applicator wait` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_timeout_secs() -> u64 {
    3_600
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// The complete revsync.toml structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RevsyncToml {
    #[serde(default)]
    pub lock: LockSection,
    #[serde(default)]
    pub wait: WaitSection,
}

impl RevsyncToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse revsync.toml")
    }

    /// Load from `path`, or defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write to `path`, refusing to replace an existing file.
    pub fn save_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize revsync.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            max_retries: self.lock.max_retries,
            stale_after: Duration::from_secs(self.lock.stale_after_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait.timeout_secs)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.lock.max_retries == 0 {
            warnings.push(
                "lock.max_retries is 0: any contention fails on the first attempt".to_string(),
            );
        } else if self.lock.max_retries > 64 {
            warnings.push(format!(
                "lock.max_retries is {}: a busy session can block a command for over {} minutes",
                self.lock.max_retries,
                self.lock.max_retries * 6400 / 60_000
            ));
        }
        if self.lock.stale_after_secs == 0 {
            warnings.push(
                "lock.stale_after_secs is 0: locks are never reported stale".to_string(),
            );
        }
        if self.wait.poll_interval_ms < 10 {
            warnings.push(format!(
                "wait.poll_interval_ms is {}: values below 10 are raised to 10",
                self.wait.poll_interval_ms
            ));
        }
        if self.wait.timeout_secs == 0 {
            warnings.push("wait.timeout_secs is 0: wait checks once and returns".to_string());
        }

        warnings
    }
}

/// Where an effective setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Default,
    File,
    Env,
    Flag,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::File => "file",
            Self::Env => "env",
            Self::Flag => "flag",
        };
        write!(f, "{}", s)
    }
}

/// Settings after layering, with the origin of each value.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub settings: RevsyncToml,
    pub file: PathBuf,
    pub file_exists: bool,
    pub origins: BTreeMap<&'static str, Origin>,
}

impl EffectiveConfig {
    /// Resolve defaults, `path` and the process environment.
    pub fn resolve(path: &Path) -> Result<Self> {
        Self::resolve_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with an injectable environment.
    pub fn resolve_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file_exists = path.exists();
        let mut origins: BTreeMap<&'static str, Origin> = [
            KEY_LOCK_MAX_RETRIES,
            KEY_LOCK_STALE_SECS,
            KEY_WAIT_POLL_MS,
            KEY_WAIT_TIMEOUT_SECS,
        ]
        .into_iter()
        .map(|key| (key, Origin::Default))
        .collect();

        let mut settings = RevsyncToml::default();
        if file_exists {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            settings = RevsyncToml::parse(&content)
                .with_context(|| format!("in {}", path.display()))?;
            let table: toml::Table = toml::from_str(&content).unwrap_or_default();
            for (key, origin) in origins.iter_mut() {
                if table_has(&table, key) {
                    *origin = Origin::File;
                }
            }
        }

        let mut config = Self {
            settings,
            file: path.to_path_buf(),
            file_exists,
            origins,
        };

        if let Some(v) = env_number(&env, ENV_LOCK_MAX_RETRIES)? {
            config.settings.lock.max_retries = v as usize;
            config.mark(KEY_LOCK_MAX_RETRIES, Origin::Env);
        }
        if let Some(v) = env_number(&env, ENV_LOCK_STALE_SECS)? {
            config.settings.lock.stale_after_secs = v;
            config.mark(KEY_LOCK_STALE_SECS, Origin::Env);
        }
        if let Some(v) = env_number(&env, ENV_WAIT_POLL_MS)? {
            config.settings.wait.poll_interval_ms = v;
            config.mark(KEY_WAIT_POLL_MS, Origin::Env);
        }
        if let Some(v) = env_number(&env, ENV_WAIT_TIMEOUT_SECS)? {
            config.settings.wait.timeout_secs = v;
            config.mark(KEY_WAIT_TIMEOUT_SECS, Origin::Env);
        }
        Ok(config)
    }

    /// Record a value that came from the command line.
    pub fn override_max_retries(&mut self, value: Option<usize>) {
        if let Some(v) = value {
            self.settings.lock.max_retries = v;
            self.mark(KEY_LOCK_MAX_RETRIES, Origin::Flag);
        }
    }

    pub fn override_poll_interval_ms(&mut self, value: Option<u64>) {
        if let Some(v) = value {
            self.settings.wait.poll_interval_ms = v;
            self.mark(KEY_WAIT_POLL_MS, Origin::Flag);
        }
    }

    pub fn override_timeout_secs(&mut self, value: Option<u64>) {
        if let Some(v) = value {
            self.settings.wait.timeout_secs = v;
            self.mark(KEY_WAIT_TIMEOUT_SECS, Origin::Flag);
        }
    }

    fn mark(&mut self, key: &'static str, origin: Origin) {
        self.origins.insert(key, origin);
    }

    /// `(key, value, origin)` rows in key order.
    pub fn rows(&self) -> Vec<(&'static str, String, Origin)> {
        let s = &self.settings;
        let value = |key: &str| match key {
            KEY_LOCK_MAX_RETRIES => s.lock.max_retries.to_string(),
            KEY_LOCK_STALE_SECS => s.lock.stale_after_secs.to_string(),
            KEY_WAIT_POLL_MS => s.wait.poll_interval_ms.to_string(),
            KEY_WAIT_TIMEOUT_SECS => s.wait.timeout_secs.to_string(),
            _ => String::new(),
        };
        self.origins
            .iter()
            .map(|(key, origin)| (*key, value(*key), *origin))
            .collect()
    }
}

fn table_has(table: &toml::Table, dotted: &str) -> bool {
    let mut parts = dotted.splitn(2, '.');
    let (Some(section), Some(field)) = (parts.next(), parts.next()) else {
        return false;
    };
    table
        .get(section)
        .and_then(|v| v.as_table())
        .is_some_and(|t| t.contains_key(field))
}

fn env_number(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match env(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
    }
}
