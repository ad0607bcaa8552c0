//! Load config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dtn_core::config::{
    DEFAULT_BODY_MAX_CHARS, DEFAULT_DISPATCH_CAPACITY, DEFAULT_SECONDS_BETWEEN_DISPATCHES,
    DEFAULT_SUBJECT_MAX_CHARS,
};
use dtn_core::{ConfigError, MessageLimits};

/// Station configuration. File: `--config PATH`, else ~/.config/dtn-link/config.toml
/// or /etc/dtn-link/config.toml.
/// Env overrides: DTN_HOST, DTN_PORT, DTN_SECONDS_BETWEEN_DISPATCHES,
/// DTN_RECEIVE_TIMEOUT_SECS, DTN_CONNECTION_CHECK_SECS, DTN_DISPATCH_CAPACITY,
/// DTN_SUBJECT_MAX_CHARS, DTN_BODY_MAX_CHARS, DTN_BACKUP_PATH, DTN_LOG_FILE.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server: address to bind. Client: address to connect to.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_seconds_between_dispatches")]
    pub seconds_between_dispatches: u32,
    /// Upper bound on waiting for the peer's dispatch.
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
    #[serde(default = "default_connection_check_secs")]
    pub connection_check_secs: u64,
    #[serde(default = "default_dispatch_capacity")]
    pub dispatch_capacity: usize,
    #[serde(default = "default_subject_max_chars")]
    pub subject_max_chars: usize,
    #[serde(default = "default_body_max_chars")]
    pub body_max_chars: usize,
    /// Backup file. Defaults to `<role>_backup.bin` in the working directory.
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
    /// Log to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_seconds_between_dispatches() -> u32 {
    DEFAULT_SECONDS_BETWEEN_DISPATCHES
}
fn default_receive_timeout_secs() -> u64 {
    30
}
fn default_connection_check_secs() -> u64 {
    1
}
fn default_dispatch_capacity() -> usize {
    DEFAULT_DISPATCH_CAPACITY
}
fn default_subject_max_chars() -> usize {
    DEFAULT_SUBJECT_MAX_CHARS
}
fn default_body_max_chars() -> usize {
    DEFAULT_BODY_MAX_CHARS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            seconds_between_dispatches: default_seconds_between_dispatches(),
            receive_timeout_secs: default_receive_timeout_secs(),
            connection_check_secs: default_connection_check_secs(),
            dispatch_capacity: default_dispatch_capacity(),
            subject_max_chars: default_subject_max_chars(),
            body_max_chars: default_body_max_chars(),
            backup_path: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Settings the core needs.
    pub fn to_core(&self) -> dtn_core::Config {
        dtn_core::Config {
            dispatch_capacity: self.dispatch_capacity,
            limits: MessageLimits {
                subject_max_chars: self.subject_max_chars,
                body_max_chars: self.body_max_chars,
            },
            seconds_between_dispatches: self.seconds_between_dispatches,
        }
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    pub fn connection_check(&self) -> Duration {
        Duration::from_secs(self.connection_check_secs)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn backup_path_for(&self, role: dtn_core::Role) -> PathBuf {
        self.backup_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{role}_backup.bin")))
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        self.to_core().validate()?;
        if self.receive_timeout_secs == 0 {
            return Err(LoadError::Invalid("receive_timeout_secs must be at least 1"));
        }
        if self.connection_check_secs == 0 {
            return Err(LoadError::Invalid("connection_check_secs must be at least 1"));
        }
        Ok(())
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), LoadError> {
        if let Some(s) = get("DTN_HOST") {
            self.host = s;
        }
        parse_env(&get, "DTN_PORT", &mut self.port)?;
        parse_env(&get, "DTN_SECONDS_BETWEEN_DISPATCHES", &mut self.seconds_between_dispatches)?;
        parse_env(&get, "DTN_RECEIVE_TIMEOUT_SECS", &mut self.receive_timeout_secs)?;
        parse_env(&get, "DTN_CONNECTION_CHECK_SECS", &mut self.connection_check_secs)?;
        parse_env(&get, "DTN_DISPATCH_CAPACITY", &mut self.dispatch_capacity)?;
        parse_env(&get, "DTN_SUBJECT_MAX_CHARS", &mut self.subject_max_chars)?;
        parse_env(&get, "DTN_BODY_MAX_CHARS", &mut self.body_max_chars)?;
        if let Some(s) = get("DTN_BACKUP_PATH") {
            self.backup_path = Some(PathBuf::from(s));
        }
        if let Some(s) = get("DTN_LOG_FILE") {
            self.log_file = Some(PathBuf::from(s));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), LoadError> {
    if let Some(s) = get(key) {
        *slot = s.trim().parse().map_err(|_| LoadError::Env { key, value: s })?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },
    #[error(transparent)]
    Core(#[from] ConfigError),
    #[error("{0}")]
    Invalid(&'static str),
}

/// Load config: merge default, then config file (explicit or first found),
/// then env vars, then validate.
pub fn load(explicit: Option<&Path>) -> Result<Config, LoadError> {
    let mut c = match explicit {
        Some(p) => load_file(p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => load_file(&p)?,
            None => Config::default(),
        },
    };
    c.apply_env(|k| std::env::var(k).ok())?;
    c.validate()?;
    Ok(c)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/dtn-link/config.toml"));
    }
    out.push(PathBuf::from("/etc/dtn-link/config.toml"));
    out
}

fn load_file(path: &Path) -> Result<Config, LoadError> {
    let s = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<Config>(&s).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
