/*!
 * Configuration loading and validation for gosync-rs
 *
 * Parses the `gosync-rs` YAML schema and resolves the config file search order into
 * strongly-typed Rust values, so the rest of the daemon never re-parses a duration string or
 * re-checks a required field.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DaemonError, Result};

/// Default config file names tried (in order) when no explicit name is given.
const DEFAULT_NAMES: &[&str] = &["gosync.yaml", "gosync.yml"];

/// `log.level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "VERBOSE" | "TRACE" => LogLevel::Trace,
            "DEBUG" => LogLevel::Debug,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            "FATAL" => LogLevel::Fatal,
            _ => LogLevel::Info,
        }
    }

    /// Maps to a `tracing` level. `Fatal` has no tracing equivalent and is treated as `Error`.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Fatal => tracing::Level::ERROR,
        }
    }
}

/// `rsync.full-sync`: when and how the periodic full-tree reconciliation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullSyncMode {
    /// Schedule a single full sync right after the watcher starts.
    Startup,
    /// Never schedule a full sync outside of overflow promotion.
    None,
    /// Run on a cron schedule, e.g. `0 */6 * * *`.
    Cron(String),
    /// Run once, after the given delay (`@after 10m`).
    After(Duration),
}

impl FullSyncMode {
    fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(FullSyncMode::Startup);
        }
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "startup" => Ok(FullSyncMode::Startup),
            "none" | "false" => Ok(FullSyncMode::None),
            _ => {
                if let Some(after) = lower.strip_prefix("@after ") {
                    let dur = humantime::parse_duration(after.trim()).map_err(|e| {
                        DaemonError::Config(format!(
                            "invalid rsync.full-sync duration {trimmed:?}: {e}"
                        ))
                    })?;
                    Ok(FullSyncMode::After(dur))
                } else {
                    // Accepted as-is; validated as a real cron expression once the scheduler
                    // registers it (see scheduler::Scheduler::add).
                    Ok(FullSyncMode::Cron(trimmed.to_string()))
                }
            }
        }
    }
}

/// `rsync.*` — the transfer endpoint and watch behavior.
#[derive(Debug, Clone)]
pub struct RsyncConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub timeout: Duration,
    pub io_timeout: Option<Duration>,
    pub space: String,
    pub root_path: PathBuf,
    pub watch_scope_eval: Option<String>,
    pub compress: bool,
    pub allow_delete: bool,
    pub full_sync: FullSyncMode,
    pub excludes: Vec<String>,
}

/// `queue.*` — the action queue's bounded-buffer and retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub retry_interval: Duration,
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(2),
            capacity: 100,
        }
    }
}

/// A single `jobs[]` entry: an external command run on a cron schedule.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub cron: String,
    pub command: String,
}

/// Fully parsed and validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the config file; jobs inherit it as their working directory.
    pub dir: PathBuf,
    pub log_level: LogLevel,
    pub rsync: RsyncConfig,
    pub queue: QueueConfig,
    pub jobs: Vec<JobConfig>,
}

/// Raw, pre-validation shape of the YAML document. Kept separate from [`Config`] so that
/// every field can be `Option` and defaulting/validation happens in one place.
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    log: RawLog,
    rsync: RawRsync,
    #[serde(default)]
    queue: RawQueue,
    #[serde(default)]
    jobs: Vec<RawJob>,
}

#[derive(Debug, Deserialize, Default)]
struct RawLog {
    level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawRsync {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<String>,
    #[serde(rename = "io-timeout")]
    io_timeout: Option<String>,
    space: Option<String>,
    #[serde(rename = "root-path")]
    root_path: Option<String>,
    #[serde(rename = "watch-scope-eval")]
    watch_scope_eval: Option<String>,
    compress: Option<bool>,
    #[serde(rename = "allow-delete")]
    allow_delete: Option<bool>,
    #[serde(rename = "full-sync")]
    full_sync: Option<String>,
    #[serde(default)]
    excludes: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawQueue {
    #[serde(rename = "retry-interval")]
    retry_interval: Option<String>,
    capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    cron: Option<String>,
    command: Option<String>,
}

impl Config {
    /// Locate and parse the config file.
    ///
    /// `explicit` is the `--config` flag value, if any. Search order when not given:
    /// current working directory, the executable's directory, `/etc`, `/etc/gosync-rs` —
    /// trying `gosync.yaml` then `gosync.yml` at each stop. An explicit path is used as-is,
    /// whether or not it exists (a missing explicit path is a config error, not a fallback
    /// trigger).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(DaemonError::ConfigNotFound(p.display().to_string()));
                }
                p.to_path_buf()
            }
            None => find_config_file()
                .ok_or_else(|| DaemonError::ConfigNotFound("gosync.yaml".to_string()))?,
        };

        let data = std::fs::read_to_string(&path)?;
        let raw: RawConfig = serde_yaml::from_str(&data)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_raw(raw, dir)
    }

    fn from_raw(raw: RawConfig, dir: PathBuf) -> Result<Self> {
        let log_level = raw
            .log
            .level
            .as_deref()
            .map(LogLevel::parse)
            .unwrap_or_default();

        let rsync = raw.rsync;
        let host = rsync
            .host
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DaemonError::Config("rsync.host is null".to_string()))?;
        let username = rsync
            .username
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DaemonError::Config("rsync.username is null".to_string()))?;
        let space = rsync
            .space
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DaemonError::Config("rsync.space is null".to_string()))?;
        let mut root_path = rsync
            .root_path
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DaemonError::Config("rsync.root-path is null".to_string()))?;
        if !root_path.starts_with('/') {
            return Err(DaemonError::Config(
                "rsync.root-path must be an absolute path".to_string(),
            ));
        }
        if !root_path.ends_with('/') {
            root_path.push('/');
        }

        let timeout = parse_duration_opt(rsync.timeout.as_deref(), "rsync.timeout")?
            .unwrap_or(Duration::from_secs(30));
        let io_timeout = parse_duration_opt(rsync.io_timeout.as_deref(), "rsync.io-timeout")?;

        let full_sync = match rsync.full_sync {
            Some(raw) => FullSyncMode::parse(&raw)?,
            None => FullSyncMode::Startup,
        };

        let queue_retry = parse_duration_opt(
            raw.queue.retry_interval.as_deref(),
            "queue.retry-interval",
        )?
        .unwrap_or(Duration::from_secs(2));

        let capacity = match raw.queue.capacity {
            None => 100,
            Some(n) if n > 0 => n as usize,
            Some(_) => {
                return Err(DaemonError::Config(
                    "queue.capacity must be positive".to_string(),
                ))
            }
        };

        let mut jobs = Vec::with_capacity(raw.jobs.len());
        for job in raw.jobs {
            let cron = job
                .cron
                .filter(|s| !s.is_empty())
                .ok_or_else(|| DaemonError::Config("job.cron is null".to_string()))?;
            let command = job
                .command
                .filter(|s| !s.is_empty())
                .ok_or_else(|| DaemonError::Config("job.command is null".to_string()))?;
            jobs.push(JobConfig { cron, command });
        }

        Ok(Config {
            dir,
            log_level,
            rsync: RsyncConfig {
                host,
                port: rsync.port.filter(|&p| p != 0).unwrap_or(873),
                username,
                password: rsync.password.filter(|s| !s.is_empty()),
                timeout,
                io_timeout,
                space,
                root_path: PathBuf::from(root_path),
                watch_scope_eval: rsync.watch_scope_eval.filter(|s| !s.is_empty()),
                compress: rsync.compress.unwrap_or(false),
                allow_delete: rsync.allow_delete.unwrap_or(false),
                full_sync,
                excludes: rsync.excludes,
            },
            queue: QueueConfig {
                retry_interval: queue_retry,
                capacity,
            },
            jobs,
        })
    }
}

fn parse_duration_opt(raw: Option<&str>, field: &str) -> Result<Option<Duration>> {
    match raw {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => humantime::parse_duration(s)
            .map(Some)
            .map_err(|e| DaemonError::Config(format!("invalid duration for {field} ({s:?}): {e}"))),
    }
}

/// Walks the fixed search path, trying each default file name at each stop.
fn find_config_file() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            roots.push(dir.to_path_buf());
        }
    }
    roots.push(PathBuf::from("/etc"));
    roots.push(PathBuf::from("/etc/gosync-rs"));

    for root in roots {
        for name in DEFAULT_NAMES {
            let candidate = root.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> RawConfig {
        RawConfig {
            log: RawLog::default(),
            rsync: RawRsync {
                host: Some("example.com".into()),
                username: Some("user".into()),
                space: Some("backups".into()),
                root_path: Some("/srv/data".into()),
                ..Default::default()
            },
            queue: RawQueue::default(),
            jobs: Vec::new(),
        }
    }

    #[test]
    fn defaults_applied() {
        let cfg = Config::from_raw(minimal_raw(), PathBuf::from("/etc")).unwrap();
        assert_eq!(cfg.rsync.port, 873);
        assert_eq!(cfg.queue.capacity, 100);
        assert_eq!(cfg.queue.retry_interval, Duration::from_secs(2));
        assert_eq!(cfg.rsync.full_sync, FullSyncMode::Startup);
        assert_eq!(cfg.rsync.root_path, PathBuf::from("/srv/data/"));
        assert!(!cfg.rsync.allow_delete);
    }

    #[test]
    fn rejects_missing_host() {
        let mut raw = minimal_raw();
        raw.rsync.host = None;
        assert!(Config::from_raw(raw, PathBuf::from("/etc")).is_err());
    }

    #[test]
    fn rejects_relative_root_path() {
        let mut raw = minimal_raw();
        raw.rsync.root_path = Some("data".into());
        assert!(Config::from_raw(raw, PathBuf::from("/etc")).is_err());
    }

    #[test]
    fn normalizes_trailing_slash() {
        let mut raw = minimal_raw();
        raw.rsync.root_path = Some("/srv/data".into());
        let cfg = Config::from_raw(raw, PathBuf::from("/etc")).unwrap();
        assert!(cfg.rsync.root_path.to_string_lossy().ends_with('/'));
    }

    #[test]
    fn parses_duration_fields() {
        let mut raw = minimal_raw();
        raw.rsync.timeout = Some("45s".into());
        raw.queue.retry_interval = Some("5s".into());
        let cfg = Config::from_raw(raw, PathBuf::from("/etc")).unwrap();
        assert_eq!(cfg.rsync.timeout, Duration::from_secs(45));
        assert_eq!(cfg.queue.retry_interval, Duration::from_secs(5));
    }

    #[test]
    fn full_sync_false_is_alias_for_none() {
        let mut raw = minimal_raw();
        raw.rsync.full_sync = Some("false".into());
        let cfg = Config::from_raw(raw, PathBuf::from("/etc")).unwrap();
        assert_eq!(cfg.rsync.full_sync, FullSyncMode::None);
    }

    #[test]
    fn full_sync_after_duration() {
        let mut raw = minimal_raw();
        raw.rsync.full_sync = Some("@after 10m".into());
        let cfg = Config::from_raw(raw, PathBuf::from("/etc")).unwrap();
        assert_eq!(cfg.rsync.full_sync, FullSyncMode::After(Duration::from_secs(600)));
    }

    #[test]
    fn full_sync_cron_expression_passed_through() {
        let mut raw = minimal_raw();
        raw.rsync.full_sync = Some("0 0 * * *".into());
        let cfg = Config::from_raw(raw, PathBuf::from("/etc")).unwrap();
        assert_eq!(cfg.rsync.full_sync, FullSyncMode::Cron("0 0 * * *".to_string()));
    }

    #[test]
    fn rejects_negative_capacity() {
        let mut raw = minimal_raw();
        raw.queue.capacity = Some(-1);
        assert!(Config::from_raw(raw, PathBuf::from("/etc")).is_err());
    }

    #[test]
    fn rejects_job_missing_command() {
        let mut raw = minimal_raw();
        raw.jobs.push(RawJob {
            cron: Some("@every 1h".into()),
            command: None,
        });
        assert!(Config::from_raw(raw, PathBuf::from("/etc")).is_err());
    }
}
