/*!
 * Error types for the gosync-rs daemon
 */

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Top-level error type for the daemon.
///
/// Every fallible internal API returns `Result<T, DaemonError>`, propagated with `?`. Only
/// startup-phase errors (config, watcher init, scheduler init, driver init, daemonization)
/// ever reach `main`; failures at runtime (transfer-driver calls, include-eval) are reduced
/// to booleans and retried instead of bubbling up as `DaemonError`.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to initialize filesystem watcher: {0}")]
    WatcherInit(String),

    #[error("failed to add watch on {path}: {source}")]
    WatchAdd {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to initialize transfer driver: {0}")]
    DriverInit(String),

    #[error("failed to start scheduler: {0}")]
    SchedulerInit(String),

    #[error("invalid cron expression {expr:?}: {source}")]
    InvalidCron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("daemonization failed: {0}")]
    Daemonize(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DaemonError {
    /// Process exit code returned by `main` for each failure mode.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Config(_)
            | DaemonError::ConfigNotFound(_)
            | DaemonError::InvalidPattern { .. }
            | DaemonError::Yaml(_) => 1,
            DaemonError::Daemonize(_) => 2,
            DaemonError::DriverInit(_) => 3,
            DaemonError::SchedulerInit(_) | DaemonError::InvalidCron { .. } => 4,
            DaemonError::WatcherInit(_) | DaemonError::WatchAdd { .. } => 5,
            DaemonError::Io(_) => 1,
        }
    }
}
