/*!
 * The `rsync` transfer driver.
 *
 * Shells out to the system `rsync` binary against an rsync-daemon endpoint (`rsync://`). All
 * three [`TransferDriver`] operations build on one helper that assembles the common connection
 * flags (port, timeout, compression, authentication) and appends operation-specific
 * filter/delete flags.
 *
 * Two temporary files are written once, at construction: the exclude list (so a single
 * `--exclude-from` flag stands in for one `--exclude` per pattern) and the rsync-daemon secret
 * (so the password never appears in a process listing via `--password-file` instead of an
 * argument or an env var rsync would otherwise echo back in `-v` output).
 */

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::config::RsyncConfig;
use crate::core::dispatcher::TransferDriver;
use crate::error::{DaemonError, Result};

const EXCLUDES_FILE: &str = "/tmp/rsync.excludes";
const SECRET_FILE: &str = "/tmp/rsync.secret";

pub struct RsyncDriver {
    config: RsyncConfig,
}

impl RsyncDriver {
    /// Writes the excludes and secret temp files once, up front, so a permissions problem on
    /// `/tmp` is a startup error rather than a mysteriously-failing first sync.
    pub fn new(config: &RsyncConfig) -> Result<Self> {
        if !config.excludes.is_empty() {
            write_owner_only(EXCLUDES_FILE, &config.excludes.join("\n")).map_err(|e| {
                DaemonError::DriverInit(format!("failed to write {EXCLUDES_FILE}: {e}"))
            })?;
        }
        write_owner_only(SECRET_FILE, config.password.as_deref().unwrap_or("")).map_err(|e| {
            DaemonError::DriverInit(format!("failed to write {SECRET_FILE}: {e}"))
        })?;

        Ok(Self {
            config: config.clone(),
        })
    }

    /// `rsync://user@host:port/space/<path>`, percent-encoding left to `rsync` itself (it
    /// accepts the raw path on its command line, unlike a browser-facing URL).
    fn remote_url(&self, path: &str) -> String {
        format!(
            "rsync://{}@{}:{}/{}/{}",
            self.config.username,
            self.config.host,
            self.config.port,
            self.config.space.trim_matches('/'),
            path
        )
    }

    fn local_path(&self, path: &str) -> std::path::PathBuf {
        self.config.root_path.join(path)
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("rsync");
        cmd.arg("-a");
        if self.config.compress {
            cmd.arg("-z");
        }
        cmd.arg(format!("--timeout={}", self.config.timeout.as_secs()));
        if let Some(io_timeout) = self.config.io_timeout {
            cmd.arg(format!("--contimeout={}", io_timeout.as_secs()));
        }
        if !self.config.excludes.is_empty() {
            cmd.arg(format!("--exclude-from={EXCLUDES_FILE}"));
        }
        cmd
    }

    fn run(&self, mut cmd: Command, description: &str) -> io::Result<()> {
        debug!(?cmd, description, "running rsync");
        let output = cmd.output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "rsync ({description}) exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl TransferDriver for RsyncDriver {
    fn sync(&self, path: &str, is_dir: bool) -> io::Result<()> {
        let mut cmd = self.base_command();
        let source = source_arg(&self.local_path(path), is_dir);
        cmd.arg(source).arg(self.remote_url(path));
        cmd.arg(format!("--password-file={SECRET_FILE}"));
        self.run(cmd, "sync")
    }

    /// Deletes a single remote path without disturbing anything else on the destination. Rather
    /// than scanning from the root (which would need an `--include` for every ancestor
    /// directory just to let rsync's filter rules descend that far), both sides of the
    /// transfer are rooted at `path`'s *parent* directory, so only the item's own basename needs
    /// an include rule — `--delete` then only ever finds that one entry missing on the sender
    /// side (it no longer exists locally, which is why we got a delete event in the first
    /// place).
    fn delete(&self, path: &str, _is_dir: bool) -> io::Result<()> {
        if !self.config.allow_delete {
            debug!(path, "allow-delete is false, skipping remote delete");
            return Ok(());
        }
        let parent = parent_slash_path(path);
        let mut cmd = self.base_command();
        cmd.arg("--delete")
            .arg("--ignore-errors")
            .arg(format!("--include={}", base_name(path)))
            .arg("--exclude=*")
            .arg(source_arg(&self.local_path(&parent), true))
            .arg(self.remote_url(&parent));
        cmd.arg(format!("--password-file={SECRET_FILE}"));
        self.run(cmd, "delete")
    }

    fn full_sync(&self) -> io::Result<()> {
        let mut cmd = self.base_command();
        if self.config.allow_delete {
            cmd.arg("--delete").arg("--ignore-errors");
        }
        cmd.arg(source_arg(&self.config.root_path, true))
            .arg(self.remote_url(""));
        cmd.arg(format!("--password-file={SECRET_FILE}"));
        self.run(cmd, "full sync")
    }
}

/// The `/`-joined directory containing `path`, with a trailing `/`, or `""` for a top-level
/// path (meaning: the watch root itself).
fn parent_slash_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(i) => format!("{}/", &trimmed[..i]),
        None => String::new(),
    }
}

/// The final path component of `path`, ignoring any trailing `/`.
fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// `rsync` copies a directory's *contents* when the source path ends in `/`, and the directory
/// itself (nested one level deeper on the far side) otherwise — the trailing slash is load
/// bearing and easy to get backwards.
fn source_arg(path: &Path, is_dir: bool) -> String {
    let s = path.display().to_string();
    if is_dir && !s.ends_with('/') {
        format!("{s}/")
    } else {
        s
    }
}

/// Write `contents` to `path`, creating or truncating it with owner-only (`0600`) permissions
/// on Unix. Non-Unix targets get a plain file — there is no portable equivalent and this
/// daemon's `--daemon` flag is Unix-only anyway.
fn write_owner_only(path: &str, contents: &str) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())
}
