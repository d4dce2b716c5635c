/*!
 * Unix daemonization: the classic double-fork, new session, and PID file dance.
 *
 * Only built on Unix — `--daemon` is rejected at the CLI layer on other platforms rather than
 * this module providing a no-op stand-in, since a daemon that silently stays in the foreground
 * is a worse surprise than a clear error.
 */

use std::fs;
use std::io::Write;
use std::path::Path;

use nix::sys::stat::Mode;
use nix::unistd::{fork, setsid, ForkResult};

use crate::error::{DaemonError, Result};

/// Fork twice so the daemon is reparented to init/systemd and can never reacquire a controlling
/// terminal, then write `pid_file` from the final process. Returns only in the grandchild; the
/// original process and the intermediate child both exit here.
pub fn daemonize(pid_file: &Path) -> Result<()> {
    match unsafe { fork() }.map_err(|e| DaemonError::Daemonize(e.to_string()))? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(|e| DaemonError::Daemonize(e.to_string()))?;

    match unsafe { fork() }.map_err(|e| DaemonError::Daemonize(e.to_string()))? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    nix::sys::stat::umask(Mode::from_bits_truncate(0o027));
    std::env::set_current_dir("/").map_err(|e| DaemonError::Daemonize(e.to_string()))?;

    redirect_standard_streams()?;
    write_pid_file(pid_file)?;

    Ok(())
}

fn redirect_standard_streams() -> Result<()> {
    use std::os::fd::AsRawFd;

    let dev_null = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| DaemonError::Daemonize(e.to_string()))?;
    let fd = dev_null.as_raw_fd();

    for target in [0, 1, 2] {
        nix::unistd::dup2(fd, target).map_err(|e| DaemonError::Daemonize(e.to_string()))?;
    }
    Ok(())
}

fn write_pid_file(pid_file: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file = fs::File::create(pid_file).map_err(|e| DaemonError::Daemonize(e.to_string()))?;
    write!(file, "{pid}").map_err(|e| DaemonError::Daemonize(e.to_string()))?;
    Ok(())
}
