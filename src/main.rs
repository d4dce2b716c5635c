/*!
 * gosync-rs: a directory-watching rsync daemon.
 *
 * Watches a directory tree, coalesces changes into a minimal set of sync actions, and drives
 * them out through `rsync`, falling back to periodic full-tree reconciliation.
 */

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use gosync_rs::config::Config;
use gosync_rs::core::Core;
use gosync_rs::error::DaemonError;
use gosync_rs::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "gosync-rs", version, about = "Directory-watching rsync daemon")]
struct Cli {
    /// Path to the YAML config file. Defaults to the standard search path (cwd, executable
    /// directory, /etc, /etc/gosync-rs).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fork into the background after startup (Unix only).
    #[arg(short, long)]
    daemon: bool,

    /// Where to write the PID file when running with --daemon.
    #[arg(long, value_name = "FILE", default_value = "/var/run/gosync-rs.pid")]
    pid_file: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gosync-rs: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), DaemonError> {
    let config = Config::load(cli.config.as_deref())?;
    init_logging(config.log_level)?;

    if cli.daemon {
        #[cfg(unix)]
        {
            gosync_rs::daemon::daemonize(&cli.pid_file)?;
        }
        #[cfg(not(unix))]
        {
            return Err(DaemonError::Daemonize(
                "--daemon is only supported on Unix".to_string(),
            ));
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gosync-rs starting");

    let core = Core::build(config)?;
    core.run()
}
