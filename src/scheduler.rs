/*!
 * Cron and one-shot job scheduling.
 *
 * Two kinds of timers share this module: the `rsync.full-sync` timer, which simply relatches
 * the queue's full-sync flag, and `jobs[]` entries, which spawn an external command on a cron
 * schedule with the connection parameters exposed as `RSYNC_*` environment variables.
 *
 * Cron expressions here are the six-field `cron` crate syntax (seconds first), not the
 * traditional five-field unix crontab syntax — documented in DESIGN.md as a deliberate choice.
 */

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tracing::{error, info};

use crate::config::{Config, FullSyncMode, JobConfig, RsyncConfig};
use crate::core::queue::Queue;
use crate::error::{DaemonError, Result};

enum Timer {
    FullSyncCron(Schedule),
    FullSyncAfter(Duration),
    Job { schedule: Schedule, job: JobConfig },
}

pub struct Scheduler {
    timers: Vec<Timer>,
    queue: Arc<Queue>,
    rsync: RsyncConfig,
    working_dir: PathBuf,
}

impl Scheduler {
    /// Parse every cron expression up front so a typo is a startup error, not a silent no-op
    /// discovered hours later.
    pub fn build(config: &Config, queue: Arc<Queue>) -> Result<Self> {
        let mut timers = Vec::new();

        match &config.rsync.full_sync {
            FullSyncMode::Startup | FullSyncMode::None => {}
            FullSyncMode::After(duration) => timers.push(Timer::FullSyncAfter(*duration)),
            FullSyncMode::Cron(expr) => {
                timers.push(Timer::FullSyncCron(parse_cron(expr)?));
            }
        }

        for job in &config.jobs {
            let schedule = parse_cron(&job.cron)?;
            timers.push(Timer::Job {
                schedule,
                job: job.clone(),
            });
        }

        Ok(Self {
            timers,
            queue,
            rsync: config.rsync.clone(),
            working_dir: config.dir.clone(),
        })
    }

    /// Spawn one thread per timer. Each thread owns its own schedule cursor and loops forever
    /// (one-shot timers exit their thread after firing once).
    pub fn start(self) {
        let queue = self.queue;
        let rsync = Arc::new(self.rsync);
        let working_dir = self.working_dir;

        for timer in self.timers {
            let queue = Arc::clone(&queue);
            let rsync = Arc::clone(&rsync);
            let working_dir = working_dir.clone();
            thread::spawn(move || run_timer(timer, queue, rsync, working_dir));
        }
    }
}

fn run_timer(timer: Timer, queue: Arc<Queue>, rsync: Arc<RsyncConfig>, working_dir: PathBuf) {
    match timer {
        Timer::FullSyncAfter(duration) => {
            thread::sleep(duration);
            info!("scheduled full-sync delay elapsed");
            queue.schedule_full_sync();
        }
        Timer::FullSyncCron(schedule) => loop {
            let Some(delay) = next_delay(&schedule) else {
                return;
            };
            thread::sleep(delay);
            info!("cron-triggered full sync");
            queue.schedule_full_sync();
        },
        Timer::Job { schedule, job } => loop {
            let Some(delay) = next_delay(&schedule) else {
                return;
            };
            thread::sleep(delay);
            run_job(&job, &rsync, &working_dir);
        },
    }
}

fn next_delay(schedule: &Schedule) -> Option<Duration> {
    let now = Utc::now();
    let next = schedule.after(&now).next()?;
    (next - now).to_std().ok()
}

fn run_job(job: &JobConfig, rsync: &RsyncConfig, working_dir: &PathBuf) {
    info!(command = %job.command, "running scheduled job");
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&job.command)
        .current_dir(working_dir)
        .env("RSYNC_HOST", &rsync.host)
        .env("RSYNC_PORT", rsync.port.to_string())
        .env("RSYNC_USERNAME", &rsync.username)
        .env("RSYNC_PASSWORD", rsync.password.as_deref().unwrap_or(""))
        .env("RSYNC_SPACE", &rsync.space)
        .env("RSYNC_ROOT_PATH", &rsync.root_path)
        .status();

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => error!(command = %job.command, %status, "scheduled job exited non-zero"),
        Err(e) => error!(command = %job.command, error = %e, "failed to spawn scheduled job"),
    }
}

fn parse_cron(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr).map_err(|source| DaemonError::InvalidCron {
        expr: expr.to_string(),
        source,
    })
}
