/*!
 * The dispatch loop: drains the queue and drives a [`TransferDriver`].
 *
 * Drain loop: each tick, pull whatever the queue has settled into local `pending` work (a
 * newly-scheduled full sync always supersedes pending incremental actions), then — if the
 * retry backoff from a previous failure has elapsed — attempt to dispatch it. A failure sets
 * a backoff deadline and returns control to the outer loop rather than blocking on the spot,
 * so a stuck action never stops the loop from noticing `queue.full_sync` or dispatching
 * anything a scheduled full sync now supersedes.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::core::action::{Action, Method};
use crate::core::queue::{Drained, Queue};

/// How often the dispatcher polls the queue for a settled batch.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The external tool that actually moves bytes. Implemented by [`crate::driver::RsyncDriver`]
/// in production and by a recording fake in tests.
pub trait TransferDriver: Send + Sync {
    /// Push a single created/modified path to the remote.
    fn sync(&self, path: &str, is_dir: bool) -> std::io::Result<()>;
    /// Remove a single path from the remote.
    fn delete(&self, path: &str, is_dir: bool) -> std::io::Result<()>;
    /// Reconcile the entire tree, file deletions included.
    fn full_sync(&self) -> std::io::Result<()>;
}

/// Work the dispatcher is currently carrying between ticks, surviving across a failed attempt.
enum Pending {
    None,
    FullSync,
    Actions(Vec<Action>),
}

/// Run the dispatch loop until `stop` is set. Intended to run on its own thread; `queue` and
/// `driver` are shared with the watcher thread and the scheduler thread respectively.
pub fn run(queue: Arc<Queue>, driver: Arc<dyn TransferDriver>, retry_interval: Duration, stop: Arc<AtomicBool>) {
    let mut pending = Pending::None;
    let mut retry_until: Option<Instant> = None;

    while !stop.load(Ordering::Relaxed) {
        pull_from_queue(&queue, &mut pending, &mut retry_until);

        let can_attempt = retry_until.map_or(true, |until| Instant::now() >= until);
        if can_attempt {
            attempt(&mut pending, driver.as_ref(), retry_interval, &mut retry_until);
        }

        sleep(POLL_INTERVAL);
    }
}

/// Fold whatever the queue has settled into `pending`. A full sync (scheduled or overflow-
/// promoted) always supersedes pending incremental actions and clears any backoff in effect —
/// the next attempt should run the full sync immediately, not wait out a stale deadline from
/// whatever it replaced.
fn pull_from_queue(queue: &Queue, pending: &mut Pending, retry_until: &mut Option<Instant>) {
    match queue.take() {
        None => {}
        Some(Drained::FullSync) => {
            if matches!(pending, Pending::Actions(_)) {
                warn!("full sync scheduled, dropping pending actions in favor of it");
            }
            *pending = Pending::FullSync;
            *retry_until = None;
        }
        Some(Drained::Overflow(n)) => {
            warn!(dropped = n, "queue overflowed capacity, falling back to full sync");
            *pending = Pending::FullSync;
            *retry_until = None;
        }
        Some(Drained::Actions(mut actions)) => match pending {
            Pending::Actions(existing) => existing.append(&mut actions),
            Pending::FullSync => {}
            Pending::None => *pending = Pending::Actions(actions),
        },
    }
}

/// Try to make progress on `pending`. On success it's cleared; on the first failure it's left
/// at the point of failure (earlier successes are not repeated) and `retry_until` is set so
/// the next attempt waits out `retry_interval` before trying again.
fn attempt(pending: &mut Pending, driver: &dyn TransferDriver, retry_interval: Duration, retry_until: &mut Option<Instant>) {
    match pending {
        Pending::None => {}
        Pending::FullSync => {
            info!("running full sync");
            match driver.full_sync() {
                Ok(()) => *pending = Pending::None,
                Err(e) => {
                    error!(error = %e, "full sync failed, will retry");
                    *retry_until = Some(Instant::now() + retry_interval);
                }
            }
        }
        Pending::Actions(actions) => {
            let mut done = 0;
            let mut failed = false;
            for action in actions.iter() {
                let result = match action.method {
                    Method::Create | Method::Write => driver.sync(&action.path, action.is_dir),
                    Method::Delete => driver.delete(&action.path, action.is_dir),
                };
                match result {
                    Ok(()) => done += 1,
                    Err(e) => {
                        error!(action = %action.describe(), error = %e, "transfer failed, will retry");
                        *retry_until = Some(Instant::now() + retry_interval);
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                actions.drain(..done);
            } else {
                *pending = Pending::None;
            }
        }
    }
}
