/*!
 * Core daemon orchestration: wires the watcher, queue, dispatcher and scheduler together.
 */

pub mod action;
pub mod dispatcher;
pub mod filter;
pub mod queue;
pub mod watcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::info;

use crate::config::{Config, FullSyncMode};
use crate::driver::RsyncDriver;
use crate::error::Result;
use crate::scheduler::Scheduler;
use dispatcher::TransferDriver;
use queue::Queue;
use watcher::Watcher;

/// Owns every long-lived component of a running daemon and the threads driving them.
///
/// Construction order matters: the transfer driver is built first (it has no dependency on
/// anything else and its failure should prevent the watcher from ever starting), then the
/// queue, then the scheduler (which needs the queue to wire up `full-sync` cron/`@after` jobs),
/// and finally the watcher (which needs the queue to have somewhere to push events — starting
/// it any earlier risks events with no consumer).
pub struct Core {
    config: Config,
    queue: Arc<Queue>,
    driver: Arc<dyn TransferDriver>,
    scheduler: Scheduler,
    watcher: Watcher,
    watcher_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    stop: Arc<AtomicBool>,
}

impl Core {
    pub fn build(config: Config) -> Result<Self> {
        let driver: Arc<dyn TransferDriver> = Arc::new(RsyncDriver::new(&config.rsync)?);

        let queue = Arc::new(Queue::new(config.queue.capacity));

        let scheduler = Scheduler::build(&config, Arc::clone(&queue))?;

        let (watcher, watcher_rx) = Watcher::new(config.rsync.root_path.clone())?;

        Ok(Self {
            config,
            queue,
            driver,
            scheduler,
            watcher,
            watcher_rx,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start every background thread and block until one of them exits (normally only on
    /// process shutdown, since the dispatch and watch loops otherwise run forever).
    pub fn run(self) -> Result<()> {
        let watch_scope_eval = self.config.rsync.watch_scope_eval.clone();
        // A failed initial eval (or no command configured) falls back to watching the whole
        // tree rather than failing startup — the command re-runs on every directory creation,
        // so a transient failure here just means the first walk is broader than it needs to be.
        let initial_includes: Option<Vec<String>> = watch_scope_eval
            .as_deref()
            .and_then(crate::include_eval::evaluate)
            .flatten();

        info!(root = %self.config.rsync.root_path.display(), "starting initial directory walk");
        self.watcher.add_tree(
            &self.config.rsync.root_path,
            &self.config.rsync.excludes,
            initial_includes.as_deref(),
        );

        if self.config.rsync.full_sync == FullSyncMode::Startup {
            info!("rsync.full-sync is \"startup\"; scheduling an initial full sync");
            self.queue.schedule_full_sync();
        }

        self.scheduler.start();

        let dispatcher_handle = self.spawn_dispatcher();

        watcher::run(
            &self.watcher,
            &self.watcher_rx,
            &self.config.rsync.excludes,
            watch_scope_eval.as_deref(),
            initial_includes,
            self.config.rsync.allow_delete,
            &self.queue,
        );

        self.stop.store(true, Ordering::Relaxed);
        let _ = dispatcher_handle.join();
        Ok(())
    }

    fn spawn_dispatcher(&self) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let driver = Arc::clone(&self.driver);
        let retry_interval = self.config.queue.retry_interval;
        let stop = Arc::clone(&self.stop);
        std::thread::spawn(move || dispatcher::run(queue, driver, retry_interval, stop))
    }
}
