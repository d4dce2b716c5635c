/*!
 * Recursive filesystem watcher.
 *
 * Linux inotify (and the `notify` crate's thin wrapper around it) only ever watches a single
 * directory at a time; there is no native recursive mode. Instead of reaching for
 * `RecursiveMode::Recursive`, this walks the tree once at startup adding one watch per
 * directory, then extends the watch set as new directories are created. A `watched` set plays
 * the role of a watch-descriptor-to-path table — here it's keyed by path directly since
 * `notify` hands us full paths instead of descriptors.
 */

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Mutex;

use notify::event::{AccessKind, AccessMode, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::action::Method;
use crate::core::filter::{is_excluded, should_watch};
use crate::core::queue::Queue;
use crate::error::{DaemonError, Result};

pub struct Watcher {
    root: PathBuf,
    inner: RecommendedWatcher,
    watched: Mutex<HashSet<PathBuf>>,
}

impl Watcher {
    /// Construct a watcher rooted at `root` and the channel its events arrive on. Does not add
    /// any watches yet — call [`Watcher::add_tree`] once to perform the initial walk.
    pub fn new(root: PathBuf) -> Result<(Self, Receiver<notify::Result<Event>>)> {
        let (tx, rx) = channel();
        let inner = notify::recommended_watcher(move |res| {
            // The send side only fails once the receiver (the dispatch loop) is gone, at
            // which point there's nothing useful to do with the event anyway.
            let _ = tx.send(res);
        })
        .map_err(|e| DaemonError::WatcherInit(e.to_string()))?;

        Ok((
            Self {
                root,
                inner,
                watched: Mutex::new(HashSet::new()),
            },
            rx,
        ))
    }

    /// Walk `dir` (a subtree of `root`, or `root` itself) and add a non-recursive watch on
    /// every directory that survives the exclude/include filters.
    pub fn add_tree(&self, dir: &Path, excludes: &[String], includes: Option<&[String]>) {
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_dir() {
                continue;
            }
            let rel = self.relative_slash_path(entry.path(), true);
            if is_excluded(&rel, excludes) || !should_watch(&rel, includes) {
                continue;
            }
            self.add_one(entry.path());
        }
    }

    fn add_one(&self, dir: &Path) {
        let mut watched = self.watched.lock().unwrap();
        if watched.contains(dir) {
            return;
        }
        match self.inner.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                watched.insert(dir.to_path_buf());
                debug!(path = %dir.display(), "watching directory");
            }
            Err(e) => warn!(path = %dir.display(), error = %e, "failed to add watch"),
        }
    }

    fn forget(&self, dir: &Path) {
        self.watched.lock().unwrap().remove(dir);
    }

    fn was_watched(&self, dir: &Path) -> bool {
        self.watched.lock().unwrap().contains(dir)
    }

    /// Root-relative, `/`-joined path for `path`, with a trailing `/` if `is_dir`.
    fn relative_slash_path(&self, path: &Path, is_dir: bool) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let mut s = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        if is_dir && !s.is_empty() && !s.ends_with('/') {
            s.push('/');
        }
        s
    }
}

/// Drive the watcher's event channel into `queue`. Runs until the channel closes (the watcher
/// was dropped) — deliberately does not retry or spin on a closed channel, unlike a loop that
/// would busy-wait on repeated read failures.
///
/// `watch_scope_eval`, if given, is re-run every time a new directory is created so the include
/// scope can change while the daemon is running; `includes` starts out holding whatever the
/// caller already resolved at startup and is refreshed in place as new results come in.
///
/// `allow_delete` gates every path that would otherwise produce a `Delete` action: per §4.4's
/// event table, a disabled delete means the event never reaches `queue.offer` at all, not
/// just that the eventual remote delete is skipped — an offered `Delete` would still be able
/// to subsume pending `Create`/`Write` actions for the same subtree (§4.2) and consume queue
/// capacity even though, with deletes disabled, it should never have been admitted.
#[allow(clippy::too_many_arguments)]
pub fn run(
    watcher: &Watcher,
    rx: &Receiver<notify::Result<Event>>,
    excludes: &[String],
    watch_scope_eval: Option<&str>,
    mut includes: Option<Vec<String>>,
    allow_delete: bool,
    queue: &Queue,
) {
    loop {
        let event = match rx.recv() {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                warn!(error = %e, "watcher event error");
                continue;
            }
            Err(_) => {
                warn!("watcher event channel closed, stopping watch loop");
                break;
            }
        };
        handle_event(watcher, event, excludes, watch_scope_eval, &mut includes, allow_delete, queue);
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_event(
    watcher: &Watcher,
    event: Event,
    excludes: &[String],
    watch_scope_eval: Option<&str>,
    includes: &mut Option<Vec<String>>,
    allow_delete: bool,
    queue: &Queue,
) {
    for path in &event.paths {
        let is_dir = path.is_dir() || watcher.was_watched(path);
        let rel = watcher.relative_slash_path(path, is_dir);
        if rel.is_empty() {
            continue;
        }
        if is_excluded(&rel, excludes) {
            continue;
        }

        match event.kind {
            EventKind::Create(_) => {
                if path.is_dir() {
                    // The include scope is only ever re-checked on directory creation — once a
                    // directory is already watched, every event under it is in scope by
                    // construction, so other branches below don't re-run `should_watch`.
                    if let Some(cmd) = watch_scope_eval {
                        if let Some(refreshed) = crate::include_eval::evaluate(cmd) {
                            *includes = refreshed;
                        }
                    }
                    if should_watch(&rel, includes.as_deref()) {
                        watcher.add_tree(path, excludes, includes.as_deref());
                        queue.offer(Method::Create, rel);
                    }
                } else {
                    queue.offer(Method::Create, rel);
                }
            }
            // Requested so the kernel keeps the watch warm, but not translated into an
            // action on its own: only `Access(Close(Write))`, below, tells us the writer has
            // released the file, which is the point at which a sync won't race a partial write.
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {}
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                if !path.is_dir() {
                    queue.offer(Method::Write, rel);
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // Rename halves arrive as independent from/to events and are not correlated;
                // each side is treated as its own create/delete.
                if path.exists() {
                    if path.is_dir() {
                        watcher.add_tree(path, excludes, includes.as_deref());
                    }
                    queue.offer(Method::Create, rel);
                } else {
                    watcher.forget(path);
                    if allow_delete {
                        queue.offer(Method::Delete, rel);
                    }
                }
            }
            EventKind::Remove(RemoveKind::Any | RemoveKind::File | RemoveKind::Folder) => {
                watcher.forget(path);
                if allow_delete {
                    queue.offer(Method::Delete, rel);
                }
            }
            _ => {}
        }
    }
}
