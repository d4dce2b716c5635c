/*!
 * The coalescing action queue.
 *
 * Every filesystem event the watcher accepts is `offer()`ed here. The queue applies semantic
 * subsumption rules so that a burst of events collapses into the smallest set of actions that
 * still produces the same end state on the remote side, then hands the result to the
 * dispatcher once things have settled for [`DEBOUNCE`].
 *
 * All state lives behind a single [`Mutex`], held for the duration of each operation, so the
 * watcher thread and the dispatcher thread never observe a torn read or a lost update.
 */

use std::sync::Mutex;
use std::time::Duration;

use crate::core::action::{now_ms, Action, Method};
use crate::core::filter::is_parent;

/// How long the queue must go untouched before `take()` will drain it.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// What `take()` handed back.
#[derive(Debug)]
pub enum Drained {
    /// A full tree reconciliation is due; the incremental queue was cleared (if non-empty,
    /// its contents are subsumed by the full sync and not reported separately).
    FullSync,
    /// The queue grew past capacity before it could settle; `n` queued actions were discarded
    /// in favor of falling back to a full sync.
    Overflow(usize),
    /// A settled, coalesced batch of actions, oldest first.
    Actions(Vec<Action>),
}

struct Inner {
    actions: Vec<Action>,
    full_sync: bool,
    overflowed: bool,
}

pub struct Queue {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Queue {
    /// A fresh, empty queue. `full_sync` starts clear — whether the daemon reconciles the whole
    /// tree before trusting incremental events is a config decision (`rsync.full-sync: startup`
    /// vs `none`), made by the caller via [`Queue::schedule_full_sync`] after construction, not
    /// baked in here.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                actions: Vec::new(),
                full_sync: false,
                overflowed: false,
            }),
            capacity,
        }
    }

    /// Request a full tree reconciliation on the next `take()`, superseding any queued
    /// incremental actions.
    pub fn schedule_full_sync(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.full_sync = true;
    }

    /// Offer a raw event for admission. Applies, in order: the editor-noise filter, directory
    /// delete subsumption (drops anything already queued under a deleted directory), and
    /// create/write-over-delete subsumption (a recreate cancels a pending delete of the same
    /// path). Exact duplicates of the last-queued action for a path are dropped.
    pub fn offer(&self, method: Method, path: impl Into<String>) {
        let path = path.into();
        if is_ignored_noise(&path) {
            return;
        }

        let action = Action::new(method, path);
        let mut inner = self.inner.lock().unwrap();

        // Ignore test: if an existing action already makes this one a no-op, drop it outright
        // rather than adding a redundant (and possibly subsuming-itself) entry.
        let ignored = inner.actions.iter().any(|existing| match action.method {
            Method::Create => existing.method == Method::Create && existing.is_dir && is_parent(&existing.path, &action.path),
            Method::Write => {
                (existing.method == Method::Create && existing.is_dir && is_parent(&existing.path, &action.path))
                    || (existing.method == Method::Write && existing.path == action.path)
            }
            Method::Delete => existing.method == Method::Delete && existing.is_dir && is_parent(&existing.path, &action.path),
        });
        if ignored {
            return;
        }

        // Otherwise, drop whatever this new action subsumes.
        inner.actions.retain(|existing| {
            let subsumed = match action.method {
                Method::Create if action.is_dir => is_parent(&action.path, &existing.path),
                Method::Create => !existing.is_dir && existing.path == action.path,
                Method::Write => !existing.is_dir && existing.path == action.path,
                Method::Delete if action.is_dir => is_parent(&action.path, &existing.path),
                Method::Delete => !existing.is_dir && existing.path == action.path,
            };
            !subsumed
        });

        inner.actions.push(action);
        if inner.actions.len() > self.capacity {
            inner.overflowed = true;
        }
    }

    /// Drain the longest prefix of the queue whose entries are each older than [`DEBOUNCE`],
    /// leaving any newer suffix queued. Returns `None` if there's nothing old enough yet,
    /// either because the queue is empty or because its oldest entry hasn't settled.
    ///
    /// This is a per-action age check, not "has the whole queue gone quiet" — continuous
    /// churn on distinct paths (each `offer()` touching a path other actions don't) must not
    /// starve the prefix that's already old enough to ship.
    pub fn take(&self) -> Option<Drained> {
        let mut inner = self.inner.lock().unwrap();

        if inner.full_sync {
            inner.full_sync = false;
            inner.overflowed = false;
            inner.actions.clear();
            return Some(Drained::FullSync);
        }

        if inner.overflowed {
            let n = inner.actions.len();
            inner.overflowed = false;
            inner.actions.clear();
            return Some(Drained::Overflow(n));
        }

        if inner.actions.is_empty() {
            return None;
        }

        let now = now_ms();
        let debounce_ms = DEBOUNCE.as_millis() as u64;
        let settled = inner
            .actions
            .iter()
            .take_while(|action| now.saturating_sub(action.timestamp_ms) >= debounce_ms)
            .count();

        if settled == 0 {
            return None;
        }

        Some(Drained::Actions(inner.actions.drain(..settled).collect()))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().actions.len()
    }
}

/// Patterns emitted by editors and vim's writability probe (`4913`) that never represent a
/// real content change and would otherwise show up as a meaningless create/delete pair.
fn is_ignored_noise(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name == "4913"
        || name.ends_with('~')
        || name.ends_with(".swp")
        || name.ends_with(".swx")
        || name.starts_with(".#")
}
