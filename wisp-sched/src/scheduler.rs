//! The process-wide cooperative scheduler (spec.md §4.4, §4.5).
//!
//! A `Scheduler` owns the dependency graph described in spec.md §4.4: a
//! mapping from each active coroutine to the coroutine it is currently
//! awaiting (or `None` if it is runnable). It receives `Await`/`Finish`/
//! `Pause` events from coroutines as they run and, on `Await`, walks the
//! existing dependency chain to detect a cycle before recording a new
//! edge — exactly the check spec.md §4.4 describes, expressed as a plain
//! locked `HashMap` rather than a literal actor-with-channels, since every
//! mutation here is a handful of map operations with no blocking step
//! (the "never hold a lock across user code" rule in spec.md §5 is
//! satisfied by never holding `deps` across anything but map bookkeeping).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, trace};
use wisp_core::error::{ExceptionInfo, ExceptionKind};
use wisp_core::id::CoroutineId;
use wisp_core::stop::{RemoteStop, Stop};

use crate::coroutine::ControlSender;

/// The VM-wide dependency-graph coordinator (spec.md §4.4).
///
/// `coros` is the map spec.md names directly: key = an active coroutine,
/// value = `Some(target)` if it is awaiting `target`, `None` if it is
/// merely registered and runnable. Diagnostics fall directly out of this
/// shape: `coroCount` is the map's length, `awaitingCoros` its `Some`
/// entries, `yieldingCoros` its `None` entries (SPEC_FULL.md §4 fixes
/// this reading, since spec.md names the three queries but not their
/// exact relationship to the map).
pub struct Scheduler {
    deps: Mutex<HashMap<CoroutineId, Option<CoroutineId>>>,
    inboxes: Mutex<HashMap<CoroutineId, ControlSender>>,
    idle: tokio::sync::Notify,
    verbose: bool,
}

impl Scheduler {
    /// A scheduler with no registered coroutines.
    pub fn new() -> Self {
        Self::with_verbose_logging(false)
    }

    /// A scheduler whose dependency-graph bookkeeping (`Await`/`Pause`/
    /// `Finish`/resume) logs at `debug` instead of `trace` (SPEC_FULL.md
    /// §3's `VmConfig::scheduler_verbose_logging`).
    pub fn with_verbose_logging(verbose: bool) -> Self {
        Self {
            deps: Mutex::new(HashMap::new()),
            inboxes: Mutex::new(HashMap::new()),
            idle: tokio::sync::Notify::new(),
            verbose,
        }
    }

    /// Emit at `debug` when verbose logging is configured, `trace` otherwise.
    fn log_bookkeeping(&self, msg: &str, coroutine: CoroutineId, other: Option<CoroutineId>) {
        if self.verbose {
            match other {
                Some(o) => debug!(%coroutine, other = %o, "{}", msg),
                None => debug!(%coroutine, "{}", msg),
            }
        } else {
            match other {
                Some(o) => trace!(%coroutine, other = %o, "{}", msg),
                None => trace!(%coroutine, "{}", msg),
            }
        }
    }

    /// Register a freshly created coroutine as runnable (spec.md §4.5:
    /// `Created -> Running` on `Start` posted to the scheduler).
    pub fn register(&self, id: CoroutineId, inbox: ControlSender) {
        self.deps.lock().expect("scheduler mutex poisoned").insert(id, None);
        self.inboxes.lock().expect("scheduler mutex poisoned").insert(id, inbox);
        self.log_bookkeeping("scheduler: registered", id, None);
    }

    /// `Await(a, b)`: `a` will suspend until `b` completes (spec.md
    /// §4.4). Walks `b`'s existing await chain first; if `a` appears,
    /// recording the edge would close a cycle, so instead an
    /// `ExceptionStop("deadlock")` is posted to `a`'s control inbox and
    /// no edge is recorded.
    pub fn await_dep(&self, a: CoroutineId, b: CoroutineId) {
        let cycles = {
            let deps = self.deps.lock().expect("scheduler mutex poisoned");
            let mut cursor = Some(b);
            let mut seen = HashSet::new();
            let mut cycles = false;
            while let Some(c) = cursor {
                if c == a {
                    cycles = true;
                    break;
                }
                if !seen.insert(c) {
                    break;
                }
                cursor = deps.get(&c).copied().flatten();
            }
            cycles
        };

        if cycles {
            debug!(awaiter = %a, target = %b, "scheduler: deadlock detected on Await");
            self.post(
                a,
                RemoteStop::new(Stop::exception(ExceptionInfo::new(
                    ExceptionKind::Deadlock,
                    format!("await cycle: {a} would wait on {b}, which already (transitively) awaits {a}"),
                ))),
            );
            return;
        }

        self.deps.lock().expect("scheduler mutex poisoned").insert(a, Some(b));
        trace!(awaiter = %a, target = %b, "scheduler: Await recorded");
    }

    /// `Finish(c)`: `c` is done. Removes it as a key; every coroutine
    /// that was awaiting it becomes runnable (spec.md §4.4). Shuts the
    /// idle signal when the graph becomes empty.
    pub fn finish(&self, c: CoroutineId) {
        let became_empty = {
            let mut deps = self.deps.lock().expect("scheduler mutex poisoned");
            deps.remove(&c);
            for target in deps.values_mut() {
                if *target == Some(c) {
                    *target = None;
                }
            }
            deps.is_empty()
        };
        self.inboxes.lock().expect("scheduler mutex poisoned").remove(&c);
        trace!(coroutine = %c, "scheduler: Finish");
        if became_empty {
            debug!("scheduler: dependency graph empty, signalling idle");
            self.idle.notify_waiters();
        }
    }

    /// `Pause(c)`: remove `c` as a key (spec.md §4.4) — it remains a
    /// valid await-target for others until it resumes or finishes.
    pub fn pause(&self, c: CoroutineId) {
        self.deps.lock().expect("scheduler mutex poisoned").remove(&c);
        trace!(coroutine = %c, "scheduler: Pause");
    }

    /// Re-register a paused coroutine as runnable (the `ResumeStop on
    /// control channel -> Running` transition of spec.md §4.5).
    pub fn resume(&self, c: CoroutineId) {
        self.deps.lock().expect("scheduler mutex poisoned").entry(c).or_insert(None);
        trace!(coroutine = %c, "scheduler: resumed");
    }

    /// Post a `RemoteStop` to a coroutine's control inbox. Silently
    /// dropped if the target has already finished and its inbox was
    /// removed — matches the "best effort" cancellation semantics of
    /// spec.md §5.
    pub fn post(&self, target: CoroutineId, stop: RemoteStop) {
        if let Some(sender) = self.inboxes.lock().expect("scheduler mutex poisoned").get(&target) {
            sender.send(stop);
        }
    }

    /// `coroCount` (spec.md §5): the number of currently active
    /// coroutines.
    pub fn coro_count(&self) -> usize {
        self.deps.lock().expect("scheduler mutex poisoned").len()
    }

    /// `awaitingCoros` (spec.md §5): coroutines currently blocked on
    /// another coroutine.
    pub fn awaiting_coros(&self) -> Vec<CoroutineId> {
        self.deps
            .lock()
            .expect("scheduler mutex poisoned")
            .iter()
            .filter_map(|(id, target)| target.map(|_| *id))
            .collect()
    }

    /// `yieldingCoros` (spec.md §5): coroutines registered and runnable
    /// but not currently blocked on anything.
    pub fn yielding_coros(&self) -> Vec<CoroutineId> {
        self.deps
            .lock()
            .expect("scheduler mutex poisoned")
            .iter()
            .filter_map(|(id, target)| target.is_none().then_some(*id))
            .collect()
    }

    /// Resolve once the dependency graph becomes empty (every coroutine
    /// has finished). Used by the embedding host to observe VM-wide
    /// completion (spec.md §4.4).
    pub async fn wait_idle(&self) {
        if self.deps.lock().expect("scheduler mutex poisoned").is_empty() {
            return;
        }
        self.idle.notified().await;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn channel() -> (ControlSender, mpsc::Receiver<RemoteStop>) {
        let (tx, rx) = mpsc::channel();
        (ControlSender::from_raw(tx), rx)
    }

    #[test]
    fn await_with_no_cycle_records_edge() {
        let sched = Scheduler::new();
        let a = CoroutineId::fresh();
        let b = CoroutineId::fresh();
        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        sched.register(a, tx_a);
        sched.register(b, tx_b);

        sched.await_dep(a, b);
        assert_eq!(sched.awaiting_coros(), vec![a]);
    }

    #[test]
    fn await_cycle_posts_deadlock_and_records_no_edge() {
        let sched = Scheduler::new();
        let a = CoroutineId::fresh();
        let b = CoroutineId::fresh();
        let (tx_a, rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        sched.register(a, tx_a);
        sched.register(b, tx_b);

        sched.await_dep(a, b); // a -> b
        sched.await_dep(b, a); // b -> a would close the cycle

        let remote = rx_a.try_recv().expect("deadlock stop should have been posted to a's inbox");
        assert!(matches!(remote.stop, Stop::ExceptionStop(ref info) if info.kind == ExceptionKind::Deadlock));
        // b's await on a must not have been recorded.
        assert!(sched.awaiting_coros().contains(&a));
        assert!(!sched.awaiting_coros().contains(&b));
    }

    #[test]
    fn finish_clears_awaiters_and_frees_coro_count() {
        let sched = Scheduler::new();
        let a = CoroutineId::fresh();
        let b = CoroutineId::fresh();
        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        sched.register(a, tx_a);
        sched.register(b, tx_b);
        sched.await_dep(a, b);

        sched.finish(b);
        assert_eq!(sched.coro_count(), 1);
        assert_eq!(sched.yielding_coros(), vec![a]);
    }

    #[tokio::test]
    async fn wait_idle_resolves_once_graph_is_empty() {
        let sched = std::sync::Arc::new(Scheduler::new());
        let a = CoroutineId::fresh();
        let (tx_a, _rx_a) = channel();
        sched.register(a, tx_a);

        let sched2 = sched.clone();
        let waiter = tokio::spawn(async move { sched2.wait_idle().await });
        tokio::task::yield_now().await;
        sched.finish(a);
        waiter.await.expect("wait_idle task panicked");
    }
}
