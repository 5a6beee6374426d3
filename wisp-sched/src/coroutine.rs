//! Coroutine lifecycle and the scheduler-aware [`HostContext`] the
//! evaluator runs against (spec.md §3, §4.4, §4.5).

use std::any::Any;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use tracing::trace;
use wisp_core::id::CoroutineId;
use wisp_core::object::{HostContext, ObjectRef};
use wisp_core::stop::RemoteStop;

use crate::scheduler::Scheduler;

/// The five coroutine states of spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    /// Allocated, not yet handed to the scheduler.
    Created,
    /// Actively evaluating.
    Running,
    /// Blocked on another coroutine via `Await`.
    Awaiting,
    /// Parked by an explicit `Pause`.
    Paused,
    /// Body evaluation returned; unregistered from the scheduler.
    Finished,
}

/// A cheaply cloned handle to a coroutine's control inbox. The scheduler
/// holds one to post deadlock exceptions; callers implementing
/// cancellation or `resume` hold their own (spec.md §4.4).
#[derive(Clone)]
pub struct ControlSender(Sender<RemoteStop>);

impl ControlSender {
    fn new(sender: Sender<RemoteStop>) -> Self {
        Self(sender)
    }

    /// Build directly from a raw `std::sync::mpsc::Sender`, for tests
    /// that construct a control channel without a full [`Coroutine`].
    #[cfg(test)]
    pub fn from_raw(sender: Sender<RemoteStop>) -> Self {
        Self(sender)
    }

    /// Post a stop to this inbox. Best-effort: if the receiving
    /// coroutine has already dropped its end (finished and been
    /// reclaimed), the send is silently discarded.
    pub fn send(&self, stop: RemoteStop) {
        let _ = self.0.send(stop);
    }
}

impl fmt::Debug for ControlSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSender").finish_non_exhaustive()
    }
}

/// A lookup for a VM's well-known objects (`Lobby`, `Core`, `Protos`,
/// `Addons`), shared by every coroutine in that VM.
pub type WellKnownLookup = Arc<dyn Fn(&str) -> Option<ObjectRef> + Send + Sync>;

/// A run-state wrapping the evaluator's stack with its own control
/// channel (spec.md §3): the coroutine's identity, its parent (if any),
/// the scheduler it is registered with, and its lifecycle state.
pub struct Coroutine {
    id: CoroutineId,
    parent: Option<CoroutineId>,
    scheduler: Arc<Scheduler>,
    inbox: Mutex<Receiver<RemoteStop>>,
    state: Mutex<CoroutineState>,
    well_known: WellKnownLookup,
}

impl Coroutine {
    /// Allocate a fresh coroutine and register it with `scheduler` as
    /// runnable (spec.md §4.5: `Created -> Running`).
    pub fn spawn(parent: Option<CoroutineId>, scheduler: Arc<Scheduler>, well_known: WellKnownLookup) -> Arc<Coroutine> {
        let id = CoroutineId::fresh();
        let (tx, rx) = mpsc::channel();
        scheduler.register(id, ControlSender::new(tx));
        trace!(coroutine = %id, ?parent, "coroutine created");
        Arc::new(Coroutine {
            id,
            parent,
            scheduler,
            inbox: Mutex::new(rx),
            state: Mutex::new(CoroutineState::Created),
            well_known,
        })
    }

    /// This coroutine's handle.
    pub fn id(&self) -> CoroutineId {
        self.id
    }

    /// The coroutine that spawned this one, if any.
    pub fn parent(&self) -> Option<CoroutineId> {
        self.parent
    }

    /// The scheduler this coroutine is registered with.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// This coroutine's current lifecycle state.
    pub fn state(&self) -> CoroutineState {
        *self.state.lock().expect("coroutine mutex poisoned")
    }

    /// Transition to a new lifecycle state (spec.md §4.5's table).
    pub fn set_state(&self, state: CoroutineState) {
        *self.state.lock().expect("coroutine mutex poisoned") = state;
        trace!(coroutine = %self.id, ?state, "coroutine state transition");
    }

    /// `Pause(self)`: park this coroutine (spec.md §4.4). Does not block
    /// by itself — the caller's evaluation loop observes a `PauseStop`
    /// and stops advancing; resuming is a `ResumeStop` posted to this
    /// coroutine's inbox plus [`Scheduler::resume`].
    pub fn pause(&self) {
        self.set_state(CoroutineState::Paused);
        self.scheduler.pause(self.id);
    }

    /// `ResumeStop` received: mark runnable again.
    pub fn resume(&self) {
        self.set_state(CoroutineState::Running);
        self.scheduler.resume(self.id);
    }

    /// Body evaluation returned: unregister from the scheduler (spec.md
    /// §4.5: `any -> Finished`).
    pub fn finish(&self) {
        self.set_state(CoroutineState::Finished);
        self.scheduler.finish(self.id);
    }
}

/// A [`HostContext`] backed by a real [`Coroutine`] and its scheduler.
/// This is what the evaluator (`wisp-eval::send`/`activate`) actually
/// runs against once a real scheduler is in the picture, as opposed to
/// `wisp-core::test_utils::TestHost`'s single-coroutine stand-in.
pub struct CoroutineHostContext {
    coroutine: Arc<Coroutine>,
}

impl CoroutineHostContext {
    /// Wrap a coroutine as a `HostContext`.
    pub fn new(coroutine: Arc<Coroutine>) -> Self {
        Self { coroutine }
    }

    /// The coroutine this context is evaluating on behalf of.
    pub fn coroutine(&self) -> &Arc<Coroutine> {
        &self.coroutine
    }
}

impl HostContext for CoroutineHostContext {
    fn current_coroutine(&self) -> Option<CoroutineId> {
        Some(self.coroutine.id)
    }

    fn poll_inbox(&self) -> Option<RemoteStop> {
        self.coroutine
            .inbox
            .lock()
            .expect("coroutine mutex poisoned")
            .try_recv()
            .ok()
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn well_known(&self, name: &str) -> Option<ObjectRef> {
        (self.coroutine.well_known)(name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_core::stop::Stop;

    fn no_well_known() -> WellKnownLookup {
        Arc::new(|_: &str| None)
    }

    #[test]
    fn spawn_registers_with_scheduler_as_runnable() {
        let scheduler = Arc::new(Scheduler::new());
        let coro = Coroutine::spawn(None, scheduler.clone(), no_well_known());
        assert_eq!(scheduler.coro_count(), 1);
        assert_eq!(scheduler.yielding_coros(), vec![coro.id()]);
    }

    #[test]
    fn finish_unregisters_from_scheduler() {
        let scheduler = Arc::new(Scheduler::new());
        let coro = Coroutine::spawn(None, scheduler.clone(), no_well_known());
        coro.finish();
        assert_eq!(scheduler.coro_count(), 0);
        assert_eq!(coro.state(), CoroutineState::Finished);
    }

    #[test]
    fn host_context_poll_inbox_drains_posted_stops() {
        let scheduler = Arc::new(Scheduler::new());
        let coro = Coroutine::spawn(None, scheduler.clone(), no_well_known());
        let ctx = CoroutineHostContext::new(coro.clone());
        assert!(ctx.poll_inbox().is_none());

        scheduler.post(coro.id(), RemoteStop::new(Stop::ResumeStop));
        let remote = ctx.poll_inbox().expect("posted stop should be observed");
        assert!(matches!(remote.stop, Stop::ResumeStop));
    }
}
