//! A minimal [`HostContext`] for unit tests that need one but don't need
//! a real scheduler.

use crate::id::CoroutineId;
use crate::object::{HostContext, ObjectRef};
use crate::stop::RemoteStop;
use std::any::Any;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Single-coroutine, non-scheduling [`HostContext`]: `yield_now` is a
/// no-op, `poll_inbox` drains a plain queue tests can push onto directly,
/// and `well_known` looks up a flat table tests populate by hand.
pub struct TestHost {
    coroutine: Option<CoroutineId>,
    well_known: Mutex<HashMap<String, ObjectRef>>,
    inbox: Mutex<VecDeque<RemoteStop>>,
}

impl TestHost {
    /// A host with no current coroutine and no well-known objects.
    pub fn new() -> Self {
        Self {
            coroutine: None,
            well_known: Mutex::new(HashMap::new()),
            inbox: Mutex::new(VecDeque::new()),
        }
    }

    /// A host that reports `coroutine` as current.
    pub fn with_coroutine(coroutine: CoroutineId) -> Self {
        Self {
            coroutine: Some(coroutine),
            ..Self::new()
        }
    }

    /// Register a well-known object under `name`.
    pub fn set_well_known(&self, name: impl Into<String>, value: ObjectRef) {
        self.well_known
            .lock()
            .expect("test host mutex poisoned")
            .insert(name.into(), value);
    }

    /// Push a `RemoteStop` onto this host's inbox for the next
    /// `poll_inbox` to return.
    pub fn push_inbox(&self, stop: RemoteStop) {
        self.inbox.lock().expect("test host mutex poisoned").push_back(stop);
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostContext for TestHost {
    fn current_coroutine(&self) -> Option<CoroutineId> {
        self.coroutine
    }

    fn poll_inbox(&self) -> Option<RemoteStop> {
        self.inbox.lock().expect("test host mutex poisoned").pop_front()
    }

    fn yield_now(&self) {}

    fn well_known(&self, name: &str) -> Option<ObjectRef> {
        self.well_known.lock().expect("test host mutex poisoned").get(name).cloned()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
