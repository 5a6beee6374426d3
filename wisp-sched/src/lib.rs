//! Cooperative coroutine scheduler, futures, and async/future send
//! (spec.md §3, §4.4, §4.5).
//!
//! `wisp-core` and `wisp-eval` know nothing about coroutines: the
//! evaluator is a plain, synchronous `send`/`activate` loop that polls
//! whatever [`wisp_core::object::HostContext`] it is handed. This crate
//! supplies the context that makes that loop actually concurrent —
//! [`coroutine::Coroutine`] backs each logical coroutine with a real OS
//! thread, [`scheduler::Scheduler`] is the VM-wide dependency graph that
//! detects `Await` cycles, and the functions in [`future`] implement
//! `futureSend`/`asyncSend`/`wait` on top of both.
#![deny(missing_docs)]

pub mod coroutine;
pub mod future;
pub mod scheduler;

pub use coroutine::{Coroutine, CoroutineHostContext, CoroutineState, ControlSender, WellKnownLookup};
pub use future::{
    async_send_cfn, future_send_cfn, future_wait_cfn, future_wait_cfunction_payload, spawn_future,
};
pub use scheduler::Scheduler;
