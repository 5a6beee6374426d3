//! # wisp-eval — the send/activate evaluator and operator shuffler
//!
//! This crate implements the two pieces of the interpreter core that
//! actually run code: [`eval::send`]/[`eval::activate`] (spec.md §4.1,
//! §4.2) and [`shuffle::shuffle`] (spec.md §4.3). Both operate purely in
//! terms of `wisp-core` types; neither knows anything about coroutines,
//! schedulers, or async runtimes. `wisp-sched` builds on top of this
//! crate the same way the evaluator here builds on `wisp-core`.

#![deny(missing_docs)]

pub mod eval;
pub mod shuffle;

pub use eval::{activate, send};
pub use shuffle::shuffle;
