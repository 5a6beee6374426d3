//! # wisp-core — the object graph, message tree, and control-flow types
//!
//! This crate defines the data model a wisp-family interpreter evaluates
//! over: a prototype-based [`object::ObjectRef`] graph, the [`message`]
//! tree messages compile to, the operator [`operator_table`] the shuffler
//! consults, the [`stop::Stop`] taxonomy every evaluation step produces,
//! and the [`error`] types that taxonomy carries.
//!
//! ## What lives here, and what doesn't
//!
//! `wisp-core` has no opinion on *how* a message tree gets evaluated or
//! *how* coroutines get scheduled — those are [`object::HostContext`]'s
//! job to abstract over, implemented downstream by `wisp-eval` and
//! `wisp-sched`. Depending only on `thiserror` and `tracing`, this crate
//! is meant to be cheap for any of those to pull in without dragging a
//! scheduler or an async runtime along.
//!
//! ## Design Principle
//!
//! Every type here models a noun from the object-graph/message-tree data
//! model, not a mechanism for evaluating it. [`object::ObjectRef::get_slot`]
//! means "walk the prototype graph for this name" — not "call a Rust
//! trait method" or "look up a `HashMap`". This is what lets `wisp-eval`
//! and `wisp-sched` evolve independently of how the graph itself is
//! represented.

#![deny(missing_docs)]

pub mod error;
pub mod id;
pub mod message;
pub mod object;
pub mod operator_table;
pub mod stop;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use error::{ExceptionInfo, ExceptionKind, ShuffleError, VmError};
pub use id::{CoroutineId, SourceLocation};
pub use message::{ChainIter, Message, MessageRef, RawMessage, Symbol, SymbolKind};
pub use object::{
    BlockPayload, CFn, CFunctionPayload, CallPayload, FutureCell, FutureHandle, FutureSlot,
    HostContext, ObjectRef, Payload, SelfCycleError, Tag,
};
pub use operator_table::{OperatorTable, ASSIGN_PRECEDENCE};
pub use stop::{RemoteStop, Stop};
