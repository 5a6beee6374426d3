//! The error taxonomy of spec.md §7, expressed as Rust types.
//!
//! `ExceptionKind` + `ExceptionInfo` is the payload every `Stop::Exception`
//! carries (see [`crate::stop::Stop`]); it is also what a future stores into
//! a coroutine's `exception` slot and what the top-level handler at a
//! coroutine root reports back through the embedding API. `ShuffleError` is
//! raised by the operator shuffler at parse time, never during evaluation,
//! and converts into an `ExceptionInfo` of kind `Shuffle` at the boundary.

use crate::id::SourceLocation;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The eight exception kinds of spec.md §7.
///
/// `Custom` covers user-raised exceptions (`Exception raise` and friends) —
/// the core doesn't need to know every kind user code might invent.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Slot lookup failed and no `forward` slot exists.
    SlotMissing,
    /// A CFunction or method received an argument of the wrong payload tag.
    TypeMismatch,
    /// Wrong number of arguments supplied to an activation.
    Arity,
    /// Operator-precedence reshuffling failed.
    Shuffle,
    /// The scheduler detected an `Await` dependency cycle.
    Deadlock,
    /// An indexed operation exceeded a container's length.
    IndexOutOfBounds,
    /// Attempted mutation of an object flagged immutable.
    MutationOfImmutable,
    /// Invariant breakage at a host/user boundary (non-fatal variety —
    /// e.g. `break`/`continue` outside a loop). Compare the fatal
    /// conditions noted at the bottom of this module, which panic instead
    /// of producing an `ExceptionInfo`.
    ConventionViolation,
    /// A user-defined exception kind, named by the raising code.
    Custom(String),
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::SlotMissing => write!(f, "slot-missing"),
            ExceptionKind::TypeMismatch => write!(f, "type-mismatch"),
            ExceptionKind::Arity => write!(f, "arity"),
            ExceptionKind::Shuffle => write!(f, "shuffle"),
            ExceptionKind::Deadlock => write!(f, "deadlock"),
            ExceptionKind::IndexOutOfBounds => write!(f, "index-out-of-bounds"),
            ExceptionKind::MutationOfImmutable => write!(f, "mutation-of-immutable"),
            ExceptionKind::ConventionViolation => write!(f, "convention-violation"),
            ExceptionKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// The exception object carried by `Stop::Exception`.
///
/// `cause` lets a secondary exception (e.g. one raised inside
/// `handleActorException`, see spec.md §4.4) reference the exception that
/// triggered it without losing either.
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    /// What kind of exception this is.
    pub kind: ExceptionKind,
    /// Free-form description.
    pub message: String,
    /// Where the exception was raised, if known.
    pub location: Option<SourceLocation>,
    /// The exception this one was raised while handling, if any.
    pub cause: Option<Arc<ExceptionInfo>>,
}

impl ExceptionInfo {
    /// Build a new exception with no location and no cause.
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            cause: None,
        }
    }

    /// Attach a source location.
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach the exception this one superseded.
    pub fn caused_by(mut self, cause: ExceptionInfo) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Shorthand for the common `slot-missing` case.
    pub fn slot_missing(name: &str) -> Self {
        Self::new(ExceptionKind::SlotMissing, format!("slot missing: {name}"))
    }

    /// Shorthand for the common `type-mismatch` case.
    pub fn type_mismatch(expected: &str, found: &str) -> Self {
        Self::new(
            ExceptionKind::TypeMismatch,
            format!("expected {expected}, found {found}"),
        )
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {} ({loc})", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ExceptionInfo {}

/// Shuffle errors, per spec.md §4.3. Always raised at shuffle time, never
/// during evaluation — the shuffler runs to completion or fails outright,
/// it never leaves a half-shuffled tree for the evaluator to trip over.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum ShuffleError {
    /// An assign operator (`:=`, `=`, `::=`, or a user-added entry) had no
    /// left-hand side.
    #[error("assign operator with no left-hand side")]
    MissingLhs,

    /// An assign operator was the last message in its chain.
    #[error("assign operator `{0}` has no right-hand side")]
    MissingRhs(String),

    /// An assign operator's pre-bundled argument list had more than one
    /// element.
    #[error("assign operator `{0}` has more than one pre-bundled argument")]
    TooManyArgs(String),

    /// An operator symbol appeared in the flat chain that isn't in the
    /// operator table.
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    /// The left-hand side of an assignment was a call expression
    /// (had arguments of its own).
    #[error("cannot assign to a call expression: `{0}`")]
    AssignToCall(String),
}

impl ShuffleError {
    /// Wrap as the `ExceptionInfo` the rest of the core deals in.
    pub fn into_exception(self, location: SourceLocation) -> ExceptionInfo {
        ExceptionInfo::new(ExceptionKind::Shuffle, self.to_string()).at(location)
    }
}

/// Top-level error surfaced by the embedding API (`do_string`/`do_reader`)
/// for failures that occur outside message evaluation proper: a parser
/// failure, an uncaught exception reaching the coroutine root, or a host
/// integration error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VmError {
    /// The injected `Parser` failed to produce a message tree.
    #[error("parse error: {0}")]
    Parse(String),

    /// Shuffling the parsed tree failed.
    #[error(transparent)]
    Shuffle(#[from] ShuffleError),

    /// An exception reached the coroutine root without being caught.
    #[error("uncaught exception: {0}")]
    Uncaught(ExceptionInfo),

    /// A top-level chain produced a control stop that makes no sense
    /// outside a loop/method/coroutine boundary (e.g. a bare `break`),
    /// reaching the coroutine root unconsumed.
    #[error("unexpected top-level control stop: {0}")]
    UnexpectedStop(String),

    /// Catch-all for host integration failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

// Fatal conditions (spec.md §7) are `panic!`s in this implementation, not
// `Result`s or `Stop::Exception`s, because they indicate the VM's
// invariants have already been violated and no user code could sensibly
// continue running. A panic carries no recovery path to type-check
// against, so there's no corresponding type here — just the call sites:
//
// - A payload-tag mismatch a `CFunction` author asserted couldn't happen
//   after checking `expected_target_tag` against `target.tag()`.
// - A second writer attempting to fill an already-resolved `Future`.
// - The scheduler receiving an event for a coroutine handle it has no
//   record of.
