//! VM construction knobs (SPEC_FULL.md §3).
//!
//! Every field is optional and defaults to an implementation-chosen
//! value, mirroring the teacher's `TurnConfig` convention: a plain,
//! `Default`-derived struct of `Option<T>`s rather than a fluent builder.

use wisp_core::operator_table::OperatorTable;

/// Construction-time overrides for a [`crate::Vm`].
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// Replace the default operator table (spec.md §6) with a custom one.
    /// `None` uses [`OperatorTable::default_table`].
    pub operator_table: Option<OperatorTable>,

    /// Bounded capacity hint for coroutine control inboxes. `None` uses
    /// the implementation default (unbounded `mpsc`, matching
    /// `wisp-sched::coroutine`'s current channel choice).
    pub inbox_capacity: Option<usize>,

    /// Whether the scheduler logs dependency-graph transitions at
    /// `debug` (the default) or `trace`. Sourced from spec.md §5's
    /// instrumentation of `Await`/`Pause`/`Finish`.
    pub scheduler_verbose_logging: Option<bool>,
}
