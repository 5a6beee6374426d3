//! Typed handle wrappers for coroutines and source locations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing handle allocator shared by every VM-scoped
/// identifier below. Handles are process-wide unique, never reused.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Typed numeric handles prevent mixing up a coroutine handle with a
/// plain counter. These are just `u64`s underneath — allocation order is
/// the only thing that matters, there's no format requirement.
macro_rules! typed_handle {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Allocate a fresh, never-before-issued handle.
            pub fn fresh() -> Self {
                Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
            }

            /// The raw numeric value, for logging and diagnostics.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

typed_handle!(CoroutineId, "Handle identifying one coroutine for the lifetime of a VM.");

/// Where in source a message came from, for error reporting.
///
/// Produced by the (out-of-scope) parser and carried unchanged through
/// shuffling and evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// File name as reported by the parser; `None` for synthetic messages
    /// built by `test_utils` or by the shuffler's desugaring.
    pub file: Option<String>,
    /// 1-based line number; `0` means unknown.
    pub line: u32,
}

impl SourceLocation {
    /// An unknown source location, used for synthetic/desugared messages.
    pub const UNKNOWN: SourceLocation = SourceLocation {
        file: None,
        line: 0,
    };

    /// A known location.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}", self.line),
            None => write!(f, "<unknown>"),
        }
    }
}
