//! The parser boundary (spec.md §6, SPEC_FULL.md §3).
//!
//! The lexer and recursive-descent parser are explicitly out of scope
//! (spec.md §1): this crate never tokenizes source text. What it does
//! own is the seam `do_string`/`do_reader` call through — a `Parser`
//! turns text into a flat, unshuffled [`RawMessage`] chain; [`crate::Vm`]
//! shuffles it and evaluates it against `Lobby`. Test suites skip this
//! trait entirely and build message chains directly with
//! `wisp_core::test_utils`.

use wisp_core::error::VmError;
use wisp_core::message::RawMessage;

/// External collaborator that turns source text into a raw message
/// chain (spec.md §6: "produces a root `Message` and calls the shuffler
/// on it" — the shuffler call itself is [`crate::Vm::do_string`]'s job,
/// not the parser's).
pub trait Parser: Send + Sync {
    /// Parse `source` into a flat, unshuffled message chain. Parse
    /// failures (unbalanced tokens, malformed literals, and the like)
    /// are reported as `VmError::Parse`; operator-shuffle errors are a
    /// separate concern raised later, by `Vm::do_string` itself.
    fn parse(&self, source: &str) -> Result<RawMessage, VmError>;
}
