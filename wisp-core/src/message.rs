//! The message tree (spec.md §3, §4.2) and the mutable staging
//! representation the operator shuffler works over (§4.3).
//!
//! Two representations exist on purpose:
//!
//! - [`RawMessage`] is what a parser builds and what [`crate::shuffle`]-style
//!   code (living in `wisp-eval`) rewrites in place: flat chains become
//!   nested trees, assignment operators get desugared, memos get cleared.
//!   It owns its children directly (`Vec<RawMessage>` / `Box<RawMessage>`)
//!   so reshuffling is plain tree surgery, no interior mutability required.
//! - [`Message`] is the frozen, `Arc`-shared form the evaluator walks.
//!   `RawMessage::freeze` converts one into the other once shuffling is
//!   done. Per spec.md §3's invariant, a `Message` tree is immutable during
//!   evaluation; sharing it via `Arc` lets multiple coroutines evaluate the
//!   same compiled method body concurrently without cloning it.

use crate::id::SourceLocation;
use crate::object::ObjectRef;
use std::sync::Arc;

/// What kind of token a message's symbol came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A bare name: `foo`, `+`, `setSlot`.
    Identifier,
    /// A numeric literal: `1`, `3.5`.
    Number,
    /// A string literal: `"hello"`.
    String,
    /// A `;` statement terminator.
    Terminator,
}

/// A message's name and what kind of literal (if any) it denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// What kind of token this came from.
    pub kind: SymbolKind,
    /// The textual form, as written in source (or synthesized by the
    /// shuffler's assignment desugaring).
    pub text: String,
}

impl Symbol {
    /// An identifier symbol.
    pub fn ident(text: impl Into<String>) -> Self {
        Self {
            kind: SymbolKind::Identifier,
            text: text.into(),
        }
    }

    /// A number-literal symbol.
    pub fn number(text: impl Into<String>) -> Self {
        Self {
            kind: SymbolKind::Number,
            text: text.into(),
        }
    }

    /// A string-literal symbol.
    pub fn string(text: impl Into<String>) -> Self {
        Self {
            kind: SymbolKind::String,
            text: text.into(),
        }
    }

    /// The `;` terminator symbol.
    pub fn terminator() -> Self {
        Self {
            kind: SymbolKind::Terminator,
            text: ";".to_owned(),
        }
    }
}

/// The frozen, `Arc`-shared message node the evaluator walks.
///
/// Invariant (spec.md §3): after shuffling, an operator message's
/// right-hand argument lives in `args`, never in `next`; an identifier
/// message carries no `memo`.
#[derive(Debug)]
pub struct Message {
    /// This message's symbol.
    pub symbol: Symbol,
    /// Cached literal value for number/string messages. `None` for
    /// identifiers and terminators.
    pub memo: Option<ObjectRef>,
    /// Argument sub-chains, each the head of its own chain.
    pub args: Vec<MessageRef>,
    /// The next message in this chain, or `None` if this is the last.
    pub next: Option<MessageRef>,
    /// Source location for error reporting.
    pub location: SourceLocation,
}

/// Shared handle to a frozen message node.
pub type MessageRef = Arc<Message>;

impl Message {
    /// Whether this message is a `;` statement terminator.
    pub fn is_terminator(&self) -> bool {
        self.symbol.kind == SymbolKind::Terminator
    }

    /// Iterate this message and its `next` chain, in order.
    pub fn chain(self_ref: &MessageRef) -> ChainIter {
        ChainIter {
            current: Some(self_ref.clone()),
        }
    }
}

/// Iterator over a message chain via `next` links.
pub struct ChainIter {
    current: Option<MessageRef>,
}

impl Iterator for ChainIter {
    type Item = MessageRef;

    fn next(&mut self) -> Option<MessageRef> {
        let current = self.current.take()?;
        self.current = current.next.clone();
        Some(current)
    }
}

/// The mutable staging node a parser produces and the shuffler rewrites.
///
/// `next` is boxed (owned) rather than `Arc`-shared because, before
/// shuffling finishes, nothing else may hold a reference into this tree —
/// it is exclusively owned by whoever is building/shuffling it.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// This message's symbol.
    pub symbol: Symbol,
    /// Cached literal value, mirroring [`Message::memo`].
    pub memo: Option<ObjectRef>,
    /// Argument sub-chains.
    pub args: Vec<RawMessage>,
    /// The next message in this chain.
    pub next: Option<Box<RawMessage>>,
    /// Source location.
    pub location: SourceLocation,
}

impl RawMessage {
    /// Build a bare identifier/operator message with no args, no next,
    /// and an unknown location — the common case when hand-building a
    /// chain in tests or in the shuffler's desugaring.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            memo: None,
            args: Vec::new(),
            next: None,
            location: SourceLocation::UNKNOWN,
        }
    }

    /// Builder-style: attach a source location.
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Builder-style: attach an argument list.
    pub fn with_args(mut self, args: Vec<RawMessage>) -> Self {
        self.args = args;
        self
    }

    /// Builder-style: attach the next message in the chain.
    pub fn with_next(mut self, next: RawMessage) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    /// Builder-style: attach a memoized literal value.
    pub fn with_memo(mut self, value: ObjectRef) -> Self {
        self.memo = Some(value);
        self
    }

    /// Append `tail` to the end of this chain (following `next` links).
    pub fn append(&mut self, tail: RawMessage) {
        let mut cursor = self;
        while cursor.next.is_some() {
            cursor = cursor.next.as_mut().unwrap();
        }
        cursor.next = Some(Box::new(tail));
    }

    /// The length of this chain, following `next` links.
    pub fn chain_len(&self) -> usize {
        let mut n = 1;
        let mut cursor = self;
        while let Some(next) = &cursor.next {
            n += 1;
            cursor = next;
        }
        n
    }

    /// Freeze this (sub)tree into the immutable, `Arc`-shared form the
    /// evaluator walks. Recurses into `args` and `next`.
    pub fn freeze(self) -> MessageRef {
        Arc::new(Message {
            symbol: self.symbol,
            memo: self.memo,
            args: self.args.into_iter().map(RawMessage::freeze).collect(),
            next: self.next.map(|n| n.freeze()),
            location: self.location,
        })
    }
}
