//! Hand-built message chains, standing in for a real parser's output.

use crate::id::SourceLocation;
use crate::message::{MessageRef, RawMessage, Symbol};
use crate::object::{ObjectRef, Payload};

/// Start a chain with an identifier message.
pub fn ident(name: impl Into<String>) -> MessageBuilder {
    MessageBuilder::new(RawMessage::new(Symbol::ident(name)))
}

/// Start a chain with a memoized number literal.
pub fn number(value: f64) -> MessageBuilder {
    MessageBuilder::new(
        RawMessage::new(Symbol::number(value.to_string()))
            .with_memo(ObjectRef::new(Payload::Number(value))),
    )
}

/// Start a chain with a memoized string literal.
pub fn string(value: impl Into<String>) -> MessageBuilder {
    let value = value.into();
    MessageBuilder::new(
        RawMessage::new(Symbol::string(value.clone())).with_memo(ObjectRef::new(Payload::Sequence(
            value.into_bytes(),
        ))),
    )
}

/// Fluent wrapper over [`RawMessage`] for building test fixtures without
/// hand-nesting builder calls.
pub struct MessageBuilder {
    raw: RawMessage,
}

impl MessageBuilder {
    fn new(raw: RawMessage) -> Self {
        Self { raw }
    }

    /// Attach argument sub-chains to the message this builder holds.
    pub fn args(mut self, args: Vec<MessageBuilder>) -> Self {
        self.raw.args = args.into_iter().map(|b| b.raw).collect();
        self
    }

    /// Append another identifier message to this chain.
    pub fn then(mut self, name: impl Into<String>) -> Self {
        self.raw.append(RawMessage::new(Symbol::ident(name)));
        self
    }

    /// Append a `;` terminator to this chain.
    pub fn terminate(mut self) -> Self {
        self.raw.append(RawMessage::new(Symbol::terminator()));
        self
    }

    /// Attach a synthetic source location.
    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.raw.location = SourceLocation::new(file, line);
        self
    }

    /// Freeze this chain into the immutable form the evaluator walks.
    pub fn build(self) -> MessageRef {
        self.raw.freeze()
    }
}
