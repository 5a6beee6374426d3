//! Facade-level scenarios (spec.md §8's testable properties), driven
//! through [`wisp::Vm::do_string`] with hand-built, unshuffled message
//! chains standing in for a real parser's output (lexing is out of
//! scope; see `wisp::Parser`'s doc comment).

use std::sync::Mutex;

use wisp::prelude::*;
use wisp_core::error::VmError;
use wisp_core::id::SourceLocation;
use wisp_core::message::{RawMessage, Symbol};
use wisp_core::object::Payload;

/// Ignores the source text entirely and replays a pre-built chain —
/// exactly what `wisp::Parser`'s doc comment anticipates test suites
/// doing instead of writing a lexer.
struct FixedParser(Mutex<RawMessage>);

impl FixedParser {
    fn new(raw: RawMessage) -> Self {
        Self(Mutex::new(raw))
    }
}

impl Parser for FixedParser {
    fn parse(&self, _source: &str) -> Result<RawMessage, VmError> {
        Ok(self.0.lock().expect("parser mutex poisoned").clone())
    }
}

fn ident(text: &str) -> RawMessage {
    RawMessage::new(Symbol::ident(text))
}

fn number(value: f64) -> RawMessage {
    RawMessage::new(Symbol::number(value.to_string())).with_memo(wisp_core::object::ObjectRef::new(Payload::Number(value)))
}

fn terminator() -> RawMessage {
    RawMessage::new(Symbol::terminator())
}

/// Chain a flat run of tokens together via `next` links, as a parser's
/// output looks before the shuffler nests anything.
fn flat(tokens: Vec<RawMessage>) -> RawMessage {
    let mut iter = tokens.into_iter();
    let mut head = iter.next().expect("at least one token");
    for tok in iter {
        head.append(tok);
    }
    head
}

#[test]
fn bootstrap_wires_lobby_core_protos_addons() {
    let vm = wisp::create_vm();
    assert!(vm.lobby().own_slot("Lobby").is_some());
    assert!(vm.lobby().own_slot("Core").is_some());
    assert!(vm.lobby().own_slot("Protos").is_some());
    assert!(vm.lobby().own_slot("Addons").is_some());
    assert!(vm.core().own_slot("Object").is_some());
    assert!(vm.core().own_slot("Number").is_some());
    assert!(vm.core().own_slot("true").is_some());
    assert!(vm.core().own_slot("false").is_some());
    assert!(vm.core().own_slot("nil").is_some());
}

#[test]
fn assignment_then_arithmetic_matches_spec_example() {
    // x := 1; y := 2; x + y
    let chain = flat(vec![
        ident("x"),
        ident(":=").with_args(vec![number(1.0)]),
        terminator(),
        ident("y"),
        ident(":=").with_args(vec![number(2.0)]),
        terminator(),
        ident("x"),
        ident("+").with_args(vec![ident("y")]),
    ]);

    let vm = wisp::create_vm();
    let parser = FixedParser::new(chain);
    let result = vm.do_string(&parser, "x := 1; y := 2; x + y").expect("evaluates");
    match result.payload() {
        Payload::Number(n) => assert_eq!(n, 3.0),
        other => panic!("expected Number, found {other:?}"),
    }
}

#[test]
fn method_confines_return_to_its_own_activation() {
    // `method(return 42)`, sent directly: the real `method` CFunction
    // builds the `BlockPayload` with `scope: None`, which is exactly
    // what distinguishes a `method` from a lexical `block`
    // (`BlockPayload::is_method`).
    let vm = wisp::create_vm();
    let obj = vm.lobby().own_slot("Core").unwrap().clone_object();
    let method_call = ident("method").with_args(vec![
        flat(vec![ident("return").with_args(vec![number(42.0)])]),
    ]);
    let set_f = flat(vec![ident("setSlot").with_args(vec![string_lit("f"), method_call])]).freeze();
    let ctx = wisp_core::test_utils::TestHost::default();
    let (_, stop) = wisp_eval::send(&ctx, &obj, &obj, &obj, &set_f);
    assert!(matches!(stop, wisp_core::stop::Stop::NoStop));

    let chain = flat(vec![ident("f")]).freeze();
    let (result, stop) = wisp_eval::send(&ctx, &obj, &obj, &obj, &chain);
    assert!(matches!(stop, wisp_core::stop::Stop::NoStop));
    match result.payload() {
        Payload::Number(n) => assert_eq!(n, 42.0),
        other => panic!("expected Number, found {other:?}"),
    }
}

#[test]
fn do_installs_a_method_built_with_the_method_constructor() {
    // Obj := Object clone do(f := method(return 42)); Obj f -> 42
    let method_call = ident("method").with_args(vec![
        flat(vec![ident("return").with_args(vec![number(42.0)])]),
    ]);
    let set_f = flat(vec![ident("setSlot").with_args(vec![string_lit("f"), method_call])]);
    let do_call = ident("do").with_args(vec![set_f]);
    let clone_chain = flat(vec![ident("Object"), ident("clone"), do_call]);
    let chain = flat(vec![
        ident("setSlot").with_args(vec![string_lit("Obj"), clone_chain]),
        terminator(),
        flat(vec![ident("Obj"), ident("f")]),
    ]);

    let vm = wisp::create_vm();
    let parser = FixedParser::new(chain);
    let result = vm.do_string(&parser, "Obj := Object clone do(f := method(return 42)); Obj f").expect("evaluates");
    match result.payload() {
        Payload::Number(n) => assert_eq!(n, 42.0),
        other => panic!("expected Number, found {other:?}"),
    }
}

#[test]
fn block_literal_captures_the_defining_scope_unlike_method() {
    // block(x) built on a fresh object has `scope: Some(that object)`,
    // distinguishing it from `method`'s `scope: None`.
    let vm = wisp::create_vm();
    let obj = vm.lobby().own_slot("Core").unwrap().clone_object();
    let block_call = ident("block").with_args(vec![flat(vec![ident("x")])]);
    let chain = flat(vec![block_call]).freeze();
    let ctx = wisp_core::test_utils::TestHost::default();
    let (result, stop) = wisp_eval::send(&ctx, &obj, &obj, &obj, &chain);
    assert!(matches!(stop, wisp_core::stop::Stop::NoStop));
    match result.payload() {
        Payload::Block(b) => {
            assert!(!b.is_method());
            assert!(b.scope.as_ref().expect("block captures scope").ptr_eq(&obj));
        }
        other => panic!("expected Block, found {other:?}"),
    }
}

#[test]
fn call_record_exposes_sender_and_target_to_user_code() {
    // f := method(call sender) installed on a clone of Object; Obj f
    // must return the object `f` was sent from (here, `Obj` itself).
    let vm = wisp::create_vm();
    let obj = vm.lobby().own_slot("Core").unwrap().clone_object();
    let method_call = ident("method").with_args(vec![flat(vec![ident("call"), ident("sender")])]);
    let set_f = flat(vec![ident("setSlot").with_args(vec![string_lit("f"), method_call])]).freeze();
    let ctx = wisp_core::test_utils::TestHost::default();
    let (_, stop) = wisp_eval::send(&ctx, &obj, &obj, &obj, &set_f);
    assert!(matches!(stop, wisp_core::stop::Stop::NoStop));

    let chain = flat(vec![ident("f")]).freeze();
    let (result, stop) = wisp_eval::send(&ctx, &obj, &obj, &obj, &chain);
    assert!(matches!(stop, wisp_core::stop::Stop::NoStop));
    assert!(result.ptr_eq(&obj));
}

#[test]
fn missing_slot_raises_before_reaching_arithmetic() {
    let chain = flat(vec![ident("thisSlotDoesNotExist")]);
    let vm = wisp::create_vm();
    let parser = FixedParser::new(chain);
    let err = vm.do_string(&parser, "thisSlotDoesNotExist").unwrap_err();
    match err {
        VmError::Uncaught(info) => assert_eq!(info.kind, wisp_core::error::ExceptionKind::SlotMissing),
        other => panic!("expected Uncaught(SlotMissing), found {other:?}"),
    }
}

#[test]
fn update_slot_fails_when_the_slot_was_never_defined() {
    let chain = flat(vec![
        ident("updateSlot").with_args(vec![
            RawMessage::new(Symbol::string("neverDefined"))
                .with_memo(wisp_core::object::ObjectRef::new(Payload::Sequence(b"neverDefined".to_vec()))),
            number(1.0),
        ]),
    ]);
    let vm = wisp::create_vm();
    let parser = FixedParser::new(chain);
    let err = vm.do_string(&parser, "updateSlot(\"neverDefined\", 1)").unwrap_err();
    match err {
        VmError::Uncaught(info) => assert_eq!(info.kind, wisp_core::error::ExceptionKind::SlotMissing),
        other => panic!("expected Uncaught(SlotMissing), found {other:?}"),
    }
}

fn string_lit(text: &str) -> RawMessage {
    RawMessage::new(Symbol::string(text)).with_memo(wisp_core::object::ObjectRef::new(Payload::Sequence(
        text.as_bytes().to_vec(),
    )))
}

#[test]
fn while_loop_accumulates_and_break_stops_it_early() {
    // `while`/`if`'s own argument sub-chains are a parser's pre-bundled
    // arg lists (spec.md §4.3's shuffler only reshapes *operator* runs,
    // never a plain call's own `args`), so this builds them directly in
    // already-final form — `setSlot`, not `:=` — and evaluates with
    // `wisp_eval::send` rather than `Vm::do_string`, sidestepping the
    // shuffler entirely.
    let body = flat(vec![
        ident("setSlot").with_args(vec![
            string_lit("i"),
            flat(vec![ident("i"), ident("+").with_args(vec![number(1.0)])]),
        ]),
        terminator(),
        ident("if").with_args(vec![
            flat(vec![ident("i"), ident("==").with_args(vec![number(3.0)])]),
            flat(vec![ident("break")]),
        ]),
    ]);
    let chain = flat(vec![
        ident("setSlot").with_args(vec![string_lit("i"), number(0.0)]),
        terminator(),
        ident("while").with_args(vec![flat(vec![ident("i"), ident("<").with_args(vec![number(5.0)])]), body]),
        terminator(),
        ident("i"),
    ])
    .freeze();

    let vm = wisp::create_vm();
    let obj = vm
        .factories()
        .new_object_with(Vec::<(String, wisp_core::object::ObjectRef)>::new());
    let ctx = wisp_core::test_utils::TestHost::default();
    let (result, stop) = wisp_eval::send(&ctx, &obj, &obj, &obj, &chain);
    assert!(matches!(stop, wisp_core::stop::Stop::NoStop), "unexpected stop: {stop:?}");
    match result.payload() {
        Payload::Number(n) => assert_eq!(n, 3.0),
        other => panic!("expected Number, found {other:?}"),
    }
}

#[test]
fn bare_location_preserving_parse_error_short_circuits_do_string() {
    struct FailingParser;
    impl Parser for FailingParser {
        fn parse(&self, _source: &str) -> Result<RawMessage, VmError> {
            Err(VmError::Parse("unexpected end of input".to_owned()))
        }
    }

    let vm = wisp::create_vm();
    let err = vm.do_string(&FailingParser, "(").unwrap_err();
    assert!(matches!(err, VmError::Parse(_)));
    let _ = SourceLocation::UNKNOWN;
}
