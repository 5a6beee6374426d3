use std::sync::Arc;
use wisp_core::id::SourceLocation;
use wisp_core::message::{Message, MessageRef, RawMessage, Symbol};
use wisp_core::object::{
    BlockPayload, CFunctionPayload, CallPayload, FutureCell, FutureSlot, HostContext, ObjectRef,
    Payload, Tag,
};
use wisp_core::operator_table::OperatorTable;
use wisp_core::stop::{RemoteStop, Stop};
use wisp_core::test_utils::TestHost;
use wisp_eval::{activate, send, shuffle};

fn number_proto_with_plus() -> ObjectRef {
    let proto = ObjectRef::new(Payload::Plain);
    let plus = ObjectRef::new(Payload::CFunction(CFunctionPayload {
        expected_target_tag: None,
        func: Arc::new(|ctx, target, locals, msg| {
            let lhs = match target.payload() {
                Payload::Number(n) => n,
                _ => unreachable!("test proto only installed on numbers"),
            };
            let sender = locals.own_slot("self").unwrap_or_else(|| target.clone());
            let (rhs_obj, stop) = send(ctx, &sender, &sender, locals, &msg.args[0]);
            if stop.short_circuits() {
                return (rhs_obj, stop);
            }
            let rhs = match rhs_obj.payload() {
                Payload::Number(n) => n,
                _ => unreachable!("test only sends numbers"),
            };
            (ObjectRef::new(Payload::Number(lhs + rhs)), Stop::NoStop)
        }),
    }));
    proto.set_slot("+", plus);
    proto
}

fn raw_ident(name: &str) -> RawMessage {
    RawMessage::new(Symbol::ident(name))
}

fn build(table: &OperatorTable, raw: RawMessage) -> MessageRef {
    shuffle(raw, table).expect("shuffle should succeed").freeze()
}

// --- Arithmetic via operator shuffling + CFunction dispatch ---

#[test]
fn x_plus_y_evaluates_through_shuffle_and_send() {
    let table = OperatorTable::default_table();
    let number_proto = number_proto_with_plus();
    let lobby = ObjectRef::new(Payload::Plain);

    let x = ObjectRef::with_protos(Payload::Number(1.0), vec![number_proto.clone()]);
    let y = ObjectRef::with_protos(Payload::Number(2.0), vec![number_proto]);
    lobby.set_slot("x", x);
    lobby.set_slot("y", y);

    let chain = build(&table, raw_ident("x").with_next(
        RawMessage::new(Symbol {
            kind: wisp_core::message::SymbolKind::Identifier,
            text: "+".to_owned(),
        })
        .with_next(raw_ident("y")),
    ));

    let host = TestHost::new();
    let (result, stop) = send(&host, &lobby, &lobby, &lobby, &chain);
    assert!(matches!(stop, Stop::NoStop));
    match result.payload() {
        Payload::Number(n) => assert_eq!(n, 3.0),
        _ => panic!("expected number"),
    }
}

// --- Methods: return confinement ---

fn make_method(body: MessageRef) -> ObjectRef {
    ObjectRef::new(Payload::Block(BlockPayload {
        body,
        params: Vec::new(),
        scope: None,
        activatable: true,
    }))
}

#[test]
fn return_inside_a_method_becomes_its_plain_result() {
    // method(return 42) called directly: the method body is just `return`
    // activated with an argument message that evaluates to 42; here we
    // model `return` as a host CFunction that turns its argument into a
    // ReturnStop, and confirm activate_block unpacks it back to NoStop.
    let forty_two = RawMessage::new(Symbol::number("42")).with_memo(ObjectRef::new(Payload::Number(42.0)));
    let return_fn = ObjectRef::new(Payload::CFunction(CFunctionPayload {
        expected_target_tag: None,
        func: Arc::new(|ctx, target, locals, msg| {
            let (value, stop) = send(ctx, target, target, locals, &msg.args[0]);
            if stop.short_circuits() {
                return (value, stop);
            }
            (value, Stop::ReturnStop)
        }),
    }));

    let lobby = ObjectRef::new(Payload::Plain);
    lobby.set_slot("return", return_fn);

    let body = RawMessage::new(Symbol::ident("return"))
        .with_args(vec![forty_two])
        .freeze();
    let method = make_method(body);
    lobby.set_slot("f", method.clone());

    let host = TestHost::new();
    let msg = RawMessage::new(Symbol::ident("f")).freeze();
    let (result, stop) = send(&host, &lobby, &lobby, &lobby, &msg);
    assert!(matches!(stop, Stop::NoStop), "return must be absorbed by the method");
    match result.payload() {
        Payload::Number(n) => assert_eq!(n, 42.0),
        _ => panic!("expected number"),
    }
}

#[test]
fn other_stops_propagate_through_a_method_unconsumed() {
    let exc_fn = ObjectRef::new(Payload::CFunction(CFunctionPayload {
        expected_target_tag: None,
        func: Arc::new(|_ctx, _target, _locals, msg| {
            let info = wisp_core::error::ExceptionInfo::new(
                wisp_core::error::ExceptionKind::Custom("boom".to_owned()),
                "test exception",
            )
            .at(msg.location.clone());
            (ObjectRef::new(Payload::Plain), Stop::exception(info))
        }),
    }));

    let lobby = ObjectRef::new(Payload::Plain);
    lobby.set_slot("raise", exc_fn);
    let body = RawMessage::new(Symbol::ident("raise")).freeze();
    let method = make_method(body);
    lobby.set_slot("f", method);

    let host = TestHost::new();
    let msg = RawMessage::new(Symbol::ident("f")).freeze();
    let (_result, stop) = send(&host, &lobby, &lobby, &lobby, &msg);
    assert!(stop.as_exception().is_some());
}

#[test]
fn break_reaching_a_method_boundary_raises_convention_violation() {
    // method(break) called directly, with no enclosing loop: `break` is
    // modeled as a host CFunction that produces a bare BreakStop, and
    // activate_block must convert it into a ConventionViolation rather
    // than letting it escape as-is (unlike the while-body case, where the
    // lexical block handed to `while` isn't itself a method).
    let break_fn = ObjectRef::new(Payload::CFunction(CFunctionPayload {
        expected_target_tag: None,
        func: Arc::new(|_ctx, _target, _locals, _msg| (ObjectRef::new(Payload::Plain), Stop::BreakStop)),
    }));

    let lobby = ObjectRef::new(Payload::Plain);
    lobby.set_slot("break", break_fn);
    let body = RawMessage::new(Symbol::ident("break")).freeze();
    let method = make_method(body);
    lobby.set_slot("f", method);

    let host = TestHost::new();
    let msg = RawMessage::new(Symbol::ident("f")).freeze();
    let (_result, stop) = send(&host, &lobby, &lobby, &lobby, &msg);
    match stop.as_exception() {
        Some(info) => assert_eq!(info.kind, wisp_core::error::ExceptionKind::ConventionViolation),
        None => panic!("expected a convention-violation exception, found {stop:?}"),
    }
}

// --- Slot-missing raises, forward intercepts it ---

#[test]
fn missing_slot_with_no_forward_raises_slot_missing() {
    let o = ObjectRef::new(Payload::Plain);
    let host = TestHost::new();
    let msg = RawMessage::new(Symbol::ident("nope")).freeze();
    let (_result, stop) = send(&host, &o, &o, &o, &msg);
    match stop.as_exception() {
        Some(info) => assert_eq!(info.kind, wisp_core::error::ExceptionKind::SlotMissing),
        None => panic!("expected slot-missing exception"),
    }
}

#[test]
fn forward_slot_intercepts_an_otherwise_missing_lookup() {
    let intercepted = ObjectRef::new(Payload::Number(9.0));
    let forward_fn = ObjectRef::new(Payload::CFunction(CFunctionPayload {
        expected_target_tag: None,
        func: {
            let intercepted = intercepted.clone();
            Arc::new(move |_ctx, _target, _locals, _msg| (intercepted.clone(), Stop::NoStop))
        },
    }));

    let o = ObjectRef::new(Payload::Plain);
    o.set_slot("forward", forward_fn);

    let host = TestHost::new();
    let msg = RawMessage::new(Symbol::ident("whatever")).freeze();
    let (result, stop) = send(&host, &o, &o, &o, &msg);
    assert!(matches!(stop, Stop::NoStop));
    assert!(result.ptr_eq(&intercepted));
}

// --- Futures ---

#[test]
fn activating_a_resolved_future_delegates_to_its_value() {
    let coroutine = wisp_core::id::CoroutineId::fresh();
    let handle = FutureCell::new(coroutine);
    *handle.slot.lock().unwrap() = FutureSlot::Value(ObjectRef::new(Payload::Number(7.0)));
    let future_obj = ObjectRef::new(Payload::Future(handle));

    let lobby = ObjectRef::new(Payload::Plain);
    let host = TestHost::new();
    let msg = RawMessage::new(Symbol::ident("placeholder")).freeze();
    let (result, stop) = activate(&host, &future_obj, &lobby, &lobby, &lobby, &lobby, &msg);
    assert!(matches!(stop, Stop::NoStop));
    match result.payload() {
        Payload::Number(n) => assert_eq!(n, 7.0),
        _ => panic!("expected number"),
    }
    assert_eq!(future_obj.tag(), Tag::Future);
}

#[test]
fn activating_an_unresolved_future_picks_up_a_remote_stop() {
    let coroutine = wisp_core::id::CoroutineId::fresh();
    let handle = FutureCell::new(coroutine);
    let future_obj = ObjectRef::new(Payload::Future(handle));

    let lobby = ObjectRef::new(Payload::Plain);
    let host = TestHost::new();
    host.push_inbox(RemoteStop::new(Stop::ExitStop));
    let msg = RawMessage::new(Symbol::ident("placeholder")).freeze();
    let (_result, stop) = activate(&host, &future_obj, &lobby, &lobby, &lobby, &lobby, &msg);
    assert!(matches!(stop, Stop::ExitStop));
}

// --- Call record plumbing ---

#[test]
fn block_activation_exposes_a_call_record_in_locals() {
    let body = RawMessage::new(Symbol::ident("call")).freeze();
    let method = make_method(body);

    let lobby = ObjectRef::new(Payload::Plain);
    lobby.set_slot("f", method);

    let host = TestHost::new();
    let msg = RawMessage::new(Symbol::ident("f")).freeze();
    let (result, stop) = send(&host, &lobby, &lobby, &lobby, &msg);
    assert!(matches!(stop, Stop::NoStop));
    assert_eq!(result.tag(), Tag::Call);
    match result.payload() {
        Payload::Call(CallPayload { target, .. }) => assert!(target.ptr_eq(&lobby)),
        _ => panic!("expected call"),
    }
}

#[test]
fn message_chain_location_survives_into_raised_exceptions() {
    let o = ObjectRef::new(Payload::Plain);
    let host = TestHost::new();
    let loc = SourceLocation::new("script.wisp", 11);
    let msg: MessageRef = Arc::new(Message {
        symbol: Symbol::ident("nope"),
        memo: None,
        args: vec![],
        next: None,
        location: loc.clone(),
    });
    let (_result, stop) = send(&host, &o, &o, &o, &msg);
    let info = stop.as_exception().unwrap();
    assert_eq!(info.location, Some(loc));
}
