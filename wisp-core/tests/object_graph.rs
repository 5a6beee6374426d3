use wisp_core::object::{ObjectRef, Payload, Tag};
use wisp_core::operator_table::OperatorTable;
use wisp_core::test_utils::{ident, number};

// --- Slot lookup ---

#[test]
fn lookup_prefers_nearer_proto_over_farther_one() {
    let grandparent = ObjectRef::new(Payload::Plain);
    grandparent.set_slot("x", ObjectRef::new(Payload::Number(1.0)));

    let parent = ObjectRef::with_protos(Payload::Plain, vec![grandparent]);
    parent.set_slot("x", ObjectRef::new(Payload::Number(2.0)));

    let child = ObjectRef::with_protos(Payload::Plain, vec![parent]);

    let (value, _) = child.get_slot("x");
    match value.unwrap().payload() {
        Payload::Number(n) => assert_eq!(n, 2.0),
        _ => panic!("expected number"),
    }
}

#[test]
fn lookup_is_left_to_right_among_sibling_protos() {
    let left = ObjectRef::new(Payload::Plain);
    left.set_slot("who", ObjectRef::new(Payload::Sequence(b"left".to_vec())));
    let right = ObjectRef::new(Payload::Plain);
    right.set_slot("who", ObjectRef::new(Payload::Sequence(b"right".to_vec())));

    let child = ObjectRef::with_protos(Payload::Plain, vec![left, right]);

    let (value, _) = child.get_slot("who");
    match value.unwrap().payload() {
        Payload::Sequence(bytes) => assert_eq!(bytes, b"left".to_vec()),
        _ => panic!("expected sequence"),
    }
}

#[test]
fn missing_slot_returns_none_with_no_context() {
    let o = ObjectRef::new(Payload::Plain);
    let (value, ctx) = o.get_slot("nope");
    assert!(value.is_none());
    assert!(ctx.is_none());
}

// --- Cloning ---

#[test]
fn clone_shares_via_proto_not_copy() {
    let proto = ObjectRef::new(Payload::Plain);
    proto.set_slot("count", ObjectRef::new(Payload::Number(0.0)));

    let clone = proto.clone_object();
    assert_eq!(clone.protos().len(), 1);
    assert!(clone.protos()[0].ptr_eq(&proto));

    // Mutating the proto's slot is visible through the clone's lookup,
    // since the clone never copied it.
    proto.set_slot("count", ObjectRef::new(Payload::Number(5.0)));
    let (value, _) = clone.get_slot("count");
    match value.unwrap().payload() {
        Payload::Number(n) => assert_eq!(n, 5.0),
        _ => panic!("expected number"),
    }
}

#[test]
fn clone_of_a_list_copies_the_vec_not_the_elements() {
    let shared_element = ObjectRef::new(Payload::Number(1.0));
    let list = ObjectRef::new(Payload::List(vec![shared_element.clone()]));
    let clone = list.clone_object();

    clone.with_payload_mut(|p| {
        if let Payload::List(items) = p {
            items.push(ObjectRef::new(Payload::Number(2.0)));
        }
    });

    list.with_payload(|p| {
        if let Payload::List(items) = p {
            assert_eq!(items.len(), 1, "original list must not see the clone's push");
        }
    });
}

// --- Tags ---

#[test]
fn plain_and_future_tags_report_activatability_correctly() {
    assert!(!Tag::Plain.is_activatable());
    assert!(Tag::Block.is_activatable());
    assert!(Tag::CFunction.is_activatable());
    assert!(Tag::Future.is_activatable());
    assert!(!Tag::Number.is_activatable());
}

// --- Operator table plumbing, exercised against real message chains ---

#[test]
fn default_table_recognizes_every_symbol_a_builder_chain_might_carry() {
    let table = OperatorTable::default_table();
    let chain = ident("a").then("+").then("b").build();

    let second = chain.next.as_ref().unwrap();
    assert!(table.is_operator(&second.symbol.text));
    assert!(!table.is_assign(&second.symbol.text));
}

#[test]
fn builder_chain_carries_memoized_number_literals() {
    let chain = number(42.0).build();
    match &chain.memo {
        Some(v) => match v.payload() {
            Payload::Number(n) => assert_eq!(n, 42.0),
            _ => panic!("expected number"),
        },
        None => panic!("expected memo"),
    }
}
