//! The send/activate evaluator (spec.md §4.1, §4.2).
//!
//! `send` walks a message chain, looking up and activating each message's
//! name against the current receiver in turn; `activate` is the
//! polymorphic operation whose effect depends on the activated object's
//! [`Tag`]. The two are mutually recursive: activating a block re-enters
//! `send` on the block's body.

use tracing::trace;
use wisp_core::error::{ExceptionInfo, ExceptionKind};
use wisp_core::message::MessageRef;
use wisp_core::object::{CallPayload, HostContext, ObjectRef, Payload, Tag};
use wisp_core::stop::Stop;

const FORWARD_SLOT: &str = "forward";
const SELF_SLOT: &str = "self";
const CALL_SLOT: &str = "call";

/// Evaluate a message chain against `receiver`, as spec.md §4.2 describes.
///
/// `sender` is the object on whose behalf this chain is being evaluated —
/// used as the `Call.sender` for every activation along the chain, and as
/// the receiver against which argument sub-chains are evaluated.
/// `locals` is the object carrying this evaluation's local bindings
/// (method/block locals, or the top-level `Lobby` for a fresh `do_string`).
pub fn send(
    ctx: &dyn HostContext,
    sender: &ObjectRef,
    receiver: &ObjectRef,
    locals: &ObjectRef,
    chain: &MessageRef,
) -> (ObjectRef, Stop) {
    let mut current_receiver = receiver.clone();
    let mut last_value = receiver.clone();
    let mut cursor = Some(chain.clone());

    while let Some(msg) = cursor {
        if let Some(stop) = drain_inbox(ctx) {
            return (last_value, stop);
        }

        if msg.is_terminator() {
            current_receiver = receiver.clone();
            cursor = msg.next.clone();
            continue;
        }

        let (activated, slot_context) = match &msg.memo {
            Some(literal) => (literal.clone(), current_receiver.clone()),
            None => match resolve_slot(&current_receiver, &msg.symbol.text) {
                Some(found) => found,
                None => {
                    let info = ExceptionInfo::slot_missing(&msg.symbol.text).at(msg.location.clone());
                    return (last_value, Stop::exception(info));
                }
            },
        };

        trace!(message = %msg.symbol.text, "sending");

        let (result, stop) = activate(
            ctx,
            &activated,
            &current_receiver,
            locals,
            sender,
            &slot_context,
            &msg,
        );
        last_value = result.clone();
        if stop.short_circuits() {
            return (result, stop);
        }

        current_receiver = result;
        cursor = msg.next.clone();
    }

    (last_value, Stop::NoStop)
}

/// Look up `name` on `receiver`'s proto graph, falling back to `forward`
/// if nothing carries it directly (spec.md §4.1).
fn resolve_slot(receiver: &ObjectRef, name: &str) -> Option<(ObjectRef, ObjectRef)> {
    let (value, found_on) = receiver.get_slot(name);
    if let (Some(value), Some(found_on)) = (value, found_on) {
        return Some((value, found_on));
    }
    let (forward_value, forward_on) = receiver.get_slot(FORWARD_SLOT);
    match (forward_value, forward_on) {
        (Some(value), Some(on)) => Some((value, on)),
        _ => None,
    }
}

/// Poll the current coroutine's control inbox; translate a pending
/// `RemoteStop` into the stop this evaluation should short-circuit with.
fn drain_inbox(ctx: &dyn HostContext) -> Option<Stop> {
    ctx.poll_inbox().map(|remote| remote.stop)
}

/// The central polymorphic operation (spec.md §4.1): what happens when
/// `activated` (found via slot lookup, or a literal's memo) is invoked as
/// part of sending `msg` to `target`.
#[allow(clippy::too_many_arguments)]
pub fn activate(
    ctx: &dyn HostContext,
    activated: &ObjectRef,
    target: &ObjectRef,
    locals: &ObjectRef,
    sender: &ObjectRef,
    slot_context: &ObjectRef,
    msg: &MessageRef,
) -> (ObjectRef, Stop) {
    match activated.tag() {
        Tag::Block => activate_block(ctx, activated, target, locals, sender, slot_context, msg),
        Tag::CFunction => activate_cfunction(ctx, activated, target, locals, msg),
        Tag::Future => activate_future(ctx, activated, target, locals, sender, slot_context, msg),
        _ => (activated.clone(), Stop::NoStop),
    }
}

#[allow(clippy::too_many_arguments)]
fn activate_block(
    ctx: &dyn HostContext,
    activated: &ObjectRef,
    target: &ObjectRef,
    caller_locals: &ObjectRef,
    sender: &ObjectRef,
    slot_context: &ObjectRef,
    msg: &MessageRef,
) -> (ObjectRef, Stop) {
    let block = match activated.payload() {
        Payload::Block(b) => b,
        other => {
            let info = ExceptionInfo::type_mismatch("Block", other.tag().name()).at(msg.location.clone());
            return (activated.clone(), Stop::exception(info));
        }
    };

    if !block.activatable {
        return (activated.clone(), Stop::NoStop);
    }

    let self_obj = block.scope.clone().unwrap_or_else(|| target.clone());
    // `new_locals`'s proto is `self_obj`, not an empty object: a bare
    // identifier sent to `new_locals` (the body's receiver, just below)
    // first checks `new_locals`'s own table — `self`, `call`, and the
    // bound parameters — then falls through to `self_obj`'s slots
    // exactly as a plain message to `self` would. This is how a method
    // body can refer to its own parameters by name while still reaching
    // every other slot on the receiver.
    let new_locals = ObjectRef::with_protos(Payload::Plain, vec![self_obj.clone()]);
    new_locals.set_slot(SELF_SLOT, self_obj.clone());

    let call_obj = ObjectRef::new(Payload::Call(CallPayload {
        sender: sender.clone(),
        target: target.clone(),
        activated: activated.clone(),
        message: msg.clone(),
        locals: new_locals.clone(),
        slot_context: slot_context.clone(),
    }));
    new_locals.set_slot(CALL_SLOT, call_obj);

    for (i, param) in block.params.iter().enumerate() {
        let value = match msg.args.get(i) {
            Some(arg_chain) => {
                // spec.md §4.1: arguments evaluate in the caller's
                // locals, so a bare identifier naming one of the
                // caller's own parameters resolves correctly.
                let (value, stop) = send(ctx, sender, caller_locals, caller_locals, arg_chain);
                if stop.short_circuits() {
                    return (value, stop);
                }
                value
            }
            None => {
                let info = ExceptionInfo::new(
                    ExceptionKind::Arity,
                    format!("missing argument `{param}`"),
                )
                .at(msg.location.clone());
                return (activated.clone(), Stop::exception(info));
            }
        };
        new_locals.set_slot(param.clone(), value);
    }

    let (result, stop) = send(ctx, &self_obj, &new_locals, &new_locals, &block.body);
    match stop {
        // `return` is confined to the *method* boundary (spec.md §8):
        // a lexical block (`is_method()` false) must let a `ReturnStop`
        // propagate to its enclosing method, not absorb it here.
        Stop::ReturnStop if block.is_method() => (result, Stop::NoStop),
        // A method is an independent call boundary: any `break`/`continue`
        // that reaches it unconsumed didn't originate from a loop the
        // method itself is running (a lexical block passed straight to a
        // loop primitive isn't a method — `is_method()` is false for it —
        // so this arm never fires for the common while/for-body case).
        Stop::BreakStop | Stop::ContinueStop if block.is_method() => {
            let info = ExceptionInfo::new(
                ExceptionKind::ConventionViolation,
                "break/continue used outside of a loop",
            )
            .at(msg.location.clone());
            (activated.clone(), Stop::exception(info))
        }
        other => (result, other),
    }
}

fn activate_cfunction(
    ctx: &dyn HostContext,
    activated: &ObjectRef,
    target: &ObjectRef,
    locals: &ObjectRef,
    msg: &MessageRef,
) -> (ObjectRef, Stop) {
    let cfunction = match activated.payload() {
        Payload::CFunction(c) => c,
        other => {
            let info =
                ExceptionInfo::type_mismatch("CFunction", other.tag().name()).at(msg.location.clone());
            return (activated.clone(), Stop::exception(info));
        }
    };

    if let Some(expected) = cfunction.expected_target_tag {
        if target.tag() != expected {
            let info = ExceptionInfo::type_mismatch(expected.name(), target.tag().name())
                .at(msg.location.clone());
            return (activated.clone(), Stop::exception(info));
        }
    }

    (cfunction.func)(ctx, target, locals, msg)
}

#[allow(clippy::too_many_arguments)]
fn activate_future(
    ctx: &dyn HostContext,
    activated: &ObjectRef,
    target: &ObjectRef,
    locals: &ObjectRef,
    sender: &ObjectRef,
    slot_context: &ObjectRef,
    msg: &MessageRef,
) -> (ObjectRef, Stop) {
    let handle = match activated.payload() {
        Payload::Future(f) => f,
        other => {
            let info = ExceptionInfo::type_mismatch("Future", other.tag().name()).at(msg.location.clone());
            return (activated.clone(), Stop::exception(info));
        }
    };

    loop {
        let slot = handle.slot.lock().expect("future mutex poisoned").clone();
        match slot {
            wisp_core::object::FutureSlot::Value(value) => {
                return activate(ctx, &value, target, locals, sender, slot_context, msg);
            }
            wisp_core::object::FutureSlot::Exception(info) => {
                return (activated.clone(), Stop::exception(info));
            }
            wisp_core::object::FutureSlot::Empty => {
                if let Some(stop) = drain_inbox(ctx) {
                    return (activated.clone(), stop);
                }
                ctx.yield_now();
            }
        }
    }
}
