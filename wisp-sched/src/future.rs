//! Futures and async/future send (spec.md §3, §4.4).
//!
//! `futureSend`/`asyncSend` spawn a fresh coroutine that evaluates a
//! message against a target and, on completion, resolves a [`FutureCell`]
//! exactly once. `future.wait` is the explicit, deadlock-checked way to
//! block on one; plain activation of an unresolved future (handled
//! entirely inside `wisp-eval::eval::activate`) is the implicit,
//! not-deadlock-checked way.

use std::sync::Arc;
use std::thread;
use tracing::error;
use wisp_core::error::{ExceptionInfo, ExceptionKind};
use wisp_core::id::SourceLocation;
use wisp_core::message::{Message, Symbol, SymbolKind};
use wisp_core::object::{
    CFn, CFunctionPayload, FutureCell, FutureHandle, FutureSlot, HostContext, ObjectRef, Payload, Tag,
};
use wisp_core::stop::Stop;
use wisp_eval::{activate, send};

use crate::coroutine::{Coroutine, CoroutineHostContext, CoroutineState, WellKnownLookup};
use crate::scheduler::Scheduler;

const HANDLE_ACTOR_EXCEPTION_SLOT: &str = "handleActorException";
const EXCEPTION_SLOT: &str = "exception";

/// Spawn a fresh coroutine evaluating `body` against `target` and return
/// a future for its eventual result (spec.md §4.4 `futureSend`).
///
/// `sender` is the object recorded as `Call.sender` for the spawned
/// evaluation; SPEC_FULL.md §4 resolves spec.md's "cloned from the
/// caller" language as "the spawned coroutine's sender is inherited from
/// the coroutine that requested the send", since no object-level clone
/// of caller state is otherwise described.
pub fn spawn_future(
    scheduler: Arc<Scheduler>,
    well_known: WellKnownLookup,
    parent: wisp_core::id::CoroutineId,
    sender: ObjectRef,
    target: ObjectRef,
    body: wisp_core::message::MessageRef,
    protos: Vec<ObjectRef>,
) -> ObjectRef {
    let coroutine = Coroutine::spawn(Some(parent), scheduler, well_known);
    let handle = FutureCell::new(coroutine.id());
    let future_obj = ObjectRef::with_protos(Payload::Future(handle.clone()), protos);

    let thread_coroutine = coroutine.clone();
    let thread_target = target.clone();
    let name = format!("wisp-coro-{}", coroutine.id().raw());
    thread::Builder::new()
        .name(name)
        .spawn(move || run_future_coroutine(thread_coroutine, handle, sender, thread_target, body))
        .expect("failed to spawn coroutine thread");

    future_obj
}

fn run_future_coroutine(
    coroutine: Arc<Coroutine>,
    handle: FutureHandle,
    sender: ObjectRef,
    target: ObjectRef,
    body: wisp_core::message::MessageRef,
) {
    coroutine.set_state(CoroutineState::Running);
    let ctx = CoroutineHostContext::new(coroutine.clone());
    let locals = target.clone();
    let (result, stop) = send(&ctx, &sender, &target, &locals, &body);

    match stop {
        Stop::ExceptionStop(info) => handle_future_exception(&ctx, &target, &sender, &locals, &handle, info),
        _ => resolve(&handle, FutureSlot::Value(result)),
    }

    coroutine.finish();
}

/// Single-assignment write with the panic-on-double-write contract of
/// spec.md §4.4/§7 ("a second writer is a contract violation and
/// panics").
fn resolve(handle: &FutureHandle, slot: FutureSlot) {
    let mut guard = handle.slot.lock().expect("future mutex poisoned");
    if !matches!(*guard, FutureSlot::Empty) {
        panic!("convention violation: double-write to an already-resolved future");
    }
    *guard = slot;
}

/// spec.md §4.4: if evaluating the future's message raised, send
/// `handleActorException` to the target with the exception as argument.
/// If *that* raises too, store the secondary exception into the
/// target's `exception` slot (best effort; spec.md documents this as an
/// ambiguous, not-necessarily-ideal behavior it preserves as-is).
fn handle_future_exception(
    ctx: &CoroutineHostContext,
    target: &ObjectRef,
    sender: &ObjectRef,
    locals: &ObjectRef,
    handle: &FutureHandle,
    info: ExceptionInfo,
) {
    let (found, slot_context) = target.get_slot(HANDLE_ACTOR_EXCEPTION_SLOT);
    let Some(handler) = found else {
        resolve(handle, FutureSlot::Exception(info));
        return;
    };
    let slot_context = slot_context.unwrap_or_else(|| target.clone());

    let exc_obj = ObjectRef::new(Payload::Exception(info.clone()));
    let synthetic = synthetic_call(HANDLE_ACTOR_EXCEPTION_SLOT, exc_obj);
    let (_, inner_stop) = activate(ctx, &handler, target, locals, sender, &slot_context, &synthetic);

    match inner_stop {
        Stop::ExceptionStop(inner) => {
            error!(original = %info, secondary = %inner, "handleActorException itself raised");
            target.set_slot(EXCEPTION_SLOT, ObjectRef::new(Payload::Exception(inner.clone())));
            resolve(handle, FutureSlot::Exception(inner));
        }
        _ => resolve(handle, FutureSlot::Exception(info)),
    }
}

/// Build a synthetic, already-resolved message carrying a single
/// argument whose value is `arg` (no further evaluation needed), so the
/// scheduler can invoke a found slot directly via `activate` without
/// going through `send`'s lookup machinery a second time.
fn synthetic_call(name: &str, arg: ObjectRef) -> wisp_core::message::MessageRef {
    let arg_msg = Arc::new(Message {
        symbol: Symbol {
            kind: SymbolKind::Identifier,
            text: "<synthetic-arg>".to_owned(),
        },
        memo: Some(arg),
        args: Vec::new(),
        next: None,
        location: SourceLocation::UNKNOWN,
    });
    Arc::new(Message {
        symbol: Symbol::ident(name),
        memo: None,
        args: vec![arg_msg],
        next: None,
        location: SourceLocation::UNKNOWN,
    })
}

/// `futureSend(msg)` as a `CFunction`: `msg.args[0]` is the *unevaluated*
/// message chain to send to the receiver from the spawned coroutine —
/// the point of `futureSend` is that the send itself, not just its
/// result, happens concurrently.
pub fn future_send_cfn(scheduler: Arc<Scheduler>, well_known: WellKnownLookup, future_proto: ObjectRef) -> CFn {
    Arc::new(move |ctx, target, _locals, msg| {
        let Some(parent) = ctx.current_coroutine() else {
            let info = ExceptionInfo::new(ExceptionKind::ConventionViolation, "futureSend requires a running coroutine")
                .at(msg.location.clone());
            return (target.clone(), Stop::exception(info));
        };
        let Some(body) = msg.args.first().cloned() else {
            let info = ExceptionInfo::new(ExceptionKind::Arity, "futureSend requires one argument: the message to send")
                .at(msg.location.clone());
            return (target.clone(), Stop::exception(info));
        };
        let future_obj = spawn_future(
            scheduler.clone(),
            well_known.clone(),
            parent,
            target.clone(),
            target.clone(),
            body,
            vec![future_proto.clone()],
        );
        (future_obj, Stop::NoStop)
    })
}

/// `asyncSend(msg)` as a `CFunction`: identical to `futureSend`, but
/// returns `nil` and discards the future (spec.md §4.4).
pub fn async_send_cfn(
    scheduler: Arc<Scheduler>,
    well_known: WellKnownLookup,
    nil: ObjectRef,
    future_proto: ObjectRef,
) -> CFn {
    Arc::new(move |ctx, target, _locals, msg| {
        let Some(parent) = ctx.current_coroutine() else {
            let info = ExceptionInfo::new(ExceptionKind::ConventionViolation, "asyncSend requires a running coroutine")
                .at(msg.location.clone());
            return (target.clone(), Stop::exception(info));
        };
        let Some(body) = msg.args.first().cloned() else {
            let info = ExceptionInfo::new(ExceptionKind::Arity, "asyncSend requires one argument: the message to send")
                .at(msg.location.clone());
            return (target.clone(), Stop::exception(info));
        };
        spawn_future(
            scheduler.clone(),
            well_known.clone(),
            parent,
            target.clone(),
            target.clone(),
            body,
            vec![future_proto.clone()],
        );
        (nil.clone(), Stop::NoStop)
    })
}

/// `future wait`: the explicit, deadlock-checked wait of spec.md §4.4,
/// as distinct from the implicit spin-wait plain activation of an
/// unresolved future performs (`wisp-eval::eval::activate_future`).
/// Registers `Await(caller, future.coroutine)` with the scheduler before
/// spinning, so a dependency cycle is caught immediately rather than
/// only when `activate` itself would have blocked forever.
pub fn future_wait_cfn(scheduler: Arc<Scheduler>) -> CFn {
    Arc::new(move |ctx, target, _locals, msg| {
        let handle = match target.payload() {
            Payload::Future(h) => h,
            other => {
                let info = ExceptionInfo::type_mismatch("Future", other.tag().name()).at(msg.location.clone());
                return (target.clone(), Stop::exception(info));
            }
        };
        let Some(caller) = ctx.current_coroutine() else {
            let info = ExceptionInfo::new(ExceptionKind::ConventionViolation, "wait requires a running coroutine")
                .at(msg.location.clone());
            return (target.clone(), Stop::exception(info));
        };

        scheduler.await_dep(caller, handle.coroutine);

        loop {
            let slot = handle.slot.lock().expect("future mutex poisoned").clone();
            match slot {
                FutureSlot::Value(value) => return (value, Stop::NoStop),
                FutureSlot::Exception(info) => return (target.clone(), Stop::exception(info)),
                FutureSlot::Empty => {
                    if let Some(remote) = ctx.poll_inbox() {
                        return (target.clone(), remote.stop);
                    }
                    ctx.yield_now();
                }
            }
        }
    })
}

/// Wrap [`future_wait_cfn`] as a `CFunctionPayload` expecting a `Future`
/// receiver, ready to install on `Core Future`'s `wait` slot.
pub fn future_wait_cfunction_payload(scheduler: Arc<Scheduler>) -> CFunctionPayload {
    CFunctionPayload {
        func: future_wait_cfn(scheduler),
        expected_target_tag: Some(Tag::Future),
    }
}
