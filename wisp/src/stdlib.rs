//! The methods that give the language its control flow, assignment, and
//! arithmetic (spec.md §1: "control flow (`if`, `while`, `for`, `return`,
//! `break`, `continue`), assignment, and arithmetic are all ordinary
//! methods invoked on objects"). None of this is special-cased in
//! `wisp-eval`'s send/activate loop — every name below is an ordinary
//! `CFunction` slot, installed once at [`crate::Vm`] construction onto
//! the relevant `Core` proto.

use std::sync::Arc;
use wisp_core::error::{ExceptionInfo, ExceptionKind};
use wisp_core::message::{Message, MessageRef, Symbol, SymbolKind};
use wisp_core::object::{BlockPayload, CFn, CFunctionPayload, HostContext, ObjectRef, Payload, Tag};
use wisp_core::stop::Stop;
use wisp_eval::{activate, send};
use wisp_sched::{async_send_cfn, future_send_cfn, future_wait_cfunction_payload, spawn_future, Scheduler, WellKnownLookup};

use crate::vm::Bootstrap;

const SELF_SLOT: &str = "self";

/// Install every stdlib method this expansion grounds in spec.md §1's
/// "control flow ... are all ordinary methods" onto the relevant protos
/// in `boot`.
pub(crate) fn install(boot: &Bootstrap, scheduler: Arc<Scheduler>, well_known: WellKnownLookup) {
    install_object_protocol(boot);
    install_method_literals(boot);
    install_assignment(boot);
    install_control_flow(boot);
    install_arithmetic(boot);
    install_comparisons(boot);
    install_boolean_logic(boot);
    install_concurrency(boot, scheduler, well_known);
    install_exception_protocol(boot);
    install_call_protocol(boot);
}

// --- shared helpers ---

/// The object argument sub-chains evaluate against (spec.md §4.1:
/// "evaluating each argument in the caller's locals"): the running
/// method/block's `self`, falling back to the CFunction's own `target`
/// for a bare top-level call where `locals` carries no `self` slot yet.
fn self_of(locals: &ObjectRef, target: &ObjectRef) -> ObjectRef {
    locals.own_slot(SELF_SLOT).unwrap_or_else(|| target.clone())
}

/// Evaluate one of `msg`'s unevaluated argument sub-chains against
/// `locals` as the receiver (spec.md §4.1: a block's own argument path
/// at `wisp-eval/src/eval.rs`'s `activate_block` does the same —
/// `send(ctx, sender, caller_locals, caller_locals, arg_chain)` — so a
/// bare identifier in an argument resolves against the caller's own
/// locals object, not against whatever value the CFunction happens to
/// be receiving as its `target`).
fn eval_arg(ctx: &dyn HostContext, target: &ObjectRef, locals: &ObjectRef, chain: &MessageRef) -> (ObjectRef, Stop) {
    let sender = self_of(locals, target);
    send(ctx, &sender, locals, locals, chain)
}

fn arity_error(msg: &MessageRef, target: &ObjectRef, usage: &str) -> (ObjectRef, Stop) {
    let info = ExceptionInfo::new(ExceptionKind::Arity, format!("expected {usage}")).at(msg.location.clone());
    (target.clone(), Stop::exception(info))
}

fn type_mismatch(msg: &MessageRef, target: &ObjectRef, expected: &str, found: &str) -> (ObjectRef, Stop) {
    let info = ExceptionInfo::type_mismatch(expected, found).at(msg.location.clone());
    (target.clone(), Stop::exception(info))
}

/// A single-message chain whose memo is already `value`: sending it runs
/// straight through `activate` without a slot lookup (spec.md §4.2 step
/// 3). Used to re-invoke an already-evaluated block/CFunction from
/// stdlib code without synthesizing a fake identifier lookup.
fn literal_call(value: ObjectRef) -> MessageRef {
    Arc::new(Message {
        symbol: Symbol {
            kind: SymbolKind::Identifier,
            text: "<stdlib-synthetic>".to_owned(),
        },
        memo: Some(value),
        args: Vec::new(),
        next: None,
        location: wisp_core::id::SourceLocation::UNKNOWN,
    })
}

/// Everything except the `false`/`nil` singletons is truthy. Not
/// specified by spec.md (which defines `if`/`while` only in terms of
/// "the condition" without naming a Boolean type); DESIGN.md records
/// this as a resolved Open Question.
fn is_truthy(value: &ObjectRef, false_obj: &ObjectRef, nil_obj: &ObjectRef) -> bool {
    !(value.ptr_eq(false_obj) || value.ptr_eq(nil_obj))
}

// --- object protocol (spec.md §4.1) ---

fn install_object_protocol(boot: &Bootstrap) {
    let clone_fn: CFn = Arc::new(|_ctx, target, _locals, _msg| (target.clone_object(), Stop::NoStop));
    boot.object_proto.set_slot(
        "clone",
        ObjectRef::with_protos(
            Payload::CFunction(CFunctionPayload {
                func: clone_fn,
                expected_target_tag: None,
            }),
            vec![boot.cfunction_proto.clone()],
        ),
    );

    let type_name_fn: CFn = Arc::new(|_ctx, target, _locals, _msg| {
        let name = target.tag().name();
        (
            ObjectRef::new(Payload::Sequence(name.as_bytes().to_vec())),
            Stop::NoStop,
        )
    });
    install_cfn(boot, &boot.object_proto, "type", type_name_fn, None);

    let remove_slot_fn: CFn = Arc::new(|ctx, target, locals, msg| {
        if msg.args.is_empty() {
            return arity_error(msg, target, "removeSlot(name)");
        }
        let (name_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
        if stop.short_circuits() {
            return (name_obj, stop);
        }
        let name = match name_obj.payload() {
            Payload::Sequence(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            other => return type_mismatch(msg, &name_obj, "Sequence", other.tag().name()),
        };
        target.remove_slot(&name);
        (target.clone(), Stop::NoStop)
    });
    install_cfn(boot, &boot.object_proto, "removeSlot", remove_slot_fn, None);

    // `resend` (SPEC_FULL.md §4): re-activate the current message one
    // proto past `Call.slotContext`, the super-dispatch capability
    // spec.md §4.4's Design Notes keeps `slotContext` independent of
    // `sender` in order to support.
    let resend_fn: CFn = Arc::new(|ctx, _target, locals, msg| {
        let call = match locals.get_slot("call").0.map(|c| c.payload()) {
            Some(Payload::Call(call)) => call,
            _ => {
                let info = ExceptionInfo::new(ExceptionKind::ConventionViolation, "resend used outside of a method activation")
                    .at(msg.location.clone());
                return (locals.clone(), Stop::exception(info));
            }
        };
        let (found, found_ctx) = call.target.get_slot_after(&call.slot_context, &call.message.symbol.text);
        match found {
            Some(activated) => {
                let ctx_obj = found_ctx.unwrap_or_else(|| call.target.clone());
                activate(ctx, &activated, &call.target, locals, &call.sender, &ctx_obj, &call.message)
            }
            None => {
                let info = ExceptionInfo::slot_missing(&call.message.symbol.text).at(msg.location.clone());
                (call.target.clone(), Stop::exception(info))
            }
        }
    });
    install_cfn(boot, &boot.object_proto, "resend", resend_fn, None);
}

// --- method/block literals and `do` (spec.md §1, §3) ---

/// `method(param1, ..., paramN, body)` / `block(param1, ..., paramN,
/// body)`: ordinary calls whose arguments the shuffler/parser hand over
/// exactly like `if`/`while`'s — unevaluated. There is no dedicated
/// literal syntax for these in the message tree (spec.md §1 lists them
/// among the "ordinary methods invoked on objects"); the only thing that
/// distinguishes a `method` from a `block` is whether the resulting
/// `BlockPayload::scope` is `None` (spec.md §3, §4.1).
fn install_method_literals(boot: &Bootstrap) {
    let block_proto = boot.block_proto.clone();

    let build: Arc<dyn Fn(bool) -> CFn + Send + Sync> = {
        let block_proto = block_proto.clone();
        Arc::new(move |is_method: bool| {
            let block_proto = block_proto.clone();
            Arc::new(move |_ctx: &dyn HostContext, target: &ObjectRef, locals: &ObjectRef, msg: &MessageRef| {
                if msg.args.is_empty() {
                    return arity_error(msg, target, "method(param..., body)");
                }
                let (param_msgs, body_msg) = msg.args.split_at(msg.args.len() - 1);
                let mut params = Vec::with_capacity(param_msgs.len());
                for p in param_msgs {
                    if p.symbol.kind != SymbolKind::Identifier {
                        let info = ExceptionInfo::new(
                            ExceptionKind::Arity,
                            "method/block parameters must be bare identifiers",
                        )
                        .at(msg.location.clone());
                        return (target.clone(), Stop::exception(info));
                    }
                    params.push(p.symbol.text.clone());
                }
                let scope = if is_method { None } else { Some(self_of(locals, target)) };
                let payload = Payload::Block(BlockPayload {
                    body: body_msg[0].clone(),
                    params,
                    scope,
                    activatable: true,
                });
                (
                    ObjectRef::with_protos(payload, vec![block_proto.clone()]),
                    Stop::NoStop,
                )
            }) as CFn
        })
    };

    install_cfn(boot, &boot.object_proto, "method", build(true), None);
    install_cfn(boot, &boot.object_proto, "block", build(false), None);

    // `do(chain)`: evaluate `chain` with the receiver as both receiver
    // and locals (the same `sender == receiver == locals` shape
    // `Vm::do_string` itself uses against `Lobby`), return the receiver
    // unchanged — the idiom `Obj := Object clone do(f := method(...))`
    // relies on to install slots directly on a freshly cloned object in
    // one expression, with no intervening locals frame of its own.
    let do_fn: CFn = Arc::new(|ctx, target, _locals, msg| {
        if msg.args.is_empty() {
            return arity_error(msg, target, "do(chain)");
        }
        let (value, stop) = send(ctx, target, target, target, &msg.args[0]);
        if stop.short_circuits() {
            return (value, stop);
        }
        (target.clone(), Stop::NoStop)
    });
    install_cfn(boot, &boot.object_proto, "do", do_fn, None);
}

fn install_cfn(boot: &Bootstrap, proto: &ObjectRef, name: &str, func: CFn, expected_target_tag: Option<Tag>) {
    proto.set_slot(
        name,
        ObjectRef::with_protos(
            Payload::CFunction(CFunctionPayload { func, expected_target_tag }),
            vec![boot.cfunction_proto.clone()],
        ),
    );
}

// --- assignment (spec.md §4.3, §6) ---

fn install_assignment(boot: &Bootstrap) {
    let set_slot_fn: CFn = Arc::new(|ctx, target, locals, msg| {
        let (name, value, stop) = match eval_name_and_value(ctx, target, locals, msg) {
            Ok(pair) => pair,
            Err(early) => return early,
        };
        if stop.short_circuits() {
            return (value, stop);
        }
        target.set_slot(name, value.clone());
        (value, Stop::NoStop)
    });
    install_cfn(boot, &boot.object_proto, "setSlot", set_slot_fn, None);

    let new_slot_fn: CFn = Arc::new(|ctx, target, locals, msg| {
        let (name, value, stop) = match eval_name_and_value(ctx, target, locals, msg) {
            Ok(pair) => pair,
            Err(early) => return early,
        };
        if stop.short_circuits() {
            return (value, stop);
        }
        target.set_slot(name, value.clone());
        (value, Stop::NoStop)
    });
    install_cfn(boot, &boot.object_proto, "newSlot", new_slot_fn, None);

    // `updateSlot` fails if the slot was never defined anywhere in the
    // proto chain (spec.md §8 testable property 2), unlike `setSlot`/
    // `newSlot`, which always write regardless.
    let update_slot_fn: CFn = Arc::new(|ctx, target, locals, msg| {
        let (name, value, stop) = match eval_name_and_value(ctx, target, locals, msg) {
            Ok(pair) => pair,
            Err(early) => return early,
        };
        if stop.short_circuits() {
            return (value, stop);
        }
        if target.get_slot(&name).0.is_none() {
            let info = ExceptionInfo::slot_missing(&name).at(msg.location.clone());
            return (target.clone(), Stop::exception(info));
        }
        target.set_slot(name, value.clone());
        (value, Stop::NoStop)
    });
    install_cfn(boot, &boot.object_proto, "updateSlot", update_slot_fn, None);
}

#[allow(clippy::type_complexity)]
fn eval_name_and_value(
    ctx: &dyn HostContext,
    target: &ObjectRef,
    locals: &ObjectRef,
    msg: &MessageRef,
) -> Result<(String, ObjectRef, Stop), (ObjectRef, Stop)> {
    if msg.args.len() < 2 {
        return Err(arity_error(msg, target, "setSlot(name, value)"));
    }
    // The name argument is always a memoized string literal once the
    // shuffler has desugared an assignment (spec.md §4.3 step 3); a
    // direct `setSlot("x", 1)` call also carries a memoized literal, so
    // evaluating it rather than reading `.memo` directly keeps both
    // paths uniform.
    let (name_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
    if stop.short_circuits() {
        return Err((name_obj, stop));
    }
    let name = match name_obj.payload() {
        Payload::Sequence(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        other => return Err(type_mismatch(msg, &name_obj, "Sequence", other.tag().name())),
    };
    let (value, stop) = eval_arg(ctx, target, locals, &msg.args[1]);
    Ok((name, value, stop))
}

// --- control flow (spec.md §1, §4.2) ---

fn install_control_flow(boot: &Bootstrap) {
    let false_obj = boot.false_obj.clone();
    let nil_obj = boot.nil_obj.clone();

    let if_fn: CFn = {
        let false_obj = false_obj.clone();
        let nil_obj = nil_obj.clone();
        Arc::new(move |ctx, target, locals, msg| {
            if msg.args.is_empty() {
                return arity_error(msg, target, "if(condition, then, [else])");
            }
            let (cond, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
            if stop.short_circuits() {
                return (cond, stop);
            }
            if is_truthy(&cond, &false_obj, &nil_obj) {
                match msg.args.get(1) {
                    Some(branch) => eval_arg(ctx, target, locals, branch),
                    None => (nil_obj.clone(), Stop::NoStop),
                }
            } else {
                match msg.args.get(2) {
                    Some(branch) => eval_arg(ctx, target, locals, branch),
                    None => (nil_obj.clone(), Stop::NoStop),
                }
            }
        })
    };
    install_cfn(boot, &boot.object_proto, "if", if_fn, None);

    let while_fn: CFn = {
        let false_obj = false_obj.clone();
        let nil_obj = nil_obj.clone();
        Arc::new(move |ctx, target, locals, msg| {
            if msg.args.len() < 2 {
                return arity_error(msg, target, "while(condition, body)");
            }
            let mut last = nil_obj.clone();
            loop {
                let (cond, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
                if stop.short_circuits() {
                    return (cond, stop);
                }
                if !is_truthy(&cond, &false_obj, &nil_obj) {
                    return (last, Stop::NoStop);
                }
                let (value, stop) = eval_arg(ctx, target, locals, &msg.args[1]);
                match stop {
                    Stop::NoStop | Stop::ContinueStop => last = value,
                    Stop::BreakStop => return (value, Stop::NoStop),
                    other => return (value, other),
                }
            }
        })
    };
    install_cfn(boot, &boot.object_proto, "while", while_fn, None);

    // `for(counterName, start, end, body)`: counterName is the
    // (unevaluated) literal identifier to bind each iteration's index
    // under, in `locals`.
    let for_fn: CFn = {
        let nil_obj = nil_obj.clone();
        Arc::new(move |ctx, target, locals, msg| {
            if msg.args.len() < 4 {
                return arity_error(msg, target, "for(counter, start, end, body)");
            }
            let counter_name = msg.args[0].symbol.text.clone();
            let (start_obj, stop) = eval_arg(ctx, target, locals, &msg.args[1]);
            if stop.short_circuits() {
                return (start_obj, stop);
            }
            let (end_obj, stop) = eval_arg(ctx, target, locals, &msg.args[2]);
            if stop.short_circuits() {
                return (end_obj, stop);
            }
            let start = match start_obj.payload() {
                Payload::Number(n) => n,
                other => return type_mismatch(msg, &start_obj, "Number", other.tag().name()),
            };
            let end = match end_obj.payload() {
                Payload::Number(n) => n,
                other => return type_mismatch(msg, &end_obj, "Number", other.tag().name()),
            };

            let mut i = start;
            let mut last = nil_obj.clone();
            while (start <= end && i <= end) || (start > end && i >= end) {
                locals.set_slot(counter_name.clone(), ObjectRef::new(Payload::Number(i)));
                let (value, stop) = eval_arg(ctx, target, locals, &msg.args[3]);
                match stop {
                    Stop::NoStop | Stop::ContinueStop => last = value,
                    Stop::BreakStop => return (value, Stop::NoStop),
                    other => return (value, other),
                }
                i += if start <= end { 1.0 } else { -1.0 };
                // guard against the loop's own check for an empty loop
                // (start == end means exactly one iteration, handled
                // above by `<=`/`>=`).
                if start == end {
                    break;
                }
            }
            (last, Stop::NoStop)
        })
    };
    install_cfn(boot, &boot.object_proto, "for", for_fn, None);

    let return_fn: CFn = {
        let nil_obj = nil_obj.clone();
        Arc::new(move |ctx, target, locals, msg| match msg.args.first() {
            Some(chain) => {
                let (value, stop) = eval_arg(ctx, target, locals, chain);
                if stop.short_circuits() {
                    (value, stop)
                } else {
                    (value, Stop::ReturnStop)
                }
            }
            None => (nil_obj.clone(), Stop::ReturnStop),
        })
    };
    install_cfn(boot, &boot.object_proto, "return", return_fn, None);

    let break_fn: CFn = {
        let nil_obj = nil_obj.clone();
        Arc::new(move |ctx, target, locals, msg| match msg.args.first() {
            Some(chain) => {
                let (value, stop) = eval_arg(ctx, target, locals, chain);
                if stop.short_circuits() {
                    (value, stop)
                } else {
                    (value, Stop::BreakStop)
                }
            }
            None => (nil_obj.clone(), Stop::BreakStop),
        })
    };
    install_cfn(boot, &boot.object_proto, "break", break_fn, None);

    let continue_fn: CFn = {
        let nil_obj = nil_obj.clone();
        Arc::new(move |_ctx, _target, _locals, _msg| (nil_obj.clone(), Stop::ContinueStop))
    };
    install_cfn(boot, &boot.object_proto, "continue", continue_fn, None);

    // `try(chain)`: catches only `ExceptionStop` (spec.md §7's
    // propagation policy), wrapping the caught exception as a value so
    // user code can inspect `kind`/`message` on it; every other stop
    // (return/break/continue/pause/exit) still propagates unconsumed.
    let try_fn: CFn = Arc::new(|ctx, target, locals, msg| {
        if msg.args.is_empty() {
            return arity_error(msg, target, "try(chain)");
        }
        let (value, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
        match stop {
            Stop::ExceptionStop(info) => (ObjectRef::new(Payload::Exception(info)), Stop::NoStop),
            other => (value, other),
        }
    });
    install_cfn(boot, &boot.object_proto, "try", try_fn, None);
}

// --- arithmetic (spec.md §6 default operator table) ---

fn install_arithmetic(boot: &Bootstrap) {
    let ops: &[(&str, fn(f64, f64) -> f64)] = &[
        ("+", |a, b| a + b),
        ("-", |a, b| a - b),
        ("*", |a, b| a * b),
        ("/", |a, b| a / b),
        ("%", |a, b| a % b),
        ("**", |a, b| a.powf(b)),
    ];
    for (name, op) in ops {
        install_cfn(boot, &boot.number_proto, name, number_binop(*op, boot.number_proto.clone()), Some(Tag::Number));
    }

    let bitwise: &[(&str, fn(i64, i64) -> i64)] = &[
        ("&", |a, b| a & b),
        ("|", |a, b| a | b),
        ("^", |a, b| a ^ b),
        ("<<", |a, b| a << (b & 63)),
        (">>", |a, b| a >> (b & 63)),
    ];
    for (name, op) in bitwise {
        install_cfn(boot, &boot.number_proto, name, number_bitop(*op, boot.number_proto.clone()), Some(Tag::Number));
    }

    // `..`: produces the inclusive list of integers between the
    // receiver and its argument (spec.md's default table places `..` at
    // precedence 12 but does not define its semantics; DESIGN.md records
    // "integer range as a List" as the resolved Open Question).
    let range_fn: CFn = {
        let list_proto = boot.list_proto.clone();
        let number_proto = boot.number_proto.clone();
        Arc::new(move |ctx, target, locals, msg| {
            let start = match target.payload() {
                Payload::Number(n) => n,
                other => return type_mismatch(msg, target, "Number", other.tag().name()),
            };
            if msg.args.is_empty() {
                return arity_error(msg, target, "..(end)");
            }
            let (end_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
            if stop.short_circuits() {
                return (end_obj, stop);
            }
            let end = match end_obj.payload() {
                Payload::Number(n) => n,
                other => return type_mismatch(msg, &end_obj, "Number", other.tag().name()),
            };
            let mut items = Vec::new();
            let mut i = start;
            while (start <= end && i <= end) || (start > end && i >= end) {
                items.push(ObjectRef::with_protos(Payload::Number(i), vec![number_proto.clone()]));
                if start == end {
                    break;
                }
                i += if start <= end { 1.0 } else { -1.0 };
            }
            (ObjectRef::with_protos(Payload::List(items), vec![list_proto.clone()]), Stop::NoStop)
        })
    };
    install_cfn(boot, &boot.number_proto, "..", range_fn, Some(Tag::Number));

    // Compound-assignment operators (`+=`, `-=`, ...) sit in the
    // precedence table (spec.md §6) but outside `assignOperators`, so
    // the shuffler never desugars them into a `setSlot` call — by the
    // time one of these methods runs, its receiver is already a plain
    // value, with no link back to the identifier that produced it. A
    // method can't mutate a slot it can't name, so these are installed
    // as plain (non-mutating) aliases of their base operator; DESIGN.md
    // records this as a resolved Open Question.
    let compound: &[(&str, fn(f64, f64) -> f64)] = &[
        ("+=", |a, b| a + b),
        ("-=", |a, b| a - b),
        ("*=", |a, b| a * b),
        ("/=", |a, b| a / b),
        ("%=", |a, b| a % b),
    ];
    for (name, op) in compound {
        install_cfn(boot, &boot.number_proto, name, number_binop(*op, boot.number_proto.clone()), Some(Tag::Number));
    }
    let compound_bitwise: &[(&str, fn(i64, i64) -> i64)] = &[
        ("&=", |a, b| a & b),
        ("|=", |a, b| a | b),
        ("^=", |a, b| a ^ b),
        ("<<=", |a, b| a << (b & 63)),
        (">>=", |a, b| a >> (b & 63)),
    ];
    for (name, op) in compound_bitwise {
        install_cfn(boot, &boot.number_proto, name, number_bitop(*op, boot.number_proto.clone()), Some(Tag::Number));
    }
}

fn number_binop(op: fn(f64, f64) -> f64, number_proto: ObjectRef) -> CFn {
    Arc::new(move |ctx, target, locals, msg| {
        let lhs = match target.payload() {
            Payload::Number(n) => n,
            other => return type_mismatch(msg, target, "Number", other.tag().name()),
        };
        if msg.args.is_empty() {
            return arity_error(msg, target, "op(rhs)");
        }
        let (rhs_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
        if stop.short_circuits() {
            return (rhs_obj, stop);
        }
        let rhs = match rhs_obj.payload() {
            Payload::Number(n) => n,
            other => return type_mismatch(msg, &rhs_obj, "Number", other.tag().name()),
        };
        (
            ObjectRef::with_protos(Payload::Number(op(lhs, rhs)), vec![number_proto.clone()]),
            Stop::NoStop,
        )
    })
}

fn number_bitop(op: fn(i64, i64) -> i64, number_proto: ObjectRef) -> CFn {
    Arc::new(move |ctx, target, locals, msg| {
        let lhs = match target.payload() {
            Payload::Number(n) => n,
            other => return type_mismatch(msg, target, "Number", other.tag().name()),
        };
        if msg.args.is_empty() {
            return arity_error(msg, target, "op(rhs)");
        }
        let (rhs_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
        if stop.short_circuits() {
            return (rhs_obj, stop);
        }
        let rhs = match rhs_obj.payload() {
            Payload::Number(n) => n,
            other => return type_mismatch(msg, &rhs_obj, "Number", other.tag().name()),
        };
        let result = op(lhs as i64, rhs as i64) as f64;
        (
            ObjectRef::with_protos(Payload::Number(result), vec![number_proto.clone()]),
            Stop::NoStop,
        )
    })
}

// --- comparisons (spec.md §6 default operator table) ---

fn install_comparisons(boot: &Bootstrap) {
    let cmps: &[(&str, fn(f64, f64) -> bool)] = &[
        ("<", |a, b| a < b),
        ("<=", |a, b| a <= b),
        (">", |a, b| a > b),
        (">=", |a, b| a >= b),
        ("==", |a, b| a == b),
        ("!=", |a, b| a != b),
    ];
    for (name, op) in cmps {
        install_cfn(
            boot,
            &boot.number_proto,
            name,
            number_cmp(*op, boot.true_obj.clone(), boot.false_obj.clone()),
            Some(Tag::Number),
        );
    }
}

fn number_cmp(op: fn(f64, f64) -> bool, true_obj: ObjectRef, false_obj: ObjectRef) -> CFn {
    Arc::new(move |ctx, target, locals, msg| {
        let lhs = match target.payload() {
            Payload::Number(n) => n,
            other => return type_mismatch(msg, target, "Number", other.tag().name()),
        };
        if msg.args.is_empty() {
            return arity_error(msg, target, "op(rhs)");
        }
        let (rhs_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
        if stop.short_circuits() {
            return (rhs_obj, stop);
        }
        let rhs = match rhs_obj.payload() {
            Payload::Number(n) => n,
            other => return type_mismatch(msg, &rhs_obj, "Number", other.tag().name()),
        };
        let result = if op(lhs, rhs) { &true_obj } else { &false_obj };
        (result.clone(), Stop::NoStop)
    })
}

// --- boolean logic (spec.md §6: `&&`/`and`, `||`/`or`) ---

fn install_boolean_logic(boot: &Bootstrap) {
    let and_fn: CFn = {
        let false_obj = boot.false_obj.clone();
        let nil_obj = boot.nil_obj.clone();
        Arc::new(move |ctx, target, locals, msg| {
            if !is_truthy(target, &false_obj, &nil_obj) {
                return (target.clone(), Stop::NoStop);
            }
            if msg.args.is_empty() {
                return arity_error(msg, target, "&&(rhs)");
            }
            eval_arg(ctx, target, locals, &msg.args[0])
        })
    };
    for name in ["&&", "and"] {
        install_cfn(boot, &boot.object_proto, name, and_fn.clone(), None);
    }

    let or_fn: CFn = {
        let false_obj = boot.false_obj.clone();
        let nil_obj = boot.nil_obj.clone();
        Arc::new(move |ctx, target, locals, msg| {
            if is_truthy(target, &false_obj, &nil_obj) {
                return (target.clone(), Stop::NoStop);
            }
            if msg.args.is_empty() {
                return arity_error(msg, target, "||(rhs)");
            }
            eval_arg(ctx, target, locals, &msg.args[0])
        })
    };
    for name in ["||", "or"] {
        install_cfn(boot, &boot.object_proto, name, or_fn.clone(), None);
    }
}

// --- concurrency (spec.md §4.4) ---

fn install_concurrency(boot: &Bootstrap, scheduler: Arc<Scheduler>, well_known: WellKnownLookup) {
    install_cfn(
        boot,
        &boot.object_proto,
        "futureSend",
        future_send_cfn(scheduler.clone(), well_known.clone(), boot.future_proto.clone()),
        None,
    );
    install_cfn(
        boot,
        &boot.object_proto,
        "asyncSend",
        async_send_cfn(
            scheduler.clone(),
            well_known.clone(),
            boot.nil_obj.clone(),
            boot.future_proto.clone(),
        ),
        None,
    );

    let wait_payload = future_wait_cfunction_payload(scheduler.clone());
    boot.future_proto.set_slot(
        "wait",
        ObjectRef::with_protos(Payload::CFunction(wait_payload), vec![boot.cfunction_proto.clone()]),
    );

    // `coroDoing(block)`: spawn a coroutine activating an
    // already-evaluated block with no arguments, returning its future
    // (spec.md §8's pseudo deadlock scenario: `coroDoing(b wait)`).
    let coro_doing_fn: CFn = {
        let scheduler = scheduler.clone();
        let well_known = well_known.clone();
        let future_proto = boot.future_proto.clone();
        Arc::new(move |ctx, target, locals, msg| {
            if msg.args.is_empty() {
                return arity_error(msg, target, "coroDoing(block)");
            }
            let (block_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
            if stop.short_circuits() {
                return (block_obj, stop);
            }
            if block_obj.tag() != Tag::Block {
                return type_mismatch(msg, &block_obj, "Block", block_obj.tag().name());
            }
            let Some(parent) = ctx.current_coroutine() else {
                let info = ExceptionInfo::new(ExceptionKind::ConventionViolation, "coroDoing requires a running coroutine")
                    .at(msg.location.clone());
                return (target.clone(), Stop::exception(info));
            };
            let sender = self_of(locals, target);
            let body = literal_call(block_obj);
            let future_obj = spawn_future(
                scheduler.clone(),
                well_known.clone(),
                parent,
                sender,
                target.clone(),
                body,
                vec![future_proto.clone()],
            );
            (future_obj, Stop::NoStop)
        })
    };
    install_cfn(boot, &boot.object_proto, "coroDoing", coro_doing_fn, None);

    // Scheduler diagnostics (SPEC_FULL.md §4: `coroCount`/
    // `awaitingCoros`/`yieldingCoros` given concrete signatures).
    let number_proto = boot.number_proto.clone();
    let coro_count_fn: CFn = {
        let scheduler = scheduler.clone();
        let number_proto = number_proto.clone();
        Arc::new(move |_ctx, _target, _locals, _msg| {
            (
                ObjectRef::with_protos(Payload::Number(scheduler.coro_count() as f64), vec![number_proto.clone()]),
                Stop::NoStop,
            )
        })
    };
    boot.scheduler_obj.set_slot(
        "coroCount",
        ObjectRef::with_protos(
            Payload::CFunction(CFunctionPayload {
                func: coro_count_fn,
                expected_target_tag: None,
            }),
            vec![boot.cfunction_proto.clone()],
        ),
    );

    let list_proto = boot.list_proto.clone();
    let awaiting_fn: CFn = {
        let scheduler = scheduler.clone();
        let list_proto = list_proto.clone();
        Arc::new(move |_ctx, _target, _locals, _msg| {
            let items = scheduler
                .awaiting_coros()
                .into_iter()
                .map(|id| ObjectRef::new(Payload::Coroutine(id)))
                .collect();
            (ObjectRef::with_protos(Payload::List(items), vec![list_proto.clone()]), Stop::NoStop)
        })
    };
    boot.scheduler_obj.set_slot(
        "awaitingCoros",
        ObjectRef::with_protos(
            Payload::CFunction(CFunctionPayload {
                func: awaiting_fn,
                expected_target_tag: None,
            }),
            vec![boot.cfunction_proto.clone()],
        ),
    );

    let yielding_fn: CFn = Arc::new(move |_ctx, _target, _locals, _msg| {
        let items = scheduler
            .yielding_coros()
            .into_iter()
            .map(|id| ObjectRef::new(Payload::Coroutine(id)))
            .collect();
        (ObjectRef::with_protos(Payload::List(items), vec![list_proto.clone()]), Stop::NoStop)
    });
    boot.scheduler_obj.set_slot(
        "yieldingCoros",
        ObjectRef::with_protos(
            Payload::CFunction(CFunctionPayload {
                func: yielding_fn,
                expected_target_tag: None,
            }),
            vec![boot.cfunction_proto.clone()],
        ),
    );
}

// --- exception protocol (spec.md §7, SPEC_FULL.md §4) ---

fn install_exception_protocol(boot: &Bootstrap) {
    let kind_fn: CFn = Arc::new(|_ctx, target, _locals, msg| match target.payload() {
        Payload::Exception(info) => (
            ObjectRef::new(Payload::Sequence(info.kind.to_string().into_bytes())),
            Stop::NoStop,
        ),
        other => type_mismatch(msg, target, "Exception", other.tag().name()),
    });
    install_cfn(boot, &boot.exception_proto, "kind", kind_fn, Some(Tag::Exception));

    let message_fn: CFn = Arc::new(|_ctx, target, _locals, msg| match target.payload() {
        Payload::Exception(info) => (
            ObjectRef::new(Payload::Sequence(info.message.clone().into_bytes())),
            Stop::NoStop,
        ),
        other => type_mismatch(msg, target, "Exception", other.tag().name()),
    });
    install_cfn(boot, &boot.exception_proto, "message", message_fn, Some(Tag::Exception));

    // `Exception raise(kind, message)`: sent to the `Exception` type
    // proto itself (not an instance), builds a `Custom`-kind exception
    // and raises it on the spot.
    let raise_fn: CFn = Arc::new(|ctx, target, locals, msg| {
        if msg.args.len() < 2 {
            return arity_error(msg, target, "raise(kind, message)");
        }
        let (kind_obj, stop) = eval_arg(ctx, target, locals, &msg.args[0]);
        if stop.short_circuits() {
            return (kind_obj, stop);
        }
        let kind = match kind_obj.payload() {
            Payload::Sequence(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            other => return type_mismatch(msg, &kind_obj, "Sequence", other.tag().name()),
        };
        let (message_obj, stop) = eval_arg(ctx, target, locals, &msg.args[1]);
        if stop.short_circuits() {
            return (message_obj, stop);
        }
        let message = match message_obj.payload() {
            Payload::Sequence(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            other => return type_mismatch(msg, &message_obj, "Sequence", other.tag().name()),
        };
        let info = ExceptionInfo::new(ExceptionKind::Custom(kind), message).at(msg.location.clone());
        (target.clone(), Stop::exception(info))
    });
    install_cfn(boot, &boot.exception_proto, "raise", raise_fn, None);
}

// --- Call introspection (spec.md §3, §4.4: "exposed to user code so
// methods can introspect their invocation") ---

fn call_accessor(get: fn(&wisp_core::object::CallPayload) -> ObjectRef) -> CFn {
    Arc::new(move |_ctx, target, _locals, msg| match target.payload() {
        Payload::Call(call) => (get(&call), Stop::NoStop),
        other => type_mismatch(msg, target, "Call", other.tag().name()),
    })
}

fn install_call_protocol(boot: &Bootstrap) {
    install_cfn(boot, &boot.call_proto, "sender", call_accessor(|c| c.sender.clone()), Some(Tag::Call));
    install_cfn(boot, &boot.call_proto, "target", call_accessor(|c| c.target.clone()), Some(Tag::Call));
    install_cfn(boot, &boot.call_proto, "activated", call_accessor(|c| c.activated.clone()), Some(Tag::Call));
    install_cfn(boot, &boot.call_proto, "locals", call_accessor(|c| c.locals.clone()), Some(Tag::Call));
    install_cfn(boot, &boot.call_proto, "slotContext", call_accessor(|c| c.slot_context.clone()), Some(Tag::Call));

    let message_fn: CFn = {
        let message_proto = boot.message_proto.clone();
        Arc::new(move |_ctx, target, _locals, msg| match target.payload() {
            Payload::Call(call) => (
                ObjectRef::with_protos(Payload::Message(call.message.clone()), vec![message_proto.clone()]),
                Stop::NoStop,
            ),
            other => type_mismatch(msg, target, "Call", other.tag().name()),
        })
    };
    install_cfn(boot, &boot.call_proto, "message", message_fn, Some(Tag::Call));

    // `Message name`: the one piece of introspection spec.md's glossary
    // actually names on the Message tag (its symbol).
    let name_fn: CFn = Arc::new(|_ctx, target, _locals, msg| match target.payload() {
        Payload::Message(inner) => (
            ObjectRef::new(Payload::Sequence(inner.symbol.text.clone().into_bytes())),
            Stop::NoStop,
        ),
        other => type_mismatch(msg, target, "Message", other.tag().name()),
    });
    install_cfn(boot, &boot.message_proto, "name", name_fn, Some(Tag::Message));
}
