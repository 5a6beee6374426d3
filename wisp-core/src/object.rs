//! The object graph and activation protocol (spec.md §3, §4.1).

use crate::error::ExceptionInfo;
use crate::id::CoroutineId;
use crate::message::MessageRef;
use crate::operator_table::OperatorTable;
use crate::stop::{RemoteStop, Stop};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

/// The discriminator that drives activation and cloning behavior for an
/// object's primitive payload (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// No payload: an ordinary slot-bearing object.
    Plain,
    /// A 64-bit float.
    Number,
    /// A mutable byte sequence.
    Sequence,
    /// An ordered, mutable list of object references.
    List,
    /// A key → object mapping.
    Map,
    /// A compiled method or lexical block.
    Block,
    /// A message-tree node, reflected as a user-visible object.
    Message,
    /// An activation record.
    Call,
    /// A coroutine handle.
    Coroutine,
    /// The VM-wide scheduler singleton.
    Scheduler,
    /// A single-assignment future.
    Future,
    /// The operator precedence/assignment table.
    OperatorTable,
    /// A host-provided primitive function.
    CFunction,
    /// An exception value (spec.md §7 / SPEC_FULL.md §4: the concrete
    /// shape `try`/`catch`-style user code and the top-level handler
    /// introspect).
    Exception,
}

impl Tag {
    /// The name used in error messages and `type` slots.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Plain => "Object",
            Tag::Number => "Number",
            Tag::Sequence => "Sequence",
            Tag::List => "List",
            Tag::Map => "Map",
            Tag::Block => "Block",
            Tag::Message => "Message",
            Tag::Call => "Call",
            Tag::Coroutine => "Coroutine",
            Tag::Scheduler => "Scheduler",
            Tag::Future => "Future",
            Tag::OperatorTable => "OperatorTable",
            Tag::CFunction => "CFunction",
            Tag::Exception => "Exception",
        }
    }

    /// Whether activating an object with this tag runs code, rather than
    /// returning the object itself unchanged (spec.md §4.1).
    pub fn is_activatable(self) -> bool {
        matches!(self, Tag::Block | Tag::CFunction | Tag::Future)
    }
}

/// Host-provided primitive: invoked with `(ctx, target, locals, msg)` and
/// returning the activation's `(result, control)` pair (spec.md §4.1).
///
/// `ctx` is a trait object rather than a concrete VM type so that
/// `wisp-core` never needs to depend on `wisp-sched` or `wisp`; richer
/// contexts (the scheduler-aware one `wisp-sched` CFunctions need) are
/// reached by downcasting `ctx.as_any()`, mirroring the type-erasure
/// pattern this codebase otherwise uses for dyn-safe async hooks.
pub type CFn = Arc<
    dyn Fn(&dyn HostContext, &ObjectRef, &ObjectRef, &MessageRef) -> (ObjectRef, Stop)
        + Send
        + Sync,
>;

/// A host-provided primitive function plus the target tag it expects, if
/// any (spec.md §6: `new_cfunction(function, optional_expected_tag)`).
#[derive(Clone)]
pub struct CFunctionPayload {
    /// The function itself.
    pub func: CFn,
    /// If set, the tag `target` must carry; used to raise a clean
    /// `type-mismatch` instead of a confusing downstream failure.
    pub expected_target_tag: Option<Tag>,
}

impl fmt::Debug for CFunctionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CFunctionPayload")
            .field("expected_target_tag", &self.expected_target_tag)
            .finish_non_exhaustive()
    }
}

/// What the evaluator and any `CFunction` can reach of the running VM
/// without `wisp-core` depending on the crates that implement it.
pub trait HostContext: Any + Send + Sync {
    /// The coroutine currently executing, if evaluation has started.
    fn current_coroutine(&self) -> Option<CoroutineId>;

    /// Non-blocking poll of the current coroutine's control inbox
    /// (spec.md §4.4): `Some` if a `RemoteStop` is waiting.
    fn poll_inbox(&self) -> Option<RemoteStop>;

    /// Cooperatively yield the current coroutine's execution thread.
    fn yield_now(&self);

    /// One of the VM's well-known objects (`Lobby`, `Core`, `Protos`,
    /// `Addons`), by name.
    fn well_known(&self, name: &str) -> Option<ObjectRef>;

    /// Type-erased self, for downcasting to a richer context (e.g.
    /// `wisp-sched`'s scheduler-aware context) from a `CFunction` body.
    fn as_any(&self) -> &dyn Any;
}

/// A compiled method or lexical block (spec.md §3).
#[derive(Debug, Clone)]
pub struct BlockPayload {
    /// The compiled body.
    pub body: MessageRef,
    /// Parameter names, bound to `msg.args` on activation.
    pub params: Vec<String>,
    /// `Some(receiver)` for a lexical block (captured at definition time);
    /// `None` for a method, which instead uses the activation's `target`.
    pub scope: Option<ObjectRef>,
    /// Whether activating this object runs its body.
    pub activatable: bool,
}

impl BlockPayload {
    /// Whether this payload represents a method (no captured scope) as
    /// opposed to a lexical block.
    pub fn is_method(&self) -> bool {
        self.scope.is_none()
    }
}

/// An activation record, exposed to user code as a `Call` object
/// (spec.md §3, §4.4).
#[derive(Debug, Clone)]
pub struct CallPayload {
    /// Who sent the message that caused this activation.
    pub sender: ObjectRef,
    /// The receiver of the message.
    pub target: ObjectRef,
    /// The method/block object that was activated.
    pub activated: ObjectRef,
    /// The message that caused this activation.
    pub message: MessageRef,
    /// This activation's locals object.
    pub locals: ObjectRef,
    /// The proto on which the activated slot was actually found. Kept
    /// independent of `sender` (spec.md §4.4 / Design Notes) so
    /// `resend`-style constructs can find the next proto up without
    /// knowing who sent the original message.
    pub slot_context: ObjectRef,
}

/// The single-assignment state of a [`FutureCell`] (spec.md §4.5).
#[derive(Debug, Clone)]
pub enum FutureSlot {
    /// Not yet resolved; activation blocks.
    Empty,
    /// Resolved to a value.
    Value(ObjectRef),
    /// Resolved to an exception.
    Exception(ExceptionInfo),
}

/// A single-assignment placeholder whose activation waits then delegates
/// (spec.md §3, §4.4). Wrapped in `Arc` so cloning a future object shares
/// the same pending computation, matching how `Block`/`Message` payloads
/// clone by reference.
#[derive(Debug)]
pub struct FutureCell {
    /// The coroutine that will fill this future's slot.
    pub coroutine: CoroutineId,
    /// The slot itself.
    pub slot: Mutex<FutureSlot>,
}

/// Shared handle to a future's state.
pub type FutureHandle = Arc<FutureCell>;

impl FutureCell {
    /// A fresh, unresolved future owned by `coroutine`.
    pub fn new(coroutine: CoroutineId) -> FutureHandle {
        Arc::new(FutureCell {
            coroutine,
            slot: Mutex::new(FutureSlot::Empty),
        })
    }

    /// Whether the slot has been resolved (to a value or an exception).
    pub fn is_resolved(&self) -> bool {
        !matches!(
            *self.slot.lock().expect("future mutex poisoned"),
            FutureSlot::Empty
        )
    }
}

/// An object's primitive payload (spec.md §3). `Plain` objects (and any
/// tag not listed as activatable) return themselves unchanged on
/// activation.
#[derive(Clone)]
pub enum Payload {
    /// No payload.
    Plain,
    /// A 64-bit float.
    Number(f64),
    /// A mutable byte sequence.
    Sequence(Vec<u8>),
    /// An ordered list of references.
    List(Vec<ObjectRef>),
    /// A key → object mapping.
    Map(HashMap<String, ObjectRef>),
    /// A compiled method or block.
    Block(BlockPayload),
    /// A message-tree node reflected as an object.
    Message(MessageRef),
    /// An activation record.
    Call(CallPayload),
    /// A coroutine handle.
    Coroutine(CoroutineId),
    /// The scheduler singleton marker; operational access goes through
    /// [`HostContext`], not through payload data.
    Scheduler,
    /// A single-assignment future.
    Future(FutureHandle),
    /// The operator precedence/assignment table.
    OperatorTable(OperatorTable),
    /// A host-provided primitive function.
    CFunction(CFunctionPayload),
    /// An exception value, introspectable by `try`/`catch`-style user code
    /// (SPEC_FULL.md §4).
    Exception(ExceptionInfo),
}

impl Payload {
    /// The tag this payload corresponds to.
    pub fn tag(&self) -> Tag {
        match self {
            Payload::Plain => Tag::Plain,
            Payload::Number(_) => Tag::Number,
            Payload::Sequence(_) => Tag::Sequence,
            Payload::List(_) => Tag::List,
            Payload::Map(_) => Tag::Map,
            Payload::Block(_) => Tag::Block,
            Payload::Message(_) => Tag::Message,
            Payload::Call(_) => Tag::Call,
            Payload::Coroutine(_) => Tag::Coroutine,
            Payload::Scheduler => Tag::Scheduler,
            Payload::Future(_) => Tag::Future,
            Payload::OperatorTable(_) => Tag::OperatorTable,
            Payload::CFunction(_) => Tag::CFunction,
            Payload::Exception(_) => Tag::Exception,
        }
    }

    /// Tag-specific clone (spec.md §4.1 `clone`): numbers/sequences/
    /// lists/maps copy their data; everything else (blocks, messages,
    /// calls, coroutines, futures, the operator table, CFunctions) shares
    /// by reference, since those payloads are either cheap handles or
    /// conceptually singletons a clone shouldn't fork.
    pub fn clone_payload(&self) -> Payload {
        self.clone()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Plain => write!(f, "Plain"),
            Payload::Number(n) => write!(f, "Number({n})"),
            Payload::Sequence(b) => write!(f, "Sequence({} bytes)", b.len()),
            Payload::List(items) => write!(f, "List({} items)", items.len()),
            Payload::Map(m) => write!(f, "Map({} entries)", m.len()),
            Payload::Block(b) => write!(f, "Block({:?})", b),
            Payload::Message(m) => write!(f, "Message({:?})", m.symbol),
            Payload::Call(_) => write!(f, "Call(..)"),
            Payload::Coroutine(id) => write!(f, "Coroutine({id})"),
            Payload::Scheduler => write!(f, "Scheduler"),
            Payload::Future(_) => write!(f, "Future(..)"),
            Payload::OperatorTable(_) => write!(f, "OperatorTable(..)"),
            Payload::CFunction(_) => write!(f, "CFunction(..)"),
            Payload::Exception(info) => write!(f, "Exception({})", info.kind),
        }
    }
}

struct ObjectInner {
    slots: HashMap<String, ObjectRef>,
    protos: Vec<ObjectRef>,
    payload: Payload,
}

/// The universal entity (spec.md §3): a slot table, an ordered prototype
/// list, an optional tagged primitive payload, and a mutex guarding all
/// three.
struct Object {
    inner: Mutex<ObjectInner>,
}

/// Shared handle to an [`Object`]. A thin `Arc` newtype: object identity
/// is `Arc` pointer identity, which both `get_slot`'s visited-set dedup
/// and the `O ∈ protos(O)` self-cycle check rely on.
#[derive(Clone)]
pub struct ObjectRef(Arc<Object>);

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.inner.lock().expect("object mutex poisoned");
        write!(f, "ObjectRef({} @ {:#x})", inner.payload.tag().name(), self.addr())
    }
}

impl ObjectRef {
    /// Create a new object with the given payload, no protos, and an
    /// empty slot table.
    pub fn new(payload: Payload) -> Self {
        ObjectRef(Arc::new(Object {
            inner: Mutex::new(ObjectInner {
                slots: HashMap::new(),
                protos: Vec::new(),
                payload,
            }),
        }))
    }

    /// Create a new object with the given payload and proto list.
    pub fn with_protos(payload: Payload, protos: Vec<ObjectRef>) -> Self {
        ObjectRef(Arc::new(Object {
            inner: Mutex::new(ObjectInner {
                slots: HashMap::new(),
                protos,
                payload,
            }),
        }))
    }

    /// Raw pointer identity, used for dedup sets and equality.
    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Whether two handles refer to the same underlying object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This object's tag.
    pub fn tag(&self) -> Tag {
        self.0.inner.lock().expect("object mutex poisoned").payload.tag()
    }

    /// A clone of this object's payload, without taking a slot-table copy.
    pub fn payload(&self) -> Payload {
        self.0
            .inner
            .lock()
            .expect("object mutex poisoned")
            .payload
            .clone_payload()
    }

    /// Run `f` with exclusive access to this object's payload.
    pub fn with_payload<R>(&self, f: impl FnOnce(&Payload) -> R) -> R {
        let inner = self.0.inner.lock().expect("object mutex poisoned");
        f(&inner.payload)
    }

    /// Run `f` with exclusive mutable access to this object's payload.
    pub fn with_payload_mut<R>(&self, f: impl FnOnce(&mut Payload) -> R) -> R {
        let mut inner = self.0.inner.lock().expect("object mutex poisoned");
        f(&mut inner.payload)
    }

    /// A snapshot of this object's own proto list (not a proto walk).
    pub fn protos(&self) -> Vec<ObjectRef> {
        self.0.inner.lock().expect("object mutex poisoned").protos.clone()
    }

    /// Append `proto` to this object's proto list. Rejects an immediate
    /// self-cycle (`O ∈ protos(O)`, spec.md §3); cycles through
    /// intermediaries are the caller's business and are handled by
    /// `get_slot`'s dedup, not prevented here.
    pub fn add_proto(&self, proto: ObjectRef) -> Result<(), SelfCycleError> {
        if self.ptr_eq(&proto) {
            return Err(SelfCycleError);
        }
        self.0.inner.lock().expect("object mutex poisoned").protos.push(proto);
        Ok(())
    }

    /// Read a slot from this object's own table (no proto walk).
    pub fn own_slot(&self, name: &str) -> Option<ObjectRef> {
        self.0
            .inner
            .lock()
            .expect("object mutex poisoned")
            .slots
            .get(name)
            .cloned()
    }

    /// Write into this object's own slot table (spec.md §4.1 `set_slot`:
    /// never a proto's).
    pub fn set_slot(&self, name: impl Into<String>, value: ObjectRef) {
        self.0
            .inner
            .lock()
            .expect("object mutex poisoned")
            .slots
            .insert(name.into(), value);
    }

    /// Delete a slot from this object's own table.
    pub fn remove_slot(&self, name: &str) -> Option<ObjectRef> {
        self.0.inner.lock().expect("object mutex poisoned").slots.remove(name)
    }

    /// All slot names currently on this object's own table. Insertion
    /// order is not observable (spec.md §3); callers must not rely on the
    /// order returned here beyond it being a stable snapshot.
    pub fn own_slot_names(&self) -> Vec<String> {
        self.0
            .inner
            .lock()
            .expect("object mutex poisoned")
            .slots
            .keys()
            .cloned()
            .collect()
    }

    /// Depth-first, left-to-right slot lookup across the prototype graph
    /// (spec.md §4.1), deduping visited objects so cyclic proto graphs
    /// terminate. Returns the slot's value and the object it was found
    /// on; both `None` if no proto carries `name`.
    pub fn get_slot(&self, name: &str) -> (Option<ObjectRef>, Option<ObjectRef>) {
        let mut visited = HashSet::new();
        get_slot_inner(self, name, &mut visited)
    }

    /// Tag-specific clone (spec.md §4.1): a fresh object with an empty
    /// slot table, `protos = [self]`, and a tag-specific copy of the
    /// payload.
    pub fn clone_object(&self) -> ObjectRef {
        ObjectRef::with_protos(self.payload(), vec![self.clone()])
    }

    /// Depth-first, left-to-right slot lookup across this object's own
    /// proto list, skipping `skip`'s own slot table (but still walking
    /// through *its* protos) — the basis for `resend`-style super dispatch
    /// (spec.md §4.4 Design Notes: `Call.slotContext` lets user code
    /// "locate the right starting point"). Unlike [`get_slot`], the walk
    /// never examines `self`'s own slot table either; it starts one level
    /// up, at `self`'s protos, so the slot currently being resent from is
    /// never the one it finds again.
    pub fn get_slot_after(&self, skip: &ObjectRef, name: &str) -> (Option<ObjectRef>, Option<ObjectRef>) {
        let mut visited = HashSet::new();
        visited.insert(self.addr());
        for proto in self.protos() {
            let (value, ctx) = get_slot_skip_inner(&proto, skip, name, &mut visited);
            if value.is_some() {
                return (value, ctx);
            }
        }
        (None, None)
    }
}

/// `O ∈ protos(O)` is forbidden (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfCycleError;

impl fmt::Display for SelfCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object cannot be its own prototype")
    }
}

impl std::error::Error for SelfCycleError {}

fn get_slot_inner(
    o: &ObjectRef,
    name: &str,
    visited: &mut HashSet<usize>,
) -> (Option<ObjectRef>, Option<ObjectRef>) {
    if !visited.insert(o.addr()) {
        return (None, None);
    }

    let (found, protos) = {
        let inner = o.0.inner.lock().expect("object mutex poisoned");
        (inner.slots.get(name).cloned(), inner.protos.clone())
    };
    if let Some(value) = found {
        return (Some(value), Some(o.clone()));
    }

    for proto in &protos {
        let (value, ctx) = get_slot_inner(proto, name, visited);
        if value.is_some() {
            return (value, ctx);
        }
    }

    (None, None)
}

/// Like `get_slot_inner`, but `skip` itself never matches on its own slot
/// table (though its protos are still searched) — see `get_slot_after`.
fn get_slot_skip_inner(
    o: &ObjectRef,
    skip: &ObjectRef,
    name: &str,
    visited: &mut HashSet<usize>,
) -> (Option<ObjectRef>, Option<ObjectRef>) {
    if !visited.insert(o.addr()) {
        return (None, None);
    }

    let (found, protos) = {
        let inner = o.0.inner.lock().expect("object mutex poisoned");
        (inner.slots.get(name).cloned(), inner.protos.clone())
    };
    if !o.ptr_eq(skip) {
        if let Some(value) = found {
            return (Some(value), Some(o.clone()));
        }
    }

    for proto in &protos {
        let (value, ctx) = get_slot_skip_inner(proto, skip, name, visited);
        if value.is_some() {
            return (value, ctx);
        }
    }

    (None, None)
}
