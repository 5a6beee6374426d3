//! The embedding entry point (spec.md §6): [`Vm`] owns the bootstrap
//! object graph — `Lobby`, `Core`, `Protos`, `Addons` — and the
//! scheduler that backs every coroutine spawned against it.

use std::sync::Arc;

use tracing::{debug, info_span};
use wisp_core::error::VmError;
use wisp_core::object::{HostContext, ObjectRef, Payload};
use wisp_core::operator_table::OperatorTable;
use wisp_sched::{Coroutine, CoroutineHostContext, CoroutineState, Scheduler, WellKnownLookup};

use crate::config::VmConfig;
use crate::factories::Factories;
use crate::parser::Parser;

const LOBBY_SLOT: &str = "Lobby";
const CORE_SLOT: &str = "Core";
const PROTOS_SLOT: &str = "Protos";
const ADDONS_SLOT: &str = "Addons";

/// Every object the bootstrap wires up, handed to `stdlib::install` so it
/// can attach methods without reaching back through `Vm`'s private
/// fields. Kept internal to the crate; `Vm` is the only public surface.
pub(crate) struct Bootstrap {
    pub(crate) object_proto: ObjectRef,
    pub(crate) number_proto: ObjectRef,
    pub(crate) sequence_proto: ObjectRef,
    pub(crate) list_proto: ObjectRef,
    pub(crate) map_proto: ObjectRef,
    pub(crate) block_proto: ObjectRef,
    pub(crate) message_proto: ObjectRef,
    pub(crate) call_proto: ObjectRef,
    pub(crate) coroutine_proto: ObjectRef,
    pub(crate) scheduler_proto: ObjectRef,
    pub(crate) future_proto: ObjectRef,
    pub(crate) operator_table_proto: ObjectRef,
    pub(crate) cfunction_proto: ObjectRef,
    pub(crate) exception_proto: ObjectRef,
    pub(crate) true_obj: ObjectRef,
    pub(crate) false_obj: ObjectRef,
    pub(crate) nil_obj: ObjectRef,
    pub(crate) scheduler_obj: ObjectRef,
}

/// An embeddable interpreter instance (spec.md §6).
///
/// A `Vm` owns one bootstrap object graph and one [`Scheduler`]. Source
/// text reaches it only through [`Vm::do_string`]/[`Vm::do_reader`],
/// which parse (via a caller-supplied [`Parser`]), shuffle, and evaluate
/// against `Lobby`, exactly spec.md §6's pipeline.
pub struct Vm {
    lobby: ObjectRef,
    core: ObjectRef,
    protos: ObjectRef,
    addons: ObjectRef,
    scheduler: Arc<Scheduler>,
    operator_table_obj: ObjectRef,
    factories: Factories,
    config: VmConfig,
}

impl Vm {
    /// Build a fresh VM: the full `Lobby`/`Core`/`Protos`/`Addons`
    /// bootstrap (spec.md §6), a scheduler, and every stdlib method
    /// installed on the relevant `Core` protos.
    pub fn new(config: VmConfig) -> Self {
        let _span = info_span!("wisp_vm_bootstrap").entered();
        let object_proto = ObjectRef::new(Payload::Plain);
        let number_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let sequence_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let list_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let map_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let block_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let message_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let call_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let coroutine_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let scheduler_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let future_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let operator_table_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let cfunction_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let exception_proto = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);

        // Boolean/nil singletons: plain objects distinguished only by
        // identity (`ObjectRef::ptr_eq`), spec.md's truthiness table
        // being silent on a dedicated Boolean tag.
        let true_obj = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let false_obj = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        let nil_obj = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);

        let operator_table = config.operator_table.clone().unwrap_or_else(OperatorTable::default_table);
        let operator_table_obj = ObjectRef::with_protos(
            Payload::OperatorTable(operator_table),
            vec![operator_table_proto.clone()],
        );

        let scheduler = Arc::new(match config.scheduler_verbose_logging {
            Some(verbose) => Scheduler::with_verbose_logging(verbose),
            None => Scheduler::new(),
        });
        let scheduler_obj = ObjectRef::with_protos(Payload::Plain, vec![scheduler_proto.clone()]);

        let core = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        core.set_slot("Object", object_proto.clone());
        core.set_slot("Number", number_proto.clone());
        core.set_slot("Sequence", sequence_proto.clone());
        core.set_slot("List", list_proto.clone());
        core.set_slot("Map", map_proto.clone());
        core.set_slot("Block", block_proto.clone());
        core.set_slot("Message", message_proto.clone());
        core.set_slot("Call", call_proto.clone());
        core.set_slot("Coroutine", coroutine_proto.clone());
        core.set_slot("Scheduler", scheduler_obj.clone());
        core.set_slot("Future", future_proto.clone());
        core.set_slot("OperatorTable", operator_table_obj.clone());
        core.set_slot("CFunction", cfunction_proto.clone());
        core.set_slot("Exception", exception_proto.clone());
        core.set_slot("true", true_obj.clone());
        core.set_slot("false", false_obj.clone());
        core.set_slot("nil", nil_obj.clone());

        // `Protos`: a plain namespace object mirroring `Core`'s
        // children, for reflective lookup independent of `Core` itself
        // (SPEC_FULL.md §4).
        let protos = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);
        for name in [
            "Object", "Number", "Sequence", "List", "Map", "Block", "Message", "Call", "Coroutine", "Scheduler",
            "Future", "OperatorTable", "CFunction", "Exception",
        ] {
            if let Some(value) = core.own_slot(name) {
                protos.set_slot(name, value);
            }
        }

        let addons = ObjectRef::with_protos(Payload::Plain, vec![object_proto.clone()]);

        let lobby = ObjectRef::with_protos(Payload::Plain, vec![core.clone()]);
        lobby.set_slot(LOBBY_SLOT, lobby.clone());
        lobby.set_slot(CORE_SLOT, core.clone());
        lobby.set_slot(PROTOS_SLOT, protos.clone());
        lobby.set_slot(ADDONS_SLOT, addons.clone());

        let boot = Bootstrap {
            object_proto: object_proto.clone(),
            number_proto: number_proto.clone(),
            sequence_proto: sequence_proto.clone(),
            list_proto: list_proto.clone(),
            map_proto,
            block_proto,
            message_proto,
            call_proto,
            coroutine_proto,
            scheduler_proto,
            future_proto,
            operator_table_proto,
            cfunction_proto: cfunction_proto.clone(),
            exception_proto,
            true_obj,
            false_obj,
            nil_obj,
            scheduler_obj,
        };

        let well_known = well_known_lookup(lobby.clone(), core.clone(), protos.clone(), addons.clone());
        crate::stdlib::install(&boot, scheduler.clone(), well_known);

        let factories = Factories {
            object_proto,
            number_proto,
            sequence_proto,
            list_proto,
            cfunction_proto,
        };

        debug!("wisp vm bootstrap complete");
        Self {
            lobby,
            core,
            protos,
            addons,
            scheduler,
            operator_table_obj,
            factories,
            config,
        }
    }

    /// The `Lobby` object: the receiver every `do_string`/`do_reader`
    /// evaluation starts against (spec.md §6).
    pub fn lobby(&self) -> &ObjectRef {
        &self.lobby
    }

    /// The `Core` object holding every built-in prototype.
    pub fn core(&self) -> &ObjectRef {
        &self.core
    }

    /// The `Protos` reflective namespace.
    pub fn protos(&self) -> &ObjectRef {
        &self.protos
    }

    /// The (initially empty) `Addons` namespace, where an embedder
    /// installs additional host primitives after construction.
    pub fn addons(&self) -> &ObjectRef {
        &self.addons
    }

    /// This VM's host-primitive factories (spec.md §6).
    pub fn factories(&self) -> &Factories {
        &self.factories
    }

    /// This VM's construction-time configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Parse, shuffle, and evaluate `source` against `Lobby` (spec.md
    /// §6): the full `do_string` pipeline. Spawns a fresh root coroutine
    /// to run the evaluation on, so `futureSend`/`asyncSend`/`wait`
    /// called directly from top-level code have a registered parent to
    /// report dependencies against.
    pub fn do_string(&self, parser: &dyn Parser, source: &str) -> Result<ObjectRef, VmError> {
        let _span = info_span!("wisp_do_string", source_len = source.len()).entered();
        let raw = parser.parse(source)?;
        let operator_table = self.read_operator_table();
        let shuffled = wisp_eval::shuffle(raw, &operator_table)?;
        let chain = shuffled.freeze();

        let well_known = well_known_lookup(
            self.lobby.clone(),
            self.core.clone(),
            self.protos.clone(),
            self.addons.clone(),
        );
        let coroutine = Coroutine::spawn(None, self.scheduler.clone(), well_known);
        coroutine.set_state(CoroutineState::Running);
        let ctx = CoroutineHostContext::new(coroutine.clone());

        let (value, stop) = wisp_eval::send(&ctx, &self.lobby, &self.lobby, &self.lobby, &chain);
        coroutine.finish();

        match stop {
            wisp_core::stop::Stop::NoStop => Ok(value),
            wisp_core::stop::Stop::ExceptionStop(info) => {
                debug!(kind = %info.kind, "uncaught exception at top level");
                Err(VmError::Uncaught(info))
            }
            other => Err(VmError::UnexpectedStop(format!("{other:?}"))),
        }
    }

    /// Read all of `reader` as UTF-8 and evaluate it exactly as
    /// [`Vm::do_string`] would (spec.md §6's `do_reader`).
    pub fn do_reader(&self, parser: &dyn Parser, mut reader: impl std::io::Read) -> Result<ObjectRef, VmError> {
        let mut source = String::new();
        reader
            .read_to_string(&mut source)
            .map_err(|err| VmError::Other(Box::new(err)))?;
        self.do_string(parser, &source)
    }

    fn read_operator_table(&self) -> OperatorTable {
        match self.operator_table_obj.payload() {
            Payload::OperatorTable(table) => table,
            _ => OperatorTable::default_table(),
        }
    }
}

fn well_known_lookup(lobby: ObjectRef, core: ObjectRef, protos: ObjectRef, addons: ObjectRef) -> WellKnownLookup {
    Arc::new(move |name: &str| match name {
        LOBBY_SLOT => Some(lobby.clone()),
        CORE_SLOT => Some(core.clone()),
        PROTOS_SLOT => Some(protos.clone()),
        ADDONS_SLOT => Some(addons.clone()),
        _ => None,
    })
}
