//! Host primitive factories (spec.md §6): `new_number`, `new_string`,
//! `new_list`, `new_object_with`, `new_cfunction`. Each mints a fresh
//! object wired to the right `Core` prototype so user-visible arithmetic,
//! comparison, and cloning methods resolve the moment the object exists.

use wisp_core::object::{CFn, CFunctionPayload, ObjectRef, Payload, Tag};

/// The `Core` prototypes a freshly minted primitive object needs to know
/// about. Built once at [`crate::Vm`] construction and cloned cheaply
/// (every field is an `ObjectRef`, itself an `Arc` newtype) into anything
/// that needs to mint objects afterward.
#[derive(Clone)]
pub struct Factories {
    pub(crate) object_proto: ObjectRef,
    pub(crate) number_proto: ObjectRef,
    pub(crate) sequence_proto: ObjectRef,
    pub(crate) list_proto: ObjectRef,
    pub(crate) cfunction_proto: ObjectRef,
}

impl Factories {
    /// `new_number(f64)` (spec.md §6): a number whose proto is `Core
    /// Number`.
    pub fn new_number(&self, value: f64) -> ObjectRef {
        ObjectRef::with_protos(Payload::Number(value), vec![self.number_proto.clone()])
    }

    /// `new_string(&str)` (spec.md §6): a byte-sequence object (spec.md
    /// §3's `Sequence` payload backs both strings and raw byte buffers)
    /// whose proto is `Core Sequence`.
    pub fn new_string(&self, value: &str) -> ObjectRef {
        ObjectRef::with_protos(
            Payload::Sequence(value.as_bytes().to_vec()),
            vec![self.sequence_proto.clone()],
        )
    }

    /// `new_list(&[Object])` (spec.md §6): a list whose proto is `Core
    /// List`.
    pub fn new_list(&self, items: &[ObjectRef]) -> ObjectRef {
        ObjectRef::with_protos(Payload::List(items.to_vec()), vec![self.list_proto.clone()])
    }

    /// `new_object_with(slots)` (spec.md §6): a plain object, proto
    /// `Core Object`, with the given slots pre-populated.
    pub fn new_object_with(&self, slots: impl IntoIterator<Item = (String, ObjectRef)>) -> ObjectRef {
        let obj = ObjectRef::with_protos(Payload::Plain, vec![self.object_proto.clone()]);
        for (name, value) in slots {
            obj.set_slot(name, value);
        }
        obj
    }

    /// `new_cfunction(function, optional_expected_tag)` (spec.md §6): a
    /// host-provided primitive, proto `Core CFunction`.
    pub fn new_cfunction(&self, func: CFn, expected_target_tag: Option<Tag>) -> ObjectRef {
        ObjectRef::with_protos(
            Payload::CFunction(CFunctionPayload {
                func,
                expected_target_tag,
            }),
            vec![self.cfunction_proto.clone()],
        )
    }
}
