//! Realms: the (intrinsics, global object, global environment) triple.

use ahash::AHashMap;

use crate::{
    heap::{Mark, MarkQueue},
    intrinsics::error::ErrorKind,
    value::{EnvId, ObjectId},
};

/// Identity of a realm within its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RealmId(u32);

impl RealmId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("realm index exceeds u32"))
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Constructor/prototype pair for one error kind.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErrorIntrinsic {
    pub constructor: ObjectId,
    pub prototype: ObjectId,
}

/// Constructor/prototype pair for one typed-array element type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypedArrayIntrinsic {
    pub constructor: ObjectId,
    pub prototype: ObjectId,
}

/// The realm's well-known objects. The named fields are the ones the engine
/// reaches for directly; `by_name` is the full `%X%` registry, filled during
/// bootstrap in dependency order.
#[derive(Debug)]
pub(crate) struct Intrinsics {
    pub object_prototype: ObjectId,
    pub object: ObjectId,
    pub function_prototype: ObjectId,
    pub function: ObjectId,
    /// The frozen thrower reused for `arguments.callee` on unmapped argument
    /// objects and `caller` on strict functions.
    pub throw_type_error: ObjectId,
    pub array: ObjectId,
    pub array_prototype: ObjectId,
    /// `%Array.prototype.values%`, shared by arguments objects.
    pub array_values: ObjectId,
    pub boolean_prototype: ObjectId,
    pub number_prototype: ObjectId,
    pub string_prototype: ObjectId,
    pub symbol: ObjectId,
    pub symbol_prototype: ObjectId,
    pub bigint_prototype: ObjectId,
    pub errors: [ErrorIntrinsic; ErrorKind::COUNT],
    pub iterator_prototype: ObjectId,
    pub async_iterator_prototype: ObjectId,
    pub array_iterator_prototype: ObjectId,
    pub generator_prototype: ObjectId,
    pub async_generator_prototype: ObjectId,
    pub promise: ObjectId,
    pub promise_prototype: ObjectId,
    pub array_buffer: ObjectId,
    pub array_buffer_prototype: ObjectId,
    pub shared_array_buffer: ObjectId,
    pub shared_array_buffer_prototype: ObjectId,
    pub data_view: ObjectId,
    pub data_view_prototype: ObjectId,
    pub typed_array_prototype: ObjectId,
    pub typed_arrays: [TypedArrayIntrinsic; crate::buffer::ElementType::COUNT],
    pub finalization_registry: ObjectId,
    pub finalization_registry_prototype: ObjectId,
    /// Canonical percent-delimited names, e.g. `%Object.prototype%`.
    pub by_name: AHashMap<Box<str>, ObjectId>,
}

impl Intrinsics {
    /// Looks up an intrinsic by its canonical `%X%` name.
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.by_name.get(name).copied()
    }

    pub fn error(&self, kind: ErrorKind) -> ErrorIntrinsic {
        self.errors[kind as usize]
    }
}

impl Mark for Intrinsics {
    fn mark(&self, queue: &mut MarkQueue) {
        for &id in self.by_name.values() {
            queue.push_object(id);
        }
        // The named fields are all registered in by_name during bootstrap,
        // so the registry walk covers them.
    }
}

#[derive(Debug)]
pub(crate) struct Realm {
    pub intrinsics: Intrinsics,
    pub global_object: ObjectId,
    pub global_env: EnvId,
}

impl Mark for Realm {
    fn mark(&self, queue: &mut MarkQueue) {
        self.intrinsics.mark(queue);
        queue.push_object(self.global_object);
        queue.push_env(self.global_env);
    }
}
