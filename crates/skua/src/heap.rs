//! The value heap: slotted arenas for objects, environments, strings,
//! symbols, bigints and private names.
//!
//! Strings and bigints are interned, which makes their ids structurally
//! comparable; objects, symbols, environments and private names have
//! reference identity. Nothing is freed while the agent lives — every
//! aggregate implements [`Mark`], so a tracing collector can be layered on
//! top of [`Heap::reachable_objects`] without changing the object model.

use ahash::AHashMap;
use num_bigint::BigInt;

use crate::{
    environments::{EnvironmentRecord, PrivateEnvRecord},
    object::ObjectRecord,
    value::{
        BigIntId, EnvId, JsString, ObjectId, PrivateEnvId, PrivateNameId, PrivateNameRecord,
        StringId, SymbolId, SymbolRecord, Value,
    },
};

/// Pre-interned ids for strings the engine reaches for constantly.
macro_rules! statics {
    ($($field:ident => $text:literal),+ $(,)?) => {
        /// Ids of strings interned at heap construction.
        #[derive(Debug, Clone, Copy)]
        pub(crate) struct Statics {
            $(pub $field: StringId,)+
        }

        impl Statics {
            fn intern(strings: &mut StringArena) -> Self {
                Self {
                    $($field: strings.intern(JsString::from_str($text)),)+
                }
            }
        }
    };
}

statics! {
    empty => "",
    length => "length",
    prototype => "prototype",
    constructor => "constructor",
    name => "name",
    message => "message",
    stack => "stack",
    value => "value",
    done => "done",
    next => "next",
    return_ => "return",
    throw => "throw",
    then => "then",
    callee => "callee",
    caller => "caller",
    arguments => "arguments",
    default => "default",
    default_export => "*default*",
    namespace_export => "*namespace*",
    raw => "raw",
    undefined => "undefined",
    object_tag => "[object Object]",
    to_string => "toString",
    value_of => "valueOf",
}

/// Well-known symbols, created once per heap (they are shared across realms;
/// realms only differ in their intrinsic objects).
#[derive(Debug, Clone, Copy)]
pub(crate) struct WellKnownSymbols {
    pub iterator: SymbolId,
    pub async_iterator: SymbolId,
    pub to_primitive: SymbolId,
    pub to_string_tag: SymbolId,
    pub has_instance: SymbolId,
}

/// Interning arena for strings. Split out of [`Heap`] so the static-string
/// table can be built before the heap struct exists.
#[derive(Debug, Default)]
struct StringArena {
    strings: Vec<JsString>,
    table: AHashMap<JsString, StringId>,
}

impl StringArena {
    fn intern(&mut self, s: JsString) -> StringId {
        if let Some(&id) = self.table.get(&s) {
            return id;
        }
        let id = StringId::new(self.strings.len());
        self.strings.push(s.clone());
        self.table.insert(s, id);
        id
    }
}

#[derive(Debug)]
pub struct Heap {
    strings: StringArena,
    symbols: Vec<SymbolRecord>,
    bigints: Vec<BigInt>,
    bigint_table: AHashMap<BigInt, BigIntId>,
    private_names: Vec<PrivateNameRecord>,
    objects: Vec<ObjectRecord>,
    environments: Vec<EnvironmentRecord>,
    private_environments: Vec<PrivateEnvRecord>,
    pub(crate) statics: Statics,
    pub(crate) well_known: WellKnownSymbols,
}

impl Heap {
    pub(crate) fn new() -> Self {
        let mut strings = StringArena::default();
        let statics = Statics::intern(&mut strings);
        let mut symbols = Vec::new();
        let mut well_known_symbol = |description: &str| {
            let desc = strings.intern(JsString::from_str(description));
            let id = SymbolId::new(symbols.len());
            symbols.push(SymbolRecord { description: Some(desc) });
            id
        };
        let well_known = WellKnownSymbols {
            iterator: well_known_symbol("Symbol.iterator"),
            async_iterator: well_known_symbol("Symbol.asyncIterator"),
            to_primitive: well_known_symbol("Symbol.toPrimitive"),
            to_string_tag: well_known_symbol("Symbol.toStringTag"),
            has_instance: well_known_symbol("Symbol.hasInstance"),
        };
        Self {
            strings,
            symbols,
            bigints: Vec::new(),
            bigint_table: AHashMap::new(),
            private_names: Vec::new(),
            objects: Vec::new(),
            environments: Vec::new(),
            private_environments: Vec::new(),
            statics,
            well_known,
        }
    }

    // --- strings ---

    pub(crate) fn intern_string(&mut self, s: JsString) -> StringId {
        self.strings.intern(s)
    }

    pub(crate) fn intern_str(&mut self, s: &str) -> StringId {
        self.intern_string(JsString::from_str(s))
    }

    pub(crate) fn intern_units(&mut self, units: Vec<u16>) -> StringId {
        self.intern_string(JsString::from_units(units))
    }

    pub(crate) fn string(&self, id: StringId) -> &JsString {
        &self.strings.strings[id.index()]
    }

    // --- symbols ---

    pub(crate) fn alloc_symbol(&mut self, description: Option<StringId>) -> SymbolId {
        let id = SymbolId::new(self.symbols.len());
        self.symbols.push(SymbolRecord { description });
        id
    }

    pub(crate) fn symbol(&self, id: SymbolId) -> &SymbolRecord {
        &self.symbols[id.index()]
    }

    // --- bigints ---

    pub(crate) fn intern_bigint(&mut self, value: BigInt) -> BigIntId {
        if let Some(&id) = self.bigint_table.get(&value) {
            return id;
        }
        let id = BigIntId::new(self.bigints.len());
        self.bigints.push(value.clone());
        self.bigint_table.insert(value, id);
        id
    }

    pub(crate) fn bigint(&self, id: BigIntId) -> &BigInt {
        &self.bigints[id.index()]
    }

    // --- private names ---

    pub(crate) fn alloc_private_name(&mut self, description: &str) -> PrivateNameId {
        let id = PrivateNameId::new(self.private_names.len());
        self.private_names.push(PrivateNameRecord {
            description: description.into(),
        });
        id
    }

    pub(crate) fn private_name(&self, id: PrivateNameId) -> &PrivateNameRecord {
        &self.private_names[id.index()]
    }

    // --- objects ---

    pub(crate) fn alloc_object(&mut self, record: ObjectRecord) -> ObjectId {
        let id = ObjectId::new(self.objects.len());
        self.objects.push(record);
        id
    }

    pub(crate) fn object(&self, id: ObjectId) -> &ObjectRecord {
        &self.objects[id.index()]
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut ObjectRecord {
        &mut self.objects[id.index()]
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn env_count(&self) -> usize {
        self.environments.len()
    }

    // --- environments ---

    pub(crate) fn alloc_env(&mut self, record: EnvironmentRecord) -> EnvId {
        let id = EnvId::new(self.environments.len());
        self.environments.push(record);
        id
    }

    pub(crate) fn env(&self, id: EnvId) -> &EnvironmentRecord {
        &self.environments[id.index()]
    }

    pub(crate) fn env_mut(&mut self, id: EnvId) -> &mut EnvironmentRecord {
        &mut self.environments[id.index()]
    }

    pub(crate) fn alloc_private_env(&mut self, record: PrivateEnvRecord) -> PrivateEnvId {
        let id = PrivateEnvId::new(self.private_environments.len());
        self.private_environments.push(record);
        id
    }

    pub(crate) fn private_env(&self, id: PrivateEnvId) -> &PrivateEnvRecord {
        &self.private_environments[id.index()]
    }

    pub(crate) fn private_env_mut(&mut self, id: PrivateEnvId) -> &mut PrivateEnvRecord {
        &mut self.private_environments[id.index()]
    }

    /// Traces the object graph from `roots` and returns the number of
    /// reachable objects. This is the traversal a tracing collector would
    /// run; the engine itself only uses it for heap accounting.
    pub(crate) fn reachable_objects(&self, roots: impl IntoIterator<Item = Value>) -> usize {
        let mut queue = MarkQueue::new(self.objects.len(), self.environments.len());
        for root in roots {
            queue.push_value(root);
        }
        self.drain_marks(&mut queue)
    }

    pub(crate) fn drain_marks(&self, queue: &mut MarkQueue) -> usize {
        let mut reachable = 0;
        loop {
            if let Some(id) = queue.objects.pop() {
                reachable += 1;
                self.object(id).mark(queue);
                continue;
            }
            if let Some(id) = queue.envs.pop() {
                self.env(id).mark(queue);
                continue;
            }
            break;
        }
        reachable
    }
}

/// Work queue for a mark traversal over objects and environments. Strings,
/// symbols and bigints are interned leaves and need no traversal.
#[derive(Debug)]
pub(crate) struct MarkQueue {
    objects: Vec<ObjectId>,
    envs: Vec<EnvId>,
    seen_objects: Vec<bool>,
    seen_envs: Vec<bool>,
}

impl MarkQueue {
    pub fn new(object_count: usize, env_count: usize) -> Self {
        Self {
            objects: Vec::new(),
            envs: Vec::new(),
            seen_objects: vec![false; object_count],
            seen_envs: vec![false; env_count],
        }
    }

    pub fn push_object(&mut self, id: ObjectId) {
        if let Some(seen) = self.seen_objects.get_mut(id.index())
            && !*seen
        {
            *seen = true;
            self.objects.push(id);
        }
    }

    pub fn push_env(&mut self, id: EnvId) {
        if let Some(seen) = self.seen_envs.get_mut(id.index())
            && !*seen
        {
            *seen = true;
            self.envs.push(id);
        }
    }

    pub fn push_value(&mut self, value: Value) {
        if let Value::Object(id) = value {
            self.push_object(id);
        }
    }
}

/// Implemented by every aggregate a collector would need to traverse.
pub(crate) trait Mark {
    fn mark(&self, queue: &mut MarkQueue);
}

impl Mark for Value {
    fn mark(&self, queue: &mut MarkQueue) {
        queue.push_value(*self);
    }
}

impl<T: Mark> Mark for Option<T> {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(inner) = self {
            inner.mark(queue);
        }
    }
}

impl<T: Mark> Mark for Vec<T> {
    fn mark(&self, queue: &mut MarkQueue) {
        for item in self {
            item.mark(queue);
        }
    }
}
