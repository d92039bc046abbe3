//! Object records: prototype link, extensibility, the insertion-ordered
//! property table, private elements, and the per-kind data payload that
//! selects which internal-method suite an object dispatches to.

use indexmap::IndexMap;

use crate::{
    buffer::{ArrayBufferData, DataViewData},
    exotics::{
        arguments::ParameterMap, proxy::ProxyData, typed_array::TypedArrayData,
    },
    function::{BoundFunctionData, BuiltinData, FunctionData},
    heap::{Heap, Mark, MarkQueue},
    interpreter::coroutines::{AsyncGeneratorData, GeneratorData},
    intrinsics::{
        error::ErrorData,
        iterator::ArrayIteratorData,
        promise::PromiseData,
        registry::FinalizationRegistryData,
    },
    module::NamespaceData,
    realm::RealmId,
    value::{BigIntId, ObjectId, PrivateNameId, StringId, SymbolId, Value},
};

/// A property key: a string or a symbol. Private names are not property keys;
/// they live in the separate private-element list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(StringId),
    Symbol(SymbolId),
}

impl PropertyKey {
    /// The canonical array index this key denotes, if any.
    pub(crate) fn as_array_index(self, heap: &Heap) -> Option<u32> {
        match self {
            Self::String(id) => heap.string(id).as_array_index(),
            Self::Symbol(_) => None,
        }
    }

    pub(crate) fn display(self, heap: &Heap) -> String {
        match self {
            Self::String(id) => heap.string(id).to_rust_string(),
            Self::Symbol(id) => match heap.symbol(id).description {
                Some(desc) => format!("Symbol({})", heap.string(desc)),
                None => "Symbol()".to_owned(),
            },
        }
    }
}

/// A fully-populated stored property. The partial, six-field descriptor form
/// only exists at API boundaries ([`PropertyDescriptor`]); the table always
/// stores one of the two complete shapes, so the data/accessor invariant
/// holds by construction.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PropertyEntry {
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        /// `undefined` getter/setter is `None`.
        get: Option<ObjectId>,
        set: Option<ObjectId>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyEntry {
    pub fn enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    pub fn descriptor(&self) -> PropertyDescriptor {
        match *self {
            Self::Data { value, writable, enumerable, configurable } => PropertyDescriptor {
                value: Some(value),
                writable: Some(writable),
                get: None,
                set: None,
                enumerable: Some(enumerable),
                configurable: Some(configurable),
            },
            Self::Accessor { get, set, enumerable, configurable } => PropertyDescriptor {
                value: None,
                writable: None,
                get: Some(get.map_or(Value::Undefined, Value::Object)),
                set: Some(set.map_or(Value::Undefined, Value::Object)),
                enumerable: Some(enumerable),
                configurable: Some(configurable),
            },
        }
    }
}

impl Mark for PropertyEntry {
    fn mark(&self, queue: &mut MarkQueue) {
        match self {
            Self::Data { value, .. } => value.mark(queue),
            Self::Accessor { get, set, .. } => {
                if let Some(get) = get {
                    queue.push_object(*get);
                }
                if let Some(set) = set {
                    queue.push_object(*set);
                }
            }
        }
    }
}

/// The partial property descriptor: six optional fields, classified by
/// inspection into data, accessor, or generic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub writable: Option<bool>,
    /// `Some(Value::Undefined)` is an explicitly-undefined getter, which is
    /// distinct from an absent field.
    pub get: Option<Value>,
    pub set: Option<Value>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// A data descriptor with every field present.
    pub fn full_data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
        }
    }

    pub fn value_only(value: Value) -> Self {
        Self { value: Some(value), ..Self::default() }
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_data_descriptor() && !self.is_accessor_descriptor()
    }

    /// True when every field is absent, in which case applying the
    /// descriptor to an existing property is a no-op.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.writable.is_none()
            && self.get.is_none()
            && self.set.is_none()
            && self.enumerable.is_none()
            && self.configurable.is_none()
    }

    /// Completes a descriptor into a stored entry, defaulting missing
    /// attributes to `false`/`undefined`. Accessor shape wins only when an
    /// accessor field is present.
    pub(crate) fn into_entry(self) -> PropertyEntry {
        if self.is_accessor_descriptor() {
            PropertyEntry::Accessor {
                get: self.get.and_then(Value::object_id),
                set: self.set.and_then(Value::object_id),
                enumerable: self.enumerable.unwrap_or(false),
                configurable: self.configurable.unwrap_or(false),
            }
        } else {
            PropertyEntry::Data {
                value: self.value.unwrap_or(Value::Undefined),
                writable: self.writable.unwrap_or(false),
                enumerable: self.enumerable.unwrap_or(false),
                configurable: self.configurable.unwrap_or(false),
            }
        }
    }
}

/// A private element installed on an object. Fields are per-instance values;
/// methods and accessors are shared closures found by key identity.
#[derive(Debug, Clone)]
pub(crate) enum PrivateElement {
    Field { key: PrivateNameId, value: Value },
    Method { key: PrivateNameId, value: Value },
    Accessor {
        key: PrivateNameId,
        get: Option<ObjectId>,
        set: Option<ObjectId>,
    },
}

impl PrivateElement {
    pub fn key(&self) -> PrivateNameId {
        match self {
            Self::Field { key, .. } | Self::Method { key, .. } | Self::Accessor { key, .. } => *key,
        }
    }
}

impl Mark for PrivateElement {
    fn mark(&self, queue: &mut MarkQueue) {
        match self {
            Self::Field { value, .. } | Self::Method { value, .. } => value.mark(queue),
            Self::Accessor { get, set, .. } => {
                if let Some(get) = get {
                    queue.push_object(*get);
                }
                if let Some(set) = set {
                    queue.push_object(*set);
                }
            }
        }
    }
}

pub(crate) type PropertyTable = IndexMap<PropertyKey, PropertyEntry, ahash::RandomState>;

/// One heap object.
#[derive(Debug)]
pub(crate) struct ObjectRecord {
    pub prototype: Option<ObjectId>,
    pub extensible: bool,
    /// Own properties in insertion order. Enumeration order is observable,
    /// so this table is never rebuilt in a way that loses ordering.
    pub properties: PropertyTable,
    pub private_elements: Vec<PrivateElement>,
    pub data: ObjectData,
    pub realm: RealmId,
}

impl ObjectRecord {
    pub fn new(prototype: Option<ObjectId>, data: ObjectData, realm: RealmId) -> Self {
        Self {
            prototype,
            extensible: true,
            properties: PropertyTable::default(),
            private_elements: Vec::new(),
            data,
            realm,
        }
    }

    pub fn entry(&self, key: PropertyKey) -> Option<&PropertyEntry> {
        self.properties.get(&key)
    }

    pub fn entry_mut(&mut self, key: PropertyKey) -> Option<&mut PropertyEntry> {
        self.properties.get_mut(&key)
    }

    pub fn private_element(&self, key: PrivateNameId) -> Option<&PrivateElement> {
        self.private_elements.iter().find(|e| e.key() == key)
    }

    /// Whether this object's data payload carries a `Call` internal method.
    pub fn is_callable(&self) -> bool {
        match &self.data {
            ObjectData::Function(_) | ObjectData::Builtin(_) | ObjectData::BoundFunction(_) => true,
            ObjectData::Proxy(proxy) => proxy.callable,
            _ => false,
        }
    }

    /// Whether this object's data payload carries a `Construct` internal
    /// method.
    pub fn is_constructor(&self) -> bool {
        match &self.data {
            ObjectData::Function(f) => f.is_constructor,
            ObjectData::Builtin(b) => b.constructor,
            ObjectData::BoundFunction(_) => true,
            ObjectData::Proxy(proxy) => proxy.callable && proxy.is_constructor,
            _ => false,
        }
    }
}

impl Mark for ObjectRecord {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(proto) = self.prototype {
            queue.push_object(proto);
        }
        for entry in self.properties.values() {
            entry.mark(queue);
        }
        for element in &self.private_elements {
            element.mark(queue);
        }
        self.data.mark(queue);
    }
}

/// Per-kind payload. The variant selects the internal-method suite (the
/// per-object vtable) and carries that kind's internal slots.
#[derive(Debug)]
pub(crate) enum ObjectData {
    Ordinary,
    /// Array exotic object; `length` lives in the property table and the
    /// exotic `DefineOwnProperty` keeps it consistent.
    Array,
    /// Mapped arguments object with its parameter map.
    Arguments(Box<ParameterMap>),
    /// An ordinary function with code.
    Function(Box<FunctionData>),
    /// A host-implemented function.
    Builtin(Box<BuiltinData>),
    BoundFunction(Box<BoundFunctionData>),
    /// String exotic object wrapping an immutable string value.
    StringObject(StringId),
    BooleanObject(bool),
    NumberObject(f64),
    SymbolObject(SymbolId),
    BigIntObject(BigIntId),
    Error(Box<ErrorData>),
    ArrayBuffer(ArrayBufferData),
    DataView(DataViewData),
    TypedArray(TypedArrayData),
    ModuleNamespace(Box<NamespaceData>),
    Proxy(ProxyData),
    Promise(Box<PromiseData>),
    Generator(Box<GeneratorData>),
    AsyncGenerator(Box<AsyncGeneratorData>),
    ArrayIterator(ArrayIteratorData),
    FinalizationRegistry(Box<FinalizationRegistryData>),
}

impl Mark for ObjectData {
    fn mark(&self, queue: &mut MarkQueue) {
        match self {
            Self::Ordinary
            | Self::Array
            | Self::StringObject(_)
            | Self::BooleanObject(_)
            | Self::NumberObject(_)
            | Self::SymbolObject(_)
            | Self::BigIntObject(_)
            | Self::Error(_) => {}
            Self::Arguments(map) => map.mark(queue),
            Self::Function(f) => f.mark(queue),
            Self::Builtin(b) => b.mark(queue),
            Self::BoundFunction(b) => b.mark(queue),
            Self::ArrayBuffer(_) => {}
            Self::DataView(dv) => queue.push_object(dv.buffer),
            Self::TypedArray(ta) => queue.push_object(ta.buffer),
            Self::ModuleNamespace(ns) => ns.mark(queue),
            Self::Proxy(p) => p.mark(queue),
            Self::Promise(p) => p.mark(queue),
            Self::Generator(g) => g.mark(queue),
            Self::AsyncGenerator(g) => g.mark(queue),
            Self::ArrayIterator(it) => queue.push_object(it.array),
            Self::FinalizationRegistry(r) => r.mark(queue),
        }
    }
}
