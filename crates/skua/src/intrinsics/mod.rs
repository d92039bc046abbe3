//! Realm bootstrap: the intrinsics table and the per-builtin installers.
//!
//! Order matters: `%Object.prototype%` and `%Function.prototype%` exist
//! before any other prototype, and `%ThrowTypeError%` is created and frozen
//! before anything references it. Prototype members default to
//! `{W:true, E:false, C:true}` for data and `{E:false, C:true}` for
//! accessors; installers patch attributes per entry where the standard
//! deviates.

pub(crate) mod array;
pub(crate) mod buffers;
pub(crate) mod error;
pub(crate) mod function;
pub(crate) mod global;
pub(crate) mod iterator;
pub(crate) mod object;
pub(crate) mod primitives;
pub(crate) mod promise;
pub(crate) mod proxy_reflect;
pub(crate) mod registry;

use ahash::AHashMap;

use crate::{
    agent::Agent,
    completion::JsResult,
    function::{BuiltinData, NativeFn},
    intrinsics::promise::PromisePayload,
    object::{ObjectData, ObjectRecord, PropertyEntry, PropertyKey},
    realm::{Intrinsics, Realm, RealmId},
    value::{ObjectId, Value},
};

/// Working state threaded through the per-builtin installers.
pub(crate) struct RealmSeed {
    pub realm: RealmId,
    pub object_prototype: ObjectId,
    pub function_prototype: ObjectId,
    pub throw_type_error: ObjectId,
    by_name: AHashMap<Box<str>, ObjectId>,
}

impl RealmSeed {
    pub fn register(&mut self, name: &str, id: ObjectId) {
        self.by_name.insert(name.into(), id);
    }
}

/// Creates a realm: skeletal intrinsics, each builtin bootstrap in
/// dependency order, then the global object and environment.
pub(crate) fn create_realm(agent: &mut Agent) -> RealmId {
    let realm = RealmId::new(agent.realms.len());

    // The two roots everything hangs off.
    let object_prototype = agent
        .heap
        .alloc_object(ObjectRecord::new(None, ObjectData::Ordinary, realm));
    let function_prototype = raw_builtin(agent, realm, function::prototype_behaviour, Some(object_prototype));

    let mut seed = RealmSeed {
        realm,
        object_prototype,
        function_prototype,
        // Placeholder until the thrower exists a few lines below; nothing
        // reads it before then.
        throw_type_error: function_prototype,
        by_name: AHashMap::new(),
    };
    seed.register("%Object.prototype%", object_prototype);
    seed.register("%Function.prototype%", function_prototype);

    let throw_type_error = function::create_throw_type_error(agent, &seed);
    seed.throw_type_error = throw_type_error;
    seed.register("%ThrowTypeError%", throw_type_error);

    let object_ctor = object::init(agent, &mut seed);
    let function_ctor = function::init(agent, &mut seed);
    let iterators = iterator::init(agent, &mut seed);
    let (array_ctor, array_prototype, array_values) = array::init(agent, &mut seed);
    let errors = error::init(agent, &mut seed);
    let prims = primitives::init(agent, &mut seed);
    let (promise_ctor, promise_prototype) = promise::init(agent, &mut seed);
    let bufs = buffers::init(agent, &mut seed);
    let (finreg_ctor, finreg_prototype) = registry::init(agent, &mut seed);
    proxy_reflect::init(agent, &mut seed);

    let intrinsics = Intrinsics {
        object_prototype,
        object: object_ctor,
        function_prototype,
        function: function_ctor,
        throw_type_error,
        array: array_ctor,
        array_prototype,
        array_values,
        boolean_prototype: prims.boolean_prototype,
        number_prototype: prims.number_prototype,
        string_prototype: prims.string_prototype,
        symbol: prims.symbol,
        symbol_prototype: prims.symbol_prototype,
        bigint_prototype: prims.bigint_prototype,
        errors,
        iterator_prototype: iterators.iterator_prototype,
        async_iterator_prototype: iterators.async_iterator_prototype,
        array_iterator_prototype: iterators.array_iterator_prototype,
        generator_prototype: iterators.generator_prototype,
        async_generator_prototype: iterators.async_generator_prototype,
        promise: promise_ctor,
        promise_prototype,
        array_buffer: bufs.array_buffer,
        array_buffer_prototype: bufs.array_buffer_prototype,
        shared_array_buffer: bufs.shared_array_buffer,
        shared_array_buffer_prototype: bufs.shared_array_buffer_prototype,
        data_view: bufs.data_view,
        data_view_prototype: bufs.data_view_prototype,
        typed_array_prototype: bufs.typed_array_prototype,
        typed_arrays: bufs.typed_arrays,
        finalization_registry: finreg_ctor,
        finalization_registry_prototype: finreg_prototype,
        by_name: seed.by_name,
    };

    let (global_object, global_env) = global::init(agent, realm, &intrinsics);
    agent.realms.push(Realm { intrinsics, global_object, global_env });
    realm
}

// --- builders ---

/// A bare builtin object with no name/length properties; the roots use this
/// before the property machinery is in shape.
fn raw_builtin(
    agent: &mut Agent,
    realm: RealmId,
    behaviour: NativeFn,
    prototype: Option<ObjectId>,
) -> ObjectId {
    agent.heap.alloc_object(ObjectRecord::new(
        prototype,
        ObjectData::Builtin(Box::new(BuiltinData {
            behaviour,
            constructor: false,
            payload: PromisePayload::None,
            realm,
        })),
        realm,
    ))
}

/// `CreateBuiltinFunction`: a callable with `name` and `length` installed
/// with the standard attributes.
pub(crate) fn builtin_fn(
    agent: &mut Agent,
    seed: &RealmSeed,
    behaviour: NativeFn,
    name: &str,
    length: u32,
) -> ObjectId {
    builtin_fn_with(agent, seed, behaviour, name, length, false, PromisePayload::None)
}

pub(crate) fn builtin_fn_with(
    agent: &mut Agent,
    seed: &RealmSeed,
    behaviour: NativeFn,
    name: &str,
    length: u32,
    constructor: bool,
    payload: PromisePayload,
) -> ObjectId {
    let id = agent.heap.alloc_object(ObjectRecord::new(
        Some(seed.function_prototype),
        ObjectData::Builtin(Box::new(BuiltinData {
            behaviour,
            constructor,
            payload,
            realm: seed.realm,
        })),
        seed.realm,
    ));
    let name_value = Value::String(agent.heap.intern_str(name));
    let length_key = agent.heap.statics.length;
    let name_key = agent.heap.statics.name;
    let record = agent.heap.object_mut(id);
    record.properties.insert(
        PropertyKey::String(length_key),
        PropertyEntry::Data {
            value: Value::Number(f64::from(length)),
            writable: false,
            enumerable: false,
            configurable: true,
        },
    );
    record.properties.insert(
        PropertyKey::String(name_key),
        PropertyEntry::Data { value: name_value, writable: false, enumerable: false, configurable: true },
    );
    id
}

/// `bootstrapPrototype`: an ordinary prototype object.
pub(crate) fn bootstrap_prototype(agent: &mut Agent, seed: &RealmSeed, proto_proto: Option<ObjectId>) -> ObjectId {
    agent
        .heap
        .alloc_object(ObjectRecord::new(proto_proto, ObjectData::Ordinary, seed.realm))
}

/// `bootstrapConstructor`: creates the callable and wires
/// `.prototype` <-> `.constructor` (`.prototype` non-writable,
/// non-configurable).
pub(crate) fn bootstrap_constructor(
    agent: &mut Agent,
    seed: &RealmSeed,
    behaviour: NativeFn,
    name: &str,
    length: u32,
    prototype: ObjectId,
) -> ObjectId {
    let ctor = builtin_fn_with(agent, seed, behaviour, name, length, true, PromisePayload::None);
    let prototype_key = agent.heap.statics.prototype;
    let constructor_key = agent.heap.statics.constructor;
    agent.heap.object_mut(ctor).properties.insert(
        PropertyKey::String(prototype_key),
        PropertyEntry::Data {
            value: Value::Object(prototype),
            writable: false,
            enumerable: false,
            configurable: false,
        },
    );
    agent.heap.object_mut(prototype).properties.insert(
        PropertyKey::String(constructor_key),
        PropertyEntry::Data {
            value: Value::Object(ctor),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    ctor
}

/// Installs a method with the prototype-member data defaults
/// `{W:true, E:false, C:true}`.
pub(crate) fn define_method(
    agent: &mut Agent,
    seed: &RealmSeed,
    target: ObjectId,
    name: &str,
    behaviour: NativeFn,
    length: u32,
) -> ObjectId {
    let func = builtin_fn(agent, seed, behaviour, name, length);
    let key = agent.key_from_str(name);
    define_data(agent, target, key, Value::Object(func));
    func
}

/// Installs a data member with the prototype defaults.
pub(crate) fn define_data(agent: &mut Agent, target: ObjectId, key: PropertyKey, value: Value) {
    agent.heap.object_mut(target).properties.insert(
        key,
        PropertyEntry::Data { value, writable: true, enumerable: false, configurable: true },
    );
}

/// Installs an accessor with the prototype defaults `{E:false, C:true}`.
pub(crate) fn define_accessor(
    agent: &mut Agent,
    seed: &RealmSeed,
    target: ObjectId,
    name: &str,
    getter: Option<NativeFn>,
    setter: Option<NativeFn>,
) {
    let get = getter.map(|g| builtin_fn(agent, seed, g, &format!("get {name}"), 0));
    let set = setter.map(|s| builtin_fn(agent, seed, s, &format!("set {name}"), 1));
    let key = agent.key_from_str(name);
    agent.heap.object_mut(target).properties.insert(
        key,
        PropertyEntry::Accessor { get, set, enumerable: false, configurable: true },
    );
}

/// Helper shared by several builtins: `this` must be an object of the kind
/// the method belongs to.
pub(crate) fn this_object(agent: &mut Agent, this: Value, what: &str) -> JsResult<ObjectId> {
    match this {
        Value::Object(id) => Ok(id),
        _ => Err(agent.throw_error(
            error::ErrorKind::Type,
            format!("method requires that 'this' be a {what}"),
        )),
    }
}

/// Installs the handful of properties every realm's global object carries
/// before the per-constructor wiring; see `global::init` for the rest.
pub(crate) fn define_global_value(agent: &mut Agent, global: ObjectId, name: &str, value: Value) {
    let key = agent.key_from_str(name);
    agent.heap.object_mut(global).properties.insert(
        key,
        PropertyEntry::Data { value, writable: true, enumerable: false, configurable: true },
    );
}
