//! The `Proxy` constructor (with `Proxy.revocable`) and the `Reflect`
//! namespace: the thin mirror over the internal methods.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::to_property_key,
    exotics::proxy::ProxyData,
    function::NativeFn,
    intrinsics::{
        builtin_fn_with, define_method, error::ErrorKind, promise::PromisePayload, RealmSeed,
    },
    object::{ObjectData, ObjectRecord, PropertyEntry, PropertyKey},
    operations::{
        call, create_list_from_array_like, from_property_descriptor, to_property_descriptor,
    },
    ordinary,
    value::{ObjectId, Value},
};

fn proxy_create(agent: &mut Agent, target: Value, handler: Value) -> JsResult<ObjectId> {
    let (Value::Object(target), Value::Object(handler)) = (target, handler) else {
        return Err(agent.throw_error(ErrorKind::Type, "Proxy target and handler must be objects"));
    };
    let callable = agent.heap.object(target).is_callable();
    let is_constructor = agent.heap.object(target).is_constructor();
    let realm = agent.current_realm_id();
    Ok(agent.heap.alloc_object(ObjectRecord::new(
        None,
        ObjectData::Proxy(ProxyData {
            target: Some(target),
            handler: Some(handler),
            callable,
            is_constructor,
        }),
        realm,
    )))
}

fn proxy_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_none() {
        return Err(agent.throw_error(ErrorKind::Type, "Proxy constructor requires new"));
    }
    let target = args.first().copied().unwrap_or(Value::Undefined);
    let handler = args.get(1).copied().unwrap_or(Value::Undefined);
    Ok(Value::Object(proxy_create(agent, target, handler)?))
}

fn revoke_function(
    agent: &mut Agent,
    _this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    // The proxy to revoke rides along as a property on the revoker.
    let key = agent.key_from_str("[[RevocableProxy]]");
    if let Some(PropertyEntry::Data { value: Value::Object(proxy), .. }) =
        agent.heap.object(func).entry(key).copied()
    {
        crate::exotics::proxy::revoke(agent, proxy);
        agent.heap.object_mut(func).properties.shift_remove(&key);
    }
    Ok(Value::Undefined)
}

fn proxy_revocable(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    let handler = args.get(1).copied().unwrap_or(Value::Undefined);
    let proxy = proxy_create(agent, target, handler)?;

    let realm = agent.current_realm_id();
    let prototype = agent.intrinsics().function_prototype;
    let revoker = agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::Builtin(Box::new(crate::function::BuiltinData {
            behaviour: revoke_function,
            constructor: false,
            payload: PromisePayload::None,
            realm,
        })),
        realm,
    ));
    let key = agent.key_from_str("[[RevocableProxy]]");
    agent.heap.object_mut(revoker).properties.insert(
        key,
        PropertyEntry::Data {
            value: Value::Object(proxy),
            writable: false,
            enumerable: false,
            configurable: true,
        },
    );

    let result = agent.create_ordinary_object();
    let proxy_key = agent.key_from_str("proxy");
    crate::operations::create_data_property_or_throw(agent, result, proxy_key, Value::Object(proxy))?;
    let revoke_key = agent.key_from_str("revoke");
    crate::operations::create_data_property_or_throw(agent, result, revoke_key, Value::Object(revoker))?;
    Ok(Value::Object(result))
}

// --- Reflect ---

fn arg_object(agent: &mut Agent, args: &[Value], index: usize, what: &str) -> JsResult<ObjectId> {
    match args.get(index).copied() {
        Some(Value::Object(id)) => Ok(id),
        _ => Err(agent.throw_error(ErrorKind::Type, format!("Reflect.{what} target must be an object"))),
    }
}

fn reflect_get(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "get")?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    let receiver = args.get(2).copied().unwrap_or(Value::Object(target));
    ordinary::get_with_receiver(agent, target, key, receiver)
}

fn reflect_set(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "set")?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    let value = args.get(2).copied().unwrap_or(Value::Undefined);
    let receiver = args.get(3).copied().unwrap_or(Value::Object(target));
    Ok(Value::Boolean(ordinary::set_with_receiver(agent, target, key, value, receiver)?))
}

fn reflect_has(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "has")?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    Ok(Value::Boolean(ordinary::has_property(agent, target, key)?))
}

fn reflect_define_property(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "defineProperty")?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    let desc = to_property_descriptor(agent, args.get(2).copied().unwrap_or(Value::Undefined))?;
    Ok(Value::Boolean(ordinary::define_own_property(agent, target, key, desc)?))
}

fn reflect_get_own_property_descriptor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "getOwnPropertyDescriptor")?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    match ordinary::get_own_property(agent, target, key)? {
        None => Ok(Value::Undefined),
        Some(desc) => from_property_descriptor(agent, desc),
    }
}

fn reflect_delete_property(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "deleteProperty")?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    Ok(Value::Boolean(ordinary::delete(agent, target, key)?))
}

fn reflect_own_keys(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "ownKeys")?;
    let keys = ordinary::own_property_keys(agent, target)?;
    let values: Vec<Value> = keys.into_iter().map(|k| agent.key_to_value(k)).collect();
    let array = crate::exotics::array::create_array_from_list(agent, &values)?;
    Ok(Value::Object(array))
}

fn reflect_get_prototype_of(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "getPrototypeOf")?;
    Ok(ordinary::get_prototype_of(agent, target)?.map_or(Value::Null, Value::Object))
}

fn reflect_set_prototype_of(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "setPrototypeOf")?;
    let proto = match args.get(1).copied().unwrap_or(Value::Undefined) {
        Value::Object(id) => Some(id),
        Value::Null => None,
        _ => return Err(agent.throw_error(ErrorKind::Type, "prototype must be an object or null")),
    };
    Ok(Value::Boolean(ordinary::set_prototype_of(agent, target, proto)?))
}

fn reflect_is_extensible(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "isExtensible")?;
    Ok(Value::Boolean(ordinary::is_extensible(agent, target)?))
}

fn reflect_prevent_extensions(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "preventExtensions")?;
    Ok(Value::Boolean(ordinary::prevent_extensions(agent, target)?))
}

fn reflect_apply(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    let this_arg = args.get(1).copied().unwrap_or(Value::Undefined);
    let list = create_list_from_array_like(agent, args.get(2).copied().unwrap_or(Value::Undefined))?;
    call(agent, target, this_arg, &list)
}

fn reflect_construct(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = arg_object(agent, args, 0, "construct")?;
    if !agent.heap.object(target).is_constructor() {
        return Err(agent.throw_error(ErrorKind::Type, "Reflect.construct target must be a constructor"));
    }
    let list = create_list_from_array_like(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    let new_target = match args.get(2).copied() {
        None => target,
        Some(Value::Object(id)) if agent.heap.object(id).is_constructor() => id,
        Some(_) => {
            return Err(agent.throw_error(ErrorKind::Type, "Reflect.construct newTarget must be a constructor"));
        }
    };
    let result = crate::interpreter::construct(agent, target, &list, new_target)?;
    Ok(Value::Object(result))
}

pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) {
    // Proxy has no .prototype property.
    let proxy = builtin_fn_with(agent, seed, proxy_constructor, "Proxy", 2, true, PromisePayload::None);
    define_method(agent, seed, proxy, "revocable", proxy_revocable, 2);
    seed.register("%Proxy%", proxy);

    // Reflect is a plain namespace object.
    let reflect = agent.heap.alloc_object(ObjectRecord::new(
        Some(seed.object_prototype),
        ObjectData::Ordinary,
        seed.realm,
    ));
    let methods: [(&str, NativeFn, u32); 13] = [
        ("get", reflect_get, 2),
        ("set", reflect_set, 3),
        ("has", reflect_has, 2),
        ("defineProperty", reflect_define_property, 3),
        ("getOwnPropertyDescriptor", reflect_get_own_property_descriptor, 2),
        ("deleteProperty", reflect_delete_property, 2),
        ("ownKeys", reflect_own_keys, 1),
        ("getPrototypeOf", reflect_get_prototype_of, 1),
        ("setPrototypeOf", reflect_set_prototype_of, 2),
        ("isExtensible", reflect_is_extensible, 1),
        ("preventExtensions", reflect_prevent_extensions, 1),
        ("apply", reflect_apply, 3),
        ("construct", reflect_construct, 2),
    ];
    for (name, behaviour, length) in methods {
        define_method(agent, seed, reflect, name, behaviour, length);
    }
    let tag = agent.string_value("Reflect");
    let tag_key = PropertyKey::Symbol(agent.heap.well_known.to_string_tag);
    agent.heap.object_mut(reflect).properties.insert(
        tag_key,
        PropertyEntry::Data { value: tag, writable: false, enumerable: false, configurable: true },
    );
    seed.register("%Reflect%", reflect);
}
