//! Proxy exotic objects. Every internal method consults the corresponding
//! handler trap when present, enforces the essential invariants against the
//! target, and otherwise falls through to the target's own method. A revoked
//! proxy (null target/handler pair) refuses everything.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::{to_boolean, to_property_key},
    heap::{Mark, MarkQueue},
    intrinsics::error::ErrorKind,
    object::{PropertyDescriptor, PropertyKey},
    operations::{call, from_property_descriptor, get_method, same_value, to_property_descriptor},
    ordinary,
    value::{ObjectId, Value},
};

/// Proxy slots. `target`/`handler` become `None` on revocation.
#[derive(Debug)]
pub(crate) struct ProxyData {
    pub target: Option<ObjectId>,
    pub handler: Option<ObjectId>,
    /// Snapshot of the target's callability, taken at construction.
    pub callable: bool,
    pub is_constructor: bool,
}

impl Mark for ProxyData {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(target) = self.target {
            queue.push_object(target);
        }
        if let Some(handler) = self.handler {
            queue.push_object(handler);
        }
    }
}

/// Validates the proxy is not revoked and returns `(target, handler)`.
fn proxy_parts(agent: &mut Agent, o: ObjectId) -> JsResult<(ObjectId, ObjectId)> {
    let crate::object::ObjectData::Proxy(data) = &agent.heap.object(o).data else {
        return Err(crate::completion::EngineError::internal("proxy trap on non-proxy"));
    };
    match (data.target, data.handler) {
        (Some(target), Some(handler)) => Ok((target, handler)),
        _ => Err(agent.throw_error(ErrorKind::Type, "cannot perform operation on a revoked proxy")),
    }
}

/// Looks up a trap by name; `undefined`/`null` traps fall through.
fn trap(agent: &mut Agent, handler: ObjectId, name: &str) -> JsResult<Option<Value>> {
    let name = agent.heap.intern_str(name);
    get_method(agent, Value::Object(handler), Value::String(name))
}

pub(crate) fn get_prototype_of(agent: &mut Agent, o: ObjectId) -> JsResult<Option<ObjectId>> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "getPrototypeOf")? else {
        return ordinary::get_prototype_of(agent, target);
    };
    let result = call(agent, trap_fn, Value::Object(handler), &[Value::Object(target)])?;
    let handler_proto = match result {
        Value::Object(p) => Some(p),
        Value::Null => None,
        _ => {
            return Err(agent.throw_error(ErrorKind::Type, "getPrototypeOf trap must return an object or null"));
        }
    };
    if ordinary::is_extensible(agent, target)? {
        return Ok(handler_proto);
    }
    let target_proto = ordinary::get_prototype_of(agent, target)?;
    if handler_proto != target_proto {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "getPrototypeOf trap disagrees with non-extensible target",
        ));
    }
    Ok(handler_proto)
}

pub(crate) fn set_prototype_of(
    agent: &mut Agent,
    o: ObjectId,
    prototype: Option<ObjectId>,
) -> JsResult<bool> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "setPrototypeOf")? else {
        return ordinary::set_prototype_of(agent, target, prototype);
    };
    let proto_value = prototype.map_or(Value::Null, Value::Object);
    let result = call(
        agent,
        trap_fn,
        Value::Object(handler),
        &[Value::Object(target), proto_value],
    )?;
    if !to_boolean(&agent.heap, result) {
        return Ok(false);
    }
    if !ordinary::is_extensible(agent, target)?
        && prototype != ordinary::get_prototype_of(agent, target)?
    {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "setPrototypeOf trap changed the prototype of a non-extensible target",
        ));
    }
    Ok(true)
}

pub(crate) fn is_extensible(agent: &mut Agent, o: ObjectId) -> JsResult<bool> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "isExtensible")? else {
        return ordinary::is_extensible(agent, target);
    };
    let result = call(agent, trap_fn, Value::Object(handler), &[Value::Object(target)])?;
    let reported = to_boolean(&agent.heap, result);
    if reported != ordinary::is_extensible(agent, target)? {
        return Err(agent.throw_error(ErrorKind::Type, "isExtensible trap disagrees with target"));
    }
    Ok(reported)
}

pub(crate) fn prevent_extensions(agent: &mut Agent, o: ObjectId) -> JsResult<bool> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "preventExtensions")? else {
        return ordinary::prevent_extensions(agent, target);
    };
    let result = call(agent, trap_fn, Value::Object(handler), &[Value::Object(target)])?;
    let reported = to_boolean(&agent.heap, result);
    if reported && ordinary::is_extensible(agent, target)? {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "preventExtensions trap reported success on an extensible target",
        ));
    }
    Ok(reported)
}

pub(crate) fn get_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
) -> JsResult<Option<PropertyDescriptor>> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "getOwnPropertyDescriptor")? else {
        return ordinary::get_own_property(agent, target, key);
    };
    let key_value = agent.key_to_value(key);
    let result = call(agent, trap_fn, Value::Object(handler), &[Value::Object(target), key_value])?;
    let target_desc = ordinary::get_own_property(agent, target, key)?;
    if result == Value::Undefined {
        if let Some(target_desc) = &target_desc
            && target_desc.configurable == Some(false)
        {
            return Err(agent.throw_error(
                ErrorKind::Type,
                "getOwnPropertyDescriptor trap hid a non-configurable property",
            ));
        }
        if target_desc.is_some() && !ordinary::is_extensible(agent, target)? {
            return Err(agent.throw_error(
                ErrorKind::Type,
                "getOwnPropertyDescriptor trap hid a property of a non-extensible target",
            ));
        }
        return Ok(None);
    }
    if !result.is_object() {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "getOwnPropertyDescriptor trap must return an object or undefined",
        ));
    }
    let mut desc = to_property_descriptor(agent, result)?;
    if desc.configurable.is_none() {
        desc.configurable = Some(false);
    }
    if desc.is_data_descriptor() && desc.writable.is_none() {
        desc.writable = Some(false);
    }
    if desc.enumerable.is_none() {
        desc.enumerable = Some(false);
    }
    // The reported descriptor must be compatible with the real one.
    let extensible = ordinary::is_extensible(agent, target)?;
    let compatible = crate::ordinary::validate_and_apply_property_descriptor(
        &mut agent.heap,
        None,
        extensible,
        desc,
        target_desc.map(PropertyDescriptor::into_entry),
    );
    if !compatible {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "getOwnPropertyDescriptor trap reported an incompatible descriptor",
        ));
    }
    Ok(Some(desc))
}

pub(crate) fn define_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<bool> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "defineProperty")? else {
        return ordinary::define_own_property(agent, target, key, desc);
    };
    let key_value = agent.key_to_value(key);
    let desc_obj = from_property_descriptor(agent, desc)?;
    let result = call(
        agent,
        trap_fn,
        Value::Object(handler),
        &[Value::Object(target), key_value, desc_obj],
    )?;
    if !to_boolean(&agent.heap, result) {
        return Ok(false);
    }
    let target_desc = ordinary::get_own_property(agent, target, key)?;
    if target_desc.is_none() && !ordinary::is_extensible(agent, target)? {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "defineProperty trap added a property to a non-extensible target",
        ));
    }
    Ok(true)
}

pub(crate) fn has_property(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "has")? else {
        return ordinary::has_property(agent, target, key);
    };
    let key_value = agent.key_to_value(key);
    let result = call(agent, trap_fn, Value::Object(handler), &[Value::Object(target), key_value])?;
    let reported = to_boolean(&agent.heap, result);
    if !reported {
        let target_desc = ordinary::get_own_property(agent, target, key)?;
        if let Some(target_desc) = target_desc {
            if target_desc.configurable == Some(false) {
                return Err(agent.throw_error(ErrorKind::Type, "has trap hid a non-configurable property"));
            }
            if !ordinary::is_extensible(agent, target)? {
                return Err(agent.throw_error(
                    ErrorKind::Type,
                    "has trap hid a property of a non-extensible target",
                ));
            }
        }
    }
    Ok(reported)
}

pub(crate) fn get(agent: &mut Agent, o: ObjectId, key: PropertyKey, receiver: Value) -> JsResult<Value> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "get")? else {
        return ordinary::get_with_receiver(agent, target, key, receiver);
    };
    let key_value = agent.key_to_value(key);
    let result = call(
        agent,
        trap_fn,
        Value::Object(handler),
        &[Value::Object(target), key_value, receiver],
    )?;
    if let Some(target_desc) = ordinary::get_own_property(agent, target, key)?
        && target_desc.configurable == Some(false)
    {
        // Non-configurable, non-writable data: the trap must report the
        // exact value. Non-configurable accessor without a getter: only
        // undefined is allowed.
        if target_desc.is_data_descriptor()
            && target_desc.writable == Some(false)
            && !same_value(&agent.heap, result, target_desc.value.unwrap_or(Value::Undefined))
        {
            return Err(agent.throw_error(
                ErrorKind::Type,
                "get trap disagrees with a non-configurable non-writable property",
            ));
        }
        if target_desc.is_accessor_descriptor()
            && target_desc.get == Some(Value::Undefined)
            && result != Value::Undefined
        {
            return Err(agent.throw_error(
                ErrorKind::Type,
                "get trap returned a value for a getterless non-configurable accessor",
            ));
        }
    }
    Ok(result)
}

pub(crate) fn set(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
    receiver: Value,
) -> JsResult<bool> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "set")? else {
        return ordinary::set_with_receiver(agent, target, key, value, receiver);
    };
    let key_value = agent.key_to_value(key);
    let result = call(
        agent,
        trap_fn,
        Value::Object(handler),
        &[Value::Object(target), key_value, value, receiver],
    )?;
    if !to_boolean(&agent.heap, result) {
        return Ok(false);
    }
    if let Some(target_desc) = ordinary::get_own_property(agent, target, key)?
        && target_desc.configurable == Some(false)
    {
        if target_desc.is_data_descriptor()
            && target_desc.writable == Some(false)
            && !same_value(&agent.heap, value, target_desc.value.unwrap_or(Value::Undefined))
        {
            return Err(agent.throw_error(
                ErrorKind::Type,
                "set trap changed a non-configurable non-writable property",
            ));
        }
        if target_desc.is_accessor_descriptor() && target_desc.set == Some(Value::Undefined) {
            return Err(agent.throw_error(
                ErrorKind::Type,
                "set trap succeeded for a setterless non-configurable accessor",
            ));
        }
    }
    Ok(true)
}

pub(crate) fn delete(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "deleteProperty")? else {
        return ordinary::delete(agent, target, key);
    };
    let key_value = agent.key_to_value(key);
    let result = call(agent, trap_fn, Value::Object(handler), &[Value::Object(target), key_value])?;
    if !to_boolean(&agent.heap, result) {
        return Ok(false);
    }
    if let Some(target_desc) = ordinary::get_own_property(agent, target, key)? {
        if target_desc.configurable == Some(false) {
            return Err(agent.throw_error(ErrorKind::Type, "deleteProperty trap removed a non-configurable property"));
        }
        if !ordinary::is_extensible(agent, target)? {
            return Err(agent.throw_error(
                ErrorKind::Type,
                "deleteProperty trap removed a property of a non-extensible target",
            ));
        }
    }
    Ok(true)
}

pub(crate) fn own_property_keys(agent: &mut Agent, o: ObjectId) -> JsResult<Vec<PropertyKey>> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "ownKeys")? else {
        return ordinary::own_property_keys(agent, target);
    };
    let result = call(agent, trap_fn, Value::Object(handler), &[Value::Object(target)])?;
    let Value::Object(list) = result else {
        return Err(agent.throw_error(ErrorKind::Type, "ownKeys trap must return an array"));
    };
    let length = crate::operations::length_of_array_like(agent, list)?;
    let mut keys = Vec::with_capacity(length as usize);
    for i in 0..length {
        let key = agent.key_for_index(i);
        let element = ordinary::get_with_receiver(agent, list, key, Value::Object(list))?;
        if !matches!(element, Value::String(_) | Value::Symbol(_)) {
            return Err(agent.throw_error(ErrorKind::Type, "ownKeys trap returned a non-key element"));
        }
        let key = to_property_key(agent, element)?;
        if keys.contains(&key) {
            return Err(agent.throw_error(ErrorKind::Type, "ownKeys trap returned a duplicate key"));
        }
        keys.push(key);
    }
    // Every non-configurable target key must be reported, and a
    // non-extensible target's key list must match exactly.
    let target_keys = ordinary::own_property_keys(agent, target)?;
    let extensible = ordinary::is_extensible(agent, target)?;
    let mut unaccounted = 0usize;
    for &target_key in &target_keys {
        let desc = ordinary::get_own_property(agent, target, target_key)?;
        let non_configurable = desc.is_some_and(|d| d.configurable == Some(false));
        if !keys.contains(&target_key) {
            if non_configurable {
                return Err(agent.throw_error(ErrorKind::Type, "ownKeys trap omitted a non-configurable key"));
            }
            unaccounted += 1;
        }
    }
    if !extensible && (unaccounted > 0 || keys.len() != target_keys.len()) {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "ownKeys trap disagrees with a non-extensible target",
        ));
    }
    Ok(keys)
}

/// Proxy `[[Call]]`.
pub(crate) fn proxy_call(agent: &mut Agent, o: ObjectId, this: Value, args: &[Value]) -> JsResult<Value> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "apply")? else {
        return call(agent, Value::Object(target), this, args);
    };
    let args_array = crate::exotics::array::create_array_from_list(agent, args)?;
    call(
        agent,
        trap_fn,
        Value::Object(handler),
        &[Value::Object(target), this, Value::Object(args_array)],
    )
}

/// Proxy `[[Construct]]`.
pub(crate) fn proxy_construct(
    agent: &mut Agent,
    o: ObjectId,
    args: &[Value],
    new_target: ObjectId,
) -> JsResult<ObjectId> {
    let (target, handler) = proxy_parts(agent, o)?;
    let Some(trap_fn) = trap(agent, handler, "construct")? else {
        return crate::interpreter::construct(agent, target, args, new_target);
    };
    let args_array = crate::exotics::array::create_array_from_list(agent, args)?;
    let result = call(
        agent,
        trap_fn,
        Value::Object(handler),
        &[Value::Object(target), Value::Object(args_array), Value::Object(new_target)],
    )?;
    match result {
        Value::Object(id) => Ok(id),
        _ => Err(agent.throw_error(ErrorKind::Type, "construct trap must return an object")),
    }
}

/// Revokes the pair; every later trap invocation throws.
pub(crate) fn revoke(agent: &mut Agent, o: ObjectId) {
    if let crate::object::ObjectData::Proxy(data) = &mut agent.heap.object_mut(o).data {
        data.target = None;
        data.handler = None;
    }
}
