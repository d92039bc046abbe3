//! The `Object` constructor and `%Object.prototype%`.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::{to_object, to_property_key},
    intrinsics::{bootstrap_constructor, define_method, error::ErrorKind, RealmSeed},
    object::{ObjectData, ObjectRecord, PropertyKey},
    operations::{define_property_or_throw, from_property_descriptor, get, to_property_descriptor},
    ordinary,
    value::{ObjectId, Value},
};

fn object_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    match args.first().copied() {
        None | Some(Value::Undefined | Value::Null) => Ok(Value::Object(agent.create_ordinary_object())),
        Some(value) => Ok(Value::Object(to_object(agent, value)?)),
    }
}

fn require_object_arg(agent: &mut Agent, args: &[Value], what: &str) -> JsResult<ObjectId> {
    match args.first().copied() {
        Some(Value::Object(id)) => Ok(id),
        _ => Err(agent.throw_error(ErrorKind::Type, format!("{what} called on non-object"))),
    }
}

fn object_define_property(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = require_object_arg(agent, args, "Object.defineProperty")?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    let desc = to_property_descriptor(agent, args.get(2).copied().unwrap_or(Value::Undefined))?;
    define_property_or_throw(agent, target, key, desc)?;
    Ok(Value::Object(target))
}

fn object_get_own_property_descriptor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = to_object(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let key = to_property_key(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    match ordinary::get_own_property(agent, target, key)? {
        None => Ok(Value::Undefined),
        Some(desc) => from_property_descriptor(agent, desc),
    }
}

fn object_keys(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = to_object(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let keys = ordinary::own_property_keys(agent, target)?;
    let mut names = Vec::new();
    for key in keys {
        let PropertyKey::String(s) = key else { continue };
        if let Some(desc) = ordinary::get_own_property(agent, target, key)?
            && desc.enumerable == Some(true)
        {
            names.push(Value::String(s));
        }
    }
    let array = crate::exotics::array::create_array_from_list(agent, &names)?;
    Ok(Value::Object(array))
}

fn object_get_own_property_names(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = to_object(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let keys = ordinary::own_property_keys(agent, target)?;
    let names: Vec<Value> = keys
        .into_iter()
        .filter_map(|key| match key {
            PropertyKey::String(s) => Some(Value::String(s)),
            PropertyKey::Symbol(_) => None,
        })
        .collect();
    let array = crate::exotics::array::create_array_from_list(agent, &names)?;
    Ok(Value::Object(array))
}

fn object_create(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let prototype = match args.first().copied() {
        Some(Value::Object(id)) => Some(id),
        Some(Value::Null) => None,
        _ => return Err(agent.throw_error(ErrorKind::Type, "Object prototype may only be an object or null")),
    };
    let realm = agent.current_realm_id();
    let object = agent
        .heap
        .alloc_object(ObjectRecord::new(prototype, ObjectData::Ordinary, realm));
    if let Some(props) = args.get(1).copied()
        && props != Value::Undefined
    {
        let props = to_object(agent, props)?;
        let keys = ordinary::own_property_keys(agent, props)?;
        for key in keys {
            if let Some(desc) = ordinary::get_own_property(agent, props, key)?
                && desc.enumerable == Some(true)
            {
                let desc_value = get(agent, props, key)?;
                let desc = to_property_descriptor(agent, desc_value)?;
                define_property_or_throw(agent, object, key, desc)?;
            }
        }
    }
    Ok(Value::Object(object))
}

fn object_get_prototype_of(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = to_object(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    Ok(ordinary::get_prototype_of(agent, target)?.map_or(Value::Null, Value::Object))
}

fn object_set_prototype_of(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    let proto = match args.get(1).copied().unwrap_or(Value::Undefined) {
        Value::Object(id) => Some(id),
        Value::Null => None,
        _ => return Err(agent.throw_error(ErrorKind::Type, "Object prototype may only be an object or null")),
    };
    let Value::Object(target_id) = target else {
        // Primitives pass through untouched.
        return Ok(target);
    };
    if !ordinary::set_prototype_of(agent, target_id, proto)? {
        return Err(agent.throw_error(ErrorKind::Type, "cannot set prototype of this object"));
    }
    Ok(target)
}

fn object_prevent_extensions(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    if let Value::Object(id) = target
        && !ordinary::prevent_extensions(agent, id)?
    {
        return Err(agent.throw_error(ErrorKind::Type, "cannot prevent extensions on this object"));
    }
    Ok(target)
}

fn object_freeze(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let target = args.first().copied().unwrap_or(Value::Undefined);
    if let Value::Object(id) = target
        && !ordinary::freeze_object(agent, id)?
    {
        return Err(agent.throw_error(ErrorKind::Type, "cannot freeze this object"));
    }
    Ok(target)
}

fn proto_has_own_property(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let key = to_property_key(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let object = to_object(agent, this)?;
    Ok(Value::Boolean(ordinary::get_own_property(agent, object, key)?.is_some()))
}

fn proto_is_prototype_of(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let Some(Value::Object(mut v)) = args.first().copied() else {
        return Ok(Value::Boolean(false));
    };
    let object = to_object(agent, this)?;
    loop {
        match ordinary::get_prototype_of(agent, v)? {
            None => return Ok(Value::Boolean(false)),
            Some(parent) if parent == object => return Ok(Value::Boolean(true)),
            Some(parent) => v = parent,
        }
    }
}

fn proto_property_is_enumerable(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let key = to_property_key(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let object = to_object(agent, this)?;
    let desc = ordinary::get_own_property(agent, object, key)?;
    Ok(Value::Boolean(desc.is_some_and(|d| d.enumerable == Some(true))))
}

fn proto_to_string(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let tag = match this {
        Value::Undefined => "Undefined".to_owned(),
        Value::Null => "Null".to_owned(),
        _ => {
            let object = to_object(agent, this)?;
            let record = agent.heap.object(object);
            let builtin = if record.is_callable() {
                "Function"
            } else {
                match &record.data {
                    ObjectData::Array => "Array",
                    ObjectData::Arguments(_) => "Arguments",
                    ObjectData::Error(_) => "Error",
                    ObjectData::BooleanObject(_) => "Boolean",
                    ObjectData::NumberObject(_) => "Number",
                    ObjectData::StringObject(_) => "String",
                    _ => "Object",
                }
            };
            let tag_key = PropertyKey::Symbol(agent.heap.well_known.to_string_tag);
            match get(agent, object, tag_key)? {
                Value::String(s) => agent.heap.string(s).to_rust_string(),
                _ => builtin.to_owned(),
            }
        }
    };
    Ok(agent.string_value(&format!("[object {tag}]")))
}

fn proto_value_of(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(Value::Object(to_object(agent, this)?))
}

/// Bootstraps the `Object` constructor onto the already-created
/// `%Object.prototype%`.
pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> ObjectId {
    let proto = seed.object_prototype;
    define_method(agent, seed, proto, "hasOwnProperty", proto_has_own_property, 1);
    define_method(agent, seed, proto, "isPrototypeOf", proto_is_prototype_of, 1);
    define_method(agent, seed, proto, "propertyIsEnumerable", proto_property_is_enumerable, 1);
    define_method(agent, seed, proto, "toString", proto_to_string, 0);
    define_method(agent, seed, proto, "valueOf", proto_value_of, 0);

    let ctor = bootstrap_constructor(agent, seed, object_constructor, "Object", 1, proto);
    define_method(agent, seed, ctor, "defineProperty", object_define_property, 3);
    define_method(agent, seed, ctor, "getOwnPropertyDescriptor", object_get_own_property_descriptor, 2);
    define_method(agent, seed, ctor, "getOwnPropertyNames", object_get_own_property_names, 1);
    define_method(agent, seed, ctor, "keys", object_keys, 1);
    define_method(agent, seed, ctor, "create", object_create, 2);
    define_method(agent, seed, ctor, "getPrototypeOf", object_get_prototype_of, 1);
    define_method(agent, seed, ctor, "setPrototypeOf", object_set_prototype_of, 2);
    define_method(agent, seed, ctor, "preventExtensions", object_prevent_extensions, 1);
    define_method(agent, seed, ctor, "freeze", object_freeze, 1);
    seed.register("%Object%", ctor);
    ctor
}

/// The property `same_value` check is exercised in descriptor validation;
/// keep a direct unit test close to the implementation that depends on it.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PropertyDescriptor;

    #[test]
    fn define_property_defaults_to_locked_down() {
        let mut agent = Agent::default();
        let obj = agent.create_ordinary_object();
        let key = agent.key_from_str("x");
        let ok = ordinary::define_own_property(
            &mut agent,
            obj,
            key,
            PropertyDescriptor::value_only(Value::Number(1.0)),
        )
        .unwrap();
        assert!(ok);
        let desc = ordinary::get_own_property(&mut agent, obj, key).unwrap().unwrap();
        assert_eq!(desc.value, Some(Value::Number(1.0)));
        assert_eq!(desc.writable, Some(false));
        assert_eq!(desc.enumerable, Some(false));
        assert_eq!(desc.configurable, Some(false));

        // Re-defining with a different value must be rejected.
        let ok = ordinary::define_own_property(
            &mut agent,
            obj,
            key,
            PropertyDescriptor::value_only(Value::Number(2.0)),
        )
        .unwrap();
        assert!(!ok);

        // A no-op redefinition is accepted.
        let ok = ordinary::define_own_property(
            &mut agent,
            obj,
            key,
            PropertyDescriptor::value_only(Value::Number(1.0)),
        )
        .unwrap();
        assert!(ok);
    }
}
