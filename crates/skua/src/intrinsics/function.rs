//! `%Function.prototype%` members, `%ThrowTypeError%`, and the `Function`
//! constructor (which refuses dynamic compilation after consulting the
//! host).

use crate::{
    agent::Agent,
    completion::JsResult,
    function::BoundFunctionData,
    intrinsics::{builtin_fn, bootstrap_constructor, define_method, error::ErrorKind, RealmSeed},
    object::{ObjectData, ObjectRecord, PropertyEntry, PropertyKey},
    operations::{call, create_list_from_array_like, ordinary_has_instance},
    value::{ObjectId, Value},
};

/// The behaviour of `%Function.prototype%` itself: accept any arguments and
/// return `undefined`.
pub(crate) fn prototype_behaviour(
    _agent: &mut Agent,
    _this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(Value::Undefined)
}

fn throw_type_error_behaviour(
    agent: &mut Agent,
    _this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Err(agent.throw_error(
        ErrorKind::Type,
        "'caller', 'callee', and 'arguments' properties may not be accessed on strict mode functions",
    ))
}

/// `%ThrowTypeError%`: a frozen, non-extensible thrower.
pub(crate) fn create_throw_type_error(agent: &mut Agent, seed: &RealmSeed) -> ObjectId {
    let func = builtin_fn(agent, seed, throw_type_error_behaviour, "", 0);
    let keys = [agent.heap.statics.length, agent.heap.statics.name];
    let record = agent.heap.object_mut(func);
    // length and name lock down entirely on this one function.
    for key in keys {
        if let Some(PropertyEntry::Data { configurable, writable, .. }) =
            record.properties.get_mut(&PropertyKey::String(key))
        {
            *configurable = false;
            *writable = false;
        }
    }
    record.extensible = false;
    func
}

fn function_constructor(
    agent: &mut Agent,
    _this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    // CreateDynamicFunction asks the host first, then this engine refuses:
    // compilation needs the external parser.
    let caller = agent.current_realm_id();
    let callee = agent.heap.object(func).realm;
    let hooks = std::rc::Rc::clone(&agent.hooks);
    hooks.ensure_can_compile_strings(agent, caller, callee)?;
    Err(agent.throw_error(ErrorKind::Type, "dynamic function compilation is not supported"))
}

fn function_proto_call(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let this_arg = args.first().copied().unwrap_or(Value::Undefined);
    let rest = if args.is_empty() { &[] } else { &args[1..] };
    call(agent, this, this_arg, rest)
}

fn function_proto_apply(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let this_arg = args.first().copied().unwrap_or(Value::Undefined);
    let arg_list = match args.get(1).copied() {
        None | Some(Value::Undefined | Value::Null) => Vec::new(),
        Some(list) => create_list_from_array_like(agent, list)?,
    };
    call(agent, this, this_arg, &arg_list)
}

fn function_proto_bind(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let Value::Object(target) = this else {
        return Err(agent.throw_error(ErrorKind::Type, "Function.prototype.bind requires a callable"));
    };
    if !agent.heap.object(target).is_callable() {
        return Err(agent.throw_error(ErrorKind::Type, "Function.prototype.bind requires a callable"));
    }
    let bound_this = args.first().copied().unwrap_or(Value::Undefined);
    let bound_args: Vec<Value> = args.iter().skip(1).copied().collect();

    let prototype = crate::ordinary::get_prototype_of(agent, target)?;
    let realm = agent.current_realm_id();
    let bound = agent.heap.alloc_object(ObjectRecord::new(
        prototype,
        ObjectData::BoundFunction(Box::new(BoundFunctionData {
            target,
            bound_this,
            bound_args,
        })),
        realm,
    ));

    // length: max(0, target.length - bound count); name: "bound " + name.
    let length_key = PropertyKey::String(agent.heap.statics.length);
    let target_len = match crate::ordinary::get_own_property(agent, target, length_key)? {
        Some(desc) => match desc.value {
            Some(Value::Number(n)) if n.is_finite() => n,
            _ => 0.0,
        },
        None => 0.0,
    };
    let bound_count = args.len().saturating_sub(1) as f64;
    let length = (target_len - bound_count).max(0.0);
    agent.heap.object_mut(bound).properties.insert(
        length_key,
        PropertyEntry::Data {
            value: Value::Number(length),
            writable: false,
            enumerable: false,
            configurable: true,
        },
    );
    let name_key = PropertyKey::String(agent.heap.statics.name);
    let target_name = match crate::ordinary::get_own_property(agent, target, name_key)? {
        Some(desc) => match desc.value {
            Some(Value::String(s)) => agent.heap.string(s).to_rust_string(),
            _ => String::new(),
        },
        None => String::new(),
    };
    let bound_name = agent.string_value(&format!("bound {target_name}"));
    agent.heap.object_mut(bound).properties.insert(
        name_key,
        PropertyEntry::Data { value: bound_name, writable: false, enumerable: false, configurable: true },
    );
    Ok(Value::Object(bound))
}

fn function_proto_to_string(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let Value::Object(id) = this else {
        return Err(agent.throw_error(ErrorKind::Type, "Function.prototype.toString requires a function"));
    };
    let hooks = std::rc::Rc::clone(&agent.hooks);
    if let ObjectData::Function(data) = &agent.heap.object(id).data {
        if let Some(text) = data.source_text.clone()
            && hooks.has_source_text_available(Value::Object(id))
        {
            return Ok(agent.string_value(&text));
        }
    } else if !agent.heap.object(id).is_callable() {
        return Err(agent.throw_error(ErrorKind::Type, "Function.prototype.toString requires a function"));
    }
    let name_key = PropertyKey::String(agent.heap.statics.name);
    let name = match crate::ordinary::get_own_property(agent, id, name_key)? {
        Some(desc) => match desc.value {
            Some(Value::String(s)) => agent.heap.string(s).to_rust_string(),
            _ => String::new(),
        },
        None => String::new(),
    };
    Ok(agent.string_value(&format!("function {name}() {{ [native code] }}")))
}

fn function_proto_has_instance(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    if !crate::operations::is_callable(&agent.heap, this) {
        return Ok(Value::Boolean(false));
    }
    Ok(Value::Boolean(ordinary_has_instance(agent, this, value)?))
}

/// Installs `%Function.prototype%` members and the `Function` constructor.
pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> ObjectId {
    let proto = seed.function_prototype;
    define_method(agent, seed, proto, "call", function_proto_call, 1);
    define_method(agent, seed, proto, "apply", function_proto_apply, 2);
    define_method(agent, seed, proto, "bind", function_proto_bind, 1);
    define_method(agent, seed, proto, "toString", function_proto_to_string, 0);

    let has_instance = builtin_fn(agent, seed, function_proto_has_instance, "[Symbol.hasInstance]", 1);
    let key = PropertyKey::Symbol(agent.heap.well_known.has_instance);
    agent.heap.object_mut(proto).properties.insert(
        key,
        PropertyEntry::Data {
            value: Value::Object(has_instance),
            writable: false,
            enumerable: false,
            configurable: false,
        },
    );

    // Restricted properties on the prototype route through the thrower.
    let thrower = seed.throw_type_error;
    for name in [agent.heap.statics.caller, agent.heap.statics.arguments] {
        agent.heap.object_mut(proto).properties.insert(
            PropertyKey::String(name),
            PropertyEntry::Accessor {
                get: Some(thrower),
                set: Some(thrower),
                enumerable: false,
                configurable: true,
            },
        );
    }

    let ctor = bootstrap_constructor(agent, seed, function_constructor, "Function", 1, proto);
    seed.register("%Function%", ctor);
    ctor
}
