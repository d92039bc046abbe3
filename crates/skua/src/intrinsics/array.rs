//! The `Array` constructor and `%Array.prototype%`.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::{to_integer_or_infinity, to_object, to_string, to_uint32},
    exotics::array::array_create,
    intrinsics::{
        bootstrap_constructor, define_method,
        error::ErrorKind,
        iterator::{create_array_iterator, IterationKind},
        RealmSeed,
    },
    object::{ObjectData, PropertyEntry, PropertyKey},
    operations::{
        call, delete_property_or_throw, get, is_callable, is_strictly_equal, length_of_array_like,
        set_property,
    },
    ordinary,
    value::{ObjectId, Value},
};

fn array_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    match args {
        [] => Ok(Value::Object(array_create(agent, 0, None)?)),
        [Value::Number(len)] => {
            let int_len = to_uint32(agent, Value::Number(*len))?;
            if f64::from(int_len) != *len {
                return Err(agent.throw_error(ErrorKind::Range, "invalid array length"));
            }
            Ok(Value::Object(array_create(agent, u64::from(int_len), None)?))
        }
        items => {
            let array = crate::exotics::array::create_array_from_list(agent, items)?;
            Ok(Value::Object(array))
        }
    }
}

fn array_is_array(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let mut value = args.first().copied().unwrap_or(Value::Undefined);
    // IsArray looks through proxies to their targets.
    loop {
        let Value::Object(id) = value else {
            return Ok(Value::Boolean(false));
        };
        match &agent.heap.object(id).data {
            ObjectData::Array => return Ok(Value::Boolean(true)),
            ObjectData::Proxy(proxy) => match proxy.target {
                Some(target) => value = Value::Object(target),
                None => {
                    return Err(agent.throw_error(ErrorKind::Type, "cannot test a revoked proxy"));
                }
            },
            _ => return Ok(Value::Boolean(false)),
        }
    }
}

fn array_proto_push(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    let mut len = length_of_array_like(agent, o)?;
    for &arg in args {
        let key = agent.key_for_index(len);
        set_property(agent, o, key, arg, true)?;
        len += 1;
    }
    let length_key = PropertyKey::String(agent.heap.statics.length);
    set_property(agent, o, length_key, Value::Number(len as f64), true)?;
    Ok(Value::Number(len as f64))
}

fn array_proto_pop(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    let len = length_of_array_like(agent, o)?;
    let length_key = PropertyKey::String(agent.heap.statics.length);
    if len == 0 {
        set_property(agent, o, length_key, Value::Number(0.0), true)?;
        return Ok(Value::Undefined);
    }
    let key = agent.key_for_index(len - 1);
    let element = get(agent, o, key)?;
    delete_property_or_throw(agent, o, key)?;
    set_property(agent, o, length_key, Value::Number((len - 1) as f64), true)?;
    Ok(element)
}

fn array_proto_join(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    let len = length_of_array_like(agent, o)?;
    let separator = match args.first().copied() {
        None | Some(Value::Undefined) => ",".to_owned(),
        Some(v) => {
            let id = to_string(agent, v)?;
            agent.heap.string(id).to_rust_string()
        }
    };
    let mut out = String::new();
    for i in 0..len {
        if i > 0 {
            out.push_str(&separator);
        }
        let key = agent.key_for_index(i);
        let element = get(agent, o, key)?;
        if !element.is_nullish() {
            let id = to_string(agent, element)?;
            out.push_str(&agent.heap.string(id).to_rust_string());
        }
    }
    Ok(agent.string_value(&out))
}

fn array_proto_index_of(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    let len = length_of_array_like(agent, o)?;
    let search = args.first().copied().unwrap_or(Value::Undefined);
    let mut start = match args.get(1).copied() {
        None => 0.0,
        Some(v) => to_integer_or_infinity(agent, v)?,
    };
    if start < 0.0 {
        start += len as f64;
    }
    let mut index = start.max(0.0) as u64;
    while index < len {
        let key = agent.key_for_index(index);
        if ordinary::has_property(agent, o, key)? {
            let element = get(agent, o, key)?;
            if is_strictly_equal(element, search) {
                return Ok(Value::Number(index as f64));
            }
        }
        index += 1;
    }
    Ok(Value::Number(-1.0))
}

fn array_proto_slice(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    let len = length_of_array_like(agent, o)? as f64;
    let relative_start = match args.first().copied() {
        None => 0.0,
        Some(v) => to_integer_or_infinity(agent, v)?,
    };
    let start = if relative_start < 0.0 {
        (len + relative_start).max(0.0)
    } else {
        relative_start.min(len)
    };
    let relative_end = match args.get(1).copied() {
        None | Some(Value::Undefined) => len,
        Some(v) => to_integer_or_infinity(agent, v)?,
    };
    let end = if relative_end < 0.0 {
        (len + relative_end).max(0.0)
    } else {
        relative_end.min(len)
    };
    let count = (end - start).max(0.0) as u64;
    let result = array_create(agent, count, None)?;
    let mut n = 0u64;
    let mut k = start as u64;
    while n < count {
        let from = agent.key_for_index(k);
        if ordinary::has_property(agent, o, from)? {
            let element = get(agent, o, from)?;
            let to = agent.key_for_index(n);
            crate::operations::create_data_property_or_throw(agent, result, to, element)?;
        }
        k += 1;
        n += 1;
    }
    Ok(Value::Object(result))
}

/// `SortCompare`: the supplied comparator with NaN results treated as 0,
/// or the default code-unit string ordering.
fn sort_compare(agent: &mut Agent, comparator: Option<Value>, a: Value, b: Value) -> JsResult<std::cmp::Ordering> {
    use std::cmp::Ordering;
    // undefined sorts to the end regardless of comparator.
    if a == Value::Undefined && b == Value::Undefined {
        return Ok(Ordering::Equal);
    }
    if a == Value::Undefined {
        return Ok(Ordering::Greater);
    }
    if b == Value::Undefined {
        return Ok(Ordering::Less);
    }
    if let Some(comparator) = comparator {
        let result = call(agent, comparator, Value::Undefined, &[a, b])?;
        let n = crate::conversion::to_number(agent, result)?;
        // A NaN comparator result counts as "equal".
        return Ok(if n < 0.0 {
            Ordering::Less
        } else if n > 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        });
    }
    let xs = to_string(agent, a)?;
    let ys = to_string(agent, b)?;
    Ok(agent.heap.string(xs).cmp(agent.heap.string(ys)))
}

/// Stable, fallible merge sort; the comparator may run user code.
fn merge_sort(agent: &mut Agent, comparator: Option<Value>, items: Vec<Value>) -> JsResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mid = items.len() / 2;
    let mut right = items;
    let left = merge_sort(agent, comparator, right.drain(..mid).collect())?;
    let right = merge_sort(agent, comparator, right)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut l = left.into_iter().peekable();
    let mut r = right.into_iter().peekable();
    while let (Some(&a), Some(&b)) = (l.peek(), r.peek()) {
        if sort_compare(agent, comparator, a, b)? == std::cmp::Ordering::Greater {
            out.push(b);
            r.next();
        } else {
            out.push(a);
            l.next();
        }
    }
    out.extend(l);
    out.extend(r);
    Ok(out)
}

fn array_proto_sort(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let comparator = match args.first().copied() {
        None | Some(Value::Undefined) => None,
        Some(c) if is_callable(&agent.heap, c) => Some(c),
        Some(_) => {
            return Err(agent.throw_error(ErrorKind::Type, "the comparator must be callable or undefined"));
        }
    };
    let o = to_object(agent, this)?;
    let len = length_of_array_like(agent, o)?;
    // Read out present elements, sort, write back; holes collapse to the
    // tail.
    let mut items = Vec::new();
    for i in 0..len {
        let key = agent.key_for_index(i);
        if ordinary::has_property(agent, o, key)? {
            items.push(get(agent, o, key)?);
        }
    }
    let items = merge_sort(agent, comparator, items)?;
    for (i, &item) in items.iter().enumerate() {
        let key = agent.key_for_index(i as u64);
        set_property(agent, o, key, item, true)?;
    }
    for i in items.len() as u64..len {
        let key = agent.key_for_index(i);
        delete_property_or_throw(agent, o, key)?;
    }
    Ok(Value::Object(o))
}

fn array_proto_values(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    Ok(Value::Object(create_array_iterator(agent, o, IterationKind::Value)))
}

fn array_proto_keys(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    Ok(Value::Object(create_array_iterator(agent, o, IterationKind::Key)))
}

fn array_proto_entries(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = to_object(agent, this)?;
    Ok(Value::Object(create_array_iterator(agent, o, IterationKind::KeyAndValue)))
}

/// Bootstraps Array. The prototype is itself an array exotic object with
/// length zero.
pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> (ObjectId, ObjectId, ObjectId) {
    let realm = seed.realm;
    let mut record =
        crate::object::ObjectRecord::new(Some(seed.object_prototype), ObjectData::Array, realm);
    record.properties.insert(
        PropertyKey::String(agent.heap.statics.length),
        PropertyEntry::Data {
            value: Value::Number(0.0),
            writable: true,
            enumerable: false,
            configurable: false,
        },
    );
    let proto = agent.heap.alloc_object(record);

    define_method(agent, seed, proto, "push", array_proto_push, 1);
    define_method(agent, seed, proto, "pop", array_proto_pop, 0);
    define_method(agent, seed, proto, "join", array_proto_join, 1);
    define_method(agent, seed, proto, "indexOf", array_proto_index_of, 1);
    define_method(agent, seed, proto, "slice", array_proto_slice, 2);
    define_method(agent, seed, proto, "sort", array_proto_sort, 1);
    define_method(agent, seed, proto, "toString", array_proto_join, 0);
    let values = define_method(agent, seed, proto, "values", array_proto_values, 0);
    define_method(agent, seed, proto, "keys", array_proto_keys, 0);
    define_method(agent, seed, proto, "entries", array_proto_entries, 0);
    let iter_key = PropertyKey::Symbol(agent.heap.well_known.iterator);
    crate::intrinsics::define_data(agent, proto, iter_key, Value::Object(values));

    let ctor = bootstrap_constructor(agent, seed, array_constructor, "Array", 1, proto);
    define_method(agent, seed, ctor, "isArray", array_is_array, 1);

    seed.register("%Array%", ctor);
    seed.register("%Array.prototype%", proto);
    seed.register("%Array.prototype.values%", values);
    (ctor, proto, values)
}
