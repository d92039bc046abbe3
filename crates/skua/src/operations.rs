//! Operations on objects and the testing/comparison family: the glue between
//! language evaluation and the per-object internal methods.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::{to_boolean, to_number, to_object, to_primitive, to_property_key, PreferredType},
    heap::Heap,
    intrinsics::error::ErrorKind,
    numeric::{number_same_value, number_same_value_zero},
    object::{ObjectData, PropertyDescriptor, PropertyKey},
    ordinary,
    value::{ObjectId, Value},
};

/// `Get(O, P)`.
pub(crate) fn get(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<Value> {
    ordinary::get_with_receiver(agent, o, key, Value::Object(o))
}

/// `GetV(V, P)`: property lookup on any value through its wrapper.
pub(crate) fn get_v(agent: &mut Agent, value: Value, key: PropertyKey) -> JsResult<Value> {
    let o = to_object(agent, value)?;
    ordinary::get_with_receiver(agent, o, key, value)
}

/// `Set(O, P, V, Throw)`.
pub(crate) fn set_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
    throw: bool,
) -> JsResult<()> {
    let success = ordinary::set_with_receiver(agent, o, key, value, Value::Object(o))?;
    if !success && throw {
        let name = key.display(&agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("cannot set property '{name}'")));
    }
    Ok(())
}

/// `CreateDataProperty(O, P, V)`: assignment-default attributes.
pub(crate) fn create_data_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
) -> JsResult<bool> {
    ordinary::define_own_property(agent, o, key, PropertyDescriptor::full_data(value, true, true, true))
}

pub(crate) fn create_data_property_or_throw(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
) -> JsResult<()> {
    if !create_data_property(agent, o, key, value)? {
        let name = key.display(&agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("cannot create property '{name}'")));
    }
    Ok(())
}

pub(crate) fn define_property_or_throw(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<()> {
    if !ordinary::define_own_property(agent, o, key, desc)? {
        let name = key.display(&agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("cannot redefine property '{name}'")));
    }
    Ok(())
}

pub(crate) fn delete_property_or_throw(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<()> {
    if !ordinary::delete(agent, o, key)? {
        let name = key.display(&agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("cannot delete property '{name}'")));
    }
    Ok(())
}

/// `GetMethod(V, P)`: `undefined`/`null` methods are absent, anything else
/// must be callable.
pub(crate) fn get_method(agent: &mut Agent, value: Value, key: Value) -> JsResult<Option<Value>> {
    let key = to_property_key(agent, key)?;
    let func = get_v(agent, value, key)?;
    if func.is_nullish() {
        return Ok(None);
    }
    if !is_callable(&agent.heap, func) {
        let name = key.display(&agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("property '{name}' is not a function")));
    }
    Ok(Some(func))
}

/// `Call(F, V, argumentsList)`.
pub(crate) fn call(agent: &mut Agent, func: Value, this: Value, args: &[Value]) -> JsResult<Value> {
    if !is_callable(&agent.heap, func) {
        let brief = crate::value::brief(func, &agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("{brief} is not a function")));
    }
    let Value::Object(id) = func else { unreachable!() };
    crate::interpreter::call_function(agent, id, this, args)
}

/// `Invoke(V, P, argumentsList)`.
pub(crate) fn invoke(agent: &mut Agent, value: Value, key: PropertyKey, args: &[Value]) -> JsResult<Value> {
    let func = get_v(agent, value, key)?;
    call(agent, func, value, args)
}

pub(crate) fn is_callable(heap: &Heap, value: Value) -> bool {
    match value {
        Value::Object(id) => heap.object(id).is_callable(),
        _ => false,
    }
}

pub(crate) fn is_constructor(heap: &Heap, value: Value) -> bool {
    match value {
        Value::Object(id) => heap.object(id).is_constructor(),
        _ => false,
    }
}

/// `LengthOfArrayLike(O)`.
pub(crate) fn length_of_array_like(agent: &mut Agent, o: ObjectId) -> JsResult<u64> {
    let length = get(agent, o, PropertyKey::String(agent.heap.statics.length))?;
    crate::conversion::to_length(agent, length)
}

/// `CreateListFromArrayLike(O)` restricted to language values.
pub(crate) fn create_list_from_array_like(agent: &mut Agent, value: Value) -> JsResult<Vec<Value>> {
    let Value::Object(o) = value else {
        return Err(agent.throw_error(ErrorKind::Type, "expected an array-like object"));
    };
    let length = length_of_array_like(agent, o)?;
    let mut list = Vec::with_capacity(length as usize);
    for i in 0..length {
        let key = agent.key_for_index(i);
        list.push(get(agent, o, key)?);
    }
    Ok(list)
}

// --- descriptors as objects ---

/// `FromPropertyDescriptor`.
pub(crate) fn from_property_descriptor(agent: &mut Agent, desc: PropertyDescriptor) -> JsResult<Value> {
    let obj = agent.create_ordinary_object();
    let fields: [(&str, Option<Value>); 6] = [
        ("value", desc.value),
        ("writable", desc.writable.map(Value::Boolean)),
        ("get", desc.get),
        ("set", desc.set),
        ("enumerable", desc.enumerable.map(Value::Boolean)),
        ("configurable", desc.configurable.map(Value::Boolean)),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            let key = PropertyKey::String(agent.heap.intern_str(name));
            create_data_property_or_throw(agent, obj, key, value)?;
        }
    }
    Ok(Value::Object(obj))
}

/// `ToPropertyDescriptor`.
pub(crate) fn to_property_descriptor(agent: &mut Agent, value: Value) -> JsResult<PropertyDescriptor> {
    let Value::Object(o) = value else {
        return Err(agent.throw_error(ErrorKind::Type, "property descriptor must be an object"));
    };
    let mut desc = PropertyDescriptor::default();
    let field = |agent: &mut Agent, name: &str| -> JsResult<Option<Value>> {
        let key = PropertyKey::String(agent.heap.intern_str(name));
        if ordinary::has_property(agent, o, key)? {
            Ok(Some(get(agent, o, key)?))
        } else {
            Ok(None)
        }
    };
    if let Some(v) = field(agent, "enumerable")? {
        desc.enumerable = Some(to_boolean(&agent.heap, v));
    }
    if let Some(v) = field(agent, "configurable")? {
        desc.configurable = Some(to_boolean(&agent.heap, v));
    }
    if let Some(v) = field(agent, "value")? {
        desc.value = Some(v);
    }
    if let Some(v) = field(agent, "writable")? {
        desc.writable = Some(to_boolean(&agent.heap, v));
    }
    if let Some(v) = field(agent, "get")? {
        if !v.is_nullish() && !is_callable(&agent.heap, v) && v != Value::Undefined {
            return Err(agent.throw_error(ErrorKind::Type, "getter must be callable"));
        }
        desc.get = Some(if v == Value::Null { Value::Undefined } else { v });
    }
    if let Some(v) = field(agent, "set")? {
        if !v.is_nullish() && !is_callable(&agent.heap, v) && v != Value::Undefined {
            return Err(agent.throw_error(ErrorKind::Type, "setter must be callable"));
        }
        desc.set = Some(if v == Value::Null { Value::Undefined } else { v });
    }
    if (desc.get.is_some() || desc.set.is_some()) && (desc.value.is_some() || desc.writable.is_some()) {
        return Err(agent.throw_error(
            ErrorKind::Type,
            "property descriptor cannot mix accessor and data fields",
        ));
    }
    Ok(desc)
}

// --- testing and comparison ---

/// `SameValue`: NaN equals NaN, the zeros are distinct. The heap parameter
/// keeps the signature uniform with the other comparisons; interning makes
/// the id comparisons structural without it.
pub(crate) fn same_value(_heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_same_value(x, y),
        _ => a == b,
    }
}

/// `SameValueZero`: NaN equals NaN, the zeros coincide.
pub(crate) fn same_value_zero(_heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_same_value_zero(x, y),
        _ => a == b,
    }
}

/// Strict equality (`===`). Interned ids make the derived equality exactly
/// right for every case, including the IEEE Number rules.
pub(crate) fn is_strictly_equal(a: Value, b: Value) -> bool {
    a == b
}

/// Loose equality (`==`).
pub(crate) fn is_loosely_equal(agent: &mut Agent, a: Value, b: Value) -> JsResult<bool> {
    if std::mem::discriminant(&a) == std::mem::discriminant(&b) {
        return Ok(is_strictly_equal(a, b));
    }
    match (a, b) {
        (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => Ok(true),
        (Value::Number(x), Value::String(s)) => Ok(x == agent.heap.string(s).to_number()),
        (Value::String(s), Value::Number(y)) => Ok(agent.heap.string(s).to_number() == y),
        (Value::BigInt(x), Value::String(s)) | (Value::String(s), Value::BigInt(x)) => {
            let text = agent.heap.string(s).to_rust_string();
            match text.trim().parse::<num_bigint::BigInt>() {
                Ok(parsed) => Ok(&parsed == agent.heap.bigint(x)),
                Err(_) => Ok(text.trim().is_empty() && num_traits::Zero::is_zero(agent.heap.bigint(x))),
            }
        }
        (Value::Boolean(_), _) => {
            let x = to_number(agent, a)?;
            is_loosely_equal(agent, Value::Number(x), b)
        }
        (_, Value::Boolean(_)) => {
            let y = to_number(agent, b)?;
            is_loosely_equal(agent, a, Value::Number(y))
        }
        (Value::BigInt(x), Value::Number(y)) | (Value::Number(y), Value::BigInt(x)) => {
            if !y.is_finite() || y.fract() != 0.0 {
                return Ok(false);
            }
            Ok(agent.heap.bigint(x) == &num_bigint::BigInt::from(y as i64))
        }
        (Value::Object(_), Value::Number(_) | Value::String(_) | Value::BigInt(_) | Value::Symbol(_)) => {
            let prim = to_primitive(agent, a, PreferredType::Default)?;
            is_loosely_equal(agent, prim, b)
        }
        (Value::Number(_) | Value::String(_) | Value::BigInt(_) | Value::Symbol(_), Value::Object(_)) => {
            let prim = to_primitive(agent, b, PreferredType::Default)?;
            is_loosely_equal(agent, a, prim)
        }
        _ => Ok(false),
    }
}

/// `IsLessThan(x, y, LeftFirst)`; `None` means an undefined comparison (a
/// NaN was involved).
pub(crate) fn is_less_than(
    agent: &mut Agent,
    x: Value,
    y: Value,
    left_first: bool,
) -> JsResult<Option<bool>> {
    let (px, py) = if left_first {
        let px = to_primitive(agent, x, PreferredType::Number)?;
        let py = to_primitive(agent, y, PreferredType::Number)?;
        (px, py)
    } else {
        let py = to_primitive(agent, y, PreferredType::Number)?;
        let px = to_primitive(agent, x, PreferredType::Number)?;
        (px, py)
    };
    if let (Value::String(a), Value::String(b)) = (px, py) {
        return Ok(Some(agent.heap.string(a) < agent.heap.string(b)));
    }
    match (px, py) {
        (Value::BigInt(a), Value::BigInt(b)) => Ok(Some(agent.heap.bigint(a) < agent.heap.bigint(b))),
        (Value::BigInt(a), _) => {
            let n = to_number(agent, py)?;
            if n.is_nan() {
                return Ok(None);
            }
            let a = agent.heap.bigint(a);
            Ok(Some(bigint_less_than_number(a, n)))
        }
        (_, Value::BigInt(b)) => {
            let n = to_number(agent, px)?;
            if n.is_nan() {
                return Ok(None);
            }
            let b = agent.heap.bigint(b);
            Ok(Some(number_less_than_bigint(n, b)))
        }
        _ => {
            let a = to_number(agent, px)?;
            let b = to_number(agent, py)?;
            if a.is_nan() || b.is_nan() {
                return Ok(None);
            }
            Ok(Some(a < b))
        }
    }
}

fn bigint_less_than_number(a: &num_bigint::BigInt, n: f64) -> bool {
    use num_traits::FromPrimitive;
    if n == f64::INFINITY {
        return true;
    }
    if n == f64::NEG_INFINITY {
        return false;
    }
    // a < n exactly when a < floor(n), or a == floor(n) with a fractional
    // remainder left over.
    let floor = num_bigint::BigInt::from_f64(n.floor()).expect("finite float");
    a < &floor || (*a == floor && n.fract() != 0.0)
}

fn number_less_than_bigint(n: f64, b: &num_bigint::BigInt) -> bool {
    use num_traits::FromPrimitive;
    if n == f64::NEG_INFINITY {
        return true;
    }
    if n == f64::INFINITY {
        return false;
    }
    // n < b exactly when floor(n) < b.
    let floor = num_bigint::BigInt::from_f64(n.floor()).expect("finite float");
    floor < *b
}

/// `OrdinaryHasInstance(C, O)`.
pub(crate) fn ordinary_has_instance(agent: &mut Agent, ctor: Value, value: Value) -> JsResult<bool> {
    if !is_callable(&agent.heap, ctor) {
        return Err(agent.throw_error(ErrorKind::Type, "right-hand side of instanceof is not callable"));
    }
    let Value::Object(ctor_id) = ctor else { unreachable!() };
    if let ObjectData::BoundFunction(bound) = &agent.heap.object(ctor_id).data {
        let target = bound.target;
        return ordinary_has_instance(agent, Value::Object(target), value);
    }
    let Value::Object(mut o) = value else {
        return Ok(false);
    };
    let proto = get(agent, ctor_id, PropertyKey::String(agent.heap.statics.prototype))?;
    let Value::Object(proto) = proto else {
        return Err(agent.throw_error(ErrorKind::Type, "constructor prototype is not an object"));
    };
    loop {
        match ordinary::get_prototype_of(agent, o)? {
            None => return Ok(false),
            Some(parent) => {
                if parent == proto {
                    return Ok(true);
                }
                o = parent;
            }
        }
    }
}

/// The `instanceof` operator, honoring `@@hasInstance`.
pub(crate) fn instanceof_operator(agent: &mut Agent, value: Value, target: Value) -> JsResult<bool> {
    if !target.is_object() {
        return Err(agent.throw_error(ErrorKind::Type, "right-hand side of instanceof is not an object"));
    }
    let has_instance_sym = Value::Symbol(agent.heap.well_known.has_instance);
    if let Some(method) = get_method(agent, target, has_instance_sym)? {
        let result = call(agent, method, target, &[value])?;
        return Ok(to_boolean(&agent.heap, result));
    }
    ordinary_has_instance(agent, target, value)
}

/// EnumerateObjectProperties: own and inherited enumerable string keys,
/// prototype-chain order with shadowing, each key reported once.
pub(crate) fn enumerate_object_properties(agent: &mut Agent, o: ObjectId) -> JsResult<Vec<PropertyKey>> {
    let mut visited: Vec<PropertyKey> = Vec::new();
    let mut result = Vec::new();
    let mut current = Some(o);
    while let Some(object) = current {
        for key in ordinary::own_property_keys(agent, object)? {
            if matches!(key, PropertyKey::Symbol(_)) || visited.contains(&key) {
                continue;
            }
            visited.push(key);
            if let Some(desc) = ordinary::get_own_property(agent, object, key)?
                && desc.enumerable == Some(true)
            {
                result.push(key);
            }
        }
        current = ordinary::get_prototype_of(agent, object)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;

    #[test]
    fn same_value_and_strict_equality_split_on_zeros_and_nan() {
        let agent = Agent::default();
        let nan = Value::Number(f64::NAN);
        let pz = Value::Number(0.0);
        let nz = Value::Number(-0.0);
        assert!(same_value(&agent.heap, nan, nan));
        assert!(!same_value(&agent.heap, pz, nz));
        assert!(!is_strictly_equal(nan, nan));
        assert!(is_strictly_equal(pz, nz));
        assert!(same_value_zero(&agent.heap, pz, nz));
    }
}
