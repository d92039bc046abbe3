//! Type conversions: the `To*` abstract operations.

use num_bigint::BigInt;

use crate::{
    agent::Agent,
    completion::JsResult,
    heap::Heap,
    intrinsics::error::ErrorKind,
    numeric::{number_to_string, wrap_to_int32, wrap_to_uint32},
    object::{ObjectData, ObjectRecord, PropertyKey},
    operations::{call, get_method},
    value::{BigIntId, JsString, ObjectId, StringId, Value},
};

/// Hint passed to `ToPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreferredType {
    Default,
    Number,
    String,
}

/// A numeric value after `ToNumeric`: either a Number or a BigInt.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Numeric {
    Number(f64),
    BigInt(BigIntId),
}

/// `ToPrimitive`: objects are asked via `@@toPrimitive`, then the ordinary
/// `valueOf`/`toString` dance; primitives pass through.
pub(crate) fn to_primitive(agent: &mut Agent, input: Value, hint: PreferredType) -> JsResult<Value> {
    let Value::Object(object) = input else {
        return Ok(input);
    };
    let to_primitive_sym = Value::Symbol(agent.heap.well_known.to_primitive);
    if let Some(exotic) = get_method(agent, input, to_primitive_sym)? {
        let hint_str = match hint {
            PreferredType::Default => "default",
            PreferredType::Number => "number",
            PreferredType::String => "string",
        };
        let hint_value = Value::String(agent.heap.intern_str(hint_str));
        let result = call(agent, exotic, input, &[hint_value])?;
        if result.is_object() {
            return Err(agent.throw_error(ErrorKind::Type, "@@toPrimitive must return a primitive"));
        }
        return Ok(result);
    }
    ordinary_to_primitive(agent, object, hint)
}

fn ordinary_to_primitive(agent: &mut Agent, object: ObjectId, hint: PreferredType) -> JsResult<Value> {
    let statics = agent.heap.statics;
    let method_names = if hint == PreferredType::String {
        [statics.to_string, statics.value_of]
    } else {
        [statics.value_of, statics.to_string]
    };
    for name in method_names {
        let method = crate::operations::get(agent, object, PropertyKey::String(name))?;
        if crate::operations::is_callable(&agent.heap, method) {
            let result = call(agent, method, Value::Object(object), &[])?;
            if !result.is_object() {
                return Ok(result);
            }
        }
    }
    Err(agent.throw_error(ErrorKind::Type, "cannot convert object to primitive value"))
}

/// `ToBoolean`. Never fails.
pub(crate) fn to_boolean(heap: &Heap, value: Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Boolean(b) => b,
        Value::Number(n) => !(n == 0.0 || n.is_nan()),
        Value::BigInt(id) => !num_traits::Zero::is_zero(heap.bigint(id)),
        Value::String(id) => !heap.string(id).is_empty(),
        Value::Symbol(_) | Value::Object(_) => true,
        Value::PrivateName(_) => unreachable!("private names never reach ToBoolean"),
    }
}

/// `ToNumber`; symbols and bigints refuse the coercion.
pub(crate) fn to_number(agent: &mut Agent, value: Value) -> JsResult<f64> {
    match value {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(n),
        Value::String(id) => Ok(agent.heap.string(id).to_number()),
        Value::BigInt(_) => Err(agent.throw_error(ErrorKind::Type, "cannot convert a BigInt to a number")),
        Value::Symbol(_) => Err(agent.throw_error(ErrorKind::Type, "cannot convert a Symbol to a number")),
        Value::Object(_) => {
            let prim = to_primitive(agent, value, PreferredType::Number)?;
            to_number(agent, prim)
        }
        Value::PrivateName(_) => Err(crate::completion::EngineError::internal(
            "private name reached ToNumber",
        )),
    }
}

/// `ToNumeric`: the operand form arithmetic operators use, keeping BigInts
/// intact.
pub(crate) fn to_numeric(agent: &mut Agent, value: Value) -> JsResult<Numeric> {
    let prim = to_primitive(agent, value, PreferredType::Number)?;
    if let Value::BigInt(id) = prim {
        return Ok(Numeric::BigInt(id));
    }
    to_number(agent, prim).map(Numeric::Number)
}

/// `ToInt32`.
pub(crate) fn to_int32(agent: &mut Agent, value: Value) -> JsResult<i32> {
    Ok(wrap_to_int32(to_number(agent, value)?))
}

/// `ToUint32`.
pub(crate) fn to_uint32(agent: &mut Agent, value: Value) -> JsResult<u32> {
    Ok(wrap_to_uint32(to_number(agent, value)?))
}

/// `ToIntegerOrInfinity`.
pub(crate) fn to_integer_or_infinity(agent: &mut Agent, value: Value) -> JsResult<f64> {
    let n = to_number(agent, value)?;
    if n.is_nan() || n == 0.0 {
        return Ok(0.0);
    }
    if n.is_infinite() {
        return Ok(n);
    }
    Ok(n.trunc())
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// `ToLength`: clamp into [0, 2^53 - 1].
pub(crate) fn to_length(agent: &mut Agent, value: Value) -> JsResult<u64> {
    let len = to_integer_or_infinity(agent, value)?;
    Ok(len.clamp(0.0, MAX_SAFE_INTEGER) as u64)
}

/// `ToIndex`: an integer in [0, 2^53 - 1], or a RangeError.
pub(crate) fn to_index(agent: &mut Agent, value: Value) -> JsResult<usize> {
    let integer = to_integer_or_infinity(agent, value)?;
    if integer < 0.0 || integer > MAX_SAFE_INTEGER {
        return Err(agent.throw_error(ErrorKind::Range, "index out of range"));
    }
    Ok(integer as usize)
}

/// `ToString`; symbols refuse the coercion.
pub(crate) fn to_string(agent: &mut Agent, value: Value) -> JsResult<StringId> {
    match value {
        Value::Undefined => Ok(agent.heap.statics.undefined),
        Value::Null => Ok(agent.heap.intern_str("null")),
        Value::Boolean(b) => Ok(agent.heap.intern_str(if b { "true" } else { "false" })),
        Value::Number(n) => {
            let text = number_to_string(n);
            Ok(agent.heap.intern_str(&text))
        }
        Value::BigInt(id) => {
            let text = crate::value::bigint_to_string(agent.heap.bigint(id));
            Ok(agent.heap.intern_str(&text))
        }
        Value::String(id) => Ok(id),
        Value::Symbol(_) => Err(agent.throw_error(ErrorKind::Type, "cannot convert a Symbol to a string")),
        Value::Object(_) => {
            let prim = to_primitive(agent, value, PreferredType::String)?;
            to_string(agent, prim)
        }
        Value::PrivateName(_) => Err(crate::completion::EngineError::internal(
            "private name reached ToString",
        )),
    }
}

/// `ToPropertyKey`.
pub(crate) fn to_property_key(agent: &mut Agent, value: Value) -> JsResult<PropertyKey> {
    let key = to_primitive(agent, value, PreferredType::String)?;
    if let Value::Symbol(id) = key {
        return Ok(PropertyKey::Symbol(id));
    }
    Ok(PropertyKey::String(to_string(agent, key)?))
}

/// `ToObject`: primitives box into their wrapper kinds; `undefined` and
/// `null` refuse.
pub(crate) fn to_object(agent: &mut Agent, value: Value) -> JsResult<ObjectId> {
    let realm = agent.current_realm_id();
    let (data, prototype) = match value {
        Value::Undefined | Value::Null => {
            return Err(agent.throw_error(ErrorKind::Type, "cannot convert undefined or null to object"));
        }
        Value::Object(id) => return Ok(id),
        Value::Boolean(b) => (ObjectData::BooleanObject(b), agent.intrinsics().boolean_prototype),
        Value::Number(n) => (ObjectData::NumberObject(n), agent.intrinsics().number_prototype),
        Value::String(id) => (ObjectData::StringObject(id), agent.intrinsics().string_prototype),
        Value::Symbol(id) => (ObjectData::SymbolObject(id), agent.intrinsics().symbol_prototype),
        Value::BigInt(id) => (ObjectData::BigIntObject(id), agent.intrinsics().bigint_prototype),
        Value::PrivateName(_) => {
            return Err(crate::completion::EngineError::internal("private name reached ToObject"));
        }
    };
    let mut record = ObjectRecord::new(Some(prototype), data, realm);
    if let Value::String(id) = value {
        // String exotic objects expose a non-writable length up front.
        let len = agent.heap.string(id).len();
        record.properties.insert(
            PropertyKey::String(agent.heap.statics.length),
            crate::object::PropertyEntry::Data {
                value: Value::Number(len as f64),
                writable: false,
                enumerable: false,
                configurable: false,
            },
        );
    }
    Ok(agent.heap.alloc_object(record))
}

/// `RequireObjectCoercible`.
pub(crate) fn require_object_coercible(agent: &mut Agent, value: Value) -> JsResult<Value> {
    if value.is_nullish() {
        return Err(agent.throw_error(ErrorKind::Type, "cannot coerce undefined or null"));
    }
    Ok(value)
}

/// `CanonicalNumericIndexString`: `"-0"` maps to negative zero, and a string
/// that round-trips through ToNumber/ToString maps to that number.
pub(crate) fn canonical_numeric_index(heap: &Heap, id: StringId) -> Option<f64> {
    let s = heap.string(id);
    if s.units() == JsString::from_str("-0").units() {
        return Some(-0.0);
    }
    let n = s.to_number();
    if JsString::from_str(&number_to_string(n)) == *s {
        Some(n)
    } else {
        None
    }
}

/// `ToBigInt`: booleans and bigints convert, everything else refuses.
pub(crate) fn to_bigint(agent: &mut Agent, value: Value) -> JsResult<BigIntId> {
    let prim = to_primitive(agent, value, PreferredType::Number)?;
    match prim {
        Value::BigInt(id) => Ok(id),
        Value::Boolean(b) => Ok(agent.heap.intern_bigint(BigInt::from(u8::from(b)))),
        Value::String(id) => {
            let text = agent.heap.string(id).to_rust_string();
            let trimmed = text.trim();
            let parsed = if trimmed.is_empty() {
                Some(BigInt::from(0))
            } else {
                trimmed.parse::<BigInt>().ok()
            };
            match parsed {
                Some(v) => Ok(agent.heap.intern_bigint(v)),
                None => Err(agent.throw_error(ErrorKind::Syntax, "cannot convert string to BigInt")),
            }
        }
        _ => Err(agent.throw_error(ErrorKind::Type, "cannot convert value to BigInt")),
    }
}
