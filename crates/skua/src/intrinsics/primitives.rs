//! Wrapper constructors and prototypes for the primitive kinds: Boolean,
//! Number, String, Symbol and BigInt.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::{to_boolean, to_integer_or_infinity, to_number, to_string},
    intrinsics::{
        bootstrap_constructor, bootstrap_prototype, define_accessor, define_method,
        error::ErrorKind,
        RealmSeed,
    },
    numeric::number_to_string,
    object::ObjectData,
    value::{JsString, ObjectId, Value},
};

pub(crate) struct PrimitivesInit {
    pub boolean_prototype: ObjectId,
    pub number_prototype: ObjectId,
    pub string_prototype: ObjectId,
    pub symbol: ObjectId,
    pub symbol_prototype: ObjectId,
    pub bigint_prototype: ObjectId,
}

// --- this-value extraction for the wrapper prototypes ---

fn this_boolean(agent: &mut Agent, this: Value) -> JsResult<bool> {
    match this {
        Value::Boolean(b) => Ok(b),
        Value::Object(id) => match agent.heap.object(id).data {
            ObjectData::BooleanObject(b) => Ok(b),
            _ => Err(agent.throw_error(ErrorKind::Type, "not a Boolean")),
        },
        _ => Err(agent.throw_error(ErrorKind::Type, "not a Boolean")),
    }
}

fn this_number(agent: &mut Agent, this: Value) -> JsResult<f64> {
    match this {
        Value::Number(n) => Ok(n),
        Value::Object(id) => match agent.heap.object(id).data {
            ObjectData::NumberObject(n) => Ok(n),
            _ => Err(agent.throw_error(ErrorKind::Type, "not a Number")),
        },
        _ => Err(agent.throw_error(ErrorKind::Type, "not a Number")),
    }
}

fn this_string(agent: &mut Agent, this: Value) -> JsResult<crate::value::StringId> {
    match this {
        Value::String(id) => Ok(id),
        Value::Object(id) => match agent.heap.object(id).data {
            ObjectData::StringObject(s) => Ok(s),
            _ => Err(agent.throw_error(ErrorKind::Type, "not a String")),
        },
        _ => Err(agent.throw_error(ErrorKind::Type, "not a String")),
    }
}

// --- Boolean ---

fn boolean_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let b = to_boolean(&agent.heap, args.first().copied().unwrap_or(Value::Undefined));
    if new_target.is_none() {
        return Ok(Value::Boolean(b));
    }
    let prototype = agent.intrinsics().boolean_prototype;
    let realm = agent.current_realm_id();
    let obj = agent.heap.alloc_object(crate::object::ObjectRecord::new(
        Some(prototype),
        ObjectData::BooleanObject(b),
        realm,
    ));
    Ok(Value::Object(obj))
}

fn boolean_proto_to_string(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let b = this_boolean(agent, this)?;
    Ok(agent.string_value(if b { "true" } else { "false" }))
}

fn boolean_proto_value_of(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(Value::Boolean(this_boolean(agent, this)?))
}

// --- Number ---

fn number_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let n = match args.first().copied() {
        None => 0.0,
        Some(v) => to_number(agent, v)?,
    };
    if new_target.is_none() {
        return Ok(Value::Number(n));
    }
    let prototype = agent.intrinsics().number_prototype;
    let realm = agent.current_realm_id();
    let obj = agent.heap.alloc_object(crate::object::ObjectRecord::new(
        Some(prototype),
        ObjectData::NumberObject(n),
        realm,
    ));
    Ok(Value::Object(obj))
}

fn number_proto_to_string(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let n = this_number(agent, this)?;
    match args.first().copied() {
        None | Some(Value::Undefined) => Ok(agent.string_value(&number_to_string(n))),
        Some(radix_value) => {
            let radix = to_integer_or_infinity(agent, radix_value)?;
            if !(2.0..=36.0).contains(&radix) {
                return Err(agent.throw_error(ErrorKind::Range, "toString radix must be between 2 and 36"));
            }
            if radix == 10.0 {
                return Ok(agent.string_value(&number_to_string(n)));
            }
            Ok(agent.string_value(&integer_to_radix_string(n, radix as u32)))
        }
    }
}

/// Non-decimal radix output for integral values; fractional digits follow
/// the simple repeated-multiplication scheme.
fn integer_to_radix_string(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() };
    }
    let negative = n < 0.0;
    let mut int_part = n.abs().trunc();
    let mut frac_part = n.abs().fract();
    let digit = |d: u32| char::from_digit(d, radix).expect("digit below radix");
    let mut digits = Vec::new();
    if int_part == 0.0 {
        digits.push('0');
    }
    while int_part >= 1.0 {
        digits.push(digit((int_part % f64::from(radix)) as u32));
        int_part = (int_part / f64::from(radix)).trunc();
    }
    if negative {
        digits.push('-');
    }
    let mut out: String = digits.into_iter().rev().collect();
    if frac_part > 0.0 {
        out.push('.');
        for _ in 0..20 {
            if frac_part == 0.0 {
                break;
            }
            frac_part *= f64::from(radix);
            out.push(digit(frac_part.trunc() as u32));
            frac_part = frac_part.fract();
        }
    }
    out
}

fn number_proto_value_of(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(Value::Number(this_number(agent, this)?))
}

fn number_is_nan(
    _agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(Value::Boolean(matches!(args.first(), Some(Value::Number(n)) if n.is_nan())))
}

fn number_is_finite(
    _agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(Value::Boolean(matches!(args.first(), Some(Value::Number(n)) if n.is_finite())))
}

// --- String ---

fn string_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let s = match args.first().copied() {
        None => agent.heap.statics.empty,
        Some(Value::Symbol(sym)) if new_target.is_none() => {
            // String(symbol) is the one place symbols stringify.
            let text = match agent.heap.symbol(sym).description {
                Some(d) => format!("Symbol({})", agent.heap.string(d)),
                None => "Symbol()".to_owned(),
            };
            agent.heap.intern_str(&text)
        }
        Some(v) => to_string(agent, v)?,
    };
    if new_target.is_none() {
        return Ok(Value::String(s));
    }
    Ok(Value::Object(crate::conversion::to_object(agent, Value::String(s))?))
}

fn string_from_char_code(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let mut units = Vec::with_capacity(args.len());
    for &arg in args {
        let n = to_number(agent, arg)?;
        units.push(crate::numeric::wrap_to_uint32(n) as u16);
    }
    Ok(agent.intern_js_string(JsString::from_units(units)))
}

fn string_proto_char_code_at(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let s = this_string(agent, this)?;
    let pos = to_integer_or_infinity(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    if pos < 0.0 || pos >= agent.heap.string(s).len() as f64 {
        return Ok(Value::Number(f64::NAN));
    }
    let unit = agent.heap.string(s).code_unit_at(pos as usize).expect("bounds checked");
    Ok(Value::Number(f64::from(unit)))
}

fn string_proto_char_at(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let s = this_string(agent, this)?;
    let pos = to_integer_or_infinity(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    if pos < 0.0 || pos >= agent.heap.string(s).len() as f64 {
        return Ok(Value::String(agent.heap.statics.empty));
    }
    let unit = agent.heap.string(s).code_unit_at(pos as usize).expect("bounds checked");
    Ok(agent.intern_js_string(JsString::from_units(vec![unit])))
}

fn string_proto_index_of(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let s = this_string(agent, this)?;
    let needle = to_string(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let haystack = agent.heap.string(s).units().to_vec();
    let needle = agent.heap.string(needle).units().to_vec();
    if needle.is_empty() {
        return Ok(Value::Number(0.0));
    }
    let found = haystack
        .windows(needle.len())
        .position(|window| window == needle.as_slice());
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn string_proto_to_string(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(Value::String(this_string(agent, this)?))
}

// --- Symbol ---

fn symbol_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_some() {
        return Err(agent.throw_error(ErrorKind::Type, "Symbol is not a constructor"));
    }
    let description = match args.first().copied() {
        None | Some(Value::Undefined) => None,
        Some(v) => Some(to_string(agent, v)?),
    };
    Ok(Value::Symbol(agent.heap.alloc_symbol(description)))
}

fn symbol_proto_to_string(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let sym = match this {
        Value::Symbol(id) => id,
        Value::Object(id) => match agent.heap.object(id).data {
            ObjectData::SymbolObject(s) => s,
            _ => return Err(agent.throw_error(ErrorKind::Type, "not a Symbol")),
        },
        _ => return Err(agent.throw_error(ErrorKind::Type, "not a Symbol")),
    };
    let text = match agent.heap.symbol(sym).description {
        Some(d) => format!("Symbol({})", agent.heap.string(d)),
        None => "Symbol()".to_owned(),
    };
    Ok(agent.string_value(&text))
}

fn symbol_description_getter(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let sym = match this {
        Value::Symbol(id) => id,
        Value::Object(id) => match agent.heap.object(id).data {
            ObjectData::SymbolObject(s) => s,
            _ => return Err(agent.throw_error(ErrorKind::Type, "not a Symbol")),
        },
        _ => return Err(agent.throw_error(ErrorKind::Type, "not a Symbol")),
    };
    Ok(agent
        .heap
        .symbol(sym)
        .description
        .map_or(Value::Undefined, Value::String))
}

// --- BigInt ---

fn bigint_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_some() {
        return Err(agent.throw_error(ErrorKind::Type, "BigInt is not a constructor"));
    }
    let value = args.first().copied().unwrap_or(Value::Undefined);
    if let Value::Number(n) = value {
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(agent.throw_error(ErrorKind::Range, "cannot convert a non-integral number to BigInt"));
        }
        use num_traits::FromPrimitive;
        let big = num_bigint::BigInt::from_f64(n).expect("finite integral float");
        return Ok(Value::BigInt(agent.heap.intern_bigint(big)));
    }
    Ok(Value::BigInt(crate::conversion::to_bigint(agent, value)?))
}

fn bigint_proto_to_string(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let id = match this {
        Value::BigInt(id) => id,
        Value::Object(obj) => match agent.heap.object(obj).data {
            ObjectData::BigIntObject(id) => id,
            _ => return Err(agent.throw_error(ErrorKind::Type, "not a BigInt")),
        },
        _ => return Err(agent.throw_error(ErrorKind::Type, "not a BigInt")),
    };
    let text = crate::value::bigint_to_string(agent.heap.bigint(id));
    Ok(agent.string_value(&text))
}

pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> PrimitivesInit {
    // Boolean
    let boolean_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, boolean_prototype, "toString", boolean_proto_to_string, 0);
    define_method(agent, seed, boolean_prototype, "valueOf", boolean_proto_value_of, 0);
    let boolean_ctor = bootstrap_constructor(agent, seed, boolean_constructor, "Boolean", 1, boolean_prototype);
    seed.register("%Boolean%", boolean_ctor);
    seed.register("%Boolean.prototype%", boolean_prototype);

    // Number
    let number_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, number_prototype, "toString", number_proto_to_string, 1);
    define_method(agent, seed, number_prototype, "valueOf", number_proto_value_of, 0);
    let number_ctor = bootstrap_constructor(agent, seed, number_constructor, "Number", 1, number_prototype);
    define_method(agent, seed, number_ctor, "isNaN", number_is_nan, 1);
    define_method(agent, seed, number_ctor, "isFinite", number_is_finite, 1);
    seed.register("%Number%", number_ctor);
    seed.register("%Number.prototype%", number_prototype);

    // String
    let string_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, string_prototype, "charCodeAt", string_proto_char_code_at, 1);
    define_method(agent, seed, string_prototype, "charAt", string_proto_char_at, 1);
    define_method(agent, seed, string_prototype, "indexOf", string_proto_index_of, 1);
    define_method(agent, seed, string_prototype, "toString", string_proto_to_string, 0);
    define_method(agent, seed, string_prototype, "valueOf", string_proto_to_string, 0);
    let string_ctor = bootstrap_constructor(agent, seed, string_constructor, "String", 1, string_prototype);
    define_method(agent, seed, string_ctor, "fromCharCode", string_from_char_code, 1);
    seed.register("%String%", string_ctor);
    seed.register("%String.prototype%", string_prototype);

    // Symbol
    let symbol_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, symbol_prototype, "toString", symbol_proto_to_string, 0);
    define_accessor(agent, seed, symbol_prototype, "description", Some(symbol_description_getter), None);
    let symbol_ctor = bootstrap_constructor(agent, seed, symbol_constructor, "Symbol", 0, symbol_prototype);
    for (name, sym) in [
        ("iterator", agent.heap.well_known.iterator),
        ("asyncIterator", agent.heap.well_known.async_iterator),
        ("toPrimitive", agent.heap.well_known.to_primitive),
        ("toStringTag", agent.heap.well_known.to_string_tag),
        ("hasInstance", agent.heap.well_known.has_instance),
    ] {
        let key = agent.key_from_str(name);
        agent.heap.object_mut(symbol_ctor).properties.insert(
            key,
            crate::object::PropertyEntry::Data {
                value: Value::Symbol(sym),
                writable: false,
                enumerable: false,
                configurable: false,
            },
        );
    }
    seed.register("%Symbol%", symbol_ctor);
    seed.register("%Symbol.prototype%", symbol_prototype);

    // BigInt
    let bigint_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, bigint_prototype, "toString", bigint_proto_to_string, 0);
    define_method(agent, seed, bigint_prototype, "valueOf", bigint_proto_to_string, 0);
    let bigint_ctor = bootstrap_constructor(agent, seed, bigint_constructor, "BigInt", 1, bigint_prototype);
    seed.register("%BigInt%", bigint_ctor);
    seed.register("%BigInt.prototype%", bigint_prototype);

    PrimitivesInit {
        boolean_prototype,
        number_prototype,
        string_prototype,
        symbol: symbol_ctor,
        symbol_prototype,
        bigint_prototype,
    }
}
