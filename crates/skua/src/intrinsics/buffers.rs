//! `ArrayBuffer`, `SharedArrayBuffer`, `DataView` and the typed-array
//! constructor family.

use crate::{
    agent::Agent,
    buffer::{
        allocate_array_buffer, buffer_byte_length, get_value_from_buffer, is_detached,
        set_value_in_buffer, ArrayBufferData, DataViewData, ElementType,
    },
    completion::JsResult,
    conversion::{to_boolean, to_bigint, to_index, to_number},
    exotics::typed_array::TypedArrayData,
    intrinsics::{
        bootstrap_constructor, bootstrap_prototype, define_accessor, define_method,
        error::ErrorKind,
        RealmSeed,
    },
    object::{ObjectData, ObjectRecord},
    realm::TypedArrayIntrinsic,
    value::{ObjectId, Value},
};

pub(crate) struct BuffersInit {
    pub array_buffer: ObjectId,
    pub array_buffer_prototype: ObjectId,
    pub shared_array_buffer: ObjectId,
    pub shared_array_buffer_prototype: ObjectId,
    pub data_view: ObjectId,
    pub data_view_prototype: ObjectId,
    pub typed_array_prototype: ObjectId,
    pub typed_arrays: [TypedArrayIntrinsic; ElementType::COUNT],
}

// --- ArrayBuffer ---

fn array_buffer_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_none() {
        return Err(agent.throw_error(ErrorKind::Type, "ArrayBuffer constructor requires new"));
    }
    let length = to_index(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    Ok(Value::Object(allocate_array_buffer(agent, length, false)))
}

fn shared_array_buffer_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_none() {
        return Err(agent.throw_error(ErrorKind::Type, "SharedArrayBuffer constructor requires new"));
    }
    let length = to_index(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    Ok(Value::Object(allocate_array_buffer(agent, length, true)))
}

fn this_buffer(agent: &mut Agent, this: Value, shared: bool) -> JsResult<ObjectId> {
    if let Value::Object(id) = this
        && let ObjectData::ArrayBuffer(ArrayBufferData { shared: s, .. }) = &agent.heap.object(id).data
        && *s == shared
    {
        return Ok(id);
    }
    Err(agent.throw_error(ErrorKind::Type, "not a buffer of the expected kind"))
}

fn array_buffer_byte_length(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let id = this_buffer(agent, this, false)?;
    Ok(Value::Number(buffer_byte_length(agent, id) as f64))
}

fn shared_array_buffer_byte_length(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let id = this_buffer(agent, this, true)?;
    Ok(Value::Number(buffer_byte_length(agent, id) as f64))
}

// --- DataView ---

fn data_view_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_none() {
        return Err(agent.throw_error(ErrorKind::Type, "DataView constructor requires new"));
    }
    let buffer = match args.first().copied() {
        Some(Value::Object(id))
            if matches!(agent.heap.object(id).data, ObjectData::ArrayBuffer(_)) =>
        {
            id
        }
        _ => return Err(agent.throw_error(ErrorKind::Type, "first argument must be an ArrayBuffer")),
    };
    let offset = to_index(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
    if is_detached(agent, buffer) {
        return Err(agent.throw_error(ErrorKind::Type, "cannot view a detached buffer"));
    }
    let buffer_len = buffer_byte_length(agent, buffer);
    if offset > buffer_len {
        return Err(agent.throw_error(ErrorKind::Range, "view offset is outside the buffer"));
    }
    let byte_length = match args.get(2).copied() {
        None | Some(Value::Undefined) => buffer_len - offset,
        Some(v) => {
            let requested = to_index(agent, v)?;
            if offset + requested > buffer_len {
                return Err(agent.throw_error(ErrorKind::Range, "view length is outside the buffer"));
            }
            requested
        }
    };
    let prototype = agent.intrinsics().data_view_prototype;
    let realm = agent.current_realm_id();
    let view = agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::DataView(DataViewData { buffer, byte_offset: offset, byte_length }),
        realm,
    ));
    Ok(Value::Object(view))
}

fn this_data_view(agent: &mut Agent, this: Value) -> JsResult<DataViewData> {
    if let Value::Object(id) = this
        && let ObjectData::DataView(data) = &agent.heap.object(id).data
    {
        return Ok(*data);
    }
    Err(agent.throw_error(ErrorKind::Type, "not a DataView"))
}

/// `GetViewValue`.
fn get_view_value(agent: &mut Agent, this: Value, args: &[Value], element: ElementType) -> JsResult<Value> {
    let view = this_data_view(agent, this)?;
    let get_index = to_index(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let little_endian = to_boolean(&agent.heap, args.get(1).copied().unwrap_or(Value::Undefined));
    if is_detached(agent, view.buffer) {
        return Err(agent.throw_error(ErrorKind::Type, "cannot read from a detached buffer"));
    }
    if get_index + element.size() > view.byte_length {
        return Err(agent.throw_error(ErrorKind::Range, "offset is outside the bounds of the DataView"));
    }
    Ok(get_value_from_buffer(
        agent,
        view.buffer,
        view.byte_offset + get_index,
        element,
        little_endian,
    ))
}

/// `SetViewValue`: the value converts before the bounds check, because the
/// conversion can run user code.
fn set_view_value(agent: &mut Agent, this: Value, args: &[Value], element: ElementType) -> JsResult<Value> {
    let view = this_data_view(agent, this)?;
    let get_index = to_index(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let raw = args.get(1).copied().unwrap_or(Value::Undefined);
    let value = if element.is_bigint() {
        Value::BigInt(to_bigint(agent, raw)?)
    } else {
        Value::Number(to_number(agent, raw)?)
    };
    let little_endian = to_boolean(&agent.heap, args.get(2).copied().unwrap_or(Value::Undefined));
    if is_detached(agent, view.buffer) {
        return Err(agent.throw_error(ErrorKind::Type, "cannot write to a detached buffer"));
    }
    if get_index + element.size() > view.byte_length {
        return Err(agent.throw_error(ErrorKind::Range, "offset is outside the bounds of the DataView"));
    }
    set_value_in_buffer(
        agent,
        view.buffer,
        view.byte_offset + get_index,
        element,
        value,
        little_endian,
    )?;
    Ok(Value::Undefined)
}

macro_rules! view_accessors {
    ($(($get:ident, $set:ident, $kind:expr)),+ $(,)?) => {
        $(
            fn $get(
                agent: &mut Agent,
                this: Value,
                args: &[Value],
                _new_target: Option<ObjectId>,
                _func: ObjectId,
            ) -> JsResult<Value> {
                get_view_value(agent, this, args, $kind)
            }

            fn $set(
                agent: &mut Agent,
                this: Value,
                args: &[Value],
                _new_target: Option<ObjectId>,
                _func: ObjectId,
            ) -> JsResult<Value> {
                set_view_value(agent, this, args, $kind)
            }
        )+
    };
}

view_accessors! {
    (dv_get_int8, dv_set_int8, ElementType::Int8),
    (dv_get_uint8, dv_set_uint8, ElementType::Uint8),
    (dv_get_int16, dv_set_int16, ElementType::Int16),
    (dv_get_uint16, dv_set_uint16, ElementType::Uint16),
    (dv_get_int32, dv_set_int32, ElementType::Int32),
    (dv_get_uint32, dv_set_uint32, ElementType::Uint32),
    (dv_get_float32, dv_set_float32, ElementType::Float32),
    (dv_get_float64, dv_set_float64, ElementType::Float64),
    (dv_get_bigint64, dv_set_bigint64, ElementType::BigInt64),
    (dv_get_biguint64, dv_set_biguint64, ElementType::BigUint64),
}

fn data_view_byte_length(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let view = this_data_view(agent, this)?;
    if is_detached(agent, view.buffer) {
        return Err(agent.throw_error(ErrorKind::Type, "DataView over a detached buffer"));
    }
    Ok(Value::Number(view.byte_length as f64))
}

fn data_view_byte_offset(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let view = this_data_view(agent, this)?;
    Ok(Value::Number(view.byte_offset as f64))
}

fn data_view_buffer(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let view = this_data_view(agent, this)?;
    Ok(Value::Object(view.buffer))
}

// --- typed arrays ---

fn this_typed_array(agent: &mut Agent, this: Value) -> JsResult<TypedArrayData> {
    if let Value::Object(id) = this
        && let ObjectData::TypedArray(data) = &agent.heap.object(id).data
    {
        return Ok(*data);
    }
    Err(agent.throw_error(ErrorKind::Type, "not a typed array"))
}

fn typed_array_length(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let data = this_typed_array(agent, this)?;
    if is_detached(agent, data.buffer) {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(data.length as f64))
}

fn typed_array_buffer(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let data = this_typed_array(agent, this)?;
    Ok(Value::Object(data.buffer))
}

fn typed_array_byte_length(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let data = this_typed_array(agent, this)?;
    if is_detached(agent, data.buffer) {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number((data.length * data.kind.size()) as f64))
}

fn typed_array_byte_offset(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let data = this_typed_array(agent, this)?;
    Ok(Value::Number(data.byte_offset as f64))
}

/// The shared typed-array constructor body.
fn construct_typed_array(
    agent: &mut Agent,
    args: &[Value],
    new_target: Option<ObjectId>,
    element: ElementType,
) -> JsResult<Value> {
    if new_target.is_none() {
        return Err(agent.throw_error(
            ErrorKind::Type,
            format!("{} constructor requires new", element.constructor_name()),
        ));
    }
    let (buffer, byte_offset, length) = match args.first().copied() {
        None | Some(Value::Undefined) => {
            let buffer = allocate_array_buffer(agent, 0, false);
            (buffer, 0, 0)
        }
        Some(Value::Object(id))
            if matches!(agent.heap.object(id).data, ObjectData::ArrayBuffer(_)) =>
        {
            let offset = to_index(agent, args.get(1).copied().unwrap_or(Value::Undefined))?;
            if offset % element.size() != 0 {
                return Err(agent.throw_error(
                    ErrorKind::Range,
                    "start offset must be a multiple of the element size",
                ));
            }
            let buffer_len = buffer_byte_length(agent, id);
            let length = match args.get(2).copied() {
                None | Some(Value::Undefined) => {
                    let remaining = buffer_len.saturating_sub(offset);
                    if remaining % element.size() != 0 {
                        return Err(agent.throw_error(
                            ErrorKind::Range,
                            "buffer length must be a multiple of the element size",
                        ));
                    }
                    remaining / element.size()
                }
                Some(v) => to_index(agent, v)?,
            };
            if offset + length * element.size() > buffer_len {
                return Err(agent.throw_error(ErrorKind::Range, "view extends past the end of the buffer"));
            }
            (id, offset, length)
        }
        Some(Value::Object(array_like)) => {
            // Array-likes (including other typed arrays) copy element by
            // element.
            let len = crate::operations::length_of_array_like(agent, array_like)? as usize;
            let buffer = allocate_array_buffer(agent, len * element.size(), false);
            let view = make_typed_array(agent, buffer, 0, len, element)?;
            for i in 0..len {
                let key = agent.key_for_index(i as u64);
                let value = crate::operations::get(agent, array_like, key)?;
                crate::ordinary::set_with_receiver(agent, view, key, value, Value::Object(view))?;
            }
            return Ok(Value::Object(view));
        }
        Some(length_value) => {
            let length = to_index(agent, length_value)?;
            let buffer = allocate_array_buffer(agent, length * element.size(), false);
            (buffer, 0, length)
        }
    };
    Ok(Value::Object(make_typed_array(agent, buffer, byte_offset, length, element)?))
}

fn make_typed_array(
    agent: &mut Agent,
    buffer: ObjectId,
    byte_offset: usize,
    length: usize,
    element: ElementType,
) -> JsResult<ObjectId> {
    let prototype = agent.intrinsics().typed_arrays[element_index(element)].prototype;
    let realm = agent.current_realm_id();
    Ok(agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::TypedArray(TypedArrayData { buffer, byte_offset, length, kind: element }),
        realm,
    )))
}

fn element_index(element: ElementType) -> usize {
    ElementType::ALL
        .iter()
        .position(|&e| e == element)
        .expect("element type in table")
}

macro_rules! typed_array_ctors {
    ($(($name:ident, $kind:expr)),+ $(,)?) => {
        $(
            fn $name(
                agent: &mut Agent,
                _this: Value,
                args: &[Value],
                new_target: Option<ObjectId>,
                _func: ObjectId,
            ) -> JsResult<Value> {
                construct_typed_array(agent, args, new_target, $kind)
            }
        )+
    };
}

typed_array_ctors! {
    (ctor_int8, ElementType::Int8),
    (ctor_uint8, ElementType::Uint8),
    (ctor_uint8_clamped, ElementType::Uint8Clamped),
    (ctor_int16, ElementType::Int16),
    (ctor_uint16, ElementType::Uint16),
    (ctor_int32, ElementType::Int32),
    (ctor_uint32, ElementType::Uint32),
    (ctor_float32, ElementType::Float32),
    (ctor_float64, ElementType::Float64),
    (ctor_bigint64, ElementType::BigInt64),
    (ctor_biguint64, ElementType::BigUint64),
}

fn ctor_for(element: ElementType) -> crate::function::NativeFn {
    match element {
        ElementType::Int8 => ctor_int8,
        ElementType::Uint8 => ctor_uint8,
        ElementType::Uint8Clamped => ctor_uint8_clamped,
        ElementType::Int16 => ctor_int16,
        ElementType::Uint16 => ctor_uint16,
        ElementType::Int32 => ctor_int32,
        ElementType::Uint32 => ctor_uint32,
        ElementType::Float32 => ctor_float32,
        ElementType::Float64 => ctor_float64,
        ElementType::BigInt64 => ctor_bigint64,
        ElementType::BigUint64 => ctor_biguint64,
    }
}

pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> BuffersInit {
    // ArrayBuffer
    let array_buffer_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_accessor(agent, seed, array_buffer_prototype, "byteLength", Some(array_buffer_byte_length), None);
    let array_buffer =
        bootstrap_constructor(agent, seed, array_buffer_constructor, "ArrayBuffer", 1, array_buffer_prototype);
    seed.register("%ArrayBuffer%", array_buffer);
    seed.register("%ArrayBuffer.prototype%", array_buffer_prototype);

    // SharedArrayBuffer: scaffolded, no cross-agent semantics.
    let shared_array_buffer_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_accessor(
        agent,
        seed,
        shared_array_buffer_prototype,
        "byteLength",
        Some(shared_array_buffer_byte_length),
        None,
    );
    let shared_array_buffer = bootstrap_constructor(
        agent,
        seed,
        shared_array_buffer_constructor,
        "SharedArrayBuffer",
        1,
        shared_array_buffer_prototype,
    );
    seed.register("%SharedArrayBuffer%", shared_array_buffer);
    seed.register("%SharedArrayBuffer.prototype%", shared_array_buffer_prototype);

    // DataView
    let data_view_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_accessor(agent, seed, data_view_prototype, "buffer", Some(data_view_buffer), None);
    define_accessor(agent, seed, data_view_prototype, "byteLength", Some(data_view_byte_length), None);
    define_accessor(agent, seed, data_view_prototype, "byteOffset", Some(data_view_byte_offset), None);
    for (name, get, set, length) in [
        ("getInt8", dv_get_int8 as crate::function::NativeFn, dv_set_int8 as crate::function::NativeFn, 1u32),
        ("getUint8", dv_get_uint8, dv_set_uint8, 1),
        ("getInt16", dv_get_int16, dv_set_int16, 1),
        ("getUint16", dv_get_uint16, dv_set_uint16, 1),
        ("getInt32", dv_get_int32, dv_set_int32, 1),
        ("getUint32", dv_get_uint32, dv_set_uint32, 1),
        ("getFloat32", dv_get_float32, dv_set_float32, 1),
        ("getFloat64", dv_get_float64, dv_set_float64, 1),
        ("getBigInt64", dv_get_bigint64, dv_set_bigint64, 1),
        ("getBigUint64", dv_get_biguint64, dv_set_biguint64, 1),
    ] {
        define_method(agent, seed, data_view_prototype, name, get, length);
        let set_name = name.replacen("get", "set", 1);
        define_method(agent, seed, data_view_prototype, &set_name, set, 2);
    }
    let data_view = bootstrap_constructor(agent, seed, data_view_constructor, "DataView", 1, data_view_prototype);
    seed.register("%DataView%", data_view);
    seed.register("%DataView.prototype%", data_view_prototype);

    // %TypedArray.prototype% and the per-kind pairs.
    let typed_array_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_accessor(agent, seed, typed_array_prototype, "length", Some(typed_array_length), None);
    define_accessor(agent, seed, typed_array_prototype, "buffer", Some(typed_array_buffer), None);
    define_accessor(agent, seed, typed_array_prototype, "byteLength", Some(typed_array_byte_length), None);
    define_accessor(agent, seed, typed_array_prototype, "byteOffset", Some(typed_array_byte_offset), None);
    seed.register("%TypedArray.prototype%", typed_array_prototype);

    let mut typed_arrays = [TypedArrayIntrinsic {
        constructor: typed_array_prototype,
        prototype: typed_array_prototype,
    }; ElementType::COUNT];
    for element in ElementType::ALL {
        let prototype = bootstrap_prototype(agent, seed, Some(typed_array_prototype));
        let name = element.constructor_name();
        let ctor = bootstrap_constructor(agent, seed, ctor_for(element), name, 3, prototype);
        let bytes_key = agent.key_from_str("BYTES_PER_ELEMENT");
        agent.heap.object_mut(ctor).properties.insert(
            bytes_key,
            crate::object::PropertyEntry::Data {
                value: Value::Number(element.size() as f64),
                writable: false,
                enumerable: false,
                configurable: false,
            },
        );
        agent.heap.object_mut(prototype).properties.insert(
            bytes_key,
            crate::object::PropertyEntry::Data {
                value: Value::Number(element.size() as f64),
                writable: false,
                enumerable: false,
                configurable: false,
            },
        );
        seed.register(&format!("%{name}%"), ctor);
        seed.register(&format!("%{name}.prototype%"), prototype);
        typed_arrays[element_index(element)] = TypedArrayIntrinsic { constructor: ctor, prototype };
    }

    BuffersInit {
        array_buffer,
        array_buffer_prototype,
        shared_array_buffer,
        shared_array_buffer_prototype,
        data_view,
        data_view_prototype,
        typed_array_prototype,
        typed_arrays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_table_is_total() {
        for element in ElementType::ALL {
            assert_eq!(ElementType::ALL[element_index(element)], element);
        }
    }

    #[test]
    fn clamped_and_plain_uint8_share_size() {
        assert_eq!(ElementType::Uint8.size(), ElementType::Uint8Clamped.size());
    }
}
