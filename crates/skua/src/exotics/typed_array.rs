//! Integer-indexed (typed array) exotic objects. Indexed access delegates to
//! the buffer codecs; out-of-bounds writes are ignored rather than thrown.

use crate::{
    agent::Agent,
    buffer::{self, ElementType},
    completion::JsResult,
    conversion::canonical_numeric_index,
    object::{ObjectData, PropertyDescriptor, PropertyKey},
    ordinary::{ordinary_define_own_property, ordinary_get_own_property, ordinary_own_property_keys, ordinary_set},
    value::{ObjectId, Value},
};

/// The slots of a typed array view.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypedArrayData {
    pub buffer: ObjectId,
    pub byte_offset: usize,
    /// Element count, not byte count.
    pub length: usize,
    pub kind: ElementType,
}

pub(crate) fn view(agent: &Agent, o: ObjectId) -> TypedArrayData {
    match agent.heap.object(o).data {
        ObjectData::TypedArray(data) => data,
        _ => unreachable!("typed array internal method on non-typed-array"),
    }
}

/// The numeric index this key denotes for integer-indexed access, if any.
fn numeric_index(agent: &Agent, key: PropertyKey) -> Option<f64> {
    match key {
        PropertyKey::String(id) => canonical_numeric_index(&agent.heap, id),
        PropertyKey::Symbol(_) => None,
    }
}

/// `IsValidIntegerIndex`: integral, in range, not negative zero, buffer
/// attached.
fn valid_index(agent: &Agent, o: ObjectId, index: f64) -> Option<usize> {
    let data = view(agent, o);
    if buffer::is_detached(agent, data.buffer) {
        return None;
    }
    if index.fract() != 0.0 || index.is_sign_negative() && index == 0.0 {
        return None;
    }
    if index < 0.0 || index >= data.length as f64 {
        return None;
    }
    Some(index as usize)
}

fn element_read(agent: &mut Agent, o: ObjectId, index: usize) -> Value {
    let data = view(agent, o);
    let byte_index = data.byte_offset + index * data.kind.size();
    buffer::get_value_from_buffer(agent, data.buffer, byte_index, data.kind, true)
}

fn element_write(agent: &mut Agent, o: ObjectId, index: usize, value: Value) -> JsResult<()> {
    let data = view(agent, o);
    let byte_index = data.byte_offset + index * data.kind.size();
    buffer::set_value_in_buffer(agent, data.buffer, byte_index, data.kind, value, true)
}

pub(crate) fn get_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
) -> JsResult<Option<PropertyDescriptor>> {
    if let Some(index) = numeric_index(agent, key) {
        let Some(index) = valid_index(agent, o, index) else {
            return Ok(None);
        };
        let value = element_read(agent, o, index);
        return Ok(Some(PropertyDescriptor::full_data(value, true, true, true)));
    }
    Ok(ordinary_get_own_property(&agent.heap, o, key))
}

pub(crate) fn define_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<bool> {
    if let Some(index) = numeric_index(agent, key) {
        let Some(index) = valid_index(agent, o, index) else {
            return Ok(false);
        };
        if desc.is_accessor_descriptor()
            || desc.configurable == Some(false)
            || desc.enumerable == Some(false)
            || desc.writable == Some(false)
        {
            return Ok(false);
        }
        if let Some(value) = desc.value {
            element_write(agent, o, index, value)?;
        }
        return Ok(true);
    }
    ordinary_define_own_property(agent, o, key, desc)
}

pub(crate) fn set(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
    receiver: Value,
) -> JsResult<bool> {
    if let Some(index) = numeric_index(agent, key) {
        if receiver == Value::Object(o) {
            match valid_index(agent, o, index) {
                // Writes past the view length are ignored, not errors.
                None => return Ok(true),
                Some(index) => {
                    element_write(agent, o, index, value)?;
                    return Ok(true);
                }
            }
        }
        if valid_index(agent, o, index).is_none() {
            return Ok(true);
        }
    }
    ordinary_set(agent, o, key, value, receiver)
}

pub(crate) fn own_property_keys(agent: &mut Agent, o: ObjectId) -> Vec<PropertyKey> {
    let data = view(agent, o);
    let mut keys = Vec::new();
    if !buffer::is_detached(agent, data.buffer) {
        for i in 0..data.length {
            keys.push(agent.key_for_index(i as u64));
        }
    }
    keys.extend(ordinary_own_property_keys(&agent.heap, o));
    keys
}
