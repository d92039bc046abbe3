//! Array exotic objects.
//!
//! `length` is an ordinary non-configurable data property kept consistent by
//! the exotic `DefineOwnProperty`: writing a shorter length deletes indices
//! in descending order and stops at the first non-configurable one, and
//! defining an index at or past `length` bumps it.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::{to_number, to_uint32},
    intrinsics::error::ErrorKind,
    object::{ObjectData, ObjectRecord, PropertyDescriptor, PropertyEntry, PropertyKey},
    ordinary::{ordinary_define_own_property, ordinary_delete},
    value::{ObjectId, Value},
};

/// `ArrayCreate(length)` with an explicit prototype.
pub(crate) fn array_create(
    agent: &mut Agent,
    length: u64,
    prototype: Option<ObjectId>,
) -> JsResult<ObjectId> {
    if length > u64::from(u32::MAX) {
        return Err(agent.throw_error(ErrorKind::Range, "invalid array length"));
    }
    let prototype = prototype.unwrap_or_else(|| agent.intrinsics().array_prototype);
    let realm = agent.current_realm_id();
    let mut record = ObjectRecord::new(Some(prototype), ObjectData::Array, realm);
    record.properties.insert(
        PropertyKey::String(agent.heap.statics.length),
        PropertyEntry::Data {
            value: Value::Number(length as f64),
            writable: true,
            enumerable: false,
            configurable: false,
        },
    );
    Ok(agent.heap.alloc_object(record))
}

/// Creates an array from a value list, the way array literals do.
pub(crate) fn create_array_from_list(agent: &mut Agent, values: &[Value]) -> JsResult<ObjectId> {
    let array = array_create(agent, values.len() as u64, None)?;
    for (index, &value) in values.iter().enumerate() {
        let key = agent.key_for_index(index as u64);
        agent.heap.object_mut(array).properties.insert(
            key,
            PropertyEntry::Data { value, writable: true, enumerable: true, configurable: true },
        );
    }
    Ok(array)
}

/// Current `length` value; arrays keep it as a data property by
/// construction.
pub(crate) fn array_length(agent: &Agent, o: ObjectId) -> u32 {
    match agent.heap.object(o).entry(PropertyKey::String(agent.heap.statics.length)) {
        Some(PropertyEntry::Data { value: Value::Number(n), .. }) => *n as u32,
        _ => 0,
    }
}

fn length_entry(agent: &Agent, o: ObjectId) -> (u32, bool) {
    match agent.heap.object(o).entry(PropertyKey::String(agent.heap.statics.length)) {
        Some(PropertyEntry::Data { value: Value::Number(n), writable, .. }) => (*n as u32, *writable),
        _ => (0, false),
    }
}

fn write_length(agent: &mut Agent, o: ObjectId, length: u32, writable: bool) {
    let length_key = agent.heap.statics.length;
    agent.heap.object_mut(o).properties.insert(
        PropertyKey::String(length_key),
        PropertyEntry::Data {
            value: Value::Number(f64::from(length)),
            writable,
            enumerable: false,
            configurable: false,
        },
    );
}

/// Array `[[DefineOwnProperty]]`.
pub(crate) fn define_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<bool> {
    if key == PropertyKey::String(agent.heap.statics.length) {
        return array_set_length(agent, o, desc);
    }
    if let Some(index) = key.as_array_index(&agent.heap) {
        let (old_len, len_writable) = length_entry(agent, o);
        if index >= old_len && !len_writable {
            return Ok(false);
        }
        if !ordinary_define_own_property(agent, o, key, desc)? {
            return Ok(false);
        }
        if index >= old_len {
            write_length(agent, o, index + 1, len_writable);
        }
        return Ok(true);
    }
    ordinary_define_own_property(agent, o, key, desc)
}

/// `ArraySetLength(A, Desc)`.
fn array_set_length(agent: &mut Agent, o: ObjectId, desc: PropertyDescriptor) -> JsResult<bool> {
    let Some(len_value) = desc.value else {
        return ordinary_define_own_property(agent, o, PropertyKey::String(agent.heap.statics.length), desc);
    };
    let new_len = to_uint32(agent, len_value)?;
    let number_len = to_number(agent, len_value)?;
    if f64::from(new_len) != number_len {
        return Err(agent.throw_error(ErrorKind::Range, "invalid array length"));
    }
    let (old_len, old_writable) = length_entry(agent, o);

    // Rewritten descriptor carrying the coerced value.
    let mut new_len_desc = desc;
    new_len_desc.value = Some(Value::Number(f64::from(new_len)));

    if new_len >= old_len {
        return ordinary_define_own_property(
            agent,
            o,
            PropertyKey::String(agent.heap.statics.length),
            new_len_desc,
        );
    }
    if !old_writable {
        return Ok(false);
    }
    // Deferred writability: deletion happens with a writable length, and the
    // requested non-writability is applied after the truncation finishes.
    let new_writable = new_len_desc.writable.unwrap_or(true);
    new_len_desc.writable = Some(true);
    if !ordinary_define_own_property(agent, o, PropertyKey::String(agent.heap.statics.length), new_len_desc)? {
        return Ok(false);
    }

    // Delete indices >= newLen in descending order, stopping at the first
    // non-configurable index and restoring length to one past it.
    let mut doomed: Vec<(u32, PropertyKey)> = agent
        .heap
        .object(o)
        .properties
        .keys()
        .filter_map(|&k| k.as_array_index(&agent.heap).map(|i| (i, k)))
        .filter(|&(i, _)| i >= new_len)
        .collect();
    doomed.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    for (index, key) in doomed {
        if !ordinary_delete(&mut agent.heap, o, key) {
            write_length(agent, o, index + 1, new_writable);
            return Ok(false);
        }
    }
    write_length(agent, o, new_len, new_writable);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;

    #[test]
    fn array_create_installs_length() {
        let mut agent = Agent::default();
        let a = array_create(&mut agent, 3, None).unwrap();
        assert_eq!(array_length(&agent, a), 3);
    }

    #[test]
    fn defining_high_index_bumps_length() {
        let mut agent = Agent::default();
        let a = array_create(&mut agent, 0, None).unwrap();
        let key = agent.key_for_index(9);
        let ok = define_own_property(
            &mut agent,
            a,
            key,
            PropertyDescriptor::full_data(Value::Number(1.0), true, true, true),
        )
        .unwrap();
        assert!(ok);
        assert_eq!(array_length(&agent, a), 10);
    }

    #[test]
    fn truncation_stops_at_non_configurable_index() {
        let mut agent = Agent::default();
        let a = array_create(&mut agent, 0, None).unwrap();
        for i in 0..5u64 {
            let key = agent.key_for_index(i);
            define_own_property(
                &mut agent,
                a,
                key,
                PropertyDescriptor::full_data(Value::Number(i as f64), true, true, i != 2),
            )
            .unwrap();
        }
        // Shrinking to 0 must stop at the frozen index 2.
        let length_key = agent.heap.statics.length;
        let ok = define_own_property(
            &mut agent,
            a,
            PropertyKey::String(length_key),
            PropertyDescriptor::value_only(Value::Number(0.0)),
        )
        .unwrap();
        assert!(!ok);
        assert_eq!(array_length(&agent, a), 3);
        let key4 = agent.key_for_index(4);
        assert!(agent.heap.object(a).entry(key4).is_none());
        let key2 = agent.key_for_index(2);
        assert!(agent.heap.object(a).entry(key2).is_some());
    }
}
