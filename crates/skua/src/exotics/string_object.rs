//! String exotic objects: boxed strings whose index properties materialize
//! single code units.

use crate::{
    agent::Agent,
    object::{ObjectData, PropertyDescriptor, PropertyKey},
    ordinary::{ordinary_get_own_property, ordinary_own_property_keys},
    value::{JsString, ObjectId},
};

fn wrapped_string(agent: &Agent, o: ObjectId) -> Option<crate::value::StringId> {
    match agent.heap.object(o).data {
        ObjectData::StringObject(id) => Some(id),
        _ => None,
    }
}

/// `StringGetOwnProperty`: a canonical index inside the string yields a
/// non-writable, enumerable, non-configurable single-unit string.
pub(crate) fn get_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
) -> Option<PropertyDescriptor> {
    if let Some(desc) = ordinary_get_own_property(&agent.heap, o, key) {
        return Some(desc);
    }
    let string = wrapped_string(agent, o)?;
    let index = key.as_array_index(&agent.heap)? as usize;
    let unit = agent.heap.string(string).code_unit_at(index)?;
    let value = agent.heap.intern_string(JsString::from_units(vec![unit]));
    Some(PropertyDescriptor::full_data(
        crate::value::Value::String(value),
        false,
        true,
        false,
    ))
}

/// Index keys first, then the ordinary keys.
pub(crate) fn own_property_keys(agent: &mut Agent, o: ObjectId) -> Vec<PropertyKey> {
    let Some(string) = wrapped_string(agent, o) else {
        return ordinary_own_property_keys(&agent.heap, o);
    };
    let len = agent.heap.string(string).len();
    let mut keys: Vec<PropertyKey> = (0..len).map(|i| agent.key_for_index(i as u64)).collect();
    for key in ordinary_own_property_keys(&agent.heap, o) {
        // Indices below the string length were already emitted.
        match key.as_array_index(&agent.heap) {
            Some(i) if (i as usize) < len => {}
            _ => keys.push(key),
        }
    }
    keys
}
