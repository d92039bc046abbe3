//! Arguments exotic objects.
//!
//! A mapped arguments object keeps a side map from index strings to formal
//! parameter bindings in the calling function environment: reads and writes
//! of still-mapped slots flow through the environment, and redefining a slot
//! as non-writable or as an accessor severs the mapping.

use crate::{
    agent::Agent,
    completion::JsResult,
    environments,
    heap::{Mark, MarkQueue},
    object::{ObjectData, ObjectRecord, PropertyDescriptor, PropertyEntry, PropertyKey},
    ordinary::{ordinary_define_own_property, ordinary_delete, ordinary_get, ordinary_get_own_property, ordinary_set},
    value::{EnvId, ObjectId, StringId, Value},
};

/// The side map of a mapped arguments object. `names[i]` is the formal
/// parameter the index is still mapped to, or `None` once severed.
#[derive(Debug)]
pub(crate) struct ParameterMap {
    pub env: EnvId,
    pub names: Vec<Option<StringId>>,
}

impl Mark for ParameterMap {
    fn mark(&self, queue: &mut MarkQueue) {
        queue.push_env(self.env);
    }
}

fn mapped_name(agent: &Agent, o: ObjectId, key: PropertyKey) -> Option<(EnvId, StringId, usize)> {
    let ObjectData::Arguments(map) = &agent.heap.object(o).data else {
        return None;
    };
    let index = key.as_array_index(&agent.heap)? as usize;
    let name = (*map.names.get(index)?)?;
    Some((map.env, name, index))
}

fn sever(agent: &mut Agent, o: ObjectId, index: usize) {
    if let ObjectData::Arguments(map) = &mut agent.heap.object_mut(o).data {
        map.names[index] = None;
    }
}

/// Builds a mapped arguments object for a sloppy function with simple
/// parameters.
pub(crate) fn create_mapped_arguments_object(
    agent: &mut Agent,
    func: ObjectId,
    formals: &[StringId],
    args: &[Value],
    env: EnvId,
) -> ObjectId {
    let realm = agent.current_realm_id();
    let prototype = agent.intrinsics().object_prototype;
    let names = (0..args.len())
        .map(|i| formals.get(i).copied())
        .collect();
    let mut record = ObjectRecord::new(
        Some(prototype),
        ObjectData::Arguments(Box::new(ParameterMap { env, names })),
        realm,
    );
    for (i, &arg) in args.iter().enumerate() {
        let key = agent.key_for_index(i as u64);
        record.properties.insert(
            key,
            PropertyEntry::Data { value: arg, writable: true, enumerable: true, configurable: true },
        );
    }
    record.properties.insert(
        PropertyKey::String(agent.heap.statics.length),
        PropertyEntry::Data {
            value: Value::Number(args.len() as f64),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    record.properties.insert(
        PropertyKey::Symbol(agent.heap.well_known.iterator),
        PropertyEntry::Data {
            value: Value::Object(agent.intrinsics().array_values),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    record.properties.insert(
        PropertyKey::String(agent.heap.statics.callee),
        PropertyEntry::Data {
            value: Value::Object(func),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    agent.heap.alloc_object(record)
}

/// Builds an unmapped arguments object: an ordinary object whose `callee`
/// is the frozen `%ThrowTypeError%` accessor pair.
pub(crate) fn create_unmapped_arguments_object(agent: &mut Agent, args: &[Value]) -> ObjectId {
    let realm = agent.current_realm_id();
    let prototype = agent.intrinsics().object_prototype;
    let thrower = agent.intrinsics().throw_type_error;
    let mut record = ObjectRecord::new(Some(prototype), ObjectData::Ordinary, realm);
    for (i, &arg) in args.iter().enumerate() {
        let key = agent.key_for_index(i as u64);
        record.properties.insert(
            key,
            PropertyEntry::Data { value: arg, writable: true, enumerable: true, configurable: true },
        );
    }
    record.properties.insert(
        PropertyKey::String(agent.heap.statics.length),
        PropertyEntry::Data {
            value: Value::Number(args.len() as f64),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    record.properties.insert(
        PropertyKey::Symbol(agent.heap.well_known.iterator),
        PropertyEntry::Data {
            value: Value::Object(agent.intrinsics().array_values),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    record.properties.insert(
        PropertyKey::String(agent.heap.statics.callee),
        PropertyEntry::Accessor {
            get: Some(thrower),
            set: Some(thrower),
            enumerable: false,
            configurable: false,
        },
    );
    agent.heap.alloc_object(record)
}

pub(crate) fn get_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
) -> JsResult<Option<PropertyDescriptor>> {
    let Some(mut desc) = ordinary_get_own_property(&agent.heap, o, key) else {
        return Ok(None);
    };
    if let Some((env, name, _)) = mapped_name(agent, o, key) {
        desc.value = Some(environments::get_binding_value(agent, env, name, false)?);
    }
    Ok(Some(desc))
}

pub(crate) fn define_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<bool> {
    let mapped = mapped_name(agent, o, key);
    let mut new_arg_desc = desc;
    if let Some((env, name, _)) = mapped
        && desc.is_data_descriptor()
        && desc.value.is_none()
        && desc.writable == Some(false)
    {
        // Redefining a mapped slot non-writable without a value: the stored
        // value must become the current binding value before severing.
        new_arg_desc.value = Some(environments::get_binding_value(agent, env, name, false)?);
    }
    if !ordinary_define_own_property(agent, o, key, new_arg_desc)? {
        return Ok(false);
    }
    if let Some((env, name, index)) = mapped {
        if desc.is_accessor_descriptor() {
            sever(agent, o, index);
        } else {
            if let Some(value) = desc.value {
                environments::set_mutable_binding(agent, env, name, value, false)?;
            }
            if desc.writable == Some(false) {
                sever(agent, o, index);
            }
        }
    }
    Ok(true)
}

pub(crate) fn get(agent: &mut Agent, o: ObjectId, key: PropertyKey, receiver: Value) -> JsResult<Value> {
    if let Some((env, name, _)) = mapped_name(agent, o, key) {
        return environments::get_binding_value(agent, env, name, false);
    }
    ordinary_get(agent, o, key, receiver)
}

pub(crate) fn set(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
    receiver: Value,
) -> JsResult<bool> {
    if receiver == Value::Object(o)
        && let Some((env, name, _)) = mapped_name(agent, o, key)
    {
        environments::set_mutable_binding(agent, env, name, value, false)?;
    }
    ordinary_set(agent, o, key, value, receiver)
}

pub(crate) fn delete(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    let mapped = mapped_name(agent, o, key);
    let result = ordinary_delete(&mut agent.heap, o, key);
    if result && let Some((_, _, index)) = mapped {
        sever(agent, o, index);
    }
    Ok(result)
}
