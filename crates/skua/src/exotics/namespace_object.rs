//! Module namespace exotic objects: null prototype, non-extensible, exports
//! enumerated in code-unit lexicographic order, every `Set` refused.

use crate::{
    agent::Agent,
    completion::JsResult,
    environments,
    intrinsics::error::ErrorKind,
    module::{self, ExportResolution, NamespaceData, ResolvedBinding},
    object::{ObjectData, PropertyDescriptor, PropertyKey},
    ordinary::{
        ordinary_define_own_property, ordinary_delete, ordinary_get, ordinary_get_own_property,
        ordinary_has_property, ordinary_own_property_keys,
    },
    value::{ObjectId, StringId, Value},
};

fn namespace_data(agent: &Agent, o: ObjectId) -> &NamespaceData {
    match &agent.heap.object(o).data {
        ObjectData::ModuleNamespace(data) => data,
        _ => unreachable!("namespace internal method on non-namespace"),
    }
}

fn exported(agent: &Agent, o: ObjectId, key: PropertyKey) -> Option<StringId> {
    let PropertyKey::String(name) = key else { return None };
    let data = namespace_data(agent, o);
    data.exports.iter().copied().find(|&e| e == name)
}

pub(crate) fn get_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
) -> JsResult<Option<PropertyDescriptor>> {
    if matches!(key, PropertyKey::Symbol(_)) {
        return Ok(ordinary_get_own_property(&agent.heap, o, key));
    }
    if exported(agent, o, key).is_none() {
        return Ok(None);
    }
    let value = get(agent, o, key, Value::Object(o))?;
    Ok(Some(PropertyDescriptor::full_data(value, true, true, false)))
}

pub(crate) fn define_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<bool> {
    if matches!(key, PropertyKey::Symbol(_)) {
        return ordinary_define_own_property(agent, o, key, desc);
    }
    let Some(current) = get_own_property(agent, o, key)? else {
        return Ok(false);
    };
    if desc.configurable == Some(true)
        || desc.enumerable == Some(false)
        || desc.is_accessor_descriptor()
        || desc.writable == Some(false)
    {
        return Ok(false);
    }
    match desc.value {
        Some(value) => Ok(crate::operations::same_value(
            &agent.heap,
            value,
            current.value.unwrap_or(Value::Undefined),
        )),
        None => Ok(true),
    }
}

pub(crate) fn has_property(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    if matches!(key, PropertyKey::Symbol(_)) {
        return ordinary_has_property(agent, o, key);
    }
    Ok(exported(agent, o, key).is_some())
}

/// `Get` resolves an exported name through the module's binding table,
/// recursing into re-exports; reading a binding whose environment is not
/// initialised yet is a ReferenceError.
pub(crate) fn get(agent: &mut Agent, o: ObjectId, key: PropertyKey, receiver: Value) -> JsResult<Value> {
    if matches!(key, PropertyKey::Symbol(_)) {
        return ordinary_get(agent, o, key, receiver);
    }
    let Some(name) = exported(agent, o, key) else {
        return Ok(Value::Undefined);
    };
    let module = namespace_data(agent, o).module;
    // Namespace exports were filtered to cleanly resolved names at
    // construction, so anything else here is an engine bug.
    match module::resolve_export(agent, module, name, &mut Vec::new())? {
        ExportResolution::Resolved(ResolvedBinding::Namespace { module: target }) => {
            let ns = module::get_module_namespace(agent, target)?;
            Ok(Value::Object(ns))
        }
        ExportResolution::Resolved(ResolvedBinding::Binding { module: target, name: binding }) => {
            let Some(env) = module::environment(agent, target) else {
                let text = agent.heap.string(name).to_rust_string();
                return Err(agent.throw_error(
                    ErrorKind::Reference,
                    format!("cannot access '{text}' before module initialization"),
                ));
            };
            environments::get_binding_value(agent, env, binding, true)
        }
        _ => Err(crate::completion::EngineError::internal(
            "namespace export did not resolve",
        )),
    }
}

/// Only deletes of non-exports succeed.
pub(crate) fn delete(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    if matches!(key, PropertyKey::Symbol(_)) {
        return Ok(ordinary_delete(&mut agent.heap, o, key));
    }
    Ok(exported(agent, o, key).is_none())
}

/// Sorted string exports first, then the ordinary (symbol) keys.
pub(crate) fn own_property_keys(agent: &mut Agent, o: ObjectId) -> Vec<PropertyKey> {
    let data = namespace_data(agent, o);
    let mut keys: Vec<PropertyKey> = data.exports.iter().map(|&e| PropertyKey::String(e)).collect();
    keys.extend(ordinary_own_property_keys(&agent.heap, o));
    keys
}
