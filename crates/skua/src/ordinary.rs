//! Internal methods: dispatch from an object's kind tag to the ordinary
//! implementations or the exotic overrides, plus the descriptor-validation
//! kernel `validate_and_apply_property_descriptor` everything else leans on.

use crate::{
    agent::Agent,
    completion::JsResult,
    exotics::{arguments, array, namespace_object, proxy, string_object, typed_array},
    heap::Heap,
    intrinsics::error::ErrorKind,
    object::{ObjectData, PropertyDescriptor, PropertyEntry, PropertyKey},
    operations::call,
    value::{ObjectId, Value},
};

// --- dispatched internal methods ---

/// `O.[[GetPrototypeOf]]()`.
pub(crate) fn get_prototype_of(agent: &mut Agent, o: ObjectId) -> JsResult<Option<ObjectId>> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::get_prototype_of(agent, o),
        _ => Ok(ordinary_get_prototype_of(&agent.heap, o)),
    }
}

/// `O.[[SetPrototypeOf]](V)`.
pub(crate) fn set_prototype_of(
    agent: &mut Agent,
    o: ObjectId,
    prototype: Option<ObjectId>,
) -> JsResult<bool> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::set_prototype_of(agent, o, prototype),
        // Module namespaces have an immutable null prototype.
        ObjectData::ModuleNamespace(_) => Ok(prototype.is_none()),
        _ => Ok(ordinary_set_prototype_of(&mut agent.heap, o, prototype)),
    }
}

/// `O.[[IsExtensible]]()`.
pub(crate) fn is_extensible(agent: &mut Agent, o: ObjectId) -> JsResult<bool> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::is_extensible(agent, o),
        _ => Ok(agent.heap.object(o).extensible),
    }
}

/// `O.[[PreventExtensions]]()`.
pub(crate) fn prevent_extensions(agent: &mut Agent, o: ObjectId) -> JsResult<bool> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::prevent_extensions(agent, o),
        _ => {
            agent.heap.object_mut(o).extensible = false;
            Ok(true)
        }
    }
}

/// `O.[[GetOwnProperty]](P)`.
pub(crate) fn get_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
) -> JsResult<Option<PropertyDescriptor>> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::get_own_property(agent, o, key),
        ObjectData::StringObject(_) => Ok(string_object::get_own_property(agent, o, key)),
        ObjectData::TypedArray(_) => typed_array::get_own_property(agent, o, key),
        ObjectData::ModuleNamespace(_) => namespace_object::get_own_property(agent, o, key),
        ObjectData::Arguments(_) => arguments::get_own_property(agent, o, key),
        _ => Ok(ordinary_get_own_property(&agent.heap, o, key)),
    }
}

/// `O.[[DefineOwnProperty]](P, Desc)`.
pub(crate) fn define_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<bool> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::define_own_property(agent, o, key, desc),
        ObjectData::Array => array::define_own_property(agent, o, key, desc),
        ObjectData::Arguments(_) => arguments::define_own_property(agent, o, key, desc),
        ObjectData::TypedArray(_) => typed_array::define_own_property(agent, o, key, desc),
        ObjectData::ModuleNamespace(_) => namespace_object::define_own_property(agent, o, key, desc),
        _ => ordinary_define_own_property(agent, o, key, desc),
    }
}

/// `O.[[HasProperty]](P)`.
pub(crate) fn has_property(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::has_property(agent, o, key),
        _ => ordinary_has_property(agent, o, key),
    }
}

/// `O.[[Get]](P, Receiver)`.
pub(crate) fn get_with_receiver(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    receiver: Value,
) -> JsResult<Value> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::get(agent, o, key, receiver),
        ObjectData::Arguments(_) => arguments::get(agent, o, key, receiver),
        ObjectData::ModuleNamespace(_) => namespace_object::get(agent, o, key, receiver),
        _ => ordinary_get(agent, o, key, receiver),
    }
}

/// `O.[[Set]](P, V, Receiver)`.
pub(crate) fn set_with_receiver(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
    receiver: Value,
) -> JsResult<bool> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::set(agent, o, key, value, receiver),
        ObjectData::Arguments(_) => arguments::set(agent, o, key, value, receiver),
        // Namespace objects silently refuse every set.
        ObjectData::ModuleNamespace(_) => Ok(false),
        ObjectData::TypedArray(_) => typed_array::set(agent, o, key, value, receiver),
        _ => ordinary_set(agent, o, key, value, receiver),
    }
}

/// `O.[[Delete]](P)`.
pub(crate) fn delete(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::delete(agent, o, key),
        ObjectData::Arguments(_) => arguments::delete(agent, o, key),
        ObjectData::ModuleNamespace(_) => namespace_object::delete(agent, o, key),
        _ => Ok(ordinary_delete(&mut agent.heap, o, key)),
    }
}

/// `O.[[OwnPropertyKeys]]()`.
pub(crate) fn own_property_keys(agent: &mut Agent, o: ObjectId) -> JsResult<Vec<PropertyKey>> {
    match &agent.heap.object(o).data {
        ObjectData::Proxy(_) => proxy::own_property_keys(agent, o),
        ObjectData::StringObject(_) => Ok(string_object::own_property_keys(agent, o)),
        ObjectData::TypedArray(_) => Ok(typed_array::own_property_keys(agent, o)),
        ObjectData::ModuleNamespace(_) => Ok(namespace_object::own_property_keys(agent, o)),
        _ => Ok(ordinary_own_property_keys(&agent.heap, o)),
    }
}

// --- ordinary implementations ---

pub(crate) fn ordinary_get_prototype_of(heap: &Heap, o: ObjectId) -> Option<ObjectId> {
    heap.object(o).prototype
}

pub(crate) fn ordinary_set_prototype_of(
    heap: &mut Heap,
    o: ObjectId,
    prototype: Option<ObjectId>,
) -> bool {
    let current = heap.object(o).prototype;
    if prototype == current {
        return true;
    }
    if !heap.object(o).extensible {
        return false;
    }
    // Refuse prototype chains that would cycle. The walk stops at the first
    // exotic link (a proxy) because its [[GetPrototypeOf]] is not the
    // ordinary one.
    let mut ancestor = prototype;
    while let Some(p) = ancestor {
        if p == o {
            return false;
        }
        if matches!(heap.object(p).data, ObjectData::Proxy(_)) {
            break;
        }
        ancestor = heap.object(p).prototype;
    }
    heap.object_mut(o).prototype = prototype;
    true
}

pub(crate) fn ordinary_get_own_property(
    heap: &Heap,
    o: ObjectId,
    key: PropertyKey,
) -> Option<PropertyDescriptor> {
    heap.object(o).entry(key).map(PropertyEntry::descriptor)
}

pub(crate) fn ordinary_define_own_property(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    desc: PropertyDescriptor,
) -> JsResult<bool> {
    let extensible = is_extensible(agent, o)?;
    let current = agent.heap.object(o).entry(key).copied();
    Ok(validate_and_apply_property_descriptor(
        &mut agent.heap,
        Some((o, key)),
        extensible,
        desc,
        current,
    ))
}

/// The descriptor-validation kernel. Validates `desc` against `current` and,
/// when `target` is present and validation succeeds, writes the updated
/// entry. Never throws; rejection policy belongs to the caller.
pub(crate) fn validate_and_apply_property_descriptor(
    heap: &mut Heap,
    target: Option<(ObjectId, PropertyKey)>,
    extensible: bool,
    desc: PropertyDescriptor,
    current: Option<PropertyEntry>,
) -> bool {
    let Some(current) = current else {
        // Creating a new property requires extensibility; missing attributes
        // default to false/undefined.
        if !extensible {
            return false;
        }
        if let Some((o, key)) = target {
            heap.object_mut(o).properties.insert(key, desc.into_entry());
        }
        return true;
    };

    if desc.is_empty() {
        return true;
    }

    if !current.configurable() {
        if desc.configurable == Some(true) {
            return false;
        }
        if let Some(e) = desc.enumerable
            && e != current.enumerable()
        {
            return false;
        }
        // Kind changes are out for non-configurable properties.
        match current {
            PropertyEntry::Data { value, writable, .. } => {
                if desc.is_accessor_descriptor() {
                    return false;
                }
                if !writable {
                    if desc.writable == Some(true) {
                        return false;
                    }
                    if let Some(new_value) = desc.value
                        && !crate::operations::same_value(heap, new_value, value)
                    {
                        return false;
                    }
                }
            }
            PropertyEntry::Accessor { get, set, .. } => {
                if desc.is_data_descriptor() {
                    return false;
                }
                let current_get = get.map_or(Value::Undefined, Value::Object);
                let current_set = set.map_or(Value::Undefined, Value::Object);
                if let Some(new_get) = desc.get
                    && !crate::operations::same_value(heap, new_get, current_get)
                {
                    return false;
                }
                if let Some(new_set) = desc.set
                    && !crate::operations::same_value(heap, new_set, current_set)
                {
                    return false;
                }
            }
        }
    }

    let Some((o, key)) = target else {
        return true;
    };

    let kind_change = (matches!(current, PropertyEntry::Data { .. }) && desc.is_accessor_descriptor())
        || (matches!(current, PropertyEntry::Accessor { .. }) && desc.is_data_descriptor());

    let updated = if kind_change {
        // Converting between kinds keeps enumerable/configurable and
        // defaults the newly introduced fields.
        let enumerable = desc.enumerable.unwrap_or_else(|| current.enumerable());
        let configurable = desc.configurable.unwrap_or_else(|| current.configurable());
        if desc.is_accessor_descriptor() {
            PropertyEntry::Accessor {
                get: desc.get.and_then(Value::object_id),
                set: desc.set.and_then(Value::object_id),
                enumerable,
                configurable,
            }
        } else {
            PropertyEntry::Data {
                value: desc.value.unwrap_or(Value::Undefined),
                writable: desc.writable.unwrap_or(false),
                enumerable,
                configurable,
            }
        }
    } else {
        // Same-kind merge of the supplied fields.
        match current {
            PropertyEntry::Data { value, writable, enumerable, configurable } => PropertyEntry::Data {
                value: desc.value.unwrap_or(value),
                writable: desc.writable.unwrap_or(writable),
                enumerable: desc.enumerable.unwrap_or(enumerable),
                configurable: desc.configurable.unwrap_or(configurable),
            },
            PropertyEntry::Accessor { get, set, enumerable, configurable } => PropertyEntry::Accessor {
                get: match desc.get {
                    Some(v) => v.object_id(),
                    None => get,
                },
                set: match desc.set {
                    Some(v) => v.object_id(),
                    None => set,
                },
                enumerable: desc.enumerable.unwrap_or(enumerable),
                configurable: desc.configurable.unwrap_or(configurable),
            },
        }
    };
    heap.object_mut(o).properties.insert(key, updated);
    true
}

pub(crate) fn ordinary_has_property(agent: &mut Agent, o: ObjectId, key: PropertyKey) -> JsResult<bool> {
    if get_own_property(agent, o, key)?.is_some() {
        return Ok(true);
    }
    match get_prototype_of(agent, o)? {
        Some(parent) => has_property(agent, parent, key),
        None => Ok(false),
    }
}

pub(crate) fn ordinary_get(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    receiver: Value,
) -> JsResult<Value> {
    let Some(desc) = get_own_property(agent, o, key)? else {
        return match get_prototype_of(agent, o)? {
            Some(parent) => get_with_receiver(agent, parent, key, receiver),
            None => Ok(Value::Undefined),
        };
    };
    if desc.is_data_descriptor() {
        return Ok(desc.value.unwrap_or(Value::Undefined));
    }
    match desc.get {
        Some(getter @ Value::Object(_)) => call(agent, getter, receiver, &[]),
        _ => Ok(Value::Undefined),
    }
}

pub(crate) fn ordinary_set(
    agent: &mut Agent,
    o: ObjectId,
    key: PropertyKey,
    value: Value,
    receiver: Value,
) -> JsResult<bool> {
    let own = get_own_property(agent, o, key)?;
    let desc = match own {
        Some(desc) => desc,
        None => {
            return match get_prototype_of(agent, o)? {
                Some(parent) => set_with_receiver(agent, parent, key, value, receiver),
                None => {
                    // No property anywhere on the chain: create on the
                    // receiver with default attributes.
                    set_on_receiver(agent, key, value, receiver)
                }
            };
        }
    };
    if desc.is_data_descriptor() {
        if desc.writable != Some(true) {
            return Ok(false);
        }
        return set_on_receiver(agent, key, value, receiver);
    }
    match desc.set {
        Some(setter @ Value::Object(_)) => {
            call(agent, setter, receiver, &[value])?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// The tail of OrdinarySetWithOwnDescriptor: writing through to the
/// receiver once the chain walk has settled on a writable data property (or
/// no property at all).
fn set_on_receiver(
    agent: &mut Agent,
    key: PropertyKey,
    value: Value,
    receiver: Value,
) -> JsResult<bool> {
    let Value::Object(receiver_id) = receiver else {
        return Ok(false);
    };
    match get_own_property(agent, receiver_id, key)? {
        Some(existing) => {
            if existing.is_accessor_descriptor() {
                return Ok(false);
            }
            if existing.writable != Some(true) {
                return Ok(false);
            }
            define_own_property(agent, receiver_id, key, PropertyDescriptor::value_only(value))
        }
        None => define_own_property(
            agent,
            receiver_id,
            key,
            PropertyDescriptor::full_data(value, true, true, true),
        ),
    }
}

pub(crate) fn ordinary_delete(heap: &mut Heap, o: ObjectId, key: PropertyKey) -> bool {
    match heap.object(o).entry(key) {
        None => true,
        Some(entry) if entry.configurable() => {
            // shift_remove keeps the insertion order of the survivors.
            heap.object_mut(o).properties.shift_remove(&key);
            true
        }
        Some(_) => false,
    }
}

/// Integer-index keys in ascending numeric order, then the remaining string
/// keys in insertion order, then symbol keys in insertion order.
pub(crate) fn ordinary_own_property_keys(heap: &Heap, o: ObjectId) -> Vec<PropertyKey> {
    let record = heap.object(o);
    let mut indices: Vec<(u32, PropertyKey)> = Vec::new();
    let mut strings: Vec<PropertyKey> = Vec::new();
    let mut symbols: Vec<PropertyKey> = Vec::new();
    for &key in record.properties.keys() {
        match key {
            PropertyKey::String(_) => match key.as_array_index(heap) {
                Some(index) => indices.push((index, key)),
                None => strings.push(key),
            },
            PropertyKey::Symbol(_) => symbols.push(key),
        }
    }
    indices.sort_unstable_by_key(|&(index, _)| index);
    let mut keys = Vec::with_capacity(indices.len() + strings.len() + symbols.len());
    keys.extend(indices.into_iter().map(|(_, key)| key));
    keys.extend(strings);
    keys.extend(symbols);
    keys
}

/// `SetIntegrityLevel(O, frozen)` for the frozen case, used by the realm
/// bootstrap for `%ThrowTypeError%`.
pub(crate) fn freeze_object(agent: &mut Agent, o: ObjectId) -> JsResult<bool> {
    if !prevent_extensions(agent, o)? {
        return Ok(false);
    }
    let keys = own_property_keys(agent, o)?;
    for key in keys {
        let desc = PropertyDescriptor {
            configurable: Some(false),
            writable: match agent.heap.object(o).entry(key) {
                Some(PropertyEntry::Data { .. }) => Some(false),
                _ => None,
            },
            ..PropertyDescriptor::default()
        };
        if !define_own_property(agent, o, key, desc)? {
            return Err(agent.throw_error(ErrorKind::Type, "cannot freeze property"));
        }
    }
    Ok(true)
}
