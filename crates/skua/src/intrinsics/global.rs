//! The global object: value properties, constructor wiring, and the global
//! environment record.

use crate::{
    agent::Agent,
    environments,
    object::{ObjectData, ObjectRecord, PropertyEntry},
    realm::{Intrinsics, RealmId},
    value::{EnvId, ObjectId, Value},
};

/// Creates the global object with the standard bindings and its environment
/// record.
pub(crate) fn init(agent: &mut Agent, realm: RealmId, intrinsics: &Intrinsics) -> (ObjectId, EnvId) {
    let global = agent.heap.alloc_object(ObjectRecord::new(
        Some(intrinsics.object_prototype),
        ObjectData::Ordinary,
        realm,
    ));

    // Value properties: non-writable, non-configurable.
    for (name, value) in [
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
    ] {
        let key = agent.key_from_str(name);
        agent.heap.object_mut(global).properties.insert(
            key,
            PropertyEntry::Data { value, writable: false, enumerable: false, configurable: false },
        );
    }
    let global_this_key = agent.key_from_str("globalThis");
    agent.heap.object_mut(global).properties.insert(
        global_this_key,
        PropertyEntry::Data {
            value: Value::Object(global),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );

    // Constructor and namespace wiring: data properties with the usual
    // {W:true, E:false, C:true} attributes.
    let mut bindings: Vec<(&str, ObjectId)> = vec![
        ("Object", intrinsics.object),
        ("Function", intrinsics.function),
        ("Array", intrinsics.array),
        ("Boolean", intrinsics.get("%Boolean%").expect("bootstrapped")),
        ("Number", intrinsics.get("%Number%").expect("bootstrapped")),
        ("String", intrinsics.get("%String%").expect("bootstrapped")),
        ("Symbol", intrinsics.symbol),
        ("BigInt", intrinsics.get("%BigInt%").expect("bootstrapped")),
        ("Promise", intrinsics.promise),
        ("Proxy", intrinsics.get("%Proxy%").expect("bootstrapped")),
        ("Reflect", intrinsics.get("%Reflect%").expect("bootstrapped")),
        ("ArrayBuffer", intrinsics.array_buffer),
        ("SharedArrayBuffer", intrinsics.shared_array_buffer),
        ("DataView", intrinsics.data_view),
        ("FinalizationRegistry", intrinsics.finalization_registry),
    ];
    for kind in crate::intrinsics::error::ErrorKind::ALL {
        let name: &'static str = kind.into();
        bindings.push((name, intrinsics.error(kind).constructor));
    }
    for (i, element) in crate::buffer::ElementType::ALL.iter().enumerate() {
        bindings.push((element.constructor_name(), intrinsics.typed_arrays[i].constructor));
    }
    for (name, id) in bindings {
        crate::intrinsics::define_global_value(agent, global, name, Value::Object(id));
    }

    let env = environments::new_global_environment(&mut agent.heap, global, global);
    (global, env)
}
