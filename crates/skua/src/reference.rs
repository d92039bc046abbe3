//! Reference records: the transient read/write targets produced by
//! identifier and property-access evaluation. Never a first-class value —
//! they exist between an evaluation step and the `get_value`/`put_value`
//! that consumes them.

use crate::{
    agent::Agent,
    completion::JsResult,
    conversion::to_object,
    environments,
    intrinsics::error::ErrorKind,
    object::{PrivateElement, PropertyKey},
    operations::call,
    ordinary,
    value::{EnvId, ObjectId, PrivateNameId, Value},
};

#[derive(Debug, Clone, Copy)]
pub(crate) enum ReferenceBase {
    /// The name did not resolve in any environment.
    Unresolvable,
    Environment(EnvId),
    Value(Value),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ReferencedName {
    Key(PropertyKey),
    Private(PrivateNameId),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Reference {
    pub base: ReferenceBase,
    pub name: ReferencedName,
    pub strict: bool,
    /// Present only for `super` references.
    pub this_value: Option<Value>,
}

impl Reference {
    pub fn is_property_reference(&self) -> bool {
        matches!(self.base, ReferenceBase::Value(_))
    }

    pub fn is_unresolvable(&self) -> bool {
        matches!(self.base, ReferenceBase::Unresolvable)
    }

    /// `GetThisValue(V)`.
    pub fn get_this_value(&self) -> Value {
        if let Some(this) = self.this_value {
            return this;
        }
        match self.base {
            ReferenceBase::Value(v) => v,
            _ => Value::Undefined,
        }
    }

    fn name_for_message(&self, agent: &Agent) -> String {
        match self.name {
            ReferencedName::Key(key) => key.display(&agent.heap),
            ReferencedName::Private(id) => format!("#{}", agent.heap.private_name(id).description),
        }
    }
}

/// `GetValue(V)`.
pub(crate) fn get_value(agent: &mut Agent, reference: &Reference) -> JsResult<Value> {
    match reference.base {
        ReferenceBase::Unresolvable => {
            let name = reference.name_for_message(agent);
            Err(agent.throw_error(ErrorKind::Reference, format!("{name} is not defined")))
        }
        ReferenceBase::Environment(env) => {
            let ReferencedName::Key(PropertyKey::String(name)) = reference.name else {
                return Err(crate::completion::EngineError::internal(
                    "environment reference with a non-string name",
                ));
            };
            environments::get_binding_value(agent, env, name, reference.strict)
        }
        ReferenceBase::Value(base) => match reference.name {
            ReferencedName::Private(name) => {
                let Value::Object(object) = base else {
                    return Err(agent.throw_error(
                        ErrorKind::Type,
                        "cannot read a private member from a non-object",
                    ));
                };
                private_get(agent, object, name)
            }
            ReferencedName::Key(key) => {
                let object = to_object(agent, base)?;
                ordinary::get_with_receiver(agent, object, key, reference.get_this_value())
            }
        },
    }
}

/// `PutValue(V, W)`.
pub(crate) fn put_value(agent: &mut Agent, reference: &Reference, value: Value) -> JsResult<()> {
    match reference.base {
        ReferenceBase::Unresolvable => {
            if reference.strict {
                let name = reference.name_for_message(agent);
                return Err(agent.throw_error(ErrorKind::Reference, format!("{name} is not defined")));
            }
            // Sloppy writes to unresolvable names create a global property.
            let ReferencedName::Key(key) = reference.name else {
                return Err(crate::completion::EngineError::internal(
                    "unresolvable private reference",
                ));
            };
            let global = agent.current_global_object();
            crate::operations::set_property(agent, global, key, value, false)
        }
        ReferenceBase::Environment(env) => {
            let ReferencedName::Key(PropertyKey::String(name)) = reference.name else {
                return Err(crate::completion::EngineError::internal(
                    "environment reference with a non-string name",
                ));
            };
            environments::set_mutable_binding(agent, env, name, value, reference.strict)
        }
        ReferenceBase::Value(base) => match reference.name {
            ReferencedName::Private(name) => {
                let Value::Object(object) = base else {
                    return Err(agent.throw_error(
                        ErrorKind::Type,
                        "cannot write a private member on a non-object",
                    ));
                };
                private_set(agent, object, name, value)
            }
            ReferencedName::Key(key) => {
                let object = to_object(agent, base)?;
                let succeeded =
                    ordinary::set_with_receiver(agent, object, key, value, reference.get_this_value())?;
                if !succeeded && reference.strict {
                    let name = reference.name_for_message(agent);
                    return Err(
                        agent.throw_error(ErrorKind::Type, format!("cannot assign to property '{name}'"))
                    );
                }
                Ok(())
            }
        },
    }
}

/// `InitializeReferencedBinding(V, W)`.
pub(crate) fn initialize_referenced_binding(
    agent: &mut Agent,
    reference: &Reference,
    value: Value,
) -> JsResult<()> {
    let ReferenceBase::Environment(env) = reference.base else {
        return Err(crate::completion::EngineError::internal(
            "initialization target must be an environment reference",
        ));
    };
    let ReferencedName::Key(PropertyKey::String(name)) = reference.name else {
        return Err(crate::completion::EngineError::internal(
            "environment reference with a non-string name",
        ));
    };
    environments::initialize_binding(agent, env, name, value)
}

/// `PrivateGet(O, P)`: elements are found by name identity, never by
/// description.
pub(crate) fn private_get(agent: &mut Agent, object: ObjectId, name: PrivateNameId) -> JsResult<Value> {
    let element = agent.heap.object(object).private_element(name).cloned();
    match element {
        None => {
            let text = agent.heap.private_name(name).description.clone();
            Err(agent.throw_error(
                ErrorKind::Type,
                format!("private member #{text} is not present on this object"),
            ))
        }
        Some(PrivateElement::Field { value, .. } | PrivateElement::Method { value, .. }) => Ok(value),
        Some(PrivateElement::Accessor { get: None, .. }) => {
            let text = agent.heap.private_name(name).description.clone();
            Err(agent.throw_error(ErrorKind::Type, format!("#{text} was defined without a getter")))
        }
        Some(PrivateElement::Accessor { get: Some(getter), .. }) => {
            call(agent, Value::Object(getter), Value::Object(object), &[])
        }
    }
}

/// `PrivateSet(O, P, V)`.
pub(crate) fn private_set(
    agent: &mut Agent,
    object: ObjectId,
    name: PrivateNameId,
    value: Value,
) -> JsResult<()> {
    let element = agent.heap.object(object).private_element(name).cloned();
    match element {
        None => {
            let text = agent.heap.private_name(name).description.clone();
            Err(agent.throw_error(
                ErrorKind::Type,
                format!("private member #{text} is not present on this object"),
            ))
        }
        Some(PrivateElement::Field { .. }) => {
            let record = agent.heap.object_mut(object);
            for element in &mut record.private_elements {
                if let PrivateElement::Field { key, value: slot } = element
                    && *key == name
                {
                    *slot = value;
                }
            }
            Ok(())
        }
        Some(PrivateElement::Method { .. }) => {
            let text = agent.heap.private_name(name).description.clone();
            Err(agent.throw_error(ErrorKind::Type, format!("cannot assign to private method #{text}")))
        }
        Some(PrivateElement::Accessor { set: None, .. }) => {
            let text = agent.heap.private_name(name).description.clone();
            Err(agent.throw_error(ErrorKind::Type, format!("#{text} was defined without a setter")))
        }
        Some(PrivateElement::Accessor { set: Some(setter), .. }) => {
            call(agent, Value::Object(setter), Value::Object(object), &[value])?;
            Ok(())
        }
    }
}
