//! `FinalizationRegistry`: registration bookkeeping and the cleanup jobs
//! scheduled on the `FinalizationCleanup` queue. Without a collector the
//! engine never empties cells on its own; the host triggers cleanup.

use crate::{
    agent::{Agent, Feature},
    completion::JsResult,
    heap::{Mark, MarkQueue},
    intrinsics::{
        bootstrap_constructor, bootstrap_prototype, define_method, error::ErrorKind, RealmSeed,
    },
    object::{ObjectData, ObjectRecord},
    operations::{call, is_callable, same_value},
    value::{ObjectId, Value},
};

/// One registered cell.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegistryCell {
    pub target: Value,
    pub held_value: Value,
    pub unregister_token: Value,
}

/// The slots of a FinalizationRegistry.
#[derive(Debug)]
pub(crate) struct FinalizationRegistryData {
    pub cleanup_callback: Value,
    pub cells: Vec<RegistryCell>,
    /// Cells whose targets the host declared dead, pending a cleanup job.
    pub ready: Vec<Value>,
}

impl Mark for FinalizationRegistryData {
    fn mark(&self, queue: &mut MarkQueue) {
        self.cleanup_callback.mark(queue);
        for cell in &self.cells {
            // Targets are deliberately weak; held values and tokens trace.
            cell.held_value.mark(queue);
            cell.unregister_token.mark(queue);
        }
        for held in &self.ready {
            held.mark(queue);
        }
    }
}

fn registry_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_none() {
        return Err(agent.throw_error(ErrorKind::Type, "FinalizationRegistry constructor requires new"));
    }
    let callback = args.first().copied().unwrap_or(Value::Undefined);
    if !is_callable(&agent.heap, callback) {
        return Err(agent.throw_error(ErrorKind::Type, "cleanup callback must be callable"));
    }
    let prototype = agent.intrinsics().finalization_registry_prototype;
    let realm = agent.current_realm_id();
    let registry = agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::FinalizationRegistry(Box::new(FinalizationRegistryData {
            cleanup_callback: callback,
            cells: Vec::new(),
            ready: Vec::new(),
        })),
        realm,
    ));
    Ok(Value::Object(registry))
}

fn this_registry(agent: &mut Agent, this: Value) -> JsResult<ObjectId> {
    if let Value::Object(id) = this
        && matches!(agent.heap.object(id).data, ObjectData::FinalizationRegistry(_))
    {
        return Ok(id);
    }
    Err(agent.throw_error(ErrorKind::Type, "not a FinalizationRegistry"))
}

fn registry_register(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let registry = this_registry(agent, this)?;
    let target = args.first().copied().unwrap_or(Value::Undefined);
    if !matches!(target, Value::Object(_) | Value::Symbol(_)) {
        return Err(agent.throw_error(ErrorKind::Type, "target must be an object or symbol"));
    }
    let held_value = args.get(1).copied().unwrap_or(Value::Undefined);
    if same_value(&agent.heap, target, held_value) {
        return Err(agent.throw_error(ErrorKind::Type, "target and held value must differ"));
    }
    let unregister_token = args.get(2).copied().unwrap_or(Value::Undefined);
    if !matches!(unregister_token, Value::Undefined | Value::Object(_) | Value::Symbol(_)) {
        return Err(agent.throw_error(ErrorKind::Type, "unregister token must be an object or symbol"));
    }
    if let ObjectData::FinalizationRegistry(data) = &mut agent.heap.object_mut(registry).data {
        data.cells.push(RegistryCell { target, held_value, unregister_token });
    }
    Ok(Value::Undefined)
}

fn registry_unregister(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let registry = this_registry(agent, this)?;
    let token = args.first().copied().unwrap_or(Value::Undefined);
    if !matches!(token, Value::Object(_) | Value::Symbol(_)) {
        return Err(agent.throw_error(ErrorKind::Type, "unregister token must be an object or symbol"));
    }
    let mut removed = false;
    if let ObjectData::FinalizationRegistry(data) = &mut agent.heap.object_mut(registry).data {
        let before = data.cells.len();
        data.cells.retain(|cell| cell.unregister_token != token);
        removed = data.cells.len() != before;
    }
    Ok(Value::Boolean(removed))
}

fn registry_cleanup_some(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let registry = this_registry(agent, this)?;
    let callback = match args.first().copied() {
        None | Some(Value::Undefined) => None,
        Some(f) if is_callable(&agent.heap, f) => Some(f),
        Some(_) => return Err(agent.throw_error(ErrorKind::Type, "callback must be callable")),
    };
    cleanup_finalization_registry(agent, registry, callback)?;
    Ok(Value::Undefined)
}

/// `CleanupFinalizationRegistry`: drains the ready cells through the
/// callback.
pub(crate) fn cleanup_finalization_registry(
    agent: &mut Agent,
    registry: ObjectId,
    callback_override: Option<Value>,
) -> JsResult<()> {
    loop {
        let (held, callback) = {
            let ObjectData::FinalizationRegistry(data) = &mut agent.heap.object_mut(registry).data else {
                return Ok(());
            };
            let Some(held) = data.ready.pop() else {
                return Ok(());
            };
            (held, callback_override.unwrap_or(data.cleanup_callback))
        };
        call(agent, callback, Value::Undefined, &[held])?;
    }
}

/// The `FinalizationCleanup` queue job body.
pub(crate) fn run_cleanup_job(agent: &mut Agent, registry: ObjectId) -> Result<(), crate::completion::EngineError> {
    match cleanup_finalization_registry(agent, registry, None) {
        Ok(()) => Ok(()),
        // A throwing callback poisons only this job.
        Err(crate::completion::EngineError::Throw(_)) => Ok(()),
        Err(internal) => Err(internal),
    }
}

pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> (ObjectId, ObjectId) {
    let prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, prototype, "register", registry_register, 2);
    define_method(agent, seed, prototype, "unregister", registry_unregister, 1);
    if agent.feature(Feature::CleanupSome) {
        define_method(agent, seed, prototype, "cleanupSome", registry_cleanup_some, 0);
    }
    let ctor = bootstrap_constructor(agent, seed, registry_constructor, "FinalizationRegistry", 1, prototype);
    seed.register("%FinalizationRegistry%", ctor);
    seed.register("%FinalizationRegistry.prototype%", prototype);
    (ctor, prototype)
}
