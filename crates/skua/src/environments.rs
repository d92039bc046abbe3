//! Environment records: declarative, function, object, global and module
//! variants, each with an `OuterEnv` link forming the scope chain.

use ahash::{AHashMap, AHashSet};

use crate::{
    agent::Agent,
    completion::JsResult,
    heap::{Heap, Mark, MarkQueue},
    intrinsics::error::ErrorKind,
    module::ModuleId,
    object::{PropertyDescriptor, PropertyKey},
    ordinary,
    value::{EnvId, ObjectId, PrivateNameId, StringId, Value},
};

/// A single binding slot. `value: None` is an uninitialized binding (the
/// temporal dead zone); reading it is a ReferenceError.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Binding {
    pub value: Option<Value>,
    pub mutable: bool,
    pub deletable: bool,
    /// Immutable bindings created in strict code throw on write even when
    /// the write itself is sloppy.
    pub strict: bool,
}

#[derive(Debug, Default)]
pub(crate) struct DeclarativeEnv {
    pub outer: Option<EnvId>,
    pub bindings: AHashMap<StringId, Binding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThisBindingStatus {
    /// Arrow-function environment: no own `this`.
    Lexical,
    /// Derived-constructor environment before `super()` runs.
    Uninitialized,
    Initialized,
}

#[derive(Debug)]
pub(crate) struct FunctionEnv {
    pub decl: DeclarativeEnv,
    pub this_value: Value,
    pub this_status: ThisBindingStatus,
    pub function_object: ObjectId,
    pub new_target: Option<ObjectId>,
}

#[derive(Debug)]
pub(crate) struct ObjectEnv {
    pub outer: Option<EnvId>,
    pub binding_object: ObjectId,
    /// True for `with` environments; false for the global object record.
    pub with_environment: bool,
}

#[derive(Debug)]
pub(crate) struct GlobalEnv {
    /// Lexical (let/const/class) declarations live here.
    pub decl: DeclarativeEnv,
    /// Var and function declarations go through the global object.
    pub binding_object: ObjectId,
    /// Names introduced by var/function declarations, tracked so redeclaration
    /// checks can tell them apart from ordinary properties.
    pub var_names: AHashSet<StringId>,
    pub global_this: ObjectId,
}

#[derive(Debug)]
pub(crate) struct ModuleEnv {
    pub decl: DeclarativeEnv,
    /// Indirect bindings created by imports: reads forward into the target
    /// module's environment.
    pub indirect: AHashMap<StringId, (ModuleId, StringId)>,
}

#[derive(Debug)]
pub(crate) enum EnvironmentRecord {
    Declarative(DeclarativeEnv),
    Function(FunctionEnv),
    Object(ObjectEnv),
    Global(GlobalEnv),
    Module(ModuleEnv),
}

impl EnvironmentRecord {
    pub fn outer(&self) -> Option<EnvId> {
        match self {
            Self::Declarative(e) => e.outer,
            Self::Function(e) => e.decl.outer,
            Self::Object(e) => e.outer,
            Self::Global(_) => None,
            Self::Module(e) => e.decl.outer,
        }
    }

    fn declarative_mut(&mut self) -> Option<&mut DeclarativeEnv> {
        match self {
            Self::Declarative(e) => Some(e),
            Self::Function(e) => Some(&mut e.decl),
            Self::Global(e) => Some(&mut e.decl),
            Self::Module(e) => Some(&mut e.decl),
            Self::Object(_) => None,
        }
    }

    fn declarative(&self) -> Option<&DeclarativeEnv> {
        match self {
            Self::Declarative(e) => Some(e),
            Self::Function(e) => Some(&e.decl),
            Self::Global(e) => Some(&e.decl),
            Self::Module(e) => Some(&e.decl),
            Self::Object(_) => None,
        }
    }
}

impl Mark for EnvironmentRecord {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(outer) = self.outer() {
            queue.push_env(outer);
        }
        if let Some(decl) = self.declarative() {
            for binding in decl.bindings.values() {
                binding.value.mark(queue);
            }
        }
        match self {
            Self::Function(e) => {
                e.this_value.mark(queue);
                queue.push_object(e.function_object);
                if let Some(nt) = e.new_target {
                    queue.push_object(nt);
                }
            }
            Self::Object(e) => queue.push_object(e.binding_object),
            Self::Global(e) => {
                queue.push_object(e.binding_object);
                queue.push_object(e.global_this);
            }
            _ => {}
        }
    }
}

// --- constructors ---

pub(crate) fn new_declarative_environment(heap: &mut Heap, outer: Option<EnvId>) -> EnvId {
    heap.alloc_env(EnvironmentRecord::Declarative(DeclarativeEnv {
        outer,
        bindings: AHashMap::new(),
    }))
}

pub(crate) fn new_object_environment(
    heap: &mut Heap,
    binding_object: ObjectId,
    with_environment: bool,
    outer: Option<EnvId>,
) -> EnvId {
    heap.alloc_env(EnvironmentRecord::Object(ObjectEnv {
        outer,
        binding_object,
        with_environment,
    }))
}

pub(crate) fn new_function_environment(
    heap: &mut Heap,
    function_object: ObjectId,
    this_status: ThisBindingStatus,
    new_target: Option<ObjectId>,
    outer: Option<EnvId>,
) -> EnvId {
    heap.alloc_env(EnvironmentRecord::Function(FunctionEnv {
        decl: DeclarativeEnv { outer, bindings: AHashMap::new() },
        this_value: Value::Undefined,
        this_status,
        function_object,
        new_target,
    }))
}

pub(crate) fn new_global_environment(heap: &mut Heap, global: ObjectId, this_value: ObjectId) -> EnvId {
    heap.alloc_env(EnvironmentRecord::Global(GlobalEnv {
        decl: DeclarativeEnv::default(),
        binding_object: global,
        var_names: AHashSet::new(),
        global_this: this_value,
    }))
}

pub(crate) fn new_module_environment(heap: &mut Heap, outer: Option<EnvId>) -> EnvId {
    heap.alloc_env(EnvironmentRecord::Module(ModuleEnv {
        decl: DeclarativeEnv { outer, bindings: AHashMap::new() },
        indirect: AHashMap::new(),
    }))
}

// --- binding operations ---

pub(crate) fn has_binding(agent: &mut Agent, env: EnvId, name: StringId) -> JsResult<bool> {
    match agent.heap.env(env) {
        EnvironmentRecord::Object(e) => {
            let object = e.binding_object;
            ordinary::has_property(agent, object, PropertyKey::String(name))
        }
        EnvironmentRecord::Global(e) => {
            if e.decl.bindings.contains_key(&name) {
                return Ok(true);
            }
            let object = e.binding_object;
            ordinary::has_property(agent, object, PropertyKey::String(name))
        }
        EnvironmentRecord::Module(e) => {
            Ok(e.decl.bindings.contains_key(&name) || e.indirect.contains_key(&name))
        }
        record => Ok(record
            .declarative()
            .is_some_and(|d| d.bindings.contains_key(&name))),
    }
}

pub(crate) fn create_mutable_binding(
    agent: &mut Agent,
    env: EnvId,
    name: StringId,
    deletable: bool,
) -> JsResult<()> {
    match agent.heap.env_mut(env) {
        EnvironmentRecord::Object(e) => {
            let object = e.binding_object;
            let desc = PropertyDescriptor::full_data(Value::Undefined, true, true, deletable);
            crate::operations::define_property_or_throw(agent, object, PropertyKey::String(name), desc)
        }
        record => {
            let decl = record
                .declarative_mut()
                .expect("declarative environment expected");
            decl.bindings.insert(
                name,
                Binding { value: None, mutable: true, deletable, strict: false },
            );
            Ok(())
        }
    }
}

pub(crate) fn create_immutable_binding(
    agent: &mut Agent,
    env: EnvId,
    name: StringId,
    strict: bool,
) -> JsResult<()> {
    let record = agent.heap.env_mut(env);
    let decl = record
        .declarative_mut()
        .expect("immutable bindings require a declarative environment");
    decl.bindings.insert(
        name,
        Binding { value: None, mutable: false, deletable: false, strict },
    );
    Ok(())
}

pub(crate) fn initialize_binding(agent: &mut Agent, env: EnvId, name: StringId, value: Value) -> JsResult<()> {
    match agent.heap.env_mut(env) {
        EnvironmentRecord::Object(e) => {
            let object = e.binding_object;
            crate::operations::set_property(agent, object, PropertyKey::String(name), value, false)
        }
        EnvironmentRecord::Global(e) => {
            if let Some(binding) = e.decl.bindings.get_mut(&name) {
                binding.value = Some(value);
                return Ok(());
            }
            let object = e.binding_object;
            crate::operations::set_property(agent, object, PropertyKey::String(name), value, false)
        }
        record => {
            let decl = record.declarative_mut().expect("declarative environment expected");
            let binding = decl
                .bindings
                .get_mut(&name)
                .expect("binding must exist before initialization");
            binding.value = Some(value);
            Ok(())
        }
    }
}

pub(crate) fn set_mutable_binding(
    agent: &mut Agent,
    env: EnvId,
    name: StringId,
    value: Value,
    strict: bool,
) -> JsResult<()> {
    match agent.heap.env_mut(env) {
        EnvironmentRecord::Object(e) => {
            let object = e.binding_object;
            let still_exists = ordinary::has_property(agent, object, PropertyKey::String(name))?;
            if !still_exists && strict {
                return Err(unresolvable(agent, name));
            }
            crate::operations::set_property(agent, object, PropertyKey::String(name), value, strict)
        }
        EnvironmentRecord::Global(e) => {
            if e.decl.bindings.contains_key(&name) {
                return set_declarative(agent, env, name, value, strict);
            }
            let object = e.binding_object;
            let exists = ordinary::has_property(agent, object, PropertyKey::String(name))?;
            if !exists && strict {
                return Err(unresolvable(agent, name));
            }
            crate::operations::set_property(agent, object, PropertyKey::String(name), value, strict)
        }
        _ => set_declarative(agent, env, name, value, strict),
    }
}

fn set_declarative(agent: &mut Agent, env: EnvId, name: StringId, value: Value, strict: bool) -> JsResult<()> {
    // Probe first so the error paths can borrow the agent freely.
    let current = agent
        .heap
        .env(env)
        .declarative()
        .expect("declarative environment expected")
        .bindings
        .get(&name)
        .copied();
    match current {
        None if strict => Err(unresolvable(agent, name)),
        None => {
            let decl = agent
                .heap
                .env_mut(env)
                .declarative_mut()
                .expect("declarative environment expected");
            decl.bindings.insert(
                name,
                Binding { value: Some(value), mutable: true, deletable: true, strict: false },
            );
            Ok(())
        }
        Some(binding) if binding.value.is_none() => Err(uninitialized(agent, name)),
        Some(binding) if binding.mutable => {
            let decl = agent
                .heap
                .env_mut(env)
                .declarative_mut()
                .expect("declarative environment expected");
            decl.bindings.get_mut(&name).expect("probed above").value = Some(value);
            Ok(())
        }
        Some(binding) => {
            if strict || binding.strict {
                let text = agent.heap.string(name).to_rust_string();
                return Err(
                    agent.throw_error(ErrorKind::Type, format!("assignment to constant variable '{text}'"))
                );
            }
            Ok(())
        }
    }
}

pub(crate) fn get_binding_value(agent: &mut Agent, env: EnvId, name: StringId, strict: bool) -> JsResult<Value> {
    match agent.heap.env(env) {
        EnvironmentRecord::Object(e) => {
            let object = e.binding_object;
            let exists = ordinary::has_property(agent, object, PropertyKey::String(name))?;
            if !exists {
                if strict {
                    return Err(unresolvable(agent, name));
                }
                return Ok(Value::Undefined);
            }
            crate::operations::get(agent, object, PropertyKey::String(name))
        }
        EnvironmentRecord::Global(e) => {
            if let Some(binding) = e.decl.bindings.get(&name) {
                return binding.value.ok_or_else(|| uninitialized(agent, name));
            }
            let object = e.binding_object;
            let exists = ordinary::has_property(agent, object, PropertyKey::String(name))?;
            if !exists {
                if strict {
                    return Err(unresolvable(agent, name));
                }
                return Ok(Value::Undefined);
            }
            crate::operations::get(agent, object, PropertyKey::String(name))
        }
        EnvironmentRecord::Module(e) => {
            if let Some(&(module, target_name)) = e.indirect.get(&name) {
                let Some(target_env) = crate::module::environment(agent, module) else {
                    return Err(uninitialized(agent, name));
                };
                return get_binding_value(agent, target_env, target_name, true);
            }
            match e.decl.bindings.get(&name) {
                Some(binding) => binding.value.ok_or_else(|| uninitialized(agent, name)),
                None => Err(unresolvable(agent, name)),
            }
        }
        record => {
            let decl = record.declarative().expect("declarative environment expected");
            match decl.bindings.get(&name) {
                Some(binding) => binding.value.ok_or_else(|| uninitialized(agent, name)),
                None => Err(unresolvable(agent, name)),
            }
        }
    }
}

pub(crate) fn delete_binding(agent: &mut Agent, env: EnvId, name: StringId) -> JsResult<bool> {
    match agent.heap.env_mut(env) {
        EnvironmentRecord::Object(e) => {
            let object = e.binding_object;
            ordinary::delete(agent, object, PropertyKey::String(name))
        }
        EnvironmentRecord::Global(e) => {
            if e.decl.bindings.contains_key(&name) {
                return Ok(false);
            }
            let object = e.binding_object;
            let existing = ordinary::has_property(agent, object, PropertyKey::String(name))?;
            if !existing {
                return Ok(true);
            }
            let deleted = ordinary::delete(agent, object, PropertyKey::String(name))?;
            if deleted {
                if let EnvironmentRecord::Global(e) = agent.heap.env_mut(env) {
                    e.var_names.remove(&name);
                }
            }
            Ok(deleted)
        }
        record => {
            let decl = record.declarative_mut().expect("declarative environment expected");
            match decl.bindings.get(&name) {
                Some(binding) if binding.deletable => {
                    decl.bindings.remove(&name);
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Ok(true),
            }
        }
    }
}

// --- this / new.target resolution ---

pub(crate) fn has_this_binding(heap: &Heap, env: EnvId) -> bool {
    match heap.env(env) {
        EnvironmentRecord::Function(e) => e.this_status != ThisBindingStatus::Lexical,
        EnvironmentRecord::Global(_) | EnvironmentRecord::Module(_) => true,
        _ => false,
    }
}

/// Walks the scope chain to the environment that currently owns `this`.
pub(crate) fn get_this_environment(heap: &Heap, mut env: EnvId) -> EnvId {
    loop {
        if has_this_binding(heap, env) {
            return env;
        }
        env = heap
            .env(env)
            .outer()
            .expect("the global environment always has a this binding");
    }
}

pub(crate) fn get_this_binding(agent: &mut Agent, env: EnvId) -> JsResult<Value> {
    match agent.heap.env(env) {
        EnvironmentRecord::Global(e) => Ok(Value::Object(e.global_this)),
        EnvironmentRecord::Module(_) => Ok(Value::Undefined),
        EnvironmentRecord::Function(e) => {
            if e.this_status == ThisBindingStatus::Uninitialized {
                return Err(agent.throw_error(
                    ErrorKind::Reference,
                    "must call super constructor before accessing 'this'",
                ));
            }
            Ok(e.this_value)
        }
        _ => Err(crate::completion::EngineError::internal(
            "this binding requested from an environment without one",
        )),
    }
}

pub(crate) fn bind_this_value(agent: &mut Agent, env: EnvId, value: Value) -> JsResult<Value> {
    let EnvironmentRecord::Function(e) = agent.heap.env_mut(env) else {
        return Err(crate::completion::EngineError::internal(
            "bind_this_value on a non-function environment",
        ));
    };
    if e.this_status == ThisBindingStatus::Initialized {
        return Err(agent.throw_error(ErrorKind::Reference, "super constructor called twice"));
    }
    e.this_value = value;
    e.this_status = ThisBindingStatus::Initialized;
    Ok(value)
}

pub(crate) fn get_new_target(heap: &Heap, env: EnvId) -> Option<ObjectId> {
    let this_env = get_this_environment(heap, env);
    match heap.env(this_env) {
        EnvironmentRecord::Function(e) => e.new_target,
        _ => None,
    }
}

// --- identifier resolution ---

/// The resolved half of a reference: either a binding in some environment or
/// an unresolvable name.
pub(crate) fn resolve_binding_env(
    agent: &mut Agent,
    mut env: Option<EnvId>,
    name: StringId,
) -> JsResult<Option<EnvId>> {
    while let Some(current) = env {
        if has_binding(agent, current, name)? {
            return Ok(Some(current));
        }
        env = agent.heap.env(current).outer();
    }
    Ok(None)
}

// --- global declaration helpers ---

pub(crate) fn global_has_lexical_declaration(heap: &Heap, env: EnvId, name: StringId) -> bool {
    match heap.env(env) {
        EnvironmentRecord::Global(e) => e.decl.bindings.contains_key(&name),
        _ => false,
    }
}

pub(crate) fn can_declare_global_var(agent: &mut Agent, env: EnvId, name: StringId) -> JsResult<bool> {
    let EnvironmentRecord::Global(e) = agent.heap.env(env) else {
        return Ok(false);
    };
    let object = e.binding_object;
    if ordinary::get_own_property(agent, object, PropertyKey::String(name))?.is_some() {
        return Ok(true);
    }
    ordinary::is_extensible(agent, object)
}

pub(crate) fn can_declare_global_function(agent: &mut Agent, env: EnvId, name: StringId) -> JsResult<bool> {
    let EnvironmentRecord::Global(e) = agent.heap.env(env) else {
        return Ok(false);
    };
    let object = e.binding_object;
    match ordinary::get_own_property(agent, object, PropertyKey::String(name))? {
        None => ordinary::is_extensible(agent, object),
        Some(desc) => Ok(desc.configurable == Some(true)
            || (desc.is_data_descriptor()
                && desc.writable == Some(true)
                && desc.enumerable == Some(true))),
    }
}

pub(crate) fn create_global_var_binding(agent: &mut Agent, env: EnvId, name: StringId) -> JsResult<()> {
    let EnvironmentRecord::Global(e) = agent.heap.env(env) else {
        return Err(crate::completion::EngineError::internal("global binding outside global env"));
    };
    let object = e.binding_object;
    let has = ordinary::get_own_property(agent, object, PropertyKey::String(name))?.is_some();
    let extensible = ordinary::is_extensible(agent, object)?;
    if !has && extensible {
        let desc = PropertyDescriptor::full_data(Value::Undefined, true, true, false);
        crate::operations::define_property_or_throw(agent, object, PropertyKey::String(name), desc)?;
    }
    if let EnvironmentRecord::Global(e) = agent.heap.env_mut(env) {
        e.var_names.insert(name);
    }
    Ok(())
}

pub(crate) fn create_global_function_binding(
    agent: &mut Agent,
    env: EnvId,
    name: StringId,
    value: Value,
) -> JsResult<()> {
    let EnvironmentRecord::Global(e) = agent.heap.env(env) else {
        return Err(crate::completion::EngineError::internal("global binding outside global env"));
    };
    let object = e.binding_object;
    let existing = ordinary::get_own_property(agent, object, PropertyKey::String(name))?;
    let desc = match existing {
        None => PropertyDescriptor::full_data(value, true, true, false),
        Some(d) if d.configurable == Some(true) => PropertyDescriptor::full_data(value, true, true, false),
        _ => PropertyDescriptor::value_only(value),
    };
    crate::operations::define_property_or_throw(agent, object, PropertyKey::String(name), desc)?;
    crate::operations::set_property(agent, object, PropertyKey::String(name), value, false)?;
    if let EnvironmentRecord::Global(e) = agent.heap.env_mut(env) {
        e.var_names.insert(name);
    }
    Ok(())
}

// --- module import bindings ---

pub(crate) fn create_import_binding(
    agent: &mut Agent,
    env: EnvId,
    name: StringId,
    module: ModuleId,
    target_name: StringId,
) {
    if let EnvironmentRecord::Module(e) = agent.heap.env_mut(env) {
        e.indirect.insert(name, (module, target_name));
    }
}

// --- private environments ---

/// A private environment record: the `#name` scope introduced by each class
/// body.
#[derive(Debug)]
pub(crate) struct PrivateEnvRecord {
    pub outer: Option<crate::value::PrivateEnvId>,
    pub names: AHashMap<Box<str>, PrivateNameId>,
}

/// `ResolvePrivateIdentifier`.
pub(crate) fn resolve_private_identifier(
    heap: &Heap,
    mut env: Option<crate::value::PrivateEnvId>,
    name: &str,
) -> Option<PrivateNameId> {
    while let Some(current) = env {
        let record = heap.private_env(current);
        if let Some(&id) = record.names.get(name) {
            return Some(id);
        }
        env = record.outer;
    }
    None
}

// --- error helpers ---

fn unresolvable(agent: &mut Agent, name: StringId) -> crate::completion::EngineError {
    let text = agent.heap.string(name).to_rust_string();
    agent.throw_error(ErrorKind::Reference, format!("{text} is not defined"))
}

fn uninitialized(agent: &mut Agent, name: StringId) -> crate::completion::EngineError {
    let text = agent.heap.string(name).to_rust_string();
    agent.throw_error(
        ErrorKind::Reference,
        format!("cannot access '{text}' before initialization"),
    )
}
