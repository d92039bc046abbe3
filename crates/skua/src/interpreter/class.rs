//! Class definition evaluation: heritage resolution, private scopes,
//! method/accessor installation, and field recording.

use std::rc::Rc;

use crate::{
    agent::Agent,
    ast::{
        Ast, ClassElement, ClassElementKind, ClassKey, ClassNode, FunctionNode, Node, NodeId,
        Param, Span,
    },
    completion::{Completion, EngineError, JsResult},
    conversion::to_property_key,
    environments::{self, PrivateEnvRecord, ThisBindingStatus},
    function::{ConstructorKind, FieldKey, FieldRecord},
    heap::{Mark, MarkQueue},
    interpreter::{instantiate_function, outcome, Machine, StepEvent},
    intrinsics::error::ErrorKind,
    object::{ObjectData, ObjectRecord, PrivateElement, PropertyEntry, PropertyKey},
    value::{EnvId, ObjectId, PrivateEnvId, Value},
};

/// Scratch for one class evaluation.
#[derive(Debug)]
pub(crate) struct ClassEval {
    pub proto_parent: Option<ObjectId>,
    pub ctor_parent: Option<ObjectId>,
    pub prototype: Option<ObjectId>,
    pub constructor: Option<ObjectId>,
    pub class_env: Option<EnvId>,
    pub private_env: Option<PrivateEnvId>,
    pub element_index: usize,
    pub pending_key: Option<PropertyKey>,
}

impl Mark for ClassEval {
    fn mark(&self, queue: &mut MarkQueue) {
        for id in [self.proto_parent, self.ctor_parent, self.prototype, self.constructor]
            .into_iter()
            .flatten()
        {
            queue.push_object(id);
        }
        if let Some(env) = self.class_env {
            queue.push_env(env);
        }
    }
}

const PHASE_HERITAGE_DONE: u32 = 1;
const PHASE_ELEMENTS: u32 = 2;
const PHASE_COMPUTED_KEY: u32 = 3;
const PHASE_STATIC_INIT: u32 = 4;

pub(super) fn step(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    node_id: NodeId,
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    let Node::Class(class) = ast.node(node_id) else {
        return Err(EngineError::internal("class step on a non-class node"));
    };
    let strict = true; // class bodies are always strict code

    match machine.top().phase {
        0 => {
            // Fresh scope for the class binding and a fresh private scope.
            let outer = agent.running_context().lexical_env;
            let class_env = environments::new_declarative_environment(&mut agent.heap, Some(outer));
            if let Some(name) = &class.name {
                let name_id = agent.heap.intern_str(name);
                environments::create_immutable_binding(agent, class_env, name_id, true)?;
            }
            let outer_private = agent.running_context().private_env;
            let mut names = ahash::AHashMap::new();
            for element in &class.elements {
                if let ClassKey::Private(name) = &element.key {
                    let getter_setter_shared = names.contains_key(name.as_ref());
                    if !getter_setter_shared {
                        let id = agent.heap.alloc_private_name(name);
                        names.insert(name.clone(), id);
                    }
                }
            }
            let private_env = agent
                .heap
                .alloc_private_env(PrivateEnvRecord { outer: outer_private, names });

            let frame = machine.top();
            frame.saved_env = Some(outer);
            frame.saved_private_env = Some(outer_private);
            frame.state = super::FrameState::Class(Box::new(ClassEval {
                proto_parent: None,
                ctor_parent: None,
                prototype: None,
                constructor: None,
                class_env: Some(class_env),
                private_env: Some(private_env),
                element_index: 0,
                pending_key: None,
            }));
            agent.running_context_mut().lexical_env = class_env;
            agent.running_context_mut().private_env = Some(private_env);

            match class.heritage {
                Some(heritage) => {
                    machine.top().phase = PHASE_HERITAGE_DONE;
                    Ok(StepEvent::Push(heritage))
                }
                None => {
                    let object_proto = agent.intrinsics().object_prototype;
                    let function_proto = agent.intrinsics().function_prototype;
                    with_state(machine, |state| {
                        state.proto_parent = Some(object_proto);
                        state.ctor_parent = Some(function_proto);
                    });
                    machine.top().phase = PHASE_ELEMENTS;
                    create_class_skeleton(agent, machine, ast, node_id, class)?;
                    Ok(StepEvent::Continue)
                }
            }
        }
        PHASE_HERITAGE_DONE => {
            let heritage = input.expect("class heritage").value_or_undefined();
            let (proto_parent, ctor_parent) = match heritage {
                Value::Null => (None, Some(agent.intrinsics().function_prototype)),
                Value::Object(parent) if agent.heap.object(parent).is_constructor() => {
                    let proto_key = PropertyKey::String(agent.heap.statics.prototype);
                    let proto = match crate::operations::get(agent, parent, proto_key) {
                        Ok(p) => p,
                        Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
                    };
                    match proto {
                        Value::Object(p) => (Some(p), Some(parent)),
                        Value::Null => (None, Some(parent)),
                        _ => {
                            return Ok(StepEvent::Done(class_error(
                                agent,
                                "class heritage prototype must be an object or null",
                            )));
                        }
                    }
                }
                _ => {
                    return Ok(StepEvent::Done(class_error(
                        agent,
                        "class heritage is not a constructor",
                    )));
                }
            };
            with_state(machine, |state| {
                state.proto_parent = proto_parent;
                state.ctor_parent = ctor_parent;
            });
            machine.top().phase = PHASE_ELEMENTS;
            create_class_skeleton(agent, machine, ast, node_id, class)?;
            Ok(StepEvent::Continue)
        }
        PHASE_ELEMENTS => advance_elements(agent, machine, ast, class, None, strict),
        PHASE_COMPUTED_KEY => {
            let key = input.expect("computed class key").value_or_undefined();
            let key = match to_property_key(agent, key) {
                Ok(k) => k,
                Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
            };
            machine.top().phase = PHASE_ELEMENTS;
            advance_elements(agent, machine, ast, class, Some(key), strict)
        }
        PHASE_STATIC_INIT => {
            // A static field initializer's value arrived; drop back into the
            // plain class scope.
            let value = input.expect("static field value").value_or_undefined();
            let key = with_state(machine, |state| state.pending_key.take()).expect("static key recorded");
            let ctor = with_state(machine, |state| state.constructor).expect("constructor created");
            if let Some(class_env) = with_state(machine, |state| state.class_env) {
                agent.running_context_mut().lexical_env = class_env;
            }
            if let Err(e) = crate::operations::create_data_property_or_throw(agent, ctor, key, value) {
                return Ok(StepEvent::Done(outcome(Err(e))?));
            }
            machine.top().phase = PHASE_ELEMENTS;
            advance_elements(agent, machine, ast, class, None, strict)
        }
        _ => unreachable!("class phase"),
    }
}

fn class_error(agent: &mut Agent, message: &str) -> Completion {
    match agent.throw_error(ErrorKind::Type, message) {
        EngineError::Throw(t) => Completion::Throw(t),
        EngineError::Internal(_) => unreachable!(),
    }
}

fn with_state<R>(machine: &mut Machine, f: impl FnOnce(&mut ClassEval) -> R) -> R {
    match &mut machine.top().state {
        super::FrameState::Class(state) => f(state),
        _ => unreachable!("class frame state"),
    }
}

/// Creates the prototype object and the constructor function, wiring
/// `.prototype` <-> `.constructor`.
fn create_class_skeleton(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    node_id: NodeId,
    class: &ClassNode,
) -> JsResult<()> {
    let (proto_parent, ctor_parent, private_env) =
        with_state(machine, |s| (s.proto_parent, s.ctor_parent, s.private_env));
    let realm = agent.current_realm_id();
    let prototype = agent
        .heap
        .alloc_object(ObjectRecord::new(proto_parent, ObjectData::Ordinary, realm));

    let derived = matches!(ast.node(node_id), Node::Class(c) if c.heritage.is_some());
    let ctor_element = class.elements.iter().find(|e| {
        e.kind == ClassElementKind::Method
            && !e.is_static
            && matches!(&e.key, ClassKey::Ident(name) if name.as_ref() == "constructor")
    });

    let constructor = match ctor_element.and_then(|e| e.value) {
        Some(func_id) => {
            let Node::Function(func_node) = ast.node(func_id) else {
                return Err(EngineError::internal("constructor without a function node"));
            };
            instantiate_function(
                agent,
                machine.source,
                func_id,
                func_node,
                true,
                class.name.as_deref(),
                true,
                Some(prototype),
            )
        }
        None => {
            let (source, base, derived_node) = agent.synthetic_default_ctors();
            let node = if derived { derived_node } else { base };
            let synthetic_ast = Rc::clone(&agent.source(source).ast);
            let Node::Function(func_node) = synthetic_ast.node(node) else {
                return Err(EngineError::internal("synthetic constructor missing"));
            };
            let func_node = func_node.clone();
            instantiate_function(
                agent,
                source,
                node,
                &func_node,
                true,
                class.name.as_deref(),
                true,
                Some(prototype),
            )
        }
    };

    // Promote the method into a class constructor.
    if let ObjectData::Function(data) = &mut agent.heap.object_mut(constructor).data {
        data.is_class_constructor = true;
        data.is_constructor = true;
        data.constructor_kind = if derived { ConstructorKind::Derived } else { ConstructorKind::Base };
        data.private_environment = private_env;
        data.source_text = class.source_text.clone();
    }
    if let Some(parent) = ctor_parent {
        agent.heap.object_mut(constructor).prototype = Some(parent);
    }
    let proto_key = PropertyKey::String(agent.heap.statics.prototype);
    agent.heap.object_mut(constructor).properties.insert(
        proto_key,
        PropertyEntry::Data {
            value: Value::Object(prototype),
            writable: false,
            enumerable: false,
            configurable: false,
        },
    );
    let ctor_key = PropertyKey::String(agent.heap.statics.constructor);
    agent.heap.object_mut(prototype).properties.insert(
        ctor_key,
        PropertyEntry::Data {
            value: Value::Object(constructor),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    with_state(machine, |state| {
        state.prototype = Some(prototype);
        state.constructor = Some(constructor);
    });
    Ok(())
}

/// Walks the class elements, evaluating computed keys and static field
/// initializers through machine steps and installing everything else
/// synchronously.
fn advance_elements(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    class: &ClassNode,
    mut ready_key: Option<PropertyKey>,
    strict: bool,
) -> JsResult<StepEvent> {
    loop {
        let index = with_state(machine, |s| s.element_index);
        if index >= class.elements.len() {
            // Finished: initialize the class-name binding and finish.
            let (constructor, class_env) =
                with_state(machine, |s| (s.constructor.expect("ctor"), s.class_env.expect("env")));
            if let Some(name) = &class.name {
                let name_id = agent.heap.intern_str(name);
                environments::initialize_binding(agent, class_env, name_id, Value::Object(constructor))?;
            }
            return Ok(StepEvent::Done(Completion::normal(Value::Object(constructor))));
        }
        let element = &class.elements[index];

        // The constructor method was handled by the skeleton.
        if element.kind == ClassElementKind::Method
            && !element.is_static
            && matches!(&element.key, ClassKey::Ident(name) if name.as_ref() == "constructor")
        {
            with_state(machine, |s| s.element_index += 1);
            continue;
        }

        // Resolve the element key, possibly via a machine step.
        let key: ElementKey = match (&element.key, ready_key.take()) {
            (ClassKey::Computed(_), Some(key)) => ElementKey::Public(key),
            (ClassKey::Computed(expr), None) => {
                machine.top().phase = PHASE_COMPUTED_KEY;
                return Ok(StepEvent::Push(*expr));
            }
            (ClassKey::Ident(name) | ClassKey::StringLit(name), _) => {
                ElementKey::Public(agent.key_from_str(name))
            }
            (ClassKey::Number(n), _) => {
                let text = crate::numeric::number_to_string(*n);
                ElementKey::Public(agent.key_from_str(&text))
            }
            (ClassKey::Private(name), _) => {
                let private_env = with_state(machine, |s| s.private_env);
                let id = environments::resolve_private_identifier(&agent.heap, private_env, name)
                    .ok_or_else(|| EngineError::internal("class private name not in scope"))?;
                ElementKey::Private(id)
            }
        };

        with_state(machine, |s| s.element_index += 1);
        match element.kind {
            ClassElementKind::Method | ClassElementKind::Getter | ClassElementKind::Setter => {
                install_method(agent, machine, ast, element, key, strict)?;
            }
            ClassElementKind::Field => {
                let constructor = with_state(machine, |s| s.constructor.expect("ctor"));
                if element.is_static {
                    match key {
                        ElementKey::Public(key) => {
                            // Evaluate the initializer through a step with
                            // `this` bound to the constructor.
                            match element.value {
                                None => {
                                    crate::operations::create_data_property_or_throw(
                                        agent,
                                        constructor,
                                        key,
                                        Value::Undefined,
                                    )?;
                                }
                                Some(init) => {
                                    with_state(machine, |s| s.pending_key = Some(key));
                                    machine.top().phase = PHASE_STATIC_INIT;
                                    push_static_this(agent, machine, constructor)?;
                                    return Ok(StepEvent::Push(init));
                                }
                            }
                        }
                        ElementKey::Private(name) => {
                            let value = match element.value {
                                None => Value::Undefined,
                                Some(init) => evaluate_static_initializer(
                                    agent,
                                    machine,
                                    constructor,
                                    init,
                                    strict,
                                )?,
                            };
                            agent
                                .heap
                                .object_mut(constructor)
                                .private_elements
                                .push(PrivateElement::Field { key: name, value });
                        }
                    }
                } else {
                    let record = FieldRecord {
                        key: match key {
                            ElementKey::Public(k) => FieldKey::Property(k),
                            ElementKey::Private(p) => FieldKey::Private(p),
                        },
                        initializer: element.value,
                    };
                    if let ObjectData::Function(data) = &mut agent.heap.object_mut(constructor).data {
                        data.fields.push(record);
                    }
                }
            }
        }
    }
}

enum ElementKey {
    Public(PropertyKey),
    Private(crate::value::PrivateNameId),
}

fn install_method(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    element: &ClassElement,
    key: ElementKey,
    strict: bool,
) -> JsResult<()> {
    let Some(func_id) = element.value else {
        return Err(EngineError::internal("method element without a body"));
    };
    let Node::Function(func_node) = ast.node(func_id) else {
        return Err(EngineError::internal("method element without a function node"));
    };
    let (prototype, constructor) =
        with_state(machine, |s| (s.prototype.expect("proto"), s.constructor.expect("ctor")));
    let home = if element.is_static { constructor } else { prototype };
    let name = match &key {
        ElementKey::Public(k) => k.display(&agent.heap),
        ElementKey::Private(p) => format!("#{}", agent.heap.private_name(*p).description),
    };
    let name = match element.kind {
        ClassElementKind::Getter => format!("get {name}"),
        ClassElementKind::Setter => format!("set {name}"),
        _ => name,
    };
    let method = instantiate_function(
        agent,
        machine.source,
        func_id,
        func_node,
        strict,
        Some(&name),
        true,
        Some(home),
    );
    match key {
        ElementKey::Public(key) => {
            let target = home;
            match element.kind {
                ClassElementKind::Method => {
                    agent.heap.object_mut(target).properties.insert(
                        key,
                        PropertyEntry::Data {
                            value: Value::Object(method),
                            writable: true,
                            enumerable: false,
                            configurable: true,
                        },
                    );
                }
                ClassElementKind::Getter | ClassElementKind::Setter => {
                    let existing = agent.heap.object(target).entry(key).copied();
                    let (mut get, mut set) = match existing {
                        Some(PropertyEntry::Accessor { get, set, .. }) => (get, set),
                        _ => (None, None),
                    };
                    if element.kind == ClassElementKind::Getter {
                        get = Some(method);
                    } else {
                        set = Some(method);
                    }
                    agent.heap.object_mut(target).properties.insert(
                        key,
                        PropertyEntry::Accessor { get, set, enumerable: false, configurable: true },
                    );
                }
                ClassElementKind::Field => unreachable!(),
            }
        }
        ElementKey::Private(name) => {
            let element_record = match element.kind {
                ClassElementKind::Method => PrivateElement::Method { key: name, value: Value::Object(method) },
                ClassElementKind::Getter => PrivateElement::Accessor { key: name, get: Some(method), set: None },
                ClassElementKind::Setter => PrivateElement::Accessor { key: name, get: None, set: Some(method) },
                ClassElementKind::Field => unreachable!(),
            };
            if element.is_static {
                merge_private_element(&mut agent.heap.object_mut(constructor).private_elements, element_record);
            } else if let ObjectData::Function(data) = &mut agent.heap.object_mut(constructor).data {
                merge_private_element(&mut data.private_methods, element_record);
            }
        }
    }
    Ok(())
}

/// Getter/setter pairs under one private name merge into a single accessor
/// record.
fn merge_private_element(list: &mut Vec<PrivateElement>, incoming: PrivateElement) {
    if let PrivateElement::Accessor { key, get, set } = &incoming {
        for existing in list.iter_mut() {
            if let PrivateElement::Accessor { key: k, get: g, set: s } = existing
                && k == key
            {
                if get.is_some() {
                    *g = *get;
                }
                if set.is_some() {
                    *s = *set;
                }
                return;
            }
        }
    }
    list.push(incoming);
}

/// Pushes a context whose `this` is the constructor, for a static field
/// initializer evaluated through machine steps. The matching pop happens
/// when the initializer's value is received.
fn push_static_this(agent: &mut Agent, machine: &mut Machine, constructor: ObjectId) -> JsResult<()> {
    // The static initializer runs in the class scope, with this = ctor. The
    // existing frame-env machinery covers scope; only `this` needs a new
    // function environment.
    let current = agent.running_context().lexical_env;
    let env = environments::new_function_environment(
        &mut agent.heap,
        constructor,
        ThisBindingStatus::Initialized,
        None,
        Some(current),
    );
    environments::bind_this_value(agent, env, Value::Object(constructor))?;
    let frame = machine.top();
    if frame.saved_env.is_none() {
        frame.saved_env = Some(current);
    }
    agent.running_context_mut().lexical_env = env;
    Ok(())
}

/// Evaluates a private static field initializer synchronously.
fn evaluate_static_initializer(
    agent: &mut Agent,
    machine: &mut Machine,
    constructor: ObjectId,
    init: NodeId,
    strict: bool,
) -> JsResult<Value> {
    let current = agent.running_context().lexical_env;
    let env = environments::new_function_environment(
        &mut agent.heap,
        constructor,
        ThisBindingStatus::Initialized,
        None,
        Some(current),
    );
    environments::bind_this_value(agent, env, Value::Object(constructor))?;
    agent.running_context_mut().lexical_env = env;
    let result = crate::interpreter::evaluate_expression(agent, machine.source, init, strict);
    agent.running_context_mut().lexical_env = current;
    result
}

/// Builds the synthetic default-constructor bodies shared by every class
/// without an explicit constructor.
pub(crate) fn build_synthetic_constructors(agent: &mut Agent) -> (crate::ast::SourceId, NodeId, NodeId) {
    let mut ast = Ast::new();
    let base = ast.push(
        Node::Function(Box::new(FunctionNode {
            name: None,
            params: vec![],
            body: vec![],
            is_arrow: false,
            is_async: false,
            is_generator: false,
            strict: true,
            expression_body: false,
            source_text: Some("constructor() {}".into()),
        })),
        Span::ZERO,
    );
    let args_ident = ast.push(Node::Ident("args".into()), Span::ZERO);
    let spread = ast.push(Node::Spread(args_ident), Span::ZERO);
    let super_call = ast.push(Node::SuperCall { args: vec![spread] }, Span::ZERO);
    let super_stmt = ast.push(Node::ExprStmt(super_call), Span::ZERO);
    let derived = ast.push(
        Node::Function(Box::new(FunctionNode {
            name: None,
            params: vec![Param { name: "args".into(), default: None, rest: true }],
            body: vec![super_stmt],
            is_arrow: false,
            is_async: false,
            is_generator: false,
            strict: true,
            expression_body: false,
            source_text: Some("constructor(...args) { super(...args); }".into()),
        })),
        Span::ZERO,
    );
    let root = ast.push(Node::Script { body: vec![], strict: true }, Span::ZERO);
    let realm = agent.initial_realm();
    let source = agent.add_script(ast, root, "<synthetic>", realm);
    (source, base, derived)
}
