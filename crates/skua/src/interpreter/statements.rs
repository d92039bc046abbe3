//! Statement evaluation steps.

use std::rc::Rc;

use crate::{
    agent::Agent,
    ast::{Ast, DeclKind, Node, NodeId},
    completion::{Completion, JsResult},
    conversion::{to_boolean, to_object},
    environments,
    interpreter::{
        instantiate_function, instantiate_lexical_declarations, resolve_binding, throw_value,
        FrameState, ForInState, ForLoopState, ForOfState, Machine, StepEvent, SwitchState,
        Suspension,
    },
    iteration,
    operations::{enumerate_object_properties, is_strictly_equal},
    reference::{initialize_referenced_binding, put_value},
    value::Value,
};

/// One step of a statement frame.
pub(super) fn step(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    _node_id: NodeId,
    node: &Node,
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    let strict = machine.strict;
    match node {
        Node::Script { body, .. } | Node::Module { body } | Node::Block(body) => {
            if matches!(node, Node::Block(_)) && machine.top().phase == 0 {
                // BlockDeclarationInstantiation in a fresh declarative env.
                let outer = agent.running_context().lexical_env;
                let env = environments::new_declarative_environment(&mut agent.heap, Some(outer));
                instantiate_lexical_declarations(agent, ast, body, env, strict)?;
                agent.running_context_mut().lexical_env = env;
                for decl in ast.function_declarations(body) {
                    let Node::Function(inner) = ast.node(decl) else { continue };
                    let Some(name) = inner.name.clone() else { continue };
                    let fo =
                        instantiate_function(agent, machine.source, decl, inner, strict, None, false, None);
                    let name_id = agent.heap.intern_str(&name);
                    environments::create_mutable_binding(agent, env, name_id, false)?;
                    environments::initialize_binding(agent, env, name_id, Value::Object(fo))?;
                }
                let frame = machine.top();
                frame.saved_env = Some(outer);
                frame.phase = 1;
            }
            step_list(agent, machine, ast, body, input)
        }

        Node::Empty | Node::Debugger | Node::Import { .. } | Node::ExportNamed { .. } | Node::ExportStar { .. } => {
            Ok(StepEvent::Done(Completion::EMPTY))
        }

        Node::ExportDecl(decl) => {
            // Hoisted function declarations were instantiated during module
            // environment setup; the rest evaluate in place.
            match machine.top().phase {
                0 => {
                    if matches!(ast.node(*decl), Node::Function(_)) {
                        return Ok(StepEvent::Done(Completion::EMPTY));
                    }
                    machine.top().phase = 1;
                    Ok(StepEvent::Push(*decl))
                }
                _ => Ok(StepEvent::Done(input.unwrap_or(Completion::EMPTY))),
            }
        }

        Node::ExportDefault(expr) => match machine.top().phase {
            0 => {
                if matches!(ast.node(*expr), Node::Function(f) if !f.is_arrow && f.name.is_some()) {
                    // Hoisted with the other function declarations.
                    return Ok(StepEvent::Done(Completion::EMPTY));
                }
                machine.top().phase = 1;
                Ok(StepEvent::Push(*expr))
            }
            _ => {
                let value = input.expect("default export value").value_or_undefined();
                if let Value::Object(f) = value
                    && is_anonymous_function(ast, *expr)
                {
                    set_function_name(agent, f, "default");
                }
                let name = agent.heap.statics.default_export;
                let env = agent.running_context().lexical_env;
                environments::initialize_binding(agent, env, name, value)?;
                Ok(StepEvent::Done(Completion::EMPTY))
            }
        },

        Node::ExprStmt(expr) => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*expr))
            }
            _ => Ok(StepEvent::Done(input.expect("expression completed"))),
        },

        Node::VarDecl { kind, declarations } => {
            step_var_decl(agent, machine, ast, *kind, declarations, input, strict)
        }

        Node::If { test, consequent, alternate } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*test))
            }
            1 => {
                let test = input.expect("test completed").value_or_undefined();
                if to_boolean(&agent.heap, test) {
                    machine.top().phase = 2;
                    Ok(StepEvent::Push(*consequent))
                } else if let Some(alternate) = alternate {
                    machine.top().phase = 2;
                    Ok(StepEvent::Push(*alternate))
                } else {
                    Ok(StepEvent::Done(Completion::normal(Value::Undefined)))
                }
            }
            _ => {
                let c = input.expect("branch completed");
                Ok(StepEvent::Done(c.update_empty(Some(Value::Undefined))))
            }
        },

        Node::While { test, body } => {
            let value = loop_value(machine);
            match machine.top().phase {
                // Evaluate the test.
                0 => {
                    machine.top().phase = 1;
                    Ok(StepEvent::Push(*test))
                }
                1 => {
                    let test = input.expect("test completed").value_or_undefined();
                    if to_boolean(&agent.heap, test) {
                        // The body starts a fresh label set; only a direct
                        // Labelled wrapper reaches this loop's frame.
                        machine.top().phase = 2;
                        Ok(StepEvent::Push(*body))
                    } else {
                        Ok(StepEvent::Done(Completion::Normal(value)))
                    }
                }
                _ => match loop_iteration(machine, input.expect("body completed")) {
                    LoopFlow::Break(c) => Ok(StepEvent::Done(c)),
                    LoopFlow::Continue => {
                        machine.top().phase = 1;
                        Ok(StepEvent::Push(*test))
                    }
                },
            }
        }

        Node::DoWhile { body, test } => {
            let value = loop_value(machine);
            match machine.top().phase {
                0 => {
                    machine.top().phase = 1;
                    Ok(StepEvent::Push(*body))
                }
                1 => match loop_iteration(machine, input.expect("body completed")) {
                    LoopFlow::Break(c) => Ok(StepEvent::Done(c)),
                    LoopFlow::Continue => {
                        machine.top().phase = 2;
                        Ok(StepEvent::Push(*test))
                    }
                },
                _ => {
                    let test = input.expect("test completed").value_or_undefined();
                    if to_boolean(&agent.heap, test) {
                        machine.top().phase = 1;
                        Ok(StepEvent::Push(*body))
                    } else {
                        Ok(StepEvent::Done(Completion::Normal(value)))
                    }
                }
            }
        }

        Node::For { init, test, update, body } => {
            step_for(agent, machine, ast, *init, *test, *update, *body, input, strict)
        }

        Node::ForIn { left, right, body } => {
            step_for_in(agent, machine, ast, *left, *right, *body, input, strict)
        }

        Node::ForOf { left, right, body, awaited } => {
            step_for_of(agent, machine, ast, *left, *right, *body, *awaited, input, strict)
        }

        Node::Continue(target) => Ok(StepEvent::Done(Completion::Continue {
            target: target.clone(),
            value: None,
        })),

        Node::Break(target) => Ok(StepEvent::Done(Completion::Break {
            target: target.clone(),
            value: None,
        })),

        Node::Return(argument) => match machine.top().phase {
            0 => match argument {
                None => Ok(StepEvent::Done(Completion::Return(Value::Undefined))),
                Some(argument) => {
                    machine.top().phase = 1;
                    Ok(StepEvent::Push(*argument))
                }
            },
            _ => {
                let value = input.expect("return argument").value_or_undefined();
                Ok(StepEvent::Done(Completion::Return(value)))
            }
        },

        Node::With { object, body } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*object))
            }
            1 => {
                let object = input.expect("with object").value_or_undefined();
                let object = to_object(agent, object)?;
                let outer = agent.running_context().lexical_env;
                let env = environments::new_object_environment(&mut agent.heap, object, true, Some(outer));
                machine.top().saved_env = Some(outer);
                agent.running_context_mut().lexical_env = env;
                machine.top().phase = 2;
                Ok(StepEvent::Push(*body))
            }
            _ => {
                let c = input.expect("with body completed");
                Ok(StepEvent::Done(c.update_empty(Some(Value::Undefined))))
            }
        },

        Node::Labelled { label, body } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                let mut labels = machine.top().labels.clone();
                labels.push(label.clone());
                Ok(StepEvent::PushLabelled(*body, labels))
            }
            _ => {
                let c = input.expect("labelled body completed");
                // A break targeting this label lands here and completes
                // normally with its value.
                match c {
                    Completion::Break { value, .. } => Ok(StepEvent::Done(Completion::Normal(value))),
                    other => Ok(StepEvent::Done(other)),
                }
            }
        },

        Node::Switch { discriminant, cases } => {
            step_switch(agent, machine, ast, *discriminant, cases, input, strict)
        }

        Node::Throw(argument) => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*argument))
            }
            _ => {
                let value = input.expect("throw argument").value_or_undefined();
                Ok(StepEvent::Done(throw_value(agent, value)))
            }
        },

        Node::Try { block, catch, finally } => {
            let phase = machine.top().phase;
            match phase {
                0 => {
                    machine.top().phase = 1;
                    machine.top().state = FrameState::Try { pending: None };
                    Ok(StepEvent::Push(*block))
                }
                // Block finished (any completion kind).
                1 => {
                    let c = input.expect("try block completed");
                    if let Completion::Throw(thrown) = &c
                        && let Some(clause) = catch
                    {
                        let outer = agent.running_context().lexical_env;
                        let env = environments::new_declarative_environment(&mut agent.heap, Some(outer));
                        if let Some(param) = &clause.param {
                            let name = agent.heap.intern_str(param);
                            environments::create_mutable_binding(agent, env, name, false)?;
                            environments::initialize_binding(agent, env, name, thrown.value)?;
                        }
                        machine.top().saved_env = Some(outer);
                        agent.running_context_mut().lexical_env = env;
                        machine.top().phase = 2;
                        return Ok(StepEvent::Push(clause.body));
                    }
                    enter_finally(machine, *finally, c)
                }
                // Catch finished.
                2 => {
                    let c = input.expect("catch block completed");
                    if let Some(outer) = machine.top().saved_env {
                        agent.running_context_mut().lexical_env = outer;
                    }
                    enter_finally(machine, *finally, c)
                }
                // Finally finished.
                _ => {
                    let f = input.expect("finally block completed");
                    if f.is_abrupt() {
                        return Ok(StepEvent::Done(f));
                    }
                    let pending = match &mut machine.top().state {
                        FrameState::Try { pending } => pending.take(),
                        _ => None,
                    };
                    Ok(StepEvent::Done(pending.unwrap_or(Completion::EMPTY)))
                }
            }
        }

        _ => Err(crate::completion::EngineError::internal(
            "statement step on a non-statement node",
        )),
    }
}

fn enter_finally(
    machine: &mut Machine,
    finally: Option<NodeId>,
    completion: Completion,
) -> JsResult<StepEvent> {
    match finally {
        Some(block) => {
            machine.top().phase = 3;
            if let FrameState::Try { pending } = &mut machine.top().state {
                *pending = Some(completion);
            }
            Ok(StepEvent::Push(block))
        }
        None => Ok(StepEvent::Done(completion)),
    }
}

/// Shared statement-list stepping with the UpdateEmpty value thread.
fn step_list(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    body: &[NodeId],
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    if !matches!(machine.top().state, FrameState::List { .. }) {
        machine.top().state = FrameState::List { index: 0, value: None, class_binding: None };
    }
    if let Some(c) = input {
        // Completion of the previous statement; abrupt ones unwound
        // elsewhere.
        let strict = machine.strict;
        let class_binding = match &mut machine.top().state {
            FrameState::List { class_binding, .. } => class_binding.take(),
            _ => None,
        };
        if let Some(name) = class_binding {
            let value = c.value_or_undefined();
            let reference = resolve_binding(agent, &name, strict)?;
            initialize_referenced_binding(agent, &reference, value)?;
        } else if let Some(v) = match &c {
            Completion::Normal(v) => *v,
            _ => None,
        } {
            if let FrameState::List { value, .. } = &mut machine.top().state {
                *value = Some(v);
            }
        }
    }
    loop {
        let (index, value) = match &machine.top().state {
            FrameState::List { index, value, .. } => (*index, *value),
            _ => unreachable!("list state installed above"),
        };
        if index >= body.len() {
            return Ok(StepEvent::Done(Completion::Normal(value)));
        }
        let next = body[index];
        if let FrameState::List { index, .. } = &mut machine.top().state {
            *index += 1;
        }
        match ast.node(next) {
            // Function declarations were hoisted; skip in place.
            Node::Function(f) if f.name.is_some() && !f.is_arrow => continue,
            Node::Class(class) if class.name.is_some() => {
                if let FrameState::List { class_binding, .. } = &mut machine.top().state {
                    *class_binding = class.name.clone();
                }
                return Ok(StepEvent::Push(next));
            }
            _ => return Ok(StepEvent::Push(next)),
        }
    }
}

/// Function bodies: the statement list plus the implicit return of
/// expression-bodied arrows.
pub(super) fn step_function_body(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    node_id: NodeId,
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    let Node::Function(func) = ast.node(node_id) else {
        return Err(crate::completion::EngineError::internal(
            "function body frame without a function node",
        ));
    };
    if func.expression_body {
        return match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(func.body[0]))
            }
            _ => {
                let value = input.expect("arrow body value").value_or_undefined();
                Ok(StepEvent::Done(Completion::Return(value)))
            }
        };
    }
    let body = func.body.clone();
    step_list(agent, machine, ast, &body, input)
}

fn step_var_decl(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    kind: DeclKind,
    declarations: &[(Box<str>, Option<NodeId>)],
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    if !matches!(machine.top().state, FrameState::Decl { .. }) {
        machine.top().state = FrameState::Decl { index: 0 };
    }
    if let Some(c) = input {
        // Initializer of the previous declarator.
        let index = match &machine.top().state {
            FrameState::Decl { index } => *index - 1,
            _ => unreachable!(),
        };
        let (name, init) = &declarations[index];
        let value = c.value_or_undefined();
        // NamedEvaluation of anonymous functions and classes.
        if let Some(init) = init
            && is_anonymous_function(ast, *init)
            && let Value::Object(f) = value
        {
            set_function_name(agent, f, name);
        }
        let reference = resolve_binding(agent, name, strict)?;
        if kind == DeclKind::Var {
            put_value(agent, &reference, value)?;
        } else {
            initialize_referenced_binding(agent, &reference, value)?;
        }
    }
    loop {
        let index = match &machine.top().state {
            FrameState::Decl { index } => *index,
            _ => unreachable!(),
        };
        if index >= declarations.len() {
            return Ok(StepEvent::Done(Completion::EMPTY));
        }
        if let FrameState::Decl { index } = &mut machine.top().state {
            *index += 1;
        }
        let (name, init) = &declarations[index];
        match init {
            Some(init) => return Ok(StepEvent::Push(*init)),
            None => {
                // var without initializer: binding already exists; let
                // initializes to undefined.
                if kind != DeclKind::Var {
                    let reference = resolve_binding(agent, name, strict)?;
                    initialize_referenced_binding(agent, &reference, Value::Undefined)?;
                }
            }
        }
    }
}

pub(crate) fn is_anonymous_function(ast: &Ast, node: NodeId) -> bool {
    match ast.node(node) {
        Node::Function(f) => f.name.is_none(),
        Node::Class(c) => c.name.is_none(),
        _ => false,
    }
}

pub(crate) fn set_function_name(agent: &mut Agent, func: crate::value::ObjectId, name: &str) {
    let value = agent.string_value(name);
    let key = crate::object::PropertyKey::String(agent.heap.statics.name);
    agent.heap.object_mut(func).properties.insert(
        key,
        crate::object::PropertyEntry::Data {
            value,
            writable: false,
            enumerable: false,
            configurable: true,
        },
    );
}

fn loop_value(machine: &mut Machine) -> Option<Value> {
    match &machine.top().state {
        FrameState::Loop { value } => *value,
        _ => {
            machine.top().state = FrameState::Loop { value: None };
            None
        }
    }
}

enum LoopFlow {
    Continue,
    Break(Completion),
}

/// Folds a loop body completion into the accumulated value; break leaves
/// the loop, continue and normal keep going.
fn loop_iteration(machine: &mut Machine, completion: Completion) -> LoopFlow {
    let update = |machine: &mut Machine, v: Option<Value>| {
        if let Some(v) = v
            && let FrameState::Loop { value } = &mut machine.top().state
        {
            *value = Some(v);
        }
    };
    match completion {
        Completion::Break { value, .. } => {
            update(machine, value);
            let value = loop_value(machine);
            LoopFlow::Break(Completion::Normal(value))
        }
        Completion::Continue { value, .. } | Completion::Normal(value) => {
            update(machine, value);
            LoopFlow::Continue
        }
        other => LoopFlow::Break(other),
    }
}

#[expect(clippy::too_many_arguments, reason = "loop heads have this many moving parts")]
fn step_for(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    init: Option<NodeId>,
    test: Option<NodeId>,
    update: Option<NodeId>,
    body: NodeId,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    const PHASE_INIT_DONE: u32 = 1;
    const PHASE_TEST_DONE: u32 = 2;
    const PHASE_BODY_DONE: u32 = 3;
    const PHASE_UPDATE_DONE: u32 = 4;

    let phase = machine.top().phase;
    match phase {
        0 => {
            machine.top().state = FrameState::ForLoop(Box::new(ForLoopState {
                value: None,
                per_iteration: Vec::new(),
            }));
            // Lexical for-heads get their own scope, copied per iteration.
            if let Some(init_node) = init {
                if let Node::VarDecl { kind, declarations } = ast.node(init_node)
                    && *kind != DeclKind::Var
                {
                    let outer = agent.running_context().lexical_env;
                    let env = environments::new_declarative_environment(&mut agent.heap, Some(outer));
                    let mut names = Vec::new();
                    for (name, _) in declarations {
                        let name_id = agent.heap.intern_str(name);
                        if *kind == DeclKind::Const {
                            environments::create_immutable_binding(agent, env, name_id, strict)?;
                        } else {
                            environments::create_mutable_binding(agent, env, name_id, false)?;
                            names.push(name_id);
                        }
                    }
                    if let FrameState::ForLoop(state) = &mut machine.top().state {
                        state.per_iteration = names;
                    }
                    machine.top().saved_env = Some(outer);
                    agent.running_context_mut().lexical_env = env;
                }
                machine.top().phase = PHASE_INIT_DONE;
                return Ok(StepEvent::Push(init_node));
            }
            machine.top().phase = PHASE_INIT_DONE;
            Ok(StepEvent::Continue)
        }
        PHASE_INIT_DONE => {
            // Head evaluated; run the first test.
            match test {
                Some(test) => {
                    machine.top().phase = PHASE_TEST_DONE;
                    Ok(StepEvent::Push(test))
                }
                None => {
                    machine.top().phase = PHASE_BODY_DONE;
                    Ok(StepEvent::Push(body))
                }
            }
        }
        PHASE_TEST_DONE => {
            let v = input.expect("for test completed").value_or_undefined();
            if to_boolean(&agent.heap, v) {
                machine.top().phase = PHASE_BODY_DONE;
                Ok(StepEvent::Push(body))
            } else {
                let value = for_loop_value(machine);
                Ok(StepEvent::Done(Completion::Normal(value)))
            }
        }
        PHASE_BODY_DONE => {
            let completion = input.expect("for body completed");
            match completion {
                Completion::Break { value, .. } => {
                    for_update_value(machine, value);
                    let value = for_loop_value(machine);
                    return Ok(StepEvent::Done(Completion::Normal(value)));
                }
                Completion::Continue { value, .. } | Completion::Normal(value) => {
                    for_update_value(machine, value);
                }
                other => return Ok(StepEvent::Done(other)),
            }
            create_per_iteration_environment(agent, machine)?;
            match update {
                Some(update) => {
                    machine.top().phase = PHASE_UPDATE_DONE;
                    Ok(StepEvent::Push(update))
                }
                None => {
                    machine.top().phase = PHASE_INIT_DONE;
                    Ok(StepEvent::Continue)
                }
            }
        }
        PHASE_UPDATE_DONE => {
            machine.top().phase = PHASE_INIT_DONE;
            Ok(StepEvent::Continue)
        }
        _ => unreachable!("for statement phase"),
    }
}

fn for_loop_value(machine: &mut Machine) -> Option<Value> {
    match &machine.top().state {
        FrameState::ForLoop(state) => state.value,
        _ => None,
    }
}

fn for_update_value(machine: &mut Machine, value: Option<Value>) {
    if let Some(v) = value
        && let FrameState::ForLoop(state) = &mut machine.top().state
    {
        state.value = Some(v);
    }
}

/// `CreatePerIterationEnvironment`: copy the loop's let bindings into a
/// fresh environment so closures capture per-iteration values.
fn create_per_iteration_environment(agent: &mut Agent, machine: &mut Machine) -> JsResult<()> {
    let names = match &machine.top().state {
        FrameState::ForLoop(state) => state.per_iteration.clone(),
        _ => return Ok(()),
    };
    if names.is_empty() {
        return Ok(());
    }
    let current = agent.running_context().lexical_env;
    let outer = agent.heap.env(current).outer();
    let fresh = environments::new_declarative_environment(&mut agent.heap, outer);
    for name in names {
        let value = environments::get_binding_value(agent, current, name, true)?;
        environments::create_mutable_binding(agent, fresh, name, false)?;
        environments::initialize_binding(agent, fresh, name, value)?;
    }
    agent.running_context_mut().lexical_env = fresh;
    Ok(())
}

/// Binds a for-in/for-of head target to the current iteration value.
/// Lexical declarations get a fresh per-iteration environment first.
fn bind_iteration_target(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    left: NodeId,
    value: Value,
    strict: bool,
) -> JsResult<()> {
    match ast.node(left) {
        Node::VarDecl { kind: DeclKind::Var, declarations } => {
            let (name, _) = &declarations[0];
            let reference = resolve_binding(agent, name, strict)?;
            put_value(agent, &reference, value)
        }
        Node::VarDecl { declarations, .. } => {
            let base = machine.top().saved_env.expect("loop recorded its base env");
            let env = environments::new_declarative_environment(&mut agent.heap, Some(base));
            let (name, _) = &declarations[0];
            let name_id = agent.heap.intern_str(name);
            environments::create_mutable_binding(agent, env, name_id, false)?;
            environments::initialize_binding(agent, env, name_id, value)?;
            agent.running_context_mut().lexical_env = env;
            Ok(())
        }
        Node::Ident(name) => {
            let reference = resolve_binding(agent, name, strict)?;
            put_value(agent, &reference, value)
        }
        Node::Member { object, property, computed } => {
            // Head targets cannot suspend, so sub-evaluation is safe here.
            let base = crate::interpreter::evaluate_expression(agent, machine.source, *object, strict)?;
            let key = if *computed {
                let key = crate::interpreter::evaluate_expression(agent, machine.source, *property, strict)?;
                crate::conversion::to_property_key(agent, key)?
            } else {
                match ast.node(*property) {
                    Node::Ident(name) => agent.key_from_str(name),
                    _ => {
                        return Err(crate::completion::EngineError::internal(
                            "non-identifier member property",
                        ));
                    }
                }
            };
            let reference = crate::reference::Reference {
                base: crate::reference::ReferenceBase::Value(base),
                name: crate::reference::ReferencedName::Key(key),
                strict,
                this_value: None,
            };
            put_value(agent, &reference, value)
        }
        _ => Err(crate::completion::EngineError::internal(
            "unsupported for-loop binding target",
        )),
    }
}

#[expect(clippy::too_many_arguments, reason = "loop heads have this many moving parts")]
fn step_for_in(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    left: NodeId,
    right: NodeId,
    body: NodeId,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    match machine.top().phase {
        0 => {
            machine.top().phase = 1;
            Ok(StepEvent::Push(right))
        }
        1 => {
            let object = input.expect("for-in object").value_or_undefined();
            if object.is_nullish() {
                return Ok(StepEvent::Done(Completion::Normal(None)));
            }
            let object = to_object(agent, object)?;
            let keys = enumerate_object_properties(agent, object)?;
            machine.top().saved_env = Some(agent.running_context().lexical_env);
            machine.top().state = FrameState::ForIn(Box::new(ForInState { keys, index: 0, value: None }));
            machine.top().phase = 2;
            Ok(StepEvent::Continue)
        }
        2 => {
            // Loop head: bind the next key or finish.
            let (key, done) = match &mut machine.top().state {
                FrameState::ForIn(state) => {
                    if state.index >= state.keys.len() {
                        (None, true)
                    } else {
                        let key = state.keys[state.index];
                        state.index += 1;
                        (Some(key), false)
                    }
                }
                _ => unreachable!(),
            };
            if done {
                let value = for_in_value(machine);
                return Ok(StepEvent::Done(Completion::Normal(value)));
            }
            // Reset to the loop's base scope before each iteration.
            if let Some(base) = machine.top().saved_env {
                agent.running_context_mut().lexical_env = base;
            }
            let key = key.expect("key or done");
            let key_value = agent.key_to_value(key);
            bind_iteration_target(agent, machine, ast, left, key_value, strict)?;
            machine.top().phase = 3;
            Ok(StepEvent::Push(body))
        }
        _ => {
            let completion = input.expect("for-in body completed");
            match completion {
                Completion::Break { value, .. } => {
                    for_in_update(machine, value);
                    let value = for_in_value(machine);
                    Ok(StepEvent::Done(Completion::Normal(value)))
                }
                Completion::Continue { value, .. } | Completion::Normal(value) => {
                    for_in_update(machine, value);
                    machine.top().phase = 2;
                    Ok(StepEvent::Continue)
                }
                other => Ok(StepEvent::Done(other)),
            }
        }
    }
}

fn for_in_value(machine: &mut Machine) -> Option<Value> {
    match &machine.top().state {
        FrameState::ForIn(state) => state.value,
        _ => None,
    }
}

fn for_in_update(machine: &mut Machine, value: Option<Value>) {
    if let Some(v) = value
        && let FrameState::ForIn(state) = &mut machine.top().state
    {
        state.value = Some(v);
    }
}

#[expect(clippy::too_many_arguments, reason = "loop heads have this many moving parts")]
fn step_for_of(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    left: NodeId,
    right: NodeId,
    body: NodeId,
    awaited: bool,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    const PHASE_EXPR_DONE: u32 = 1;
    const PHASE_HEAD: u32 = 2;
    const PHASE_AWAIT_RESULT: u32 = 3;
    const PHASE_BODY_DONE: u32 = 4;

    match machine.top().phase {
        0 => {
            machine.top().phase = PHASE_EXPR_DONE;
            Ok(StepEvent::Push(right))
        }
        PHASE_EXPR_DONE => {
            let iterable = input.expect("for-of iterable").value_or_undefined();
            let record = if awaited {
                iteration::get_async_iterator(agent, iterable)?
            } else {
                iteration::get_iterator(agent, iterable)?
            };
            machine.top().saved_env = Some(agent.running_context().lexical_env);
            machine.top().state = FrameState::ForOf(Box::new(ForOfState {
                iterator: record,
                value: None,
                exhausted: false,
            }));
            machine.top().phase = PHASE_HEAD;
            Ok(StepEvent::Continue)
        }
        PHASE_HEAD => {
            let record = match &machine.top().state {
                FrameState::ForOf(state) => state.iterator,
                _ => unreachable!(),
            };
            let result = iteration::iterator_next(agent, &record, None);
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    mark_exhausted(machine);
                    return Err(e);
                }
            };
            if awaited {
                // The iteration result (a promise for async iterators) gets
                // awaited before done/value extraction.
                machine.top().phase = PHASE_AWAIT_RESULT;
                return Ok(StepEvent::Suspend(Suspension::Await(Value::Object(result))));
            }
            for_of_step_result(agent, machine, ast, left, body, Value::Object(result), strict)
        }
        PHASE_AWAIT_RESULT => {
            let completion = input.expect("awaited iteration result");
            match completion {
                Completion::Normal(v) => {
                    let value = v.unwrap_or(Value::Undefined);
                    for_of_step_result(agent, machine, ast, left, body, value, strict)
                }
                other => {
                    mark_exhausted(machine);
                    Ok(StepEvent::Done(other))
                }
            }
        }
        PHASE_BODY_DONE => {
            let completion = input.expect("for-of body completed");
            match completion {
                Completion::Break { value, .. } => {
                    for_of_update(machine, value);
                    let (record, value) = match &machine.top().state {
                        FrameState::ForOf(state) => (state.iterator, state.value),
                        _ => unreachable!(),
                    };
                    mark_exhausted(machine);
                    let closed =
                        iteration::iterator_close(agent, &record, Completion::Normal(value))?;
                    Ok(StepEvent::Done(closed))
                }
                Completion::Continue { value, .. } | Completion::Normal(value) => {
                    for_of_update(machine, value);
                    machine.top().phase = PHASE_HEAD;
                    Ok(StepEvent::Continue)
                }
                other => Ok(StepEvent::Done(other)),
            }
        }
        _ => unreachable!("for-of phase"),
    }
}

fn mark_exhausted(machine: &mut Machine) {
    if let FrameState::ForOf(state) = &mut machine.top().state {
        state.exhausted = true;
    }
}

fn for_of_update(machine: &mut Machine, value: Option<Value>) {
    if let Some(v) = value
        && let FrameState::ForOf(state) = &mut machine.top().state
    {
        state.value = Some(v);
    }
}

fn for_of_step_result(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    left: NodeId,
    body: NodeId,
    result: Value,
    strict: bool,
) -> JsResult<StepEvent> {
    let Value::Object(result) = result else {
        mark_exhausted(machine);
        return Err(agent.throw_error(
            crate::intrinsics::error::ErrorKind::Type,
            "iterator result is not an object",
        ));
    };
    let done = iteration::iterator_complete(agent, result)?;
    if done {
        mark_exhausted(machine);
        let value = match &machine.top().state {
            FrameState::ForOf(state) => state.value,
            _ => None,
        };
        return Ok(StepEvent::Done(Completion::Normal(value)));
    }
    let value = iteration::iterator_value(agent, result)?;
    if let Some(base) = machine.top().saved_env {
        agent.running_context_mut().lexical_env = base;
    }
    bind_iteration_target(agent, machine, ast, left, value, strict)?;
    machine.top().phase = 4;
    Ok(StepEvent::Push(body))
}

fn step_switch(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    discriminant: NodeId,
    cases: &[crate::ast::SwitchCase],
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    const PHASE_DISCRIMINANT: u32 = 1;
    const PHASE_SELECT: u32 = 2;
    const PHASE_SELECTOR_DONE: u32 = 3;
    const PHASE_RUN: u32 = 4;
    const PHASE_STMT_DONE: u32 = 5;

    match machine.top().phase {
        0 => {
            machine.top().phase = PHASE_DISCRIMINANT;
            Ok(StepEvent::Push(discriminant))
        }
        PHASE_DISCRIMINANT => {
            let value = input.expect("switch discriminant").value_or_undefined();
            // The case block runs in one lexical scope.
            let outer = agent.running_context().lexical_env;
            let env = environments::new_declarative_environment(&mut agent.heap, Some(outer));
            let all: Vec<NodeId> = cases.iter().flat_map(|c| c.body.iter().copied()).collect();
            instantiate_lexical_declarations(agent, ast, &all, env, strict)?;
            for decl in ast.function_declarations(&all) {
                let Node::Function(inner) = ast.node(decl) else { continue };
                let Some(name) = inner.name.clone() else { continue };
                let fo = instantiate_function(agent, machine.source, decl, inner, strict, None, false, None);
                let name_id = agent.heap.intern_str(&name);
                environments::create_mutable_binding(agent, env, name_id, false)?;
                environments::initialize_binding(agent, env, name_id, Value::Object(fo))?;
            }
            machine.top().saved_env = Some(outer);
            agent.running_context_mut().lexical_env = env;
            machine.top().state = FrameState::Switch(Box::new(SwitchState {
                discriminant: value,
                case_index: 0,
                matched: None,
                run_case: 0,
                run_stmt: 0,
                value: None,
            }));
            machine.top().phase = PHASE_SELECT;
            Ok(StepEvent::Continue)
        }
        PHASE_SELECT => {
            // Find the next selector to evaluate, or settle on default.
            let next = match &mut machine.top().state {
                FrameState::Switch(state) => {
                    let mut next = None;
                    while state.case_index < cases.len() {
                        if cases[state.case_index].test.is_some() {
                            next = cases[state.case_index].test;
                            break;
                        }
                        state.case_index += 1;
                    }
                    next
                }
                _ => unreachable!(),
            };
            match next {
                Some(test) => {
                    machine.top().phase = PHASE_SELECTOR_DONE;
                    Ok(StepEvent::Push(test))
                }
                None => {
                    // No selector matched: run from the default clause.
                    let default = cases.iter().position(|c| c.test.is_none());
                    match default {
                        None => {
                            let value = switch_value(machine);
                            Ok(StepEvent::Done(Completion::Normal(value)))
                        }
                        Some(default) => {
                            if let FrameState::Switch(state) = &mut machine.top().state {
                                state.matched = Some(default);
                                state.run_case = default;
                                state.run_stmt = 0;
                            }
                            machine.top().phase = PHASE_RUN;
                            Ok(StepEvent::Continue)
                        }
                    }
                }
            }
        }
        PHASE_SELECTOR_DONE => {
            let selector = input.expect("case selector").value_or_undefined();
            let matched = match &mut machine.top().state {
                FrameState::Switch(state) => {
                    if is_strictly_equal(selector, state.discriminant) {
                        state.matched = Some(state.case_index);
                        state.run_case = state.case_index;
                        state.run_stmt = 0;
                        true
                    } else {
                        state.case_index += 1;
                        false
                    }
                }
                _ => unreachable!(),
            };
            machine.top().phase = if matched { PHASE_RUN } else { PHASE_SELECT };
            Ok(StepEvent::Continue)
        }
        PHASE_RUN => {
            // Fall-through execution from the matched clause.
            let next = match &mut machine.top().state {
                FrameState::Switch(state) => loop {
                    if state.run_case >= cases.len() {
                        break None;
                    }
                    if state.run_stmt >= cases[state.run_case].body.len() {
                        state.run_case += 1;
                        state.run_stmt = 0;
                        continue;
                    }
                    let stmt = cases[state.run_case].body[state.run_stmt];
                    state.run_stmt += 1;
                    break Some(stmt);
                },
                _ => unreachable!(),
            };
            match next {
                None => {
                    let value = switch_value(machine);
                    Ok(StepEvent::Done(Completion::Normal(value)))
                }
                Some(stmt) => {
                    // Skip hoisted function declarations, as in lists.
                    if matches!(ast.node(stmt), Node::Function(f) if f.name.is_some() && !f.is_arrow) {
                        return Ok(StepEvent::Continue);
                    }
                    machine.top().phase = PHASE_STMT_DONE;
                    Ok(StepEvent::Push(stmt))
                }
            }
        }
        PHASE_STMT_DONE => {
            let completion = input.expect("switch statement completed");
            match completion {
                Completion::Break { value, .. } => {
                    if let Some(v) = value
                        && let FrameState::Switch(state) = &mut machine.top().state
                    {
                        state.value = Some(v);
                    }
                    let value = switch_value(machine);
                    Ok(StepEvent::Done(Completion::Normal(value)))
                }
                Completion::Normal(value) => {
                    if let Some(v) = value
                        && let FrameState::Switch(state) = &mut machine.top().state
                    {
                        state.value = Some(v);
                    }
                    machine.top().phase = PHASE_RUN;
                    Ok(StepEvent::Continue)
                }
                other => Ok(StepEvent::Done(other)),
            }
        }
        _ => unreachable!("switch phase"),
    }
}

fn switch_value(machine: &mut Machine) -> Option<Value> {
    match &machine.top().state {
        FrameState::Switch(state) => state.value,
        _ => None,
    }
}
