//! Expression evaluation steps.

use std::rc::Rc;

use crate::{
    agent::Agent,
    ast::{Ast, BinaryOp, LogicalOp, Node, NodeId, UnaryOp, UpdateOp},
    completion::{Completion, EngineError, JsResult},
    conversion::{
        to_boolean, to_number, to_numeric, to_object, to_primitive, to_property_key, to_string,
        Numeric, PreferredType,
    },
    environments,
    exotics::array::array_create,
    interpreter::{
        class, instantiate_function, outcome, resolve_binding, CallState, FrameState, Machine,
        RefAccess, StepEvent, Suspension,
    },
    intrinsics::error::ErrorKind,
    iteration,
    numeric::{number_exponentiate, wrap_to_int32, wrap_to_uint32},
    object::{ObjectData, PropertyKey},
    operations::{
        call, create_data_property_or_throw, get_v, instanceof_operator, is_callable,
        is_loosely_equal, is_less_than, is_strictly_equal,
    },
    reference::{get_value, put_value, Reference, ReferenceBase, ReferencedName},
    value::{JsString, Value},
};

/// One step of an expression frame.
pub(super) fn step(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    node_id: NodeId,
    node: &Node,
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    let strict = machine.strict;
    match node {
        // --- leaves ---
        Node::Null => Ok(StepEvent::Done(Completion::normal(Value::Null))),
        Node::Bool(b) => Ok(StepEvent::Done(Completion::normal(Value::Boolean(*b)))),
        Node::Number(n) => Ok(StepEvent::Done(Completion::normal(Value::Number(*n)))),
        Node::StringLit(s) => {
            let id = agent.heap.intern_str(s);
            Ok(StepEvent::Done(Completion::normal(Value::String(id))))
        }
        Node::BigIntLit(v) => {
            let id = agent.heap.intern_bigint(v.clone());
            Ok(StepEvent::Done(Completion::normal(Value::BigInt(id))))
        }
        Node::Ident(name) => {
            let reference = resolve_binding(agent, name, strict)?;
            Ok(StepEvent::Done(outcome(get_value(agent, &reference))?))
        }
        Node::This => {
            let env = agent.running_context().lexical_env;
            let this_env = environments::get_this_environment(&agent.heap, env);
            Ok(StepEvent::Done(outcome(environments::get_this_binding(agent, this_env))?))
        }
        Node::NewTarget => {
            let env = agent.running_context().lexical_env;
            let new_target = environments::get_new_target(&agent.heap, env);
            Ok(StepEvent::Done(Completion::normal(
                new_target.map_or(Value::Undefined, Value::Object),
            )))
        }
        Node::ImportMeta => {
            let meta = crate::module::resolve_import_meta(agent)?;
            Ok(StepEvent::Done(Completion::normal(meta)))
        }

        // --- literals with structure ---
        Node::Array(elements) => step_array_literal(agent, machine, ast, elements, input),
        Node::ObjectLit(props) => step_object_literal(agent, machine, ast, props, input, strict),
        Node::Template { quasis, exprs } => step_template(agent, machine, quasis, exprs, input),

        Node::Spread(_) => Err(EngineError::internal("spread evaluated outside a list")),
        Node::PropKeyValue { .. }
        | Node::PropShorthand(_)
        | Node::PropMethod { .. }
        | Node::PropGetter { .. }
        | Node::PropSetter { .. }
        | Node::PropSpread(_) => Err(EngineError::internal("property definition evaluated alone")),

        // --- access ---
        Node::Member { object, property, computed } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*object))
            }
            1 => {
                let base = input.expect("member base").value_or_undefined();
                if *computed {
                    machine.top().state = FrameState::Acc(base);
                    machine.top().phase = 2;
                    return Ok(StepEvent::Push(*property));
                }
                let key = member_key(agent, ast, *property)?;
                Ok(StepEvent::Done(outcome(get_v(agent, base, key))?))
            }
            _ => {
                let key = input.expect("member key").value_or_undefined();
                let base = match &machine.top().state {
                    FrameState::Acc(base) => *base,
                    _ => Value::Undefined,
                };
                let key = match to_property_key(agent, key) {
                    Ok(key) => key,
                    Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
                };
                Ok(StepEvent::Done(outcome(get_v(agent, base, key))?))
            }
        },

        Node::PrivateMember { object, name } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*object))
            }
            _ => {
                let base = input.expect("private member base").value_or_undefined();
                let private_env = agent.running_context().private_env;
                let Some(key) = environments::resolve_private_identifier(&agent.heap, private_env, name)
                else {
                    return Ok(StepEvent::Done(throw_value_error(
                        agent,
                        ErrorKind::Syntax,
                        &format!("private name #{name} is not defined"),
                    )));
                };
                let Value::Object(object) = base else {
                    return Ok(StepEvent::Done(throw_value_error(
                        agent,
                        ErrorKind::Type,
                        "cannot read a private member from a non-object",
                    )));
                };
                Ok(StepEvent::Done(outcome(crate::reference::private_get(agent, object, key))?))
            }
        },

        Node::SuperProperty { property, computed } => match machine.top().phase {
            0 if *computed => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*property))
            }
            phase => {
                let key = if *computed {
                    debug_assert_eq!(phase, 1);
                    let key = input.expect("super key").value_or_undefined();
                    to_property_key(agent, key)?
                } else {
                    member_key(agent, ast, *property)?
                };
                let reference = make_super_reference(agent, key, strict)?;
                Ok(StepEvent::Done(outcome(get_value(agent, &reference))?))
            }
        },

        // --- calls ---
        Node::Call { callee, args } => step_call(agent, machine, ast, *callee, args, input, strict),
        Node::New { callee, args } => step_new(agent, machine, ast, *callee, args, input),
        Node::SuperCall { args } => step_super_call(agent, machine, ast, args, input),

        // --- operators ---
        Node::Unary { op, expr } => step_unary(agent, machine, ast, *op, *expr, input, strict),
        Node::Update { op, prefix, target } => {
            step_update(agent, machine, ast, *op, *prefix, *target, input, strict)
        }
        Node::Binary { op, left, right } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*left))
            }
            1 => {
                let lval = input.expect("left operand").value_or_undefined();
                machine.top().state = FrameState::Acc(lval);
                machine.top().phase = 2;
                Ok(StepEvent::Push(*right))
            }
            _ => {
                let rval = input.expect("right operand").value_or_undefined();
                let lval = match &machine.top().state {
                    FrameState::Acc(v) => *v,
                    _ => Value::Undefined,
                };
                Ok(StepEvent::Done(outcome(apply_binary(agent, *op, lval, rval))?))
            }
        },
        Node::Logical { op, left, right } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*left))
            }
            1 => {
                let lval = input.expect("left operand").value_or_undefined();
                let short_circuit = match op {
                    LogicalOp::And => !to_boolean(&agent.heap, lval),
                    LogicalOp::Or => to_boolean(&agent.heap, lval),
                    LogicalOp::Coalesce => !lval.is_nullish(),
                };
                if short_circuit {
                    return Ok(StepEvent::Done(Completion::normal(lval)));
                }
                machine.top().phase = 2;
                Ok(StepEvent::Push(*right))
            }
            _ => Ok(StepEvent::Done(input.expect("right operand"))),
        },
        Node::Conditional { test, consequent, alternate } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*test))
            }
            1 => {
                let test = input.expect("condition").value_or_undefined();
                machine.top().phase = 2;
                if to_boolean(&agent.heap, test) {
                    Ok(StepEvent::Push(*consequent))
                } else {
                    Ok(StepEvent::Push(*alternate))
                }
            }
            _ => Ok(StepEvent::Done(input.expect("branch value"))),
        },
        Node::Assign { target, op, value } => {
            step_assign(agent, machine, ast, *target, *op, *value, input, strict)
        }
        Node::Sequence(exprs) => {
            let index = machine.top().phase as usize;
            if index >= exprs.len() {
                return Ok(StepEvent::Done(input.expect("sequence value")));
            }
            machine.top().phase += 1;
            Ok(StepEvent::Push(exprs[index]))
        }

        // --- functions and classes ---
        Node::Function(func) => {
            let home = None;
            let object = instantiate_function(
                agent,
                machine.source,
                node_id,
                func,
                strict,
                None,
                false,
                home,
            );
            Ok(StepEvent::Done(Completion::normal(Value::Object(object))))
        }
        Node::Class(_) => class::step(agent, machine, ast, node_id, input),

        // --- suspension points ---
        Node::Await(expr) => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*expr))
            }
            1 => {
                let value = input.expect("awaited value").value_or_undefined();
                machine.top().phase = 2;
                Ok(StepEvent::Suspend(Suspension::Await(value)))
            }
            _ => Ok(StepEvent::Done(input.expect("await resumption"))),
        },
        Node::Yield { argument, delegate: false } => match machine.top().phase {
            0 => match argument {
                Some(argument) => {
                    machine.top().phase = 1;
                    Ok(StepEvent::Push(*argument))
                }
                None => {
                    machine.top().phase = 2;
                    Ok(StepEvent::Suspend(Suspension::Yield(Value::Undefined)))
                }
            },
            1 => {
                let value = input.expect("yield argument").value_or_undefined();
                machine.top().phase = 2;
                Ok(StepEvent::Suspend(Suspension::Yield(value)))
            }
            _ => Ok(StepEvent::Done(input.expect("yield resumption"))),
        },
        Node::Yield { argument, delegate: true } => {
            step_yield_delegate(agent, machine, *argument, input)
        }

        _ => Err(EngineError::internal("expression step on unsupported node")),
    }
}

fn throw_value_error(agent: &mut Agent, kind: ErrorKind, message: &str) -> Completion {
    match agent.throw_error(kind, message) {
        EngineError::Throw(t) => Completion::Throw(t),
        EngineError::Internal(_) => unreachable!("throw_error yields throw completions"),
    }
}

fn member_key(agent: &mut Agent, ast: &Ast, property: NodeId) -> JsResult<PropertyKey> {
    match ast.node(property) {
        Node::Ident(name) => Ok(agent.key_from_str(name)),
        Node::StringLit(s) => Ok(agent.key_from_str(s)),
        Node::Number(n) => {
            let text = crate::numeric::number_to_string(*n);
            Ok(agent.key_from_str(&text))
        }
        _ => Err(EngineError::internal("non-static member property")),
    }
}

fn make_super_reference(agent: &mut Agent, key: PropertyKey, strict: bool) -> JsResult<Reference> {
    let env = agent.running_context().lexical_env;
    let this_env = environments::get_this_environment(&agent.heap, env);
    let this_value = environments::get_this_binding(agent, this_env)?;
    let function_object = match agent.heap.env(this_env) {
        crate::environments::EnvironmentRecord::Function(f) => Some(f.function_object),
        _ => None,
    };
    let Some(function_object) = function_object else {
        return Err(agent.throw_error(ErrorKind::Syntax, "'super' outside of a method"));
    };
    let home = match &agent.heap.object(function_object).data {
        ObjectData::Function(data) => data.home_object,
        _ => None,
    };
    let Some(home) = home else {
        return Err(agent.throw_error(ErrorKind::Syntax, "'super' outside of a method"));
    };
    let base = crate::ordinary::get_prototype_of(agent, home)?;
    Ok(Reference {
        base: ReferenceBase::Value(base.map_or(Value::Null, Value::Object)),
        name: ReferencedName::Key(key),
        strict,
        this_value: Some(this_value),
    })
}

// --- array/object/template literals ---

fn step_array_literal(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    elements: &[Option<NodeId>],
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    if machine.top().phase == 0 {
        let array = array_create(agent, 0, None)?;
        machine.top().state = FrameState::ArrayLit { array, next_index: 0, elem: 0 };
        machine.top().phase = 1;
    } else if let Some(c) = input {
        // Value of the element pushed last round.
        let value = c.value_or_undefined();
        let (array, spread) = match &machine.top().state {
            FrameState::ArrayLit { array, elem, .. } => (
                *array,
                matches!(elements[*elem - 1], Some(e) if matches!(ast.node(e), Node::Spread(_))),
            ),
            _ => unreachable!(),
        };
        if spread {
            let values = iteration::iterable_to_list(agent, value)?;
            for v in values {
                let index = match &mut machine.top().state {
                    FrameState::ArrayLit { next_index, .. } => {
                        let i = *next_index;
                        *next_index += 1;
                        i
                    }
                    _ => unreachable!(),
                };
                let key = agent.key_for_index(index);
                create_data_property_or_throw(agent, array, key, v)?;
            }
        } else {
            let index = match &mut machine.top().state {
                FrameState::ArrayLit { next_index, .. } => {
                    let i = *next_index;
                    *next_index += 1;
                    i
                }
                _ => unreachable!(),
            };
            let key = agent.key_for_index(index);
            create_data_property_or_throw(agent, array, key, value)?;
        }
    }
    loop {
        let (array, elem) = match &machine.top().state {
            FrameState::ArrayLit { array, elem, .. } => (*array, *elem),
            _ => unreachable!(),
        };
        if elem >= elements.len() {
            // Trailing elisions already bumped next_index; sync length.
            let next_index = match &machine.top().state {
                FrameState::ArrayLit { next_index, .. } => *next_index,
                _ => unreachable!(),
            };
            let length_key = PropertyKey::String(agent.heap.statics.length);
            crate::operations::set_property(
                agent,
                array,
                length_key,
                Value::Number(next_index as f64),
                true,
            )?;
            return Ok(StepEvent::Done(Completion::normal(Value::Object(array))));
        }
        if let FrameState::ArrayLit { elem, .. } = &mut machine.top().state {
            *elem += 1;
        }
        match elements[elem] {
            None => {
                // Elision: a hole that still counts toward length.
                if let FrameState::ArrayLit { next_index, .. } = &mut machine.top().state {
                    *next_index += 1;
                }
            }
            Some(element) => {
                let target = match ast.node(element) {
                    Node::Spread(inner) => *inner,
                    _ => element,
                };
                return Ok(StepEvent::Push(target));
            }
        }
    }
}

fn step_object_literal(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    props: &[NodeId],
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    if machine.top().phase == 0 {
        let object = agent.create_ordinary_object();
        machine.top().state = FrameState::ObjLit { object, index: 0, key: None };
        machine.top().phase = 1;
    } else if let Some(c) = input {
        let value = c.value_or_undefined();
        let (object, index, pending_key) = match &mut machine.top().state {
            FrameState::ObjLit { object, index, key } => (*object, *index, key.take()),
            _ => unreachable!(),
        };
        let prop = props[index - 1];
        match ast.node(prop) {
            Node::PropKeyValue { key, computed, value: value_node } => {
                match pending_key {
                    None if *computed => {
                        // The computed key just evaluated; store and push
                        // the value expression.
                        let key = to_property_key(agent, value)?;
                        if let FrameState::ObjLit { key: slot, .. } = &mut machine.top().state {
                            *slot = Some(key);
                        }
                        // Stay on the same property.
                        if let FrameState::ObjLit { index, .. } = &mut machine.top().state {
                            *index -= 1;
                        }
                        step_object_advance(machine);
                        return Ok(StepEvent::Push(*value_node));
                    }
                    Some(key) => {
                        if crate::interpreter::statements::is_anonymous_function(ast, *value_node)
                            && let Value::Object(f) = value
                        {
                            let name = key.display(&agent.heap);
                            crate::interpreter::statements::set_function_name(agent, f, &name);
                        }
                        create_data_property_or_throw(agent, object, key, value)?;
                    }
                    None => {
                        let key = literal_property_key(agent, ast, *key)?;
                        if crate::interpreter::statements::is_anonymous_function(ast, *value_node)
                            && let Value::Object(f) = value
                        {
                            let name = key.display(&agent.heap);
                            crate::interpreter::statements::set_function_name(agent, f, &name);
                        }
                        create_data_property_or_throw(agent, object, key, value)?;
                    }
                }
            }
            Node::PropSpread(_) => {
                // CopyDataProperties: own enumerable keys of the source.
                if !value.is_nullish() {
                    let from = to_object(agent, value)?;
                    let keys = crate::ordinary::own_property_keys(agent, from)?;
                    for key in keys {
                        if let Some(desc) = crate::ordinary::get_own_property(agent, from, key)?
                            && desc.enumerable == Some(true)
                        {
                            let v = crate::operations::get(agent, from, key)?;
                            create_data_property_or_throw(agent, object, key, v)?;
                        }
                    }
                }
            }
            Node::PropMethod { key, computed, func }
            | Node::PropGetter { key, computed, func }
            | Node::PropSetter { key, computed, func } => {
                // The computed key finished; define the method now.
                debug_assert!(*computed);
                let key_value = to_property_key(agent, value)?;
                define_object_method(agent, machine, ast, prop, object, key_value, *func, strict)?;
                let _ = key;
            }
            _ => return Err(EngineError::internal("object literal property shape")),
        }
    }
    // Advance to the next property.
    loop {
        let (object, index) = match &machine.top().state {
            FrameState::ObjLit { object, index, .. } => (*object, *index),
            _ => unreachable!(),
        };
        if index >= props.len() {
            return Ok(StepEvent::Done(Completion::normal(Value::Object(object))));
        }
        step_object_advance(machine);
        let prop = props[index];
        match ast.node(prop) {
            Node::PropShorthand(name) => {
                let reference = resolve_binding(agent, name, strict)?;
                let value = get_value(agent, &reference)?;
                let key = agent.key_from_str(name);
                create_data_property_or_throw(agent, object, key, value)?;
            }
            Node::PropKeyValue { key, computed, value } => {
                if *computed {
                    return Ok(StepEvent::Push(*key));
                }
                let _ = literal_property_key(agent, ast, *key)?;
                // Evaluate the value; key recomputed on receipt.
                return Ok(StepEvent::Push(*value));
            }
            Node::PropSpread(expr) => return Ok(StepEvent::Push(*expr)),
            Node::PropMethod { key, computed, func }
            | Node::PropGetter { key, computed, func }
            | Node::PropSetter { key, computed, func } => {
                if *computed {
                    return Ok(StepEvent::Push(*key));
                }
                let key_value = literal_property_key(agent, ast, *key)?;
                define_object_method(agent, machine, ast, prop, object, key_value, *func, strict)?;
            }
            _ => return Err(EngineError::internal("object literal property shape")),
        }
    }
}

fn step_object_advance(machine: &mut Machine) {
    if let FrameState::ObjLit { index, .. } = &mut machine.top().state {
        *index += 1;
    }
}

fn literal_property_key(agent: &mut Agent, ast: &Ast, key: NodeId) -> JsResult<PropertyKey> {
    match ast.node(key) {
        Node::Ident(name) | Node::StringLit(name) => Ok(agent.key_from_str(name)),
        Node::Number(n) => {
            let text = crate::numeric::number_to_string(*n);
            Ok(agent.key_from_str(&text))
        }
        _ => Err(EngineError::internal("non-literal property key")),
    }
}

#[expect(clippy::too_many_arguments, reason = "method definition carries full context")]
fn define_object_method(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    prop: NodeId,
    object: crate::value::ObjectId,
    key: PropertyKey,
    func: NodeId,
    strict: bool,
) -> JsResult<()> {
    let Node::Function(func_node) = ast.node(func) else {
        return Err(EngineError::internal("method without a function node"));
    };
    let name = key.display(&agent.heap);
    let is_accessor = matches!(ast.node(prop), Node::PropGetter { .. } | Node::PropSetter { .. });
    let prefix = match ast.node(prop) {
        Node::PropGetter { .. } => format!("get {name}"),
        Node::PropSetter { .. } => format!("set {name}"),
        _ => name,
    };
    let method = instantiate_function(
        agent,
        machine.source,
        func,
        func_node,
        strict,
        Some(&prefix),
        true,
        Some(object),
    );
    if is_accessor {
        let existing = agent.heap.object(object).entry(key).copied();
        let (mut get, mut set) = match existing {
            Some(crate::object::PropertyEntry::Accessor { get, set, .. }) => (get, set),
            _ => (None, None),
        };
        if matches!(ast.node(prop), Node::PropGetter { .. }) {
            get = Some(method);
        } else {
            set = Some(method);
        }
        agent.heap.object_mut(object).properties.insert(
            key,
            crate::object::PropertyEntry::Accessor { get, set, enumerable: true, configurable: true },
        );
    } else {
        create_data_property_or_throw(agent, object, key, Value::Object(method))?;
    }
    Ok(())
}

fn step_template(
    agent: &mut Agent,
    machine: &mut Machine,
    quasis: &[Box<str>],
    exprs: &[NodeId],
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    if machine.top().phase == 0 {
        machine.top().state = FrameState::Template { units: Vec::new(), index: 0 };
        machine.top().phase = 1;
    } else if let Some(c) = input {
        let value = c.value_or_undefined();
        let text = to_string(agent, value)?;
        let units = agent.heap.string(text).units().to_vec();
        if let FrameState::Template { units: acc, .. } = &mut machine.top().state {
            acc.extend_from_slice(&units);
        }
    }
    let index = match &machine.top().state {
        FrameState::Template { index, .. } => *index,
        _ => unreachable!(),
    };
    // quasis[i] precedes exprs[i]; the final quasi closes the literal.
    if index < quasis.len() {
        let quasi = JsString::from_str(&quasis[index]);
        if let FrameState::Template { units, index } = &mut machine.top().state {
            units.extend_from_slice(quasi.units());
            *index += 1;
        }
        if index < exprs.len() {
            return Ok(StepEvent::Push(exprs[index]));
        }
    }
    let units = match &mut machine.top().state {
        FrameState::Template { units, .. } => std::mem::take(units),
        _ => unreachable!(),
    };
    let id = agent.heap.intern_units(units);
    Ok(StepEvent::Done(Completion::normal(Value::String(id))))
}

// --- calls ---

fn step_call(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    callee: NodeId,
    args: &[NodeId],
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    const PHASE_BASE_DONE: u32 = 1;
    const PHASE_KEY_DONE: u32 = 2;
    const PHASE_ARGS: u32 = 3;

    match machine.top().phase {
        0 => match ast.node(callee) {
            Node::Member { object, .. } => {
                machine.top().phase = PHASE_BASE_DONE;
                Ok(StepEvent::Push(*object))
            }
            Node::Ident(name) => {
                let reference = resolve_binding(agent, name, strict)?;
                let func = get_value(agent, &reference);
                let func = match func {
                    Ok(f) => f,
                    Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
                };
                // `with` bases become the this value of the call.
                let this = match reference.base {
                    ReferenceBase::Environment(env) => {
                        match agent.heap.env(env) {
                            crate::environments::EnvironmentRecord::Object(e) if e.with_environment => {
                                Value::Object(e.binding_object)
                            }
                            _ => Value::Undefined,
                        }
                    }
                    _ => Value::Undefined,
                };
                begin_arguments(machine, func, this);
                Ok(StepEvent::Continue)
            }
            Node::SuperProperty { .. } | Node::PrivateMember { .. } => {
                // Evaluate through the generic path: base is this.
                machine.top().phase = PHASE_ARGS;
                Ok(StepEvent::Push(callee))
            }
            _ => {
                machine.top().phase = PHASE_ARGS;
                Ok(StepEvent::Push(callee))
            }
        },
        PHASE_BASE_DONE => {
            let base = input.expect("call base").value_or_undefined();
            let Node::Member { property, computed, .. } = ast.node(callee) else {
                return Err(EngineError::internal("call callee changed shape"));
            };
            if *computed {
                machine.top().state = FrameState::Acc(base);
                machine.top().phase = PHASE_KEY_DONE;
                return Ok(StepEvent::Push(*property));
            }
            let key = member_key(agent, ast, *property)?;
            let func = match get_v(agent, base, key) {
                Ok(f) => f,
                Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
            };
            begin_arguments(machine, func, base);
            Ok(StepEvent::Continue)
        }
        PHASE_KEY_DONE => {
            let key = input.expect("call key").value_or_undefined();
            let base = match &machine.top().state {
                FrameState::Acc(v) => *v,
                _ => Value::Undefined,
            };
            let key = match to_property_key(agent, key) {
                Ok(k) => k,
                Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
            };
            let func = match get_v(agent, base, key) {
                Ok(f) => f,
                Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
            };
            begin_arguments(machine, func, base);
            Ok(StepEvent::Continue)
        }
        PHASE_ARGS => {
            // First entry: the callee value just arrived for the generic
            // path; later entries: an argument value arrived.
            if !matches!(machine.top().state, FrameState::Call(_)) {
                let func = input.expect("callee value").value_or_undefined();
                begin_arguments(machine, func, Value::Undefined);
            } else if let Some(c) = input {
                receive_argument(agent, machine, c)?;
            }
            next_argument_or_invoke(agent, machine, ast, args, None)
        }
        _ => unreachable!("call phase"),
    }
}

fn begin_arguments(machine: &mut Machine, func: Value, this: Value) {
    machine.top().phase = 3;
    machine.top().state = FrameState::Call(Box::new(CallState {
        func,
        this,
        args: Vec::new(),
        arg_index: 0,
        spreading: false,
    }));
}

fn receive_argument(agent: &mut Agent, machine: &mut Machine, c: Completion) -> JsResult<()> {
    let value = c.value_or_undefined();
    let spreading = match &machine.top().state {
        FrameState::Call(state) => state.spreading,
        _ => false,
    };
    if spreading {
        let values = iteration::iterable_to_list(agent, value)?;
        if let FrameState::Call(state) = &mut machine.top().state {
            state.args.extend(values);
            state.spreading = false;
        }
    } else if let FrameState::Call(state) = &mut machine.top().state {
        state.args.push(value);
    }
    Ok(())
}

/// Pushes the next argument expression, or performs the call/construct.
fn next_argument_or_invoke(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    args: &[NodeId],
    construct_target: Option<()>,
) -> JsResult<StepEvent> {
    let arg_index = match &machine.top().state {
        FrameState::Call(state) => state.arg_index,
        _ => unreachable!(),
    };
    if arg_index < args.len() {
        let arg = args[arg_index];
        if let FrameState::Call(state) = &mut machine.top().state {
            state.arg_index += 1;
        }
        if let Node::Spread(inner) = ast.node(arg) {
            if let FrameState::Call(state) = &mut machine.top().state {
                state.spreading = true;
            }
            return Ok(StepEvent::Push(*inner));
        }
        return Ok(StepEvent::Push(arg));
    }
    let (func, this, call_args) = match &mut machine.top().state {
        FrameState::Call(state) => (state.func, state.this, std::mem::take(&mut state.args)),
        _ => unreachable!(),
    };
    if construct_target.is_some() {
        if !crate::operations::is_constructor(&agent.heap, func) {
            let brief = crate::value::brief(func, &agent.heap);
            return Ok(StepEvent::Done(throw_value_error(
                agent,
                ErrorKind::Type,
                &format!("{brief} is not a constructor"),
            )));
        }
        let Value::Object(ctor) = func else { unreachable!() };
        let result = crate::interpreter::construct(agent, ctor, &call_args, ctor);
        return Ok(StepEvent::Done(outcome(result.map(Value::Object))?));
    }
    if !is_callable(&agent.heap, func) {
        let brief = crate::value::brief(func, &agent.heap);
        return Ok(StepEvent::Done(throw_value_error(
            agent,
            ErrorKind::Type,
            &format!("{brief} is not a function"),
        )));
    }
    Ok(StepEvent::Done(outcome(call(agent, func, this, &call_args))?))
}

fn step_new(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    callee: NodeId,
    args: &[NodeId],
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    match machine.top().phase {
        0 => {
            machine.top().phase = 1;
            Ok(StepEvent::Push(callee))
        }
        _ => {
            if !matches!(machine.top().state, FrameState::Call(_)) {
                let func = input.expect("constructor value").value_or_undefined();
                begin_arguments(machine, func, Value::Undefined);
                machine.top().phase = 1;
            } else if let Some(c) = input {
                receive_argument(agent, machine, c)?;
            }
            next_argument_or_invoke(agent, machine, ast, args, Some(()))
        }
    }
}

fn step_super_call(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    args: &[NodeId],
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    if machine.top().phase == 0 {
        // GetSuperConstructor from the active function object.
        let env = agent.running_context().lexical_env;
        let this_env = environments::get_this_environment(&agent.heap, env);
        let active = match agent.heap.env(this_env) {
            crate::environments::EnvironmentRecord::Function(f) => Some(f.function_object),
            _ => None,
        };
        let Some(active) = active else {
            return Err(agent.throw_error(ErrorKind::Syntax, "'super' outside of a constructor"));
        };
        let super_ctor = crate::ordinary::get_prototype_of(agent, active)?;
        let func = super_ctor.map_or(Value::Undefined, Value::Object);
        begin_arguments(machine, func, Value::Undefined);
        machine.top().phase = 1;
        return Ok(StepEvent::Continue);
    }
    if let Some(c) = input {
        receive_argument(agent, machine, c)?;
    }
    // Argument collection, then the construct-and-bind tail.
    let arg_index = match &machine.top().state {
        FrameState::Call(state) => state.arg_index,
        _ => unreachable!(),
    };
    if arg_index < args.len() {
        return next_argument_or_invoke(agent, machine, ast, args, None).map(|event| match event {
            StepEvent::Done(_) => unreachable!("arguments remain"),
            other => other,
        });
    }
    let (func, call_args) = match &mut machine.top().state {
        FrameState::Call(state) => (state.func, std::mem::take(&mut state.args)),
        _ => unreachable!(),
    };
    if !crate::operations::is_constructor(&agent.heap, func) {
        return Ok(StepEvent::Done(throw_value_error(
            agent,
            ErrorKind::Type,
            "super constructor is not a constructor",
        )));
    }
    let Value::Object(ctor) = func else { unreachable!() };
    let env = agent.running_context().lexical_env;
    let this_env = environments::get_this_environment(&agent.heap, env);
    let new_target = environments::get_new_target(&agent.heap, env)
        .ok_or_else(|| EngineError::internal("super call without new.target"))?;
    let result = match crate::interpreter::construct(agent, ctor, &call_args, new_target) {
        Ok(result) => result,
        Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
    };
    match environments::bind_this_value(agent, this_env, Value::Object(result)) {
        Ok(_) => {}
        Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
    }
    // Initialize the derived class's own fields now that this exists.
    let active = match agent.heap.env(this_env) {
        crate::environments::EnvironmentRecord::Function(f) => f.function_object,
        _ => unreachable!(),
    };
    if let Err(e) = crate::interpreter::initialize_instance_elements(agent, result, active) {
        return Ok(StepEvent::Done(outcome(Err(e))?));
    }
    Ok(StepEvent::Done(Completion::normal(Value::Object(result))))
}

// --- unary / update ---

fn step_unary(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    op: UnaryOp,
    expr: NodeId,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    // delete and typeof work on references, not values.
    if machine.top().phase == 0 {
        match op {
            UnaryOp::Delete => return step_delete(agent, machine, ast, expr, input, strict),
            UnaryOp::TypeOf => {
                if let Node::Ident(name) = ast.node(expr) {
                    let reference = resolve_binding(agent, name, strict)?;
                    if reference.is_unresolvable() {
                        let id = agent.heap.intern_str("undefined");
                        return Ok(StepEvent::Done(Completion::normal(Value::String(id))));
                    }
                }
            }
            _ => {}
        }
        machine.top().phase = 1;
        return Ok(StepEvent::Push(expr));
    }
    if op == UnaryOp::Delete {
        return step_delete(agent, machine, ast, expr, input, strict);
    }
    let value = input.expect("unary operand").value_or_undefined();
    let result: JsResult<Value> = match op {
        UnaryOp::Void => Ok(Value::Undefined),
        UnaryOp::Not => Ok(Value::Boolean(!to_boolean(&agent.heap, value))),
        UnaryOp::TypeOf => {
            let tag = if is_callable(&agent.heap, value) {
                "function"
            } else {
                value.type_of_non_callable()
            };
            let id = agent.heap.intern_str(tag);
            Ok(Value::String(id))
        }
        UnaryOp::Minus => match to_numeric(agent, value) {
            Ok(Numeric::Number(n)) => Ok(Value::Number(-n)),
            Ok(Numeric::BigInt(id)) => {
                let negated = -agent.heap.bigint(id).clone();
                Ok(Value::BigInt(agent.heap.intern_bigint(negated)))
            }
            Err(e) => Err(e),
        },
        UnaryOp::Plus => to_number(agent, value).map(Value::Number),
        UnaryOp::BitNot => match to_numeric(agent, value) {
            Ok(Numeric::Number(n)) => Ok(Value::Number(f64::from(!wrap_to_int32(n)))),
            Ok(Numeric::BigInt(id)) => {
                let inverted = !agent.heap.bigint(id).clone();
                Ok(Value::BigInt(agent.heap.intern_bigint(inverted)))
            }
            Err(e) => Err(e),
        },
        UnaryOp::Delete => unreachable!("handled above"),
    };
    Ok(StepEvent::Done(outcome(result)?))
}

fn step_delete(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    expr: NodeId,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    match ast.node(expr) {
        Node::Member { object, property, computed } => match machine.top().phase {
            0 => {
                machine.top().phase = 1;
                Ok(StepEvent::Push(*object))
            }
            1 => {
                let base = input.expect("delete base").value_or_undefined();
                if *computed {
                    machine.top().state = FrameState::Acc(base);
                    machine.top().phase = 2;
                    return Ok(StepEvent::Push(*property));
                }
                let key = member_key(agent, ast, *property)?;
                Ok(StepEvent::Done(outcome(delete_property(agent, base, key, strict))?))
            }
            _ => {
                let key = input.expect("delete key").value_or_undefined();
                let base = match &machine.top().state {
                    FrameState::Acc(v) => *v,
                    _ => Value::Undefined,
                };
                let key = to_property_key(agent, key)?;
                Ok(StepEvent::Done(outcome(delete_property(agent, base, key, strict))?))
            }
        },
        Node::Ident(name) => {
            if strict {
                return Ok(StepEvent::Done(throw_value_error(
                    agent,
                    ErrorKind::Syntax,
                    "cannot delete a variable in strict mode",
                )));
            }
            let reference = resolve_binding(agent, name, strict)?;
            let result = match reference.base {
                ReferenceBase::Unresolvable => Ok(Value::Boolean(true)),
                ReferenceBase::Environment(env) => {
                    let name_id = agent.heap.intern_str(name);
                    environments::delete_binding(agent, env, name_id).map(Value::Boolean)
                }
                ReferenceBase::Value(_) => Ok(Value::Boolean(true)),
            };
            Ok(StepEvent::Done(outcome(result)?))
        }
        _ => {
            // Deleting a non-reference evaluates the operand and yields
            // true.
            match machine.top().phase {
                0 => {
                    machine.top().phase = 1;
                    Ok(StepEvent::Push(expr))
                }
                _ => Ok(StepEvent::Done(Completion::normal(Value::Boolean(true)))),
            }
        }
    }
}

fn delete_property(agent: &mut Agent, base: Value, key: PropertyKey, strict: bool) -> JsResult<Value> {
    let object = to_object(agent, base)?;
    let deleted = crate::ordinary::delete(agent, object, key)?;
    if !deleted && strict {
        let name = key.display(&agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("cannot delete property '{name}'")));
    }
    Ok(Value::Boolean(deleted))
}

#[expect(clippy::too_many_arguments, reason = "update expressions carry full context")]
fn step_update(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    op: UpdateOp,
    prefix: bool,
    target: NodeId,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    // Build a reference to the target, then read-modify-write.
    let reference = match resolve_update_target(agent, machine, ast, target, input, strict)? {
        TargetProgress::Step(event) => return Ok(event),
        TargetProgress::Ready(reference) => reference,
    };
    let old = match get_value(agent, &reference) {
        Ok(v) => v,
        Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
    };
    let result: JsResult<(Value, Value)> = (|| {
        let (old_numeric, new_value) = match to_numeric(agent, old)? {
            Numeric::Number(n) => {
                let delta = if op == UpdateOp::Increment { 1.0 } else { -1.0 };
                (Value::Number(n), Value::Number(n + delta))
            }
            Numeric::BigInt(id) => {
                let one = num_bigint::BigInt::from(1);
                let old_big = agent.heap.bigint(id).clone();
                let new_big = if op == UpdateOp::Increment { old_big.clone() + one } else { old_big.clone() - one };
                (
                    Value::BigInt(agent.heap.intern_bigint(old_big)),
                    Value::BigInt(agent.heap.intern_bigint(new_big)),
                )
            }
        };
        put_value(agent, &reference, new_value)?;
        Ok((old_numeric, new_value))
    })();
    match result {
        Ok((old, new)) => Ok(StepEvent::Done(Completion::normal(if prefix { new } else { old }))),
        Err(e) => Ok(StepEvent::Done(outcome(Err(e))?)),
    }
}

enum TargetProgress {
    Step(StepEvent),
    Ready(Reference),
}

/// Drives reference construction for update/assignment targets across
/// steps: identifier targets resolve synchronously, member targets need
/// their base (and possibly key) evaluated.
fn resolve_update_target(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    target: NodeId,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<TargetProgress> {
    const PHASE_BASE_DONE: u32 = 1;
    const PHASE_KEY_DONE: u32 = 2;
    const PHASE_READY: u32 = 3;

    match ast.node(target) {
        Node::Ident(name) => {
            let reference = resolve_binding(agent, name, strict)?;
            Ok(TargetProgress::Ready(reference))
        }
        Node::Member { object, property, computed } => match machine.top().phase {
            0 => {
                machine.top().phase = PHASE_BASE_DONE;
                machine.top().state = FrameState::RefAccess(Box::new(RefAccess {
                    base: None,
                    reference: None,
                    old: None,
                }));
                Ok(TargetProgress::Step(StepEvent::Push(*object)))
            }
            PHASE_BASE_DONE => {
                let base = input.expect("target base").value_or_undefined();
                if *computed {
                    if let FrameState::RefAccess(state) = &mut machine.top().state {
                        state.base = Some(base);
                    }
                    machine.top().phase = PHASE_KEY_DONE;
                    return Ok(TargetProgress::Step(StepEvent::Push(*property)));
                }
                let key = member_key(agent, ast, *property)?;
                machine.top().phase = PHASE_READY;
                Ok(TargetProgress::Ready(Reference {
                    base: ReferenceBase::Value(base),
                    name: ReferencedName::Key(key),
                    strict,
                    this_value: None,
                }))
            }
            PHASE_KEY_DONE => {
                let key = input.expect("target key").value_or_undefined();
                let base = match &machine.top().state {
                    FrameState::RefAccess(state) => state.base.unwrap_or(Value::Undefined),
                    _ => Value::Undefined,
                };
                let key = to_property_key(agent, key)?;
                machine.top().phase = PHASE_READY;
                Ok(TargetProgress::Ready(Reference {
                    base: ReferenceBase::Value(base),
                    name: ReferencedName::Key(key),
                    strict,
                    this_value: None,
                }))
            }
            _ => Err(EngineError::internal("update target re-entered after ready")),
        },
        Node::PrivateMember { object, name } => match machine.top().phase {
            0 => {
                machine.top().phase = PHASE_BASE_DONE;
                Ok(TargetProgress::Step(StepEvent::Push(*object)))
            }
            _ => {
                let base = input.expect("target base").value_or_undefined();
                let private_env = agent.running_context().private_env;
                let Some(key) = environments::resolve_private_identifier(&agent.heap, private_env, name)
                else {
                    return Err(agent.throw_error(
                        ErrorKind::Syntax,
                        format!("private name #{name} is not defined"),
                    ));
                };
                machine.top().phase = PHASE_READY;
                Ok(TargetProgress::Ready(Reference {
                    base: ReferenceBase::Value(base),
                    name: ReferencedName::Private(key),
                    strict,
                    this_value: None,
                }))
            }
        },
        Node::SuperProperty { property, computed } => match machine.top().phase {
            0 if *computed => {
                machine.top().phase = PHASE_KEY_DONE;
                Ok(TargetProgress::Step(StepEvent::Push(*property)))
            }
            phase => {
                let key = if *computed {
                    debug_assert_eq!(phase, PHASE_KEY_DONE);
                    let key = input.expect("super key").value_or_undefined();
                    to_property_key(agent, key)?
                } else {
                    member_key(agent, ast, *property)?
                };
                machine.top().phase = PHASE_READY;
                Ok(TargetProgress::Ready(make_super_reference(agent, key, strict)?))
            }
        },
        _ => Err(agent.throw_error(ErrorKind::Syntax, "invalid assignment target")),
    }
}

// --- assignment ---

#[expect(clippy::too_many_arguments, reason = "assignments carry full context")]
fn step_assign(
    agent: &mut Agent,
    machine: &mut Machine,
    ast: &Rc<Ast>,
    target: NodeId,
    op: Option<BinaryOp>,
    value: NodeId,
    input: Option<Completion>,
    strict: bool,
) -> JsResult<StepEvent> {
    const PHASE_VALUE_DONE: u32 = 8;

    if machine.top().phase == PHASE_VALUE_DONE {
        let rval = input.expect("assignment value").value_or_undefined();
        let (reference, old) = match &machine.top().state {
            FrameState::RefAccess(state) => {
                (state.reference.expect("reference recorded"), state.old)
            }
            _ => unreachable!(),
        };
        let result: JsResult<Value> = (|| {
            let final_value = match op {
                None => {
                    // NamedEvaluation for anonymous function values.
                    if let Node::Ident(name) = ast.node(target)
                        && crate::interpreter::statements::is_anonymous_function(ast, value)
                        && let Value::Object(f) = rval
                    {
                        crate::interpreter::statements::set_function_name(agent, f, name);
                    }
                    rval
                }
                Some(op) => apply_binary(agent, op, old.expect("compound read"), rval)?,
            };
            put_value(agent, &reference, final_value)?;
            Ok(final_value)
        })();
        return Ok(StepEvent::Done(outcome(result)?));
    }

    let reference = match resolve_update_target(agent, machine, ast, target, input, strict)? {
        TargetProgress::Step(event) => return Ok(event),
        TargetProgress::Ready(reference) => reference,
    };
    let old = if op.is_some() {
        match get_value(agent, &reference) {
            Ok(v) => Some(v),
            Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
        }
    } else {
        None
    };
    machine.top().phase = PHASE_VALUE_DONE;
    machine.top().state = FrameState::RefAccess(Box::new(RefAccess {
        base: None,
        reference: Some(reference),
        old,
    }));
    Ok(StepEvent::Push(value))
}

// --- yield* ---

fn step_yield_delegate(
    agent: &mut Agent,
    machine: &mut Machine,
    argument: Option<NodeId>,
    input: Option<Completion>,
) -> JsResult<StepEvent> {
    const PHASE_ARG_DONE: u32 = 1;
    const PHASE_RESUMED: u32 = 2;

    match machine.top().phase {
        0 => {
            let Some(argument) = argument else {
                return Err(EngineError::internal("yield* without an iterable"));
            };
            machine.top().phase = PHASE_ARG_DONE;
            Ok(StepEvent::Push(argument))
        }
        PHASE_ARG_DONE => {
            let iterable = input.expect("yield* iterable").value_or_undefined();
            let record = match iteration::get_iterator(agent, iterable) {
                Ok(r) => r,
                Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
            };
            machine.top().state =
                FrameState::Delegate(Box::new(crate::interpreter::DelegateState { iterator: record }));
            machine.top().phase = PHASE_RESUMED;
            delegate_advance(agent, machine, Completion::normal(Value::Undefined))
        }
        PHASE_RESUMED => {
            let completion = input.expect("yield* resumption");
            delegate_advance(agent, machine, completion)
        }
        _ => unreachable!("yield* phase"),
    }
}

/// One `yield*` pump: feed the received completion to the inner iterator
/// and either finish or re-yield its next value.
fn delegate_advance(
    agent: &mut Agent,
    machine: &mut Machine,
    received: Completion,
) -> JsResult<StepEvent> {
    let record = match &machine.top().state {
        FrameState::Delegate(state) => state.iterator,
        _ => unreachable!(),
    };
    let iterator = Value::Object(record.iterator);
    let step_result: JsResult<Value> = match received {
        Completion::Normal(v) => {
            let arg = v.unwrap_or(Value::Undefined);
            call(agent, record.next_method, iterator, &[arg])
        }
        Completion::Throw(t) => {
            let throw_key = Value::String(agent.heap.statics.throw);
            match crate::operations::get_method(agent, iterator, throw_key)? {
                Some(throw_method) => call(agent, throw_method, iterator, &[t.value]),
                None => {
                    // Close the inner iterator, then report the protocol
                    // violation.
                    let _ = iteration::iterator_close(agent, &record, Completion::EMPTY)?;
                    return Ok(StepEvent::Done(throw_value_error(
                        agent,
                        ErrorKind::Type,
                        "the delegated iterator has no throw method",
                    )));
                }
            }
        }
        Completion::Return(v) => {
            let return_key = Value::String(agent.heap.statics.return_);
            match crate::operations::get_method(agent, iterator, return_key)? {
                None => return Ok(StepEvent::Done(Completion::Return(v))),
                Some(return_method) => call(agent, return_method, iterator, &[v]),
            }
        }
        _ => return Err(EngineError::internal("loop completion reached yield*")),
    };
    let result = match step_result {
        Ok(v) => v,
        Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
    };
    let Value::Object(result) = result else {
        return Ok(StepEvent::Done(throw_value_error(
            agent,
            ErrorKind::Type,
            "iterator result is not an object",
        )));
    };
    let done = match iteration::iterator_complete(agent, result) {
        Ok(done) => done,
        Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
    };
    let value = match iteration::iterator_value(agent, result) {
        Ok(v) => v,
        Err(e) => return Ok(StepEvent::Done(outcome(Err(e))?)),
    };
    if done {
        return Ok(StepEvent::Done(Completion::normal(value)));
    }
    Ok(StepEvent::Suspend(Suspension::Yield(value)))
}

// --- binary operator semantics ---

/// `ApplyStringOrNumericBinaryOperator` and the relational/equality family.
pub(crate) fn apply_binary(agent: &mut Agent, op: BinaryOp, lval: Value, rval: Value) -> JsResult<Value> {
    match op {
        BinaryOp::Add => {
            let lprim = to_primitive(agent, lval, PreferredType::Default)?;
            let rprim = to_primitive(agent, rval, PreferredType::Default)?;
            if matches!(lprim, Value::String(_)) || matches!(rprim, Value::String(_)) {
                let ls = to_string(agent, lprim)?;
                let rs = to_string(agent, rprim)?;
                let joined = agent.heap.string(ls).concat(agent.heap.string(rs));
                return Ok(Value::String(agent.heap.intern_string(joined)));
            }
            numeric_binary(agent, op, lprim, rprim)
        }
        BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::Rem
        | BinaryOp::Exp
        | BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::ShiftLeft
        | BinaryOp::ShiftRight
        | BinaryOp::ShiftRightUnsigned => numeric_binary(agent, op, lval, rval),

        BinaryOp::LessThan => Ok(Value::Boolean(
            is_less_than(agent, lval, rval, true)?.unwrap_or(false),
        )),
        BinaryOp::GreaterThan => Ok(Value::Boolean(
            is_less_than(agent, rval, lval, false)?.unwrap_or(false),
        )),
        BinaryOp::LessThanEquals => Ok(Value::Boolean(
            !is_less_than(agent, rval, lval, false)?.unwrap_or(true),
        )),
        BinaryOp::GreaterThanEquals => Ok(Value::Boolean(
            !is_less_than(agent, lval, rval, true)?.unwrap_or(true),
        )),
        BinaryOp::LooseEquals => Ok(Value::Boolean(is_loosely_equal(agent, lval, rval)?)),
        BinaryOp::LooseNotEquals => Ok(Value::Boolean(!is_loosely_equal(agent, lval, rval)?)),
        BinaryOp::StrictEquals => Ok(Value::Boolean(is_strictly_equal(lval, rval))),
        BinaryOp::StrictNotEquals => Ok(Value::Boolean(!is_strictly_equal(lval, rval))),
        BinaryOp::InstanceOf => Ok(Value::Boolean(instanceof_operator(agent, lval, rval)?)),
        BinaryOp::In => {
            let Value::Object(object) = rval else {
                return Err(agent.throw_error(
                    ErrorKind::Type,
                    "cannot use 'in' operator on a non-object",
                ));
            };
            let key = to_property_key(agent, lval)?;
            Ok(Value::Boolean(crate::ordinary::has_property(agent, object, key)?))
        }
    }
}

fn numeric_binary(agent: &mut Agent, op: BinaryOp, lval: Value, rval: Value) -> JsResult<Value> {
    let lnum = to_numeric(agent, lval)?;
    let rnum = to_numeric(agent, rval)?;
    match (lnum, rnum) {
        (Numeric::Number(a), Numeric::Number(b)) => number_binary(agent, op, a, b),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => bigint_binary(agent, op, a, b),
        _ => Err(agent.throw_error(
            ErrorKind::Type,
            "cannot mix BigInt and other types; use explicit conversions",
        )),
    }
}

fn number_binary(_agent: &mut Agent, op: BinaryOp, a: f64, b: f64) -> JsResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Exp => number_exponentiate(a, b),
        // Bitwise and shift operators coerce through 32 bits; shift counts
        // mask to five bits.
        BinaryOp::BitAnd => f64::from(wrap_to_int32(a) & wrap_to_int32(b)),
        BinaryOp::BitOr => f64::from(wrap_to_int32(a) | wrap_to_int32(b)),
        BinaryOp::BitXor => f64::from(wrap_to_int32(a) ^ wrap_to_int32(b)),
        BinaryOp::ShiftLeft => f64::from(wrap_to_int32(a) << (wrap_to_uint32(b) & 0x1F)),
        BinaryOp::ShiftRight => f64::from(wrap_to_int32(a) >> (wrap_to_uint32(b) & 0x1F)),
        BinaryOp::ShiftRightUnsigned => f64::from(wrap_to_uint32(a) >> (wrap_to_uint32(b) & 0x1F)),
        _ => return Err(EngineError::internal("relational operator in numeric path")),
    };
    Ok(Value::Number(result))
}

fn bigint_binary(
    agent: &mut Agent,
    op: BinaryOp,
    a: crate::value::BigIntId,
    b: crate::value::BigIntId,
) -> JsResult<Value> {
    let left = agent.heap.bigint(a).clone();
    let right = agent.heap.bigint(b).clone();
    let result = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Div => crate::numeric::bigint_divide(agent, &left, &right)?,
        BinaryOp::Rem => crate::numeric::bigint_remainder(agent, &left, &right)?,
        BinaryOp::Exp => crate::numeric::bigint_exponentiate(agent, &left, &right)?,
        BinaryOp::BitAnd => left & right,
        BinaryOp::BitOr => left | right,
        BinaryOp::BitXor => left ^ right,
        BinaryOp::ShiftLeft => crate::numeric::bigint_shift_left(agent, &left, &right)?,
        BinaryOp::ShiftRight => crate::numeric::bigint_shift_right(agent, &left, &right)?,
        BinaryOp::ShiftRightUnsigned => {
            return Err(agent.throw_error(ErrorKind::Type, "BigInts have no unsigned right shift"));
        }
        _ => return Err(EngineError::internal("relational operator in bigint path")),
    };
    Ok(Value::BigInt(agent.heap.intern_bigint(result)))
}
