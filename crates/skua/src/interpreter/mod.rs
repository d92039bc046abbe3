//! The evaluator: a resumable explicit-stack machine walking the parse tree.
//!
//! One [`Machine`] exists per activation (script, module, function body,
//! generator, async function). Frames carry `(node, phase, state)`; abrupt
//! completions unwind frames to the nearest observer. `yield` and `await`
//! suspend only their own activation's machine, which is stored in the
//! generator object or async task and later resumed with a completion —
//! the `codeEvaluationState` handle of an execution context. Ordinary calls
//! run a nested machine to completion under the agent's depth limit.

pub(crate) mod class;
pub(crate) mod coroutines;
mod expressions;
pub(crate) mod statements;

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    agent::{Agent, ExecutionContext, ScriptOrModule, SourceKind},
    ast::{Ast, FunctionNode, Node, NodeId, SourceId, Span},
    completion::{Completion, EngineError, JsResult, ThrowCompletion},
    environments::{self, ThisBindingStatus},
    exotics::arguments,
    function::{ConstructorKind, FieldKey, FunctionData, FunctionKind, ThisMode},
    heap::{Mark, MarkQueue},
    intrinsics::error::ErrorKind,
    iteration::IteratorRecord,
    object::{ObjectData, ObjectRecord, PrivateElement, PropertyEntry, PropertyKey},
    reference::Reference,
    value::{EnvId, ObjectId, StringId, Value},
};

/// How a machine run begins: fresh, or resumed with a completion injected at
/// the suspension point.
#[derive(Debug)]
pub(crate) enum Resume {
    Start,
    Completion(Completion),
}

/// Why a machine run stopped.
#[derive(Debug)]
pub(crate) enum MachineResult {
    Done(Completion),
    Suspended(Suspension),
}

/// The two suspension tokens.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Suspension {
    Await(Value),
    Yield(Value),
}

/// One evaluation frame: a node, the phase within its algorithm, scratch
/// state, the label set threaded from enclosing labelled statements, and the
/// lexical environment to restore when the frame leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// Drive the algorithm of the node itself.
    Node,
    /// Drive a function body whose node is the enclosing `Function`.
    FunctionBody,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub node: NodeId,
    pub phase: u32,
    pub labels: SmallVec<[Box<str>; 1]>,
    pub saved_env: Option<EnvId>,
    /// Private environment to restore when this frame leaves the stack
    /// (class bodies swap it).
    pub saved_private_env: Option<Option<crate::value::PrivateEnvId>>,
    pub state: FrameState,
}

impl Frame {
    fn new(node: NodeId) -> Self {
        Self {
            kind: FrameKind::Node,
            node,
            phase: 0,
            labels: SmallVec::new(),
            saved_env: None,
            saved_private_env: None,
            state: FrameState::None,
        }
    }

    pub(crate) fn function_body(node: NodeId) -> Self {
        Self {
            kind: FrameKind::FunctionBody,
            node,
            phase: 0,
            labels: SmallVec::new(),
            saved_env: None,
            saved_private_env: None,
            state: FrameState::None,
        }
    }
}

impl Mark for Frame {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(env) = self.saved_env {
            queue.push_env(env);
        }
        self.state.mark(queue);
    }
}

/// Per-frame scratch state; the variant depends on the node kind and phase.
#[derive(Debug)]
pub(crate) enum FrameState {
    None,
    /// One scratch value.
    Acc(Value),
    /// Statement-list progress with the running UpdateEmpty value. A class
    /// declaration in flight records the binding to initialize with its
    /// value.
    List {
        index: usize,
        value: Option<Value>,
        class_binding: Option<Box<str>>,
    },
    /// Declaration-list progress.
    Decl { index: usize },
    /// while/do-while progress.
    Loop { value: Option<Value> },
    /// for(;;) progress, carrying the names copied per iteration.
    ForLoop(Box<ForLoopState>),
    ForIn(Box<ForInState>),
    ForOf(Box<ForOfState>),
    Switch(Box<SwitchState>),
    Try { pending: Option<Completion> },
    ArrayLit { array: ObjectId, next_index: u64, elem: usize },
    ObjLit { object: ObjectId, index: usize, key: Option<PropertyKey> },
    Template { units: Vec<u16>, index: usize },
    Call(Box<CallState>),
    RefAccess(Box<RefAccess>),
    Class(Box<class::ClassEval>),
    Delegate(Box<DelegateState>),
}

impl Mark for FrameState {
    fn mark(&self, queue: &mut MarkQueue) {
        match self {
            Self::None | Self::Decl { .. } | Self::Template { .. } => {}
            Self::Acc(v) => v.mark(queue),
            Self::List { value, .. } | Self::Loop { value } => value.mark(queue),
            Self::ForLoop(s) => s.value.mark(queue),
            Self::ForIn(s) => s.value.mark(queue),
            Self::ForOf(s) => {
                s.value.mark(queue);
                queue.push_object(s.iterator.iterator);
            }
            Self::Switch(s) => {
                s.discriminant.mark(queue);
                s.value.mark(queue);
            }
            Self::Try { pending } => {
                if let Some(Completion::Throw(t)) = pending {
                    t.value.mark(queue);
                }
                if let Some(c) = pending {
                    c.value_or_undefined().mark(queue);
                }
            }
            Self::ArrayLit { array, .. } => queue.push_object(*array),
            Self::ObjLit { object, .. } => queue.push_object(*object),
            Self::Call(s) => {
                s.func.mark(queue);
                s.this.mark(queue);
                s.args.mark(queue);
            }
            Self::RefAccess(s) => {
                if let Some(base) = s.base {
                    base.mark(queue);
                }
                if let Some(old) = s.old {
                    old.mark(queue);
                }
            }
            Self::Class(s) => s.mark(queue),
            Self::Delegate(s) => queue.push_object(s.iterator.iterator),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ForLoopState {
    pub value: Option<Value>,
    /// let/const names re-bound into a fresh environment each iteration.
    pub per_iteration: Vec<StringId>,
}

#[derive(Debug)]
pub(crate) struct ForInState {
    pub keys: Vec<PropertyKey>,
    pub index: usize,
    pub value: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct ForOfState {
    pub iterator: IteratorRecord,
    pub value: Option<Value>,
    /// Set once the iterator has reported done, so unwinding stops closing.
    pub exhausted: bool,
}

#[derive(Debug)]
pub(crate) struct SwitchState {
    pub discriminant: Value,
    /// Index of the case selector currently being evaluated.
    pub case_index: usize,
    /// First clause to execute once matching settles.
    pub matched: Option<usize>,
    /// Clause and statement progress while running bodies.
    pub run_case: usize,
    pub run_stmt: usize,
    pub value: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct CallState {
    pub func: Value,
    pub this: Value,
    pub args: Vec<Value>,
    pub arg_index: usize,
    /// The argument being awaited is a spread element.
    pub spreading: bool,
}

/// Scratch for reference-producing targets (assignment, update, delete).
#[derive(Debug)]
pub(crate) struct RefAccess {
    pub base: Option<Value>,
    pub reference: Option<Reference>,
    pub old: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct DelegateState {
    pub iterator: IteratorRecord,
}

/// What a step asks the driver to do next.
pub(crate) enum StepEvent {
    /// Re-enter the same frame immediately.
    Continue,
    /// Evaluate a child node; its completion arrives as this frame's input.
    Push(NodeId),
    /// Evaluate a child with a label set attached (loop/switch bodies).
    PushLabelled(NodeId, SmallVec<[Box<str>; 1]>),
    /// This frame is finished.
    Done(Completion),
    /// Suspend the whole machine at `yield`/`await`.
    Suspend(Suspension),
}

/// A resumable activation: the `codeEvaluationState` of an execution
/// context.
#[derive(Debug)]
pub(crate) struct Machine {
    pub source: SourceId,
    pub ast: Rc<Ast>,
    pub strict: bool,
    frames: Vec<Frame>,
}

impl Mark for Machine {
    fn mark(&self, queue: &mut MarkQueue) {
        for frame in &self.frames {
            frame.mark(queue);
        }
    }
}

impl Machine {
    pub fn new(agent: &Agent, source: SourceId, root: NodeId, strict: bool) -> Self {
        let ast = Rc::clone(&agent.source(source).ast);
        Self {
            source,
            ast,
            strict,
            frames: vec![Frame::new(root)],
        }
    }

    pub(crate) fn top(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("machine has no frames")
    }

    /// Steps the machine until it completes or suspends.
    pub fn run(&mut self, agent: &mut Agent, resume: Resume) -> JsResult<MachineResult> {
        let mut input: Option<Completion> = match resume {
            Resume::Start => None,
            Resume::Completion(c) => Some(c),
        };
        loop {
            let Some(top) = self.frames.last() else {
                return Ok(MachineResult::Done(input.unwrap_or(Completion::EMPTY)));
            };
            // Abrupt completions unwind to the nearest observing frame.
            if let Some(c) = &input
                && c.is_abrupt()
                && !(top.kind == FrameKind::Node && observes(&self.ast, top, c))
            {
                let completion = input.take().expect("checked above");
                let frame = self.frames.pop().expect("checked above");
                input = Some(unwind_frame(agent, frame, completion)?);
                continue;
            }
            match dispatch(agent, self, input.take())? {
                StepEvent::Continue => {}
                StepEvent::Push(node) => self.frames.push(Frame::new(node)),
                StepEvent::PushLabelled(node, labels) => {
                    let mut frame = Frame::new(node);
                    frame.labels = labels;
                    self.frames.push(frame);
                }
                StepEvent::Done(completion) => {
                    let frame = self.frames.pop().expect("frame completed");
                    if let Some(env) = frame.saved_env {
                        agent.running_context_mut().lexical_env = env;
                    }
                    if let Some(private) = frame.saved_private_env {
                        agent.running_context_mut().private_env = private;
                    }
                    input = Some(completion);
                }
                StepEvent::Suspend(suspension) => {
                    return Ok(MachineResult::Suspended(suspension));
                }
            }
        }
    }
}

/// Whether a frame handles this abrupt completion rather than letting it
/// pass.
fn observes(ast: &Ast, frame: &Frame, completion: &Completion) -> bool {
    let in_labels = |target: &Option<Box<str>>| match target {
        None => true,
        Some(t) => frame.labels.iter().any(|l| l == t),
    };
    match ast.node(frame.node) {
        Node::While { .. } | Node::DoWhile { .. } | Node::For { .. } | Node::ForIn { .. } | Node::ForOf { .. } => {
            match completion {
                Completion::Break { target, .. } | Completion::Continue { target, .. } => in_labels(target),
                _ => false,
            }
        }
        Node::Switch { .. } => matches!(completion, Completion::Break { target, .. } if in_labels(target)),
        Node::Labelled { label, .. } => {
            matches!(completion, Completion::Break { target: Some(t), .. } if t == label)
        }
        // try observes everything; its step decides what survives.
        Node::Try { .. } => true,
        _ => false,
    }
}

/// Runs a frame's unwind duties as an abrupt completion passes through:
/// restore the environment, close an in-flight iterator.
fn unwind_frame(agent: &mut Agent, frame: Frame, completion: Completion) -> JsResult<Completion> {
    if let Some(env) = frame.saved_env {
        agent.running_context_mut().lexical_env = env;
    }
    if let Some(private) = frame.saved_private_env {
        agent.running_context_mut().private_env = private;
    }
    // Statement lists and loops thread their accumulated value into empty
    // abrupt completions on the way out.
    let completion = match &frame.state {
        FrameState::List { value, .. } | FrameState::Loop { value } => completion.update_empty(*value),
        FrameState::ForIn(state) => completion.update_empty(state.value),
        FrameState::ForLoop(state) => completion.update_empty(state.value),
        FrameState::Switch(state) => completion.update_empty(state.value),
        FrameState::ForOf(state) => {
            let completion = completion.update_empty(state.value);
            if !state.exhausted {
                return crate::iteration::iterator_close(agent, &state.iterator, completion);
            }
            completion
        }
        _ => completion,
    };
    Ok(completion)
}

/// One step of the top frame.
fn dispatch(agent: &mut Agent, machine: &mut Machine, input: Option<Completion>) -> JsResult<StepEvent> {
    let ast = Rc::clone(&machine.ast);
    let node_id = machine.top().node;
    if machine.top().kind == FrameKind::FunctionBody {
        return statements::step_function_body(agent, machine, &ast, node_id, input);
    }
    let node = ast.node(node_id);
    match node {
        Node::Script { .. }
        | Node::Module { .. }
        | Node::Block(_)
        | Node::VarDecl { .. }
        | Node::Empty
        | Node::ExprStmt(_)
        | Node::If { .. }
        | Node::DoWhile { .. }
        | Node::While { .. }
        | Node::For { .. }
        | Node::ForIn { .. }
        | Node::ForOf { .. }
        | Node::Continue(_)
        | Node::Break(_)
        | Node::Return(_)
        | Node::With { .. }
        | Node::Labelled { .. }
        | Node::Switch { .. }
        | Node::Throw(_)
        | Node::Try { .. }
        | Node::Debugger
        | Node::Import { .. }
        | Node::ExportNamed { .. }
        | Node::ExportDecl(_)
        | Node::ExportDefault(_)
        | Node::ExportStar { .. } => statements::step(agent, machine, &ast, node_id, node, input),
        _ => expressions::step(agent, machine, &ast, node_id, node, input),
    }
}

// --- sub-evaluation ---

/// Runs a lone expression to completion on a fresh machine in the current
/// context. Used where the tree demands a value mid-algorithm (parameter
/// defaults, field initializers); such positions cannot contain `yield` or
/// a foreign `await`.
pub(crate) fn evaluate_expression(
    agent: &mut Agent,
    source: SourceId,
    node: NodeId,
    strict: bool,
) -> JsResult<Value> {
    let mut machine = Machine::new(agent, source, node, strict);
    match machine.run(agent, Resume::Start)? {
        MachineResult::Done(Completion::Normal(v)) => Ok(v.unwrap_or(Value::Undefined)),
        MachineResult::Done(Completion::Throw(t)) => Err(EngineError::Throw(t)),
        MachineResult::Done(_) => Err(EngineError::internal("expression produced a loop completion")),
        MachineResult::Suspended(_) => Err(EngineError::internal("expression suspended outside a coroutine")),
    }
}

// --- function object creation ---

/// `OrdinaryFunctionCreate`: captures the running environment, strictness
/// and privacy scope, and installs `length`/`name`/`prototype`.
pub(crate) fn instantiate_function(
    agent: &mut Agent,
    source: SourceId,
    node: NodeId,
    func: &FunctionNode,
    outer_strict: bool,
    name_override: Option<&str>,
    as_method: bool,
    home_object: Option<ObjectId>,
) -> ObjectId {
    let context = agent.running_context().clone();
    let strict = func.strict || outer_strict;
    let kind = match (func.is_async, func.is_generator) {
        (false, false) => FunctionKind::Normal,
        (false, true) => FunctionKind::Generator,
        (true, false) => FunctionKind::Async,
        (true, true) => FunctionKind::AsyncGenerator,
    };
    let this_mode = if func.is_arrow {
        ThisMode::Lexical
    } else if strict {
        ThisMode::Strict
    } else {
        ThisMode::Global
    };
    let is_constructor = kind == FunctionKind::Normal && !func.is_arrow && !as_method;
    let data = FunctionData {
        source,
        node,
        environment: context.lexical_env,
        private_environment: context.private_env,
        home_object,
        this_mode,
        strict,
        kind,
        constructor_kind: ConstructorKind::Base,
        is_class_constructor: false,
        is_constructor,
        fields: Vec::new(),
        private_methods: Vec::new(),
        source_text: func.source_text.clone(),
        realm: context.realm,
    };
    let prototype = agent.intrinsics().function_prototype;
    let object = agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::Function(Box::new(data)),
        context.realm,
    ));

    let length = func
        .params
        .iter()
        .take_while(|p| p.default.is_none() && !p.rest)
        .count();
    let length_key = PropertyKey::String(agent.heap.statics.length);
    agent.heap.object_mut(object).properties.insert(
        length_key,
        PropertyEntry::Data {
            value: Value::Number(length as f64),
            writable: false,
            enumerable: false,
            configurable: true,
        },
    );
    let name = name_override
        .map(ToOwned::to_owned)
        .or_else(|| func.name.as_deref().map(ToOwned::to_owned))
        .unwrap_or_default();
    let name_value = agent.string_value(&name);
    let name_key = PropertyKey::String(agent.heap.statics.name);
    agent.heap.object_mut(object).properties.insert(
        name_key,
        PropertyEntry::Data { value: name_value, writable: false, enumerable: false, configurable: true },
    );

    // Non-arrow, non-method functions carry a .prototype; generators carry
    // one linked to the right iterator prototype instead of a constructor
    // pair.
    if is_constructor {
        let proto = agent.create_ordinary_object();
        let ctor_key = PropertyKey::String(agent.heap.statics.constructor);
        agent.heap.object_mut(proto).properties.insert(
            ctor_key,
            PropertyEntry::Data {
                value: Value::Object(object),
                writable: true,
                enumerable: false,
                configurable: true,
            },
        );
        let proto_key = PropertyKey::String(agent.heap.statics.prototype);
        agent.heap.object_mut(object).properties.insert(
            proto_key,
            PropertyEntry::Data {
                value: Value::Object(proto),
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
    } else if matches!(kind, FunctionKind::Generator | FunctionKind::AsyncGenerator) {
        let parent = if kind == FunctionKind::Generator {
            agent.intrinsics().generator_prototype
        } else {
            agent.intrinsics().async_generator_prototype
        };
        let realm = context.realm;
        let proto = agent
            .heap
            .alloc_object(ObjectRecord::new(Some(parent), ObjectData::Ordinary, realm));
        let proto_key = PropertyKey::String(agent.heap.statics.prototype);
        agent.heap.object_mut(object).properties.insert(
            proto_key,
            PropertyEntry::Data {
                value: Value::Object(proto),
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
    }
    object
}

// --- calling ---

/// `Call(F, thisArgument, argumentsList)` once callability is established.
pub(crate) fn call_function(
    agent: &mut Agent,
    func: ObjectId,
    this: Value,
    args: &[Value],
) -> JsResult<Value> {
    if agent.call_depth >= agent.max_call_depth {
        return Err(agent.throw_error(ErrorKind::Range, "maximum call stack size exceeded"));
    }
    agent.call_depth += 1;
    let result = call_dispatch(agent, func, this, args);
    agent.call_depth -= 1;
    result
}

fn call_dispatch(agent: &mut Agent, func: ObjectId, this: Value, args: &[Value]) -> JsResult<Value> {
    match &agent.heap.object(func).data {
        ObjectData::BoundFunction(bound) => {
            let target = bound.target;
            let bound_this = bound.bound_this;
            let mut all_args = bound.bound_args.clone();
            all_args.extend_from_slice(args);
            call_function(agent, target, bound_this, &all_args)
        }
        ObjectData::Proxy(_) => crate::exotics::proxy::proxy_call(agent, func, this, args),
        ObjectData::Builtin(data) => {
            let behaviour = data.behaviour;
            let realm = data.realm;
            let global_env = agent.realm(realm).global_env;
            agent.push_context(
                ExecutionContext {
                    function: Some(func),
                    realm,
                    script_or_module: None,
                    lexical_env: global_env,
                    variable_env: global_env,
                    private_env: None,
                    function_name: builtin_name(agent, func),
                    call_span: Span::ZERO,
                },
                "builtin",
            );
            let result = behaviour(agent, this, args, None, func);
            agent.pop_context();
            result
        }
        ObjectData::Function(_) => ordinary_call(agent, func, this, args, None),
        _ => Err(EngineError::internal("call on a non-callable object")),
    }
}

fn builtin_name(agent: &Agent, func: ObjectId) -> Option<Box<str>> {
    match agent.heap.object(func).entry(PropertyKey::String(agent.heap.statics.name)) {
        Some(PropertyEntry::Data { value: Value::String(s), .. }) => {
            Some(agent.heap.string(*s).to_rust_string().into_boxed_str())
        }
        _ => None,
    }
}

struct PreparedCall {
    func_node: FunctionNode,
    data_source: SourceId,
    node: NodeId,
    kind: FunctionKind,
    strict: bool,
}

/// `PrepareForOrdinaryCall` + `OrdinaryCallBindThis` +
/// `FunctionDeclarationInstantiation`, leaving the callee context pushed.
fn prepare_ordinary_call(
    agent: &mut Agent,
    func: ObjectId,
    this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    uninitialized_this: bool,
) -> JsResult<PreparedCall> {
    let (source, node, env_outer, private_env, this_mode, strict, kind, realm, script_or_module) = {
        let ObjectData::Function(data) = &agent.heap.object(func).data else {
            return Err(EngineError::internal("ordinary call on a non-function"));
        };
        (
            data.source,
            data.node,
            data.environment,
            data.private_environment,
            data.this_mode,
            data.strict,
            data.kind,
            data.realm,
            match agent.source(data.source).kind {
                SourceKind::Script => ScriptOrModule::Script(data.source),
                SourceKind::Module => agent
                    .modules
                    .iter()
                    .position(|m| m.source == data.source)
                    .map_or(ScriptOrModule::Script(data.source), |i| {
                        ScriptOrModule::Module(crate::module::ModuleId::new(i))
                    }),
            },
        )
    };
    let ast = Rc::clone(&agent.source(source).ast);
    let Node::Function(func_node) = ast.node(node) else {
        return Err(EngineError::internal("function object without a function node"));
    };
    let func_node = (**func_node).clone();

    let this_status = if this_mode == ThisMode::Lexical {
        ThisBindingStatus::Lexical
    } else if uninitialized_this {
        ThisBindingStatus::Uninitialized
    } else {
        ThisBindingStatus::Initialized
    };
    let env = environments::new_function_environment(
        &mut agent.heap,
        func,
        this_status,
        new_target,
        Some(env_outer),
    );
    let function_name = func_node.name.clone();
    agent.push_context(
        ExecutionContext {
            function: Some(func),
            realm,
            script_or_module: Some(script_or_module),
            lexical_env: env,
            variable_env: env,
            private_env,
            function_name,
            call_span: agent.source(source).ast.span(node),
        },
        "function",
    );

    // OrdinaryCallBindThis and FunctionDeclarationInstantiation can throw
    // (sloppy this coercion, parameter defaults); the callee context must
    // not leak when they do.
    let setup = (|agent: &mut Agent| -> JsResult<()> {
        if this_mode != ThisMode::Lexical && !uninitialized_this {
            let this_value = match this_mode {
                ThisMode::Strict => this,
                _ => {
                    if this.is_nullish() {
                        Value::Object(agent.realm(realm).global_object)
                    } else {
                        Value::Object(crate::conversion::to_object(agent, this)?)
                    }
                }
            };
            environments::bind_this_value(agent, env, this_value)?;
        }
        function_declaration_instantiation(agent, func, source, &func_node, args, strict)
    })(agent);
    if let Err(e) = setup {
        agent.pop_context();
        return Err(e);
    }
    Ok(PreparedCall { func_node, data_source: source, node, kind, strict })
}

/// `OrdinaryCallEvaluateBody` and friends for every function kind.
fn ordinary_call(
    agent: &mut Agent,
    func: ObjectId,
    this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
) -> JsResult<Value> {
    let is_class_ctor = match &agent.heap.object(func).data {
        ObjectData::Function(data) => data.is_class_constructor,
        _ => false,
    };
    if is_class_ctor && new_target.is_none() {
        return Err(agent.throw_error(ErrorKind::Type, "class constructor cannot be invoked without new"));
    }
    let prepared = match prepare_ordinary_call(agent, func, this, args, new_target, false) {
        Ok(p) => p,
        Err(e) => return Err(e),
    };
    let result = run_prepared_body(agent, func, prepared);
    agent.pop_context();
    result
}

fn run_prepared_body(agent: &mut Agent, func: ObjectId, prepared: PreparedCall) -> JsResult<Value> {
    match prepared.kind {
        FunctionKind::Normal => {
            let mut machine = body_machine(agent, &prepared)?;
            match machine.run(agent, Resume::Start)? {
                MachineResult::Done(Completion::Return(v)) => Ok(v),
                MachineResult::Done(Completion::Normal(_)) => Ok(Value::Undefined),
                MachineResult::Done(Completion::Throw(t)) => Err(EngineError::Throw(t)),
                MachineResult::Done(_) => Err(EngineError::internal("loop completion escaped a function body")),
                MachineResult::Suspended(_) => {
                    Err(EngineError::internal("synchronous function suspended"))
                }
            }
        }
        FunctionKind::Generator => {
            let machine = body_machine(agent, &prepared)?;
            coroutines::make_generator(agent, func, machine)
        }
        FunctionKind::AsyncGenerator => {
            let machine = body_machine(agent, &prepared)?;
            coroutines::make_async_generator(agent, func, machine)
        }
        FunctionKind::Async => {
            let machine = body_machine(agent, &prepared)?;
            coroutines::start_async_function(agent, machine)
        }
    }
}

/// Builds the machine for a function body. Expression-bodied arrows get an
/// implicit return inside the body step.
fn body_machine(agent: &mut Agent, prepared: &PreparedCall) -> JsResult<Machine> {
    let mut machine = Machine::new(agent, prepared.data_source, prepared.node, prepared.strict);
    machine.frames.clear();
    machine.frames.push(Frame::function_body(prepared.node));
    Ok(machine)
}

/// `Construct(F, argumentsList, newTarget)`.
pub(crate) fn construct(
    agent: &mut Agent,
    func: ObjectId,
    args: &[Value],
    new_target: ObjectId,
) -> JsResult<ObjectId> {
    if agent.call_depth >= agent.max_call_depth {
        return Err(agent.throw_error(ErrorKind::Range, "maximum call stack size exceeded"));
    }
    agent.call_depth += 1;
    let result = construct_dispatch(agent, func, args, new_target);
    agent.call_depth -= 1;
    result
}

fn construct_dispatch(
    agent: &mut Agent,
    func: ObjectId,
    args: &[Value],
    new_target: ObjectId,
) -> JsResult<ObjectId> {
    match &agent.heap.object(func).data {
        ObjectData::BoundFunction(bound) => {
            let target = bound.target;
            let mut all_args = bound.bound_args.clone();
            all_args.extend_from_slice(args);
            let new_target = if new_target == func { target } else { new_target };
            construct(agent, target, &all_args, new_target)
        }
        ObjectData::Proxy(_) => crate::exotics::proxy::proxy_construct(agent, func, args, new_target),
        ObjectData::Builtin(data) => {
            let behaviour = data.behaviour;
            let realm = data.realm;
            let global_env = agent.realm(realm).global_env;
            agent.push_context(
                ExecutionContext {
                    function: Some(func),
                    realm,
                    script_or_module: None,
                    lexical_env: global_env,
                    variable_env: global_env,
                    private_env: None,
                    function_name: builtin_name(agent, func),
                    call_span: Span::ZERO,
                },
                "builtin-construct",
            );
            let result = behaviour(agent, Value::Undefined, args, Some(new_target), func);
            agent.pop_context();
            match result? {
                Value::Object(id) => Ok(id),
                _ => Err(agent.throw_error(ErrorKind::Type, "constructor did not return an object")),
            }
        }
        ObjectData::Function(data) => {
            let derived = data.constructor_kind == ConstructorKind::Derived;
            ordinary_construct(agent, func, args, new_target, derived)
        }
        _ => Err(EngineError::internal("construct on a non-constructor")),
    }
}

fn ordinary_construct(
    agent: &mut Agent,
    func: ObjectId,
    args: &[Value],
    new_target: ObjectId,
    derived: bool,
) -> JsResult<ObjectId> {
    let this = if derived {
        None
    } else {
        let proto = prototype_from_constructor(agent, new_target, |i| i.object_prototype)?;
        let realm = agent.current_realm_id();
        let this = agent
            .heap
            .alloc_object(ObjectRecord::new(Some(proto), ObjectData::Ordinary, realm));
        Some(this)
    };

    let prepared = prepare_ordinary_call(
        agent,
        func,
        this.map_or(Value::Undefined, Value::Object),
        args,
        Some(new_target),
        derived,
    )?;
    if let Some(this) = this
        && let Err(e) = initialize_instance_elements(agent, this, func)
    {
        agent.pop_context();
        return Err(e);
    }
    let env = agent.running_context().lexical_env;
    let result = (|| -> JsResult<ObjectId> {
        let mut machine = body_machine(agent, &prepared)?;
        match machine.run(agent, Resume::Start)? {
            MachineResult::Done(Completion::Return(Value::Object(obj))) => Ok(obj),
            MachineResult::Done(Completion::Return(other)) => {
                if let Some(this) = this {
                    return Ok(this);
                }
                if other == Value::Undefined {
                    let this = environments::get_this_binding(agent, env)?;
                    match this {
                        Value::Object(id) => Ok(id),
                        _ => Err(EngineError::internal("constructor this is not an object")),
                    }
                } else {
                    Err(agent.throw_error(
                        ErrorKind::Type,
                        "derived constructor returned a non-object value",
                    ))
                }
            }
            MachineResult::Done(Completion::Normal(_)) => {
                if let Some(this) = this {
                    return Ok(this);
                }
                let this = environments::get_this_binding(agent, env)?;
                match this {
                    Value::Object(id) => Ok(id),
                    _ => Err(EngineError::internal("constructor this is not an object")),
                }
            }
            MachineResult::Done(Completion::Throw(t)) => Err(EngineError::Throw(t)),
            MachineResult::Done(_) => Err(EngineError::internal("loop completion escaped a constructor")),
            MachineResult::Suspended(_) => Err(EngineError::internal("constructor suspended")),
        }
    })();
    agent.pop_context();
    result
}

/// Reads `newTarget.prototype`, falling back to a realm intrinsic.
pub(crate) fn prototype_from_constructor(
    agent: &mut Agent,
    constructor: ObjectId,
    fallback: fn(&crate::realm::Intrinsics) -> ObjectId,
) -> JsResult<ObjectId> {
    let proto_key = PropertyKey::String(agent.heap.statics.prototype);
    let proto = crate::operations::get(agent, constructor, proto_key)?;
    match proto {
        Value::Object(id) => Ok(id),
        _ => {
            let realm = agent.heap.object(constructor).realm;
            Ok(fallback(&agent.realm(realm).intrinsics))
        }
    }
}

/// `InitializeInstanceElements(O, constructor)`: install shared private
/// methods and run field initializers in definition order.
pub(crate) fn initialize_instance_elements(
    agent: &mut Agent,
    this: ObjectId,
    constructor: ObjectId,
) -> JsResult<()> {
    let (methods, fields, source, env, strict) = {
        let ObjectData::Function(data) = &agent.heap.object(constructor).data else {
            return Ok(());
        };
        (
            data.private_methods.clone(),
            data.fields.clone(),
            data.source,
            data.environment,
            data.strict,
        )
    };
    // Methods and accessors are shared records: no closure is cloned per
    // instance, only the element entry.
    for method in methods {
        agent.heap.object_mut(this).private_elements.push(method);
    }
    for field in fields {
        let value = match field.initializer {
            None => Value::Undefined,
            Some(node) => {
                // Initializers see `this` as the fresh instance.
                let init_env = environments::new_function_environment(
                    &mut agent.heap,
                    constructor,
                    ThisBindingStatus::Initialized,
                    None,
                    Some(env),
                );
                environments::bind_this_value(agent, init_env, Value::Object(this))?;
                let realm = agent.heap.object(constructor).realm;
                agent.push_context(
                    ExecutionContext {
                        function: Some(constructor),
                        realm,
                        script_or_module: agent.running_context().script_or_module,
                        lexical_env: init_env,
                        variable_env: init_env,
                        private_env: match &agent.heap.object(constructor).data {
                            ObjectData::Function(d) => d.private_environment,
                            _ => None,
                        },
                        function_name: None,
                        call_span: Span::ZERO,
                    },
                    "field-initializer",
                );
                let result = evaluate_expression(agent, source, node, strict);
                agent.pop_context();
                result?
            }
        };
        match field.key {
            FieldKey::Property(key) => {
                crate::operations::create_data_property_or_throw(agent, this, key, value)?;
            }
            FieldKey::Private(name) => {
                agent
                    .heap
                    .object_mut(this)
                    .private_elements
                    .push(PrivateElement::Field { key: name, value });
            }
        }
    }
    Ok(())
}

// --- declaration instantiation ---

/// `FunctionDeclarationInstantiation`: parameters (with defaults and rest),
/// the arguments object, var/function hoisting, and lexical declarations.
fn function_declaration_instantiation(
    agent: &mut Agent,
    func: ObjectId,
    source: SourceId,
    func_node: &FunctionNode,
    args: &[Value],
    strict: bool,
) -> JsResult<()> {
    let env = agent.running_context().lexical_env;
    let ast = Rc::clone(&agent.source(source).ast);

    // Parameter bindings.
    let mut param_names: Vec<StringId> = Vec::new();
    for param in &func_node.params {
        let name = agent.heap.intern_str(&param.name);
        if !param_names.contains(&name) {
            environments::create_mutable_binding(agent, env, name, false)?;
        }
        param_names.push(name);
    }

    // The arguments object, unless shadowed or in an arrow.
    let wants_arguments =
        !func_node.is_arrow && !func_node.params.iter().any(|p| p.name.as_ref() == "arguments");
    if wants_arguments {
        let simple = func_node.is_simple_parameter_list();
        let args_object = if !strict && simple {
            let formals: Vec<StringId> = param_names.clone();
            arguments::create_mapped_arguments_object(agent, func, &formals, args, env)
        } else {
            arguments::create_unmapped_arguments_object(agent, args)
        };
        let arguments_name = agent.heap.statics.arguments;
        if strict {
            environments::create_immutable_binding(agent, env, arguments_name, false)?;
        } else {
            environments::create_mutable_binding(agent, env, arguments_name, false)?;
        }
        environments::initialize_binding(agent, env, arguments_name, Value::Object(args_object))?;
    }

    // Bind parameter values, evaluating defaults as needed.
    for (i, param) in func_node.params.iter().enumerate() {
        let name = agent.heap.intern_str(&param.name);
        let value = if param.rest {
            let rest: Vec<Value> = args.iter().skip(i).copied().collect();
            let array = crate::exotics::array::create_array_from_list(agent, &rest)?;
            Value::Object(array)
        } else {
            match args.get(i).copied() {
                Some(v) if v != Value::Undefined => v,
                _ => match param.default {
                    Some(default) => evaluate_expression(agent, source, default, strict)?,
                    None => Value::Undefined,
                },
            }
        };
        environments::initialize_binding(agent, env, name, value)?;
    }

    // var hoisting.
    for name in ast.var_declared_names(&func_node.body) {
        let name = agent.heap.intern_str(name);
        if param_names.contains(&name) {
            continue;
        }
        if !environments::has_binding(agent, env, name)? {
            environments::create_mutable_binding(agent, env, name, false)?;
            environments::initialize_binding(agent, env, name, Value::Undefined)?;
        }
    }

    // Lexical declarations.
    instantiate_lexical_declarations(agent, &ast, &func_node.body, env, strict)?;

    // Hoisted function declarations.
    for decl in ast.function_declarations(&func_node.body) {
        let Node::Function(inner) = ast.node(decl) else { continue };
        let name = inner.name.clone().unwrap_or_default();
        let fo = instantiate_function(agent, source, decl, inner, strict, None, false, None);
        let name_id = agent.heap.intern_str(&name);
        if !environments::has_binding(agent, env, name_id)? {
            environments::create_mutable_binding(agent, env, name_id, false)?;
        }
        environments::initialize_binding(agent, env, name_id, Value::Object(fo))?;
    }
    Ok(())
}

/// Creates the uninitialized let/const/class bindings of a statement list.
pub(crate) fn instantiate_lexical_declarations(
    agent: &mut Agent,
    ast: &Ast,
    body: &[NodeId],
    env: EnvId,
    strict: bool,
) -> JsResult<()> {
    for &decl in ast.lexically_scoped_declarations(body) {
        let is_const = matches!(
            ast.node(decl),
            Node::VarDecl { kind: crate::ast::DeclKind::Const, .. }
        ) || matches!(ast.node(decl), Node::ExportDecl(inner)
            if matches!(ast.node(*inner), Node::VarDecl { kind: crate::ast::DeclKind::Const, .. }));
        for name in ast.bound_names(decl) {
            let name = agent.heap.intern_str(name);
            if is_const {
                environments::create_immutable_binding(agent, env, name, strict)?;
            } else {
                environments::create_mutable_binding(agent, env, name, false)?;
            }
        }
    }
    Ok(())
}

// --- script evaluation ---

/// `GlobalDeclarationInstantiation` + the top-level machine run.
pub(crate) fn script_evaluation(agent: &mut Agent, script: SourceId) -> Result<Value, EngineError> {
    let (realm, root, strict, ast) = {
        let record = agent.source(script);
        let Node::Script { strict, .. } = record.ast.node(record.root) else {
            return Err(EngineError::internal("script source without a Script root"));
        };
        (record.realm, record.root, *strict, Rc::clone(&record.ast))
    };
    let global_env = agent.realm(realm).global_env;
    agent.push_context(
        ExecutionContext {
            function: None,
            realm,
            script_or_module: Some(ScriptOrModule::Script(script)),
            lexical_env: global_env,
            variable_env: global_env,
            private_env: None,
            function_name: None,
            call_span: Span::ZERO,
        },
        "script",
    );

    let result = (|| -> Result<Value, EngineError> {
        let Node::Script { body, .. } = ast.node(root) else { unreachable!() };
        global_declaration_instantiation(agent, script, &ast, body, global_env, strict)?;

        let mut machine = Machine::new(agent, script, root, strict);
        match machine.run(agent, Resume::Start)? {
            MachineResult::Done(Completion::Normal(v)) => Ok(v.unwrap_or(Value::Undefined)),
            MachineResult::Done(Completion::Throw(t)) => Err(EngineError::Throw(t)),
            MachineResult::Done(_) => Err(EngineError::internal("loop completion escaped a script")),
            MachineResult::Suspended(_) => Err(EngineError::internal("script suspended at toplevel")),
        }
    })();
    agent.pop_context();
    result
}

fn global_declaration_instantiation(
    agent: &mut Agent,
    script: SourceId,
    ast: &Ast,
    body: &[NodeId],
    env: EnvId,
    strict: bool,
) -> JsResult<()> {
    // Lexical names clash-check against existing var names, then declare.
    for name in ast.lexically_declared_names(body) {
        let name_id = agent.heap.intern_str(name);
        if environments::global_has_lexical_declaration(&agent.heap, env, name_id) {
            return Err(agent.throw_error(
                ErrorKind::Syntax,
                format!("identifier '{name}' has already been declared"),
            ));
        }
    }
    instantiate_lexical_declarations(agent, ast, body, env, strict)?;

    for decl in ast.function_declarations(body) {
        let Node::Function(inner) = ast.node(decl) else { continue };
        let Some(name) = inner.name.clone() else { continue };
        let name_id = agent.heap.intern_str(&name);
        if !environments::can_declare_global_function(agent, env, name_id)? {
            return Err(agent.throw_error(
                ErrorKind::Type,
                format!("cannot declare global function '{name}'"),
            ));
        }
        let fo = instantiate_function(agent, script, decl, inner, strict, None, false, None);
        environments::create_global_function_binding(agent, env, name_id, Value::Object(fo))?;
    }

    for name in ast.var_declared_names(body) {
        let name_id = agent.heap.intern_str(name);
        if environments::can_declare_global_var(agent, env, name_id)? {
            environments::create_global_var_binding(agent, env, name_id)?;
        }
    }
    Ok(())
}

/// `ResolveBinding(name)` against the running lexical environment.
pub(crate) fn resolve_binding(agent: &mut Agent, name: &str, strict: bool) -> JsResult<Reference> {
    let name_id = agent.heap.intern_str(name);
    let env = agent.running_context().lexical_env;
    let resolved = environments::resolve_binding_env(agent, Some(env), name_id)?;
    Ok(Reference {
        base: match resolved {
            Some(env) => crate::reference::ReferenceBase::Environment(env),
            None => crate::reference::ReferenceBase::Unresolvable,
        },
        name: crate::reference::ReferencedName::Key(PropertyKey::String(name_id)),
        strict,
        this_value: None,
    })
}

/// Converts an operation result into a completion, keeping internal
/// failures on the error channel.
pub(crate) fn outcome(result: JsResult<Value>) -> JsResult<Completion> {
    match result {
        Ok(value) => Ok(Completion::normal(value)),
        Err(EngineError::Throw(t)) => Ok(Completion::Throw(t)),
        Err(internal) => Err(internal),
    }
}

/// Materializes a thrown value completion, capturing the call-site trace.
pub(crate) fn throw_value(agent: &mut Agent, value: Value) -> Completion {
    Completion::Throw(ThrowCompletion { value, stack: agent.capture_stack() })
}
