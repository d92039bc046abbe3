//! Promises: capabilities, resolving functions with their already-resolved
//! latches, reaction records, the reaction and thenable jobs, and the
//! `Promise` constructor surface.
//!
//! Resolution never invokes reactions inline; everything goes through the
//! `PromiseJobs` queue, which the agent drains after each top-level entry
//! point.

use crate::{
    agent::{Agent, Job, QueueName, RejectionOperation},
    completion::{EngineError, JsResult},
    heap::{Mark, MarkQueue},
    interpreter::coroutines::{resume_await_target, TaskRef},
    intrinsics::{
        bootstrap_constructor, bootstrap_prototype, define_method, error::ErrorKind, RealmSeed,
    },
    iteration,
    object::{ObjectData, ObjectRecord, PropertyKey},
    operations::{call, get_v, is_callable},
    value::{ObjectId, Value},
};

/// Per-instance payload carried by builtins that close over state.
#[derive(Debug, Clone)]
pub(crate) enum PromisePayload {
    None,
    /// A resolving function; `latch` indexes the shared already-resolved
    /// flag of its pair.
    Resolve { promise: ObjectId, latch: usize },
    Reject { promise: ObjectId, latch: usize },
    /// A `Promise.all` element function.
    AllElement { record: usize, index: usize },
    /// A `finally` wrapper: run the callback, then pass the value through
    /// (or rethrow the reason).
    Finally { callback: Value, rethrow: bool },
}

impl Mark for PromisePayload {
    fn mark(&self, queue: &mut MarkQueue) {
        match self {
            Self::None | Self::AllElement { .. } => {}
            Self::Resolve { promise, .. } | Self::Reject { promise, .. } => queue.push_object(*promise),
            Self::Finally { callback, .. } => callback.mark(queue),
        }
    }
}

#[derive(Debug)]
pub(crate) enum PromiseState {
    Pending {
        fulfill_reactions: Vec<PromiseReaction>,
        reject_reactions: Vec<PromiseReaction>,
    },
    Fulfilled(Value),
    Rejected(Value),
}

/// The slots of a promise object.
#[derive(Debug)]
pub(crate) struct PromiseData {
    pub state: PromiseState,
    pub is_handled: bool,
}

impl Mark for PromiseData {
    fn mark(&self, queue: &mut MarkQueue) {
        match &self.state {
            PromiseState::Pending { fulfill_reactions, reject_reactions } => {
                for r in fulfill_reactions.iter().chain(reject_reactions) {
                    r.mark(queue);
                }
            }
            PromiseState::Fulfilled(v) | PromiseState::Rejected(v) => v.mark(queue),
        }
    }
}

/// A promise capability: the promise plus its resolving functions.
#[derive(Debug, Clone)]
pub(crate) struct PromiseCapability {
    pub promise: ObjectId,
    pub resolve: Value,
    pub reject: Value,
}

impl Mark for PromiseCapability {
    fn mark(&self, queue: &mut MarkQueue) {
        queue.push_object(self.promise);
        self.resolve.mark(queue);
        self.reject.mark(queue);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReactionKind {
    Fulfill,
    Reject,
}

#[derive(Debug, Clone)]
pub(crate) enum ReactionHandler {
    /// Absent handler: identity for fulfill, rethrow for reject.
    Empty,
    Callable(Value),
    /// Resume a suspended coroutine with the settlement.
    AwaitResume(TaskRef),
}

#[derive(Debug, Clone)]
pub(crate) struct PromiseReaction {
    pub capability: Option<PromiseCapability>,
    pub kind: ReactionKind,
    pub handler: ReactionHandler,
}

impl Mark for PromiseReaction {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(c) = &self.capability {
            c.mark(queue);
        }
        match &self.handler {
            ReactionHandler::Callable(v) => v.mark(queue),
            ReactionHandler::Empty => {}
            ReactionHandler::AwaitResume(TaskRef::AsyncGenerator(id)) => queue.push_object(*id),
            ReactionHandler::AwaitResume(TaskRef::Async(_)) => {}
        }
    }
}

/// Shared bookkeeping for one `Promise.all` run.
#[derive(Debug)]
pub(crate) struct PromiseAllRecord {
    pub values: Vec<Value>,
    pub remaining: usize,
    pub capability: PromiseCapability,
}

// --- creation ---

/// A fresh pending promise with `%Promise.prototype%`.
pub(crate) fn create_promise(agent: &mut Agent) -> ObjectId {
    let prototype = agent.intrinsics().promise_prototype;
    let realm = agent.current_realm_id();
    agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::Promise(Box::new(PromiseData {
            state: PromiseState::Pending {
                fulfill_reactions: Vec::new(),
                reject_reactions: Vec::new(),
            },
            is_handled: false,
        })),
        realm,
    ))
}

/// A builtin function created outside realm bootstrap, carrying payload.
fn runtime_builtin(
    agent: &mut Agent,
    behaviour: crate::function::NativeFn,
    length: u32,
    payload: PromisePayload,
) -> ObjectId {
    let realm = agent.current_realm_id();
    let prototype = agent.intrinsics().function_prototype;
    let id = agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::Builtin(Box::new(crate::function::BuiltinData {
            behaviour,
            constructor: false,
            payload,
            realm,
        })),
        realm,
    ));
    let length_key = PropertyKey::String(agent.heap.statics.length);
    crate::intrinsics::define_data(agent, id, length_key, Value::Number(f64::from(length)));
    id
}

/// `CreateResolvingFunctions(promise)`: a resolve/reject pair sharing one
/// already-resolved latch.
pub(crate) fn create_resolving_functions(agent: &mut Agent, promise: ObjectId) -> (Value, Value) {
    let latch = agent.resolve_latches.len();
    agent.resolve_latches.push(false);
    let resolve = runtime_builtin(agent, resolve_function, 1, PromisePayload::Resolve { promise, latch });
    let reject = runtime_builtin(agent, reject_function, 1, PromisePayload::Reject { promise, latch });
    (Value::Object(resolve), Value::Object(reject))
}

/// `NewPromiseCapability` over the host `%Promise%`.
pub(crate) fn new_promise_capability(agent: &mut Agent) -> PromiseCapability {
    let promise = create_promise(agent);
    let (resolve, reject) = create_resolving_functions(agent, promise);
    PromiseCapability { promise, resolve, reject }
}

fn payload_of(agent: &Agent, func: ObjectId) -> PromisePayload {
    match &agent.heap.object(func).data {
        ObjectData::Builtin(b) => b.payload.clone(),
        _ => PromisePayload::None,
    }
}

fn resolve_function(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    let PromisePayload::Resolve { promise, latch } = payload_of(agent, func) else {
        return Err(EngineError::internal("resolve function without payload"));
    };
    if std::mem::replace(&mut agent.resolve_latches[latch], true) {
        return Ok(Value::Undefined);
    }
    resolve_promise(agent, promise, args.first().copied().unwrap_or(Value::Undefined))?;
    Ok(Value::Undefined)
}

fn reject_function(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    let PromisePayload::Reject { promise, latch } = payload_of(agent, func) else {
        return Err(EngineError::internal("reject function without payload"));
    };
    if std::mem::replace(&mut agent.resolve_latches[latch], true) {
        return Ok(Value::Undefined);
    }
    reject_promise(agent, promise, args.first().copied().unwrap_or(Value::Undefined));
    Ok(Value::Undefined)
}

// --- settlement ---

fn take_reactions(agent: &mut Agent, promise: ObjectId, settled: PromiseState) -> Vec<PromiseReaction> {
    let ObjectData::Promise(data) = &mut agent.heap.object_mut(promise).data else {
        return Vec::new();
    };
    let previous = std::mem::replace(&mut data.state, settled);
    match previous {
        PromiseState::Pending { fulfill_reactions, reject_reactions } => {
            if matches!(data.state, PromiseState::Fulfilled(_)) {
                fulfill_reactions
            } else {
                reject_reactions
            }
        }
        // Settling twice is prevented by the latches; nothing to run.
        _ => Vec::new(),
    }
}

pub(crate) fn fulfill_promise(agent: &mut Agent, promise: ObjectId, value: Value) {
    let reactions = take_reactions(agent, promise, PromiseState::Fulfilled(value));
    for reaction in reactions {
        agent.enqueue_job(QueueName::PromiseJobs, Job::PromiseReaction { reaction, argument: value });
    }
}

pub(crate) fn reject_promise(agent: &mut Agent, promise: ObjectId, reason: Value) {
    let reactions = take_reactions(agent, promise, PromiseState::Rejected(reason));
    let handled = match &agent.heap.object(promise).data {
        ObjectData::Promise(data) => data.is_handled,
        _ => true,
    };
    if !handled {
        let hooks = std::rc::Rc::clone(&agent.hooks);
        hooks.promise_rejection_tracker(agent, Value::Object(promise), RejectionOperation::Reject);
    }
    for reaction in reactions {
        agent.enqueue_job(QueueName::PromiseJobs, Job::PromiseReaction { reaction, argument: reason });
    }
}

/// The body of a resolve function: thenables defer through a job, plain
/// values fulfill.
pub(crate) fn resolve_promise(agent: &mut Agent, promise: ObjectId, resolution: Value) -> JsResult<()> {
    if resolution == Value::Object(promise) {
        let error = agent.throw_error(ErrorKind::Type, "cannot resolve a promise with itself");
        let reason = error.thrown_value().unwrap_or(Value::Undefined);
        reject_promise(agent, promise, reason);
        return Ok(());
    }
    let Value::Object(_) = resolution else {
        fulfill_promise(agent, promise, resolution);
        return Ok(());
    };
    let then = match get_v(agent, resolution, PropertyKey::String(agent.heap.statics.then)) {
        Ok(then) => then,
        Err(EngineError::Throw(t)) => {
            reject_promise(agent, promise, t.value);
            return Ok(());
        }
        Err(internal) => return Err(internal),
    };
    if !is_callable(&agent.heap, then) {
        fulfill_promise(agent, promise, resolution);
        return Ok(());
    }
    agent.enqueue_job(
        QueueName::PromiseJobs,
        Job::ResolveThenable { promise, thenable: resolution, then },
    );
    Ok(())
}

// --- jobs ---

/// `NewPromiseReactionJob` execution.
pub(crate) fn run_reaction_job(
    agent: &mut Agent,
    reaction: PromiseReaction,
    argument: Value,
) -> Result<(), EngineError> {
    let handler_result: JsResult<Value> = match &reaction.handler {
        ReactionHandler::Empty => match reaction.kind {
            ReactionKind::Fulfill => Ok(argument),
            ReactionKind::Reject => Err(EngineError::Throw(crate::completion::ThrowCompletion::new(argument))),
        },
        ReactionHandler::Callable(handler) => call(agent, *handler, Value::Undefined, &[argument]),
        ReactionHandler::AwaitResume(task) => {
            let completion = match reaction.kind {
                ReactionKind::Fulfill => crate::completion::Completion::normal(argument),
                ReactionKind::Reject => crate::completion::Completion::Throw(
                    crate::completion::ThrowCompletion::new(argument),
                ),
            };
            resume_await_target(agent, *task, completion)?;
            return Ok(());
        }
    };
    let Some(capability) = reaction.capability else {
        return match handler_result {
            Err(e @ EngineError::Internal(_)) => Err(e),
            _ => Ok(()),
        };
    };
    match handler_result {
        Ok(value) => {
            call(agent, capability.resolve, Value::Undefined, &[value])?;
        }
        Err(EngineError::Throw(t)) => {
            call(agent, capability.reject, Value::Undefined, &[t.value])?;
        }
        Err(internal) => return Err(internal),
    }
    Ok(())
}

/// `NewPromiseResolveThenableJob` execution.
pub(crate) fn run_resolve_thenable_job(
    agent: &mut Agent,
    promise: ObjectId,
    thenable: Value,
    then: Value,
) -> Result<(), EngineError> {
    let (resolve, reject) = create_resolving_functions(agent, promise);
    match call(agent, then, thenable, &[resolve, reject]) {
        Ok(_) => Ok(()),
        Err(EngineError::Throw(t)) => {
            call(agent, reject, Value::Undefined, &[t.value])?;
            Ok(())
        }
        Err(internal) => Err(internal),
    }
}

// --- operations used by await and the constructor surface ---

/// `PromiseResolve(%Promise%, x)`.
pub(crate) fn promise_resolve(agent: &mut Agent, value: Value) -> JsResult<ObjectId> {
    if let Value::Object(id) = value
        && matches!(agent.heap.object(id).data, ObjectData::Promise(_))
    {
        return Ok(id);
    }
    let capability = new_promise_capability(agent);
    call(agent, capability.resolve, Value::Undefined, &[value])?;
    Ok(capability.promise)
}

/// `PerformPromiseThen`.
pub(crate) fn perform_promise_then(
    agent: &mut Agent,
    promise: ObjectId,
    on_fulfilled: ReactionHandler,
    on_rejected: ReactionHandler,
    capability: Option<PromiseCapability>,
) -> Value {
    let fulfill = PromiseReaction {
        capability: capability.clone(),
        kind: ReactionKind::Fulfill,
        handler: on_fulfilled,
    };
    let reject = PromiseReaction {
        capability: capability.clone(),
        kind: ReactionKind::Reject,
        handler: on_rejected,
    };
    enum Settled {
        No,
        Fulfilled(Value),
        Rejected(Value, bool),
    }
    let settled = {
        let ObjectData::Promise(data) = &mut agent.heap.object_mut(promise).data else {
            return Value::Undefined;
        };
        match &mut data.state {
            PromiseState::Pending { fulfill_reactions, reject_reactions } => {
                fulfill_reactions.push(fulfill.clone());
                reject_reactions.push(reject.clone());
                data.is_handled = true;
                Settled::No
            }
            PromiseState::Fulfilled(v) => {
                let v = *v;
                data.is_handled = true;
                Settled::Fulfilled(v)
            }
            PromiseState::Rejected(r) => {
                let r = *r;
                let was_handled = data.is_handled;
                data.is_handled = true;
                Settled::Rejected(r, was_handled)
            }
        }
    };
    match settled {
        Settled::No => {}
        Settled::Fulfilled(v) => {
            agent.enqueue_job(QueueName::PromiseJobs, Job::PromiseReaction { reaction: fulfill, argument: v });
        }
        Settled::Rejected(r, was_handled) => {
            if !was_handled {
                let hooks = std::rc::Rc::clone(&agent.hooks);
                hooks.promise_rejection_tracker(agent, Value::Object(promise), RejectionOperation::Handle);
            }
            agent.enqueue_job(QueueName::PromiseJobs, Job::PromiseReaction { reaction: reject, argument: r });
        }
    }
    capability.map_or(Value::Undefined, |c| Value::Object(c.promise))
}

// --- constructor surface ---

fn promise_constructor(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    if new_target.is_none() {
        return Err(agent.throw_error(ErrorKind::Type, "Promise constructor requires new"));
    }
    let executor = args.first().copied().unwrap_or(Value::Undefined);
    if !is_callable(&agent.heap, executor) {
        return Err(agent.throw_error(ErrorKind::Type, "Promise executor must be callable"));
    }
    let promise = create_promise(agent);
    let (resolve, reject) = create_resolving_functions(agent, promise);
    match call(agent, executor, Value::Undefined, &[resolve, reject]) {
        Ok(_) => {}
        Err(EngineError::Throw(t)) => {
            call(agent, reject, Value::Undefined, &[t.value])?;
        }
        Err(internal) => return Err(internal),
    }
    Ok(Value::Object(promise))
}

fn promise_static_resolve(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    Ok(Value::Object(promise_resolve(agent, value)?))
}

fn promise_static_reject(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let reason = args.first().copied().unwrap_or(Value::Undefined);
    let capability = new_promise_capability(agent);
    call(agent, capability.reject, Value::Undefined, &[reason])?;
    Ok(Value::Object(capability.promise))
}

fn all_element_function(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    let PromisePayload::AllElement { record, index } = payload_of(agent, func) else {
        return Err(EngineError::internal("Promise.all element function without payload"));
    };
    let value = args.first().copied().unwrap_or(Value::Undefined);
    let finished = {
        let rec = &mut agent.promise_all_records[record];
        rec.values[index] = value;
        rec.remaining -= 1;
        rec.remaining == 0
    };
    if finished {
        let (values, capability) = {
            let rec = &agent.promise_all_records[record];
            (rec.values.clone(), rec.capability.clone())
        };
        let array = crate::exotics::array::create_array_from_list(agent, &values)?;
        call(agent, capability.resolve, Value::Undefined, &[Value::Object(array)])?;
    }
    Ok(Value::Undefined)
}

fn promise_static_all(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let capability = new_promise_capability(agent);
    let iterable = args.first().copied().unwrap_or(Value::Undefined);
    let items = match iteration::iterable_to_list(agent, iterable) {
        Ok(items) => items,
        Err(EngineError::Throw(t)) => {
            call(agent, capability.reject, Value::Undefined, &[t.value])?;
            return Ok(Value::Object(capability.promise));
        }
        Err(internal) => return Err(internal),
    };
    let record = agent.promise_all_records.len();
    agent.promise_all_records.push(PromiseAllRecord {
        values: vec![Value::Undefined; items.len()],
        // One guard count keeps an empty iterable from resolving early.
        remaining: items.len() + 1,
        capability: capability.clone(),
    });
    for (index, item) in items.into_iter().enumerate() {
        let inner = promise_resolve(agent, item)?;
        let on_fulfilled = runtime_builtin(
            agent,
            all_element_function,
            1,
            PromisePayload::AllElement { record, index },
        );
        perform_promise_then(
            agent,
            inner,
            ReactionHandler::Callable(Value::Object(on_fulfilled)),
            ReactionHandler::Callable(capability.reject),
            None,
        );
    }
    let finished = {
        let rec = &mut agent.promise_all_records[record];
        rec.remaining -= 1;
        rec.remaining == 0
    };
    if finished {
        let values = agent.promise_all_records[record].values.clone();
        let array = crate::exotics::array::create_array_from_list(agent, &values)?;
        call(agent, capability.resolve, Value::Undefined, &[Value::Object(array)])?;
    }
    Ok(Value::Object(capability.promise))
}

fn promise_proto_then(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let Value::Object(promise) = this else {
        return Err(agent.throw_error(ErrorKind::Type, "Promise.prototype.then requires a promise"));
    };
    if !matches!(agent.heap.object(promise).data, ObjectData::Promise(_)) {
        return Err(agent.throw_error(ErrorKind::Type, "Promise.prototype.then requires a promise"));
    }
    let on_fulfilled = match args.first().copied() {
        Some(f) if is_callable(&agent.heap, f) => ReactionHandler::Callable(f),
        _ => ReactionHandler::Empty,
    };
    let on_rejected = match args.get(1).copied() {
        Some(f) if is_callable(&agent.heap, f) => ReactionHandler::Callable(f),
        _ => ReactionHandler::Empty,
    };
    let capability = new_promise_capability(agent);
    Ok(perform_promise_then(agent, promise, on_fulfilled, on_rejected, Some(capability)))
}

fn promise_proto_catch(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    let on_rejected = args.first().copied().unwrap_or(Value::Undefined);
    promise_proto_then(agent, this, &[Value::Undefined, on_rejected], new_target, func)
}

fn finally_wrapper(
    agent: &mut Agent,
    _this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    let PromisePayload::Finally { callback, rethrow } = payload_of(agent, func) else {
        return Err(EngineError::internal("finally wrapper without payload"));
    };
    call(agent, callback, Value::Undefined, &[])?;
    let value = args.first().copied().unwrap_or(Value::Undefined);
    if rethrow {
        return Err(EngineError::Throw(crate::completion::ThrowCompletion::new(value)));
    }
    Ok(value)
}

fn promise_proto_finally(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    let callback = args.first().copied().unwrap_or(Value::Undefined);
    if !is_callable(&agent.heap, callback) {
        return promise_proto_then(agent, this, &[callback, callback], new_target, func);
    }
    let on_fulfilled = runtime_builtin(
        agent,
        finally_wrapper,
        1,
        PromisePayload::Finally { callback, rethrow: false },
    );
    let on_rejected = runtime_builtin(
        agent,
        finally_wrapper,
        1,
        PromisePayload::Finally { callback, rethrow: true },
    );
    promise_proto_then(
        agent,
        this,
        &[Value::Object(on_fulfilled), Value::Object(on_rejected)],
        new_target,
        func,
    )
}

pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> (ObjectId, ObjectId) {
    let prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, prototype, "then", promise_proto_then, 2);
    define_method(agent, seed, prototype, "catch", promise_proto_catch, 1);
    define_method(agent, seed, prototype, "finally", promise_proto_finally, 1);

    let ctor = bootstrap_constructor(agent, seed, promise_constructor, "Promise", 1, prototype);
    define_method(agent, seed, ctor, "resolve", promise_static_resolve, 1);
    define_method(agent, seed, ctor, "reject", promise_static_reject, 1);
    define_method(agent, seed, ctor, "all", promise_static_all, 1);

    seed.register("%Promise%", ctor);
    seed.register("%Promise.prototype%", prototype);
    (ctor, prototype)
}
