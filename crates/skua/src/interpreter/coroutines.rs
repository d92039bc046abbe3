//! Coroutine state machines: generators, async functions and async
//! generators.
//!
//! Each coroutine owns a suspended [`Machine`] plus the execution context it
//! runs under. Resumption pushes the context, injects a completion at the
//! suspension point, and interprets the machine's next stop:
//!
//! ```text
//!       start ── Evaluate(body) ──▶ suspendedStart
//!                                       │ resume
//!                                       ▼
//!                                    executing ──┬── yield/await ──▶ suspendedYield
//!                                       │        └── return/throw ──▶ completed
//!                                       ▼
//!                                   completed
//! ```

use std::collections::VecDeque;

use crate::{
    agent::{Agent, ExecutionContext},
    completion::{Completion, EngineError, JsResult},
    heap::{Mark, MarkQueue},
    interpreter::{Machine, MachineResult, Resume, Suspension},
    intrinsics::{
        error::ErrorKind,
        promise::{
            new_promise_capability, perform_promise_then, promise_resolve, PromiseCapability,
            ReactionHandler,
        },
    },
    iteration::create_iter_result_object,
    object::{ObjectData, ObjectRecord},
    operations::call,
    value::{ObjectId, Value},
};

/// Where an await settlement should deliver its completion.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TaskRef {
    /// Index into the agent's async-task table.
    Async(usize),
    /// An async generator object mid-await.
    AsyncGenerator(ObjectId),
}

/// A suspended async function: its machine, context and result promise.
#[derive(Debug)]
pub(crate) struct AsyncTask {
    pub machine: Machine,
    pub context: ExecutionContext,
    pub capability: PromiseCapability,
}

impl Mark for AsyncTask {
    fn mark(&self, queue: &mut MarkQueue) {
        self.machine.mark(queue);
        self.context.mark(queue);
        self.capability.mark(queue);
    }
}

/// Generator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

/// The slots of a generator object.
#[derive(Debug)]
pub(crate) struct GeneratorData {
    pub state: GeneratorState,
    pub machine: Option<Machine>,
    pub context: Option<ExecutionContext>,
}

impl Mark for GeneratorData {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(machine) = &self.machine {
            machine.mark(queue);
        }
        if let Some(context) = &self.context {
            context.mark(queue);
        }
    }
}

/// One queued request against an async generator.
#[derive(Debug)]
pub(crate) struct AsyncGenRequest {
    pub completion: Completion,
    pub capability: PromiseCapability,
}

/// The slots of an async generator object.
#[derive(Debug)]
pub(crate) struct AsyncGeneratorData {
    pub state: GeneratorState,
    pub machine: Option<Machine>,
    pub context: Option<ExecutionContext>,
    pub queue: VecDeque<AsyncGenRequest>,
}

impl Mark for AsyncGeneratorData {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(machine) = &self.machine {
            machine.mark(queue);
        }
        if let Some(context) = &self.context {
            context.mark(queue);
        }
        for request in &self.queue {
            request.capability.mark(queue);
        }
    }
}

// --- creation (called at the tail of ordinary call setup, with the callee
// --- context still pushed) ---

/// Packs the prepared body machine into a fresh generator object.
pub(crate) fn make_generator(agent: &mut Agent, func: ObjectId, machine: Machine) -> JsResult<Value> {
    let prototype = crate::interpreter::prototype_from_constructor(agent, func, |i| i.generator_prototype)?;
    let context = agent.running_context().clone();
    let realm = agent.current_realm_id();
    let generator = agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::Generator(Box::new(GeneratorData {
            state: GeneratorState::SuspendedStart,
            machine: Some(machine),
            context: Some(context),
        })),
        realm,
    ));
    Ok(Value::Object(generator))
}

pub(crate) fn make_async_generator(agent: &mut Agent, func: ObjectId, machine: Machine) -> JsResult<Value> {
    let prototype =
        crate::interpreter::prototype_from_constructor(agent, func, |i| i.async_generator_prototype)?;
    let context = agent.running_context().clone();
    let realm = agent.current_realm_id();
    let generator = agent.heap.alloc_object(ObjectRecord::new(
        Some(prototype),
        ObjectData::AsyncGenerator(Box::new(AsyncGeneratorData {
            state: GeneratorState::SuspendedStart,
            machine: Some(machine),
            context: Some(context),
            queue: VecDeque::new(),
        })),
        realm,
    ));
    Ok(Value::Object(generator))
}

/// Starts an async function body: runs until completion or the first await,
/// and returns the result promise either way.
pub(crate) fn start_async_function(agent: &mut Agent, mut machine: Machine) -> JsResult<Value> {
    let capability = new_promise_capability(agent);
    let context = agent.running_context().clone();
    match machine.run(agent, Resume::Start)? {
        MachineResult::Done(completion) => {
            settle_async(agent, &capability, completion)?;
        }
        MachineResult::Suspended(Suspension::Await(value)) => {
            agent.tracer.on_suspend("async-function");
            let index = agent.async_tasks.len();
            agent
                .async_tasks
                .push(Some(AsyncTask { machine, context, capability: capability.clone() }));
            await_promise(agent, TaskRef::Async(index), value)?;
        }
        MachineResult::Suspended(Suspension::Yield(_)) => {
            return Err(EngineError::internal("yield escaped an async function"));
        }
    }
    Ok(Value::Object(capability.promise))
}

fn settle_async(
    agent: &mut Agent,
    capability: &PromiseCapability,
    completion: Completion,
) -> JsResult<()> {
    match completion {
        Completion::Return(value) => {
            call(agent, capability.resolve, Value::Undefined, &[value])?;
        }
        Completion::Normal(_) => {
            call(agent, capability.resolve, Value::Undefined, &[Value::Undefined])?;
        }
        Completion::Throw(t) => {
            call(agent, capability.reject, Value::Undefined, &[t.value])?;
        }
        _ => return Err(EngineError::internal("loop completion escaped an async body")),
    }
    Ok(())
}

/// `Await(value)`: settle through the job queue, resuming `task` with the
/// outcome.
pub(crate) fn await_promise(agent: &mut Agent, task: TaskRef, value: Value) -> JsResult<()> {
    let promise = promise_resolve(agent, value)?;
    perform_promise_then(
        agent,
        promise,
        ReactionHandler::AwaitResume(task),
        ReactionHandler::AwaitResume(task),
        None,
    );
    Ok(())
}

/// Reaction-job entry point: deliver an await settlement to its coroutine.
pub(crate) fn resume_await_target(
    agent: &mut Agent,
    task: TaskRef,
    completion: Completion,
) -> Result<(), EngineError> {
    agent.tracer.on_resume(match task {
        TaskRef::Async(_) => "async-function",
        TaskRef::AsyncGenerator(_) => "async-generator",
    });
    match task {
        TaskRef::Async(index) => resume_async_task(agent, index, completion),
        TaskRef::AsyncGenerator(generator) => {
            async_generator_step(agent, generator, Resume::Completion(completion))?;
            async_generator_drain(agent, generator)
        }
    }
}

fn resume_async_task(agent: &mut Agent, index: usize, completion: Completion) -> Result<(), EngineError> {
    let Some(mut task) = agent.async_tasks[index].take() else {
        return Err(EngineError::internal("async task resumed twice"));
    };
    agent.push_context(task.context.clone(), "async-resume");
    let result = task.machine.run(agent, Resume::Completion(completion));
    agent.pop_context();
    match result? {
        MachineResult::Done(completion) => settle_async(agent, &task.capability, completion),
        MachineResult::Suspended(Suspension::Await(value)) => {
            agent.tracer.on_suspend("async-function");
            agent.async_tasks[index] = Some(task);
            await_promise(agent, TaskRef::Async(index), value)
        }
        MachineResult::Suspended(Suspension::Yield(_)) => {
            Err(EngineError::internal("yield escaped an async function"))
        }
    }
}

// --- generators ---

fn generator_parts(agent: &mut Agent, this: Value) -> JsResult<ObjectId> {
    if let Value::Object(id) = this
        && matches!(agent.heap.object(id).data, ObjectData::Generator(_))
    {
        return Ok(id);
    }
    Err(agent.throw_error(ErrorKind::Type, "not a generator object"))
}

/// `GeneratorResume` / `GeneratorResumeAbrupt`: next, return and throw all
/// funnel through here with the matching completion kind.
pub(crate) fn generator_resume(agent: &mut Agent, this: Value, completion: Completion) -> JsResult<Value> {
    let generator = generator_parts(agent, this)?;
    let (state, machine, context) = {
        let ObjectData::Generator(data) = &mut agent.heap.object_mut(generator).data else {
            unreachable!()
        };
        (data.state, data.machine.take(), data.context.take())
    };
    match state {
        GeneratorState::Executing => {
            Err(agent.throw_error(ErrorKind::Type, "generator is already running"))
        }
        GeneratorState::Completed => finished_result(agent, completion),
        GeneratorState::SuspendedStart if completion.is_abrupt() => {
            set_generator_state(agent, generator, GeneratorState::Completed, None, None);
            finished_result(agent, completion)
        }
        GeneratorState::SuspendedStart | GeneratorState::SuspendedYield => {
            let (Some(mut machine), Some(context)) = (machine, context) else {
                return Err(EngineError::internal("suspended generator without a machine"));
            };
            set_generator_state(agent, generator, GeneratorState::Executing, None, None);
            let resume = if state == GeneratorState::SuspendedStart {
                Resume::Start
            } else {
                Resume::Completion(completion)
            };
            agent.push_context(context.clone(), "generator-resume");
            let result = machine.run(agent, resume);
            agent.pop_context();
            match result? {
                MachineResult::Done(done) => {
                    set_generator_state(agent, generator, GeneratorState::Completed, None, None);
                    match done {
                        Completion::Normal(_) => {
                            iter_result(agent, Value::Undefined, true)
                        }
                        Completion::Return(value) => iter_result(agent, value, true),
                        Completion::Throw(t) => Err(EngineError::Throw(t)),
                        _ => Err(EngineError::internal("loop completion escaped a generator")),
                    }
                }
                MachineResult::Suspended(Suspension::Yield(value)) => {
                    agent.tracer.on_suspend("generator");
                    set_generator_state(
                        agent,
                        generator,
                        GeneratorState::SuspendedYield,
                        Some(machine),
                        Some(context),
                    );
                    iter_result(agent, value, false)
                }
                MachineResult::Suspended(Suspension::Await(_)) => {
                    Err(EngineError::internal("await escaped a synchronous generator"))
                }
            }
        }
    }
}

/// A resume against a completed generator: next reports done, return keeps
/// its value, throw rethrows.
fn finished_result(agent: &mut Agent, completion: Completion) -> JsResult<Value> {
    match completion {
        Completion::Normal(_) => iter_result(agent, Value::Undefined, true),
        Completion::Return(value) => iter_result(agent, value, true),
        Completion::Throw(t) => Err(EngineError::Throw(t)),
        _ => Err(EngineError::internal("loop completion resumed a generator")),
    }
}

fn set_generator_state(
    agent: &mut Agent,
    generator: ObjectId,
    state: GeneratorState,
    machine: Option<Machine>,
    context: Option<ExecutionContext>,
) {
    if let ObjectData::Generator(data) = &mut agent.heap.object_mut(generator).data {
        data.state = state;
        data.machine = machine;
        data.context = context;
    }
}

fn iter_result(agent: &mut Agent, value: Value, done: bool) -> JsResult<Value> {
    let result = create_iter_result_object(agent, value, done)?;
    Ok(Value::Object(result))
}

// --- async generators ---

fn async_generator_object(agent: &mut Agent, this: Value) -> JsResult<ObjectId> {
    if let Value::Object(id) = this
        && matches!(agent.heap.object(id).data, ObjectData::AsyncGenerator(_))
    {
        return Ok(id);
    }
    Err(agent.throw_error(ErrorKind::Type, "not an async generator object"))
}

/// `AsyncGeneratorEnqueue`: next/return/throw queue a request and return a
/// promise; the machine drains requests as it can.
pub(crate) fn async_generator_enqueue(
    agent: &mut Agent,
    this: Value,
    completion: Completion,
) -> JsResult<Value> {
    let generator = match async_generator_object(agent, this) {
        Ok(g) => g,
        Err(e) => {
            // Protocol methods reject rather than throw.
            let capability = new_promise_capability(agent);
            let reason = e.thrown_value().unwrap_or(Value::Undefined);
            call(agent, capability.reject, Value::Undefined, &[reason])?;
            return Ok(Value::Object(capability.promise));
        }
    };
    let capability = new_promise_capability(agent);
    let promise = capability.promise;
    if let ObjectData::AsyncGenerator(data) = &mut agent.heap.object_mut(generator).data {
        data.queue.push_back(AsyncGenRequest { completion, capability });
    }
    async_generator_drain(agent, generator)?;
    Ok(Value::Object(promise))
}

/// Runs queued requests while the generator can make progress without an
/// outstanding await.
fn async_generator_drain(agent: &mut Agent, generator: ObjectId) -> Result<(), EngineError> {
    loop {
        let (state, has_request) = {
            let ObjectData::AsyncGenerator(data) = &agent.heap.object(generator).data else {
                return Err(EngineError::internal("async generator state lost"));
            };
            (data.state, !data.queue.is_empty())
        };
        if !has_request {
            return Ok(());
        }
        match state {
            GeneratorState::Executing => return Ok(()),
            GeneratorState::Completed => {
                let request = pop_request(agent, generator)?;
                settle_request(agent, &request.capability, request.completion, true)?;
            }
            GeneratorState::SuspendedStart if request_is_abrupt(agent, generator) => {
                let request = pop_request(agent, generator)?;
                set_async_generator_state(agent, generator, GeneratorState::Completed, None, None);
                settle_request(agent, &request.capability, request.completion, true)?;
            }
            GeneratorState::SuspendedStart => {
                async_generator_step(agent, generator, Resume::Start)?;
            }
            GeneratorState::SuspendedYield => {
                let completion = {
                    let ObjectData::AsyncGenerator(data) = &agent.heap.object(generator).data else {
                        unreachable!()
                    };
                    data.queue.front().map(|r| r.completion.clone())
                };
                let Some(completion) = completion else { return Ok(()) };
                async_generator_step(agent, generator, Resume::Completion(completion))?;
            }
        }
    }
}

fn request_is_abrupt(agent: &Agent, generator: ObjectId) -> bool {
    match &agent.heap.object(generator).data {
        ObjectData::AsyncGenerator(data) => {
            data.queue.front().is_some_and(|r| r.completion.is_abrupt())
        }
        _ => false,
    }
}

fn pop_request(agent: &mut Agent, generator: ObjectId) -> Result<AsyncGenRequest, EngineError> {
    match &mut agent.heap.object_mut(generator).data {
        ObjectData::AsyncGenerator(data) => data
            .queue
            .pop_front()
            .ok_or_else(|| EngineError::internal("async generator queue empty")),
        _ => Err(EngineError::internal("async generator state lost")),
    }
}

/// Settles one request promise against a completion. `done` requests carry
/// iterator-result shapes; rejections pass the raw reason.
fn settle_request(
    agent: &mut Agent,
    capability: &PromiseCapability,
    completion: Completion,
    done: bool,
) -> Result<(), EngineError> {
    match completion {
        Completion::Normal(v) => {
            let result = create_iter_result_object(agent, v.unwrap_or(Value::Undefined), done)?;
            call(agent, capability.resolve, Value::Undefined, &[Value::Object(result)])?;
        }
        Completion::Return(v) => {
            let result = create_iter_result_object(agent, v, true)?;
            call(agent, capability.resolve, Value::Undefined, &[Value::Object(result)])?;
        }
        Completion::Throw(t) => {
            call(agent, capability.reject, Value::Undefined, &[t.value])?;
        }
        _ => return Err(EngineError::internal("loop completion reached an async generator")),
    }
    Ok(())
}

fn set_async_generator_state(
    agent: &mut Agent,
    generator: ObjectId,
    state: GeneratorState,
    machine: Option<Machine>,
    context: Option<ExecutionContext>,
) {
    if let ObjectData::AsyncGenerator(data) = &mut agent.heap.object_mut(generator).data {
        data.state = state;
        if machine.is_some() || state != GeneratorState::Executing {
            data.machine = machine;
            data.context = context;
        }
    }
}

/// One resumption of the async generator machine, interpreting its next
/// stop.
fn async_generator_step(agent: &mut Agent, generator: ObjectId, resume: Resume) -> Result<(), EngineError> {
    let (mut machine, context) = {
        let ObjectData::AsyncGenerator(data) = &mut agent.heap.object_mut(generator).data else {
            return Err(EngineError::internal("async generator state lost"));
        };
        data.state = GeneratorState::Executing;
        let machine = data
            .machine
            .take()
            .ok_or_else(|| EngineError::internal("async generator without a machine"))?;
        let context = data
            .context
            .take()
            .ok_or_else(|| EngineError::internal("async generator without a context"))?;
        (machine, context)
    };
    agent.push_context(context.clone(), "async-generator-resume");
    let result = machine.run(agent, resume);
    agent.pop_context();
    match result? {
        MachineResult::Done(done) => {
            set_async_generator_state(agent, generator, GeneratorState::Completed, None, None);
            let request = pop_request(agent, generator)?;
            match done {
                Completion::Normal(_) => {
                    settle_request(agent, &request.capability, Completion::Normal(None), true)?;
                }
                other => settle_request(agent, &request.capability, other, true)?,
            }
        }
        MachineResult::Suspended(Suspension::Yield(value)) => {
            agent.tracer.on_suspend("async-generator");
            set_async_generator_state(
                agent,
                generator,
                GeneratorState::SuspendedYield,
                Some(machine),
                Some(context),
            );
            let request = pop_request(agent, generator)?;
            settle_request(agent, &request.capability, Completion::normal(value), false)?;
        }
        MachineResult::Suspended(Suspension::Await(value)) => {
            agent.tracer.on_suspend("async-generator");
            // Executing state persists across the await; the machine rides
            // in the object until the settlement job lands.
            if let ObjectData::AsyncGenerator(data) = &mut agent.heap.object_mut(generator).data {
                data.machine = Some(machine);
                data.context = Some(context);
            }
            await_promise(agent, TaskRef::AsyncGenerator(generator), value)?;
        }
    }
    Ok(())
}
