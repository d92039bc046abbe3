//! The agent: one self-contained, single-threaded execution environment.
//!
//! Owns the heap, the realm list, the execution-context stack, the named job
//! queues, the registered sources and module records, and the host hook and
//! tracer surfaces. Everything the evaluator touches flows through here.

use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    ast::{Ast, NodeId, SourceId, Span},
    completion::{CallSite, EngineError, JsResult, ThrowCompletion},
    heap::{Heap, Mark, MarkQueue},
    interpreter::coroutines::AsyncTask,
    intrinsics::{
        self,
        error::ErrorKind,
        promise::{PromiseAllRecord, PromiseReaction},
    },
    module::{ModuleId, ModuleRecord},
    object::{ObjectData, ObjectRecord, PropertyKey},
    realm::{Intrinsics, Realm, RealmId},
    tracer::{AgentTracer, NoopTracer},
    value::{EnvId, JsString, ObjectId, PrivateEnvId, Value},
};

/// What a source was registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Script,
    Module,
}

/// A registered parse tree plus the realm it binds to. The tree is shared
/// behind `Rc` so evaluation can hold it without borrowing the agent.
#[derive(Debug)]
pub(crate) struct SourceRecord {
    pub name: Box<str>,
    pub ast: std::rc::Rc<Ast>,
    pub root: NodeId,
    pub realm: RealmId,
    pub kind: SourceKind,
}

/// The script-or-module slot of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOrModule {
    Script(SourceId),
    Module(ModuleId),
}

/// One frame of the execution-context stack.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionContext {
    pub function: Option<ObjectId>,
    pub realm: RealmId,
    pub script_or_module: Option<ScriptOrModule>,
    pub lexical_env: EnvId,
    pub variable_env: EnvId,
    pub private_env: Option<PrivateEnvId>,
    /// Synthetic call-site info for stack traces.
    pub function_name: Option<Box<str>>,
    pub call_span: Span,
}

impl Mark for ExecutionContext {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(f) = self.function {
            queue.push_object(f);
        }
        queue.push_env(self.lexical_env);
        queue.push_env(self.variable_env);
    }
}

/// Feature flags queried at decision points via [`Agent::feature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum Feature {
    /// Expose `FinalizationRegistry.prototype.cleanupSome`.
    #[strum(serialize = "cleanup-some")]
    CleanupSome,
    /// Treat well-formedness checks on strings as USV-string checks.
    #[strum(serialize = "is-usv-string")]
    IsUsvString,
}

/// The operation reported to the promise rejection tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionOperation {
    Reject,
    Handle,
}

/// Named job queues; FIFO within a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueName {
    PromiseJobs,
    FinalizationCleanup,
}

/// A pending job.
#[derive(Debug)]
pub(crate) enum Job {
    PromiseReaction {
        reaction: PromiseReaction,
        argument: Value,
    },
    ResolveThenable {
        promise: ObjectId,
        thenable: Value,
        then: Value,
    },
    FinalizationCleanup {
        registry: ObjectId,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Self::PromiseReaction { .. } => "promise-reaction",
            Self::ResolveThenable { .. } => "resolve-thenable",
            Self::FinalizationCleanup { .. } => "finalization-cleanup",
        }
    }
}

impl Mark for Job {
    fn mark(&self, queue: &mut MarkQueue) {
        match self {
            Self::PromiseReaction { reaction, argument } => {
                reaction.mark(queue);
                argument.mark(queue);
            }
            Self::ResolveThenable { promise, thenable, then } => {
                queue.push_object(*promise);
                thenable.mark(queue);
                then.mark(queue);
            }
            Self::FinalizationCleanup { registry } => queue.push_object(*registry),
        }
    }
}

/// Host callbacks. Every method has a workable default so embedders only
/// implement what they host.
pub trait HostHooks {
    /// Resolves and registers the module a specifier names, relative to the
    /// referrer. A host that loads asynchronously completes loading before
    /// calling back into the engine.
    fn load_imported_module(
        &self,
        agent: &mut Agent,
        referrer: ScriptOrModule,
        specifier: &str,
    ) -> JsResult<ModuleId> {
        let _ = referrer;
        Err(agent.throw_error(
            ErrorKind::Type,
            format!("module loading is not supported by this host (importing '{specifier}')"),
        ))
    }

    fn promise_rejection_tracker(
        &self,
        agent: &mut Agent,
        promise: Value,
        operation: RejectionOperation,
    ) {
        let _ = (agent, promise, operation);
    }

    fn has_source_text_available(&self, func: Value) -> bool {
        let _ = func;
        true
    }

    fn ensure_can_compile_strings(
        &self,
        agent: &mut Agent,
        caller: RealmId,
        callee: RealmId,
    ) -> JsResult<()> {
        let _ = (agent, caller, callee);
        Ok(())
    }

    /// Default behavior schedules a cleanup job on the
    /// `FinalizationCleanup` queue.
    fn cleanup_finalization_registry(&self, agent: &mut Agent, registry: Value) -> JsResult<()> {
        if let Value::Object(registry) = registry {
            agent.enqueue_job(QueueName::FinalizationCleanup, Job::FinalizationCleanup { registry });
        }
        Ok(())
    }

    fn get_import_meta_properties(&self, agent: &mut Agent, module: ModuleId) -> Vec<(String, Value)> {
        let _ = (agent, module);
        Vec::new()
    }

    fn finalize_import_meta(&self, agent: &mut Agent, import_meta: Value, module: ModuleId) -> JsResult<()> {
        let _ = (agent, import_meta, module);
        Ok(())
    }
}

/// The hookless default host.
#[derive(Debug, Default)]
pub struct DefaultHostHooks;

impl HostHooks for DefaultHostHooks {}

/// Construction-time agent configuration.
pub struct AgentOptions {
    pub features: Vec<Feature>,
    /// Nested call depth before a RangeError, the stack-overflow analog.
    pub max_call_depth: usize,
    pub hooks: Rc<dyn HostHooks>,
    pub tracer: Box<dyn AgentTracer>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            max_call_depth: 256,
            hooks: Rc::new(DefaultHostHooks),
            tracer: Box::new(NoopTracer),
        }
    }
}

pub struct Agent {
    pub(crate) heap: Heap,
    pub(crate) realms: Vec<Realm>,
    pub(crate) contexts: Vec<ExecutionContext>,
    pub(crate) sources: Vec<SourceRecord>,
    pub(crate) modules: Vec<ModuleRecord>,
    pub(crate) async_tasks: Vec<Option<AsyncTask>>,
    /// `alreadyResolved` latches for promise resolving-function pairs.
    pub(crate) resolve_latches: Vec<bool>,
    pub(crate) promise_all_records: Vec<PromiseAllRecord>,
    promise_jobs: VecDeque<Job>,
    finalization_jobs: VecDeque<Job>,
    pub(crate) kept_alive: Vec<Value>,
    pub(crate) call_depth: usize,
    /// Shared synthetic default-constructor bodies (source, base, derived).
    synthetic_ctors: Option<(SourceId, NodeId, NodeId)>,
    features: Vec<Feature>,
    pub(crate) max_call_depth: usize,
    pub(crate) hooks: Rc<dyn HostHooks>,
    pub(crate) tracer: Box<dyn AgentTracer>,
}

impl Default for Agent {
    fn default() -> Self {
        Self::new(AgentOptions::default())
    }
}

impl Agent {
    /// Builds an agent with one bootstrapped realm.
    pub fn new(options: AgentOptions) -> Self {
        let mut agent = Self {
            heap: Heap::new(),
            realms: Vec::new(),
            contexts: Vec::new(),
            sources: Vec::new(),
            modules: Vec::new(),
            async_tasks: Vec::new(),
            resolve_latches: Vec::new(),
            promise_all_records: Vec::new(),
            promise_jobs: VecDeque::new(),
            finalization_jobs: VecDeque::new(),
            kept_alive: Vec::new(),
            call_depth: 0,
            synthetic_ctors: None,
            features: options.features,
            max_call_depth: options.max_call_depth,
            hooks: options.hooks,
            tracer: options.tracer,
        };
        intrinsics::create_realm(&mut agent);
        agent.synthetic_ctors = Some(crate::interpreter::class::build_synthetic_constructors(&mut agent));
        agent
    }

    /// Creates an additional realm and returns its id.
    pub fn create_realm(&mut self) -> RealmId {
        intrinsics::create_realm(self)
    }

    /// The realm new work runs in when nothing is on the context stack.
    pub fn initial_realm(&self) -> RealmId {
        RealmId::new(0)
    }

    pub fn feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    // --- context stack ---

    pub(crate) fn running_context(&self) -> &ExecutionContext {
        self.contexts.last().expect("no running execution context")
    }

    pub(crate) fn running_context_mut(&mut self) -> &mut ExecutionContext {
        self.contexts.last_mut().expect("no running execution context")
    }

    pub(crate) fn push_context(&mut self, context: ExecutionContext, kind: &str) {
        self.contexts.push(context);
        let depth = self.contexts.len();
        self.tracer.on_context_push(depth, kind);
    }

    pub(crate) fn pop_context(&mut self) {
        self.contexts.pop();
        let depth = self.contexts.len();
        self.tracer.on_context_pop(depth);
    }

    pub(crate) fn current_realm_id(&self) -> RealmId {
        self.contexts
            .last()
            .map_or_else(|| self.initial_realm(), |c| c.realm)
    }

    pub(crate) fn realm(&self, id: RealmId) -> &Realm {
        &self.realms[id.index()]
    }

    pub(crate) fn realm_mut(&mut self, id: RealmId) -> &mut Realm {
        &mut self.realms[id.index()]
    }

    pub(crate) fn intrinsics(&self) -> &Intrinsics {
        &self.realm(self.current_realm_id()).intrinsics
    }

    pub(crate) fn current_global_object(&self) -> ObjectId {
        self.realm(self.current_realm_id()).global_object
    }

    /// The global object of a realm, for embedder inspection.
    pub fn global_object(&self, realm: RealmId) -> Value {
        Value::Object(self.realm(realm).global_object)
    }

    /// Looks up an intrinsic by canonical `%X%` name in a realm.
    pub fn intrinsic(&self, realm: RealmId, name: &str) -> Option<Value> {
        self.realm(realm).intrinsics.get(name).map(Value::Object)
    }

    // --- sources ---

    /// Registers a parsed script against a realm. The root must be a
    /// `Script` node.
    pub fn add_script(&mut self, ast: Ast, root: NodeId, name: &str, realm: RealmId) -> SourceId {
        let id = SourceId::new(self.sources.len());
        self.sources.push(SourceRecord {
            name: name.into(),
            ast: std::rc::Rc::new(ast),
            root,
            realm,
            kind: SourceKind::Script,
        });
        id
    }

    pub(crate) fn source(&self, id: SourceId) -> &SourceRecord {
        &self.sources[id.index()]
    }

    /// `ScriptEvaluation`: runs a registered script to completion, then
    /// drains the job queues.
    pub fn evaluate_script(&mut self, script: SourceId) -> Result<Value, EngineError> {
        let result = crate::interpreter::script_evaluation(self, script);
        self.run_jobs()?;
        result
    }

    // --- jobs ---

    pub(crate) fn enqueue_job(&mut self, queue: QueueName, job: Job) {
        self.tracer.on_job_enqueued(queue, job.kind());
        match queue {
            QueueName::PromiseJobs => self.promise_jobs.push_back(job),
            QueueName::FinalizationCleanup => self.finalization_jobs.push_back(job),
        }
    }

    /// Drains the job queues, FIFO per queue name, promise jobs first. The
    /// kept-alive set clears once everything has run.
    pub fn run_jobs(&mut self) -> Result<(), EngineError> {
        loop {
            let (queue, job) = if let Some(job) = self.promise_jobs.pop_front() {
                (QueueName::PromiseJobs, job)
            } else if let Some(job) = self.finalization_jobs.pop_front() {
                (QueueName::FinalizationCleanup, job)
            } else {
                break;
            };
            self.tracer.on_job_started(queue, job.kind());
            match job {
                Job::PromiseReaction { reaction, argument } => {
                    intrinsics::promise::run_reaction_job(self, reaction, argument)?;
                }
                Job::ResolveThenable { promise, thenable, then } => {
                    intrinsics::promise::run_resolve_thenable_job(self, promise, thenable, then)?;
                }
                Job::FinalizationCleanup { registry } => {
                    intrinsics::registry::run_cleanup_job(self, registry)?;
                }
            }
        }
        self.kept_alive.clear();
        Ok(())
    }

    /// `AddToKeptObjects`.
    pub(crate) fn add_to_kept_objects(&mut self, value: Value) {
        self.kept_alive.push(value);
    }

    // --- errors & stacks ---

    /// Materializes a language error of `kind` as a throw completion,
    /// capturing the synthetic call-site trace. Host hooks use this to
    /// produce language-visible errors of their own.
    pub fn throw_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> EngineError {
        let message = message.into();
        self.tracer.on_throw(&message);
        let stack = self.capture_stack();
        let error = intrinsics::error::create_error(self, kind, &message, &stack);
        EngineError::Throw(ThrowCompletion { value: Value::Object(error), stack })
    }

    /// The current synthetic call-site trace, innermost first.
    pub(crate) fn capture_stack(&self) -> Vec<CallSite> {
        self.contexts
            .iter()
            .rev()
            .map(|context| {
                let source = match context.script_or_module {
                    Some(ScriptOrModule::Script(id)) => self.source(id).name.to_string(),
                    Some(ScriptOrModule::Module(id)) => {
                        self.source(self.modules[id.index()].source).name.to_string()
                    }
                    None => "<native>".to_owned(),
                };
                CallSite {
                    function: context.function_name.as_ref().map(ToString::to_string),
                    source,
                    line: context.call_span.line,
                    column: context.call_span.column,
                }
            })
            .collect()
    }

    /// Renders an engine error for display: a thrown Error object renders
    /// as its stack, anything else as the inspected value.
    pub fn render_error(&self, error: &EngineError) -> String {
        match error {
            EngineError::Internal(internal) => internal.to_string(),
            EngineError::Throw(throw) => {
                if let Value::Object(id) = throw.value
                    && let ObjectData::Error(_) = &self.heap.object(id).data
                    && let Some(crate::object::PropertyEntry::Data { value: Value::String(s), .. }) =
                        self.heap.object(id).entry(PropertyKey::String(self.heap.statics.stack))
                {
                    return self.heap.string(*s).to_rust_string();
                }
                crate::inspect::inspect(self, throw.value)
            }
        }
    }

    // --- small shared helpers ---

    /// Interns the canonical string form of an index as a property key.
    pub(crate) fn key_for_index(&mut self, index: u64) -> PropertyKey {
        PropertyKey::String(self.heap.intern_str(&index.to_string()))
    }

    pub(crate) fn key_from_str(&mut self, name: &str) -> PropertyKey {
        PropertyKey::String(self.heap.intern_str(name))
    }

    pub(crate) fn key_to_value(&self, key: PropertyKey) -> Value {
        match key {
            PropertyKey::String(id) => Value::String(id),
            PropertyKey::Symbol(id) => Value::Symbol(id),
        }
    }

    /// A fresh ordinary object with `%Object.prototype%`.
    pub(crate) fn create_ordinary_object(&mut self) -> ObjectId {
        let prototype = self.intrinsics().object_prototype;
        let realm = self.current_realm_id();
        self.heap
            .alloc_object(ObjectRecord::new(Some(prototype), ObjectData::Ordinary, realm))
    }

    // --- embedder conveniences ---

    /// Makes a string value.
    pub fn string_value(&mut self, text: &str) -> Value {
        Value::String(self.heap.intern_str(text))
    }

    /// Reads a string value back out, lossily.
    pub fn as_string(&self, value: Value) -> Option<String> {
        match value {
            Value::String(id) => Some(self.heap.string(id).to_rust_string()),
            _ => None,
        }
    }

    /// Property read through the full internal-method machinery.
    pub fn get_property(&mut self, target: Value, name: &str) -> Result<Value, EngineError> {
        let key = self.key_from_str(name);
        crate::operations::get_v(self, target, key)
    }

    /// Calls a callable value.
    pub fn call_value(
        &mut self,
        func: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        crate::operations::call(self, func, this, args)
    }

    /// Canonical debug rendering of a value.
    pub fn inspect(&self, value: Value) -> String {
        crate::inspect::inspect(self, value)
    }

    /// Counts heap objects reachable from the agent's roots: the traversal
    /// a tracing collector would use.
    pub fn reachable_object_count(&self) -> usize {
        let mut queue = self.fresh_mark_queue();
        for realm in &self.realms {
            realm.mark(&mut queue);
        }
        for context in &self.contexts {
            context.mark(&mut queue);
        }
        for job in self.promise_jobs.iter().chain(self.finalization_jobs.iter()) {
            job.mark(&mut queue);
        }
        for value in &self.kept_alive {
            value.mark(&mut queue);
        }
        for task in self.async_tasks.iter().flatten() {
            task.mark(&mut queue);
        }
        for module in &self.modules {
            module.mark(&mut queue);
        }
        self.heap.drain_marks(&mut queue)
    }

    fn fresh_mark_queue(&self) -> MarkQueue {
        MarkQueue::new(self.heap.object_count(), self.heap.env_count())
    }

    /// Intern a string literal used in JsString form.
    pub(crate) fn intern_js_string(&mut self, s: JsString) -> Value {
        Value::String(self.heap.intern_string(s))
    }

    /// The shared synthetic default-constructor bodies.
    pub(crate) fn synthetic_default_ctors(&self) -> (SourceId, NodeId, NodeId) {
        self.synthetic_ctors.expect("synthetic constructors built at agent creation")
    }

    /// Detaches an ArrayBuffer, the host-side operation tests and embedders
    /// drive detachment with.
    pub fn detach_array_buffer(&mut self, buffer: Value) -> Result<(), EngineError> {
        let Value::Object(id) = buffer else {
            return Err(EngineError::internal("detach target is not a buffer"));
        };
        crate::buffer::detach_array_buffer(self, id)
    }

    /// Marks a finalization-registry cell's held value ready and schedules
    /// cleanup through the host hook. Without a collector in the engine,
    /// the host decides when a target counts as dead.
    pub fn notify_finalization(&mut self, registry: Value, held_value: Value) -> Result<(), EngineError> {
        let Value::Object(id) = registry else {
            return Err(EngineError::internal("finalization target is not a registry"));
        };
        if let ObjectData::FinalizationRegistry(data) = &mut self.heap.object_mut(id).data {
            data.ready.push(held_value);
        } else {
            return Err(EngineError::internal("finalization target is not a registry"));
        }
        let hooks = Rc::clone(&self.hooks);
        hooks.cleanup_finalization_registry(self, registry)
    }
}
