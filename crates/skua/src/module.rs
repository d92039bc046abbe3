//! Scripts' sibling: cyclic source-text module records — loading, linking
//! with Tarjan SCC indices, evaluation, export resolution and namespace
//! objects.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    agent::{Agent, ExecutionContext, ScriptOrModule, SourceKind, SourceRecord},
    ast::{Ast, Node, NodeId, SourceId, Span},
    completion::{Completion, EngineError, JsResult, ThrowCompletion},
    environments,
    heap::{Mark, MarkQueue},
    interpreter::{self, Machine, MachineResult, Resume},
    intrinsics::error::ErrorKind,
    object::{ObjectData, ObjectRecord, PropertyEntry, PropertyKey},
    realm::RealmId,
    value::{EnvId, JsString, ObjectId, StringId, Value},
};

/// Identity of a module record within its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("module index exceeds u32"))
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Module lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Unlinked,
    Linking,
    Linked,
    Evaluating,
    Evaluated,
}

/// One import entry: `import { import_name as local } from specifier`.
#[derive(Debug, Clone)]
pub(crate) struct ImportEntry {
    pub specifier: Box<str>,
    /// `None` is a namespace import (`import * as local`).
    pub import_name: Option<StringId>,
    pub local_name: StringId,
}

/// One export entry.
#[derive(Debug, Clone)]
pub(crate) struct ExportEntry {
    pub export_name: StringId,
    /// Re-exports carry the requested specifier.
    pub specifier: Option<Box<str>>,
    /// Local binding (or import name when re-exporting).
    pub local_name: StringId,
}

/// The slots of a module namespace exotic object.
#[derive(Debug)]
pub(crate) struct NamespaceData {
    pub module: ModuleId,
    /// Export names sorted in code-unit lexicographic order.
    pub exports: Vec<StringId>,
}

impl Mark for NamespaceData {
    fn mark(&self, _queue: &mut MarkQueue) {
        // The module environment is rooted through the agent's module list.
    }
}

/// A cyclic source-text module record.
#[derive(Debug)]
pub(crate) struct ModuleRecord {
    pub source: SourceId,
    pub specifier: Box<str>,
    pub realm: RealmId,
    pub status: ModuleStatus,
    pub requested: Vec<Box<str>>,
    pub loaded: AHashMap<Box<str>, ModuleId>,
    pub import_entries: Vec<ImportEntry>,
    pub local_exports: Vec<ExportEntry>,
    pub indirect_exports: Vec<ExportEntry>,
    pub star_exports: Vec<Box<str>>,
    pub environment: Option<EnvId>,
    pub namespace: Option<ObjectId>,
    pub dfs_index: Option<u32>,
    pub dfs_ancestor_index: Option<u32>,
    /// The shared thrown value when this module's SCC failed to evaluate.
    pub evaluation_error: Option<ThrowCompletion>,
    pub import_meta: Option<ObjectId>,
}

impl Mark for ModuleRecord {
    fn mark(&self, queue: &mut MarkQueue) {
        if let Some(env) = self.environment {
            queue.push_env(env);
        }
        if let Some(ns) = self.namespace {
            queue.push_object(ns);
        }
        if let Some(meta) = self.import_meta {
            queue.push_object(meta);
        }
        if let Some(error) = &self.evaluation_error {
            error.value.mark(queue);
        }
    }
}

/// A successful `ResolveExport` answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolvedBinding {
    Binding { module: ModuleId, name: StringId },
    Namespace { module: ModuleId },
}

/// How `ResolveExport` answered. Ambiguity is a sentinel, not an error:
/// namespace construction skips ambiguous names, while a named import of
/// one becomes a link-time SyntaxError at the import site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportResolution {
    Resolved(ResolvedBinding),
    Ambiguous,
    NotFound,
}

impl Agent {
    /// Registers a parsed module source. The root must be a `Module` node.
    pub fn add_module(&mut self, ast: Ast, root: NodeId, specifier: &str, realm: RealmId) -> ModuleId {
        let source_id = SourceId::new(self.sources.len());
        self.sources.push(SourceRecord {
            name: specifier.into(),
            ast: Rc::new(ast),
            root,
            realm,
            kind: SourceKind::Module,
        });
        let record = parse_module_record(self, source_id, specifier, realm);
        let id = ModuleId::new(self.modules.len());
        self.modules.push(record);
        id
    }

    /// `Link()`: resolves the request graph and initialises environments.
    pub fn link_module(&mut self, module: ModuleId) -> Result<(), EngineError> {
        let mut stack = Vec::new();
        let result = inner_module_linking(self, module, &mut stack, 0);
        if let Err(e) = result {
            for m in stack {
                self.modules[m.index()].status = ModuleStatus::Unlinked;
            }
            return Err(e);
        }
        Ok(())
    }

    /// `Evaluate()`: runs the module graph, then drains the job queues.
    pub fn evaluate_module(&mut self, module: ModuleId) -> Result<Value, EngineError> {
        let status = self.modules[module.index()].status;
        if status == ModuleStatus::Unlinked {
            self.link_module(module)?;
        }
        let mut stack = Vec::new();
        let result = inner_module_evaluation(self, module, &mut stack, 0);
        match result {
            Ok(_) => {
                self.run_jobs()?;
                Ok(Value::Undefined)
            }
            Err(EngineError::Throw(t)) => {
                // Every SCC member still on the stack records the same
                // error.
                for m in stack {
                    let record = &mut self.modules[m.index()];
                    record.status = ModuleStatus::Evaluated;
                    record.evaluation_error = Some(t.clone());
                }
                self.run_jobs()?;
                Err(EngineError::Throw(t))
            }
            Err(internal) => Err(internal),
        }
    }

    /// The module's status, for embedder inspection.
    pub fn module_status(&self, module: ModuleId) -> ModuleStatus {
        self.modules[module.index()].status
    }
}

/// Collects import/export entries and requests from the module body.
fn parse_module_record(agent: &mut Agent, source: SourceId, specifier: &str, realm: RealmId) -> ModuleRecord {
    let ast = Rc::clone(&agent.source(source).ast);
    let root = agent.source(source).root;
    let Node::Module { body } = ast.node(root) else {
        // Tolerate a script root; the record simply exports nothing.
        return empty_record(source, specifier, realm);
    };
    let requested: Vec<Box<str>> = ast.module_requests(body).iter().map(|s| (*s).into()).collect();

    let mut import_entries = Vec::new();
    let mut local_exports = Vec::new();
    let mut indirect_exports = Vec::new();
    let mut star_exports = Vec::new();
    for &item in body {
        match ast.node(item) {
            Node::Import { specifier, default, namespace, named } => {
                if let Some(local) = default {
                    import_entries.push(ImportEntry {
                        specifier: specifier.clone(),
                        import_name: Some(agent.heap.statics.default),
                        local_name: agent.heap.intern_str(local),
                    });
                }
                if let Some(local) = namespace {
                    import_entries.push(ImportEntry {
                        specifier: specifier.clone(),
                        import_name: None,
                        local_name: agent.heap.intern_str(local),
                    });
                }
                for spec in named {
                    import_entries.push(ImportEntry {
                        specifier: specifier.clone(),
                        import_name: Some(agent.heap.intern_str(&spec.import)),
                        local_name: agent.heap.intern_str(&spec.local),
                    });
                }
            }
            Node::ExportNamed { specifier: from, named } => {
                for spec in named {
                    let export_name = agent.heap.intern_str(&spec.export);
                    let local_name = agent.heap.intern_str(&spec.local);
                    match from {
                        Some(from) => indirect_exports.push(ExportEntry {
                            export_name,
                            specifier: Some(from.clone()),
                            local_name,
                        }),
                        None => local_exports.push(ExportEntry {
                            export_name,
                            specifier: None,
                            local_name,
                        }),
                    }
                }
            }
            Node::ExportStar { specifier } => star_exports.push(specifier.clone()),
            Node::ExportDecl(decl) => {
                for name in ast.bound_names(*decl) {
                    let id = agent.heap.intern_str(name);
                    local_exports.push(ExportEntry { export_name: id, specifier: None, local_name: id });
                }
            }
            Node::ExportDefault(_) => {
                local_exports.push(ExportEntry {
                    export_name: agent.heap.statics.default,
                    specifier: None,
                    local_name: agent.heap.statics.default_export,
                });
            }
            _ => {}
        }
    }
    ModuleRecord {
        source,
        specifier: specifier.into(),
        realm,
        status: ModuleStatus::Unlinked,
        requested,
        loaded: AHashMap::new(),
        import_entries,
        local_exports,
        indirect_exports,
        star_exports,
        environment: None,
        namespace: None,
        dfs_index: None,
        dfs_ancestor_index: None,
        evaluation_error: None,
        import_meta: None,
    }
}

fn empty_record(source: SourceId, specifier: &str, realm: RealmId) -> ModuleRecord {
    ModuleRecord {
        source,
        specifier: specifier.into(),
        realm,
        status: ModuleStatus::Unlinked,
        requested: Vec::new(),
        loaded: AHashMap::new(),
        import_entries: Vec::new(),
        local_exports: Vec::new(),
        indirect_exports: Vec::new(),
        star_exports: Vec::new(),
        environment: None,
        namespace: None,
        dfs_index: None,
        dfs_ancestor_index: None,
        evaluation_error: None,
        import_meta: None,
    }
}

pub(crate) fn environment(agent: &Agent, module: ModuleId) -> Option<EnvId> {
    agent.modules[module.index()].environment
}

/// Resolves (and caches) a requested specifier through the host.
fn loaded_module(agent: &mut Agent, referrer: ModuleId, specifier: &str) -> JsResult<ModuleId> {
    if let Some(&loaded) = agent.modules[referrer.index()].loaded.get(specifier) {
        return Ok(loaded);
    }
    let hooks = std::rc::Rc::clone(&agent.hooks);
    let loaded = hooks.load_imported_module(agent, ScriptOrModule::Module(referrer), specifier)?;
    agent.modules[referrer.index()]
        .loaded
        .insert(specifier.into(), loaded);
    Ok(loaded)
}

// --- linking ---

fn inner_module_linking(
    agent: &mut Agent,
    module: ModuleId,
    stack: &mut Vec<ModuleId>,
    index: u32,
) -> JsResult<u32> {
    {
        let record = &agent.modules[module.index()];
        match record.status {
            ModuleStatus::Linking | ModuleStatus::Linked | ModuleStatus::Evaluating | ModuleStatus::Evaluated => {
                return Ok(index);
            }
            ModuleStatus::Unlinked => {}
        }
    }
    let record = &mut agent.modules[module.index()];
    record.status = ModuleStatus::Linking;
    record.dfs_index = Some(index);
    record.dfs_ancestor_index = Some(index);
    let mut index = index + 1;
    stack.push(module);

    let requested = agent.modules[module.index()].requested.clone();
    for specifier in requested {
        let required = loaded_module(agent, module, &specifier)?;
        index = inner_module_linking(agent, required, stack, index)?;
        let required_record = &agent.modules[required.index()];
        if required_record.status == ModuleStatus::Linking {
            let ancestor = required_record
                .dfs_ancestor_index
                .expect("linking module has an ancestor index");
            let record = &mut agent.modules[module.index()];
            let current = record.dfs_ancestor_index.expect("set above");
            record.dfs_ancestor_index = Some(current.min(ancestor));
        }
    }

    initialize_environment(agent, module)?;

    let record = &agent.modules[module.index()];
    if record.dfs_ancestor_index == record.dfs_index {
        // SCC root: everything above it on the stack links together.
        loop {
            let done = stack.pop().expect("module on stack");
            agent.modules[done.index()].status = ModuleStatus::Linked;
            if done == module {
                break;
            }
        }
    }
    Ok(index)
}

/// `InitializeEnvironment`: create the module environment, wire imports,
/// and hoist declarations.
fn initialize_environment(agent: &mut Agent, module: ModuleId) -> JsResult<()> {
    // Indirect exports must resolve, unambiguously.
    let indirect = agent.modules[module.index()].indirect_exports.clone();
    for entry in &indirect {
        match resolve_export(agent, module, entry.export_name, &mut Vec::new())? {
            ExportResolution::Resolved(_) => {}
            ExportResolution::Ambiguous => {
                let name = agent.heap.string(entry.export_name).to_rust_string();
                return Err(agent.throw_error(ErrorKind::Syntax, format!("export '{name}' is ambiguous")));
            }
            ExportResolution::NotFound => {
                let name = agent.heap.string(entry.export_name).to_rust_string();
                return Err(agent.throw_error(
                    ErrorKind::Syntax,
                    format!("module does not provide an export named '{name}'"),
                ));
            }
        }
    }

    let realm = agent.modules[module.index()].realm;
    let global_env = agent.realm(realm).global_env;
    let env = environments::new_module_environment(&mut agent.heap, Some(global_env));
    agent.modules[module.index()].environment = Some(env);

    // Import bindings.
    let imports = agent.modules[module.index()].import_entries.clone();
    for entry in imports {
        let imported = loaded_module(agent, module, &entry.specifier)?;
        match entry.import_name {
            None => {
                let namespace = get_module_namespace(agent, imported)?;
                environments::create_immutable_binding(agent, env, entry.local_name, true)?;
                environments::initialize_binding(agent, env, entry.local_name, Value::Object(namespace))?;
            }
            Some(import_name) => {
                match resolve_export(agent, imported, import_name, &mut Vec::new())? {
                    ExportResolution::NotFound => {
                        let name = agent.heap.string(import_name).to_rust_string();
                        return Err(agent.throw_error(
                            ErrorKind::Syntax,
                            format!("the requested module does not provide an export named '{name}'"),
                        ));
                    }
                    ExportResolution::Ambiguous => {
                        let name = agent.heap.string(import_name).to_rust_string();
                        return Err(agent.throw_error(
                            ErrorKind::Syntax,
                            format!("export '{name}' is ambiguous"),
                        ));
                    }
                    ExportResolution::Resolved(ResolvedBinding::Namespace { module: target }) => {
                        let namespace = get_module_namespace(agent, target)?;
                        environments::create_immutable_binding(agent, env, entry.local_name, true)?;
                        environments::initialize_binding(
                            agent,
                            env,
                            entry.local_name,
                            Value::Object(namespace),
                        )?;
                    }
                    ExportResolution::Resolved(ResolvedBinding::Binding { module: target, name }) => {
                        environments::create_import_binding(agent, env, entry.local_name, target, name);
                    }
                }
            }
        }
    }

    // Hoist declarations in a module-scoped context.
    let source = agent.modules[module.index()].source;
    let ast = Rc::clone(&agent.source(source).ast);
    let root = agent.source(source).root;
    let Node::Module { body } = ast.node(root) else {
        return Ok(());
    };
    agent.push_context(
        ExecutionContext {
            function: None,
            realm,
            script_or_module: Some(ScriptOrModule::Module(module)),
            lexical_env: env,
            variable_env: env,
            private_env: None,
            function_name: None,
            call_span: Span::ZERO,
        },
        "module-link",
    );
    let result = (|| -> JsResult<()> {
        for name in ast.var_declared_names(body) {
            let name_id = agent.heap.intern_str(name);
            if !environments::has_binding(agent, env, name_id)? {
                environments::create_mutable_binding(agent, env, name_id, false)?;
                environments::initialize_binding(agent, env, name_id, Value::Undefined)?;
            }
        }
        interpreter::instantiate_lexical_declarations(agent, &ast, body, env, true)?;
        // The default-export binding exists before evaluation.
        if agent.modules[module.index()]
            .local_exports
            .iter()
            .any(|e| e.local_name == agent.heap.statics.default_export)
        {
            let name = agent.heap.statics.default_export;
            environments::create_mutable_binding(agent, env, name, false)?;
        }
        for decl in ast.function_declarations(body) {
            let Node::Function(inner) = ast.node(decl) else { continue };
            let fo = interpreter::instantiate_function(agent, source, decl, inner, true, None, false, None);
            match &inner.name {
                Some(name) => {
                    let name_id = agent.heap.intern_str(name);
                    if !environments::has_binding(agent, env, name_id)? {
                        environments::create_mutable_binding(agent, env, name_id, false)?;
                    }
                    environments::initialize_binding(agent, env, name_id, Value::Object(fo))?;
                    // `export default function name() {}` also feeds the
                    // default binding.
                    if is_default_exported(&ast, body, decl) {
                        let default = agent.heap.statics.default_export;
                        environments::initialize_binding(agent, env, default, Value::Object(fo))?;
                    }
                }
                None => {
                    if is_default_exported(&ast, body, decl) {
                        crate::interpreter::statements::set_function_name(agent, fo, "default");
                        let default = agent.heap.statics.default_export;
                        environments::initialize_binding(agent, env, default, Value::Object(fo))?;
                    }
                }
            }
        }
        Ok(())
    })();
    agent.pop_context();
    result
}

fn is_default_exported(ast: &Ast, body: &[NodeId], decl: NodeId) -> bool {
    body.iter()
        .any(|&item| matches!(ast.node(item), Node::ExportDefault(inner) if *inner == decl))
}

// --- evaluation ---

fn inner_module_evaluation(
    agent: &mut Agent,
    module: ModuleId,
    stack: &mut Vec<ModuleId>,
    index: u32,
) -> JsResult<u32> {
    {
        let record = &agent.modules[module.index()];
        match record.status {
            ModuleStatus::Evaluated => {
                return match &record.evaluation_error {
                    None => Ok(index),
                    Some(error) => Err(EngineError::Throw(error.clone())),
                };
            }
            ModuleStatus::Evaluating => return Ok(index),
            ModuleStatus::Linked => {}
            _ => {
                return Err(EngineError::internal("module evaluated before linking"));
            }
        }
    }
    {
        let record = &mut agent.modules[module.index()];
        record.status = ModuleStatus::Evaluating;
        record.dfs_index = Some(index);
        record.dfs_ancestor_index = Some(index);
    }
    let mut index = index + 1;
    stack.push(module);

    let requested = agent.modules[module.index()].requested.clone();
    for specifier in requested {
        let required = loaded_module(agent, module, &specifier)?;
        index = inner_module_evaluation(agent, required, stack, index)?;
        let required_record = &agent.modules[required.index()];
        if required_record.status == ModuleStatus::Evaluating {
            let ancestor = required_record
                .dfs_ancestor_index
                .expect("evaluating module has an ancestor index");
            let record = &mut agent.modules[module.index()];
            let current = record.dfs_ancestor_index.expect("set above");
            record.dfs_ancestor_index = Some(current.min(ancestor));
        }
    }

    execute_module(agent, module)?;

    let record = &agent.modules[module.index()];
    if record.dfs_ancestor_index == record.dfs_index {
        // The whole SCC becomes evaluated together.
        loop {
            let done = stack.pop().expect("module on stack");
            agent.modules[done.index()].status = ModuleStatus::Evaluated;
            if done == module {
                break;
            }
        }
    }
    Ok(index)
}

/// Runs the module body machine to completion.
fn execute_module(agent: &mut Agent, module: ModuleId) -> JsResult<()> {
    let (source, realm, env) = {
        let record = &agent.modules[module.index()];
        (
            record.source,
            record.realm,
            record.environment.expect("linked module has an environment"),
        )
    };
    let root = agent.source(source).root;
    agent.push_context(
        ExecutionContext {
            function: None,
            realm,
            script_or_module: Some(ScriptOrModule::Module(module)),
            lexical_env: env,
            variable_env: env,
            private_env: None,
            function_name: None,
            call_span: Span::ZERO,
        },
        "module",
    );
    let result = (|| -> JsResult<()> {
        let mut machine = Machine::new(agent, source, root, true);
        match machine.run(agent, Resume::Start)? {
            MachineResult::Done(Completion::Normal(_)) => Ok(()),
            MachineResult::Done(Completion::Throw(t)) => Err(EngineError::Throw(t)),
            MachineResult::Done(_) => Err(EngineError::internal("loop completion escaped a module")),
            MachineResult::Suspended(_) => {
                Err(EngineError::internal("module evaluation is synchronous in this engine"))
            }
        }
    })();
    agent.pop_context();
    result
}

// --- exports ---

/// `GetExportedNames` with a star-cycle visited set.
fn exported_names(agent: &mut Agent, module: ModuleId, visited: &mut Vec<ModuleId>) -> JsResult<Vec<StringId>> {
    if visited.contains(&module) {
        return Ok(Vec::new());
    }
    visited.push(module);
    let record = &agent.modules[module.index()];
    let mut names: Vec<StringId> = record.local_exports.iter().map(|e| e.export_name).collect();
    names.extend(record.indirect_exports.iter().map(|e| e.export_name));
    let stars = record.star_exports.clone();
    for specifier in stars {
        let required = loaded_module(agent, module, &specifier)?;
        for name in exported_names(agent, required, visited)? {
            // Star exports never surface `default`.
            if name != agent.heap.statics.default && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// `ResolveExport`: walks the re-export graph. Not-found covers cycles;
/// ambiguity across star exports is reported as a sentinel for the caller
/// to interpret, never thrown from here.
pub(crate) fn resolve_export(
    agent: &mut Agent,
    module: ModuleId,
    export_name: StringId,
    resolve_set: &mut Vec<(ModuleId, StringId)>,
) -> JsResult<ExportResolution> {
    if resolve_set.contains(&(module, export_name)) {
        // Circular import request.
        return Ok(ExportResolution::NotFound);
    }
    resolve_set.push((module, export_name));

    let record = &agent.modules[module.index()];
    for entry in &record.local_exports {
        if entry.export_name == export_name {
            return Ok(ExportResolution::Resolved(ResolvedBinding::Binding {
                module,
                name: entry.local_name,
            }));
        }
    }
    let indirect = record.indirect_exports.clone();
    for entry in indirect {
        if entry.export_name == export_name {
            let specifier = entry.specifier.clone().expect("indirect exports carry a specifier");
            let imported = loaded_module(agent, module, &specifier)?;
            // `export * as ns from` shape is spelled as an indirect export
            // of the namespace.
            if entry.local_name == agent.heap.statics.namespace_export {
                return Ok(ExportResolution::Resolved(ResolvedBinding::Namespace { module: imported }));
            }
            return resolve_export(agent, imported, entry.local_name, resolve_set);
        }
    }
    if export_name == agent.heap.statics.default {
        // A default export never comes through a star.
        return Ok(ExportResolution::NotFound);
    }

    let stars = agent.modules[module.index()].star_exports.clone();
    let mut star_resolution: Option<ResolvedBinding> = None;
    for specifier in stars {
        let imported = loaded_module(agent, module, &specifier)?;
        match resolve_export(agent, imported, export_name, resolve_set)? {
            ExportResolution::Ambiguous => return Ok(ExportResolution::Ambiguous),
            ExportResolution::NotFound => {}
            ExportResolution::Resolved(resolution) => match &star_resolution {
                None => star_resolution = Some(resolution),
                Some(previous) if *previous == resolution => {}
                // Two star exports disagree on the binding.
                Some(_) => return Ok(ExportResolution::Ambiguous),
            },
        }
    }
    Ok(star_resolution.map_or(ExportResolution::NotFound, ExportResolution::Resolved))
}

/// `GetModuleNamespace`: lazily creates the namespace exotic object with
/// lexicographically sorted exports.
pub(crate) fn get_module_namespace(agent: &mut Agent, module: ModuleId) -> JsResult<ObjectId> {
    if let Some(ns) = agent.modules[module.index()].namespace {
        return Ok(ns);
    }
    let names = exported_names(agent, module, &mut Vec::new())?;
    let mut resolved = Vec::new();
    for name in names {
        // Ambiguous names are simply absent from the namespace; only
        // cleanly resolved exports appear.
        if let ExportResolution::Resolved(_) = resolve_export(agent, module, name, &mut Vec::new())? {
            resolved.push(name);
        }
    }
    resolved.sort_by(|a, b| {
        let a: &JsString = agent.heap.string(*a);
        let b: &JsString = agent.heap.string(*b);
        a.cmp(b)
    });
    let realm = agent.modules[module.index()].realm;
    let mut record = ObjectRecord::new(
        None,
        ObjectData::ModuleNamespace(Box::new(NamespaceData { module, exports: resolved })),
        realm,
    );
    record.extensible = false;
    let tag = agent.heap.intern_str("Module");
    record.properties.insert(
        PropertyKey::Symbol(agent.heap.well_known.to_string_tag),
        PropertyEntry::Data {
            value: Value::String(tag),
            writable: false,
            enumerable: false,
            configurable: false,
        },
    );
    let ns = agent.heap.alloc_object(record);
    agent.modules[module.index()].namespace = Some(ns);
    Ok(ns)
}

/// `import.meta` for the running module, created on first touch and passed
/// through the host hooks.
pub(crate) fn resolve_import_meta(agent: &mut Agent) -> JsResult<Value> {
    let Some(ScriptOrModule::Module(module)) = agent.running_context().script_or_module else {
        return Err(agent.throw_error(ErrorKind::Syntax, "import.meta outside a module"));
    };
    if let Some(meta) = agent.modules[module.index()].import_meta {
        return Ok(Value::Object(meta));
    }
    let realm = agent.modules[module.index()].realm;
    let meta = agent
        .heap
        .alloc_object(ObjectRecord::new(None, ObjectData::Ordinary, realm));
    let hooks = std::rc::Rc::clone(&agent.hooks);
    let properties = hooks.get_import_meta_properties(agent, module);
    for (name, value) in properties {
        let key = agent.key_from_str(&name);
        crate::operations::create_data_property_or_throw(agent, meta, key, value)?;
    }
    hooks.finalize_import_meta(agent, Value::Object(meta), module)?;
    agent.modules[module.index()].import_meta = Some(meta);
    Ok(Value::Object(meta))
}
