//! Module linking, evaluation, export resolution and namespace objects.

mod common;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use common::B;
use pretty_assertions::assert_eq;
use skua::ast::{BinaryOp, ExportSpecifier, ImportSpecifier, Node, Span};
use skua::{Agent, AgentOptions, EngineError, HostHooks, ModuleId, ModuleStatus, ScriptOrModule, Value};

/// A host that resolves specifiers from a pre-registered map.
#[derive(Debug, Default)]
struct MapHost {
    modules: RefCell<HashMap<String, ModuleId>>,
}

impl MapHost {
    fn register(&self, specifier: &str, id: ModuleId) {
        self.modules.borrow_mut().insert(specifier.to_owned(), id);
    }
}

impl HostHooks for MapHost {
    fn load_imported_module(
        &self,
        agent: &mut Agent,
        _referrer: ScriptOrModule,
        specifier: &str,
    ) -> Result<ModuleId, EngineError> {
        match self.modules.borrow().get(specifier) {
            Some(&id) => Ok(id),
            None => {
                Err(agent.throw_error(skua::ErrorKind::TypeError, format!("unknown module '{specifier}'")))
            }
        }
    }
}

fn agent_with_host() -> (Agent, Rc<MapHost>) {
    let host = Rc::new(MapHost::default());
    let agent = Agent::new(AgentOptions {
        hooks: Rc::clone(&host) as Rc<dyn HostHooks>,
        ..AgentOptions::default()
    });
    (agent, host)
}

/// `export const x = 7; export function triple(n){ return n * 3; }`
fn dependency_module(agent: &mut Agent) -> ModuleId {
    let mut b = B::new();
    let seven = b.num(7.0);
    let x_decl = b.const_("x", seven);
    let export_x = b.ast.push(Node::ExportDecl(x_decl), Span::ZERO);
    let n = b.ident("n");
    let three = b.num(3.0);
    let product = b.bin(BinaryOp::Mul, n, three);
    let ret = b.ret(Some(product));
    let triple = b.func_decl("triple", &["n"], vec![ret]);
    let export_triple = b.ast.push(Node::ExportDecl(triple), Span::ZERO);
    let (ast, root) = b.module(vec![export_x, export_triple]);
    let realm = agent.initial_realm();
    agent.add_module(ast, root, "dep", realm)
}

#[test]
fn imports_resolve_across_modules() {
    let (mut agent, host) = agent_with_host();
    let dep = dependency_module(&mut agent);
    host.register("dep", dep);

    // import { x, triple } from 'dep'; result = triple(x) + x;
    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "dep".into(),
            default: None,
            namespace: None,
            named: vec![
                ImportSpecifier { import: "x".into(), local: "x".into() },
                ImportSpecifier { import: "triple".into(), local: "triple".into() },
            ],
        },
        Span::ZERO,
    );
    let triple = b.ident("triple");
    let x = b.ident("x");
    let call = b.call(triple, vec![x]);
    let x2 = b.ident("x");
    let sum = b.bin(BinaryOp::Add, call, x2);
    let globals = b.ident("globalThis");
    let slot = b.member(globals, "result");
    let record = b.assign(slot, sum);
    let record_stmt = b.expr(record);
    let (ast, root) = b.module(vec![import, record_stmt]);
    let realm = agent.initial_realm();
    let main = agent.add_module(ast, root, "main", realm);

    agent.evaluate_module(main).unwrap();
    assert_eq!(agent.module_status(main), ModuleStatus::Evaluated);
    assert_eq!(agent.module_status(dep), ModuleStatus::Evaluated);
    let global = agent.global_object(realm);
    assert_eq!(agent.get_property(global, "result").unwrap(), Value::Number(28.0));
}

#[test]
fn namespace_keys_sort_lexicographically() {
    let (mut agent, host) = agent_with_host();
    // Exports declared out of order: z, a, m.
    let mut b = B::new();
    let one = b.num(1.0);
    let z = b.const_("z", one);
    let export_z = b.ast.push(Node::ExportDecl(z), Span::ZERO);
    let two = b.num(2.0);
    let a = b.const_("a", two);
    let export_a = b.ast.push(Node::ExportDecl(a), Span::ZERO);
    let three = b.num(3.0);
    let m = b.const_("m", three);
    let export_m = b.ast.push(Node::ExportDecl(m), Span::ZERO);
    let (ast, root) = b.module(vec![export_z, export_a, export_m]);
    let realm = agent.initial_realm();
    let dep = agent.add_module(ast, root, "scrambled", realm);
    host.register("scrambled", dep);

    // import * as ns from 'scrambled'; order = Reflect.ownKeys(ns).join();
    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "scrambled".into(),
            default: None,
            namespace: Some("ns".into()),
            named: vec![],
        },
        Span::ZERO,
    );
    let reflect = b.ident("Reflect");
    let own_keys = b.member(reflect, "ownKeys");
    let ns = b.ident("ns");
    let keys = b.call(own_keys, vec![ns]);
    let joined = b.method(keys, "join", vec![]);
    let globals = b.ident("globalThis");
    let slot = b.member(globals, "order");
    let record = b.assign(slot, joined);
    let record_stmt = b.expr(record);
    let (ast, root) = b.module(vec![import, record_stmt]);
    let main = agent.add_module(ast, root, "main", realm);

    agent.evaluate_module(main).unwrap();
    let global = agent.global_object(realm);
    let order = agent.get_property(global, "order").unwrap();
    assert_eq!(agent.as_string(order).as_deref(), Some("a,m,z"));
}

#[test]
fn cyclic_modules_link_and_evaluate_once() {
    let (mut agent, host) = agent_with_host();
    let realm = agent.initial_realm();

    // a: import { bee } from 'b'; export function aye(){ return 'a'; }
    //    export const fromB = bee();
    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "b".into(),
            default: None,
            namespace: None,
            named: vec![ImportSpecifier { import: "bee".into(), local: "bee".into() }],
        },
        Span::ZERO,
    );
    let a_text = b.str_("a");
    let ret = b.ret(Some(a_text));
    let aye = b.func_decl("aye", &[], vec![ret]);
    let export_aye = b.ast.push(Node::ExportDecl(aye), Span::ZERO);
    let bee = b.ident("bee");
    let call = b.call(bee, vec![]);
    let from_b = b.const_("fromB", call);
    let export_from_b = b.ast.push(Node::ExportDecl(from_b), Span::ZERO);
    let (ast, root) = b.module(vec![import, export_aye, export_from_b]);
    let module_a = agent.add_module(ast, root, "a", realm);

    // b: import { aye } from 'a'; export function bee(){ return 'b'; }
    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "a".into(),
            default: None,
            namespace: None,
            named: vec![ImportSpecifier { import: "aye".into(), local: "aye".into() }],
        },
        Span::ZERO,
    );
    let b_text = b.str_("b");
    let ret = b.ret(Some(b_text));
    let bee = b.func_decl("bee", &[], vec![ret]);
    let export_bee = b.ast.push(Node::ExportDecl(bee), Span::ZERO);
    let (ast, root) = b.module(vec![import, export_bee]);
    let module_b = agent.add_module(ast, root, "b", realm);

    host.register("a", module_a);
    host.register("b", module_b);

    agent.evaluate_module(module_a).unwrap();
    assert_eq!(agent.module_status(module_a), ModuleStatus::Evaluated);
    assert_eq!(agent.module_status(module_b), ModuleStatus::Evaluated);
}

#[test]
fn reexports_resolve_through_the_graph() {
    let (mut agent, host) = agent_with_host();
    let realm = agent.initial_realm();

    // leaf: export const answer = 42;
    let mut b = B::new();
    let forty_two = b.num(42.0);
    let answer = b.const_("answer", forty_two);
    let export_answer = b.ast.push(Node::ExportDecl(answer), Span::ZERO);
    let (ast, root) = b.module(vec![export_answer]);
    let leaf = agent.add_module(ast, root, "leaf", realm);
    host.register("leaf", leaf);

    // hub: export { answer } from 'leaf';
    let mut b = B::new();
    let reexport = b.ast.push(
        Node::ExportNamed {
            specifier: Some("leaf".into()),
            named: vec![ExportSpecifier { local: "answer".into(), export: "answer".into() }],
        },
        Span::ZERO,
    );
    let (ast, root) = b.module(vec![reexport]);
    let hub = agent.add_module(ast, root, "hub", realm);
    host.register("hub", hub);

    // main: import { answer } from 'hub'; globalThis.out = answer;
    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "hub".into(),
            default: None,
            namespace: None,
            named: vec![ImportSpecifier { import: "answer".into(), local: "answer".into() }],
        },
        Span::ZERO,
    );
    let globals = b.ident("globalThis");
    let slot = b.member(globals, "out");
    let answer = b.ident("answer");
    let record = b.assign(slot, answer);
    let record_stmt = b.expr(record);
    let (ast, root) = b.module(vec![import, record_stmt]);
    let main = agent.add_module(ast, root, "main", realm);

    agent.evaluate_module(main).unwrap();
    let global = agent.global_object(realm);
    assert_eq!(agent.get_property(global, "out").unwrap(), Value::Number(42.0));
}

#[test]
fn missing_export_fails_at_link_time() {
    let (mut agent, host) = agent_with_host();
    let realm = agent.initial_realm();
    let b = B::new();
    let (ast, root) = b.module(vec![]);
    let dep = agent.add_module(ast, root, "empty", realm);
    host.register("empty", dep);

    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "empty".into(),
            default: None,
            namespace: None,
            named: vec![ImportSpecifier { import: "ghost".into(), local: "ghost".into() }],
        },
        Span::ZERO,
    );
    let (ast, root) = b.module(vec![import]);
    let main = agent.add_module(ast, root, "main", realm);

    let error = agent.link_module(main).expect_err("link must fail");
    let rendered = agent.render_error(&error);
    assert!(rendered.contains("ghost"), "names the missing export: {rendered}");
}

/// Hub module re-exporting two leaves that both export `x`, plus its own
/// `y`: `export * from 'left'; export * from 'right'; export const y = 1;`
fn ambiguous_hub(agent: &mut Agent, host: &MapHost) {
    let realm = agent.initial_realm();
    for (specifier, value) in [("left", 10.0), ("right", 20.0)] {
        let mut b = B::new();
        let n = b.num(value);
        let x = b.const_("x", n);
        let export_x = b.ast.push(Node::ExportDecl(x), Span::ZERO);
        let (ast, root) = b.module(vec![export_x]);
        let leaf = agent.add_module(ast, root, specifier, realm);
        host.register(specifier, leaf);
    }

    let mut b = B::new();
    let star_left = b.ast.push(Node::ExportStar { specifier: "left".into() }, Span::ZERO);
    let star_right = b.ast.push(Node::ExportStar { specifier: "right".into() }, Span::ZERO);
    let one = b.num(1.0);
    let y = b.const_("y", one);
    let export_y = b.ast.push(Node::ExportDecl(y), Span::ZERO);
    let (ast, root) = b.module(vec![star_left, star_right, export_y]);
    let hub = agent.add_module(ast, root, "hub", realm);
    host.register("hub", hub);
}

#[test]
fn ambiguous_star_export_is_absent_from_the_namespace() {
    let (mut agent, host) = agent_with_host();
    let realm = agent.initial_realm();
    ambiguous_hub(&mut agent, &host);

    // import * as ns from 'hub' must succeed: the colliding `x` is simply
    // not among the namespace keys, while `y` resolves normally.
    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "hub".into(),
            default: None,
            namespace: Some("ns".into()),
            named: vec![],
        },
        Span::ZERO,
    );
    let reflect = b.ident("Reflect");
    let own_keys = b.member(reflect, "ownKeys");
    let ns = b.ident("ns");
    let keys = b.call(own_keys, vec![ns]);
    let joined = b.method(keys, "join", vec![]);
    let globals = b.ident("globalThis");
    let keys_slot = b.member(globals, "keys");
    let record_keys = b.assign(keys_slot, joined);
    let record_keys_stmt = b.expr(record_keys);
    let ns2 = b.ident("ns");
    let y_read = b.member(ns2, "y");
    let globals2 = b.ident("globalThis");
    let y_slot = b.member(globals2, "y");
    let record_y = b.assign(y_slot, y_read);
    let record_y_stmt = b.expr(record_y);
    let ns3 = b.ident("ns");
    let x_read = b.member(ns3, "x");
    let globals3 = b.ident("globalThis");
    let x_slot = b.member(globals3, "x");
    let record_x = b.assign(x_slot, x_read);
    let record_x_stmt = b.expr(record_x);
    let (ast, root) = b.module(vec![import, record_keys_stmt, record_y_stmt, record_x_stmt]);
    let main = agent.add_module(ast, root, "main", realm);

    agent.evaluate_module(main).unwrap();
    let global = agent.global_object(realm);
    let keys = agent.get_property(global, "keys").unwrap();
    assert_eq!(agent.as_string(keys).as_deref(), Some("y"));
    assert_eq!(agent.get_property(global, "y").unwrap(), Value::Number(1.0));
    assert_eq!(agent.get_property(global, "x").unwrap(), Value::Undefined);
}

#[test]
fn named_import_of_an_ambiguous_export_fails_at_link_time() {
    let (mut agent, host) = agent_with_host();
    let realm = agent.initial_realm();
    ambiguous_hub(&mut agent, &host);

    let mut b = B::new();
    let import = b.ast.push(
        Node::Import {
            specifier: "hub".into(),
            default: None,
            namespace: None,
            named: vec![ImportSpecifier { import: "x".into(), local: "x".into() }],
        },
        Span::ZERO,
    );
    let (ast, root) = b.module(vec![import]);
    let main = agent.add_module(ast, root, "main", realm);

    let error = agent.link_module(main).expect_err("link must fail");
    let rendered = agent.render_error(&error);
    assert!(rendered.contains("ambiguous"), "reports the ambiguity: {rendered}");
}
