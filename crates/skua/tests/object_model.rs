//! Object-model invariants observed through language behavior: key
//! ordering, prototype walks, proxies, and integrity levels.

mod common;

use common::{eval, global};
use pretty_assertions::assert_eq;
use skua::ast::BinaryOp;
use skua::Value;

#[test]
fn own_keys_order_integer_then_string_then_symbol() {
    // Insertion deliberately scrambles: string, index, another index,
    // another string; ownKeys reports indexes ascending first.
    let (mut agent, result) = eval(|b| {
        let obj = b.object(vec![]);
        let decl = b.var("o", Some(obj));
        let writes: Vec<(&str, f64)> = vec![("b", 1.0), ("2", 2.0), ("0", 3.0), ("a", 4.0)];
        let mut stmts = vec![decl];
        for (key, val) in writes {
            let o = b.ident("o");
            let k = b.str_(key);
            let slot = b.index(o, k);
            let v = b.num(val);
            let assign = b.assign(slot, v);
            stmts.push(b.expr(assign));
        }
        let reflect = b.ident("Reflect");
        let own_keys = b.member(reflect, "ownKeys");
        let o = b.ident("o");
        let keys = b.call(own_keys, vec![o]);
        let joined = b.method(keys, "join", vec![]);
        stmts.push(b.set_global("order", joined));
        stmts
    });
    result.unwrap();
    let order = global(&mut agent, "order");
    assert_eq!(agent.as_string(order).as_deref(), Some("0,2,b,a"));
}

#[test]
fn has_property_walks_the_prototype_chain() {
    let (mut agent, result) = eval(|b| {
        // var proto = {inherited: 1}; var o = Object.create(proto);
        let one = b.num(1.0);
        let proto = b.object(vec![("inherited", one)]);
        let proto_decl = b.var("proto", Some(proto));
        let object_ctor = b.ident("Object");
        let create = b.member(object_ctor, "create");
        let proto_ref = b.ident("proto");
        let o = b.call(create, vec![proto_ref]);
        let o_decl = b.var("o", Some(o));
        let key = b.str_("inherited");
        let o_ref = b.ident("o");
        let has = b.bin(BinaryOp::In, key, o_ref);
        let record = b.set_global("viaChain", has);
        let missing_key = b.str_("missing");
        let o_ref2 = b.ident("o");
        let has_missing = b.bin(BinaryOp::In, missing_key, o_ref2);
        let record_missing = b.set_global("missing", has_missing);
        let o_ref3 = b.ident("o");
        let read = b.member(o_ref3, "inherited");
        let record_read = b.set_global("value", read);
        vec![proto_decl, o_decl, record, record_missing, record_read]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "viaChain"), Value::Boolean(true));
    assert_eq!(global(&mut agent, "missing"), Value::Boolean(false));
    assert_eq!(global(&mut agent, "value"), Value::Number(1.0));
}

#[test]
fn proxy_get_trap_intercepts_and_falls_back() {
    let (mut agent, result) = eval(|b| {
        // var target = {present: 7};
        // var p = new Proxy(target, {get: function(t, k){ return k === 'virtual' ? 42 : Reflect.get(t, k); }});
        let seven = b.num(7.0);
        let target = b.object(vec![("present", seven)]);
        let target_decl = b.var("target", Some(target));

        let k = b.ident("k");
        let virtual_key = b.str_("virtual");
        let is_virtual = b.bin(BinaryOp::StrictEquals, k, virtual_key);
        let forty_two = b.num(42.0);
        let reflect = b.ident("Reflect");
        let reflect_get = b.member(reflect, "get");
        let t = b.ident("t");
        let k2 = b.ident("k");
        let fallback = b.call(reflect_get, vec![t, k2]);
        let pick = b.conditional(is_virtual, forty_two, fallback);
        let ret = b.ret(Some(pick));
        let getter = b.func_expr(&["t", "k"], vec![ret]);
        let handler = b.object(vec![("get", getter)]);

        let proxy_ctor = b.ident("Proxy");
        let target_ref = b.ident("target");
        let proxy = b.new_expr(proxy_ctor, vec![target_ref, handler]);
        let p_decl = b.var("p", Some(proxy));

        let p1 = b.ident("p");
        let virtual_read = b.member(p1, "virtual");
        let record_virtual = b.set_global("virtualValue", virtual_read);
        let p2 = b.ident("p");
        let present_read = b.member(p2, "present");
        let record_present = b.set_global("presentValue", present_read);
        vec![target_decl, p_decl, record_virtual, record_present]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "virtualValue"), Value::Number(42.0));
    assert_eq!(global(&mut agent, "presentValue"), Value::Number(7.0));
}

#[test]
fn revoked_proxy_refuses_access() {
    let (mut agent, result) = eval(|b| {
        let target = b.object(vec![]);
        let handler = b.object(vec![]);
        let proxy_ctor = b.ident("Proxy");
        let revocable = b.member(proxy_ctor, "revocable");
        let pair = b.call(revocable, vec![target, handler]);
        let pair_decl = b.var("pair", Some(pair));
        let pair_ref = b.ident("pair");
        let revoke = b.member(pair_ref, "revoke");
        let do_revoke = b.call(revoke, vec![]);
        let revoke_stmt = b.expr(do_revoke);
        // try { pair.proxy.x } catch (e) { caught = e instanceof TypeError }
        let pair_ref2 = b.ident("pair");
        let proxy = b.member(pair_ref2, "proxy");
        let read = b.member(proxy, "x");
        let read_stmt = b.expr(read);
        let try_block = b.block(vec![read_stmt]);
        let e = b.ident("e");
        let type_error = b.ident("TypeError");
        let check = b.bin(BinaryOp::InstanceOf, e, type_error);
        let record = b.set_global("caught", check);
        let catch_block = b.block(vec![record]);
        let guarded = b.try_catch(try_block, Some("e"), catch_block);
        vec![pair_decl, revoke_stmt, guarded]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "caught"), Value::Boolean(true));
}

#[test]
fn frozen_object_silently_ignores_sloppy_writes() {
    let (mut agent, result) = eval(|b| {
        let one = b.num(1.0);
        let obj = b.object(vec![("x", one)]);
        let decl = b.var("o", Some(obj));
        let object_ctor = b.ident("Object");
        let freeze = b.member(object_ctor, "freeze");
        let o = b.ident("o");
        let frozen = b.call(freeze, vec![o]);
        let freeze_stmt = b.expr(frozen);
        let o2 = b.ident("o");
        let slot = b.member(o2, "x");
        let two = b.num(2.0);
        let write = b.assign(slot, two);
        let write_stmt = b.expr(write);
        let o3 = b.ident("o");
        let read = b.member(o3, "x");
        let record = b.set_global("after", read);
        vec![decl, freeze_stmt, write_stmt, record]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "after"), Value::Number(1.0));
}

#[test]
fn class_private_fields_stay_per_instance() {
    let (mut agent, result) = eval(|b| {
        // class Counter { #n = 0; bump() { this.#n = this.#n + 1; return this.#n; } }
        use skua::ast::{ClassElement, ClassElementKind, ClassKey};
        let zero = b.num(0.0);
        let this1 = b.this();
        let read1 = b.ast.push(
            skua::ast::Node::PrivateMember { object: this1, name: "n".into() },
            skua::ast::Span::ZERO,
        );
        let one = b.num(1.0);
        let sum = b.bin(BinaryOp::Add, read1, one);
        let this2 = b.this();
        let write_target = b.ast.push(
            skua::ast::Node::PrivateMember { object: this2, name: "n".into() },
            skua::ast::Span::ZERO,
        );
        let write = b.assign(write_target, sum);
        let write_stmt = b.expr(write);
        let this3 = b.this();
        let read2 = b.ast.push(
            skua::ast::Node::PrivateMember { object: this3, name: "n".into() },
            skua::ast::Span::ZERO,
        );
        let ret = b.ret(Some(read2));
        let bump = b.func_expr(&[], vec![write_stmt, ret]);
        let class = b.class_expr(
            Some("Counter"),
            None,
            vec![
                ClassElement {
                    kind: ClassElementKind::Field,
                    is_static: false,
                    key: ClassKey::Private("n".into()),
                    value: Some(zero),
                },
                ClassElement {
                    kind: ClassElementKind::Method,
                    is_static: false,
                    key: ClassKey::Ident("bump".into()),
                    value: Some(bump),
                },
            ],
        );
        let class_decl = b.var("Counter", Some(class));

        let ctor1 = b.ident("Counter");
        let a = b.new_expr(ctor1, vec![]);
        let a_decl = b.var("a", Some(a));
        let ctor2 = b.ident("Counter");
        let b_obj = b.new_expr(ctor2, vec![]);
        let b_decl = b.var("b", Some(b_obj));

        let a1 = b.ident("a");
        let bump_a = b.method(a1, "bump", vec![]);
        let bump_a_stmt = b.expr(bump_a);
        let a2 = b.ident("a");
        let bump_a2 = b.method(a2, "bump", vec![]);
        let record_a = b.set_global("aCount", bump_a2);
        let b1 = b.ident("b");
        let bump_b = b.method(b1, "bump", vec![]);
        let record_b = b.set_global("bCount", bump_b);
        vec![class_decl, a_decl, b_decl, bump_a_stmt, record_a, record_b]
    });
    result.unwrap();
    // a bumped twice, b once; the fields never alias.
    assert_eq!(global(&mut agent, "aCount"), Value::Number(2.0));
    assert_eq!(global(&mut agent, "bCount"), Value::Number(1.0));
}

#[test]
fn derived_class_calls_super_and_inherits() {
    let (mut agent, result) = eval(|b| {
        use skua::ast::{ClassElement, ClassElementKind, ClassKey};
        // class Base { constructor(v){ this.v = v; } double(){ return this.v * 2; } }
        let this1 = b.this();
        let slot = b.member(this1, "v");
        let v = b.ident("v");
        let store = b.assign(slot, v);
        let store_stmt = b.expr(store);
        let base_ctor = b.func_expr(&["v"], vec![store_stmt]);
        let this2 = b.this();
        let v_read = b.member(this2, "v");
        let two = b.num(2.0);
        let doubled = b.bin(BinaryOp::Mul, v_read, two);
        let ret = b.ret(Some(doubled));
        let double = b.func_expr(&[], vec![ret]);
        let base = b.class_expr(
            Some("Base"),
            None,
            vec![
                ClassElement {
                    kind: ClassElementKind::Method,
                    is_static: false,
                    key: ClassKey::Ident("constructor".into()),
                    value: Some(base_ctor),
                },
                ClassElement {
                    kind: ClassElementKind::Method,
                    is_static: false,
                    key: ClassKey::Ident("double".into()),
                    value: Some(double),
                },
            ],
        );
        let base_decl = b.var("Base", Some(base));

        // class Derived extends Base {} — default ctor forwards to super.
        let heritage = b.ident("Base");
        let derived = b.class_expr(Some("Derived"), Some(heritage), vec![]);
        let derived_decl = b.var("Derived", Some(derived));

        let ctor = b.ident("Derived");
        let twenty_one = b.num(21.0);
        let instance = b.new_expr(ctor, vec![twenty_one]);
        let inst_decl = b.var("d", Some(instance));
        let d = b.ident("d");
        let result = b.method(d, "double", vec![]);
        let record = b.set_global("out", result);
        vec![base_decl, derived_decl, inst_decl, record]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "out"), Value::Number(42.0));
}

#[test]
fn reachability_census_counts_live_graph() {
    let (agent, result) = eval(|b| {
        let one = b.num(1.0);
        let inner = b.object(vec![("x", one)]);
        let outer = b.object(vec![("inner", inner)]);
        vec![b.var("keep", Some(outer))]
    });
    result.unwrap();
    // The trace from realm/global roots must reach at least the two fresh
    // objects plus the intrinsics.
    assert!(agent.reachable_object_count() > 100);
}
