//! Generator and async-generator state machines.

mod common;

use common::{eval, global};
use pretty_assertions::assert_eq;
use skua::ast::BinaryOp;
use skua::Value;

#[test]
fn generator_yields_receives_and_returns() {
    // function* gen(){ var x = yield 1; yield x + 1; return 5; }
    let (mut agent, result) = eval(|b| {
        let one = b.num(1.0);
        let first_yield = b.yield_(Some(one));
        let x_decl = b.var("x", Some(first_yield));
        let x = b.ident("x");
        let one_more = b.num(1.0);
        let sum = b.bin(BinaryOp::Add, x, one_more);
        let second_yield = b.yield_(Some(sum));
        let second_stmt = b.expr(second_yield);
        let five = b.num(5.0);
        let ret = b.ret(Some(five));
        let r#gen = b.generator_decl("gen", &[], vec![x_decl, second_stmt, ret]);

        let gen_ref = b.ident("gen");
        let make = b.call(gen_ref, vec![]);
        let it_decl = b.var("it", Some(make));

        let record = |b: &mut common::B, slot: &str, arg: Option<skua::ast::NodeId>| {
            let it = b.ident("it");
            let args = arg.into_iter().collect();
            let next = b.method(it, "next", args);
            b.set_global(slot, next)
        };
        let r1 = record(b, "r1", None);
        let ten = b.num(10.0);
        let r2 = record(b, "r2", Some(ten));
        let r3 = record(b, "r3", None);
        let r4 = record(b, "r4", None);
        vec![r#gen, it_decl, r1, r2, r3, r4]
    });
    result.unwrap();

    let r1 = global(&mut agent, "r1");
    assert_eq!(agent.get_property(r1, "value").unwrap(), Value::Number(1.0));
    assert_eq!(agent.get_property(r1, "done").unwrap(), Value::Boolean(false));

    // The second resume feeds 10 into the suspended yield.
    let r2 = global(&mut agent, "r2");
    assert_eq!(agent.get_property(r2, "value").unwrap(), Value::Number(11.0));
    assert_eq!(agent.get_property(r2, "done").unwrap(), Value::Boolean(false));

    let r3 = global(&mut agent, "r3");
    assert_eq!(agent.get_property(r3, "value").unwrap(), Value::Number(5.0));
    assert_eq!(agent.get_property(r3, "done").unwrap(), Value::Boolean(true));

    let r4 = global(&mut agent, "r4");
    assert_eq!(agent.get_property(r4, "value").unwrap(), Value::Undefined);
    assert_eq!(agent.get_property(r4, "done").unwrap(), Value::Boolean(true));
}

#[test]
fn generator_return_unwinds_through_finally() {
    // function* gen(){ try { yield 1; } finally { ran = true; } }
    let (mut agent, result) = eval(|b| {
        let one = b.num(1.0);
        let y = b.yield_(Some(one));
        let y_stmt = b.expr(y);
        let try_block = b.block(vec![y_stmt]);
        let true_val = b.boolean(true);
        let mark = b.set_global("ran", true_val);
        let finally_block = b.block(vec![mark]);
        let guarded = b.try_finally(try_block, finally_block);
        let r#gen = b.generator_decl("gen", &[], vec![guarded]);

        let gen_ref = b.ident("gen");
        let make = b.call(gen_ref, vec![]);
        let it_decl = b.var("it", Some(make));
        let it1 = b.ident("it");
        let start = b.method(it1, "next", vec![]);
        let start_stmt = b.expr(start);
        let it2 = b.ident("it");
        let seven = b.num(7.0);
        let finish = b.method(it2, "return", vec![seven]);
        let record = b.set_global("result", finish);
        vec![r#gen, it_decl, start_stmt, record]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "ran"), Value::Boolean(true));
    let r = global(&mut agent, "result");
    assert_eq!(agent.get_property(r, "value").unwrap(), Value::Number(7.0));
    assert_eq!(agent.get_property(r, "done").unwrap(), Value::Boolean(true));
}

#[test]
fn generator_iterates_with_for_of() {
    let (mut agent, result) = eval(|b| {
        let one = b.num(1.0);
        let y1 = b.yield_(Some(one));
        let s1 = b.expr(y1);
        let two = b.num(2.0);
        let y2 = b.yield_(Some(two));
        let s2 = b.expr(y2);
        let r#gen = b.generator_decl("gen", &[], vec![s1, s2]);

        let zero = b.num(0.0);
        let init = b.set_global("sum", zero);
        let gen_ref = b.ident("gen");
        let iterable = b.call(gen_ref, vec![]);
        let binding = b.let_("v", None);
        let sum = b.ident("sum");
        let v = b.ident("v");
        let add = b.assign_op(BinaryOp::Add, sum, v);
        let add_stmt = b.expr(add);
        let body = b.block(vec![add_stmt]);
        let loop_stmt = b.for_of(binding, iterable, body);
        vec![r#gen, init, loop_stmt]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "sum"), Value::Number(3.0));
}

#[test]
fn async_generator_yields_across_awaits() {
    // (async function*(){ yield 1; yield await Promise.resolve(2); })()
    // iterated three times through the job queue.
    let (mut agent, result) = eval(|b| {
        let one = b.num(1.0);
        let y1 = b.yield_(Some(one));
        let s1 = b.expr(y1);
        let promise_ctor = b.ident("Promise");
        let resolve = b.member(promise_ctor, "resolve");
        let two = b.num(2.0);
        let resolved = b.call(resolve, vec![two]);
        let awaited = b.await_(resolved);
        let y2 = b.yield_(Some(awaited));
        let s2 = b.expr(y2);
        let agen = b.async_generator_expr(&[], vec![s1, s2]);
        let instance = b.call(agen, vec![]);
        let g_decl = b.var("g", Some(instance));

        let record = |b: &mut common::B, value_slot: &str, done_slot: &str| {
            let g = b.ident("g");
            let next = b.method(g, "next", vec![]);
            let r = b.ident("r");
            let value = b.member(r, "value");
            let value_target = b.ident(value_slot);
            let record_value = b.assign(value_target, value);
            let record_value_stmt = b.expr(record_value);
            let r2 = b.ident("r");
            let done = b.member(r2, "done");
            let done_target = b.ident(done_slot);
            let record_done = b.assign(done_target, done);
            let record_done_stmt = b.expr(record_done);
            let handler = b.arrow_block(&["r"], vec![record_value_stmt, record_done_stmt]);
            let then = b.method(next, "then", vec![handler]);
            b.expr(then)
        };
        let first = record(b, "v1", "d1");
        let second = record(b, "v2", "d2");
        let third = record(b, "v3", "d3");
        vec![g_decl, first, second, third]
    });
    result.unwrap();

    assert_eq!(global(&mut agent, "v1"), Value::Number(1.0));
    assert_eq!(global(&mut agent, "d1"), Value::Boolean(false));
    assert_eq!(global(&mut agent, "v2"), Value::Number(2.0));
    assert_eq!(global(&mut agent, "d2"), Value::Boolean(false));
    assert_eq!(global(&mut agent, "v3"), Value::Undefined);
    assert_eq!(global(&mut agent, "d3"), Value::Boolean(true));
}
