//! End-to-end evaluation behavior driven through the public API.

mod common;

use common::{eval, global, B};
use pretty_assertions::assert_eq;
use skua::ast::{BinaryOp, UnaryOp};
use skua::{EngineError, Value};

#[test]
fn iife_adds_numbers() {
    // (function(){ return 1 + 2; })()
    let (_, result) = eval(|b| {
        let one = b.num(1.0);
        let two = b.num(2.0);
        let sum = b.bin(BinaryOp::Add, one, two);
        let ret = b.ret(Some(sum));
        let func = b.func_expr(&[], vec![ret]);
        let call = b.call(func, vec![]);
        vec![b.expr(call)]
    });
    assert_eq!(result.unwrap(), Value::Number(3.0));
}

#[test]
fn default_sort_orders_numerically_small_digits() {
    // [3,1,2].sort() -> [1,2,3] under the default string ordering
    let (mut agent, result) = eval(|b| {
        let items = vec![b.num(3.0), b.num(1.0), b.num(2.0)];
        let array = b.array(items);
        let sorted = b.method(array, "sort", vec![]);
        let joined = b.method(sorted, "join", vec![]);
        vec![b.expr(joined)]
    });
    let value = result.unwrap();
    assert_eq!(agent.as_string(value).as_deref(), Some("1,2,3"));
}

#[test]
fn sort_comparator_nan_counts_as_equal() {
    // A comparator that always reports NaN keeps the original order.
    let (mut agent, result) = eval(|b| {
        let items = vec![b.num(3.0), b.num(1.0), b.num(2.0)];
        let array = b.array(items);
        let nan = b.ident("NaN");
        let comparator = b.arrow(&["a", "b"], nan);
        let sorted = b.method(array, "sort", vec![comparator]);
        let joined = b.method(sorted, "join", vec![]);
        vec![b.expr(joined)]
    });
    let value = result.unwrap();
    assert_eq!(agent.as_string(value).as_deref(), Some("3,1,2"));
}

#[test]
fn high_index_write_grows_length_and_truncation_clears() {
    // var a = []; a[4294967294] = 1; -> length 4294967295
    let (mut agent, result) = eval(|b| {
        let empty = b.array(vec![]);
        let decl = b.var("a", Some(empty));
        let a = b.ident("a");
        let idx = b.num(4_294_967_294.0);
        let slot = b.index(a, idx);
        let one = b.num(1.0);
        let write = b.assign(slot, one);
        let write_stmt = b.expr(write);
        let a2 = b.ident("a");
        let len = b.member(a2, "length");
        let record_len = b.set_global("lenBefore", len);
        // a.length = 0; then record the aftermath.
        let a3 = b.ident("a");
        let len_slot = b.member(a3, "length");
        let zero = b.num(0.0);
        let truncate = b.assign(len_slot, zero);
        let truncate_stmt = b.expr(truncate);
        let a4 = b.ident("a");
        let len_after = b.member(a4, "length");
        let record_after = b.set_global("lenAfter", len_after);
        let a5 = b.ident("a");
        let idx2 = b.num(4_294_967_294.0);
        let slot2 = b.index(a5, idx2);
        let probe = b.set_global("survivor", slot2);
        vec![decl, write_stmt, record_len, truncate_stmt, record_after, probe]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "lenBefore"), Value::Number(4_294_967_295.0));
    assert_eq!(global(&mut agent, "lenAfter"), Value::Number(0.0));
    assert_eq!(global(&mut agent, "survivor"), Value::Undefined);
}

#[test]
fn define_property_defaults_and_rejection() {
    // Object.defineProperty(o, 'x', {value: 1}) locks everything down; a
    // second define with a new value throws a TypeError.
    let (mut agent, result) = eval(|b| {
        let obj = b.object(vec![]);
        let decl = b.var("o", Some(obj));

        let object_ctor = b.ident("Object");
        let define = b.member(object_ctor, "defineProperty");
        let o = b.ident("o");
        let key = b.str_("x");
        let one = b.num(1.0);
        let desc = b.object(vec![("value", one)]);
        let call = b.call(define, vec![o, key, desc]);
        let define_stmt = b.expr(call);

        let object_ctor2 = b.ident("Object");
        let get_desc = b.member(object_ctor2, "getOwnPropertyDescriptor");
        let o2 = b.ident("o");
        let key2 = b.str_("x");
        let desc_call = b.call(get_desc, vec![o2, key2]);
        let record = b.set_global("desc", desc_call);

        // try { Object.defineProperty(o, 'x', {value: 2}) } catch (e) { caught = e instanceof TypeError }
        let object_ctor3 = b.ident("Object");
        let define2 = b.member(object_ctor3, "defineProperty");
        let o3 = b.ident("o");
        let key3 = b.str_("x");
        let two = b.num(2.0);
        let desc2 = b.object(vec![("value", two)]);
        let redefine = b.call(define2, vec![o3, key3, desc2]);
        let redefine_stmt = b.expr(redefine);
        let try_block = b.block(vec![redefine_stmt]);
        let e = b.ident("e");
        let type_error = b.ident("TypeError");
        let is_type_error = b.bin(BinaryOp::InstanceOf, e, type_error);
        let record_caught = b.set_global("caught", is_type_error);
        let catch_block = b.block(vec![record_caught]);
        let guarded = b.try_catch(try_block, Some("e"), catch_block);

        vec![decl, define_stmt, record, guarded]
    });
    result.unwrap();
    let desc = global(&mut agent, "desc");
    assert_eq!(agent.get_property(desc, "value").unwrap(), Value::Number(1.0));
    assert_eq!(agent.get_property(desc, "writable").unwrap(), Value::Boolean(false));
    assert_eq!(agent.get_property(desc, "enumerable").unwrap(), Value::Boolean(false));
    assert_eq!(agent.get_property(desc, "configurable").unwrap(), Value::Boolean(false));
    assert_eq!(global(&mut agent, "caught"), Value::Boolean(true));
}

#[test]
fn shift_counts_mask_to_five_bits() {
    // 1 << 33 == 2
    let (_, result) = eval(|b| {
        let one = b.num(1.0);
        let count = b.num(33.0);
        let shifted = b.bin(BinaryOp::ShiftLeft, one, count);
        vec![b.expr(shifted)]
    });
    assert_eq!(result.unwrap(), Value::Number(2.0));
}

#[test]
fn unsigned_shift_of_minus_one_is_uint32_max() {
    // (-1) >>> 0 == 4294967295
    let (_, result) = eval(|b| {
        let one = b.num(1.0);
        let minus_one = b.unary(UnaryOp::Minus, one);
        let zero = b.num(0.0);
        let shifted = b.bin(BinaryOp::ShiftRightUnsigned, minus_one, zero);
        vec![b.expr(shifted)]
    });
    assert_eq!(result.unwrap(), Value::Number(4_294_967_295.0));
}

#[test]
fn closures_capture_environments() {
    // function counter(){ var n = 0; return function(){ n = n + 1; return n; }; }
    let (mut agent, result) = eval(|b| {
        let zero = b.num(0.0);
        let n_decl = b.var("n", Some(zero));
        let n1 = b.ident("n");
        let one = b.num(1.0);
        let bump = b.assign_op(BinaryOp::Add, n1, one);
        let bump_stmt = b.expr(bump);
        let n2 = b.ident("n");
        let inner_ret = b.ret(Some(n2));
        let inner = b.func_expr(&[], vec![bump_stmt, inner_ret]);
        let outer_ret = b.ret(Some(inner));
        let counter = b.func_decl("counter", &[], vec![n_decl, outer_ret]);

        let counter_ref = b.ident("counter");
        let make = b.call(counter_ref, vec![]);
        let decl = b.var("tick", Some(make));
        let tick1 = b.ident("tick");
        let call1 = b.call(tick1, vec![]);
        let first_stmt = b.expr(call1);
        let tick2 = b.ident("tick");
        let call2 = b.call(tick2, vec![]);
        let record = b.set_global("second", call2);
        vec![counter, decl, first_stmt, record]
    });
    result.unwrap();
    // The closure advanced its captured n across both calls.
    assert_eq!(global(&mut agent, "second"), Value::Number(2.0));
}

#[test]
fn try_finally_runs_and_preserves_throw() {
    let (mut agent, result) = eval(|b| {
        let one = b.num(1.0);
        let record = b.set_global("ran", one);
        let finally_block = b.block(vec![record]);
        let boom = b.str_("boom");
        let throw = b.throw(boom);
        let try_block = b.block(vec![throw]);
        let guarded = b.try_finally(try_block, finally_block);
        vec![guarded]
    });
    let error = result.expect_err("throw must escape");
    let EngineError::Throw(t) = error else {
        panic!("expected a throw completion");
    };
    assert_eq!(agent.as_string(t.value).as_deref(), Some("boom"));
    assert_eq!(global(&mut agent, "ran"), Value::Number(1.0));
}

#[test]
fn labelled_break_exits_outer_loop() {
    let (mut agent, result) = eval(|b| {
        // total = 0; outer: while (true) { while (true) { total = total + 1; break outer; } }
        let zero = b.num(0.0);
        let init = b.set_global("total", zero);
        let total = b.ident("total");
        let one = b.num(1.0);
        let bump = b.assign_op(BinaryOp::Add, total, one);
        let bump_stmt = b.expr(bump);
        let brk = b.break_(Some("outer"));
        let inner_body = b.block(vec![bump_stmt, brk]);
        let true1 = b.boolean(true);
        let inner = b.while_(true1, inner_body);
        let outer_body = b.block(vec![inner]);
        let true2 = b.boolean(true);
        let outer = b.while_(true2, outer_body);
        let labelled = b.labelled("outer", outer);
        vec![init, labelled]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "total"), Value::Number(1.0));
}

#[test]
fn labelled_break_crosses_a_bare_inner_loop() {
    // outer: while (true) { hits = hits + 1; while (true) { break outer; } }
    // The inner while is a bare breakable statement: it must not inherit the
    // outer label, so the break unwinds both loops after one iteration.
    let (mut agent, result) = eval(|b| {
        let zero = b.num(0.0);
        let init = b.set_global("hits", zero);
        let hits = b.ident("hits");
        let one = b.num(1.0);
        let bump = b.assign_op(BinaryOp::Add, hits, one);
        let bump_stmt = b.expr(bump);
        let brk = b.break_(Some("outer"));
        let inner_body = b.block(vec![brk]);
        let true1 = b.boolean(true);
        let inner = b.while_(true1, inner_body);
        let outer_body = b.block(vec![bump_stmt, inner]);
        let true2 = b.boolean(true);
        let outer = b.while_(true2, outer_body);
        let labelled = b.labelled("outer", outer);
        vec![init, labelled]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "hits"), Value::Number(1.0));
}

#[test]
fn labelled_continue_crosses_a_bare_inner_loop() {
    // outer: while (n < 3) { n = n + 1; while (true) { continue outer; } }
    let (mut agent, result) = eval(|b| {
        let zero = b.num(0.0);
        let init = b.set_global("n", zero);
        let n1 = b.ident("n");
        let one = b.num(1.0);
        let bump = b.assign_op(BinaryOp::Add, n1, one);
        let bump_stmt = b.expr(bump);
        let cont = b.continue_(Some("outer"));
        let inner_body = b.block(vec![cont]);
        let true1 = b.boolean(true);
        let inner = b.while_(true1, inner_body);
        let outer_body = b.block(vec![bump_stmt, inner]);
        let n2 = b.ident("n");
        let three = b.num(3.0);
        let test = b.bin(BinaryOp::LessThan, n2, three);
        let outer = b.while_(test, outer_body);
        let labelled = b.labelled("outer", outer);
        vec![init, labelled]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "n"), Value::Number(3.0));
}

#[test]
fn switch_falls_through_until_break() {
    let (mut agent, result) = eval(|b| {
        let zero = b.num(0.0);
        let init = b.set_global("trace", zero);
        let bump = |b: &mut B, amount: f64| {
            let trace = b.ident("trace");
            let n = b.num(amount);
            let add = b.assign_op(BinaryOp::Add, trace, n);
            b.expr(add)
        };
        let one_stmt = bump(b, 1.0);
        let two_stmt = bump(b, 10.0);
        let brk = b.break_(None);
        let three_stmt = bump(b, 100.0);
        let selector1 = b.num(1.0);
        let selector2 = b.num(2.0);
        let discriminant = b.num(1.0);
        let switch = b.switch(
            discriminant,
            vec![
                skua::ast::SwitchCase { test: Some(selector1), body: vec![one_stmt] },
                skua::ast::SwitchCase { test: Some(selector2), body: vec![two_stmt, brk] },
                skua::ast::SwitchCase { test: None, body: vec![three_stmt] },
            ],
        );
        vec![init, switch]
    });
    result.unwrap();
    // Case 1 matches and falls through case 2, breaking before default.
    assert_eq!(global(&mut agent, "trace"), Value::Number(11.0));
}

#[test]
fn for_of_iterates_arrays_in_order() {
    let (mut agent, result) = eval(|b| {
        let zero = b.num(0.0);
        let init = b.set_global("sum", zero);
        let items = vec![b.num(1.0), b.num(2.0), b.num(3.0)];
        let array = b.array(items);
        let binding = b.let_("item", None);
        let sum = b.ident("sum");
        let item = b.ident("item");
        let add = b.assign_op(BinaryOp::Add, sum, item);
        let add_stmt = b.expr(add);
        let body = b.block(vec![add_stmt]);
        let loop_stmt = b.for_of(binding, array, body);
        vec![init, loop_stmt]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "sum"), Value::Number(6.0));
}

#[test]
fn typeof_unresolvable_is_undefined_string() {
    let (mut agent, result) = eval(|b| {
        let target = b.ident("definitelyMissing");
        let type_of = b.unary(UnaryOp::TypeOf, target);
        vec![b.expr(type_of)]
    });
    let value = result.unwrap();
    assert_eq!(agent.as_string(value).as_deref(), Some("undefined"));
}

#[test]
fn uncaught_error_renders_with_stack() {
    let (agent, result) = eval(|b| {
        let message = b.str_("kaput");
        let error_ctor = b.ident("TypeError");
        let error = b.new_expr(error_ctor, vec![message]);
        let throw = b.throw(error);
        let func = b.func_decl("explode", &[], vec![throw]);
        let callee = b.ident("explode");
        let call = b.call(callee, vec![]);
        vec![func, b.expr(call)]
    });
    let error = result.expect_err("throw escapes");
    let rendered = agent.render_error(&error);
    assert!(rendered.starts_with("TypeError: kaput"), "got: {rendered}");
    assert!(rendered.contains("explode"), "stack names the frame: {rendered}");
}
