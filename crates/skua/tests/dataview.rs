//! Buffer and DataView behavior: bounds, endianness, round-trips, NaN
//! canonicalisation, detachment.

mod common;

use common::{eval, global};
use pretty_assertions::assert_eq;
use skua::ast::BinaryOp;
use skua::Value;

#[test]
fn float64_round_trips_through_the_buffer() {
    let (mut agent, result) = eval(|b| {
        // var view = new DataView(new ArrayBuffer(16));
        let sixteen = b.num(16.0);
        let buffer_ctor = b.ident("ArrayBuffer");
        let buffer = b.new_expr(buffer_ctor, vec![sixteen]);
        let view_ctor = b.ident("DataView");
        let view = b.new_expr(view_ctor, vec![buffer]);
        let view_decl = b.var("view", Some(view));
        // view.setFloat64(8, 123.456, true); out = view.getFloat64(8, true);
        let v1 = b.ident("view");
        let offset1 = b.num(8.0);
        let payload = b.num(123.456);
        let little1 = b.boolean(true);
        let set = b.method(v1, "setFloat64", vec![offset1, payload, little1]);
        let set_stmt = b.expr(set);
        let v2 = b.ident("view");
        let offset2 = b.num(8.0);
        let little2 = b.boolean(true);
        let get = b.method(v2, "getFloat64", vec![offset2, little2]);
        let record = b.set_global("out", get);
        vec![view_decl, set_stmt, record]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "out"), Value::Number(123.456));
}

#[test]
fn mixed_endian_reads_swap_bytes() {
    let (mut agent, result) = eval(|b| {
        let four = b.num(4.0);
        let buffer_ctor = b.ident("ArrayBuffer");
        let buffer = b.new_expr(buffer_ctor, vec![four]);
        let view_ctor = b.ident("DataView");
        let view = b.new_expr(view_ctor, vec![buffer]);
        let view_decl = b.var("view", Some(view));
        // view.setUint32(0, 0x11223344, false); little = view.getUint32(0, true);
        let v1 = b.ident("view");
        let zero1 = b.num(0.0);
        let payload = b.num(287_454_020.0);
        let big = b.boolean(false);
        let set = b.method(v1, "setUint32", vec![zero1, payload, big]);
        let set_stmt = b.expr(set);
        let v2 = b.ident("view");
        let zero2 = b.num(0.0);
        let little = b.boolean(true);
        let get = b.method(v2, "getUint32", vec![zero2, little]);
        let record = b.set_global("swapped", get);
        vec![view_decl, set_stmt, record]
    });
    result.unwrap();
    // 0x11223344 read back opposite-endian is 0x44332211.
    assert_eq!(global(&mut agent, "swapped"), Value::Number(1_144_201_745.0));
}

#[test]
fn nan_writes_use_the_canonical_pattern() {
    let (mut agent, result) = eval(|b| {
        let eight = b.num(8.0);
        let buffer_ctor = b.ident("ArrayBuffer");
        let buffer = b.new_expr(buffer_ctor, vec![eight]);
        let view_ctor = b.ident("DataView");
        let view = b.new_expr(view_ctor, vec![buffer]);
        let view_decl = b.var("view", Some(view));
        let v1 = b.ident("view");
        let zero = b.num(0.0);
        let nan = b.ident("NaN");
        let little = b.boolean(true);
        let set = b.method(v1, "setFloat64", vec![zero, nan, little]);
        let set_stmt = b.expr(set);
        // The two top little-endian bytes of the canonical pattern.
        let v2 = b.ident("view");
        let six = b.num(6.0);
        let b6 = b.method(v2, "getUint8", vec![six]);
        let record6 = b.set_global("byte6", b6);
        let v3 = b.ident("view");
        let seven = b.num(7.0);
        let b7 = b.method(v3, "getUint8", vec![seven]);
        let record7 = b.set_global("byte7", b7);
        vec![view_decl, set_stmt, record6, record7]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "byte6"), Value::Number(0xF8 as f64));
    assert_eq!(global(&mut agent, "byte7"), Value::Number(0x7F as f64));
}

#[test]
fn out_of_bounds_get_is_a_range_error() {
    let (mut agent, result) = eval(|b| {
        let four = b.num(4.0);
        let buffer_ctor = b.ident("ArrayBuffer");
        let buffer = b.new_expr(buffer_ctor, vec![four]);
        let view_ctor = b.ident("DataView");
        let view = b.new_expr(view_ctor, vec![buffer]);
        let view_decl = b.var("view", Some(view));
        // getFloat64 needs 8 bytes; getIndex + size > viewSize throws.
        let v = b.ident("view");
        let zero = b.num(0.0);
        let get = b.method(v, "getFloat64", vec![zero]);
        let get_stmt = b.expr(get);
        let try_block = b.block(vec![get_stmt]);
        let e = b.ident("e");
        let range_error = b.ident("RangeError");
        let check = b.bin(BinaryOp::InstanceOf, e, range_error);
        let record = b.set_global("caught", check);
        let catch_block = b.block(vec![record]);
        let guarded = b.try_catch(try_block, Some("e"), catch_block);
        vec![view_decl, guarded]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "caught"), Value::Boolean(true));
}

#[test]
fn detached_buffer_rejects_view_reads() {
    let (mut agent, result) = eval(|b| {
        let four = b.num(4.0);
        let buffer_ctor = b.ident("ArrayBuffer");
        let buffer = b.new_expr(buffer_ctor, vec![four]);
        let buf_decl = b.var("buf", Some(buffer));
        let buf = b.ident("buf");
        let view_ctor = b.ident("DataView");
        let view = b.new_expr(view_ctor, vec![buf]);
        let view_decl = b.var("view", Some(view));
        vec![buf_decl, view_decl]
    });
    result.unwrap();
    let buf = global(&mut agent, "buf");
    agent.detach_array_buffer(buf).unwrap();

    let view = global(&mut agent, "view");
    let get = agent.get_property(view, "getUint8").unwrap();
    let zero = Value::Number(0.0);
    let error = agent.call_value(get, view, &[zero]).expect_err("detached read throws");
    let rendered = agent.render_error(&error);
    assert!(rendered.starts_with("TypeError"), "got: {rendered}");
}

#[test]
fn typed_array_reads_its_buffer() {
    let (mut agent, result) = eval(|b| {
        // var ta = new Uint8Array(4); ta[1] = 300; out = ta[1]; (mod 256)
        let four = b.num(4.0);
        let ctor = b.ident("Uint8Array");
        let ta = b.new_expr(ctor, vec![four]);
        let ta_decl = b.var("ta", Some(ta));
        let ta1 = b.ident("ta");
        let one1 = b.num(1.0);
        let slot = b.index(ta1, one1);
        let payload = b.num(300.0);
        let write = b.assign(slot, payload);
        let write_stmt = b.expr(write);
        let ta2 = b.ident("ta");
        let one2 = b.num(1.0);
        let read = b.index(ta2, one2);
        let record = b.set_global("out", read);
        let ta3 = b.ident("ta");
        let len = b.member(ta3, "length");
        let record_len = b.set_global("len", len);
        vec![ta_decl, write_stmt, record, record_len]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "out"), Value::Number(44.0));
    assert_eq!(global(&mut agent, "len"), Value::Number(4.0));
}

#[test]
fn clamped_array_rounds_ties_to_even() {
    let (mut agent, result) = eval(|b| {
        let two = b.num(2.0);
        let ctor = b.ident("Uint8ClampedArray");
        let ta = b.new_expr(ctor, vec![two]);
        let ta_decl = b.var("ta", Some(ta));
        let ta1 = b.ident("ta");
        let zero = b.num(0.0);
        let slot = b.index(ta1, zero);
        let half = b.num(2.5);
        let write = b.assign(slot, half);
        let write_stmt = b.expr(write);
        let ta2 = b.ident("ta");
        let zero2 = b.num(0.0);
        let read = b.index(ta2, zero2);
        let record = b.set_global("out", read);
        vec![ta_decl, write_stmt, record]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "out"), Value::Number(2.0));
}
