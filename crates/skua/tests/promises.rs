//! Promise resolution, the job queue, and the rejection tracker contract.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{eval, eval_in, global};
use pretty_assertions::assert_eq;
use skua::ast::BinaryOp;
use skua::{Agent, AgentOptions, HostHooks, RejectionOperation, Value};

#[test]
fn then_reaction_runs_after_queue_drain() {
    // Promise.resolve(1).then(v => v + 1) fulfils the derived promise with 2
    // once the queue drains; evaluate_script drains it.
    let (mut agent, result) = eval(|b| {
        let promise_ctor = b.ident("Promise");
        let resolve = b.member(promise_ctor, "resolve");
        let one = b.num(1.0);
        let resolved = b.call(resolve, vec![one]);
        let v = b.ident("v");
        let one_more = b.num(1.0);
        let sum = b.bin(BinaryOp::Add, v, one_more);
        let out = b.ident("out");
        let record = b.assign(out, sum);
        let handler = b.arrow(&["v"], record);
        let then = b.method(resolved, "then", vec![handler]);
        vec![b.expr(then)]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "out"), Value::Number(2.0));
}

#[test]
fn then_chains_through_derived_promises() {
    let (mut agent, result) = eval(|b| {
        let promise_ctor = b.ident("Promise");
        let resolve = b.member(promise_ctor, "resolve");
        let one = b.num(1.0);
        let resolved = b.call(resolve, vec![one]);
        let v1 = b.ident("v");
        let ten = b.num(10.0);
        let scaled = b.bin(BinaryOp::Mul, v1, ten);
        let first = b.arrow(&["v"], scaled);
        let chained = b.method(resolved, "then", vec![first]);
        let v2 = b.ident("v");
        let three = b.num(3.0);
        let sum = b.bin(BinaryOp::Add, v2, three);
        let out = b.ident("out");
        let record = b.assign(out, sum);
        let second = b.arrow(&["v"], record);
        let tail = b.method(chained, "then", vec![second]);
        vec![b.expr(tail)]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "out"), Value::Number(13.0));
}

#[test]
fn rejection_tracker_sees_reject_then_handle() {
    #[derive(Debug, Default)]
    struct Host {
        events: RefCell<Vec<RejectionOperation>>,
    }
    impl HostHooks for Host {
        fn promise_rejection_tracker(
            &self,
            _agent: &mut Agent,
            _promise: skua::Value,
            operation: RejectionOperation,
        ) {
            self.events.borrow_mut().push(operation);
        }
    }

    let host = Rc::new(Host::default());
    let mut agent = Agent::new(AgentOptions {
        hooks: Rc::clone(&host) as Rc<dyn HostHooks>,
        ..AgentOptions::default()
    });
    let result = eval_in(&mut agent, |b| {
        // var p = Promise.reject(1); p.catch(function(e){ caught = e; });
        let promise_ctor = b.ident("Promise");
        let reject = b.member(promise_ctor, "reject");
        let one = b.num(1.0);
        let rejected = b.call(reject, vec![one]);
        let decl = b.var("p", Some(rejected));
        let e = b.ident("e");
        let caught = b.ident("caught");
        let record = b.assign(caught, e);
        let record_stmt = b.expr(record);
        let handler = b.func_expr(&["e"], vec![record_stmt]);
        let p = b.ident("p");
        let catch = b.method(p, "catch", vec![handler]);
        vec![decl, b.expr(catch)]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "caught"), Value::Number(1.0));
    assert_eq!(
        &*host.events.borrow(),
        &[RejectionOperation::Reject, RejectionOperation::Handle]
    );
}

#[test]
fn promise_all_collects_in_order() {
    let (mut agent, result) = eval(|b| {
        let promise_ctor = b.ident("Promise");
        let resolve = b.member(promise_ctor, "resolve");
        let ten = b.num(10.0);
        let first = b.call(resolve, vec![ten]);
        let twenty = b.num(20.0);
        let items = vec![first, twenty];
        let list = b.array(items);
        let promise_ctor2 = b.ident("Promise");
        let all = b.member(promise_ctor2, "all");
        let combined = b.call(all, vec![list]);
        let values = b.ident("values");
        let joined = b.method(values, "join", vec![]);
        let out = b.ident("out");
        let record = b.assign(out, joined);
        let handler = b.arrow(&["values"], record);
        let tail = b.method(combined, "then", vec![handler]);
        vec![b.expr(tail)]
    });
    result.unwrap();
    let out = global(&mut agent, "out");
    assert_eq!(agent.as_string(out).as_deref(), Some("10,20"));
}

#[test]
fn executor_throw_rejects_the_promise() {
    let (mut agent, result) = eval(|b| {
        // new Promise(function(){ throw 'nope'; }).catch(e => { out = e; })
        let nope = b.str_("nope");
        let throw = b.throw(nope);
        let executor = b.func_expr(&["resolve", "reject"], vec![throw]);
        let promise_ctor = b.ident("Promise");
        let promise = b.new_expr(promise_ctor, vec![executor]);
        let e = b.ident("e");
        let out = b.ident("out");
        let record = b.assign(out, e);
        let handler = b.arrow(&["e"], record);
        let tail = b.method(promise, "catch", vec![handler]);
        vec![b.expr(tail)]
    });
    result.unwrap();
    let out = global(&mut agent, "out");
    assert_eq!(agent.as_string(out).as_deref(), Some("nope"));
}

#[test]
fn async_function_awaits_through_the_queue() {
    let (mut agent, result) = eval(|b| {
        // (async function(){ out = (await Promise.resolve(40)) + 2; })()
        let promise_ctor = b.ident("Promise");
        let resolve = b.member(promise_ctor, "resolve");
        let forty = b.num(40.0);
        let resolved = b.call(resolve, vec![forty]);
        let awaited = b.await_(resolved);
        let two = b.num(2.0);
        let sum = b.bin(BinaryOp::Add, awaited, two);
        let record = b.set_global("out", sum);
        let body = vec![record];
        let func = b.async_func_expr(&[], body);
        let call = b.call(func, vec![]);
        vec![b.expr(call)]
    });
    result.unwrap();
    assert_eq!(global(&mut agent, "out"), Value::Number(42.0));
}
