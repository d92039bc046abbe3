//! The iteration protocol: iterator records, stepping, and closing.

use crate::{
    agent::Agent,
    completion::{must, Completion, JsResult},
    conversion::to_boolean,
    intrinsics::error::ErrorKind,
    object::PropertyKey,
    operations::{call, get_method, get_v},
    value::{ObjectId, Value},
};

/// An iterator record: the iterator object, its cached `next`, and whether
/// the iterator has completed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IteratorRecord {
    pub iterator: ObjectId,
    pub next_method: Value,
    pub done: bool,
}

/// `GetIterator(obj, sync)`.
pub(crate) fn get_iterator(agent: &mut Agent, value: Value) -> JsResult<IteratorRecord> {
    let sym = Value::Symbol(agent.heap.well_known.iterator);
    let method = get_method(agent, value, sym)?;
    let Some(method) = method else {
        let brief = crate::value::brief(value, &agent.heap);
        return Err(agent.throw_error(ErrorKind::Type, format!("{brief} is not iterable")));
    };
    get_iterator_from_method(agent, value, method)
}

pub(crate) fn get_iterator_from_method(
    agent: &mut Agent,
    value: Value,
    method: Value,
) -> JsResult<IteratorRecord> {
    let iterator = call(agent, method, value, &[])?;
    let Value::Object(iterator) = iterator else {
        return Err(agent.throw_error(ErrorKind::Type, "iterator method did not return an object"));
    };
    let next_method = get_v(agent, Value::Object(iterator), PropertyKey::String(agent.heap.statics.next))?;
    Ok(IteratorRecord { iterator, next_method, done: false })
}

/// `GetIterator(obj, async)`: prefers `@@asyncIterator`, wrapping a sync
/// iterator when only that exists.
pub(crate) fn get_async_iterator(agent: &mut Agent, value: Value) -> JsResult<IteratorRecord> {
    let sym = Value::Symbol(agent.heap.well_known.async_iterator);
    if let Some(method) = get_method(agent, value, sym)? {
        return get_iterator_from_method(agent, value, method);
    }
    // Fall back to the sync protocol; the await at the use site adapts the
    // results.
    get_iterator(agent, value)
}

/// `IteratorNext(record, value?)`: one protocol step, unchecked for
/// completion.
pub(crate) fn iterator_next(
    agent: &mut Agent,
    record: &IteratorRecord,
    value: Option<Value>,
) -> JsResult<ObjectId> {
    let result = match value {
        None => call(agent, record.next_method, Value::Object(record.iterator), &[])?,
        Some(v) => call(agent, record.next_method, Value::Object(record.iterator), &[v])?,
    };
    let Value::Object(result) = result else {
        return Err(agent.throw_error(ErrorKind::Type, "iterator result is not an object"));
    };
    Ok(result)
}

/// `IteratorComplete`.
pub(crate) fn iterator_complete(agent: &mut Agent, result: ObjectId) -> JsResult<bool> {
    let done = get_v(agent, Value::Object(result), PropertyKey::String(agent.heap.statics.done))?;
    Ok(to_boolean(&agent.heap, done))
}

/// `IteratorValue`.
pub(crate) fn iterator_value(agent: &mut Agent, result: ObjectId) -> JsResult<Value> {
    get_v(agent, Value::Object(result), PropertyKey::String(agent.heap.statics.value))
}

/// `IteratorStep`: `Ok(None)` when the iterator reports done.
pub(crate) fn iterator_step(agent: &mut Agent, record: &IteratorRecord) -> JsResult<Option<ObjectId>> {
    let result = iterator_next(agent, record, None)?;
    if iterator_complete(agent, result)? {
        return Ok(None);
    }
    Ok(Some(result))
}

/// `IteratorClose(record, completion)`: calls `return` on early exit,
/// preferring the original completion over errors raised while closing.
pub(crate) fn iterator_close(
    agent: &mut Agent,
    record: &IteratorRecord,
    completion: Completion,
) -> JsResult<Completion> {
    let return_key = Value::String(agent.heap.statics.return_);
    let inner = (|| -> JsResult<()> {
        let method = get_method(agent, Value::Object(record.iterator), return_key)?;
        if let Some(method) = method {
            let result = call(agent, method, Value::Object(record.iterator), &[])?;
            if !result.is_object() && !matches!(completion, Completion::Throw(_)) {
                return Err(agent.throw_error(ErrorKind::Type, "iterator.return did not return an object"));
            }
        }
        Ok(())
    })();
    match (inner, completion) {
        // A throw on the way out wins over close-time errors.
        (_, c @ Completion::Throw(_)) => Ok(c),
        (Err(crate::completion::EngineError::Throw(t)), _) => Ok(Completion::Throw(t)),
        (Err(internal @ crate::completion::EngineError::Internal(_)), _) => Err(internal),
        (Ok(()), c) => Ok(c),
    }
}

/// `CreateIterResultObject`. Writing onto a fresh ordinary object cannot
/// complete abruptly.
pub(crate) fn create_iter_result_object(agent: &mut Agent, value: Value, done: bool) -> JsResult<ObjectId> {
    let obj = agent.create_ordinary_object();
    let value_key = PropertyKey::String(agent.heap.statics.value);
    must!(crate::operations::create_data_property_or_throw(agent, obj, value_key, value));
    let done_key = PropertyKey::String(agent.heap.statics.done);
    must!(crate::operations::create_data_property_or_throw(agent, obj, done_key, Value::Boolean(done)));
    Ok(obj)
}

/// Drains an iterable into a list.
pub(crate) fn iterable_to_list(agent: &mut Agent, value: Value) -> JsResult<Vec<Value>> {
    let record = get_iterator(agent, value)?;
    let mut values = Vec::new();
    while let Some(result) = iterator_step(agent, &record)? {
        values.push(iterator_value(agent, result)?);
    }
    Ok(values)
}
