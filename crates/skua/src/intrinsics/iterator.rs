//! Iterator prototypes: `%IteratorPrototype%`, `%AsyncIteratorPrototype%`,
//! the array iterator, and the generator/async-generator prototypes.

use crate::{
    agent::Agent,
    completion::JsResult,
    intrinsics::{bootstrap_prototype, builtin_fn, define_method, error::ErrorKind, RealmSeed},
    interpreter::coroutines,
    iteration::create_iter_result_object,
    object::{ObjectData, PropertyEntry, PropertyKey},
    operations::length_of_array_like,
    value::{ObjectId, Value},
};

/// What an array iterator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IterationKind {
    Key,
    Value,
    KeyAndValue,
}

/// The slots of an array iterator object.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArrayIteratorData {
    pub array: ObjectId,
    pub index: u64,
    pub kind: IterationKind,
    pub done: bool,
}

pub(crate) struct IteratorsInit {
    pub iterator_prototype: ObjectId,
    pub async_iterator_prototype: ObjectId,
    pub array_iterator_prototype: ObjectId,
    pub generator_prototype: ObjectId,
    pub async_generator_prototype: ObjectId,
}

fn return_this(
    _agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    Ok(this)
}

/// Creates an array iterator in the current realm.
pub(crate) fn create_array_iterator(agent: &mut Agent, array: ObjectId, kind: IterationKind) -> ObjectId {
    let prototype = agent.intrinsics().array_iterator_prototype;
    let realm = agent.current_realm_id();
    agent.heap.alloc_object(crate::object::ObjectRecord::new(
        Some(prototype),
        ObjectData::ArrayIterator(ArrayIteratorData { array, index: 0, kind, done: false }),
        realm,
    ))
}

fn array_iterator_next(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let Value::Object(id) = this else {
        return Err(agent.throw_error(ErrorKind::Type, "array iterator next called on a non-iterator"));
    };
    let state = match &agent.heap.object(id).data {
        ObjectData::ArrayIterator(state) => *state,
        _ => {
            return Err(agent.throw_error(ErrorKind::Type, "array iterator next called on a non-iterator"));
        }
    };
    if state.done {
        let result = create_iter_result_object(agent, Value::Undefined, true)?;
        return Ok(Value::Object(result));
    }
    let length = length_of_array_like(agent, state.array)?;
    if state.index >= length {
        if let ObjectData::ArrayIterator(state) = &mut agent.heap.object_mut(id).data {
            state.done = true;
        }
        let result = create_iter_result_object(agent, Value::Undefined, true)?;
        return Ok(Value::Object(result));
    }
    let key = agent.key_for_index(state.index);
    let value = match state.kind {
        IterationKind::Key => Value::Number(state.index as f64),
        IterationKind::Value => crate::operations::get(agent, state.array, key)?,
        IterationKind::KeyAndValue => {
            let element = crate::operations::get(agent, state.array, key)?;
            let pair =
                crate::exotics::array::create_array_from_list(agent, &[Value::Number(state.index as f64), element])?;
            Value::Object(pair)
        }
    };
    if let ObjectData::ArrayIterator(state) = &mut agent.heap.object_mut(id).data {
        state.index += 1;
    }
    let result = create_iter_result_object(agent, value, false)?;
    Ok(Value::Object(result))
}

// --- generator prototype ---

fn generator_next(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    coroutines::generator_resume(agent, this, crate::completion::Completion::normal(value))
}

fn generator_return(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    coroutines::generator_resume(agent, this, crate::completion::Completion::Return(value))
}

fn generator_throw(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    let throw = crate::completion::Completion::Throw(crate::completion::ThrowCompletion::new(value));
    coroutines::generator_resume(agent, this, throw)
}

// --- async generator prototype ---

fn async_generator_next(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    coroutines::async_generator_enqueue(agent, this, crate::completion::Completion::normal(value))
}

fn async_generator_return(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    coroutines::async_generator_enqueue(agent, this, crate::completion::Completion::Return(value))
}

fn async_generator_throw(
    agent: &mut Agent,
    this: Value,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let value = args.first().copied().unwrap_or(Value::Undefined);
    let throw = crate::completion::Completion::Throw(crate::completion::ThrowCompletion::new(value));
    coroutines::async_generator_enqueue(agent, this, throw)
}

pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> IteratorsInit {
    let iterator_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    let self_fn = builtin_fn(agent, seed, return_this, "[Symbol.iterator]", 0);
    let iter_key = PropertyKey::Symbol(agent.heap.well_known.iterator);
    crate::intrinsics::define_data(agent, iterator_prototype, iter_key, Value::Object(self_fn));

    let async_iterator_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    let self_fn = builtin_fn(agent, seed, return_this, "[Symbol.asyncIterator]", 0);
    let aiter_key = PropertyKey::Symbol(agent.heap.well_known.async_iterator);
    crate::intrinsics::define_data(agent, async_iterator_prototype, aiter_key, Value::Object(self_fn));

    let array_iterator_prototype = bootstrap_prototype(agent, seed, Some(iterator_prototype));
    define_method(agent, seed, array_iterator_prototype, "next", array_iterator_next, 0);
    tag(agent, array_iterator_prototype, "Array Iterator");

    let generator_prototype = bootstrap_prototype(agent, seed, Some(iterator_prototype));
    define_method(agent, seed, generator_prototype, "next", generator_next, 1);
    define_method(agent, seed, generator_prototype, "return", generator_return, 1);
    define_method(agent, seed, generator_prototype, "throw", generator_throw, 1);
    tag(agent, generator_prototype, "Generator");

    let async_generator_prototype = bootstrap_prototype(agent, seed, Some(async_iterator_prototype));
    define_method(agent, seed, async_generator_prototype, "next", async_generator_next, 1);
    define_method(agent, seed, async_generator_prototype, "return", async_generator_return, 1);
    define_method(agent, seed, async_generator_prototype, "throw", async_generator_throw, 1);
    tag(agent, async_generator_prototype, "AsyncGenerator");

    seed.register("%IteratorPrototype%", iterator_prototype);
    seed.register("%AsyncIteratorPrototype%", async_iterator_prototype);
    seed.register("%ArrayIteratorPrototype%", array_iterator_prototype);
    seed.register("%GeneratorPrototype%", generator_prototype);
    seed.register("%AsyncGeneratorPrototype%", async_generator_prototype);

    IteratorsInit {
        iterator_prototype,
        async_iterator_prototype,
        array_iterator_prototype,
        generator_prototype,
        async_generator_prototype,
    }
}

fn tag(agent: &mut Agent, target: ObjectId, text: &str) {
    let value = agent.string_value(text);
    let key = PropertyKey::Symbol(agent.heap.well_known.to_string_tag);
    agent.heap.object_mut(target).properties.insert(
        key,
        PropertyEntry::Data { value, writable: false, enumerable: false, configurable: true },
    );
}
