//! The Error constructor family: `Error`, the native error kinds, and
//! `AggregateError`, with `stack` strings captured at construction from the
//! execution-context stack.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    agent::Agent,
    completion::{CallSite, JsResult},
    conversion::to_string,
    intrinsics::{bootstrap_constructor, bootstrap_prototype, define_method, RealmSeed},
    iteration,
    object::{ObjectData, ObjectRecord, PropertyEntry, PropertyKey},
    realm::ErrorIntrinsic,
    value::{ObjectId, Value},
};

/// The language error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
    URIError,
    EvalError,
    AggregateError,
}

impl ErrorKind {
    pub const COUNT: usize = 8;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Error,
        Self::TypeError,
        Self::RangeError,
        Self::SyntaxError,
        Self::ReferenceError,
        Self::URIError,
        Self::EvalError,
        Self::AggregateError,
    ];
}

/// Short aliases so throw sites read like the operations they implement.
#[expect(non_upper_case_globals, reason = "throw-site shorthand mirrors the error names")]
impl ErrorKind {
    pub const Type: Self = Self::TypeError;
    pub const Range: Self = Self::RangeError;
    pub const Syntax: Self = Self::SyntaxError;
    pub const Reference: Self = Self::ReferenceError;
}

/// The internal slot payload of an Error object.
#[derive(Debug)]
pub(crate) struct ErrorData {
    pub kind: ErrorKind,
}

/// Renders the synthetic trace the way `stack` strings read.
fn render_stack(kind: ErrorKind, message: &str, stack: &[CallSite]) -> String {
    let mut out = if message.is_empty() {
        kind.to_string()
    } else {
        format!("{kind}: {message}")
    };
    for site in stack {
        let name = site.function.as_deref().unwrap_or("<anonymous>");
        out.push_str(&format!("\n    at {name} ({}:{}:{})", site.source, site.line, site.column));
    }
    out
}

/// Creates an error object of `kind` in the current realm, with `message`
/// and `stack` installed as data properties.
pub(crate) fn create_error(agent: &mut Agent, kind: ErrorKind, message: &str, stack: &[CallSite]) -> ObjectId {
    let prototype = agent.intrinsics().error(kind).prototype;
    let realm = agent.current_realm_id();
    let mut record = ObjectRecord::new(
        Some(prototype),
        ObjectData::Error(Box::new(ErrorData { kind })),
        realm,
    );
    if !message.is_empty() {
        let message_id = agent.heap.intern_str(message);
        record.properties.insert(
            PropertyKey::String(agent.heap.statics.message),
            PropertyEntry::Data {
                value: Value::String(message_id),
                writable: true,
                enumerable: false,
                configurable: true,
            },
        );
    }
    let stack_text = render_stack(kind, message, stack);
    let stack_id = agent.heap.intern_str(&stack_text);
    record.properties.insert(
        PropertyKey::String(agent.heap.statics.stack),
        PropertyEntry::Data {
            value: Value::String(stack_id),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    agent.heap.alloc_object(record)
}

fn error_constructor_for(kind: ErrorKind) -> crate::function::NativeFn {
    match kind {
        ErrorKind::Error => |agent, _this, args, new_target, func| {
            construct_error(agent, ErrorKind::Error, args, new_target, func)
        },
        ErrorKind::TypeError => |agent, _this, args, new_target, func| {
            construct_error(agent, ErrorKind::TypeError, args, new_target, func)
        },
        ErrorKind::RangeError => |agent, _this, args, new_target, func| {
            construct_error(agent, ErrorKind::RangeError, args, new_target, func)
        },
        ErrorKind::SyntaxError => |agent, _this, args, new_target, func| {
            construct_error(agent, ErrorKind::SyntaxError, args, new_target, func)
        },
        ErrorKind::ReferenceError => |agent, _this, args, new_target, func| {
            construct_error(agent, ErrorKind::ReferenceError, args, new_target, func)
        },
        ErrorKind::URIError => |agent, _this, args, new_target, func| {
            construct_error(agent, ErrorKind::URIError, args, new_target, func)
        },
        ErrorKind::EvalError => |agent, _this, args, new_target, func| {
            construct_error(agent, ErrorKind::EvalError, args, new_target, func)
        },
        ErrorKind::AggregateError => |agent, _this, args, new_target, func| {
            construct_aggregate_error(agent, args, new_target, func)
        },
    }
}

/// Shared Error/native-error constructor body. Usable with or without
/// `new`.
fn construct_error(
    agent: &mut Agent,
    kind: ErrorKind,
    args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let message = match args.first().copied() {
        None | Some(Value::Undefined) => String::new(),
        Some(v) => {
            let id = to_string(agent, v)?;
            agent.heap.string(id).to_rust_string()
        }
    };
    let stack = agent.capture_stack();
    let error = create_error(agent, kind, &message, &stack);
    Ok(Value::Object(error))
}

/// `AggregateError(errors, message)`: wraps a list of errors.
fn construct_aggregate_error(
    agent: &mut Agent,
    args: &[Value],
    new_target: Option<ObjectId>,
    func: ObjectId,
) -> JsResult<Value> {
    let message_args = &args[args.len().min(1)..];
    let error = construct_error(agent, ErrorKind::AggregateError, message_args, new_target, func)?;
    let Value::Object(error_id) = error else { unreachable!() };
    let errors = iteration::iterable_to_list(agent, args.first().copied().unwrap_or(Value::Undefined))?;
    let list = crate::exotics::array::create_array_from_list(agent, &errors)?;
    let key = agent.key_from_str("errors");
    agent.heap.object_mut(error_id).properties.insert(
        key,
        PropertyEntry::Data {
            value: Value::Object(list),
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    Ok(error)
}

/// `Error.prototype.toString`.
fn error_to_string(
    agent: &mut Agent,
    this: Value,
    _args: &[Value],
    _new_target: Option<ObjectId>,
    _func: ObjectId,
) -> JsResult<Value> {
    let o = crate::intrinsics::this_object(agent, this, "Error")?;
    let name_key = PropertyKey::String(agent.heap.statics.name);
    let name = crate::operations::get(agent, o, name_key)?;
    let name = match name {
        Value::Undefined => "Error".to_owned(),
        v => {
            let s = to_string(agent, v)?;
            agent.heap.string(s).to_rust_string()
        }
    };
    let message_key = PropertyKey::String(agent.heap.statics.message);
    let message = crate::operations::get(agent, o, message_key)?;
    let message = match message {
        Value::Undefined => String::new(),
        v => {
            let s = to_string(agent, v)?;
            agent.heap.string(s).to_rust_string()
        }
    };
    let text = if message.is_empty() {
        name
    } else if name.is_empty() {
        message
    } else {
        format!("{name}: {message}")
    };
    Ok(agent.string_value(&text))
}

/// Bootstraps the error hierarchy. `%Error.prototype%` parents the native
/// kinds' prototypes; each kind gets a constructor/prototype pair.
pub(crate) fn init(agent: &mut Agent, seed: &mut RealmSeed) -> [ErrorIntrinsic; ErrorKind::COUNT] {
    let base_prototype = bootstrap_prototype(agent, seed, Some(seed.object_prototype));
    define_method(agent, seed, base_prototype, "toString", error_to_string, 0);

    let mut result = [ErrorIntrinsic { constructor: base_prototype, prototype: base_prototype }; ErrorKind::COUNT];
    for kind in ErrorKind::ALL {
        let prototype = if kind == ErrorKind::Error {
            base_prototype
        } else {
            bootstrap_prototype(agent, seed, Some(base_prototype))
        };
        // name and message prototype members.
        let kind_name: &'static str = kind.into();
        let name_value = agent.string_value(kind_name);
        let name_key = PropertyKey::String(agent.heap.statics.name);
        crate::intrinsics::define_data(agent, prototype, name_key, name_value);
        let empty = Value::String(agent.heap.statics.empty);
        let message_key = PropertyKey::String(agent.heap.statics.message);
        crate::intrinsics::define_data(agent, prototype, message_key, empty);

        let length = if kind == ErrorKind::AggregateError { 2 } else { 1 };
        let ctor = bootstrap_constructor(agent, seed, error_constructor_for(kind), kind.into(), length, prototype);
        seed.register(&format!("%{kind}%"), ctor);
        seed.register(&format!("%{kind}.prototype%"), prototype);
        result[kind as usize] = ErrorIntrinsic { constructor: ctor, prototype };
    }
    result
}
