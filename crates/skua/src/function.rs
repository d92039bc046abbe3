//! Function object payloads: ordinary functions with code, host builtins,
//! and bound functions.

use crate::{
    agent::Agent,
    ast::{NodeId, SourceId},
    completion::JsResult,
    heap::{Mark, MarkQueue},
    intrinsics::promise::PromisePayload,
    object::{PrivateElement, PropertyKey},
    realm::RealmId,
    value::{EnvId, ObjectId, PrivateEnvId, PrivateNameId, Value},
};

/// How an ordinary function binds `this` on call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThisMode {
    /// Arrow functions: no own binding, `this` resolves lexically.
    Lexical,
    /// Strict functions: `this` is used as passed.
    Strict,
    /// Sloppy functions: `this` is coerced to an object, with
    /// `undefined`/`null` replaced by the global object.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    Normal,
    Generator,
    Async,
    AsyncGenerator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConstructorKind {
    Base,
    Derived,
}

/// An instance field recorded on a class constructor, applied to each new
/// instance in definition order.
#[derive(Debug, Clone)]
pub(crate) struct FieldRecord {
    pub key: FieldKey,
    /// Field initializer expression; `None` leaves the field `undefined`.
    pub initializer: Option<NodeId>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldKey {
    Property(PropertyKey),
    Private(PrivateNameId),
}

/// The slots of an ordinary (source-text) function object.
#[derive(Debug)]
pub(crate) struct FunctionData {
    /// The parsed source this function's body lives in.
    pub source: SourceId,
    /// The `Function` node carrying parameters, body and flags.
    pub node: NodeId,
    /// Captured lexical environment.
    pub environment: EnvId,
    pub private_environment: Option<PrivateEnvId>,
    pub home_object: Option<ObjectId>,
    pub this_mode: ThisMode,
    pub strict: bool,
    pub kind: FunctionKind,
    pub constructor_kind: ConstructorKind,
    /// Class constructors must be invoked with `new`.
    pub is_class_constructor: bool,
    /// Whether the object carries a `Construct` internal method at all.
    pub is_constructor: bool,
    /// Instance fields to install during construction (class constructors).
    pub fields: Vec<FieldRecord>,
    /// Private methods and accessors to install on each instance.
    pub private_methods: Vec<PrivateElement>,
    /// Source text for `toString`, when the parser provided it.
    pub source_text: Option<Box<str>>,
    pub realm: RealmId,
}

impl Mark for FunctionData {
    fn mark(&self, queue: &mut MarkQueue) {
        queue.push_env(self.environment);
        if let Some(home) = self.home_object {
            queue.push_object(home);
        }
        self.private_methods.mark(queue);
    }
}

/// Signature shared by every host-implemented function: `this`, the argument
/// list, the active `new.target` when invoked as a constructor, and the
/// function object itself (for builtins that close over per-instance
/// payload, such as promise resolving functions).
pub(crate) type NativeFn =
    fn(&mut Agent, Value, &[Value], Option<ObjectId>, ObjectId) -> JsResult<Value>;

/// The slots of a host-implemented function object.
#[derive(Debug)]
pub(crate) struct BuiltinData {
    pub behaviour: NativeFn,
    /// Whether the builtin also acts as a constructor.
    pub constructor: bool,
    /// Per-instance state for builtins that close over it (promise resolving
    /// functions and friends).
    pub payload: PromisePayload,
    pub realm: RealmId,
}

impl Mark for BuiltinData {
    fn mark(&self, queue: &mut MarkQueue) {
        self.payload.mark(queue);
    }
}

/// The slots of a bound function exotic object.
#[derive(Debug)]
pub(crate) struct BoundFunctionData {
    pub target: ObjectId,
    pub bound_this: Value,
    pub bound_args: Vec<Value>,
}

impl Mark for BoundFunctionData {
    fn mark(&self, queue: &mut MarkQueue) {
        queue.push_object(self.target);
        self.bound_this.mark(queue);
        self.bound_args.mark(queue);
    }
}
