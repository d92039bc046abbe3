#![doc = include_str!("../../../README.md")]
#![expect(dead_code, reason = "spec-surface APIs stay available to embedders")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing follows the standard's modular rules")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts mirror ToUint32-family semantics")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior is the specified behavior")]
#![expect(clippy::float_cmp, reason = "the numeric operations require exact float comparison")]
#![expect(clippy::unnecessary_wraps, reason = "abstract operations keep uniform completion signatures")]
#![expect(clippy::needless_pass_by_value, reason = "value parameters mirror the operation signatures")]
#![expect(clippy::result_large_err, reason = "completions carry their call-site trace by design")]

mod agent;
pub mod ast;
mod buffer;
mod completion;
mod conversion;
mod environments;
mod exotics;
mod function;
mod heap;
mod inspect;
mod interpreter;
mod intrinsics;
mod iteration;
mod module;
mod numeric;
mod object;
mod operations;
mod ordinary;
mod realm;
mod reference;
pub mod tracer;
mod value;

pub use crate::{
    agent::{
        Agent, AgentOptions, DefaultHostHooks, Feature, HostHooks, QueueName, RejectionOperation,
        ScriptOrModule, SourceKind,
    },
    completion::{CallSite, Completion, EngineError, InternalError, ThrowCompletion},
    intrinsics::error::ErrorKind,
    module::{ModuleId, ModuleStatus},
    object::PropertyDescriptor,
    realm::RealmId,
    value::{JsString, Value},
};
