//! Completion records and the abrupt-propagation protocol.
//!
//! Every abstract operation in the engine returns either a normal completion
//! or a throw completion; the `?` operator is the propagation combinator.
//! The three remaining abrupt kinds (`break`, `continue`, `return`) only
//! exist inside the evaluator and travel as [`Completion`] values between
//! machine frames.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Result type for abstract operations: a normal completion carrying `T`, or
/// an abrupt outcome.
pub type JsResult<T> = Result<T, EngineError>;

/// An abrupt outcome of an abstract operation.
///
/// `Throw` is a language-level throw completion and is eventually observable
/// by `try`/`catch`. `Internal` is the distinguished host-level failure: a
/// broken engine invariant, never produced by language code and never
/// convertible into a catchable language error.
#[derive(Debug, Clone)]
pub enum EngineError {
    Throw(ThrowCompletion),
    Internal(InternalError),
}

impl EngineError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(InternalError {
            message: message.into(),
        })
    }

    /// The thrown value, if this is a throw completion.
    pub fn thrown_value(&self) -> Option<Value> {
        match self {
            Self::Throw(t) => Some(t.value),
            Self::Internal(_) => None,
        }
    }
}

/// A throw completion: the thrown value plus the synthetic call-site trace
/// captured when the throw was materialized.
#[derive(Debug, Clone)]
pub struct ThrowCompletion {
    pub value: Value,
    pub stack: Vec<CallSite>,
}

impl ThrowCompletion {
    pub fn new(value: Value) -> Self {
        Self { value, stack: Vec::new() }
    }
}

impl From<ThrowCompletion> for EngineError {
    fn from(t: ThrowCompletion) -> Self {
        Self::Throw(t)
    }
}

/// An engine bug surfaced to the embedder. Not a language error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalError {
    pub message: String,
}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "internal engine failure: {}", self.message)
    }
}

impl std::error::Error for InternalError {}

/// One frame of a synthetic call-site trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Function name, or `None` for script/module toplevel.
    pub function: Option<String>,
    /// Name of the script or module the frame is executing.
    pub source: String,
    pub line: u32,
    pub column: u32,
}

/// The completion record: `{Type, Value, Target}`.
///
/// `Normal(None)` is the empty normal completion. Break and continue carry an
/// optional label target and the value accumulated so far, which
/// [`Completion::update_empty`] threads through statement lists.
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(Option<Value>),
    Break {
        target: Option<Box<str>>,
        value: Option<Value>,
    },
    Continue {
        target: Option<Box<str>>,
        value: Option<Value>,
    },
    Return(Value),
    Throw(ThrowCompletion),
}

impl Completion {
    pub const EMPTY: Self = Self::Normal(None);

    pub fn normal(value: Value) -> Self {
        Self::Normal(Some(value))
    }

    pub fn is_abrupt(&self) -> bool {
        !matches!(self, Self::Normal(_))
    }

    /// The carried value, defaulting empty to `undefined`.
    pub fn value_or_undefined(&self) -> Value {
        match self {
            Self::Normal(v) | Self::Break { value: v, .. } | Self::Continue { value: v, .. } => {
                v.unwrap_or(Value::Undefined)
            }
            Self::Return(v) => *v,
            Self::Throw(t) => t.value,
        }
    }

    /// UpdateEmpty: if this completion's value is empty, fill it with
    /// `value`. Return and throw completions always carry a value already.
    pub fn update_empty(self, value: Option<Value>) -> Self {
        match self {
            Self::Normal(None) => Self::Normal(value),
            Self::Break { target, value: None } => Self::Break { target, value },
            Self::Continue { target, value: None } => Self::Continue { target, value },
            other => other,
        }
    }

    /// Converts an expression-level result into a completion.
    ///
    /// Internal failures cannot be represented as completions; the caller
    /// receives them back unchanged.
    pub(crate) fn from_result(result: JsResult<Value>) -> Result<Self, InternalError> {
        match result {
            Ok(v) => Ok(Self::normal(v)),
            Err(EngineError::Throw(t)) => Ok(Self::Throw(t)),
            Err(EngineError::Internal(e)) => Err(e),
        }
    }
}

/// The `X` combinator: asserts an operation cannot complete abruptly.
///
/// A surprise abrupt completion here is an engine bug and is converted into
/// the host-level internal failure, not a language error.
macro_rules! must {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(crate::completion::EngineError::Internal(e)) => {
                return Err(crate::completion::EngineError::Internal(e));
            }
            Err(crate::completion::EngineError::Throw(_)) => {
                return Err(crate::completion::EngineError::internal(format!(
                    "operation asserted infallible completed abruptly at {}:{}",
                    file!(),
                    line!()
                )));
            }
        }
    };
}

pub(crate) use must;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_empty_fills_only_empty_values() {
        let c = Completion::EMPTY.update_empty(Some(Value::Boolean(true)));
        assert!(matches!(c, Completion::Normal(Some(Value::Boolean(true)))));

        let c = Completion::normal(Value::Null).update_empty(Some(Value::Boolean(true)));
        assert!(matches!(c, Completion::Normal(Some(Value::Null))));

        let c = Completion::Break { target: None, value: None }.update_empty(Some(Value::Null));
        assert!(matches!(c, Completion::Break { value: Some(Value::Null), .. }));
    }
}
