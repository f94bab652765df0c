use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::runtime::value::DynValue;

/// Error codes prefixed by the boundary that raises them:
/// B = dispatch argument, N = numeric bridge, C = call stack, G = generic binding,
/// H = host invocation, D = member descriptor, R = script runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    B001, // bad argument

    N001, // overflow
    N002, // format

    C001, // stack overflow

    G001, // generic method invoked without its generic argument

    H001, // host invocation target raised

    D001, // member cannot be described

    R001, // value raised by script code
    R002, // operator or call applied to an unsupported value
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::B001 => "B001",
            Self::N001 => "N001",
            Self::N002 => "N002",
            Self::C001 => "C001",
            Self::G001 => "G001",
            Self::H001 => "H001",
            Self::D001 => "D001",
            Self::R001 => "R001",
            Self::R002 => "R002",
        }
    }
}

/// Failure raised by host code. Shared so errors stay cheap to clone.
pub type HostFailure = Arc<dyn StdError + Send + Sync + 'static>;

// ─── ScriptError ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("bad argument #{index} to '{function}' ({message})")]
    BadArgument {
        index:    usize,
        function: String,
        message:  String,
    },

    #[error("value {value} of type {from} cannot be represented as {to}")]
    Overflow {
        from:  &'static str,
        to:    &'static str,
        value: String,
    },

    #[error("'{input}' is not a valid {target}")]
    Format {
        input:  String,
        target: &'static str,
    },

    #[error("stack overflow")]
    StackOverflow,

    #[error("tried to call generic method '{method}' without a generic argument")]
    GenericBinding { method: String },

    #[error("host method '{method}' raised: {source}")]
    HostInvocation {
        method: String,
        #[source]
        source: HostFailure,
    },

    #[error("member '{member}' cannot be exposed to scripts: {reason}")]
    InvalidDescriptor { member: String, reason: String },

    #[error("{}", .value.to_print_string())]
    Raised { value: DynValue },

    #[error("{message}")]
    Runtime { message: String },
}

impl ScriptError {
    pub fn bad_argument(index: usize, function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadArgument { index, function: function.into(), message: message.into() }
    }

    /// A "value expected" failure at argument `index`.
    pub fn value_expected(index: usize, function: impl Into<String>) -> Self {
        Self::bad_argument(index, function, "value expected")
    }

    /// The argument at `index` has the wrong data kind.
    pub fn bad_argument_type(
        index: usize,
        function: impl Into<String>,
        expected: &str,
        got: &DynValue,
    ) -> Self {
        Self::bad_argument(index, function, format!("{expected} expected, got {}", got.type_name()))
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime { message: message.into() }
    }

    pub fn host(method: impl Into<String>, source: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self::HostInvocation { method: method.into(), source: Arc::from(source) }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadArgument { .. }       => ErrorCode::B001,
            Self::Overflow { .. }          => ErrorCode::N001,
            Self::Format { .. }            => ErrorCode::N002,
            Self::StackOverflow            => ErrorCode::C001,
            Self::GenericBinding { .. }    => ErrorCode::G001,
            Self::HostInvocation { .. }    => ErrorCode::H001,
            Self::InvalidDescriptor { .. } => ErrorCode::D001,
            Self::Raised { .. }            => ErrorCode::R001,
            Self::Runtime { .. }           => ErrorCode::R002,
        }
    }

    /// Whether a protected call may always catch this error. Host failures are only
    /// caught when `GlobalOptions::should_pcall_catch` allows it.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::HostInvocation { .. })
    }

    /// The original host failure, for downcasting to the host's own error type.
    pub fn host_cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::HostInvocation { source, .. } => Some(&**source),
            _ => None,
        }
    }

    /// The value a protected call hands to its error handler.
    pub fn to_dyn_value(&self) -> DynValue {
        match self {
            Self::Raised { value } => value.clone(),
            other => DynValue::string(other.to_string()),
        }
    }
}
