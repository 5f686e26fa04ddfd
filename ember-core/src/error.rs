//! Error types for every layer of the pipeline.
//!
//! Each layer gets its own enum so callers can match on what they care
//! about; [`Error`] unifies them for APIs that span several layers (for
//! example [`crate::compiler::precompile`], which parses and compiles).

use thiserror::Error;

use crate::vm::RenderState;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error the crate can produce.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("malformed wire template: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode wire template: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode wire template: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),
}

/// Malformed template source.
///
/// Lines are 1-based, columns are 0-based character offsets into the line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Failure while lowering an AST to the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A free variable that strict mode cannot resolve.
    #[error("unresolved symbol `{name}` (line {line}, column {column})")]
    UnresolvedSymbol {
        name: String,
        line: usize,
        column: usize,
    },

    /// Syntax that parses but has no wire-format lowering.
    #[error("{message} (line {line}, column {column})")]
    Unsupported {
        message: String,
        line: usize,
        column: usize,
    },
}

/// Misuse of the tag/validator API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorError {
    /// Dirtying a non-dirtyable tag, updating a non-updatable tag, or
    /// dirtying a tag already consumed by the running computation.
    #[error("invalid tag operation: {0}")]
    InvalidOperation(String),

    /// An update would make a tag depend on itself.
    #[error("cycles in tags are not allowed")]
    CycleDetected,
}

/// Problems resolving a helper, modifier or component manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("{kind} manager {manager} is invalid: {reason}")]
    InvalidManager {
        kind: &'static str,
        manager: String,
        reason: String,
    },

    #[error("no {kind} manager is registered for definition type `{definition}`")]
    MissingManager {
        kind: &'static str,
        definition: &'static str,
    },
}

/// Errors raised while rendering or revalidating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// A user helper reported a failure.
    #[error("helper `{name}` failed: {message}")]
    Helper { name: String, message: String },

    /// A user modifier or component reported a failure.
    #[error("`{name}` failed: {message}")]
    User { name: String, message: String },

    #[error("unknown helper `{0}`")]
    UnknownHelper(String),

    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),

    #[error("no block keyword or component named `{0}`")]
    UnknownComponent(String),

    #[error("invalid arguments to `{name}`: {message}")]
    InvalidArguments { name: String, message: String },

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: RenderState,
    },

    /// The wire program references a block or symbol it does not define.
    #[error("malformed program: {0}")]
    MalformedProgram(String),
}

impl RenderError {
    pub(crate) fn invalid_args(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.to_string(),
            message: message.into(),
        }
    }
}
