//! Codegen error types.

use thiserror::Error;

/// Errors that can occur while rendering the intermediate AST.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// The implicit callback reference appeared outside a callback call.
    #[error("callback reference '{0}' used outside a callback call")]
    StrayCallbackReference(String),

    /// An operator call has the wrong number of operands.
    #[error("operator '{op}' expects 1 or 2 operands, got {count}")]
    OperatorArity { op: String, count: usize },

    /// A method-style call has no receiver.
    #[error("method call '{0}' has no receiver")]
    MissingReceiver(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
