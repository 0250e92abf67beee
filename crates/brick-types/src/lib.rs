//! Shared types for the Brick compiler.
//!
//! This crate defines the block graph handed over by the editor, the API
//! catalog describing library functions, the intermediate AST produced by
//! lowering, and the diagnostic/error types used across all stages.

mod error;
pub mod ast;
pub mod block;
pub mod catalog;

pub use block::{BlockGraph, BlockId, GraphError, NodeId, Slot};
pub use catalog::ApiCatalog;
pub use error::{CompileError, CompileErrors, ErrorCategory, ErrorCode, InternalError};

/// Result type for operations that can only fail on an invariant violation.
pub type Result<T> = std::result::Result<T, InternalError>;
