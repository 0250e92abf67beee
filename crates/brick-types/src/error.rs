use crate::BlockId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Type,
    Literal,
    Structure,
}

/// Numeric error code (E100–E399).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Type errors (E100–E199) ──
    pub const PARAMETER_TYPE_MISMATCH: Self = Self(100);
    pub const COMPARISON_TYPE_MISMATCH: Self = Self(101);
    pub const UNCOMPARABLE_TYPE: Self = Self(102);
    pub const ASSIGNMENT_TYPE_MISMATCH: Self = Self(103);
    pub const UNTYPED_PARAMETER: Self = Self(104);

    // ── Literal errors (E200–E299) ──
    pub const INVALID_NUMBER: Self = Self(200);
    pub const NUMBER_OUT_OF_RANGE: Self = Self(201);

    // ── Structure errors (E300–E399) ──
    pub const UNKNOWN_BLOCK_KIND: Self = Self(300);
    pub const MISSING_ARGUMENT: Self = Self(301);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Type,
            200..=299 => ErrorCategory::Literal,
            _ => ErrorCategory::Structure,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Literal => write!(f, "literal"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

/// A recoverable, block-attributable compilation error.
///
/// These are collected while compiling and never abort the pass: the
/// offending block is replaced by a default value and compilation goes on.
/// The editor uses `block` to highlight the culprit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileError {
    /// Error code (e.g., E100).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// The block the error is attributed to.
    pub block: BlockId,
}

impl CompileError {
    /// Create a new error.
    pub fn new(code: ErrorCode, message: impl Into<String>, block: BlockId) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            block,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.block, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// Ordered collection of the diagnostics reported by one compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<CompileError>,
    pub total_errors: usize,
}

impl CompileErrors {
    /// Create an empty collection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Append an error.
    pub fn push_error(&mut self, error: CompileError) {
        self.errors.push(error);
        self.total_errors += 1;
    }

    /// Shorthand for building and appending an error.
    pub fn report(&mut self, code: ErrorCode, message: impl Into<String>, block: &BlockId) {
        self.push_error(CompileError::new(code, message, block.clone()));
    }

    /// `(message, block)` pairs in report order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &BlockId)> {
        self.errors.iter().map(|e| (e.message.as_str(), &e.block))
    }
}

/// An internal invariant does not hold.
///
/// Unlike [`CompileError`] this is not the user's fault and aborts the whole
/// compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("internal compiler error: {0}")]
pub struct InternalError(pub String);

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
