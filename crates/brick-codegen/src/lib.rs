//! Brick code generator: renders the intermediate AST to TypeScript text.
//!
//! # Layout
//!
//! - Statements end with `;` on their own line; blocks open with `{` on the
//!   header line and close with `}` on a line of their own.
//! - `else` and `else if` start a new line after the closing `}`.
//! - Nested blocks are indented by [`EmitOptions::indent_width`] spaces.
//! - The output never contains blank lines and always ends with a newline.
//!
//! # Declarations
//!
//! The first assignment to a name inside a block declares it with `let`.
//! Names declared in an enclosing block are visible in nested blocks, not
//! the other way round.
//!
//! # Source map
//!
//! Every node carrying a block id contributes a `[start, end)` interval over
//! the output, innermost nodes first. See [`source_map::find_block_id`].

pub mod emitter;
pub mod error;
pub mod expr;
pub mod source_map;
pub mod stmt;

pub use emitter::{emit, EmitOptions, Output};
pub use error::{CodegenError, CodegenResult};
pub use source_map::{find_block_id, SourceInterval, SourceMap, Span};
