//! Brick compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! Block graph → Environment → Type Inference → Lowering → Emitter → TypeScript + source map
//! ```
//!
//! Inference attaches placeholder blocks to empty inputs of the graph; they
//! are removed again before [`compile`] returns, on every path.

pub mod env;
pub mod infer;
pub mod lower;
pub mod stdcall;
pub mod ty;
pub mod unify;

use std::ops::{Deref, DerefMut};

use brick_codegen::{CodegenError, EmitOptions, SourceMap};
use brick_types::ast::Procedure;
use brick_types::{ApiCatalog, BlockGraph, CompileErrors, GraphError, InternalError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, debug_span};

use crate::env::{build_env, TypeState};
use crate::lower::Lowering;
pub use crate::stdcall::StdCallTable;

/// Errors that abort a compilation.
///
/// Problems the user can fix in the editor are not errors: they are
/// collected in [`CompileResult::diagnostics`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid workspace: {0}")]
    Graph(#[from] GraphError),
    #[error("invalid API catalog: {0}")]
    Catalog(#[from] serde_json::Error),
    #[error(transparent)]
    Internal(#[from] InternalError),
    #[error("code generation failed: {0}")]
    Codegen(#[from] CodegenError),
}

/// Compilation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub emit: EmitOptions,
}

/// Result of a compilation, serializable for the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileResult {
    /// `true` when no diagnostic was reported.
    pub success: bool,
    /// Generated text; produced even when diagnostics were reported.
    pub source: String,
    pub source_map: SourceMap,
    pub diagnostics: CompileErrors,
    /// Lowercase hex SHA-256 of `source`.
    pub source_hash: String,
    /// Why the compilation was aborted, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompileResult {
    /// An unsuccessful result with no output, carrying `reason`.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            source: String::new(),
            source_map: SourceMap::new(),
            diagnostics: CompileErrors::empty(),
            source_hash: String::new(),
            error: Some(reason.into()),
        }
    }
}

/// Lowercase hex SHA-256 of `source`.
pub fn source_hash(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

/// Mutable access to a graph that drops its placeholders when released.
struct PlaceholderGuard<'g> {
    graph: &'g mut BlockGraph,
}

impl Deref for PlaceholderGuard<'_> {
    type Target = BlockGraph;

    fn deref(&self) -> &BlockGraph {
        self.graph
    }
}

impl DerefMut for PlaceholderGuard<'_> {
    fn deref_mut(&mut self) -> &mut BlockGraph {
        self.graph
    }
}

impl Drop for PlaceholderGuard<'_> {
    fn drop(&mut self) {
        self.graph.remove_placeholders();
    }
}

/// Infer types and lower the graph to the intermediate AST.
///
/// Diagnostics are returned alongside the procedure; only invariant
/// violations fail.
pub fn compile_to_ast(
    graph: &mut BlockGraph,
    calls: &StdCallTable,
) -> Result<(Procedure, CompileErrors), Error> {
    let mut graph = PlaceholderGuard { graph };
    let mut state = TypeState::new();
    let mut errors = CompileErrors::empty();

    let env = build_env(&graph, &mut state);
    debug!(bindings = state.binding_count(), "environment built");
    infer::infer(&mut graph, &env, calls, &mut state, &mut errors)?;
    let procedure = Lowering::new(&graph, calls, &mut state, &mut errors).compile_workspace(&env)?;
    Ok((procedure, errors))
}

/// Compile a block graph to TypeScript text plus its source map.
pub fn compile(
    graph: &mut BlockGraph,
    calls: &StdCallTable,
    options: &CompileOptions,
) -> Result<CompileResult, Error> {
    let span = debug_span!("compile", blocks = graph.len());
    let _enter = span.enter();

    let (procedure, diagnostics) = compile_to_ast(graph, calls)?;
    let output = brick_codegen::emit(&procedure, &options.emit)?;
    debug!(
        bytes = output.source.len(),
        intervals = output.source_map.len(),
        diagnostics = diagnostics.total_errors,
        "compiled"
    );
    Ok(CompileResult {
        success: !diagnostics.has_errors(),
        source_hash: source_hash(&output.source),
        source: output.source,
        source_map: output.source_map,
        diagnostics,
        error: None,
    })
}

/// Compile from the editor's serialized workspace and API catalog.
pub fn compile_json(
    workspace_json: &str,
    catalog_json: &str,
    options: &CompileOptions,
) -> Result<CompileResult, Error> {
    let mut graph = BlockGraph::from_json(workspace_json)?;
    let catalog = ApiCatalog::from_json(catalog_json)?;
    let calls = StdCallTable::from_catalog(&catalog);
    compile(&mut graph, &calls, options)
}

/// Like [`compile_json`], but folds an aborted compilation into an
/// unsuccessful [`CompileResult`] carrying the reason.
pub fn compile_to_result(
    workspace_json: &str,
    catalog_json: &str,
    options: &CompileOptions,
) -> CompileResult {
    compile_json(workspace_json, catalog_json, options)
        .unwrap_or_else(|e| CompileResult::aborted(e.to_string()))
}
