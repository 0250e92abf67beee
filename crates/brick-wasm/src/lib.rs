//! Brick compiler as a WASM module for the browser-hosted block editor.
//!
//! This crate exposes the Brick compilation pipeline via `wasm-bindgen`.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { compile, find_block_id } from 'brick-wasm';
//!
//! await init();
//!
//! const result = JSON.parse(compile(workspaceJson, catalogJson, "{}"));
//! // { success: true, source: "let x = 0;\n...", source_map: { entries: [...] }, ... }
//!
//! const block = find_block_id(JSON.stringify(result.source_map), 12, 3);
//! ```

use brick_codegen::{SourceMap, Span};
use brick_compiler::{CompileOptions, CompileResult};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Compile a serialized workspace against a serialized API catalog.
///
/// Returns a JSON string containing a `CompileResult`:
/// ```json
/// {
///   "success": true,
///   "source": "basic.showNumber(1);\n\n",
///   "source_map": { "entries": [ { "block": "b1", "start": 0, "end": 20 } ] },
///   "diagnostics": { "errors": [], "total_errors": 0 },
///   "source_hash": "9f2c..."
/// }
/// ```
///
/// When the workspace, catalog or options cannot be read, `success` is
/// `false`, `source` is empty and `error` says why.
#[wasm_bindgen]
pub fn compile(workspace_json: &str, catalog_json: &str, options_json: &str) -> String {
    let result = match parse_options(options_json) {
        Ok(options) => brick_compiler::compile_to_result(workspace_json, catalog_json, &options),
        Err(e) => CompileResult::aborted(format!("invalid options: {e}")),
    };
    to_json(&result)
}

/// Like [`compile`], but takes and returns JavaScript values instead of JSON
/// text.
#[wasm_bindgen(js_name = compileValue)]
pub fn compile_value(
    workspace: JsValue,
    catalog: JsValue,
    options: JsValue,
) -> Result<JsValue, JsError> {
    let raw: brick_types::block::RawWorkspace = serde_wasm_bindgen::from_value(workspace)?;
    let catalog: brick_types::ApiCatalog = serde_wasm_bindgen::from_value(catalog)?;
    let options: CompileOptions = if options.is_undefined() || options.is_null() {
        CompileOptions::default()
    } else {
        serde_wasm_bindgen::from_value(options)?
    };

    let mut graph = brick_types::BlockGraph::from_raw(raw)?;
    let calls = brick_compiler::StdCallTable::from_catalog(&catalog);
    let result = brick_compiler::compile(&mut graph, &calls, &options)?;
    Ok(serde_wasm_bindgen::to_value(&result)?)
}

/// Resolve a span of generated text to the id of the block it came from.
///
/// `source_map_json` is the `source_map` member of a compile result.
/// Returns `undefined` when the map cannot be read or no block covers the
/// span.
#[wasm_bindgen]
pub fn find_block_id(source_map_json: &str, start: usize, length: usize) -> Option<String> {
    let map = SourceMap::from_json(source_map_json)?;
    brick_codegen::find_block_id(&map, Some(Span::new(start, length))).map(|id| id.0)
}

/// Return the compiler version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn parse_options(options_json: &str) -> Result<CompileOptions, serde_json::Error> {
    if options_json.trim().is_empty() {
        return Ok(CompileOptions::default());
    }
    serde_json::from_str(options_json)
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"source":"","source_map":{{"entries":[]}},"diagnostics":{{"errors":[],"total_errors":0}},"source_hash":"","error":"Serialization error: {}"}}"#,
            e
        )
    })
}
