//! Emission context: the output buffer, indentation, declared-variable
//! scopes and the source map under construction.
//!
//! The writer never produces blank lines or leading newlines: a `'\n'` is
//! dropped when the buffer is empty or already at the start of a line, and
//! indentation is only written in front of actual text. Offsets recorded in
//! the source map are therefore final.

use std::collections::HashSet;

use brick_types::ast::{InlineAction, Procedure};
use brick_types::BlockId;
use serde::{Deserialize, Serialize};

use crate::error::CodegenResult;
use crate::source_map::SourceMap;
use crate::stmt::emit_stmts;

/// Layout options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Spaces per nesting level.
    pub indent_width: usize,
    /// Strings longer than this that contain a newline are written as
    /// template literals.
    pub template_literal_min_len: usize,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            indent_width: 4,
            template_literal_min_len: 20,
        }
    }
}

/// Generated text plus its source map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub source: String,
    pub source_map: SourceMap,
}

/// Render a procedure to source text.
///
/// The result always ends with a newline, so it is never empty.
pub fn emit(procedure: &Procedure, options: &EmitOptions) -> CodegenResult<Output> {
    let mut ctx = EmitContext::new(options);
    emit_stmts(&procedure.body, &mut ctx)?;
    Ok(ctx.finish())
}

pub struct EmitContext<'a> {
    pub options: &'a EmitOptions,
    out: String,
    depth: usize,
    at_line_start: bool,
    /// Names declared so far, one set per open block.
    scopes: Vec<HashSet<String>>,
    /// Innermost callback whose reference is being rendered.
    callbacks: Vec<&'a InlineAction>,
    source_map: SourceMap,
}

impl<'a> EmitContext<'a> {
    pub fn new(options: &'a EmitOptions) -> Self {
        Self {
            options,
            out: String::new(),
            depth: 0,
            at_line_start: true,
            scopes: vec![HashSet::new()],
            callbacks: Vec::new(),
            source_map: SourceMap::new(),
        }
    }

    pub fn finish(mut self) -> Output {
        self.out.push('\n');
        Output {
            source: self.out,
            source_map: self.source_map,
        }
    }

    // ── Writing ──────────────────────────────────────────────────────────

    pub fn write(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                if !self.at_line_start {
                    self.out.push('\n');
                    self.at_line_start = true;
                }
            } else {
                self.flush_indent();
                self.out.push(c);
            }
        }
    }

    /// Write `s` as is; used for template literals, whose newlines are
    /// content.
    pub fn write_verbatim(&mut self, s: &str) {
        self.flush_indent();
        self.out.push_str(s);
    }

    pub fn newline(&mut self) {
        self.write("\n");
    }

    fn flush_indent(&mut self) {
        if self.at_line_start {
            let width = self.depth * self.options.indent_width;
            self.out.extend(std::iter::repeat(' ').take(width));
            self.at_line_start = false;
        }
    }

    /// Byte offset of the next character written.
    pub fn offset(&self) -> usize {
        self.out.len()
    }

    /// Run `f` and record the text it wrote as belonging to `block`.
    pub fn mapped(
        &mut self,
        block: Option<&BlockId>,
        f: impl FnOnce(&mut Self) -> CodegenResult<()>,
    ) -> CodegenResult<()> {
        let Some(block) = block else {
            return f(self);
        };
        self.flush_indent();
        let start = self.offset();
        f(self)?;
        let end = self.offset();
        self.source_map.push(block.clone(), start, end);
        Ok(())
    }

    // ── Scopes ───────────────────────────────────────────────────────────

    /// Open a `{ ... }` block: inner declarations do not leak out.
    pub fn open_block(&mut self) {
        let inherited = self.scopes.last().cloned().unwrap_or_default();
        self.scopes.push(inherited);
        self.write("{\n");
        self.depth += 1;
    }

    pub fn close_block(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.write("\n}");
        self.scopes.pop();
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|s| s.contains(name))
    }

    /// Mark `name` declared in the current block.
    pub fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    // ── Callbacks ────────────────────────────────────────────────────────

    pub fn push_callback(&mut self, action: &'a InlineAction) {
        self.callbacks.push(action);
    }

    pub fn pop_callback(&mut self) {
        self.callbacks.pop();
    }

    pub fn current_callback(&self) -> Option<&'a InlineAction> {
        self.callbacks.last().copied()
    }
}
