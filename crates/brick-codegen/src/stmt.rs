//! Statement rendering.
//!
//! Every statement ends on its own line. Compound statements record their
//! header expression (condition or bound) in the source map; simple
//! statements record their whole text.

use brick_types::ast::*;
use brick_types::BlockId;

use crate::emitter::EmitContext;
use crate::error::CodegenResult;
use crate::expr::{emit_call, emit_expr, OPEN};

/// Emit a slice of statements.
pub fn emit_stmts<'a>(stmts: &'a [Stmt], ctx: &mut EmitContext<'a>) -> CodegenResult<()> {
    for stmt in stmts {
        emit_stmt(stmt, ctx)?;
    }
    Ok(())
}

/// Emit a single statement.
pub fn emit_stmt<'a>(stmt: &'a Stmt, ctx: &mut EmitContext<'a>) -> CodegenResult<()> {
    let block = stmt.block.as_ref();
    match &stmt.kind {
        StmtKind::Expr(expr) => ctx.mapped(block, |ctx| {
            emit_expr(expr, ctx, OPEN)?;
            ctx.write(";");
            Ok(())
        })?,
        StmtKind::Define { local, value } => ctx.mapped(block, |ctx| {
            ctx.declare(&local.name);
            emit_declaration(&local.name, Some(local.ty.as_str()), ctx);
            ctx.write(" = ");
            emit_expr(value, ctx, OPEN)?;
            ctx.write(";");
            Ok(())
        })?,
        StmtKind::Assign { target, value } => ctx.mapped(block, |ctx| {
            if ctx.is_declared(&target.name) {
                ctx.write(&target.name);
            } else {
                ctx.declare(&target.name);
                emit_declaration(&target.name, target.ty.as_deref(), ctx);
            }
            ctx.write(" = ");
            emit_expr(value, ctx, OPEN)?;
            ctx.write(";");
            Ok(())
        })?,
        StmtKind::If(if_stmt) => emit_if(if_stmt, block, ctx)?,
        StmtKind::While { cond, body } => {
            ctx.write("while (");
            ctx.mapped(block, |ctx| emit_expr(cond, ctx, OPEN))?;
            ctx.write(") ");
            emit_block(body, ctx)?;
        }
        StmtKind::For { index, bound, body } => {
            ctx.write("for (let ");
            ctx.write(index);
            ctx.write(" = 0; ");
            ctx.write(index);
            ctx.write(" < ");
            ctx.mapped(block, |ctx| emit_expr(bound, ctx, OPEN))?;
            ctx.write("; ");
            ctx.write(index);
            ctx.write("++) ");
            ctx.open_block();
            ctx.declare(index);
            emit_stmts(body, ctx)?;
            ctx.close_block();
        }
        StmtKind::CallWithCallback { call, action } => ctx.mapped(block, |ctx| {
            ctx.push_callback(action);
            let result = emit_call(call, ctx, OPEN);
            ctx.pop_callback();
            result?;
            ctx.write(";");
            Ok(())
        })?,
    }
    ctx.newline();
    Ok(())
}

/// `let name` plus a type annotation for anything but numbers.
fn emit_declaration(name: &str, ty: Option<&str>, ctx: &mut EmitContext<'_>) {
    ctx.write("let ");
    ctx.write(name);
    if let Some(ty) = ty.filter(|t| *t != "number") {
        ctx.write(": ");
        ctx.write(ty);
    }
}

fn emit_if<'a>(
    if_stmt: &'a IfStmt,
    block: Option<&BlockId>,
    ctx: &mut EmitContext<'a>,
) -> CodegenResult<()> {
    if if_stmt.is_else_if {
        ctx.write("else ");
    }
    ctx.write("if (");
    ctx.mapped(block, |ctx| emit_expr(&if_stmt.cond, ctx, OPEN))?;
    ctx.write(") ");
    emit_block(&if_stmt.then_body, ctx)?;
    if !if_stmt.else_body.is_empty() {
        ctx.newline();
        ctx.write("else ");
        emit_block(&if_stmt.else_body, ctx)?;
    }
    Ok(())
}

fn emit_block<'a>(body: &'a [Stmt], ctx: &mut EmitContext<'a>) -> CodegenResult<()> {
    ctx.open_block();
    emit_stmts(body, ctx)?;
    ctx.close_block();
    Ok(())
}
