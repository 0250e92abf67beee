//! Expression rendering.
//!
//! Operators are calls whose name appears in the priority table. They are
//! written infix and parenthesized only when their priority is below the
//! priority demanded by the surrounding context.

use brick_types::ast::*;

use crate::emitter::EmitContext;
use crate::error::{CodegenError, CodegenResult};
use crate::stmt::emit_stmts;

/// Context priority of a call argument or other delimited position.
pub const OPEN: u32 = 0;

/// Operand of a prefix operator: any infix operator needs parentheses.
const PREFIX_OPERAND: u32 = 980;

/// Priority of the prefix operators `-` and `!`.
const PREFIX: u32 = 150;

/// Operator priorities, scaled by ten so right operands can bind one step
/// tighter.
const PRIORITIES: &[(&str, u32)] = &[
    ("=", 30),
    ("||", 50),
    ("&&", 60),
    ("|", 70),
    ("^", 80),
    ("&", 90),
    ("==", 100),
    ("!=", 100),
    ("===", 100),
    ("!==", 100),
    ("<", 110),
    (">", 110),
    ("<=", 110),
    (">=", 110),
    (">>", 120),
    (">>>", 120),
    ("<<", 120),
    ("+", 130),
    ("-", 130),
    ("*", 140),
    ("/", 140),
    ("%", 140),
    ("!", 150),
];

/// Priority of an infix operator, `None` for ordinary calls.
pub fn infix_priority(name: &str) -> Option<u32> {
    PRIORITIES
        .iter()
        .find(|(op, _)| *op == name)
        .map(|(_, p)| *p)
}

/// Render `expr` in a context that requires at least priority `prio`.
pub fn emit_expr<'a>(expr: &'a Expr, ctx: &mut EmitContext<'a>, prio: u32) -> CodegenResult<()> {
    ctx.mapped(expr.block.as_ref(), |ctx| match &expr.kind {
        ExprKind::Number(n) => {
            let text = format_number(*n);
            if *n < 0.0 && prio >= PREFIX_OPERAND {
                ctx.write(&format!("({text})"));
            } else {
                ctx.write(&text);
            }
            Ok(())
        }
        ExprKind::String(s) => {
            emit_string(s, ctx);
            Ok(())
        }
        ExprKind::Bool(b) => {
            ctx.write(if *b { "true" } else { "false" });
            Ok(())
        }
        ExprKind::Array(items) => {
            ctx.write("[");
            emit_args(items, ctx)?;
            ctx.write("]");
            Ok(())
        }
        ExprKind::Local(local) => emit_local(local, ctx),
        ExprKind::Call(call) => emit_call(call, ctx, prio),
    })
}

fn emit_args<'a>(args: &'a [Expr], ctx: &mut EmitContext<'a>) -> CodegenResult<()> {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            ctx.write(", ");
        }
        emit_expr(arg, ctx, OPEN)?;
    }
    Ok(())
}

fn emit_local<'a>(local: &'a LocalRef, ctx: &mut EmitContext<'a>) -> CodegenResult<()> {
    if local.name != CALLBACK_REFERENCE {
        ctx.write(&local.name);
        return Ok(());
    }
    let action = ctx
        .current_callback()
        .ok_or_else(|| CodegenError::StrayCallbackReference(local.name.clone()))?;
    ctx.write("() => ");
    ctx.open_block();
    emit_stmts(&action.body, ctx)?;
    ctx.close_block();
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════════

pub fn emit_call<'a>(call: &'a Call, ctx: &mut EmitContext<'a>, prio: u32) -> CodegenResult<()> {
    match infix_priority(&call.name) {
        Some(pri) => emit_operator(call, pri, ctx, prio),
        None => emit_named_call(call, ctx),
    }
}

fn emit_operator<'a>(
    call: &'a Call,
    pri: u32,
    ctx: &mut EmitContext<'a>,
    prio: u32,
) -> CodegenResult<()> {
    match call.args.as_slice() {
        // `0 - x` is how negation arrives from the blocks.
        [zero, operand] if call.name == "-" && zero.is_number(0.0) => {
            emit_prefix("-", operand, ctx, prio)
        }
        [operand] => emit_prefix(&call.name, operand, ctx, prio),
        [left, right] => {
            let wrap = pri < prio;
            // Assignment associates to the right.
            let bind_left = pri != 30;
            if wrap {
                ctx.write("(");
            }
            emit_expr(left, ctx, if bind_left { pri } else { pri + 1 })?;
            ctx.write(&format!(" {} ", call.name));
            emit_expr(right, ctx, if bind_left { pri + 1 } else { pri })?;
            if wrap {
                ctx.write(")");
            }
            Ok(())
        }
        args => Err(CodegenError::OperatorArity {
            op: call.name.clone(),
            count: args.len(),
        }),
    }
}

fn emit_prefix<'a>(
    token: &str,
    operand: &'a Expr,
    ctx: &mut EmitContext<'a>,
    prio: u32,
) -> CodegenResult<()> {
    let wrap = PREFIX < prio;
    if wrap {
        ctx.write("(");
    }
    ctx.write(token);
    emit_expr(operand, ctx, PREFIX_OPERAND)?;
    if wrap {
        ctx.write(")");
    }
    Ok(())
}

fn emit_named_call<'a>(call: &'a Call, ctx: &mut EmitContext<'a>) -> CodegenResult<()> {
    let args = match call.style {
        CallStyle::Method => {
            let (receiver, rest) = call
                .args
                .split_first()
                .ok_or_else(|| CodegenError::MissingReceiver(call.name.clone()))?;
            emit_expr(receiver, ctx, PREFIX_OPERAND)?;
            ctx.write(".");
            rest
        }
        CallStyle::Free => {
            match &call.owner {
                Owner::Math => ctx.write("Math."),
                Owner::Namespace(ns) => {
                    ctx.write(ns);
                    ctx.write(".");
                }
                _ => {}
            }
            call.args.as_slice()
        }
    };
    ctx.write(&call.name);
    if !call.property {
        ctx.write("(");
        emit_args(args, ctx)?;
        ctx.write(")");
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

/// Integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn emit_string(s: &str, ctx: &mut EmitContext<'_>) {
    if s.chars().count() > ctx.options.template_literal_min_len && s.contains('\n') {
        let mut lit = String::with_capacity(s.len() + 2);
        lit.push('`');
        for c in s.chars() {
            if matches!(c, '\\' | '`' | '$' | '{' | '}') {
                lit.push('\\');
            }
            lit.push(c);
        }
        lit.push('`');
        ctx.write_verbatim(&lit);
    } else {
        let lit = serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""));
        ctx.write(&lit);
    }
}
