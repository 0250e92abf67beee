//! Lowering: block graph → intermediate AST.
//!
//! Runs after inference, so every constrained input holds a block (possibly
//! a placeholder) and every variable has a type. Recoverable problems are
//! reported and replaced by the default value of the expected type.

use brick_types::ast::{
    Call, CallStyle, Expr, ExprKind, IfStmt, InlineAction, LocalDef, LocalRef, Owner, Procedure,
    Stmt, StmtKind, CALLBACK_REFERENCE,
};
use brick_types::block::{BinaryOp, BlockKind};
use brick_types::catalog::{Literal, HANDLER_INPUT};
use brick_types::{BlockGraph, CompileErrors, ErrorCode, InternalError, NodeId, Slot};
use tracing::{debug, warn};

use crate::env::{leading_int, Env, TypeState, VarUsage};
use crate::stdcall::{StdArg, StdCallTable, StdFunc};
use crate::ty::TypeTag;
use crate::unify::Point;

type LowerResult<T> = Result<T, InternalError>;

/// Rows of an LED image; each frame is as wide as it is tall.
const IMAGE_ROWS: u32 = 5;

pub struct Lowering<'a> {
    graph: &'a BlockGraph,
    calls: &'a StdCallTable,
    state: &'a mut TypeState,
    errors: &'a mut CompileErrors,
}

impl<'a> Lowering<'a> {
    pub fn new(
        graph: &'a BlockGraph,
        calls: &'a StdCallTable,
        state: &'a mut TypeState,
        errors: &'a mut CompileErrors,
    ) -> Self {
        Self {
            graph,
            calls,
            state,
            errors,
        }
    }

    /// Compile every top-level chain into the body of `main`, preceded by
    /// the declarations of the variables that need one.
    pub fn compile_workspace(mut self, env: &Env) -> LowerResult<Procedure> {
        let graph = self.graph;
        let mut main = Vec::new();
        for &head in graph.top_blocks() {
            main.extend(self.compile_statements(env, Some(head))?);
        }

        let mut body = self.predeclarations(env);
        debug!(
            declarations = body.len(),
            statements = main.len(),
            "lowering finished"
        );
        body.append(&mut main);
        Ok(Procedure {
            name: "main".to_string(),
            body,
        })
    }

    /// `let x = <default>;` for every variable that is neither a native loop
    /// index nor declared by its first top-level assignment, in the order the
    /// variables were first seen.
    fn predeclarations(&mut self, env: &Env) -> Vec<Stmt> {
        let mut ids: Vec<_> = env.iter().collect();
        ids.reverse();
        let mut decls = Vec::new();
        for id in ids {
            let binding = self.state.binding(id);
            if binding.is_compiled_as_for_index() || binding.usage == VarUsage::Assign {
                continue;
            }
            let (name, point) = (binding.name.clone(), binding.point);
            let ty = self.state.binding_type(id);
            decls.push(Stmt::new(StmtKind::Define {
                local: LocalDef {
                    name,
                    ty: ty.to_string(),
                },
                value: self.default_value_for_type(point),
            }));
        }
        decls
    }

    // ── Statements ───────────────────────────────────────────────────────

    /// Compile the chain starting at `head`, skipping disabled blocks.
    fn compile_statements(&mut self, env: &Env, head: Option<NodeId>) -> LowerResult<Vec<Stmt>> {
        let graph = self.graph;
        let mut stmts = Vec::new();
        for node in graph.chain(head) {
            if graph[node].disabled {
                continue;
            }
            stmts.extend(self.compile_statement_block(env, node)?);
        }
        Ok(stmts)
    }

    fn compile_body(&mut self, env: &Env, node: NodeId, slot: Slot) -> LowerResult<Vec<Stmt>> {
        self.compile_statements(env, self.graph.target(node, slot))
    }

    fn compile_statement_block(&mut self, env: &Env, node: NodeId) -> LowerResult<Vec<Stmt>> {
        let (graph, calls) = (self.graph, self.calls);
        let block = &graph[node];
        let stmts = match &block.kind {
            BlockKind::If { .. } => self.compile_if(env, node)?,
            BlockKind::For { .. } | BlockKind::SimpleFor { .. } => self.compile_for(env, node)?,
            BlockKind::VariableSet { var, value } => vec![self.compile_set(env, node, var, *value)?],
            BlockKind::VariableChange { var, delta } => {
                vec![self.compile_change(env, node, var, *delta)?]
            }
            BlockKind::Repeat { times, body } => {
                let bound = self.compile_input(env, node, *times)?;
                let body = self.compile_body(env, node, *body)?;
                let index = self.state.fresh_name(env, "i");
                vec![Stmt::new(StmtKind::For { index, bound, body })]
            }
            BlockKind::While { cond, body } => {
                let cond = self.compile_input(env, node, *cond)?;
                let body = self.compile_body(env, node, *body)?;
                vec![Stmt::new(StmtKind::While { cond, body })]
            }
            BlockKind::Forever { body } => {
                let body = self.compile_body(env, node, *body)?;
                vec![callback_call(
                    Call::namespaced("basic", "forever", Vec::new()),
                    body,
                )]
            }
            BlockKind::Call => match calls.get(&block.type_name) {
                Some(func) => vec![self.compile_call(env, node, func)?],
                None => vec![Stmt::new(StmtKind::Expr(self.compile_expression(env, node)?))],
            },
            _ => vec![Stmt::new(StmtKind::Expr(self.compile_expression(env, node)?))],
        };
        Ok(stmts.into_iter().map(|s| s.or_block(&block.id)).collect())
    }

    /// A flat `if` / `else if` chain. An `else` branch that is itself one
    /// such chain is spliced into this one.
    fn compile_if(&mut self, env: &Env, node: NodeId) -> LowerResult<Vec<Stmt>> {
        let graph = self.graph;
        let BlockKind::If { clauses, otherwise } = &graph[node].kind else {
            return Err(InternalError::new("compile_if called on a non-if block"));
        };

        let mut chain = Vec::with_capacity(clauses.len());
        for (i, clause) in clauses.iter().enumerate() {
            let cond = self.compile_input(env, node, clause.cond)?;
            let then_body = self.compile_body(env, node, clause.body)?;
            chain.push(IfStmt {
                cond,
                then_body,
                else_body: Vec::new(),
                is_else_if: i > 0,
            });
        }

        let mut spliced = Vec::new();
        if let Some(otherwise) = otherwise {
            let else_body = self.compile_body(env, node, *otherwise)?;
            if is_if_chain(&else_body) {
                spliced = else_body;
                if let Some(StmtKind::If(first)) = spliced.first_mut().map(|s| &mut s.kind) {
                    first.is_else_if = true;
                }
            } else if let Some(last) = chain.last_mut() {
                last.else_body = else_body;
            }
        }

        let mut stmts: Vec<Stmt> = chain
            .into_iter()
            .map(|s| Stmt::new(StmtKind::If(s)))
            .collect();
        stmts.append(&mut spliced);
        Ok(stmts)
    }

    fn compile_for(&mut self, env: &Env, node: NodeId) -> LowerResult<Vec<Stmt>> {
        let graph = self.graph;
        let (var, from, to, by, body) = match &graph[node].kind {
            BlockKind::For {
                var,
                from,
                to,
                by,
                body,
            } => (var, Some(*from), *to, Some(*by), *body),
            BlockKind::SimpleFor { var, to, body } => (var, None, *to, None, *body),
            _ => return Err(InternalError::new("compile_for called on a non-loop block")),
        };
        let binding = self.state.expect_binding(env, var)?;
        if self.state.binding(binding).used_as_for_index == 0 {
            return Err(InternalError::new(format!(
                "loop variable '{var}' is not marked as a loop index"
            )));
        }

        if self.state.binding(binding).is_compiled_as_for_index() {
            let bound = plus_one(self.compile_input(env, node, to)?);
            let body = self.compile_body(env, node, body)?;
            return Ok(vec![Stmt::new(StmtKind::For {
                index: var.clone(),
                bound,
                body,
            })]);
        }

        // The bound is evaluated once into a hidden local; the index stays a
        // plain variable so its value after the loop is observable.
        let local = self.state.fresh_name(env, "bound");
        let number = self.state.types.number();
        let (env, _) = self.state.bind(env, &local, number);
        let bound = self.compile_input(&env, node, to)?;
        let start = match from {
            Some(slot) => self.compile_input(&env, node, slot)?,
            None => Expr::number(0.0),
        };
        let step = match by {
            Some(slot) => self.compile_input(&env, node, slot)?,
            None => Expr::number(1.0),
        };
        let mut loop_body = self.compile_body(&env, node, body)?;
        loop_body.push(assign(
            LocalRef::new(var.clone()),
            Expr::op("+", Owner::Number, vec![Expr::local(var.clone()), step]),
        ));

        Ok(vec![
            assign(LocalRef::new(local.clone()), bound),
            assign(LocalRef::new(var.clone()), start),
            Stmt::new(StmtKind::While {
                cond: Expr::op(
                    "<=",
                    Owner::Number,
                    vec![Expr::local(var.clone()), Expr::local(local)],
                ),
                body: loop_body,
            }),
        ])
    }

    fn compile_set(&mut self, env: &Env, node: NodeId, var: &str, value: Slot) -> LowerResult<Stmt> {
        let id = self.state.expect_binding(env, var)?;
        if self.state.binding(id).usage == VarUsage::Unknown {
            self.state.binding_mut(id).usage = if self.graph.scope_parent(node).is_none() {
                VarUsage::Assign
            } else {
                VarUsage::Read
            };
        }
        let value = self.compile_input(env, node, value)?;
        let ty = self.state.binding_type(id);
        Ok(assign(
            LocalRef {
                name: var.to_string(),
                ty: Some(ty.to_string()),
            },
            value,
        ))
    }

    fn compile_change(
        &mut self,
        env: &Env,
        node: NodeId,
        var: &str,
        delta: Slot,
    ) -> LowerResult<Stmt> {
        self.mark_read(env, var)?;
        let delta = self.compile_input(env, node, delta)?;
        Ok(assign(
            LocalRef::new(var),
            Expr::op("+", Owner::Number, vec![Expr::local(var), delta]),
        ))
    }

    /// A library call in statement position.
    fn compile_call(&mut self, env: &Env, node: NodeId, func: &StdFunc) -> LowerResult<Stmt> {
        if let Some(frames) = func.image_literal {
            let call = self.compile_image(env, node, frames, func)?;
            return Ok(Stmt::new(StmtKind::Expr(Expr::call(call))));
        }
        if func.has_handler {
            return self.compile_event(env, node, func);
        }
        let call = self.compile_std_call(env, node, func)?;
        Ok(Stmt::new(StmtKind::Expr(Expr::call(call))))
    }

    /// A handler registration: the body in `HANDLER` becomes the callback.
    fn compile_event(&mut self, env: &Env, node: NodeId, func: &StdFunc) -> LowerResult<Stmt> {
        let mut args = Vec::new();
        for arg in &func.args {
            if let StdArg::Slot { .. } = arg {
                args.push(self.compile_argument(env, node, arg)?);
            }
        }
        let body = match self.graph[node].slot(HANDLER_INPUT) {
            Some(slot) => self.compile_body(env, node, slot)?,
            None => Vec::new(),
        };
        Ok(callback_call(library_call(func, args), body))
    }

    // ── Expressions ──────────────────────────────────────────────────────

    /// The expression in input `slot`, which inference has filled.
    fn compile_input(&mut self, env: &Env, node: NodeId, slot: Slot) -> LowerResult<Expr> {
        let target = self.graph.target(node, slot).ok_or_else(|| {
            InternalError::new(format!(
                "input {} of block '{}' is empty",
                self.graph[node].input(slot).name,
                self.graph[node].id
            ))
        })?;
        self.compile_expression(env, target)
    }

    pub fn compile_expression(&mut self, env: &Env, node: NodeId) -> LowerResult<Expr> {
        let (graph, calls) = (self.graph, self.calls);
        let block = &graph[node];
        if block.is_placeholder() {
            let point = self.state.return_type(graph, env, node)?;
            return Ok(self.default_value_for_type(point));
        }
        if block.disabled {
            let point = self.state.return_type(graph, env, node)?;
            return Ok(self.default_value_for_type(point).with_block(&block.id));
        }

        let expr = match &block.kind {
            BlockKind::Number { literal } => Expr::number(f64::from(self.extract_number(node, literal))),
            BlockKind::Text { value } => Expr::string(value.clone()),
            BlockKind::Boolean { value } => Expr::boolean(*value),
            BlockKind::Binary { op, left, right } => {
                self.compile_arithmetic(env, node, *op, *left, *right)?
            }
            BlockKind::MathOp2 { function, x, y } => {
                let x = self.compile_input(env, node, *x)?;
                let y = self.compile_input(env, node, *y)?;
                Expr::call(Call::math(function, vec![x, y]))
            }
            BlockKind::MathAbs { x } => {
                let x = self.compile_input(env, node, *x)?;
                Expr::call(Call::math("abs", vec![x]))
            }
            BlockKind::Random { limit } => {
                let limit = plus_one(self.compile_input(env, node, *limit)?);
                Expr::call(Call::math("random", vec![limit]))
            }
            BlockKind::Not { operand } => {
                let operand = self.compile_input(env, node, *operand)?;
                Expr::op("!", Owner::Boolean, vec![operand])
            }
            BlockKind::ListCreate { items } => {
                let mut elements = Vec::with_capacity(items.len());
                for &slot in items {
                    if let Some(item) = graph.target(node, slot) {
                        elements.push(self.compile_expression(env, item)?);
                    }
                }
                Expr::new(ExprKind::Array(elements))
            }
            BlockKind::VariableGet { var } => {
                self.mark_read(env, var)?;
                Expr::local(var.clone())
            }
            BlockKind::Call => match calls.get(&block.type_name) {
                Some(func) => match func.image_literal {
                    Some(frames) => Expr::call(self.compile_image(env, node, frames, func)?),
                    None => Expr::call(self.compile_std_call(env, node, func)?),
                },
                None => self.unknown_block(env, node)?,
            },
            _ => self.unknown_block(env, node)?,
        };
        Ok(expr.with_block(&block.id))
    }

    fn unknown_block(&mut self, env: &Env, node: NodeId) -> LowerResult<Expr> {
        let graph = self.graph;
        let block = &graph[node];
        warn!(block = %block.id, kind = %block.type_name, "unable to compile block");
        self.errors.report(
            ErrorCode::UNKNOWN_BLOCK_KIND,
            format!("Unable to compile block of kind {}", block.type_name),
            &block.id,
        );
        let point = self.state.return_type(graph, env, node)?;
        Ok(self.default_value_for_type(point))
    }

    /// Operators are owned by the type of their left operand: string
    /// equality and boolean operators are distinct from numeric ones.
    fn compile_arithmetic(
        &mut self,
        env: &Env,
        node: NodeId,
        op: BinaryOp,
        left: Slot,
        right: Slot,
    ) -> LowerResult<Expr> {
        let lhs = self.compile_input(env, node, left)?;
        let rhs = self.compile_input(env, node, right)?;
        let left_node = self
            .graph
            .target(node, left)
            .ok_or_else(|| InternalError::new("arithmetic operand vanished"))?;
        let point = self.state.return_type(self.graph, env, left_node)?;
        let args = vec![lhs, rhs];

        let Some(token) = op.token() else {
            return Ok(Expr::call(Call::math("pow", args)));
        };
        let owner = match self.state.types.type_of(point) {
            Some(TypeTag::String) if op.is_equality() => Owner::String,
            Some(TypeTag::Boolean) => Owner::Boolean,
            _ => Owner::Number,
        };
        Ok(Expr::op(token, owner, args))
    }

    fn compile_std_call(&mut self, env: &Env, node: NodeId, func: &StdFunc) -> LowerResult<Call> {
        let mut args = Vec::with_capacity(func.args.len());
        for arg in &func.args {
            args.push(self.compile_argument(env, node, arg)?);
        }
        Ok(library_call(func, args))
    }

    /// A literal, a non-empty field read as an identifier, or the block in
    /// the input of that name.
    fn compile_argument(&mut self, env: &Env, node: NodeId, arg: &StdArg) -> LowerResult<Expr> {
        let (name, ty) = match arg {
            StdArg::Literal(Literal::Number(n)) => return Ok(Expr::number(*n)),
            StdArg::Literal(Literal::String(s)) => return Ok(Expr::string(s.clone())),
            StdArg::Slot { name, ty } => (name, ty),
        };
        let block = &self.graph[node];
        if let Some(value) = block.field(name).filter(|v| !v.is_empty()) {
            return Ok(Expr::local(value));
        }
        match block.slot(name) {
            Some(slot) => self.compile_input(env, node, slot),
            // Already reported by inference.
            None => {
                let point = self.state.types.ground(ty.as_deref());
                Ok(self.default_value_for_type(point))
            }
        }
    }

    /// An LED image literal: five rows of `#`/`.` cells, five columns per
    /// frame, read from the `LED<col><row>` fields.
    fn compile_image(
        &mut self,
        env: &Env,
        node: NodeId,
        frames: u32,
        func: &StdFunc,
    ) -> LowerResult<Call> {
        let block = &self.graph[node];
        let columns = frames * IMAGE_ROWS;
        let rows: Vec<String> = (0..IMAGE_ROWS)
            .map(|row| {
                (0..columns)
                    .map(|col| {
                        let lit = block
                            .field(&format!("LED{col}{row}"))
                            .is_some_and(|v| v.contains("TRUE"));
                        if lit {
                            "#"
                        } else {
                            "."
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        let mut args = vec![Expr::string(format!("\n{}", rows.join("\n")))];
        for arg in &func.args {
            args.push(self.compile_argument(env, node, arg)?);
        }
        Ok(library_call(
            &StdFunc {
                is_extension_method: false,
                ..func.clone()
            },
            args,
        ))
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn mark_read(&mut self, env: &Env, var: &str) -> LowerResult<()> {
        let id = self.state.expect_binding(env, var)?;
        let binding = self.state.binding_mut(id);
        if binding.usage == VarUsage::Unknown {
            binding.usage = VarUsage::Read;
        }
        Ok(())
    }

    /// The value of a point's type that an empty input stands for. An
    /// untyped point becomes a number.
    fn default_value_for_type(&mut self, point: Point) -> Expr {
        match self.state.types.default_to_number(point) {
            TypeTag::Boolean => Expr::boolean(false),
            TypeTag::Number => Expr::number(0.0),
            TypeTag::String => Expr::string(""),
            _ => Expr::local("null"),
        }
    }

    /// The value of a numeric literal field. Reports and yields 0 when the
    /// field has no digits or does not fit in 32 bits.
    fn extract_number(&mut self, node: NodeId, literal: &str) -> i32 {
        match parse_number_literal(literal) {
            Ok(n) => n,
            Err((code, message)) => {
                self.errors.report(code, message, &self.graph[node].id);
                0
            }
        }
    }
}

fn parse_number_literal(literal: &str) -> Result<i32, (ErrorCode, String)> {
    if !literal.bytes().any(|b| b.is_ascii_digit()) {
        return Err((
            ErrorCode::INVALID_NUMBER,
            format!("{literal} is not a valid numeric value"),
        ));
    }
    leading_int(literal).ok_or_else(|| {
        (
            ErrorCode::NUMBER_OUT_OF_RANGE,
            format!("{literal} is either too big or too small"),
        )
    })
}

/// Whether `stmts` is one flat `if` chain: all ifs, every one after the
/// first continuing the previous one.
fn is_if_chain(stmts: &[Stmt]) -> bool {
    !stmts.is_empty()
        && stmts.iter().enumerate().all(|(i, s)| match &s.kind {
            StmtKind::If(stmt) => i == 0 || stmt.is_else_if,
            _ => false,
        })
}

/// `e + 1`, folded when `e` is a literal.
fn plus_one(expr: Expr) -> Expr {
    match expr.kind {
        ExprKind::Number(n) => Expr {
            kind: ExprKind::Number(n + 1.0),
            block: expr.block,
        },
        _ => Expr::op("+", Owner::Number, vec![expr, Expr::number(1.0)]),
    }
}

fn assign(target: LocalRef, value: Expr) -> Stmt {
    Stmt::new(StmtKind::Assign { target, value })
}

/// `call(..., () => { body })`
fn callback_call(mut call: Call, body: Vec<Stmt>) -> Stmt {
    call.args.push(Expr::local(CALLBACK_REFERENCE));
    Stmt::new(StmtKind::CallWithCallback {
        call,
        action: InlineAction {
            reference: CALLBACK_REFERENCE.to_string(),
            body,
        },
    })
}

/// Method call on the first argument, namespaced call, or bare call.
fn library_call(func: &StdFunc, args: Vec<Expr>) -> Call {
    let (owner, style) = if func.is_extension_method {
        (Owner::Unknown, CallStyle::Method)
    } else if let Some(ns) = &func.namespace {
        (Owner::Namespace(ns.clone()), CallStyle::Free)
    } else {
        (Owner::Library, CallStyle::Free)
    };
    Call {
        name: func.name.clone(),
        owner,
        args,
        style,
        property: func.property,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_literal() {
        assert_eq!(parse_number_literal("12"), Ok(12));
        assert_eq!(parse_number_literal("-3"), Ok(-3));
        assert_eq!(parse_number_literal("2.5"), Ok(2));
        assert_eq!(
            parse_number_literal("abc"),
            Err((
                ErrorCode::INVALID_NUMBER,
                "abc is not a valid numeric value".to_string()
            ))
        );
        assert_eq!(
            parse_number_literal("4294967296"),
            Err((
                ErrorCode::NUMBER_OUT_OF_RANGE,
                "4294967296 is either too big or too small".to_string()
            ))
        );
    }

    #[test]
    fn test_if_chain_detection() {
        let if_stmt = |else_if| {
            Stmt::new(StmtKind::If(IfStmt {
                cond: Expr::boolean(true),
                then_body: Vec::new(),
                else_body: Vec::new(),
                is_else_if: else_if,
            }))
        };
        assert!(is_if_chain(&[if_stmt(false), if_stmt(true)]));
        assert!(!is_if_chain(&[if_stmt(false), if_stmt(false)]));
        assert!(!is_if_chain(&[]));
        let expr = Stmt::new(StmtKind::Expr(Expr::number(1.0)));
        assert!(!is_if_chain(&[if_stmt(false), expr]));
    }

    #[test]
    fn test_library_call_styles() {
        let func = StdFunc {
            name: "showNumber".into(),
            namespace: Some("basic".into()),
            args: Vec::new(),
            is_extension_method: false,
            image_literal: None,
            has_handler: false,
            property: false,
        };
        let call = library_call(&func, vec![Expr::number(1.0)]);
        assert_eq!(call.owner, Owner::Namespace("basic".into()));
        assert_eq!(call.style, CallStyle::Free);

        let bare = library_call(
            &StdFunc {
                namespace: None,
                ..func.clone()
            },
            Vec::new(),
        );
        assert_eq!(bare.owner, Owner::Library);

        let method = library_call(
            &StdFunc {
                is_extension_method: true,
                ..func
            },
            Vec::new(),
        );
        assert_eq!(method.style, CallStyle::Method);
    }
}
