//! Type inference over the block graph.
//!
//! Every block contributes constraints between the types of the blocks in
//! its inputs and the types it expects there. Empty inputs that take part
//! in a constraint receive a placeholder block carrying a fresh point, so
//! lowering finds every such input filled.
//!
//! A failed constraint is reported against its block and ends that block's
//! rules; the rest of the graph is still inferred. Variables left without a
//! type afterwards become numbers.

use brick_types::block::{BinaryOp, BlockKind, IfClause};
use brick_types::{BlockGraph, CompileErrors, ErrorCode, InternalError, NodeId, Slot};
use tracing::debug;

use crate::env::{Env, TypeState};
use crate::stdcall::{StdArg, StdCallTable};
use crate::unify::Point;

/// A diagnostic that ends the rules of the current block.
struct BlockError {
    code: ErrorCode,
    message: String,
}

impl BlockError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

enum Failure {
    Block(BlockError),
    Internal(InternalError),
}

impl From<InternalError> for Failure {
    fn from(e: InternalError) -> Self {
        Failure::Internal(e)
    }
}

impl From<BlockError> for Failure {
    fn from(e: BlockError) -> Self {
        Failure::Block(e)
    }
}

type RuleResult = Result<(), Failure>;

pub struct Inference<'a> {
    graph: &'a mut BlockGraph,
    env: &'a Env,
    calls: &'a StdCallTable,
    state: &'a mut TypeState,
    errors: &'a mut CompileErrors,
}

impl<'a> Inference<'a> {
    pub fn new(
        graph: &'a mut BlockGraph,
        env: &'a Env,
        calls: &'a StdCallTable,
        state: &'a mut TypeState,
        errors: &'a mut CompileErrors,
    ) -> Self {
        Self {
            graph,
            env,
            calls,
            state,
            errors,
        }
    }

    /// Infer every block, then default untyped variables to number.
    pub fn run(mut self) -> Result<(), InternalError> {
        let nodes: Vec<NodeId> = self.graph.all_blocks().collect();
        for node in nodes {
            match self.infer_block(node) {
                Ok(()) => {}
                Err(Failure::Block(e)) => {
                    let id = self.graph[node].id.clone();
                    self.errors.report(e.code, e.message, &id);
                }
                Err(Failure::Internal(e)) => return Err(e),
            }
        }

        let env = self.env;
        for id in env.iter() {
            self.state.binding_type(id);
        }
        debug!(
            placeholders = self.graph.placeholder_count(),
            diagnostics = self.errors.total_errors,
            "type inference finished"
        );
        Ok(())
    }

    fn infer_block(&mut self, node: NodeId) -> RuleResult {
        let kind = self.graph[node].kind.clone();
        let number = self.state.types.number();
        let boolean = self.state.types.boolean();
        match kind {
            BlockKind::MathOp2 { x, y, .. } => self.union_params(node, &[(x, number), (y, number)]),
            BlockKind::MathAbs { x } => self.union_params(node, &[(x, number)]),
            BlockKind::Random { limit } => self.union_params(node, &[(limit, number)]),
            BlockKind::Binary { op, left, right } => {
                if op.is_equality() {
                    self.infer_equality(node, left, right)
                } else if op.is_connective() {
                    self.union_params(node, &[(left, boolean), (right, boolean)])
                } else {
                    self.union_params(node, &[(left, number), (right, number)])
                }
            }
            BlockKind::Not { operand } => self.union_params(node, &[(operand, boolean)]),
            BlockKind::If { clauses, .. } => {
                let conds: Vec<(Slot, Point)> = clauses
                    .iter()
                    .map(|IfClause { cond, .. }| (*cond, boolean))
                    .collect();
                self.union_params(node, &conds)
            }
            BlockKind::For { from, to, by, .. } => {
                self.union_params(node, &[(from, number), (to, number), (by, number)])
            }
            BlockKind::SimpleFor { to, .. } => self.union_params(node, &[(to, number)]),
            BlockKind::Repeat { times, .. } => self.union_params(node, &[(times, number)]),
            BlockKind::While { cond, .. } => self.union_params(node, &[(cond, boolean)]),
            BlockKind::VariableSet { var, value } | BlockKind::VariableChange { var, delta: value } => {
                self.infer_assignment(node, &var, value)
            }
            BlockKind::Call => self.infer_std_call(node),
            _ => Ok(()),
        }
    }

    /// Fill `slot` with a placeholder if it is empty.
    fn attach_placeholder(&mut self, node: NodeId, slot: Slot) {
        if let Some(placeholder) = self.graph.attach_placeholder(node, slot) {
            self.state.register_placeholder(placeholder);
        }
    }

    fn slot_type(&mut self, node: NodeId, slot: Slot) -> Result<Point, InternalError> {
        let target = self.graph.target(node, slot).ok_or_else(|| {
            InternalError::new(format!(
                "input {} of block '{}' is empty after placeholder insertion",
                self.graph[node].input(slot).name,
                self.graph[node].id
            ))
        })?;
        self.state.return_type(self.graph, self.env, target)
    }

    /// Unify the type of each input with the expected point, in order.
    ///
    /// All inputs get their placeholder before the first unification so that
    /// a failure leaves no input empty.
    fn union_params(&mut self, node: NodeId, params: &[(Slot, Point)]) -> RuleResult {
        for (slot, _) in params {
            self.attach_placeholder(node, *slot);
        }
        for (slot, expected) in params {
            let actual = self.slot_type(node, *slot)?;
            self.state.types.union(actual, *expected).map_err(|err| {
                BlockError::new(
                    ErrorCode::PARAMETER_TYPE_MISMATCH,
                    format!(
                        "The parameter {} of this block is of the wrong type. More precisely: {err}",
                        self.graph[node].input(*slot).name
                    ),
                )
            })?;
        }
        Ok(())
    }

    fn infer_equality(&mut self, node: NodeId, left: Slot, right: Slot) -> RuleResult {
        self.attach_placeholder(node, left);
        self.attach_placeholder(node, right);
        let l = self.slot_type(node, left)?;
        let r = self.slot_type(node, right)?;
        self.state.types.union(l, r).map_err(|_| {
            BlockError::new(
                ErrorCode::COMPARISON_TYPE_MISMATCH,
                "Comparing objects of different types",
            )
        })?;
        match self.state.types.type_of(l) {
            Some(tag) if !tag.is_comparable() => Err(BlockError::new(
                ErrorCode::UNCOMPARABLE_TYPE,
                "I can only compare strings, booleans and numbers",
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn infer_assignment(&mut self, node: NodeId, var: &str, value: Slot) -> RuleResult {
        let id = self.state.expect_binding(self.env, var)?;
        let point = self.state.binding(id).point;
        self.attach_placeholder(node, value);
        let rhs = self.slot_type(node, value)?;
        self.state.types.union(point, rhs).map_err(|_| {
            BlockError::new(
                ErrorCode::ASSIGNMENT_TYPE_MISMATCH,
                format!("Assigning a value of the wrong type to variable {var}"),
            )
        })?;
        Ok(())
    }

    /// Library calls: every argument read from an input (rather than a
    /// field) must match the declared parameter type.
    fn infer_std_call(&mut self, node: NodeId) -> RuleResult {
        let calls = self.calls;
        let Some(func) = calls.get(&self.graph[node].type_name) else {
            return Ok(());
        };
        let mut params = Vec::new();
        let mut missing = None;
        for arg in &func.args {
            let StdArg::Slot { name, ty } = arg else {
                continue;
            };
            let block = &self.graph[node];
            if block.field(name).is_some_and(|v| !v.is_empty()) {
                continue;
            }
            match block.slot(name) {
                Some(slot) => {
                    let declared = ty.as_deref().or(block.input(slot).check.as_deref());
                    params.push((slot, declared.map(str::to_string)));
                }
                None if missing.is_none() => missing = Some(name.clone()),
                None => {}
            }
        }

        for (slot, _) in &params {
            self.attach_placeholder(node, *slot);
        }
        if let Some(name) = missing {
            return Err(BlockError::new(
                ErrorCode::MISSING_ARGUMENT,
                format!("The argument {name} of this block is missing"),
            )
            .into());
        }
        let mut typed = Vec::with_capacity(params.len());
        for (slot, declared) in params {
            match declared {
                Some(ty) => typed.push((slot, self.state.types.ground(Some(&ty)))),
                None => {
                    return Err(BlockError::new(
                        ErrorCode::UNTYPED_PARAMETER,
                        format!(
                            "The parameter {} of this block has no declared type",
                            self.graph[node].input(slot).name
                        ),
                    )
                    .into())
                }
            }
        }
        self.union_params(node, &typed)
    }
}

/// Run inference over `graph`.
pub fn infer(
    graph: &mut BlockGraph,
    env: &Env,
    calls: &StdCallTable,
    state: &mut TypeState,
    errors: &mut CompileErrors,
) -> Result<(), InternalError> {
    Inference::new(graph, env, calls, state, errors).run()
}
