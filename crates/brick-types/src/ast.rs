//! Intermediate AST produced by lowering the block graph.
//!
//! The tree is a small structured-program language: one top-level
//! [`Procedure`] holding statements over literals, locals and calls.
//! Operators are calls whose name is an infix token (`"+"`, `"=="`, `"!"`);
//! the emitter decides how to lay them out.
//!
//! Every node may carry the [`BlockId`] it was produced from so the emitter
//! can record source-map intervals.

use crate::BlockId;

/// Name of the implicit reference that stands for a call's trailing callback.
pub const CALLBACK_REFERENCE: &str = "_body_";

// ══════════════════════════════════════════════════════════════════════════════
// Procedure
// ══════════════════════════════════════════════════════════════════════════════

/// The compiled program: a single procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub body: Vec<Stmt>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub block: Option<BlockId>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, block: None }
    }

    /// Attribute the statement to `block` unless it already has an owner.
    pub fn or_block(mut self, block: &BlockId) -> Self {
        if self.block.is_none() {
            self.block = Some(block.clone());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `expr;`
    Expr(Expr),
    /// `let name = value;`, always a declaration.
    Define { local: LocalDef, value: Expr },
    /// `name = value;`, a declaration if `name` is not yet declared in scope.
    Assign { target: LocalRef, value: Expr },
    If(IfStmt),
    While { cond: Expr, body: Vec<Stmt> },
    /// `for (let index = 0; index < bound; index++)`
    For { index: String, bound: Expr, body: Vec<Stmt> },
    /// A call whose last argument is [`CALLBACK_REFERENCE`], rendered as an
    /// inline `() => { ... }` closure.
    CallWithCallback { call: Call, action: InlineAction },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
    /// Rendered as `else if` after the preceding `if` of a flat chain.
    pub is_else_if: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineAction {
    pub reference: String,
    pub body: Vec<Stmt>,
}

/// A local declaration with its type name.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDef {
    pub name: String,
    pub ty: String,
}

/// A reference to a local; `ty` is only used when the reference declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRef {
    pub name: String,
    pub ty: Option<String>,
}

impl LocalRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub block: Option<BlockId>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, block: None }
    }

    pub fn number(n: f64) -> Self {
        Self::new(ExprKind::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(ExprKind::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(ExprKind::Bool(b))
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Local(LocalRef::new(name)))
    }

    /// An infix (or, with one argument, prefix) operator call.
    pub fn op(token: &str, owner: Owner, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call(Call {
            name: token.to_string(),
            owner,
            args,
            style: CallStyle::Free,
            property: false,
        }))
    }

    pub fn call(call: Call) -> Self {
        Self::new(ExprKind::Call(call))
    }

    pub fn with_block(mut self, block: &BlockId) -> Self {
        self.block = Some(block.clone());
        self
    }

    pub fn is_number(&self, n: f64) -> bool {
        matches!(self.kind, ExprKind::Number(v) if v == n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    String(String),
    Bool(bool),
    Array(Vec<Expr>),
    Local(LocalRef),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub owner: Owner,
    pub args: Vec<Expr>,
    pub style: CallStyle,
    /// Rendered without an argument list.
    pub property: bool,
}

impl Call {
    /// `namespace.name(args)`
    pub fn namespaced(namespace: &str, name: &str, args: Vec<Expr>) -> Self {
        Self {
            name: name.to_string(),
            owner: Owner::Namespace(namespace.to_string()),
            args,
            style: CallStyle::Free,
            property: false,
        }
    }

    /// `Math.name(args)`
    pub fn math(name: &str, args: Vec<Expr>) -> Self {
        Self {
            name: name.to_string(),
            owner: Owner::Math,
            args,
            style: CallStyle::Free,
            property: false,
        }
    }
}

/// Logical owner of a call's callee.
///
/// Operators are owned by the type they operate on, so string equality and
/// numeric equality are distinct calls even though both render as `==`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Number,
    Boolean,
    String,
    Unknown,
    Math,
    Namespace(String),
    /// A top-level function of the library, called by bare name.
    Library,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    /// `owner.name(args)`
    Free,
    /// `args[0].name(args[1..])`
    Method,
}
