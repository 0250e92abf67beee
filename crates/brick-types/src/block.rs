//! The block graph: the editor's workspace, ingested into a closed set of
//! block kinds with typed slot handles.
//!
//! Blocks live in an arena and refer to each other through [`NodeId`]s.
//! Every block has at most one parent: either the block whose input it is
//! plugged into, or the block it is chained below (`next`).
//!
//! The only mutation the compiler performs is attaching transient
//! placeholder blocks to empty inputs (see [`BlockGraph::attach_placeholder`]);
//! [`BlockGraph::remove_placeholders`] restores the graph as ingested.

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// The editor's stable id for a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arena index of a block inside a [`BlockGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to one named input of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(u16);

impl Slot {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Serialized workspace
// ══════════════════════════════════════════════════════════════════════════════

/// The workspace as serialized by the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawWorkspace {
    #[serde(default)]
    pub blocks: Vec<RawBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub fields: HashMap<String, String>,
    #[serde(default)]
    pub inputs: Vec<RawInput>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    /// Declared output type; `None` for statement blocks.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInput {
    pub name: String,
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub block: Option<String>,
}

/// Canvas position, only used to order top-level chains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

/// The serialized workspace does not describe a well-formed block graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("malformed workspace JSON: {0}")]
    Json(String),

    #[error("duplicate block id '{0}'")]
    DuplicateBlock(String),

    #[error("block '{block}' references unknown block '{reference}'")]
    UnknownBlock { block: String, reference: String },

    #[error("block '{0}' is connected to more than one parent")]
    MultipleParents(String),

    #[error("block '{0}' is part of a cycle")]
    Cycle(String),

    #[error("block '{block}' has no input named '{input}'")]
    MissingInput { block: String, input: String },

    #[error("block '{block}' uses unknown operator '{op}'")]
    UnknownOperator { block: String, op: String },
}

// ══════════════════════════════════════════════════════════════════════════════
// Block kinds
// ══════════════════════════════════════════════════════════════════════════════

/// Operator of an arithmetic, comparison or boolean-connective block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Minus,
    Multiply,
    Divide,
    Power,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    And,
    Or,
}

impl BinaryOp {
    /// Parse the `OP` field value of an operator block.
    pub fn from_field(op: &str) -> Option<Self> {
        Some(match op {
            "ADD" => Self::Add,
            "MINUS" => Self::Minus,
            "MULTIPLY" => Self::Multiply,
            "DIVIDE" => Self::Divide,
            "POWER" => Self::Power,
            "LT" => Self::Lt,
            "LTE" => Self::Lte,
            "GT" => Self::Gt,
            "GTE" => Self::Gte,
            "EQ" => Self::Eq,
            "NEQ" => Self::Neq,
            "AND" => Self::And,
            "OR" => Self::Or,
            _ => return None,
        })
    }

    /// Target-language operator token. `Power` has none.
    pub fn token(self) -> Option<&'static str> {
        Some(match self {
            Self::Add => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Power => return None,
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::And => "&&",
            Self::Or => "||",
        })
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Neq)
    }

    pub fn is_connective(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// Whether the operator produces a boolean.
    pub fn yields_boolean(self) -> bool {
        !matches!(
            self,
            Self::Add | Self::Minus | Self::Multiply | Self::Divide | Self::Power
        )
    }
}

/// One `IF<n>` / `DO<n>` pair of an if block.
#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub cond: Slot,
    pub body: Slot,
}

/// The closed set of block kinds the compiler understands.
///
/// Variable names are stored already escaped to target identifiers.
/// Anything not built in is a [`BlockKind::Call`], resolved against the
/// standard-call table by the block's `type_name`.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Number { literal: String },
    Text { value: String },
    Boolean { value: bool },
    Binary { op: BinaryOp, left: Slot, right: Slot },
    MathOp2 { function: String, x: Slot, y: Slot },
    MathAbs { x: Slot },
    Random { limit: Slot },
    Not { operand: Slot },
    ListCreate { items: Vec<Slot> },
    VariableGet { var: String },
    VariableSet { var: String, value: Slot },
    VariableChange { var: String, delta: Slot },
    If { clauses: Vec<IfClause>, otherwise: Option<Slot> },
    For { var: String, from: Slot, to: Slot, by: Slot, body: Slot },
    SimpleFor { var: String, to: Slot, body: Slot },
    Repeat { times: Slot, body: Slot },
    While { cond: Slot, body: Slot },
    Forever { body: Slot },
    Call,
    /// Synthetic stand-in for an empty input, only alive during compilation.
    Placeholder,
}

// ══════════════════════════════════════════════════════════════════════════════
// Blocks
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub name: String,
    /// Declared type of the socket, if any.
    pub check: Option<String>,
    pub target: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Input(NodeId),
    Next(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    /// The editor's kind tag, e.g. `variables_set`.
    pub type_name: String,
    pub kind: BlockKind,
    pub fields: HashMap<String, String>,
    pub inputs: Vec<Input>,
    pub next: Option<NodeId>,
    pub disabled: bool,
    pub output: Option<String>,
    parent: Option<Parent>,
}

impl Block {
    /// Value of a named field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Look up an input by name.
    pub fn slot(&self, name: &str) -> Option<Slot> {
        self.inputs
            .iter()
            .position(|i| i.name == name)
            .map(|i| Slot(i as u16))
    }

    pub fn input(&self, slot: Slot) -> &Input {
        &self.inputs[slot.index()]
    }

    /// The block plugged into `slot`, if any.
    pub fn target(&self, slot: Slot) -> Option<NodeId> {
        self.inputs[slot.index()].target
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, BlockKind::Placeholder)
    }

    /// The index variable if this is a counted loop.
    pub fn loop_var(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::For { var, .. } | BlockKind::SimpleFor { var, .. } => Some(var),
            _ => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// BlockGraph
// ══════════════════════════════════════════════════════════════════════════════

/// The whole workspace.
#[derive(Debug, Clone)]
pub struct BlockGraph {
    blocks: Vec<Block>,
    by_id: HashMap<BlockId, NodeId>,
    top: Vec<NodeId>,
    /// Number of ingested blocks; placeholders are appended after them.
    base_len: usize,
}

impl BlockGraph {
    /// Parse and ingest a serialized workspace.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let raw: RawWorkspace =
            serde_json::from_str(json).map_err(|e| GraphError::Json(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Ingest a serialized workspace.
    pub fn from_raw(raw: RawWorkspace) -> Result<Self, GraphError> {
        // 1. Assign arena indices
        let mut by_id = HashMap::with_capacity(raw.blocks.len());
        for (i, b) in raw.blocks.iter().enumerate() {
            if by_id.insert(BlockId::new(&b.id), NodeId(i as u32)).is_some() {
                return Err(GraphError::DuplicateBlock(b.id.clone()));
            }
        }

        let resolve = |owner: &str, reference: &str| {
            by_id
                .get(&BlockId::new(reference))
                .copied()
                .ok_or_else(|| GraphError::UnknownBlock {
                    block: owner.to_string(),
                    reference: reference.to_string(),
                })
        };

        // 2. Convert blocks
        let mut blocks = Vec::with_capacity(raw.blocks.len());
        for b in &raw.blocks {
            let inputs = b
                .inputs
                .iter()
                .map(|i| {
                    Ok(Input {
                        name: i.name.clone(),
                        check: i.check.clone(),
                        target: i.block.as_deref().map(|r| resolve(&b.id, r)).transpose()?,
                    })
                })
                .collect::<Result<Vec<_>, GraphError>>()?;
            let next = b.next.as_deref().map(|r| resolve(&b.id, r)).transpose()?;
            let kind = parse_kind(b, &inputs)?;
            let output = b.output.clone().or_else(|| default_output(&kind));
            blocks.push(Block {
                id: BlockId::new(&b.id),
                type_name: b.kind.clone(),
                kind,
                fields: b.fields.clone(),
                inputs,
                next,
                disabled: b.disabled,
                output,
                parent: None,
            });
        }

        // 3. Parent links
        for i in 0..blocks.len() {
            let this = NodeId(i as u32);
            let children: Vec<(NodeId, Parent)> = blocks[i]
                .inputs
                .iter()
                .filter_map(|input| input.target)
                .map(|t| (t, Parent::Input(this)))
                .chain(blocks[i].next.map(|n| (n, Parent::Next(this))))
                .collect();
            for (child, link) in children {
                let child = &mut blocks[child.index()];
                if child.parent.is_some() {
                    return Err(GraphError::MultipleParents(child.id.0.clone()));
                }
                child.parent = Some(link);
            }
        }

        // 4. Top-level chains
        let mut top: Vec<NodeId> = (0..blocks.len())
            .filter(|&i| blocks[i].parent.is_none())
            .map(|i| NodeId(i as u32))
            .collect();
        let positions: Option<Vec<Position>> =
            top.iter().map(|n| raw.blocks[n.index()].position).collect();
        if let Some(positions) = positions {
            let mut keyed: Vec<(Position, NodeId)> = positions.into_iter().zip(top).collect();
            keyed.sort_by(|(a, _), (b, _)| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
            top = keyed.into_iter().map(|(_, n)| n).collect();
        }

        let graph = Self {
            base_len: blocks.len(),
            blocks,
            by_id,
            top,
        };
        graph.check_reachable()?;
        Ok(graph)
    }

    /// Every block must hang off a top-level chain; the rest sit on a cycle.
    fn check_reachable(&self) -> Result<(), GraphError> {
        let mut seen = vec![false; self.blocks.len()];
        let mut stack: Vec<NodeId> = self.top.clone();
        while let Some(n) = stack.pop() {
            if std::mem::replace(&mut seen[n.index()], true) {
                continue;
            }
            let b = &self.blocks[n.index()];
            stack.extend(b.inputs.iter().filter_map(|i| i.target));
            stack.extend(b.next);
        }
        match seen.iter().position(|s| !s) {
            Some(i) => Err(GraphError::Cycle(self.blocks[i].id.0.clone())),
            None => Ok(()),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn block(&self, node: NodeId) -> &Block {
        &self.blocks[node.index()]
    }

    /// Number of blocks, placeholders included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All ingested blocks, in document order. Placeholders are excluded.
    pub fn all_blocks(&self) -> impl Iterator<Item = NodeId> {
        (0..self.base_len).map(|i| NodeId(i as u32))
    }

    /// Heads of the top-level chains, in canvas order.
    pub fn top_blocks(&self) -> &[NodeId] {
        &self.top
    }

    pub fn lookup(&self, id: &BlockId) -> Option<NodeId> {
        self.by_id.get(id).copied()
    }

    /// The block plugged into `slot` of `node`.
    pub fn target(&self, node: NodeId, slot: Slot) -> Option<NodeId> {
        self.block(node).target(slot)
    }

    /// The statement chain starting at `head`.
    pub fn chain(&self, head: Option<NodeId>) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(head, move |n| self.block(*n).next)
    }

    /// The block whose input (lexically) contains `node`.
    ///
    /// Walks `next` links up to the head of the statement chain, then takes
    /// the block holding that head in one of its inputs.
    pub fn scope_parent(&self, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        loop {
            match self.block(current).parent? {
                Parent::Input(p) => return Some(p),
                Parent::Next(prev) => current = prev,
            }
        }
    }

    /// Lexically enclosing blocks, innermost first.
    pub fn scope_ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.scope_parent(node), move |n| self.scope_parent(*n))
    }

    // ── Placeholders ─────────────────────────────────────────────────────

    /// Plug a placeholder into `slot` of `node` if the slot is empty.
    ///
    /// Returns the placeholder's node, or `None` if the slot was occupied.
    pub fn attach_placeholder(&mut self, node: NodeId, slot: Slot) -> Option<NodeId> {
        if self.target(node, slot).is_some() {
            return None;
        }
        let placeholder = NodeId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id: BlockId::new(format!("{}#{}", self.blocks[node.index()].id, slot.index())),
            type_name: "placeholder".to_string(),
            kind: BlockKind::Placeholder,
            fields: HashMap::new(),
            inputs: Vec::new(),
            next: None,
            disabled: false,
            output: None,
            parent: Some(Parent::Input(node)),
        });
        self.blocks[node.index()].inputs[slot.index()].target = Some(placeholder);
        Some(placeholder)
    }

    /// Detach and drop every placeholder.
    pub fn remove_placeholders(&mut self) {
        let base_len = self.base_len;
        self.blocks.truncate(base_len);
        for block in &mut self.blocks {
            for input in &mut block.inputs {
                if input.target.is_some_and(|t| t.index() >= base_len) {
                    input.target = None;
                }
            }
        }
    }

    /// Number of placeholders currently attached.
    pub fn placeholder_count(&self) -> usize {
        self.blocks.len() - self.base_len
    }
}

impl Index<NodeId> for BlockGraph {
    type Output = Block;

    fn index(&self, node: NodeId) -> &Block {
        self.block(node)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Ingestion helpers
// ══════════════════════════════════════════════════════════════════════════════

fn parse_kind(raw: &RawBlock, inputs: &[Input]) -> Result<BlockKind, GraphError> {
    let slot = |name: &str| {
        inputs
            .iter()
            .position(|i| i.name == name)
            .map(|i| Slot(i as u16))
            .ok_or_else(|| GraphError::MissingInput {
                block: raw.id.clone(),
                input: name.to_string(),
            })
    };
    let has_input = |name: &str| inputs.iter().any(|i| i.name == name);
    let field = |name: &str| raw.fields.get(name).cloned().unwrap_or_default();
    let var = || escape_var_name(&field("VAR"));

    let kind = match raw.kind.as_str() {
        k if k.starts_with("math_number") => BlockKind::Number {
            literal: field("NUM"),
        },
        "text" => BlockKind::Text {
            value: field("TEXT"),
        },
        "logic_boolean" => BlockKind::Boolean {
            value: field("BOOL") == "TRUE",
        },
        "math_arithmetic" | "logic_compare" | "logic_operation" => {
            let op_name = field("OP");
            let op = BinaryOp::from_field(&op_name).ok_or_else(|| GraphError::UnknownOperator {
                block: raw.id.clone(),
                op: op_name.clone(),
            })?;
            BlockKind::Binary {
                op,
                left: slot("A")?,
                right: slot("B")?,
            }
        }
        "math_op2" => BlockKind::MathOp2 {
            function: field("op"),
            x: slot("x")?,
            y: slot("y")?,
        },
        "math_op3" => BlockKind::MathAbs { x: slot("x")? },
        "device_random" => BlockKind::Random {
            limit: slot("limit")?,
        },
        "logic_negate" => BlockKind::Not {
            operand: slot("BOOL")?,
        },
        "lists_create_with" => BlockKind::ListCreate {
            items: (0..inputs.len()).map(|i| Slot(i as u16)).collect(),
        },
        "variables_get" => BlockKind::VariableGet { var: var() },
        "variables_set" => BlockKind::VariableSet {
            var: var(),
            value: slot("VALUE")?,
        },
        "variables_change" => BlockKind::VariableChange {
            var: var(),
            delta: slot("VALUE")?,
        },
        "controls_if" => {
            let mut clauses = vec![IfClause {
                cond: slot("IF0")?,
                body: slot("DO0")?,
            }];
            let mut n = 1;
            while has_input(&format!("IF{n}")) {
                clauses.push(IfClause {
                    cond: slot(&format!("IF{n}"))?,
                    body: slot(&format!("DO{n}"))?,
                });
                n += 1;
            }
            let otherwise = if has_input("ELSE") {
                Some(slot("ELSE")?)
            } else {
                None
            };
            BlockKind::If { clauses, otherwise }
        }
        "controls_for" => BlockKind::For {
            var: var(),
            from: slot("FROM")?,
            to: slot("TO")?,
            by: slot("BY")?,
            body: slot("DO")?,
        },
        "controls_simple_for" => BlockKind::SimpleFor {
            var: var(),
            to: slot("TO")?,
            body: slot("DO")?,
        },
        "controls_repeat_ext" => BlockKind::Repeat {
            times: slot("TIMES")?,
            body: slot("DO")?,
        },
        "device_while" => BlockKind::While {
            cond: slot("COND")?,
            body: slot("DO")?,
        },
        "device_forever" => BlockKind::Forever {
            body: slot("HANDLER")?,
        },
        _ => BlockKind::Call,
    };
    Ok(kind)
}

/// Output type of built-in expression blocks whose JSON omits it.
fn default_output(kind: &BlockKind) -> Option<String> {
    let ty = match kind {
        BlockKind::Number { .. }
        | BlockKind::MathOp2 { .. }
        | BlockKind::MathAbs { .. }
        | BlockKind::Random { .. } => "Number",
        BlockKind::Text { .. } => "String",
        BlockKind::Boolean { .. } | BlockKind::Not { .. } => "Boolean",
        BlockKind::Binary { op, .. } if op.yields_boolean() => "Boolean",
        BlockKind::Binary { .. } => "Number",
        BlockKind::ListCreate { .. } => "Array",
        _ => return None,
    };
    Some(ty.to_string())
}

/// Convert a user-facing variable name into a target-language identifier.
///
/// `"my score"` becomes `myScore`, `"Hits"` becomes `hits`.
pub fn escape_var_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let chunks = name
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
        .filter(|c| !c.is_empty());
    for (i, chunk) in chunks.enumerate() {
        let mut chars = chunk.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.push(first.to_ascii_lowercase());
            } else {
                out.push(first.to_ascii_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() {
        return "_".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
