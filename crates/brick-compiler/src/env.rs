//! Variable environment and loop-compatibility analysis.
//!
//! Bindings are stored once in [`TypeState`]; an [`Env`] is a persistent
//! list of binding handles. Extending an environment shares the tail, and
//! older environments stay valid, so lowering can bind a hidden local for
//! one loop without it leaking into sibling statements. Mutating a binding
//! (its usage, its type) is visible through every environment that holds it.

use std::collections::HashMap;
use std::rc::Rc;

use brick_types::block::BlockKind;
use brick_types::{BlockGraph, InternalError, NodeId};
use tracing::trace;

use crate::ty::TypeTag;
use crate::unify::{Point, TypeTable};

// ══════════════════════════════════════════════════════════════════════════════
// Bindings
// ══════════════════════════════════════════════════════════════════════════════

/// How lowering first saw a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarUsage {
    Unknown,
    Read,
    /// First assigned at top level: that assignment declares it.
    Assign,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub point: Point,
    /// Number of counted loops using this variable as index.
    pub used_as_for_index: u32,
    pub usage: VarUsage,
    pub incompatible_with_for: bool,
}

impl Binding {
    /// Whether the variable only exists as the index of one native `for`.
    pub fn is_compiled_as_for_index(&self) -> bool {
        self.used_as_for_index > 0 && !self.incompatible_with_for
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(usize);

// ══════════════════════════════════════════════════════════════════════════════
// Env
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct EnvNode {
    binding: BindingId,
    next: Option<Rc<EnvNode>>,
}

/// A persistent list of bindings, innermost first.
#[derive(Debug, Clone, Default)]
pub struct Env {
    head: Option<Rc<EnvNode>>,
}

impl Env {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new environment with `binding` in front; `self` is untouched.
    pub fn extend(&self, binding: BindingId) -> Env {
        Env {
            head: Some(Rc::new(EnvNode {
                binding,
                next: self.head.clone(),
            })),
        }
    }

    /// Bindings from innermost to outermost.
    pub fn iter(&self) -> impl Iterator<Item = BindingId> + '_ {
        std::iter::successors(self.head.as_deref(), |n| n.next.as_deref()).map(|n| n.binding)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// TypeState
// ══════════════════════════════════════════════════════════════════════════════

/// Everything inference and lowering know about types: the unification
/// table, the binding arena and the points of placeholder blocks.
#[derive(Default)]
pub struct TypeState {
    pub types: TypeTable,
    bindings: Vec<Binding>,
    placeholders: HashMap<NodeId, Point>,
}

impl TypeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0]
    }

    pub fn binding_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.bindings[id.0]
    }

    /// Number of bindings ever created, hidden locals included.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Create a binding for `name` and return `env` extended with it.
    pub fn bind(&mut self, env: &Env, name: &str, point: Point) -> (Env, BindingId) {
        let id = BindingId(self.bindings.len());
        self.bindings.push(Binding {
            name: name.to_string(),
            point,
            used_as_for_index: 0,
            usage: VarUsage::Unknown,
            incompatible_with_for: false,
        });
        (env.extend(id), id)
    }

    pub fn lookup(&self, env: &Env, name: &str) -> Option<BindingId> {
        env.iter().find(|id| self.binding(*id).name == name)
    }

    /// Like [`lookup`](Self::lookup), for names the environment builder has
    /// already bound.
    pub fn expect_binding(&self, env: &Env, name: &str) -> Result<BindingId, InternalError> {
        self.lookup(env, name)
            .ok_or_else(|| InternalError::new(format!("variable '{name}' is not bound")))
    }

    /// `base`, or `base0`, `base1`, ... whichever is not bound in `env`.
    pub fn fresh_name(&self, env: &Env, base: &str) -> String {
        let mut name = base.to_string();
        let mut i = 0;
        while self.lookup(env, &name).is_some() {
            name = format!("{base}{i}");
            i += 1;
        }
        name
    }

    /// Remember the point standing for a placeholder block.
    pub fn register_placeholder(&mut self, node: NodeId) -> Point {
        let point = self.types.fresh();
        self.placeholders.insert(node, point);
        point
    }

    /// The type point of the value produced by `node`.
    pub fn return_type(
        &mut self,
        graph: &BlockGraph,
        env: &Env,
        node: NodeId,
    ) -> Result<Point, InternalError> {
        let block = &graph[node];
        match &block.kind {
            BlockKind::Placeholder => {
                let point = self.placeholders.get(&node).copied().ok_or_else(|| {
                    InternalError::new(format!("placeholder '{}' has no type point", block.id))
                })?;
                Ok(self.types.find(point))
            }
            BlockKind::VariableGet { var } => {
                let id = self.expect_binding(env, var)?;
                let point = self.binding(id).point;
                Ok(self.types.find(point))
            }
            _ => match block.output.as_deref() {
                None => Ok(self.types.unit()),
                Some(check) => Ok(self.types.ground(Some(check))),
            },
        }
    }

    /// Type of a binding, defaulting to number.
    pub fn binding_type(&mut self, id: BindingId) -> TypeTag {
        let point = self.binding(id).point;
        self.types.default_to_number(point)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Environment construction
// ══════════════════════════════════════════════════════════════════════════════

/// Bind every variable of the graph and decide which loop indices can be
/// compiled as native `for` indices.
///
/// 1. Every counted loop binds its index as a number. The index is
///    incompatible when the loop is not classic-shaped or when more than one
///    loop uses it.
/// 2. Every get/set/change binds its variable with an unknown type. A loop
///    index touched outside the body of a loop over it becomes incompatible.
pub fn build_env(graph: &BlockGraph, state: &mut TypeState) -> Env {
    let mut env = Env::empty();

    for node in graph.all_blocks() {
        let Some(var) = graph[node].loop_var() else {
            continue;
        };
        let id = match state.lookup(&env, var) {
            Some(id) => id,
            None => {
                let number = state.types.number();
                let (extended, id) = state.bind(&env, var, number);
                env = extended;
                id
            }
        };
        let classic = is_classic_for_loop(graph, node);
        let binding = state.binding_mut(id);
        binding.used_as_for_index += 1;
        if !classic || binding.used_as_for_index > 1 {
            trace!(var = %var, classic, "loop index is not compatible with a native loop");
            binding.incompatible_with_for = true;
        }
    }

    for node in graph.all_blocks() {
        let var = match &graph[node].kind {
            BlockKind::VariableGet { var }
            | BlockKind::VariableSet { var, .. }
            | BlockKind::VariableChange { var, .. } => var,
            _ => continue,
        };
        let id = match state.lookup(&env, var) {
            Some(id) => id,
            None => {
                let point = state.types.fresh();
                let (extended, id) = state.bind(&env, var, point);
                env = extended;
                id
            }
        };
        if state.binding(id).used_as_for_index > 0 && !is_scoped_by_loop(graph, node, var) {
            trace!(var = %var, "loop index used outside its loop");
            state.binding_mut(id).incompatible_with_for = true;
        }
    }

    env
}

/// `controls_simple_for`, or `controls_for` counting from literal 0 by
/// literal 1.
pub fn is_classic_for_loop(graph: &BlockGraph, node: NodeId) -> bool {
    let literal = |slot| {
        graph.target(node, slot).and_then(|n| match &graph[n].kind {
            BlockKind::Number { literal } => leading_int(literal),
            _ => None,
        })
    };
    match &graph[node].kind {
        BlockKind::SimpleFor { .. } => true,
        BlockKind::For { from, by, .. } => literal(*from) == Some(0) && literal(*by) == Some(1),
        _ => false,
    }
}

/// Whether `node` sits inside the body of a loop whose index is `var`.
fn is_scoped_by_loop(graph: &BlockGraph, node: NodeId, var: &str) -> bool {
    graph
        .scope_ancestors(node)
        .any(|n| graph[n].loop_var() == Some(var))
}

/// The leading integer of a numeric field, if it fits in 32 bits.
pub fn leading_int(text: &str) -> Option<i32> {
    let text = text.trim_start();
    let digits_start = usize::from(text.starts_with(['+', '-']));
    let digits_len = text[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    text[..digits_start + digits_len].parse().ok()
}
