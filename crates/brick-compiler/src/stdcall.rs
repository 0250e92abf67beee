//! Standard-call table: block kind → library function.
//!
//! Built once from the [`ApiCatalog`] and read-only afterwards.

use std::collections::HashMap;

use brick_types::catalog::{ApiCatalog, FunctionDescriptor, Literal, CALLBACK_TYPE};
use tracing::warn;

/// Where one argument of a library call comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum StdArg {
    /// A field value or, when the field is empty, the block in an input.
    Slot { name: String, ty: Option<String> },
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StdFunc {
    pub name: String,
    pub namespace: Option<String>,
    pub args: Vec<StdArg>,
    /// Called as a method on the first argument.
    pub is_extension_method: bool,
    /// Frame count of an LED image block.
    pub image_literal: Option<u32>,
    /// Takes a trailing callback whose body sits in the `HANDLER` input.
    pub has_handler: bool,
    pub property: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StdCallTable {
    funcs: HashMap<String, StdFunc>,
}

impl StdCallTable {
    pub fn from_catalog(catalog: &ApiCatalog) -> Self {
        let mut funcs = HashMap::with_capacity(catalog.functions.len());
        for desc in &catalog.functions {
            if funcs.contains_key(&desc.block_id) {
                warn!(block_kind = %desc.block_id, "function already defined, keeping the first");
                continue;
            }
            funcs.insert(desc.block_id.clone(), std_func(desc));
        }
        Self { funcs }
    }

    pub fn get(&self, block_kind: &str) -> Option<&StdFunc> {
        self.funcs.get(block_kind)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

fn std_func(desc: &FunctionDescriptor) -> StdFunc {
    let params = desc.parameters.as_deref().unwrap_or_default();
    let mut args: Vec<StdArg> = params
        .iter()
        .filter(|p| p.ty.as_deref() != Some(CALLBACK_TYPE))
        .filter_map(|p| match (&p.literal, &p.slot) {
            (Some(lit), _) => Some(StdArg::Literal(lit.clone())),
            (None, Some(slot)) => Some(StdArg::Slot {
                name: slot.clone(),
                ty: p.ty.clone(),
            }),
            (None, None) => None,
        })
        .collect();
    if desc.instance {
        if let Some(this) = &desc.this_slot {
            args.insert(
                0,
                StdArg::Slot {
                    name: this.clone(),
                    ty: None,
                },
            );
        }
    }
    StdFunc {
        name: desc.name.clone(),
        namespace: desc.namespace.clone(),
        args,
        is_extension_method: desc.instance,
        image_literal: desc.image_literal,
        has_handler: desc.has_handler(),
        property: desc.is_property(),
    }
}
