//! The API catalog: library functions that blocks may call.
//!
//! The catalog is produced by the host from its library declarations. Each
//! entry is keyed by the block kind that invokes it.

use serde::{Deserialize, Serialize};

/// Type name of the trailing callback parameter of handler-style functions.
pub const CALLBACK_TYPE: &str = "() => void";

/// Input that holds the body of a handler-style block.
pub const HANDLER_INPUT: &str = "HANDLER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCatalog {
    #[serde(default)]
    pub functions: Vec<FunctionDescriptor>,
}

impl ApiCatalog {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Block kind that calls this function.
    pub block_id: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
    /// `None` for a property read (`ns.name` without an argument list).
    #[serde(default)]
    pub parameters: Option<Vec<ParamDescriptor>>,
    /// Called as a method on the value in `this_slot`.
    #[serde(default)]
    pub instance: bool,
    #[serde(default)]
    pub this_slot: Option<String>,
    /// Frame count of an LED image literal block.
    #[serde(default)]
    pub image_literal: Option<u32>,
}

impl FunctionDescriptor {
    pub fn is_property(&self) -> bool {
        self.parameters.is_none()
    }

    /// Whether the last parameter is a callback body.
    pub fn has_handler(&self) -> bool {
        self.parameters
            .iter()
            .flatten()
            .any(|p| p.ty.as_deref() == Some(CALLBACK_TYPE))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    /// Input or field the argument is read from.
    #[serde(default)]
    pub slot: Option<String>,
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    /// Fixed argument value; takes precedence over `slot`.
    #[serde(default)]
    pub literal: Option<Literal>,
}

/// A constant argument baked into the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Number(f64),
    String(String),
}
