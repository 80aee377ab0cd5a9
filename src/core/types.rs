//! HC-001: Shared value, kind, and expression types.
//!
//! Values flowing through scopes and resource parameters, the three kinds of
//! named constructs, and the expression tree evaluated for bodies and
//! parameter defaults. All serializable types derive Serialize/Deserialize for
//! YAML and JSON catalog output.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Values
// ============================================================================

/// A value bound to a variable or a resource parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Unset / undefined
    #[default]
    Undef,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    /// Shorthand for a string value.
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Self::Undef)
    }

    /// Coerce scalars to their string form; arrays are coerced element-wise.
    pub fn coerce(&self) -> Self {
        match self {
            Self::Undef => Self::Undef,
            Self::Array(items) => Self::Array(items.iter().map(Value::coerce).collect()),
            other => Self::Str(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undef => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{}", s),
            Self::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Convert a serde_yaml_ng::Value scalar or sequence into a `Value`.
pub fn value_from_yaml(val: &serde_yaml_ng::Value) -> Value {
    match val {
        serde_yaml_ng::Value::Null => Value::Undef,
        serde_yaml_ng::Value::Bool(b) => Value::Bool(*b),
        serde_yaml_ng::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Str(n.to_string()),
        },
        serde_yaml_ng::Value::String(s) => Value::Str(s.clone()),
        serde_yaml_ng::Value::Sequence(items) => {
            Value::Array(items.iter().map(value_from_yaml).collect())
        }
        other => Value::Str(format!("{:?}", other)),
    }
}

// ============================================================================
// Construct kinds
// ============================================================================

/// The kind of a named construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Hostclass,
    Node,
    Definition,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hostclass => write!(f, "class"),
            Self::Node => write!(f, "node"),
            Self::Definition => write!(f, "define"),
        }
    }
}

impl std::str::FromStr for TypeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "class" | "hostclass" => Ok(Self::Hostclass),
            "node" => Ok(Self::Node),
            "define" | "definition" => Ok(Self::Definition),
            other => Err(format!("unknown type kind '{}'", other)),
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// An unevaluated expression or statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Value),
    /// Variable reference: `x`, `a::b::x`, or `::x`
    Var(String),
    /// String interpolation — parts are stringified and joined
    Concat(Vec<Expr>),
    List(Vec<Expr>),
    /// Statements evaluated in order; yields the last value
    Block(Vec<Expr>),
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Include(Vec<String>),
    /// Resource-like class declaration with parameters
    ClassDecl {
        name: String,
        params: IndexMap<String, Expr>,
    },
    /// Defined-type instance or plain resource
    Declare {
        type_name: String,
        title: Box<Expr>,
        params: IndexMap<String, Expr>,
    },
}

impl Expr {
    pub fn literal(v: impl Into<Value>) -> Self {
        Self::Literal(v.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Self::Assign {
            name: name.into(),
            value: Box::new(value),
        }
    }

    pub fn include(names: &[&str]) -> Self {
        Self::Include(names.iter().map(|n| n.to_string()).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
