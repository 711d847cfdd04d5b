//! Literal resolution for call arguments.
//!
//! Only constants, lists/tuples of constants, string-keyed dicts of constants,
//! and negated numbers resolve. Everything else is [`Literal::Dynamic`].

use rustpython_parser::ast::{self, Constant, Expr, UnaryOp};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Serialized form of [`Literal::Dynamic`].
pub const DYNAMIC_MARKER: &str = "<dynamic>";

/// A statically known argument value, or the dynamic marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Dict(BTreeMap<String, Literal>),
    Dynamic,
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::None => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Str(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Dynamic => serializer.serialize_str(DYNAMIC_MARKER),
        }
    }
}

/// Resolves an expression to a literal without evaluating anything.
pub fn resolve(expr: &Expr) -> Literal {
    match expr {
        Expr::Constant(ast::ExprConstant { value, .. }) => from_constant(value),
        Expr::List(ast::ExprList { elts, .. }) | Expr::Tuple(ast::ExprTuple { elts, .. }) => {
            Literal::List(elts.iter().map(resolve).collect())
        }
        Expr::Dict(ast::ExprDict { keys, values, .. }) => {
            let mut entries = BTreeMap::new();
            for (key, value) in keys.iter().zip(values) {
                // `**spread` entries have no key
                let Some(key) = key else { continue };
                if let Literal::Str(key) = resolve(key) {
                    entries.insert(key, resolve(value));
                }
            }
            Literal::Dict(entries)
        }
        Expr::UnaryOp(ast::ExprUnaryOp {
            op: UnaryOp::USub,
            operand,
            ..
        }) => match resolve(operand) {
            Literal::Int(i) => i.checked_neg().map_or(Literal::Dynamic, Literal::Int),
            Literal::Float(f) => Literal::Float(-f),
            _ => Literal::Dynamic,
        },
        _ => Literal::Dynamic,
    }
}

fn from_constant(constant: &Constant) -> Literal {
    match constant {
        Constant::None => Literal::None,
        Constant::Bool(b) => Literal::Bool(*b),
        Constant::Str(s) => Literal::Str(s.clone()),
        Constant::Int(big) => {
            let digits = big.to_string();
            match digits.parse::<i64>() {
                Ok(i) => Literal::Int(i),
                Err(_) => digits
                    .parse::<f64>()
                    .map_or(Literal::Dynamic, Literal::Float),
            }
        }
        Constant::Float(f) => Literal::Float(*f),
        Constant::Tuple(items) => Literal::List(items.iter().map(from_constant).collect()),
        // bytes, complex, ellipsis
        _ => Literal::Dynamic,
    }
}
