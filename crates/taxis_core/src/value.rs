use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Primitive cell value. Numbers are carried as `f64` end to end; whether a
/// number is integral is decided where it matters (type inference, row
/// validation) rather than at the envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Null => ScalarKind::Null,
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Num(_) => ScalarKind::Num,
            Scalar::Str(_) => ScalarKind::Str,
        }
    }

    /// Lossless check that a float carries an integer.
    pub fn is_integral(&self) -> bool {
        matches!(self, Scalar::Num(n) if *n == n.trunc())
    }

    /// Rendering used when a cell lands in a text column.
    pub fn render(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Num(n) => {
                if *n == n.trunc() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Scalar::Str(s) => s.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalarKind {
    Null,
    Bool,
    Num,
    Str,
}

/// A (columns, rows) value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableValue {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl TableValue {
    pub fn is_well_formed(&self) -> bool {
        self.rows.iter().all(|row| row.len() == self.columns.len())
    }
}

/// Opaque attribute payload. These are the four shapes the storage inferrer
/// recognizes; nothing else in the workspace pattern-matches on this enum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Table(TableValue),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
    Scalar(Scalar),
}

impl AttributeValue {
    pub fn str(value: impl Into<String>) -> Self {
        AttributeValue::Scalar(Scalar::Str(value.into()))
    }

    pub fn num(value: f64) -> Self {
        AttributeValue::Scalar(Scalar::Num(value))
    }

    pub fn bool(value: bool) -> Self {
        AttributeValue::Scalar(Scalar::Bool(value))
    }
}
