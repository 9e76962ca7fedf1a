//! Typed runtime values: `Cardinality × BaseType`.
//!
//! Null is a first-class value. Empty containers are normalised to Null,
//! and every non-null container is homogeneous in its base type.

use crate::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ══════════════════════════════════════════════════════════════════════════════
// BaseType & Cardinality
// ══════════════════════════════════════════════════════════════════════════════

/// Primitive kind of a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseType {
    Boolean,
    Integer,
    Float,
    String,
    Identifier,
    Duration,
    Uri,
    IntOrIdentifier,
    Pair,
    DirectedPair,
    File,
}

impl BaseType {
    /// Integer or Float.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Identifier => "identifier",
            Self::Duration => "duration",
            Self::Uri => "uri",
            Self::IntOrIdentifier => "intOrIdentifier",
            Self::Pair => "pair",
            Self::DirectedPair => "directedPair",
            Self::File => "file",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multiple,
    Ordered,
    Record,
}

impl Cardinality {
    pub fn is_single(self) -> bool {
        self == Self::Single
    }

    /// Multiple or Ordered.
    pub fn is_list(self) -> bool {
        matches!(self, Self::Multiple | Self::Ordered)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
            Self::Ordered => "ordered",
            Self::Record => "record",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

/// A value did not have the shape or base type an operation required.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },
    #[error("container mixes base types {first} and {other}")]
    Heterogeneous { first: BaseType, other: BaseType },
    #[error("operator '{operator}' does not accept {found}")]
    Operand {
        operator: &'static str,
        found: String,
    },
}

// ══════════════════════════════════════════════════════════════════════════════
// Single values
// ══════════════════════════════════════════════════════════════════════════════

/// Integer or identifier, for the `intOrIdentifier` base type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum IntOrIdentifier {
    Int(i64),
    Identifier(Identifier),
}

/// Descriptor of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileValue {
    pub mime_type: String,
    pub file_name: String,
    pub size: u64,
}

/// A scalar value tagged with its base type.
#[derive(Debug, Clone, Serialize)]
pub enum SingleValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(Identifier),
    /// Seconds.
    Duration(f64),
    Uri(String),
    IntOrIdentifier(IntOrIdentifier),
    /// Unordered pair: `(a, b) == (b, a)`.
    Pair(Identifier, Identifier),
    DirectedPair(Identifier, Identifier),
    File(FileValue),
}

impl SingleValue {
    pub fn base_type(&self) -> BaseType {
        match self {
            Self::Boolean(_) => BaseType::Boolean,
            Self::Integer(_) => BaseType::Integer,
            Self::Float(_) => BaseType::Float,
            Self::String(_) => BaseType::String,
            Self::Identifier(_) => BaseType::Identifier,
            Self::Duration(_) => BaseType::Duration,
            Self::Uri(_) => BaseType::Uri,
            Self::IntOrIdentifier(_) => BaseType::IntOrIdentifier,
            Self::Pair(..) => BaseType::Pair,
            Self::DirectedPair(..) => BaseType::DirectedPair,
            Self::File(_) => BaseType::File,
        }
    }

    /// Numeric view of Integer, Float and Duration values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) | Self::Duration(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Zero value for numeric base types, used by lookup tables without a
    /// default.
    pub fn zero(base_type: BaseType) -> Option<Self> {
        match base_type {
            BaseType::Integer => Some(Self::Integer(0)),
            BaseType::Float => Some(Self::Float(0.0)),
            _ => None,
        }
    }
}

impl PartialEq for SingleValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Identifier(a), Self::Identifier(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Uri(a), Self::Uri(b)) => a == b,
            (Self::IntOrIdentifier(a), Self::IntOrIdentifier(b)) => a == b,
            (Self::Pair(a1, a2), Self::Pair(b1, b2)) => {
                (a1 == b1 && a2 == b2) || (a1 == b2 && a2 == b1)
            }
            (Self::DirectedPair(a1, a2), Self::DirectedPair(b1, b2)) => a1 == b1 && a2 == b2,
            (Self::File(a), Self::File(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for SingleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) | Self::Uri(s) => write!(f, "{s}"),
            Self::Identifier(id) => write!(f, "{id}"),
            Self::Duration(d) => write!(f, "{d}s"),
            Self::IntOrIdentifier(IntOrIdentifier::Int(i)) => write!(f, "{i}"),
            Self::IntOrIdentifier(IntOrIdentifier::Identifier(id)) => write!(f, "{id}"),
            Self::Pair(a, b) | Self::DirectedPair(a, b) => write!(f, "{a} {b}"),
            Self::File(file) => write!(f, "{} ({})", file.file_name, file.mime_type),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Containers
// ══════════════════════════════════════════════════════════════════════════════

fn check_homogeneous(values: &[SingleValue]) -> Result<BaseType, TypeError> {
    let first = values[0].base_type();
    for v in &values[1..] {
        let other = v.base_type();
        if other != first {
            return Err(TypeError::Heterogeneous { first, other });
        }
    }
    Ok(first)
}

/// Unordered bag of same-typed values. Never empty.
#[derive(Debug, Clone, Serialize)]
pub struct MultipleValue {
    base_type: BaseType,
    values: Vec<SingleValue>,
}

impl MultipleValue {
    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    pub fn values(&self) -> &[SingleValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SingleValue> {
        self.values
    }
}

impl PartialEq for MultipleValue {
    /// Bag equality: same elements with the same multiplicities.
    fn eq(&self, other: &Self) -> bool {
        if self.base_type != other.base_type || self.values.len() != other.values.len() {
            return false;
        }
        let mut used = vec![false; other.values.len()];
        'outer: for v in &self.values {
            for (i, w) in other.values.iter().enumerate() {
                if !used[i] && v == w {
                    used[i] = true;
                    continue 'outer;
                }
            }
            return false;
        }
        true
    }
}

/// Sequence of same-typed values. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderedValue {
    base_type: BaseType,
    values: Vec<SingleValue>,
}

impl OrderedValue {
    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    pub fn values(&self) -> &[SingleValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SingleValue> {
        self.values
    }
}

/// Named fields; each field may carry its own base type.
pub type RecordValue = BTreeMap<Identifier, SingleValue>;

// ══════════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════════

/// A runtime value of any cardinality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Single(SingleValue),
    Multiple(MultipleValue),
    Ordered(OrderedValue),
    Record(RecordValue),
}

impl Value {
    pub fn boolean(b: bool) -> Self {
        Self::Single(SingleValue::Boolean(b))
    }

    pub fn integer(i: i64) -> Self {
        Self::Single(SingleValue::Integer(i))
    }

    pub fn float(f: f64) -> Self {
        Self::Single(SingleValue::Float(f))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::Single(SingleValue::String(s.into()))
    }

    pub fn identifier(id: Identifier) -> Self {
        Self::Single(SingleValue::Identifier(id))
    }

    pub fn duration(seconds: f64) -> Self {
        Self::Single(SingleValue::Duration(seconds))
    }

    /// Build a multiple container. Empty input yields Null.
    pub fn multiple(values: Vec<SingleValue>) -> Result<Self, TypeError> {
        if values.is_empty() {
            return Ok(Self::Null);
        }
        let base_type = check_homogeneous(&values)?;
        Ok(Self::Multiple(MultipleValue { base_type, values }))
    }

    /// Build an ordered container. Empty input yields Null.
    pub fn ordered(values: Vec<SingleValue>) -> Result<Self, TypeError> {
        if values.is_empty() {
            return Ok(Self::Null);
        }
        let base_type = check_homogeneous(&values)?;
        Ok(Self::Ordered(OrderedValue { base_type, values }))
    }

    pub fn record(fields: RecordValue) -> Self {
        if fields.is_empty() {
            Self::Null
        } else {
            Self::Record(fields)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Cardinality of a non-null value.
    pub fn cardinality(&self) -> Option<Cardinality> {
        match self {
            Self::Null => None,
            Self::Single(_) => Some(Cardinality::Single),
            Self::Multiple(_) => Some(Cardinality::Multiple),
            Self::Ordered(_) => Some(Cardinality::Ordered),
            Self::Record(_) => Some(Cardinality::Record),
        }
    }

    /// Base type of a non-null, non-record value.
    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            Self::Single(v) => Some(v.base_type()),
            Self::Multiple(m) => Some(m.base_type),
            Self::Ordered(o) => Some(o.base_type),
            Self::Null | Self::Record(_) => None,
        }
    }

    pub fn as_single(&self) -> Option<&SingleValue> {
        match self {
            Self::Single(v) => Some(v),
            _ => None,
        }
    }

    /// Elements of a Multiple or Ordered container.
    pub fn list_values(&self) -> Option<&[SingleValue]> {
        match self {
            Self::Multiple(m) => Some(&m.values),
            Self::Ordered(o) => Some(&o.values),
            _ => None,
        }
    }

    /// Human-readable shape, e.g. `single integer`, `multiple identifier`.
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Record(_) => "record".to_string(),
            other => match (other.cardinality(), other.base_type()) {
                (Some(c), Some(b)) => format!("{c} {b}"),
                _ => "unknown".to_string(),
            },
        }
    }

    /// Convert this value to the declared shape.
    ///
    /// Identical shapes pass through unchanged. Allowed conversions:
    /// Integer → Float widening, Integer/Identifier → IntOrIdentifier, and
    /// wrapping a Single into a one-element Multiple/Ordered. Null coerces to
    /// Null. Anything else is a [`TypeError`]; nothing is truncated.
    pub fn coerce(
        &self,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> Result<Value, TypeError> {
        let mismatch = || TypeError::Mismatch {
            expected: match base_type {
                Some(bt) => format!("{cardinality} {bt}"),
                None => cardinality.to_string(),
            },
            found: self.describe(),
        };

        match (self, cardinality) {
            (Self::Null, _) => Ok(Self::Null),
            (Self::Record(_), Cardinality::Record) => Ok(self.clone()),
            (Self::Record(_), _) | (_, Cardinality::Record) => Err(mismatch()),
            (Self::Single(v), Cardinality::Single) => {
                let target = base_type.ok_or_else(mismatch)?;
                coerce_single(v, target)
                    .map(Self::Single)
                    .ok_or_else(mismatch)
            }
            (Self::Single(v), Cardinality::Multiple | Cardinality::Ordered) => {
                let target = base_type.ok_or_else(mismatch)?;
                let single = coerce_single(v, target).ok_or_else(mismatch)?;
                if cardinality == Cardinality::Multiple {
                    Self::multiple(vec![single])
                } else {
                    Self::ordered(vec![single])
                }
            }
            (Self::Multiple(m), Cardinality::Multiple) => {
                let target = base_type.ok_or_else(mismatch)?;
                let values = coerce_all(&m.values, target).ok_or_else(mismatch)?;
                Self::multiple(values)
            }
            (Self::Ordered(o), Cardinality::Ordered) => {
                let target = base_type.ok_or_else(mismatch)?;
                let values = coerce_all(&o.values, target).ok_or_else(mismatch)?;
                Self::ordered(values)
            }
            _ => Err(mismatch()),
        }
    }
}

fn coerce_single(value: &SingleValue, target: BaseType) -> Option<SingleValue> {
    if value.base_type() == target {
        return Some(value.clone());
    }
    match (value, target) {
        (SingleValue::Integer(i), BaseType::Float) => Some(SingleValue::Float(*i as f64)),
        (SingleValue::Integer(i), BaseType::IntOrIdentifier) => {
            Some(SingleValue::IntOrIdentifier(IntOrIdentifier::Int(*i)))
        }
        (SingleValue::Identifier(id), BaseType::IntOrIdentifier) => Some(
            SingleValue::IntOrIdentifier(IntOrIdentifier::Identifier(id.clone())),
        ),
        _ => None,
    }
}

fn coerce_all(values: &[SingleValue], target: BaseType) -> Option<Vec<SingleValue>> {
    values.iter().map(|v| coerce_single(v, target)).collect()
}

impl From<SingleValue> for Value {
    fn from(value: SingleValue) -> Self {
        Self::Single(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Single(v) => write!(f, "{v}"),
            Self::Multiple(m) => {
                let parts: Vec<String> = m.values.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Ordered(o) => {
                let parts: Vec<String> = o.values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Record(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "record({})", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn test_empty_containers_are_null() {
        assert_eq!(Value::multiple(vec![]).unwrap(), Value::Null);
        assert_eq!(Value::ordered(vec![]).unwrap(), Value::Null);
        assert_eq!(Value::record(RecordValue::new()), Value::Null);
    }

    #[test]
    fn test_containers_must_be_homogeneous() {
        let err = Value::multiple(vec![SingleValue::Integer(1), SingleValue::Float(2.0)])
            .unwrap_err();
        assert_eq!(
            err,
            TypeError::Heterogeneous {
                first: BaseType::Integer,
                other: BaseType::Float
            }
        );
    }

    #[test]
    fn test_multiple_equality_ignores_order() {
        let a = Value::multiple(vec![SingleValue::Integer(1), SingleValue::Integer(2)]).unwrap();
        let b = Value::multiple(vec![SingleValue::Integer(2), SingleValue::Integer(1)]).unwrap();
        assert_eq!(a, b);
        let c = Value::ordered(vec![SingleValue::Integer(1), SingleValue::Integer(2)]).unwrap();
        let d = Value::ordered(vec![SingleValue::Integer(2), SingleValue::Integer(1)]).unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn test_pair_is_unordered_directed_pair_is_not() {
        assert_eq!(
            SingleValue::Pair(id("A"), id("B")),
            SingleValue::Pair(id("B"), id("A"))
        );
        assert_ne!(
            SingleValue::DirectedPair(id("A"), id("B")),
            SingleValue::DirectedPair(id("B"), id("A"))
        );
    }

    #[test]
    fn test_coerce_identity_and_widening() {
        let v = Value::integer(3);
        assert_eq!(
            v.coerce(Cardinality::Single, Some(BaseType::Integer)).unwrap(),
            v
        );
        assert_eq!(
            v.coerce(Cardinality::Single, Some(BaseType::Float)).unwrap(),
            Value::float(3.0)
        );
    }

    #[test]
    fn test_coerce_never_truncates() {
        let err = Value::float(2.5)
            .coerce(Cardinality::Single, Some(BaseType::Integer))
            .unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_coerce_wraps_single_into_container() {
        let wrapped = Value::identifier(id("A"))
            .coerce(Cardinality::Multiple, Some(BaseType::Identifier))
            .unwrap();
        assert_eq!(wrapped.cardinality(), Some(Cardinality::Multiple));
        assert_eq!(wrapped.list_values().unwrap().len(), 1);
    }

    #[test]
    fn test_coerce_rejects_container_into_single() {
        let m = Value::multiple(vec![SingleValue::Integer(1)]).unwrap();
        let err = m
            .coerce(Cardinality::Single, Some(BaseType::Integer))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected single integer, found multiple integer"
        );
    }

    #[test]
    fn test_coerce_null_passes() {
        assert_eq!(
            Value::Null
                .coerce(Cardinality::Ordered, Some(BaseType::String))
                .unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_coerce_int_or_identifier() {
        let v = Value::identifier(id("X"))
            .coerce(Cardinality::Single, Some(BaseType::IntOrIdentifier))
            .unwrap();
        assert_eq!(v.base_type(), Some(BaseType::IntOrIdentifier));
    }

    #[test]
    fn test_describe() {
        assert_eq!(Value::Null.describe(), "NULL");
        assert_eq!(Value::integer(1).describe(), "single integer");
        let mut fields = RecordValue::new();
        fields.insert(id("a"), SingleValue::Integer(1));
        assert_eq!(Value::record(fields).describe(), "record");
    }
}
