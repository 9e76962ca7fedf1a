//! Variable declarations and lookup tables.

use crate::{BaseType, Cardinality, Identifier, SingleValue, Value};

/// Which processing scope writes a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Response,
    Outcome,
    Template,
}

impl VariableKind {
    pub fn element_name(self) -> &'static str {
        match self {
            Self::Response => "responseDeclaration",
            Self::Outcome => "outcomeDeclaration",
            Self::Template => "templateDeclaration",
        }
    }
}

/// A declared variable: identifier, shape, optional default and, for
/// outcomes, an optional lookup table.
///
/// Record variables carry no base type.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub identifier: Identifier,
    pub kind: VariableKind,
    pub cardinality: Cardinality,
    pub base_type: Option<BaseType>,
    pub default_value: Option<Value>,
    pub lookup_table: Option<LookupTable>,
}

impl VariableDeclaration {
    pub fn new(
        identifier: Identifier,
        kind: VariableKind,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> Self {
        Self {
            identifier,
            kind,
            cardinality,
            base_type,
            default_value: None,
            lookup_table: None,
        }
    }

    pub fn outcome(identifier: Identifier, cardinality: Cardinality, base_type: BaseType) -> Self {
        Self::new(identifier, VariableKind::Outcome, cardinality, Some(base_type))
    }

    pub fn response(identifier: Identifier, cardinality: Cardinality, base_type: BaseType) -> Self {
        Self::new(identifier, VariableKind::Response, cardinality, Some(base_type))
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_lookup_table(mut self, table: LookupTable) -> Self {
        self.lookup_table = Some(table);
        self
    }

    /// Value a fresh store holds for this variable.
    ///
    /// Numeric single outcomes without a default start at zero; everything
    /// else starts at the declared default or Null.
    pub fn initial_value(&self) -> Value {
        if let Some(value) = &self.default_value {
            return value.clone();
        }
        if self.kind == VariableKind::Outcome && self.cardinality == Cardinality::Single {
            if let Some(zero) = self.base_type.and_then(SingleValue::zero) {
                return Value::Single(zero);
            }
        }
        Value::Null
    }
}

/// A declarative numeric-to-value mapping attached to an outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupTable {
    Match(MatchTable),
    Interpolation(InterpolationTable),
}

impl LookupTable {
    pub fn default_value(&self) -> Option<&SingleValue> {
        match self {
            Self::Match(t) => t.default_value.as_ref(),
            Self::Interpolation(t) => t.default_value.as_ref(),
        }
    }

    /// Target values in declaration order.
    pub fn targets(&self) -> Vec<&SingleValue> {
        match self {
            Self::Match(t) => t.entries.iter().map(|e| &e.target_value).collect(),
            Self::Interpolation(t) => t.entries.iter().map(|e| &e.target_value).collect(),
        }
    }

    pub fn element_name(&self) -> &'static str {
        match self {
            Self::Match(_) => "matchTable",
            Self::Interpolation(_) => "interpolationTable",
        }
    }
}

/// Exact integer lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchTable {
    pub default_value: Option<SingleValue>,
    pub entries: Vec<MatchTableEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchTableEntry {
    pub source_value: i64,
    pub target_value: SingleValue,
}

impl MatchTable {
    pub fn new(entries: Vec<MatchTableEntry>) -> Self {
        Self {
            default_value: None,
            entries,
        }
    }

    pub fn with_default(mut self, value: SingleValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn entry(mut self, source_value: i64, target_value: SingleValue) -> Self {
        self.entries.push(MatchTableEntry {
            source_value,
            target_value,
        });
        self
    }
}

/// Threshold lookup, entries expected in descending source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolationTable {
    pub default_value: Option<SingleValue>,
    pub entries: Vec<InterpolationTableEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationTableEntry {
    pub source_value: f64,
    pub include_boundary: bool,
    pub target_value: SingleValue,
}

impl InterpolationTable {
    pub fn new(entries: Vec<InterpolationTableEntry>) -> Self {
        Self {
            default_value: None,
            entries,
        }
    }

    pub fn with_default(mut self, value: SingleValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn entry(
        mut self,
        source_value: f64,
        include_boundary: bool,
        target_value: SingleValue,
    ) -> Self {
        self.entries.push(InterpolationTableEntry {
            source_value,
            include_boundary,
            target_value,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn test_initial_value_prefers_default() {
        let decl = VariableDeclaration::outcome(id("SCORE"), Cardinality::Single, BaseType::Float)
            .with_default(Value::float(1.5));
        assert_eq!(decl.initial_value(), Value::float(1.5));
    }

    #[test]
    fn test_initial_value_numeric_outcome_is_zero() {
        let decl =
            VariableDeclaration::outcome(id("SCORE"), Cardinality::Single, BaseType::Integer);
        assert_eq!(decl.initial_value(), Value::integer(0));
        let resp =
            VariableDeclaration::response(id("RESPONSE"), Cardinality::Single, BaseType::Integer);
        assert_eq!(resp.initial_value(), Value::Null);
    }

    #[test]
    fn test_initial_value_container_is_null() {
        let decl =
            VariableDeclaration::outcome(id("TAGS"), Cardinality::Multiple, BaseType::Identifier);
        assert_eq!(decl.initial_value(), Value::Null);
    }

    #[test]
    fn test_lookup_table_accessors() {
        let table = LookupTable::Match(
            MatchTable::default()
                .entry(1, SingleValue::String("A".into()))
                .entry(2, SingleValue::String("B".into()))
                .with_default(SingleValue::String("Z".into())),
        );
        assert_eq!(table.targets().len(), 2);
        assert_eq!(
            table.default_value(),
            Some(&SingleValue::String("Z".into()))
        );
        assert_eq!(table.element_name(), "matchTable");
    }
}
