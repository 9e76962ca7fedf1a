//! Lookup table evaluation.

use qti_types::{
    Cardinality, InterpolationTable, LookupTable, MatchTable, SingleValue, Value,
    VariableDeclaration,
};

/// Map `source` through `table`, falling back to the declared default.
///
/// A Null source or an unmatched one yields the table's default value; when
/// the table has none, Integer and Float single outcomes get zero and
/// everything else gets Null.
pub fn lookup(declaration: &VariableDeclaration, table: &LookupTable, source: Option<f64>) -> Value {
    let target = source.and_then(|s| match table {
        LookupTable::Match(t) => match_target(t, s),
        LookupTable::Interpolation(t) => interpolation_target(t, s),
    });
    if let Some(value) = target.or(table.default_value()) {
        return Value::Single(value.clone());
    }
    if declaration.cardinality == Cardinality::Single {
        if let Some(zero) = declaration.base_type.and_then(SingleValue::zero) {
            return Value::Single(zero);
        }
    }
    Value::Null
}

/// First entry, in declaration order, whose source equals the input exactly.
pub fn match_target(table: &MatchTable, source: f64) -> Option<&SingleValue> {
    table
        .entries
        .iter()
        .find(|e| e.source_value as f64 == source)
        .map(|e| &e.target_value)
}

/// First entry, in declaration order, whose source is below the input
/// (or equal to it when the entry includes its boundary).
///
/// Entries are not re-sorted.
pub fn interpolation_target(table: &InterpolationTable, source: f64) -> Option<&SingleValue> {
    table
        .entries
        .iter()
        .find(|e| {
            if e.include_boundary {
                e.source_value <= source
            } else {
                e.source_value < source
            }
        })
        .map(|e| &e.target_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qti_types::{BaseType, Identifier};

    fn decl(base_type: BaseType) -> VariableDeclaration {
        VariableDeclaration::outcome(Identifier::new("GRADE").unwrap(), Cardinality::Single, base_type)
    }

    #[test]
    fn test_match_scans_in_order() {
        let table = MatchTable::default()
            .entry(1, SingleValue::Integer(10))
            .entry(1, SingleValue::Integer(20));
        assert_eq!(match_target(&table, 1.0), Some(&SingleValue::Integer(10)));
        assert_eq!(match_target(&table, 1.5), None);
    }

    #[test]
    fn test_interpolation_does_not_resort() {
        let table = InterpolationTable::default()
            .entry(0.0, true, SingleValue::Integer(1))
            .entry(10.0, true, SingleValue::Integer(2));
        assert_eq!(
            interpolation_target(&table, 20.0),
            Some(&SingleValue::Integer(1))
        );
    }

    #[test]
    fn test_zero_fallback_for_numeric_outcomes() {
        let table = LookupTable::Match(MatchTable::default().entry(1, SingleValue::Integer(5)));
        assert_eq!(lookup(&decl(BaseType::Integer), &table, Some(9.0)), Value::integer(0));
        let table = LookupTable::Match(MatchTable::default().entry(1, SingleValue::Float(5.0)));
        assert_eq!(lookup(&decl(BaseType::Float), &table, None), Value::float(0.0));
        let table = LookupTable::Match(
            MatchTable::default().entry(1, SingleValue::String("A".into())),
        );
        assert_eq!(lookup(&decl(BaseType::String), &table, Some(2.0)), Value::Null);
    }
}
