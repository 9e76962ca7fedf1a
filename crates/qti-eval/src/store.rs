//! Variable stores and the bridge from test scope into item scopes.

use crate::error::{EvalError, EvalResult};
use qti_types::{
    AssessmentItem, AssessmentTest, BaseType, Cardinality, Identifier, ItemSubset, Value,
    VariableDeclaration, VariableKind, VariableRef,
};
use std::collections::BTreeMap;

/// Built-in item response variable counting submitted attempts.
pub const NUM_ATTEMPTS: &str = "numAttempts";
/// Built-in item outcome tracking completion.
pub const COMPLETION_STATUS: &str = "completionStatus";
/// Built-in duration variable (seconds).
pub const DURATION: &str = "duration";

pub const STATUS_NOT_ATTEMPTED: &str = "not_attempted";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone)]
struct Binding {
    declaration: VariableDeclaration,
    value: Value,
}

/// Declared variables of one scope and their current values.
///
/// Item stores and the test store are separate; dotted references reach
/// item stores through an [`ItemResolver`].
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    bindings: BTreeMap<Identifier, Binding>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the initial value of each declaration.
    pub fn from_declarations<'a>(
        declarations: impl IntoIterator<Item = &'a VariableDeclaration>,
    ) -> Self {
        let mut store = Self::new();
        for declaration in declarations {
            store.define(declaration.clone());
        }
        store
    }

    /// Item store: built-ins followed by the item's declarations.
    pub fn for_item(item: &AssessmentItem) -> Self {
        let mut store = Self::new();
        store.define(
            VariableDeclaration::response(
                Identifier::from_static(NUM_ATTEMPTS),
                Cardinality::Single,
                BaseType::Integer,
            )
            .with_default(Value::integer(0)),
        );
        store.define(
            VariableDeclaration::outcome(
                Identifier::from_static(COMPLETION_STATUS),
                Cardinality::Single,
                BaseType::Identifier,
            )
            .with_default(Value::identifier(Identifier::from_static(
                STATUS_NOT_ATTEMPTED,
            ))),
        );
        for declaration in &item.declarations {
            store.define(declaration.clone());
        }
        store
    }

    /// Test store: the built-in duration plus the test's outcomes.
    pub fn for_test(test: &AssessmentTest) -> Self {
        let mut store = Self::new();
        store.define(
            VariableDeclaration::response(
                Identifier::from_static(DURATION),
                Cardinality::Single,
                BaseType::Duration,
            )
            .with_default(Value::duration(0.0)),
        );
        for declaration in &test.outcome_declarations {
            store.define(declaration.clone());
        }
        store
    }

    /// Declare a variable (replacing any previous one) at its initial value.
    pub fn define(&mut self, declaration: VariableDeclaration) {
        let value = declaration.initial_value();
        self.bindings.insert(
            declaration.identifier.clone(),
            Binding { declaration, value },
        );
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&Value> {
        self.bindings.get(identifier).map(|b| &b.value)
    }

    pub fn declaration(&self, identifier: &Identifier) -> Option<&VariableDeclaration> {
        self.bindings.get(identifier).map(|b| &b.declaration)
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.bindings.contains_key(identifier)
    }

    /// Overwrite a declared variable without checking its shape.
    /// Returns `false` if the variable is not declared.
    pub fn set(&mut self, identifier: &Identifier, value: Value) -> bool {
        match self.bindings.get_mut(identifier) {
            Some(binding) => {
                binding.value = value;
                true
            }
            None => false,
        }
    }

    /// Coerce `value` to the declared shape and store it.
    pub fn assign(&mut self, identifier: &Identifier, value: Value) -> EvalResult<()> {
        let binding = self
            .bindings
            .get_mut(identifier)
            .ok_or_else(|| EvalError::UndeclaredVariable(VariableRef::Local(identifier.clone())))?;
        let coerced = value
            .coerce(
                binding.declaration.cardinality,
                binding.declaration.base_type,
            )
            .map_err(|source| EvalError::Assignment {
                identifier: identifier.clone(),
                source,
            })?;
        binding.value = coerced;
        Ok(())
    }

    /// Reset every outcome variable to its initial value.
    pub fn reset_outcomes(&mut self) {
        for binding in self.bindings.values_mut() {
            if binding.declaration.kind == VariableKind::Outcome {
                binding.value = binding.declaration.initial_value();
            }
        }
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.bindings.keys()
    }

    /// Current values, keyed by identifier.
    pub fn snapshot(&self) -> BTreeMap<Identifier, Value> {
        self.bindings
            .iter()
            .map(|(k, b)| (k.clone(), b.value.clone()))
            .collect()
    }
}

/// Access from test scope into the item refs of a running test.
pub trait ItemResolver {
    /// Store of an item ref, or `None` if the item ref is unknown.
    fn item_store(&self, item_ref: &Identifier) -> Option<&VariableStore>;

    /// Item refs matching `subset`, in document order.
    fn select_items(&self, subset: &ItemSubset) -> Vec<Identifier>;

    /// Weight declared on an item ref; `None` when not declared.
    fn item_weight(&self, item_ref: &Identifier, weight: &Identifier) -> Option<f64>;

    fn is_presented(&self, item_ref: &Identifier) -> bool;

    fn is_responded(&self, item_ref: &Identifier) -> bool;
}

/// Resolver for tests evaluated without any item state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoItems;

impl ItemResolver for NoItems {
    fn item_store(&self, _item_ref: &Identifier) -> Option<&VariableStore> {
        None
    }

    fn select_items(&self, _subset: &ItemSubset) -> Vec<Identifier> {
        Vec::new()
    }

    fn item_weight(&self, _item_ref: &Identifier, _weight: &Identifier) -> Option<f64> {
        None
    }

    fn is_presented(&self, _item_ref: &Identifier) -> bool {
        false
    }

    fn is_responded(&self, _item_ref: &Identifier) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn test_item_store_has_builtins() {
        let item = AssessmentItem::new(id("ITEM")).with_declaration(VariableDeclaration::outcome(
            id("SCORE"),
            Cardinality::Single,
            BaseType::Float,
        ));
        let store = VariableStore::for_item(&item);
        assert_eq!(store.get(&id(NUM_ATTEMPTS)), Some(&Value::integer(0)));
        assert_eq!(
            store.get(&id(COMPLETION_STATUS)),
            Some(&Value::identifier(id(STATUS_NOT_ATTEMPTED)))
        );
        assert_eq!(store.get(&id("SCORE")), Some(&Value::float(0.0)));
    }

    #[test]
    fn test_assign_coerces_and_rejects() {
        let decl = VariableDeclaration::outcome(id("SCORE"), Cardinality::Single, BaseType::Float);
        let mut store = VariableStore::from_declarations([&decl]);
        store.assign(&id("SCORE"), Value::integer(2)).unwrap();
        assert_eq!(store.get(&id("SCORE")), Some(&Value::float(2.0)));
        let err = store.assign(&id("SCORE"), Value::string("x")).unwrap_err();
        assert!(matches!(err, EvalError::Assignment { .. }));
        let err = store.assign(&id("MISSING"), Value::Null).unwrap_err();
        assert!(matches!(err, EvalError::UndeclaredVariable(_)));
    }

    #[test]
    fn test_reset_outcomes_leaves_responses() {
        let outcome = VariableDeclaration::outcome(id("SCORE"), Cardinality::Single, BaseType::Integer);
        let response =
            VariableDeclaration::response(id("RESPONSE"), Cardinality::Single, BaseType::Integer);
        let mut store = VariableStore::from_declarations([&outcome, &response]);
        store.set(&id("SCORE"), Value::integer(5));
        store.set(&id("RESPONSE"), Value::integer(7));
        store.reset_outcomes();
        assert_eq!(store.get(&id("SCORE")), Some(&Value::integer(0)));
        assert_eq!(store.get(&id("RESPONSE")), Some(&Value::integer(7)));
    }

    #[test]
    fn test_set_undeclared_returns_false() {
        let mut store = VariableStore::new();
        assert!(!store.set(&id("X"), Value::integer(1)));
    }
}
