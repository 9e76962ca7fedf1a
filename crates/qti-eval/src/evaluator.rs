//! Expression evaluator.

use crate::error::{EvalError, EvalResult};
use crate::ops;
use crate::store::{ItemResolver, VariableStore};
use qti_types::{BaseType, Expression, Identifier, ItemSubset, SingleValue, Value, VariableRef};

/// Default number of evaluation steps allowed per processing run.
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Walks expression trees against one variable store.
///
/// Item-scope evaluators have no [`ItemResolver`] and reject dotted
/// references; test-scope evaluators route them through the resolver.
pub struct Evaluator<'a> {
    pub(crate) store: &'a mut VariableStore,
    items: Option<&'a dyn ItemResolver>,
    gas: u64,
    gas_limit: u64,
}

impl<'a> Evaluator<'a> {
    /// Evaluator for item response processing.
    pub fn for_item(store: &'a mut VariableStore, gas_limit: u64) -> Self {
        Self {
            store,
            items: None,
            gas: 0,
            gas_limit,
        }
    }

    /// Evaluator for test outcome processing and navigation conditions.
    pub fn for_test(
        store: &'a mut VariableStore,
        items: &'a dyn ItemResolver,
        gas_limit: u64,
    ) -> Self {
        Self {
            store,
            items: Some(items),
            gas: 0,
            gas_limit,
        }
    }

    /// Steps consumed so far.
    pub fn gas_used(&self) -> u64 {
        self.gas
    }

    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        self.gas += 1;
        if self.gas > self.gas_limit {
            Err(EvalError::GasExhausted(self.gas_limit))
        } else {
            Ok(())
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expression evaluation
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression. Operands are evaluated left to right, all of
    /// them, before the operator is applied.
    pub fn eval(&mut self, expr: &Expression) -> EvalResult<Value> {
        self.tick()?;
        match expr {
            Expression::BaseValue(v) => Ok(Value::Single(v.clone())),
            Expression::Variable(r) => self.eval_variable(r),
            Expression::Default(id) => self.eval_default(id),
            Expression::Null => Ok(Value::Null),

            Expression::Multiple(items) => {
                let values = self.eval_all(items)?;
                Ok(ops::multiple(values)?)
            }
            Expression::Ordered(items) => {
                let values = self.eval_all(items)?;
                Ok(ops::ordered(values)?)
            }
            Expression::IsNull(e) => Ok(ops::is_null(&self.eval(e)?)),
            Expression::ContainerSize(e) => Ok(ops::container_size(&self.eval(e)?)?),
            Expression::Index { expression, n } => Ok(ops::index(&self.eval(expression)?, *n)?),
            Expression::FieldValue { expression, field } => {
                Ok(ops::field_value(&self.eval(expression)?, field)?)
            }

            Expression::Sum(items) => Ok(ops::sum(&self.eval_all(items)?)?),
            Expression::Product(items) => Ok(ops::product(&self.eval_all(items)?)?),
            Expression::Subtract(a, b) => self.binary(a, b, ops::subtract),
            Expression::Divide(a, b) => self.binary(a, b, ops::divide),
            Expression::Power(a, b) => self.binary(a, b, ops::power),
            Expression::IntegerDivide(a, b) => self.binary(a, b, ops::integer_divide),
            Expression::IntegerModulus(a, b) => self.binary(a, b, ops::integer_modulus),
            Expression::IntegerToFloat(e) => Ok(ops::integer_to_float(&self.eval(e)?)?),
            Expression::Round(e) => Ok(ops::round(&self.eval(e)?)?),
            Expression::Truncate(e) => Ok(ops::truncate(&self.eval(e)?)?),

            Expression::Lt(a, b) => self.binary(a, b, ops::lt),
            Expression::Lte(a, b) => self.binary(a, b, ops::lte),
            Expression::Gt(a, b) => self.binary(a, b, ops::gt),
            Expression::Gte(a, b) => self.binary(a, b, ops::gte),
            Expression::Equal {
                left,
                right,
                tolerance,
            } => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                Ok(ops::equal(&a, &b, *tolerance)?)
            }
            Expression::DurationLt(a, b) => self.binary(a, b, ops::duration_lt),
            Expression::DurationGte(a, b) => self.binary(a, b, ops::duration_gte),

            Expression::And(items) => Ok(ops::and(&self.eval_all(items)?)?),
            Expression::Or(items) => Ok(ops::or(&self.eval_all(items)?)?),
            Expression::Not(e) => Ok(ops::not(&self.eval(e)?)?),

            Expression::Match(a, b) => self.binary(a, b, ops::match_values),
            Expression::Member(a, b) => self.binary(a, b, ops::member),
            Expression::Contains(a, b) => self.binary(a, b, ops::contains),
            Expression::Delete(a, b) => self.binary(a, b, ops::delete),

            Expression::StringMatch {
                left,
                right,
                case_sensitive,
            } => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                Ok(ops::string_match(&a, &b, *case_sensitive)?)
            }

            Expression::TestVariables {
                variable,
                base_type,
                weight,
                subset,
            } => self.eval_test_variables(variable, *base_type, weight.as_ref(), subset),
            Expression::NumberSelected(subset) => {
                let items = self.test_items("numberSelected")?;
                Ok(Value::integer(items.select_items(subset).len() as i64))
            }
            Expression::NumberPresented(subset) => {
                let items = self.test_items("numberPresented")?;
                let count = items
                    .select_items(subset)
                    .iter()
                    .filter(|r| items.is_presented(r))
                    .count();
                Ok(Value::integer(count as i64))
            }
            Expression::NumberResponded(subset) => {
                let items = self.test_items("numberResponded")?;
                let count = items
                    .select_items(subset)
                    .iter()
                    .filter(|r| items.is_responded(r))
                    .count();
                Ok(Value::integer(count as i64))
            }
        }
    }

    /// Evaluate a condition. Null is returned as `None`.
    pub fn eval_condition(&mut self, expr: &Expression) -> EvalResult<Option<bool>> {
        let value = self.eval(expr)?;
        match &value {
            Value::Null => Ok(None),
            Value::Single(SingleValue::Boolean(b)) => Ok(Some(*b)),
            other => Err(EvalError::Type(qti_types::TypeError::Mismatch {
                expected: "single boolean".to_string(),
                found: other.describe(),
            })),
        }
    }

    fn eval_all(&mut self, exprs: &[Expression]) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for e in exprs {
            values.push(self.eval(e)?);
        }
        Ok(values)
    }

    fn binary(
        &mut self,
        a: &Expression,
        b: &Expression,
        op: fn(&Value, &Value) -> Result<Value, qti_types::TypeError>,
    ) -> EvalResult<Value> {
        let left = self.eval(a)?;
        let right = self.eval(b)?;
        Ok(op(&left, &right)?)
    }

    // ── Variables ──────────────────────────────────────────────────────────

    fn eval_variable(&self, reference: &VariableRef) -> EvalResult<Value> {
        match reference {
            VariableRef::Local(id) => self
                .store
                .get(id)
                .cloned()
                .ok_or_else(|| EvalError::UndeclaredVariable(reference.clone())),
            VariableRef::ItemVariable { item_ref, variable } => {
                let items = self
                    .items
                    .ok_or_else(|| EvalError::DottedReferenceInItem(reference.clone()))?;
                let store = items
                    .item_store(item_ref)
                    .ok_or_else(|| EvalError::UnresolvedItemRef(item_ref.clone()))?;
                store
                    .get(variable)
                    .cloned()
                    .ok_or_else(|| EvalError::UndeclaredVariable(reference.clone()))
            }
        }
    }

    fn eval_default(&self, id: &Identifier) -> EvalResult<Value> {
        let declaration = self
            .store
            .declaration(id)
            .ok_or_else(|| EvalError::UndeclaredVariable(VariableRef::Local(id.clone())))?;
        Ok(declaration.default_value.clone().unwrap_or(Value::Null))
    }

    // ── Test-level aggregates ──────────────────────────────────────────────

    fn test_items(&self, operator: &'static str) -> EvalResult<&'a dyn ItemResolver> {
        self.items.ok_or(EvalError::TestOnlyExpression(operator))
    }

    /// Values of `variable` across the selected items, optionally weighted.
    ///
    /// Null values and values of another base type are skipped. Weighted
    /// or float values give a multiple float; otherwise multiple integer.
    fn eval_test_variables(
        &self,
        variable: &Identifier,
        base_type: Option<BaseType>,
        weight: Option<&Identifier>,
        subset: &ItemSubset,
    ) -> EvalResult<Value> {
        let items = self.test_items("testVariables")?;
        let mut collected: Vec<(SingleValue, f64)> = Vec::new();
        for item_ref in items.select_items(subset) {
            let Some(store) = items.item_store(&item_ref) else {
                continue;
            };
            let Some(Value::Single(value)) = store.get(variable) else {
                continue;
            };
            if let Some(bt) = base_type {
                if value.base_type() != bt {
                    continue;
                }
            }
            if !value.base_type().is_numeric() {
                continue;
            }
            let w = weight
                .and_then(|w| items.item_weight(&item_ref, w))
                .unwrap_or(1.0);
            collected.push((value.clone(), w));
        }

        let as_float = weight.is_some()
            || collected
                .iter()
                .any(|(v, _)| v.base_type() == BaseType::Float);
        let values = collected
            .into_iter()
            .map(|(v, w)| match v {
                SingleValue::Integer(i) if !as_float => SingleValue::Integer(i),
                other => SingleValue::Float(other.as_f64().unwrap_or_default() * w),
            })
            .collect();
        Ok(Value::multiple(values)?)
    }
}
