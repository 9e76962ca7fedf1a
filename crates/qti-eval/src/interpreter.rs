//! Processing-rule interpreter.
//!
//! Rules run in order against a variable store. `exitTest` and
//! `exitResponse` are not errors: they come back as
//! [`ProcessingSignal::Interrupted`] through every nested condition and
//! fragment, and the caller of a processing run decides what they mean.

use crate::error::{EvalError, EvalResult};
use crate::evaluator::{Evaluator, DEFAULT_GAS_LIMIT};
use crate::lookup;
use crate::store::{ItemResolver, VariableStore};
use qti_types::{Expression, Identifier, Rule, SingleValue, TypeError, Value, VariableKind};
use tracing::debug;

/// Why a processing run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    ExitTest,
    ExitResponse,
}

/// Outcome of running a rule or a rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingSignal {
    Continue,
    Interrupted(InterruptReason),
}

impl ProcessingSignal {
    pub fn is_exit_test(self) -> bool {
        self == Self::Interrupted(InterruptReason::ExitTest)
    }
}

impl Evaluator<'_> {
    /// Run rules in order until one interrupts.
    pub fn exec_rules(&mut self, rules: &[Rule]) -> EvalResult<ProcessingSignal> {
        for rule in rules {
            if let ProcessingSignal::Interrupted(reason) = self.exec_rule(rule)? {
                return Ok(ProcessingSignal::Interrupted(reason));
            }
        }
        Ok(ProcessingSignal::Continue)
    }

    pub fn exec_rule(&mut self, rule: &Rule) -> EvalResult<ProcessingSignal> {
        self.tick()?;
        match rule {
            Rule::SetOutcomeValue {
                identifier,
                expression,
            } => {
                let value = self.eval(expression)?;
                self.write_outcome(identifier, value)?;
                Ok(ProcessingSignal::Continue)
            }
            Rule::LookupOutcomeValue {
                identifier,
                expression,
            } => {
                self.exec_lookup(identifier, expression)?;
                Ok(ProcessingSignal::Continue)
            }
            Rule::Condition(condition) => {
                for branch in condition.branches() {
                    if self.eval_condition(&branch.condition)? == Some(true) {
                        return self.exec_rules(&branch.rules);
                    }
                }
                match &condition.else_rules {
                    Some(rules) => self.exec_rules(rules),
                    None => Ok(ProcessingSignal::Continue),
                }
            }
            Rule::Fragment(rules) => self.exec_rules(rules),
            Rule::ExitTest => Ok(ProcessingSignal::Interrupted(InterruptReason::ExitTest)),
            Rule::ExitResponse => Ok(ProcessingSignal::Interrupted(InterruptReason::ExitResponse)),
        }
    }

    fn write_outcome(&mut self, identifier: &Identifier, value: Value) -> EvalResult<()> {
        let is_outcome = matches!(
            self.store.declaration(identifier),
            Some(d) if d.kind == VariableKind::Outcome
        );
        if !is_outcome {
            return Err(EvalError::UndeclaredOutcome(identifier.clone()));
        }
        self.store.assign(identifier, value)
    }

    fn exec_lookup(&mut self, identifier: &Identifier, expression: &Expression) -> EvalResult<()> {
        let declaration = match self.store.declaration(identifier) {
            Some(d) if d.kind == VariableKind::Outcome => d.clone(),
            _ => return Err(EvalError::UndeclaredOutcome(identifier.clone())),
        };
        let table = declaration
            .lookup_table
            .as_ref()
            .ok_or_else(|| EvalError::MissingLookupTable(identifier.clone()))?;

        let source = match self.eval(expression)? {
            Value::Null => None,
            Value::Single(SingleValue::Integer(i)) => Some(i as f64),
            Value::Single(SingleValue::Float(f)) | Value::Single(SingleValue::Duration(f)) => {
                Some(f)
            }
            other => {
                return Err(EvalError::Type(TypeError::Operand {
                    operator: "lookupOutcomeValue",
                    found: other.describe(),
                }))
            }
        };
        let value = lookup::lookup(&declaration, table, source);
        self.store.assign(identifier, value)
    }
}

/// Entry points for the two processing runs.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    gas_limit: u64,
}

impl Interpreter {
    pub fn new(gas_limit: u64) -> Self {
        Self { gas_limit }
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Run test outcome processing. Dotted references resolve through
    /// `items`.
    pub fn run_outcome_processing(
        &self,
        rules: &[Rule],
        store: &mut VariableStore,
        items: &dyn ItemResolver,
    ) -> EvalResult<ProcessingSignal> {
        let mut evaluator = Evaluator::for_test(store, items, self.gas_limit);
        let signal = evaluator.exec_rules(rules)?;
        if let ProcessingSignal::Interrupted(reason) = signal {
            debug!(?reason, gas = evaluator.gas_used(), "outcome processing interrupted");
        }
        Ok(signal)
    }

    /// Run item response processing.
    pub fn run_response_processing(
        &self,
        rules: &[Rule],
        store: &mut VariableStore,
    ) -> EvalResult<ProcessingSignal> {
        let mut evaluator = Evaluator::for_item(store, self.gas_limit);
        let signal = evaluator.exec_rules(rules)?;
        if let ProcessingSignal::Interrupted(reason) = signal {
            debug!(?reason, gas = evaluator.gas_used(), "response processing interrupted");
        }
        Ok(signal)
    }

    /// Evaluate a precondition or branch-rule condition in test scope.
    pub fn evaluate_condition(
        &self,
        expression: &Expression,
        store: &mut VariableStore,
        items: &dyn ItemResolver,
    ) -> EvalResult<Option<bool>> {
        Evaluator::for_test(store, items, self.gas_limit).eval_condition(expression)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_GAS_LIMIT)
    }
}
