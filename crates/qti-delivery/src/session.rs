//! Test sessions: one candidate's run through one test.
//!
//! A session owns the navigator, the test variable store and one store per
//! item ref. Preconditions and branch rules see the live test store, with
//! dotted references reaching into the item stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use qti_eval::store::{COMPLETION_STATUS, DURATION, NUM_ATTEMPTS, STATUS_COMPLETED};
use qti_eval::{EvalError, Interpreter, ItemResolver, ProcessingSignal, VariableStore};
use qti_flow::{Clock, FlowError, NavigationState, Navigator};
use qti_types::{
    AssessmentItem, AssessmentTest, ControlId, Expression, Identifier, ItemSubset,
    ValidationReport, Value, VariableKind,
};
use qti_validate::Validator;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::resolver::{ResolveError, ResourceResolver};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("test '{identifier}' failed validation with {} error(s)", .report.total_errors)]
    Invalid {
        identifier: Identifier,
        report: Box<ValidationReport>,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("no item is being presented")]
    NoCurrentItem,
    #[error("the test is finished")]
    Finished,
    #[error("item '{item}' declares no response variable '{response}'")]
    UnknownResponse {
        item: Identifier,
        response: Identifier,
    },
    #[error("item ref '{0}' has no attempts left")]
    NoAttemptsLeft(Identifier),
    /// The item or one of its ancestors ran past its maximum time. The item
    /// is finished and the late responses are discarded.
    #[error("item ref '{0}' timed out")]
    TimedOut(Identifier),
    #[error("item ref '{0}' has not been attempted")]
    NotAttempted(Identifier),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Runtime state of one item ref.
#[derive(Debug, Clone)]
pub struct ItemSession {
    /// The item ref this session belongs to.
    pub control: ControlId,
    /// Resolved item document, shared between item refs with the same href.
    pub item: Arc<AssessmentItem>,
    /// Response, outcome and built-in variables of this item ref.
    pub store: VariableStore,
    /// Shown to the candidate at least once.
    pub presented: bool,
    /// At least one submission was accepted.
    pub responded: bool,
}

impl ItemSession {
    pub fn attempts(&self) -> i64 {
        self.store
            .get(&Identifier::from_static(NUM_ATTEMPTS))
            .and_then(Value::as_single)
            .and_then(|v| v.as_integer())
            .unwrap_or(0)
    }
}

/// Test-scope view of the item sessions.
struct SessionItems<'s> {
    test: &'s AssessmentTest,
    items: &'s BTreeMap<Identifier, ItemSession>,
}

impl ItemResolver for SessionItems<'_> {
    fn item_store(&self, item_ref: &Identifier) -> Option<&VariableStore> {
        self.items.get(item_ref).map(|s| &s.store)
    }

    fn select_items(&self, subset: &ItemSubset) -> Vec<Identifier> {
        let candidates = match &subset.section {
            Some(name) => match self.test.lookup(name) {
                Some(section) => self.test.items_in(section),
                None => return Vec::new(),
            },
            None => self.test.item_refs(),
        };
        candidates
            .into_iter()
            .map(|c| self.test.control(c))
            .filter(|control| subset.accepts_categories(control.categories()))
            .map(|control| control.identifier.clone())
            .collect()
    }

    fn item_weight(&self, item_ref: &Identifier, weight: &Identifier) -> Option<f64> {
        let control = self.items.get(item_ref)?.control;
        self.test.control(control).weight(weight)
    }

    fn is_presented(&self, item_ref: &Identifier) -> bool {
        self.items.get(item_ref).is_some_and(|s| s.presented)
    }

    fn is_responded(&self, item_ref: &Identifier) -> bool {
        self.items.get(item_ref).is_some_and(|s| s.responded)
    }
}

pub struct TestSession {
    config: EngineConfig,
    interpreter: Interpreter,
    test: Arc<AssessmentTest>,
    navigator: Navigator,
    test_store: VariableStore,
    items: BTreeMap<Identifier, ItemSession>,
    report: ValidationReport,
}

impl TestSession {
    /// Resolve every item, validate, build the item flow and initialise
    /// all variable stores.
    pub fn start(
        test: Arc<AssessmentTest>,
        resolver: &dyn ResourceResolver,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> SessionResult<Self> {
        info!(test = %test.identifier(), "starting test session");

        let mut resolved = BTreeMap::new();
        for control_id in test.item_refs() {
            let control = test.control(control_id);
            let href = control.href().unwrap_or_default();
            let item = resolver.resolve(href)?.into_item(href)?;
            resolved.insert(control.identifier.clone(), (control_id, item));
        }

        let catalog: BTreeMap<Identifier, Arc<AssessmentItem>> = resolved
            .iter()
            .map(|(name, (_, item))| (name.clone(), Arc::clone(item)))
            .collect();
        let mut validator = Validator::new(config.max_errors).with_items(&catalog);
        validator.check_test(&test);
        // Item refs sharing an href share one document.
        let mut checked: Vec<&Arc<AssessmentItem>> = Vec::new();
        for item in catalog.values() {
            if !checked.iter().any(|c| Arc::ptr_eq(c, item)) {
                validator.check_item(item);
                checked.push(item);
            }
        }
        let report = validator.finish();

        if report.has_errors() {
            if config.refuse_on_errors {
                warn!(test = %test.identifier(), errors = report.total_errors, "refusing invalid test");
                return Err(SessionError::Invalid {
                    identifier: test.identifier().clone(),
                    report: Box::new(report),
                });
            }
            warn!(test = %test.identifier(), errors = report.total_errors, "delivering test with validation errors");
        }

        let navigator = Navigator::build(Arc::clone(&test), clock)?;
        let items = resolved
            .into_iter()
            .map(|(name, (control, item))| {
                let session = ItemSession {
                    control,
                    store: VariableStore::for_item(&item),
                    item,
                    presented: false,
                    responded: false,
                };
                (name, session)
            })
            .collect();

        Ok(Self {
            interpreter: Interpreter::new(config.gas_limit),
            config,
            test_store: VariableStore::for_test(&test),
            test,
            navigator,
            items,
            report,
        })
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn test(&self) -> &AssessmentTest {
        &self.test
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    pub fn state(&self) -> NavigationState {
        self.navigator.state()
    }

    pub fn is_finished(&self) -> bool {
        self.navigator.is_finished()
    }

    /// Identifier of the item ref being presented.
    pub fn current_item(&self) -> Option<&Identifier> {
        self.navigator
            .current()
            .map(|c| &self.test.control(c).identifier)
    }

    pub fn item_session(&self, item_ref: &Identifier) -> Option<&ItemSession> {
        self.items.get(item_ref)
    }

    pub fn test_store(&self) -> &VariableStore {
        &self.test_store
    }

    pub fn outcome(&self, identifier: &Identifier) -> Option<&Value> {
        self.test_store.get(identifier)
    }

    pub fn item_value(&self, item_ref: &Identifier, variable: &Identifier) -> Option<&Value> {
        self.items.get(item_ref)?.store.get(variable)
    }

    // ── Navigation ─────────────────────────────────────────────────────────

    pub fn next_item(&mut self, include_finished: bool) -> SessionResult<Option<Identifier>> {
        let Self {
            interpreter,
            test,
            navigator,
            test_store,
            items,
            ..
        } = self;
        let view = SessionItems {
            test: &**test,
            items,
        };
        let mut conditions = |expression: &Expression| {
            interpreter.evaluate_condition(expression, test_store, &view)
        };
        let found = navigator.next(include_finished, &mut conditions)?;
        self.after_move(found)
    }

    pub fn prev_item(&mut self, include_finished: bool) -> SessionResult<Option<Identifier>> {
        let found = self.navigator.prev(include_finished)?;
        self.after_move(found)
    }

    /// End the test now.
    pub fn finish(&mut self) {
        self.navigator.finish_test();
        self.update_duration();
    }

    fn after_move(&mut self, found: Option<ControlId>) -> SessionResult<Option<Identifier>> {
        self.update_duration();
        let Some(control) = found else {
            return Ok(None);
        };
        let identifier = self.test.control(control).identifier.clone();
        if let Some(session) = self.items.get_mut(&identifier) {
            session.presented = true;
        }
        Ok(Some(identifier))
    }

    fn update_duration(&mut self) {
        let elapsed = self.navigator.elapsed(self.test.root());
        let duration = Identifier::from_static(DURATION);
        self.test_store
            .set(&duration, Value::duration(elapsed.as_secs_f64()));
    }

    /// Close the current item after at least one submission, releasing the
    /// cursor in a linear part while attempts remain.
    pub fn end_item(&mut self) -> SessionResult<()> {
        let (control, item_ref) = self.presented_item()?;
        let attempts = self.items.get(&item_ref).map_or(0, ItemSession::attempts);
        if attempts == 0 {
            return Err(SessionError::NotAttempted(item_ref));
        }
        self.navigator.mark_item_finished(control)?;
        info!(item = %item_ref, attempts, "item ended");
        Ok(())
    }

    /// Finish the current item without answering it, if its session
    /// control allows skipping.
    pub fn skip_item(&mut self) -> SessionResult<()> {
        let (control, item_ref) = self.presented_item()?;
        self.navigator.skip_item(control)?;
        info!(item = %item_ref, "item skipped");
        Ok(())
    }

    fn presented_item(&self) -> SessionResult<(ControlId, Identifier)> {
        if self.navigator.is_finished() {
            return Err(SessionError::Finished);
        }
        let control = self.navigator.current().ok_or(SessionError::NoCurrentItem)?;
        Ok((control, self.test.control(control).identifier.clone()))
    }

    // ── Submission ─────────────────────────────────────────────────────────

    /// Record responses for the current item, then run its response
    /// processing and the test's outcome processing.
    ///
    /// Returns the outcome-processing signal; an ExitTest from either run
    /// finishes the test. Responses arriving after a maximum time limit
    /// passed are not scored: the item is finished as timed out.
    pub fn submit_responses(
        &mut self,
        responses: impl IntoIterator<Item = (Identifier, Value)>,
    ) -> SessionResult<ProcessingSignal> {
        let (control, item_ref) = self.presented_item()?;
        let max_attempts = self
            .test
            .effective_session_control(control)
            .max_attempts
            .unwrap_or(self.config.default_max_attempts);

        let attempts = self
            .items
            .get(&item_ref)
            .ok_or(SessionError::NoCurrentItem)?
            .attempts();
        if max_attempts != 0 && attempts >= i64::from(max_attempts) {
            return Err(SessionError::NoAttemptsLeft(item_ref));
        }
        if !self.navigator.within_time_limit(control) {
            let open = self
                .navigator
                .item_state(control)
                .is_some_and(|s| !s.finished);
            if open {
                self.navigator.time_out_item(control)?;
            }
            warn!(item = %item_ref, "submission after time limit");
            return Err(SessionError::TimedOut(item_ref));
        }
        let session = self
            .items
            .get_mut(&item_ref)
            .ok_or(SessionError::NoCurrentItem)?;

        for (response, value) in responses {
            let is_response = session
                .item
                .declaration(&response)
                .is_some_and(|d| d.kind == VariableKind::Response);
            if !is_response {
                return Err(SessionError::UnknownResponse {
                    item: session.item.identifier.clone(),
                    response,
                });
            }
            session.store.assign(&response, value)?;
        }

        let attempts = attempts + 1;
        session
            .store
            .assign(&Identifier::from_static(NUM_ATTEMPTS), Value::integer(attempts))?;
        session.responded = true;

        let signal = self
            .interpreter
            .run_response_processing(&session.item.response_processing, &mut session.store)?;
        session.store.assign(
            &Identifier::from_static(COMPLETION_STATUS),
            Value::identifier(Identifier::from_static(STATUS_COMPLETED)),
        )?;
        info!(item = %item_ref, attempts, "responses submitted");

        if max_attempts != 0 && attempts >= i64::from(max_attempts) {
            self.navigator.mark_item_finished(control)?;
        }
        if signal.is_exit_test() {
            info!(item = %item_ref, "response processing requested exit");
            self.finish();
            return Ok(signal);
        }
        self.run_outcome_processing()
    }

    /// Recompute test outcomes from their defaults.
    pub fn run_outcome_processing(&mut self) -> SessionResult<ProcessingSignal> {
        self.update_duration();
        self.test_store.reset_outcomes();
        let view = SessionItems {
            test: &self.test,
            items: &self.items,
        };
        let signal = self.interpreter.run_outcome_processing(
            &self.test.outcome_processing,
            &mut self.test_store,
            &view,
        )?;
        debug!(?signal, "outcome processing done");
        if signal.is_exit_test() {
            info!(test = %self.test.identifier(), "outcome processing exited the test");
            self.finish();
        }
        Ok(signal)
    }
}
