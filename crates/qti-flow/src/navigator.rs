//! Item-flow navigator.
//!
//! Drives a candidate through a [`FlowGraph`]. Jump conditions are
//! evaluated fresh on every walk, and only in linear/individual test
//! parts. Test parts are left one way: once the cursor moves into another
//! part, the old one is finished for good.

use crate::clock::Clock;
use crate::error::{FlowError, FlowResult};
use crate::graph::{build_item_flow, FlowGraph};
use crate::node::{FlowNodeId, FlowNodeKind};
use crate::time_record::TimeRecord;
use qti_eval::EvalResult;
use qti_types::{AssessmentTest, ControlId, Expression};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Evaluates precondition and branch-rule expressions against live state.
pub trait ConditionEvaluator {
    /// `None` means the condition evaluated to Null.
    fn evaluate(&mut self, expression: &Expression) -> EvalResult<Option<bool>>;
}

impl<F> ConditionEvaluator for F
where
    F: FnMut(&Expression) -> EvalResult<Option<bool>>,
{
    fn evaluate(&mut self, expression: &Expression) -> EvalResult<Option<bool>> {
        self(expression)
    }
}

/// Per-item navigation state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemState {
    /// Forward walks pass over the item unless review is requested, and a
    /// linear part may move on from it.
    pub finished: bool,
    /// The cursor has stopped at the item at least once.
    pub presented: bool,
    /// Finished by skipping rather than by answering.
    pub skipped: bool,
    /// Finished because an answer arrived after a maximum time limit passed.
    pub timed_out: bool,
    /// Time spent with the item presented.
    pub time: TimeRecord,
}

/// Where the navigator is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    NotStarted,
    Presenting(ControlId),
    Finished,
}

/// Item nodes actually visited before and after a node.
#[derive(Debug, Clone, Copy, Default)]
struct VisitLinks {
    prev: Option<FlowNodeId>,
    next: Option<FlowNodeId>,
}

/// Ancestry of every item ref, computed once per navigator.
#[derive(Debug, Default)]
struct TreeIndex {
    ancestors: BTreeMap<ControlId, Vec<ControlId>>,
    items_below: BTreeMap<ControlId, Vec<ControlId>>,
    test_part: BTreeMap<ControlId, ControlId>,
}

impl TreeIndex {
    fn new(test: &AssessmentTest) -> Self {
        let mut index = Self::default();
        for item in test.item_refs() {
            let chain = test.ancestors(item);
            for ancestor in &chain {
                index.items_below.entry(*ancestor).or_default().push(item);
            }
            if let Some(part) = chain
                .iter()
                .copied()
                .find(|a| test.control(*a).kind.is_test_part())
            {
                index.test_part.insert(item, part);
            }
            index.ancestors.insert(item, chain);
        }
        index
    }

    fn ancestors(&self, item: ControlId) -> &[ControlId] {
        self.ancestors.get(&item).map_or(&[], Vec::as_slice)
    }

    fn items_below(&self, control: ControlId) -> &[ControlId] {
        self.items_below.get(&control).map_or(&[], Vec::as_slice)
    }

    fn test_part(&self, item: ControlId) -> Option<ControlId> {
        self.test_part.get(&item).copied()
    }
}

pub struct Navigator {
    test: Arc<AssessmentTest>,
    index: TreeIndex,
    graph: FlowGraph,
    clock: Arc<dyn Clock>,
    current: Option<FlowNodeId>,
    finished: bool,
    items: BTreeMap<ControlId, ItemState>,
    finished_parts: BTreeSet<ControlId>,
    links: BTreeMap<FlowNodeId, VisitLinks>,
}

impl Navigator {
    pub fn new(test: Arc<AssessmentTest>, graph: FlowGraph, clock: Arc<dyn Clock>) -> Self {
        let items = test
            .item_refs()
            .into_iter()
            .map(|id| (id, ItemState::default()))
            .collect();
        Self {
            index: TreeIndex::new(&test),
            test,
            graph,
            clock,
            current: None,
            finished: false,
            items,
            finished_parts: BTreeSet::new(),
            links: BTreeMap::new(),
        }
    }

    /// Build the flow graph of `test` and a navigator over it.
    pub fn build(test: Arc<AssessmentTest>, clock: Arc<dyn Clock>) -> FlowResult<Self> {
        let graph = build_item_flow(&test)?;
        Ok(Self::new(test, graph, clock))
    }

    pub fn test(&self) -> &AssessmentTest {
        &self.test
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn state(&self) -> NavigationState {
        if self.finished {
            NavigationState::Finished
        } else {
            match self.current() {
                Some(item) => NavigationState::Presenting(item),
                None => NavigationState::NotStarted,
            }
        }
    }

    /// The item ref being presented.
    pub fn current(&self) -> Option<ControlId> {
        self.current.map(|n| self.graph.node(n).kind.owner())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn current_test_part(&self) -> Option<ControlId> {
        self.current().and_then(|c| self.index.test_part(c))
    }

    pub fn is_test_part_finished(&self, part: ControlId) -> bool {
        self.finished_parts.contains(&part)
    }

    pub fn item_state(&self, item_ref: ControlId) -> Option<&ItemState> {
        self.items.get(&item_ref)
    }

    pub fn item_states(&self) -> impl Iterator<Item = (ControlId, &ItemState)> {
        self.items.iter().map(|(id, s)| (*id, s))
    }

    pub fn mark_item_finished(&mut self, item_ref: ControlId) -> FlowResult<()> {
        let identifier = &self.test.control(item_ref).identifier;
        let state = self
            .items
            .get_mut(&item_ref)
            .ok_or_else(|| FlowError::NotAnItemRef(identifier.clone()))?;
        state.finished = true;
        debug!(item = %identifier, "item finished");
        Ok(())
    }

    /// Finish an item without answering it. Refused when the item is
    /// already finished or its session control forbids skipping.
    pub fn skip_item(&mut self, item_ref: ControlId) -> FlowResult<()> {
        self.check_open(item_ref)?;
        let allow_skipping = self
            .test
            .effective_session_control(item_ref)
            .allow_skipping
            .unwrap_or(true);
        if !allow_skipping {
            let identifier = self.test.control(item_ref).identifier.clone();
            return Err(FlowError::SkippingNotAllowed(identifier));
        }
        if let Some(state) = self.items.get_mut(&item_ref) {
            state.skipped = true;
        }
        self.mark_item_finished(item_ref)
    }

    /// Finish an item whose answer came in after a maximum time limit.
    pub fn time_out_item(&mut self, item_ref: ControlId) -> FlowResult<()> {
        self.check_open(item_ref)?;
        if let Some(state) = self.items.get_mut(&item_ref) {
            state.timed_out = true;
        }
        self.mark_item_finished(item_ref)
    }

    fn check_open(&self, item_ref: ControlId) -> FlowResult<()> {
        let identifier = &self.test.control(item_ref).identifier;
        match self.items.get(&item_ref) {
            None => Err(FlowError::NotAnItemRef(identifier.clone())),
            Some(state) if state.finished => Err(FlowError::AlreadyFinished(identifier.clone())),
            Some(_) => Ok(()),
        }
    }

    /// Time spent in a control: the item's own record, or the sum over the
    /// items below a section, test part or the test.
    pub fn elapsed(&self, control: ControlId) -> Duration {
        let now = self.clock.now();
        if let Some(state) = self.items.get(&control) {
            return state.time.elapsed(now);
        }
        self.index
            .items_below(control)
            .iter()
            .filter_map(|i| self.items.get(i))
            .map(|s| s.time.elapsed(now))
            .sum()
    }

    /// Whether the item and every ancestor are still below their maximum
    /// time limits.
    pub fn within_time_limit(&self, item_ref: ControlId) -> bool {
        std::iter::once(item_ref)
            .chain(self.index.ancestors(item_ref).iter().copied())
            .all(|c| match self.test.control(c).time_limit.and_then(|t| t.max) {
                Some(max) => self.elapsed(c) < max,
                None => true,
            })
    }

    /// End the test now.
    pub fn finish_test(&mut self) {
        let now = self.clock.now();
        if let Some(item) = self.current() {
            if let Some(state) = self.items.get_mut(&item) {
                state.time.exit(now);
            }
        }
        self.finished_parts.extend(self.test.test_parts().iter().copied());
        self.current = None;
        self.finished = true;
        info!(test = %self.test.identifier(), "test finished");
    }

    // ══════════════════════════════════════════════════════════════════════
    // Forward
    // ══════════════════════════════════════════════════════════════════════

    /// Move to the next eligible item ref.
    ///
    /// Fails if the current item is unfinished in a linear, individual test
    /// part. Returns `None` and finishes the test when nothing is left.
    pub fn next(
        &mut self,
        include_finished: bool,
        conditions: &mut dyn ConditionEvaluator,
    ) -> FlowResult<Option<ControlId>> {
        debug!(include_finished, "next item ref requested");
        if self.finished {
            return Ok(None);
        }
        if let Some(item) = self.current() {
            self.check_unfinished(item)?;
        }

        let found = self.find_next(include_finished, conditions)?;
        let now = self.clock.now();

        if let Some(item) = self.current() {
            if let Some(state) = self.items.get_mut(&item) {
                state.time.exit(now);
            }
            let part = self.index.test_part(item);
            let found_part =
                found.and_then(|n| self.index.test_part(self.graph.node(n).kind.owner()));
            if found.is_none() || found_part != part {
                if let Some(part) = part {
                    self.finished_parts.insert(part);
                    debug!(part = %self.test.control(part).identifier, "test part finished");
                }
            }
        }

        self.current = found;
        match self.current() {
            Some(item) => {
                if let Some(state) = self.items.get_mut(&item) {
                    state.time.enter(now);
                    state.presented = true;
                }
                info!(item = %self.test.control(item).identifier, "next item ref");
            }
            None => {
                self.finished = true;
                info!(test = %self.test.identifier(), "no item ref left, test finished");
            }
        }
        Ok(self.current())
    }

    fn check_unfinished(&self, item: ControlId) -> FlowResult<()> {
        let finished = self.items.get(&item).is_some_and(|s| s.finished);
        if !finished && self.test.jumps_enabled(item) {
            let identifier = &self.test.control(item).identifier;
            tracing::error!(item = %identifier, "cannot leave unfinished item");
            return Err(FlowError::UnfinishedItem(identifier.clone()));
        }
        Ok(())
    }

    fn find_next(
        &mut self,
        include_finished: bool,
        conditions: &mut dyn ConditionEvaluator,
    ) -> FlowResult<Option<FlowNodeId>> {
        let found = match self.current {
            Some(current) => {
                let mut node = self.link(current).next;
                while let Some(n) = node {
                    if self.eligible(n, include_finished) {
                        break;
                    }
                    node = self.link(n).next;
                }
                match node {
                    Some(n) => Some(n),
                    None => self.walk_forward(current, include_finished, conditions)?,
                }
            }
            None => self.walk_forward(self.graph.start(), include_finished, conditions)?,
        };

        if let Some(n) = found {
            let links = self.links.entry(n).or_default();
            if links.prev.is_none() {
                links.prev = self.current;
            }
        }
        if let Some(current) = self.current {
            let links = self.links.entry(current).or_default();
            if links.next.is_none() {
                links.next = found;
            }
        }
        Ok(found)
    }

    fn walk_forward(
        &self,
        from: FlowNodeId,
        include_finished: bool,
        conditions: &mut dyn ConditionEvaluator,
    ) -> FlowResult<Option<FlowNodeId>> {
        let mut node = from;
        loop {
            let next = if self.graph.node(node).kind.is_jump() {
                self.take_jump(node, conditions)?
            } else {
                self.graph.node(node).next
            };
            let Some(n) = next else {
                return Ok(None);
            };
            node = n;
            if matches!(self.graph.node(n).kind, FlowNodeKind::ItemRef(_))
                && self.eligible(n, include_finished)
            {
                return Ok(Some(n));
            }
        }
    }

    /// Edge taken from a jump node. Jumps in non-linear or simultaneous
    /// parts are ignored and a Null condition counts as false.
    fn take_jump(
        &self,
        node: FlowNodeId,
        conditions: &mut dyn ConditionEvaluator,
    ) -> FlowResult<Option<FlowNodeId>> {
        let flow_node = self.graph.node(node);
        let owner = flow_node.kind.owner();
        if !self.test.jumps_enabled(owner) {
            return Ok(flow_node.next);
        }
        let control = self.test.control(owner);
        match flow_node.kind {
            FlowNodeKind::PreCondition { index, .. } => {
                let passed = conditions
                    .evaluate(&control.pre_conditions[index].expression)?
                    .unwrap_or(false);
                debug!(owner = %control.identifier, index, passed, "precondition");
                Ok(if passed { flow_node.next } else { flow_node.target })
            }
            FlowNodeKind::BranchRule { index, .. } => {
                let rule = &control.branch_rules[index];
                let taken = conditions.evaluate(&rule.expression)?.unwrap_or(false);
                debug!(owner = %control.identifier, target = %rule.target, taken, "branch rule");
                Ok(if taken { flow_node.target } else { flow_node.next })
            }
            _ => Ok(flow_node.next),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Backward
    // ══════════════════════════════════════════════════════════════════════

    /// Move back along the path the candidate took, within the current
    /// test part only.
    pub fn prev(&mut self, include_finished: bool) -> FlowResult<Option<ControlId>> {
        debug!(include_finished, "previous item ref requested");
        let Some(current) = self.current else {
            return Ok(None);
        };
        let current_item = self.graph.node(current).kind.owner();

        let mut node = self.link(current).prev;
        while let Some(n) = node {
            if self.eligible(n, include_finished) {
                break;
            }
            node = self.link(n).prev;
        }
        let found = node.filter(|n| {
            let item = self.graph.node(*n).kind.owner();
            self.index.test_part(item) == self.index.test_part(current_item)
        });

        if let Some(n) = found {
            let now = self.clock.now();
            if let Some(state) = self.items.get_mut(&current_item) {
                state.time.exit(now);
            }
            let item = self.graph.node(n).kind.owner();
            if let Some(state) = self.items.get_mut(&item) {
                state.time.enter(now);
            }
            self.current = Some(n);
            info!(item = %self.test.control(item).identifier, "previous item ref");
        } else {
            info!("no previous item ref");
        }
        Ok(found.map(|n| self.graph.node(n).kind.owner()))
    }

    // ── Shared ─────────────────────────────────────────────────────────────

    fn link(&self, node: FlowNodeId) -> VisitLinks {
        self.links.get(&node).copied().unwrap_or_default()
    }

    /// An item node may be stopped at when its test part is still open and
    /// it is either unfinished and within its time limit, or reviewable.
    fn eligible(&self, node: FlowNodeId, include_finished: bool) -> bool {
        let item = self.graph.node(node).kind.owner();
        if let Some(part) = self.index.test_part(item) {
            if self.finished_parts.contains(&part) {
                return false;
            }
        }
        let finished = self.items.get(&item).is_some_and(|s| s.finished);
        let allow_review = self
            .test
            .effective_session_control(item)
            .allow_review
            .unwrap_or(true);
        (!finished && self.within_time_limit(item)) || (include_finished && allow_review)
    }
}
