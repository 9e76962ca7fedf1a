//! The control-object tree of an assessment test, stored as an arena.
//!
//! Controls are addressed by [`ControlId`]; parent and child links are
//! indices, so ancestor walks never follow live references. Index 0 is
//! always the test itself.

use crate::{Expression, Identifier, Location, Rule, VariableDeclaration};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Stable index of a control object in its [`AssessmentTest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlId(u32);

impl ControlId {
    pub const ROOT: Self = Self(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationMode {
    Linear,
    Nonlinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionMode {
    Individual,
    Simultaneous,
}

/// Minimum and maximum time a candidate may spend in a control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeLimit {
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl TimeLimit {
    pub fn max(max: Duration) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }
}

/// Per-item session settings. Unset fields inherit from the nearest
/// ancestor that sets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemSessionControl {
    /// 0 means unlimited.
    pub max_attempts: Option<u32>,
    pub allow_review: Option<bool>,
    pub allow_skipping: Option<bool>,
}

/// Kind-specific data of a control object.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Test,
    TestPart {
        navigation_mode: NavigationMode,
        submission_mode: SubmissionMode,
    },
    Section {
        visible: bool,
    },
    ItemRef {
        /// Resource key handed to the resolver.
        href: String,
        categories: Vec<Identifier>,
        weights: BTreeMap<Identifier, f64>,
    },
}

impl ControlKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Test => "assessmentTest",
            Self::TestPart { .. } => "testPart",
            Self::Section { .. } => "assessmentSection",
            Self::ItemRef { .. } => "assessmentItemRef",
        }
    }

    pub fn is_item_ref(&self) -> bool {
        matches!(self, Self::ItemRef { .. })
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Self::Section { .. })
    }

    pub fn is_test_part(&self) -> bool {
        matches!(self, Self::TestPart { .. })
    }
}

/// Condition gating entry into a control. False skips the control.
#[derive(Debug, Clone, PartialEq)]
pub struct PreCondition {
    pub expression: Expression,
}

/// Destination of a branch rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchTarget {
    ExitSection,
    ExitTestPart,
    ExitTest,
    Control(Identifier),
}

impl BranchTarget {
    pub const EXIT_SECTION: &'static str = "EXIT_SECTION";
    pub const EXIT_TESTPART: &'static str = "EXIT_TESTPART";
    pub const EXIT_TEST: &'static str = "EXIT_TEST";

    /// Reserved names that may not be used as control identifiers.
    pub const RESERVED: [&'static str; 3] =
        [Self::EXIT_SECTION, Self::EXIT_TESTPART, Self::EXIT_TEST];

    pub fn from_identifier(identifier: Identifier) -> Self {
        match identifier.as_str() {
            Self::EXIT_SECTION => Self::ExitSection,
            Self::EXIT_TESTPART => Self::ExitTestPart,
            Self::EXIT_TEST => Self::ExitTest,
            _ => Self::Control(identifier),
        }
    }

    pub fn is_special(&self) -> bool {
        !matches!(self, Self::Control(_))
    }

    pub fn is_reserved(name: &str) -> bool {
        Self::RESERVED.contains(&name)
    }
}

impl fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitSection => f.write_str(Self::EXIT_SECTION),
            Self::ExitTestPart => f.write_str(Self::EXIT_TESTPART),
            Self::ExitTest => f.write_str(Self::EXIT_TEST),
            Self::Control(id) => write!(f, "{id}"),
        }
    }
}

/// Condition that, when true, jumps to `target` after leaving the control.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRule {
    pub target: BranchTarget,
    pub expression: Expression,
}

/// A node of the test tree: the test, a test part, a section or an item ref.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlObject {
    pub identifier: Identifier,
    pub kind: ControlKind,
    pub parent: Option<ControlId>,
    pub children: Vec<ControlId>,
    pub pre_conditions: Vec<PreCondition>,
    pub branch_rules: Vec<BranchRule>,
    pub time_limit: Option<TimeLimit>,
    pub item_session_control: Option<ItemSessionControl>,
}

impl ControlObject {
    fn new(identifier: Identifier, kind: ControlKind, parent: Option<ControlId>) -> Self {
        Self {
            identifier,
            kind,
            parent,
            children: Vec::new(),
            pre_conditions: Vec::new(),
            branch_rules: Vec::new(),
            time_limit: None,
            item_session_control: None,
        }
    }

    pub fn categories(&self) -> &[Identifier] {
        match &self.kind {
            ControlKind::ItemRef { categories, .. } => categories,
            _ => &[],
        }
    }

    pub fn href(&self) -> Option<&str> {
        match &self.kind {
            ControlKind::ItemRef { href, .. } => Some(href),
            _ => None,
        }
    }

    pub fn weight(&self, identifier: &Identifier) -> Option<f64> {
        match &self.kind {
            ControlKind::ItemRef { weights, .. } => weights.get(identifier).copied(),
            _ => None,
        }
    }
}

/// An assessment test: the control arena plus test-level outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentTest {
    controls: Vec<ControlObject>,
    pub outcome_declarations: Vec<VariableDeclaration>,
    pub outcome_processing: Vec<Rule>,
}

impl AssessmentTest {
    pub fn new(identifier: Identifier) -> Self {
        Self {
            controls: vec![ControlObject::new(identifier, ControlKind::Test, None)],
            outcome_declarations: Vec::new(),
            outcome_processing: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.controls[0].identifier
    }

    pub fn root(&self) -> ControlId {
        ControlId::ROOT
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.len() <= 1
    }

    pub fn control(&self, id: ControlId) -> &ControlObject {
        &self.controls[id.index()]
    }

    pub fn control_mut(&mut self, id: ControlId) -> &mut ControlObject {
        &mut self.controls[id.index()]
    }

    fn push(&mut self, parent: ControlId, identifier: Identifier, kind: ControlKind) -> ControlId {
        let id = ControlId(self.controls.len() as u32);
        self.controls
            .push(ControlObject::new(identifier, kind, Some(parent)));
        self.controls[parent.index()].children.push(id);
        id
    }

    // ── Building ──

    pub fn add_test_part(
        &mut self,
        identifier: Identifier,
        navigation_mode: NavigationMode,
        submission_mode: SubmissionMode,
    ) -> ControlId {
        self.push(
            ControlId::ROOT,
            identifier,
            ControlKind::TestPart {
                navigation_mode,
                submission_mode,
            },
        )
    }

    pub fn add_section(&mut self, parent: ControlId, identifier: Identifier) -> ControlId {
        self.push(parent, identifier, ControlKind::Section { visible: true })
    }

    pub fn add_item_ref(
        &mut self,
        parent: ControlId,
        identifier: Identifier,
        href: impl Into<String>,
    ) -> ControlId {
        self.push(
            parent,
            identifier,
            ControlKind::ItemRef {
                href: href.into(),
                categories: Vec::new(),
                weights: BTreeMap::new(),
            },
        )
    }

    /// Tag an item ref with a category. No-op on other controls.
    pub fn add_category(&mut self, item_ref: ControlId, category: Identifier) {
        if let ControlKind::ItemRef { categories, .. } = &mut self.control_mut(item_ref).kind {
            categories.push(category);
        }
    }

    /// Declare a weight on an item ref. No-op on other controls.
    pub fn set_weight(&mut self, item_ref: ControlId, weight: Identifier, value: f64) {
        if let ControlKind::ItemRef { weights, .. } = &mut self.control_mut(item_ref).kind {
            weights.insert(weight, value);
        }
    }

    pub fn add_pre_condition(&mut self, owner: ControlId, expression: Expression) {
        self.control_mut(owner)
            .pre_conditions
            .push(PreCondition { expression });
    }

    pub fn add_branch_rule(&mut self, owner: ControlId, target: BranchTarget, expression: Expression) {
        self.control_mut(owner)
            .branch_rules
            .push(BranchRule { target, expression });
    }

    pub fn set_time_limit(&mut self, owner: ControlId, time_limit: TimeLimit) {
        self.control_mut(owner).time_limit = Some(time_limit);
    }

    pub fn set_item_session_control(&mut self, owner: ControlId, control: ItemSessionControl) {
        self.control_mut(owner).item_session_control = Some(control);
    }

    // ── Structure queries ──

    pub fn test_parts(&self) -> &[ControlId] {
        &self.controls[0].children
    }

    pub fn parent(&self, id: ControlId) -> Option<ControlId> {
        self.control(id).parent
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, id: ControlId) -> Vec<ControlId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            result.push(p);
            current = self.parent(p);
        }
        result
    }

    /// Nearest strict ancestor that is a test part.
    pub fn parent_test_part(&self, id: ControlId) -> Option<ControlId> {
        self.ancestors(id)
            .into_iter()
            .find(|a| self.control(*a).kind.is_test_part())
    }

    /// Nearest strict ancestor that is a section.
    pub fn parent_section(&self, id: ControlId) -> Option<ControlId> {
        self.ancestors(id)
            .into_iter()
            .find(|a| self.control(*a).kind.is_section())
    }

    /// The test part `id` belongs to, or `id` itself when it is one.
    pub fn owning_test_part(&self, id: ControlId) -> Option<ControlId> {
        if self.control(id).kind.is_test_part() {
            Some(id)
        } else {
            self.parent_test_part(id)
        }
    }

    /// True when `ancestor` is a strict ancestor of `id`.
    pub fn is_descendant_of(&self, id: ControlId, ancestor: ControlId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// All controls in document (pre-)order, root first.
    pub fn pre_order(&self) -> Vec<ControlId> {
        let mut result = Vec::with_capacity(self.controls.len());
        let mut stack = vec![ControlId::ROOT];
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.control(id).children.iter().rev().copied());
        }
        result
    }

    /// First control in document order carrying `identifier`.
    pub fn lookup(&self, identifier: &Identifier) -> Option<ControlId> {
        self.pre_order()
            .into_iter()
            .find(|id| &self.control(*id).identifier == identifier)
    }

    /// Every item ref, in document order.
    pub fn item_refs(&self) -> Vec<ControlId> {
        self.pre_order()
            .into_iter()
            .filter(|id| self.control(*id).kind.is_item_ref())
            .collect()
    }

    /// Item refs below `ancestor`, in document order.
    pub fn items_in(&self, ancestor: ControlId) -> Vec<ControlId> {
        self.item_refs()
            .into_iter()
            .filter(|id| self.is_descendant_of(*id, ancestor))
            .collect()
    }

    /// Path from the root, e.g. `assessmentTest[T]/testPart[P1]`.
    pub fn location(&self, id: ControlId) -> Location {
        let mut chain = self.ancestors(id);
        chain.reverse();
        chain.push(id);
        let mut location = Location::default();
        for c in chain {
            let control = self.control(c);
            location = location.child(control.kind.class_name(), &control.identifier);
        }
        location
    }

    pub fn outcome_declaration(&self, identifier: &Identifier) -> Option<&VariableDeclaration> {
        self.outcome_declarations
            .iter()
            .find(|d| &d.identifier == identifier)
    }

    /// Session control of `id` with unset fields filled from ancestors.
    pub fn effective_session_control(&self, id: ControlId) -> ItemSessionControl {
        let mut merged = ItemSessionControl::default();
        for c in std::iter::once(id).chain(self.ancestors(id)) {
            if let Some(isc) = self.control(c).item_session_control {
                merged.max_attempts = merged.max_attempts.or(isc.max_attempts);
                merged.allow_review = merged.allow_review.or(isc.allow_review);
                merged.allow_skipping = merged.allow_skipping.or(isc.allow_skipping);
            }
        }
        merged
    }

    /// Navigation and submission mode of the test part owning `id`.
    pub fn modes(&self, id: ControlId) -> Option<(NavigationMode, SubmissionMode)> {
        let part = self.owning_test_part(id)?;
        match self.control(part).kind {
            ControlKind::TestPart {
                navigation_mode,
                submission_mode,
            } => Some((navigation_mode, submission_mode)),
            _ => None,
        }
    }

    /// Preconditions and branch rules only take effect in linear,
    /// individual test parts.
    pub fn jumps_enabled(&self, id: ControlId) -> bool {
        matches!(
            self.modes(id),
            Some((NavigationMode::Linear, SubmissionMode::Individual))
        )
    }
}
