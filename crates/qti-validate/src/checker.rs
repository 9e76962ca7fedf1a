//! Validator: walks test and item documents and collects diagnostics.
//!
//! Entry point: [`Validator::check_test`] / [`Validator::check_item`],
//! then [`Validator::finish`].
//!
//! Error codes emitted:
//! - E100/E101: duplicate or reserved identifiers
//! - E200–E202: static type checks on declarations and rule targets
//! - E300–E305: lookup table shape and ordering
//! - E400–E409: branch rules, preconditions, time limits, tree shape
//! - E500–E505: variable and item references

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use qti_eval::store::{COMPLETION_STATUS, DURATION, NUM_ATTEMPTS};
use qti_types::{
    AssessmentItem, AssessmentTest, BaseType, BranchTarget, Cardinality, ControlId, ControlKind,
    Diagnostic, ErrorCode, Expression, Identifier, LookupTable, Location, Rule, ValidationReport,
    VariableDeclaration, VariableKind, VariableRef,
};
use tracing::debug;

use crate::infer::{assignable, infer_base_type};

// ══════════════════════════════════════════════════════════════════════════════
// Item catalog
// ══════════════════════════════════════════════════════════════════════════════

/// Resolved items of a test, keyed by item-ref identifier.
pub trait ItemCatalog {
    fn item(&self, item_ref: &Identifier) -> Option<&AssessmentItem>;
}

impl ItemCatalog for BTreeMap<Identifier, AssessmentItem> {
    fn item(&self, item_ref: &Identifier) -> Option<&AssessmentItem> {
        self.get(item_ref)
    }
}

impl ItemCatalog for BTreeMap<Identifier, Arc<AssessmentItem>> {
    fn item(&self, item_ref: &Identifier) -> Option<&AssessmentItem> {
        self.get(item_ref).map(|item| item.as_ref())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Validator
// ══════════════════════════════════════════════════════════════════════════════

/// Which variables a rule or expression may see.
#[derive(Clone, Copy)]
enum Scope<'s> {
    Item(&'s AssessmentItem),
    Test(&'s AssessmentTest),
}

/// Collects diagnostics over any number of documents into one report.
pub struct Validator<'a> {
    report: ValidationReport,
    items: Option<&'a dyn ItemCatalog>,
}

impl<'a> Validator<'a> {
    pub fn new(max_errors: usize) -> Self {
        Self {
            report: ValidationReport::with_max_errors(max_errors),
            items: None,
        }
    }

    /// Check dotted references and item refs against resolved items.
    pub fn with_items(mut self, items: &'a dyn ItemCatalog) -> Self {
        self.items = Some(items);
        self
    }

    pub fn finish(self) -> ValidationReport {
        self.report
    }

    // ══════════════════════════════════════════════════════════════════════
    // Test
    // ══════════════════════════════════════════════════════════════════════

    pub fn check_test(&mut self, test: &AssessmentTest) {
        debug!(test = %test.identifier(), controls = test.len(), "validating test");
        let root = test.location(test.root());

        // 1. Identifier uniqueness over declarations and controls
        let mut names = test
            .outcome_declarations
            .iter()
            .map(|d| {
                let location = root.child(d.kind.element_name(), &d.identifier);
                (&d.identifier, location)
            })
            .collect::<Vec<_>>();
        names.extend(test.pre_order().into_iter().map(|c| {
            (&test.control(c).identifier, test.location(c))
        }));
        self.check_identifiers(names);

        // 2. Declarations
        for declaration in &test.outcome_declarations {
            let location = root.child(declaration.kind.element_name(), &declaration.identifier);
            self.check_declaration(declaration, &location);
        }

        // 3. Control tree
        if test.test_parts().is_empty() {
            self.error(
                ErrorCode::EMPTY_TEST_PART,
                format!("test '{}' has no test parts", test.identifier()),
                root.clone(),
            );
        }
        for id in test.pre_order() {
            self.check_control(test, id);
        }

        // 4. Outcome processing
        let processing = root.with("outcomeProcessing");
        self.check_rules(Scope::Test(test), &test.outcome_processing, &processing);
    }

    fn check_control(&mut self, test: &AssessmentTest, id: ControlId) {
        let control = test.control(id);
        let location = test.location(id);
        let parent_kind = test.parent(id).map(|p| &test.control(p).kind);

        // Tree shape
        let misplaced = match (&control.kind, parent_kind) {
            (ControlKind::Test, None) => false,
            (ControlKind::TestPart { .. }, Some(ControlKind::Test)) => false,
            (ControlKind::Section { .. } | ControlKind::ItemRef { .. }, Some(parent)) => {
                !(parent.is_test_part() || parent.is_section())
            }
            _ => true,
        };
        if misplaced {
            self.error(
                ErrorCode::MISPLACED_CONTROL,
                format!(
                    "{} '{}' cannot appear here",
                    control.kind.class_name(),
                    control.identifier
                ),
                location.clone(),
            );
        }
        match &control.kind {
            ControlKind::TestPart { .. } if control.children.is_empty() => self.error(
                ErrorCode::EMPTY_TEST_PART,
                format!("test part '{}' contains no sections or items", control.identifier),
                location.clone(),
            ),
            ControlKind::Section { .. } if control.children.is_empty() => self.warning(
                ErrorCode::EMPTY_SECTION,
                format!("section '{}' contains no sections or items", control.identifier),
                location.clone(),
            ),
            ControlKind::ItemRef { .. } if !control.children.is_empty() => self.error(
                ErrorCode::MISPLACED_CONTROL,
                format!("item ref '{}' cannot contain other controls", control.identifier),
                location.clone(),
            ),
            _ => {}
        }

        // Time limits
        if let Some(limit) = control.time_limit {
            if let (Some(min), Some(max)) = (limit.min, limit.max) {
                if min > max {
                    self.error(
                        ErrorCode::INVALID_TIME_LIMIT,
                        format!(
                            "minimum time {}s exceeds maximum time {}s",
                            min.as_secs_f64(),
                            max.as_secs_f64()
                        ),
                        location.with("timeLimits"),
                    );
                }
            }
        }

        if let ControlKind::ItemRef { href, .. } = &control.kind {
            if let Some(items) = self.items {
                if items.item(&control.identifier).is_none() {
                    self.warning(
                        ErrorCode::UNRESOLVED_ITEM,
                        format!("item '{href}' of item ref '{}' could not be resolved", control.identifier),
                        location.clone(),
                    );
                }
            }
        }

        // Preconditions and branch rules
        let jumps_enabled = test.jumps_enabled(id);
        for (index, pre) in control.pre_conditions.iter().enumerate() {
            let at = location.child("preCondition", index);
            if !jumps_enabled {
                self.ignored_jump("preCondition", &control.identifier, at.clone());
            }
            self.check_condition(Scope::Test(test), &pre.expression, &at);
        }
        for (index, rule) in control.branch_rules.iter().enumerate() {
            let at = location.child("branchRule", index);
            self.check_condition(Scope::Test(test), &rule.expression, &at);
            if jumps_enabled {
                self.check_branch_target(test, id, &rule.target, &at);
            } else {
                self.ignored_jump("branchRule", &control.identifier, at);
            }
        }
    }

    fn ignored_jump(&mut self, element: &str, owner: &Identifier, location: Location) {
        self.warning(
            ErrorCode::IGNORED_JUMP,
            format!("{element} on '{owner}' is ignored outside linear, individual test parts"),
            location,
        );
    }

    fn check_branch_target(
        &mut self,
        test: &AssessmentTest,
        owner: ControlId,
        target: &BranchTarget,
        location: &Location,
    ) {
        let owner_control = test.control(owner);
        let owner_name = &owner_control.identifier;
        match target {
            BranchTarget::ExitTest => {}
            BranchTarget::ExitTestPart => {
                if test.parent_test_part(owner).is_none() {
                    self.error(
                        ErrorCode::INVALID_SPECIAL_TARGET,
                        format!("{target} is not valid on '{owner_name}'"),
                        location.clone(),
                    );
                }
            }
            BranchTarget::ExitSection => {
                if test.parent_section(owner).is_none() {
                    self.error(
                        ErrorCode::INVALID_SPECIAL_TARGET,
                        format!("{target} on '{owner_name}' has no enclosing section"),
                        location.clone(),
                    );
                }
            }
            BranchTarget::Control(name) => {
                let Some(target_id) = test.lookup(name) else {
                    let mut diagnostic = Diagnostic::error(
                        ErrorCode::UNKNOWN_BRANCH_TARGET,
                        format!("branch rule on '{owner_name}' targets unknown control '{name}'"),
                        location.clone(),
                    );
                    if let Some(close) = similar_control(test, name) {
                        diagnostic = diagnostic.with_suggestion(format!("did you mean '{close}'?"));
                    }
                    self.report.push(diagnostic);
                    return;
                };

                if test.is_descendant_of(target_id, owner) {
                    self.error(
                        ErrorCode::JUMP_INTO_CHILD,
                        format!("'{owner_name}' cannot branch into its own child '{name}'"),
                        location.clone(),
                    );
                    return;
                }
                let order = test.pre_order();
                let position = |c: ControlId| order.iter().position(|x| *x == c);
                if position(target_id) <= position(owner) {
                    self.error(
                        ErrorCode::BACKWARD_JUMP,
                        format!("'{owner_name}' cannot branch backwards to '{name}'"),
                        location.clone(),
                    );
                    return;
                }

                let target_kind = &test.control(target_id).kind;
                let scope_ok = if owner_control.kind.is_test_part() {
                    target_kind.is_test_part()
                } else {
                    !target_kind.is_test_part()
                        && test.owning_test_part(target_id) == test.owning_test_part(owner)
                };
                if !scope_ok {
                    self.error(
                        ErrorCode::INVALID_JUMP_SCOPE,
                        format!(
                            "{} '{owner_name}' cannot branch to {} '{name}'",
                            owner_control.kind.class_name(),
                            target_kind.class_name()
                        ),
                        location.clone(),
                    );
                }
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Item
    // ══════════════════════════════════════════════════════════════════════

    pub fn check_item(&mut self, item: &AssessmentItem) {
        debug!(item = %item.identifier, "validating item");
        let root = Location::root("assessmentItem", &item.identifier);

        let mut names = vec![(&item.identifier, root.clone())];
        names.extend(item.declarations.iter().map(|d| {
            (&d.identifier, root.child(d.kind.element_name(), &d.identifier))
        }));
        self.check_identifiers(names);

        for declaration in &item.declarations {
            let location = root.child(declaration.kind.element_name(), &declaration.identifier);
            self.check_declaration(declaration, &location);
        }

        let processing = root.with("responseProcessing");
        self.check_rules(Scope::Item(item), &item.response_processing, &processing);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Identifiers and declarations
    // ══════════════════════════════════════════════════════════════════════

    fn check_identifiers(&mut self, names: Vec<(&Identifier, Location)>) {
        let mut seen: HashMap<&Identifier, Location> = HashMap::new();
        for (name, location) in names {
            if BranchTarget::is_reserved(name.as_str()) {
                self.report.push(
                    Diagnostic::error(
                        ErrorCode::RESERVED_IDENTIFIER,
                        format!("'{name}' is reserved for branch rule targets"),
                        location.clone(),
                    )
                    .with_suggestion(format!("rename '{name}'")),
                );
            }
            match seen.get(name) {
                Some(first) => {
                    let message = format!("duplicate identifier '{name}', first used at {first}");
                    self.error(ErrorCode::DUPLICATE_IDENTIFIER, message, location);
                }
                None => {
                    seen.insert(name, location);
                }
            }
        }
    }

    fn check_declaration(&mut self, declaration: &VariableDeclaration, location: &Location) {
        let name = &declaration.identifier;
        if declaration.cardinality != Cardinality::Record && declaration.base_type.is_none() {
            self.error(
                ErrorCode::MISSING_BASE_TYPE,
                format!("{} variable '{name}' needs a base type", declaration.cardinality),
                location.clone(),
            );
        }
        if let Some(default) = &declaration.default_value {
            if let Err(e) = default.coerce(declaration.cardinality, declaration.base_type) {
                self.error(
                    ErrorCode::INVALID_DEFAULT_VALUE,
                    format!("default value of '{name}' does not fit its declaration: {e}"),
                    location.with("defaultValue"),
                );
            }
        }
        if let Some(table) = &declaration.lookup_table {
            self.check_lookup_table(declaration, table, &location.with(table.element_name()));
        }
    }

    fn check_lookup_table(
        &mut self,
        declaration: &VariableDeclaration,
        table: &LookupTable,
        location: &Location,
    ) {
        let name = &declaration.identifier;
        if !declaration.cardinality.is_single() {
            self.error(
                ErrorCode::LOOKUP_NOT_SINGLE,
                format!(
                    "lookup table on '{name}' requires single cardinality, found {}",
                    declaration.cardinality
                ),
                location.clone(),
            );
        }

        if let Some(declared) = declaration.base_type {
            for target in table.targets().into_iter().chain(table.default_value()) {
                if !assignable(target.base_type(), declared) {
                    self.error(
                        ErrorCode::LOOKUP_TARGET_TYPE,
                        format!(
                            "lookup target {target} of '{name}' is {}, expected {declared}",
                            target.base_type()
                        ),
                        location.clone(),
                    );
                }
            }
        }

        match table {
            LookupTable::Match(m) => {
                let mut seen = Vec::with_capacity(m.entries.len());
                for entry in &m.entries {
                    if seen.contains(&entry.source_value) {
                        self.duplicate_source(name, entry.source_value, location);
                    }
                    seen.push(entry.source_value);
                }
            }
            LookupTable::Interpolation(t) => {
                for pair in t.entries.windows(2) {
                    let (a, b) = (pair[0].source_value, pair[1].source_value);
                    if a == b {
                        self.duplicate_source(name, a, location);
                    } else if b > a {
                        self.warning(
                            ErrorCode::INTERPOLATION_ORDER,
                            format!(
                                "interpolation table of '{name}' is not sorted descending ({a} before {b})"
                            ),
                            location.clone(),
                        );
                    }
                }
            }
        }
    }

    fn duplicate_source(&mut self, name: &Identifier, source: impl std::fmt::Display, location: &Location) {
        self.warning(
            ErrorCode::DUPLICATE_SOURCE_VALUE,
            format!("lookup table of '{name}' maps source value {source} more than once"),
            location.clone(),
        );
    }

    // ══════════════════════════════════════════════════════════════════════
    // Rules and expressions
    // ══════════════════════════════════════════════════════════════════════

    fn check_rules(&mut self, scope: Scope<'_>, rules: &[Rule], location: &Location) {
        for (index, rule) in rules.iter().enumerate() {
            let at = location.child(rule.name(), index);
            self.check_rule(scope, rule, &at);
        }
    }

    fn check_rule(&mut self, scope: Scope<'_>, rule: &Rule, location: &Location) {
        match rule {
            Rule::SetOutcomeValue {
                identifier,
                expression,
            } => {
                self.check_expression(scope, expression, location);
                let Some(declaration) = self.outcome_target(scope, identifier, location) else {
                    return;
                };
                let found = infer_base_type(expression, &|r| base_type_of(scope, r));
                if let (Some(found), Some(declared)) = (found, declaration.base_type) {
                    if !assignable(found, declared) {
                        self.error(
                            ErrorCode::TYPE_MISMATCH,
                            format!("cannot set {declared} outcome '{identifier}' to a {found} value"),
                            location.clone(),
                        );
                    }
                }
            }
            Rule::LookupOutcomeValue {
                identifier,
                expression,
            } => {
                self.check_expression(scope, expression, location);
                let Some(declaration) = self.outcome_target(scope, identifier, location) else {
                    return;
                };
                match &declaration.lookup_table {
                    None => self.error(
                        ErrorCode::MISSING_LOOKUP_TABLE,
                        format!("outcome '{identifier}' has no lookup table"),
                        location.clone(),
                    ),
                    Some(LookupTable::Match(_)) => {
                        let found = infer_base_type(expression, &|r| base_type_of(scope, r));
                        if let Some(found) = found.filter(|bt| *bt != BaseType::Integer) {
                            self.error(
                                ErrorCode::MATCH_TABLE_NOT_INTEGER,
                                format!(
                                    "match table of '{identifier}' needs an integer source, found {found}"
                                ),
                                location.clone(),
                            );
                        }
                    }
                    Some(LookupTable::Interpolation(_)) => {}
                }
            }
            Rule::Condition(condition) => {
                for branch in condition.branches() {
                    self.check_condition(scope, &branch.condition, location);
                    self.check_rules(scope, &branch.rules, location);
                }
                if let Some(rules) = &condition.else_rules {
                    self.check_rules(scope, rules, &location.with("else"));
                }
            }
            Rule::Fragment(rules) => self.check_rules(scope, rules, location),
            Rule::ExitTest | Rule::ExitResponse => {}
        }
    }

    /// The declaration a set/lookup rule writes to, if it is a declared
    /// outcome of the scope.
    fn outcome_target<'s>(
        &mut self,
        scope: Scope<'s>,
        identifier: &Identifier,
        location: &Location,
    ) -> Option<&'s VariableDeclaration> {
        let declaration = match scope {
            Scope::Item(item) => item.declaration(identifier),
            Scope::Test(test) => test.outcome_declaration(identifier),
        }
        .filter(|d| d.kind == VariableKind::Outcome);
        if declaration.is_none() {
            self.error(
                ErrorCode::UNDECLARED_OUTCOME,
                format!("'{identifier}' is not a declared outcome variable"),
                location.clone(),
            );
        }
        declaration
    }

    fn check_condition(&mut self, scope: Scope<'_>, expression: &Expression, location: &Location) {
        self.check_expression(scope, expression, location);
        let found = infer_base_type(expression, &|r| base_type_of(scope, r));
        if let Some(found) = found.filter(|bt| *bt != BaseType::Boolean) {
            self.error(
                ErrorCode::TYPE_MISMATCH,
                format!("condition must be boolean, found {found}"),
                location.clone(),
            );
        }
    }

    fn check_expression(&mut self, scope: Scope<'_>, expression: &Expression, location: &Location) {
        let mut references = Vec::new();
        expression.walk(&mut |e| match e {
            Expression::Variable(r) => references.push(r.clone()),
            Expression::Default(id) => references.push(VariableRef::Local(id.clone())),
            _ => {}
        });
        for reference in references {
            self.check_reference(scope, &reference, location);
        }
    }

    fn check_reference(&mut self, scope: Scope<'_>, reference: &VariableRef, location: &Location) {
        match (scope, reference) {
            (Scope::Item(item), VariableRef::Local(name)) => {
                if item.declaration(name).is_none() && !is_item_builtin(name) {
                    self.undeclared(reference, location);
                }
            }
            (Scope::Item(_), VariableRef::ItemVariable { .. }) => self.error(
                ErrorCode::DOTTED_REFERENCE_IN_ITEM,
                format!("items cannot use the dotted reference '{reference}'"),
                location.clone(),
            ),
            (Scope::Test(test), VariableRef::Local(name)) => {
                if test.outcome_declaration(name).is_none() && name.as_str() != DURATION {
                    self.undeclared(reference, location);
                }
            }
            (Scope::Test(test), VariableRef::ItemVariable { item_ref, variable }) => {
                let is_item_ref = test
                    .lookup(item_ref)
                    .is_some_and(|c| test.control(c).kind.is_item_ref());
                if !is_item_ref {
                    self.error(
                        ErrorCode::UNKNOWN_ITEM_REF,
                        format!("'{reference}' names unknown item ref '{item_ref}'"),
                        location.clone(),
                    );
                    return;
                }
                let item = self.items.and_then(|items| items.item(item_ref));
                if let Some(item) = item {
                    if item.declaration(variable).is_none() && !is_item_builtin(variable) {
                        self.error(
                            ErrorCode::UNDECLARED_ITEM_VARIABLE,
                            format!("item '{}' declares no variable '{variable}'", item.identifier),
                            location.clone(),
                        );
                    }
                }
            }
        }
    }

    fn undeclared(&mut self, reference: &VariableRef, location: &Location) {
        self.error(
            ErrorCode::UNDECLARED_VARIABLE,
            format!("variable '{reference}' is not declared"),
            location.clone(),
        );
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    fn error(&mut self, code: ErrorCode, message: String, location: Location) {
        self.report.push_error(Diagnostic::error(code, message, location));
    }

    fn warning(&mut self, code: ErrorCode, message: String, location: Location) {
        self.report.push_warning(Diagnostic::warning(code, message, location));
    }
}

fn is_item_builtin(name: &Identifier) -> bool {
    matches!(name.as_str(), NUM_ATTEMPTS | COMPLETION_STATUS | DURATION)
}

/// Declared base type of a reference within `scope`. Dotted references are
/// left unknown.
fn base_type_of(scope: Scope<'_>, reference: &VariableRef) -> Option<BaseType> {
    let VariableRef::Local(name) = reference else {
        return None;
    };
    let declaration = match scope {
        Scope::Item(item) => item.declaration(name),
        Scope::Test(test) => test.outcome_declaration(name),
    };
    match declaration {
        Some(d) => d.base_type,
        None => match name.as_str() {
            NUM_ATTEMPTS => Some(BaseType::Integer),
            COMPLETION_STATUS => Some(BaseType::Identifier),
            DURATION => Some(BaseType::Duration),
            _ => None,
        },
    }
}

/// A control whose identifier differs from `name` only in case.
fn similar_control<'t>(test: &'t AssessmentTest, name: &Identifier) -> Option<&'t Identifier> {
    test.pre_order()
        .into_iter()
        .map(|c| &test.control(c).identifier)
        .find(|candidate| candidate.as_str().eq_ignore_ascii_case(name.as_str()))
}
