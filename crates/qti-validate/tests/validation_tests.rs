//! Integration tests for the validation engine.
//!
//! Covers every emitted error code (E100–E505):
//! - identifier uniqueness and reserved names
//! - declaration types, defaults and lookup tables
//! - branch rules, preconditions, time limits and tree shape
//! - variable references in item and test scope
//! - report capping and JSON serialization

use qti_types::{
    AssessmentItem, AssessmentTest, BaseType, BranchTarget, Cardinality, ConditionRule,
    ControlId, ErrorCode, Expression, Identifier, InterpolationTable, LookupTable, MatchTable,
    NavigationMode, Rule, Severity, SingleValue, SubmissionMode, TimeLimit, ValidationReport,
    Value, VariableDeclaration, VariableKind,
};
use qti_validate::{validate, validate_item, validate_test, Document};
use std::collections::BTreeMap;
use std::time::Duration;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn id(s: &str) -> Identifier {
    Identifier::new(s).expect("valid identifier")
}

fn outcome(name: &str, base_type: BaseType) -> VariableDeclaration {
    VariableDeclaration::outcome(id(name), Cardinality::Single, base_type)
}

/// `T > P (linear, individual) > [S1 > I1, S2 > I2]`, outcome `SCORE: float`.
struct Fixture {
    test: AssessmentTest,
    part: ControlId,
    s1: ControlId,
    s2: ControlId,
    i1: ControlId,
    i2: ControlId,
}

fn fixture() -> Fixture {
    let mut test = AssessmentTest::new(id("T"));
    test.outcome_declarations.push(outcome("SCORE", BaseType::Float));
    let part = test.add_test_part(id("P"), NavigationMode::Linear, SubmissionMode::Individual);
    let s1 = test.add_section(part, id("S1"));
    let i1 = test.add_item_ref(s1, id("I1"), "i1.xml");
    let s2 = test.add_section(part, id("S2"));
    let i2 = test.add_item_ref(s2, id("I2"), "i2.xml");
    Fixture {
        test,
        part,
        s1,
        s2,
        i1,
        i2,
    }
}

fn check(test: &AssessmentTest) -> ValidationReport {
    validate(Document::Test(test))
}

fn codes(report: &ValidationReport) -> Vec<String> {
    report
        .errors
        .iter()
        .chain(report.warnings.iter())
        .map(|d| format!("{}: {}", d.code, d.message))
        .collect()
}

fn assert_code(report: &ValidationReport, code: ErrorCode) {
    assert!(
        !report.with_code(code).is_empty(),
        "expected {code}, got: {:?}",
        codes(report)
    );
}

fn assert_no_code(report: &ValidationReport, code: ErrorCode) {
    assert!(
        report.with_code(code).is_empty(),
        "unexpected {code}: {:?}",
        codes(report)
    );
}

fn scored_item(name: &str) -> AssessmentItem {
    AssessmentItem::new(id(name))
        .with_declaration(VariableDeclaration::response(
            id("RESPONSE"),
            Cardinality::Single,
            BaseType::Identifier,
        ))
        .with_declaration(outcome("SCORE", BaseType::Float))
}

// ══════════════════════════════════════════════════════════════════════════════
// Clean documents
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn valid_test_is_clean() {
    let mut f = fixture();
    f.test.outcome_processing = vec![Rule::set(id("SCORE"), Expression::float(1.0))];
    let report = check(&f.test);
    assert!(report.is_clean(), "{:?}", codes(&report));
}

#[test]
fn valid_item_is_clean() {
    let item = scored_item("ITEM").with_rules(vec![Rule::Condition(
        ConditionRule::new(
            Expression::matches(
                Expression::var(id("RESPONSE")),
                Expression::identifier(id("A")),
            ),
            vec![Rule::set(id("SCORE"), Expression::int(1))],
        )
        .otherwise(vec![Rule::set(id("SCORE"), Expression::float(0.0))]),
    )]);
    let report = validate(Document::Item(&item));
    assert!(report.is_clean(), "{:?}", codes(&report));
}

// ══════════════════════════════════════════════════════════════════════════════
// E100–E101: identifiers
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn e100_duplicate_sibling_sections() {
    let build = |second: &str| {
        let mut test = AssessmentTest::new(id("T"));
        let part = test.add_test_part(id("P"), NavigationMode::Linear, SubmissionMode::Individual);
        let a = test.add_section(part, id("Q1"));
        test.add_item_ref(a, id("I1"), "i1.xml");
        let b = test.add_section(part, id(second));
        test.add_item_ref(b, id("I2"), "i2.xml");
        test
    };

    let report = check(&build("Q1"));
    assert_eq!(report.with_code(ErrorCode::DUPLICATE_IDENTIFIER).len(), 1);
    let duplicate = report.with_code(ErrorCode::DUPLICATE_IDENTIFIER)[0];
    assert_eq!(duplicate.severity, Severity::Error);
    assert!(duplicate.message.contains("'Q1'"));

    let report = check(&build("Q2"));
    assert!(report.with_code(ErrorCode::DUPLICATE_IDENTIFIER).is_empty());
}

#[test]
fn e100_outcome_colliding_with_control() {
    let mut f = fixture();
    f.test.outcome_declarations.push(outcome("I1", BaseType::Integer));
    assert_code(&check(&f.test), ErrorCode::DUPLICATE_IDENTIFIER);
}

#[test]
fn e100_duplicate_item_declaration() {
    let item = scored_item("ITEM").with_declaration(outcome("SCORE", BaseType::Integer));
    assert_code(&validate_item(&item, 50), ErrorCode::DUPLICATE_IDENTIFIER);
}

#[test]
fn e101_reserved_identifier() {
    let mut f = fixture();
    f.test.add_section(f.part, id("EXIT_TEST"));
    let report = check(&f.test);
    assert_code(&report, ErrorCode::RESERVED_IDENTIFIER);
    assert!(report.with_code(ErrorCode::RESERVED_IDENTIFIER)[0]
        .suggestion
        .is_some());
}

// ══════════════════════════════════════════════════════════════════════════════
// E200–E202: types
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn e200_set_outcome_with_wrong_type() {
    let mut f = fixture();
    f.test.outcome_processing = vec![Rule::set(id("SCORE"), Expression::string("high"))];
    assert_code(&check(&f.test), ErrorCode::TYPE_MISMATCH);
}

#[test]
fn e200_integer_widens_to_float() {
    let mut f = fixture();
    f.test.outcome_processing = vec![Rule::set(
        id("SCORE"),
        Expression::sum(vec![Expression::int(1), Expression::int(2)]),
    )];
    assert_no_code(&check(&f.test), ErrorCode::TYPE_MISMATCH);
}

#[test]
fn e200_non_boolean_condition() {
    let mut f = fixture();
    f.test.add_pre_condition(f.i1, Expression::int(1));
    assert_code(&check(&f.test), ErrorCode::TYPE_MISMATCH);
}

#[test]
fn e201_invalid_default_value() {
    let mut f = fixture();
    f.test
        .outcome_declarations
        .push(outcome("GRADE", BaseType::Integer).with_default(Value::string("A")));
    assert_code(&check(&f.test), ErrorCode::INVALID_DEFAULT_VALUE);
}

#[test]
fn e202_missing_base_type() {
    let mut f = fixture();
    f.test.outcome_declarations.push(VariableDeclaration::new(
        id("BARE"),
        VariableKind::Outcome,
        Cardinality::Single,
        None,
    ));
    assert_code(&check(&f.test), ErrorCode::MISSING_BASE_TYPE);

    let mut g = fixture();
    g.test.outcome_declarations.push(VariableDeclaration::new(
        id("REC"),
        VariableKind::Outcome,
        Cardinality::Record,
        None,
    ));
    assert_no_code(&check(&g.test), ErrorCode::MISSING_BASE_TYPE);
}

// ══════════════════════════════════════════════════════════════════════════════
// E300–E305: lookup tables
// ══════════════════════════════════════════════════════════════════════════════

fn grade_table() -> LookupTable {
    LookupTable::Match(
        MatchTable::default()
            .entry(1, SingleValue::String("A".into()))
            .entry(2, SingleValue::String("B".into())),
    )
}

#[test]
fn e300_lookup_on_multiple_cardinality() {
    let mut f = fixture();
    f.test.outcome_declarations.push(
        VariableDeclaration::outcome(id("GRADE"), Cardinality::Multiple, BaseType::String)
            .with_lookup_table(grade_table()),
    );
    assert_code(&check(&f.test), ErrorCode::LOOKUP_NOT_SINGLE);
}

#[test]
fn e301_match_table_with_float_source() {
    let mut f = fixture();
    f.test
        .outcome_declarations
        .push(outcome("GRADE", BaseType::String).with_lookup_table(grade_table()));
    f.test.outcome_processing = vec![Rule::lookup(id("GRADE"), Expression::var(id("SCORE")))];
    assert_code(&check(&f.test), ErrorCode::MATCH_TABLE_NOT_INTEGER);

    f.test.outcome_processing = vec![Rule::lookup(id("GRADE"), Expression::int(2))];
    assert_no_code(&check(&f.test), ErrorCode::MATCH_TABLE_NOT_INTEGER);
}

#[test]
fn e302_lookup_target_of_wrong_type() {
    let mut f = fixture();
    f.test
        .outcome_declarations
        .push(outcome("GRADE", BaseType::Integer).with_lookup_table(grade_table()));
    assert_code(&check(&f.test), ErrorCode::LOOKUP_TARGET_TYPE);
}

#[test]
fn e303_interpolation_not_descending_is_warning() {
    let mut f = fixture();
    f.test.outcome_declarations.push(
        outcome("BAND", BaseType::String).with_lookup_table(LookupTable::Interpolation(
            InterpolationTable::default()
                .entry(0.0, false, SingleValue::String("Low".into()))
                .entry(10.0, true, SingleValue::String("High".into())),
        )),
    );
    let report = check(&f.test);
    assert_code(&report, ErrorCode::INTERPOLATION_ORDER);
    assert!(!report.has_errors(), "{:?}", codes(&report));
}

#[test]
fn e304_duplicate_source_value() {
    let mut f = fixture();
    f.test.outcome_declarations.push(
        outcome("GRADE", BaseType::String).with_lookup_table(LookupTable::Match(
            MatchTable::default()
                .entry(1, SingleValue::String("A".into()))
                .entry(1, SingleValue::String("B".into())),
        )),
    );
    let report = check(&f.test);
    assert_code(&report, ErrorCode::DUPLICATE_SOURCE_VALUE);
    assert!(!report.has_errors());
}

#[test]
fn e305_lookup_without_table() {
    let mut f = fixture();
    f.test.outcome_processing = vec![Rule::lookup(id("SCORE"), Expression::int(1))];
    assert_code(&check(&f.test), ErrorCode::MISSING_LOOKUP_TABLE);
}

// ══════════════════════════════════════════════════════════════════════════════
// E400–E409: flow
// ══════════════════════════════════════════════════════════════════════════════

fn branch(test: &mut AssessmentTest, owner: ControlId, target: &str) {
    test.add_branch_rule(
        owner,
        BranchTarget::from_identifier(id(target)),
        Expression::boolean(true),
    );
}

#[test]
fn e400_unknown_branch_target_with_suggestion() {
    let mut f = fixture();
    branch(&mut f.test, f.i1, "i2");
    let report = check(&f.test);
    let found = report.with_code(ErrorCode::UNKNOWN_BRANCH_TARGET);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].suggestion.as_deref(), Some("did you mean 'I2'?"));
}

#[test]
fn e401_backward_and_self_jumps() {
    let mut f = fixture();
    branch(&mut f.test, f.i2, "I1");
    assert_code(&check(&f.test), ErrorCode::BACKWARD_JUMP);

    let mut g = fixture();
    branch(&mut g.test, g.i1, "I1");
    assert_code(&check(&g.test), ErrorCode::BACKWARD_JUMP);
}

#[test]
fn e401_forward_jump_is_accepted() {
    let mut f = fixture();
    branch(&mut f.test, f.i1, "I2");
    branch(&mut f.test, f.s1, "S2");
    let report = check(&f.test);
    assert!(!report.has_errors(), "{:?}", codes(&report));
}

#[test]
fn e402_jump_into_own_child() {
    let mut f = fixture();
    branch(&mut f.test, f.s1, "I1");
    assert_code(&check(&f.test), ErrorCode::JUMP_INTO_CHILD);
}

#[test]
fn e403_jump_across_test_parts() {
    let mut f = fixture();
    let p2 = f
        .test
        .add_test_part(id("P2"), NavigationMode::Linear, SubmissionMode::Individual);
    f.test.add_item_ref(p2, id("I3"), "i3.xml");

    branch(&mut f.test, f.i1, "I3");
    assert_code(&check(&f.test), ErrorCode::INVALID_JUMP_SCOPE);

    let mut g = fixture();
    let p2 = g
        .test
        .add_test_part(id("P2"), NavigationMode::Linear, SubmissionMode::Individual);
    g.test.add_item_ref(p2, id("I3"), "i3.xml");
    branch(&mut g.test, g.part, "I3");
    assert_code(&check(&g.test), ErrorCode::INVALID_JUMP_SCOPE);
}

#[test]
fn e403_test_part_to_test_part_is_accepted() {
    let mut f = fixture();
    let p2 = f
        .test
        .add_test_part(id("P2"), NavigationMode::Linear, SubmissionMode::Individual);
    f.test.add_item_ref(p2, id("I3"), "i3.xml");
    branch(&mut f.test, f.part, "P2");
    let report = check(&f.test);
    assert!(!report.has_errors(), "{:?}", codes(&report));
}

#[test]
fn e404_invalid_special_targets() {
    let mut f = fixture();
    branch(&mut f.test, f.part, "EXIT_TESTPART");
    assert_code(&check(&f.test), ErrorCode::INVALID_SPECIAL_TARGET);

    let mut g = fixture();
    branch(&mut g.test, g.s1, "EXIT_SECTION");
    assert_code(&check(&g.test), ErrorCode::INVALID_SPECIAL_TARGET);

    let mut h = fixture();
    branch(&mut h.test, h.i1, "EXIT_SECTION");
    branch(&mut h.test, h.i2, "EXIT_TESTPART");
    branch(&mut h.test, h.s2, "EXIT_TEST");
    let report = check(&h.test);
    assert!(!report.has_errors(), "{:?}", codes(&report));
}

#[test]
fn e405_jumps_in_nonlinear_part_are_warnings() {
    let mut test = AssessmentTest::new(id("T"));
    let part = test.add_test_part(id("P"), NavigationMode::Nonlinear, SubmissionMode::Individual);
    let i1 = test.add_item_ref(part, id("I1"), "i1.xml");
    test.add_pre_condition(i1, Expression::boolean(true));
    test.add_branch_rule(i1, BranchTarget::Control(id("NOWHERE")), Expression::boolean(true));

    let report = check(&test);
    assert_eq!(report.with_code(ErrorCode::IGNORED_JUMP).len(), 2);
    assert_no_code(&report, ErrorCode::UNKNOWN_BRANCH_TARGET);
    assert!(!report.has_errors(), "{:?}", codes(&report));
}

#[test]
fn e406_min_time_exceeds_max_time() {
    let mut f = fixture();
    f.test.set_time_limit(
        f.s1,
        TimeLimit {
            min: Some(Duration::from_secs(60)),
            max: Some(Duration::from_secs(30)),
        },
    );
    assert_code(&check(&f.test), ErrorCode::INVALID_TIME_LIMIT);
}

#[test]
fn e407_empty_test_part_and_test() {
    let mut f = fixture();
    f.test
        .add_test_part(id("P2"), NavigationMode::Linear, SubmissionMode::Individual);
    assert_code(&check(&f.test), ErrorCode::EMPTY_TEST_PART);

    let empty = AssessmentTest::new(id("T"));
    assert_code(&check(&empty), ErrorCode::EMPTY_TEST_PART);
}

#[test]
fn e408_empty_section_is_warning() {
    let mut f = fixture();
    f.test.add_section(f.s2, id("S3"));
    let report = check(&f.test);
    assert_code(&report, ErrorCode::EMPTY_SECTION);
    assert!(!report.has_errors());
}

#[test]
fn e409_misplaced_controls() {
    let mut f = fixture();
    let root = f.test.root();
    f.test.add_section(root, id("LOOSE"));
    assert_code(&check(&f.test), ErrorCode::MISPLACED_CONTROL);

    let mut g = fixture();
    g.test.add_item_ref(g.i2, id("NESTED"), "n.xml");
    assert_code(&check(&g.test), ErrorCode::MISPLACED_CONTROL);
}

// ══════════════════════════════════════════════════════════════════════════════
// E500–E505: references
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn e500_undeclared_variable() {
    let mut f = fixture();
    f.test.outcome_processing = vec![Rule::set(
        id("SCORE"),
        Expression::sum(vec![Expression::var(id("MISSING"))]),
    )];
    assert_code(&check(&f.test), ErrorCode::UNDECLARED_VARIABLE);

    let item = scored_item("ITEM").with_rules(vec![Rule::set(
        id("SCORE"),
        Expression::var(id("numAttempts")),
    )]);
    assert_no_code(&validate_item(&item, 50), ErrorCode::UNDECLARED_VARIABLE);
}

#[test]
fn e501_dotted_reference_in_item() {
    let item = scored_item("ITEM").with_rules(vec![Rule::set(
        id("SCORE"),
        Expression::item_var(id("OTHER"), id("SCORE")),
    )]);
    assert_code(&validate_item(&item, 50), ErrorCode::DOTTED_REFERENCE_IN_ITEM);
}

#[test]
fn e502_dotted_reference_to_unknown_item_ref() {
    let mut f = fixture();
    f.test.outcome_processing = vec![Rule::set(
        id("SCORE"),
        Expression::item_var(id("S1"), id("SCORE")),
    )];
    assert_code(&check(&f.test), ErrorCode::UNKNOWN_ITEM_REF);
}

#[test]
fn e503_and_e505_checked_against_resolved_items() {
    let mut f = fixture();
    f.test.outcome_processing = vec![
        Rule::set(id("SCORE"), Expression::item_var(id("I1"), id("SCORE"))),
        Rule::set(id("SCORE"), Expression::item_var(id("I1"), id("BONUS"))),
        Rule::set(id("SCORE"), Expression::item_var(id("I1"), id("numAttempts"))),
    ];
    let mut items = BTreeMap::new();
    items.insert(id("I1"), scored_item("ITEM1"));

    let report = validate_test(&f.test, Some(&items), 50);
    let undeclared = report.with_code(ErrorCode::UNDECLARED_ITEM_VARIABLE);
    assert_eq!(undeclared.len(), 1, "{:?}", codes(&report));
    assert!(undeclared[0].message.contains("BONUS"));

    let unresolved = report.with_code(ErrorCode::UNRESOLVED_ITEM);
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].severity, Severity::Warning);
    assert!(unresolved[0].message.contains("I2"));
}

#[test]
fn e504_undeclared_outcome_target() {
    let mut f = fixture();
    f.test.outcome_processing = vec![Rule::set(id("TOTAL"), Expression::float(1.0))];
    assert_code(&check(&f.test), ErrorCode::UNDECLARED_OUTCOME);

    let item = scored_item("ITEM").with_rules(vec![Rule::set(
        id("RESPONSE"),
        Expression::identifier(id("A")),
    )]);
    assert_code(&validate_item(&item, 50), ErrorCode::UNDECLARED_OUTCOME);
}

// ══════════════════════════════════════════════════════════════════════════════
// Report
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn report_caps_stored_errors() {
    let mut test = AssessmentTest::new(id("T"));
    let part = test.add_test_part(id("P"), NavigationMode::Linear, SubmissionMode::Individual);
    for _ in 0..5 {
        test.add_item_ref(part, id("DUP"), "dup.xml");
    }
    let report = validate_test(&test, None, 2);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.total_errors, 4);
}

#[test]
fn diagnostics_carry_locations() {
    let mut f = fixture();
    branch(&mut f.test, f.i2, "I1");
    let report = check(&f.test);
    let diagnostic = report.with_code(ErrorCode::BACKWARD_JUMP)[0];
    assert_eq!(
        diagnostic.location.to_string(),
        "assessmentTest[T]/testPart[P]/assessmentSection[S2]/assessmentItemRef[I2]/branchRule[0]"
    );
}

#[test]
fn report_serializes_to_json() {
    let mut f = fixture();
    branch(&mut f.test, f.i2, "I1");
    let report = check(&f.test);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["total_errors"], 1);
    assert_eq!(json["errors"][0]["code"], 401);
    assert_eq!(json["errors"][0]["severity"], "error");
    assert_eq!(json["errors"][0]["category"], "flow");
}

#[test]
fn validation_is_deterministic() {
    let mut f = fixture();
    branch(&mut f.test, f.i2, "I1");
    f.test.add_section(f.part, id("S1"));
    let first = codes(&check(&f.test));
    for _ in 0..100 {
        assert_eq!(codes(&check(&f.test)), first);
    }
}
