//! Expression and processing-rule trees.
//!
//! Both are closed sum types; the interpreter evaluates them with a single
//! exhaustive `match`.

use crate::{BaseType, Identifier, SingleValue, VariableRef};

/// Item refs selected by a test-level aggregate expression.
///
/// An item ref is in the subset when it sits inside `section` (if given),
/// carries at least one of `include_categories` (if non-empty) and none of
/// `exclude_categories`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSubset {
    pub section: Option<Identifier>,
    pub include_categories: Vec<Identifier>,
    pub exclude_categories: Vec<Identifier>,
}

impl ItemSubset {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_section(section: Identifier) -> Self {
        Self {
            section: Some(section),
            ..Self::default()
        }
    }

    pub fn including(mut self, category: Identifier) -> Self {
        self.include_categories.push(category);
        self
    }

    pub fn excluding(mut self, category: Identifier) -> Self {
        self.exclude_categories.push(category);
        self
    }

    /// Category filter only; the section filter needs the test structure.
    pub fn accepts_categories(&self, categories: &[Identifier]) -> bool {
        let included = self.include_categories.is_empty()
            || self
                .include_categories
                .iter()
                .any(|c| categories.contains(c));
        let excluded = self
            .exclude_categories
            .iter()
            .any(|c| categories.contains(c));
        included && !excluded
    }
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // ── Leaves ──
    BaseValue(SingleValue),
    Variable(VariableRef),
    /// Declared default of a variable.
    Default(Identifier),
    Null,

    // ── Containers ──
    Multiple(Vec<Expression>),
    Ordered(Vec<Expression>),
    IsNull(Box<Expression>),
    ContainerSize(Box<Expression>),
    /// 1-based element of an ordered container.
    Index {
        expression: Box<Expression>,
        n: usize,
    },
    FieldValue {
        expression: Box<Expression>,
        field: Identifier,
    },

    // ── Arithmetic ──
    Sum(Vec<Expression>),
    Product(Vec<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Power(Box<Expression>, Box<Expression>),
    IntegerDivide(Box<Expression>, Box<Expression>),
    IntegerModulus(Box<Expression>, Box<Expression>),
    IntegerToFloat(Box<Expression>),
    Round(Box<Expression>),
    Truncate(Box<Expression>),

    // ── Comparison ──
    Lt(Box<Expression>, Box<Expression>),
    Lte(Box<Expression>, Box<Expression>),
    Gt(Box<Expression>, Box<Expression>),
    Gte(Box<Expression>, Box<Expression>),
    /// Numeric equality with an optional absolute tolerance.
    Equal {
        left: Box<Expression>,
        right: Box<Expression>,
        tolerance: Option<f64>,
    },
    DurationLt(Box<Expression>, Box<Expression>),
    DurationGte(Box<Expression>, Box<Expression>),

    // ── Boolean ──
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),

    // ── Collections ──
    Match(Box<Expression>, Box<Expression>),
    Member(Box<Expression>, Box<Expression>),
    Contains(Box<Expression>, Box<Expression>),
    Delete(Box<Expression>, Box<Expression>),

    // ── Strings ──
    StringMatch {
        left: Box<Expression>,
        right: Box<Expression>,
        case_sensitive: bool,
    },

    // ── Test-level aggregates ──
    TestVariables {
        variable: Identifier,
        base_type: Option<BaseType>,
        weight: Option<Identifier>,
        subset: ItemSubset,
    },
    NumberSelected(ItemSubset),
    NumberPresented(ItemSubset),
    NumberResponded(ItemSubset),
}

impl Expression {
    pub fn int(i: i64) -> Self {
        Self::BaseValue(SingleValue::Integer(i))
    }

    pub fn float(f: f64) -> Self {
        Self::BaseValue(SingleValue::Float(f))
    }

    pub fn boolean(b: bool) -> Self {
        Self::BaseValue(SingleValue::Boolean(b))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::BaseValue(SingleValue::String(s.into()))
    }

    pub fn identifier(id: Identifier) -> Self {
        Self::BaseValue(SingleValue::Identifier(id))
    }

    pub fn var(identifier: Identifier) -> Self {
        Self::Variable(VariableRef::Local(identifier))
    }

    pub fn item_var(item_ref: Identifier, variable: Identifier) -> Self {
        Self::Variable(VariableRef::ItemVariable { item_ref, variable })
    }

    pub fn sum(operands: Vec<Expression>) -> Self {
        Self::Sum(operands)
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Self::And(operands)
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Self::Or(operands)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: Expression) -> Self {
        Self::Not(Box::new(operand))
    }

    pub fn lt(left: Expression, right: Expression) -> Self {
        Self::Lt(Box::new(left), Box::new(right))
    }

    pub fn gt(left: Expression, right: Expression) -> Self {
        Self::Gt(Box::new(left), Box::new(right))
    }

    pub fn gte(left: Expression, right: Expression) -> Self {
        Self::Gte(Box::new(left), Box::new(right))
    }

    pub fn equal(left: Expression, right: Expression) -> Self {
        Self::Equal {
            left: Box::new(left),
            right: Box::new(right),
            tolerance: None,
        }
    }

    pub fn matches(left: Expression, right: Expression) -> Self {
        Self::Match(Box::new(left), Box::new(right))
    }

    pub fn is_null(operand: Expression) -> Self {
        Self::IsNull(Box::new(operand))
    }

    /// QTI element name, used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BaseValue(_) => "baseValue",
            Self::Variable(_) => "variable",
            Self::Default(_) => "default",
            Self::Null => "null",
            Self::Multiple(_) => "multiple",
            Self::Ordered(_) => "ordered",
            Self::IsNull(_) => "isNull",
            Self::ContainerSize(_) => "containerSize",
            Self::Index { .. } => "index",
            Self::FieldValue { .. } => "fieldValue",
            Self::Sum(_) => "sum",
            Self::Product(_) => "product",
            Self::Subtract(..) => "subtract",
            Self::Divide(..) => "divide",
            Self::Power(..) => "power",
            Self::IntegerDivide(..) => "integerDivide",
            Self::IntegerModulus(..) => "integerModulus",
            Self::IntegerToFloat(_) => "integerToFloat",
            Self::Round(_) => "round",
            Self::Truncate(_) => "truncate",
            Self::Lt(..) => "lt",
            Self::Lte(..) => "lte",
            Self::Gt(..) => "gt",
            Self::Gte(..) => "gte",
            Self::Equal { .. } => "equal",
            Self::DurationLt(..) => "durationLT",
            Self::DurationGte(..) => "durationGTE",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Not(_) => "not",
            Self::Match(..) => "match",
            Self::Member(..) => "member",
            Self::Contains(..) => "contains",
            Self::Delete(..) => "delete",
            Self::StringMatch { .. } => "stringMatch",
            Self::TestVariables { .. } => "testVariables",
            Self::NumberSelected(_) => "numberSelected",
            Self::NumberPresented(_) => "numberPresented",
            Self::NumberResponded(_) => "numberResponded",
        }
    }

    /// Direct sub-expressions in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Self::BaseValue(_)
            | Self::Variable(_)
            | Self::Default(_)
            | Self::Null
            | Self::TestVariables { .. }
            | Self::NumberSelected(_)
            | Self::NumberPresented(_)
            | Self::NumberResponded(_) => Vec::new(),
            Self::Multiple(items)
            | Self::Ordered(items)
            | Self::Sum(items)
            | Self::Product(items)
            | Self::And(items)
            | Self::Or(items) => items.iter().collect(),
            Self::IsNull(e)
            | Self::ContainerSize(e)
            | Self::IntegerToFloat(e)
            | Self::Round(e)
            | Self::Truncate(e)
            | Self::Not(e) => vec![&**e],
            Self::Index { expression, .. } | Self::FieldValue { expression, .. } => {
                vec![&**expression]
            }
            Self::Subtract(a, b)
            | Self::Divide(a, b)
            | Self::Power(a, b)
            | Self::IntegerDivide(a, b)
            | Self::IntegerModulus(a, b)
            | Self::Lt(a, b)
            | Self::Lte(a, b)
            | Self::Gt(a, b)
            | Self::Gte(a, b)
            | Self::DurationLt(a, b)
            | Self::DurationGte(a, b)
            | Self::Match(a, b)
            | Self::Member(a, b)
            | Self::Contains(a, b)
            | Self::Delete(a, b) => vec![&**a, &**b],
            Self::Equal { left, right, .. } | Self::StringMatch { left, right, .. } => {
                vec![&**left, &**right]
            }
        }
    }

    /// Visit this expression and every descendant, pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expression)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Every variable reference in this tree, in evaluation order.
    pub fn variable_refs(&self) -> Vec<&VariableRef> {
        let mut refs = Vec::new();
        self.walk(&mut |e| {
            if let Self::Variable(r) = e {
                refs.push(r);
            }
        });
        refs
    }
}

/// One branch of a condition: `if` or `elseIf`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionBranch {
    pub condition: Expression,
    pub rules: Vec<Rule>,
}

/// `if` / `elseIf`* / `else`?
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRule {
    pub if_branch: ConditionBranch,
    pub else_ifs: Vec<ConditionBranch>,
    pub else_rules: Option<Vec<Rule>>,
}

impl ConditionRule {
    pub fn new(condition: Expression, rules: Vec<Rule>) -> Self {
        Self {
            if_branch: ConditionBranch { condition, rules },
            else_ifs: Vec::new(),
            else_rules: None,
        }
    }

    pub fn else_if(mut self, condition: Expression, rules: Vec<Rule>) -> Self {
        self.else_ifs.push(ConditionBranch { condition, rules });
        self
    }

    pub fn otherwise(mut self, rules: Vec<Rule>) -> Self {
        self.else_rules = Some(rules);
        self
    }

    /// The `if` branch followed by every `elseIf`.
    pub fn branches(&self) -> impl Iterator<Item = &ConditionBranch> {
        std::iter::once(&self.if_branch).chain(self.else_ifs.iter())
    }
}

/// A processing rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    SetOutcomeValue {
        identifier: Identifier,
        expression: Expression,
    },
    LookupOutcomeValue {
        identifier: Identifier,
        expression: Expression,
    },
    Condition(ConditionRule),
    Fragment(Vec<Rule>),
    /// Ends outcome processing and the whole test.
    ExitTest,
    /// Ends the current response processing run.
    ExitResponse,
}

impl Rule {
    pub fn set(identifier: Identifier, expression: Expression) -> Self {
        Self::SetOutcomeValue {
            identifier,
            expression,
        }
    }

    pub fn lookup(identifier: Identifier, expression: Expression) -> Self {
        Self::LookupOutcomeValue {
            identifier,
            expression,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetOutcomeValue { .. } => "setOutcomeValue",
            Self::LookupOutcomeValue { .. } => "lookupOutcomeValue",
            Self::Condition(_) => "outcomeCondition",
            Self::Fragment(_) => "outcomeProcessingFragment",
            Self::ExitTest => "exitTest",
            Self::ExitResponse => "exitResponse",
        }
    }

    /// Top-level expressions of this rule (not those of nested rules).
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            Self::SetOutcomeValue { expression, .. }
            | Self::LookupOutcomeValue { expression, .. } => vec![expression],
            Self::Condition(c) => c.branches().map(|b| &b.condition).collect(),
            Self::Fragment(_) | Self::ExitTest | Self::ExitResponse => Vec::new(),
        }
    }

    /// Directly nested rules.
    pub fn nested(&self) -> Vec<&Rule> {
        match self {
            Self::Condition(c) => {
                let mut rules: Vec<&Rule> = c.branches().flat_map(|b| b.rules.iter()).collect();
                if let Some(else_rules) = &c.else_rules {
                    rules.extend(else_rules.iter());
                }
                rules
            }
            Self::Fragment(rules) => rules.iter().collect(),
            _ => Vec::new(),
        }
    }
}
