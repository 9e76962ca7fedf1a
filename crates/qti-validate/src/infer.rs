//! Static base-type inference over expression trees.
//!
//! `None` means the type cannot be known without evaluating: Null
//! literals, record fields, undeclared variables and mixed operands.

use qti_types::{BaseType, Expression, VariableRef};

/// Infer the base type `expression` evaluates to, if it is known statically.
///
/// `scope` gives the declared base type of a variable reference.
pub fn infer_base_type(
    expression: &Expression,
    scope: &dyn Fn(&VariableRef) -> Option<BaseType>,
) -> Option<BaseType> {
    let infer = |e: &Expression| infer_base_type(e, scope);
    match expression {
        Expression::BaseValue(v) => Some(v.base_type()),
        Expression::Variable(r) => scope(r),
        Expression::Default(id) => scope(&VariableRef::Local(id.clone())),
        Expression::Null | Expression::FieldValue { .. } => None,

        Expression::Multiple(items) | Expression::Ordered(items) => {
            items.iter().find_map(|e| infer(e))
        }
        Expression::Index { expression, .. } => infer(&**expression),
        Expression::Delete(_, container) => infer(&**container),

        Expression::Sum(items) | Expression::Product(items) => {
            numeric(items.iter().map(|e| infer(e)))
        }
        Expression::Subtract(a, b) => numeric([infer(&**a), infer(&**b)].into_iter()),

        Expression::Divide(..) | Expression::Power(..) | Expression::IntegerToFloat(_) => {
            Some(BaseType::Float)
        }
        Expression::IntegerDivide(..)
        | Expression::IntegerModulus(..)
        | Expression::Round(_)
        | Expression::Truncate(_)
        | Expression::ContainerSize(_)
        | Expression::NumberSelected(_)
        | Expression::NumberPresented(_)
        | Expression::NumberResponded(_) => Some(BaseType::Integer),

        Expression::IsNull(_)
        | Expression::Lt(..)
        | Expression::Lte(..)
        | Expression::Gt(..)
        | Expression::Gte(..)
        | Expression::Equal { .. }
        | Expression::DurationLt(..)
        | Expression::DurationGte(..)
        | Expression::And(_)
        | Expression::Or(_)
        | Expression::Not(_)
        | Expression::Match(..)
        | Expression::Member(..)
        | Expression::Contains(..)
        | Expression::StringMatch { .. } => Some(BaseType::Boolean),

        Expression::TestVariables {
            base_type, weight, ..
        } => {
            if weight.is_some() {
                Some(BaseType::Float)
            } else {
                *base_type
            }
        }
    }
}

/// Integer when every operand is known Integer, Float when any is Float.
fn numeric(operands: impl Iterator<Item = Option<BaseType>>) -> Option<BaseType> {
    let mut all_integer = true;
    for operand in operands {
        match operand {
            Some(BaseType::Float) => return Some(BaseType::Float),
            Some(BaseType::Integer) => {}
            _ => all_integer = false,
        }
    }
    all_integer.then_some(BaseType::Integer)
}

/// Whether a value of base type `found` may be stored in a variable
/// declared with base type `declared`.
pub fn assignable(found: BaseType, declared: BaseType) -> bool {
    found == declared
        || matches!(
            (found, declared),
            (BaseType::Integer, BaseType::Float)
                | (BaseType::Integer | BaseType::Identifier, BaseType::IntOrIdentifier)
        )
}
