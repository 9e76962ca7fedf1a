//! Runtime error types for the rule interpreter.

use qti_types::{Identifier, TypeError, VariableRef};
use thiserror::Error;

/// Fatal evaluation fault.
///
/// These mean the content (or the data fed to it) is inconsistent with its
/// own declarations. Exiting a test or response is not an error; see
/// [`ProcessingSignal`](crate::ProcessingSignal).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// An operator received a value of the wrong shape or base type.
    #[error("type mismatch: {0}")]
    Type(#[from] TypeError),
    /// A value could not be stored in a variable of the declared shape.
    #[error("cannot assign to '{identifier}': {source}")]
    Assignment {
        identifier: Identifier,
        source: TypeError,
    },
    #[error("variable '{0}' is not declared")]
    UndeclaredVariable(VariableRef),
    #[error("'{0}' is not a declared outcome variable")]
    UndeclaredOutcome(Identifier),
    #[error("outcome '{0}' has no lookup table")]
    MissingLookupTable(Identifier),
    #[error("item ref '{0}' cannot be resolved")]
    UnresolvedItemRef(Identifier),
    /// Items may only use local references.
    #[error("reference '{0}' crosses into another item; only tests may do that")]
    DottedReferenceInItem(VariableRef),
    /// Test-level aggregate used during item response processing.
    #[error("'{0}' is only available in test outcome processing")]
    TestOnlyExpression(&'static str),
    #[error("gas exhausted after {0} evaluation steps")]
    GasExhausted(u64),
}

/// Result alias for interpreter operations.
pub type EvalResult<T> = Result<T, EvalError>;
