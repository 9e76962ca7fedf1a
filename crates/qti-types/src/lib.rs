//! Shared types for the QTI delivery engine.
//!
//! This crate defines identifiers, the typed value model, variable
//! declarations and lookup tables, expression and rule trees, the
//! control-object arena of an assessment test, and the diagnostic types
//! used by validation. Every other engine crate builds on it.

mod error;
mod identifier;
mod location;
pub mod declaration;
pub mod expr;
pub mod item;
pub mod structure;
pub mod value;

pub use declaration::{
    InterpolationTable, InterpolationTableEntry, LookupTable, MatchTable, MatchTableEntry,
    VariableDeclaration, VariableKind,
};
pub use error::{Diagnostic, ErrorCategory, ErrorCode, Severity, ValidationReport, MAX_ERRORS};
pub use expr::{ConditionBranch, ConditionRule, Expression, ItemSubset, Rule};
pub use identifier::{Identifier, IdentifierError, VariableRef};
pub use item::AssessmentItem;
pub use location::Location;
pub use structure::{
    AssessmentTest, BranchRule, BranchTarget, ControlId, ControlKind, ControlObject,
    ItemSessionControl, NavigationMode, PreCondition, SubmissionMode, TimeLimit,
};
pub use value::{
    BaseType, Cardinality, FileValue, IntOrIdentifier, MultipleValue, OrderedValue, RecordValue,
    SingleValue, TypeError, Value,
};
