//! QTI processing-rule interpreter.
//!
//! Evaluates expression trees and processing rules against typed variable
//! stores, including lookup-table mapping, with null propagation, strict
//! numeric typing and a per-run step budget.

pub mod error;
pub mod evaluator;
pub mod interpreter;
pub mod lookup;
pub mod ops;
pub mod store;

pub use error::{EvalError, EvalResult};
pub use evaluator::{Evaluator, DEFAULT_GAS_LIMIT};
pub use interpreter::{InterruptReason, Interpreter, ProcessingSignal};
pub use store::{ItemResolver, NoItems, VariableStore};
