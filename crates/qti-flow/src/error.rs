use qti_eval::EvalError;
use qti_types::{BranchTarget, Identifier};
use thiserror::Error;

/// Item-flow failures: structural defects found while building the graph,
/// and caller misuse during navigation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("branch rule on '{owner}' targets unknown control '{target}'")]
    UnknownTarget {
        owner: Identifier,
        target: Identifier,
    },
    #[error("branch rule on '{owner}' uses {target} outside any such scope")]
    UnresolvableSpecialTarget {
        owner: Identifier,
        target: BranchTarget,
    },
    #[error("no node after {kind} on '{owner}' matches its target")]
    TargetNotFound {
        owner: Identifier,
        kind: &'static str,
    },
    #[error("cannot leave unfinished item '{0}'")]
    UnfinishedItem(Identifier),
    #[error("item '{0}' is already finished")]
    AlreadyFinished(Identifier),
    #[error("item '{0}' may not be skipped")]
    SkippingNotAllowed(Identifier),
    #[error("'{0}' is not an item ref of this test")]
    NotAnItemRef(Identifier),
    #[error("condition evaluation failed: {0}")]
    Condition(#[from] EvalError),
}

pub type FlowResult<T> = Result<T, FlowError>;
