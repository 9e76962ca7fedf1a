//! QTI item flow.
//!
//! Linearises an assessment test's control tree into a graph of start,
//! end, item-ref and jump nodes, and navigates it forward and backward
//! under the test part's navigation and submission modes, honouring
//! preconditions, branch rules, review settings and time limits.

pub mod clock;
pub mod error;
pub mod graph;
pub mod navigator;
pub mod node;
pub mod time_record;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{FlowError, FlowResult};
pub use graph::{build_item_flow, FlowGraph};
pub use navigator::{ConditionEvaluator, ItemState, NavigationState, Navigator};
pub use node::{FlowNode, FlowNodeId, FlowNodeKind};
pub use time_record::TimeRecord;
