use qti_types::{ControlId, Identifier};
use std::fmt;

/// Stable index of a node in a [`FlowGraph`](crate::FlowGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowNodeId(pub(crate) u32);

impl FlowNodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FlowNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a flow node stands for. Jump nodes name their rule by owner and
/// position in the owner's rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowNodeKind {
    Start(ControlId),
    End(ControlId),
    ItemRef(ControlId),
    PreCondition { owner: ControlId, index: usize },
    BranchRule { owner: ControlId, index: usize },
}

impl FlowNodeKind {
    pub fn owner(self) -> ControlId {
        match self {
            Self::Start(c) | Self::End(c) | Self::ItemRef(c) => c,
            Self::PreCondition { owner, .. } | Self::BranchRule { owner, .. } => owner,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Self::PreCondition { .. } | Self::BranchRule { .. })
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::End(_) => "end",
            Self::ItemRef(_) => "itemRef",
            Self::PreCondition { .. } => "preCondition",
            Self::BranchRule { .. } => "branchRule",
        }
    }
}

/// A node of the linearised flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub kind: FlowNodeKind,
    /// Identifier of the owning control, for display.
    pub label: Identifier,
    pub prev: Option<FlowNodeId>,
    pub next: Option<FlowNodeId>,
    /// Structural jump target; only set on jump nodes.
    pub target: Option<FlowNodeId>,
}

impl fmt::Display for FlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FlowNodeKind::PreCondition { index, .. } | FlowNodeKind::BranchRule { index, .. } => {
                write!(f, "{} {}[{}]", self.kind.tag(), self.label, index)?;
            }
            _ => write!(f, "{} {}", self.kind.tag(), self.label)?,
        }
        if let Some(target) = self.target {
            write!(f, " -> {target}")?;
        }
        Ok(())
    }
}
