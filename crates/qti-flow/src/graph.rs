//! Item-flow graph builder.
//!
//! The control tree is flattened into one doubly-linked node sequence:
//! `start`, preconditions, the item ref or the children, branch rules,
//! `end`. A second pass gives every jump node its structural target.
//! Which edge a jump actually takes is decided later, by the navigator.

use crate::error::{FlowError, FlowResult};
use crate::node::{FlowNode, FlowNodeId, FlowNodeKind};
use qti_types::{AssessmentTest, BranchTarget, ControlId};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// The linearised flow of one assessment test.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
}

impl FlowGraph {
    pub fn start(&self) -> FlowNodeId {
        FlowNodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: FlowNodeId) -> &FlowNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (FlowNodeId, &FlowNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (FlowNodeId(i as u32), n))
    }

    /// The node presenting `item_ref`, if it is an item ref of this test.
    pub fn item_node(&self, item_ref: ControlId) -> Option<FlowNodeId> {
        self.nodes()
            .find(|(_, n)| n.kind == FlowNodeKind::ItemRef(item_ref))
            .map(|(id, _)| id)
    }

    /// SHA-256 over node kinds, owners and resolved targets.
    ///
    /// Equal fingerprints mean isomorphic graphs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (id, node) in self.nodes() {
            hasher.update(id.0.to_le_bytes());
            hasher.update(node.kind.tag().as_bytes());
            hasher.update(node.label.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update((node.kind.owner().index() as u32).to_le_bytes());
            if let FlowNodeKind::PreCondition { index, .. } | FlowNodeKind::BranchRule { index, .. } =
                node.kind
            {
                hasher.update((index as u32).to_le_bytes());
            }
            match node.target {
                Some(t) => hasher.update(t.0.to_le_bytes()),
                None => hasher.update(u32::MAX.to_le_bytes()),
            }
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, node) in self.nodes() {
            writeln!(f, "{id:>4}  {node}")?;
        }
        Ok(())
    }
}

/// Build the item flow of `test`.
///
/// Fails when a branch-rule target names no control, when a special target
/// has no enclosing scope, or when no node after a jump matches its target.
pub fn build_item_flow(test: &AssessmentTest) -> FlowResult<FlowGraph> {
    let mut builder = Builder {
        test,
        nodes: Vec::with_capacity(test.len() * 3),
    };
    builder.emit_control(test.root());
    builder.resolve_targets()?;

    let graph = FlowGraph {
        nodes: builder.nodes,
    };
    debug!(test = %test.identifier(), nodes = graph.len(), "item flow created");
    for (id, node) in graph.nodes() {
        debug!("{id:>4}  {node}");
    }
    Ok(graph)
}

struct Builder<'a> {
    test: &'a AssessmentTest,
    nodes: Vec<FlowNode>,
}

impl<'a> Builder<'a> {
    fn push(&mut self, kind: FlowNodeKind) {
        let id = FlowNodeId(self.nodes.len() as u32);
        let prev = self.nodes.len().checked_sub(1).map(|i| FlowNodeId(i as u32));
        if let Some(p) = prev {
            self.nodes[p.index()].next = Some(id);
        }
        self.nodes.push(FlowNode {
            kind,
            label: self.test.control(kind.owner()).identifier.clone(),
            prev,
            next: None,
            target: None,
        });
    }

    // ── Skeleton pass ──────────────────────────────────────────────────────

    fn emit_control(&mut self, id: ControlId) {
        let test = self.test;
        let control = test.control(id);
        self.push(FlowNodeKind::Start(id));
        for index in 0..control.pre_conditions.len() {
            self.push(FlowNodeKind::PreCondition { owner: id, index });
        }
        if control.kind.is_item_ref() {
            self.push(FlowNodeKind::ItemRef(id));
        } else {
            for &child in &control.children {
                self.emit_control(child);
            }
        }
        for index in 0..control.branch_rules.len() {
            self.push(FlowNodeKind::BranchRule { owner: id, index });
        }
        self.push(FlowNodeKind::End(id));
    }

    // ── Target resolution pass ─────────────────────────────────────────────

    fn resolve_targets(&mut self) -> FlowResult<()> {
        for i in 0..self.nodes.len() {
            let from = FlowNodeId(i as u32);
            let target = match self.nodes[i].kind {
                FlowNodeKind::PreCondition { owner, .. } => {
                    let found = self.scan_forward(from, |kind| kind == FlowNodeKind::End(owner));
                    Some(found.ok_or_else(|| self.not_found(owner, "preCondition"))?)
                }
                FlowNodeKind::BranchRule { owner, index } => {
                    Some(self.branch_target(from, owner, index)?)
                }
                _ => None,
            };
            self.nodes[i].target = target;
        }
        Ok(())
    }

    fn branch_target(
        &self,
        from: FlowNodeId,
        owner: ControlId,
        index: usize,
    ) -> FlowResult<FlowNodeId> {
        let rule = &self.test.control(owner).branch_rules[index];
        let found = match &rule.target {
            BranchTarget::Control(identifier) => {
                let target = self.test.lookup(identifier).ok_or_else(|| FlowError::UnknownTarget {
                    owner: self.test.control(owner).identifier.clone(),
                    target: identifier.clone(),
                })?;
                self.scan_forward(from, |kind| kind == FlowNodeKind::Start(target))
            }
            special => {
                let scope = match special {
                    BranchTarget::ExitTest => Some(self.test.root()),
                    BranchTarget::ExitTestPart => self.test.parent_test_part(owner),
                    _ => self.test.parent_section(owner),
                }
                .ok_or_else(|| FlowError::UnresolvableSpecialTarget {
                    owner: self.test.control(owner).identifier.clone(),
                    target: special.clone(),
                })?;
                self.scan_forward(from, |kind| match kind {
                    FlowNodeKind::BranchRule { owner: o, .. } | FlowNodeKind::End(o) => o == scope,
                    _ => false,
                })
            }
        };
        found.ok_or_else(|| self.not_found(owner, "branchRule"))
    }

    /// First node strictly after `from`, up to and including the tail,
    /// whose kind satisfies `accept`.
    fn scan_forward(
        &self,
        from: FlowNodeId,
        accept: impl Fn(FlowNodeKind) -> bool,
    ) -> Option<FlowNodeId> {
        let mut node = self.nodes[from.index()].next;
        while let Some(id) = node {
            if accept(self.nodes[id.index()].kind) {
                return Some(id);
            }
            node = self.nodes[id.index()].next;
        }
        None
    }

    fn not_found(&self, owner: ControlId, kind: &'static str) -> FlowError {
        FlowError::TargetNotFound {
            owner: self.test.control(owner).identifier.clone(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qti_types::{Expression, Identifier, NavigationMode, SubmissionMode};

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn tags(graph: &FlowGraph) -> Vec<String> {
        graph
            .nodes()
            .map(|(_, n)| format!("{}:{}", n.kind.tag(), n.label))
            .collect()
    }

    #[test]
    fn test_skeleton_order() {
        let mut test = AssessmentTest::new(id("T"));
        let part = test.add_test_part(id("P"), NavigationMode::Linear, SubmissionMode::Individual);
        let item = test.add_item_ref(part, id("I"), "i.xml");
        test.add_pre_condition(item, Expression::boolean(true));
        test.add_branch_rule(part, BranchTarget::ExitTest, Expression::boolean(true));

        let graph = build_item_flow(&test).unwrap();
        assert_eq!(
            tags(&graph),
            [
                "start:T",
                "start:P",
                "start:I",
                "preCondition:I",
                "itemRef:I",
                "end:I",
                "branchRule:P",
                "end:P",
                "end:T",
            ]
        );
    }

    #[test]
    fn test_links_are_doubly_connected() {
        let mut test = AssessmentTest::new(id("T"));
        let part = test.add_test_part(id("P"), NavigationMode::Linear, SubmissionMode::Individual);
        test.add_item_ref(part, id("I1"), "i1.xml");
        test.add_item_ref(part, id("I2"), "i2.xml");
        let graph = build_item_flow(&test).unwrap();
        for (node_id, node) in graph.nodes() {
            if let Some(next) = node.next {
                assert_eq!(graph.node(next).prev, Some(node_id));
            }
        }
        assert_eq!(graph.node(graph.start()).prev, None);
    }

    #[test]
    fn test_precondition_targets_owner_end() {
        let mut test = AssessmentTest::new(id("T"));
        let part = test.add_test_part(id("P"), NavigationMode::Linear, SubmissionMode::Individual);
        let item = test.add_item_ref(part, id("I"), "i.xml");
        test.add_pre_condition(item, Expression::boolean(false));
        let graph = build_item_flow(&test).unwrap();
        let (_, jump) = graph
            .nodes()
            .find(|(_, n)| n.kind.is_jump())
            .unwrap();
        assert_eq!(graph.node(jump.target.unwrap()).kind, FlowNodeKind::End(item));
    }

    #[test]
    fn test_display_lists_one_node_per_line() {
        let mut test = AssessmentTest::new(id("T"));
        let part = test.add_test_part(id("P"), NavigationMode::Linear, SubmissionMode::Individual);
        test.add_item_ref(part, id("I"), "i.xml");
        let graph = build_item_flow(&test).unwrap();
        let text = graph.to_string();
        assert_eq!(text.lines().count(), graph.len());
        assert!(text.contains("itemRef I"));
    }
}
