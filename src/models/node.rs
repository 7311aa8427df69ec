// Node typology — binding (doctype, from_state) to a workflow, access
// context, type and handler
//
//! A node is where the state graph meets authorization and execution: it
//! says *which* access context gates leaving this state, *what shape* of
//! transition is allowed (linear / branch / join...), and (via the handler
//! registry in `engine::handlers`) *what code* runs when an event fires.
//! Exactly one node exists per `(doctype, from_state)` per workflow (§3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{AccessContextId, DocStateId, DocTypeId, NodeId, WorkflowId};

/// Governs incoming/outgoing arity and the completion rule (spec §4.3
/// table). Persisted as a short string in the `workflow_nodes.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NodeType {
    /// 0 incoming, 1 outgoing — fires on document creation.
    Begin,
    /// 1 incoming, 0 outgoing — terminal, accepts no events.
    End,
    /// 1 incoming, 1 outgoing — one action, one next state.
    Linear,
    /// 1 incoming, ≥2 outgoing — the action chooses which next state.
    Branch,
    /// ≥2 incoming, 1 outgoing — the first applied predecessor event fires it.
    JoinAny,
    /// ≥2 incoming, 1 outgoing — fires only once every predecessor state has
    /// contributed an applied event since the join last fired.
    JoinAll,
}

impl NodeType {
    /// Whether this node type ever accepts an outgoing event at all.
    pub fn accepts_events(&self) -> bool {
        !matches!(self, NodeType::End)
    }

    /// Whether this node type requires join accounting (§4.3) before it
    /// allows its outgoing transition to fire.
    pub fn is_join(&self) -> bool {
        matches!(self, NodeType::JoinAny | NodeType::JoinAll)
    }
}

/// Binds `(doctype, from_state)` to `(workflow, access_context, type,
/// predecessors)`. `predecessors` is the configured incoming-edge set used
/// for join accounting (SPEC_FULL §4.3): the `from_state`s of every
/// transition whose `to_state` is this node's `from_state`. It is computed
/// once at `AddNode` time and is empty for non-join node types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub workflow_id: WorkflowId,
    pub doctype_id: DocTypeId,
    pub from_state_id: DocStateId,
    pub access_context_id: AccessContextId,
    pub name: String,
    pub node_type: NodeType,
    pub predecessors: BTreeSet<DocStateId>,
}

impl Node {
    /// A `joinall` node's outgoing transition may fire once `applied`
    /// contains every configured predecessor state.
    pub fn joinall_satisfied(&self, applied: &BTreeSet<DocStateId>) -> bool {
        matches!(self.node_type, NodeType::JoinAll) && self.predecessors.is_subset(applied)
            && !self.predecessors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(node_type: NodeType, predecessors: &[i64]) -> Node {
        Node {
            id: NodeId(1),
            workflow_id: WorkflowId(1),
            doctype_id: DocTypeId(1),
            from_state_id: DocStateId(10),
            access_context_id: AccessContextId(1),
            name: "n".into(),
            node_type,
            predecessors: predecessors.iter().map(|v| DocStateId(*v)).collect(),
        }
    }

    #[test]
    fn end_node_accepts_no_events() {
        assert!(!node(NodeType::End, &[]).node_type.accepts_events());
        assert!(node(NodeType::Linear, &[]).node_type.accepts_events());
    }

    #[test]
    fn joinall_requires_every_predecessor() {
        let n = node(NodeType::JoinAll, &[1, 2, 3]);
        let mut applied: BTreeSet<DocStateId> = [1, 2].iter().map(|v| DocStateId(*v)).collect();
        assert!(!n.joinall_satisfied(&applied));
        applied.insert(DocStateId(3));
        assert!(n.joinall_satisfied(&applied));
    }

    #[test]
    fn joinall_with_extra_applied_states_still_satisfied() {
        let n = node(NodeType::JoinAll, &[1, 2]);
        let applied: BTreeSet<DocStateId> = [1, 2, 99].iter().map(|v| DocStateId(*v)).collect();
        assert!(n.joinall_satisfied(&applied));
    }
}
