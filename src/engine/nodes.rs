// Node construction — computing a join node's predecessor set
//
//! SPEC_FULL §4.3 resolves an ambiguity in the distilled spec: a join
//! node's predecessor set (the `from_state`s it waits on) is computed once,
//! at `AddNode` time, from the doctype's transition table — every
//! transition whose `to_state` equals this node's `from_state` contributes
//! its own `from_state` to the set. Non-join node types get an empty set.

use std::collections::BTreeSet;

use crate::engine::store::Store;
use crate::models::*;
use crate::{EngineError, Result};

#[allow(clippy::too_many_arguments)]
pub async fn add_node<S: Store>(
    store: &S,
    workflow_id: WorkflowId,
    doctype_id: DocTypeId,
    from_state_id: DocStateId,
    access_context_id: AccessContextId,
    name: &str,
    node_type: NodeType,
) -> Result<Node> {
    if name.trim().is_empty() {
        return Err(EngineError::EmptyName);
    }

    let predecessors = if node_type.is_join() {
        compute_predecessors(store, doctype_id, from_state_id).await?
    } else {
        BTreeSet::new()
    };

    let node = Node {
        id: NodeId(0),
        workflow_id,
        doctype_id,
        from_state_id,
        access_context_id,
        name: name.to_string(),
        node_type,
        predecessors,
    };
    store.add_node(None, node).await
}

async fn compute_predecessors<S: Store>(
    store: &S,
    doctype_id: DocTypeId,
    from_state_id: DocStateId,
) -> Result<BTreeSet<DocStateId>> {
    let transitions = store.list_transitions(None, doctype_id).await?;
    Ok(transitions
        .into_iter()
        .filter(|t| t.to_state_id == from_state_id)
        .map(|t| t.from_state_id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_store::MemoryStore;

    #[tokio::test]
    async fn joinall_node_predecessors_come_from_incoming_transitions() {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "PUR").await.unwrap();
        let legal = store.create_docstate(None, doctype.id, "legal-approved").await.unwrap();
        let finance = store.create_docstate(None, doctype.id, "finance-approved").await.unwrap();
        let ready = store.create_docstate(None, doctype.id, "ready").await.unwrap();
        let sign_off = store.create_docaction(None, "sign-off").await.unwrap();

        store.add_transition(None, doctype.id, legal.id, sign_off.id, ready.id).await.unwrap();
        store.add_transition(None, doctype.id, finance.id, sign_off.id, ready.id).await.unwrap();

        let ac = store.create_access_context(None, "C1").await.unwrap();
        let workflow = store.create_workflow(None, "procurement", doctype.id, legal.id).await.unwrap();

        let node = add_node(&store, workflow.id, doctype.id, ready.id, ac.id, "ready-join", NodeType::JoinAll)
            .await
            .unwrap();

        let expected: BTreeSet<DocStateId> = [legal.id, finance.id].into_iter().collect();
        assert_eq!(node.predecessors, expected);
    }

    #[tokio::test]
    async fn linear_node_has_no_predecessor_accounting() {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "PUR").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let ac = store.create_access_context(None, "C1").await.unwrap();
        let workflow = store.create_workflow(None, "procurement", doctype.id, draft.id).await.unwrap();

        let node = add_node(&store, workflow.id, doctype.id, draft.id, ac.id, "draft-node", NodeType::Linear)
            .await
            .unwrap();
        assert!(node.predecessors.is_empty());
    }
}
