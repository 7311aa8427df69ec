// Workflow registry — New/Get/GetByName/GetByDocType/List/Rename/SetActive
//
//! One workflow owns a doctype's set of nodes; at most one workflow per
//! doctype is active at event-application time (spec §4.8, §3). Admins may
//! stage a replacement workflow inactive and only flip `SetActive` once
//! it's fully wired — `set_workflow_active` enforces the invariant
//! transactionally on activation rather than at every write to the node
//! set.

use crate::engine::store::Store;
use crate::models::*;
use crate::{EngineError, Result};

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(EngineError::EmptyName);
    }
    Ok(())
}

pub async fn new<S: Store>(store: &S, name: &str, doctype_id: DocTypeId, begin_state_id: DocStateId) -> Result<Workflow> {
    require_name(name)?;
    if store.get_docstate(None, begin_state_id).await?.is_none() {
        return Err(EngineError::NotFound(format!("docstate {begin_state_id}")));
    }
    store.create_workflow(None, name, doctype_id, begin_state_id).await
}

pub async fn get<S: Store>(store: &S, id: WorkflowId) -> Result<Workflow> {
    store.get_workflow(None, id).await?.ok_or_else(|| EngineError::NotFound(format!("workflow {id}")))
}

pub async fn get_by_name<S: Store>(store: &S, name: &str) -> Result<Workflow> {
    store
        .get_workflow_by_name(None, name)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("workflow '{name}'")))
}

pub async fn get_by_doctype<S: Store>(store: &S, doctype_id: DocTypeId) -> Result<Workflow> {
    store
        .get_active_workflow_by_doctype(None, doctype_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("active workflow for doctype {doctype_id}")))
}

pub async fn list<S: Store>(store: &S) -> Result<Vec<Workflow>> {
    store.list_workflows(None).await
}

pub async fn rename<S: Store>(store: &S, id: WorkflowId, name: &str) -> Result<()> {
    require_name(name)?;
    store.rename_workflow(None, id, name).await
}

pub async fn set_active<S: Store>(store: &S, id: WorkflowId, active: bool) -> Result<()> {
    store.set_workflow_active(None, id, active).await
}

pub use crate::engine::nodes::add_node;

pub async fn remove_node<S: Store>(store: &S, node_id: NodeId) -> Result<()> {
    store.remove_node(None, node_id).await
}

pub async fn list_nodes<S: Store>(store: &S, workflow_id: WorkflowId) -> Result<Vec<Node>> {
    store.list_nodes(None, workflow_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_store::MemoryStore;

    #[tokio::test]
    async fn activating_a_workflow_deactivates_its_siblings() {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();

        let w1 = new(&store, "v1", doctype.id, draft.id).await.unwrap();
        let w2 = new(&store, "v2", doctype.id, draft.id).await.unwrap();

        set_active(&store, w1.id, true).await.unwrap();
        assert!(get(&store, w1.id).await.unwrap().active);

        set_active(&store, w2.id, true).await.unwrap();
        assert!(!get(&store, w1.id).await.unwrap().active);
        assert!(get(&store, w2.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let result = new(&store, "  ", doctype.id, draft.id).await;
        assert!(matches!(result, Err(EngineError::EmptyName)));
    }
}
