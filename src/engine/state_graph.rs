// State graph operations — the deterministic per-doctype δ function
//
//! `AddTransition` populates one edge of `δ(from_state, action) → to_state`
//! (spec §4.2); the lookup itself is exposed for `apply_event` to consult
//! without reaching into `Store` directly.

use crate::engine::store::Store;
use crate::models::*;
use crate::{EngineError, Result};

pub async fn add_transition<S: Store>(
    store: &S,
    doctype_id: DocTypeId,
    from_state_id: DocStateId,
    docaction_id: DocActionId,
    to_state_id: DocStateId,
) -> Result<Transition> {
    if store.get_docstate(None, from_state_id).await?.is_none() {
        return Err(EngineError::NotFound(format!("docstate {from_state_id}")));
    }
    if store.get_docstate(None, to_state_id).await?.is_none() {
        return Err(EngineError::NotFound(format!("docstate {to_state_id}")));
    }
    store.add_transition(None, doctype_id, from_state_id, docaction_id, to_state_id).await
}

/// `δ(from_state, action) → to_state`, or `None` when no edge exists for
/// this `(doctype, from_state, action)` — the caller maps that to
/// `WorkflowInvalidAction`.
pub async fn lookup<S: Store>(
    store: &S,
    doctype_id: DocTypeId,
    from_state_id: DocStateId,
    docaction_id: DocActionId,
) -> Result<Option<DocStateId>> {
    Ok(store
        .get_transition(None, doctype_id, from_state_id, docaction_id)
        .await?
        .map(|t| t.to_state_id))
}

pub async fn list<S: Store>(store: &S, doctype_id: DocTypeId) -> Result<Vec<Transition>> {
    store.list_transitions(None, doctype_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_store::MemoryStore;

    #[tokio::test]
    async fn lookup_returns_none_for_an_undefined_edge() {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let approve = store.create_docaction(None, "approve").await.unwrap();
        assert_eq!(lookup(&store, doctype.id, draft.id, approve.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn transition_is_resolved_after_being_added() {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let pending = store.create_docstate(None, doctype.id, "pending").await.unwrap();
        let submit = store.create_docaction(None, "submit").await.unwrap();

        add_transition(&store, doctype.id, draft.id, submit.id, pending.id).await.unwrap();
        assert_eq!(lookup(&store, doctype.id, draft.id, submit.id).await.unwrap(), Some(pending.id));
    }
}
