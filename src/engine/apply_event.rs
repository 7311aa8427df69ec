// ApplyEvent — the core operation (spec §4.5)
//
//! Runs the ten-step precondition pipeline in order, aborting on the first
//! failure, then performs every post-success write inside the same
//! transaction: document state update, applied-event insert, message
//! insert, and one mailbox row per distinct recipient group. Exactly-once
//! semantics per `(doctype, doc_id, from_state, action)` come from the
//! redundancy check plus the uniqueness constraint the store enforces on
//! insert (spec invariant I-2) — the check-then-insert here narrows the
//! window but the store is the final arbiter under concurrent callers.
//!
//! **Join accounting.** A `joinall`/`joinany` node's predecessor set (spec
//! §4.3) is recorded against the *target* node of the transition — the
//! node at the converged state — not the node the event originates from.
//! Firing a predecessor's own (ordinary) transition always records the
//! applied event and notification, but only advances the document's
//! `current_state` once every configured predecessor has contributed since
//! the join last fired (`joinall`) or immediately on first arrival
//! (`joinany`). This resolves an ambiguity the distilled spec leaves open
//! (see `DESIGN.md`).

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::engine::handlers::{HandlerContext, HandlerRegistry};
use crate::engine::store::Store;
use crate::models::*;
use crate::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct ApplyEventRequest {
    pub doctype_id: DocTypeId,
    pub doc_id: DocumentId,
    pub from_state_id: DocStateId,
    pub docaction_id: DocActionId,
    pub user_id: UserId,
    pub recipients: Vec<GroupId>,
}

#[derive(Debug, Clone)]
pub struct ApplyEventOutcome {
    pub new_state: DocStateId,
    pub fired: bool,
    pub event: DocEvent,
    pub message: Message,
    pub mailboxes: Vec<MailboxRow>,
}

pub async fn apply_event<S: Store>(
    store: &S,
    registry: &HandlerRegistry,
    req: ApplyEventRequest,
) -> Result<ApplyEventOutcome> {
    if req.recipients.is_empty() {
        return Err(EngineError::MessageNoRecipients);
    }

    debug!(doctype_id = req.doctype_id.get(), doc_id = req.doc_id.get(), action = req.docaction_id.get(), "applying event");

    let mut tx = store.begin().await?;
    match run(store, &mut tx, registry, &req).await {
        Ok(outcome) => {
            store.commit(tx).await?;
            debug!(doc_id = req.doc_id.get(), new_state = outcome.new_state.get(), fired = outcome.fired, "event applied");
            Ok(outcome)
        }
        Err(e) => {
            store.rollback(tx).await?;
            warn!(doc_id = req.doc_id.get(), error = %e, "event rejected");
            Err(e)
        }
    }
}

async fn run<S: Store>(
    store: &S,
    tx: &mut S::Tx,
    registry: &HandlerRegistry,
    req: &ApplyEventRequest,
) -> Result<ApplyEventOutcome> {
    // 1. Workflow must exist for this doctype and be active.
    let workflows = store.list_workflows(Some(tx)).await?;
    let workflow = workflows
        .into_iter()
        .find(|w| w.doctype_id == req.doctype_id)
        .ok_or(EngineError::WorkflowInactive)?;
    if !workflow.active {
        return Err(EngineError::WorkflowInactive);
    }

    // 4. The originating group is always the user's singleton group — the
    // engine never accepts a group-originated event.
    let group_id = store
        .singleton_group_of(Some(tx), req.user_id)
        .await?
        .ok_or_else(|| EngineError::InvalidInput(format!("user {} has no singleton group", req.user_id)))?;

    // 5. Resolve the node governing the document's current state.
    let source_node = store
        .get_node_by_workflow_state(Some(tx), workflow.id, req.from_state_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("node for state {}", req.from_state_id)))?;

    // 6. Document's current state must match event.from_state.
    let document = store
        .get_document(Some(tx), req.doctype_id, req.doc_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("document {}/{}", req.doctype_id, req.doc_id)))?;
    if document.current_state_id != req.from_state_id {
        return Err(EngineError::EventStateMismatch);
    }

    // 7. Authorization.
    let authorized = store
        .effective_permission(Some(tx), source_node.access_context_id, req.user_id, req.doctype_id, req.docaction_id)
        .await?;
    if !authorized {
        return Err(EngineError::Unauthorized);
    }

    // 9 (early half). End nodes accept no outgoing events at all.
    if !source_node.node_type.accepts_events() {
        return Err(EngineError::WorkflowInvalidAction);
    }

    // 8. Transition must be defined.
    let default_next = store
        .get_transition(Some(tx), req.doctype_id, req.from_state_id, req.docaction_id)
        .await?
        .map(|t| t.to_state_id)
        .ok_or(EngineError::WorkflowInvalidAction)?;

    // Redundancy: at-most-once per (doctype, doc_id, from_state, action).
    if store.event_is_redundant(Some(tx), req.doctype_id, req.doc_id, req.from_state_id, req.docaction_id).await? {
        return Err(EngineError::EventRedundant);
    }

    let allowed_next_states: Vec<DocStateId> = store
        .list_transitions(Some(tx), req.doctype_id)
        .await?
        .into_iter()
        .filter(|t| t.from_state_id == req.from_state_id)
        .map(|t| t.to_state_id)
        .collect();

    // 10. Invoke the node handler.
    let handler = registry.get(workflow.id, req.from_state_id)?;
    let outcome = handler
        .handle(HandlerContext {
            document: document.clone(),
            docaction_id: req.docaction_id,
            default_next_state: default_next,
            allowed_next_states: allowed_next_states.clone(),
        })
        .await?;
    if !allowed_next_states.contains(&outcome.next_state) {
        return Err(EngineError::WorkflowInvalidAction);
    }
    let next_state = outcome.next_state;

    // Join accounting lives on the target node, the one at the converged
    // state, not the node this event departs from.
    let target_node = store
        .get_node_by_workflow_state(Some(tx), workflow.id, next_state)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("node for state {next_state}")))?;

    let fired = match target_node.node_type {
        NodeType::JoinAll => {
            store.record_join_progress(Some(tx), target_node.id, req.doc_id, req.from_state_id).await?;
            let progress = store.join_progress(Some(tx), target_node.id, req.doc_id).await?;
            let satisfied = target_node.joinall_satisfied(&progress);
            if satisfied {
                store.clear_join_progress(Some(tx), target_node.id, req.doc_id).await?;
            }
            satisfied
        }
        NodeType::JoinAny => {
            store.clear_join_progress(Some(tx), target_node.id, req.doc_id).await?;
            true
        }
        _ => true,
    };

    if fired {
        store.update_document_state(Some(tx), req.doctype_id, req.doc_id, next_state, None).await?;
    }

    // Insert the applied event unconditionally — its own (from_state,
    // action) key is consumed regardless of whether the join fired.
    let event = store
        .insert_applied_event(
            Some(tx),
            DocEvent {
                id: DocEventId(0),
                doctype_id: req.doctype_id,
                doc_id: req.doc_id,
                from_state_id: req.from_state_id,
                docaction_id: req.docaction_id,
                user_id: req.user_id,
                group_id,
                ctime: now(),
                status: EventStatus::Applied,
            },
        )
        .await?;

    let message = store.insert_message(Some(tx), req.doctype_id, req.doc_id, event.id, outcome.message).await?;

    let mut mailboxes = Vec::new();
    let distinct_recipients: HashSet<GroupId> = req.recipients.iter().copied().collect();
    for group in distinct_recipients {
        mailboxes.push(store.insert_mailbox_row(Some(tx), group, message.id).await?);
    }

    Ok(ApplyEventOutcome { new_state: if fired { next_state } else { req.from_state_id }, fired, event, message, mailboxes })
}

/// Wall-clock event timestamp. The only place this crate reaches for
/// ambient time — handlers themselves must stay deterministic (spec §4.6).
fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handlers::DefaultHandler;
    use crate::engine::memory_store::MemoryStore;
    use std::sync::Arc;

    struct Fixture {
        store: MemoryStore,
        registry: HandlerRegistry,
        doctype_id: DocTypeId,
        draft: DocStateId,
        pending: DocStateId,
        approved: DocStateId,
        submit: DocActionId,
        approve: DocActionId,
        user_id: UserId,
        group_id: GroupId,
        workflow_id: WorkflowId,
        doc_id: DocumentId,
    }

    async fn setup() -> Fixture {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let pending = store.create_docstate(None, doctype.id, "pending").await.unwrap();
        let approved = store.create_docstate(None, doctype.id, "approved").await.unwrap();
        let submit = store.create_docaction(None, "submit").await.unwrap();
        let approve = store.create_docaction(None, "approve").await.unwrap();

        store.add_transition(None, doctype.id, draft.id, submit.id, pending.id).await.unwrap();
        store.add_transition(None, doctype.id, pending.id, approve.id, approved.id).await.unwrap();

        let ac = store.create_access_context(None, "C1").await.unwrap();
        let user = User { id: UserId(0), first_name: "Ada".into(), last_name: "Lovelace".into(), email: "a@b.com".into(), active: true };
        let (user, group_id) = store.create_user(None, user).await.unwrap();

        let role = store.create_role(None, "submitter-approver").await.unwrap();
        store.add_role_permission(None, role.id, doctype.id, submit.id).await.unwrap();
        store.add_role_permission(None, role.id, doctype.id, approve.id).await.unwrap();
        store.add_group_role(None, ac.id, group_id, role.id).await.unwrap();

        let workflow = store.create_workflow(None, "rfq-flow", doctype.id, draft.id).await.unwrap();
        store.set_workflow_active(None, workflow.id, true).await.unwrap();

        for (state, name) in [(draft.id, "draft-node"), (pending.id, "pending-node"), (approved.id, "approved-node")] {
            crate::engine::nodes::add_node(&store, workflow.id, doctype.id, state, ac.id, name, NodeType::Linear)
                .await
                .unwrap();
        }

        let mut registry = HandlerRegistry::new();
        registry.register(workflow.id, draft.id, Arc::new(DefaultHandler { title: "submitted".into() }));
        registry.register(workflow.id, pending.id, Arc::new(DefaultHandler { title: "approved".into() }));

        let doc = crate::engine::documents::new(
            &store, doctype.id, user.id, ac.id, Some("RFQ #1".into()), serde_json::Value::Null, None,
        )
        .await
        .unwrap();

        Fixture {
            store,
            registry,
            doctype_id: doctype.id,
            draft: draft.id,
            pending: pending.id,
            approved: approved.id,
            submit: submit.id,
            approve: approve.id,
            user_id: user.id,
            group_id,
            workflow_id: workflow.id,
            doc_id: doc.id,
        }
    }

    #[tokio::test]
    async fn s1_create_and_approve() {
        let f = setup().await;

        let outcome = apply_event(
            &f.store,
            &f.registry,
            ApplyEventRequest {
                doctype_id: f.doctype_id,
                doc_id: f.doc_id,
                from_state_id: f.draft,
                docaction_id: f.submit,
                user_id: f.user_id,
                recipients: vec![f.group_id],
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.new_state, f.pending);
        assert_eq!(outcome.mailboxes.len(), 1);

        let group2 = f.store.create_group(None, "g2", GroupType::General).await.unwrap();
        let outcome = apply_event(
            &f.store,
            &f.registry,
            ApplyEventRequest {
                doctype_id: f.doctype_id,
                doc_id: f.doc_id,
                from_state_id: f.pending,
                docaction_id: f.approve,
                user_id: f.user_id,
                recipients: vec![f.group_id, group2.id],
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.new_state, f.approved);
        assert_eq!(outcome.mailboxes.len(), 2);
    }

    #[tokio::test]
    async fn s2_redundant_event_fails() {
        let f = setup().await;
        let req = |from, action| ApplyEventRequest {
            doctype_id: f.doctype_id,
            doc_id: f.doc_id,
            from_state_id: from,
            docaction_id: action,
            user_id: f.user_id,
            recipients: vec![f.group_id],
        };
        apply_event(&f.store, &f.registry, req(f.draft, f.submit)).await.unwrap();
        apply_event(&f.store, &f.registry, req(f.pending, f.approve)).await.unwrap();

        let result = apply_event(&f.store, &f.registry, req(f.pending, f.approve)).await;
        assert!(matches!(result, Err(EngineError::EventRedundant)));
    }

    #[tokio::test]
    async fn s3_unauthorized_user_is_rejected() {
        let f = setup().await;
        let other = User { id: UserId(0), first_name: "Bob".into(), last_name: "Smith".into(), email: "b@c.com".into(), active: true };
        let (other, _) = f.store.create_user(None, other).await.unwrap();

        let result = apply_event(
            &f.store,
            &f.registry,
            ApplyEventRequest {
                doctype_id: f.doctype_id,
                doc_id: f.doc_id,
                from_state_id: f.draft,
                docaction_id: f.submit,
                user_id: other.id,
                recipients: vec![f.group_id],
            },
        )
        .await;
        assert!(matches!(result, Err(EngineError::Unauthorized)));
    }

    #[tokio::test]
    async fn s4_inactive_workflow_rejects_every_event() {
        let f = setup().await;
        f.store.set_workflow_active(None, f.workflow_id, false).await.unwrap();

        let result = apply_event(
            &f.store,
            &f.registry,
            ApplyEventRequest {
                doctype_id: f.doctype_id,
                doc_id: f.doc_id,
                from_state_id: f.draft,
                docaction_id: f.submit,
                user_id: f.user_id,
                recipients: vec![f.group_id],
            },
        )
        .await;
        assert!(matches!(result, Err(EngineError::WorkflowInactive)));
    }

    #[tokio::test]
    async fn no_recipients_is_rejected_before_any_write() {
        let f = setup().await;
        let result = apply_event(
            &f.store,
            &f.registry,
            ApplyEventRequest {
                doctype_id: f.doctype_id,
                doc_id: f.doc_id,
                from_state_id: f.draft,
                docaction_id: f.submit,
                user_id: f.user_id,
                recipients: vec![],
            },
        )
        .await;
        assert!(matches!(result, Err(EngineError::MessageNoRecipients)));
    }

    #[tokio::test]
    async fn joinall_fires_only_once_every_predecessor_has_arrived() {
        let store = MemoryStore::new();
        let doctype = store.create_doctype(None, "PUR").await.unwrap();
        let begin = store.create_docstate(None, doctype.id, "begin").await.unwrap();
        let legal = store.create_docstate(None, doctype.id, "legal-approved").await.unwrap();
        let finance = store.create_docstate(None, doctype.id, "finance-approved").await.unwrap();
        let ready = store.create_docstate(None, doctype.id, "ready").await.unwrap();
        let to_legal = store.create_docaction(None, "route-legal").await.unwrap();
        let to_finance = store.create_docaction(None, "route-finance").await.unwrap();
        let sign_off = store.create_docaction(None, "sign-off").await.unwrap();

        store.add_transition(None, doctype.id, begin.id, to_legal.id, legal.id).await.unwrap();
        store.add_transition(None, doctype.id, legal.id, sign_off.id, ready.id).await.unwrap();
        store.add_transition(None, doctype.id, finance.id, sign_off.id, ready.id).await.unwrap();

        let ac = store.create_access_context(None, "C1").await.unwrap();
        let user = User { id: UserId(0), first_name: "A".into(), last_name: "B".into(), email: "a@b.com".into(), active: true };
        let (user, group_id) = store.create_user(None, user).await.unwrap();
        let role = store.create_role(None, "r").await.unwrap();
        for action in [to_legal.id, to_finance.id, sign_off.id] {
            store.add_role_permission(None, role.id, doctype.id, action).await.unwrap();
        }
        store.add_group_role(None, ac.id, group_id, role.id).await.unwrap();

        let workflow = store.create_workflow(None, "procurement", doctype.id, begin.id).await.unwrap();
        store.set_workflow_active(None, workflow.id, true).await.unwrap();

        crate::engine::nodes::add_node(&store, workflow.id, doctype.id, begin.id, ac.id, "begin", NodeType::Begin).await.unwrap();
        crate::engine::nodes::add_node(&store, workflow.id, doctype.id, legal.id, ac.id, "legal", NodeType::Linear).await.unwrap();
        crate::engine::nodes::add_node(&store, workflow.id, doctype.id, finance.id, ac.id, "finance", NodeType::Linear).await.unwrap();
        crate::engine::nodes::add_node(&store, workflow.id, doctype.id, ready.id, ac.id, "ready-join", NodeType::JoinAll).await.unwrap();

        let mut registry = HandlerRegistry::new();
        registry.register(workflow.id, legal.id, Arc::new(DefaultHandler { title: "legal-signed".into() }));
        registry.register(workflow.id, finance.id, Arc::new(DefaultHandler { title: "finance-signed".into() }));

        // The document is placed directly at `legal` and `finance` in turn
        // to exercise each predecessor branch independently — representing
        // a document whose parallel sub-processes are tracked externally.
        let doc = crate::engine::documents::new(&store, doctype.id, user.id, ac.id, Some("PO #1".into()), serde_json::Value::Null, None)
            .await
            .unwrap();
        store.update_document_state(None, doctype.id, doc.id, legal.id, None).await.unwrap();

        let outcome = apply_event(
            &store,
            &registry,
            ApplyEventRequest {
                doctype_id: doctype.id,
                doc_id: doc.id,
                from_state_id: legal.id,
                docaction_id: sign_off.id,
                user_id: user.id,
                recipients: vec![group_id],
            },
        )
        .await
        .unwrap();
        assert!(!outcome.fired);
        assert_eq!(outcome.new_state, legal.id);

        store.update_document_state(None, doctype.id, doc.id, finance.id, None).await.unwrap();

        let outcome = apply_event(
            &store,
            &registry,
            ApplyEventRequest {
                doctype_id: doctype.id,
                doc_id: doc.id,
                from_state_id: finance.id,
                docaction_id: sign_off.id,
                user_id: user.id,
                recipients: vec![group_id],
            },
        )
        .await
        .unwrap();
        assert!(outcome.fired);
        assert_eq!(outcome.new_state, ready.id);
    }
}
