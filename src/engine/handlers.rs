// Node handler contract and registry
//
//! A handler is the one piece of caller-supplied logic the engine invokes
//! mid-pipeline (spec §4.6): given the document, the action being applied,
//! and the transition's default next state, it decides the actual outgoing
//! state (needed for `branch` nodes, where the action alone doesn't pick
//! one) and produces the notification payload. Handlers must not touch
//! persistent state or ambient clocks/randomness themselves — the engine
//! owns every write, and a handler is expected to behave identically on a
//! crash-retry of the same event.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::*;
use crate::{EngineError, Result};

/// The inputs a handler needs to decide an outgoing state and compose a
/// message — everything it's given, with nothing held back for it to
/// fetch itself (keeping it pure and testable in isolation).
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub document: Document,
    pub docaction_id: DocActionId,
    pub default_next_state: DocStateId,
    /// Every outgoing state the transition map allows from this node's
    /// `from_state` via this action — a `branch` handler's choice must be
    /// a member of this set.
    pub allowed_next_states: Vec<DocStateId>,
}

#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub next_state: DocStateId,
    pub message: MessagePayload,
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome>;
}

/// The simplest legal handler: always takes the transition's default next
/// state, with a boilerplate message. Useful for `linear` nodes and as a
/// registry fallback in tests.
pub struct DefaultHandler {
    pub title: String,
}

#[async_trait]
impl NodeHandler for DefaultHandler {
    async fn handle(&self, ctx: HandlerContext) -> Result<HandlerOutcome> {
        Ok(HandlerOutcome {
            next_state: ctx.default_next_state,
            message: MessagePayload { title: self.title.clone(), body: String::new() },
        })
    }
}

/// Handlers keyed by `(workflow_id, from_state_id)` — §4.6's "registered at
/// workflow-assembly time." Looking up a state with no registered handler
/// is `HandlerMissing`, not a silent default.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<(i64, i64), Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow_id: WorkflowId, from_state_id: DocStateId, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert((workflow_id.get(), from_state_id.get()), handler);
    }

    pub fn get(&self, workflow_id: WorkflowId, from_state_id: DocStateId) -> Result<Arc<dyn NodeHandler>> {
        self.handlers
            .get(&(workflow_id.get(), from_state_id.get()))
            .cloned()
            .ok_or(EngineError::HandlerMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc() -> Document {
        Document {
            id: DocumentId(1),
            doctype_id: DocTypeId(1),
            current_state_id: DocStateId(1),
            current_ac_id: AccessContextId(1),
            originating_ac_id: AccessContextId(1),
            owner_user_id: UserId(1),
            ctime: Utc::now(),
            title: Some("t".into()),
            body: serde_json::Value::Null,
            parent: None,
        }
    }

    #[tokio::test]
    async fn missing_handler_is_rejected() {
        let registry = HandlerRegistry::new();
        assert!(matches!(registry.get(WorkflowId(1), DocStateId(1)), Err(EngineError::HandlerMissing)));
    }

    #[tokio::test]
    async fn default_handler_takes_the_default_next_state() {
        let mut registry = HandlerRegistry::new();
        registry.register(WorkflowId(1), DocStateId(1), Arc::new(DefaultHandler { title: "submitted".into() }));
        let handler = registry.get(WorkflowId(1), DocStateId(1)).unwrap();

        let ctx = HandlerContext {
            document: doc(),
            docaction_id: DocActionId(1),
            default_next_state: DocStateId(2),
            allowed_next_states: vec![DocStateId(2)],
        };
        let outcome = handler.handle(ctx).await.unwrap();
        assert_eq!(outcome.next_state, DocStateId(2));
        assert_eq!(outcome.message.title, "submitted");
    }
}
