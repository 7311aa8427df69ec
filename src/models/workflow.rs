// Workflow — the collection of nodes for one doctype, with a begin state
// and an active flag
//
//! Exactly one workflow may be active per doctype at event-application time
//! (spec §3, §4.8); inactive workflows may still be listed and rewired. The
//! engine enforces the active-per-doctype invariant at the point an event is
//! applied, not at the point a workflow is (de)activated, so that admins can
//! stage a replacement workflow before cutting over.

use serde::{Deserialize, Serialize};

use super::ids::{DocStateId, DocTypeId, WorkflowId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub doctype_id: DocTypeId,
    pub begin_state_id: DocStateId,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_carries_its_begin_state() {
        let w = Workflow {
            id: WorkflowId(1),
            name: "rfq-approval".into(),
            doctype_id: DocTypeId(1),
            begin_state_id: DocStateId(1),
            active: true,
        };
        assert_eq!(w.begin_state_id, DocStateId(1));
    }
}
