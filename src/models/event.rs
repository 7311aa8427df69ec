// DocEvent — the record of an action attempted against a document
//
//! Once `status = Applied` a `DocEvent` is immutable, and at most one
//! `Applied` event can exist for a given `(doctype, doc_id, from_state,
//! action)` — that uniqueness constraint is what gives `ApplyEvent`
//! exactly-once semantics (spec §4.5, invariant I-2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DocActionId, DocEventId, DocStateId, DocTypeId, DocumentId, GroupId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Applied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocEvent {
    pub id: DocEventId,
    pub doctype_id: DocTypeId,
    pub doc_id: DocumentId,
    pub from_state_id: DocStateId,
    pub docaction_id: DocActionId,
    /// The originating user. Per §4.5 precondition 4, the event's
    /// originating group (below) must be that user's singleton group — the
    /// engine refuses group-origin events.
    pub user_id: UserId,
    pub group_id: GroupId,
    pub ctime: DateTime<Utc>,
    pub status: EventStatus,
}

impl DocEvent {
    /// The key that is at-most-one among `Applied` events (spec invariant
    /// I-2 / `EventRedundant`).
    pub fn redundancy_key(&self) -> (DocTypeId, DocumentId, DocStateId, DocActionId) {
        (self.doctype_id, self.doc_id, self.from_state_id, self.docaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundancy_key_ignores_user_and_timestamp() {
        let e1 = DocEvent {
            id: DocEventId(1),
            doctype_id: DocTypeId(1),
            doc_id: DocumentId(1),
            from_state_id: DocStateId(1),
            docaction_id: DocActionId(1),
            user_id: UserId(1),
            group_id: GroupId(1),
            ctime: Utc::now(),
            status: EventStatus::Applied,
        };
        let e2 = DocEvent { id: DocEventId(2), user_id: UserId(2), group_id: GroupId(2), ..e1.clone() };
        assert_eq!(e1.redundancy_key(), e2.redundancy_key());
    }
}
