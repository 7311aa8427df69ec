// Message & mailbox — the notification fan-out of an applied event
//
//! One `Message` is created per applied event; it fans out to one
//! `MailboxRow` per distinct recipient group (spec §4.7, invariant I-4). A
//! mailbox is virtual: it's simply the set of `MailboxRow`s owned by a
//! group. "Consumption" only flips `unread` — the message itself persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DocEventId, DocTypeId, DocumentId, GroupId, MailboxId, MessageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub doctype_id: DocTypeId,
    pub doc_id: DocumentId,
    pub docevent_id: DocEventId,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MailboxRow {
    pub id: MailboxId,
    pub group_id: GroupId,
    pub message_id: MessageId,
    pub unread: bool,
    pub ctime: DateTime<Utc>,
}

/// The payload a node handler returns to become a `Message` (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub title: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_row_unread_toggles_freely() {
        let mut row = MailboxRow {
            id: MailboxId(1),
            group_id: GroupId(1),
            message_id: MessageId(1),
            unread: true,
            ctime: Utc::now(),
        };
        row.unread = false;
        assert!(!row.unread);
    }
}
