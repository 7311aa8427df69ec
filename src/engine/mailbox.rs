// Mailbox subsystem — paginated reads and reassignment over mailbox rows
//
//! A mailbox is virtual: it's the set of `MailboxRow`s owned by a group
//! (spec §4.7). Delivery happens once, inside `ApplyEvent`'s transaction;
//! everything here is read-side pagination plus the two post-delivery
//! mutations (`ReassignMessage`, `SetStatusBy*`).

use crate::engine::store::Store;
use crate::models::*;
use crate::{EngineError, Result};

fn require_non_negative(offset: i64, limit: i64) -> Result<()> {
    if offset < 0 || limit < 0 {
        return Err(EngineError::NegativeOffsetOrLimit);
    }
    Ok(())
}

pub async fn count_by_user<S: Store>(store: &S, user_id: UserId, unread: Option<bool>) -> Result<i64> {
    store.count_by_user(None, user_id, unread).await
}

pub async fn count_by_group<S: Store>(store: &S, group_id: GroupId, unread: Option<bool>) -> Result<i64> {
    store.count_by_group(None, group_id, unread).await
}

pub async fn list_by_user<S: Store>(
    store: &S,
    user_id: UserId,
    offset: i64,
    limit: i64,
    unread: Option<bool>,
) -> Result<Vec<MailboxRow>> {
    require_non_negative(offset, limit)?;
    store.list_by_user(None, user_id, offset, limit, unread).await
}

pub async fn list_by_group<S: Store>(
    store: &S,
    group_id: GroupId,
    offset: i64,
    limit: i64,
    unread: Option<bool>,
) -> Result<Vec<MailboxRow>> {
    require_non_negative(offset, limit)?;
    store.list_by_group(None, group_id, offset, limit, unread).await
}

pub async fn get_message<S: Store>(store: &S, message_id: MessageId) -> Result<Message> {
    store
        .get_message(None, message_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("message {message_id}")))
}

/// Atomic reassignment of a mailbox row's owning group; a no-op when
/// `from_group == to_group` (spec §4.7).
pub async fn reassign_message<S: Store>(
    store: &S,
    from_group: GroupId,
    to_group: GroupId,
    message_id: MessageId,
) -> Result<()> {
    store.reassign_message(None, from_group, to_group, message_id).await
}

pub async fn set_status_by_user<S: Store>(store: &S, user_id: UserId, message_id: MessageId, unread: bool) -> Result<()> {
    store.set_status_by_user(None, user_id, message_id, unread).await
}

pub async fn set_status_by_group<S: Store>(store: &S, group_id: GroupId, message_id: MessageId, unread: bool) -> Result<()> {
    store.set_status_by_group(None, group_id, message_id, unread).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_store::MemoryStore;

    #[tokio::test]
    async fn reassign_is_a_noop_between_the_same_group() {
        let store = MemoryStore::new();
        let group = store.create_group(None, "g1", GroupType::General).await.unwrap();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let user = User { id: UserId(0), first_name: "A".into(), last_name: "B".into(), email: "a@b.com".into(), active: true };
        let (user, _) = store.create_user(None, user).await.unwrap();
        let doc = store.create_document(None, Document {
            id: DocumentId(0), doctype_id: doctype.id, current_state_id: draft.id,
            current_ac_id: AccessContextId(1), originating_ac_id: AccessContextId(1),
            owner_user_id: user.id, ctime: chrono::Utc::now(), title: Some("t".into()),
            body: serde_json::Value::Null, parent: None,
        }).await.unwrap();
        let event = store.insert_applied_event(None, DocEvent {
            id: DocEventId(0), doctype_id: doctype.id, doc_id: doc.id, from_state_id: draft.id,
            docaction_id: DocActionId(1), user_id: user.id, group_id: GroupId(1),
            ctime: chrono::Utc::now(), status: EventStatus::Applied,
        }).await.unwrap();
        let message = store.insert_message(None, doctype.id, doc.id, event.id, MessagePayload { title: "t".into(), body: "b".into() }).await.unwrap();
        store.insert_mailbox_row(None, group.id, message.id).await.unwrap();

        reassign_message(&store, group.id, group.id, message.id).await.unwrap();
        assert_eq!(count_by_group(&store, group.id, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reassign_moves_the_row_and_marks_it_unread() {
        let store = MemoryStore::new();
        let from = store.create_group(None, "g1", GroupType::General).await.unwrap();
        let to = store.create_group(None, "g3", GroupType::General).await.unwrap();
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let user = User { id: UserId(0), first_name: "A".into(), last_name: "B".into(), email: "a@b.com".into(), active: true };
        let (user, _) = store.create_user(None, user).await.unwrap();
        let doc = store.create_document(None, Document {
            id: DocumentId(0), doctype_id: doctype.id, current_state_id: draft.id,
            current_ac_id: AccessContextId(1), originating_ac_id: AccessContextId(1),
            owner_user_id: user.id, ctime: chrono::Utc::now(), title: Some("t".into()),
            body: serde_json::Value::Null, parent: None,
        }).await.unwrap();
        let event = store.insert_applied_event(None, DocEvent {
            id: DocEventId(0), doctype_id: doctype.id, doc_id: doc.id, from_state_id: draft.id,
            docaction_id: DocActionId(1), user_id: user.id, group_id: from.id,
            ctime: chrono::Utc::now(), status: EventStatus::Applied,
        }).await.unwrap();
        let message = store.insert_message(None, doctype.id, doc.id, event.id, MessagePayload { title: "t".into(), body: "b".into() }).await.unwrap();
        store.insert_mailbox_row(None, from.id, message.id).await.unwrap();
        set_status_by_group(&store, from.id, message.id, false).await.unwrap();

        reassign_message(&store, from.id, to.id, message.id).await.unwrap();

        assert_eq!(count_by_group(&store, from.id, None).await.unwrap(), 0);
        assert_eq!(count_by_group(&store, to.id, None).await.unwrap(), 1);
        assert_eq!(count_by_group(&store, to.id, Some(true)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn negative_offset_is_rejected() {
        let store = MemoryStore::new();
        let result = list_by_group(&store, GroupId(1), -1, 10, None).await;
        assert!(matches!(result, Err(EngineError::NegativeOffsetOrLimit)));
    }
}
