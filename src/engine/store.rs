// Storage abstraction for the workflow engine
//
//! This is the repository-pattern trait the rest of `engine` is built
//! against (grounded in the teacher's `WorkflowStorage` trait). It exposes
//! every logical table from spec §6.1 as a small, typed operation, plus a
//! `Tx` associated type and `begin`/`commit`/`rollback` so callers can
//! compose several operations into one transaction (spec §5's "transaction
//! parameter polymorphism": pass `Some(&mut tx)` to join an open
//! transaction, or `None` to let the operation manage its own).
//!
//! Two implementations ship with this crate: [`super::pg_store::PgStore`]
//! (Postgres, via `sqlx`) for production use, and
//! [`super::memory_store::MemoryStore`] for exercising the core pipeline in
//! tests without a database — the same role the teacher's `InMemoryStorage`
//! plays opposite its NATS-backed implementation.

use std::collections::BTreeSet;

use crate::models::*;
use crate::Result;

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// An open transaction, opaque to callers outside `engine`.
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> Result<()>;
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    // ---- Taxonomy ----
    async fn create_doctype(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<DocType>;
    async fn get_doctype(&self, tx: Option<&mut Self::Tx>, id: DocTypeId) -> Result<Option<DocType>>;
    async fn get_doctype_by_name(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<DocType>>;
    async fn list_doctypes(&self, tx: Option<&mut Self::Tx>) -> Result<Vec<DocType>>;

    async fn create_docstate(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, name: &str) -> Result<DocState>;
    async fn get_docstate(&self, tx: Option<&mut Self::Tx>, id: DocStateId) -> Result<Option<DocState>>;
    async fn list_docstates(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Vec<DocState>>;

    async fn create_docaction(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<DocAction>;
    async fn get_docaction(&self, tx: Option<&mut Self::Tx>, id: DocActionId) -> Result<Option<DocAction>>;
    async fn get_docaction_by_name(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<DocAction>>;

    async fn create_role(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Role>;
    async fn get_role(&self, tx: Option<&mut Self::Tx>, id: RoleId) -> Result<Option<Role>>;
    async fn delete_role(&self, tx: Option<&mut Self::Tx>, id: RoleId) -> Result<()>;
    async fn add_role_permission(&self, tx: Option<&mut Self::Tx>, role_id: RoleId, doctype_id: DocTypeId, docaction_id: DocActionId) -> Result<()>;
    async fn role_permissions(&self, tx: Option<&mut Self::Tx>, role_id: RoleId) -> Result<Vec<RolePermission>>;
    async fn role_in_use(&self, tx: Option<&mut Self::Tx>, role_id: RoleId) -> Result<bool>;

    // ---- Principals ----
    async fn create_user(&self, tx: Option<&mut Self::Tx>, user: User) -> Result<(User, GroupId)>;
    async fn get_user(&self, tx: Option<&mut Self::Tx>, id: UserId) -> Result<Option<User>>;
    async fn create_group(&self, tx: Option<&mut Self::Tx>, name: &str, group_type: GroupType) -> Result<Group>;
    async fn get_group(&self, tx: Option<&mut Self::Tx>, id: GroupId) -> Result<Option<Group>>;
    async fn delete_group(&self, tx: Option<&mut Self::Tx>, id: GroupId) -> Result<()>;
    async fn add_user_to_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, user_id: UserId) -> Result<()>;
    async fn remove_user_from_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, user_id: UserId) -> Result<()>;
    async fn group_members(&self, tx: Option<&mut Self::Tx>, group_id: GroupId) -> Result<Vec<UserId>>;
    async fn user_groups(&self, tx: Option<&mut Self::Tx>, user_id: UserId) -> Result<Vec<GroupId>>;
    async fn singleton_group_of(&self, tx: Option<&mut Self::Tx>, user_id: UserId) -> Result<Option<GroupId>>;

    // ---- Access context ----
    async fn create_access_context(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<AccessContext>;
    async fn get_access_context(&self, tx: Option<&mut Self::Tx>, id: AccessContextId) -> Result<Option<AccessContext>>;
    async fn set_access_context_active(&self, tx: Option<&mut Self::Tx>, id: AccessContextId, active: bool) -> Result<()>;
    async fn add_group_role(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()>;
    async fn remove_group_role(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, role_id: RoleId) -> Result<()>;
    async fn group_roles(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<RoleId>>;
    async fn groups_in_context(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId) -> Result<Vec<GroupId>>;
    async fn add_group_to_hierarchy(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, reports_to: Option<GroupId>) -> Result<()>;
    async fn delete_group_from_hierarchy(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<()>;
    async fn reports_to(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Option<GroupId>>;
    async fn reportees(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId) -> Result<Vec<GroupId>>;
    async fn change_reporting(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, group_id: GroupId, reports_to: Option<GroupId>) -> Result<()>;
    /// Effective `(user, doctype, action) -> bool` lookup. Backends are
    /// free to materialize this as a view (`ac_perms_v`, §6.1's derived
    /// read model) or compute it by joining the primitives above.
    async fn effective_permission(&self, tx: Option<&mut Self::Tx>, ac_id: AccessContextId, user_id: UserId, doctype_id: DocTypeId, docaction_id: DocActionId) -> Result<bool>;

    // ---- State graph ----
    async fn add_transition(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, from_state_id: DocStateId, docaction_id: DocActionId, to_state_id: DocStateId) -> Result<Transition>;
    async fn get_transition(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, from_state_id: DocStateId, docaction_id: DocActionId) -> Result<Option<Transition>>;
    async fn list_transitions(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Vec<Transition>>;

    // ---- Workflow registry ----
    async fn create_workflow(&self, tx: Option<&mut Self::Tx>, name: &str, doctype_id: DocTypeId, begin_state_id: DocStateId) -> Result<Workflow>;
    async fn get_workflow(&self, tx: Option<&mut Self::Tx>, id: WorkflowId) -> Result<Option<Workflow>>;
    async fn get_workflow_by_name(&self, tx: Option<&mut Self::Tx>, name: &str) -> Result<Option<Workflow>>;
    async fn get_active_workflow_by_doctype(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId) -> Result<Option<Workflow>>;
    async fn list_workflows(&self, tx: Option<&mut Self::Tx>) -> Result<Vec<Workflow>>;
    async fn rename_workflow(&self, tx: Option<&mut Self::Tx>, id: WorkflowId, name: &str) -> Result<()>;
    async fn set_workflow_active(&self, tx: Option<&mut Self::Tx>, id: WorkflowId, active: bool) -> Result<()>;

    async fn add_node(&self, tx: Option<&mut Self::Tx>, node: Node) -> Result<Node>;
    async fn remove_node(&self, tx: Option<&mut Self::Tx>, node_id: NodeId) -> Result<()>;
    async fn get_node(&self, tx: Option<&mut Self::Tx>, id: NodeId) -> Result<Option<Node>>;
    async fn get_node_by_workflow_state(&self, tx: Option<&mut Self::Tx>, workflow_id: WorkflowId, from_state_id: DocStateId) -> Result<Option<Node>>;
    async fn list_nodes(&self, tx: Option<&mut Self::Tx>, workflow_id: WorkflowId) -> Result<Vec<Node>>;

    // ---- Document store ----
    async fn create_document(&self, tx: Option<&mut Self::Tx>, doc: Document) -> Result<Document>;
    async fn get_document(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Option<Document>>;
    async fn update_document_state(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, new_state_id: DocStateId, new_ac_id: Option<AccessContextId>) -> Result<()>;
    async fn set_title(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, title: &str) -> Result<()>;
    async fn set_data(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, body: serde_json::Value) -> Result<()>;
    async fn add_child_link(&self, tx: Option<&mut Self::Tx>, parent_doctype_id: DocTypeId, parent_id: DocumentId, child_doctype_id: DocTypeId, child_id: DocumentId) -> Result<()>;
    async fn children_of(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<DocumentChild>>;
    async fn add_tag(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, tag: &str) -> Result<()>;
    async fn tags_of(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<String>>;
    async fn insert_blob_row(&self, tx: Option<&mut Self::Tx>, blob: Blob) -> Result<()>;
    async fn blobs_of(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<Blob>>;

    // ---- Events & join accounting ----
    async fn event_is_redundant(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, from_state_id: DocStateId, docaction_id: DocActionId) -> Result<bool>;
    async fn insert_applied_event(&self, tx: Option<&mut Self::Tx>, event: DocEvent) -> Result<DocEvent>;
    async fn join_progress(&self, tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId) -> Result<BTreeSet<DocStateId>>;
    async fn record_join_progress(&self, tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId, from_state_id: DocStateId) -> Result<()>;
    async fn clear_join_progress(&self, tx: Option<&mut Self::Tx>, node_id: NodeId, doc_id: DocumentId) -> Result<()>;

    // ---- Messages & mailboxes ----
    async fn insert_message(&self, tx: Option<&mut Self::Tx>, doctype_id: DocTypeId, doc_id: DocumentId, docevent_id: DocEventId, payload: MessagePayload) -> Result<Message>;
    async fn insert_mailbox_row(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, message_id: MessageId) -> Result<MailboxRow>;
    async fn get_message(&self, tx: Option<&mut Self::Tx>, message_id: MessageId) -> Result<Option<Message>>;
    async fn count_by_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, unread: Option<bool>) -> Result<i64>;
    async fn count_by_user(&self, tx: Option<&mut Self::Tx>, user_id: UserId, unread: Option<bool>) -> Result<i64>;
    async fn list_by_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, offset: i64, limit: i64, unread: Option<bool>) -> Result<Vec<MailboxRow>>;
    async fn list_by_user(&self, tx: Option<&mut Self::Tx>, user_id: UserId, offset: i64, limit: i64, unread: Option<bool>) -> Result<Vec<MailboxRow>>;
    async fn reassign_message(&self, tx: Option<&mut Self::Tx>, from_group: GroupId, to_group: GroupId, message_id: MessageId) -> Result<()>;
    async fn set_status_by_user(&self, tx: Option<&mut Self::Tx>, user_id: UserId, message_id: MessageId, unread: bool) -> Result<()>;
    async fn set_status_by_group(&self, tx: Option<&mut Self::Tx>, group_id: GroupId, message_id: MessageId, unread: bool) -> Result<()>;
}
