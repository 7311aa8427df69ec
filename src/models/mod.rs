// Core domain models for the workflow engine
//
//! These are the relational, language-agnostic data structures described in
//! spec §3: the logical rows the engine reads and writes. None of them know
//! about SQL — `sqlx::FromRow` derives let the Postgres backend in
//! `engine::pg_store` map straight onto them, and the in-memory backend in
//! `engine::memory_store` stores them directly in `HashMap`s.

pub mod access_context;
pub mod document;
pub mod event;
pub mod ids;
pub mod message;
pub mod node;
pub mod principal;
pub mod state_graph;
pub mod taxonomy;
pub mod workflow;

pub use access_context::{AccessContext, GroupHierarchyEntry, GroupRole};
pub use document::{Blob, Document, DocumentChild, ParentRef, Tag};
pub use event::{DocEvent, EventStatus};
pub use ids::{
    AccessContextId, DocActionId, DocEventId, DocStateId, DocTypeId, DocumentId, GroupId,
    MailboxId, MessageId, NodeId, RoleId, UserId, WorkflowId,
};
pub use message::{MailboxRow, Message, MessagePayload};
pub use node::{Node, NodeType};
pub use principal::{Group, GroupType, User};
pub use state_graph::Transition;
pub use taxonomy::{DocAction, DocState, DocType, Role, RolePermission};
pub use workflow::Workflow;
