// Document Workflow Engine
// An embeddable, transactional workflow engine for document lifecycles

//! # Document Workflow Engine
//!
//! This crate drives document lifecycles through explicitly modelled state
//! graphs. A consuming application declares document types, the states
//! those documents may assume, the actions that move documents between
//! states, the nodes that bind a state to a handler, and the workflows that
//! tie these together. The engine records user-originated events, validates
//! that an event is legal for a document's current state and workflow,
//! invokes a registered handler, commits the transition, and delivers
//! notification messages into the mailboxes of chosen recipient groups —
//! all within one transactional boundary.
//!
//! ## Layout
//!
//! - [`models`]: the relational domain types (doctypes, states, actions,
//!   roles, principals, access contexts, the state graph, nodes, workflows,
//!   documents, events, messages and mailboxes).
//! - [`engine`]: the [`engine::Store`] trait plus its Postgres and in-memory
//!   backends, the node handler registry, and the `ApplyEvent` pipeline
//!   that is this crate's core operation.
//! - [`config`]: the two process-wide startup registrations the engine
//!   needs (`RegisterDB`, `SetBlobsDir`) and nothing else — there is no
//!   network protocol, CLI, or environment configuration beyond these.
//! - [`blob`]: checksum/path semantics for blob storage on the filesystem.

pub mod blob;
pub mod config;
pub mod engine;
pub mod models;

pub use config::EngineConfig;
pub use models::*;

use thiserror::Error;

/// The closed error taxonomy for engine operations (spec §7). Every public
/// operation returns one of these or a transport-level error folded in via
/// `#[from]`.
#[derive(Error, Debug)]
pub enum EngineError {
    // --- Validation ---
    #[error("empty name")]
    EmptyName,
    #[error("non-positive identifier: {0}")]
    NonPositiveId(i64),
    #[error("negative offset or limit")]
    NegativeOffsetOrLimit,
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // --- Not found ---
    #[error("not found: {0}")]
    NotFound(String),

    // --- Conflict ---
    #[error("a row with this name or key already exists: {0}")]
    Conflict(String),
    #[error("event is redundant: an applied event already exists for this (doctype, document, from_state, action)")]
    EventRedundant,
    #[error("event has already been applied")]
    EventAlreadyApplied,

    // --- Semantic mismatch ---
    #[error("event's from_state does not match the document's current state")]
    EventStateMismatch,
    #[error("no transition defined for this (from_state, action)")]
    WorkflowInvalidAction,

    // --- State ---
    #[error("workflow is not active")]
    WorkflowInactive,
    #[error("operation not permitted on a child document")]
    DocumentIsChild,
    #[error("document has no parent")]
    DocumentNoParent,
    #[error("message has no recipients")]
    MessageNoRecipients,

    // --- Integrity ---
    #[error("blob checksum mismatch")]
    ChecksumMismatch,
    #[error("only the owning user may perform this mutation")]
    NotOwner,

    // --- Authorization ---
    #[error("the user lacks permission for this (doctype, action) in the node's access context")]
    Unauthorized,

    // --- Handler contract ---
    #[error("no handler registered for this (workflow, from_state)")]
    HandlerMissing,

    // --- Fatal (startup) ---
    #[error("database handle not registered")]
    DbNotRegistered,
    #[error("blobs directory not registered")]
    BlobsDirNotRegistered,

    // --- Transport ---
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Crate-wide `Result` alias, used in every public operation signature.
pub type Result<T> = std::result::Result<T, EngineError>;
