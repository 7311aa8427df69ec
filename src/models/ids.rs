// Identifier newtypes for the workflow engine's entity tables
//
//! Every admin-maintained entity in this engine is an opaquely-identified row
//! (see spec §3). Rather than passing bare `i64`s around — where a doctype id
//! could accidentally be handed to a function expecting a role id — each
//! table gets its own newtype. `sqlx::Type` with `#[sqlx(transparent)]` lets
//! these map directly onto `BIGINT` columns without a manual `Encode`/`Decode`
//! impl per type.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[derive(sqlx::Type)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                $name(id)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                $name(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(DocTypeId, "Identifies a document type (and its per-type storage table).");
id_type!(DocStateId, "Identifies a document state within a doctype.");
id_type!(DocActionId, "Identifies a document action.");
id_type!(RoleId, "Identifies a role — a named bundle of (doctype, action) permissions.");
// User ids are minted by the external identity provider, never by this
// engine — the newtype still exists so they can't be confused with a
// GroupId at a call site.
id_type!(UserId, "Identifies a user. Supplied by the external identity provider.");
id_type!(GroupId, "Identifies a group (singleton or general).");
id_type!(AccessContextId, "Identifies an access context namespace.");
id_type!(WorkflowId, "Identifies a workflow.");
id_type!(NodeId, "Identifies a node binding (doctype, from_state) to a workflow.");
id_type!(DocumentId, "Identifies a document within its doctype's storage table.");
id_type!(DocEventId, "Identifies a recorded document event.");
id_type!(MessageId, "Identifies a notification message.");
id_type!(MailboxId, "Identifies a single mailbox row (one per recipient group per message).");
