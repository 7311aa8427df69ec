// Document store — per-doctype documents, their blobs, and their tags
//
//! A `Document` is the tracked entity whose lifecycle the engine drives.
//! Child documents inherit title, current state, and tags from their root
//! and may not own any of them independently (spec invariant: child
//! restriction) — attempts to set them fail with `DocumentIsChild` rather
//! than silently no-op'ing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AccessContextId, DocStateId, DocTypeId, DocumentId, UserId};

/// A document's link to its parent, if any. Documents without a parent are
/// roots and own their own title/state/tags; documents with a parent
/// inherit those from the root and may not set them independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub doctype_id: DocTypeId,
    pub doc_id: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: DocumentId,
    pub doctype_id: DocTypeId,
    pub current_state_id: DocStateId,
    pub current_ac_id: AccessContextId,
    pub originating_ac_id: AccessContextId,
    pub owner_user_id: UserId,
    pub ctime: DateTime<Utc>,
    /// `None` for child documents — see `ParentRef` and the child
    /// restriction invariant.
    pub title: Option<String>,
    pub body: serde_json::Value,
    #[sqlx(skip)]
    pub parent: Option<ParentRef>,
}

impl Document {
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// `(doctype, doc_id, name) → (path, sha1)`. `sha1` is the checksum the
/// engine verified against the uploaded bytes before the move into
/// `blobsDir/<sha1[0:2]>/<sha1>` (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Blob {
    pub doctype_id: DocTypeId,
    pub doc_id: DocumentId,
    pub name: String,
    pub path: String,
    pub sha1: String,
}

/// A lowercased, whitespace-trimmed tag on a root document. Child documents
/// cannot carry tags of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub doctype_id: DocTypeId,
    pub doc_id: DocumentId,
    pub tag: String,
}

impl Tag {
    /// Normalize raw tag input per spec §4.4: lowercase, trimmed.
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_lowercase()
    }
}

/// A parent/child link (`document_children` in §6.1). Kept distinct from
/// `Document::parent` so the store can query "all children of X" without a
/// full table scan over every doctype's document table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentChild {
    pub parent_doctype_id: DocTypeId,
    pub parent_id: DocumentId,
    pub child_doctype_id: DocTypeId,
    pub child_id: DocumentId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_normalization_trims_and_lowercases() {
        assert_eq!(Tag::normalize("  Urgent \n"), "urgent");
        assert_eq!(Tag::normalize("Q4-Budget"), "q4-budget");
    }

    #[test]
    fn document_with_parent_is_a_child() {
        let doc = Document {
            id: DocumentId(2),
            doctype_id: DocTypeId(1),
            current_state_id: DocStateId(1),
            current_ac_id: AccessContextId(1),
            originating_ac_id: AccessContextId(1),
            owner_user_id: UserId(1),
            ctime: Utc::now(),
            title: None,
            body: serde_json::Value::Null,
            parent: Some(ParentRef { doctype_id: DocTypeId(1), doc_id: DocumentId(1) }),
        };
        assert!(doc.is_child());
        assert!(!doc.is_root());
    }
}
