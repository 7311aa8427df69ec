// Document store operations
//
//! `New` creates a document, optionally as a child of an existing one, at
//! the active workflow's begin state — children inherit their root's
//! title, tags and current state and carry no independent copies of them
//! (spec §4.4, child restriction); `get`/`tags` resolve that inheritance on
//! every read rather than duplicating the root's values onto the child row.
//! `SetTitle`/`SetData` are owner-restricted and refuse child documents
//! outright; `AddBlob` is wired to the filesystem semantics in
//! [`crate::blob`]; `AddTag` enforces the same root-only restriction and
//! normalizes via [`Tag::normalize`].

use chrono::Utc;

use crate::engine::store::Store;
use crate::models::*;
use crate::{blob, EngineError, Result};

/// Places the new document at the active workflow's `begin_state_id`
/// (spec §4.4) — callers never choose a document's starting state
/// themselves.
pub async fn new<S: Store>(
    store: &S,
    doctype_id: DocTypeId,
    owner_user_id: UserId,
    originating_ac_id: AccessContextId,
    title: Option<String>,
    body: serde_json::Value,
    parent: Option<ParentRef>,
) -> Result<Document> {
    let title = match &parent {
        Some(_) => None,
        None => match title {
            Some(t) if t.trim().is_empty() => return Err(EngineError::EmptyName),
            other => other,
        },
    };

    let workflow = crate::engine::workflow_registry::get_by_doctype(store, doctype_id).await?;

    let doc = Document {
        id: DocumentId(0),
        doctype_id,
        current_state_id: workflow.begin_state_id,
        current_ac_id: originating_ac_id,
        originating_ac_id,
        owner_user_id,
        ctime: Utc::now(),
        title,
        body,
        parent,
    };
    store.create_document(None, doc).await
}

/// Fetches a document, resolving title and current state from its root
/// when it's a child — children never carry these independently (spec §3,
/// §4.4).
pub async fn get<S: Store>(store: &S, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Document> {
    let doc = store
        .get_document(None, doctype_id, doc_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("document {doctype_id}/{doc_id}")))?;
    match doc.parent {
        Some(parent) => {
            let root = store
                .get_document(None, parent.doctype_id, parent.doc_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("document {}/{}", parent.doctype_id, parent.doc_id)))?;
            Ok(Document { title: root.title, current_state_id: root.current_state_id, ..doc })
        }
        None => Ok(doc),
    }
}

async fn require_owner<S: Store>(store: &S, doctype_id: DocTypeId, doc_id: DocumentId, acting_user: UserId) -> Result<()> {
    let doc = get(store, doctype_id, doc_id).await?;
    if doc.owner_user_id != acting_user {
        return Err(EngineError::NotOwner);
    }
    Ok(())
}

pub async fn set_title<S: Store>(
    store: &S,
    doctype_id: DocTypeId,
    doc_id: DocumentId,
    acting_user: UserId,
    title: &str,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(EngineError::EmptyName);
    }
    require_owner(store, doctype_id, doc_id, acting_user).await?;
    store.set_title(None, doctype_id, doc_id, title).await
}

pub async fn set_data<S: Store>(
    store: &S,
    doctype_id: DocTypeId,
    doc_id: DocumentId,
    acting_user: UserId,
    body: serde_json::Value,
) -> Result<()> {
    require_owner(store, doctype_id, doc_id, acting_user).await?;
    store.set_data(None, doctype_id, doc_id, body).await
}

/// Verifies and moves the staged file via [`blob::add_blob`], then records
/// the resulting `(name, path, sha1)` as a `document_blobs` row.
pub async fn add_blob<S: Store>(
    store: &S,
    doctype_id: DocTypeId,
    doc_id: DocumentId,
    claim: blob::BlobClaim,
) -> Result<Blob> {
    if store.get_document(None, doctype_id, doc_id).await?.is_none() {
        return Err(EngineError::NotFound(format!("document {doctype_id}/{doc_id}")));
    }
    let blobs_dir = crate::EngineConfig::blobs_dir()?;
    let stored = blob::add_blob(blobs_dir, claim).await?;
    let row = Blob {
        doctype_id,
        doc_id,
        name: stored.name,
        path: stored.path.to_string_lossy().into_owned(),
        sha1: stored.sha1,
    };
    store.insert_blob_row(None, row.clone()).await?;
    Ok(row)
}

pub async fn blobs<S: Store>(store: &S, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<Blob>> {
    store.blobs_of(None, doctype_id, doc_id).await
}

/// `Tags(doc) → [tag]`: root documents only (spec §4.4).
pub async fn add_tag<S: Store>(store: &S, doctype_id: DocTypeId, doc_id: DocumentId, tag: &str) -> Result<()> {
    if tag.trim().is_empty() {
        return Err(EngineError::EmptyName);
    }
    store.add_tag(None, doctype_id, doc_id, tag).await
}

pub async fn tags<S: Store>(store: &S, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<String>> {
    let doc = get(store, doctype_id, doc_id).await?;
    match doc.parent {
        Some(parent) => store.tags_of(None, parent.doctype_id, parent.doc_id).await,
        None => store.tags_of(None, doctype_id, doc_id).await,
    }
}

pub async fn children<S: Store>(store: &S, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<Vec<DocumentChild>> {
    store.children_of(None, doctype_id, doc_id).await
}

/// `Parent(doc)`: resolves a child's parent reference, or
/// `DocumentNoParent` for a root document.
pub async fn parent_of<S: Store>(store: &S, doctype_id: DocTypeId, doc_id: DocumentId) -> Result<ParentRef> {
    let doc = get(store, doctype_id, doc_id).await?;
    doc.parent.ok_or(EngineError::DocumentNoParent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory_store::MemoryStore;

    async fn seed(store: &MemoryStore) -> (DocTypeId, DocStateId, AccessContextId, UserId) {
        let doctype = store.create_doctype(None, "RFQ").await.unwrap();
        let draft = store.create_docstate(None, doctype.id, "draft").await.unwrap();
        let ac = store.create_access_context(None, "C1").await.unwrap();
        let user = User { id: UserId(0), first_name: "Ada".into(), last_name: "Lovelace".into(), email: "a@b.com".into(), active: true };
        let (user, _) = store.create_user(None, user).await.unwrap();

        let workflow = store.create_workflow(None, "rfq-flow", doctype.id, draft.id).await.unwrap();
        store.set_workflow_active(None, workflow.id, true).await.unwrap();

        (doctype.id, draft.id, ac.id, user.id)
    }

    #[tokio::test]
    async fn new_document_starts_at_the_active_workflows_begin_state() {
        let store = MemoryStore::new();
        let (doctype_id, draft, ac, owner) = seed(&store).await;

        let doc = new(&store, doctype_id, owner, ac, Some("root".into()), serde_json::Value::Null, None)
            .await
            .unwrap();
        assert_eq!(doc.current_state_id, draft);
    }

    #[tokio::test]
    async fn child_documents_carry_no_title() {
        let store = MemoryStore::new();
        let (doctype_id, _draft, ac, owner) = seed(&store).await;

        let root = new(&store, doctype_id, owner, ac, Some("root".into()), serde_json::Value::Null, None)
            .await
            .unwrap();
        let child_ref = ParentRef { doctype_id, doc_id: root.id };
        let child = new(&store, doctype_id, owner, ac, Some("ignored".into()), serde_json::Value::Null, Some(child_ref))
            .await
            .unwrap();

        assert!(child.title.is_none());
        assert!(child.is_child());
    }

    #[tokio::test]
    async fn child_documents_inherit_the_roots_title_and_state() {
        let store = MemoryStore::new();
        let (doctype_id, draft, ac, owner) = seed(&store).await;

        let root = new(&store, doctype_id, owner, ac, Some("root".into()), serde_json::Value::Null, None)
            .await
            .unwrap();
        let child_ref = ParentRef { doctype_id, doc_id: root.id };
        let child = new(&store, doctype_id, owner, ac, None, serde_json::Value::Null, Some(child_ref))
            .await
            .unwrap();

        store.add_tag(None, doctype_id, root.id, "urgent").await.unwrap();
        let pending = store.create_docstate(None, doctype_id, "pending").await.unwrap();
        store.update_document_state(None, doctype_id, root.id, pending.id, None).await.unwrap();

        let resolved = get(&store, doctype_id, child.id).await.unwrap();
        assert_eq!(resolved.title, Some("root".to_string()));
        assert_eq!(resolved.current_state_id, pending.id);
        assert!(resolved.current_state_id != draft || pending.id == draft);
        assert_eq!(tags(&store, doctype_id, child.id).await.unwrap(), vec!["urgent".to_string()]);
    }

    #[tokio::test]
    async fn set_title_rejects_child_documents() {
        let store = MemoryStore::new();
        let (doctype_id, _draft, ac, owner) = seed(&store).await;

        let root = new(&store, doctype_id, owner, ac, Some("root".into()), serde_json::Value::Null, None)
            .await
            .unwrap();
        let child_ref = ParentRef { doctype_id, doc_id: root.id };
        let child = new(&store, doctype_id, owner, ac, None, serde_json::Value::Null, Some(child_ref))
            .await
            .unwrap();

        let result = set_title(&store, doctype_id, child.id, owner, "new title").await;
        assert!(matches!(result, Err(EngineError::DocumentIsChild)));
    }

    #[tokio::test]
    async fn set_data_rejects_child_documents() {
        let store = MemoryStore::new();
        let (doctype_id, _draft, ac, owner) = seed(&store).await;

        let root = new(&store, doctype_id, owner, ac, Some("root".into()), serde_json::Value::Null, None)
            .await
            .unwrap();
        let child_ref = ParentRef { doctype_id, doc_id: root.id };
        let child = new(&store, doctype_id, owner, ac, None, serde_json::Value::Null, Some(child_ref))
            .await
            .unwrap();

        let result = set_data(&store, doctype_id, child.id, owner, serde_json::json!({"k": "v"})).await;
        assert!(matches!(result, Err(EngineError::DocumentIsChild)));
    }

    #[tokio::test]
    async fn add_tag_rejects_child_documents() {
        let store = MemoryStore::new();
        let (doctype_id, _draft, ac, owner) = seed(&store).await;

        let root = new(&store, doctype_id, owner, ac, Some("root".into()), serde_json::Value::Null, None)
            .await
            .unwrap();
        let child_ref = ParentRef { doctype_id, doc_id: root.id };
        let child = new(&store, doctype_id, owner, ac, None, serde_json::Value::Null, Some(child_ref))
            .await
            .unwrap();

        let result = add_tag(&store, doctype_id, child.id, "urgent").await;
        assert!(matches!(result, Err(EngineError::DocumentIsChild)));
    }

    #[tokio::test]
    async fn set_title_rejects_non_owner() {
        let store = MemoryStore::new();
        let (doctype_id, _draft, ac, owner) = seed(&store).await;
        let root = new(&store, doctype_id, owner, ac, Some("root".into()), serde_json::Value::Null, None)
            .await
            .unwrap();

        let other = User { id: UserId(0), first_name: "Bob".into(), last_name: "Smith".into(), email: "b@c.com".into(), active: true };
        let (other, _) = store.create_user(None, other).await.unwrap();

        let result = set_title(&store, doctype_id, root.id, other.id, "new title").await;
        assert!(matches!(result, Err(EngineError::NotOwner)));
    }
}
