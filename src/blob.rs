// Blob storage — checksum/path semantics on the filesystem
//
//! Scope per spec §1: the engine only specifies checksum/path semantics,
//! not a general blob store. `add_blob` computes the sha1 of a staged file,
//! compares it against the caller-supplied checksum, and only on a match
//! moves it into the content-addressed layout `blobsDir/<sha1[0:2]>/<sha1>`.
//!
//! ## The orphan hazard (spec §4.4, §9)
//!
//! The move happens before the database row is inserted, and the row
//! insertion is the caller's job (inside the same `ApplyEvent`/document
//! transaction, typically). If that outer transaction later rolls back,
//! the moved file has no row pointing at it — an accepted limitation,
//! compensated for by a janitor that can safely delete any file under
//! `blobsDir` whose sha1 has no corresponding row.

use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::{EngineError, Result};

/// The caller's claim about a staged file, prior to verification.
#[derive(Debug, Clone)]
pub struct BlobClaim {
    pub name: String,
    pub staged_path: PathBuf,
    pub claimed_sha1: String,
}

/// A verified, moved blob — the information an `AddBlob` caller should
/// persist as a `document_blobs` row.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub name: String,
    pub path: PathBuf,
    pub sha1: String,
}

/// Compute the sha1 of a file's contents without loading it into memory at
/// once.
pub async fn sha1_of_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify `claim.staged_path`'s checksum against `claim.claimed_sha1`, and
/// on a match move it into `blobs_dir/<sha1[0:2]>/<sha1>`. Returns
/// `ChecksumMismatch` without moving anything on a mismatch.
///
/// Callers must insert the corresponding `document_blobs` row themselves,
/// ideally in the same transaction as the event that introduced the blob —
/// see the orphan hazard above.
pub async fn add_blob(blobs_dir: &Path, claim: BlobClaim) -> Result<StoredBlob> {
    let actual = sha1_of_file(&claim.staged_path).await?;
    if actual != claim.claimed_sha1 {
        return Err(EngineError::ChecksumMismatch);
    }

    let prefix = &actual[0..2];
    let dest_dir = blobs_dir.join(prefix);
    tokio::fs::create_dir_all(&dest_dir).await?;
    let dest_path = dest_dir.join(&actual);

    tokio::fs::rename(&claim.staged_path, &dest_path).await?;

    Ok(StoredBlob { name: claim.name, path: dest_path, sha1: actual })
}

/// A janitor pass: given the set of sha1s that currently have a
/// `document_blobs` row, remove any file under `blobs_dir` whose name (the
/// last path component) is not in that set. Compensates for the
/// move-then-insert orphan hazard described above.
pub async fn reap_orphans(blobs_dir: &Path, known_sha1s: &std::collections::HashSet<String>) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let mut prefixes = tokio::fs::read_dir(blobs_dir).await?;
    while let Some(prefix_entry) = prefixes.next_entry().await? {
        if !prefix_entry.file_type().await?.is_dir() {
            continue;
        }
        let mut files = tokio::fs::read_dir(prefix_entry.path()).await?;
        while let Some(file_entry) = files.next_entry().await? {
            let file_name = file_entry.file_name();
            let sha1 = file_name.to_string_lossy().to_string();
            if !known_sha1s.contains(&sha1) {
                tokio::fs::remove_file(file_entry.path()).await?;
                removed.push(file_entry.path());
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn add_blob_rejects_checksum_mismatch() {
        let dir = tempdir();
        let staged = dir.join("upload.bin");
        tokio::fs::write(&staged, b"hello world").await.unwrap();

        let claim = BlobClaim {
            name: "upload.bin".into(),
            staged_path: staged,
            claimed_sha1: "0".repeat(40),
        };

        let blobs_dir = dir.join("blobs");
        tokio::fs::create_dir_all(&blobs_dir).await.unwrap();
        let result = add_blob(&blobs_dir, claim).await;
        assert!(matches!(result, Err(EngineError::ChecksumMismatch)));
    }

    #[tokio::test]
    async fn add_blob_moves_into_content_addressed_layout() {
        let dir = tempdir();
        let staged = dir.join("upload.bin");
        tokio::fs::write(&staged, b"hello world").await.unwrap();
        let sha1 = sha1_of_file(&staged).await.unwrap();

        let claim = BlobClaim { name: "upload.bin".into(), staged_path: staged, claimed_sha1: sha1.clone() };
        let blobs_dir = dir.join("blobs");
        tokio::fs::create_dir_all(&blobs_dir).await.unwrap();

        let stored = add_blob(&blobs_dir, claim).await.unwrap();
        assert_eq!(stored.sha1, sha1);
        assert_eq!(stored.path, blobs_dir.join(&sha1[0..2]).join(&sha1));
        assert!(tokio::fs::metadata(&stored.path).await.is_ok());
    }

    #[tokio::test]
    async fn reap_orphans_removes_files_with_no_known_row() {
        let dir = tempdir();
        let blobs_dir = dir.join("blobs");
        let prefix_dir = blobs_dir.join("ab");
        tokio::fs::create_dir_all(&prefix_dir).await.unwrap();
        tokio::fs::write(prefix_dir.join("abknown"), b"x").await.unwrap();
        tokio::fs::write(prefix_dir.join("aborphan"), b"y").await.unwrap();

        let known: HashSet<String> = ["abknown".to_string()].into_iter().collect();
        let removed = reap_orphans(&blobs_dir, &known).await.unwrap();

        assert_eq!(removed.len(), 1);
        assert!(tokio::fs::metadata(prefix_dir.join("abknown")).await.is_ok());
        assert!(tokio::fs::metadata(prefix_dir.join("aborphan")).await.is_err());
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docflow-blob-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
