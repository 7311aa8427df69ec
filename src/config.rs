// Process-wide startup registrations
//
//! The engine holds no long-lived in-memory state for documents (spec §5),
//! but it does need two things registered exactly once at process startup:
//! a database handle and a blob directory root. Both are "never mutated
//! thereafter" per the spec, which is exactly what `OnceCell` gives us —
//! the teacher's circuit breaker sources reach for `lazy_static` for the
//! same shape of problem; `once_cell::sync::OnceCell` is its maintained,
//! non-macro successor.

use once_cell::sync::OnceCell;
use sqlx::PgPool;
use std::path::PathBuf;

use crate::{EngineError, Result};

static DB_POOL: OnceCell<PgPool> = OnceCell::new();
static BLOBS_DIR: OnceCell<PathBuf> = OnceCell::new();

/// The two startup registrations the engine's library surface allows
/// (spec §6.2). There is no further environment configuration.
pub struct EngineConfig;

impl EngineConfig {
    /// Register the process-wide database handle. Must be called exactly
    /// once, before any engine operation runs; the pool itself must not be
    /// empty/closed at the point of registration.
    pub fn register_db(pool: PgPool) -> Result<()> {
        DB_POOL
            .set(pool)
            .map_err(|_| EngineError::InvalidInput("database handle already registered".into()))
    }

    /// The process-wide database handle registered via `register_db`.
    pub fn db() -> Result<&'static PgPool> {
        DB_POOL.get().ok_or(EngineError::DbNotRegistered)
    }

    /// Register the process-wide blob directory root. Must not change
    /// across runs — doing so silently orphans existing blobs (spec §5).
    pub fn set_blobs_dir(path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(EngineError::BlobsDirNotRegistered);
        }
        BLOBS_DIR
            .set(path)
            .map_err(|_| EngineError::InvalidInput("blobs directory already registered".into()))
    }

    /// The process-wide blob directory root registered via `set_blobs_dir`.
    pub fn blobs_dir() -> Result<&'static PathBuf> {
        BLOBS_DIR.get().ok_or(EngineError::BlobsDirNotRegistered)
    }

    /// Install a default `tracing-subscriber` console logger. Optional —
    /// embedders with their own subscriber just never call this; the
    /// engine's own `tracing` calls work against whatever is installed.
    /// Uses `RUST_LOG` if set, `info` otherwise (teacher precedent:
    /// `tracing_subscriber::fmt().with_env_filter(log_level).init()` in the
    /// circuit breaker binaries).
    pub fn init_tracing() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .init();
    }

    /// Build an `EngineConfig`-scoped application config view via the
    /// `config` crate, for embedders that prefer environment-driven setup
    /// (`DOCFLOW_DATABASE_URL`, `DOCFLOW_BLOBS_DIR`) over calling
    /// `register_db`/`set_blobs_dir` directly.
    pub fn from_env() -> Result<RawSettings> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("DOCFLOW"))
            .build()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;

        let database_url = settings
            .get_string("database_url")
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let blobs_dir = settings
            .get_string("blobs_dir")
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;

        Ok(RawSettings { database_url, blobs_dir: PathBuf::from(blobs_dir) })
    }
}

/// The two settings `EngineConfig::from_env` can resolve from the
/// environment; the caller still drives `register_db`/`set_blobs_dir`
/// themselves (e.g. after building the pool asynchronously).
#[derive(Debug, Clone)]
pub struct RawSettings {
    pub database_url: String,
    pub blobs_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_blobs_dir() {
        // Each test process gets its own OnceCell state; this checks the
        // validation independent of registration ordering across tests.
        assert!(matches!(
            EngineConfig::set_blobs_dir(""),
            Err(EngineError::BlobsDirNotRegistered)
        ));
    }
}
