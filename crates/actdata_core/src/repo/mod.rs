//! Repository layer over the SQLite document files.
//!
//! # Responsibility
//! - Define the document storage contract used by `open` and `save_as`.
//! - Keep SQL and payload encoding out of the model layer.
//!
//! # Invariants
//! - Repositories only accept connections migrated to the latest version.

pub mod document_repo;

pub use document_repo::{DocumentRepository, RepoError, RepoResult, SqliteDocumentRepository};
