//! Document repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist a whole label tree as `labels` rows plus one `attributes` row
//!   per attribute kind.
//! - Rebuild a label store from those rows.
//!
//! # Invariants
//! - A save replaces the previous content in a single transaction.
//! - Every loaded label has its father loaded too; orphans are invalid data.
//! - The `kind` column always matches the kind of the decoded payload.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::label::{AttrValue, Entry, LabelData, LabelStore};
use rusqlite::{params, Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Attribute payload could not be encoded or decoded.
    Payload(serde_json::Error),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted rows do not form a valid label tree.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Payload(err) => write!(f, "invalid attribute payload: {err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "document repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "document repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "document repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Payload(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Payload(value)
    }
}

/// Storage of whole documents.
pub trait DocumentRepository {
    /// Replaces the stored document with `store`; returns the label count.
    fn save_store(&mut self, store: &LabelStore) -> RepoResult<usize>;
    /// Loads the stored document. An empty database yields a root-only store.
    fn load_store(&self) -> RepoResult<LabelStore>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_document_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn save_store(&mut self, store: &LabelStore) -> RepoResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM attributes;", [])?;
        tx.execute("DELETE FROM labels;", [])?;

        let mut count = 0usize;
        {
            let mut insert_label = tx.prepare("INSERT INTO labels (entry, depth) VALUES (?1, ?2);")?;
            let mut insert_attr =
                tx.prepare("INSERT INTO attributes (entry, kind, payload) VALUES (?1, ?2, ?3);")?;
            for (entry, data) in store.iter() {
                let entry_text = entry.to_string();
                insert_label.execute(params![entry_text, entry.depth() as i64])?;
                for value in data.iter() {
                    let payload = serde_json::to_string(value)?;
                    insert_attr.execute(params![entry_text, value.kind().as_str(), payload])?;
                }
                count += 1;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn load_store(&self) -> RepoResult<LabelStore> {
        let mut labels: Vec<(Entry, LabelData)> = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT entry FROM labels ORDER BY depth ASC, entry ASC;")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let text: String = row.get("entry")?;
                labels.push((parse_entry(&text)?, LabelData::default()));
            }
        }

        let mut store = LabelStore::new();
        for (entry, data) in labels {
            if let Some(father) = entry.father() {
                if !store.contains(&father) {
                    return Err(RepoError::InvalidData(format!(
                        "label `{entry}` has no stored father"
                    )));
                }
            }
            store.insert_label(entry, data);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT entry, kind, payload FROM attributes ORDER BY entry ASC, kind ASC;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let entry = parse_entry(&row.get::<_, String>("entry")?)?;
            let kind: String = row.get("kind")?;
            let payload: String = row.get("payload")?;
            let value: AttrValue = serde_json::from_str(&payload)?;
            if value.kind().as_str() != kind {
                return Err(RepoError::InvalidData(format!(
                    "attribute of `{entry}` stored as `{kind}` decodes as `{}`",
                    value.kind().as_str()
                )));
            }
            if !store.contains(&entry) {
                return Err(RepoError::InvalidData(format!(
                    "attribute references unknown label `{entry}`"
                )));
            }
            store.put_attr(&entry, value);
        }
        Ok(store)
    }
}

fn parse_entry(text: &str) -> RepoResult<Entry> {
    text.parse::<Entry>()
        .map_err(|err| RepoError::InvalidData(err.to_string()))
}

fn ensure_document_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in [
        ("labels", &["entry", "depth"][..]),
        ("attributes", &["entry", "kind", "payload"][..]),
    ] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
