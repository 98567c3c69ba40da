use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use super::{LabelFilter, QueryFilter, RecordStore, RemovalCounts};
use crate::error::{EvalError, Result};
use crate::model::{Index, IndexConfiguration, Label, LabelSet, Query, RecordId, ScoredDocs};
use crate::util::now_utc_string;

const DB_SCHEMA_VERSION: &str = "0.1.0";

const LABEL_COLUMNS: &str = "
    l.label_id,
    l.query_key,
    s.label_set_id,
    s.name,
    l.index_id,
    l.relevant_docs,
    l.comprehensive
";

type LabelRow = (RecordId, String, RecordId, String, String, String, bool);
type QueryRow = (RecordId, String, String, String, String, String, String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub indexes: usize,
    pub label_sets: usize,
    pub labels: usize,
    pub queries: usize,
    pub attached_labels: usize,
}

pub struct SqliteRecordStore {
    connection: Connection,
}

impl SqliteRecordStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection.pragma_update(None, "foreign_keys", "ON")?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            indexes: self.count_rows("SELECT COUNT(*) FROM indexes")?,
            label_sets: self.count_rows("SELECT COUNT(*) FROM label_sets")?,
            labels: self.count_rows("SELECT COUNT(*) FROM labels")?,
            queries: self.count_rows("SELECT COUNT(*) FROM queries")?,
            attached_labels: self.count_rows("SELECT COUNT(*) FROM query_labels")?,
        })
    }

    pub fn list_indexes(&self) -> Result<Vec<Index>> {
        let mut statement = self.connection.prepare(
            "
            SELECT index_id, database_name, collection_name, name, path, num_dimensions, similarity
            FROM indexes
            ORDER BY index_id ASC
            ",
        )?;
        let indexes = statement
            .query_map([], index_from_row)?
            .collect::<rusqlite::Result<Vec<Index>>>()?;
        Ok(indexes)
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        let version = self
            .connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn count_rows(&self, sql: &str) -> Result<usize> {
        let count: i64 = self.connection.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn labels_for_query(&self, query_id: RecordId) -> Result<Vec<Label>> {
        let sql = format!(
            "
            SELECT {LABEL_COLUMNS}
            FROM query_labels ql
            JOIN labels l ON l.label_id = ql.label_id
            JOIN label_sets s ON s.label_set_id = l.label_set_id
            WHERE ql.query_id = ?1
            ORDER BY ql.position ASC
            "
        );
        let mut statement = self.connection.prepare_cached(&sql)?;
        let rows = statement
            .query_map([query_id], label_row)?
            .collect::<rusqlite::Result<Vec<LabelRow>>>()?;
        rows.into_iter().map(label_from_row).collect()
    }

    fn attach_labels(&self, query_id: RecordId, labels: &[Label]) -> Result<()> {
        let mut statement = self.connection.prepare_cached(
            "INSERT INTO query_labels(query_id, label_id, position) VALUES(?1, ?2, ?3)",
        )?;
        for (position, label) in labels.iter().enumerate() {
            let Some(label_id) = label.id else {
                return Err(EvalError::InvalidArgument(format!(
                    "label for key {} must be stored before it is attached",
                    label.key
                )));
            };
            statement.execute(params![query_id, label_id, position as i64])?;
        }
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn get_index(&self, index_id: &str) -> Result<Index> {
        self.connection
            .query_row(
                "
                SELECT index_id, database_name, collection_name, name, path, num_dimensions, similarity
                FROM indexes
                WHERE index_id = ?1
                ",
                [index_id],
                index_from_row,
            )
            .optional()?
            .ok_or_else(|| EvalError::IndexNotFound {
                index: index_id.to_string(),
            })
    }

    fn get_or_create_index(&self, index: &Index) -> Result<Index> {
        let inserted = self.connection.execute(
            "
            INSERT INTO indexes(index_id, database_name, collection_name, name, path, num_dimensions, similarity, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(index_id) DO NOTHING
            ",
            params![
                index.index_id,
                index.database,
                index.collection,
                index.configuration.name,
                index.configuration.path,
                index.configuration.num_dimensions as i64,
                index.configuration.similarity,
                now_utc_string(),
            ],
        )?;
        debug!(index_id = %index.index_id, created = inserted > 0, "index get-or-create");
        self.get_index(&index.index_id)
    }

    fn get_or_create_label_set(&self, name: &str) -> Result<LabelSet> {
        if name.trim().is_empty() {
            return Err(EvalError::InvalidArgument(
                "label set name must not be blank".to_string(),
            ));
        }

        self.connection.execute(
            "
            INSERT INTO label_sets(name, created_at)
            VALUES(?1, ?2)
            ON CONFLICT(name) DO NOTHING
            ",
            params![name, now_utc_string()],
        )?;

        let label_set = self.connection.query_row(
            "SELECT label_set_id, name FROM label_sets WHERE name = ?1",
            [name],
            |row| {
                Ok(LabelSet {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok(label_set)
    }

    fn insert_label(&self, label: &Label) -> Result<Label> {
        let relevant_docs = serde_json::to_string(&label.relevant_docs)?;
        self.connection.execute(
            "
            INSERT INTO labels(query_key, label_set_id, index_id, relevant_docs, comprehensive, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                label.key,
                label.label_set.id,
                label.index_id,
                relevant_docs,
                label.comprehensive,
                now_utc_string(),
            ],
        )?;

        let mut stored = label.clone();
        stored.id = Some(self.connection.last_insert_rowid());
        Ok(stored)
    }

    fn find_labels(&self, filter: &LabelFilter) -> Result<Vec<Label>> {
        let mut clauses = Vec::<&str>::new();
        let mut values = Vec::<String>::new();
        if let Some(index_id) = &filter.index_id {
            clauses.push("l.index_id = ?");
            values.push(index_id.clone());
        }
        if let Some(key) = &filter.key {
            clauses.push("l.query_key = ?");
            values.push(key.clone());
        }
        if let Some(label_set) = &filter.label_set {
            clauses.push("s.name = ?");
            values.push(label_set.clone());
        }

        let sql = format!(
            "
            SELECT {LABEL_COLUMNS}
            FROM labels l
            JOIN label_sets s ON s.label_set_id = l.label_set_id
            {}
            ORDER BY l.label_id ASC
            ",
            where_clause(&clauses)
        );
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement
            .query_map(params_from_iter(values.iter()), label_row)?
            .collect::<rusqlite::Result<Vec<LabelRow>>>()?;
        rows.into_iter().map(label_from_row).collect()
    }

    fn insert_query(&self, query: &Query) -> Result<Query> {
        let transaction = self.connection.unchecked_transaction()?;
        transaction.execute(
            "
            INSERT INTO queries(query_key, index_id, text, vector, search_call, predictions, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                query.key,
                query.index_id,
                query.text,
                serde_json::to_string(&query.vector)?,
                query.search_call,
                serde_json::to_string(&query.predictions)?,
                now_utc_string(),
            ],
        )?;
        let query_id = transaction.last_insert_rowid();
        self.attach_labels(query_id, &query.labels)?;
        transaction.commit()?;

        let mut stored = query.clone();
        stored.id = Some(query_id);
        Ok(stored)
    }

    fn find_queries(&self, filter: &QueryFilter) -> Result<Vec<Query>> {
        filter.validate()?;

        let mut clauses = Vec::<String>::new();
        let mut values = Vec::<String>::new();
        if let Some(index_id) = &filter.index_id {
            clauses.push("q.index_id = ?".to_string());
            values.push(index_id.clone());
        }
        if !filter.keys.is_empty() {
            let placeholders = vec!["?"; filter.keys.len()].join(", ");
            clauses.push(format!("q.query_key IN ({placeholders})"));
            values.extend(filter.keys.iter().cloned());
        }
        if let Some(label_set) = &filter.label_set {
            clauses.push(
                "
                EXISTS (
                  SELECT 1
                  FROM query_labels ql
                  JOIN labels l ON l.label_id = ql.label_id
                  JOIN label_sets s ON s.label_set_id = l.label_set_id
                  WHERE ql.query_id = q.query_id AND s.name = ?
                )
                "
                .to_string(),
            );
            values.push(label_set.clone());
        }

        let clause_refs = clauses.iter().map(String::as_str).collect::<Vec<_>>();
        let sql = format!(
            "
            SELECT q.query_id, q.query_key, q.index_id, q.text, q.vector, q.search_call, q.predictions
            FROM queries q
            {}
            ORDER BY q.query_id ASC
            ",
            where_clause(&clause_refs)
        );

        let rows = {
            let mut statement = self.connection.prepare(&sql)?;
            statement
                .query_map(params_from_iter(values.iter()), |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<QueryRow>>>()?
        };

        let mut queries = Vec::with_capacity(rows.len());
        for (query_id, key, index_id, text, vector, search_call, predictions) in rows {
            queries.push(Query {
                id: Some(query_id),
                key,
                index_id,
                text,
                vector: serde_json::from_str(&vector)?,
                search_call,
                predictions: serde_json::from_str::<ScoredDocs>(&predictions)?,
                labels: self.labels_for_query(query_id)?,
            });
        }

        debug!(count = queries.len(), "queries fetched");
        Ok(queries)
    }

    fn save_query(&self, query: &Query) -> Result<()> {
        let Some(query_id) = query.id else {
            return Err(EvalError::InvalidArgument(format!(
                "query for key {} has not been stored yet",
                query.key
            )));
        };

        let transaction = self.connection.unchecked_transaction()?;
        let updated = transaction.execute(
            "
            UPDATE queries
            SET query_key = ?2, index_id = ?3, text = ?4, vector = ?5, search_call = ?6, predictions = ?7
            WHERE query_id = ?1
            ",
            params![
                query_id,
                query.key,
                query.index_id,
                query.text,
                serde_json::to_string(&query.vector)?,
                query.search_call,
                serde_json::to_string(&query.predictions)?,
            ],
        )?;
        if updated == 0 {
            return Err(EvalError::InvalidArgument(format!(
                "query {query_id} does not exist"
            )));
        }

        transaction.execute("DELETE FROM query_labels WHERE query_id = ?1", [query_id])?;
        self.attach_labels(query_id, &query.labels)?;
        transaction.commit()?;
        Ok(())
    }

    fn remove_index_records(&self, index_id: &str) -> Result<RemovalCounts> {
        let transaction = self.connection.unchecked_transaction()?;
        transaction.execute(
            "
            DELETE FROM query_labels
            WHERE query_id IN (SELECT query_id FROM queries WHERE index_id = ?1)
               OR label_id IN (SELECT label_id FROM labels WHERE index_id = ?1)
            ",
            [index_id],
        )?;
        let queries = transaction.execute("DELETE FROM queries WHERE index_id = ?1", [index_id])?;
        let labels = transaction.execute("DELETE FROM labels WHERE index_id = ?1", [index_id])?;
        let indexes = transaction.execute("DELETE FROM indexes WHERE index_id = ?1", [index_id])?;
        transaction.commit()?;

        Ok(RemovalCounts {
            index_removed: indexes > 0,
            queries,
            labels,
        })
    }
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS indexes (
          index_id TEXT PRIMARY KEY,
          database_name TEXT NOT NULL,
          collection_name TEXT NOT NULL,
          name TEXT NOT NULL,
          path TEXT NOT NULL,
          num_dimensions INTEGER NOT NULL,
          similarity TEXT NOT NULL,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS label_sets (
          label_set_id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL UNIQUE,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS labels (
          label_id INTEGER PRIMARY KEY AUTOINCREMENT,
          query_key TEXT NOT NULL,
          label_set_id INTEGER NOT NULL,
          index_id TEXT NOT NULL,
          relevant_docs TEXT NOT NULL,
          comprehensive INTEGER NOT NULL,
          created_at TEXT NOT NULL,
          FOREIGN KEY(label_set_id) REFERENCES label_sets(label_set_id)
        );

        CREATE TABLE IF NOT EXISTS queries (
          query_id INTEGER PRIMARY KEY AUTOINCREMENT,
          query_key TEXT NOT NULL,
          index_id TEXT NOT NULL,
          text TEXT NOT NULL,
          vector TEXT NOT NULL,
          search_call TEXT NOT NULL,
          predictions TEXT NOT NULL,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS query_labels (
          query_id INTEGER NOT NULL,
          label_id INTEGER NOT NULL,
          position INTEGER NOT NULL,
          PRIMARY KEY (query_id, label_id),
          FOREIGN KEY (query_id) REFERENCES queries(query_id) ON DELETE CASCADE,
          FOREIGN KEY (label_id) REFERENCES labels(label_id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_labels_index_key ON labels(index_id, query_key);
        CREATE INDEX IF NOT EXISTS idx_queries_index_key ON queries(index_id, query_key);
        CREATE INDEX IF NOT EXISTS idx_query_labels_label ON query_labels(label_id);
        ",
    )?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

fn where_clause(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

fn index_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Index> {
    Ok(Index {
        index_id: row.get(0)?,
        database: row.get(1)?,
        collection: row.get(2)?,
        configuration: IndexConfiguration {
            name: row.get(3)?,
            path: row.get(4)?,
            num_dimensions: row.get::<_, i64>(5)? as usize,
            similarity: row.get(6)?,
        },
    })
}

fn label_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LabelRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn label_from_row(row: LabelRow) -> Result<Label> {
    let (label_id, key, label_set_id, label_set_name, index_id, relevant_docs, comprehensive) = row;
    Ok(Label {
        id: Some(label_id),
        key,
        label_set: LabelSet {
            id: label_set_id,
            name: label_set_name,
        },
        index_id,
        relevant_docs: serde_json::from_str(&relevant_docs)?,
        comprehensive,
    })
}
