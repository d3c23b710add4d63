//! Completion ledger: the persisted record of already-scanned articles.
//!
//! The ledger is the only shared resource between journal workers. Each
//! worker opens its own handle via [`LedgerFactory`], so no in-process
//! locking is needed; SQLite (WAL mode) synchronizes the file itself.
//! Writes are idempotent-on-duplicate (`INSERT OR IGNORE`) as a second line
//! of defense behind the dedup lookup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags, params};
use serde::Serialize;
use thiserror::Error;

use crate::{ArticleKey, MatchPages, ResultRow, ScanOutcome};

/// Default ledger table name.
pub const DEFAULT_TABLE: &str = "placebo_count";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Connection parameters for the SQLite ledger, passed explicitly into the
/// factory rather than read from ambient process state.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub table: String,
}

impl LedgerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

/// What a dedup lookup reveals about a prior row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorRow {
    pub matched: bool,
    pub error: bool,
}

/// A fully denormalized ledger row, as stored. This is the export unit and
/// the serialization boundary: mapping [`ResultRow`] to storage columns is
/// the ledger's concern, not the scanning logic's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub journal_name: String,
    pub year: i32,
    pub volume: String,
    pub issue: String,
    pub article: String,
    pub matched: bool,
    /// Comma-joined 0-based page indices, `"?"` for a fallback match with
    /// unknown pages, `None` otherwise.
    pub pages: Option<String>,
    pub error: bool,
}

impl ExportRow {
    pub fn from_result(row: &ResultRow) -> Self {
        let (matched, pages) = match &row.outcome {
            ScanOutcome::Match {
                pages: MatchPages::Known(indices),
            } => (
                true,
                Some(
                    indices
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
            ),
            ScanOutcome::Match {
                pages: MatchPages::Unknown,
            } => (true, Some("?".to_string())),
            ScanOutcome::NoMatch | ScanOutcome::Failed { .. } => (false, None),
        };
        Self {
            journal_name: row.key.journal_name.clone(),
            year: row.key.year,
            volume: row.key.volume.clone(),
            issue: row.key.issue.clone(),
            article: row.key.article_filename.clone(),
            matched,
            pages,
            error: row.outcome.is_error(),
        }
    }
}

/// One worker's handle on the completion ledger.
pub trait Ledger: Send {
    /// Dedup check: what, if anything, is already recorded for `key`.
    fn lookup(&self, key: &ArticleKey) -> Result<Option<PriorRow>, LedgerError>;

    /// Record one result. Duplicate inserts are silently ignored.
    fn insert(&self, row: &ResultRow) -> Result<(), LedgerError>;

    /// Overwrite an existing row. Used only when re-attempting a prior
    /// errored row; the normal path never updates.
    fn replace(&self, row: &ResultRow) -> Result<(), LedgerError>;

    /// Every stored row, ordered by key. Consumed by the export step.
    fn export_all(&self) -> Result<Vec<ExportRow>, LedgerError>;
}

/// Opens per-worker ledger handles. Each parallel journal worker gets its
/// own connection; none are shared across tasks.
pub trait LedgerFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn Ledger>, LedgerError>;
}

// ── SQLite implementation ───────────────────────────────────────────────

fn check_table_name(table: &str) -> Result<(), LedgerError> {
    // Identifiers cannot be bound as parameters; restrict to a safe charset
    // before interpolating into SQL.
    let ok = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(LedgerError::InvalidTableName(table.to_string()))
    }
}

/// SQLite-backed ledger: one connection, WAL mode, cached statements.
pub struct SqliteLedger {
    conn: Connection,
    table: String,
}

impl SqliteLedger {
    /// Open (and create if needed) the ledger at `config.path`.
    ///
    /// The table and its composite uniqueness index over
    /// `(journal_name, volume, issue, article)` are created on first open.
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        check_table_name(&config.table)?;
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&config.path, flags)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        let table = &config.table;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 journal_name TEXT NOT NULL,
                 year         INTEGER NOT NULL,
                 volume       TEXT NOT NULL,
                 issue        TEXT NOT NULL,
                 article      TEXT NOT NULL,
                 \"match\"      INTEGER NOT NULL,
                 pages        TEXT,
                 error        INTEGER NOT NULL
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_key
                 ON {table} (journal_name, volume, issue, article);",
        ))?;
        Ok(Self {
            conn,
            table: config.table.clone(),
        })
    }
}

impl Ledger for SqliteLedger {
    fn lookup(&self, key: &ArticleKey) -> Result<Option<PriorRow>, LedgerError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT \"match\", error FROM {}
             WHERE journal_name = ?1 AND volume = ?2 AND issue = ?3 AND article = ?4",
            self.table
        ))?;
        let row = stmt
            .query_row(
                params![key.journal_name, key.volume, key.issue, key.article_filename],
                |row| {
                    let matched: i64 = row.get(0)?;
                    let error: i64 = row.get(1)?;
                    Ok(PriorRow {
                        matched: matched != 0,
                        error: error != 0,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    fn insert(&self, row: &ResultRow) -> Result<(), LedgerError> {
        self.write(row, "INSERT OR IGNORE")
    }

    fn replace(&self, row: &ResultRow) -> Result<(), LedgerError> {
        self.write(row, "INSERT OR REPLACE")
    }

    fn export_all(&self) -> Result<Vec<ExportRow>, LedgerError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT journal_name, year, volume, issue, article, \"match\", pages, error
             FROM {}
             ORDER BY journal_name, year, volume, issue, article",
            self.table
        ))?;
        let rows = stmt
            .query_map([], |row| {
                let matched: i64 = row.get(5)?;
                let error: i64 = row.get(7)?;
                Ok(ExportRow {
                    journal_name: row.get(0)?,
                    year: row.get(1)?,
                    volume: row.get(2)?,
                    issue: row.get(3)?,
                    article: row.get(4)?,
                    matched: matched != 0,
                    pages: row.get(6)?,
                    error: error != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl SqliteLedger {
    fn write(&self, row: &ResultRow, verb: &str) -> Result<(), LedgerError> {
        let export = ExportRow::from_result(row);
        let mut stmt = self.conn.prepare_cached(&format!(
            "{verb} INTO {}
                 (journal_name, year, volume, issue, article, \"match\", pages, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            self.table
        ))?;
        stmt.execute(params![
            export.journal_name,
            export.year,
            export.volume,
            export.issue,
            export.article,
            export.matched as i64,
            export.pages,
            export.error as i64,
        ])?;
        Ok(())
    }
}

/// Factory handing each worker its own SQLite connection.
pub struct SqliteLedgerFactory {
    config: LedgerConfig,
}

impl SqliteLedgerFactory {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }
}

impl LedgerFactory for SqliteLedgerFactory {
    fn open(&self) -> Result<Box<dyn Ledger>, LedgerError> {
        Ok(Box::new(SqliteLedger::open(&self.config)?))
    }
}

// ── In-memory implementation ────────────────────────────────────────────

type MemKey = (String, String, String, String);

/// In-memory ledger for tests and dry runs. Cloned handles share one map,
/// mirroring multiple connections to one database file.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    rows: Arc<Mutex<HashMap<MemKey, ExportRow>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn mem_key(key: &ArticleKey) -> MemKey {
    (
        key.journal_name.clone(),
        key.volume.clone(),
        key.issue.clone(),
        key.article_filename.clone(),
    )
}

impl Ledger for MemoryLedger {
    fn lookup(&self, key: &ArticleKey) -> Result<Option<PriorRow>, LedgerError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.get(&mem_key(key)).map(|r| PriorRow {
            matched: r.matched,
            error: r.error,
        }))
    }

    fn insert(&self, row: &ResultRow) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.entry(mem_key(&row.key))
            .or_insert_with(|| ExportRow::from_result(row));
        Ok(())
    }

    fn replace(&self, row: &ResultRow) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.insert(mem_key(&row.key), ExportRow::from_result(row));
        Ok(())
    }

    fn export_all(&self) -> Result<Vec<ExportRow>, LedgerError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<ExportRow> = rows.values().cloned().collect();
        all.sort_by(|a, b| {
            (&a.journal_name, a.year, &a.volume, &a.issue, &a.article).cmp(&(
                &b.journal_name,
                b.year,
                &b.volume,
                &b.issue,
                &b.article,
            ))
        });
        Ok(all)
    }
}

impl LedgerFactory for MemoryLedger {
    fn open(&self) -> Result<Box<dyn Ledger>, LedgerError> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IssueDescriptor;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_ledger_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "placeboscan_ledger_test_{}_{}",
            std::process::id(),
            id,
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("ledger.db")
    }

    fn key(article: &str) -> ArticleKey {
        ArticleKey::new(
            "Journal of Tests",
            &IssueDescriptor {
                year: 2015,
                volume: "30".to_string(),
                issue: "2".to_string(),
            },
            article,
        )
    }

    fn match_row(article: &str, pages: Vec<usize>) -> ResultRow {
        ResultRow {
            key: key(article),
            outcome: ScanOutcome::Match {
                pages: MatchPages::Known(pages),
            },
        }
    }

    fn error_row(article: &str) -> ResultRow {
        ResultRow {
            key: key(article),
            outcome: ScanOutcome::Failed {
                reason: "boom".to_string(),
            },
        }
    }

    #[test]
    fn export_row_serialization() {
        let row = match_row("a.pdf", vec![3, 7]);
        let export = ExportRow::from_result(&row);
        assert!(export.matched);
        assert!(!export.error);
        assert_eq!(export.pages.as_deref(), Some("3, 7"));

        let unknown = ResultRow {
            key: key("b.pdf"),
            outcome: ScanOutcome::Match {
                pages: MatchPages::Unknown,
            },
        };
        assert_eq!(
            ExportRow::from_result(&unknown).pages.as_deref(),
            Some("?")
        );

        let failed = ExportRow::from_result(&error_row("c.pdf"));
        assert!(failed.error);
        assert!(!failed.matched);
        assert!(failed.pages.is_none());
    }

    #[test]
    fn sqlite_roundtrip() {
        let path = temp_ledger_path();
        let ledger = SqliteLedger::open(&LedgerConfig::new(&path)).unwrap();

        assert!(ledger.lookup(&key("a.pdf")).unwrap().is_none());
        ledger.insert(&match_row("a.pdf", vec![0, 4])).unwrap();

        let prior = ledger.lookup(&key("a.pdf")).unwrap().unwrap();
        assert!(prior.matched);
        assert!(!prior.error);

        let rows = ledger.export_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pages.as_deref(), Some("0, 4"));
        assert_eq!(rows[0].year, 2015);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sqlite_duplicate_insert_ignored() {
        let path = temp_ledger_path();
        let ledger = SqliteLedger::open(&LedgerConfig::new(&path)).unwrap();

        ledger.insert(&match_row("a.pdf", vec![1])).unwrap();
        // Second insert with a different outcome is silently dropped.
        ledger.insert(&error_row("a.pdf")).unwrap();

        let rows = ledger.export_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].matched);
        assert!(!rows[0].error);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sqlite_replace_overwrites() {
        let path = temp_ledger_path();
        let ledger = SqliteLedger::open(&LedgerConfig::new(&path)).unwrap();

        ledger.insert(&error_row("a.pdf")).unwrap();
        ledger.replace(&match_row("a.pdf", vec![2])).unwrap();

        let rows = ledger.export_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].matched);
        assert!(!rows[0].error);
        assert_eq!(rows[0].pages.as_deref(), Some("2"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let path = temp_ledger_path();
        let config = LedgerConfig::new(&path);
        {
            let ledger = SqliteLedger::open(&config).unwrap();
            ledger.insert(&match_row("a.pdf", vec![3])).unwrap();
        }
        let ledger = SqliteLedger::open(&config).unwrap();
        assert!(ledger.lookup(&key("a.pdf")).unwrap().is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sqlite_concurrent_handles() {
        let path = temp_ledger_path();
        let factory =
            Arc::new(SqliteLedgerFactory::new(LedgerConfig::new(&path)));

        let mut handles = vec![];
        for i in 0..8 {
            let f = Arc::clone(&factory);
            handles.push(std::thread::spawn(move || {
                let ledger = f.open().unwrap();
                let row = ResultRow {
                    key: ArticleKey::new(
                        &format!("Journal {}", i),
                        &IssueDescriptor {
                            year: 2015,
                            volume: "1".to_string(),
                            issue: "1".to_string(),
                        },
                        "a.pdf",
                    ),
                    outcome: ScanOutcome::NoMatch,
                };
                ledger.insert(&row).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let ledger = factory.open().unwrap();
        assert_eq!(ledger.export_all().unwrap().len(), 8);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_hostile_table_name() {
        let config = LedgerConfig::new(temp_ledger_path()).with_table("x; DROP TABLE y");
        assert!(matches!(
            SqliteLedger::open(&config),
            Err(LedgerError::InvalidTableName(_))
        ));
    }

    #[test]
    fn memory_ledger_shares_state_across_handles() {
        let shared = MemoryLedger::new();
        let a = shared.open().unwrap();
        let b = shared.open().unwrap();

        a.insert(&match_row("a.pdf", vec![1])).unwrap();
        assert!(b.lookup(&key("a.pdf")).unwrap().is_some());
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn memory_ledger_insert_is_idempotent() {
        let ledger = MemoryLedger::new();
        ledger.insert(&match_row("a.pdf", vec![1])).unwrap();
        ledger.insert(&error_row("a.pdf")).unwrap();
        let rows = ledger.export_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].matched);
    }

    #[test]
    fn export_is_ordered_by_key() {
        let ledger = MemoryLedger::new();
        ledger.insert(&match_row("b.pdf", vec![0])).unwrap();
        ledger.insert(&match_row("a.pdf", vec![0])).unwrap();
        let rows = ledger.export_all().unwrap();
        assert_eq!(rows[0].article, "a.pdf");
        assert_eq!(rows[1].article, "b.pdf");
    }
}
