use std::path::PathBuf;

pub mod backend;
pub mod config_file;
pub mod coordinator;
pub mod denylist;
pub mod ledger;
pub mod matcher;
pub mod scanner;
pub mod walker;
pub mod worker;

// Re-export for convenience
pub use backend::{DocExtractor, ExtractorError, PageExtractor};
pub use coordinator::{
    BatchEvent, BatchReport, CoordinatorError, ProgressCallback, run_batch, run_batch_sequential,
};
pub use denylist::{DenyEntry, Denylist};
pub use ledger::{
    ExportRow, Ledger, LedgerConfig, LedgerError, LedgerFactory, MemoryLedger, SqliteLedger,
    SqliteLedgerFactory,
};
pub use matcher::{DEFAULT_PATTERN, PatternMatcher};
pub use scanner::ArticleScanner;
pub use walker::{ArticleEntry, CorpusWalker, IssueDescriptor, LayoutError};
pub use worker::{JournalStats, WorkerError, process_journal};

/// Uniquely identifies one article in the corpus.
///
/// Derived from the filesystem path (journal directory, issue directory,
/// file name) and immutable afterwards. Doubles as the dedup lookup key and
/// the persisted row key; ledger uniqueness is over
/// `(journal_name, volume, issue, article_filename)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleKey {
    pub journal_name: String,
    pub year: i32,
    pub volume: String,
    pub issue: String,
    pub article_filename: String,
}

impl ArticleKey {
    pub fn new(journal_name: &str, issue: &IssueDescriptor, article_filename: &str) -> Self {
        Self {
            journal_name: journal_name.to_string(),
            year: issue.year,
            volume: issue.volume.clone(),
            issue: issue.issue.clone(),
            article_filename: article_filename.to_string(),
        }
    }
}

/// Where a match was found.
///
/// Only the page-addressable primary extractor can report page indices; a
/// fallback match carries no page information and is kept as a distinct
/// variant rather than a fake page list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPages {
    /// 0-based page indices, strictly increasing.
    Known(Vec<usize>),
    /// Matched via whole-document fallback extraction; pages unknown.
    Unknown,
}

/// Outcome of scanning one article. A failed scan never reports a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Match { pages: MatchPages },
    NoMatch,
    Failed { reason: String },
}

impl ScanOutcome {
    pub fn matched(&self) -> bool {
        matches!(self, ScanOutcome::Match { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ScanOutcome::Failed { .. })
    }
}

/// The persisted unit: one scanned article and its outcome.
///
/// Created once per article and never updated (except when an errored row is
/// explicitly re-attempted, see [`ScanConfig::retry_errors`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub key: ArticleKey,
    pub outcome: ScanOutcome,
}

/// Scan run configuration.
///
/// Passed explicitly into the coordinator and the ledger factory; there is no
/// ambient/global configuration state.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Root directory containing one subdirectory per journal.
    pub corpus_root: PathBuf,
    /// Name of the per-journal directory that holds issue directories.
    pub article_subdir: String,
    /// Inclusive year window; issues outside it are excluded from the dataset.
    pub year_min: i32,
    pub year_max: i32,
    /// Custom match pattern; `None` uses [`DEFAULT_PATTERN`].
    pub pattern: Option<String>,
    pub denylist: Denylist,
    /// Re-attempt articles whose prior row recorded an extraction error.
    /// Default false: any prior row, errored or not, is skipped.
    pub retry_errors: bool,
    /// Parallel journal workers; 0 = available parallelism.
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            corpus_root: PathBuf::from("Data"),
            article_subdir: "PDFs".to_string(),
            year_min: 2009,
            year_max: 2021,
            pattern: None,
            denylist: Denylist::builtin(),
            retry_errors: false,
            workers: 0,
        }
    }
}

impl ScanConfig {
    /// Build the pattern matcher for this run.
    pub fn matcher(&self) -> Result<PatternMatcher, regex::Error> {
        match &self.pattern {
            Some(p) => PatternMatcher::new(p),
            None => Ok(PatternMatcher::default()),
        }
    }
}
