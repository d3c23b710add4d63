//! Per-journal scan worker: walk one journal's articles, dedup against the
//! ledger, scan what's new, persist results.

use thiserror::Error;

use crate::ledger::{Ledger, LedgerError};
use crate::scanner::ArticleScanner;
use crate::walker::{CorpusWalker, LayoutError};
use crate::{ArticleKey, ResultRow};

/// A journal-level failure. These abort the journal, not the batch: the
/// coordinator records the failure and moves on.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Counters for one journal's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JournalStats {
    /// Articles scanned this run (extraction attempted).
    pub scanned: usize,
    /// Of those scanned, how many matched.
    pub matched: usize,
    /// Articles skipped because a prior row already existed.
    pub skipped: usize,
    /// Of those scanned, how many ended in a contained failure.
    pub failed: usize,
}

impl JournalStats {
    pub fn add(&mut self, other: &JournalStats) {
        self.scanned += other.scanned;
        self.matched += other.matched;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Scan every new article of one journal.
///
/// Per article: build the key, consult the ledger, and either skip (prior
/// row exists) or scan and persist. With `retry_errors`, a prior row whose
/// `error` flag is set is re-scanned and overwritten; non-errored prior rows
/// are still skipped.
///
/// Article-level extraction failures are contained inside the scanner and
/// recorded as errored rows; only layout and ledger failures abort the
/// journal.
pub fn process_journal(
    journal: &str,
    walker: &CorpusWalker,
    ledger: &dyn Ledger,
    scanner: &ArticleScanner<'_>,
    retry_errors: bool,
) -> Result<JournalStats, WorkerError> {
    tracing::info!(journal, "scanning journal");
    let mut stats = JournalStats::default();

    for entry in walker.articles(journal)? {
        let entry = entry?;
        let filename = entry
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = ArticleKey::new(journal, &entry.issue, &filename);

        let mut overwrite = false;
        if let Some(prior) = ledger.lookup(&key)? {
            if retry_errors && prior.error {
                tracing::debug!(journal, article = %filename, "retrying errored article");
                overwrite = true;
            } else {
                stats.skipped += 1;
                continue;
            }
        }

        let outcome = scanner.scan(&entry.path, journal, &entry.issue.volume);
        stats.scanned += 1;
        if outcome.matched() {
            stats.matched += 1;
        }
        if outcome.is_error() {
            tracing::warn!(journal, article = %filename, "article scan failed");
            stats.failed += 1;
        }

        let row = ResultRow { key, outcome };
        if overwrite {
            ledger.replace(&row)?;
        } else {
            ledger.insert(&row)?;
        }
    }

    tracing::info!(
        journal,
        scanned = stats.scanned,
        matched = stats.matched,
        skipped = stats.skipped,
        failed = stats.failed,
        "journal done"
    );
    Ok(stats)
}
