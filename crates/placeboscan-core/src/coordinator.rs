//! Batch coordinator: fans journals out to parallel workers and collects a
//! per-journal report.
//!
//! Parallelism is journal-granular. Workers are blocking tasks (extraction
//! is CPU-bound and the PDF libraries are synchronous) draining a shared
//! channel of journal names; each opens its own ledger handle so no
//! connection is shared across tasks.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::{DocExtractor, PageExtractor};
use crate::ledger::LedgerFactory;
use crate::scanner::ArticleScanner;
use crate::walker::CorpusWalker;
use crate::worker::{JournalStats, WorkerError, process_journal};
use crate::ScanConfig;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("cannot enumerate corpus root {path}: {source}")]
    CorpusRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress notifications, emitted from worker threads.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    JournalStarted { journal: String },
    JournalFinished { journal: String, failed: bool },
}

pub type ProgressCallback = Arc<dyn Fn(BatchEvent) + Send + Sync>;

/// Every journal's result. Journal failures are collected here, never
/// dropped: one broken journal does not hide the rest of the batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub journals: Vec<(String, Result<JournalStats, WorkerError>)>,
}

impl BatchReport {
    /// Aggregate stats over the journals that completed.
    pub fn totals(&self) -> JournalStats {
        let mut total = JournalStats::default();
        for (_, result) in &self.journals {
            if let Ok(stats) = result {
                total.add(stats);
            }
        }
        total
    }

    pub fn failed_journals(&self) -> Vec<&str> {
        self.journals
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(j, _)| j.as_str())
            .collect()
    }
}

/// Run the full batch with parallel journal workers.
///
/// Worker count is `config.workers`, or the machine's available parallelism
/// when 0. Each worker loops: receive a journal name, open a fresh ledger
/// handle from `factory`, process the journal, report.
pub async fn run_batch(
    config: Arc<ScanConfig>,
    factory: Arc<dyn LedgerFactory>,
    primary: Arc<dyn PageExtractor>,
    fallback: Arc<dyn DocExtractor>,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, CoordinatorError> {
    let matcher = config.matcher()?;
    let walker = CorpusWalker::new(&config);
    let journals = walker
        .journals()
        .map_err(|e| CoordinatorError::CorpusRoot {
            path: config.corpus_root.clone(),
            source: e,
        })?;

    let workers = if config.workers == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        config.workers
    };
    let workers = workers.min(journals.len()).max(1);
    tracing::info!(journals = journals.len(), workers, "starting batch");

    let (tx, rx) = async_channel::unbounded::<String>();
    for journal in journals {
        // Unbounded channel, sends cannot block.
        let _ = tx.send(journal).await;
    }
    drop(tx);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = rx.clone();
        let config = Arc::clone(&config);
        let factory = Arc::clone(&factory);
        let primary = Arc::clone(&primary);
        let fallback = Arc::clone(&fallback);
        let matcher = matcher.clone();
        let walker = walker.clone();
        let progress = progress.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let mut results = Vec::new();
            while let Ok(journal) = rx.recv_blocking() {
                if let Some(cb) = &progress {
                    cb(BatchEvent::JournalStarted {
                        journal: journal.clone(),
                    });
                }
                let result = factory.open().map_err(WorkerError::from).and_then(|ledger| {
                    let scanner = ArticleScanner::new(
                        primary.as_ref(),
                        fallback.as_ref(),
                        &matcher,
                        &config.denylist,
                    );
                    process_journal(
                        &journal,
                        &walker,
                        ledger.as_ref(),
                        &scanner,
                        config.retry_errors,
                    )
                });
                if let Err(e) = &result {
                    tracing::error!(journal, error = %e, "journal failed");
                }
                if let Some(cb) = &progress {
                    cb(BatchEvent::JournalFinished {
                        journal: journal.clone(),
                        failed: result.is_err(),
                    });
                }
                results.push((journal, result));
            }
            results
        }));
    }

    let mut report = BatchReport::default();
    for handle in handles {
        match handle.await {
            Ok(results) => report.journals.extend(results),
            Err(e) => tracing::error!(error = %e, "worker task panicked"),
        }
    }
    report.journals.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(report)
}

/// Single-threaded variant of [`run_batch`], one journal at a time in sorted
/// order. Same per-journal semantics.
pub fn run_batch_sequential(
    config: &ScanConfig,
    factory: &dyn LedgerFactory,
    primary: &dyn PageExtractor,
    fallback: &dyn DocExtractor,
    progress: Option<&dyn Fn(BatchEvent)>,
) -> Result<BatchReport, CoordinatorError> {
    let matcher = config.matcher()?;
    let walker = CorpusWalker::new(config);
    let journals = walker
        .journals()
        .map_err(|e| CoordinatorError::CorpusRoot {
            path: config.corpus_root.clone(),
            source: e,
        })?;
    tracing::info!(journals = journals.len(), "starting sequential batch");

    let mut report = BatchReport::default();
    for journal in journals {
        if let Some(cb) = progress {
            cb(BatchEvent::JournalStarted {
                journal: journal.clone(),
            });
        }
        let result = factory.open().map_err(WorkerError::from).and_then(|ledger| {
            let scanner =
                ArticleScanner::new(primary, fallback, &matcher, &config.denylist);
            process_journal(
                &journal,
                &walker,
                ledger.as_ref(),
                &scanner,
                config.retry_errors,
            )
        });
        if let Err(e) = &result {
            tracing::error!(journal, error = %e, "journal failed");
        }
        if let Some(cb) = progress {
            cb(BatchEvent::JournalFinished {
                journal: journal.clone(),
                failed: result.is_err(),
            });
        }
        report.journals.push((journal, result));
    }
    Ok(report)
}
