use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use placeboscan_core::config_file::{self, ConfigFile, Settings};
use placeboscan_core::{
    BatchEvent, Ledger, LedgerConfig, SqliteLedger, SqliteLedgerFactory, run_batch,
    run_batch_sequential,
};
use placeboscan_pdf_extract::PdfExtractFallback;
use placeboscan_pdf_mupdf::MupdfExtractor;
use placeboscan_reporting::{ExportFormat, write_export};

const DEFAULT_DB_PATH: &str = "placeboscan.db";

/// Scan journal PDF corpora for placebo-test mentions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the corpus, recording results in the ledger database
    Scan {
        /// Corpus root directory (one subdirectory per journal)
        corpus_root: Option<PathBuf>,

        /// Path to the ledger SQLite database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Path to a TOML config file (default: ./.placeboscan.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scan journals one at a time instead of in parallel
        #[arg(long)]
        sequential: bool,

        /// Re-attempt articles whose prior scan recorded an error
        #[arg(long)]
        retry_errors: bool,

        /// Parallel journal workers (default: available CPU parallelism)
        #[arg(long)]
        workers: Option<usize>,

        /// Lower bound of the inclusive publication-year window
        #[arg(long)]
        year_min: Option<i32>,

        /// Upper bound of the inclusive publication-year window
        #[arg(long)]
        year_max: Option<i32>,

        /// Override the match pattern (a regex applied to lower-cased text)
        #[arg(long)]
        pattern: Option<String>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Export the ledger to CSV or JSON
    Export {
        /// Output file path
        output: PathBuf,

        /// Path to the ledger SQLite database
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: PathBuf,

        /// Ledger table name
        #[arg(long)]
        table: Option<String>,

        /// Output format: csv or json (default: inferred from extension)
        #[arg(long)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Scan {
            corpus_root,
            db,
            config,
            sequential,
            retry_errors,
            workers,
            year_min,
            year_max,
            pattern,
            no_progress,
        } => {
            let file_config = match config {
                Some(path) => config_file::load_from_path(&path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?,
                None => config_file::load_config(),
            };
            let mut settings = file_config.resolve(DEFAULT_DB_PATH);

            // CLI flags override file config.
            if let Some(root) = corpus_root {
                settings.scan.corpus_root = root;
            }
            if let Some(path) = db {
                settings.ledger.path = path;
            }
            if let Some(n) = workers {
                settings.scan.workers = n;
            }
            if let Some(y) = year_min {
                settings.scan.year_min = y;
            }
            if let Some(y) = year_max {
                settings.scan.year_max = y;
            }
            if let Some(p) = pattern {
                settings.scan.pattern = Some(p);
            }
            if retry_errors {
                settings.scan.retry_errors = true;
            }
            if sequential {
                settings.sequential = true;
            }

            scan(settings, no_progress).await
        }
        Command::Export {
            output,
            db,
            table,
            format,
        } => export(output, db, table, format),
    }
}

async fn scan(settings: Settings, no_progress: bool) -> anyhow::Result<()> {
    tracing::info!(
        corpus = %settings.scan.corpus_root.display(),
        db = %settings.ledger.path.display(),
        "starting scan"
    );
    let factory = SqliteLedgerFactory::new(settings.ledger.clone());
    let primary = MupdfExtractor::new();
    let fallback = PdfExtractFallback::new();

    let report = if settings.sequential {
        run_batch_sequential(&settings.scan, &factory, &primary, &fallback, None)?
    } else {
        let bar = if no_progress {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:40.cyan/dim}] {pos}/{len} journals {msg}",
            )?
            .progress_chars("=> "),
        );

        let progress_bar = bar.clone();
        let progress = Arc::new(move |event: BatchEvent| match event {
            BatchEvent::JournalStarted { journal } => {
                progress_bar.inc_length(1);
                progress_bar.set_message(journal);
            }
            BatchEvent::JournalFinished { .. } => {
                progress_bar.inc(1);
            }
        });

        let report = run_batch(
            Arc::new(settings.scan),
            Arc::new(factory),
            Arc::new(primary),
            Arc::new(fallback),
            Some(progress),
        )
        .await?;
        bar.finish_and_clear();
        report
    };

    let totals = report.totals();
    println!(
        "Scanned {} articles across {} journals: {} matched, {} skipped (already recorded), {} failed",
        totals.scanned,
        report.journals.len(),
        totals.matched,
        totals.skipped,
        totals.failed,
    );

    let failed = report.failed_journals();
    if !failed.is_empty() {
        for journal in &failed {
            eprintln!("journal failed: {journal}");
        }
        bail!("{} journal(s) failed", failed.len());
    }
    Ok(())
}

fn export(
    output: PathBuf,
    db: PathBuf,
    table: Option<String>,
    format: Option<String>,
) -> anyhow::Result<()> {
    let format = match format {
        Some(name) => ExportFormat::parse(&name)
            .with_context(|| format!("unknown export format {name:?} (expected csv or json)"))?,
        None => match output.extension().and_then(|e| e.to_str()) {
            Some("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        },
    };

    let mut config = LedgerConfig::new(&db);
    if let Some(table) = table {
        config = config.with_table(table);
    }
    let ledger = SqliteLedger::open(&config)
        .with_context(|| format!("cannot open ledger database {}", db.display()))?;
    let rows = ledger.export_all()?;
    write_export(&rows, format, &output)?;
    println!("Exported {} rows to {}", rows.len(), output.display());
    Ok(())
}
