use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use crate::backend::{DocExtractor, ExtractorError, PageExtractor};
use crate::denylist::Denylist;
use crate::matcher::{PatternMatcher, collapse_whitespace};
use crate::{MatchPages, ScanOutcome};

/// Scans one article file: two-stage extraction with fallback, matching,
/// and full failure containment.
///
/// [`scan`](ArticleScanner::scan) never returns an error and never panics
/// across its boundary; every failure becomes [`ScanOutcome::Failed`]. One
/// bad file among thousands must not abort the batch.
pub struct ArticleScanner<'a> {
    primary: &'a dyn PageExtractor,
    fallback: &'a dyn DocExtractor,
    matcher: &'a PatternMatcher,
    denylist: &'a Denylist,
}

impl<'a> ArticleScanner<'a> {
    pub fn new(
        primary: &'a dyn PageExtractor,
        fallback: &'a dyn DocExtractor,
        matcher: &'a PatternMatcher,
        denylist: &'a Denylist,
    ) -> Self {
        Self {
            primary,
            fallback,
            matcher,
            denylist,
        }
    }

    /// Produce exactly one outcome for `path`.
    ///
    /// Order of stages:
    /// 1. denylist short-circuit (no extraction call is made);
    /// 2. primary page-addressable extraction — any matching page returns
    ///    immediately with the full page list, fallback untouched;
    /// 3. fallback whole-document extraction on primary non-match *or*
    ///    primary failure — a primary failure does not suppress the
    ///    fallback attempt;
    /// 4. if a stage failed and nothing matched, the outcome is `Failed`.
    pub fn scan(&self, path: &Path, journal: &str, volume: &str) -> ScanOutcome {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.denylist.contains(journal, volume, &filename) {
            tracing::info!(journal, volume, article = %filename, "denylisted, skipping extraction");
            return ScanOutcome::Failed {
                reason: "denylisted".to_string(),
            };
        }

        let primary_err = match self.scan_pages(path) {
            Ok(Some(pages)) => {
                return ScanOutcome::Match {
                    pages: MatchPages::Known(pages),
                };
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(article = %filename, error = %e, "primary extraction failed");
                Some(e)
            }
        };

        match self.scan_whole(path) {
            Ok(true) => ScanOutcome::Match {
                pages: MatchPages::Unknown,
            },
            Ok(false) => match primary_err {
                None => ScanOutcome::NoMatch,
                Some(e) => ScanOutcome::Failed {
                    reason: format!("page extraction failed: {e}"),
                },
            },
            Err(e) => {
                tracing::debug!(article = %filename, error = %e, "fallback extraction failed");
                ScanOutcome::Failed {
                    reason: format!("fallback extraction failed: {e}"),
                }
            }
        }
    }

    /// Primary stage: per-page text, lower-cased, matched page by page.
    /// Returns the matching page indices (strictly increasing by
    /// construction) or `None` when no page matched.
    fn scan_pages(&self, path: &Path) -> Result<Option<Vec<usize>>, ExtractorError> {
        let pages = contain_panic(|| self.primary.extract_pages(path))?;
        let mut matched = Vec::new();
        for (index, text) in pages.iter().enumerate() {
            if self.matcher.is_match(&text.to_lowercase()) {
                matched.push(index);
            }
        }
        Ok(if matched.is_empty() {
            None
        } else {
            Some(matched)
        })
    }

    /// Fallback stage: whole document as one blob, whitespace collapsed,
    /// lower-cased, one match test.
    fn scan_whole(&self, path: &Path) -> Result<bool, ExtractorError> {
        let text = contain_panic(|| self.fallback.extract_document(path))?;
        let lowered = collapse_whitespace(&text).to_lowercase();
        Ok(self.matcher.is_match(&lowered))
    }
}

/// Run an extraction call, converting a panic into an extraction error.
/// Some PDF libraries panic on malformed font/xref data rather than
/// returning an error.
fn contain_panic<T>(
    f: impl FnOnce() -> Result<T, ExtractorError>,
) -> Result<T, ExtractorError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(ExtractorError::Extraction(
            "extraction library panicked".to_string(),
        )),
    }
}
