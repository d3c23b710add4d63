use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::ScanConfig;

/// Issue directories are named `<year>_<volume>_<issue>`.
static ISSUE_DIR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)_(\d+)_(.+)$").unwrap());

/// A corpus-layout violation. These are fatal for the affected journal (or
/// run): the directory tree is assumed trustworthy, so a malformed name means
/// the corpus is corrupted, not that one article is bad. Silently skipping
/// such directories is exactly the failure mode this error exists to prevent.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("issue directory name {name:?} does not match <year>_<volume>_<issue>")]
    MalformedIssueDir { name: String },
    #[error("issue directory name {name:?} has an unparseable year")]
    BadYear { name: String },
    #[error("IO error under {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A `(year, volume, issue)` grouping of articles, parsed from an issue
/// directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDescriptor {
    pub year: i32,
    pub volume: String,
    pub issue: String,
}

impl IssueDescriptor {
    /// Parse a directory name of the form `<year>_<volume>_<issue>`.
    pub fn parse(name: &str) -> Result<Self, LayoutError> {
        let caps = ISSUE_DIR_RE
            .captures(name)
            .ok_or_else(|| LayoutError::MalformedIssueDir {
                name: name.to_string(),
            })?;
        let year: i32 = caps[1].parse().map_err(|_| LayoutError::BadYear {
            name: name.to_string(),
        })?;
        Ok(Self {
            year,
            volume: caps[2].to_string(),
            issue: caps[3].to_string(),
        })
    }
}

/// One candidate article produced by the walker.
#[derive(Debug, Clone)]
pub struct ArticleEntry {
    pub issue: IssueDescriptor,
    pub path: PathBuf,
}

/// Enumerates journals, issue directories and article files.
#[derive(Debug, Clone)]
pub struct CorpusWalker {
    corpus_root: PathBuf,
    article_subdir: String,
    year_min: i32,
    year_max: i32,
}

impl CorpusWalker {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            corpus_root: config.corpus_root.clone(),
            article_subdir: config.article_subdir.clone(),
            year_min: config.year_min,
            year_max: config.year_max,
        }
    }

    /// All journal names: the subdirectories of the corpus root, sorted.
    pub fn journals(&self) -> Result<Vec<String>, std::io::Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.corpus_root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn article_root(&self, journal: &str) -> PathBuf {
        self.corpus_root.join(journal).join(&self.article_subdir)
    }

    /// Candidate articles for one journal.
    ///
    /// Issue-directory names are parsed and year-filtered eagerly, so a
    /// layout violation surfaces here, with the offending name, before any
    /// scanning starts. File enumeration within each retained issue is lazy.
    ///
    /// A missing article root yields an empty iterator: it means the journal
    /// has no downloaded content yet, not that the corpus is broken.
    pub fn articles(&self, journal: &str) -> Result<ArticleIter, LayoutError> {
        let root = self.article_root(journal);
        if !root.is_dir() {
            return Ok(ArticleIter::empty());
        }

        let mut issues: Vec<(IssueDescriptor, PathBuf)> = Vec::new();
        for entry in read_dir_checked(&root)? {
            let entry = entry.map_err(|e| LayoutError::Io {
                path: root.clone(),
                source: e,
            })?;
            if !entry.path().is_dir() {
                // Stray regular files at the issue level are tolerated.
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let issue = IssueDescriptor::parse(&name)?;
            if issue.year < self.year_min || issue.year > self.year_max {
                tracing::debug!(journal, issue = %name, year = issue.year, "outside year window");
                continue;
            }
            issues.push((issue, entry.path()));
        }
        issues.sort_by(|a, b| a.1.cmp(&b.1));

        Ok(ArticleIter {
            issues: issues.into_iter(),
            current: None,
        })
    }
}

fn read_dir_checked(path: &Path) -> Result<fs::ReadDir, LayoutError> {
    fs::read_dir(path).map_err(|e| LayoutError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Lazy article iterator: issues up front, files on demand.
#[derive(Debug)]
pub struct ArticleIter {
    issues: std::vec::IntoIter<(IssueDescriptor, PathBuf)>,
    current: Option<(IssueDescriptor, std::vec::IntoIter<PathBuf>)>,
}

impl ArticleIter {
    fn empty() -> Self {
        Self {
            issues: Vec::new().into_iter(),
            current: None,
        }
    }

    fn load_issue(
        &mut self,
        issue: IssueDescriptor,
        dir: PathBuf,
    ) -> Result<(), LayoutError> {
        let mut files = Vec::new();
        for entry in read_dir_checked(&dir)? {
            let entry = entry.map_err(|e| LayoutError::Io {
                path: dir.clone(),
                source: e,
            })?;
            let is_file = entry
                .file_type()
                .map_err(|e| LayoutError::Io {
                    path: entry.path(),
                    source: e,
                })?
                .is_file();
            // Every regular file is a candidate; non-PDFs are expected to
            // fail extraction and be recorded as errors, not pre-filtered.
            if is_file {
                files.push(entry.path());
            }
        }
        files.sort();
        self.current = Some((issue, files.into_iter()));
        Ok(())
    }
}

impl Iterator for ArticleIter {
    type Item = Result<ArticleEntry, LayoutError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((issue, files)) = &mut self.current
                && let Some(path) = files.next()
            {
                return Some(Ok(ArticleEntry {
                    issue: issue.clone(),
                    path,
                }));
            }
            let (issue, dir) = self.issues.next()?;
            if let Err(e) = self.load_issue(issue, dir) {
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_corpus() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "placeboscan_walker_test_{}_{}",
            std::process::id(),
            id,
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn walker_at(root: &Path) -> CorpusWalker {
        CorpusWalker::new(&ScanConfig {
            corpus_root: root.to_path_buf(),
            ..ScanConfig::default()
        })
    }

    fn add_article(root: &Path, journal: &str, issue_dir: &str, file: &str) {
        let dir = root.join(journal).join("PDFs").join(issue_dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), b"stub").unwrap();
    }

    #[test]
    fn parse_issue_descriptor() {
        let d = IssueDescriptor::parse("2015_30_2").unwrap();
        assert_eq!(
            d,
            IssueDescriptor {
                year: 2015,
                volume: "30".to_string(),
                issue: "2".to_string(),
            }
        );
    }

    #[test]
    fn parse_issue_with_suffixed_number() {
        // Issue component is free-form text after the second underscore.
        let d = IssueDescriptor::parse("2019_57_3_supplement").unwrap();
        assert_eq!(d.year, 2019);
        assert_eq!(d.volume, "57");
        assert_eq!(d.issue, "3_supplement");
    }

    #[test]
    fn parse_rejects_gibberish() {
        let err = IssueDescriptor::parse("gibberish").unwrap_err();
        match err {
            LayoutError::MalformedIssueDir { name } => assert_eq!(name, "gibberish"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_article_root_is_empty_not_error() {
        let root = temp_corpus();
        std::fs::create_dir_all(root.join("Empty Journal")).unwrap();
        let walker = walker_at(&root);
        let entries: Vec<_> = walker.articles("Empty Journal").unwrap().collect();
        assert!(entries.is_empty());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn malformed_issue_dir_is_loud() {
        let root = temp_corpus();
        add_article(&root, "J", "2015_30_2", "a.pdf");
        std::fs::create_dir_all(root.join("J").join("PDFs").join("notanissue")).unwrap();
        let walker = walker_at(&root);
        let err = walker.articles("J").unwrap_err();
        assert!(err.to_string().contains("notanissue"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn year_window_is_inclusive() {
        let root = temp_corpus();
        add_article(&root, "J", "2008_10_1", "too_old.pdf");
        add_article(&root, "J", "2009_11_1", "lower_edge.pdf");
        add_article(&root, "J", "2015_17_2", "middle.pdf");
        add_article(&root, "J", "2021_23_4", "upper_edge.pdf");
        add_article(&root, "J", "2022_24_1", "too_new.pdf");

        let walker = walker_at(&root);
        let mut files: Vec<String> = walker
            .articles("J")
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        files.sort();
        assert_eq!(files, vec!["lower_edge.pdf", "middle.pdf", "upper_edge.pdf"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn stray_files_at_issue_level_ignored() {
        let root = temp_corpus();
        add_article(&root, "J", "2015_30_2", "a.pdf");
        std::fs::write(root.join("J").join("PDFs").join("README.txt"), b"x").unwrap();
        let walker = walker_at(&root);
        let entries: Vec<_> = walker.articles("J").unwrap().collect();
        assert_eq!(entries.len(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn every_regular_file_is_a_candidate() {
        let root = temp_corpus();
        add_article(&root, "J", "2015_30_2", "real.pdf");
        add_article(&root, "J", "2015_30_2", "notes.docx");
        let walker = walker_at(&root);
        let entries: Vec<_> = walker.articles("J").unwrap().collect();
        assert_eq!(entries.len(), 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn journals_lists_directories_sorted() {
        let root = temp_corpus();
        std::fs::create_dir_all(root.join("B Journal")).unwrap();
        std::fs::create_dir_all(root.join("A Journal")).unwrap();
        std::fs::write(root.join("stray.csv"), b"x").unwrap();
        let walker = walker_at(&root);
        assert_eq!(walker.journals().unwrap(), vec!["A Journal", "B Journal"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn entries_carry_issue_descriptor() {
        let root = temp_corpus();
        add_article(&root, "J", "2017_44_1", "x.pdf");
        let walker = walker_at(&root);
        let entry = walker.articles("J").unwrap().next().unwrap().unwrap();
        assert_eq!(entry.issue.year, 2017);
        assert_eq!(entry.issue.volume, "44");
        assert_eq!(entry.issue.issue, "1");
        assert!(entry.path.ends_with("x.pdf"));
        let _ = std::fs::remove_dir_all(&root);
    }
}
