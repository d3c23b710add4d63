use serde::{Deserialize, Serialize};

/// One known-bad article: a `(journal, volume, filename)` triple that the
/// extraction libraries cannot handle (hangs or irrecoverable crashes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyEntry {
    pub journal: String,
    pub volume: String,
    pub filename: String,
}

impl DenyEntry {
    pub fn matches(&self, journal: &str, volume: &str, filename: &str) -> bool {
        self.journal == journal && volume_eq(&self.volume, volume) && self.filename == filename
    }
}

/// Volumes compare numerically when both sides parse as integers ("102" ==
/// "0102"), falling back to string equality otherwise.
fn volume_eq(a: &str, b: &str) -> bool {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// The fixed set of articles excluded from extraction attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist {
    entries: Vec<DenyEntry>,
}

impl Denylist {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in entries: files observed to hang the extractors.
    pub fn builtin() -> Self {
        Self {
            entries: vec![DenyEntry {
                journal: "Review of Economics and Statistics".to_string(),
                volume: "102".to_string(),
                filename: "10_1162_rest_a_00846.pdf".to_string(),
            }],
        }
    }

    pub fn from_entries(entries: Vec<DenyEntry>) -> Self {
        Self { entries }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = DenyEntry>) {
        self.entries.extend(entries);
    }

    pub fn contains(&self, journal: &str, volume: &str, filename: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.matches(journal, volume, filename))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
