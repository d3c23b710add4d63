use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::denylist::{DenyEntry, Denylist};
use crate::ledger::LedgerConfig;
use crate::ScanConfig;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub corpus: Option<CorpusSection>,
    pub ledger: Option<LedgerSection>,
    pub scan: Option<ScanSection>,
    pub denylist: Option<Vec<DenyEntry>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSection {
    pub root: Option<String>,
    pub article_subdir: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSection {
    pub db_path: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSection {
    pub pattern: Option<String>,
    pub retry_errors: Option<bool>,
    pub workers: Option<usize>,
    pub sequential: Option<bool>,
}

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".placeboscan.toml";

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Load the working-directory config, if any.
pub fn load_config() -> ConfigFile {
    load_from_path(&PathBuf::from(CONFIG_FILE_NAME)).unwrap_or_default()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        corpus: Some(CorpusSection {
            root: overlay
                .corpus
                .as_ref()
                .and_then(|c| c.root.clone())
                .or_else(|| base.corpus.as_ref().and_then(|c| c.root.clone())),
            article_subdir: overlay
                .corpus
                .as_ref()
                .and_then(|c| c.article_subdir.clone())
                .or_else(|| base.corpus.as_ref().and_then(|c| c.article_subdir.clone())),
            year_min: overlay
                .corpus
                .as_ref()
                .and_then(|c| c.year_min)
                .or_else(|| base.corpus.as_ref().and_then(|c| c.year_min)),
            year_max: overlay
                .corpus
                .as_ref()
                .and_then(|c| c.year_max)
                .or_else(|| base.corpus.as_ref().and_then(|c| c.year_max)),
        }),
        ledger: Some(LedgerSection {
            db_path: overlay
                .ledger
                .as_ref()
                .and_then(|l| l.db_path.clone())
                .or_else(|| base.ledger.as_ref().and_then(|l| l.db_path.clone())),
            table: overlay
                .ledger
                .as_ref()
                .and_then(|l| l.table.clone())
                .or_else(|| base.ledger.as_ref().and_then(|l| l.table.clone())),
        }),
        scan: Some(ScanSection {
            pattern: overlay
                .scan
                .as_ref()
                .and_then(|s| s.pattern.clone())
                .or_else(|| base.scan.as_ref().and_then(|s| s.pattern.clone())),
            retry_errors: overlay
                .scan
                .as_ref()
                .and_then(|s| s.retry_errors)
                .or_else(|| base.scan.as_ref().and_then(|s| s.retry_errors)),
            workers: overlay
                .scan
                .as_ref()
                .and_then(|s| s.workers)
                .or_else(|| base.scan.as_ref().and_then(|s| s.workers)),
            sequential: overlay
                .scan
                .as_ref()
                .and_then(|s| s.sequential)
                .or_else(|| base.scan.as_ref().and_then(|s| s.sequential)),
        }),
        denylist: overlay.denylist.or(base.denylist),
    }
}

/// Fully resolved run settings: file config with defaults filled in.
#[derive(Debug, Clone)]
pub struct Settings {
    pub scan: ScanConfig,
    pub ledger: LedgerConfig,
    pub sequential: bool,
}

impl ConfigFile {
    /// Resolve into concrete settings. Every absent field falls back to the
    /// built-in default; config denylist entries extend (never replace) the
    /// built-in ones.
    pub fn resolve(self, default_db_path: &str) -> Settings {
        let defaults = ScanConfig::default();
        let corpus = self.corpus.unwrap_or_default();
        let ledger = self.ledger.unwrap_or_default();
        let scan = self.scan.unwrap_or_default();

        let mut denylist = Denylist::builtin();
        if let Some(entries) = self.denylist {
            denylist.extend(entries);
        }

        let mut ledger_config = LedgerConfig::new(
            ledger.db_path.unwrap_or_else(|| default_db_path.to_string()),
        );
        if let Some(table) = ledger.table {
            ledger_config = ledger_config.with_table(table);
        }

        Settings {
            scan: ScanConfig {
                corpus_root: corpus
                    .root
                    .map(PathBuf::from)
                    .unwrap_or(defaults.corpus_root),
                article_subdir: corpus
                    .article_subdir
                    .unwrap_or(defaults.article_subdir),
                year_min: corpus.year_min.unwrap_or(defaults.year_min),
                year_max: corpus.year_max.unwrap_or(defaults.year_max),
                pattern: scan.pattern,
                denylist,
                retry_errors: scan.retry_errors.unwrap_or(false),
                workers: scan.workers.unwrap_or(0),
            },
            ledger: ledger_config,
            sequential: scan.sequential.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::DEFAULT_TABLE;

    #[test]
    fn partial_config_parses() {
        let toml_str = "[corpus]\nroot = \"/data/journals\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let corpus = parsed.corpus.unwrap();
        assert_eq!(corpus.root.as_deref(), Some("/data/journals"));
        assert!(corpus.year_min.is_none());
    }

    #[test]
    fn resolve_fills_defaults() {
        let settings = ConfigFile::default().resolve("results.db");
        assert_eq!(settings.scan.corpus_root, PathBuf::from("Data"));
        assert_eq!(settings.scan.article_subdir, "PDFs");
        assert_eq!(settings.scan.year_min, 2009);
        assert_eq!(settings.scan.year_max, 2021);
        assert!(settings.scan.pattern.is_none());
        assert!(!settings.scan.retry_errors);
        assert_eq!(settings.scan.workers, 0);
        assert!(!settings.sequential);
        assert_eq!(settings.ledger.path, PathBuf::from("results.db"));
        assert_eq!(settings.ledger.table, DEFAULT_TABLE);
        // Built-in denylist survives with no config entries.
        assert_eq!(settings.scan.denylist.len(), 1);
    }

    #[test]
    fn config_denylist_extends_builtin() {
        let toml_str = r#"
            [[denylist]]
            journal = "Econometrica"
            volume = "88"
            filename = "bad.pdf"
        "#;
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let settings = parsed.resolve("results.db");
        assert_eq!(settings.scan.denylist.len(), 2);
        assert!(settings.scan.denylist.contains("Econometrica", "88", "bad.pdf"));
        assert!(settings.scan.denylist.contains(
            "Review of Economics and Statistics",
            "102",
            "10_1162_rest_a_00846.pdf"
        ));
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            corpus: Some(CorpusSection {
                root: Some("/base".to_string()),
                year_min: Some(2000),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            corpus: Some(CorpusSection {
                root: Some("/overlay".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let corpus = merged.corpus.unwrap();
        assert_eq!(corpus.root.as_deref(), Some("/overlay"));
        // Base value preserved where the overlay is silent.
        assert_eq!(corpus.year_min, Some(2000));
    }

    #[test]
    fn scan_section_round_trips() {
        let config = ConfigFile {
            scan: Some(ScanSection {
                pattern: Some(r"placebo.{0,6}tests?".to_string()),
                retry_errors: Some(true),
                workers: Some(4),
                sequential: None,
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let scan = parsed.scan.unwrap();
        assert_eq!(scan.retry_errors, Some(true));
        assert_eq!(scan.workers, Some(4));
    }
}
