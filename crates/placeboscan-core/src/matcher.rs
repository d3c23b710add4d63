use once_cell::sync::Lazy;
use regex::Regex;

/// Default detection pattern: "placebo", up to six intervening characters,
/// then "test" with an optional trailing "s". Applied to lower-cased text.
pub const DEFAULT_PATTERN: &str = r"placebo.{0,6}tests?";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse every whitespace run to a single space.
///
/// Whole-document extraction loses line structure in unpredictable ways;
/// collapsing first keeps the intervening-characters window meaningful.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").into_owned()
}

/// Stateless substring predicate over lower-cased text.
///
/// Both extraction stages test through the same matcher instance so that
/// detection semantics are identical regardless of which stage produced
/// the text.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    re: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            re: Regex::new(pattern)?,
        })
    }

    /// Whether `lowered` contains the pattern. Callers lower-case first.
    pub fn is_match(&self, lowered: &str) -> bool {
        self.re.is_match(lowered)
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self {
            re: Regex::new(DEFAULT_PATTERN).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_basic_variants() {
        let m = PatternMatcher::default();
        assert!(m.is_match("this paper reports a placebo test."));
        assert!(m.is_match("we run several placebo tests here"));
        assert!(m.is_match("placebo  test with doubled space"));
        assert!(m.is_match("a placebo-style test of the design"));
    }

    #[test]
    fn respects_intervening_window() {
        let m = PatternMatcher::default();
        // Six characters between the two words still matches.
        assert!(m.is_match("placeboabcdeftest"));
        // Seven do not.
        assert!(!m.is_match("placeboabcdefgtest"));
    }

    #[test]
    fn no_match_without_test_word() {
        let m = PatternMatcher::default();
        assert!(!m.is_match("the placebo group received no treatment"));
        assert!(!m.is_match("robustness checks and falsification exercises"));
    }

    #[test]
    fn case_sensitivity_is_callers_concern() {
        // The matcher expects pre-lowered text; upper-case input misses.
        let m = PatternMatcher::default();
        assert!(!m.is_match("Placebo Test"));
        assert!(m.is_match(&"Placebo Test".to_lowercase()));
    }

    #[test]
    fn custom_pattern() {
        let m = PatternMatcher::new(r"permutation.{0,6}tests?").unwrap();
        assert!(m.is_match("a permutation test confirms this"));
        assert!(!m.is_match("a placebo test confirms this"));
    }

    #[test]
    fn invalid_pattern_rejected() {
        assert!(PatternMatcher::new(r"placebo(").is_err());
    }

    #[test]
    fn collapse_whitespace_runs() {
        assert_eq!(
            collapse_whitespace("placebo\n\n  test\tdone"),
            "placebo test done"
        );
    }

    #[test]
    fn collapsed_text_matches_across_line_breaks() {
        let m = PatternMatcher::default();
        let raw = "we include a placebo\ntest in column 3";
        assert!(m.is_match(&collapse_whitespace(raw).to_lowercase()));
    }
}
