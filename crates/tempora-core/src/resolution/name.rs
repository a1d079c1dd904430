//! Entity name normalization.

use serde::{Deserialize, Serialize};

/// How entity names are matched.
///
/// Whitespace runs collapse to one space, the name is trimmed and wrapping
/// quotes are removed. The matching key is lower-cased unless
/// `case_sensitive` is set; with `strip_punctuation` the key also drops
/// punctuation, so "U.S.A." and "USA" match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamePolicy {
    pub case_sensitive: bool,
    pub strip_punctuation: bool,
}

impl NamePolicy {
    /// Display spelling: cleaned but case preserved.
    pub fn display(&self, raw: &str) -> String {
        let collapsed = collapse_whitespace(raw);
        let mut s = collapsed.as_str();
        loop {
            let stripped = strip_wrapping_quotes(s);
            if stripped.len() == s.len() {
                break;
            }
            s = stripped.trim();
        }
        s.to_string()
    }

    /// Matching key. Two names denote the same entity iff their keys are equal.
    pub fn key(&self, raw: &str) -> String {
        let display = self.display(raw);
        let cased = if self.case_sensitive {
            display
        } else {
            display.to_lowercase()
        };
        if self.strip_punctuation {
            let kept: String = cased
                .chars()
                .filter(|c| !c.is_ascii_punctuation() && !is_unicode_punctuation(*c))
                .collect();
            collapse_whitespace(&kept)
        } else {
            cased
        }
    }

    /// Whether two raw names denote the same entity.
    pub fn same(&self, a: &str, b: &str) -> bool {
        self.key(a) == self.key(b)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_wrapping_quotes(s: &str) -> &str {
    const PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('\u{201C}', '\u{201D}'), ('`', '`')];
    for (open, close) in PAIRS {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner;
        }
    }
    s
}

fn is_unicode_punctuation(c: char) -> bool {
    matches!(
        c,
        '\u{2010}'..='\u{2027}' | '\u{2030}'..='\u{205E}' | '\u{3001}'..='\u{3003}' | '\u{00A1}' | '\u{00BF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_cleans_whitespace_and_quotes() {
        let policy = NamePolicy::default();
        assert_eq!(policy.display("  \"Noah   Carter\" "), "Noah Carter");
        assert_eq!(policy.display("\u{201C}Tokyo\u{201D}"), "Tokyo");
        assert_eq!(policy.display("Noah\u{00A0}\tCarter"), "Noah Carter");
    }

    #[test]
    fn test_default_key_is_case_insensitive() {
        let policy = NamePolicy::default();
        assert!(policy.same("NOAH CARTER", "noah carter"));
        assert!(policy.same("\"Noah Carter\"", "Noah  Carter"));
        assert!(!policy.same("U.S.A.", "USA"));
    }

    #[test]
    fn test_case_sensitive_and_punctuation_options() {
        let strict = NamePolicy {
            case_sensitive: true,
            strip_punctuation: false,
        };
        assert!(!strict.same("Apple", "apple"));

        let loose = NamePolicy {
            case_sensitive: false,
            strip_punctuation: true,
        };
        assert!(loose.same("U.S.A.", "usa"));
        assert!(loose.same("World-Athletics", "worldathletics"));
        assert_eq!(loose.key("Carter, Noah"), "carter noah");
    }
}
