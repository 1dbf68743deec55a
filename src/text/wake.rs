use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::text::normalize_arabic;

/// Accepted English wake tokens, exact lowercase forms. STT mishears
/// the name constantly, so the set carries the common corruptions.
const EN_WAKE_EXACT: &[&str] = &[
    "ziko", "zico", "zeeko", "zeeco", "zikko", "zeiko", "zyko", "zeko", "dziko", "dico",
    "zika", "nico", "niko", "echo",
];

const AR_WAKE_WORD: &str = "زيكو";

/// First token at the start of the utterance, with an optional greeting
/// in front ("hey ziko ...").
static EN_WAKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:hey|hi|hello)\s+)?([a-zA-Z]+)[\s,،:.\-!?]*")
        .unwrap_or_else(|e| panic!("wake regex: {}", e))
});

/// Arabic call at the start, with an optional vocative "يا".
static AR_WAKE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:يا\s*)?زيكو\b[\s،,:-]*").unwrap_or_else(|e| panic!("wake regex: {}", e))
});

static EN_EXACT_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| EN_WAKE_EXACT.iter().copied().collect());

/// A recognized wake prefix and the command text that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    pub remainder: String,
    pub wake_form: String,
}

/// Wake-word detector for utterance prefixes, English and Arabic.
/// Deliberately forgiving on spelling and strict on position: the wake
/// word must open the utterance or it does not count.
#[derive(Debug, Default)]
pub struct WakeWordDetector;

impl WakeWordDetector {
    pub fn new() -> Self {
        Self
    }

    fn is_english_wake_token(token: &str) -> bool {
        if token.len() < 2 {
            return false;
        }
        let t = token.to_lowercase();
        if EN_EXACT_SET.contains(t.as_str()) {
            return true;
        }
        // Fuzzy rule: starts with z or d and carries the "iko"/"ico" core.
        t.starts_with(['z', 'd']) && (t.contains("iko") || t.contains("ico"))
    }

    /// Check for a wake prefix; on a hit, return the rest of the
    /// utterance (which may be empty for a bare call).
    pub fn extract_after_wake(&self, user_text: &str) -> Option<WakeMatch> {
        let text = user_text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(captures) = EN_WAKE_RE.captures(text) {
            let token = &captures[1];
            if Self::is_english_wake_token(token) {
                let end = captures.get(0).map(|m| m.end()).unwrap_or(0);
                return Some(WakeMatch {
                    remainder: text[end..].trim().to_string(),
                    wake_form: token.to_lowercase(),
                });
            }
        }

        // Arabic: match on the raw text first so the remainder keeps its
        // original diacritics, fall back to the normalized form.
        if let Some(m) = AR_WAKE_RE.find(text) {
            return Some(WakeMatch {
                remainder: text[m.end()..].trim().to_string(),
                wake_form: AR_WAKE_WORD.to_string(),
            });
        }
        let normalized = normalize_arabic(text);
        if let Some(m) = AR_WAKE_RE.find(&normalized) {
            return Some(WakeMatch {
                remainder: normalized[m.end()..].trim().to_string(),
                wake_form: AR_WAKE_WORD.to_string(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wake(text: &str) -> Option<WakeMatch> {
        WakeWordDetector::new().extract_after_wake(text)
    }

    #[test]
    fn english_wake_forms_are_recognized() {
        let m = wake("Ziko play some music").unwrap();
        assert_eq!(m.remainder, "play some music");
        assert_eq!(m.wake_form, "ziko");

        assert_eq!(wake("hey zico open mail").unwrap().remainder, "open mail");
        assert_eq!(
            wake("Dico what's the weather").unwrap().remainder,
            "what's the weather"
        );
        assert_eq!(
            wake("hello ziko, what's up?").unwrap().remainder,
            "what's up?"
        );
        assert_eq!(wake("ZEeCo, open settings").unwrap().remainder, "open settings");
    }

    #[test]
    fn fuzzy_rule_accepts_iko_core_with_z_or_d_prefix() {
        assert!(wake("zikoo turn on the lights").is_some());
        assert!(wake("dzicco nothing").is_none());
        assert!(wake("miko hello").is_none());
    }

    #[test]
    fn bare_wake_word_yields_empty_remainder() {
        let m = wake("ziko").unwrap();
        assert_eq!(m.remainder, "");
    }

    #[test]
    fn wake_word_must_open_the_utterance() {
        assert!(wake("sorry, ziko open mail").is_none());
        assert!(wake("play some music").is_none());
        assert!(wake("Z.").is_none());
        assert!(wake("").is_none());
    }

    #[test]
    fn arabic_wake_forms_are_recognized() {
        let m = wake("زيكو: ابحث عن الأخبار").unwrap();
        assert_eq!(m.remainder, "ابحث عن الأخبار");

        let m = wake("يا زيكو افتح البريد").unwrap();
        assert_eq!(m.remainder, "افتح البريد");
    }
}
