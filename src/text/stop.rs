use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::text::normalize_arabic;
use crate::text::wake::WakeWordDetector;

/// Words that mean "stop talking", English and Arabic. Matched only at
/// the start of the utterance.
const STOP_TOKENS: &[&str] = &[
    "stop", "end", "cancel", "enough", "quit", "exit", "abort", "halt",
    "قف", "توقف", "وقف", "بس", "خلص", "خلاص", "كفايه", "كفاية",
    "ستوب", "وقف التشغيل", "اسكت", "كفا", "خلصنا", "خلاص كده",
];

static STOP_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = STOP_TOKENS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    // Token then whitespace, end of string, or a non-word separator.
    let pattern = format!(
        r"^\s*(?:{})(?:\s|$|[^\w\x{{0600}}-\x{{06FF}}])",
        alternatives
    );
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("stop regex: {}", e))
});

/// Detects stop commands, optionally behind a wake word ("ziko stop").
#[derive(Debug, Default)]
pub struct StopCommandDetector;

impl StopCommandDetector {
    pub fn new() -> Self {
        Self
    }

    /// True if the utterance begins with a stop token in either language.
    pub fn is_stop_command(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        STOP_RE.is_match(text) || STOP_RE.is_match(&normalize_arabic(text))
    }

    /// Like `is_stop_command`, but also accepts a wake-word prefix.
    pub fn is_stop_with_optional_wake(&self, text: &str, wake: &WakeWordDetector) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        match wake.extract_after_wake(text) {
            Some(m) => self.is_stop_command(&m.remainder),
            None => self.is_stop_command(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_stop_tokens_match_at_start() {
        let detector = StopCommandDetector::new();
        assert!(detector.is_stop_command("stop"));
        assert!(detector.is_stop_command("Stop talking please"));
        assert!(detector.is_stop_command("cancel."));
        assert!(detector.is_stop_command("enough!"));
        assert!(detector.is_stop_command("  quit now"));
    }

    #[test]
    fn arabic_stop_tokens_match_after_normalization() {
        let detector = StopCommandDetector::new();
        assert!(detector.is_stop_command("توقف"));
        assert!(detector.is_stop_command("خلاص كده"));
        assert!(detector.is_stop_command("كفاية يا صاحبي"));
        assert!(detector.is_stop_command("ستوب"));
    }

    #[test]
    fn stop_must_be_a_prefix_and_a_whole_word() {
        let detector = StopCommandDetector::new();
        assert!(!detector.is_stop_command("please stop"));
        assert!(!detector.is_stop_command("stopwatch setup"));
        assert!(!detector.is_stop_command("the end of the story"));
        assert!(!detector.is_stop_command(""));
    }

    #[test]
    fn wake_prefix_is_peeled_before_the_stop_check() {
        let detector = StopCommandDetector::new();
        let wake = WakeWordDetector::new();
        assert!(detector.is_stop_with_optional_wake("ziko stop", &wake));
        assert!(detector.is_stop_with_optional_wake("hey zico, enough", &wake));
        assert!(detector.is_stop_with_optional_wake("stop", &wake));
        assert!(detector.is_stop_with_optional_wake("يا زيكو وقف", &wake));
        assert!(!detector.is_stop_with_optional_wake("ziko play music", &wake));
        assert!(!detector.is_stop_with_optional_wake("keep going", &wake));
    }
}
