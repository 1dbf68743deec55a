//! Transcript classification: wake-word extraction, stop-command
//! detection, and the local command handler. Everything here is pure
//! string work over what the STT service returned, bilingual
//! English/Arabic throughout.

pub mod commands;
pub mod stop;
pub mod wake;

pub use commands::{ControlAction, LocalCommandHandler, LocalOutcome};
pub use stop::StopCommandDetector;
pub use wake::WakeWordDetector;

/// Which response language to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Arabic,
}

/// Light Arabic normalization: strip diacritics and the kashida, fold
/// alef/teh-marbuta/alef-maqsura variants, lowercase.
pub(crate) fn normalize_arabic(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| !is_arabic_diacritic(*c))
        .filter(|c| *c != '\u{0640}') // kashida
        .map(|c| match c {
            'أ' | 'إ' | 'آ' | 'ٱ' => 'ا',
            'ة' => 'ه',
            'ى' => 'ي',
            other => other,
        })
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn is_arabic_diacritic(c: char) -> bool {
    matches!(c,
        '\u{0617}'..='\u{061A}'
        | '\u{064B}'..='\u{065F}'
        | '\u{0670}'
        | '\u{06D6}'..='\u{06ED}')
}

fn is_arabic_letter(c: char) -> bool {
    matches!(c, '\u{0600}'..='\u{06FF}')
}

/// Guess the language from the script mix: more than 30% Arabic letters
/// among the word characters means Arabic.
pub(crate) fn detect_language(text: &str) -> Language {
    let arabic = text.chars().filter(|c| is_arabic_letter(*c)).count();
    if arabic == 0 {
        return Language::English;
    }
    let word_chars = text
        .chars()
        .filter(|c| c.is_alphanumeric() || is_arabic_letter(*c))
        .count();
    if word_chars == 0 {
        return Language::English;
    }
    if arabic as f64 / word_chars as f64 > 0.3 {
        Language::Arabic
    } else {
        Language::English
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arabic_normalization_folds_variants() {
        assert_eq!(normalize_arabic("أهلاً"), "اهلا");
        assert_eq!(normalize_arabic("مدرسة"), "مدرسه");
        assert_eq!(normalize_arabic("مستشفى"), "مستشفي");
    }

    #[test]
    fn language_detection_uses_script_ratio() {
        assert_eq!(detect_language("hello there"), Language::English);
        assert_eq!(detect_language("مرحبا كيف حالك"), Language::Arabic);
        assert_eq!(detect_language("ok يلا"), Language::Arabic);
        assert_eq!(detect_language(""), Language::English);
        assert_eq!(detect_language("!!!"), Language::English);
    }
}
