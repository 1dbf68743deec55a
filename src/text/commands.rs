use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::text::{detect_language, Language};

const GREETING: &[&str] = &[
    "hello", "hi", "hey", "good morning", "good afternoon", "good evening", "howdy",
    "مرحبا", "هلا", "اهلا", "السلام عليكم", "صباح الخير", "مساء الخير", "اهلين",
];
const GOODBYE: &[&str] = &[
    "bye", "goodbye", "see you", "talk to you later", "good night", "catch you later",
    "مع السلامة", "الى اللقاء", "وداعا", "باي", "تصبح على خير", "بكرة نتكلم",
];
const THANK_YOU: &[&str] = &[
    "thank you", "thanks", "thank you very much", "appreciate it", "thx",
    "شكرا", "شكرا لك", "شكرا جزيلا", "مشكور", "يعطيك العافية",
];
const TIME: &[&str] = &[
    "what time is it", "what's the time", "tell me the time", "current time", "time now",
    "كم الساعة", "ما الوقت", "الوقت الان", "اي ساعة الان",
];
const DATE: &[&str] = &[
    "what date is it", "what's the date", "today's date", "what day is it",
    "ما التاريخ", "التاريخ اليوم", "اي يوم اليوم", "كم التاريخ",
];
const PAUSE: &[&str] = &[
    "pause", "stop", "stop listening", "sleep mode", "go to sleep", "standby", "rest",
    "cancel", "enough", "quit", "exit", "abort", "halt",
    "قف", "توقف", "وقف", "بس", "خلص", "خلاص", "كفايه", "كفاية", "ستوب",
    "وقف التشغيل", "اسكت", "كفا", "خلصنا", "خلاص كده", "استراحة", "ارتاح",
];
const RESUME: &[&str] = &[
    "wake up", "resume", "start listening", "are you there", "come back",
    "استيقظ", "استمر", "ارجع", "موجود", "يلا",
];
const HOW_ARE_YOU: &[&str] = &[
    "how are you", "how's it going", "how do you do", "what's up", "you okay",
    "كيف حالك", "كيفك", "شلونك", "ايش اخبارك", "عامل ايه",
];
const HELP: &[&str] = &[
    "what can you do", "your capabilities", "commands", "how to use", "help",
    "مساعدة", "ماذا تستطيع", "الاوامر", "كيف استخدمك", "وش تقدر تسوي",
];

const QUESTION_HINTS_EN: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "could", "would",
    "should", "is", "are", "do", "does", "please", "help", "explain", "tell", "show",
];
const QUESTION_HINTS_AR: &[&str] = &[
    "ما", "ماذا", "كيف", "لماذا", "متى", "أين", "مين", "من", "ايش", "هل", "وش",
    "يا ريت", "ممكن", "رجاء", "ساعد", "اشرح", "وضح", "قل", "اعرض",
];

/// Longest phrase first so "stop listening" wins over "stop"; each
/// phrase is word-bounded with flexible inner whitespace.
fn build_pattern(phrases: &[&str]) -> Regex {
    let mut sorted: Vec<&str> = phrases.to_vec();
    sorted.sort_by_key(|p| std::cmp::Reverse(p.len()));

    let alternatives = sorted
        .iter()
        .map(|phrase| {
            let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
            format!(r"\b{}\b", words.join(r"\s+"))
        })
        .collect::<Vec<_>>()
        .join("|");

    RegexBuilder::new(&alternatives)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("command pattern: {}", e))
}

static GREETING_RE: Lazy<Regex> = Lazy::new(|| build_pattern(GREETING));
static GOODBYE_RE: Lazy<Regex> = Lazy::new(|| build_pattern(GOODBYE));
static THANK_YOU_RE: Lazy<Regex> = Lazy::new(|| build_pattern(THANK_YOU));
static TIME_RE: Lazy<Regex> = Lazy::new(|| build_pattern(TIME));
static DATE_RE: Lazy<Regex> = Lazy::new(|| build_pattern(DATE));
static PAUSE_RE: Lazy<Regex> = Lazy::new(|| build_pattern(PAUSE));
static RESUME_RE: Lazy<Regex> = Lazy::new(|| build_pattern(RESUME));
static HOW_ARE_YOU_RE: Lazy<Regex> = Lazy::new(|| build_pattern(HOW_ARE_YOU));
static HELP_RE: Lazy<Regex> = Lazy::new(|| build_pattern(HELP));

/// System control requested by a local command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
}

/// Routing decision for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalOutcome {
    /// Dispatch (part of) the utterance to the AI backend.
    pub forward_to_ai: bool,
    /// A canned reply to speak first, if any.
    pub reply: Option<String>,
    pub action: Option<ControlAction>,
    /// What to actually send to the AI (greeting prefix stripped).
    pub passthrough: String,
}

impl LocalOutcome {
    fn local(reply: String, action: Option<ControlAction>) -> Self {
        Self {
            forward_to_ai: false,
            reply: Some(reply),
            action,
            passthrough: String::new(),
        }
    }

    fn forward(passthrough: String) -> Self {
        Self {
            forward_to_ai: true,
            reply: None,
            action: None,
            passthrough,
        }
    }
}

/// Routes an utterance to a canned local reply or onward to the AI.
/// Canned replies rotate instead of repeating the same line every time.
pub struct LocalCommandHandler {
    rotation: AtomicUsize,
}

impl Default for LocalCommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCommandHandler {
    pub fn new() -> Self {
        Self {
            rotation: AtomicUsize::new(0),
        }
    }

    fn pick(&self, options: &[&str]) -> String {
        let index = self.rotation.fetch_add(1, Ordering::Relaxed) % options.len();
        options[index].to_string()
    }

    fn pick_for(&self, text: &str, english: &[&str], arabic: &[&str]) -> String {
        match detect_language(text) {
            Language::English => self.pick(english),
            Language::Arabic => self.pick(arabic),
        }
    }

    pub fn handle(&self, text: &str) -> LocalOutcome {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return LocalOutcome::forward(String::new());
        }
        let norm = normalize_text(trimmed);

        // Control commands first.
        if PAUSE_RE.is_match(&norm) {
            return LocalOutcome::local(
                self.pick_for(
                    trimmed,
                    &[
                        "Going to sleep mode. Say 'hello' or 'wake up' to resume.",
                        "Entering standby. Wake me up when you need me.",
                    ],
                    &["داخل وضع النوم. قل مرحبا للعودة.", "راح ارتاح. ناديني متى احتجتني."],
                ),
                Some(ControlAction::Pause),
            );
        }
        if GOODBYE_RE.is_match(&norm) {
            return LocalOutcome::local(
                self.pick_for(
                    trimmed,
                    &[
                        "Goodbye! Say 'hello' when you need me again.",
                        "See you later! Just call me when you're ready.",
                        "Take care! I'll be here when you need me.",
                    ],
                    &[
                        "مع السلامة! قل مرحبا عندما تحتاجني.",
                        "الى اللقاء! ناديني متى احتجتني.",
                        "الله يسلمك! انا هنا متى احتجتني.",
                    ],
                ),
                Some(ControlAction::Pause),
            );
        }
        if RESUME_RE.is_match(&norm) {
            return LocalOutcome::local(
                self.pick_for(
                    trimmed,
                    &[
                        "Hello! I'm back and ready to help you.",
                        "I'm here! What do you need?",
                        "Ready for action! How can I assist?",
                    ],
                    &["مرحبا! رجعت وجاهز لمساعدتك.", "موجود! شو احتياجك؟", "جاهز! كيف اقدر اساعدك؟"],
                ),
                Some(ControlAction::Resume),
            );
        }

        // A greeting may stand alone or carry a question behind it.
        if let Some(m) = GREETING_RE.find(&norm) {
            if m.start() == 0 {
                let remainder = norm[m.end()..].trim().to_string();
                let greeting = self.pick_for(
                    trimmed,
                    &[
                        "Hello! How can I help you?",
                        "Hi there! What can I do for you?",
                        "Hey! I'm here to assist you.",
                        "Good to hear from you! How may I help?",
                    ],
                    &[
                        "مرحبا! كيف يمكنني مساعدتك؟",
                        "أهلا! في خدمتك.",
                        "هلا! شو احتياجك؟",
                        "اهلين! كيف اقدر اخدمك؟",
                    ],
                );
                if remainder.is_empty() || !looks_like_question_or_command(&remainder) {
                    return LocalOutcome {
                        forward_to_ai: false,
                        reply: Some(greeting),
                        action: Some(ControlAction::Resume),
                        passthrough: String::new(),
                    };
                }
                return LocalOutcome {
                    forward_to_ai: true,
                    reply: Some(greeting),
                    action: Some(ControlAction::Resume),
                    passthrough: remainder,
                };
            }
        }

        if THANK_YOU_RE.is_match(&norm) {
            return LocalOutcome::local(
                self.pick_for(
                    trimmed,
                    &[
                        "You're welcome! Happy to help.",
                        "My pleasure! Anytime you need assistance.",
                        "Glad I could help!",
                    ],
                    &["عفوا! سعيد بمساعدتك.", "على الرحب والسعة!", "تشرفنا! اي خدمة."],
                ),
                None,
            );
        }
        if HOW_ARE_YOU_RE.is_match(&norm) {
            return LocalOutcome::local(
                self.pick_for(
                    trimmed,
                    &[
                        "I'm doing great, thank you! Ready to assist you.",
                        "All systems running smoothly! How about you?",
                        "I'm excellent! What can I help you with?",
                    ],
                    &["بخير الحمد لله! جاهز لمساعدتك.", "تمام! كيف حالك انت؟", "كويس جدا! شو احتياجك؟"],
                ),
                None,
            );
        }
        if HELP_RE.is_match(&norm) {
            let reply = match detect_language(trimmed) {
                Language::English => {
                    "I can help with many things. Say 'bye' to pause me, 'hello' to wake me, \
                     ask for the time or date, or ask me anything else and I'll use AI to help."
                }
                Language::Arabic => {
                    "يمكنني مساعدتك بأشياء كثيرة. قل 'مع السلامة' لإيقافي، 'مرحبا' لإيقاظي، \
                     اسأل عن الوقت أو التاريخ، أو اسألني أي شيء آخر وسأستخدم الذكاء الاصطناعي."
                }
            };
            return LocalOutcome::local(reply.to_string(), None);
        }
        if TIME_RE.is_match(&norm) {
            let now = Local::now().format("%I:%M %p");
            let reply = match detect_language(trimmed) {
                Language::English => format!("The current time is {}", now),
                Language::Arabic => format!("الوقت الآن {}", now),
            };
            return LocalOutcome::local(reply, None);
        }
        if DATE_RE.is_match(&norm) {
            let today = Local::now().format("%A, %B %d, %Y");
            let reply = match detect_language(trimmed) {
                Language::English => format!("Today is {}", today),
                Language::Arabic => format!("التاريخ اليوم {}", today),
            };
            return LocalOutcome::local(reply, None);
        }

        LocalOutcome::forward(trimmed.to_string())
    }
}

/// Lowercase, strip punctuation to spaces, collapse whitespace.
fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || super::is_arabic_letter(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Does the text after a greeting carry actual content worth forwarding?
fn looks_like_question_or_command(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if text.contains('?') {
        return true;
    }
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() >= 2 {
        return true;
    }
    let lower = text.to_lowercase();
    if lower
        .split_whitespace()
        .any(|w| QUESTION_HINTS_EN.contains(&w))
    {
        return true;
    }
    QUESTION_HINTS_AR.iter().any(|hint| text.contains(hint))
}
