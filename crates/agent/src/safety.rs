//! Lexical safety gate applied to every request before planning.
//!
//! The gate runs entirely on the request text: no model call, no store
//! access. A flagged request is refused outright and never reaches the
//! planner, so the refusal cost is one string scan.

/// Single tokens that flag a request as a medical-advice question.
/// Matching is whole-word, so "drugstore" passes while "drugs" does not.
const ADVICE_WORDS: &[&str] = &[
    "diagnos",
    "diagnose",
    "diagnosing",
    "diagnosis",
    "treat",
    "treating",
    "treatment",
    "prescribe",
    "prescribed",
    "prescribing",
    "prescription",
    "rx",
    "medicine",
    "medication",
    "drug",
    "drugs",
    "pill",
    "pills",
    "antibiotic",
    "antibiotics",
    "dose",
    "dosage",
    "sideeffect",
    "sideeffects",
    "contraindication",
    "contraindications",
];

/// Word sequences that flag a request when they appear joined by plain
/// spacing. Punctuation between the words breaks the phrase.
const ADVICE_PHRASES: &[&[&str]] = &[
    &["side", "effect"],
    &["side", "effects"],
    &["what", "should", "i", "do"],
    &["should", "i", "take"],
];

const REFUSAL_MESSAGE: &str = "I can’t provide medical advice/diagnosis. Please rephrase as an \
                               operational task (scheduling, eligibility checks, follow-ups).";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SafetyDecision {
    Proceed,
    Refuse { reason_code: &'static str, user_message: String },
}

#[derive(Clone, Debug, Default)]
pub struct SafetyGate;

impl SafetyGate {
    pub fn new() -> Self {
        Self
    }

    pub fn screen(&self, request: &str) -> SafetyDecision {
        let tokens = TokenStream::scan(&request.to_lowercase());

        let flagged = ADVICE_WORDS.iter().any(|word| tokens.contains_word(word))
            || ADVICE_PHRASES.iter().any(|phrase| tokens.contains_phrase(phrase));

        if flagged {
            SafetyDecision::Refuse {
                reason_code: "medical_advice",
                user_message: REFUSAL_MESSAGE.to_string(),
            }
        } else {
            SafetyDecision::Proceed
        }
    }
}

/// The request broken into word tokens, remembering whether each adjacent
/// pair was separated by whitespace alone.
struct TokenStream {
    words: Vec<String>,
    /// `spaced[i]` is true when only whitespace sits between `words[i]`
    /// and `words[i + 1]`.
    spaced: Vec<bool>,
}

impl TokenStream {
    fn scan(text: &str) -> Self {
        let mut words: Vec<String> = Vec::new();
        let mut spaced: Vec<bool> = Vec::new();
        let mut current = String::new();
        let mut gap_only_space = true;

        for ch in text.chars() {
            if is_word_char(ch) {
                if current.is_empty() && !words.is_empty() {
                    spaced.push(gap_only_space);
                }
                current.push(ch);
            } else if current.is_empty() {
                if !ch.is_whitespace() {
                    gap_only_space = false;
                }
            } else {
                words.push(std::mem::take(&mut current));
                gap_only_space = ch.is_whitespace();
            }
        }
        if !current.is_empty() {
            words.push(current);
        }

        Self { words, spaced }
    }

    fn contains_word(&self, word: &str) -> bool {
        self.words.iter().any(|token| token == word)
    }

    fn contains_phrase(&self, phrase: &[&str]) -> bool {
        if phrase.is_empty() || self.words.len() < phrase.len() {
            return false;
        }

        (0..=self.words.len() - phrase.len()).any(|start| {
            let words_match = phrase
                .iter()
                .enumerate()
                .all(|(offset, expected)| self.words[start + offset] == *expected);
            let gaps_spaced = (start..start + phrase.len() - 1).all(|gap| self.spaced[gap]);
            words_match && gaps_spaced
        })
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
