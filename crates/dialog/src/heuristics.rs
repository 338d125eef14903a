//! Transcript heuristics: junk filtering, hang-up intent, and the
//! retrieval trigger.

/// Known spurious caption the recognizer emits on background audio.
const SPURIOUS_CAPTION: &str = "Bu dizinin betimlemesi";

/// Phrases that end the conversation when the caller says them.
const TERMINATION_PHRASES: &[&str] = &[
    "hoşça kal",
    "hoşçakal",
    "görüşürüz",
    "iyi günler",
    "kapatabilirsin",
    "kapat artık",
    "goodbye",
    "bye bye",
];

/// Openers that never need the knowledge base.
const GREETINGS: &[&str] = &["merhaba", "selam", "alo", "hello", "hi", "hey"];

/// Words that signal an information question.
const QUESTION_WORDS: &[&str] = &[
    "ne", "nasıl", "nedir", "neden", "kaç", "nerede", "kim", "hangi", "what", "how", "why",
    "when", "where", "which",
];

/// A transcript too short or matching the known spurious caption carries no
/// usable content.
pub fn is_meaningless(transcript: &str) -> bool {
    let trimmed = transcript.trim();
    trimmed.chars().count() < 3 || trimmed.contains(SPURIOUS_CAPTION)
}

/// True when the utterance reads as the caller saying goodbye.
pub fn wants_termination(transcript: &str) -> bool {
    let lowered = transcript.to_lowercase();
    TERMINATION_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Whether the utterance is worth a knowledge-base round trip: not a bare
/// greeting, and either phrased as a question or long enough to carry a
/// real request.
pub fn should_query_knowledge(transcript: &str) -> bool {
    let lowered = transcript.trim().to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() <= 2 && words.iter().any(|w| GREETINGS.contains(w)) {
        return false;
    }
    if lowered.contains('?') {
        return true;
    }
    if words.iter().any(|w| QUESTION_WORDS.contains(w)) {
        return true;
    }
    words.len() > 3
}
