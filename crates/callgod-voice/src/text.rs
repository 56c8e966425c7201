//! Normalization and phrase matching over recognized text.

/// Lower-case and trim recognized text. Routing and every cache key start from this form.
pub fn normalize_input(text: &str) -> String {
    text.trim().to_lowercase()
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
}

/// True when `phrase` occurs in `text` as a run of whole words.
/// Both sides are expected to be normalized.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    last_phrase_end(text, phrase).is_some()
}

/// Word index just past the last whole-word occurrence of `phrase` in `text`.
pub fn last_phrase_end(text: &str, phrase: &str) -> Option<usize> {
    let needle: Vec<&str> = words(phrase).collect();
    if needle.is_empty() {
        return None;
    }
    let hay: Vec<&str> = words(text).collect();
    hay.windows(needle.len())
        .rposition(|w| w == needle.as_slice())
        .map(|start| start + needle.len())
}

/// True when any phrase in `phrases` occurs in `text` (whole words).
pub fn contains_any<S: AsRef<str>>(text: &str, phrases: &[S]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, &normalize_input(p.as_ref())))
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
