// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Cleans raw article / summary text before tokenisation and
// defines the single word-splitting rule shared by vocabulary
// building and the lexical metrics.
//
// News corpora arrive with:
//   - Non-breaking spaces (U+00A0) and zero-width spaces (U+200B)
//   - Windows line endings and tabs
//   - Bullet-style summaries with one sentence per line
//   - Runs of spaces left over from HTML stripping
//
// The model sees a summary as one flat sequence, so every kind
// of whitespace (newlines included) collapses to a single space.
//
// Cleaning steps (applied in order):
//   1. Map Unicode whitespace variants and control chars to space
//   2. Collapse whitespace runs to one space
//   3. Trim the result

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a raw text string for downstream tokenisation.
    pub fn clean(&self, text: &str) -> String {
        // ── Step 1: Normalise individual characters ───────────────────────────
        let normalised = text.chars().map(|c| match c {
            '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
            c if c.is_whitespace() || c.is_control() => ' ',
            c => c,
        });

        // ── Step 2: Collapse runs of spaces ───────────────────────────────────
        let mut out = String::with_capacity(text.len());
        let mut last_space = true;
        for c in normalised {
            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        // ── Step 3: Trim ──────────────────────────────────────────────────────
        out.trim_end().to_string()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Split text the way the tokenizer's `Whitespace` pre-tokenizer does:
/// runs of word characters and runs of punctuation, lowercased.
///
/// "The cat's out!" → ["the", "cat", "'", "s", "out", "!"]
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut current_is_word = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let is_word = c.is_alphanumeric() || c == '_';
        if !current.is_empty() && is_word != current_is_word {
            words.push(std::mem::take(&mut current));
        }
        current_is_word = is_word;
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
