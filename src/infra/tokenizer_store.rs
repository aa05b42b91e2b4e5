// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Manages tokenizer building, saving and loading.
//
// A run either inherits the tokenizer of a pretrained model
// directory, or builds a word-level vocabulary from its own
// training corpus. Either way the tokenizer is written into the
// run directory so later `compare` runs use the exact same ids.
//
// The vocabulary is written as HuggingFace tokenizer JSON by hand
// (WordLevel model + Whitespace pre-tokenizer) and loaded back
// with Tokenizer::from_file, which avoids the trainer/ModelWrapper
// type dance in tokenizers 0.15.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokenizers::Tokenizer;

use crate::data::encoder::{BOS_TOKEN, EOS_TOKEN, PAD_TOKEN, UNK_TOKEN};
use crate::data::preprocessor::split_words;

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Special tokens in id order; ordinary words start after them.
const SPECIAL_TOKENS: [&str; 4] = [PAD_TOKEN, UNK_TOKEN, BOS_TOKEN, EOS_TOKEN];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load existing tokenizer or build a new one from texts
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    /// Load a previously saved tokenizer from JSON file
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    /// Write `tokenizer` into this store's directory.
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {}", path.display(), e))
    }

    /// Build a word-level vocabulary from corpus texts and write
    /// a tokenizer JSON for it.
    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Step 1: Word frequencies ──────────────────────────────────────────
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in split_words(text) {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties broken alphabetically so the same
        // corpus always yields the same ids.
        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

        // ── Step 2: Vocab JSON ────────────────────────────────────────────────
        let mut vocab = serde_json::Map::new();
        let mut added_tokens = Vec::new();
        for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(token.to_string(), serde_json::json!(id));
            added_tokens.push(serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }));
        }
        let mut next_id = SPECIAL_TOKENS.len();
        for (word, _) in &words {
            if !vocab.contains_key(word) {
                vocab.insert(word.clone(), serde_json::json!(next_id));
                next_id += 1;
            }
        }

        // ── Step 3: Tokenizer JSON in HuggingFace format ──────────────────────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": false,
                "lowercase": true
            },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tok_path = self.path();
        fs::write(&tok_path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write '{}'", tok_path.display()))?;

        tracing::info!(
            "Tokenizer built with {} tokens, saved to '{}'",
            next_id,
            tok_path.display()
        );

        Tokenizer::from_file(&tok_path).map_err(|e| anyhow::anyhow!("Cannot reload tokenizer: {e}"))
    }
}
