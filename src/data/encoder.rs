// ============================================================
// Layer 4 — Sequence Encoder
// ============================================================
// Turns text into the token id sequences the seq2seq model
// consumes, and ids back into text.
//
// Sequence framing:
//   encoder input : article tokens ... [EOS]
//   decoder input : [BOS] summary tokens ...
//   labels        :       summary tokens ... [EOS]
//
// decoder input and labels are the same sequence shifted by one
// position.
//
// Truncation policy: an article longer than `max_input_len` or a
// summary longer than `max_target_len` is cut silently; the
// closing [EOS] always survives so every sequence is non-empty.

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::domain::{corpus::SummaryPair, error::ApeError};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const BOS_TOKEN: &str = "[BOS]";
pub const EOS_TOKEN: &str = "[EOS]";

/// Ids of the special tokens, resolved once from the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: u32,
    pub unk: u32,
    pub bos: u32,
    pub eos: u32,
}

impl SpecialTokens {
    pub fn from_tokenizer(tokenizer: &Tokenizer) -> Result<Self> {
        let lookup = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| ApeError::Tokenizer(format!("no '{token}' token in vocabulary")))
        };
        Ok(Self {
            pad: lookup(PAD_TOKEN)?,
            unk: lookup(UNK_TOKEN)?,
            bos: lookup(BOS_TOKEN)?,
            eos: lookup(EOS_TOKEN)?,
        })
    }
}

/// One training example as token ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPair {
    pub input_ids: Vec<u32>,
    pub decoder_input: Vec<u32>,
    pub labels: Vec<u32>,
}

#[derive(Clone)]
pub struct SequenceEncoder {
    tokenizer: Tokenizer,
    specials: SpecialTokens,
    max_input_len: usize,
    max_target_len: usize,
}

impl SequenceEncoder {
    pub fn new(tokenizer: Tokenizer, max_input_len: usize, max_target_len: usize) -> Result<Self> {
        let specials = SpecialTokens::from_tokenizer(&tokenizer)?;
        Ok(Self {
            tokenizer,
            specials,
            max_input_len: max_input_len.max(1),
            max_target_len: max_target_len.max(1),
        })
    }

    pub fn specials(&self) -> SpecialTokens {
        self.specials
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Raw token ids for `text`, no special tokens, no truncation.
    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ApeError::Tokenizer(format!("encode failed: {e}")))?;
        Ok(enc.get_ids().to_vec())
    }

    /// Encoder input for an article: tokens truncated to leave room for [EOS].
    pub fn encode_article(&self, article: &str) -> Result<Vec<u32>> {
        let mut ids = self.tokenize(article)?;
        ids.truncate(self.max_input_len - 1);
        ids.push(self.specials.eos);
        Ok(ids)
    }

    /// (decoder input, labels) for a reference summary.
    pub fn encode_target(&self, summary: &str) -> Result<(Vec<u32>, Vec<u32>)> {
        let mut body = self.tokenize(summary)?;
        body.truncate(self.max_target_len - 1);

        let mut decoder_input = Vec::with_capacity(body.len() + 1);
        decoder_input.push(self.specials.bos);
        decoder_input.extend_from_slice(&body);

        let mut labels = body;
        labels.push(self.specials.eos);
        Ok((decoder_input, labels))
    }

    pub fn encode_pair(&self, pair: &SummaryPair) -> Result<EncodedPair> {
        let input_ids = self.encode_article(&pair.article)?;
        let (decoder_input, labels) = self.encode_target(&pair.summary)?;
        Ok(EncodedPair {
            input_ids,
            decoder_input,
            labels,
        })
    }

    /// Ids back to text, dropping special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(ids, true)
            .map_err(|e| ApeError::Tokenizer(format!("decode failed: {e}")))?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::TokenizerStore;

    fn encoder(max_in: usize, max_out: usize) -> (tempfile::TempDir, SequenceEncoder) {
        let dir = tempfile::tempdir().unwrap();
        let texts = vec!["the quick brown fox jumps over the lazy dog".to_string()];
        let tok = TokenizerStore::new(dir.path()).load_or_build(&texts, 100).unwrap();
        (dir, SequenceEncoder::new(tok, max_in, max_out).unwrap())
    }

    #[test]
    fn test_article_ends_with_eos_and_is_truncated() {
        let (_dir, enc) = encoder(4, 8);
        let ids = enc.encode_article("the quick brown fox jumps").unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(*ids.last().unwrap(), enc.specials().eos);
    }

    #[test]
    fn test_empty_article_still_has_eos() {
        let (_dir, enc) = encoder(16, 8);
        assert_eq!(enc.encode_article("").unwrap(), vec![enc.specials().eos]);
    }

    #[test]
    fn test_target_is_shifted_by_one() {
        let (_dir, enc) = encoder(16, 16);
        let (dec, labels) = enc.encode_target("the lazy dog").unwrap();
        assert_eq!(dec.len(), labels.len());
        assert_eq!(dec[0], enc.specials().bos);
        assert_eq!(&dec[1..], &labels[..labels.len() - 1]);
        assert_eq!(*labels.last().unwrap(), enc.specials().eos);
    }

    #[test]
    fn test_target_truncation_respects_max_len() {
        let (_dir, enc) = encoder(16, 3);
        let (dec, labels) = enc
            .encode_target("the quick brown fox jumps over the lazy dog")
            .unwrap();
        assert_eq!(dec.len(), 3);
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_decode_round_trips_known_words() {
        let (_dir, enc) = encoder(16, 16);
        let ids = enc.tokenize("The lazy dog").unwrap();
        assert_eq!(enc.decode(&ids).unwrap(), "the lazy dog");
    }
}
