use burn::{
    nn::{
        attention::generate_autoregressive_mask,
        loss::CrossEntropyLossConfig,
        transformer::{
            TransformerDecoder, TransformerDecoderConfig, TransformerDecoderInput,
            TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput,
        },
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig,
    },
    prelude::*,
};

/// Architecture of the summarizer, saved as model_config.json.
#[derive(Config, Debug)]
pub struct SummarizerConfig {
    pub vocab_size: usize,
    /// Longest sequence either side of the model can see.
    pub max_positions: usize,
    #[config(default = 256)]
    pub d_model: usize,
    #[config(default = 8)]
    pub num_heads: usize,
    #[config(default = 3)]
    pub encoder_layers: usize,
    #[config(default = 3)]
    pub decoder_layers: usize,
    #[config(default = 1024)]
    pub d_ff: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl SummarizerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Summarizer<B> {
        let token_embedding = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_positions, self.d_model).init(device);
        let encoder = TransformerEncoderConfig::new(
            self.d_model,
            self.d_ff,
            self.num_heads,
            self.encoder_layers,
        )
        .with_dropout(self.dropout)
        .init(device);
        let decoder = TransformerDecoderConfig::new(
            self.d_model,
            self.d_ff,
            self.num_heads,
            self.decoder_layers,
        )
        .with_dropout(self.dropout)
        .init(device);
        let output = LinearConfig::new(self.d_model, self.vocab_size).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        Summarizer {
            token_embedding,
            position_embedding,
            encoder,
            decoder,
            output,
            dropout,
            max_positions: self.max_positions,
        }
    }
}

/// Encoder-decoder transformer that maps an article to a summary.
///
/// Token and position embeddings are shared between the encoder
/// and decoder sides; the output head projects back to the vocab.
#[derive(Module, Debug)]
pub struct Summarizer<B: Backend> {
    pub token_embedding: Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub encoder: TransformerEncoder<B>,
    pub decoder: TransformerDecoder<B>,
    pub output: Linear<B>,
    pub dropout: Dropout,
    pub max_positions: usize,
}

impl<B: Backend> Summarizer<B> {
    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    /// ids: [batch, seq_len] → token + position embeddings [batch, seq_len, d_model]
    fn embed(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = ids.dims();
        let tok_emb = self.token_embedding.forward(ids);

        // Attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        self.dropout.forward(tok_emb + pos_emb)
    }

    /// Article ids [batch, src_len] → encoder memory [batch, src_len, d_model]
    pub fn encode(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let x = self.embed(input_ids);
        self.encoder.forward(TransformerEncoderInput::new(x))
    }

    /// Decoder ids [batch, tgt_len] + memory → logits [batch, tgt_len, vocab]
    pub fn decode(&self, decoder_input: Tensor<B, 2, Int>, memory: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, tgt_len] = decoder_input.dims();
        let device = memory.device();
        let mask = generate_autoregressive_mask::<B>(batch_size, tgt_len, &device);

        let x = self.embed(decoder_input);
        let x = self
            .decoder
            .forward(TransformerDecoderInput::new(x, memory).target_mask_attn(mask));
        self.output.forward(x)
    }

    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, decoder_input: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let memory = self.encode(input_ids);
        self.decode(decoder_input, memory)
    }

    /// Mean token cross-entropy of `labels` for a single example.
    ///
    /// input_ids: [1, src_len], decoder_input: [1, tgt_len], labels: [tgt_len]
    pub fn forward_loss(
        &self,
        input_ids: Tensor<B, 2, Int>,
        decoder_input: Tensor<B, 2, Int>,
        labels: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let logits = self.forward(input_ids, decoder_input);
        let [batch_size, tgt_len, vocab] = logits.dims();
        let logits = logits.reshape([batch_size * tgt_len, vocab]);

        let ce = CrossEntropyLossConfig::new().init(&logits.device());
        ce.forward(logits, labels)
    }
}

/// Token ids → [1, len] Int tensor.
pub fn ids_tensor<B: Backend>(ids: &[u32], device: &B::Device) -> Tensor<B, 2, Int> {
    labels_tensor::<B>(ids, device).unsqueeze::<2>()
}

/// Token ids → [len] Int tensor.
pub fn labels_tensor<B: Backend>(ids: &[u32], device: &B::Device) -> Tensor<B, 1, Int> {
    let flat: Vec<i32> = ids.iter().map(|&x| x as i32).collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device)
}
