// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `run`, `compare` and `plot`
// and all their configurable flags.
//
// Every `run` flag maps onto one field of RunConfig; defaults
// live here and in RunConfig::default() and must agree.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{compare_use_case::CompareConfig, run_use_case::RunConfig};
use crate::ml::{generator::Decoding, loss_scale::Precision};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full APE experiment: baseline, K perturb/evaluate rounds, plots
    Run(RunArgs),

    /// Score the baseline and final checkpoints of a run on a test set
    Compare(CompareArgs),

    /// Re-render trend plots from a run's history.json
    Plot(PlotArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingArg {
    Greedy,
    Sampled,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSONL file of {"article", "summary"} records used for fine-tuning
    #[arg(long, default_value = "data/train.jsonl")]
    pub train_file: PathBuf,

    /// Separate held-out JSONL file; without it the tail of
    /// --train-file is held out
    #[arg(long)]
    pub test_file: Option<PathBuf>,

    /// Output directory for checkpoints, metrics, history and plots
    #[arg(long, default_value = "runs/ape")]
    pub run_dir: PathBuf,

    /// Directory of an earlier run whose final checkpoint and tokenizer
    /// seed this one
    #[arg(long)]
    pub pretrained: Option<PathBuf>,

    /// Directory of an earlier run whose frozen final encoder scores
    /// embedding similarity; defaults to the baseline's encoder
    #[arg(long)]
    pub similarity_model: Option<PathBuf>,

    /// Maximum training pairs read
    #[arg(long, default_value_t = 4000)]
    pub train_limit: usize,

    /// Maximum held-out pairs evaluated each iteration
    #[arg(long, default_value_t = 300)]
    pub test_limit: usize,

    /// K: number of perturbation batches
    #[arg(long, short = 'k', default_value_t = 15)]
    pub iterations: usize,

    /// Passes over each batch
    #[arg(long, default_value_t = 1)]
    pub epochs: usize,

    /// Examples accumulated per optimizer step
    #[arg(long, default_value_t = 4)]
    pub accum_steps: usize,

    #[arg(long, default_value_t = 1e-5)]
    pub lr: f64,

    /// Global gradient norm clip
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f64,

    #[arg(long, default_value_t = 512)]
    pub max_input_len: usize,

    #[arg(long, default_value_t = 128)]
    pub max_target_len: usize,

    /// Maximum generated summary length in tokens
    #[arg(long, default_value_t = 128)]
    pub max_gen_len: usize,

    /// fp32, fp16 (dynamic loss scaling) or bf16
    #[arg(long, default_value = "fp16")]
    pub precision: Precision,

    /// Clean optimizer steps before the loss scale doubles
    #[arg(long, default_value_t = 2000)]
    pub scale_growth_interval: usize,

    #[arg(long, value_enum, default_value_t = DecodingArg::Greedy)]
    pub decoding: DecodingArg,

    /// Softmax temperature for sampled decoding
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Sample only among the k most likely tokens (0 = all)
    #[arg(long, default_value_t = 50)]
    pub top_k: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Reference/generated pairs written to samples.json
    #[arg(long, default_value_t = 3)]
    pub qualitative_samples: usize,

    /// Tokenizer vocabulary size when building a fresh tokenizer
    #[arg(long, default_value_t = 16000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 3)]
    pub encoder_layers: usize,

    #[arg(long, default_value_t = 3)]
    pub decoder_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,
}

impl RunArgs {
    fn decoding(&self) -> Decoding {
        match self.decoding {
            DecodingArg::Greedy => Decoding::Greedy,
            DecodingArg::Sampled => Decoding::Sampled {
                temperature: self.temperature,
                top_k: self.top_k,
                seed: self.seed,
            },
        }
    }
}

/// The application layer never sees clap types.
impl From<RunArgs> for RunConfig {
    fn from(a: RunArgs) -> Self {
        let decoding = a.decoding();
        RunConfig {
            train_file: a.train_file,
            test_file: a.test_file,
            run_dir: a.run_dir,
            pretrained: a.pretrained,
            similarity_model: a.similarity_model,
            train_limit: a.train_limit,
            test_limit: a.test_limit,
            iterations: a.iterations,
            epochs: a.epochs,
            accum_steps: a.accum_steps,
            lr: a.lr,
            max_grad_norm: a.max_grad_norm,
            max_input_len: a.max_input_len,
            max_target_len: a.max_target_len,
            max_gen_len: a.max_gen_len,
            precision: a.precision,
            scale_growth_interval: a.scale_growth_interval,
            decoding,
            seed: a.seed,
            qualitative_samples: a.qualitative_samples,
            vocab_size: a.vocab_size,
            d_model: a.d_model,
            num_heads: a.num_heads,
            encoder_layers: a.encoder_layers,
            decoder_layers: a.decoder_layers,
            d_ff: a.d_ff,
            dropout: a.dropout,
        }
    }
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Directory of a finished run
    #[arg(long, default_value = "runs/ape")]
    pub run_dir: PathBuf,

    /// Held-out JSONL file to score both checkpoints on
    #[arg(long)]
    pub test_file: PathBuf,

    #[arg(long, default_value_t = 300)]
    pub test_limit: usize,
}

impl From<CompareArgs> for CompareConfig {
    fn from(a: CompareArgs) -> Self {
        CompareConfig {
            run_dir: a.run_dir,
            test_file: a.test_file,
            test_limit: a.test_limit,
        }
    }
}

#[derive(Args, Debug)]
pub struct PlotArgs {
    /// Directory of a finished run
    #[arg(long, default_value = "runs/ape")]
    pub run_dir: PathBuf,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::ml::similarity::SimilaritySource;
    use clap::Parser;

    fn parse_run(args: &[&str]) -> RunConfig {
        let mut argv = vec!["ape", "run"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Commands::Run(a) => a.into(),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_flag_defaults_match_run_config_defaults() {
        let parsed = parse_run(&[]);
        let default = RunConfig::default();
        assert_eq!(parsed.iterations, default.iterations);
        assert_eq!(parsed.accum_steps, default.accum_steps);
        assert_eq!(parsed.lr, default.lr);
        assert_eq!(parsed.precision, default.precision);
        assert_eq!(parsed.decoding, default.decoding);
        assert_eq!(parsed.vocab_size, default.vocab_size);
        assert_eq!(parsed.max_positions(), default.max_positions());
    }

    #[test]
    fn test_sampled_decoding_carries_its_knobs() {
        let cfg = parse_run(&[
            "--decoding", "sampled", "--temperature", "0.7", "--top-k", "10", "--seed", "7",
        ]);
        assert_eq!(
            cfg.decoding,
            Decoding::Sampled {
                temperature: 0.7,
                top_k: 10,
                seed: 7
            }
        );
    }

    #[test]
    fn test_similarity_model_flag_selects_external_encoder() {
        let cfg = parse_run(&["--similarity-model", "runs/encoder"]);
        assert_eq!(
            cfg.similarity_source(),
            SimilaritySource::External {
                dir: PathBuf::from("runs/encoder")
            }
        );
        assert_eq!(parse_run(&[]).similarity_source(), SimilaritySource::RandomBaseline);
    }

    #[test]
    fn test_precision_flag_parses() {
        let cfg = parse_run(&["--precision", "bf16", "-k", "3"]);
        assert_eq!(cfg.precision, Precision::Bf16);
        assert_eq!(cfg.iterations, 3);
    }

    #[test]
    fn test_compare_requires_test_file() {
        assert!(Cli::try_parse_from(["ape", "compare"]).is_err());
        assert!(Cli::try_parse_from(["ape", "compare", "--test-file", "t.jsonl"]).is_ok());
    }
}
