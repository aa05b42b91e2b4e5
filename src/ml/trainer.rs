// ============================================================
// Layer 5 — Perturbation Step
// ============================================================
// Fine-tunes the current model on one batch for a fixed number of
// epochs. One forward pass per pair, gradients summed over
// `accum_steps` pairs, then one Adam step.
//
// Per example:
//   loss   = CE(labels | article, decoder_input)
//   scaled = loss * scale / accum_steps
//   grads += d(scaled)/dθ
//
// Per optimizer step:
//   norm_s = ||grads||                   (still scaled)
//   norm_s non-finite → skip, scaler backs off
//   norm   = norm_s / scale
//   grads *= (1 / scale) * min(1, max_grad_norm / norm)
//   θ      = Adam(θ, grads, lr)
//
// Unscaling and clipping are folded into one multiply so the
// gradients are only walked twice.

use std::marker::PhantomData;

use anyhow::Result;
use burn::{
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::Batch;
use crate::data::encoder::EncodedPair;
use crate::domain::corpus::SummaryPair;
use crate::ml::accumulator::GradAccumulator;
use crate::ml::context::RunContext;
use crate::ml::grad_ops::{global_grad_norm, scale_grads};
use crate::ml::loss_scale::LossScaler;
use crate::ml::model::{ids_tensor, labels_tensor, Summarizer};

#[derive(Debug, Clone, Copy)]
pub struct PerturbSettings {
    pub epochs: usize,
    pub accum_steps: usize,
    pub max_grad_norm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerturbationReport {
    pub examples: usize,
    pub optimizer_steps: usize,
    pub skipped_steps: usize,
    pub mean_loss: f64,
    pub final_scale: f64,
}

pub struct Perturber<B: AutodiffBackend, O> {
    optim: O,
    scaler: LossScaler,
    settings: PerturbSettings,
    _backend: PhantomData<B>,
}

impl<B, O> Perturber<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Summarizer<B>, B>,
{
    pub fn new(optim: O, scaler: LossScaler, settings: PerturbSettings) -> Self {
        Self {
            optim,
            scaler,
            settings,
            _backend: PhantomData,
        }
    }

    /// Update `model` in place using the pairs of `batch`.
    pub fn perturb(
        &mut self,
        model: &mut Summarizer<B>,
        batch: &Batch,
        pairs: &[SummaryPair],
        ctx: &RunContext<B>,
    ) -> Result<PerturbationReport> {
        let mut report = PerturbationReport {
            examples: 0,
            optimizer_steps: 0,
            skipped_steps: 0,
            mean_loss: f64::NAN,
            final_scale: self.scaler.scale(),
        };

        if batch.is_empty() || pairs.is_empty() {
            tracing::warn!("Iteration {}: empty batch, model left unchanged", batch.iteration);
            return Ok(report);
        }

        let encoded = pairs
            .iter()
            .map(|p| ctx.encoder().encode_pair(p))
            .collect::<Result<Vec<EncodedPair>>>()?;

        let device = ctx.device();
        let accum_steps = self.settings.accum_steps.max(1);
        let mut accumulator = GradAccumulator::<Summarizer<B>>::new(accum_steps);
        let mut loss_sum = 0.0f64;

        for epoch in 1..=self.settings.epochs {
            for example in &encoded {
                let loss = model.forward_loss(
                    ids_tensor::<B>(&example.input_ids, device),
                    ids_tensor::<B>(&example.decoder_input, device),
                    labels_tensor::<B>(&example.labels, device),
                );
                loss_sum += loss.clone().into_scalar().elem::<f64>();
                report.examples += 1;

                let scaled = loss.mul_scalar(self.scaler.scale() / accum_steps as f64);
                let grads = GradientsParams::from_grads(scaled.backward(), &*model);

                if accumulator.accumulate(&*model, grads).is_ready() {
                    self.apply_step(model, &mut accumulator, batch.learning_rate, &mut report);
                }
            }

            // Partial window at the end of the pass.
            if accumulator.flush().is_ready() {
                self.apply_step(model, &mut accumulator, batch.learning_rate, &mut report);
            }

            tracing::debug!(
                "Iteration {} epoch {}/{}: {} steps so far, scale={}",
                batch.iteration,
                epoch,
                self.settings.epochs,
                report.optimizer_steps,
                self.scaler.scale(),
            );
        }

        report.mean_loss = loss_sum / report.examples.max(1) as f64;
        report.final_scale = self.scaler.scale();
        tracing::debug!(
            "Loss scaler after iteration {}: {} clean steps, {} overflows in total",
            batch.iteration,
            self.scaler.successful_steps(),
            self.scaler.overflow_count(),
        );
        Ok(report)
    }

    fn apply_step(
        &mut self,
        model: &mut Summarizer<B>,
        accumulator: &mut GradAccumulator<Summarizer<B>>,
        lr: f64,
        report: &mut PerturbationReport,
    ) {
        let Some((mut grads, pending)) = accumulator.take() else {
            return;
        };

        let scale = self.scaler.scale();
        let scaled_norm = global_grad_norm(&*model, &grads);
        if !scaled_norm.is_finite() {
            self.scaler.update(false);
            report.skipped_steps += 1;
            tracing::warn!(
                "Gradient overflow over {} examples, step skipped (scale {} → {}, {} in a row)",
                pending,
                scale,
                self.scaler.scale(),
                self.scaler.consecutive_overflows(),
            );
            return;
        }

        let norm = scaled_norm / scale;
        let clip = clip_factor(norm, self.settings.max_grad_norm);
        scale_grads(&*model, &mut grads, clip / scale);

        *model = self.optim.step(lr, model.clone(), grads);
        self.scaler.update(true);
        report.optimizer_steps += 1;

        tracing::debug!("Optimizer step over {} examples: grad_norm={:.4} clip={:.4}", pending, norm, clip);
    }
}

/// Multiplier that brings a gradient of norm `norm` down to
/// `max_norm`; 1.0 when it is already within bounds.
pub fn clip_factor(norm: f64, max_norm: f64) -> f64 {
    if norm > max_norm && norm > 0.0 {
        max_norm / norm
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::IterationBatcher;
    use crate::data::encoder::SequenceEncoder;
    use crate::infra::tokenizer_store::TokenizerStore;
    use crate::ml::grad_ops::{global_grad_norm, param_fingerprint, scale_grads};
    use crate::ml::loss_scale::Precision;
    use crate::ml::model::SummarizerConfig;
    use burn::backend::{Autodiff, NdArray};
    use approx::assert_relative_eq;
    use burn::optim::AdamConfig;

    type TestBackend = Autodiff<NdArray>;

    fn setup(pairs: &[SummaryPair]) -> (tempfile::TempDir, RunContext<TestBackend>, Summarizer<TestBackend>) {
        let dir = tempfile::tempdir().unwrap();
        let texts: Vec<String> = pairs
            .iter()
            .flat_map(|p| [p.article.clone(), p.summary.clone()])
            .collect();
        let tok = TokenizerStore::new(dir.path()).load_or_build(&texts, 64).unwrap();
        let encoder = SequenceEncoder::new(tok, 12, 6).unwrap();
        let device = Default::default();
        let model = SummarizerConfig::new(encoder.vocab_size(), 13)
            .with_d_model(16)
            .with_num_heads(2)
            .with_encoder_layers(1)
            .with_decoder_layers(1)
            .with_d_ff(32)
            .with_dropout(0.0)
            .init(&device);
        (dir, RunContext::new(device, encoder, 6), model)
    }

    fn pairs(n: usize) -> Vec<SummaryPair> {
        (0..n)
            .map(|i| SummaryPair::new(format!("the market rose {i} points today"), "market rose"))
            .collect()
    }

    fn perturber(
        precision: Precision,
        accum_steps: usize,
    ) -> Perturber<TestBackend, impl Optimizer<Summarizer<TestBackend>, TestBackend>> {
        perturber_with(LossScaler::for_precision(precision, 2000), accum_steps)
    }

    fn perturber_with(
        scaler: LossScaler,
        accum_steps: usize,
    ) -> Perturber<TestBackend, impl Optimizer<Summarizer<TestBackend>, TestBackend>> {
        Perturber::new(
            AdamConfig::new()
                .with_epsilon(1e-8)
                .init::<TestBackend, Summarizer<TestBackend>>(),
            scaler,
            PerturbSettings {
                epochs: 1,
                accum_steps,
                max_grad_norm: 1.0,
            },
        )
    }

    #[test]
    fn test_steps_follow_accumulation_windows() {
        let data = pairs(10);
        let (_dir, ctx, mut model) = setup(&data);
        let batch = IterationBatcher::new(1, 1e-3).plan(data.len()).unwrap().remove(0);
        let mut p = perturber(Precision::Fp16, 4);

        let before = param_fingerprint(&model);
        let report = p.perturb(&mut model, &batch, &data, &ctx).unwrap();

        // 10 examples / 4 → two full windows + one flushed partial
        assert_eq!(report.examples, 10);
        assert_eq!(report.optimizer_steps + report.skipped_steps, 3);
        assert!(report.mean_loss.is_finite());
        assert_ne!(param_fingerprint(&model), before);
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let data = pairs(2);
        let (_dir, ctx, mut model) = setup(&data);
        let batch = IterationBatcher::new(3, 1e-3).plan(data.len()).unwrap().remove(2);
        assert!(batch.is_empty());

        let before = param_fingerprint(&model);
        let report = perturber(Precision::Fp32, 4)
            .perturb(&mut model, &batch, &data[batch.range.clone()], &ctx)
            .unwrap();
        assert_eq!(report.examples, 0);
        assert_eq!(report.optimizer_steps, 0);
        assert_eq!(param_fingerprint(&model), before);
    }

    #[test]
    fn test_overflow_skips_every_step_and_backs_off() {
        let data = pairs(8);
        let (_dir, ctx, mut model) = setup(&data);
        let batch = IterationBatcher::new(1, 1e-3).plan(data.len()).unwrap().remove(0);
        // scale / accum_steps overflows f32, so every gradient is non-finite
        let mut p = perturber_with(LossScaler::new(1e300, 2000), 4);

        let before = param_fingerprint(&model);
        let report = p.perturb(&mut model, &batch, &data, &ctx).unwrap();

        assert_eq!(report.examples, 8);
        assert_eq!(report.optimizer_steps, 0);
        assert_eq!(report.skipped_steps, 2);
        assert_relative_eq!(report.final_scale, 2.5e299);
        assert_eq!(param_fingerprint(&model), before);
    }

    #[test]
    fn test_clip_factor_bounds_the_norm() {
        assert_eq!(clip_factor(0.5, 1.0), 1.0);
        assert_eq!(clip_factor(1.0, 1.0), 1.0);
        assert_eq!(clip_factor(0.0, 1.0), 1.0);
        assert_relative_eq!(clip_factor(4.0, 1.0), 0.25);
    }

    #[test]
    fn test_clipped_gradients_respect_max_norm() {
        let data = pairs(1);
        let (_dir, ctx, model) = setup(&data);
        let example = ctx.encoder().encode_pair(&data[0]).unwrap();
        let device = ctx.device();
        let loss = model.forward_loss(
            ids_tensor::<TestBackend>(&example.input_ids, device),
            ids_tensor::<TestBackend>(&example.decoder_input, device),
            labels_tensor::<TestBackend>(&example.labels, device),
        );
        let mut grads = GradientsParams::from_grads(loss.backward(), &model);

        let norm = global_grad_norm(&model, &grads);
        assert!(norm.is_finite() && norm > 0.0);
        let max_norm = norm / 10.0;
        scale_grads(&model, &mut grads, clip_factor(norm, max_norm));

        let clipped = global_grad_norm(&model, &grads);
        assert!(clipped <= max_norm * (1.0 + 1e-4), "{clipped} > {max_norm}");
        assert_relative_eq!(clipped, max_norm, max_relative = 1e-4);
    }
}
