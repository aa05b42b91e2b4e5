// ============================================================
// Layer 5 — Loss Scaler
// ============================================================
// Dynamic loss scaling for reduced-precision fine-tuning.
//
// The loss is multiplied by `scale` before backward so small
// gradients survive a narrow float format; gradients are divided
// by the same `scale` before clipping and the optimizer step.
//
// State machine:
//   finite grads   → steps_since_growth += 1
//                    (== growth_interval → scale *= 2, counter = 0)
//   overflow       → step skipped, scale *= 0.5 (floor 1.0),
//                    steps_since_growth = 0
//
// The ndarray backend computes in f32 regardless; the scaler keeps
// the same discipline so overflow handling behaves identically on
// an accelerator running half precision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Successful steps before the loss scale is increased
pub const DEFAULT_SCALE_GROWTH_INTERVAL: usize = 2000;

const FP16_INITIAL_SCALE: f64 = 65536.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp32,
    Fp16,
    Bf16,
}

impl Precision {
    /// bf16 has the f32 exponent range and needs no scaling.
    pub fn needs_loss_scaling(&self) -> bool {
        matches!(self, Precision::Fp16)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Bf16 => "bf16",
        };
        f.write_str(s)
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fp32" | "f32" => Ok(Precision::Fp32),
            "fp16" | "f16" => Ok(Precision::Fp16),
            "bf16" => Ok(Precision::Bf16),
            other => Err(format!("unknown precision '{other}' (expected fp32, fp16 or bf16)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LossScaler {
    scale: f64,
    growth_factor: f64,
    backoff_factor: f64,
    growth_interval: usize,
    steps_since_growth: usize,
    consecutive_overflows: usize,
    overflow_count: usize,
    successful_steps: usize,
    dynamic: bool,
}

impl LossScaler {
    pub fn new(initial_scale: f64, growth_interval: usize) -> Self {
        Self {
            scale: initial_scale.max(1.0),
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: growth_interval.max(1),
            steps_since_growth: 0,
            consecutive_overflows: 0,
            overflow_count: 0,
            successful_steps: 0,
            dynamic: true,
        }
    }

    /// Fixed scale of 1.0; overflow still skips the step.
    pub fn disabled() -> Self {
        Self {
            dynamic: false,
            ..Self::new(1.0, DEFAULT_SCALE_GROWTH_INTERVAL)
        }
    }

    pub fn for_precision(precision: Precision, growth_interval: usize) -> Self {
        if precision.needs_loss_scaling() {
            Self::new(FP16_INITIAL_SCALE, growth_interval)
        } else {
            Self::disabled()
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Record the outcome of one attempted optimizer step.
    pub fn update(&mut self, grads_finite: bool) {
        if grads_finite {
            self.successful_steps += 1;
            self.consecutive_overflows = 0;
        } else {
            self.overflow_count += 1;
            self.consecutive_overflows += 1;
        }

        if !self.dynamic {
            return;
        }

        if grads_finite {
            self.steps_since_growth += 1;
            if self.steps_since_growth >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_growth = 0;
            }
        } else {
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.steps_since_growth = 0;
        }
    }

    pub fn consecutive_overflows(&self) -> usize {
        self.consecutive_overflows
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    pub fn successful_steps(&self) -> usize {
        self.successful_steps
    }
}

impl Default for LossScaler {
    fn default() -> Self {
        Self::for_precision(Precision::Fp16, DEFAULT_SCALE_GROWTH_INTERVAL)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_halves_scale() {
        let mut s = LossScaler::new(1024.0, 10);
        s.update(false);
        assert_eq!(s.scale(), 512.0);
        assert_eq!(s.overflow_count(), 1);
        assert_eq!(s.consecutive_overflows(), 1);
    }

    #[test]
    fn test_scale_never_drops_below_one() {
        let mut s = LossScaler::new(4.0, 10);
        for _ in 0..10 {
            s.update(false);
        }
        assert_eq!(s.scale(), 1.0);
        assert_eq!(s.consecutive_overflows(), 10);
    }

    #[test]
    fn test_growth_after_interval() {
        let mut s = LossScaler::new(8.0, 3);
        s.update(true);
        s.update(true);
        assert_eq!(s.scale(), 8.0);
        s.update(true);
        assert_eq!(s.scale(), 16.0);
    }

    #[test]
    fn test_overflow_resets_growth_counter() {
        let mut s = LossScaler::new(8.0, 3);
        s.update(true);
        s.update(true);
        s.update(false); // 4.0, counter reset
        s.update(true);
        s.update(true);
        assert_eq!(s.scale(), 4.0);
        assert_eq!(s.consecutive_overflows(), 0);
        s.update(true);
        assert_eq!(s.scale(), 8.0);
    }

    #[test]
    fn test_disabled_scaler_is_fixed_at_one() {
        let mut s = LossScaler::for_precision(Precision::Fp32, 1);
        assert!(!s.is_dynamic());
        s.update(true);
        s.update(false);
        assert_eq!(s.scale(), 1.0);
        assert_eq!(s.overflow_count(), 1);
    }

    #[test]
    fn test_precision_parses_from_cli_text() {
        assert_eq!("FP16".parse::<Precision>().unwrap(), Precision::Fp16);
        assert_eq!("bf16".parse::<Precision>().unwrap(), Precision::Bf16);
        assert!("int8".parse::<Precision>().is_err());
        assert_eq!(Precision::Fp32.to_string(), "fp32");
    }
}
