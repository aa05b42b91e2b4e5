// ============================================================
// Layer 5 — Gradient Accumulator
// ============================================================
// Sums per-example gradients until an optimizer step is due.
//
//   Accumulating { pending < accum_steps }
//        │ push
//        ▼
//   ReadyToStep { pending }   ← also reached by flush() at batch end
//        │ take
//        ▼
//   Accumulating { pending: 0 }
//
// The counter is kept separate from burn's GradientsAccumulator so
// the state transitions can be tested without a model.

use burn::{
    module::AutodiffModule,
    optim::{GradientsAccumulator, GradientsParams},
    tensor::backend::AutodiffBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulationState {
    Accumulating { pending: usize },
    ReadyToStep { pending: usize },
}

impl AccumulationState {
    pub fn is_ready(&self) -> bool {
        matches!(self, AccumulationState::ReadyToStep { .. })
    }

    pub fn pending(&self) -> usize {
        match *self {
            AccumulationState::Accumulating { pending } | AccumulationState::ReadyToStep { pending } => {
                pending
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccumulationCounter {
    accum_steps: usize,
    state: AccumulationState,
}

impl AccumulationCounter {
    pub fn new(accum_steps: usize) -> Self {
        Self {
            accum_steps: accum_steps.max(1),
            state: AccumulationState::Accumulating { pending: 0 },
        }
    }

    pub fn state(&self) -> AccumulationState {
        self.state
    }

    /// Count one more example's gradients.
    pub fn push(&mut self) -> AccumulationState {
        let pending = self.state.pending() + 1;
        self.state = if pending >= self.accum_steps {
            AccumulationState::ReadyToStep { pending }
        } else {
            AccumulationState::Accumulating { pending }
        };
        self.state
    }

    /// Force a step for a partial window. No-op when nothing is pending.
    pub fn flush(&mut self) -> AccumulationState {
        let pending = self.state.pending();
        if pending > 0 {
            self.state = AccumulationState::ReadyToStep { pending };
        }
        self.state
    }

    pub fn reset(&mut self) {
        self.state = AccumulationState::Accumulating { pending: 0 };
    }
}

/// burn's gradient sum paired with the step counter.
pub struct GradAccumulator<M> {
    counter: AccumulationCounter,
    grads: GradientsAccumulator<M>,
}

impl<M> GradAccumulator<M> {
    pub fn new(accum_steps: usize) -> Self {
        Self {
            counter: AccumulationCounter::new(accum_steps),
            grads: GradientsAccumulator::new(),
        }
    }

    pub fn accumulate<B>(&mut self, model: &M, grads: GradientsParams) -> AccumulationState
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        self.grads.accumulate(model, grads);
        self.counter.push()
    }

    pub fn flush(&mut self) -> AccumulationState {
        self.counter.flush()
    }

    /// Summed gradients and the number of examples behind them, if a
    /// step is due. Resets to `Accumulating`.
    pub fn take(&mut self) -> Option<(GradientsParams, usize)> {
        match self.counter.state() {
            AccumulationState::ReadyToStep { pending } => {
                self.counter.reset();
                Some((self.grads.grads(), pending))
            }
            AccumulationState::Accumulating { .. } => None,
        }
    }
}
