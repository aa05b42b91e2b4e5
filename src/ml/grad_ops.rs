// Gradient and parameter walks built on burn's ModuleVisitor.
//
// Gradients live on the inner (non-autodiff) backend inside
// GradientsParams, keyed by the ParamId of each float parameter.

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

struct GradNormVisitor<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum_sq: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

/// L2 norm over every gradient. Non-finite when any gradient is.
pub fn global_grad_norm<B, M>(model: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradNormVisitor::<B> {
        grads,
        sum_sq: 0.0,
        _backend: PhantomData,
    };
    model.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

struct GradScaleVisitor<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    factor: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// Multiply every gradient by `factor`.
pub fn scale_grads<B, M>(model: &M, grads: &mut GradientsParams, factor: f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradScaleVisitor::<B> {
        grads,
        factor,
        _backend: PhantomData,
    };
    model.visit(&mut visitor);
}

struct FingerprintVisitor<B: Backend> {
    total: f64,
    _backend: PhantomData<B>,
}

impl<B: Backend> ModuleVisitor<B> for FingerprintVisitor<B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.total += tensor.clone().abs().sum().into_scalar().elem::<f64>();
    }
}

/// Sum of absolute parameter values; changes whenever an update lands.
pub fn param_fingerprint<B: Backend, M: Module<B>>(model: &M) -> f64 {
    let mut visitor = FingerprintVisitor::<B> {
        total: 0.0,
        _backend: PhantomData,
    };
    model.visit(&mut visitor);
    visitor.total
}
