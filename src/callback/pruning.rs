//! L1 unstructured magnitude pruning

use super::{CallbackAction, CallbackHooks};
use crate::model::Model;
use crate::train::RunContext;
use crate::{Error, Result, Tensor};
use std::collections::BTreeMap;
use tracing::info;

/// Zero the smallest-magnitude fraction of each trainable weight matrix
///
/// Runs at the end of every `every`-th epoch. Rank-1 tensors (biases) are left
/// alone. Pruned positions are remembered for the rest of the run: their
/// gradients are zeroed before each optimizer step and their weights are reset
/// to zero after it, since optimizer state (e.g. AdamW moments) can still move
/// a weight whose gradient is zero.
#[derive(Debug, Clone)]
pub struct Pruning {
    amount: f32,
    every: usize,
    masks: BTreeMap<String, Vec<bool>>,
}

impl Pruning {
    /// Prune `amount` (in `[0, 1]`) of each weight matrix every epoch
    pub fn new(amount: f32) -> Self {
        Self {
            amount,
            every: 1,
            masks: BTreeMap::new(),
        }
    }

    pub fn every(mut self, epochs: usize) -> Self {
        self.every = epochs;
        self
    }

    /// Fraction of prunable weights currently masked
    pub fn sparsity(&self) -> f64 {
        let (zeroed, total) = self.masks.values().fold((0, 0), |(z, t), m| {
            (z + m.iter().filter(|&&pruned| pruned).count(), t + m.len())
        });
        if total == 0 {
            0.0
        } else {
            zeroed as f64 / total as f64
        }
    }

    fn prunable(param: &Tensor) -> bool {
        param.requires_grad() && param.shape().len() >= 2
    }

    /// Mask the `round(amount * n)` smallest magnitudes of `param`
    fn prune(&mut self, param: &mut Tensor) {
        let n = param.len();
        let k = ((self.amount * n as f32).round() as usize).min(n);
        let mask = self
            .masks
            .entry(param.name().to_string())
            .or_insert_with(|| vec![false; n]);
        if k == 0 {
            return;
        }

        let data = param.data_mut();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| data[a].abs().total_cmp(&data[b].abs()));
        for &i in &order[..k] {
            mask[i] = true;
        }
        apply_mask(data.iter_mut(), mask);
    }
}

fn apply_mask<'a>(values: impl Iterator<Item = &'a mut f32>, mask: &[bool]) {
    for (v, &pruned) in values.zip(mask) {
        if pruned {
            *v = 0.0;
        }
    }
}

impl CallbackHooks for Pruning {
    fn name(&self) -> &str {
        "Pruning"
    }

    fn on_train_begin(&mut self, _ctx: &RunContext) -> Result<()> {
        if !(0.0..=1.0).contains(&self.amount) {
            return Err(Error::Config(format!(
                "pruning amount must be in [0, 1], got {}",
                self.amount
            )));
        }
        if self.every == 0 {
            return Err(Error::Config("pruning interval must be > 0".to_string()));
        }
        self.masks.clear();
        Ok(())
    }

    fn before_optimizer_step(&mut self, _ctx: &RunContext, params: &mut [Tensor]) -> Result<()> {
        for param in params.iter_mut() {
            let Some(mask) = self.masks.get(param.name()) else {
                continue;
            };
            if let Some(grad) = param.grad() {
                let mut grad = grad.clone();
                apply_mask(grad.iter_mut(), mask);
                param.set_grad(grad);
            }
        }
        Ok(())
    }

    fn after_optimizer_step(&mut self, _ctx: &RunContext, params: &mut [Tensor]) -> Result<()> {
        for param in params.iter_mut() {
            if let Some(mask) = self.masks.get(param.name()) {
                apply_mask(param.data_mut().iter_mut(), mask);
            }
        }
        Ok(())
    }

    fn on_epoch_end(&mut self, ctx: &RunContext, model: &mut dyn Model) -> Result<CallbackAction> {
        if (ctx.epoch + 1) % self.every != 0 {
            return Ok(CallbackAction::Continue);
        }
        for param in model.parameters_mut() {
            if Self::prunable(param) {
                self.prune(param);
            }
        }
        info!(
            epoch = ctx.epoch,
            sparsity = self.sparsity(),
            "Pruned weights"
        );
        Ok(CallbackAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlobalAvgPool, ImageClassifier};
    use ndarray::arr1;

    fn weight() -> Tensor {
        Tensor::new(
            "head.weight",
            vec![2, 2],
            arr1(&[0.5, -0.1, 2.0, 0.05]),
            true,
        )
    }

    #[test]
    fn test_prunes_smallest_magnitudes() {
        let mut pruning = Pruning::new(0.5);
        let mut w = weight();
        pruning.prune(&mut w);
        assert_eq!(w.data(), &arr1(&[0.5, 0.0, 2.0, 0.0]));
        assert_eq!(pruning.sparsity(), 0.5);
    }

    #[test]
    fn test_mask_is_held_around_optimizer_steps() {
        let mut pruning = Pruning::new(0.5);
        let mut params = vec![weight()];
        pruning.prune(&mut params[0]);
        let ctx = RunContext::default();

        params[0].set_grad(arr1(&[1.0, 1.0, 1.0, 1.0]));
        pruning.before_optimizer_step(&ctx, &mut params).unwrap();
        assert_eq!(params[0].grad().unwrap(), &arr1(&[1.0, 0.0, 1.0, 0.0]));

        // an update with momentum moved a pruned weight
        params[0].data_mut()[1] = 0.3;
        pruning.after_optimizer_step(&ctx, &mut params).unwrap();
        assert_eq!(params[0].data(), &arr1(&[0.5, 0.0, 2.0, 0.0]));
    }

    #[test]
    fn test_skips_biases_and_respects_interval() {
        let mut model = ImageClassifier::new(Box::new(GlobalAvgPool::new(4, 1, 1)), 2, 3);
        let bias_before = model.parameters()[1].data().clone();
        let mut pruning = Pruning::new(0.25).every(2);
        pruning.on_train_begin(&RunContext::default()).unwrap();

        let mut ctx = RunContext::default();
        pruning.on_epoch_end(&ctx, &mut model).unwrap();
        assert_eq!(pruning.sparsity(), 0.0);

        ctx.epoch = 1;
        pruning.on_epoch_end(&ctx, &mut model).unwrap();
        assert_eq!(pruning.sparsity(), 0.25);
        let zeros = model.parameters()[0].data().iter().filter(|&&v| v == 0.0).count();
        assert_eq!(zeros, 2);
        assert_eq!(model.parameters()[1].data(), &bias_before);
    }

    #[test]
    fn test_rejects_bad_amount() {
        let mut pruning = Pruning::new(1.5);
        assert!(pruning.on_train_begin(&RunContext::default()).is_err());
    }
}
