//! Gradient clipping utilities

use crate::Tensor;

/// Global L2 norm of all gradients held by `params`
pub fn global_grad_norm(params: &[Tensor]) -> f32 {
    params
        .iter()
        .map(Tensor::grad_norm_sq)
        .sum::<f32>()
        .sqrt()
}

/// Clip gradients by global norm
///
/// 1. global_norm = sqrt(sum of all gradient squared norms)
/// 2. If global_norm > max_norm, every gradient is scaled by
///    `max_norm / global_norm`
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let global_norm = global_grad_norm(params);

    if global_norm > max_norm && global_norm.is_finite() {
        let clip_coef = max_norm / global_norm;
        for param in params.iter_mut() {
            if let Some(grad) = param.grad() {
                let clipped = grad * clip_coef;
                param.set_grad(clipped);
            }
        }
    }

    global_norm
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Clipping never increases the global norm and is a no-op under the threshold
        #[test]
        fn clipping_never_increases_norm(
            grads in prop::collection::vec(-100.0f32..100.0, 1..32),
            max_norm in 0.01f32..50.0,
        ) {
            let mut t = Tensor::from_vec("p", vec![0.0; grads.len()], true);
            t.set_grad(ndarray::Array1::from(grads.clone()));
            let mut params = vec![t];

            let before = clip_grad_norm(&mut params, max_norm);
            let after = global_grad_norm(&params);

            prop_assert!(after <= before * (1.0 + 1e-5) + 1e-6);
            if before <= max_norm {
                let unchanged = params[0].grad().unwrap().to_vec();
                prop_assert_eq!(unchanged, grads);
            } else {
                prop_assert!((after - max_norm).abs() <= max_norm * 1e-4 + 1e-5);
            }
        }
    }
}
