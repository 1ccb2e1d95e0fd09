//! Optimizer(s)

use ndarray::{Array, Dimension};

use crate::nn::{Gradients, Mlp};

/// Common interface for optimizers
/// Analogous to the torch.optim.Optimizer interface
/// <https://pytorch.org/docs/stable/optim.html#base-class>
pub trait Optim {
    /// Performs a single optimization step with the given gradients
    fn step(&mut self, model: &mut Mlp, grads: &Gradients);
}

/// SGD with momentum
pub struct Sgd {
    // currently does not change the learning rate based on the iteration
    // ideally lr would decay over time
    lr: f32,
    momentum: f32,
    // velocity per parameter tensor, zero until the first step
    velocity: Option<Gradients>,
}

impl Sgd {
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocity: None,
        }
    }

    #[cfg(test)]
    fn velocity(&self) -> &Gradients {
        self.velocity.as_ref().unwrap()
    }
}

fn step_tensor<D: Dimension>(
    param: &mut Array<f32, D>,
    velocity: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    lr: f32,
    momentum: f32,
) {
    // SGD with momentum: v = momentum * v - lr * g; p += v
    velocity.zip_mut_with(grad, |v, &g| *v = momentum * *v - lr * g);
    *param += &*velocity;
}

impl Optim for Sgd {
    fn step(&mut self, model: &mut Mlp, grads: &Gradients) {
        let velocity = self
            .velocity
            .get_or_insert_with(|| Gradients::zeros_like(model));
        step_tensor(&mut model.w1, &mut velocity.w1, &grads.w1, self.lr, self.momentum);
        step_tensor(&mut model.b1, &mut velocity.b1, &grads.b1, self.lr, self.momentum);
        step_tensor(&mut model.w2, &mut velocity.w2, &grads.w2, self.lr, self.momentum);
        step_tensor(&mut model.b2, &mut velocity.b2, &grads.b2, self.lr, self.momentum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;
    use ndarray::{Array1, Array2, array};

    fn unit_model() -> (Mlp, Gradients) {
        let model = Mlp::from_parts(
            array![[1.0]],
            array![2.0],
            array![[1.0]],
            array![2.0],
        );
        let grads = Gradients {
            w1: Array2::ones((1, 1)),
            b1: Array1::ones(1),
            w2: Array2::ones((1, 1)),
            b2: Array1::ones(1),
        };
        (model, grads)
    }

    #[test]
    fn test_sgd_no_momentum() {
        let (mut model, grads) = unit_model();
        let mut optim = Sgd::new(0.1, 0.0);
        optim.step(&mut model, &grads);
        assert_eq_float!(model.w1[[0, 0]], 0.9);
        assert_eq_float!(model.b1[0], 1.9);
        assert_eq_float!(model.w2[[0, 0]], 0.9);
        assert_eq_float!(model.b2[0], 1.9);
    }

    #[test]
    fn test_sgd_with_momentum() {
        let (mut model, grads) = unit_model();
        let mut optim = Sgd::new(0.1, 0.9);
        optim.step(&mut model, &grads);
        assert_eq_float!(model.w1[[0, 0]], 0.9);
        assert_eq_float!(model.b1[0], 1.9);
        assert_eq_float!(optim.velocity().w1[[0, 0]], -0.1);

        // second step accumulates velocity: v = 0.9 * -0.1 - 0.1 = -0.19
        optim.step(&mut model, &grads);
        assert_eq_float!(model.w1[[0, 0]], 0.71);
        assert_eq_float!(model.b1[0], 1.71);
        assert_eq_float!(optim.velocity().w1[[0, 0]], -0.19);
    }

    #[test]
    fn test_shapes_are_preserved() {
        let (mut model, grads) = unit_model();
        let mut optim = Sgd::new(0.1, 0.9);
        let dims = (model.w1.raw_dim(), model.b1.raw_dim());
        optim.step(&mut model, &grads);
        assert_eq!(model.w1.raw_dim(), dims.0);
        assert_eq!(model.b1.raw_dim(), dims.1);
    }
}
