//! The two-layer fully connected classifier and its gradients

use ndarray::{Array1, Array2, Axis, Zip};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

/// Errors for the neural network
#[derive(Debug, Error)]
pub enum NNError {
    #[error("Input size mismatch")]
    InputSizeMismatch { expected: usize, got: usize },
}

/// A multilayer perceptron with one hidden ReLU layer.
/// Parameters are stored input-major: a hidden unit's incoming weights are a
/// column of `w1`, which is what the weight-grid visualization reshapes.
pub struct Mlp {
    /// (n_inputs, n_hidden)
    pub w1: Array2<f32>,
    /// (n_hidden,)
    pub b1: Array1<f32>,
    /// (n_hidden, n_classes)
    pub w2: Array2<f32>,
    /// (n_classes,)
    pub b2: Array1<f32>,
}

/// Activations cached by a forward pass, consumed by `Mlp::backward`
#[derive(Debug)]
pub struct ForwardPass {
    /// post-ReLU hidden activations, (batch, n_hidden)
    pub hidden: Array2<f32>,
    /// raw class scores, (batch, n_classes)
    pub logits: Array2<f32>,
}

/// Gradients of the loss with respect to every parameter tensor.
/// Mirrors the shapes of [`Mlp`] exactly.
pub struct Gradients {
    pub w1: Array2<f32>,
    pub b1: Array1<f32>,
    pub w2: Array2<f32>,
    pub b2: Array1<f32>,
}

impl Gradients {
    /// Zero gradients shaped like the given model
    pub fn zeros_like(model: &Mlp) -> Self {
        Self {
            w1: Array2::zeros(model.w1.raw_dim()),
            b1: Array1::zeros(model.b1.raw_dim()),
            w2: Array2::zeros(model.w2.raw_dim()),
            b2: Array1::zeros(model.b2.raw_dim()),
        }
    }
}

impl Mlp {
    /// Creates a model with He-initialized weights drawn from `rng`
    pub fn new<R: Rng>(n_inputs: usize, n_hidden: usize, n_classes: usize, rng: &mut R) -> Self {
        // He initialization to ensure the variance of the output is the same as the input
        // and keep weights relatively small to avoid exploding or vanishing gradients
        let std1 = (2.0 / n_inputs as f32).sqrt();
        let normal1 = Normal::new(0.0, std1).unwrap();
        let w1 = Array2::from_shape_simple_fn((n_inputs, n_hidden), || normal1.sample(rng));
        let b1 = Array1::from_shape_simple_fn(n_hidden, || normal1.sample(rng));

        let std2 = (2.0 / n_hidden as f32).sqrt();
        let normal2 = Normal::new(0.0, std2).unwrap();
        let w2 = Array2::from_shape_simple_fn((n_hidden, n_classes), || normal2.sample(rng));
        let b2 = Array1::from_shape_simple_fn(n_classes, || normal2.sample(rng));

        Self { w1, b1, w2, b2 }
    }

    // Testing utility for a model with known, hand-pickable parameters
    #[cfg(test)]
    pub(crate) fn from_parts(
        w1: Array2<f32>,
        b1: Array1<f32>,
        w2: Array2<f32>,
        b2: Array1<f32>,
    ) -> Self {
        assert_eq!(w1.ncols(), b1.len());
        assert_eq!(w1.ncols(), w2.nrows());
        assert_eq!(w2.ncols(), b2.len());
        Self { w1, b1, w2, b2 }
    }

    pub fn n_inputs(&self) -> usize {
        self.w1.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.w2.ncols()
    }

    /// Computes logits for a batch of shape (batch, n_inputs).
    /// The width check runs before any matrix multiply; a malformed batch
    /// never reaches the linear algebra.
    pub fn forward(&self, batch: &Array2<f32>) -> Result<ForwardPass, NNError> {
        if batch.ncols() != self.n_inputs() {
            return Err(NNError::InputSizeMismatch {
                expected: self.n_inputs(),
                got: batch.ncols(),
            });
        }
        let mut hidden = batch.dot(&self.w1) + &self.b1;
        hidden.mapv_inplace(|v| v.max(0.0));
        let logits = hidden.dot(&self.w2) + &self.b2;
        Ok(ForwardPass { hidden, logits })
    }

    /// Backpropagates `dlogits` (the loss gradient at the logits) through the
    /// two layers. `batch` and `pass` must come from the same forward call.
    pub fn backward(
        &self,
        batch: &Array2<f32>,
        pass: &ForwardPass,
        dlogits: &Array2<f32>,
    ) -> Gradients {
        let dw2 = pass.hidden.t().dot(dlogits);
        let db2 = dlogits.sum_axis(Axis(0));

        // ReLU gate: units that were clamped to zero pass no gradient
        let mut dhidden = dlogits.dot(&self.w2.t());
        Zip::from(&mut dhidden).and(&pass.hidden).for_each(|d, &h| {
            if h <= 0.0 {
                *d = 0.0;
            }
        });

        let dw1 = batch.t().dot(&dhidden);
        let db1 = dhidden.sum_axis(Axis(0));

        Gradients {
            w1: dw1,
            b1: db1,
            w2: dw2,
            b2: db2,
        }
    }
}
