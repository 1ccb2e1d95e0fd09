//! Training and evaluation loops

use ndarray::ArrayView1;
use rand::Rng;

use crate::dataloader::DataLoader;
use crate::loss::CrossEntropyLoss;
use crate::nn::{Mlp, NNError};
use crate::optim::Optim;

/// Runs `epochs` shuffled passes of forward / loss / backward / SGD step.
/// Returns the final epoch's average batch loss. A NaN loss is reported
/// as-is, never caught.
pub fn train<O: Optim, R: Rng>(
    model: &mut Mlp,
    optim: &mut O,
    loader: &DataLoader,
    epochs: usize,
    rng: &mut R,
) -> Result<f32, NNError> {
    let mut avg_loss = f32::NAN;
    for epoch in 0..epochs {
        let mut epoch_loss = 0.0;
        let mut n_batches = 0usize;
        for (images, labels) in loader.iter_shuffled(rng) {
            let pass = model.forward(&images)?;
            let (loss, dlogits) = CrossEntropyLoss::call(&pass.logits, &labels);
            let grads = model.backward(&images, &pass, &dlogits);
            optim.step(model, &grads);
            epoch_loss += loss;
            n_batches += 1;
        }
        avg_loss = epoch_loss / n_batches as f32;
        log::info!(
            "epoch: {}, batches: {}, avg batch loss: {:.4}",
            epoch + 1,
            n_batches,
            avg_loss
        );
    }
    Ok(avg_loss)
}

/// Runs the model over in-order batches and returns top-1 accuracy as a
/// percentage. Forward-only: neither parameters nor optimizer state change.
pub fn evaluate(model: &Mlp, loader: &DataLoader) -> Result<f32, NNError> {
    let mut correct = 0usize;
    let mut total = 0usize;
    for (images, labels) in loader.iter() {
        let pass = model.forward(&images)?;
        for (row, &label) in pass.logits.outer_iter().zip(labels.iter()) {
            if argmax(row) == label as usize {
                correct += 1;
            }
            total += 1;
        }
    }
    Ok(100.0 * correct as f32 / total as f32)
}

/// Returns the index of the largest logit, taking the first on ties
fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}
