//! Loss function(s)

use ndarray::Array2;

/// Mean softmax cross-entropy between a batch of logits and integer class labels.
/// There is no gradient tape: `call` returns the loss together with its
/// gradient at the logits, which is all the two-layer backward pass needs.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Returns `(mean_loss, dlogits)` for logits of shape (batch, n_classes)
    /// and one label in 0..n_classes per row.
    pub fn call(logits: &Array2<f32>, labels: &[u8]) -> (f32, Array2<f32>) {
        debug_assert_eq!(logits.nrows(), labels.len());
        let batch = logits.nrows() as f32;
        let mut dlogits = Array2::zeros(logits.raw_dim());
        let mut total = 0.0;

        for (i, row) in logits.outer_iter().enumerate() {
            // subtract the row max so exp never overflows
            let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let exps = row.mapv(|v| (v - max).exp());
            let sum = exps.sum();
            let y = labels[i] as usize;
            total += sum.ln() - (row[y] - max);

            // d loss_i / d logits_i = softmax(logits_i) - onehot(y)
            let mut drow = dlogits.row_mut(i);
            drow.assign(&(exps / sum));
            drow[y] -= 1.0;
        }

        dlogits.mapv_inplace(|v| v / batch);
        (total / batch, dlogits)
    }
}
