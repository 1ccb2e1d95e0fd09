//! Data loader

use ndarray::{Array2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

/// Errors for the dataloader
#[derive(Debug, Error)]
pub enum DataLoaderError {
    #[error("Labels must have the same length as the data")]
    LabelLengthMismatch { label_len: usize, data_len: usize },
    #[error("Batch size must be non-zero")]
    ZeroBatchSize,
}

/// Data loader, returns batches of images and labels, in order or shuffled
/// Takes inspiration from the PyTorch DataLoader
/// <https://pytorch.org/docs/stable/data.html#torch.utils.data.DataLoader>
pub struct DataLoader {
    images: Array2<f32>,
    labels: Vec<u8>,
    batch_size: usize,
}

impl DataLoader {
    pub fn new(
        images: Array2<f32>,
        labels: Vec<u8>,
        batch_size: usize,
    ) -> Result<Self, DataLoaderError> {
        if images.nrows() != labels.len() {
            return Err(DataLoaderError::LabelLengthMismatch {
                label_len: labels.len(),
                data_len: images.nrows(),
            });
        }
        if batch_size == 0 {
            return Err(DataLoaderError::ZeroBatchSize);
        }
        Ok(Self {
            images,
            labels,
            batch_size,
        })
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of batches in one pass, counting the partial tail batch
    pub fn n_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// In-order batches, for evaluation
    pub fn iter(&self) -> Batches<'_> {
        Batches {
            images: &self.images,
            labels: &self.labels,
            batch_size: self.batch_size,
            indices: (0..self.len()).collect(),
            curr: 0,
        }
    }

    /// Shuffled batches, for training. Reusing the same seeded rng across
    /// epochs keeps the whole run reproducible.
    pub fn iter_shuffled<R: Rng>(&self, rng: &mut R) -> Batches<'_> {
        let mut indices = (0..self.len()).collect::<Vec<_>>();
        indices.shuffle(rng);
        Batches {
            images: &self.images,
            labels: &self.labels,
            batch_size: self.batch_size,
            indices,
            curr: 0,
        }
    }
}

/// An iterator which returns mini batches of images and labels until the end
/// of the dataset
pub struct Batches<'a> {
    images: &'a Array2<f32>,
    labels: &'a [u8],
    batch_size: usize,
    // optionally shuffled indices
    indices: Vec<usize>,
    curr: usize,
}

impl Iterator for Batches<'_> {
    type Item = (Array2<f32>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr >= self.indices.len() {
            return None;
        }
        // the final batch may be smaller than batch_size
        let end = (self.curr + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.curr..end];
        let batch_images = self.images.select(Axis(0), batch_indices);
        let batch_labels = batch_indices.iter().map(|&i| self.labels[i]).collect();
        self.curr = end;
        Some((batch_images, batch_labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    #[test]
    fn test_dataloader() {
        let images = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let labels = vec![1, 0];
        let dataloader = DataLoader::new(images, labels, 2).unwrap();
        let mut iter = dataloader.iter();
        assert_eq!(
            iter.next(),
            Some((array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], vec![1, 0]))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_partial_tail_batch() {
        let images = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let labels = vec![0, 1, 2, 3, 4];
        let dataloader = DataLoader::new(images, labels, 2).unwrap();
        assert_eq!(dataloader.n_batches(), 3);

        let sizes = dataloader
            .iter()
            .map(|(images, labels)| {
                assert_eq!(images.nrows(), labels.len());
                labels.len()
            })
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_epoch_batch_counts() {
        // 10 examples, batch 3: ceil(10/3) = 4
        let images = Array2::<f32>::zeros((10, 2));
        let dataloader = DataLoader::new(images, vec![0; 10], 3).unwrap();
        assert_eq!(dataloader.n_batches(), 4);
        assert_eq!(dataloader.iter().count(), 4);
        assert_eq!(
            dataloader
                .iter_shuffled(&mut Pcg64Mcg::seed_from_u64(0))
                .count(),
            4
        );
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let images = array![[1.0], [2.0], [3.0], [4.0]];
        let labels = vec![0, 1, 2, 3];
        let dataloader = DataLoader::new(images, labels, 4).unwrap();

        let mut rng_a = Pcg64Mcg::seed_from_u64(42);
        let mut rng_b = Pcg64Mcg::seed_from_u64(42);
        let (images_a, labels_a) = dataloader.iter_shuffled(&mut rng_a).next().unwrap();
        let (images_b, labels_b) = dataloader.iter_shuffled(&mut rng_b).next().unwrap();
        assert_eq!(images_a, images_b);
        assert_eq!(labels_a, labels_b);

        // shuffling keeps every (image, label) pair intact
        for (image, label) in images_a.outer_iter().zip(labels_a.iter()) {
            assert_eq!(image[0] as usize, *label as usize + 1);
        }
    }

    #[test]
    fn test_dataloader_errors() {
        // different length data and labels
        let images = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let labels = vec![1, 0, 1];
        let dataloader = DataLoader::new(images, labels, 2);
        assert!(matches!(
            dataloader,
            Err(DataLoaderError::LabelLengthMismatch {
                label_len: 3,
                data_len: 2,
            })
        ));

        let images = array![[1.0], [2.0]];
        assert!(matches!(
            DataLoader::new(images, vec![0, 1], 0),
            Err(DataLoaderError::ZeroBatchSize)
        ));
    }
}
