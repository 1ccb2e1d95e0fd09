//! MNIST download, caching, IDX parsing, and per-pipeline normalization
//!
//! The files are fetched from the CVDF mirror of the original distribution,
//! gunzipped once, and cached uncompressed under the platform cache directory.

use std::fmt::{self, Display};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use flate2::read::GzDecoder;
use ndarray::Array2;
use thiserror::Error;

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// Side length of one image
pub const IMAGE_SIDE: usize = 28;
/// Flattened size of one image; every batch row must have exactly this width
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
/// Digits 0 through 9
pub const N_CLASSES: usize = 10;

// canonical MNIST statistics, computed over the training split in [0,1]
const MNIST_MEAN: f32 = 0.1307;
const MNIST_STD: f32 = 0.3081;

/// Errors for the dataset loader
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("failed to download '{url}'")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("bad IDX magic number: expected {expected}, got {got}")]
    BadMagic { expected: u32, got: u32 },
    #[error("bad image dimensions: {rows}x{cols}, expected {IMAGE_SIDE}x{IMAGE_SIDE}")]
    BadImageSize { rows: usize, cols: usize },
    #[error("label {label} at index {index} is outside 0..={max}", max = N_CLASSES - 1)]
    LabelOutOfRange { index: usize, label: u8 },
    #[error("image count {images} does not match label count {labels}")]
    CountMismatch { images: usize, labels: usize },
    #[error("unexpected data layout")]
    Shape(#[from] ndarray::ShapeError),
}

/// The input-preprocessing convention of one pipeline.
///
/// The two pipelines are nominally identical apart from this choice; running
/// them side by side is what surfaces the accuracy gap the comparison is
/// about.
#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    /// pixels mapped to [0, 1]
    Scale,
    /// pixels mapped to [0, 1], then mean/std normalized
    Standardize,
}

impl Display for Normalize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalize::Scale => write!(f, "scale"),
            Normalize::Standardize => write!(f, "standardize"),
        }
    }
}

impl Normalize {
    /// Applies the convention in place to raw pixel values in [0, 255]
    pub fn apply(&self, images: &mut Array2<f32>) {
        match self {
            Normalize::Scale => images.mapv_inplace(|v| v / 255.0),
            Normalize::Standardize => {
                images.mapv_inplace(|v| (v / 255.0 - MNIST_MEAN) / MNIST_STD)
            }
        }
    }
}

/// Which split of the dataset to load
#[derive(Debug, Clone, Copy)]
pub enum Split {
    /// 60,000 examples
    Train,
    /// 10,000 examples
    Test,
}

impl Split {
    fn images_file(&self) -> &'static str {
        match self {
            Split::Train => TRAIN_IMAGES,
            Split::Test => TEST_IMAGES,
        }
    }

    fn labels_file(&self) -> &'static str {
        match self {
            Split::Train => TRAIN_LABELS,
            Split::Test => TEST_LABELS,
        }
    }
}

/// One split of MNIST, flattened and normalized
pub struct Mnist {
    /// (n, 784)
    pub images: Array2<f32>,
    /// class indices in 0..=9, one per image
    pub labels: Vec<u8>,
}

/// Default on-disk cache location for the IDX files
pub fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mnist-mlp")
}

/// Loads one split, downloading and caching the files on first use
pub fn load_mnist(
    data_dir: &Path,
    split: Split,
    normalize: Normalize,
) -> Result<Mnist, DatasetError> {
    let images_path = ensure_file(data_dir, split.images_file())?;
    let labels_path = ensure_file(data_dir, split.labels_file())?;

    let mut images = read_idx_images(BufReader::new(File::open(images_path)?))?;
    let labels = read_idx_labels(BufReader::new(File::open(labels_path)?))?;
    if images.nrows() != labels.len() {
        return Err(DatasetError::CountMismatch {
            images: images.nrows(),
            labels: labels.len(),
        });
    }

    normalize.apply(&mut images);
    Ok(Mnist { images, labels })
}

/// Returns the cached path for `name`, downloading and gunzipping it if absent
fn ensure_file(data_dir: &Path, name: &str) -> Result<PathBuf, DatasetError> {
    let path = data_dir.join(name);
    if path.exists() {
        return Ok(path);
    }
    fs::create_dir_all(data_dir)?;

    let url = format!("{URL}{name}.gz");
    log::info!("Downloading '{}'", url);
    let response = ureq::get(&url).call().map_err(|e| DatasetError::Download {
        url: url.clone(),
        source: Box::new(e),
    })?;
    let mut bytes = Vec::new();
    response.into_reader().read_to_end(&mut bytes)?;

    // store uncompressed so later runs skip the decode
    let mut gz = GzDecoder::new(&bytes[..]);
    let mut output = File::create(&path)?;
    std::io::copy(&mut gz, &mut output)?;
    log::info!("Cached '{}'", path.display());
    Ok(path)
}

/// Parses an IDX image file into raw pixel values in [0, 255], one row per image
///
/// Layout: u32 magic (2051), u32 count, u32 rows, u32 cols, then count*rows*cols
/// unsigned bytes, all big-endian.
fn read_idx_images<R: Read>(mut reader: R) -> Result<Array2<f32>, DatasetError> {
    let mut header = [0u8; 16];
    reader.read_exact(&mut header)?;

    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if magic != IMAGES_MAGIC {
        return Err(DatasetError::BadMagic {
            expected: IMAGES_MAGIC,
            got: magic,
        });
    }
    let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let rows = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let cols = u32::from_be_bytes([header[12], header[13], header[14], header[15]]) as usize;
    if rows != IMAGE_SIDE || cols != IMAGE_SIDE {
        return Err(DatasetError::BadImageSize { rows, cols });
    }

    let mut pixels = vec![0u8; count * IMAGE_PIXELS];
    reader.read_exact(&mut pixels)?;
    let data = pixels.into_iter().map(f32::from).collect::<Vec<_>>();
    Ok(Array2::from_shape_vec((count, IMAGE_PIXELS), data)?)
}

/// Parses an IDX label file, validating every label is a digit class
///
/// Layout: u32 magic (2049), u32 count, then count unsigned bytes.
fn read_idx_labels<R: Read>(mut reader: R) -> Result<Vec<u8>, DatasetError> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;

    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if magic != LABELS_MAGIC {
        return Err(DatasetError::BadMagic {
            expected: LABELS_MAGIC,
            got: magic,
        });
    }
    let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let mut labels = vec![0u8; count];
    reader.read_exact(&mut labels)?;
    for (index, &label) in labels.iter().enumerate() {
        if label as usize >= N_CLASSES {
            return Err(DatasetError::LabelOutOfRange { index, label });
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;

    fn idx_image_bytes(magic: u32, count: u32, rows: u32, cols: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&magic.to_be_bytes());
        bytes.extend_from_slice(&count.to_be_bytes());
        bytes.extend_from_slice(&rows.to_be_bytes());
        bytes.extend_from_slice(&cols.to_be_bytes());
        let n_pixels = (count * rows * cols) as usize;
        bytes.extend((0..n_pixels).map(|i| (i % 256) as u8));
        bytes
    }

    fn idx_label_bytes(magic: u32, labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&magic.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn test_read_images() {
        let bytes = idx_image_bytes(IMAGES_MAGIC, 2, 28, 28);
        let images = read_idx_images(&bytes[..]).unwrap();
        assert_eq!(images.dim(), (2, IMAGE_PIXELS));
        assert_eq!(images[[0, 0]], 0.0);
        assert_eq!(images[[0, 255]], 255.0);
        // pixel values wrap at 256 and stay raw until normalization
        assert_eq!(images[[0, 256]], 0.0);
    }

    #[test]
    fn test_bad_image_magic() {
        let bytes = idx_image_bytes(LABELS_MAGIC, 1, 28, 28);
        let err = read_idx_images(&bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::BadMagic {
                expected: IMAGES_MAGIC,
                got: LABELS_MAGIC
            }
        ));
    }

    #[test]
    fn test_bad_image_size() {
        let bytes = idx_image_bytes(IMAGES_MAGIC, 1, 27, 28);
        let err = read_idx_images(&bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::BadImageSize { rows: 27, cols: 28 }
        ));
    }

    #[test]
    fn test_read_labels() {
        let bytes = idx_label_bytes(LABELS_MAGIC, &[3, 0, 9]);
        let labels = read_idx_labels(&bytes[..]).unwrap();
        assert_eq!(labels, vec![3, 0, 9]);
    }

    #[test]
    fn test_label_out_of_range() {
        let bytes = idx_label_bytes(LABELS_MAGIC, &[3, 10]);
        let err = read_idx_labels(&bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::LabelOutOfRange {
                index: 1,
                label: 10
            }
        ));
    }

    #[test]
    fn test_normalize_scale() {
        let mut images = ndarray::array![[0.0, 51.0, 255.0]];
        Normalize::Scale.apply(&mut images);
        assert_eq_float!(images[[0, 0]], 0.0);
        assert_eq_float!(images[[0, 1]], 0.2);
        assert_eq_float!(images[[0, 2]], 1.0);
    }

    #[test]
    fn test_normalize_standardize() {
        let mut images = ndarray::array![[0.0, 51.0]];
        Normalize::Standardize.apply(&mut images);
        assert_eq_float!(images[[0, 0]], -MNIST_MEAN / MNIST_STD);
        assert_eq_float!(images[[0, 1]], (0.2 - MNIST_MEAN) / MNIST_STD);
    }
}
