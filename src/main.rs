//! Trains a two-layer MNIST classifier once per preprocessing convention and
//! compares the resulting test accuracies.
//!
//! # Usage
//! Runnable via
//! ```sh
//! cargo run -- -h
//! cargo run
//! ```
//!
//! By default both pipelines (`scale` and `standardize`) run back to back with
//! the same seed and hyperparameters; the only difference between them is how
//! the loader normalizes pixels. Each run prints its test accuracy and saves a
//! montage of the learned first-layer weights.

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use mnist_mlp::{
    dataloader::DataLoader,
    datasets::{IMAGE_PIXELS, N_CLASSES, Normalize, Split, default_data_dir, load_mnist},
    nn::Mlp,
    optim::Sgd,
    train::{evaluate, train},
    viz::{draw_dot, plot_weight_grid},
};

#[derive(Parser)]
struct Args {
    /// Run a single pipeline; omit to run both for comparison
    #[clap(short, long)]
    normalize: Option<Normalize>,
    #[clap(short, long, default_value_t = 64)]
    batch_size: usize,
    #[clap(short, long, default_value_t = 2)]
    epochs: usize,
    #[clap(short, long, default_value_t = 0.001)]
    lr: f32,
    #[clap(short, long, default_value_t = 0.9)]
    momentum: f32,
    #[clap(long, default_value_t = 128)]
    hidden_units: usize,
    #[clap(short, long, default_value_t = 42)]
    seed: u64,
    #[clap(short, long, default_value_t = format!("output"))]
    output_dir: String,
    /// Where the IDX files are cached; defaults to the platform cache dir
    #[clap(long)]
    data_dir: Option<PathBuf>,
    #[clap(long, default_value_t = false)]
    graphviz: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)?;

    let pipelines = match args.normalize {
        Some(normalize) => vec![normalize],
        None => vec![Normalize::Scale, Normalize::Standardize],
    };

    for normalize in pipelines {
        let accuracy = run_pipeline(&args, normalize)?;
        println!("[{}] test accuracy: {:.2}%", normalize, accuracy);
    }
    Ok(())
}

/// Loads MNIST under the given convention, trains from scratch, evaluates,
/// and renders the artifacts for this pipeline
fn run_pipeline(args: &Args, normalize: Normalize) -> Result<f32, Box<dyn Error>> {
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    let train_set = load_mnist(&data_dir, Split::Train, normalize)?;
    let test_set = load_mnist(&data_dir, Split::Test, normalize)?;
    log::info!(
        "[{}] {} train / {} test examples",
        normalize,
        train_set.labels.len(),
        test_set.labels.len()
    );

    let train_loader = DataLoader::new(train_set.images, train_set.labels, args.batch_size)?;
    let test_loader = DataLoader::new(test_set.images, test_set.labels, args.batch_size)?;

    // same seed for both pipelines: identical init and shuffles, so the
    // normalization convention is the only variable
    let mut rng = Pcg64Mcg::seed_from_u64(args.seed);
    let mut model = Mlp::new(IMAGE_PIXELS, args.hidden_units, N_CLASSES, &mut rng);
    let mut optim = Sgd::new(args.lr, args.momentum);

    train(&mut model, &mut optim, &train_loader, args.epochs, &mut rng)?;
    let accuracy = evaluate(&model, &test_loader)?;

    plot_weight_grid(
        &model.w1,
        &format!("{}/weights_{}.png", args.output_dir, normalize),
    )?;
    if args.graphviz {
        draw_dot(&model, &format!("{}/graph_{}.dot", args.output_dir, normalize))?;
    }
    Ok(accuracy)
}
