//! A small fully-connected MNIST classifier trained twice, once per input
//! normalization convention, to compare the two pipelines side by side.

pub mod dataloader;
pub mod datasets;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod train;
pub mod viz;
