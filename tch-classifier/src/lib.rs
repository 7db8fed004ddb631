//! Multi-label image classifier modules for tch.

mod activation;
mod batch_norm;
mod block;
mod classifier;
mod common;
mod conv_bn_2d;
mod ml_decoder;

pub use activation::*;
pub use batch_norm::*;
pub use block::*;
pub use classifier::*;
pub use conv_bn_2d::*;
pub use ml_decoder::*;
