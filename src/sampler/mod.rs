//! Order-constrained Gibbs sampling and moment accumulation

pub mod gibbs;
pub mod moments;

pub use gibbs::{GibbsConfig, GibbsOrderSampler};
pub use moments::MomentAccumulator;
