//! Univariate normal kernels and the truncated normal
//!
//! The estimators evaluate the standard-normal density, CDF and quantile in
//! two flavors: a precise kernel backed by `statrs` error functions, and a
//! quick polynomial kernel for sampling hot paths where throughput beats
//! the last few digits.

pub mod normal;
pub mod truncated;

pub use normal::NormalKernel;
pub use truncated::TruncatedNormal;
