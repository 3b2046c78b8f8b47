//! Monte-Carlo EM engine for the ordinal probit model

pub mod mcem;
pub mod schedule;

pub use mcem::{
    fit_ordinal, EStepMode, McemConfig, McemEngine, McemFit, McemIteration, VarianceMode,
};
pub use schedule::SampleSchedule;
