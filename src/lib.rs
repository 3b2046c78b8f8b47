//! # rankfit
//!
//! Parameter estimation for random-utility choice models in Rust.
//!
//! Observed preference data, either pairwise win counts or full rankings,
//! is explained by latent per-item utilities: each comparison reveals which
//! item drew the higher utility. The crate estimates those utilities by
//! maximum likelihood.
//!
//! ## Core Pieces
//!
//! - **Pairwise MLE**: Bradley-Terry (logit) and Thurstone-Mosteller
//!   (probit) fits from win tallies, with asymptotic standard errors
//! - **Ordinal MCEM**: a Monte-Carlo EM engine for full rankings under
//!   independent normal utilities, with a Gibbs sampler or exact
//!   quadrature E-step
//! - **Orthant service**: randomized-QMC probabilities and conditional
//!   expectations of multivariate normals over boxes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rankfit::prelude::*;
//!
//! let mut tally = PairwiseTally::new(3)?;
//! tally.record(0, 1, 12);
//! tally.record(1, 0, 4);
//! tally.record(1, 2, 9);
//! tally.record(2, 1, 7);
//!
//! let fit = fit_pairwise(&tally, &PairwiseConfig::default())?;
//! println!("utilities: {:?}", fit.utilities);
//! ```

pub mod data;
pub mod distributions;
pub mod engine;
pub mod error;
pub mod pairwise;
pub mod quadrature;
pub mod sampler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{LatentUtilityModel, PairwiseTally, Ranking, RankingProfile, ScoredItems};
    pub use crate::distributions::{NormalKernel, TruncatedNormal};
    pub use crate::engine::{
        fit_ordinal, EStepMode, McemConfig, McemEngine, McemFit, SampleSchedule, VarianceMode,
    };
    pub use crate::error::{DataError, EstResult, EstimationError};
    pub use crate::pairwise::{
        fit_pairwise, fit_plackett_luce, Link, PairwiseConfig, PairwiseFit, PlackettLuceConfig,
        PlackettLuceFit,
    };
    pub use crate::quadrature::{
        order_constrained_moments, orthant_cdf, orthant_expectation, ranking_log_likelihood,
        MvnExpectation, MvnOptions, MvnResult,
    };
    pub use crate::sampler::{GibbsConfig, GibbsOrderSampler, MomentAccumulator};
}
