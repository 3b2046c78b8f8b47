//! Monte-Carlo EM estimation of latent utility parameters from rankings
//!
//! Each iteration alternates an E-step, which estimates the conditional
//! first (and optionally second) moments of the latent utilities given the
//! observed rankings under the current parameters, with an M-step that
//! commits the implied mean and variance updates and restores the
//! identifiability anchor. The E-step is either Monte-Carlo (one Gibbs
//! chain per ranking, merged map-then-reduce) or exact (quadrature over
//! deduplicated rankings).

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{LatentUtilityModel, Ranking, RankingProfile};
use crate::engine::schedule::SampleSchedule;
use crate::error::{DataError, EstResult, EstimationError};
use crate::quadrature::{order_constrained_moments, ranking_log_likelihood, MvnOptions};
use crate::sampler::{GibbsConfig, GibbsOrderSampler, MomentAccumulator};

/// Floor applied to estimated variances before the anchor is restored
const VARIANCE_FLOOR: f64 = 1e-6;

/// Whether item variances are estimated or held at the anchor value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceMode {
    /// Re-estimate variances from second moments each M-step
    Estimated,
    /// Hold every variance at 1; only means are estimated
    Fixed,
}

/// How conditional moments are computed in the E-step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EStepMode {
    /// Gibbs sampling, one chain per ranking
    MonteCarlo,
    /// Quadrature over deduplicated rankings. Only first moments are
    /// available on this path, so variances are held fixed regardless of
    /// [`VarianceMode`].
    Exact,
}

/// Configuration for [`McemEngine`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McemConfig {
    /// Hard iteration cap; reaching it is a normal outcome, not an error
    pub max_iter: usize,
    /// Absolute tolerance on the parameter-vector step
    pub abs_eps: f64,
    /// Relative tolerance, scaled by the previous parameter norm
    pub rel_eps: f64,
    /// Monte-Carlo samples kept per ranking, by iteration
    pub schedule: SampleSchedule,
    pub variance_mode: VarianceMode,
    pub estep: EStepMode,
    /// Warm-up fraction and kernel for the Gibbs chains; the sweep count
    /// is driven by the schedule
    pub gibbs: GibbsConfig,
    /// Quadrature options for the exact E-step and likelihood tracking
    pub quadrature: MvnOptions,
    /// Worker threads for the E-step; `None` uses the rayon default
    pub threads: Option<usize>,
    /// Base seed; `None` draws one from thread-local entropy
    pub seed: Option<u64>,
    /// Record the profile log-likelihood after each M-step. Costs one
    /// quadrature pass per unique ranking per iteration.
    pub track_log_likelihood: bool,
}

impl Default for McemConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            abs_eps: 1e-4,
            rel_eps: 1e-3,
            schedule: SampleSchedule::default(),
            variance_mode: VarianceMode::Estimated,
            estep: EStepMode::MonteCarlo,
            gibbs: GibbsConfig::default(),
            quadrature: MvnOptions::default(),
            threads: None,
            seed: None,
            track_log_likelihood: false,
        }
    }
}

impl McemConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_schedule(mut self, schedule: SampleSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_variance_mode(mut self, mode: VarianceMode) -> Self {
        self.variance_mode = mode;
        self
    }

    pub fn with_estep(mut self, estep: EStepMode) -> Self {
        self.estep = estep;
        self
    }

    fn validate(&self) -> Result<(), DataError> {
        if self.max_iter == 0 {
            return Err(DataError::invalid("max_iter", 0.0, "must be >= 1"));
        }
        if !(self.abs_eps >= 0.0) {
            return Err(DataError::invalid("abs_eps", self.abs_eps, "must be >= 0"));
        }
        if !(self.rel_eps >= 0.0) {
            return Err(DataError::invalid("rel_eps", self.rel_eps, "must be >= 0"));
        }
        if self.schedule.base == 0 {
            return Err(DataError::invalid("schedule.base", 0.0, "must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.gibbs.warmup_fraction) {
            return Err(DataError::invalid(
                "warmup_fraction",
                self.gibbs.warmup_fraction,
                "must be in [0, 1)",
            ));
        }
        Ok(())
    }
}

/// One completed EM iteration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McemIteration {
    /// One-based iteration number
    pub iteration: usize,
    /// Monte-Carlo samples requested per ranking this iteration
    pub sample_target: usize,
    /// Euclidean step between the previous and committed parameters
    pub delta: f64,
    /// Profile log-likelihood, when tracking is enabled
    pub log_likelihood: Option<f64>,
}

/// Result of an MCEM run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McemFit {
    pub model: LatentUtilityModel,
    /// Iterations actually performed
    pub iterations: usize,
    /// Whether the tolerance was met before `max_iter`
    pub converged: bool,
    /// Last parameter step
    pub last_delta: f64,
    pub history: Vec<McemIteration>,
}

/// EM driver over a ranking profile
pub struct McemEngine {
    config: McemConfig,
}

impl McemEngine {
    pub fn new(config: McemConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &McemConfig {
        &self.config
    }

    /// Fit from the standard starting point (zero means, unit variances
    /// under [`VarianceMode::Fixed`], randomized variances otherwise).
    pub fn fit(&self, profile: &RankingProfile) -> EstResult<McemFit> {
        self.config.validate()?;
        if profile.is_empty() {
            return Err(DataError::EmptyData.into());
        }

        let mut seeder = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let base_seed: u64 = seeder.gen();

        let n = profile.items();
        let variance = match self.effective_variance_mode() {
            VarianceMode::Fixed => vec![1.0; n],
            // Dispersed start: |N(0,1)| + 1 per item, anchored on commit
            VarianceMode::Estimated => (0..n)
                .map(|_| seeder.sample::<f64, _>(rand_distr::StandardNormal).abs() + 1.0)
                .collect(),
        };
        let start = LatentUtilityModel::new(vec![0.0; n], variance)?;
        self.fit_from(profile, start, base_seed)
    }

    /// Fit from an explicit starting model
    pub fn fit_with_start(
        &self,
        profile: &RankingProfile,
        start: LatentUtilityModel,
    ) -> EstResult<McemFit> {
        self.config.validate()?;
        if profile.is_empty() {
            return Err(DataError::EmptyData.into());
        }
        let base_seed = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed).gen(),
            None => StdRng::from_entropy().gen(),
        };
        self.fit_from(profile, start, base_seed)
    }

    fn fit_from(
        &self,
        profile: &RankingProfile,
        mut model: LatentUtilityModel,
        base_seed: u64,
    ) -> EstResult<McemFit> {
        let n = profile.items();
        if model.items() != n {
            return Err(DataError::DimensionMismatch {
                expected: n,
                actual: model.items(),
            }
            .into());
        }

        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .build()
            .map_err(|e| EstimationError::ThreadPool(e.to_string()))?;

        let unique = dedupe(profile);
        let mut history = Vec::new();
        let mut converged = false;
        let mut last_delta = f64::INFINITY;
        let mut iterations = 0;

        for iter in 0..self.config.max_iter {
            let target = self.config.schedule.target(iter);

            let acc = match self.config.estep {
                EStepMode::MonteCarlo => {
                    #[cfg(feature = "parallel")]
                    let acc =
                        pool.install(|| self.gibbs_estep_par(profile, &model, target, iter, base_seed))?;
                    #[cfg(not(feature = "parallel"))]
                    let acc = self.gibbs_estep_serial(profile, &model, target, iter, base_seed)?;
                    acc
                }
                EStepMode::Exact => {
                    #[cfg(feature = "parallel")]
                    let acc =
                        pool.install(|| self.exact_estep_par(&unique, &model, iter, base_seed))?;
                    #[cfg(not(feature = "parallel"))]
                    let acc = self.exact_estep_serial(&unique, &model, iter, base_seed)?;
                    acc
                }
            };

            let previous = model.clone();
            let new_mean: Vec<f64> = (0..n).map(|k| acc.mean(k)).collect();
            let new_variance = match self.effective_variance_mode() {
                VarianceMode::Fixed => vec![1.0; n],
                VarianceMode::Estimated => (0..n)
                    .map(|k| (acc.mean_sq(k) - acc.mean(k).powi(2)).max(VARIANCE_FLOOR))
                    .collect(),
            };
            model.assign(new_mean, new_variance)?;

            last_delta = model.parameter_distance(&previous);
            iterations = iter + 1;

            let log_likelihood = if self.config.track_log_likelihood {
                Some(self.profile_log_likelihood(&unique, &model)?)
            } else {
                None
            };

            history.push(McemIteration {
                iteration: iterations,
                sample_target: target,
                delta: last_delta,
                log_likelihood,
            });

            let tol = self
                .config
                .abs_eps
                .max(self.config.rel_eps * previous.parameter_norm());
            if last_delta < tol {
                converged = true;
                break;
            }
        }

        Ok(McemFit {
            model,
            iterations,
            converged,
            last_delta,
            history,
        })
    }

    /// The exact E-step path yields first moments only, so it always runs
    /// with fixed variances.
    fn effective_variance_mode(&self) -> VarianceMode {
        match self.config.estep {
            EStepMode::Exact => VarianceMode::Fixed,
            EStepMode::MonteCarlo => self.config.variance_mode,
        }
    }

    fn gibbs_config(&self, target: usize) -> GibbsConfig {
        // Pad the sweep count so the kept portion matches the schedule
        let keep = 1.0 - self.config.gibbs.warmup_fraction;
        GibbsConfig {
            sweeps: (target as f64 / keep).ceil() as usize,
            ..self.config.gibbs
        }
    }

    #[cfg(feature = "parallel")]
    fn gibbs_estep_par(
        &self,
        profile: &RankingProfile,
        model: &LatentUtilityModel,
        target: usize,
        iter: usize,
        base_seed: u64,
    ) -> EstResult<MomentAccumulator> {
        let gibbs = self.gibbs_config(target);
        let n = profile.items();
        profile
            .rankings()
            .par_iter()
            .enumerate()
            .map(|(idx, ranking)| self.gibbs_task(model, ranking, gibbs, base_seed, iter, idx))
            .try_reduce(
                || MomentAccumulator::new(n),
                |mut a, b| {
                    a.merge(&b);
                    Ok(a)
                },
            )
    }

    #[cfg(not(feature = "parallel"))]
    fn gibbs_estep_serial(
        &self,
        profile: &RankingProfile,
        model: &LatentUtilityModel,
        target: usize,
        iter: usize,
        base_seed: u64,
    ) -> EstResult<MomentAccumulator> {
        let gibbs = self.gibbs_config(target);
        let mut acc = MomentAccumulator::new(profile.items());
        for (idx, ranking) in profile.rankings().iter().enumerate() {
            acc.merge(&self.gibbs_task(model, ranking, gibbs, base_seed, iter, idx)?);
        }
        Ok(acc)
    }

    fn gibbs_task(
        &self,
        model: &LatentUtilityModel,
        ranking: &Ranking,
        gibbs: GibbsConfig,
        base_seed: u64,
        iter: usize,
        idx: usize,
    ) -> EstResult<MomentAccumulator> {
        let mut rng = StdRng::seed_from_u64(task_seed(base_seed, iter, idx));
        let sampler = GibbsOrderSampler::new(model.mean(), model.variance(), ranking, gibbs)?;
        sampler.run(&mut rng)
    }

    #[cfg(feature = "parallel")]
    fn exact_estep_par(
        &self,
        unique: &[(Ranking, u64)],
        model: &LatentUtilityModel,
        iter: usize,
        base_seed: u64,
    ) -> EstResult<MomentAccumulator> {
        let n = model.items();
        unique
            .par_iter()
            .enumerate()
            .map(|(idx, (ranking, count))| {
                self.exact_task(model, ranking, *count, base_seed, iter, idx)
            })
            .try_reduce(
                || MomentAccumulator::new(n),
                |mut a, b| {
                    a.merge(&b);
                    Ok(a)
                },
            )
    }

    #[cfg(not(feature = "parallel"))]
    fn exact_estep_serial(
        &self,
        unique: &[(Ranking, u64)],
        model: &LatentUtilityModel,
        iter: usize,
        base_seed: u64,
    ) -> EstResult<MomentAccumulator> {
        let mut acc = MomentAccumulator::new(model.items());
        for (idx, (ranking, count)) in unique.iter().enumerate() {
            acc.merge(&self.exact_task(model, ranking, *count, base_seed, iter, idx)?);
        }
        Ok(acc)
    }

    fn exact_task(
        &self,
        model: &LatentUtilityModel,
        ranking: &Ranking,
        count: u64,
        base_seed: u64,
        iter: usize,
        idx: usize,
    ) -> EstResult<MomentAccumulator> {
        let opts = MvnOptions {
            seed: Some(task_seed(base_seed, iter, idx)),
            ..self.config.quadrature.clone()
        };
        let moments = order_constrained_moments(model.mean(), model.variance(), ranking, &opts)?;
        let mut acc = MomentAccumulator::new(model.items());
        for (item, &value) in moments.values.iter().enumerate() {
            acc.record_weighted(item, value, count);
        }
        acc.complete_pass(count);
        Ok(acc)
    }

    fn profile_log_likelihood(
        &self,
        unique: &[(Ranking, u64)],
        model: &LatentUtilityModel,
    ) -> EstResult<f64> {
        let mut total = 0.0;
        for (ranking, count) in unique {
            let logp = ranking_log_likelihood(
                model.mean(),
                model.variance(),
                ranking,
                &self.config.quadrature,
            )?;
            total += *count as f64 * logp;
        }
        Ok(total)
    }
}

/// Fit the ordinal model with a one-call entry point
pub fn fit_ordinal(profile: &RankingProfile, config: McemConfig) -> EstResult<McemFit> {
    McemEngine::new(config).fit(profile)
}

/// Collapse a profile to unique rankings with multiplicities, in a stable
/// order so per-task seeds are reproducible
fn dedupe(profile: &RankingProfile) -> Vec<(Ranking, u64)> {
    let mut counts: HashMap<&Ranking, u64> = HashMap::new();
    for ranking in profile.iter() {
        *counts.entry(ranking).or_insert(0) += 1;
    }
    let mut unique: Vec<(Ranking, u64)> = counts
        .into_iter()
        .map(|(ranking, count)| (ranking.clone(), count))
        .collect();
    unique.sort_by(|(a, _), (b, _)| a.order().cmp(b.order()));
    unique
}

/// Decorrelate per-task streams from one base seed (splitmix-style mix)
fn task_seed(base: u64, iteration: usize, task: usize) -> u64 {
    let mut h = base ^ 0x9E37_79B9_7F4A_7C15;
    h = h
        .wrapping_add(iteration as u64)
        .wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 27;
    h = h
        .wrapping_add(task as u64)
        .wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^ (h >> 31)
}
