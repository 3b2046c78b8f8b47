//! Plackett-Luce strengths by minorize-maximize iteration
//!
//! Hunter's MM update for full rankings: each iteration sets an item's
//! strength to its selection count divided by the sum, over all stages in
//! which it was still available, of the reciprocal total strength of the
//! remaining choice set. The update is monotone in the likelihood and needs
//! no step-size control.

use serde::{Deserialize, Serialize};

use crate::data::{RankingProfile, ScoredItems};
use crate::error::{DataError, EstResult};

/// Strength assigned to items that are never selected before the final
/// stage; keeps their likelihood terms finite
const ZERO_WIN_FLOOR: f64 = 0.01;

/// Tuning for [`fit_plackett_luce`]
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PlackettLuceConfig {
    pub max_iter: usize,
    /// Max absolute strength change per iteration at convergence
    pub tol: f64,
}

impl Default for PlackettLuceConfig {
    fn default() -> Self {
        Self {
            max_iter: 10_000,
            tol: 1e-12,
        }
    }
}

/// Fitted Plackett-Luce strengths, normalized to sum to 1
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlackettLuceFit {
    /// Per-item strengths
    pub strengths: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub log_likelihood: f64,
}

impl PlackettLuceFit {
    /// Log-strengths as item scores (the natural utility scale)
    pub fn scores(&self) -> ScoredItems {
        ScoredItems::from_scores(self.strengths.iter().map(|s| s.ln()).collect())
    }
}

/// Fit Plackett-Luce strengths to a ranking profile by MM iteration.
pub fn fit_plackett_luce(
    profile: &RankingProfile,
    config: &PlackettLuceConfig,
) -> EstResult<PlackettLuceFit> {
    if profile.is_empty() {
        return Err(DataError::EmptyData.into());
    }
    if config.max_iter == 0 {
        return Err(DataError::invalid("max_iter", 0.0, "must be >= 1").into());
    }

    let n = profile.items();
    // Selection counts: one per non-final stage at which the item is chosen
    let mut selections = vec![0u64; n];
    for ranking in profile.iter() {
        for pos in 0..ranking.len() - 1 {
            selections[ranking.item_at(pos)] += 1;
        }
    }

    let mut strengths = vec![1.0 / n as f64; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;
        let mut denom = vec![0.0; n];
        for ranking in profile.iter() {
            let m = ranking.len();
            // Strength of the remaining set, shrinking stage by stage
            let mut remaining: f64 = (0..m).map(|p| strengths[ranking.item_at(p)]).sum();
            for stage in 0..m - 1 {
                let inv = 1.0 / remaining;
                for p in stage..m {
                    denom[ranking.item_at(p)] += inv;
                }
                remaining -= strengths[ranking.item_at(stage)];
            }
        }

        let mut updated: Vec<f64> = (0..n)
            .map(|i| {
                if selections[i] == 0 {
                    ZERO_WIN_FLOOR / n as f64
                } else {
                    selections[i] as f64 / denom[i]
                }
            })
            .collect();
        let total: f64 = updated.iter().sum();
        for s in &mut updated {
            *s /= total;
        }

        let delta = strengths
            .iter()
            .zip(updated.iter())
            .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
        strengths = updated;
        if delta < config.tol {
            converged = true;
            break;
        }
    }

    let log_likelihood = log_likelihood(profile, &strengths);
    Ok(PlackettLuceFit {
        strengths,
        iterations,
        converged,
        log_likelihood,
    })
}

/// Plackett-Luce log-likelihood of a profile under given strengths
pub fn log_likelihood(profile: &RankingProfile, strengths: &[f64]) -> f64 {
    let mut total = 0.0;
    for ranking in profile.iter() {
        let m = ranking.len();
        let mut remaining: f64 = (0..m).map(|p| strengths[ranking.item_at(p)]).sum();
        for stage in 0..m - 1 {
            let chosen = strengths[ranking.item_at(stage)];
            total += chosen.ln() - remaining.ln();
            remaining -= chosen;
        }
    }
    total
}
