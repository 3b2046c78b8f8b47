//! Comparison data and model parameter types
//!
//! Items are referenced by a stable integer index `0..n-1` everywhere inside
//! the estimators; mapping external item identities onto this index space is
//! the caller's job.

pub mod model;
pub mod ranking;
pub mod scored;
pub mod tally;

pub use model::LatentUtilityModel;
pub use ranking::{Ranking, RankingProfile};
pub use scored::ScoredItems;
pub use tally::PairwiseTally;
