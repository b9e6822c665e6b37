//! Contextual bandit models and action selection.
mod eval;
mod models;

pub use eval::BanditEvaluation;
pub use models::*;
