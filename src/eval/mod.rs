//! Evaluation engine. Pure functions of a configuration snapshot and a request: no hidden state,
//! no I/O.
mod eval_assignment;
mod eval_bandits;
mod eval_rules;
mod subject;

pub use eval_assignment::get_assignment;
pub use eval_bandits::{get_bandit_action, BanditResult};
