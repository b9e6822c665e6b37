//! Universal Flag Configuration.
mod assignment;
mod models;

pub use assignment::{Assignment, AssignmentValue};
pub use models::*;
