pub mod problem;
pub mod solver;

pub use problem::*;
pub use solver::*;
