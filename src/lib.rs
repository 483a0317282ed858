//! Composable optimization models for grid-connected energy assets.
//!
//! Asset models (batteries, EVs) declare decision variables on a shared
//! [`model::TimeBase`], emit their own linear constraints, and are folded into
//! fleet or portfolio problems that are solved through an
//! [`optimizer::ExternalSolver`].

pub mod config;
pub mod error;
pub mod interfaces;
pub mod model;
pub mod optimizer;
pub mod runtime;
pub mod telemetry;

pub use error::{ModelError, ModelResult};
