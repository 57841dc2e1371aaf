//! Deal artifact store and sign-off workflow for property analysis.
//!
//! A deal carries four analysis workflows (CMA, Feasibility, Due Diligence
//! and Reno). Each produces a versioned artifact set with a DRAFT/APPROVED
//! status; see [`store::DealStore`] for the lifecycle and
//! [`pipelines::Pipelines`] for the workflows themselves.
pub mod artifacts;
pub mod config;
pub mod error;
pub mod lm;
pub mod pipelines;
pub mod staging;
pub mod store;
pub mod templates;
pub mod util;
