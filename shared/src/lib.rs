//! Shared types and models for the material quality disposition workflow
//!
//! This crate holds the typed records, the closed status enumerations, the
//! transition table and the pure calculations (codes, GRN totals, payload
//! validation) used by the backend and its stores.

pub mod codes;
pub mod models;
pub mod types;
pub mod validation;
pub mod workflow;

pub use models::*;
pub use types::*;
pub use validation::*;
pub use workflow::*;
