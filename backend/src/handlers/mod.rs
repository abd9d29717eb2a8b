//! HTTP handlers
//!
//! Handlers decode the request, build the service from the shared state and
//! call it with the authenticated actor.

mod gate_entry;
mod grn;
mod health;
mod notification;
mod quality_sample;

pub use gate_entry::*;
pub use grn::*;
pub use health::*;
pub use notification::*;
pub use quality_sample::*;
pub use quality_test::*;
