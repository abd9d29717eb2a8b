//! Domain models for the material quality disposition workflow

mod gate_entry;
mod grn;
mod notification;
mod quality_test;
mod sample;
mod user;
mod views;

pub use gate_entry::*;
pub use grn::*;
pub use notification::*;
pub use quality_test::*;
pub use sample::*;
pub use user::*;
pub use views::*;
