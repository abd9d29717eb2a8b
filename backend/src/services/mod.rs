//! Business logic services for the material QMS backend
//!
//! Every service takes the store handle in its constructor. Write operations
//! check the caller's role, validate the payload, pre-check the row guard and
//! hand one [`ChangeSet`](crate::store::ChangeSet) to the store.

pub mod authorization;
pub mod gate_entry;
pub mod grn;
pub mod notification;
pub mod quality_sample;
pub mod quality_test;
pub mod worklist;

pub use gate_entry::GateEntryService;
pub use grn::GrnService;
pub use notification::NotificationService;
pub use quality_sample::QualitySampleService;
pub use quality_test::QualityTestService;
pub use worklist::WorklistService;

use shared::UserRecord;

use crate::error::{AppError, AppResult};
use crate::store::WorkflowStore;

/// Look up a user an operation refers to; they must exist and be active
pub(crate) async fn active_user(
    store: &dyn WorkflowStore,
    field: &str,
    id: &str,
) -> AppResult<UserRecord> {
    shared::validate_user_ref(field, id)?;

    let user = store
        .user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    if !user.is_active {
        return Err(AppError::validation(field, "must reference an active user"));
    }
    Ok(user)
}
