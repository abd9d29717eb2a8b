//! Authorization gate
//!
//! Maps (role, operation) to permit or deny using the explicit role sets in
//! [`shared::workflow`]. There is no role hierarchy and no administrative
//! bypass.

use shared::{Actor, Operation, View};

use crate::error::{AppError, AppResult};

/// Permit the actor to invoke `op` or fail with `Forbidden`
pub fn require(actor: &Actor, op: Operation) -> AppResult<()> {
    if op.allowed_roles().contains(&actor.role) {
        Ok(())
    } else {
        tracing::warn!(
            "Denied {} to user {} with role '{}'",
            op.label(),
            actor.id,
            actor.role
        );
        Err(AppError::Forbidden(format!(
            "Role '{}' may not {}",
            actor.role,
            op.label()
        )))
    }
}

/// Permit the actor to read `view` or fail with `Forbidden`
pub fn require_view(actor: &Actor, view: View) -> AppResult<()> {
    if view.allowed_roles().contains(&actor.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Role '{}' may not read this worklist",
            actor.role
        )))
    }
}
