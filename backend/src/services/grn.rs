//! Goods receipt note service
//!
//! A GRN prices the delivered line items and moves its gate entry on to QA.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    validate_grn, Actor, CreateGrnInput, EntityKind, EntityRef, GateEntryStatus,
    GoodsReceiptNote, NewGrn, Operation, PendingGrnView, Role, ValidationError, View,
    GRN_REQUIRES_GATE_STATUS,
};
use uuid::Uuid;

use super::authorization;
use crate::error::{AppError, AppResult};
use crate::store::{Change, ChangeSet, Fanout, WorkflowStore};

/// GRN service
#[derive(Clone)]
pub struct GrnService {
    store: Arc<dyn WorkflowStore>,
}

impl GrnService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Receive a gate entry that is still awaiting its GRN
    pub async fn create_grn(&self, actor: &Actor, input: CreateGrnInput) -> AppResult<GoodsReceiptNote> {
        authorization::require(actor, Operation::CreateGrn)?;
        validate_grn(&input)?;

        let entry = self
            .store
            .gate_entry(input.gate_entry_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gate entry".to_string()))?;

        if entry.status != GRN_REQUIRES_GATE_STATUS {
            tracing::warn!(
                "GRN refused for gate entry {}: status is '{}'",
                entry.entry_code,
                entry.status.as_str()
            );
            return Err(AppError::Conflict(format!(
                "Gate entry {} is '{}'; a GRN can only be created while it is '{}'",
                entry.entry_code,
                entry.status.as_str(),
                GRN_REQUIRES_GATE_STATUS.as_str()
            )));
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let new_grn = NewGrn::priced(
            id,
            entry.entry_code.clone(),
            input,
            actor.id.clone(),
            actor.name.clone(),
            now,
        )
        .ok_or_else(|| ValidationError::new("items", "amounts exceed the supported range"))?;
        let notice = format!(
            "Gate entry {} ({}) received, gross total {}",
            entry.entry_code, entry.material_name, new_grn.totals.gross_total
        );

        let changes = ChangeSet::new(now)
            .push(Change::AdvanceGateEntry {
                id: entry.id,
                expected: GRN_REQUIRES_GATE_STATUS,
                next: GateEntryStatus::AwaitingQa,
            })
            .push(Change::InsertGrn(new_grn))
            .push(Change::Notify(
                Fanout::to_role(Role::QaManager, "New GRN awaiting QA", notice)
                    .about(EntityRef::new(EntityKind::Grn, id))
                    .sent_by(&actor.id),
            ));

        let applied = self.store.apply(changes).await?;
        tracing::info!(
            "GRN {} created for gate entry {}, gate entry now '{}'",
            applied.grn_code.as_deref().unwrap_or("-"),
            entry.entry_code,
            GateEntryStatus::AwaitingQa.as_str()
        );

        self.get_grn(actor, id).await
    }

    pub async fn get_grn(&self, actor: &Actor, id: Uuid) -> AppResult<GoodsReceiptNote> {
        authorization::require_view(actor, View::Grns)?;
        self.store
            .grn(id)
            .await?
            .ok_or_else(|| AppError::NotFound("GRN".to_string()))
    }

    pub async fn list_grns(&self, actor: &Actor) -> AppResult<Vec<GoodsReceiptNote>> {
        authorization::require_view(actor, View::Grns)?;
        self.store.grns().await
    }

    /// GRNs waiting for a QA sampling decision, oldest first
    pub async fn pending_grns(&self, actor: &Actor) -> AppResult<Vec<PendingGrnView>> {
        authorization::require_view(actor, View::PendingGrns)?;
        let pending = self.store.pending_grns().await?;
        tracing::debug!("{} GRNs pending QA", pending.len());
        Ok(pending)
    }
}
