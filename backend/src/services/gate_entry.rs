//! Gate entry service
//!
//! Records material arrivals at the plant gate and hands them to the
//! warehouse.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    validate_gate_entry, Actor, CreateGateEntryInput, EntityKind, EntityRef, GateEntry,
    GateEntryStatus, NewGateEntry, Operation, Role, View,
};
use uuid::Uuid;

use super::authorization;
use crate::error::{AppError, AppResult};
use crate::store::{Change, ChangeSet, Fanout, WorkflowStore};

/// Gate entry service
#[derive(Clone)]
pub struct GateEntryService {
    store: Arc<dyn WorkflowStore>,
}

impl GateEntryService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Record an arrival; the warehouse managers are told a GRN is due
    pub async fn create_gate_entry(
        &self,
        actor: &Actor,
        input: CreateGateEntryInput,
    ) -> AppResult<GateEntry> {
        authorization::require(actor, Operation::CreateGateEntry)?;
        validate_gate_entry(&input)?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let notice = format!(
            "{} ({} {}) arrived on vehicle {}",
            input.material_name,
            input.quantity,
            input.uom.as_deref().unwrap_or("units"),
            input.vehicle_number
        );

        let changes = ChangeSet::new(now)
            .push(Change::InsertGateEntry(NewGateEntry {
                id,
                input,
                created_by: actor.id.clone(),
                created_by_name: actor.name.clone(),
                created_at: now,
            }))
            .push(Change::Notify(
                Fanout::to_role(Role::WarehouseManager, "New gate entry awaiting GRN", notice)
                    .about(EntityRef::new(EntityKind::GateEntry, id))
                    .sent_by(&actor.id),
            ));

        let applied = self.store.apply(changes).await?;
        tracing::info!(
            "Gate entry {} ({}) created by {}, {} warehouse managers notified",
            applied.entry_code.as_deref().unwrap_or("-"),
            id,
            actor.id,
            applied.notified
        );

        self.get_gate_entry(actor, id).await
    }

    pub async fn get_gate_entry(&self, actor: &Actor, id: Uuid) -> AppResult<GateEntry> {
        authorization::require_view(actor, View::GateEntries)?;
        self.store
            .gate_entry(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gate entry".to_string()))
    }

    /// Security log, newest first
    pub async fn list_gate_entries(
        &self,
        actor: &Actor,
        status: Option<GateEntryStatus>,
    ) -> AppResult<Vec<GateEntry>> {
        authorization::require_view(actor, View::GateEntries)?;
        tracing::debug!("Listing gate entries with status {:?}", status);
        self.store.gate_entries(status).await
    }
}
