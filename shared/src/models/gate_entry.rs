//! Gate entry models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Gate entry status. Only ever advances forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateEntryStatus {
    #[serde(rename = "Awaiting GRN")]
    AwaitingGrn,
    #[serde(rename = "Awaiting QA")]
    AwaitingQa,
    #[serde(rename = "Sampling Requested")]
    SamplingRequested,
}

impl GateEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateEntryStatus::AwaitingGrn => "Awaiting GRN",
            GateEntryStatus::AwaitingQa => "Awaiting QA",
            GateEntryStatus::SamplingRequested => "Sampling Requested",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Awaiting GRN" => Some(GateEntryStatus::AwaitingGrn),
            "Awaiting QA" => Some(GateEntryStatus::AwaitingQa),
            "Sampling Requested" => Some(GateEntryStatus::SamplingRequested),
            _ => None,
        }
    }

    /// Position in the lifecycle
    pub fn rank(&self) -> u8 {
        match self {
            GateEntryStatus::AwaitingGrn => 0,
            GateEntryStatus::AwaitingQa => 1,
            GateEntryStatus::SamplingRequested => 2,
        }
    }

    pub fn can_advance_to(&self, next: GateEntryStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// A material/vehicle arrival recorded at the plant gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEntry {
    pub id: Uuid,
    pub entry_code: String,
    pub material_name: String,
    pub material_category: Option<String>,
    pub po_number: Option<String>,
    pub vehicle_name: Option<String>,
    pub vehicle_number: String,
    pub driver_name: Option<String>,
    pub driver_contact: Option<String>,
    pub supplier_name: Option<String>,
    pub document_number: Option<String>,
    pub quantity: Decimal,
    pub uom: Option<String>,
    pub remarks: Option<String>,
    pub seal_intact: bool,
    pub status: GateEntryStatus,
    pub created_by: String,
    pub created_by_name: String,
    pub plant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A gate entry before the store has assigned its entry code
#[derive(Debug, Clone, PartialEq)]
pub struct NewGateEntry {
    pub id: Uuid,
    pub input: CreateGateEntryInput,
    pub created_by: String,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
}

impl NewGateEntry {
    pub fn into_entry(self, entry_code: String) -> GateEntry {
        let input = self.input;
        GateEntry {
            id: self.id,
            entry_code,
            material_name: input.material_name,
            material_category: input.material_category,
            po_number: input.po_number,
            vehicle_name: input.vehicle_name,
            vehicle_number: input.vehicle_number,
            driver_name: input.driver_name,
            driver_contact: input.driver_contact,
            supplier_name: input.supplier_name,
            document_number: input.document_number,
            quantity: input.quantity,
            uom: input.uom,
            remarks: input.remarks,
            seal_intact: input.seal_intact,
            status: GateEntryStatus::AwaitingGrn,
            created_by: self.created_by,
            created_by_name: self.created_by_name,
            plant_id: input.plant_id,
            created_at: self.created_at,
        }
    }
}

fn default_seal_intact() -> bool {
    true
}

/// Input for recording a gate entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateGateEntryInput {
    #[validate(length(min = 1, max = 255, message = "Material name is required"))]
    pub material_name: String,
    pub material_category: Option<String>,
    pub po_number: Option<String>,
    pub vehicle_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Vehicle number is required"))]
    pub vehicle_number: String,
    pub driver_name: Option<String>,
    pub driver_contact: Option<String>,
    pub supplier_name: Option<String>,
    pub document_number: Option<String>,
    pub quantity: Decimal,
    pub uom: Option<String>,
    pub remarks: Option<String>,
    #[serde(default = "default_seal_intact")]
    pub seal_intact: bool,
    pub plant_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(GateEntryStatus::AwaitingGrn.can_advance_to(GateEntryStatus::AwaitingQa));
        assert!(GateEntryStatus::AwaitingQa.can_advance_to(GateEntryStatus::SamplingRequested));
        assert!(!GateEntryStatus::SamplingRequested.can_advance_to(GateEntryStatus::AwaitingQa));
        assert!(!GateEntryStatus::AwaitingQa.can_advance_to(GateEntryStatus::AwaitingQa));
    }

    #[test]
    fn status_labels_parse() {
        for status in [
            GateEntryStatus::AwaitingGrn,
            GateEntryStatus::AwaitingQa,
            GateEntryStatus::SamplingRequested,
        ] {
            assert_eq!(GateEntryStatus::from_str(status.as_str()), Some(status));
        }
    }
}
