//! Read-side projections joining workflow entities

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GrnStatus, QualitySample, QualityTest};

/// A GRN awaiting a QA sampling decision, with its gate entry details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingGrnView {
    pub grn_id: Uuid,
    pub grn_code: String,
    pub entry_code: String,
    pub po_number: String,
    pub delivery_challan: Option<String>,
    pub quantity_received: Decimal,
    pub remarks: Option<String>,
    pub status: GrnStatus,
    pub material_name: String,
    pub vehicle_number: String,
    pub driver_name: Option<String>,
    pub driver_contact: Option<String>,
    pub gate_quantity: Decimal,
    pub uom: Option<String>,
    pub gate_created_at: DateTime<Utc>,
}

/// A sample with the number of tests raised on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleView {
    #[serde(flatten)]
    pub sample: QualitySample,
    pub test_count: i64,
}

/// A user referenced from a projection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// A test with the context a reviewer needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReviewItem {
    #[serde(flatten)]
    pub test: QualityTest,
    pub sample: QualitySample,
    pub analyst: PersonRef,
    pub reviewer_name: Option<String>,
    pub qa_officer: PersonRef,
}

/// A test assigned to an analyst, with its sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedTest {
    #[serde(flatten)]
    pub test: QualityTest,
    pub sample: QualitySample,
}
