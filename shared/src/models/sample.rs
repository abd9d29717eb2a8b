//! Quality sample models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quality sample status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Passed,
    Failed,
}

impl SampleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Pending => "Pending",
            SampleStatus::InProgress => "In Progress",
            SampleStatus::Passed => "Passed",
            SampleStatus::Failed => "Failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(SampleStatus::Pending),
            "In Progress" => Some(SampleStatus::InProgress),
            "Passed" => Some(SampleStatus::Passed),
            "Failed" => Some(SampleStatus::Failed),
            _ => None,
        }
    }
}

/// Work priority for samples and tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Normal => "Normal",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(Priority::Low),
            "Normal" => Some(Priority::Normal),
            "High" => Some(Priority::High),
            "Urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// A QC sampling unit raised from a GRN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    pub id: Uuid,
    /// Severed (None) if the GRN is ever removed
    pub grn_id: Option<Uuid>,
    pub entry_code: String,
    pub product_name: String,
    pub batch_number: String,
    pub sample_type: String,
    pub sample_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: SampleStatus,
    pub analyst_id: Option<String>,
    pub priority: Priority,
    pub requested_by: String,
    pub requested_by_name: String,
    pub qa_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Change applied to a sample by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum SamplePatch {
    /// First assignment wins
    Assign { analyst_id: String },
    /// Outcome of a QA manager decision on one of the sample's tests
    Conclude { outcome: SampleStatus },
}

impl SamplePatch {
    pub fn apply(&self, sample: &mut QualitySample, at: DateTime<Utc>) {
        match self {
            SamplePatch::Assign { analyst_id } => {
                sample.analyst_id = Some(analyst_id.clone());
                sample.status = SampleStatus::InProgress;
            }
            SamplePatch::Conclude { outcome } => {
                // A failed test fails the sample for good
                if !(sample.status == SampleStatus::Failed && *outcome == SampleStatus::Passed) {
                    sample.status = *outcome;
                }
            }
        }
        sample.updated_at = at;
    }
}

/// Input for raising a sampling request on a GRN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSamplingInput {
    pub qa_notes: Option<String>,
    pub priority: Option<Priority>,
}

/// Input for assigning a sample to an analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignSampleInput {
    pub analyst_id: String,
}
