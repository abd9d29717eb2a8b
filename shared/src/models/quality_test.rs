//! Quality test models
//!
//! A quality test moves through QC execution and review, QA officer
//! recommendation, QA manager decision and warehouse acknowledgment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Quality test status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Submitted for Review")]
    SubmittedForReview,
    Approved,
    Rejected,
    #[serde(rename = "Returned for Correction")]
    ReturnedForCorrection,
    #[serde(rename = "Submitted to QA Manager")]
    SubmittedToQaManager,
    #[serde(rename = "QA Officer Review")]
    QaOfficerReview,
    #[serde(rename = "QA Recommendation Submitted")]
    QaRecommendationSubmitted,
    #[serde(rename = "Accepted - Warehouse")]
    AcceptedWarehouse,
    #[serde(rename = "Rejected - Return to Supplier")]
    RejectedReturnToSupplier,
}

impl TestStatus {
    pub const ALL: [TestStatus; 12] = [
        TestStatus::NotStarted,
        TestStatus::Pending,
        TestStatus::InProgress,
        TestStatus::SubmittedForReview,
        TestStatus::Approved,
        TestStatus::Rejected,
        TestStatus::ReturnedForCorrection,
        TestStatus::SubmittedToQaManager,
        TestStatus::QaOfficerReview,
        TestStatus::QaRecommendationSubmitted,
        TestStatus::AcceptedWarehouse,
        TestStatus::RejectedReturnToSupplier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::NotStarted => "Not Started",
            TestStatus::Pending => "Pending",
            TestStatus::InProgress => "In Progress",
            TestStatus::SubmittedForReview => "Submitted for Review",
            TestStatus::Approved => "Approved",
            TestStatus::Rejected => "Rejected",
            TestStatus::ReturnedForCorrection => "Returned for Correction",
            TestStatus::SubmittedToQaManager => "Submitted to QA Manager",
            TestStatus::QaOfficerReview => "QA Officer Review",
            TestStatus::QaRecommendationSubmitted => "QA Recommendation Submitted",
            TestStatus::AcceptedWarehouse => "Accepted - Warehouse",
            TestStatus::RejectedReturnToSupplier => "Rejected - Return to Supplier",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        TestStatus::ALL.iter().copied().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// QC manager review actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewAction {
    Approve,
    Reject,
    Return,
    #[serde(rename = "SendToQA")]
    SendToQa,
}

impl ReviewAction {
    pub fn resulting_status(&self) -> TestStatus {
        match self {
            ReviewAction::Approve => TestStatus::Approved,
            ReviewAction::Reject => TestStatus::Rejected,
            ReviewAction::Return => TestStatus::ReturnedForCorrection,
            ReviewAction::SendToQa => TestStatus::SubmittedToQaManager,
        }
    }
}

/// QA officer recommendation, also used for the QA manager's final decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Approve,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Approve => "Approve",
            Recommendation::Reject => "Reject",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Approve" => Some(Recommendation::Approve),
            "Reject" => Some(Recommendation::Reject),
            _ => None,
        }
    }

    /// Status a QA manager decision moves the test to
    pub fn decision_status(&self) -> TestStatus {
        match self {
            Recommendation::Approve => TestStatus::AcceptedWarehouse,
            Recommendation::Reject => TestStatus::RejectedReturnToSupplier,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Recommendation::Approve => Disposition::AcceptedWarehouse,
            Recommendation::Reject => Disposition::RejectedReturnToSupplier,
        }
    }
}

/// Final disposition of the received material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    #[serde(rename = "Accepted - Warehouse")]
    AcceptedWarehouse,
    #[serde(rename = "Rejected - Return to Supplier")]
    RejectedReturnToSupplier,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::AcceptedWarehouse => "Accepted - Warehouse",
            Disposition::RejectedReturnToSupplier => "Rejected - Return to Supplier",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Accepted - Warehouse" => Some(Disposition::AcceptedWarehouse),
            "Rejected - Return to Supplier" => Some(Disposition::RejectedReturnToSupplier),
            _ => None,
        }
    }
}

/// Warehouse acknowledgment of a disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseAction {
    Accepted,
    Rejected,
}

impl WarehouseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseAction::Accepted => "Accepted",
            WarehouseAction::Rejected => "Rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Accepted" => Some(WarehouseAction::Accepted),
            "Rejected" => Some(WarehouseAction::Rejected),
            _ => None,
        }
    }
}

/// Tests created with every new sample: (name, method)
pub const DEFAULT_TESTS: [(&str, &str); 3] = [
    ("Identification", "IR Spectroscopy"),
    ("Assay", "HPLC"),
    ("Loss on Drying", "Gravimetric"),
];

/// An analytical test belonging to a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTest {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub test_name: String,
    pub method: Option<String>,
    pub status: TestStatus,
    pub assigned_to: Option<String>,
    pub instrument_id: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub analyst_notes: Option<String>,
    pub submitted_by: Option<String>,
    pub submitted_on: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub reviewed_on: Option<DateTime<Utc>>,
    pub manager_notes: Option<String>,
    pub qa_officer_id: Option<String>,
    pub qa_assigned_by: Option<String>,
    pub qa_assignment_notes: Option<String>,
    pub qa_officer_notes: Option<String>,
    pub qa_officer_recommendation: Option<Recommendation>,
    pub qa_manager_decision: Option<Recommendation>,
    pub qa_manager_decision_notes: Option<String>,
    pub qa_decided_by: Option<String>,
    pub qa_decided_on: Option<DateTime<Utc>>,
    pub material_disposition: Option<Disposition>,
    pub warehouse_action: Option<WarehouseAction>,
    pub warehouse_notes: Option<String>,
    pub warehouse_acknowledged_by: Option<String>,
    pub warehouse_acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QualityTest {
    /// A fresh test in `Not Started`
    pub fn new(
        sample_id: Uuid,
        test_name: impl Into<String>,
        method: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sample_id,
            test_name: test_name.into(),
            method,
            status: TestStatus::NotStarted,
            assigned_to: None,
            instrument_id: None,
            result_data: None,
            analyst_notes: None,
            submitted_by: None,
            submitted_on: None,
            reviewed_by: None,
            reviewed_on: None,
            manager_notes: None,
            qa_officer_id: None,
            qa_assigned_by: None,
            qa_assignment_notes: None,
            qa_officer_notes: None,
            qa_officer_recommendation: None,
            qa_manager_decision: None,
            qa_manager_decision_notes: None,
            qa_decided_by: None,
            qa_decided_on: None,
            material_disposition: None,
            warehouse_action: None,
            warehouse_notes: None,
            warehouse_acknowledged_by: None,
            warehouse_acknowledged_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// The default battery of tests for a new sample
    pub fn default_battery(sample_id: Uuid, created_at: DateTime<Utc>) -> Vec<Self> {
        DEFAULT_TESTS
            .iter()
            .map(|(name, method)| Self::new(sample_id, *name, Some(method.to_string()), created_at))
            .collect()
    }
}

/// Change applied to a test by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum TestPatch {
    Assign {
        employee_id: String,
    },
    Start {
        /// Set when an analyst picks up an unassigned test on their sample
        claimed_by: Option<String>,
    },
    Reopen,
    Submit {
        result_data: serde_json::Value,
        analyst_notes: Option<String>,
        submitted_by: String,
    },
    Review {
        action: ReviewAction,
        reviewer_id: String,
        manager_notes: Option<String>,
    },
    AssignQaOfficer {
        officer_id: String,
        assigned_by: String,
        notes: Option<String>,
    },
    Recommend {
        recommendation: Recommendation,
        notes: Option<String>,
    },
    Decide {
        decision: Recommendation,
        notes: Option<String>,
        decided_by: String,
    },
    AcknowledgeWarehouse {
        action: WarehouseAction,
        notes: Option<String>,
        acknowledged_by: String,
    },
}

impl TestPatch {
    /// Status the test moves to, None when the patch leaves it unchanged
    pub fn next_status(&self) -> Option<TestStatus> {
        match self {
            TestPatch::Assign { .. } | TestPatch::Start { .. } | TestPatch::Reopen => {
                Some(TestStatus::InProgress)
            }
            TestPatch::Submit { .. } => Some(TestStatus::SubmittedForReview),
            TestPatch::Review { action, .. } => Some(action.resulting_status()),
            TestPatch::AssignQaOfficer { .. } => Some(TestStatus::QaOfficerReview),
            TestPatch::Recommend { .. } => Some(TestStatus::QaRecommendationSubmitted),
            TestPatch::Decide { decision, .. } => Some(decision.decision_status()),
            TestPatch::AcknowledgeWarehouse { .. } => None,
        }
    }

    pub fn apply(&self, test: &mut QualityTest, at: DateTime<Utc>) {
        match self {
            TestPatch::Assign { employee_id } => {
                test.assigned_to = Some(employee_id.clone());
                test.status = TestStatus::InProgress;
            }
            TestPatch::Start { claimed_by } => {
                if test.assigned_to.is_none() {
                    test.assigned_to = claimed_by.clone();
                }
                test.status = TestStatus::InProgress;
            }
            TestPatch::Reopen => {
                test.status = TestStatus::InProgress;
            }
            TestPatch::Submit {
                result_data,
                analyst_notes,
                submitted_by,
            } => {
                test.result_data = Some(result_data.clone());
                test.analyst_notes = analyst_notes.clone();
                test.submitted_by = Some(submitted_by.clone());
                test.submitted_on = Some(at);
                test.reviewed_by = None;
                test.reviewed_on = None;
                test.manager_notes = None;
                test.status = TestStatus::SubmittedForReview;
            }
            TestPatch::Review {
                action,
                reviewer_id,
                manager_notes,
            } => {
                test.reviewed_by = Some(reviewer_id.clone());
                test.reviewed_on = Some(at);
                test.manager_notes = manager_notes.clone();
                test.status = action.resulting_status();
            }
            TestPatch::AssignQaOfficer {
                officer_id,
                assigned_by,
                notes,
            } => {
                test.qa_officer_id = Some(officer_id.clone());
                test.qa_assigned_by = Some(assigned_by.clone());
                test.qa_assignment_notes = notes.clone();
                test.qa_officer_recommendation = None;
                test.qa_officer_notes = None;
                test.status = TestStatus::QaOfficerReview;
            }
            TestPatch::Recommend {
                recommendation,
                notes,
            } => {
                test.qa_officer_recommendation = Some(*recommendation);
                test.qa_officer_notes = notes.clone();
                test.status = TestStatus::QaRecommendationSubmitted;
            }
            TestPatch::Decide {
                decision,
                notes,
                decided_by,
            } => {
                test.qa_manager_decision = Some(*decision);
                test.qa_manager_decision_notes = notes.clone();
                test.qa_decided_by = Some(decided_by.clone());
                test.qa_decided_on = Some(at);
                test.material_disposition = Some(decision.disposition());
                test.status = decision.decision_status();
            }
            TestPatch::AcknowledgeWarehouse {
                action,
                notes,
                acknowledged_by,
            } => {
                // Status stays at the QA manager's disposition
                test.warehouse_action = Some(*action);
                test.warehouse_notes = notes.clone();
                test.warehouse_acknowledged_by = Some(acknowledged_by.clone());
                test.warehouse_acknowledged_at = Some(at);
            }
        }
        test.updated_at = at;
    }
}

/// Input for adding ad-hoc tests to a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateTestInput {
    #[validate(length(min = 1, max = 255, message = "Test name is required"))]
    pub test_name: String,
    pub method: Option<String>,
}

/// Input for assigning a test to an employee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignTestInput {
    pub employee_id: String,
}

/// Input for submitting a test result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResultInput {
    pub result_data: serde_json::Value,
    pub analyst_notes: Option<String>,
}

/// Input for the QC manager review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTestInput {
    pub action: ReviewAction,
    pub manager_notes: Option<String>,
}

/// Input for assigning a QA officer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignQaOfficerInput {
    pub officer_id: String,
    pub notes: Option<String>,
}

/// Input for the QA officer recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecommendationInput {
    pub recommendation: Recommendation,
    pub notes: Option<String>,
}

/// Input for the QA manager final decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaDecisionInput {
    pub decision: Recommendation,
    pub notes: Option<String>,
}

/// Input for the warehouse acknowledgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseActionInput {
    pub action: WarehouseAction,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip() {
        for status in TestStatus::ALL {
            assert_eq!(TestStatus::from_str(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn default_battery_has_three_not_started_tests() {
        let sample_id = Uuid::new_v4();
        let tests = QualityTest::default_battery(sample_id, Utc::now());
        assert_eq!(tests.len(), 3);
        assert!(tests.iter().all(|t| t.status == TestStatus::NotStarted));
        assert!(tests.iter().all(|t| t.sample_id == sample_id));
    }

    #[test]
    fn submit_clears_reviewer_fields() {
        let mut test = QualityTest::new(Uuid::new_v4(), "Assay", None, Utc::now());
        test.reviewed_by = Some("qc-man-1".to_string());
        test.manager_notes = Some("recalibrate".to_string());
        test.status = TestStatus::InProgress;

        TestPatch::Submit {
            result_data: serde_json::json!({ "purity": 99.2 }),
            analyst_notes: None,
            submitted_by: "qc-op-1".to_string(),
        }
        .apply(&mut test, Utc::now());

        assert_eq!(test.status, TestStatus::SubmittedForReview);
        assert!(test.reviewed_by.is_none());
        assert!(test.manager_notes.is_none());
        assert!(test.submitted_on.is_some());
    }

    #[test]
    fn decision_sets_disposition() {
        let mut test = QualityTest::new(Uuid::new_v4(), "Assay", None, Utc::now());
        let patch = TestPatch::Decide {
            decision: Recommendation::Reject,
            notes: None,
            decided_by: "qa-man-1".to_string(),
        };
        patch.apply(&mut test, Utc::now());
        assert_eq!(test.status, TestStatus::RejectedReturnToSupplier);
        assert_eq!(
            test.material_disposition,
            Some(Disposition::RejectedReturnToSupplier)
        );
    }

    #[test]
    fn start_claims_only_unassigned_tests() {
        let mut test = QualityTest::new(Uuid::new_v4(), "Assay", None, Utc::now());
        test.assigned_to = Some("qc-op-2".to_string());
        TestPatch::Start {
            claimed_by: Some("qc-op-1".to_string()),
        }
        .apply(&mut test, Utc::now());
        assert_eq!(test.assigned_to.as_deref(), Some("qc-op-2"));
    }
}
