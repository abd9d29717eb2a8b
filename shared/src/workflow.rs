//! The disposition workflow's transition table
//!
//! Every operation has an explicit set of roles allowed to invoke it and,
//! for quality tests, the set of statuses it may start from. Guards describe
//! the conditional update a store performs; the same guard is evaluated by
//! the services before writing and by the store while writing.

use serde::{Deserialize, Serialize};

use crate::models::{GateEntryStatus, GrnStatus, QualitySample, QualityTest, Role, TestStatus};
use crate::types::ReviewStage;

/// Write operations of the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateGateEntry,
    CreateGrn,
    RequestSampling,
    AssignSample,
    CreateTests,
    AssignTest,
    StartTest,
    ReopenTest,
    SubmitResult,
    ReviewTest,
    AssignQaOfficer,
    RecommendDisposition,
    DecideDisposition,
    AcknowledgeWarehouse,
}

impl Operation {
    pub const ALL: [Operation; 14] = [
        Operation::CreateGateEntry,
        Operation::CreateGrn,
        Operation::RequestSampling,
        Operation::AssignSample,
        Operation::CreateTests,
        Operation::AssignTest,
        Operation::StartTest,
        Operation::ReopenTest,
        Operation::SubmitResult,
        Operation::ReviewTest,
        Operation::AssignQaOfficer,
        Operation::RecommendDisposition,
        Operation::DecideDisposition,
        Operation::AcknowledgeWarehouse,
    ];

    /// Roles permitted to invoke the operation. No hierarchy is implied.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::CreateGateEntry => &[Role::SecurityOfficer],
            Operation::CreateGrn => &[Role::WarehouseManager],
            Operation::RequestSampling => &[Role::QaManager],
            Operation::AssignSample | Operation::CreateTests | Operation::AssignTest => {
                &[Role::QcManager]
            }
            Operation::StartTest | Operation::ReopenTest | Operation::SubmitResult => {
                &[Role::QcOperator, Role::QcManager]
            }
            Operation::ReviewTest => &[Role::QcManager],
            Operation::AssignQaOfficer => &[Role::QaManager],
            Operation::RecommendDisposition => &[Role::QaOperator],
            Operation::DecideDisposition => &[Role::QaManager],
            Operation::AcknowledgeWarehouse => &[Role::WarehouseManager],
        }
    }

    /// Test statuses the operation may be applied from
    pub fn test_preconditions(&self) -> &'static [TestStatus] {
        use TestStatus::*;
        match self {
            Operation::AssignTest => &[NotStarted, Pending, InProgress],
            Operation::StartTest => &[NotStarted, Pending],
            Operation::ReopenTest => &[ReturnedForCorrection],
            Operation::SubmitResult => &[InProgress],
            Operation::ReviewTest => &[SubmittedForReview],
            Operation::AssignQaOfficer => &[SubmittedToQaManager, QaRecommendationSubmitted],
            Operation::RecommendDisposition => &[QaOfficerReview],
            Operation::DecideDisposition => &[QaRecommendationSubmitted],
            Operation::AcknowledgeWarehouse => &[AcceptedWarehouse, RejectedReturnToSupplier],
            _ => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Operation::CreateGateEntry => "create gate entry",
            Operation::CreateGrn => "create GRN",
            Operation::RequestSampling => "request sampling",
            Operation::AssignSample => "assign sample",
            Operation::CreateTests => "create tests",
            Operation::AssignTest => "assign test",
            Operation::StartTest => "start test",
            Operation::ReopenTest => "reopen test",
            Operation::SubmitResult => "submit test result",
            Operation::ReviewTest => "review test",
            Operation::AssignQaOfficer => "assign QA officer",
            Operation::RecommendDisposition => "submit QA recommendation",
            Operation::DecideDisposition => "record QA decision",
            Operation::AcknowledgeWarehouse => "record warehouse action",
        }
    }
}

/// Gate entry status a GRN may be created against
pub const GRN_REQUIRES_GATE_STATUS: GateEntryStatus = GateEntryStatus::AwaitingGrn;

/// GRN status a sampling request may be raised from
pub const SAMPLING_REQUIRES_GRN_STATUS: GrnStatus = GrnStatus::AwaitingQa;

/// Read-side worklists and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    GateEntries,
    Grns,
    PendingGrns,
    Samples,
    SampleTests,
    Review(ReviewStage),
    MyTests,
    WarehouseDecisions,
}

impl View {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            View::GateEntries => &[
                Role::SecurityOfficer,
                Role::WarehouseManager,
                Role::QaManager,
                Role::QaHead,
                Role::PlantHead,
                Role::SystemAdmin,
            ],
            View::Grns => &[
                Role::WarehouseManager,
                Role::ProcurementOfficer,
                Role::QaManager,
                Role::QaHead,
                Role::PlantHead,
                Role::SystemAdmin,
            ],
            View::PendingGrns => &[Role::QaManager, Role::QaHead],
            View::Samples => &[Role::QcManager, Role::QcHead],
            View::SampleTests => &[Role::QcManager, Role::QcHead, Role::QcOperator],
            View::Review(ReviewStage::Qc) => &[Role::QcManager, Role::QcHead],
            View::Review(ReviewStage::QaManager) => &[Role::QaManager, Role::QaHead],
            View::Review(ReviewStage::QaOfficer) => &[Role::QaOperator],
            View::MyTests => &[Role::QcOperator, Role::QcManager],
            View::WarehouseDecisions => &[Role::WarehouseManager],
        }
    }
}

/// Who may hold the test for the write to succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeGuard {
    Any,
    /// assigned_to = id
    Exactly(String),
    /// assigned_to = id OR (assigned_to IS NULL AND sample.analyst_id = id)
    SelfOrSampleAnalyst(String),
}

impl AssigneeGuard {
    pub fn admits(&self, assigned_to: Option<&str>, sample_analyst: Option<&str>) -> bool {
        match self {
            AssigneeGuard::Any => true,
            AssigneeGuard::Exactly(id) => assigned_to == Some(id.as_str()),
            AssigneeGuard::SelfOrSampleAnalyst(id) => match assigned_to {
                Some(current) => current == id,
                None => sample_analyst == Some(id.as_str()),
            },
        }
    }

    /// Whether the owning sample's analyst takes part in the check
    pub fn reads_sample_analyst(&self) -> bool {
        matches!(self, AssigneeGuard::SelfOrSampleAnalyst(_))
    }
}

/// Conditional-update guard for a quality test row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestGuard {
    pub statuses: &'static [TestStatus],
    pub assignee: AssigneeGuard,
    pub qa_officer_id: Option<String>,
    pub warehouse_action_unset: bool,
}

impl TestGuard {
    /// Guard on the operation's precondition statuses only
    pub fn for_operation(op: Operation) -> Self {
        Self {
            statuses: op.test_preconditions(),
            assignee: AssigneeGuard::Any,
            qa_officer_id: None,
            warehouse_action_unset: false,
        }
    }

    pub fn with_assignee(mut self, assignee: AssigneeGuard) -> Self {
        self.assignee = assignee;
        self
    }

    pub fn with_qa_officer(mut self, officer_id: impl Into<String>) -> Self {
        self.qa_officer_id = Some(officer_id.into());
        self
    }

    pub fn without_warehouse_action(mut self) -> Self {
        self.warehouse_action_unset = true;
        self
    }

    /// `sample_analyst` is the analyst of the test's sample, only consulted
    /// when the assignee guard claims on the sample's behalf
    pub fn admits(&self, test: &QualityTest, sample_analyst: Option<&str>) -> bool {
        self.statuses.contains(&test.status)
            && self
                .assignee
                .admits(test.assigned_to.as_deref(), sample_analyst)
            && self
                .qa_officer_id
                .as_ref()
                .map_or(true, |id| test.qa_officer_id.as_ref() == Some(id))
            && (!self.warehouse_action_unset || test.warehouse_action.is_none())
    }

    pub fn status_labels(&self) -> Vec<String> {
        self.statuses.iter().map(|s| s.as_str().to_string()).collect()
    }
}

/// Conditional-update guard for a quality sample row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleGuard {
    pub analyst_unset: bool,
}

impl SampleGuard {
    pub fn unassigned() -> Self {
        Self { analyst_unset: true }
    }

    pub fn admits(&self, sample: &QualitySample) -> bool {
        !self.analyst_unset || sample.analyst_id.is_none()
    }
}
