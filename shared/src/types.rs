//! Worklist query types used by the projection layer

use serde::{Deserialize, Serialize};

use crate::models::{QualitySample, QualityTest, SampleStatus, TestStatus};

/// Which reviewer's worklist is being asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReviewStage {
    #[default]
    #[serde(rename = "qc")]
    Qc,
    #[serde(rename = "qa-manager")]
    QaManager,
    #[serde(rename = "qa-officer")]
    QaOfficer,
}

/// Items still awaiting the reviewer, or already handled by them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewBucket {
    #[default]
    Pending,
    Reviewed,
}

impl ReviewStage {
    pub fn statuses(&self, bucket: ReviewBucket) -> &'static [TestStatus] {
        use TestStatus::*;
        match (self, bucket) {
            (ReviewStage::Qc, ReviewBucket::Pending) => &[SubmittedForReview],
            (ReviewStage::Qc, ReviewBucket::Reviewed) => {
                &[Approved, Rejected, ReturnedForCorrection, SubmittedToQaManager]
            }
            (ReviewStage::QaManager, ReviewBucket::Pending) => {
                &[SubmittedToQaManager, QaRecommendationSubmitted]
            }
            (ReviewStage::QaManager, ReviewBucket::Reviewed) => {
                &[QaOfficerReview, AcceptedWarehouse, RejectedReturnToSupplier]
            }
            (ReviewStage::QaOfficer, ReviewBucket::Pending) => &[QaOfficerReview],
            (ReviewStage::QaOfficer, ReviewBucket::Reviewed) => {
                &[QaRecommendationSubmitted, AcceptedWarehouse, RejectedReturnToSupplier]
            }
        }
    }
}

/// Filter over quality tests for review worklists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewFilter {
    pub statuses: &'static [TestStatus],
    /// Restrict to tests assigned to this QA officer
    pub qa_officer_id: Option<String>,
    /// Some(false): warehouse action not yet recorded; Some(true): recorded
    pub warehouse_recorded: Option<bool>,
}

impl ReviewFilter {
    pub fn for_stage(stage: ReviewStage, bucket: ReviewBucket, actor_id: &str) -> Self {
        let qa_officer_id = match stage {
            ReviewStage::QaOfficer => Some(actor_id.to_string()),
            _ => None,
        };
        Self {
            statuses: stage.statuses(bucket),
            qa_officer_id,
            warehouse_recorded: None,
        }
    }

    pub fn warehouse(bucket: ReviewBucket) -> Self {
        Self {
            statuses: &[
                TestStatus::AcceptedWarehouse,
                TestStatus::RejectedReturnToSupplier,
            ],
            qa_officer_id: None,
            warehouse_recorded: Some(bucket == ReviewBucket::Reviewed),
        }
    }

    pub fn admits(&self, test: &QualityTest) -> bool {
        self.statuses.contains(&test.status)
            && self
                .qa_officer_id
                .as_ref()
                .map_or(true, |id| test.qa_officer_id.as_ref() == Some(id))
            && self
                .warehouse_recorded
                .map_or(true, |recorded| test.warehouse_action.is_some() == recorded)
    }

    pub fn status_labels(&self) -> Vec<String> {
        self.statuses.iter().map(|s| s.as_str().to_string()).collect()
    }
}

/// Sample worklists for the QC manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFilter {
    /// analyst_id IS NULL AND status = Pending
    Unassigned,
    /// analyst_id IS NOT NULL AND status IN (Pending, In Progress)
    Assigned,
}

impl SampleFilter {
    pub fn statuses(&self) -> &'static [SampleStatus] {
        match self {
            SampleFilter::Unassigned => &[SampleStatus::Pending],
            SampleFilter::Assigned => &[SampleStatus::Pending, SampleStatus::InProgress],
        }
    }

    pub fn wants_analyst(&self) -> bool {
        matches!(self, SampleFilter::Assigned)
    }

    pub fn admits(&self, sample: &QualitySample) -> bool {
        self.statuses().contains(&sample.status) && sample.analyst_id.is_some() == self.wants_analyst()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn stage_parameter_parses() {
        let stage: ReviewStage = serde_json::from_str("\"qa-officer\"").unwrap();
        assert_eq!(stage, ReviewStage::QaOfficer);
        let bucket: ReviewBucket = serde_json::from_str("\"reviewed\"").unwrap();
        assert_eq!(bucket, ReviewBucket::Reviewed);
    }

    #[test]
    fn qa_officer_filter_restricts_to_actor() {
        let filter = ReviewFilter::for_stage(ReviewStage::QaOfficer, ReviewBucket::Pending, "qa-op-1");
        let mut test = QualityTest::new(Uuid::new_v4(), "Assay", None, Utc::now());
        test.status = TestStatus::QaOfficerReview;
        test.qa_officer_id = Some("qa-op-2".to_string());
        assert!(!filter.admits(&test));
        test.qa_officer_id = Some("qa-op-1".to_string());
        assert!(filter.admits(&test));
    }

    #[test]
    fn warehouse_filter_splits_on_recorded_action() {
        let mut test = QualityTest::new(Uuid::new_v4(), "Assay", None, Utc::now());
        test.status = TestStatus::AcceptedWarehouse;
        assert!(ReviewFilter::warehouse(ReviewBucket::Pending).admits(&test));
        test.warehouse_action = Some(crate::models::WarehouseAction::Accepted);
        assert!(!ReviewFilter::warehouse(ReviewBucket::Pending).admits(&test));
        assert!(ReviewFilter::warehouse(ReviewBucket::Reviewed).admits(&test));
    }
}
