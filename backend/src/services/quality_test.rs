//! Quality test service
//!
//! The test state machine from assignment through QC review, QA
//! recommendation and decision, to the warehouse acknowledgment. Every write
//! is a guarded update: the guard is checked here first so callers get a
//! precise message, and again by the store while writing so a lost race is
//! still a `Conflict`.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    validate_result_data, Actor, AssignQaOfficerInput, AssignTestInput, AssigneeGuard,
    EntityKind, EntityRef, NotificationKind, Operation, Priority, QaDecisionInput,
    QaRecommendationInput, QualityTest, Recommendation, ReviewTestInput, Role, SampleGuard,
    SamplePatch, SampleStatus, SubmitResultInput, TestGuard, TestPatch, WarehouseActionInput,
};
use uuid::Uuid;

use super::{active_user, authorization};
use crate::error::{AppError, AppResult};
use crate::store::{test_conflict, Change, ChangeSet, Fanout, WorkflowStore};

/// Quality test service
#[derive(Clone)]
pub struct QualityTestService {
    store: Arc<dyn WorkflowStore>,
}

impl QualityTestService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// QC manager hands a test to an employee
    pub async fn assign_test(
        &self,
        actor: &Actor,
        test_id: Uuid,
        input: AssignTestInput,
    ) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::AssignTest)?;
        shared::validate_user_ref("employee_id", &input.employee_id)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::AssignTest);
        precheck(&test, &guard, None)?;
        active_user(self.store.as_ref(), "employee_id", &input.employee_id).await?;

        let patch = TestPatch::Assign {
            employee_id: input.employee_id,
        };
        self.commit(actor, &test, guard, patch, Vec::new()).await
    }

    /// Analyst (or QC manager) picks up a test.
    ///
    /// An analyst may start a test assigned to them, or claim one nobody
    /// holds yet when its sample is assigned to them.
    pub async fn start_test(&self, actor: &Actor, test_id: Uuid) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::StartTest)?;

        let test = self.load(test_id).await?;
        let (assignee, claimed_by) = if actor.has_role(Role::QcManager) {
            (AssigneeGuard::Any, None)
        } else {
            (
                AssigneeGuard::SelfOrSampleAnalyst(actor.id.clone()),
                Some(actor.id.clone()),
            )
        };
        let guard = TestGuard::for_operation(Operation::StartTest).with_assignee(assignee);

        let sample_analyst = if guard.assignee.reads_sample_analyst() {
            self.store
                .sample(test.sample_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Quality sample".to_string()))?
                .analyst_id
        } else {
            None
        };
        precheck(&test, &guard, sample_analyst.as_deref())?;

        self.commit(actor, &test, guard, TestPatch::Start { claimed_by }, Vec::new())
            .await
    }

    /// Put a test returned for correction back in progress so it can be
    /// resubmitted. Reviewer fields stay until the next submission.
    pub async fn reopen_test(&self, actor: &Actor, test_id: Uuid) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::ReopenTest)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::ReopenTest).with_assignee(own_work(actor));
        precheck(&test, &guard, None)?;

        self.commit(actor, &test, guard, TestPatch::Reopen, Vec::new()).await
    }

    /// Store a result and send it to the QC manager for review
    pub async fn submit_result(
        &self,
        actor: &Actor,
        test_id: Uuid,
        input: SubmitResultInput,
    ) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::SubmitResult)?;
        validate_result_data(&input.result_data)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::SubmitResult).with_assignee(own_work(actor));
        precheck(&test, &guard, None)?;

        let notify = Fanout::to_role(
            Role::QcManager,
            "Test result submitted for review",
            format!("{} submitted results for {}", actor.name, test.test_name),
        )
        .about(EntityRef::new(EntityKind::QualityTest, test.id))
        .sent_by(&actor.id);

        let patch = TestPatch::Submit {
            result_data: input.result_data,
            analyst_notes: input.analyst_notes,
            submitted_by: actor.id.clone(),
        };
        self.commit(actor, &test, guard, patch, vec![Change::Notify(notify)])
            .await
    }

    /// QC manager verdict on a submitted result
    pub async fn review_test(
        &self,
        actor: &Actor,
        test_id: Uuid,
        input: ReviewTestInput,
    ) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::ReviewTest)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::ReviewTest);
        precheck(&test, &guard, None)?;

        let patch = TestPatch::Review {
            action: input.action,
            reviewer_id: actor.id.clone(),
            manager_notes: input.manager_notes,
        };
        self.commit(actor, &test, guard, patch, Vec::new()).await
    }

    /// QA manager picks the QA officer who will recommend a disposition
    pub async fn assign_qa_officer(
        &self,
        actor: &Actor,
        test_id: Uuid,
        input: AssignQaOfficerInput,
    ) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::AssignQaOfficer)?;
        shared::validate_user_ref("officer_id", &input.officer_id)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::AssignQaOfficer);
        precheck(&test, &guard, None)?;

        let officer = active_user(self.store.as_ref(), "officer_id", &input.officer_id).await?;
        if officer.role != Role::QaOperator {
            return Err(AppError::validation(
                "officer_id",
                format!("{} is not a {}", officer.name, Role::QaOperator),
            ));
        }

        let patch = TestPatch::AssignQaOfficer {
            officer_id: officer.id,
            assigned_by: actor.id.clone(),
            notes: input.notes,
        };
        self.commit(actor, &test, guard, patch, Vec::new()).await
    }

    /// The assigned QA officer recommends approval or rejection
    pub async fn recommend(
        &self,
        actor: &Actor,
        test_id: Uuid,
        input: QaRecommendationInput,
    ) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::RecommendDisposition)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::RecommendDisposition).with_qa_officer(&actor.id);
        precheck(&test, &guard, None)?;

        let notify = Fanout::to_role(
            Role::QaManager,
            "QA recommendation submitted",
            format!(
                "{} recommends '{}' for {}",
                actor.name,
                input.recommendation.as_str(),
                test.test_name
            ),
        )
        .about(EntityRef::new(EntityKind::QualityTest, test.id))
        .sent_by(&actor.id);

        let patch = TestPatch::Recommend {
            recommendation: input.recommendation,
            notes: input.notes,
        };
        self.commit(actor, &test, guard, patch, vec![Change::Notify(notify)])
            .await
    }

    /// QA manager's final decision.
    ///
    /// Sets the disposition, concludes the sample and hands the material to
    /// the warehouse with a notification and a task per warehouse manager.
    pub async fn decide(
        &self,
        actor: &Actor,
        test_id: Uuid,
        input: QaDecisionInput,
    ) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::DecideDisposition)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::DecideDisposition);
        precheck(&test, &guard, None)?;

        let disposition = input.decision.disposition();
        let (outcome, kind, priority) = match input.decision {
            Recommendation::Approve => (SampleStatus::Passed, NotificationKind::Success, Priority::Normal),
            Recommendation::Reject => (SampleStatus::Failed, NotificationKind::Warning, Priority::High),
        };
        let about = EntityRef::new(EntityKind::QualityTest, test.id);
        let message = format!("{}: {}", test.test_name, disposition.as_str());

        let extra = vec![
            Change::UpdateSample {
                id: test.sample_id,
                guard: SampleGuard::default(),
                patch: SamplePatch::Conclude { outcome },
            },
            Change::Notify(
                Fanout::to_role(Role::WarehouseManager, "QA disposition recorded", message.clone())
                    .kind(kind)
                    .about(about)
                    .sent_by(&actor.id),
            ),
            Change::AssignTasks(
                Fanout::to_role(Role::WarehouseManager, "Act on QA disposition", message)
                    .priority(priority)
                    .about(about)
                    .sent_by(&actor.id),
            ),
        ];

        let patch = TestPatch::Decide {
            decision: input.decision,
            notes: input.notes,
            decided_by: actor.id.clone(),
        };
        self.commit(actor, &test, guard, patch, extra).await
    }

    /// Warehouse records what it did with the material, once
    pub async fn acknowledge_warehouse(
        &self,
        actor: &Actor,
        test_id: Uuid,
        input: WarehouseActionInput,
    ) -> AppResult<QualityTest> {
        authorization::require(actor, Operation::AcknowledgeWarehouse)?;

        let test = self.load(test_id).await?;
        let guard = TestGuard::for_operation(Operation::AcknowledgeWarehouse).without_warehouse_action();
        precheck(&test, &guard, None)?;

        let patch = TestPatch::AcknowledgeWarehouse {
            action: input.action,
            notes: input.notes,
            acknowledged_by: actor.id.clone(),
        };
        self.commit(actor, &test, guard, patch, Vec::new()).await
    }

    pub async fn get_test(&self, test_id: Uuid) -> AppResult<QualityTest> {
        self.load(test_id).await
    }

    async fn load(&self, test_id: Uuid) -> AppResult<QualityTest> {
        self.store
            .quality_test(test_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quality test".to_string()))
    }

    /// Apply the guarded test update plus its side effects in one change set
    async fn commit(
        &self,
        actor: &Actor,
        test: &QualityTest,
        guard: TestGuard,
        patch: TestPatch,
        side_effects: Vec<Change>,
    ) -> AppResult<QualityTest> {
        let next = patch.next_status();
        let mut changes = ChangeSet::new(Utc::now()).push(Change::UpdateTest {
            id: test.id,
            guard,
            patch,
        });
        changes.changes.extend(side_effects);

        let applied = self.store.apply(changes).await?;
        tracing::info!(
            "Quality test {} '{}' -> '{}' by {} ({} notified, {} tasks)",
            test.id,
            test.status,
            next.unwrap_or(test.status),
            actor.id,
            applied.notified,
            applied.tasks_created
        );

        self.load(test.id).await
    }
}

/// Analysts may only touch their own tests; QC managers any
fn own_work(actor: &Actor) -> AssigneeGuard {
    if actor.has_role(Role::QcManager) {
        AssigneeGuard::Any
    } else {
        AssigneeGuard::Exactly(actor.id.clone())
    }
}

fn precheck(test: &QualityTest, guard: &TestGuard, sample_analyst: Option<&str>) -> AppResult<()> {
    if guard.admits(test, sample_analyst) {
        Ok(())
    } else {
        let message = test_conflict(test, guard);
        tracing::warn!("Quality test {} rejected: {}", test.id, message);
        Err(AppError::Conflict(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_work_guard_by_role() {
        let manager = Actor::new("qc-man-1", "Robert Taylor", Role::QcManager);
        let analyst = Actor::new("qc-op-1", "Lisa Anderson", Role::QcOperator);
        assert_eq!(own_work(&manager), AssigneeGuard::Any);
        assert_eq!(own_work(&analyst), AssigneeGuard::Exactly("qc-op-1".to_string()));
    }

    #[test]
    fn test_precheck_reports_current_status() {
        let test = QualityTest::new(Uuid::new_v4(), "Assay", None, Utc::now());
        let err = precheck(&test, &TestGuard::for_operation(Operation::SubmitResult), None).unwrap_err();
        match err {
            AppError::Conflict(message) => assert!(message.contains("Not Started")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precheck_names_sample_owner_on_foreign_claim() {
        let test = QualityTest::new(Uuid::new_v4(), "Assay", None, Utc::now());
        let guard = TestGuard::for_operation(Operation::StartTest)
            .with_assignee(AssigneeGuard::SelfOrSampleAnalyst("qc-op-2".to_string()));
        let err = precheck(&test, &guard, Some("qc-op-1")).unwrap_err();
        match err {
            AppError::Conflict(message) => assert_eq!(message, "Sample is assigned to another analyst"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(precheck(&test, &guard, Some("qc-op-2")).is_ok());
    }
}
