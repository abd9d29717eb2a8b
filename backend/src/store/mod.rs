//! Entity store contract
//!
//! Services never mutate state directly. A transition is expressed as a
//! [`ChangeSet`]: an ordered list of inserts, guarded updates and fan-outs the
//! store applies all-or-nothing. A guarded update whose row no longer matches
//! its guard aborts the whole set with `Conflict`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    AssignedTest, EntityRef, GateEntry, GateEntryStatus, GoodsReceiptNote, GrnStatus,
    NewGateEntry, NewGrn, Notification, NotificationKind, PendingGrnView, PersonRef, Priority,
    QualitySample, QualityTest, ReviewFilter, Role, SampleFilter, SampleGuard, SamplePatch,
    SampleView, Task, TestGuard, TestPatch, TestReviewItem, UserRecord,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod memory;
pub mod postgres;

pub use memory::MemoryWorkflowStore;
pub use postgres::PgWorkflowStore;

/// A message delivered to every active user holding `role`
#[derive(Debug, Clone, PartialEq)]
pub struct Fanout {
    pub role: Role,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub entity: Option<EntityRef>,
    /// Actor on whose behalf the fan-out happens
    pub sent_by: String,
}

impl Fanout {
    pub fn to_role(role: Role, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            role,
            title: title.into(),
            message: message.into(),
            kind: NotificationKind::Info,
            priority: Priority::Normal,
            entity: None,
            sent_by: String::new(),
        }
    }

    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn about(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn sent_by(mut self, actor_id: impl Into<String>) -> Self {
        self.sent_by = actor_id.into();
        self
    }
}

/// One step of a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Entry code is generated by the store inside the transaction
    InsertGateEntry(NewGateEntry),
    /// GRN code is generated by the store inside the transaction
    InsertGrn(NewGrn),
    InsertSample(QualitySample),
    InsertTests(Vec<QualityTest>),
    AdvanceGateEntry {
        id: Uuid,
        expected: GateEntryStatus,
        next: GateEntryStatus,
    },
    AdvanceGrn {
        id: Uuid,
        expected: GrnStatus,
        next: GrnStatus,
        qa_notes: Option<String>,
    },
    UpdateSample {
        id: Uuid,
        guard: SampleGuard,
        patch: SamplePatch,
    },
    UpdateTest {
        id: Uuid,
        guard: TestGuard,
        patch: TestPatch,
    },
    Notify(Fanout),
    AssignTasks(Fanout),
}

/// Ordered changes applied in one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub at: DateTime<Utc>,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            changes: Vec::new(),
        }
    }

    pub fn push(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }
}

/// What a committed change set produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub entry_code: Option<String>,
    pub grn_code: Option<String>,
    /// Notifications inserted across all fan-outs
    pub notified: usize,
    pub tasks_created: usize,
}

/// Persistence for the workflow entities and their projections
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Apply every change or none of them
    async fn apply(&self, changes: ChangeSet) -> AppResult<Applied>;

    async fn user(&self, id: &str) -> AppResult<Option<UserRecord>>;

    async fn gate_entry(&self, id: Uuid) -> AppResult<Option<GateEntry>>;

    /// Newest first, optionally restricted to one status
    async fn gate_entries(&self, status: Option<GateEntryStatus>) -> AppResult<Vec<GateEntry>>;

    async fn grn(&self, id: Uuid) -> AppResult<Option<GoodsReceiptNote>>;

    /// Newest first
    async fn grns(&self) -> AppResult<Vec<GoodsReceiptNote>>;

    /// GRNs awaiting QA joined with their gate entries, oldest first
    async fn pending_grns(&self) -> AppResult<Vec<PendingGrnView>>;

    async fn sample(&self, id: Uuid) -> AppResult<Option<QualitySample>>;

    async fn samples(&self, filter: SampleFilter) -> AppResult<Vec<SampleView>>;

    /// In creation order
    async fn sample_tests(&self, sample_id: Uuid) -> AppResult<Vec<QualityTest>>;

    async fn quality_test(&self, id: Uuid) -> AppResult<Option<QualityTest>>;

    /// Most recently updated first
    async fn review_items(&self, filter: &ReviewFilter) -> AppResult<Vec<TestReviewItem>>;

    async fn assigned_tests(&self, user_id: &str) -> AppResult<Vec<AssignedTest>>;

    /// Newest first
    async fn notifications_for(&self, user_id: &str) -> AppResult<Vec<Notification>>;

    async fn mark_notification_read(&self, user_id: &str, id: Uuid, at: DateTime<Utc>)
        -> AppResult<()>;

    /// Newest first
    async fn tasks_for(&self, user_id: &str) -> AppResult<Vec<Task>>;

    /// Reachability check for health reporting
    async fn ping(&self) -> AppResult<()>;
}

fn person(id: &Option<String>, names: &HashMap<String, String>) -> PersonRef {
    PersonRef {
        id: id.clone(),
        name: id.as_ref().and_then(|id| names.get(id).cloned()),
    }
}

/// Join tests with their samples and the display names of the people on them.
/// Tests whose sample is missing are skipped.
pub(crate) fn assemble_review_items(
    tests: Vec<QualityTest>,
    samples: &HashMap<Uuid, QualitySample>,
    names: &HashMap<String, String>,
) -> Vec<TestReviewItem> {
    tests
        .into_iter()
        .filter_map(|test| {
            let sample = samples.get(&test.sample_id)?.clone();
            let analyst = person(&test.assigned_to, names);
            let reviewer_name = test.reviewed_by.as_ref().and_then(|id| names.get(id).cloned());
            let qa_officer = person(&test.qa_officer_id, names);
            Some(TestReviewItem {
                test,
                sample,
                analyst,
                reviewer_name,
                qa_officer,
            })
        })
        .collect()
}

/// Gate entries only move forward through their lifecycle
pub(crate) fn ensure_gate_advance(expected: GateEntryStatus, next: GateEntryStatus) -> AppResult<()> {
    if expected.can_advance_to(next) {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "Gate entry cannot move from '{}' to '{}'",
            expected.as_str(),
            next.as_str()
        )))
    }
}

/// Conflict message for a test row that no longer matches its guard
pub(crate) fn test_conflict(test: &QualityTest, guard: &TestGuard) -> String {
    if !guard.statuses.contains(&test.status) {
        format!(
            "Quality test is '{}'; expected one of: {}",
            test.status,
            guard.status_labels().join(", ")
        )
    } else if guard.warehouse_action_unset && test.warehouse_action.is_some() {
        "Warehouse action already recorded for this test".to_string()
    } else if test.assigned_to.is_none() && guard.assignee.reads_sample_analyst() {
        "Sample is assigned to another analyst".to_string()
    } else {
        "Quality test is assigned to someone else".to_string()
    }
}
