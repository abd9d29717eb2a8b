//! In-process workflow store
//!
//! Tables live behind one `RwLock`. A change set is applied to a copy of the
//! tables and swapped in only when every change succeeded, so readers never
//! observe a partially applied transition.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::codes;
use shared::{
    AssignedTest, GateEntry, GateEntryStatus, GoodsReceiptNote, GrnStatus, Notification,
    PendingGrnView, QualitySample, QualityTest, ReviewFilter, Role, SampleFilter, SampleView,
    Task, TaskStatus, TestReviewItem, UserRecord,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    assemble_review_items, ensure_gate_advance, test_conflict, Applied, Change, ChangeSet, Fanout,
    WorkflowStore,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<UserRecord>,
    gate_entries: Vec<GateEntry>,
    grns: Vec<GoodsReceiptNote>,
    samples: Vec<QualitySample>,
    tests: Vec<QualityTest>,
    notifications: Vec<Notification>,
    tasks: Vec<Task>,
}

impl Tables {
    fn active_with_role(&self, role: Role) -> impl Iterator<Item = &UserRecord> {
        self.users
            .iter()
            .filter(move |u| u.role == role && u.is_active)
    }

    fn apply(&mut self, set: ChangeSet) -> AppResult<Applied> {
        let at = set.at;
        let mut applied = Applied::default();

        for change in set.changes {
            match change {
                Change::InsertGateEntry(new) => {
                    let prefix = codes::entry_code_prefix(&new.created_at);
                    let existing = self
                        .gate_entries
                        .iter()
                        .filter(|e| codes::sequence_of(&e.entry_code, &prefix).is_some())
                        .count() as i64;
                    let code = codes::next_entry_code(existing, &new.created_at);
                    if self.gate_entries.iter().any(|e| e.entry_code == code) {
                        return Err(AppError::Conflict(format!("Entry code {} already exists", code)));
                    }
                    self.gate_entries.push(new.into_entry(code.clone()));
                    applied.entry_code = Some(code);
                }
                Change::InsertGrn(new) => {
                    let gate_entry_id = new.input.gate_entry_id;
                    if !self.gate_entries.iter().any(|e| e.id == gate_entry_id) {
                        return Err(AppError::NotFound("Gate entry".to_string()));
                    }
                    if self.grns.iter().any(|g| g.gate_entry_id == gate_entry_id) {
                        return Err(AppError::Conflict(
                            "A GRN already exists for this gate entry".to_string(),
                        ));
                    }
                    let prefix = codes::grn_code_prefix(&new.created_at);
                    let existing = self
                        .grns
                        .iter()
                        .filter(|g| codes::sequence_of(&g.grn_code, &prefix).is_some())
                        .count() as i64;
                    let code = codes::next_grn_code(existing, &new.created_at);
                    self.grns.push(new.into_grn(code.clone()));
                    applied.grn_code = Some(code);
                }
                Change::InsertSample(sample) => {
                    if let Some(grn_id) = sample.grn_id {
                        if !self.grns.iter().any(|g| g.id == grn_id) {
                            return Err(AppError::NotFound("GRN".to_string()));
                        }
                    }
                    self.samples.push(sample);
                }
                Change::InsertTests(tests) => {
                    for test in &tests {
                        if !self.samples.iter().any(|s| s.id == test.sample_id) {
                            return Err(AppError::NotFound("Quality sample".to_string()));
                        }
                    }
                    self.tests.extend(tests);
                }
                Change::AdvanceGateEntry { id, expected, next } => {
                    ensure_gate_advance(expected, next)?;
                    let entry = self
                        .gate_entries
                        .iter_mut()
                        .find(|e| e.id == id)
                        .ok_or_else(|| AppError::NotFound("Gate entry".to_string()))?;
                    if entry.status != expected {
                        return Err(AppError::Conflict(format!(
                            "Gate entry is '{}', expected '{}'",
                            entry.status.as_str(),
                            expected.as_str()
                        )));
                    }
                    entry.status = next;
                }
                Change::AdvanceGrn {
                    id,
                    expected,
                    next,
                    qa_notes,
                } => {
                    let grn = self
                        .grns
                        .iter_mut()
                        .find(|g| g.id == id)
                        .ok_or_else(|| AppError::NotFound("GRN".to_string()))?;
                    if grn.status != expected {
                        return Err(AppError::Conflict(format!(
                            "GRN is '{}', expected '{}'",
                            grn.status.as_str(),
                            expected.as_str()
                        )));
                    }
                    grn.status = next;
                    if qa_notes.is_some() {
                        grn.qa_notes = qa_notes;
                    }
                    grn.updated_at = at;
                }
                Change::UpdateSample { id, guard, patch } => {
                    let sample = self
                        .samples
                        .iter_mut()
                        .find(|s| s.id == id)
                        .ok_or_else(|| AppError::NotFound("Quality sample".to_string()))?;
                    if !guard.admits(sample) {
                        return Err(AppError::Conflict(
                            "Sample is already assigned to an analyst".to_string(),
                        ));
                    }
                    patch.apply(sample, at);
                }
                Change::UpdateTest { id, guard, patch } => {
                    let index = self
                        .tests
                        .iter()
                        .position(|t| t.id == id)
                        .ok_or_else(|| AppError::NotFound("Quality test".to_string()))?;
                    let sample_id = self.tests[index].sample_id;
                    let sample_analyst = self
                        .samples
                        .iter()
                        .find(|s| s.id == sample_id)
                        .and_then(|s| s.analyst_id.clone());
                    let test = &mut self.tests[index];
                    if !guard.admits(test, sample_analyst.as_deref()) {
                        return Err(AppError::Conflict(test_conflict(test, &guard)));
                    }
                    patch.apply(test, at);
                }
                Change::Notify(fanout) => {
                    let rows: Vec<Notification> = self
                        .active_with_role(fanout.role)
                        .map(|u| notification(&fanout, &u.id, at))
                        .collect();
                    applied.notified += rows.len();
                    self.notifications.extend(rows);
                }
                Change::AssignTasks(fanout) => {
                    let rows: Vec<Task> = self
                        .active_with_role(fanout.role)
                        .map(|u| task(&fanout, &u.id, at))
                        .collect();
                    applied.tasks_created += rows.len();
                    self.tasks.extend(rows);
                }
            }
        }

        Ok(applied)
    }

    fn names(&self) -> HashMap<String, String> {
        self.users
            .iter()
            .map(|u| (u.id.clone(), u.name.clone()))
            .collect()
    }
}

fn notification(fanout: &Fanout, user_id: &str, at: DateTime<Utc>) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        title: fanout.title.clone(),
        message: fanout.message.clone(),
        kind: fanout.kind,
        entity: fanout.entity,
        is_read: false,
        created_at: at,
        read_at: None,
    }
}

fn task(fanout: &Fanout, user_id: &str, at: DateTime<Utc>) -> Task {
    Task {
        id: Uuid::new_v4(),
        assigned_to: user_id.to_string(),
        assigned_by: fanout.sent_by.clone(),
        title: fanout.title.clone(),
        description: fanout.message.clone(),
        status: TaskStatus::Pending,
        priority: fanout.priority,
        entity: fanout.entity,
        created_at: at,
    }
}

/// Workflow store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    tables: RwLock<Tables>,
}

impl MemoryWorkflowStore {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                users,
                ..Tables::default()
            }),
        }
    }

    /// A store seeded with the demo plant directory
    pub fn with_demo_directory() -> Self {
        Self::new(demo_directory())
    }

    pub async fn add_user(&self, user: UserRecord) {
        let mut tables = self.tables.write().await;
        tables.users.retain(|u| u.id != user.id);
        tables.users.push(user);
    }

    pub async fn deactivate_user(&self, id: &str) {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
            user.is_active = false;
        }
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn apply(&self, changes: ChangeSet) -> AppResult<Applied> {
        let mut tables = self.tables.write().await;
        let mut draft = tables.clone();
        let applied = draft.apply(changes)?;
        *tables = draft;
        Ok(applied)
    }

    async fn user(&self, id: &str) -> AppResult<Option<UserRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn gate_entry(&self, id: Uuid) -> AppResult<Option<GateEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.gate_entries.iter().find(|e| e.id == id).cloned())
    }

    async fn gate_entries(&self, status: Option<GateEntryStatus>) -> AppResult<Vec<GateEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .gate_entries
            .iter()
            .rev()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect())
    }

    async fn grn(&self, id: Uuid) -> AppResult<Option<GoodsReceiptNote>> {
        let tables = self.tables.read().await;
        let grn = tables.grns.iter().find(|g| g.id == id).cloned();
        if let Some(grn) = &grn {
            grn.verify_totals()?;
        }
        Ok(grn)
    }

    async fn grns(&self) -> AppResult<Vec<GoodsReceiptNote>> {
        let tables = self.tables.read().await;
        let grns: Vec<GoodsReceiptNote> = tables.grns.iter().rev().cloned().collect();
        for grn in &grns {
            grn.verify_totals()?;
        }
        Ok(grns)
    }

    async fn pending_grns(&self) -> AppResult<Vec<PendingGrnView>> {
        let tables = self.tables.read().await;
        Ok(tables
            .grns
            .iter()
            .filter(|g| g.status == GrnStatus::AwaitingQa)
            .filter_map(|g| {
                let entry = tables.gate_entries.iter().find(|e| e.id == g.gate_entry_id)?;
                Some(PendingGrnView {
                    grn_id: g.id,
                    grn_code: g.grn_code.clone(),
                    entry_code: g.entry_code.clone(),
                    po_number: g.po_number.clone(),
                    delivery_challan: g.delivery_challan.clone(),
                    quantity_received: g.quantity_received,
                    remarks: g.remarks.clone(),
                    status: g.status,
                    material_name: entry.material_name.clone(),
                    vehicle_number: entry.vehicle_number.clone(),
                    driver_name: entry.driver_name.clone(),
                    driver_contact: entry.driver_contact.clone(),
                    gate_quantity: entry.quantity,
                    uom: entry.uom.clone(),
                    gate_created_at: entry.created_at,
                })
            })
            .collect())
    }

    async fn sample(&self, id: Uuid) -> AppResult<Option<QualitySample>> {
        let tables = self.tables.read().await;
        Ok(tables.samples.iter().find(|s| s.id == id).cloned())
    }

    async fn samples(&self, filter: SampleFilter) -> AppResult<Vec<SampleView>> {
        let tables = self.tables.read().await;
        Ok(tables
            .samples
            .iter()
            .rev()
            .filter(|s| filter.admits(s))
            .map(|s| SampleView {
                sample: s.clone(),
                test_count: tables.tests.iter().filter(|t| t.sample_id == s.id).count() as i64,
            })
            .collect())
    }

    async fn sample_tests(&self, sample_id: Uuid) -> AppResult<Vec<QualityTest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tests
            .iter()
            .filter(|t| t.sample_id == sample_id)
            .cloned()
            .collect())
    }

    async fn quality_test(&self, id: Uuid) -> AppResult<Option<QualityTest>> {
        let tables = self.tables.read().await;
        Ok(tables.tests.iter().find(|t| t.id == id).cloned())
    }

    async fn review_items(&self, filter: &ReviewFilter) -> AppResult<Vec<TestReviewItem>> {
        let tables = self.tables.read().await;
        let mut tests: Vec<QualityTest> = tables
            .tests
            .iter()
            .filter(|t| filter.admits(t))
            .cloned()
            .collect();
        tests.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let samples: HashMap<Uuid, QualitySample> =
            tables.samples.iter().map(|s| (s.id, s.clone())).collect();
        Ok(assemble_review_items(tests, &samples, &tables.names()))
    }

    async fn assigned_tests(&self, user_id: &str) -> AppResult<Vec<AssignedTest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tests
            .iter()
            .filter(|t| t.assigned_to.as_deref() == Some(user_id))
            .filter_map(|t| {
                let sample = tables.samples.iter().find(|s| s.id == t.sample_id)?;
                Some(AssignedTest {
                    test: t.clone(),
                    sample: sample.clone(),
                })
            })
            .collect())
    }

    async fn notifications_for(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Notification".to_string()))?;
        if !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(at);
        }
        Ok(())
    }

    async fn tasks_for(&self, user_id: &str) -> AppResult<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .iter()
            .rev()
            .filter(|t| t.assigned_to == user_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// The demo plant's user directory, one or more users per role
pub fn demo_directory() -> Vec<UserRecord> {
    let rows: [(&str, &str, &str, Role, &str, Option<&str>); 17] = [
        ("prod-head-1", "John Smith", "john.smith@pharma.com", Role::ProductionHead, "Production", Some("plant-a")),
        ("prod-man-1", "Sarah Johnson", "sarah.johnson@pharma.com", Role::ProductionManager, "Production", Some("plant-a")),
        ("prod-op-1", "David Chen", "david.chen@pharma.com", Role::ProductionOperator, "Production", Some("plant-a")),
        ("qa-head-1", "Raj Patel", "raj.patel@pharma.com", Role::QaHead, "Quality Assurance", Some("plant-a")),
        ("qa-man-1", "Priya Sharma", "priya.sharma@pharma.com", Role::QaManager, "Quality Assurance", Some("plant-a")),
        ("qa-op-1", "Emily Brown", "emily.brown@pharma.com", Role::QaOperator, "Quality Assurance", Some("plant-a")),
        ("qc-head-1", "Laura Vance", "laura.vance@pharma.com", Role::QcHead, "Quality Control", Some("plant-a")),
        ("qc-man-1", "Robert Taylor", "robert.taylor@pharma.com", Role::QcManager, "Quality Control", Some("plant-a")),
        ("qc-op-1", "Lisa Anderson", "lisa.anderson@pharma.com", Role::QcOperator, "Quality Control", Some("plant-a")),
        ("scm-proc-1", "Maria Garcia", "maria.garcia@pharma.com", Role::ProcurementOfficer, "Supply Chain Management", Some("plant-a")),
        ("scm-wh-1", "James Wilson", "james.wilson@pharma.com", Role::WarehouseManager, "Supply Chain Management", Some("plant-a")),
        ("fin-off-1", "Michael Scott", "michael.scott@pharma.com", Role::FinanceOfficer, "Finance", None),
        ("plant-head-1", "Thomas Moore", "thomas.moore@pharma.com", Role::PlantHead, "Administration", Some("plant-a")),
        ("sec-off-1", "Jennifer Lee", "jennifer.lee@pharma.com", Role::SecurityOfficer, "Security", Some("plant-a")),
        ("admin-1", "Admin User", "admin@pharma.com", Role::SystemAdmin, "Administration", None),
        ("mgmt-1", "Jan Levinson", "jan.levinson@pharma.com", Role::Management, "Corporate", None),
        ("sales-1", "Alex Thompson", "alex.thompson@pharma.com", Role::SalesPerson, "Sales", None),
    ];

    rows.into_iter()
        .map(|(id, name, email, role, department, plant_id)| UserRecord {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            department: department.to_string(),
            plant_id: plant_id.map(str::to_string),
            is_active: true,
        })
        .collect()
}
