//! PostgreSQL workflow store
//!
//! Each change set runs in one transaction. Guarded rows are locked with
//! `FOR UPDATE`, checked against their guard, patched and written back with
//! an `UPDATE ... WHERE status = <prior status>`; zero affected rows is a
//! conflict. Fan-outs are `INSERT ... SELECT` over the user directory.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::codes;
use shared::{
    AssignedTest, Disposition, EntityKind, EntityRef, GateEntry, GateEntryStatus,
    GoodsReceiptNote, GrnItem, GrnStatus, Notification, NotificationKind, PendingGrnView,
    Priority, QualitySample, QualityTest, Recommendation, ReviewFilter, Role, SampleFilter,
    SampleStatus, SampleView, Task, TaskStatus, TestReviewItem, TestStatus, UserRecord,
    WarehouseAction,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{
    assemble_review_items, ensure_gate_advance, test_conflict, Applied, Change, ChangeSet, Fanout,
    WorkflowStore,
};
use crate::error::{AppError, AppResult};

macro_rules! gate_entry_columns {
    () => {
        "id, entry_code, material_name, material_category, po_number, vehicle_name, \
         vehicle_number, driver_name, driver_contact, supplier_name, document_number, \
         quantity, uom, remarks, seal_intact, status, created_by, created_by_name, \
         plant_id, created_at"
    };
}

macro_rules! grn_columns {
    () => {
        "id, gate_entry_id, entry_code, grn_code, po_number, delivery_challan, \
         quantity_received, remarks, status, supplier_name, supplier_address, \
         supplier_location, supplier_contact, document_status, document_date, \
         delivery_date, period, reference, comment, items, net_total, vat_total, \
         gross_total, qa_notes, created_by, created_by_name, created_at, updated_at"
    };
}

macro_rules! sample_columns {
    () => {
        "id, grn_id, entry_code, product_name, batch_number, sample_type, sample_date, \
         due_date, status, analyst_id, priority, requested_by, requested_by_name, \
         qa_notes, created_at, updated_at"
    };
}

macro_rules! test_columns {
    () => {
        "id, sample_id, test_name, method, status, assigned_to, instrument_id, \
         result_data, analyst_notes, submitted_by, submitted_on, reviewed_by, \
         reviewed_on, manager_notes, qa_officer_id, qa_assigned_by, \
         qa_assignment_notes, qa_officer_notes, qa_officer_recommendation, \
         qa_manager_decision, qa_manager_decision_notes, qa_decided_by, qa_decided_on, \
         material_disposition, warehouse_action, warehouse_notes, \
         warehouse_acknowledged_by, warehouse_acknowledged_at, created_at, updated_at"
    };
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_label<T>(value: &str, parse: fn(&str) -> Option<T>, what: &str) -> AppResult<T> {
    parse(value).ok_or_else(|| AppError::Internal(format!("Unknown {} '{}' in store", what, value)))
}

fn parse_opt<T>(value: Option<String>, parse: fn(&str) -> Option<T>, what: &str) -> AppResult<Option<T>> {
    value.map(|v| parse_label(&v, parse, what)).transpose()
}

fn entity_ref(kind: Option<String>, id: Option<Uuid>) -> AppResult<Option<EntityRef>> {
    match (kind, id) {
        (Some(kind), Some(id)) => Ok(Some(EntityRef::new(
            parse_label(&kind, EntityKind::from_str, "entity kind")?,
            id,
        ))),
        _ => Ok(None),
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    department: String,
    plant_id: Option<String>,
    is_active: bool,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = AppError;

    fn try_from(row: UserRow) -> AppResult<Self> {
        Ok(UserRecord {
            role: parse_label(&row.role, Role::from_str, "role")?,
            id: row.id,
            name: row.name,
            email: row.email,
            department: row.department,
            plant_id: row.plant_id,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct GateEntryRow {
    id: Uuid,
    entry_code: String,
    material_name: String,
    material_category: Option<String>,
    po_number: Option<String>,
    vehicle_name: Option<String>,
    vehicle_number: String,
    driver_name: Option<String>,
    driver_contact: Option<String>,
    supplier_name: Option<String>,
    document_number: Option<String>,
    quantity: Decimal,
    uom: Option<String>,
    remarks: Option<String>,
    seal_intact: bool,
    status: String,
    created_by: String,
    created_by_name: String,
    plant_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<GateEntryRow> for GateEntry {
    type Error = AppError;

    fn try_from(row: GateEntryRow) -> AppResult<Self> {
        Ok(GateEntry {
            status: parse_label(&row.status, GateEntryStatus::from_str, "gate entry status")?,
            id: row.id,
            entry_code: row.entry_code,
            material_name: row.material_name,
            material_category: row.material_category,
            po_number: row.po_number,
            vehicle_name: row.vehicle_name,
            vehicle_number: row.vehicle_number,
            driver_name: row.driver_name,
            driver_contact: row.driver_contact,
            supplier_name: row.supplier_name,
            document_number: row.document_number,
            quantity: row.quantity,
            uom: row.uom,
            remarks: row.remarks,
            seal_intact: row.seal_intact,
            created_by: row.created_by,
            created_by_name: row.created_by_name,
            plant_id: row.plant_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct GrnRow {
    id: Uuid,
    gate_entry_id: Uuid,
    entry_code: String,
    grn_code: String,
    po_number: String,
    delivery_challan: Option<String>,
    quantity_received: Decimal,
    remarks: Option<String>,
    status: String,
    supplier_name: Option<String>,
    supplier_address: Option<String>,
    supplier_location: Option<String>,
    supplier_contact: Option<String>,
    document_status: Option<String>,
    document_date: Option<NaiveDate>,
    delivery_date: Option<NaiveDate>,
    period: Option<String>,
    reference: Option<String>,
    comment: Option<String>,
    items: Json<Vec<GrnItem>>,
    net_total: Decimal,
    vat_total: Decimal,
    gross_total: Decimal,
    qa_notes: Option<String>,
    created_by: String,
    created_by_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GrnRow> for GoodsReceiptNote {
    type Error = AppError;

    /// Totals are re-derived from the items and must agree with the stored ones
    fn try_from(row: GrnRow) -> AppResult<Self> {
        let grn = GoodsReceiptNote {
            status: parse_label(&row.status, GrnStatus::from_str, "GRN status")?,
            id: row.id,
            gate_entry_id: row.gate_entry_id,
            entry_code: row.entry_code,
            grn_code: row.grn_code,
            po_number: row.po_number,
            delivery_challan: row.delivery_challan,
            quantity_received: row.quantity_received,
            remarks: row.remarks,
            supplier_name: row.supplier_name,
            supplier_address: row.supplier_address,
            supplier_location: row.supplier_location,
            supplier_contact: row.supplier_contact,
            document_status: row.document_status,
            document_date: row.document_date,
            delivery_date: row.delivery_date,
            period: row.period,
            reference: row.reference,
            comment: row.comment,
            items: row.items.0,
            net_total: row.net_total,
            vat_total: row.vat_total,
            gross_total: row.gross_total,
            qa_notes: row.qa_notes,
            created_by: row.created_by,
            created_by_name: row.created_by_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        grn.verify_totals()?;
        Ok(grn)
    }
}

#[derive(Debug, FromRow)]
struct SampleRow {
    id: Uuid,
    grn_id: Option<Uuid>,
    entry_code: String,
    product_name: String,
    batch_number: String,
    sample_type: String,
    sample_date: NaiveDate,
    due_date: NaiveDate,
    status: String,
    analyst_id: Option<String>,
    priority: String,
    requested_by: String,
    requested_by_name: String,
    qa_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SampleRow> for QualitySample {
    type Error = AppError;

    fn try_from(row: SampleRow) -> AppResult<Self> {
        Ok(QualitySample {
            status: parse_label(&row.status, SampleStatus::from_str, "sample status")?,
            priority: parse_label(&row.priority, Priority::from_str, "priority")?,
            id: row.id,
            grn_id: row.grn_id,
            entry_code: row.entry_code,
            product_name: row.product_name,
            batch_number: row.batch_number,
            sample_type: row.sample_type,
            sample_date: row.sample_date,
            due_date: row.due_date,
            analyst_id: row.analyst_id,
            requested_by: row.requested_by,
            requested_by_name: row.requested_by_name,
            qa_notes: row.qa_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SampleCountRow {
    #[sqlx(flatten)]
    sample: SampleRow,
    test_count: i64,
}

#[derive(Debug, FromRow)]
struct TestRow {
    id: Uuid,
    sample_id: Uuid,
    test_name: String,
    method: Option<String>,
    status: String,
    assigned_to: Option<String>,
    instrument_id: Option<String>,
    result_data: Option<serde_json::Value>,
    analyst_notes: Option<String>,
    submitted_by: Option<String>,
    submitted_on: Option<DateTime<Utc>>,
    reviewed_by: Option<String>,
    reviewed_on: Option<DateTime<Utc>>,
    manager_notes: Option<String>,
    qa_officer_id: Option<String>,
    qa_assigned_by: Option<String>,
    qa_assignment_notes: Option<String>,
    qa_officer_notes: Option<String>,
    qa_officer_recommendation: Option<String>,
    qa_manager_decision: Option<String>,
    qa_manager_decision_notes: Option<String>,
    qa_decided_by: Option<String>,
    qa_decided_on: Option<DateTime<Utc>>,
    material_disposition: Option<String>,
    warehouse_action: Option<String>,
    warehouse_notes: Option<String>,
    warehouse_acknowledged_by: Option<String>,
    warehouse_acknowledged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TestRow> for QualityTest {
    type Error = AppError;

    fn try_from(row: TestRow) -> AppResult<Self> {
        Ok(QualityTest {
            status: parse_label(&row.status, TestStatus::from_str, "test status")?,
            qa_officer_recommendation: parse_opt(
                row.qa_officer_recommendation,
                Recommendation::from_str,
                "recommendation",
            )?,
            qa_manager_decision: parse_opt(
                row.qa_manager_decision,
                Recommendation::from_str,
                "decision",
            )?,
            material_disposition: parse_opt(
                row.material_disposition,
                Disposition::from_str,
                "disposition",
            )?,
            warehouse_action: parse_opt(
                row.warehouse_action,
                WarehouseAction::from_str,
                "warehouse action",
            )?,
            id: row.id,
            sample_id: row.sample_id,
            test_name: row.test_name,
            method: row.method,
            assigned_to: row.assigned_to,
            instrument_id: row.instrument_id,
            result_data: row.result_data,
            analyst_notes: row.analyst_notes,
            submitted_by: row.submitted_by,
            submitted_on: row.submitted_on,
            reviewed_by: row.reviewed_by,
            reviewed_on: row.reviewed_on,
            manager_notes: row.manager_notes,
            qa_officer_id: row.qa_officer_id,
            qa_assigned_by: row.qa_assigned_by,
            qa_assignment_notes: row.qa_assignment_notes,
            qa_officer_notes: row.qa_officer_notes,
            qa_manager_decision_notes: row.qa_manager_decision_notes,
            qa_decided_by: row.qa_decided_by,
            qa_decided_on: row.qa_decided_on,
            warehouse_notes: row.warehouse_notes,
            warehouse_acknowledged_by: row.warehouse_acknowledged_by,
            warehouse_acknowledged_at: row.warehouse_acknowledged_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PendingGrnRow {
    grn_id: Uuid,
    grn_code: String,
    entry_code: String,
    po_number: String,
    delivery_challan: Option<String>,
    quantity_received: Decimal,
    remarks: Option<String>,
    status: String,
    material_name: String,
    vehicle_number: String,
    driver_name: Option<String>,
    driver_contact: Option<String>,
    gate_quantity: Decimal,
    uom: Option<String>,
    gate_created_at: DateTime<Utc>,
}

impl TryFrom<PendingGrnRow> for PendingGrnView {
    type Error = AppError;

    fn try_from(row: PendingGrnRow) -> AppResult<Self> {
        Ok(PendingGrnView {
            status: parse_label(&row.status, GrnStatus::from_str, "GRN status")?,
            grn_id: row.grn_id,
            grn_code: row.grn_code,
            entry_code: row.entry_code,
            po_number: row.po_number,
            delivery_challan: row.delivery_challan,
            quantity_received: row.quantity_received,
            remarks: row.remarks,
            material_name: row.material_name,
            vehicle_number: row.vehicle_number,
            driver_name: row.driver_name,
            driver_contact: row.driver_contact,
            gate_quantity: row.gate_quantity,
            uom: row.uom,
            gate_created_at: row.gate_created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: String,
    title: String,
    message: String,
    kind: String,
    entity_type: Option<String>,
    entity_id: Option<Uuid>,
    is_read: bool,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> AppResult<Self> {
        Ok(Notification {
            kind: parse_label(&row.kind, NotificationKind::from_str, "notification kind")?,
            entity: entity_ref(row.entity_type, row.entity_id)?,
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    assigned_to: String,
    assigned_by: String,
    title: String,
    description: String,
    status: String,
    priority: String,
    entity_type: Option<String>,
    entity_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> AppResult<Self> {
        Ok(Task {
            status: parse_label(&row.status, TaskStatus::from_str, "task status")?,
            priority: parse_label(&row.priority, Priority::from_str, "priority")?,
            entity: entity_ref(row.entity_type, row.entity_id)?,
            id: row.id,
            assigned_to: row.assigned_to,
            assigned_by: row.assigned_by,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> AppResult<Vec<T>>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ============================================================================
// Write path
// ============================================================================

/// Why a change set attempt failed
#[derive(Debug)]
enum Failure {
    /// A generated code lost a race with a concurrent insert
    CodeCollision(&'static str),
    App(AppError),
}

impl From<AppError> for Failure {
    fn from(err: AppError) -> Self {
        Failure::App(err)
    }
}

impl From<sqlx::Error> for Failure {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match (db_err.code().as_deref(), db_err.constraint()) {
                (Some("23505"), Some("gate_entries_entry_code_key")) => {
                    return Failure::CodeCollision("entry code")
                }
                (Some("23505"), Some("grns_grn_code_key")) => {
                    return Failure::CodeCollision("GRN code")
                }
                (Some("23505"), Some("grns_gate_entry_id_key")) => {
                    return Failure::App(AppError::Conflict(
                        "A GRN already exists for this gate entry".to_string(),
                    ))
                }
                (Some("23503"), _) => {
                    return Failure::App(AppError::NotFound("Referenced record".to_string()))
                }
                _ => {}
            }
        }
        Failure::App(AppError::Database(err))
    }
}

/// Run `attempt` again while it fails on a generated-code collision, up to
/// `retries` extra times; a collision after that is a `Conflict`
async fn retry_on_code_collision<T, F, Fut>(retries: u32, mut attempt: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let mut retried = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(Failure::CodeCollision(what)) if retried < retries => {
                retried += 1;
                tracing::warn!("Generated {} collided, retrying (attempt {})", what, retried);
            }
            Err(Failure::CodeCollision(what)) => {
                return Err(AppError::Conflict(format!(
                    "Could not allocate a unique {}, please retry",
                    what
                )))
            }
            Err(Failure::App(err)) => return Err(err),
        }
    }
}

fn entity_columns(entity: &Option<EntityRef>) -> (Option<&'static str>, Option<Uuid>) {
    match entity {
        Some(e) => (Some(e.kind.as_str()), Some(e.id)),
        None => (None, None),
    }
}

async fn status_of(conn: &mut PgConnection, table: &str, id: Uuid) -> Result<Option<String>, Failure> {
    let sql = format!("SELECT status FROM {} WHERE id = $1", table);
    Ok(sqlx::query_scalar::<_, String>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?)
}

async fn insert_test(conn: &mut PgConnection, test: &QualityTest) -> Result<(), Failure> {
    sqlx::query(concat!(
        "INSERT INTO quality_tests (",
        test_columns!(),
        ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
         $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)"
    ))
    .bind(test.id)
    .bind(test.sample_id)
    .bind(&test.test_name)
    .bind(&test.method)
    .bind(test.status.as_str())
    .bind(&test.assigned_to)
    .bind(&test.instrument_id)
    .bind(&test.result_data)
    .bind(&test.analyst_notes)
    .bind(&test.submitted_by)
    .bind(test.submitted_on)
    .bind(&test.reviewed_by)
    .bind(test.reviewed_on)
    .bind(&test.manager_notes)
    .bind(&test.qa_officer_id)
    .bind(&test.qa_assigned_by)
    .bind(&test.qa_assignment_notes)
    .bind(&test.qa_officer_notes)
    .bind(test.qa_officer_recommendation.map(|r| r.as_str()))
    .bind(test.qa_manager_decision.map(|r| r.as_str()))
    .bind(&test.qa_manager_decision_notes)
    .bind(&test.qa_decided_by)
    .bind(test.qa_decided_on)
    .bind(test.material_disposition.map(|d| d.as_str()))
    .bind(test.warehouse_action.map(|a| a.as_str()))
    .bind(&test.warehouse_notes)
    .bind(&test.warehouse_acknowledged_by)
    .bind(test.warehouse_acknowledged_at)
    .bind(test.created_at)
    .bind(test.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Write back every mutable column of a test still in `prior` status
async fn update_test(conn: &mut PgConnection, test: &QualityTest, prior: TestStatus) -> Result<u64, Failure> {
    let result = sqlx::query(
        r#"
        UPDATE quality_tests
        SET status = $2, assigned_to = $3, result_data = $4, analyst_notes = $5,
            submitted_by = $6, submitted_on = $7, reviewed_by = $8, reviewed_on = $9,
            manager_notes = $10, qa_officer_id = $11, qa_assigned_by = $12,
            qa_assignment_notes = $13, qa_officer_notes = $14,
            qa_officer_recommendation = $15, qa_manager_decision = $16,
            qa_manager_decision_notes = $17, qa_decided_by = $18, qa_decided_on = $19,
            material_disposition = $20, warehouse_action = $21, warehouse_notes = $22,
            warehouse_acknowledged_by = $23, warehouse_acknowledged_at = $24,
            updated_at = $25
        WHERE id = $1 AND status = $26
        "#,
    )
    .bind(test.id)
    .bind(test.status.as_str())
    .bind(&test.assigned_to)
    .bind(&test.result_data)
    .bind(&test.analyst_notes)
    .bind(&test.submitted_by)
    .bind(test.submitted_on)
    .bind(&test.reviewed_by)
    .bind(test.reviewed_on)
    .bind(&test.manager_notes)
    .bind(&test.qa_officer_id)
    .bind(&test.qa_assigned_by)
    .bind(&test.qa_assignment_notes)
    .bind(&test.qa_officer_notes)
    .bind(test.qa_officer_recommendation.map(|r| r.as_str()))
    .bind(test.qa_manager_decision.map(|r| r.as_str()))
    .bind(&test.qa_manager_decision_notes)
    .bind(&test.qa_decided_by)
    .bind(test.qa_decided_on)
    .bind(test.material_disposition.map(|d| d.as_str()))
    .bind(test.warehouse_action.map(|a| a.as_str()))
    .bind(&test.warehouse_notes)
    .bind(&test.warehouse_acknowledged_by)
    .bind(test.warehouse_acknowledged_at)
    .bind(test.updated_at)
    .bind(prior.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_sample(conn: &mut PgConnection, sample: &QualitySample) -> Result<(), Failure> {
    sqlx::query(concat!(
        "INSERT INTO quality_samples (",
        sample_columns!(),
        ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
    ))
    .bind(sample.id)
    .bind(sample.grn_id)
    .bind(&sample.entry_code)
    .bind(&sample.product_name)
    .bind(&sample.batch_number)
    .bind(&sample.sample_type)
    .bind(sample.sample_date)
    .bind(sample.due_date)
    .bind(sample.status.as_str())
    .bind(&sample.analyst_id)
    .bind(sample.priority.as_str())
    .bind(&sample.requested_by)
    .bind(&sample.requested_by_name)
    .bind(&sample.qa_notes)
    .bind(sample.created_at)
    .bind(sample.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn fan_out_notifications(conn: &mut PgConnection, fanout: &Fanout, at: DateTime<Utc>) -> Result<u64, Failure> {
    let (entity_type, entity_id) = entity_columns(&fanout.entity);
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, title, message, kind, entity_type, entity_id, is_read, created_at)
        SELECT gen_random_uuid(), u.id, $2, $3, $4, $5, $6, FALSE, $7
        FROM users u
        WHERE u.role = $1 AND u.is_active
        "#,
    )
    .bind(fanout.role.as_str())
    .bind(&fanout.title)
    .bind(&fanout.message)
    .bind(fanout.kind.as_str())
    .bind(entity_type)
    .bind(entity_id)
    .bind(at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn fan_out_tasks(conn: &mut PgConnection, fanout: &Fanout, at: DateTime<Utc>) -> Result<u64, Failure> {
    let (entity_type, entity_id) = entity_columns(&fanout.entity);
    let result = sqlx::query(
        r#"
        INSERT INTO tasks (id, assigned_to, assigned_by, title, description, status, priority, entity_type, entity_id, created_at)
        SELECT gen_random_uuid(), u.id, $2, $3, $4, $5, $6, $7, $8, $9
        FROM users u
        WHERE u.role = $1 AND u.is_active
        "#,
    )
    .bind(fanout.role.as_str())
    .bind(&fanout.sent_by)
    .bind(&fanout.title)
    .bind(&fanout.message)
    .bind(TaskStatus::Pending.as_str())
    .bind(fanout.priority.as_str())
    .bind(entity_type)
    .bind(entity_id)
    .bind(at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Workflow store backed by PostgreSQL
#[derive(Clone)]
pub struct PgWorkflowStore {
    db: PgPool,
    code_retry_attempts: u32,
}

impl PgWorkflowStore {
    pub fn new(db: PgPool, code_retry_attempts: u32) -> Self {
        Self {
            db,
            code_retry_attempts,
        }
    }

    async fn apply_once(&self, set: ChangeSet) -> Result<Applied, Failure> {
        let at = set.at;
        let mut applied = Applied::default();
        let mut tx = self.db.begin().await?;

        for change in set.changes {
            match change {
                Change::InsertGateEntry(new) => {
                    let prefix = codes::entry_code_prefix(&new.created_at);
                    let existing = sqlx::query_scalar::<_, i64>(
                        "SELECT COUNT(*) FROM gate_entries WHERE entry_code LIKE $1",
                    )
                    .bind(format!("{}%", prefix))
                    .fetch_one(&mut *tx)
                    .await?;
                    let code = codes::next_entry_code(existing, &new.created_at);
                    let entry = new.into_entry(code.clone());

                    sqlx::query(concat!(
                        "INSERT INTO gate_entries (",
                        gate_entry_columns!(),
                        ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                         $14, $15, $16, $17, $18, $19, $20)"
                    ))
                    .bind(entry.id)
                    .bind(&entry.entry_code)
                    .bind(&entry.material_name)
                    .bind(&entry.material_category)
                    .bind(&entry.po_number)
                    .bind(&entry.vehicle_name)
                    .bind(&entry.vehicle_number)
                    .bind(&entry.driver_name)
                    .bind(&entry.driver_contact)
                    .bind(&entry.supplier_name)
                    .bind(&entry.document_number)
                    .bind(entry.quantity)
                    .bind(&entry.uom)
                    .bind(&entry.remarks)
                    .bind(entry.seal_intact)
                    .bind(entry.status.as_str())
                    .bind(&entry.created_by)
                    .bind(&entry.created_by_name)
                    .bind(&entry.plant_id)
                    .bind(entry.created_at)
                    .execute(&mut *tx)
                    .await?;
                    applied.entry_code = Some(code);
                }
                Change::InsertGrn(new) => {
                    let prefix = codes::grn_code_prefix(&new.created_at);
                    let existing = sqlx::query_scalar::<_, i64>(
                        "SELECT COUNT(*) FROM grns WHERE grn_code LIKE $1",
                    )
                    .bind(format!("{}%", prefix))
                    .fetch_one(&mut *tx)
                    .await?;
                    let code = codes::next_grn_code(existing, &new.created_at);
                    let grn = new.into_grn(code.clone());

                    sqlx::query(concat!(
                        "INSERT INTO grns (",
                        grn_columns!(),
                        ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                         $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)"
                    ))
                    .bind(grn.id)
                    .bind(grn.gate_entry_id)
                    .bind(&grn.entry_code)
                    .bind(&grn.grn_code)
                    .bind(&grn.po_number)
                    .bind(&grn.delivery_challan)
                    .bind(grn.quantity_received)
                    .bind(&grn.remarks)
                    .bind(grn.status.as_str())
                    .bind(&grn.supplier_name)
                    .bind(&grn.supplier_address)
                    .bind(&grn.supplier_location)
                    .bind(&grn.supplier_contact)
                    .bind(&grn.document_status)
                    .bind(grn.document_date)
                    .bind(grn.delivery_date)
                    .bind(&grn.period)
                    .bind(&grn.reference)
                    .bind(&grn.comment)
                    .bind(Json(&grn.items))
                    .bind(grn.net_total)
                    .bind(grn.vat_total)
                    .bind(grn.gross_total)
                    .bind(&grn.qa_notes)
                    .bind(&grn.created_by)
                    .bind(&grn.created_by_name)
                    .bind(grn.created_at)
                    .bind(grn.updated_at)
                    .execute(&mut *tx)
                    .await?;
                    applied.grn_code = Some(code);
                }
                Change::InsertSample(sample) => {
                    insert_sample(&mut tx, &sample).await?;
                }
                Change::InsertTests(tests) => {
                    for test in &tests {
                        insert_test(&mut tx, test).await?;
                    }
                }
                Change::AdvanceGateEntry { id, expected, next } => {
                    ensure_gate_advance(expected, next)?;
                    let result = sqlx::query(
                        "UPDATE gate_entries SET status = $3 WHERE id = $1 AND status = $2",
                    )
                    .bind(id)
                    .bind(expected.as_str())
                    .bind(next.as_str())
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() == 0 {
                        return Err(match status_of(&mut tx, "gate_entries", id).await? {
                            None => AppError::NotFound("Gate entry".to_string()),
                            Some(current) => AppError::Conflict(format!(
                                "Gate entry is '{}', expected '{}'",
                                current,
                                expected.as_str()
                            )),
                        }
                        .into());
                    }
                }
                Change::AdvanceGrn {
                    id,
                    expected,
                    next,
                    qa_notes,
                } => {
                    let result = sqlx::query(
                        r#"
                        UPDATE grns
                        SET status = $3, qa_notes = COALESCE($4, qa_notes), updated_at = $5
                        WHERE id = $1 AND status = $2
                        "#,
                    )
                    .bind(id)
                    .bind(expected.as_str())
                    .bind(next.as_str())
                    .bind(&qa_notes)
                    .bind(at)
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() == 0 {
                        return Err(match status_of(&mut tx, "grns", id).await? {
                            None => AppError::NotFound("GRN".to_string()),
                            Some(current) => AppError::Conflict(format!(
                                "GRN is '{}', expected '{}'",
                                current,
                                expected.as_str()
                            )),
                        }
                        .into());
                    }
                }
                Change::UpdateSample { id, guard, patch } => {
                    let row = sqlx::query_as::<_, SampleRow>(concat!(
                        "SELECT ",
                        sample_columns!(),
                        " FROM quality_samples WHERE id = $1 FOR UPDATE"
                    ))
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Quality sample".to_string()))?;
                    let mut sample = QualitySample::try_from(row)?;

                    if !guard.admits(&sample) {
                        return Err(AppError::Conflict(
                            "Sample is already assigned to an analyst".to_string(),
                        )
                        .into());
                    }
                    let prior_analyst = sample.analyst_id.clone();
                    patch.apply(&mut sample, at);

                    let result = sqlx::query(
                        r#"
                        UPDATE quality_samples
                        SET status = $2, analyst_id = $3, updated_at = $4
                        WHERE id = $1 AND analyst_id IS NOT DISTINCT FROM $5
                        "#,
                    )
                    .bind(id)
                    .bind(sample.status.as_str())
                    .bind(&sample.analyst_id)
                    .bind(sample.updated_at)
                    .bind(&prior_analyst)
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() == 0 {
                        return Err(AppError::Conflict(
                            "Sample changed while it was being updated".to_string(),
                        )
                        .into());
                    }
                }
                Change::UpdateTest { id, guard, patch } => {
                    let row = sqlx::query_as::<_, TestRow>(concat!(
                        "SELECT ",
                        test_columns!(),
                        " FROM quality_tests WHERE id = $1 FOR UPDATE"
                    ))
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Quality test".to_string()))?;
                    let mut test = QualityTest::try_from(row)?;

                    let sample_analyst: Option<String> = if guard.assignee.reads_sample_analyst() {
                        sqlx::query_scalar(
                            "SELECT analyst_id FROM quality_samples WHERE id = $1 FOR SHARE",
                        )
                        .bind(test.sample_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .flatten()
                    } else {
                        None
                    };
                    if !guard.admits(&test, sample_analyst.as_deref()) {
                        return Err(AppError::Conflict(test_conflict(&test, &guard)).into());
                    }
                    let prior = test.status;
                    patch.apply(&mut test, at);

                    if update_test(&mut tx, &test, prior).await? == 0 {
                        return Err(AppError::Conflict(
                            "Quality test changed while it was being updated".to_string(),
                        )
                        .into());
                    }
                }
                Change::Notify(fanout) => {
                    applied.notified += fan_out_notifications(&mut tx, &fanout, at).await? as usize;
                }
                Change::AssignTasks(fanout) => {
                    applied.tasks_created += fan_out_tasks(&mut tx, &fanout, at).await? as usize;
                }
            }
        }

        tx.commit().await?;
        Ok(applied)
    }

    /// Open a read-only snapshot so multi-query projections see one state
    async fn snapshot(&self) -> AppResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn samples_by_id(
        conn: &mut PgConnection,
        ids: Vec<Uuid>,
    ) -> AppResult<HashMap<Uuid, QualitySample>> {
        let rows = sqlx::query_as::<_, SampleRow>(concat!(
            "SELECT ",
            sample_columns!(),
            " FROM quality_samples WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(conn)
        .await?;
        rows.into_iter()
            .map(|row| QualitySample::try_from(row).map(|s| (s.id, s)))
            .collect()
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn apply(&self, changes: ChangeSet) -> AppResult<Applied> {
        let store = self;
        retry_on_code_collision(self.code_retry_attempts, move || {
            store.apply_once(changes.clone())
        })
        .await
    }

    async fn user(&self, id: &str) -> AppResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, role, department, plant_id, is_active FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(UserRecord::try_from)
        .transpose()
    }

    async fn gate_entry(&self, id: Uuid) -> AppResult<Option<GateEntry>> {
        sqlx::query_as::<_, GateEntryRow>(concat!(
            "SELECT ",
            gate_entry_columns!(),
            " FROM gate_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(GateEntry::try_from)
        .transpose()
    }

    async fn gate_entries(&self, status: Option<GateEntryStatus>) -> AppResult<Vec<GateEntry>> {
        let rows = sqlx::query_as::<_, GateEntryRow>(concat!(
            "SELECT ",
            gate_entry_columns!(),
            " FROM gate_entries WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }

    async fn grn(&self, id: Uuid) -> AppResult<Option<GoodsReceiptNote>> {
        sqlx::query_as::<_, GrnRow>(concat!("SELECT ", grn_columns!(), " FROM grns WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(GoodsReceiptNote::try_from)
            .transpose()
    }

    async fn grns(&self) -> AppResult<Vec<GoodsReceiptNote>> {
        let rows = sqlx::query_as::<_, GrnRow>(concat!(
            "SELECT ",
            grn_columns!(),
            " FROM grns ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }

    async fn pending_grns(&self) -> AppResult<Vec<PendingGrnView>> {
        let rows = sqlx::query_as::<_, PendingGrnRow>(
            r#"
            SELECT g.id AS grn_id, g.grn_code, g.entry_code, g.po_number, g.delivery_challan,
                   g.quantity_received, g.remarks, g.status,
                   e.material_name, e.vehicle_number, e.driver_name, e.driver_contact,
                   e.quantity AS gate_quantity, e.uom, e.created_at AS gate_created_at
            FROM grns g
            JOIN gate_entries e ON e.id = g.gate_entry_id
            WHERE g.status = $1
            ORDER BY g.created_at ASC
            "#,
        )
        .bind(GrnStatus::AwaitingQa.as_str())
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }

    async fn sample(&self, id: Uuid) -> AppResult<Option<QualitySample>> {
        sqlx::query_as::<_, SampleRow>(concat!(
            "SELECT ",
            sample_columns!(),
            " FROM quality_samples WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(QualitySample::try_from)
        .transpose()
    }

    async fn samples(&self, filter: SampleFilter) -> AppResult<Vec<SampleView>> {
        let statuses: Vec<String> = filter
            .statuses()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let rows = sqlx::query_as::<_, SampleCountRow>(
            r#"
            SELECT s.id, s.grn_id, s.entry_code, s.product_name, s.batch_number, s.sample_type,
                   s.sample_date, s.due_date, s.status, s.analyst_id, s.priority,
                   s.requested_by, s.requested_by_name, s.qa_notes, s.created_at, s.updated_at,
                   (SELECT COUNT(*) FROM quality_tests t WHERE t.sample_id = s.id) AS test_count
            FROM quality_samples s
            WHERE s.status = ANY($1) AND (s.analyst_id IS NOT NULL) = $2
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(statuses)
        .bind(filter.wants_analyst())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SampleView {
                    sample: QualitySample::try_from(row.sample)?,
                    test_count: row.test_count,
                })
            })
            .collect()
    }

    async fn sample_tests(&self, sample_id: Uuid) -> AppResult<Vec<QualityTest>> {
        let rows = sqlx::query_as::<_, TestRow>(concat!(
            "SELECT ",
            test_columns!(),
            " FROM quality_tests WHERE sample_id = $1 ORDER BY created_at, test_name"
        ))
        .bind(sample_id)
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }

    async fn quality_test(&self, id: Uuid) -> AppResult<Option<QualityTest>> {
        sqlx::query_as::<_, TestRow>(concat!(
            "SELECT ",
            test_columns!(),
            " FROM quality_tests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(QualityTest::try_from)
        .transpose()
    }

    async fn review_items(&self, filter: &ReviewFilter) -> AppResult<Vec<TestReviewItem>> {
        let mut tx = self.snapshot().await?;

        let rows = sqlx::query_as::<_, TestRow>(concat!(
            "SELECT ",
            test_columns!(),
            " FROM quality_tests \
             WHERE status = ANY($1) \
               AND ($2::text IS NULL OR qa_officer_id = $2) \
               AND ($3::bool IS NULL OR (warehouse_action IS NOT NULL) = $3) \
             ORDER BY updated_at DESC"
        ))
        .bind(filter.status_labels())
        .bind(&filter.qa_officer_id)
        .bind(filter.warehouse_recorded)
        .fetch_all(&mut *tx)
        .await?;
        let tests: Vec<QualityTest> = convert_all(rows)?;

        let sample_ids: Vec<Uuid> = tests.iter().map(|t| t.sample_id).collect();
        let samples = Self::samples_by_id(&mut tx, sample_ids).await?;

        let user_ids: Vec<String> = tests
            .iter()
            .flat_map(|t| [&t.assigned_to, &t.reviewed_by, &t.qa_officer_id])
            .filter_map(|id| id.clone())
            .collect();
        let names: HashMap<String, String> =
            sqlx::query_as::<_, (String, String)>("SELECT id, name FROM users WHERE id = ANY($1)")
                .bind(user_ids)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();

        tx.commit().await?;
        Ok(assemble_review_items(tests, &samples, &names))
    }

    async fn assigned_tests(&self, user_id: &str) -> AppResult<Vec<AssignedTest>> {
        let mut tx = self.snapshot().await?;

        let rows = sqlx::query_as::<_, TestRow>(concat!(
            "SELECT ",
            test_columns!(),
            " FROM quality_tests WHERE assigned_to = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        let tests: Vec<QualityTest> = convert_all(rows)?;

        let sample_ids: Vec<Uuid> = tests.iter().map(|t| t.sample_id).collect();
        let samples = Self::samples_by_id(&mut tx, sample_ids).await?;
        tx.commit().await?;

        Ok(tests
            .into_iter()
            .filter_map(|test| {
                let sample = samples.get(&test.sample_id)?.clone();
                Some(AssignedTest { test, sample })
            })
            .collect())
    }

    async fn notifications_for(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, title, message, kind, entity_type, entity_id, is_read, created_at, read_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification".to_string()));
        }
        Ok(())
    }

    async fn tasks_for(&self, user_id: &str) -> AppResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, assigned_to, assigned_by, title, description, status, priority,
                   entity_type, entity_id, created_at
            FROM tasks
            WHERE assigned_to = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        convert_all(rows)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
