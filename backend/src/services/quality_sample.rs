//! Quality sample service
//!
//! Raises sampling requests from GRNs, assigns samples to analysts and adds
//! ad-hoc tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use shared::{
    validate_new_tests, Actor, AssignSampleInput, CreateTestInput, EntityKind, EntityRef,
    GateEntryStatus, GrnStatus, Operation, QualitySample, QualityTest, RequestSamplingInput, Role,
    SampleFilter, SampleGuard, SamplePatch, SampleStatus, SampleView, View,
    SAMPLING_REQUIRES_GRN_STATUS,
};
use uuid::Uuid;

use super::{active_user, authorization};
use crate::config::WorkflowConfig;
use crate::error::{AppError, AppResult};
use crate::store::{Change, ChangeSet, Fanout, WorkflowStore};

/// Sample type recorded on samples raised from a GRN
const RAW_MATERIAL: &str = "Raw Material";

/// Quality sample service
#[derive(Clone)]
pub struct QualitySampleService {
    store: Arc<dyn WorkflowStore>,
    workflow: WorkflowConfig,
}

impl QualitySampleService {
    pub fn new(store: Arc<dyn WorkflowStore>, workflow: WorkflowConfig) -> Self {
        Self { store, workflow }
    }

    /// QA asks QC to sample a received GRN.
    ///
    /// Creates one pending sample carrying the default test battery and moves
    /// both the GRN and its gate entry to `Sampling Requested`.
    pub async fn request_sampling(
        &self,
        actor: &Actor,
        grn_id: Uuid,
        input: RequestSamplingInput,
    ) -> AppResult<QualitySample> {
        authorization::require(actor, Operation::RequestSampling)?;

        let grn = self
            .store
            .grn(grn_id)
            .await?
            .ok_or_else(|| AppError::NotFound("GRN".to_string()))?;

        if grn.status != SAMPLING_REQUIRES_GRN_STATUS {
            tracing::warn!("Sampling refused for GRN {}: status is '{}'", grn.grn_code, grn.status.as_str());
            return Err(AppError::Conflict(format!(
                "GRN {} is '{}'; sampling can only be requested while it is '{}'",
                grn.grn_code,
                grn.status.as_str(),
                SAMPLING_REQUIRES_GRN_STATUS.as_str()
            )));
        }

        let entry = self
            .store
            .gate_entry(grn.gate_entry_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gate entry".to_string()))?;

        let now = Utc::now();
        let sample_date = now.date_naive();
        let sample = QualitySample {
            id: Uuid::new_v4(),
            grn_id: Some(grn.id),
            entry_code: grn.entry_code.clone(),
            product_name: entry.material_name.clone(),
            batch_number: grn.grn_code.clone(),
            sample_type: RAW_MATERIAL.to_string(),
            sample_date,
            due_date: sample_date + Duration::days(self.workflow.sample_due_days),
            status: SampleStatus::Pending,
            analyst_id: None,
            priority: input.priority.unwrap_or_default(),
            requested_by: actor.id.clone(),
            requested_by_name: actor.name.clone(),
            qa_notes: input.qa_notes.clone(),
            created_at: now,
            updated_at: now,
        };
        let tests = QualityTest::default_battery(sample.id, now);
        let sample_id = sample.id;

        let changes = ChangeSet::new(now)
            .push(Change::AdvanceGrn {
                id: grn.id,
                expected: SAMPLING_REQUIRES_GRN_STATUS,
                next: GrnStatus::SamplingRequested,
                qa_notes: input.qa_notes,
            })
            .push(Change::AdvanceGateEntry {
                id: entry.id,
                expected: GateEntryStatus::AwaitingQa,
                next: GateEntryStatus::SamplingRequested,
            })
            .push(Change::InsertSample(sample))
            .push(Change::InsertTests(tests))
            .push(Change::Notify(
                Fanout::to_role(
                    Role::QcManager,
                    "New sample awaiting assignment",
                    format!(
                        "QA requested sampling of {} (GRN {})",
                        entry.material_name, grn.grn_code
                    ),
                )
                .about(EntityRef::new(EntityKind::QualitySample, sample_id))
                .sent_by(&actor.id),
            ));

        self.store.apply(changes).await?;
        tracing::info!(
            "Sampling requested on GRN {} by {}: sample {} created",
            grn.grn_code,
            actor.id,
            sample_id
        );

        self.load(sample_id).await
    }

    /// Assign a sample to its analyst; the first assignment wins
    pub async fn assign_sample(
        &self,
        actor: &Actor,
        sample_id: Uuid,
        input: AssignSampleInput,
    ) -> AppResult<QualitySample> {
        authorization::require(actor, Operation::AssignSample)?;
        shared::validate_user_ref("analyst_id", &input.analyst_id)?;

        let sample = self.load(sample_id).await?;
        let guard = SampleGuard::unassigned();
        if !guard.admits(&sample) {
            return Err(AppError::Conflict(
                "Sample is already assigned to an analyst".to_string(),
            ));
        }
        active_user(self.store.as_ref(), "analyst_id", &input.analyst_id).await?;

        let changes = ChangeSet::new(Utc::now()).push(Change::UpdateSample {
            id: sample_id,
            guard,
            patch: SamplePatch::Assign {
                analyst_id: input.analyst_id.clone(),
            },
        });
        self.store.apply(changes).await?;
        tracing::info!("Sample {} assigned to {}", sample_id, input.analyst_id);

        self.load(sample_id).await
    }

    /// Add ad-hoc tests to an existing sample
    pub async fn create_tests(
        &self,
        actor: &Actor,
        sample_id: Uuid,
        tests: Vec<CreateTestInput>,
    ) -> AppResult<Vec<QualityTest>> {
        authorization::require(actor, Operation::CreateTests)?;
        validate_new_tests(&tests)?;
        self.load(sample_id).await?;

        let now = Utc::now();
        let created: Vec<QualityTest> = tests
            .into_iter()
            .map(|t| QualityTest::new(sample_id, t.test_name.trim(), t.method, now))
            .collect();

        self.store
            .apply(ChangeSet::new(now).push(Change::InsertTests(created.clone())))
            .await?;
        tracing::info!("{} tests added to sample {}", created.len(), sample_id);

        Ok(created)
    }

    pub async fn get_sample(&self, actor: &Actor, sample_id: Uuid) -> AppResult<QualitySample> {
        authorization::require_view(actor, View::SampleTests)?;
        self.load(sample_id).await
    }

    pub async fn unassigned_samples(&self, actor: &Actor) -> AppResult<Vec<SampleView>> {
        authorization::require_view(actor, View::Samples)?;
        self.store.samples(SampleFilter::Unassigned).await
    }

    pub async fn assigned_samples(&self, actor: &Actor) -> AppResult<Vec<SampleView>> {
        authorization::require_view(actor, View::Samples)?;
        self.store.samples(SampleFilter::Assigned).await
    }

    /// Tests of one sample in creation order
    pub async fn sample_tests(&self, actor: &Actor, sample_id: Uuid) -> AppResult<Vec<QualityTest>> {
        authorization::require_view(actor, View::SampleTests)?;
        self.load(sample_id).await?;
        self.store.sample_tests(sample_id).await
    }

    async fn load(&self, sample_id: Uuid) -> AppResult<QualitySample> {
        self.store
            .sample(sample_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quality sample".to_string()))
    }
}
