//! Role-scoped test worklists
//!
//! Each listing is a single store projection and never mutates.

use std::sync::Arc;

use shared::{
    Actor, AssignedTest, ReviewBucket, ReviewFilter, ReviewStage, TestReviewItem, View,
};

use super::authorization;
use crate::error::AppResult;
use crate::store::WorkflowStore;

#[derive(Clone)]
pub struct WorklistService {
    store: Arc<dyn WorkflowStore>,
}

impl WorklistService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Tests awaiting, or already handled by, the given review stage.
    /// The QA officer stage only sees tests assigned to the actor.
    pub async fn tests_for_review(
        &self,
        actor: &Actor,
        stage: ReviewStage,
        bucket: ReviewBucket,
    ) -> AppResult<Vec<TestReviewItem>> {
        authorization::require_view(actor, View::Review(stage))?;

        let filter = ReviewFilter::for_stage(stage, bucket, &actor.id);
        let items = self.store.review_items(&filter).await?;
        tracing::debug!(
            "Review worklist {:?}/{:?} for {}: {} items",
            stage,
            bucket,
            actor.id,
            items.len()
        );
        Ok(items)
    }

    /// Disposed tests whose warehouse action is pending or recorded
    pub async fn warehouse_decisions(
        &self,
        actor: &Actor,
        bucket: ReviewBucket,
    ) -> AppResult<Vec<TestReviewItem>> {
        authorization::require_view(actor, View::WarehouseDecisions)?;
        self.store.review_items(&ReviewFilter::warehouse(bucket)).await
    }

    pub async fn my_tests(&self, actor: &Actor) -> AppResult<Vec<AssignedTest>> {
        authorization::require_view(actor, View::MyTests)?;
        self.store.assigned_tests(&actor.id).await
    }
}
