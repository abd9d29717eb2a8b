//! In-app notifications and tasks produced by the workflow fan-outs

use std::sync::Arc;

use chrono::Utc;
use shared::{Actor, Notification, Task};
use uuid::Uuid;

use crate::error::AppResult;
use crate::store::WorkflowStore;

/// Notification service for the current user's inbox
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn WorkflowStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Newest first
    pub async fn notifications(&self, actor: &Actor) -> AppResult<Vec<Notification>> {
        self.store.notifications_for(&actor.id).await
    }

    pub async fn unread_count(&self, actor: &Actor) -> AppResult<usize> {
        let notifications = self.store.notifications_for(&actor.id).await?;
        Ok(notifications.iter().filter(|n| !n.is_read).count())
    }

    /// Mark one of the actor's notifications read; other users' are NotFound
    pub async fn mark_read(&self, actor: &Actor, notification_id: Uuid) -> AppResult<()> {
        self.store
            .mark_notification_read(&actor.id, notification_id, Utc::now())
            .await?;
        tracing::debug!("Notification {} read by {}", notification_id, actor.id);
        Ok(())
    }

    pub async fn tasks(&self, actor: &Actor) -> AppResult<Vec<Task>> {
        self.store.tasks_for(&actor.id).await
    }
}
