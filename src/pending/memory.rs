//! In-memory pending action backend
//!
//! Same observable behavior as the durable backend; used when no database is
//! configured and in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PendingStoreError;

use super::store::PendingActionBackend;
use super::{ActionStatus, PendingAction, PendingFilter};

#[derive(Debug, Default, Clone)]
pub struct InMemoryPendingBackend {
    actions: Arc<RwLock<HashMap<Uuid, PendingAction>>>,
}

impl InMemoryPendingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.actions.read().await.len()
    }
}

#[async_trait]
impl PendingActionBackend for InMemoryPendingBackend {
    async fn insert(&self, action: &PendingAction) -> Result<(), PendingStoreError> {
        let mut actions = self.actions.write().await;
        if actions.contains_key(&action.id) {
            return Err(PendingStoreError::Backend(format!(
                "duplicate pending action id {}",
                action.id
            )));
        }
        actions.insert(action.id, action.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<PendingAction>, PendingStoreError> {
        Ok(self.actions.read().await.get(&id).cloned())
    }

    async fn scan(&self, filter: &PendingFilter) -> Result<Vec<PendingAction>, PendingStoreError> {
        let actions = self.actions.read().await;
        Ok(actions
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn compare_and_set(
        &self,
        expected: ActionStatus,
        updated: &PendingAction,
    ) -> Result<bool, PendingStoreError> {
        // Check and write under one write guard
        let mut actions = self.actions.write().await;
        match actions.get_mut(&updated.id) {
            Some(current) if current.status == expected => {
                *current = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_resolved_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, PendingStoreError> {
        let mut actions = self.actions.write().await;
        let before = actions.len();
        actions.retain(|_, a| !(a.status.is_terminal() && a.last_transition_at() < cutoff));
        Ok(before - actions.len())
    }
}
