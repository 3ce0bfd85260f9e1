//! Pending action store logic over a pluggable backend

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PendingStoreError;

use super::{ActionStatus, NewPendingAction, PendingAction, PendingFilter, ResolveOutcome};

/// Durable record store: point lookup, filtered scan, conditional update
#[async_trait]
pub trait PendingActionBackend: Send + Sync {
    async fn insert(&self, action: &PendingAction) -> Result<(), PendingStoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<PendingAction>, PendingStoreError>;

    async fn scan(&self, filter: &PendingFilter) -> Result<Vec<PendingAction>, PendingStoreError>;

    /// Replace the record only if its stored status is still `expected`.
    /// Returns whether the write happened.
    async fn compare_and_set(
        &self,
        expected: ActionStatus,
        updated: &PendingAction,
    ) -> Result<bool, PendingStoreError>;

    /// Delete terminal records whose last transition is older than `cutoff`.
    /// Returns how many were removed.
    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>)
        -> Result<usize, PendingStoreError>;
}

/// Wall clock at the precision every backend stores (microseconds)
fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The store the engine talks to; cheap to clone
#[derive(Clone)]
pub struct PendingActionStore {
    backend: Arc<dyn PendingActionBackend>,
    default_ttl: chrono::Duration,
}

impl PendingActionStore {
    pub fn new(backend: Arc<dyn PendingActionBackend>, default_ttl: chrono::Duration) -> Self {
        Self {
            backend,
            default_ttl,
        }
    }

    /// In-memory store with the given default TTL
    pub fn in_memory(default_ttl: chrono::Duration) -> Self {
        Self::new(Arc::new(super::InMemoryPendingBackend::new()), default_ttl)
    }

    pub fn default_ttl(&self) -> chrono::Duration {
        self.default_ttl
    }

    pub async fn create(&self, new: NewPendingAction) -> Result<PendingAction, PendingStoreError> {
        let now = stored_now();
        let ttl = new
            .ttl
            .filter(|ttl| *ttl >= chrono::Duration::zero())
            .unwrap_or(self.default_ttl);
        let expires_at = now.checked_add_signed(ttl).unwrap_or_else(|| {
            tracing::warn!(ttl_secs = ttl.num_seconds(), "Pending TTL overflows, clamping expiry");
            DateTime::<Utc>::MAX_UTC
        });
        let action = PendingAction {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            user_id: new.user_id,
            user_role: new.user_role,
            action_type: new.action_type,
            tool_name: new.tool_name,
            params: new.params,
            confirmation_message: new.confirmation_message,
            status: ActionStatus::Pending,
            created_at: now,
            expires_at,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
            executed_at: None,
            resume: new.resume,
        };
        self.backend.insert(&action).await?;
        tracing::info!(
            action_id = %action.id,
            session_id = %action.session_id,
            action_type = %action.action_type,
            expires_at = %action.expires_at,
            "Created pending action"
        );
        Ok(action)
    }

    /// Point lookup; a stale PENDING record is expired before it is returned
    pub async fn get(&self, id: Uuid) -> Result<Option<PendingAction>, PendingStoreError> {
        match self.backend.fetch(id).await? {
            Some(action) => Ok(Some(self.expire_if_stale(action, stored_now()).await?)),
            None => Ok(None),
        }
    }

    /// Matching actions, newest first, with stale entries already expired
    pub async fn list(&self, filter: &PendingFilter) -> Result<Vec<PendingAction>, PendingStoreError> {
        // Scan without the status filter: lazy expiry can change it
        let scan_filter = PendingFilter {
            status: None,
            ..filter.clone()
        };
        let now = stored_now();
        let mut actions = Vec::new();
        for action in self.backend.scan(&scan_filter).await? {
            let action = self.expire_if_stale(action, now).await?;
            if filter.matches(&action) {
                actions.push(action);
            }
        }
        actions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(actions)
    }

    /// Newest action still stored as PENDING, stale or not.
    /// Resolving a stale one reports `Expired`, so a late "yes" is answered as such.
    pub async fn latest_unresolved(
        &self,
        session_id: &str,
    ) -> Result<Option<PendingAction>, PendingStoreError> {
        let filter = PendingFilter::session(session_id).with_status(ActionStatus::Pending);
        Ok(self
            .backend
            .scan(&filter)
            .await?
            .into_iter()
            .max_by_key(|a| a.created_at))
    }

    pub async fn approve(
        &self,
        id: Uuid,
        approver: &str,
        note: Option<&str>,
    ) -> Result<ResolveOutcome, PendingStoreError> {
        self.resolve(id, ActionStatus::Approved, approver, note).await
    }

    pub async fn reject(
        &self,
        id: Uuid,
        rejecter: &str,
        note: Option<&str>,
    ) -> Result<ResolveOutcome, PendingStoreError> {
        self.resolve(id, ActionStatus::Rejected, rejecter, note).await
    }

    /// Record the result of running an approved action
    pub async fn mark_executed(
        &self,
        id: Uuid,
        success: bool,
        note: Option<&str>,
    ) -> Result<ResolveOutcome, PendingStoreError> {
        let Some(current) = self.backend.fetch(id).await? else {
            return Ok(ResolveOutcome::NotFound);
        };
        match current.status {
            ActionStatus::Approved => {}
            ActionStatus::Executed | ActionStatus::Failed => {
                return Ok(ResolveOutcome::AlreadyResolved(current))
            }
            _ => return Ok(ResolveOutcome::InvalidTransition(current)),
        }

        let target = if success {
            ActionStatus::Executed
        } else {
            ActionStatus::Failed
        };
        let updated = current.transitioned(target, stored_now(), None, note);
        if self
            .backend
            .compare_and_set(ActionStatus::Approved, &updated)
            .await?
        {
            tracing::info!(action_id = %id, status = %target, "Pending action executed");
            Ok(ResolveOutcome::Applied(updated))
        } else {
            self.observe_winner(id).await
        }
    }

    /// Flip every stale PENDING action to EXPIRED; returns how many this call flipped
    pub async fn sweep_expired(&self) -> Result<usize, PendingStoreError> {
        let filter = PendingFilter {
            status: Some(ActionStatus::Pending),
            ..PendingFilter::default()
        };
        let now = stored_now();
        let mut expired = 0;
        for action in self.backend.scan(&filter).await? {
            if action.is_stale(now) && self.try_expire(&action, now).await? {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(count = expired, "Expired stale pending actions");
        }
        Ok(expired)
    }

    /// Drop terminal actions resolved more than `older_than` ago; APPROVED
    /// records are kept until their execution is recorded
    pub async fn purge_resolved(
        &self,
        older_than: chrono::Duration,
    ) -> Result<usize, PendingStoreError> {
        let cutoff = stored_now()
            .checked_sub_signed(older_than)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let purged = self.backend.delete_resolved_before(cutoff).await?;
        if purged > 0 {
            tracing::info!(count = purged, cutoff = %cutoff, "Purged resolved pending actions");
        }
        Ok(purged)
    }

    async fn resolve(
        &self,
        id: Uuid,
        target: ActionStatus,
        actor: &str,
        note: Option<&str>,
    ) -> Result<ResolveOutcome, PendingStoreError> {
        let Some(current) = self.backend.fetch(id).await? else {
            return Ok(ResolveOutcome::NotFound);
        };
        if current.status != ActionStatus::Pending {
            return Ok(Self::classify_existing(current));
        }

        let now = stored_now();
        if current.is_past_expiry(now) {
            let expired = self.expire_if_stale(current, now).await?;
            return Ok(Self::classify_existing(expired));
        }

        let updated = current.transitioned(target, now, Some(actor), note);
        if self
            .backend
            .compare_and_set(ActionStatus::Pending, &updated)
            .await?
        {
            tracing::info!(
                action_id = %id,
                status = %target,
                actor = actor,
                "Pending action resolved"
            );
            Ok(ResolveOutcome::Applied(updated))
        } else {
            self.observe_winner(id).await
        }
    }

    /// Report the record a concurrent writer left behind
    async fn observe_winner(&self, id: Uuid) -> Result<ResolveOutcome, PendingStoreError> {
        tracing::debug!(action_id = %id, "Lost resolution race, returning winner");
        Ok(match self.backend.fetch(id).await? {
            Some(winner) => Self::classify_existing(winner),
            None => ResolveOutcome::NotFound,
        })
    }

    fn classify_existing(action: PendingAction) -> ResolveOutcome {
        match action.status {
            ActionStatus::Expired => ResolveOutcome::Expired(action),
            _ => ResolveOutcome::AlreadyResolved(action),
        }
    }

    async fn try_expire(
        &self,
        action: &PendingAction,
        now: DateTime<Utc>,
    ) -> Result<bool, PendingStoreError> {
        let expired = action.transitioned(ActionStatus::Expired, now, None, Some("ttl elapsed"));
        self.backend
            .compare_and_set(ActionStatus::Pending, &expired)
            .await
    }

    async fn expire_if_stale(
        &self,
        action: PendingAction,
        now: DateTime<Utc>,
    ) -> Result<PendingAction, PendingStoreError> {
        if !action.is_stale(now) {
            return Ok(action);
        }
        if self.try_expire(&action, now).await? {
            tracing::debug!(action_id = %action.id, "Pending action expired on read");
        }
        // Whoever won, the stored record is now authoritative
        Ok(self.backend.fetch(action.id).await?.unwrap_or(action))
    }
}
