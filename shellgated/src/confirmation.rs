// ABOUTME: stores at most one pending confirmation per actor with lazy ttl expiry.
// ABOUTME: every read-modify-write happens under one lock so concurrent submits cannot both win.

use std::collections::HashMap;
use std::time::Duration;

use shellgate_common::{PendingSummary, Source};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ConfirmationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub command: String,
    pub created_at: Instant,
    pub reason: String,
    pub source: Source,
    /// Routes post-decision notifications; empty when the request carried none.
    pub correlation_id: String,
}

impl PendingConfirmation {
    pub fn new(
        command: impl Into<String>,
        reason: impl Into<String>,
        source: Source,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            created_at: Instant::now(),
            reason: reason.into(),
            source,
            correlation_id: correlation_id.into(),
        }
    }

    /// Expired strictly after `created_at + ttl`.
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }

    pub fn summary(&self, ttl: Duration) -> PendingSummary {
        let remaining = ttl.saturating_sub(self.created_at.elapsed());
        PendingSummary {
            command: self.command.clone(),
            reason: self.reason.clone(),
            source: self.source,
            expires_in_secs: remaining.as_secs(),
        }
    }
}

pub struct ConfirmationStore {
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl ConfirmationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Inserts unless the actor already has a live entry; never overwrites one.
    pub async fn put(&self, actor: &str, confirmation: PendingConfirmation) -> Result<(), ConfirmationError> {
        let mut pending = self.pending.lock().await;
        if let Some(existing) = pending.get(actor) {
            if !existing.is_expired(self.ttl, Instant::now()) {
                return Err(ConfirmationError::Conflict {
                    existing: existing.clone(),
                });
            }
            tracing::debug!(actor, "replacing expired confirmation");
        }
        pending.insert(actor.to_string(), confirmation);
        Ok(())
    }

    pub async fn get(&self, actor: &str) -> Option<PendingConfirmation> {
        let mut pending = self.pending.lock().await;
        match pending.get(actor) {
            Some(entry) if entry.is_expired(self.ttl, Instant::now()) => {
                pending.remove(actor);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    pub async fn remove(&self, actor: &str) -> Option<PendingConfirmation> {
        self.take(actor).await.ok()
    }

    /// Pops the actor's entry, telling an expired entry apart from a missing one.
    /// Either way the slot is empty afterwards.
    pub async fn take(&self, actor: &str) -> Result<PendingConfirmation, ConfirmationError> {
        let mut pending = self.pending.lock().await;
        match pending.remove(actor) {
            Some(entry) if entry.is_expired(self.ttl, Instant::now()) => Err(ConfirmationError::Expired),
            Some(entry) => Ok(entry),
            None => Err(ConfirmationError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pending(command: &str) -> PendingConfirmation {
        PendingConfirmation::new(command, "blacklist: `rm`", Source::User, "")
    }

    #[tokio::test(start_paused = true)]
    async fn put_never_overwrites_a_live_entry() {
        let store = ConfirmationStore::new(Duration::from_secs(300));
        store.put("alice", pending("rm a")).await.unwrap();
        let original = store.get("alice").await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        match store.put("alice", pending("rm b")).await {
            Err(ConfirmationError::Conflict { existing }) => assert_eq!(existing, original),
            other => panic!("unexpected result {other:?}"),
        }

        let kept = store.get("alice").await.unwrap();
        assert_eq!(kept.command, "rm a");
        assert_eq!(kept.created_at, original.created_at);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_are_per_actor() {
        let store = ConfirmationStore::new(Duration::from_secs(300));
        store.put("alice", pending("rm a")).await.unwrap();
        store.put("bob", pending("rm b")).await.unwrap();
        assert_eq!(store.take("bob").await.unwrap().command, "rm b");
        assert_eq!(store.get("alice").await.unwrap().command, "rm a");
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_strictly_after_ttl() {
        let store = ConfirmationStore::new(Duration::from_secs(300));
        store.put("alice", pending("rm a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(store.get("alice").await.is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(store.get("alice").await.is_none());
        assert!(matches!(store.take("alice").await, Err(ConfirmationError::NotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn take_reports_expired_and_clears_the_slot() {
        let store = ConfirmationStore::new(Duration::from_secs(5));
        store.put("alice", pending("rm a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(matches!(store.take("alice").await, Err(ConfirmationError::Expired)));
        assert!(matches!(store.take("alice").await, Err(ConfirmationError::NotFound)));
        store.put("alice", pending("rm b")).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_can_be_replaced() {
        let store = ConfirmationStore::new(Duration::from_secs(5));
        store.put("alice", pending("rm a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        store.put("alice", pending("rm b")).await.unwrap();
        assert_eq!(store.remove("alice").await.unwrap().command, "rm b");
        assert!(store.remove("alice").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_puts_for_one_actor_admit_exactly_one() {
        let store = Arc::new(ConfirmationStore::new(Duration::from_secs(300)));
        let mut tasks = Vec::new();
        for i in 0..32u32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.put("alice", pending(&format!("rm {i}"))).await.is_ok()
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
