use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use super::{MatchPatch, MatchStore, Precondition, SnapshotStream};
use crate::error::MatchError;
use crate::types::{MatchId, MatchRecord};

/// In-memory match store.
///
/// Each record is guarded by its map shard lock, so precondition checks,
/// the patch and the fan-out to subscribers happen as one step per record.
pub struct MemoryMatchStore {
    matches: DashMap<MatchId, StoredMatch>,
    /// When set, every call fails with `StoreUnavailable`.
    unavailable: AtomicBool,
}

struct StoredMatch {
    record: MatchRecord,
    /// Subscribers to notify on every commit.
    watchers: Vec<UnboundedSender<MatchRecord>>,
}

impl StoredMatch {
    fn notify_watchers(&mut self) {
        let record = &self.record;
        self.watchers.retain(|tx| tx.send(record.clone()).is_ok());
    }
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Number of live subscriptions on `id`.
    pub fn subscriber_count(&self, id: MatchId) -> usize {
        self.matches
            .get(&id)
            .map(|stored| stored.watchers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), MatchError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(MatchError::StoreUnavailable {
                reason: "memory store is offline".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

impl Default for MemoryMatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn create(&self, record: MatchRecord) -> Result<MatchId, MatchError> {
        self.check_available()?;
        let id = record.id;
        match self.matches.entry(id) {
            Entry::Occupied(_) => Err(MatchError::precondition(format!(
                "match {id} already exists"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(StoredMatch {
                    record,
                    watchers: Vec::new(),
                });
                tracing::debug!(match_id = %id, "match created");
                Ok(id)
            }
        }
    }

    async fn fetch(&self, id: MatchId) -> Result<MatchRecord, MatchError> {
        self.check_available()?;
        self.matches
            .get(&id)
            .map(|stored| stored.record.clone())
            .ok_or(MatchError::NotFound { match_id: id })
    }

    async fn subscribe(&self, id: MatchId) -> Result<SnapshotStream, MatchError> {
        self.check_available()?;
        let mut stored = self
            .matches
            .get_mut(&id)
            .ok_or(MatchError::NotFound { match_id: id })?;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        // Current snapshot first; the receiver is alive so this cannot fail.
        let _ = tx.send(stored.record.clone());
        stored.watchers.push(tx);
        Ok(Box::pin(
            tokio_stream::wrappers::UnboundedReceiverStream::new(rx),
        ))
    }

    async fn conditional_update(
        &self,
        id: MatchId,
        patch: &MatchPatch,
        preconditions: &[Precondition],
    ) -> Result<MatchRecord, MatchError> {
        self.check_available()?;
        let mut stored = self
            .matches
            .get_mut(&id)
            .ok_or(MatchError::NotFound { match_id: id })?;

        let current = stored.record.status;
        if current.is_terminal() {
            return Err(MatchError::precondition(format!("match {id} is completed")));
        }
        if let Some(failed) = preconditions.iter().find(|p| !p.holds(&stored.record)) {
            tracing::debug!(match_id = %id, precondition = %failed, "conditional update rejected");
            return Err(MatchError::precondition(format!("expected {failed}")));
        }
        if let Some(next) = patch.status {
            if next != current && !current.can_transition_to(next) {
                return Err(MatchError::precondition(format!(
                    "status cannot move from {current} to {next}"
                )));
            }
        }

        patch.apply_to(&mut stored.record);
        stored.record.revision += 1;
        stored.notify_watchers();

        tracing::debug!(
            match_id = %id,
            revision = stored.record.revision,
            status = %stored.record.status,
            "match updated"
        );
        Ok(stored.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchStatus, ParticipantId, TimeControl};
    use chrono::Utc;
    use tokio_stream::StreamExt;

    fn waiting() -> MatchRecord {
        MatchRecord::new(
            MatchId::new(),
            ParticipantId::new(),
            TimeControl::FIVE_MINUTES,
            "start".into(),
            Utc::now(),
        )
    }

    fn join(participant: ParticipantId) -> MatchPatch {
        MatchPatch {
            participant_b: Some(participant),
            status: Some(MatchStatus::Active),
            last_move_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let store = MemoryMatchStore::new();
        let record = waiting();
        let id = store.create(record.clone()).await.unwrap();
        assert_eq!(store.fetch(id).await.unwrap(), record);

        let err = store.create(record).await.unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn fetch_missing_is_not_found() {
        let store = MemoryMatchStore::new();
        let err = store.fetch(MatchId::new()).await.unwrap_err();
        assert!(matches!(err, MatchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_bumps_revision() {
        let store = MemoryMatchStore::new();
        let id = store.create(waiting()).await.unwrap();
        let joined = store
            .conditional_update(
                id,
                &join(ParticipantId::new()),
                &[Precondition::StatusIs(MatchStatus::Waiting)],
            )
            .await
            .unwrap();
        assert_eq!(joined.status, MatchStatus::Active);
        assert_eq!(joined.revision, 1);
    }

    #[tokio::test]
    async fn failed_precondition_writes_nothing() {
        let store = MemoryMatchStore::new();
        let id = store.create(waiting()).await.unwrap();
        let before = store.fetch(id).await.unwrap();

        let err = store
            .conditional_update(
                id,
                &join(ParticipantId::new()),
                &[
                    Precondition::StatusIs(MatchStatus::Waiting),
                    Precondition::MoveCountIs(3),
                ],
            )
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(store.fetch(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn status_never_moves_backwards() {
        let store = MemoryMatchStore::new();
        let id = store.create(waiting()).await.unwrap();
        let skip = MatchPatch {
            status: Some(MatchStatus::Completed),
            ..Default::default()
        };
        let err = store.conditional_update(id, &skip, &[]).await.unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(store.fetch(id).await.unwrap().status, MatchStatus::Waiting);
    }

    #[tokio::test]
    async fn completed_records_are_frozen() {
        let store = MemoryMatchStore::new();
        let id = store.create(waiting()).await.unwrap();
        store
            .conditional_update(id, &join(ParticipantId::new()), &[])
            .await
            .unwrap();
        let finish = MatchPatch {
            status: Some(MatchStatus::Completed),
            ..Default::default()
        };
        store.conditional_update(id, &finish, &[]).await.unwrap();

        let err = store
            .conditional_update(
                id,
                &MatchPatch {
                    position: Some("tampered".into()),
                    ..Default::default()
                },
                &[],
            )
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn subscribe_emits_current_then_commits() {
        let store = MemoryMatchStore::new();
        let id = store.create(waiting()).await.unwrap();
        let mut stream = store.subscribe(id).await.unwrap();

        let first = stream.next().await.unwrap();
        assert_eq!(first.status, MatchStatus::Waiting);

        store
            .conditional_update(id, &join(ParticipantId::new()), &[])
            .await
            .unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(second.status, MatchStatus::Active);
        assert_eq!(second.revision, 1);
    }

    #[tokio::test]
    async fn dropped_subscription_is_released() {
        let store = MemoryMatchStore::new();
        let id = store.create(waiting()).await.unwrap();
        let stream = store.subscribe(id).await.unwrap();
        assert_eq!(store.subscriber_count(id), 1);
        drop(stream);
        assert_eq!(store.subscriber_count(id), 0);
    }

    #[tokio::test]
    async fn outage_is_retryable() {
        let store = MemoryMatchStore::new();
        let id = store.create(waiting()).await.unwrap();
        store.set_unavailable(true);
        let err = store.fetch(id).await.unwrap_err();
        assert!(err.is_retryable());
        store.set_unavailable(false);
        assert!(store.fetch(id).await.is_ok());
    }
}
