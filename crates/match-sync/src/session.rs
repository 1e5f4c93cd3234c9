//! A participant's live view of one match.
//!
//! A [`MatchSession`] owns the snapshot subscription and the display timer
//! for one participant. Both run as background tasks bound to a
//! cancellation token that is cancelled on [`MatchSession::close`] and on
//! drop, so leaving a match always releases them.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::clock::{ClockView, LocalClock};
use crate::controller::MatchController;
use crate::error::{MatchError, Rejection};
use crate::premove::{Premove, PremoveQueue};
use crate::store::SnapshotStream;
use crate::types::{Color, LegalMove, MatchId, MatchRecord, ParticipantId, Square};

/// One participant's connection to a match.
pub struct MatchSession {
    inner: Arc<SessionInner>,
    updates: watch::Receiver<MatchRecord>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

struct SessionInner {
    controller: MatchController,
    participant: ParticipantId,
    state: Mutex<SessionState>,
    updates: watch::Sender<MatchRecord>,
}

struct SessionState {
    latest: MatchRecord,
    clock: LocalClock,
    premove: PremoveQueue,
    /// Revision a timeout claim was last sent for.
    claimed: Option<u64>,
}

impl MatchSession {
    /// Subscribe to `match_id` as `participant` and start the display timer.
    #[instrument(skip(controller))]
    pub async fn open(
        controller: MatchController,
        match_id: MatchId,
        participant: ParticipantId,
    ) -> Result<Self, MatchError> {
        let mut stream = controller.store().subscribe(match_id).await?;
        let first = stream.next().await.ok_or_else(|| MatchError::StoreUnavailable {
            reason: format!("subscription to {match_id} closed before the first snapshot"),
            source: None,
        })?;

        let mut premove = PremoveQueue::new(participant);
        premove.observe(&first);
        let clock = LocalClock::new(controller.clock(), &first, controller.now());
        let (tx, rx) = watch::channel(first.clone());

        let inner = Arc::new(SessionInner {
            controller,
            participant,
            state: Mutex::new(SessionState {
                latest: first,
                clock,
                premove,
                claimed: None,
            }),
            updates: tx,
        });

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(Arc::clone(&inner).run_snapshots(stream, cancel.clone())),
            tokio::spawn(Arc::clone(&inner).run_ticker(cancel.clone())),
        ];
        tracing::debug!(%match_id, %participant, "session opened");

        Ok(Self {
            inner,
            updates: rx,
            cancel,
            tasks,
        })
    }

    pub fn participant(&self) -> ParticipantId {
        self.inner.participant
    }

    pub fn match_id(&self) -> MatchId {
        self.inner.state.lock().latest.id
    }

    /// The newest snapshot received.
    pub fn snapshot(&self) -> MatchRecord {
        self.inner.state.lock().latest.clone()
    }

    /// The color this participant plays, once seated.
    pub fn color(&self) -> Option<Color> {
        self.inner.state.lock().latest.color_of(self.inner.participant)
    }

    /// Receiver that observes every accepted snapshot.
    pub fn updates(&self) -> watch::Receiver<MatchRecord> {
        self.updates.clone()
    }

    /// Displayed clocks as of the last tick or snapshot.
    pub fn clock(&self) -> ClockView {
        self.inner.state.lock().clock.view()
    }

    pub fn queued_premove(&self) -> Option<Premove> {
        self.inner.state.lock().premove.peek()
    }

    pub fn legal_moves(&self) -> Result<Vec<LegalMove>, MatchError> {
        self.inner.controller.legal_moves(&self.snapshot())
    }

    /// Play `from -> to`, or queue it as a premove if it is the opponent's
    /// turn.
    ///
    /// Returns `true` if the move was committed. A queued premove or a move
    /// rejected locally returns `false`.
    pub async fn submit_move(&self, from: Square, to: Square) -> Result<bool, MatchError> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            let snapshot = state.latest.clone();
            let holder = snapshot.color_of(self.inner.participant);
            if snapshot.is_active() && holder.is_some_and(|c| c != snapshot.side_to_move()) {
                if let Err(rejection) = state.premove.queue(&snapshot, from, to) {
                    tracing::debug!(%rejection, "premove not queued");
                }
                return Ok(false);
            }
            state.premove.clear();
            snapshot
        };

        match self
            .inner
            .controller
            .apply_move(&snapshot, self.inner.participant, from, to)
            .await
        {
            Ok(_) => Ok(true),
            Err(MatchError::Validation(rejection)) => {
                tracing::debug!(%rejection, "move rejected");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn resign(&self) -> Result<MatchRecord, MatchError> {
        self.inner
            .controller
            .resign(&self.snapshot(), self.inner.participant)
            .await
    }

    pub async fn offer_draw(&self) -> Result<MatchRecord, MatchError> {
        self.inner
            .controller
            .offer_draw(&self.snapshot(), self.inner.participant)
            .await
    }

    pub async fn respond_draw(&self, accept: bool) -> Result<MatchRecord, MatchError> {
        self.inner
            .controller
            .respond_draw(&self.snapshot(), self.inner.participant, accept)
            .await
    }

    pub async fn cancel_draw(&self) -> Result<MatchRecord, MatchError> {
        self.inner
            .controller
            .cancel_draw(&self.snapshot(), self.inner.participant)
            .await
    }

    pub async fn request_takeback(&self) -> Result<MatchRecord, MatchError> {
        self.inner
            .controller
            .request_takeback(&self.snapshot(), self.inner.participant)
            .await
    }

    pub async fn respond_takeback(&self, accept: bool) -> Result<MatchRecord, MatchError> {
        self.inner
            .controller
            .respond_takeback(&self.snapshot(), self.inner.participant, accept)
            .await
    }

    pub async fn cancel_takeback(&self) -> Result<MatchRecord, MatchError> {
        self.inner
            .controller
            .cancel_takeback(&self.snapshot(), self.inner.participant)
            .await
    }

    /// Wait until a snapshot satisfies `predicate`, returning it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<MatchRecord, MatchError>
    where
        F: FnMut(&MatchRecord) -> bool,
    {
        let mut updates = self.updates.clone();
        let record = updates
            .wait_for(|record| predicate(record))
            .await
            .map_err(|e| MatchError::StoreUnavailable {
                reason: "session closed".to_string(),
                source: Some(Box::new(e)),
            })?;
        Ok(record.clone())
    }

    /// Stop the background tasks and release the subscription.
    pub async fn close(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for MatchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SessionInner {
    async fn run_snapshots(self: Arc<Self>, mut stream: SnapshotStream, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => {
                    let Some(record) = next else { break };
                    self.on_snapshot(record).await;
                }
            }
        }
        tracing::debug!(participant = %self.participant, "snapshot loop stopped");
    }

    async fn on_snapshot(&self, record: MatchRecord) {
        let premove = {
            let mut state = self.state.lock();
            if record.revision <= state.latest.revision {
                return;
            }
            state.clock.sync(&record, self.controller.now());
            let premove = state.premove.observe(&record);
            state.latest = record.clone();
            premove
        };
        self.updates.send_replace(record.clone());

        if let Some(premove) = premove {
            match self
                .controller
                .apply_move(&record, self.participant, premove.from, premove.to)
                .await
            {
                Ok(_) => tracing::debug!(from = %premove.from, to = %premove.to, "premove played"),
                Err(err) => tracing::debug!(error = %err, "premove discarded"),
            }
        }
    }

    async fn run_ticker(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.controller.config().tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.on_tick().await,
            }
        }
    }

    async fn on_tick(&self) {
        let claim = {
            let mut state = self.state.lock();
            let view = state.clock.tick(self.controller.now());
            let revision = state.latest.revision;
            if self.controller.config().flag_fall
                && view.flagged().is_some()
                && state.claimed != Some(revision)
            {
                state.claimed = Some(revision);
                Some(state.latest.clone())
            } else {
                None
            }
        };
        let Some(snapshot) = claim else { return };

        match self.controller.claim_timeout(&snapshot).await {
            Ok(record) => {
                tracing::info!(match_id = %record.id, revision = record.revision, "flag fell");
            }
            Err(err)
                if err.is_precondition_failed()
                    || err.rejection() == Some(&Rejection::ClockNotExpired) =>
            {
                tracing::debug!(error = %err, "timeout claim not applied");
            }
            Err(err) => {
                if err.is_retryable() {
                    self.state.lock().claimed = None;
                }
                tracing::warn!(error = %err, "timeout claim failed");
            }
        }
    }
}

impl std::fmt::Debug for MatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSession")
            .field("participant", &self.inner.participant)
            .finish_non_exhaustive()
    }
}
