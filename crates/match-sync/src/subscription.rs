use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::store::SnapshotStream;
use crate::types::{MatchId, MatchRecord};

/// Keeps a snapshot subscription alive.
///
/// The subscription is released when the guard is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called, whichever comes first.
pub struct SubscriptionGuard {
    match_id: MatchId,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SubscriptionGuard {
    /// Forward every newer snapshot from `stream` to `callback` until
    /// cancelled or the stream ends.
    pub(crate) fn spawn<F>(match_id: MatchId, mut stream: SnapshotStream, mut callback: F) -> Self
    where
        F: FnMut(MatchRecord) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut revision = None;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = stream.next() => {
                        let Some(record) = next else { break };
                        if revision.is_some_and(|seen| record.revision <= seen) {
                            continue;
                        }
                        revision = Some(record.revision);
                        callback(record);
                    }
                }
            }
            tracing::debug!(match_id = %match_id, "subscription released");
        });
        Self {
            match_id,
            cancel,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub const fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Returns `true` while snapshots are still being delivered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Release the subscription and wait for the delivery task to stop.
    ///
    /// The callback is never invoked after this returns.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("match_id", &self.match_id)
            .field("active", &self.is_active())
            .finish()
    }
}
