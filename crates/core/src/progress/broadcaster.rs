//! Session-scoped progress broadcaster.

use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::error::ProgressError;
use super::types::{ProgressEvent, Stage};

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<ProgressEvent>>>;

/// Push channel plus last-value cache for progress events, keyed by session.
///
/// Cloning is cheap; all clones share the same state.
///
/// Locks are always taken in the order events, then subscribers. `publish`
/// holds the events write lock while it delivers, and `subscribe` holds the
/// events read lock while it registers and replays, so a subscriber sees
/// every event exactly once and in publish order.
#[derive(Clone, Default)]
pub struct ProgressBroadcaster {
    events: Arc<RwLock<HashMap<String, ProgressEvent>>>,
    subscribers: Arc<RwLock<Subscribers>>,
}

impl ProgressBroadcaster {
    /// Creates an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `event` as its session's current value and pushes it to live
    /// subscribers.
    ///
    /// Returns `false` if the session already reached a terminal stage, in
    /// which case the event is dropped.
    pub async fn publish(&self, event: ProgressEvent) -> bool {
        let mut events = self.events.write().await;

        if let Some(previous) = events.get(&event.session_id) {
            if previous.stage.is_terminal() {
                debug!(
                    session_id = %event.session_id,
                    stage = %event.stage,
                    "Ignoring progress after terminal stage"
                );
                return false;
            }
        }

        self.fan_out(&event).await;
        events.insert(event.session_id.clone(), event);
        true
    }

    /// Claims a session by recording `event` as its first event.
    ///
    /// Succeeds only when the session has no cached event. The check and the
    /// insert happen under one events write lock, so of several concurrent
    /// callers for the same session exactly one wins.
    pub async fn try_open(&self, event: ProgressEvent) -> bool {
        let mut events = self.events.write().await;
        if events.contains_key(&event.session_id) {
            debug!(session_id = %event.session_id, "Session already open");
            return false;
        }

        self.fan_out(&event).await;
        events.insert(event.session_id.clone(), event);
        true
    }

    /// Pushes `event` to live subscribers. Callers hold the events write lock.
    async fn fan_out(&self, event: &ProgressEvent) {
        let session_id = event.session_id.as_str();
        let mut failed = 0;
        {
            let subscribers = self.subscribers.read().await;
            if let Some(senders) = subscribers.get(session_id) {
                for tx in senders {
                    if let Err(e) = deliver(tx, event) {
                        warn!(error = %e, "Dropping progress subscriber");
                        failed += 1;
                    }
                }
            }
        }

        if failed > 0 {
            let mut subscribers = self.subscribers.write().await;
            if let Some(senders) = subscribers.get_mut(session_id) {
                senders.retain(|tx| !tx.is_closed());
                if senders.is_empty() {
                    subscribers.remove(session_id);
                }
            }
        }
    }

    /// Convenience wrapper around [`publish`](Self::publish).
    pub async fn publish_stage(
        &self,
        session_id: &str,
        stage: Stage,
        message: impl Into<String>,
        progress: f64,
    ) -> bool {
        self.publish(ProgressEvent::new(session_id, stage, message, progress))
            .await
    }

    /// Registers a live subscriber for a session.
    ///
    /// The session's last event, if any, is delivered first.
    pub async fn subscribe(&self, session_id: &str) -> ProgressSubscription {
        let events = self.events.read().await;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(last) = events.get(session_id) {
            let _ = tx.send(last.clone());
        }

        self.subscribers
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(tx);

        debug!(session_id, "Progress subscriber registered");
        ProgressSubscription {
            session_id: session_id.to_string(),
            rx,
        }
    }

    /// Returns the last event for a session.
    pub async fn get(&self, session_id: &str) -> Option<ProgressEvent> {
        self.events.read().await.get(session_id).cloned()
    }

    /// Removes all state for a session and closes its subscriptions.
    ///
    /// Returns whether the session was known.
    pub async fn cleanup(&self, session_id: &str) -> bool {
        let mut events = self.events.write().await;
        let had_event = events.remove(session_id).is_some();
        let had_subscribers = self.subscribers.write().await.remove(session_id).is_some();
        debug!(session_id, "Progress session cleaned up");
        had_event || had_subscribers
    }

    /// Number of live subscribers for a session.
    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(session_id)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of sessions with a cached event.
    pub async fn session_count(&self) -> usize {
        self.events.read().await.len()
    }
}

fn deliver(
    tx: &mpsc::UnboundedSender<ProgressEvent>,
    event: &ProgressEvent,
) -> Result<(), ProgressError> {
    tx.send(event.clone())
        .map_err(|_| ProgressError::transport(&event.session_id, "subscriber disconnected"))
}

/// A live stream of progress events for one session.
///
/// Ends when the session is cleaned up.
#[derive(Debug)]
pub struct ProgressSubscription {
    session_id: String,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressSubscription {
    /// The session this subscription follows.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Waits for the next event. Returns `None` once the session is cleaned up.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Converts the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}
