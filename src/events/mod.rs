// ABOUTME: Fire-and-forget event bus with cell/user/audit streams, bounded queues, overflow spill to disk
// ABOUTME: Grounded on the teacher's InMemoryCache background-task/shutdown-channel idiom (src/cache/memory.rs)
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::constants::events::QUEUE_CAPACITY;

/// Which logical stream an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Cell lifecycle and data mutations.
    Cell,
    /// User account activity (registration, login, lockout).
    User,
    /// Security-relevant actions retained for audit review.
    Audit,
}

/// A single published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id.
    pub id: Uuid,
    /// Stream this event was published on.
    pub stream: Stream,
    /// Event type name, e.g. `"cell.created"`.
    pub kind: String,
    /// Free-form event payload.
    pub payload: serde_json::Value,
    /// Wall-clock time of publication.
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget publish/subscribe bus over three fixed streams.
///
/// Each stream is a bounded [`broadcast`] channel. A publish that finds the
/// channel already at [`QUEUE_CAPACITY`] forces the slowest lagging
/// receiver to drop its oldest unread event, and increments a counter
/// rather than blocking the caller; on sustained overflow, events are
/// additionally appended to an on-disk audit log so no audit-relevant
/// activity is silently lost even if no subscriber is listening at all.
pub struct EventBus {
    cell_tx: broadcast::Sender<Event>,
    user_tx: broadcast::Sender<Event>,
    audit_tx: broadcast::Sender<Event>,
    dropped: AtomicU64,
    spill_tx: mpsc::Sender<Event>,
    shutdown_tx: Option<Arc<mpsc::Sender<()>>>,
}

impl EventBus {
    /// Start a bus that spills overflowed audit events as newline-delimited
    /// JSON under `events_dir/audit.log`.
    #[must_use]
    pub fn start(events_dir: PathBuf) -> Arc<Self> {
        let (cell_tx, _) = broadcast::channel(QUEUE_CAPACITY);
        let (user_tx, _) = broadcast::channel(QUEUE_CAPACITY);
        let (audit_tx, _) = broadcast::channel(QUEUE_CAPACITY);
        let (spill_tx, spill_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(Self::run_spiller(events_dir, spill_rx, shutdown_rx));

        Arc::new(Self {
            cell_tx,
            user_tx,
            audit_tx,
            dropped: AtomicU64::new(0),
            spill_tx,
            shutdown_tx: Some(Arc::new(shutdown_tx)),
        })
    }

    async fn run_spiller(
        events_dir: PathBuf,
        mut spill_rx: mpsc::Receiver<Event>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&events_dir).await {
            tracing::warn!(error = %e, "failed to create events directory, audit spill disabled");
            return;
        }
        let log_path = events_dir.join("audit.log");

        loop {
            tokio::select! {
                Some(event) = spill_rx.recv() => {
                    Self::append_to_log(&log_path, &event).await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("event bus spill task received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn append_to_log(log_path: &std::path::Path, event: &Event) {
        let Ok(mut line) = serde_json::to_vec(event) else {
            return;
        };
        line.push(b'\n');

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await;
        match file {
            Ok(mut f) => {
                if let Err(e) = f.write_all(&line).await {
                    tracing::warn!(error = %e, "failed to append to audit log");
                }
            }
            Err(e) => tracing::warn!(error = %e, path = %log_path.display(), "failed to open audit log"),
        }
    }

    /// Publish `event`. Never blocks and never fails: a full stream drops
    /// the event from the in-memory channel (incrementing the drop
    /// counter), and audit-stream events are additionally queued for disk
    /// spill regardless of channel pressure.
    pub fn publish(&self, stream: Stream, kind: impl Into<String>, payload: serde_json::Value) {
        let event = Event {
            id: Uuid::new_v4(),
            stream,
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        };

        let sender = match stream {
            Stream::Cell => &self.cell_tx,
            Stream::User => &self.user_tx,
            Stream::Audit => &self.audit_tx,
        };

        // `len()` is the backlog still unread by the slowest subscriber. If
        // it is already at capacity, this send pushes that subscriber's
        // oldest unread event out — tokio's own drop-oldest behavior — so
        // count it here rather than at the (per-receiver) read side.
        if sender.len() >= QUEUE_CAPACITY {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(?stream, "broadcast stream at capacity, dropping oldest queued event");
        }

        // `send` erroring just means zero active receivers; nothing to do,
        // the audit spill below still runs regardless.
        let _ = sender.send(event.clone());

        if stream == Stream::Audit {
            if let Err(e) = self.spill_tx.try_send(event) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = ?e, "audit spill queue full, dropping oldest");
            }
        }
    }

    /// Subscribe to `stream`. Dropped if the returned receiver falls
    /// behind by more than [`QUEUE_CAPACITY`] events.
    #[must_use]
    pub fn subscribe(&self, stream: Stream) -> broadcast::Receiver<Event> {
        match stream {
            Stream::Cell => self.cell_tx.subscribe(),
            Stream::User => self.user_tx.subscribe(),
            Stream::Audit => self.audit_tx.subscribe(),
        }
    }

    /// Count of events dropped due to queue pressure since startup.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(tx) = &self.shutdown_tx {
            if let Err(e) = tx.try_send(()) {
                tracing::debug!(error = ?e, "event bus shutdown signal send failed (channel likely closed)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let bus = EventBus::start(dir.path().to_path_buf());
        let mut rx = bus.subscribe(Stream::Cell);
        bus.publish(Stream::Cell, "cell.created", json!({"key": "abc"}));
        let event = rx.recv().await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(event.kind, "cell.created");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let bus = EventBus::start(dir.path().to_path_buf());
        bus.publish(Stream::User, "user.registered", json!({}));
    }

    #[tokio::test]
    async fn lagging_subscriber_increments_dropped_count() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let bus = EventBus::start(dir.path().to_path_buf());
        let _rx = bus.subscribe(Stream::Cell);
        assert_eq!(bus.dropped_count(), 0);

        for i in 0..QUEUE_CAPACITY + 5 {
            bus.publish(Stream::Cell, "cell.item_written", json!({"i": i}));
        }

        assert!(bus.dropped_count() >= 5);
    }

    #[tokio::test]
    async fn audit_events_are_spilled_to_disk() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let bus = EventBus::start(dir.path().to_path_buf());
        bus.publish(Stream::Audit, "auth.login", json!({"user": "u1"}));
        // Give the background spiller a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let log_path = dir.path().join("audit.log");
        let contents = tokio::fs::read_to_string(&log_path).await.unwrap_or_default();
        assert!(contents.contains("auth.login"));
    }
}
