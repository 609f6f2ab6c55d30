use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use remotedit_core::{Direction, TransferRequest};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

pub type QueueItemId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Queued,
    InProgress,
    Done,
    Error,
}

impl TransferStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TransferStatus::Queued | TransferStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Queued => "queued",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Done => "done",
            TransferStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub server: String,
    pub direction: Direction,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub size: u64,
    pub status: TransferStatus,
    pub error: Option<String>,
    pub queued_at: OffsetDateTime,
    pub finished_at: Option<OffsetDateTime>,
}

impl QueueItem {
    pub fn transfer_request(&self) -> TransferRequest {
        TransferRequest {
            direction: self.direction,
            remote_path: self.remote_path.clone(),
            local_path: self.local_path.clone(),
            size: self.size,
        }
    }
}

/// Broadcast on every status change so progress views can follow along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub id: QueueItemId,
    pub server: String,
    pub local_path: PathBuf,
    pub status: TransferStatus,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("a transfer for {0} is already queued")]
    AlreadyQueued(PathBuf),
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: QueueItemId,
    items: Vec<QueueItem>,
}

/// Bookkeeping of every upload and download.
///
/// At most one Queued/InProgress item exists per `(server, local_path)`.
/// Bytes are moved by the connector; this type only records what happened.
#[derive(Debug)]
pub struct TransferQueue {
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferQueue {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(QueueState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn enqueue(
        &self,
        server: &str,
        direction: Direction,
        remote_path: &str,
        local_path: &Path,
        size: u64,
    ) -> Result<QueueItem, QueueError> {
        let item = {
            let mut state = self.state.lock();
            if state.items.iter().any(|item| {
                item.status.is_active() && item.server == server && item.local_path == local_path
            }) {
                return Err(QueueError::AlreadyQueued(local_path.to_path_buf()));
            }
            state.next_id += 1;
            let item = QueueItem {
                id: state.next_id,
                server: server.to_string(),
                direction,
                remote_path: remote_path.to_string(),
                local_path: local_path.to_path_buf(),
                size,
                status: TransferStatus::Queued,
                error: None,
                queued_at: OffsetDateTime::now_utc(),
                finished_at: None,
            };
            state.items.push(item.clone());
            item
        };
        self.notify(&item);
        Ok(item)
    }

    pub fn exists(&self, server: &str, local_path: &Path) -> bool {
        self.state.lock().items.iter().any(|item| {
            item.status.is_active() && item.server == server && item.local_path == local_path
        })
    }

    pub fn mark_in_progress(&self, id: QueueItemId) -> bool {
        self.transition(id, |item| {
            if item.status != TransferStatus::Queued {
                return false;
            }
            item.status = TransferStatus::InProgress;
            true
        })
    }

    pub fn mark_done(&self, id: QueueItemId) -> bool {
        self.transition(id, |item| {
            if !item.status.is_active() {
                return false;
            }
            item.status = TransferStatus::Done;
            item.finished_at = Some(OffsetDateTime::now_utc());
            true
        })
    }

    /// Safe to call repeatedly and on items that were already cleared.
    pub fn mark_error(&self, id: QueueItemId, message: &str) -> bool {
        self.transition(id, |item| {
            if !item.status.is_active() {
                return false;
            }
            item.status = TransferStatus::Error;
            item.error = Some(message.to_string());
            item.finished_at = Some(OffsetDateTime::now_utc());
            true
        })
    }

    /// Fails every outstanding item of a server that is going away.
    pub fn cancel_server(&self, server: &str, reason: &str) -> usize {
        let cancelled: Vec<QueueItem> = {
            let mut state = self.state.lock();
            let now = OffsetDateTime::now_utc();
            state
                .items
                .iter_mut()
                .filter(|item| item.server == server && item.status.is_active())
                .map(|item| {
                    item.status = TransferStatus::Error;
                    item.error = Some(reason.to_string());
                    item.finished_at = Some(now);
                    item.clone()
                })
                .collect()
        };
        for item in &cancelled {
            self.notify(item);
        }
        cancelled.len()
    }

    pub fn get(&self, id: QueueItemId) -> Option<QueueItem> {
        self.state.lock().items.iter().find(|item| item.id == id).cloned()
    }

    pub fn items(&self) -> Vec<QueueItem> {
        self.state.lock().items.clone()
    }

    pub fn items_for(&self, server: &str) -> Vec<QueueItem> {
        self.state
            .lock()
            .items
            .iter()
            .filter(|item| item.server == server)
            .cloned()
            .collect()
    }

    /// Drops Done and Error items from the history.
    pub fn clear_finished(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.retain(|item| item.status.is_active());
        before - state.items.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    fn transition(&self, id: QueueItemId, apply: impl FnOnce(&mut QueueItem) -> bool) -> bool {
        let changed = {
            let mut state = self.state.lock();
            let Some(item) = state.items.iter_mut().find(|item| item.id == id) else {
                return false;
            };
            if !apply(item) {
                return false;
            }
            item.clone()
        };
        self.notify(&changed);
        true
    }

    fn notify(&self, item: &QueueItem) {
        // No receivers is fine; the history stays inspectable through `items()`.
        let _ = self.events.send(QueueEvent {
            id: item.id,
            server: item.server.clone(),
            local_path: item.local_path.clone(),
            status: item.status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enqueue(queue: &TransferQueue, local: &str) -> Result<QueueItem, QueueError> {
        queue.enqueue(
            "srv",
            Direction::Download,
            "/remote/a.txt",
            Path::new(local),
            10,
        )
    }

    #[test]
    fn duplicate_active_path_is_rejected() {
        let queue = TransferQueue::new();
        let first = enqueue(&queue, "/m/a.txt").unwrap();
        assert!(matches!(
            enqueue(&queue, "/m/a.txt"),
            Err(QueueError::AlreadyQueued(path)) if path == Path::new("/m/a.txt")
        ));

        queue.mark_in_progress(first.id);
        assert!(enqueue(&queue, "/m/a.txt").is_err());
        assert!(queue.exists("srv", Path::new("/m/a.txt")));
    }

    #[test]
    fn finished_items_free_the_path() {
        let queue = TransferQueue::new();
        let first = enqueue(&queue, "/m/a.txt").unwrap();
        queue.mark_in_progress(first.id);
        queue.mark_done(first.id);
        let second = enqueue(&queue, "/m/a.txt").unwrap();
        queue.mark_error(second.id, "boom");
        assert!(enqueue(&queue, "/m/a.txt").is_ok());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn direction_does_not_matter_for_the_key() {
        let queue = TransferQueue::new();
        enqueue(&queue, "/m/a.txt").unwrap();
        let upload = queue.enqueue(
            "srv",
            Direction::Upload,
            "/remote/a.txt",
            Path::new("/m/a.txt"),
            10,
        );
        assert!(upload.is_err());
        // Same local path on another server is a different key.
        assert!(
            queue
                .enqueue("other", Direction::Upload, "/a.txt", Path::new("/m/a.txt"), 1)
                .is_ok()
        );
    }

    #[test]
    fn mark_error_is_idempotent_and_tolerates_missing_items() {
        let queue = TransferQueue::new();
        let item = enqueue(&queue, "/m/a.txt").unwrap();
        assert!(queue.mark_error(item.id, "network down"));
        assert!(!queue.mark_error(item.id, "again"));
        let stored = queue.get(item.id).unwrap();
        assert_eq!(stored.status, TransferStatus::Error);
        assert_eq!(stored.error.as_deref(), Some("network down"));
        assert!(stored.finished_at.is_some());

        assert_eq!(queue.clear_finished(), 1);
        assert!(!queue.mark_error(item.id, "after clear"));
        assert!(queue.is_empty());
    }

    #[test]
    fn done_items_cannot_regress() {
        let queue = TransferQueue::new();
        let item = enqueue(&queue, "/m/a.txt").unwrap();
        assert!(queue.mark_done(item.id));
        assert!(!queue.mark_in_progress(item.id));
        assert!(!queue.mark_error(item.id, "late"));
        assert_eq!(queue.get(item.id).unwrap().status, TransferStatus::Done);
    }

    #[test]
    fn cancel_server_fails_outstanding_items_only() {
        let queue = TransferQueue::new();
        let done = enqueue(&queue, "/m/done.txt").unwrap();
        queue.mark_done(done.id);
        enqueue(&queue, "/m/a.txt").unwrap();
        enqueue(&queue, "/m/b.txt").unwrap();

        assert_eq!(queue.cancel_server("srv", "server removed"), 2);
        assert!(
            queue
                .items_for("srv")
                .iter()
                .all(|item| !item.status.is_active())
        );
        assert_eq!(queue.get(done.id).unwrap().status, TransferStatus::Done);
    }

    #[test]
    fn status_changes_are_broadcast() {
        let queue = TransferQueue::new();
        let mut rx = queue.subscribe();
        let item = enqueue(&queue, "/m/a.txt").unwrap();
        queue.mark_in_progress(item.id);
        queue.mark_done(item.id);

        let statuses: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                TransferStatus::Queued,
                TransferStatus::InProgress,
                TransferStatus::Done
            ]
        );
    }
}
