//! # Serialization Queue
//!
//! Per-playlist mutual exclusion with priority-ordered admission. For a
//! fixed aggregate id no two operations overlap; queued callers are admitted
//! lowest-priority-number first, ties by arrival. A running operation is
//! never preempted or cancelled — any store call inside it suspends the
//! whole operation until satisfied, and nothing else for the same id may
//! interleave during that suspension. Operations on different ids run fully
//! concurrently.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::constants::QueuePriority;
use crate::models::PlaylistId;

#[derive(Debug)]
struct Waiter {
    priority: u8,
    seq: u64,
    tx: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct LaneState {
    running: bool,
    next_seq: u64,
    waiters: Vec<Waiter>,
}

#[derive(Debug, Default)]
struct Lane {
    state: Mutex<LaneState>,
}

impl Lane {
    /// Admit the next waiter by (priority, arrival), or mark the lane idle
    fn release(&self) {
        let mut state = self.state.lock();
        loop {
            let next = state
                .waiters
                .iter()
                .enumerate()
                .min_by_key(|(_, w)| (w.priority, w.seq))
                .map(|(i, _)| i);
            match next {
                Some(pos) => {
                    let waiter = state.waiters.swap_remove(pos);
                    if waiter.tx.send(()).is_ok() {
                        // Lane stays running; ownership transferred
                        return;
                    }
                    // Receiver vanished; try the next waiter
                }
                None => {
                    state.running = false;
                    return;
                }
            }
        }
    }
}

/// Releases lane ownership when the operation finishes, panics included
struct LaneGuard {
    lane: Arc<Lane>,
}

impl Drop for LaneGuard {
    fn drop(&mut self) {
        self.lane.release();
    }
}

/// The per-aggregate cooperative queue
#[derive(Debug, Default)]
pub struct SerializedQueue {
    lanes: DashMap<PlaylistId, Arc<Lane>>,
}

impl SerializedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` exclusively for `playlist_id`, admitted by priority.
    /// Returns `op`'s result; an enqueued operation always eventually runs.
    pub async fn run_exclusive<F, Fut, R>(
        &self,
        playlist_id: &PlaylistId,
        priority: QueuePriority,
        label: &str,
        op: F,
    ) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let lane = self
            .lanes
            .entry(playlist_id.clone())
            .or_default()
            .clone();

        let rx = {
            let mut state = lane.state.lock();
            if !state.running {
                state.running = true;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                let seq = state.next_seq;
                state.next_seq += 1;
                state.waiters.push(Waiter {
                    priority: priority.order(),
                    seq,
                    tx,
                });
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            tracing::debug!(
                playlist_id = %playlist_id,
                priority = ?priority,
                label = %label,
                "📋 QUEUE: waiting for lane"
            );
            // The sender is only dropped if the lane itself goes away
            let _ = rx.await;
        }

        let _guard = LaneGuard { lane };
        tracing::debug!(
            playlist_id = %playlist_id,
            priority = ?priority,
            label = %label,
            "📋 QUEUE: running"
        );
        op().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn id(s: &str) -> PlaylistId {
        PlaylistId::new(s)
    }

    #[tokio::test]
    async fn test_result_passthrough() {
        let queue = SerializedQueue::new();
        let out = queue
            .run_exclusive(&id("p0"), QueuePriority::UserPlayout, "noop", || async {
                21 * 2
            })
            .await;
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn test_priority_admission_order() {
        let queue = Arc::new(SerializedQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (block_tx, block_rx) = oneshot::channel::<()>();

        // Occupy the lane
        let q = queue.clone();
        let holder = tokio::spawn(async move {
            q.run_exclusive(&id("p0"), QueuePriority::UserPlayout, "holder", || async {
                let _ = block_rx.await;
            })
            .await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Enqueue playout first, ingest second; ingest must still run first
        let q = queue.clone();
        let o = order.clone();
        let playout = tokio::spawn(async move {
            q.run_exclusive(&id("p0"), QueuePriority::UserPlayout, "take", || async {
                o.lock().push("playout");
            })
            .await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let q = queue.clone();
        let o = order.clone();
        let ingest = tokio::spawn(async move {
            q.run_exclusive(&id("p0"), QueuePriority::Ingest, "ingest", || async {
                o.lock().push("ingest");
            })
            .await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        block_tx.send(()).unwrap();
        holder.await.unwrap();
        playout.await.unwrap();
        ingest.await.unwrap();

        assert_eq!(*order.lock(), vec!["ingest", "playout"]);
    }

    #[tokio::test]
    async fn test_no_overlap_within_one_lane() {
        let queue = Arc::new(SerializedQueue::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let q = queue.clone();
            let c = concurrent.clone();
            let p = peak.clone();
            handles.push(tokio::spawn(async move {
                q.run_exclusive(
                    &id("p0"),
                    QueuePriority::UserPlayout,
                    &format!("op{i}"),
                    || async {
                        let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                        p.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        c.fetch_sub(1, Ordering::SeqCst);
                    },
                )
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_lanes_run_concurrently() {
        let queue = Arc::new(SerializedQueue::new());
        let (tx_a, rx_a) = oneshot::channel::<()>();
        let (tx_b, rx_b) = oneshot::channel::<()>();

        // Each op completes only once the other has started: deadlocks
        // unless the two lanes genuinely overlap
        let q = queue.clone();
        let a = tokio::spawn(async move {
            q.run_exclusive(&id("a"), QueuePriority::Ingest, "a", || async {
                tx_a.send(()).unwrap();
                rx_b.await.unwrap();
            })
            .await;
        });
        let q = queue.clone();
        let b = tokio::spawn(async move {
            q.run_exclusive(&id("b"), QueuePriority::Ingest, "b", || async {
                tx_b.send(()).unwrap();
                rx_a.await.unwrap();
            })
            .await;
        });

        tokio::time::timeout(Duration::from_secs(1), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .expect("lanes for different playlists must not serialize");
    }
}
