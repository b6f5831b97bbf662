//! Last-value-wins progress channel between a session thread and the UI.
//!
//! The channel is a single mutex-guarded slot holding the newest
//! [`SessionSnapshot`] and a version counter. The producer overwrites the
//! slot; the consumer does a non-blocking read and only gets a value when
//! the version moved since its last read. Intermediate values can be lost,
//! the terminal snapshot cannot: once the slot holds a terminal phase it is
//! frozen, and each receiver returns it exactly once.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::measure::{Phase, ServerDescriptor, SessionSnapshot};

struct Slot {
    latest: SessionSnapshot,
    version: u64,
}

struct Shared {
    slot: Mutex<Slot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create a channel seeded with `initial`.
pub fn channel(initial: SessionSnapshot) -> (ProgressSender, ProgressReceiver) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            latest: initial,
            version: 1,
        }),
    });
    (
        ProgressSender {
            shared: shared.clone(),
        },
        ProgressReceiver {
            shared,
            seen: 0,
            finished: false,
        },
    )
}

/// Producer side, held by the session thread.
#[derive(Clone)]
pub struct ProgressSender {
    shared: Arc<Shared>,
}

impl ProgressSender {
    /// Move to `phase` at `percent`.
    ///
    /// Overall progress never decreases; an update that would not change the
    /// snapshot is dropped. Returns whether a new value was published.
    pub fn advance(&self, phase: Phase, percent: u8) -> bool {
        self.update(|snap| {
            let percent = percent.min(100).max(snap.progress_percent);
            if snap.phase == phase && snap.progress_percent == percent {
                return false;
            }
            snap.phase = phase;
            snap.progress_percent = percent;
            true
        })
    }

    pub fn set_server(&self, server: ServerDescriptor) -> bool {
        self.update(|snap| {
            snap.server = Some(server);
            true
        })
    }

    /// Publish the terminal snapshot. `finalize` must leave the snapshot in
    /// a terminal phase; later updates are ignored.
    pub fn finish(&self, finalize: impl FnOnce(&mut SessionSnapshot)) -> bool {
        self.update(|snap| {
            finalize(snap);
            debug_assert!(snap.is_terminal(), "finish() left a non-terminal phase");
            true
        })
    }

    fn update(&self, apply: impl FnOnce(&mut SessionSnapshot) -> bool) -> bool {
        let mut slot = self.shared.lock();
        if slot.latest.is_terminal() {
            return false;
        }
        if apply(&mut slot.latest) {
            slot.version += 1;
            true
        } else {
            false
        }
    }
}

/// Consumer side. Cloning yields an independent cursor.
#[derive(Clone)]
pub struct ProgressReceiver {
    shared: Arc<Shared>,
    seen: u64,
    finished: bool,
}

impl ProgressReceiver {
    /// Non-blocking read of the newest snapshot.
    ///
    /// Returns `None` when nothing changed since the previous call, and
    /// forever after the terminal snapshot has been returned once.
    pub fn try_recv(&mut self) -> Option<SessionSnapshot> {
        if self.finished {
            return None;
        }
        let slot = self.shared.lock();
        if slot.version == self.seen {
            return None;
        }
        self.seen = slot.version;
        if slot.latest.is_terminal() {
            self.finished = true;
        }
        Some(slot.latest.clone())
    }

    /// Peek at the newest snapshot without moving the cursor.
    pub fn latest(&self) -> SessionSnapshot {
        self.shared.lock().latest.clone()
    }

    /// Whether this receiver has already returned the terminal snapshot.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{MeasureError, MeasurementOutcome};
    use uuid::Uuid;

    fn fresh() -> (ProgressSender, ProgressReceiver) {
        channel(SessionSnapshot::new(Uuid::new_v4()))
    }

    #[test]
    fn test_initial_snapshot_is_delivered_once() {
        let (_tx, mut rx) = fresh();
        let first = rx.try_recv().unwrap();
        assert_eq!(first.phase, Phase::Idle);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_last_value_wins() {
        let (tx, mut rx) = fresh();
        rx.try_recv();
        tx.advance(Phase::Downloading, 25);
        tx.advance(Phase::Downloading, 30);
        tx.advance(Phase::Downloading, 41);

        let snap = rx.try_recv().unwrap();
        assert_eq!(snap.progress_percent, 41);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_progress_never_goes_backwards() {
        let (tx, rx) = fresh();
        assert!(tx.advance(Phase::Downloading, 50));
        assert!(!tx.advance(Phase::Downloading, 30));
        assert_eq!(rx.latest().progress_percent, 50);

        // A new phase is published even if its nominal start is lower.
        assert!(tx.advance(Phase::Uploading, 45));
        assert_eq!(rx.latest().progress_percent, 50);
        assert_eq!(rx.latest().phase, Phase::Uploading);
    }

    #[test]
    fn test_terminal_is_observed_exactly_once_and_frozen() {
        let (tx, mut rx) = fresh();
        tx.advance(Phase::SelectingServer, 10);
        tx.finish(|s| {
            s.phase = Phase::Failed;
            s.error = Some(MeasureError::Configuration("offline".into()));
        });

        assert!(!tx.advance(Phase::Downloading, 30));
        assert!(!tx.finish(|s| s.phase = Phase::Complete));

        let terminal = rx.try_recv().unwrap();
        assert_eq!(terminal.phase, Phase::Failed);
        assert!(rx.is_finished());
        assert!(rx.try_recv().is_none());
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_cloned_receivers_have_independent_cursors() {
        let (tx, mut rx) = fresh();
        let mut other = rx.clone();
        tx.finish(|s| {
            s.phase = Phase::Complete;
            s.progress_percent = 100;
            s.outcome = Some(MeasurementOutcome {
                download_mbps: 1.0,
                upload_mbps: 2.0,
                ping_ms: 3.0,
            });
        });

        assert!(rx.try_recv().unwrap().is_terminal());
        assert!(other.try_recv().unwrap().is_terminal());
        assert!(rx.try_recv().is_none());
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn test_concurrent_producer_terminal_always_seen() {
        let (tx, mut rx) = fresh();
        let producer = std::thread::spawn(move || {
            for p in 20..=60 {
                tx.advance(Phase::Downloading, p);
            }
            tx.finish(|s| s.phase = Phase::Complete);
        });

        let mut terminal_count = 0;
        let mut last = 0;
        loop {
            if let Some(snap) = rx.try_recv() {
                assert!(snap.progress_percent >= last);
                last = snap.progress_percent;
                if snap.is_terminal() {
                    terminal_count += 1;
                }
            }
            if rx.is_finished() {
                break;
            }
            std::thread::yield_now();
        }
        producer.join().unwrap();
        assert!(rx.try_recv().is_none());
        assert_eq!(terminal_count, 1);
    }
}
