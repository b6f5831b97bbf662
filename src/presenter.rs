//! Presentation loop: observe a session on a fixed tick without blocking on
//! the measurement itself.

use std::time::Duration;

use crate::measure::{SessionHandle, SessionSnapshot};

/// Refresh period of the terminal front end.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Poll `handle` every `tick`, passing each new snapshot to `on_update`,
/// and return the terminal snapshot. Intermediate snapshots may be skipped;
/// the terminal one is always delivered, exactly once.
pub async fn drive<F>(handle: &SessionHandle, tick: Duration, mut on_update: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot),
{
    let mut progress = handle.watch();
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        if let Some(snapshot) = progress.try_recv() {
            on_update(&snapshot);
            if snapshot.is_terminal() {
                return snapshot;
            }
        }
    }
}
