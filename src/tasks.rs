use crate::call_state::CallSessions;
use crate::dedup::DedupStore;
use crate::meetings::MeetingBroker;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Task that runs `purge` every `every` until `shutdown` fires.
pub fn spawn_sweeper<F>(every: Duration, shutdown: CancellationToken, mut purge: F) -> JoinHandle<()>
where
    F: FnMut() -> usize + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let purged = purge();
                    if purged > 0 {
                        trace!(purged, "swept expired entries");
                    }
                }
            }
        }
    })
}

/// Sweep every in-memory store that expires entries: dedup keys, call sessions, and join
/// subscription records.
pub fn spawn_maintenance(
    dedup: Arc<dyn DedupStore>,
    sessions: CallSessions,
    meetings: MeetingBroker,
    subscription_ttl: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    spawn_sweeper(every, shutdown, move || {
        dedup.purge_expired()
            + sessions.purge_expired()
            + meetings.purge_older_than(subscription_ttl)
    })
}
