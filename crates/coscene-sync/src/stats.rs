//! Counters describing a coordinator's traffic

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, shared between the coordinator's tasks
#[derive(Debug, Default)]
pub struct SyncStats {
    sent: AtomicU64,
    send_failures: AtomicU64,
    dropped_after_retries: AtomicU64,
    decode_failures: AtomicU64,
    self_echo_dropped: AtomicU64,
    applied: AtomicU64,
    snapshot_requests_served: AtomicU64,
}

/// Point-in-time copy of [`SyncStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub send_failures: u64,
    pub dropped_after_retries: u64,
    pub decode_failures: u64,
    pub self_echo_dropped: u64,
    pub applied: u64,
    pub snapshot_requests_served: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_after_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_self_echo(&self) {
        self.self_echo_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot_served(&self) {
        self.snapshot_requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            dropped_after_retries: self.dropped_after_retries.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            self_echo_dropped: self.self_echo_dropped.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            snapshot_requests_served: self.snapshot_requests_served.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = SyncStats::new();
        stats.record_sent();
        stats.record_sent();
        stats.record_decode_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sent, 2);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.applied, 0);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["sent"], 2);
    }
}
