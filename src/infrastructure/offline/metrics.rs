use crate::domain::entities::offline::SyncReport;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Success,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassTrigger {
    Manual,
    Timer,
    Reconnect,
    Wake,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub total_success: u64,
    pub total_failure: u64,
    pub total_skipped: u64,
    pub consecutive_failure: u64,
    pub mutations_replayed: u64,
    pub mutations_dead_lettered: u64,
    pub photos_uploaded: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<PassOutcome>,
    pub last_trigger: Option<PassTrigger>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Default, Clone)]
struct LastPassMetadata {
    outcome: Option<PassOutcome>,
    trigger: Option<PassTrigger>,
    duration_ms: Option<u64>,
    error: Option<String>,
}

/// 同期パスの結果カウンタ。オーケストレータごとに1つ持つ
pub struct SyncMetrics {
    success: AtomicU64,
    failure: AtomicU64,
    skipped: AtomicU64,
    consecutive_failure: AtomicU64,
    mutations_replayed: AtomicU64,
    mutations_dead_lettered: AtomicU64,
    photos_uploaded: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    metadata: Mutex<LastPassMetadata>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            mutations_replayed: AtomicU64::new(0),
            mutations_dead_lettered: AtomicU64::new(0),
            photos_uploaded: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            metadata: Mutex::new(LastPassMetadata::default()),
        }
    }

    pub fn record_pass(
        &self,
        trigger: PassTrigger,
        duration_ms: u64,
        report: Option<&SyncReport>,
        error: Option<&str>,
    ) {
        let outcome = if error.is_some() {
            self.failure.fetch_add(1, Ordering::Relaxed);
            self.last_failure_ms
                .store(current_unix_ms(), Ordering::Relaxed);
            self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            PassOutcome::Failure
        } else {
            self.success.fetch_add(1, Ordering::Relaxed);
            self.last_success_ms
                .store(current_unix_ms(), Ordering::Relaxed);
            self.consecutive_failure.store(0, Ordering::Relaxed);
            PassOutcome::Success
        };

        if let Some(report) = report {
            self.mutations_replayed
                .fetch_add(u64::from(report.mutations.succeeded), Ordering::Relaxed);
            self.mutations_dead_lettered
                .fetch_add(u64::from(report.mutations.dead_lettered), Ordering::Relaxed);
            self.photos_uploaded
                .fetch_add(u64::from(report.photos.synced), Ordering::Relaxed);
        }

        if let Ok(mut guard) = self.metadata.lock() {
            guard.outcome = Some(outcome);
            guard.trigger = Some(trigger);
            guard.duration_ms = Some(duration_ms);
            guard.error = error.map(str::to_string);
        }
    }

    /// 単一実行ガードで弾かれたパス
    pub fn record_skipped(&self, trigger: PassTrigger) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.metadata.lock() {
            guard.outcome = Some(PassOutcome::Skipped);
            guard.trigger = Some(trigger);
            guard.duration_ms = None;
            guard.error = None;
        }
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let metadata = self
            .metadata
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        SyncMetricsSnapshot {
            total_success: self.success.load(Ordering::Relaxed),
            total_failure: self.failure.load(Ordering::Relaxed),
            total_skipped: self.skipped.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            mutations_replayed: self.mutations_replayed.load(Ordering::Relaxed),
            mutations_dead_lettered: self.mutations_dead_lettered.load(Ordering::Relaxed),
            photos_uploaded: self.photos_uploaded.load(Ordering::Relaxed),
            last_success_ms: to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: metadata.outcome,
            last_trigger: metadata.trigger,
            last_duration_ms: metadata.duration_ms,
            last_error: metadata.error,
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::offline::{DrainReport, PhotoSyncReport};

    #[test]
    fn record_success_and_failure() {
        let metrics = SyncMetrics::new();
        let report = SyncReport {
            mutations: DrainReport {
                attempted: 3,
                succeeded: 2,
                failed: 1,
                dead_lettered: 1,
                deferred: 0,
            },
            photos: PhotoSyncReport {
                synced: 4,
                ..PhotoSyncReport::default()
            },
            refreshed: Vec::new(),
        };

        metrics.record_pass(PassTrigger::Timer, 120, Some(&report), None);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_success, 1);
        assert_eq!(snapshot.mutations_replayed, 2);
        assert_eq!(snapshot.mutations_dead_lettered, 1);
        assert_eq!(snapshot.photos_uploaded, 4);
        assert_eq!(snapshot.last_outcome, Some(PassOutcome::Success));
        assert_eq!(snapshot.last_trigger, Some(PassTrigger::Timer));
        assert!(snapshot.last_success_ms.is_some());

        metrics.record_pass(PassTrigger::Manual, 5, None, Some("disk full"));
        metrics.record_pass(PassTrigger::Manual, 5, None, Some("disk full"));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_failure, 2);
        assert_eq!(snapshot.consecutive_failure, 2);
        assert_eq!(snapshot.last_error.as_deref(), Some("disk full"));

        metrics.record_pass(PassTrigger::Reconnect, 5, None, None);
        assert_eq!(metrics.snapshot().consecutive_failure, 0);
    }

    #[test]
    fn skipped_passes_do_not_touch_failure_streak() {
        let metrics = SyncMetrics::new();
        metrics.record_pass(PassTrigger::Manual, 1, None, Some("boom"));
        metrics.record_skipped(PassTrigger::Wake);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_skipped, 1);
        assert_eq!(snapshot.consecutive_failure, 1);
        assert_eq!(snapshot.last_outcome, Some(PassOutcome::Skipped));
    }
}
