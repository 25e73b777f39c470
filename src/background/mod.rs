//! Background jobs: the periodic due-date notification scanner.
//!
//! [`NotificationScanner`] wakes up on a fixed period, finds every todo whose
//! due date has arrived and that has not been notified yet, hands it to a
//! [`Notifier`], and marks it notified once delivery succeeds.
//!
//! Delivery is at-least-once: a todo is marked only after its notification
//! returns `Ok`, so a failed delivery is retried on the next tick, and a crash
//! between delivery and marking would redeliver. Marking itself is idempotent.

pub mod notify;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use notify::{LogNotifier, Notifier, NotifyError};

use crate::store::TaskStore;

/// Default time between two scans.
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_secs(10);

/// Outcome counters for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Notifications delivered successfully.
    pub dispatched: usize,
    /// Notifications whose delivery failed; retried on the next pass.
    pub failed: usize,
    /// Candidates that were deleted or already notified by the time their
    /// turn came.
    pub skipped: usize,
}

/// Periodic scan for due, unnotified todos.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use chrono::{DateTime, Utc};
/// use duetodo::background::{LogNotifier, NotificationScanner};
/// use duetodo::store::TaskStore;
/// use duetodo::task::TaskDraft;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(TaskStore::new());
/// let due = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
/// store.create(TaskDraft::titled("pay bills").due(due));
///
/// let scanner = NotificationScanner::new(Arc::clone(&store), Arc::new(LogNotifier));
/// let report = scanner.scan(due.with_timezone(&Utc)).await;
/// assert_eq!(report.dispatched, 1);
/// # }
/// ```
pub struct NotificationScanner {
    store: Arc<TaskStore>,
    notifier: Arc<dyn Notifier>,
    period: Duration,
}

impl NotificationScanner {
    /// Creates a scanner over `store` that delivers through `notifier`,
    /// running every [`DEFAULT_SCAN_PERIOD`].
    pub fn new(store: Arc<TaskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            period: DEFAULT_SCAN_PERIOD,
        }
    }

    /// Overrides the time between scans.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Returns the time between scans.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs one scan pass as of `now`.
    ///
    /// Candidates are read once under the store's shared lock. Each one is
    /// then handled on its own: re-checked, delivered with no lock held, and
    /// marked. A failed or panicking delivery is logged, counted in
    /// [`ScanReport::failed`], and does not stop the pass.
    pub async fn scan(&self, now: DateTime<Utc>) -> ScanReport {
        let mut report = ScanReport::default();

        for task in self.store.due_unnotified(now) {
            // A concurrent pass or a delete may have got here first.
            let still_pending = self
                .store
                .get_by_id(&task.id)
                .is_some_and(|t| !t.notification_sent);
            if !still_pending {
                report.skipped += 1;
                continue;
            }

            // Delivered on its own task so a panicking notifier costs one
            // record, not the pass or the scanner loop.
            let notifier = Arc::clone(&self.notifier);
            let (id, title) = (task.id.clone(), task.title.clone());
            let delivery = tokio::spawn(async move { notifier.notify(&id, &title).await });

            match delivery.await {
                Ok(Ok(())) => {
                    self.store.mark_notified(&task.id);
                    report.dispatched += 1;
                }
                Ok(Err(e)) => {
                    warn!(id = %task.id, error = %e, "notification dispatch failed; will retry");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(id = %task.id, error = %e, "notifier panicked; will retry");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Starts the periodic scan on the Tokio runtime.
    ///
    /// The first scan runs one period after spawning. The returned handle
    /// stops the loop.
    pub fn spawn(self) -> ScannerHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    /// Like [`spawn`](Self::spawn), but stops when `cancel` is cancelled, so
    /// the scanner can share a shutdown signal with the server.
    pub fn spawn_with_token(self, cancel: CancellationToken) -> ScannerHandle {
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            info!(period = ?self.period, "notification scanner started");

            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.scan(Utc::now()).await;
                        if report != ScanReport::default() {
                            debug!(
                                dispatched = report.dispatched,
                                failed = report.failed,
                                skipped = report.skipped,
                                "scan pass finished"
                            );
                        }
                    }
                }
            }

            info!("notification scanner stopped");
        });

        ScannerHandle { cancel, join }
    }
}

/// Handle to a running scanner task.
pub struct ScannerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ScannerHandle {
    /// The token that stops this scanner when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns `true` once the scanner task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the scanner to stop and waits for it to exit.
    ///
    /// A scan pass already in progress finishes first.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "notification scanner task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::FixedOffset;

    use super::*;
    use crate::task::TaskDraft;

    /// Records every delivery; fails for titles listed in `failing`.
    #[derive(Default)]
    struct RecordingNotifier {
        delivered: Mutex<Vec<(String, String)>>,
        failing: HashSet<String>,
    }

    impl RecordingNotifier {
        fn failing_for(titles: &[&str]) -> Self {
            Self {
                failing: titles.iter().map(|t| (*t).to_owned()).collect(),
                ..Self::default()
            }
        }

        fn titles(&self) -> Vec<String> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .map(|(_, title)| title.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, id: &str, title: &str) -> Result<(), NotifyError> {
            if self.failing.contains(title) {
                return Err(NotifyError::Rejected {
                    id: id.to_owned(),
                    reason: "device unregistered".into(),
                });
            }
            self.delivered
                .lock()
                .unwrap()
                .push((id.to_owned(), title.to_owned()));
            Ok(())
        }
    }

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        ts(s).with_timezone(&Utc)
    }

    fn scanner(store: &Arc<TaskStore>, notifier: &Arc<RecordingNotifier>) -> NotificationScanner {
        NotificationScanner::new(Arc::clone(store), Arc::clone(notifier) as Arc<dyn Notifier>)
    }

    #[tokio::test]
    async fn pay_bills_scenario() {
        let store = Arc::new(TaskStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let record = store.create(TaskDraft::titled("pay bills").due(ts("2024-01-01T00:00:00Z")));
        let scanner = scanner(&store, &notifier);

        let first = scanner.scan(utc("2024-01-01T00:00:00Z")).await;
        assert_eq!(first.dispatched, 1);
        assert!(store.get_by_id(&record.id).unwrap().notification_sent);

        let second = scanner.scan(utc("2024-01-02T00:00:00Z")).await;
        assert_eq!(second, ScanReport::default());
        assert_eq!(notifier.titles(), vec!["pay bills".to_owned()]);
        assert_eq!(notifier.delivered.lock().unwrap()[0].0, record.id);
    }

    #[tokio::test]
    async fn not_yet_due_is_left_alone() {
        let store = Arc::new(TaskStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let record = store.create(TaskDraft::titled("later").due(ts("2024-01-01T00:00:01Z")));

        let report = scanner(&store, &notifier).scan(utc("2024-01-01T00:00:00Z")).await;
        assert_eq!(report, ScanReport::default());
        assert!(!store.get_by_id(&record.id).unwrap().notification_sent);
    }

    #[tokio::test]
    async fn repeated_scan_without_time_advance_is_idempotent() {
        let store = Arc::new(TaskStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        store.create(TaskDraft::titled("a").due(ts("2024-01-01T00:00:00Z")));
        store.create(TaskDraft::titled("b").due(ts("2023-06-01T00:00:00Z")));
        let scanner = scanner(&store, &notifier);
        let now = utc("2024-01-01T00:00:00Z");

        assert_eq!(scanner.scan(now).await.dispatched, 2);
        assert_eq!(scanner.scan(now).await.dispatched, 0);
        assert_eq!(notifier.titles(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[tokio::test]
    async fn failure_is_isolated_and_retried() {
        let store = Arc::new(TaskStore::new());
        let notifier = Arc::new(RecordingNotifier::failing_for(&["broken"]));
        let broken = store.create(TaskDraft::titled("broken").due(ts("2024-01-01T00:00:00Z")));
        let fine = store.create(TaskDraft::titled("fine").due(ts("2024-01-01T00:00:00Z")));
        let scanner = scanner(&store, &notifier);
        let now = utc("2024-01-01T00:00:00Z");

        let report = scanner.scan(now).await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed, 1);
        assert!(!store.get_by_id(&broken.id).unwrap().notification_sent);
        assert!(store.get_by_id(&fine.id).unwrap().notification_sent);

        let retry = scanner.scan(now).await;
        assert_eq!(retry.failed, 1);
        assert_eq!(retry.dispatched, 0);
        assert_eq!(notifier.titles(), vec!["fine".to_owned()]);
    }

    /// Panics on titles listed in `panicking`, delivers everything else.
    struct PanickingNotifier {
        panicking: HashSet<String>,
        delivered: Mutex<Vec<String>>,
    }

    impl PanickingNotifier {
        fn on(titles: &[&str]) -> Self {
            Self {
                panicking: titles.iter().map(|t| (*t).to_owned()).collect(),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Notifier for PanickingNotifier {
        async fn notify(&self, _id: &str, title: &str) -> Result<(), NotifyError> {
            if self.panicking.contains(title) {
                panic!("notifier bug on {title}");
            }
            self.delivered.lock().unwrap().push(title.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_notifier_fails_only_its_record() {
        let store = Arc::new(TaskStore::new());
        let boom = store.create(TaskDraft::titled("boom").due(ts("2024-01-01T00:00:00Z")));
        let fine = store.create(TaskDraft::titled("fine").due(ts("2024-01-01T00:00:00Z")));
        let notifier = Arc::new(PanickingNotifier::on(&["boom"]));
        let scanner = NotificationScanner::new(Arc::clone(&store), notifier.clone());
        let now = utc("2024-01-01T00:00:00Z");

        let report = scanner.scan(now).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 1);
        assert!(!store.get_by_id(&boom.id).unwrap().notification_sent);
        assert!(store.get_by_id(&fine.id).unwrap().notification_sent);

        let retry = scanner.scan(now).await;
        assert_eq!(retry.failed, 1);
        assert_eq!(*notifier.delivered.lock().unwrap(), vec!["fine".to_owned()]);
    }

    #[tokio::test]
    async fn spawned_scanner_survives_panicking_notifier() {
        let store = Arc::new(TaskStore::new());
        store.create(TaskDraft::titled("boom").due(ts("2020-01-01T00:00:00Z")));
        let fine = store.create(TaskDraft::titled("fine").due(ts("2020-01-01T00:00:00Z")));
        let notifier = Arc::new(PanickingNotifier::on(&["boom"]));

        let handle = NotificationScanner::new(Arc::clone(&store), notifier.clone())
            .with_period(Duration::from_millis(20))
            .spawn();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !store.get_by_id(&fine.id).unwrap().notification_sent {
            assert!(Instant::now() < deadline, "scanner never marked the healthy todo");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Later ticks keep running after the panic.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());

        handle.stop().await;
        assert_eq!(*notifier.delivered.lock().unwrap(), vec!["fine".to_owned()]);
    }

    #[tokio::test]
    async fn completed_todos_are_still_notified() {
        let store = Arc::new(TaskStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let record = store.create(TaskDraft::titled("done").due(ts("2024-01-01T00:00:00Z")));
        store.update(
            &record.id,
            TaskDraft::titled("done").due(ts("2024-01-01T00:00:00Z")).completed(true),
        );

        let report = scanner(&store, &notifier).scan(utc("2024-01-01T00:00:00Z")).await;
        assert_eq!(report.dispatched, 1);
    }

    /// Deletes `victim` from the store on every delivery.
    struct DeletingNotifier {
        store: Arc<TaskStore>,
        victim: String,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for DeletingNotifier {
        async fn notify(&self, id: &str, _title: &str) -> Result<(), NotifyError> {
            self.store.delete(&self.victim);
            self.delivered.lock().unwrap().push(id.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn candidate_deleted_mid_pass_is_skipped() {
        let store = Arc::new(TaskStore::new());
        let first = store.create(TaskDraft::titled("first").due(ts("2024-01-01T00:00:00Z")));
        let second = store.create(TaskDraft::titled("second").due(ts("2024-01-01T00:00:00Z")));
        let notifier = Arc::new(DeletingNotifier {
            store: Arc::clone(&store),
            victim: second.id.clone(),
            delivered: Mutex::new(Vec::new()),
        });

        let scanner = NotificationScanner::new(Arc::clone(&store), notifier.clone());
        let report = scanner.scan(utc("2024-01-01T00:00:00Z")).await;

        assert_eq!(report.dispatched, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(*notifier.delivered.lock().unwrap(), vec![first.id]);
    }

    #[tokio::test]
    async fn spawned_scanner_ticks_and_stops() {
        let store = Arc::new(TaskStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let record = store.create(TaskDraft::titled("soon").due(ts("2020-01-01T00:00:00Z")));

        let handle = scanner(&store, &notifier)
            .with_period(Duration::from_millis(20))
            .spawn();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !store.get_by_id(&record.id).unwrap().notification_sent {
            assert!(Instant::now() < deadline, "scanner never marked the todo");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let token = handle.cancellation_token();
        handle.stop().await;
        assert!(token.is_cancelled());
        assert_eq!(notifier.titles(), vec!["soon".to_owned()]);
    }

    #[tokio::test]
    async fn external_token_stops_scanner() {
        let store = Arc::new(TaskStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let shutdown = CancellationToken::new();

        let handle = scanner(&store, &notifier)
            .with_period(Duration::from_millis(10))
            .spawn_with_token(shutdown.clone());
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("scanner did not stop");
    }

    #[test]
    fn default_period_is_ten_seconds() {
        let store = Arc::new(TaskStore::new());
        let scanner = NotificationScanner::new(store, Arc::new(LogNotifier));
        assert_eq!(scanner.period(), Duration::from_secs(10));
    }
}
