//! Due-notification sweep over the durable schedule store.

use super::Dispatcher;
use tracing::info;

impl Dispatcher {
    /// Push every due schedule and purge it.
    ///
    /// Bound schedules go to their subscription; unbound ones (or ones whose
    /// subscription has disappeared) are broadcast to every subscription.
    /// Each attempted schedule is removed whether or not a send succeeded,
    /// so delivery is at-most-once. Returns the number of successful sends.
    ///
    /// Concurrent calls run one after another; a later call sees the purge
    /// of an earlier one.
    pub async fn check_and_send_due_notifications(&self) -> usize {
        let _sweeping = self.sweep_lock.lock().await;
        let now = self.clock.now();
        let schedules = self.store.list().await;
        let subscriptions = self.push.registry().list().await;

        let mut sent = 0;
        let mut attempted = Vec::new();

        for schedule in schedules.iter().filter(|s| s.is_due(now)) {
            info!("sweep: sending due notification {}", schedule.task_id);
            let payload = schedule.payload();

            sent += self
                .push
                .deliver(&subscriptions, &schedule.subscription_endpoint, &payload)
                .await;

            attempted.push(schedule.id.clone());
        }

        if !attempted.is_empty() {
            self.store.remove_by_ids(&attempted).await;
            info!(
                "sweep: {} due, {sent} sent, {} pending",
                attempted.len(),
                schedules.len() - attempted.len()
            );
        }

        sent
    }
}
