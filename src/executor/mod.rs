//! Background execution: the periodic sweep and the restore-on-wake worker.

pub mod cache;
pub mod timers;
pub mod worker;


use crate::dispatcher::Dispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Background task: push due schedules every `poll_secs`, starting now.
pub async fn sweep_loop(dispatcher: Arc<Dispatcher>, poll_secs: u64) {
    info!("sweep loop started (every {poll_secs}s)");
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let sent = dispatcher.check_and_send_due_notifications().await;
        if sent > 0 {
            info!("sweep loop: {sent} notification(s) sent");
        } else {
            debug!("sweep loop: nothing due");
        }
    }
}
