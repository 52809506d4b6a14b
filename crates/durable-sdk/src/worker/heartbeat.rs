//! Heartbeat coalescing: buffers the latest heartbeat
//! details an activity records and flushes them to the bridge at most once
//! per configured interval, flipping the task's cancellation token when the
//! server reports `cancel_requested`.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{trace, warn};

use crate::bridge::{BridgeWorker, TaskToken};
use crate::cancellation::CancellationToken;
use crate::payload::Payload;

/// Drains `details` updates sent by a running activity's
/// [`super::ActivityContext::heartbeat`] calls, coalescing them into
/// at-most-one `record_activity_heartbeat` per `interval`, until the sender
/// side is dropped (the activity finished). Any details buffered since the
/// last flush are sent one final time before returning.
pub(super) async fn run_coalescer<B: BridgeWorker>(
    bridge: &B,
    task_token: TaskToken,
    cancellation_token: CancellationToken,
    interval: Duration,
    mut updates: UnboundedReceiver<Vec<Payload>>,
) {
    let mut latest: Option<Vec<Payload>> = None;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            received = updates.recv() => {
                match received {
                    Some(details) => latest = Some(details),
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if let Some(details) = latest.take() {
                    flush(bridge, &task_token, &cancellation_token, details).await;
                }
            }
        }
    }

    if let Some(details) = latest.take() {
        flush(bridge, &task_token, &cancellation_token, details).await;
    }
}

async fn flush<B: BridgeWorker>(
    bridge: &B,
    task_token: &TaskToken,
    cancellation_token: &CancellationToken,
    details: Vec<Payload>,
) {
    match bridge.record_activity_heartbeat(task_token.clone(), details).await {
        Ok(response) => {
            if response.cancel_requested {
                cancellation_token.cancel();
            }
            trace!("flushed activity heartbeat");
        }
        Err(err) => warn!(%err, "failed to record activity heartbeat"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::InMemoryBridge;

    #[tokio::test]
    async fn coalesces_rapid_updates_into_one_flush_on_completion() {
        let bridge = InMemoryBridge::new();
        let token = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tx.send(vec![]).unwrap();
        tx.send(vec![]).unwrap();
        drop(tx);

        run_coalescer(&bridge, TaskToken(vec![1]), token.clone(), Duration::from_secs(60), rx).await;

        assert_eq!(bridge.recorded_heartbeats().len(), 1);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_requested_response_flips_the_token() {
        let bridge = InMemoryBridge::new();
        let token = CancellationToken::new();
        let task_token = TaskToken(vec![2]);
        bridge.request_cancellation(task_token.clone());

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(vec![]).unwrap();
        drop(tx);

        run_coalescer(&bridge, task_token, token.clone(), Duration::from_secs(60), rx).await;

        assert!(token.is_cancelled());
    }
}
