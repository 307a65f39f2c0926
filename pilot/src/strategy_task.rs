use pilot_core::strategy::{StrategyConfig, StrategyEvent, StrategyStateMachine};
use tokio::sync::mpsc;
use tracing::debug;

use crate::coordinator::CoordinatorMessage;

/// Spawns one strategy process. It drains its inbox one message at a time,
/// finishing each reaction before taking the next, and reports every power
/// command back to the coordinator. When the coordinator replaces it on a
/// race start, the old task drains whatever was still in flight and exits
/// once its sender is gone.
pub fn spawn(
    config: StrategyConfig,
    coordinator: mpsc::Sender<CoordinatorMessage>,
) -> mpsc::Sender<StrategyEvent> {
    let (tx, mut rx) = mpsc::channel(256);
    tokio::spawn(async move {
        let mut machine = StrategyStateMachine::new(config);
        while let Some(event) = rx.recv().await {
            if let Some(command) = machine.handle(event) {
                if coordinator
                    .send(CoordinatorMessage::Power(command))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
        debug!("strategy instance drained, exiting");
    });
    tx
}
