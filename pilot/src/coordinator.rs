use chrono::Utc;
use pilot_core::strategy::{PowerCommand, StrategyConfig, StrategyEvent};
use pilot_protocol::{PowerControl, RaceMessage};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::PilotConfig;
use crate::link::RelayLink;
use crate::strategy_task;

const INBOX_DEPTH: usize = 1024;

#[derive(Debug)]
pub enum CoordinatorMessage {
    /// An inbound domain event, live or replayed.
    Relay(RaceMessage),
    /// A power command produced by the active strategy instance.
    Power(PowerCommand),
    Announce(String),
    Keepalive,
    Shutdown,
}

/// Owns the single live strategy instance and the outbound relay handle.
/// All inbound events pass through here in arrival order; unknown or stale
/// ones are dropped, never fatal.
pub struct Coordinator<L> {
    link: L,
    vehicle: String,
    access_code: String,
    strategy_config: StrategyConfig,
    inbox: mpsc::Receiver<CoordinatorMessage>,
    outbox: mpsc::Sender<CoordinatorMessage>,
    strategy: mpsc::Sender<StrategyEvent>,
    recorder: Option<mpsc::Sender<RaceMessage>>,
}

impl<L: RelayLink> Coordinator<L> {
    pub fn new(
        link: L,
        config: &PilotConfig,
        recorder: Option<mpsc::Sender<RaceMessage>>,
    ) -> (Self, mpsc::Sender<CoordinatorMessage>) {
        let (outbox, inbox) = mpsc::channel(INBOX_DEPTH);
        let strategy_config = config.strategy();
        let strategy = strategy_task::spawn(strategy_config.clone(), outbox.clone());
        let coordinator = Self {
            link,
            vehicle: config.vehicle.clone(),
            access_code: config.access_code.clone(),
            strategy_config,
            inbox,
            outbox: outbox.clone(),
            strategy,
            recorder,
        };
        (coordinator, outbox)
    }

    pub async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            match message {
                CoordinatorMessage::Relay(event) => self.on_relay(event).await,
                CoordinatorMessage::Power(command) => self.send_power(command).await,
                CoordinatorMessage::Announce(url) => {
                    if let Err(error) = self.link.announce(&url).await {
                        warn!(%error, "endpoint announcement failed");
                    }
                }
                CoordinatorMessage::Keepalive => {
                    if let Err(error) = self.link.ensure_connection().await {
                        warn!(%error, "relay keepalive failed");
                    }
                }
                CoordinatorMessage::Shutdown => break,
            }
        }
    }

    async fn on_relay(&mut self, event: RaceMessage) {
        self.record(&event).await;

        match event {
            RaceMessage::RaceStart => {
                info!("race start, fresh strategy instance");
                self.strategy =
                    strategy_task::spawn(self.strategy_config.clone(), self.outbox.clone());
                self.forward(StrategyEvent::RaceStart).await;
            }
            RaceMessage::RaceStop => info!("race stop"),
            RaceMessage::Sensor(sensor) if sensor.is_calibration_probe() => {
                info!("calibration probe, answering with zero power");
                self.send_power(PowerCommand::zero()).await;
            }
            RaceMessage::Sensor(sensor) => self.forward(StrategyEvent::Sensor(sensor)).await,
            RaceMessage::Velocity(velocity) if velocity.is_calibration_probe() => {
                info!("calibration velocity sample, answering with zero power");
                self.send_power(PowerCommand::zero()).await;
            }
            RaceMessage::Velocity(velocity) => {
                self.forward(StrategyEvent::Velocity(velocity)).await
            }
            RaceMessage::Penalty => self.forward(StrategyEvent::Penalty).await,
            RaceMessage::RoundTime(round) => {
                info!(duration_ms = round.duration_ms, "round time")
            }
            // journaled outbound records resurface during replay; there is
            // nothing to route
            RaceMessage::Power(_) => {}
        }
    }

    async fn forward(&mut self, event: StrategyEvent) {
        if self.strategy.send(event).await.is_err() {
            warn!("active strategy instance is gone, dropping event");
        }
    }

    async fn send_power(&mut self, command: PowerCommand) {
        let control = PowerControl::new(
            command.value(),
            &self.vehicle,
            &self.access_code,
            Utc::now().timestamp_millis(),
        );
        self.record(&RaceMessage::Power(control.clone())).await;
        if let Err(error) = self.link.send_power(&control).await {
            warn!(%error, "dropping power command, relay unreachable");
        }
    }

    async fn record(&self, message: &RaceMessage) {
        if let Some(recorder) = &self.recorder {
            let _ = recorder.send(message.clone()).await;
        }
    }
}
