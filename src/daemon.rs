use crate::broker::{Broker, PublishOutcome, TransportError};
use crate::reading::Reading;
use crate::sensor::{SensorError, TemperatureSensor};
use log::{error, info, warn};
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Reasons the publish loop gave up
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("cannot connect to the MQTT broker: {0}")]
    Connect(TransportError),

    #[error("invalid sensor reading: {0}")]
    Sensor(#[from] SensorError),

    #[error("publish rejected: {0}")]
    Rejected(String),

    #[error("MQTT transport failure: {0}")]
    Transport(TransportError),
}

/// Delays of the publish loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Delay between two readings. Default: 60 seconds
    pub publish_interval: Duration,

    /// Pause after a failed publish, before handing back to the caller. Default: 10 seconds
    pub cooldown: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            publish_interval: Duration::from_secs(60),
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Daemon that periodically publishes the temperature to the broker
pub struct Daemon<'a, B: Broker> {
    sensor: &'a mut TemperatureSensor,
    broker: B,
    topic: String,
    timing: Timing,
}

impl<'a, B: Broker> Daemon<'a, B> {
    pub fn new(sensor: &'a mut TemperatureSensor, broker: B, topic: &str, timing: Timing) -> Self {
        Daemon {
            sensor,
            broker,
            topic: topic.to_string(),
            timing,
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Connects, then reads and publishes until something fails
    ///
    /// Only ever returns an error. A publish failure is followed by a single disconnect attempt
    /// and the cooldown before returning, so the caller can start over with a fresh connection.
    pub async fn run(&mut self) -> Result<Infallible, DaemonError> {
        info!("Connecting to MQTT broker {}", self.broker.address());
        if let Err(err) = self.broker.connect().await {
            error!("MQTT client connection failed: {err}");
            return Err(DaemonError::Connect(err));
        }

        loop {
            let failure = match self.publish_update().await? {
                PublishOutcome::Published => {
                    match self.broker.idle(self.timing.publish_interval).await {
                        Ok(()) => continue,
                        Err(err) => {
                            error!("MQTT connection lost: {err}");
                            DaemonError::Transport(err)
                        }
                    }
                }
                PublishOutcome::Rejected(reason) => {
                    warn!("Publish was rejected: {reason}");
                    DaemonError::Rejected(reason)
                }
                PublishOutcome::Transport(err) => {
                    error!("MQTT client publish failed: {err}");
                    DaemonError::Transport(err)
                }
            };

            self.cool_down().await;
            return Err(failure);
        }
    }

    /// Takes a reading, logs it and publishes it
    async fn publish_update(&mut self) -> Result<PublishOutcome, SensorError> {
        let reading = Reading::take(self.sensor)?;
        info!("{}: {reading}", self.topic);

        Ok(self.broker.publish(&self.topic, reading.payload()).await)
    }

    /// Drops the connection and waits, so a restart doesn't hammer the broker
    async fn cool_down(&mut self) {
        if let Err(err) = self.broker.disconnect().await {
            warn!("MQTT client disconnect failed, ignoring: {err}");
        }
        sleep(self.timing.cooldown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::ScriptedBroker;
    use crate::sensor::mock::analog;
    use tokio::time::Instant;

    const TOPIC: &str = "test/temperatureF";

    /// Virtual time is rounded to the millisecond by the timer
    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "waited {elapsed:?}, expected {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_publish() {
        let mut sensor = analog(25.0, 0.0);
        let broker = ScriptedBroker::answering(vec![PublishOutcome::Rejected(String::from("4"))]);
        let mut daemon = Daemon::new(&mut sensor, broker, TOPIC, Timing::default());

        let start = Instant::now();
        let result = daemon.run().await;

        assert!(matches!(result, Err(DaemonError::Rejected(ref r)) if r == "4"));
        assert_elapsed(start, Duration::from_secs(10));
        assert_eq!(daemon.broker().connects, 1);
        assert_eq!(daemon.broker().disconnects, 1);
        assert_eq!(
            daemon.broker().published,
            vec![(TOPIC.to_string(), String::from("77.00"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_disconnect_ignored() {
        let mut sensor = analog(25.0, 0.0);
        let mut broker = ScriptedBroker::answering(vec![PublishOutcome::Transport(
            TransportError::NoHostname,
        )]);
        broker.fail_disconnect = true;
        let mut daemon = Daemon::new(&mut sensor, broker, TOPIC, Timing::default());

        let start = Instant::now();
        let result = daemon.run().await;

        assert!(matches!(result, Err(DaemonError::Transport(_))));
        assert_elapsed(start, Duration::from_secs(10));
        assert_eq!(daemon.broker().disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_while_waiting() {
        let mut sensor = analog(25.0, 0.0);
        let broker = ScriptedBroker {
            fail_idle: true,
            ..ScriptedBroker::answering(vec![PublishOutcome::Published])
        };
        let mut daemon = Daemon::new(&mut sensor, broker, TOPIC, Timing::default());

        let start = Instant::now();
        let result = daemon.run().await;

        assert!(matches!(
            result,
            Err(DaemonError::Transport(TransportError::Connection(_)))
        ));
        // Half the publish interval before the connection drops, then the cooldown
        assert_elapsed(start, Duration::from_secs(30 + 10));
        assert_eq!(daemon.broker().published.len(), 1);
        assert_eq!(daemon.broker().disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_every_interval() {
        let mut sensor = analog(25.0, -5.0);
        let broker = ScriptedBroker::answering(vec![
            PublishOutcome::Published,
            PublishOutcome::Published,
            PublishOutcome::Published,
        ]);
        let timing = Timing {
            publish_interval: Duration::from_secs(60),
            cooldown: Duration::from_secs(5),
        };
        let mut daemon = Daemon::new(&mut sensor, broker, TOPIC, timing);

        let start = Instant::now();
        let result = daemon.run().await;

        // Three published, the fourth rejected by the end of the script
        assert!(matches!(result, Err(DaemonError::Rejected(_))));
        assert_elapsed(start, Duration::from_secs(3 * 60 + 5));
        assert_eq!(daemon.broker().connects, 1);
        assert_eq!(daemon.broker().disconnects, 1);
        assert_eq!(daemon.broker().published.len(), 4);
        for (topic, payload) in &daemon.broker().published {
            assert_eq!(topic, TOPIC);
            assert_eq!(payload, "68.00");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_refused() {
        let mut sensor = analog(25.0, 0.0);
        let broker = ScriptedBroker {
            refuse_connection: true,
            ..Default::default()
        };
        let mut daemon = Daemon::new(&mut sensor, broker, TOPIC, Timing::default());

        let start = Instant::now();
        let result = daemon.run().await;

        assert!(matches!(result, Err(DaemonError::Connect(_))));
        // Returned straight away, the caller decides when to retry
        assert_elapsed(start, Duration::ZERO);
        assert!(daemon.broker().published.is_empty());
        assert_eq!(daemon.broker().disconnects, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_reading_not_published() {
        let mut sensor = analog(25.0, 110.0);
        let broker = ScriptedBroker::answering(vec![PublishOutcome::Published]);
        let mut daemon = Daemon::new(&mut sensor, broker, TOPIC, Timing::default());

        let result = daemon.run().await;

        assert!(matches!(
            result,
            Err(DaemonError::Sensor(SensorError::OutOfRange(t))) if t == 135.0
        ));
        assert!(daemon.broker().published.is_empty());
    }
}
