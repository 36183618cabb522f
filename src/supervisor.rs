use crate::broker::Broker;
use crate::configuration::{ConfigError, Configuration, Mqtt, Temperature};
use crate::daemon::{Daemon, DaemonError, Timing};
use crate::sensor::{SensorError, TemperatureSensor};
use log::{error, info, warn};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Default pause before starting over after a failure
pub const RESTART_DELAY: Duration = Duration::from_secs(60);

/// Why one round of the supervisor ended
#[derive(Debug, Error)]
pub enum Failure {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open the sensor: {0}")]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Keeps the daemon running: reloads the configuration, reopens the sensor and reconnects to
/// the broker after every failure
pub struct Supervisor {
    config_path: PathBuf,
    restart_delay: Duration,
    timing: Timing,
}

impl Supervisor {
    pub fn new<P: Into<PathBuf>>(config_path: P) -> Supervisor {
        Supervisor {
            config_path: config_path.into(),
            restart_delay: RESTART_DELAY,
            timing: Timing::default(),
        }
    }

    pub fn with_timing(mut self, timing: Timing, restart_delay: Duration) -> Supervisor {
        self.timing = timing;
        self.restart_delay = restart_delay;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Runs forever, unless the configuration has no broker hostname
    ///
    /// `open_sensor` and `open_broker` build fresh hardware and broker handles for every round.
    pub async fn run<S, F, B>(
        &self,
        mut open_sensor: S,
        mut open_broker: F,
    ) -> Result<Infallible, ConfigError>
    where
        S: FnMut(&Temperature) -> Result<TemperatureSensor, SensorError>,
        F: FnMut(&Mqtt) -> B,
        B: Broker,
    {
        loop {
            let Err(failure) = self.round(&mut open_sensor, &mut open_broker).await;

            match failure {
                Failure::Config(err @ ConfigError::MissingHostname { .. }) => return Err(err),
                failure => warn!("Main loop encountered an error: {failure}"),
            }

            info!(
                "Sleeping for {} seconds before restarting main loop",
                self.restart_delay.as_secs()
            );
            sleep(self.restart_delay).await;
        }
    }

    /// One round: configuration, sensor, broker, then the publish loop until it fails
    async fn round<S, F, B>(
        &self,
        open_sensor: &mut S,
        open_broker: &mut F,
    ) -> Result<Infallible, Failure>
    where
        S: FnMut(&Temperature) -> Result<TemperatureSensor, SensorError>,
        F: FnMut(&Mqtt) -> B,
        B: Broker,
    {
        let config = Configuration::load(&self.config_path)?;

        let mut sensor = open_sensor(&config.temperature).inspect_err(|err| {
            error!("Cannot open the {} sensor: {err}", config.temperature.component);
        })?;
        let broker = open_broker(&config.mqtt);

        Daemon::new(&mut sensor, broker, &config.mqtt.topic, self.timing)
            .run()
            .await
            .map_err(Failure::from)
    }
}
