use crate::configuration::Mqtt;
use log::{debug, info, trace};
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};

/// Keep alive interval announced to the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Longest wait for the broker to answer a connect, publish or disconnect
pub const BROKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures of the connection to the broker
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no broker hostname configured")]
    NoHostname,

    #[error("MQTT client error: {0}")]
    Client(#[from] ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("no answer from the broker after {0:?}")]
    Timeout(Duration),
}

/// Result of a publish
#[derive(Debug)]
pub enum PublishOutcome {
    /// The broker acknowledged the message
    Published,

    /// The client or the broker refused the message
    Rejected(String),

    /// The connection to the broker failed
    Transport(TransportError),
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PublishOutcome::Published => write!(f, "published"),
            PublishOutcome::Rejected(reason) => write!(f, "rejected: {reason}"),
            PublishOutcome::Transport(err) => write!(f, "transport failure: {err}"),
        }
    }
}

/// A message broker the daemon publishes to
#[allow(async_fn_in_trait)]
pub trait Broker {
    /// Where the broker is, for the logs
    fn address(&self) -> String;

    /// Opens the connection and waits for the broker to accept it
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Publishes a retained message
    async fn publish(&mut self, topic: &str, payload: String) -> PublishOutcome;

    /// Waits for `period` while keeping the connection alive
    async fn idle(&mut self, period: Duration) -> Result<(), TransportError>;

    /// Closes the connection
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// MQTT broker reached through `rumqttc`
///
/// The event loop is polled inline by every operation, so nothing runs in the background.
pub struct MqttBroker {
    host: String,
    port: u16,
    client: AsyncClient,
    event_loop: EventLoop,

    /// Whether the event loop holds a live network connection
    connected: bool,
}

impl MqttBroker {
    /// Prepares a client for the configured broker. Nothing is sent until `connect`.
    ///
    /// ```
    /// use temperature_mqtt::{Broker, Configuration, MqttBroker};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let config = Configuration::load("conf/config.ini").expect("Cannot load configuration");
    /// let broker = MqttBroker::new(&config.mqtt);
    ///
    /// assert_eq!(broker.address(), "localhost:1883");
    /// # }
    /// ```
    pub fn new(config: &Mqtt) -> MqttBroker {
        let mut options = MqttOptions::new(&config.client_id, &config.hostname, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(options, 10);

        MqttBroker {
            host: config.hostname.clone(),
            port: config.port,
            client,
            event_loop,
            connected: false,
        }
    }

    /// Polls the event loop once, keeping track of the connection state
    ///
    /// On error `rumqttc` drops the network and queues unacknowledged requests for the next
    /// connection.
    async fn poll(&mut self) -> Result<Event, TransportError> {
        match self.event_loop.poll().await {
            Ok(event) => {
                trace!("MQTT notification received: {event:?}");
                if let Event::Incoming(Packet::ConnAck(_)) = event {
                    self.connected = true;
                }
                Ok(event)
            }
            Err(err) => {
                self.connected = false;
                Err(err.into())
            }
        }
    }

    /// Polls the event loop until `done` accepts an event
    async fn poll_until<F>(&mut self, mut done: F) -> Result<(), TransportError>
    where
        F: FnMut(&Event) -> bool,
    {
        let wait = async {
            loop {
                let event = self.poll().await?;
                if done(&event) {
                    break;
                }
            }
            Ok::<(), TransportError>(())
        };

        timeout(BROKER_TIMEOUT, wait)
            .await
            .map_err(|_| TransportError::Timeout(BROKER_TIMEOUT))?
    }
}

impl Broker for MqttBroker {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.host.is_empty() {
            return Err(TransportError::NoHostname);
        }

        self.poll_until(|event| matches!(event, Event::Incoming(Packet::ConnAck(_))))
            .await?;
        info!("Connected to MQTT broker {}", self.address());

        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: String) -> PublishOutcome {
        debug!("Publishing to topic {topic} : {payload}");
        if let Err(err) = self
            .client
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await
        {
            return PublishOutcome::Rejected(err.to_string());
        }

        match self
            .poll_until(|event| matches!(event, Event::Incoming(Packet::PubAck(_))))
            .await
        {
            Ok(()) => PublishOutcome::Published,
            Err(TransportError::Connection(ConnectionError::ConnectionRefused(code))) => {
                PublishOutcome::Rejected(format!("connection refused: {code:?}"))
            }
            Err(err) => PublishOutcome::Transport(err),
        }
    }

    async fn idle(&mut self, period: Duration) -> Result<(), TransportError> {
        let deadline = sleep(period);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return Ok(()),
                event = self.poll() => {
                    event?;
                }
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            // Polling now would reconnect and replay the unacknowledged publish
            debug!(
                "Connection to {} already closed, dropping {} pending request(s)",
                self.address(),
                self.event_loop.pending.len()
            );
            self.event_loop.pending.clear();
            return Ok(());
        }

        self.client.disconnect().await?;
        self.poll_until(|event| matches!(event, Event::Outgoing(Outgoing::Disconnect)))
            .await?;
        self.connected = false;

        Ok(())
    }
}
