//! # temperature-mqtt
//!
//! `temperature-mqtt` reads a TC74 or TMP36 temperature sensor and publishes the temperature in
//! degrees Fahrenheit to an MQTT broker once a minute.
//!
//!

pub use self::broker::Broker;
pub use self::broker::MqttBroker;
pub use self::broker::PublishOutcome;
pub use self::configuration::Component;
pub use self::configuration::Configuration;
pub use self::daemon::Daemon;
pub use self::reading::Reading;
pub use self::sensor::TemperatureSensor;
pub use self::supervisor::Supervisor;

/// Contains the broker connection
pub mod broker;
/// Contains the configuration stuff
pub mod configuration;
/// Contains the publish loop
pub mod daemon;
/// Contains the measurement that is sent to MQTT
pub mod reading;
/// Contains the sensor session and its validation
pub mod sensor;
/// Contains the outer restart loop
pub mod supervisor;
/// TC74 digital sensor driver
pub mod tc74;
/// TMP36 analog sensor and MCP3008 converter driver
pub mod tmp36;
/// Temperature unit conversions
pub mod units;
