use convert_case::{Case, Casing};
use ini::Ini;
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

/// Configuration file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_PATH: &str = "config.ini";

/// Topic used when the configuration doesn't set one
pub const DEFAULT_TOPIC: &str = "temperatureF";

/// Default MQTT port
pub const DEFAULT_PORT: u16 = 1883;

/// Default log verbosity, info
pub const DEFAULT_LOG_VERBOSITY: usize = 2;

const MQTT_SECTION: &str = "MQTT";
const HOSTNAME_KEY: &str = "Hostname";
const PORT_KEY: &str = "Port";
const TOPIC_KEY: &str = "Topic";
const CLIENT_ID_KEY: &str = "ClientId";
const TEMPERATURE_SECTION: &str = "Temperature";
const COMPONENT_KEY: &str = "Component";
const OFFSET_C_KEY: &str = "OffsetC";
const LOGGING_SECTION: &str = "Logging";
const VERBOSITY_KEY: &str = "Verbosity";

/// Errors raised while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The only fatal error: nothing can be published without a broker
    #[error("no hostname found in the {} configuration file", .path.display())]
    MissingHostname { path: PathBuf },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ini::ParseError,
    },
}

/// The temperature sensor wired to the machine
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Component {
    /// TC74 digital sensor on the I2C bus
    #[strum(serialize = "TC74")]
    Tc74,

    /// TMP36 analog sensor behind an MCP3008
    #[default]
    #[strum(serialize = "TMP36")]
    Tmp36,
}

/// Contains the configuration for communicating with the MQTT broker
#[derive(Debug, Clone, PartialEq)]
pub struct Mqtt {
    /// Hostname or IP address of the broker. Required
    pub hostname: String,

    /// Port of the broker. Default: 1883
    pub port: u16,

    /// Topic the temperature is published to. Default: temperatureF
    pub topic: String,

    /// MQTT client identifier. Default: derived from the machine hostname
    pub client_id: String,
}

/// Contains the configuration for the sensor
#[derive(Debug, Clone, PartialEq)]
pub struct Temperature {
    /// Sensor to read. Default: TMP36
    pub component: Component,

    /// Calibration offset added to every reading, in °C. Default: 0
    pub offset_c: f64,
}

/// Contains all the configuration for `temperature-mqtt`
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub mqtt: Mqtt,
    pub temperature: Temperature,

    /// Sets the verbosity of the logs.
    ///  * 0 => Error
    ///  * 1 => Warning
    ///  * 2 => Info
    ///  * 3 => Debug
    ///  * 4 => Trace
    pub log_verbosity: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            mqtt: Mqtt {
                hostname: String::new(),
                port: DEFAULT_PORT,
                topic: DEFAULT_TOPIC.to_string(),
                client_id: default_client_id(),
            },
            temperature: Temperature {
                component: Component::default(),
                offset_c: 0.0,
            },
            log_verbosity: DEFAULT_LOG_VERBOSITY,
        }
    }
}

/// Client identifier built from the machine hostname
fn default_client_id() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| String::from("unknown"));
    format!("temperature-mqtt-{}", host.to_case(Case::Kebab))
}

/// Looks a key up, ignoring its case. Empty values count as missing.
fn property<'a>(config: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    config
        .section(Some(section))?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

/// Parses an optional value, keeping the default when absent or invalid
fn parsed<T: FromStr + std::fmt::Display>(config: &Ini, section: &str, key: &str, default: T) -> T {
    let Some(value) = property(config, section, key) else {
        return default;
    };
    match value.parse() {
        Ok(parsed) => {
            debug!("{section}.{key} set to {parsed}");
            parsed
        }
        Err(_) => {
            warn!("{section}.{key} value is not valid: {value}, using {default}");
            default
        }
    }
}

impl Configuration {
    /// Load the configuration from a file
    ///
    /// A missing file is not an error: every value takes its default and the hostname stays
    /// empty. A file without a hostname is.
    ///
    /// ## Example
    ///
    /// ```
    /// use temperature_mqtt::{configuration, Configuration};
    ///
    /// let config = Configuration::load("conf/config.ini").expect("Cannot load configuration");
    ///
    /// assert_eq!(config.mqtt.hostname, "localhost");
    /// assert_eq!(config.mqtt.topic, configuration::DEFAULT_TOPIC);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Configuration, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents, path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let cwd = std::env::current_dir().unwrap_or_default();
                warn!(
                    "No configuration file found at {} (current directory: {})",
                    path.display(),
                    cwd.display()
                );
                Ok(Configuration::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse the configuration from the contents of `path`
    pub fn parse(contents: &str, path: &Path) -> Result<Configuration, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Configuration::default();

        let Some(hostname) = property(&ini, MQTT_SECTION, HOSTNAME_KEY) else {
            error!(
                "No hostname found in the {} configuration file",
                path.display()
            );
            error!(
                "Please set it by adding a \"{HOSTNAME_KEY} = hostname.com\" configuration value to the [{MQTT_SECTION}] section of the configuration file {}",
                path.display()
            );
            return Err(ConfigError::MissingHostname {
                path: path.to_path_buf(),
            });
        };
        config.mqtt.hostname = hostname.to_string();
        config.mqtt.port = parsed(&ini, MQTT_SECTION, PORT_KEY, DEFAULT_PORT);

        match property(&ini, MQTT_SECTION, TOPIC_KEY) {
            Some(topic) => config.mqtt.topic = topic.to_string(),
            None => {
                warn!(
                    "{TOPIC_KEY} key not found in the {} configuration file",
                    path.display()
                );
                info!("Using default MQTT topic: {}", config.mqtt.topic);
            }
        }

        if let Some(client_id) = property(&ini, MQTT_SECTION, CLIENT_ID_KEY) {
            config.mqtt.client_id = client_id.to_string();
        }

        match property(&ini, TEMPERATURE_SECTION, COMPONENT_KEY) {
            Some(_) => {
                config.temperature.component = parsed(
                    &ini,
                    TEMPERATURE_SECTION,
                    COMPONENT_KEY,
                    Component::default(),
                );
            }
            None => {
                warn!(
                    "{COMPONENT_KEY} key not found in the {} configuration file",
                    path.display()
                );
                info!(
                    "Will try using default component: {}",
                    config.temperature.component
                );
            }
        }

        if property(&ini, TEMPERATURE_SECTION, OFFSET_C_KEY).is_some() {
            config.temperature.offset_c = parsed(&ini, TEMPERATURE_SECTION, OFFSET_C_KEY, 0.0);
        } else {
            warn!(
                "{OFFSET_C_KEY} key not found in the {} configuration file",
                path.display()
            );
            info!(
                "Defaulting to no temperature offset. Configure with {TEMPERATURE_SECTION}.{OFFSET_C_KEY}"
            );
        }

        config.log_verbosity = parsed(
            &ini,
            LOGGING_SECTION,
            VERBOSITY_KEY,
            DEFAULT_LOG_VERBOSITY,
        );

        Ok(config)
    }

    /// Reads only the log verbosity, before logging is set up
    ///
    /// Any problem with the file silently gives the default.
    pub fn log_verbosity<P: AsRef<Path>>(path: P) -> usize {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| Ini::load_from_str(&contents).ok())
            .and_then(|ini| {
                property(&ini, LOGGING_SECTION, VERBOSITY_KEY).and_then(|v| v.parse().ok())
            })
            .unwrap_or(DEFAULT_LOG_VERBOSITY)
    }
}
