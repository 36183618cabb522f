use crate::sensor::{SensorError, TemperatureSensor};
use crate::units::celsius_to_fahrenheit;
use chrono::{DateTime, Local};
use std::fmt;

/// One temperature measurement, ready to be logged and published
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub celsius: f64,
    pub fahrenheit: f64,
    pub taken_at: DateTime<Local>,
}

impl Reading {
    /// Builds a reading from a validated Celsius value, timestamped now
    pub fn new(celsius: f64) -> Reading {
        Reading {
            celsius,
            fahrenheit: celsius_to_fahrenheit(celsius),
            taken_at: Local::now(),
        }
    }

    /// Reads the sensor and converts the value
    pub fn take(sensor: &mut TemperatureSensor) -> Result<Reading, SensorError> {
        Ok(Reading::new(sensor.temperature_c()?))
    }

    /// MQTT payload: the Fahrenheit value rounded to 2 decimals
    ///
    /// ```
    /// use temperature_mqtt::Reading;
    ///
    /// assert_eq!(Reading::new(21.0).payload(), "69.80");
    /// ```
    pub fn payload(&self) -> String {
        format!("{:.2}", self.fahrenheit)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}]: {:.2} ºF ({:.2} ºC)",
            self.taken_at.format("%Y-%m-%d %H:%M:%S"),
            self.fahrenheit,
            self.celsius
        )
    }
}
