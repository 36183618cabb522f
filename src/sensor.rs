use crate::configuration::{Component, Temperature};
use crate::tc74::Tc74;
use crate::tmp36::Tmp36;
use log::info;
use thiserror::Error;

/// Lowest temperature both supported sensors can report, in °C
pub const MIN_VALID_TEMP_C: f64 = -40.0;

/// Highest temperature both supported sensors can report, in °C
pub const MAX_VALID_TEMP_C: f64 = 125.0;

/// Errors raised while talking to a sensor or validating its output
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("I2C bus error: {0}")]
    I2c(#[from] i2cdev::linux::LinuxI2CError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPIO error: {0}")]
    Gpio(#[from] sysfs_gpio::Error),

    /// The offset reading is outside what the hardware can physically measure
    #[error(
        "temperature reading should be between {min} °C and {max} °C but was instead {0} °C",
        min = MIN_VALID_TEMP_C,
        max = MAX_VALID_TEMP_C
    )]
    OutOfRange(f64),
}

/// Byte-wide register access on a two-wire bus device
pub trait RegisterBus {
    /// Reads one register
    fn read_register(&mut self, register: u8) -> Result<u8, SensorError>;

    /// Writes one register
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError>;
}

/// A single analog-to-digital converter input
pub trait AnalogChannel {
    /// Samples the input and returns its voltage
    fn voltage(&mut self) -> Result<f64, SensorError>;
}

/// The supported sensor hardware
pub enum Device {
    /// TC74 on the I2C bus, whole degrees
    Digital(Tc74),

    /// TMP36 behind an analog-to-digital converter
    Analog(Tmp36),
}

impl Device {
    /// Component the device corresponds to in the configuration
    pub fn component(&self) -> Component {
        match self {
            Device::Digital(_) => Component::Tc74,
            Device::Analog(_) => Component::Tmp36,
        }
    }
}

/// A sensor session: one piece of hardware and its calibration offset
///
/// ## Example
///
/// ```
/// use temperature_mqtt::sensor::{AnalogChannel, Device, SensorError, TemperatureSensor};
/// use temperature_mqtt::tmp36::Tmp36;
///
/// struct Fixed(f64);
///
/// impl AnalogChannel for Fixed {
///     fn voltage(&mut self) -> Result<f64, SensorError> {
///         Ok(self.0)
///     }
/// }
///
/// let mut sensor = TemperatureSensor::new(Device::Analog(Tmp36::new(Box::new(Fixed(0.75)))), -1.5);
///
/// assert_eq!(sensor.temperature_c().unwrap(), 23.5);
/// ```
pub struct TemperatureSensor {
    device: Device,
    offset_c: f64,
}

impl TemperatureSensor {
    pub fn new(device: Device, offset_c: f64) -> TemperatureSensor {
        TemperatureSensor { device, offset_c }
    }

    /// Opens the hardware selected by the configuration
    pub fn open(config: &Temperature) -> Result<TemperatureSensor, SensorError> {
        let device = match config.component {
            Component::Tc74 => Device::Digital(Tc74::open()?),
            Component::Tmp36 => Device::Analog(Tmp36::open()?),
        };
        info!(
            "Using {} sensor with a {} °C offset",
            config.component, config.offset_c
        );

        Ok(TemperatureSensor::new(device, config.offset_c))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Reads the sensor without applying the offset
    pub fn read_raw_celsius(&mut self) -> Result<f64, SensorError> {
        match &mut self.device {
            Device::Digital(tc74) => tc74.read_celsius().map(f64::from),
            Device::Analog(tmp36) => tmp36.read_celsius(),
        }
    }

    /// Reads the sensor, applies the offset and checks the result is plausible
    pub fn temperature_c(&mut self) -> Result<f64, SensorError> {
        let celsius = self.read_raw_celsius()? + self.offset_c;
        if !(MIN_VALID_TEMP_C..=MAX_VALID_TEMP_C).contains(&celsius) {
            return Err(SensorError::OutOfRange(celsius));
        }

        Ok(celsius)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    fn digital(raw: i8, offset_c: f64) -> TemperatureSensor {
        let bus = FakeRegisters::with(&[(0x00, raw as u8), (0x01, 0x40)]);
        let tc74 = Tc74::new(Box::new(bus)).expect("Cannot create TC74");
        TemperatureSensor::new(Device::Digital(tc74), offset_c)
    }

    #[test]
    fn test_offset_applied() -> Result<(), SensorError> {
        for raw in [-35_i8, -5, 0, 21, 100, 120] {
            for offset in [-5.0, 0.0, 2.5] {
                let mut sensor = digital(raw, offset);
                assert_eq!(sensor.read_raw_celsius()?, f64::from(raw));
                assert_eq!(sensor.temperature_c()?, f64::from(raw) + offset);
            }
        }
        Ok(())
    }

    #[test]
    fn test_bounds_inclusive() -> Result<(), SensorError> {
        assert_eq!(digital(-35, -5.0).temperature_c()?, MIN_VALID_TEMP_C);
        assert_eq!(digital(120, 5.0).temperature_c()?, MAX_VALID_TEMP_C);
        Ok(())
    }

    #[test]
    fn test_out_of_range() {
        // Raw value is in range, the offset pushes it out
        let err = digital(-38, -5.0).temperature_c().unwrap_err();
        assert!(matches!(err, SensorError::OutOfRange(t) if t == -43.0));

        let err = digital(125, 0.5).temperature_c().unwrap_err();
        assert!(matches!(err, SensorError::OutOfRange(t) if t == 125.5));

        // 3.3V on a TMP36 means 280 °C, a wiring fault
        let mut sensor = TemperatureSensor::new(
            Device::Analog(Tmp36::new(Box::new(FixedVoltage(3.3)))),
            0.0,
        );
        assert!(matches!(
            sensor.temperature_c(),
            Err(SensorError::OutOfRange(_))
        ));

        let mut sensor = TemperatureSensor::new(
            Device::Analog(Tmp36::new(Box::new(FixedVoltage(f64::NAN)))),
            0.0,
        );
        assert!(matches!(
            sensor.temperature_c(),
            Err(SensorError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_hardware_error() {
        let mut sensor = TemperatureSensor::new(Device::Analog(Tmp36::new(Box::new(Unplugged))), 0.0);
        assert!(matches!(sensor.temperature_c(), Err(SensorError::Io(_))));
    }

    #[test]
    fn test_device_component() {
        assert_eq!(digital(20, 0.0).device().component(), Component::Tc74);
        assert_eq!(analog(20.0, 0.0).device().component(), Component::Tmp36);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            SensorError::OutOfRange(130.0).to_string(),
            "temperature reading should be between -40 °C and 125 °C but was instead 130 °C"
        );
    }
}
