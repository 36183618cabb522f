use crate::sensor::{RegisterBus, SensorError};
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use log::{debug, info, warn};

/// I2C bus the sensor is wired to
pub const I2C_BUS: &str = "/dev/i2c-1";

/// Address of the TC74A0 variant
pub const I2C_ADDRESS: u16 = 0x48;

/// Temperature register, signed whole degrees
const REG_TEMPERATURE: u8 = 0x00;

/// Configuration register
const REG_CONFIG: u8 = 0x01;

/// Standby switch in the configuration register
const CONFIG_STANDBY: u8 = 0x80;

/// Data ready flag in the configuration register
const CONFIG_DATA_READY: u8 = 0x40;

impl RegisterBus for LinuxI2CDevice {
    fn read_register(&mut self, register: u8) -> Result<u8, SensorError> {
        Ok(self.smbus_read_byte_data(register)?)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        Ok(self.smbus_write_byte_data(register, value)?)
    }
}

/// Microchip TC74 digital temperature sensor
///
/// The sensor reports whole degrees Celsius as a two's complement byte.
pub struct Tc74 {
    bus: Box<dyn RegisterBus>,
}

impl Tc74 {
    /// Opens the sensor on the default bus and address
    pub fn open() -> Result<Tc74, SensorError> {
        debug!("Opening TC74 at {I2C_ADDRESS:#04x} on {I2C_BUS}");
        Tc74::new(Box::new(LinuxI2CDevice::new(I2C_BUS, I2C_ADDRESS)?))
    }

    /// Wraps a bus and takes the sensor out of standby if needed
    pub fn new(bus: Box<dyn RegisterBus>) -> Result<Tc74, SensorError> {
        let mut tc74 = Tc74 { bus };

        if tc74.standby()? {
            tc74.set_standby(false)?;
            if tc74.standby()? {
                warn!("Unable to take the TC74 out of standby");
            } else {
                info!("TC74 taken out of standby");
            }
        } else {
            info!("TC74 sensor is in normal (non-standby) mode");
        }

        Ok(tc74)
    }

    /// Returns `true` if the sensor is in standby and not converting
    pub fn standby(&mut self) -> Result<bool, SensorError> {
        Ok(self.bus.read_register(REG_CONFIG)? & CONFIG_STANDBY != 0)
    }

    /// Switches standby on or off
    pub fn set_standby(&mut self, standby: bool) -> Result<(), SensorError> {
        let config = self.bus.read_register(REG_CONFIG)?;
        let config = if standby {
            config | CONFIG_STANDBY
        } else {
            config & !CONFIG_STANDBY
        };
        self.bus.write_register(REG_CONFIG, config)
    }

    /// Returns `true` once a conversion has completed since power up
    pub fn data_ready(&mut self) -> Result<bool, SensorError> {
        Ok(self.bus.read_register(REG_CONFIG)? & CONFIG_DATA_READY != 0)
    }

    /// Reads the temperature in whole degrees Celsius
    pub fn read_celsius(&mut self) -> Result<i8, SensorError> {
        let raw = self.bus.read_register(REG_TEMPERATURE)?;
        debug!("TC74 raw temperature {raw:08b}");
        Ok(raw as i8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::mock::FakeRegisters;

    #[test]
    fn test_twos_complement() -> Result<(), SensorError> {
        for (raw, celsius) in [(0x00, 0), (0x19, 25), (0x7f, 127), (0xfb, -5), (0xc9, -55)] {
            let mut tc74 = Tc74::new(Box::new(FakeRegisters::with(&[
                (REG_TEMPERATURE, raw),
                (REG_CONFIG, CONFIG_DATA_READY),
            ])))?;
            assert_eq!(tc74.read_celsius()?, celsius);
        }
        Ok(())
    }

    #[test]
    fn test_wakes_up_from_standby() -> Result<(), SensorError> {
        let mut tc74 = Tc74::new(Box::new(FakeRegisters::with(&[
            (REG_TEMPERATURE, 20),
            (REG_CONFIG, CONFIG_STANDBY | CONFIG_DATA_READY),
        ])))?;

        assert!(!tc74.standby()?);
        // Other bits of the configuration register are preserved
        assert!(tc74.data_ready()?);
        Ok(())
    }

    #[test]
    fn test_stuck_in_standby() -> Result<(), SensorError> {
        let mut bus = FakeRegisters::with(&[(REG_TEMPERATURE, 20), (REG_CONFIG, CONFIG_STANDBY)]);
        bus.read_only.push(REG_CONFIG);

        // Only logged, the sensor is still usable
        let mut tc74 = Tc74::new(Box::new(bus))?;
        assert!(tc74.standby()?);
        assert_eq!(tc74.read_celsius()?, 20);
        Ok(())
    }

    #[test]
    fn test_bus_failure() {
        assert!(Tc74::new(Box::new(FakeRegisters::default())).is_err());
    }
}
