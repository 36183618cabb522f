use crate::sensor::{AnalogChannel, SensorError};
use log::{debug, warn};
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use sysfs_gpio::{Direction, Pin};

/// SPI device the MCP3008 is attached to
pub const SPI_DEVICE: &str = "/dev/spidev0.0";

/// GPIO driving the MCP3008 chip select
pub const CHIP_SELECT_GPIO: u64 = 22;

/// MCP3008 input the TMP36 output is wired to
pub const TMP36_CHANNEL: u8 = 0;

/// Supply and reference voltage of the MCP3008
pub const REFERENCE_VOLTAGE: f64 = 3.3;

const SPI_SPEED_HZ: u32 = 1_000_000;

/// Largest value of a 10-bit conversion
const MAX_READING: u16 = 1023;

/// Analog Devices TMP36 temperature sensor
///
/// The output voltage is 500 mV at 0 °C with a 10 mV/°C slope.
pub struct Tmp36 {
    channel: Box<dyn AnalogChannel>,
}

impl Tmp36 {
    /// Opens the sensor through the MCP3008 on the default SPI device
    pub fn open() -> Result<Tmp36, SensorError> {
        Ok(Tmp36::new(Box::new(Mcp3008::open(
            SPI_DEVICE,
            CHIP_SELECT_GPIO,
            TMP36_CHANNEL,
        )?)))
    }

    pub fn new(channel: Box<dyn AnalogChannel>) -> Tmp36 {
        Tmp36 { channel }
    }

    /// Reads the temperature in degrees Celsius
    pub fn read_celsius(&mut self) -> Result<f64, SensorError> {
        Ok(voltage_to_celsius(self.channel.voltage()?))
    }
}

/// Converts a TMP36 output voltage to degrees Celsius
pub fn voltage_to_celsius(voltage: f64) -> f64 {
    (voltage * 1000.0 - 500.0) / 10.0
}

/// One single-ended input of a Microchip MCP3008 10-bit ADC
pub struct Mcp3008 {
    spi: Spidev,
    chip_select: ChipSelect,
    channel: u8,
}

/// GPIO line driving the converter's chip select, exported while this lives
struct ChipSelect(Pin);

impl ChipSelect {
    fn export(number: u64) -> Result<ChipSelect, SensorError> {
        let pin = Pin::new(number);
        pin.export()?;
        let chip_select = ChipSelect(pin);

        // Idle high, the chip is selected while low
        chip_select.0.set_direction(Direction::High)?;

        Ok(chip_select)
    }

    fn set_selected(&self, selected: bool) -> Result<(), SensorError> {
        Ok(self.0.set_value(u8::from(!selected))?)
    }
}

impl Drop for ChipSelect {
    fn drop(&mut self) {
        let number = self.0.get_pin_num();
        match self.0.unexport() {
            Ok(()) => debug!("GPIO {number} unexported"),
            Err(err) => warn!("Cannot unexport GPIO {number}: {err}"),
        }
    }
}

impl Mcp3008 {
    pub fn open(device: &str, chip_select: u64, channel: u8) -> Result<Mcp3008, SensorError> {
        debug!("Opening MCP3008 channel {channel} on {device}, chip select on GPIO {chip_select}");

        let mut spi = Spidev::open(device)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(SPI_SPEED_HZ)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;

        Ok(Mcp3008 {
            spi,
            chip_select: ChipSelect::export(chip_select)?,
            channel: channel & 0x07,
        })
    }

    /// Runs one conversion and returns the raw 10-bit value
    pub fn read_value(&mut self) -> Result<u16, SensorError> {
        let tx = request(self.channel);
        let mut rx = [0_u8; 3];

        self.chip_select.set_selected(true)?;
        let result = {
            let mut transfer = SpidevTransfer::read_write(&tx, &mut rx);
            self.spi.transfer(&mut transfer)
        };
        self.chip_select.set_selected(false)?;
        result?;

        Ok(decode(&rx))
    }
}

impl AnalogChannel for Mcp3008 {
    fn voltage(&mut self) -> Result<f64, SensorError> {
        let value = self.read_value()?;
        let voltage = value_to_voltage(value);
        debug!("Sensor value={value} voltage={voltage}");
        Ok(voltage)
    }
}

/// Start bit, single-ended mode and channel, then a byte to clock out the result
fn request(channel: u8) -> [u8; 3] {
    [0x01, (0x08 | channel) << 4, 0x00]
}

fn decode(rx: &[u8; 3]) -> u16 {
    (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2])
}

/// Converts a raw conversion result to volts
pub fn value_to_voltage(value: u16) -> f64 {
    f64::from(value.min(MAX_READING)) * REFERENCE_VOLTAGE / f64::from(MAX_READING)
}
