//! # TCS3471 Driver
//!
//! This is a driver for the TAOS/AMS TCS3471 family of colour
//! light-to-digital converters (TCS34711, TCS34713, TCS34715 and TCS34717).
//!
//! The TCS3471 measures four channels of light, each as a 16-bit count:
//!
//! * Clear (unfiltered)
//! * Red
//! * Green
//! * Blue
//!
//! Depending on the part number, the chip answers on one of two I²C
//! addresses. The [`Tcs3471`] object probes both and remembers which one
//! replied with a known chip ID. Until a probe has succeeded, every other
//! operation is a no-op that touches nothing on the bus.
//!
//! This driver only handles register access. It does not turn raw counts
//! into lux or colour temperature.
//!
//! # Example
//!
//! You might setup the sensor like this:
//!
//! ```rust
//! # use embedded_hal::blocking::i2c::{Read, Write};
//! # use embedded_hal::blocking::delay::DelayMs;
//! # struct I2c;
//! # impl Write for I2c {
//! #     type Error = ();
//! #     fn write(&mut self, _address: u8, _bytes: &[u8]) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # impl Read for I2c {
//! #     type Error = ();
//! #     fn read(&mut self, _address: u8, _buffer: &mut [u8]) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # struct Delay;
//! # impl DelayMs<u8> for Delay {
//! #     fn delay_ms(&mut self, _ms: u8) {}
//! # }
//! # let i2c = I2c;
//! # let mut delay = Delay;
//! let mut sensor = tcs3471::Tcs3471::new(i2c);
//! if !sensor.detect() {
//!     // No TCS3471 on the bus
//! }
//! if let Err(e) = sensor.configure(&tcs3471::CONFIG_DIM_LIGHT) {
//!     // Sensor didn't respond
//! }
//! if let Ok(true) = sensor.enable(&mut delay) {
//!     if let Ok(Some(reading)) = sensor.read_rgbc() {
//!         let _red = reading.red;
//!     }
//! }
//! ```

#![no_std]
#![deny(unsafe_code)]
#![deny(missing_docs)]

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Read, Write};

//
// Public Types
//

/// The TCS3471 lives at one of two I²C addresses, depending on the part
/// number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusAddress {
    /// The address of the TCS34715 and TCS34717. Probed first.
    Primary = 0x29,
    /// The address of the TCS34711 and TCS34713. Probed second.
    Secondary = 0x39,
}

/// The analog gain applied to all four channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// 1x gain
    X1 = 0x00,
    /// 4x gain
    X4 = 0x01,
    /// 16x gain
    X16 = 0x02,
    /// 60x gain
    X60 = 0x03,
}

/// The silicon revisions this driver recognises, by ID register value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipVariant {
    /// TCS34711 or TCS34715
    Tcs34711Or34715 = 0x14,
    /// TCS34713 or TCS34717
    Tcs34713Or34717 = 0x1D,
}

/// One reading of all four colour channels, in raw counts.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgbc {
    /// Clear (unfiltered) channel
    pub clear: u16,
    /// Red channel
    pub red: u16,
    /// Green channel
    pub green: u16,
    /// Blue channel
    pub blue: u16,
}

/// A set of measurement settings that can be applied in one go with
/// [`Tcs3471::configure`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// RGBC integration time, in milliseconds.
    ///
    /// See [`Tcs3471::set_integration_time`].
    pub integration_time_ms: f32,
    /// Wait time between measurement cycles, in milliseconds. Anything below
    /// 2.4 ms turns the wait state off.
    ///
    /// See [`Tcs3471::set_wait_time`].
    pub wait_time_ms: f32,
    /// Analog gain
    pub gain: Gain,
    /// Number of consecutive out-of-range readings before the interrupt
    /// fires.
    ///
    /// See [`Tcs3471::set_interrupt_persistence`].
    pub persistence: u8,
    /// Clear channel low interrupt threshold
    pub low_threshold: u16,
    /// Clear channel high interrupt threshold
    pub high_threshold: u16,
}

/// Represents our connection to a TCS3471 chip.
pub struct Tcs3471<I2C> {
    i2c: I2C,
    state: Detection,
}

//
// Private Types
//

/// Whether we have found a chip, and where.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Detection {
    /// Never probed
    Unknown,
    /// Found a chip at this address
    Detected(BusAddress),
    /// Probed both addresses and found nothing we recognise
    Absent,
}

/// The set of registers in the TCS3471 that we use.
///
/// Sixteen-bit registers are named by their low byte; the high byte lives at
/// the next address.
#[derive(Copy, Clone, Debug)]
enum Register {
    Enable = 0x00,
    IntegrationTime = 0x01,
    WaitTime = 0x03,
    LowThreshold = 0x04,
    HighThreshold = 0x06,
    Persistence = 0x0C,
    Configuration = 0x0D,
    Control = 0x0F,
    Id = 0x12,
    Status = 0x13,
    ClearData = 0x14,
    RedData = 0x16,
    GreenData = 0x18,
    BlueData = 0x1A,
}

/// How a requested wait time maps onto the chip.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum WaitSetting {
    /// Too short to bother with; switch the wait state off
    Disabled,
    /// WTIME value, counted in 2.4 ms steps
    Short(u8),
    /// WTIME value, counted in 28.8 ms steps (WLONG set)
    Long(u8),
}

//
// Public Data
//

/// The settings the chip comes out of reset with.
///
/// 2.4 ms integration, no wait state, 1x gain, interrupt on every cycle and
/// both thresholds at zero.
pub const CONFIG_POWER_ON: Config = Config {
    integration_time_ms: 2.4,
    wait_time_ms: 0.0,
    gain: Gain::X1,
    persistence: 0,
    low_threshold: 0,
    high_threshold: 0,
};

/// Settings for dim indoor light.
///
/// Longest integration time, 60x gain, no wait state. The interrupt fires
/// after 10 consecutive readings with the clear channel outside 64..=65000.
pub const CONFIG_DIM_LIGHT: Config = Config {
    integration_time_ms: 614.4,
    wait_time_ms: 0.0,
    gain: Gain::X60,
    persistence: 10,
    low_threshold: 64,
    high_threshold: 65000,
};

//
// Private Data
//

// Command register bits
const COMMAND_BIT: u8 = 0x80;
const AUTO_INCREMENT_BITS: u8 = 0x20;
const SPECIAL_FUNCTION_BITS: u8 = 0x60;
const INTERRUPT_CLEAR_BITS: u8 = 0x06;

// Enable register bits
const AIEN_BIT: u8 = 0x10;
const WEN_BIT: u8 = 0x08;
const AEN_BIT: u8 = 0x02;
const PON_BIT: u8 = 0x01;

// Configuration register bits
const WLONG_BIT: u8 = 0x02;

// Status register bits
const AINT_BIT: u8 = 0x10;
const AVALID_BIT: u8 = 0x01;

/// Oscillator start-up time between PON and AEN.
const POWER_ON_DELAY_MS: u8 = 3;

/// Integration and short wait step, in tenths of a millisecond.
const SHORT_STEP: u32 = 24;
/// Long wait step, in tenths of a millisecond.
const LONG_STEP: u32 = 288;
/// Wait times above this (in tenths of a millisecond) need WLONG.
const LONG_WAIT_THRESHOLD: u32 = 6144;
/// The longest wait time we can express, in tenths of a millisecond.
const MAX_LONG_WAIT: u32 = 73728;
/// Timing registers count up from their value to 256.
const MAX_STEPS: u32 = 256;

const MAX_PERSISTENCE: u8 = 60;

//
// impls on Public Types
//

impl From<BusAddress> for u8 {
    fn from(addr: BusAddress) -> u8 {
        addr as u8
    }
}

impl ChipVariant {
    /// Work out which variant reported this ID register value.
    pub fn from_id(id: u8) -> Option<ChipVariant> {
        match id {
            0x14 => Some(ChipVariant::Tcs34711Or34715),
            0x1D => Some(ChipVariant::Tcs34713Or34717),
            _ => None,
        }
    }
}

impl Rgbc {
    /// Decode the eight bytes of an auto-increment read starting at the
    /// clear channel.
    fn from_block(block: [u8; 8]) -> Rgbc {
        Rgbc {
            clear: u16::from_le_bytes([block[0], block[1]]),
            red: u16::from_le_bytes([block[2], block[3]]),
            green: u16::from_le_bytes([block[4], block[5]]),
            blue: u16::from_le_bytes([block[6], block[7]]),
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        CONFIG_POWER_ON
    }
}

impl<I2C> Tcs3471<I2C> {
    /// Create a new TCS3471 driver object.
    ///
    /// No bus traffic happens until you call [`Tcs3471::detect`],
    /// [`Tcs3471::enable`] or [`Tcs3471::get_chip_id`].
    pub fn new(i2c: I2C) -> Tcs3471<I2C> {
        Tcs3471 {
            i2c,
            state: Detection::Unknown,
        }
    }

    /// Which address the chip was found at, if it has been found.
    pub fn address(&self) -> Option<BusAddress> {
        match self.state {
            Detection::Detected(address) => Some(address),
            Detection::Unknown | Detection::Absent => None,
        }
    }

    /// Give back the I²C bus.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> Tcs3471<I2C>
where
    I2C: Write<Error = E> + Read<Error = E>,
{
    /// Look for a TCS3471 on the bus.
    ///
    /// Tries [`BusAddress::Primary`] and then [`BusAddress::Secondary`],
    /// reading the ID register at each. Once a chip has been found, this
    /// returns `true` straight away without touching the bus.
    ///
    /// A bus error during the probe is treated the same as finding the wrong
    /// chip.
    pub fn detect(&mut self) -> bool {
        self.find_chip().is_some()
    }

    /// Power the chip up and start RGBC conversions.
    ///
    /// Runs [`Tcs3471::detect`] first and returns `Ok(false)` if there is no
    /// chip. Otherwise sets PON, waits for the internal oscillator, then sets
    /// AEN.
    pub fn enable<D>(&mut self, delay: &mut D) -> Result<bool, E>
    where
        D: DelayMs<u8>,
    {
        let Some(address) = self.find_chip() else {
            return Ok(false);
        };
        self.set_register_bits(address, Register::Enable, PON_BIT, PON_BIT)?;
        delay.delay_ms(POWER_ON_DELAY_MS);
        self.set_register_bits(address, Register::Enable, AEN_BIT, AEN_BIT)?;
        Ok(true)
    }

    /// Stop conversions and put the chip into its low power state.
    pub fn disable(&mut self) -> Result<(), E> {
        if let Some(address) = self.address() {
            self.set_register_bits(address, Register::Enable, 0, PON_BIT | AEN_BIT)?;
        }
        Ok(())
    }

    /// Set the RGBC integration time.
    ///
    /// * A value of 2.4 ms is one integration cycle
    /// * A value of 614.4 ms is 256 cycles, the maximum
    ///
    /// Values are rounded down to a whole number of 2.4 ms cycles and capped
    /// at 256 cycles.
    pub fn set_integration_time(&mut self, ms: f32) -> Result<(), E> {
        if let Some(address) = self.address() {
            self.write8(
                address,
                Register::IntegrationTime,
                integration_time_register(ms),
            )?;
        }
        Ok(())
    }

    /// Set the wait time between RGBC cycles.
    ///
    /// * Below 2.4 ms the wait state is switched off and WTIME is left alone
    /// * Up to 614.4 ms the wait is counted in 2.4 ms steps
    /// * Above that, WLONG is set and the wait is counted in 28.8 ms steps,
    ///   up to 7372.8 ms
    pub fn set_wait_time(&mut self, ms: f32) -> Result<(), E> {
        let Some(address) = self.address() else {
            return Ok(());
        };
        let wtime = match wait_setting(ms) {
            WaitSetting::Disabled => {
                return self.set_register_bits(address, Register::Enable, 0, WEN_BIT);
            }
            WaitSetting::Short(wtime) => {
                self.write8(address, Register::Configuration, 0)?;
                wtime
            }
            WaitSetting::Long(wtime) => {
                self.write8(address, Register::Configuration, WLONG_BIT)?;
                wtime
            }
        };
        self.write8(address, Register::WaitTime, wtime)?;
        self.set_register_bits(address, Register::Enable, WEN_BIT, WEN_BIT)
    }

    /// Set the analog gain.
    pub fn set_gain(&mut self, gain: Gain) -> Result<(), E> {
        if let Some(address) = self.address() {
            // Gain is the only field in this register
            self.write8(address, Register::Control, gain as u8)?;
        }
        Ok(())
    }

    /// Let the chip assert its interrupt line.
    pub fn enable_interrupt(&mut self) -> Result<(), E> {
        if let Some(address) = self.address() {
            self.set_register_bits(address, Register::Enable, AIEN_BIT, AIEN_BIT)?;
        }
        Ok(())
    }

    /// Stop the chip asserting its interrupt line.
    pub fn disable_interrupt(&mut self) -> Result<(), E> {
        if let Some(address) = self.address() {
            self.set_register_bits(address, Register::Enable, 0, AIEN_BIT)?;
        }
        Ok(())
    }

    /// Clear a pending RGBC interrupt.
    ///
    /// This is a special function command with no data byte.
    pub fn clear_interrupt(&mut self) -> Result<(), E> {
        if let Some(address) = self.address() {
            let buffer = [COMMAND_BIT | SPECIAL_FUNCTION_BITS | INTERRUPT_CLEAR_BITS];
            self.i2c.write(address.into(), &buffer)?;
        }
        Ok(())
    }

    /// Set the clear channel count above which an interrupt is raised.
    pub fn set_interrupt_high_threshold(&mut self, threshold: u16) -> Result<(), E> {
        if let Some(address) = self.address() {
            self.write16(address, Register::HighThreshold, threshold)?;
        }
        Ok(())
    }

    /// Set the clear channel count below which an interrupt is raised.
    pub fn set_interrupt_low_threshold(&mut self, threshold: u16) -> Result<(), E> {
        if let Some(address) = self.address() {
            self.write16(address, Register::LowThreshold, threshold)?;
        }
        Ok(())
    }

    /// Set how many consecutive out-of-range readings it takes to raise an
    /// interrupt.
    ///
    /// * 0 interrupts on every cycle
    /// * 1 to 3 are used as-is
    /// * Above 3, the chip only supports multiples of 5, so the value is
    ///   rounded down to one. Values over 60 are capped at 60.
    pub fn set_interrupt_persistence(&mut self, count: u8) -> Result<(), E> {
        if let Some(address) = self.address() {
            self.write8(
                address,
                Register::Persistence,
                persistence_register(count),
            )?;
        }
        Ok(())
    }

    /// Check whether the chip is currently asserting an RGBC interrupt.
    pub fn interrupt_asserted(&mut self) -> Result<bool, E> {
        match self.address() {
            Some(address) => {
                Ok(self.read8(address, Register::Status)? & AINT_BIT == AINT_BIT)
            }
            None => Ok(false),
        }
    }

    /// Read the ID register.
    ///
    /// Runs [`Tcs3471::detect`] first and returns `Ok(0)` if there is no
    /// chip.
    pub fn get_chip_id(&mut self) -> Result<u8, E> {
        match self.find_chip() {
            Some(address) => self.read8(address, Register::Id),
            None => Ok(0),
        }
    }

    /// Read the ID register and work out which variant we are talking to.
    pub fn chip_variant(&mut self) -> Result<Option<ChipVariant>, E> {
        Ok(ChipVariant::from_id(self.get_chip_id()?))
    }

    /// Check whether an RGBC cycle has completed since the channels were
    /// last enabled.
    pub fn rgbc_valid(&mut self) -> Result<bool, E> {
        match self.address() {
            Some(address) => {
                Ok(self.read8(address, Register::Status)? & AVALID_BIT == AVALID_BIT)
            }
            None => Ok(false),
        }
    }

    /// Read the clear channel. Returns `Ok(0)` if no chip has been found.
    pub fn read_c_data(&mut self) -> Result<u16, E> {
        self.read_channel(Register::ClearData)
    }

    /// Read the red channel. Returns `Ok(0)` if no chip has been found.
    pub fn read_r_data(&mut self) -> Result<u16, E> {
        self.read_channel(Register::RedData)
    }

    /// Read the green channel. Returns `Ok(0)` if no chip has been found.
    pub fn read_g_data(&mut self) -> Result<u16, E> {
        self.read_channel(Register::GreenData)
    }

    /// Read the blue channel. Returns `Ok(0)` if no chip has been found.
    pub fn read_b_data(&mut self) -> Result<u16, E> {
        self.read_channel(Register::BlueData)
    }

    /// Read all four channels in a single bus transaction.
    ///
    /// Unlike the single channel reads, this returns `Ok(None)` if no chip
    /// has been found, so you can tell that apart from darkness.
    pub fn read_rgbc(&mut self) -> Result<Option<Rgbc>, E> {
        let Some(address) = self.address() else {
            return Ok(None);
        };
        self.i2c.write(
            address.into(),
            &[COMMAND_BIT | AUTO_INCREMENT_BITS | Register::ClearData as u8],
        )?;
        let mut block = [0u8; 8];
        self.i2c.read(address.into(), &mut block)?;
        Ok(Some(Rgbc::from_block(block)))
    }

    /// Apply a whole [`Config`] to the chip.
    ///
    /// Returns `Ok(false)`, without touching the bus, if no chip has been
    /// found.
    pub fn configure(&mut self, config: &Config) -> Result<bool, E> {
        if self.address().is_none() {
            return Ok(false);
        }
        self.set_integration_time(config.integration_time_ms)?;
        self.set_wait_time(config.wait_time_ms)?;
        self.set_gain(config.gain)?;
        self.set_interrupt_persistence(config.persistence)?;
        self.set_interrupt_low_threshold(config.low_threshold)?;
        self.set_interrupt_high_threshold(config.high_threshold)?;
        Ok(true)
    }

    /// Probe both addresses unless we already know where the chip is.
    fn find_chip(&mut self) -> Option<BusAddress> {
        if let Detection::Detected(address) = self.state {
            return Some(address);
        }
        for candidate in [BusAddress::Primary, BusAddress::Secondary] {
            if self.probe(candidate) {
                #[cfg(feature = "defmt")]
                defmt::info!("Found TCS3471 at 0x{:02x}", candidate as u8);
                self.state = Detection::Detected(candidate);
                return Some(candidate);
            }
        }
        #[cfg(feature = "defmt")]
        defmt::info!("No TCS3471 found");
        self.state = Detection::Absent;
        None
    }

    /// Read the ID register at one candidate address and see if we know it.
    fn probe(&mut self, candidate: BusAddress) -> bool {
        match self.read8(candidate, Register::Id) {
            Ok(id) => ChipVariant::from_id(id).is_some(),
            Err(_) => false,
        }
    }

    fn read_channel(&mut self, register: Register) -> Result<u16, E> {
        match self.address() {
            Some(address) => self.read16(address, register),
            None => Ok(0),
        }
    }

    /// Update some bits in a register, leaving the others alone.
    fn set_register_bits(
        &mut self,
        address: BusAddress,
        register: Register,
        value: u8,
        mask: u8,
    ) -> Result<(), E> {
        let current = self.read8(address, register)?;
        self.write8(address, register, (current & !mask) | (value & mask))
    }

    fn write8(&mut self, address: BusAddress, register: Register, value: u8) -> Result<(), E> {
        let buffer = [COMMAND_BIT | register as u8, value];
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Setting TCS3471 0x{:02x} to 0x{:02x}",
            register as u8,
            value
        );
        self.i2c.write(address.into(), &buffer)
    }

    /// Write a register pair, low byte first.
    fn write16(&mut self, address: BusAddress, register: Register, value: u16) -> Result<(), E> {
        let [low, high] = value.to_le_bytes();
        let buffer = [COMMAND_BIT | AUTO_INCREMENT_BITS | register as u8, low, high];
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Setting TCS3471 0x{:02x} to 0x{:04x}",
            register as u8,
            value
        );
        self.i2c.write(address.into(), &buffer)
    }

    fn read8(&mut self, address: BusAddress, register: Register) -> Result<u8, E> {
        self.i2c.write(address.into(), &[COMMAND_BIT | register as u8])?;
        let mut buffer = [0u8; 1];
        self.i2c.read(address.into(), &mut buffer)?;
        Ok(buffer[0])
    }

    /// Read a register pair. The chip sends the low byte first.
    fn read16(&mut self, address: BusAddress, register: Register) -> Result<u16, E> {
        self.i2c.write(
            address.into(),
            &[COMMAND_BIT | AUTO_INCREMENT_BITS | register as u8],
        )?;
        let mut buffer = [0u8; 2];
        self.i2c.read(address.into(), &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }
}

//
// Private Functions
//

/// Milliseconds to whole tenths of a millisecond. Negative values and NaN
/// come out as zero.
fn tenths_of_ms(ms: f32) -> u32 {
    (ms * 10.0) as u32
}

/// The chip counts from the register value up to 256, so we store what is
/// left rather than the number of steps.
fn steps_to_register(steps: u32) -> u8 {
    (MAX_STEPS - steps.min(MAX_STEPS)) as u8
}

fn integration_time_register(ms: f32) -> u8 {
    steps_to_register(tenths_of_ms(ms) / SHORT_STEP)
}

fn wait_setting(ms: f32) -> WaitSetting {
    let tenths = tenths_of_ms(ms);
    if tenths < SHORT_STEP {
        WaitSetting::Disabled
    } else if tenths > LONG_WAIT_THRESHOLD {
        WaitSetting::Long(steps_to_register(
            tenths.min(MAX_LONG_WAIT) / LONG_STEP,
        ))
    } else {
        WaitSetting::Short(steps_to_register(tenths / SHORT_STEP))
    }
}

/// 0 to 3 map straight through, then the field goes up in fives.
fn persistence_register(count: u8) -> u8 {
    let count = count.min(MAX_PERSISTENCE);
    let encoded = if count > 3 { count / 5 + 3 } else { count };
    encoded & 0x0F
}

//
// Tests
//


//
// End of file
//
