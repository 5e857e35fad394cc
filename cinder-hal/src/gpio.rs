//! GPIO and LPGPIO drivers.
//!
//! Port-level configuration over [`ll::gpio::GpioBlock`], plus a
//! single-pin [`Pin`] handle implementing the `embedded-hal` digital
//! traits for driver crates that expect one.

use cinder_ll::gpio as ll;
use cinder_ll::lpgpio;

use crate::{Error, Result};

pub use cinder_ll::gpio::{AlternateFunction, OutputType, PinMode, Pins, Pull, Speed};
pub use cinder_ll::lpgpio::LpMode;

/// Logic level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinState {
    Low,
    High,
}

impl From<bool> for PinState {
    fn from(high: bool) -> Self {
        if high {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

/// Per-pin configuration applied by [`Port::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    pub mode: PinMode,
    pub output_type: OutputType,
    pub speed: Speed,
    pub pull: Pull,
    pub alternate: AlternateFunction,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            mode: PinMode::Analog,
            output_type: OutputType::PushPull,
            speed: Speed::Low,
            pull: Pull::None,
            alternate: AlternateFunction::Af0,
        }
    }
}

impl PinConfig {
    /// Push-pull output, low speed, no pull.
    #[must_use]
    pub fn output() -> Self {
        Self {
            mode: PinMode::Output,
            ..Self::default()
        }
    }

    /// Floating input.
    #[must_use]
    pub fn input() -> Self {
        Self {
            mode: PinMode::Input,
            ..Self::default()
        }
    }

    /// Alternate function with the given AF number.
    #[must_use]
    pub fn alternate(af: AlternateFunction) -> Self {
        Self {
            mode: PinMode::Alternate,
            alternate: af,
            ..Self::default()
        }
    }
}

/// One GPIO port.
#[derive(Debug, Clone, Copy)]
pub struct Port {
    block: ll::GpioBlock,
}

impl Port {
    /// Wrap a port register block.
    #[must_use]
    pub const fn new(block: ll::GpioBlock) -> Self {
        Self { block }
    }

    /// Apply `config` to every pin selected by `pins`.
    ///
    /// The alternate function, output type, speed and pull are
    /// programmed first; the mode is switched last so a pin never
    /// drives with a half-applied configuration.
    pub fn init(&self, pins: Pins, config: &PinConfig) {
        for index in 0..16 {
            if !pins.contains(Pins::from_bits_truncate(1 << index)) {
                continue;
            }
            if config.mode == PinMode::Alternate {
                self.block.set_alternate(index, config.alternate);
            }
            self.block.set_speed(index, config.speed);
            self.block.set_output_type(index, config.output_type);
            self.block.set_pull(index, config.pull);
            self.block.set_pin_mode(index, config.mode);
        }
    }

    /// Return the selected pins to their reset configuration (analog,
    /// push-pull, low speed, no pull, AF0) and clear their outputs.
    pub fn deinit(&self, pins: Pins) {
        for index in 0..16 {
            if !pins.contains(Pins::from_bits_truncate(1 << index)) {
                continue;
            }
            self.block.set_pin_mode(index, PinMode::Analog);
            self.block.set_alternate(index, AlternateFunction::Af0);
            self.block.set_speed(index, Speed::Low);
            self.block.set_output_type(index, OutputType::PushPull);
            self.block.set_pull(index, Pull::None);
        }
        self.block.reset_pins(pins);
    }

    /// Read the input level of one pin.
    #[must_use]
    pub fn read_pin(&self, index: u8) -> PinState {
        PinState::from(self.block.read_input_port() & (1 << index) != 0)
    }

    /// Drive one pin through the atomic set/reset register.
    pub fn write_pin(&self, index: u8, state: PinState) {
        let pin = Pins::from_bits_truncate(1 << index);
        match state {
            PinState::High => self.block.set_pins(pin),
            PinState::Low => self.block.reset_pins(pin),
        }
    }

    /// Drive two disjoint pin groups in a single atomic write: `reset`
    /// goes low and `set` goes high on the same clock edge.
    pub fn write_multiple_state(&self, reset: Pins, set: Pins) -> Result<()> {
        if !(reset & set).is_empty() {
            return Err(Error::InvalidParam);
        }
        self.block.write_multiple_state(reset, set);
        Ok(())
    }

    /// Toggle the output level of the selected pins atomically.
    pub fn toggle(&self, pins: Pins) {
        self.block.toggle_pins(pins);
    }

    /// Read the whole input data register.
    #[must_use]
    pub fn read(&self) -> Pins {
        Pins::from_bits_truncate(self.block.read_input_port())
    }

    /// Write the whole output data register.
    pub fn write(&self, pins: Pins) {
        self.block.write_output_port(pins.bits());
    }

    /// Freeze the configuration of the selected pins until the next
    /// reset. Fails with [`Error::Hardware`] if the lock sequence did
    /// not take.
    pub fn lock(&self, pins: Pins) -> Result<()> {
        if self.block.lock_pins(pins) {
            Ok(())
        } else {
            Err(Error::Hardware)
        }
    }

    /// Enable the high-speed low-voltage pad mode on the selected pins.
    /// Only valid when the IO supply is below 2.5 V.
    pub fn enable_high_speed_low_voltage(&self, pins: Pins) {
        self.block.enable_high_speed_low_voltage(pins);
    }

    /// Disable the high-speed low-voltage pad mode on the selected
    /// pins.
    pub fn disable_high_speed_low_voltage(&self, pins: Pins) {
        self.block.disable_high_speed_low_voltage(pins);
    }

    /// Take a single-pin handle for `index` (0..=15).
    pub fn pin(&self, index: u8) -> Result<Pin> {
        if index > 15 {
            return Err(Error::InvalidParam);
        }
        Ok(Pin {
            block: self.block,
            index,
        })
    }
}

/// The low-power GPIO port. Pins are plain inputs or outputs; the pad
/// characteristics live on the aliased GPIO port.
#[derive(Debug, Clone, Copy)]
pub struct LpPort {
    block: lpgpio::LpgpioBlock,
}

impl LpPort {
    /// Wrap the LPGPIO register block.
    #[must_use]
    pub const fn new(block: lpgpio::LpgpioBlock) -> Self {
        Self { block }
    }

    /// Set the direction of every pin selected by `pins`.
    pub fn init(&self, pins: Pins, mode: LpMode) {
        for index in 0..16 {
            if pins.contains(Pins::from_bits_truncate(1 << index)) {
                self.block.set_pin_mode(index, mode);
            }
        }
    }

    /// Return the selected pins to inputs and clear their outputs.
    pub fn deinit(&self, pins: Pins) {
        for index in 0..16 {
            if pins.contains(Pins::from_bits_truncate(1 << index)) {
                self.block.set_pin_mode(index, LpMode::Input);
            }
        }
        self.block.reset_pins(pins.bits());
    }

    /// Read the input level of one pin.
    #[must_use]
    pub fn read_pin(&self, index: u8) -> PinState {
        PinState::from(self.block.read_input_port() & (1 << index) != 0)
    }

    /// Drive one pin through the atomic set/reset register.
    pub fn write_pin(&self, index: u8, state: PinState) {
        match state {
            PinState::High => self.block.set_pins(1 << index),
            PinState::Low => self.block.reset_pins(1 << index),
        }
    }

    /// Toggle the output level of the selected pins.
    pub fn toggle(&self, pins: Pins) {
        self.block.toggle_pins(pins.bits());
    }
}

/// A single configured pin.
///
/// Implements the `embedded-hal` digital traits. Level changes go
/// through the set/reset register, so a `Pin` can be handed to a driver
/// while the rest of the port is used elsewhere.
#[derive(Debug)]
pub struct Pin {
    block: ll::GpioBlock,
    index: u8,
}

impl Pin {
    /// Pin index within its port.
    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    fn mask(&self) -> Pins {
        Pins::from_bits_truncate(1 << self.index)
    }

    /// Current input level.
    #[must_use]
    pub fn read(&self) -> PinState {
        PinState::from(self.block.read_input_port() & (1 << self.index) != 0)
    }

    /// Drive the output level.
    pub fn write(&mut self, state: PinState) {
        match state {
            PinState::High => self.block.set_pins(self.mask()),
            PinState::Low => self.block.reset_pins(self.mask()),
        }
    }

    /// Toggle the output level.
    pub fn toggle(&mut self) {
        self.block.toggle_pins(self.mask());
    }

    /// Level currently latched in the output data register.
    #[must_use]
    pub fn output_state(&self) -> PinState {
        PinState::from(self.block.read_output_port() & (1 << self.index) != 0)
    }
}

impl embedded_hal::digital::ErrorType for Pin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for Pin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.write(PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        self.write(PinState::High);
        Ok(())
    }
}

impl embedded_hal::digital::StatefulOutputPin for Pin {
    fn is_set_high(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(self.output_state() == PinState::High)
    }

    fn is_set_low(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(self.output_state() == PinState::Low)
    }

    fn toggle(&mut self) -> core::result::Result<(), Self::Error> {
        Pin::toggle(self);
        Ok(())
    }
}

impl embedded_hal::digital::InputPin for Pin {
    fn is_high(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(self.read() == PinState::High)
    }

    fn is_low(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(self.read() == PinState::Low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_port() -> (Box<[u32; 13]>, Port) {
        let ram = Box::new([0u32; 13]);
        let port = Port::new(unsafe { ll::GpioBlock::from_base(ram.as_ptr() as usize) });
        (ram, port)
    }

    #[test]
    fn test_init_programs_alternate_before_mode() {
        let (ram, port) = ram_port();
        port.init(Pins::PIN_5, &PinConfig::alternate(AlternateFunction::Af7));
        // MODER[5] = alternate
        assert_eq!((ram[0] >> 10) & 0b11, 0b10);
        // AFRL[5] = 7
        assert_eq!((ram[8] >> 20) & 0xF, 7);
    }

    #[test]
    fn test_deinit_restores_reset_config() {
        let (ram, port) = ram_port();
        let config = PinConfig {
            mode: PinMode::Output,
            output_type: OutputType::OpenDrain,
            speed: Speed::VeryHigh,
            pull: Pull::Up,
            alternate: AlternateFunction::Af0,
        };
        port.init(Pins::PIN_3, &config);
        port.deinit(Pins::PIN_3);
        assert_eq!((ram[0] >> 6) & 0b11, 0b11); // analog
        assert_eq!((ram[1] >> 3) & 1, 0); // push-pull
        assert_eq!((ram[2] >> 6) & 0b11, 0); // low speed
        assert_eq!((ram[3] >> 6) & 0b11, 0); // no pull
    }

    #[test]
    fn test_write_multiple_state_rejects_overlap() {
        let (_ram, port) = ram_port();
        assert_eq!(
            port.write_multiple_state(Pins::PIN_0 | Pins::PIN_1, Pins::PIN_1),
            Err(Error::InvalidParam)
        );
        assert!(port.write_multiple_state(Pins::PIN_0, Pins::PIN_1).is_ok());
    }

    #[test]
    fn test_pin_index_bounds() {
        let (_ram, port) = ram_port();
        assert!(port.pin(15).is_ok());
        assert_eq!(port.pin(16).unwrap_err(), Error::InvalidParam);
    }

    #[test]
    fn test_pin_stateful_output_tracks_odr() {
        use embedded_hal::digital::{OutputPin, StatefulOutputPin};

        let (ram, port) = ram_port();
        let mut pin = port.pin(2).unwrap();
        pin.set_high().unwrap();
        // BSRR writes don't self-propagate in RAM; mirror it into ODR
        // the way the hardware would.
        let bsrr = ram[6];
        unsafe {
            cinder_ll::mmio::write_reg(ram.as_ptr() as usize + 0x14, bsrr & 0xFFFF);
        }
        assert!(pin.is_set_high().unwrap());
    }

    #[test]
    fn test_lp_port_init_and_write() {
        let ram = Box::new([0u32; 5]);
        let port = LpPort::new(unsafe {
            cinder_ll::lpgpio::LpgpioBlock::from_base(ram.as_ptr() as usize)
        });
        port.init(Pins::PIN_0 | Pins::PIN_4, LpMode::Output);
        assert_eq!(ram[0] & 0b1_0001, 0b1_0001);
        port.write_pin(4, PinState::High);
        assert_eq!(ram[3], 1 << 4);
    }
}
