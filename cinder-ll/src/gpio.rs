//! GPIO port register accessors
//!
//! One [`GpioBlock`] per port (A..J). Mode, output type, speed, pull and
//! alternate function are two- or four-bit fields replicated per pin;
//! atomic pin set/reset goes through BSRR/BRR so no read-modify-write is
//! needed on the data path.

use crate::mmio;

/// GPIOA base address (AHB2).
pub const GPIOA_BASE: usize = 0x4202_0000;
/// GPIOB base address.
pub const GPIOB_BASE: usize = 0x4202_0400;
/// GPIOC base address.
pub const GPIOC_BASE: usize = 0x4202_0800;
/// GPIOD base address.
pub const GPIOD_BASE: usize = 0x4202_0C00;
/// GPIOE base address.
pub const GPIOE_BASE: usize = 0x4202_1000;
/// GPIOF base address.
pub const GPIOF_BASE: usize = 0x4202_1400;
/// GPIOG base address.
pub const GPIOG_BASE: usize = 0x4202_1800;
/// GPIOH base address.
pub const GPIOH_BASE: usize = 0x4202_1C00;
/// GPIOI base address.
pub const GPIOI_BASE: usize = 0x4202_2000;
/// GPIOJ base address (STM32U5F/G only).
pub const GPIOJ_BASE: usize = 0x4202_2400;

const MODER: usize = 0x00;
const OTYPER: usize = 0x04;
const OSPEEDR: usize = 0x08;
const PUPDR: usize = 0x0C;
const IDR: usize = 0x10;
const ODR: usize = 0x14;
const BSRR: usize = 0x18;
const LCKR: usize = 0x1C;
const AFRL: usize = 0x20;
const AFRH: usize = 0x24;
const BRR: usize = 0x28;
const HSLVR: usize = 0x2C;
const SECCFGR: usize = 0x30;

const LCKR_LCKK: u32 = 1 << 16;

bitflags::bitflags! {
    /// GPIO pin selection mask, one bit per pin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Pins: u32 {
        const PIN_0 = 1 << 0;
        const PIN_1 = 1 << 1;
        const PIN_2 = 1 << 2;
        const PIN_3 = 1 << 3;
        const PIN_4 = 1 << 4;
        const PIN_5 = 1 << 5;
        const PIN_6 = 1 << 6;
        const PIN_7 = 1 << 7;
        const PIN_8 = 1 << 8;
        const PIN_9 = 1 << 9;
        const PIN_10 = 1 << 10;
        const PIN_11 = 1 << 11;
        const PIN_12 = 1 << 12;
        const PIN_13 = 1 << 13;
        const PIN_14 = 1 << 14;
        const PIN_15 = 1 << 15;
    }
}

impl Pins {
    /// Mask selecting every pin of a port.
    pub const ALL: Pins = Pins::all();
}

/// Pin operating mode (MODER two-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum PinMode {
    /// Input floating mode.
    Input = 0b00,
    /// General purpose output mode.
    Output = 0b01,
    /// Alternate function mode.
    Alternate = 0b10,
    /// Analog mode (reset state).
    Analog = 0b11,
}

impl PinMode {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b00 => Self::Input,
            0b01 => Self::Output,
            0b10 => Self::Alternate,
            _ => Self::Analog,
        }
    }
}

/// Output driver type (OTYPER one-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum OutputType {
    /// Push-pull output.
    PushPull = 0,
    /// Open-drain output.
    OpenDrain = 1,
}

/// Output speed (OSPEEDR two-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Speed {
    /// Low speed.
    Low = 0b00,
    /// Medium speed.
    Medium = 0b01,
    /// High speed.
    High = 0b10,
    /// Very high speed.
    VeryHigh = 0b11,
}

impl Speed {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b00 => Self::Low,
            0b01 => Self::Medium,
            0b10 => Self::High,
            _ => Self::VeryHigh,
        }
    }
}

/// Pull-up / pull-down activation (PUPDR two-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Pull {
    /// No pull-up or pull-down.
    None = 0b00,
    /// Pull-up.
    Up = 0b01,
    /// Pull-down.
    Down = 0b10,
}

impl Pull {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b01 => Self::Up,
            0b10 => Self::Down,
            _ => Self::None,
        }
    }
}

/// Alternate function selector (AFRL/AFRH four-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
#[allow(missing_docs)]
pub enum AlternateFunction {
    Af0 = 0,
    Af1 = 1,
    Af2 = 2,
    Af3 = 3,
    Af4 = 4,
    Af5 = 5,
    Af6 = 6,
    Af7 = 7,
    Af8 = 8,
    Af9 = 9,
    Af10 = 10,
    Af11 = 11,
    Af12 = 12,
    Af13 = 13,
    Af14 = 14,
    Af15 = 15,
}

impl AlternateFunction {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0xF {
            0 => Self::Af0,
            1 => Self::Af1,
            2 => Self::Af2,
            3 => Self::Af3,
            4 => Self::Af4,
            5 => Self::Af5,
            6 => Self::Af6,
            7 => Self::Af7,
            8 => Self::Af8,
            9 => Self::Af9,
            10 => Self::Af10,
            11 => Self::Af11,
            12 => Self::Af12,
            13 => Self::Af13,
            14 => Self::Af14,
            _ => Self::Af15,
        }
    }
}

/// One GPIO port register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioBlock {
    base: usize,
}

impl GpioBlock {
    /// Bind a register block at `base`.
    ///
    /// # Safety
    /// `base` must point at a GPIO-shaped register block (hardware port or
    /// RAM-backed block of at least 13 words).
    #[must_use]
    pub const unsafe fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// Base address this block was bound to.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Set the mode of one pin.
    pub fn set_pin_mode(&self, pin: u8, mode: PinMode) {
        let shift = u32::from(pin) * 2;
        // SAFETY: MODER is a valid register of the bound block; shift is
        // bounded by the 16-pin port width per caller contract.
        unsafe {
            mmio::write_field(self.base + MODER, 0b11 << shift, (mode as u32) << shift);
        }
    }

    /// Current mode of one pin.
    #[must_use]
    pub fn pin_mode(&self, pin: u8) -> PinMode {
        let shift = u32::from(pin) * 2;
        // SAFETY: MODER is a valid register of the bound block.
        PinMode::from_raw(unsafe { mmio::read_reg(self.base + MODER) } >> shift)
    }

    /// Set the output type of one pin.
    pub fn set_output_type(&self, pin: u8, otype: OutputType) {
        let shift = u32::from(pin);
        // SAFETY: OTYPER is a valid register of the bound block.
        unsafe {
            mmio::write_field(self.base + OTYPER, 1 << shift, (otype as u32) << shift);
        }
    }

    /// Current output type of one pin.
    #[must_use]
    pub fn output_type(&self, pin: u8) -> OutputType {
        // SAFETY: OTYPER is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + OTYPER) } >> u32::from(pin);
        if raw & 1 == 0 {
            OutputType::PushPull
        } else {
            OutputType::OpenDrain
        }
    }

    /// Set the output speed of one pin.
    pub fn set_speed(&self, pin: u8, speed: Speed) {
        let shift = u32::from(pin) * 2;
        // SAFETY: OSPEEDR is a valid register of the bound block.
        unsafe {
            mmio::write_field(self.base + OSPEEDR, 0b11 << shift, (speed as u32) << shift);
        }
    }

    /// Current output speed of one pin.
    #[must_use]
    pub fn speed(&self, pin: u8) -> Speed {
        let shift = u32::from(pin) * 2;
        // SAFETY: OSPEEDR is a valid register of the bound block.
        Speed::from_raw(unsafe { mmio::read_reg(self.base + OSPEEDR) } >> shift)
    }

    /// Set pull-up/pull-down of one pin.
    pub fn set_pull(&self, pin: u8, pull: Pull) {
        let shift = u32::from(pin) * 2;
        // SAFETY: PUPDR is a valid register of the bound block.
        unsafe {
            mmio::write_field(self.base + PUPDR, 0b11 << shift, (pull as u32) << shift);
        }
    }

    /// Current pull configuration of one pin.
    #[must_use]
    pub fn pull(&self, pin: u8) -> Pull {
        let shift = u32::from(pin) * 2;
        // SAFETY: PUPDR is a valid register of the bound block.
        Pull::from_raw(unsafe { mmio::read_reg(self.base + PUPDR) } >> shift)
    }

    /// Select the alternate function of one pin (AFRL for 0..=7, AFRH for
    /// 8..=15).
    pub fn set_alternate(&self, pin: u8, af: AlternateFunction) {
        let reg = if pin < 8 { AFRL } else { AFRH };
        let shift = u32::from(pin % 8) * 4;
        // SAFETY: AFRL/AFRH are valid registers of the bound block.
        unsafe {
            mmio::write_field(self.base + reg, 0xF << shift, (af as u32) << shift);
        }
    }

    /// Current alternate function of one pin.
    #[must_use]
    pub fn alternate(&self, pin: u8) -> AlternateFunction {
        let reg = if pin < 8 { AFRL } else { AFRH };
        let shift = u32::from(pin % 8) * 4;
        // SAFETY: AFRL/AFRH are valid registers of the bound block.
        AlternateFunction::from_raw(unsafe { mmio::read_reg(self.base + reg) } >> shift)
    }

    /// Read the whole input data register.
    #[must_use]
    pub fn read_input_port(&self) -> u32 {
        // SAFETY: IDR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + IDR) }
    }

    /// Read the whole output data register.
    #[must_use]
    pub fn read_output_port(&self) -> u32 {
        // SAFETY: ODR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + ODR) }
    }

    /// Write the whole output data register.
    pub fn write_output_port(&self, value: u32) {
        // SAFETY: ODR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + ODR, value) }
    }

    /// True when any selected input pin reads high.
    #[must_use]
    pub fn is_input_pin_set(&self, pins: Pins) -> bool {
        self.read_input_port() & pins.bits() != 0
    }

    /// True when any selected output pin is driven high.
    #[must_use]
    pub fn is_output_pin_set(&self, pins: Pins) -> bool {
        self.read_output_port() & pins.bits() != 0
    }

    /// Drive the selected pins high (atomic, via BSRR).
    pub fn set_pins(&self, pins: Pins) {
        // SAFETY: BSRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + BSRR, pins.bits()) }
    }

    /// Drive the selected pins low (atomic, via BRR).
    pub fn reset_pins(&self, pins: Pins) {
        // SAFETY: BRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + BRR, pins.bits()) }
    }

    /// Reset then set pins in one BSRR write; reset takes effect first for
    /// pins present in both masks per the hardware's set-over-reset rule.
    pub fn write_multiple_state(&self, pins_reset: Pins, pins_set: Pins) {
        let word = (pins_reset.bits() << 16) | pins_set.bits();
        // SAFETY: BSRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + BSRR, word) }
    }

    /// Toggle the selected pins through a single BSRR write.
    pub fn toggle_pins(&self, pins: Pins) {
        let odr = self.read_output_port();
        let word = ((odr & pins.bits()) << 16) | (!odr & pins.bits());
        // SAFETY: BSRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + BSRR, word) }
    }

    /// Run the LCKR lock sequence for the selected pins. Returns `true`
    /// when the lock key latched (configuration frozen until reset).
    #[must_use]
    pub fn lock_pins(&self, pins: Pins) -> bool {
        let lckr = self.base + LCKR;
        // LCKK write sequence: 1, 0, 1, read, read; the second read must
        // report LCKK set.
        // SAFETY: LCKR is a valid register of the bound block.
        unsafe {
            mmio::write_reg(lckr, LCKR_LCKK | pins.bits());
            mmio::write_reg(lckr, pins.bits());
            mmio::write_reg(lckr, LCKR_LCKK | pins.bits());
            let _ = mmio::read_reg(lckr);
            mmio::read_reg(lckr) & LCKR_LCKK != 0
        }
    }

    /// Raw LCKR value (locked pins + key bit).
    #[must_use]
    pub fn locked_pins(&self) -> u32 {
        // SAFETY: LCKR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + LCKR) }
    }

    /// Enable the high-speed-low-voltage pad option on the selected pins.
    pub fn enable_high_speed_low_voltage(&self, pins: Pins) {
        // SAFETY: HSLVR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + HSLVR, pins.bits()) }
    }

    /// Disable the high-speed-low-voltage pad option on the selected pins.
    pub fn disable_high_speed_low_voltage(&self, pins: Pins) {
        // SAFETY: HSLVR is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + HSLVR, pins.bits()) }
    }

    /// Raw security configuration register.
    #[must_use]
    pub fn security_config(&self) -> u32 {
        // SAFETY: SECCFGR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + SECCFGR) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_block() -> (Box<[u32; 13]>, GpioBlock) {
        let ram = Box::new([0u32; 13]);
        let gpio = unsafe { GpioBlock::from_base(ram.as_ptr() as usize) };
        (ram, gpio)
    }

    #[test]
    fn test_pin_mode_round_trip() {
        let (_ram, gpio) = ram_block();
        for mode in [
            PinMode::Input,
            PinMode::Output,
            PinMode::Alternate,
            PinMode::Analog,
        ] {
            gpio.set_pin_mode(5, mode);
            assert_eq!(gpio.pin_mode(5), mode);
        }
        // Neighbouring fields untouched
        gpio.set_pin_mode(5, PinMode::Analog);
        gpio.set_pin_mode(6, PinMode::Input);
        assert_eq!(gpio.pin_mode(5), PinMode::Analog);
    }

    #[test]
    fn test_speed_pull_otype_round_trip() {
        let (_ram, gpio) = ram_block();
        for speed in [Speed::Low, Speed::Medium, Speed::High, Speed::VeryHigh] {
            gpio.set_speed(3, speed);
            assert_eq!(gpio.speed(3), speed);
        }
        for pull in [Pull::None, Pull::Up, Pull::Down] {
            gpio.set_pull(3, pull);
            assert_eq!(gpio.pull(3), pull);
        }
        gpio.set_output_type(3, OutputType::OpenDrain);
        assert_eq!(gpio.output_type(3), OutputType::OpenDrain);
        gpio.set_output_type(3, OutputType::PushPull);
        assert_eq!(gpio.output_type(3), OutputType::PushPull);
    }

    #[test]
    fn test_alternate_function_high_and_low_registers() {
        let (_ram, gpio) = ram_block();
        gpio.set_alternate(2, AlternateFunction::Af7);
        gpio.set_alternate(10, AlternateFunction::Af14);
        assert_eq!(gpio.alternate(2), AlternateFunction::Af7);
        assert_eq!(gpio.alternate(10), AlternateFunction::Af14);
        // AFRL and AFRH must not alias
        assert_eq!(gpio.alternate(3), AlternateFunction::Af0);
        assert_eq!(gpio.alternate(11), AlternateFunction::Af0);
    }

    #[test]
    fn test_write_multiple_state_word_layout() {
        let (_ram, gpio) = ram_block();
        gpio.write_multiple_state(Pins::PIN_1, Pins::PIN_0);
        // RAM block: BSRR just stores the word, check encoding
        let bsrr = unsafe { mmio::read_reg(gpio.base() + BSRR) };
        assert_eq!(bsrr, (1 << 17) | 1);
    }
}
