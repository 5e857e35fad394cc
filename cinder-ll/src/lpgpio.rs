//! LPGPIO register accessors
//!
//! The low-power GPIO port only knows input and output modes and has no
//! pull, speed or alternate-function hardware; its block is a five-register
//! subset of the full GPIO port.

use crate::mmio;

/// LPGPIO1 base address (AHB3, autonomous domain).
pub const LPGPIO1_BASE: usize = 0x4602_0000;

const MODER: usize = 0x00;
const IDR: usize = 0x04;
const ODR: usize = 0x08;
const BSRR: usize = 0x0C;
const BRR: usize = 0x10;

/// LPGPIO pin direction (MODER one-bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum LpMode {
    /// Input mode (reset state).
    Input = 0,
    /// Output mode.
    Output = 1,
}

/// The LPGPIO register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpgpioBlock {
    base: usize,
}

impl LpgpioBlock {
    /// Bind a register block at `base`.
    ///
    /// # Safety
    /// `base` must point at an LPGPIO-shaped register block (hardware port
    /// or RAM-backed block of at least 5 words).
    #[must_use]
    pub const unsafe fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// Base address this block was bound to.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Set the direction of one pin.
    pub fn set_pin_mode(&self, pin: u8, mode: LpMode) {
        let shift = u32::from(pin);
        // SAFETY: MODER is a valid register of the bound block.
        unsafe {
            mmio::write_field(self.base + MODER, 1 << shift, (mode as u32) << shift);
        }
    }

    /// Current direction of one pin.
    #[must_use]
    pub fn pin_mode(&self, pin: u8) -> LpMode {
        // SAFETY: MODER is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + MODER) } >> u32::from(pin);
        if raw & 1 == 0 {
            LpMode::Input
        } else {
            LpMode::Output
        }
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

    /// Drive the selected pins high (atomic, via BSRR).
    pub fn set_pins(&self, mask: u32) {
        // SAFETY: BSRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + BSRR, mask & 0xFFFF) }
    }

    /// Drive the selected pins low (atomic, via BRR).
    pub fn reset_pins(&self, mask: u32) {
        // SAFETY: BRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + BRR, mask & 0xFFFF) }
    }

    /// Toggle the selected pins through a single BSRR write.
    pub fn toggle_pins(&self, mask: u32) {
        let odr = self.read_output_port();
        let word = ((odr & mask) << 16) | (!odr & mask & 0xFFFF);
        // SAFETY: BSRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + BSRR, word) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_block() -> (Box<[u32; 5]>, LpgpioBlock) {
        let ram = Box::new([0u32; 5]);
        let lp = unsafe { LpgpioBlock::from_base(ram.as_ptr() as usize) };
        (ram, lp)
    }

    #[test]
    fn test_mode_round_trip() {
        let (_ram, lp) = ram_block();
        lp.set_pin_mode(0, LpMode::Output);
        lp.set_pin_mode(15, LpMode::Output);
        assert_eq!(lp.pin_mode(0), LpMode::Output);
        assert_eq!(lp.pin_mode(1), LpMode::Input);
        assert_eq!(lp.pin_mode(15), LpMode::Output);
        lp.set_pin_mode(0, LpMode::Input);
        assert_eq!(lp.pin_mode(0), LpMode::Input);
    }

    #[test]
    fn test_output_port_round_trip() {
        let (_ram, lp) = ram_block();
        lp.write_output_port(0xA5A5);
        assert_eq!(lp.read_output_port(), 0xA5A5);
    }
}
