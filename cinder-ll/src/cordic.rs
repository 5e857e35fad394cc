//! CORDIC register accessors
//!
//! The block is three registers: CSR for configuration, and the WDATA
//! and RDATA FIFO windows for argument and result transfer.

use crate::mmio;

/// CORDIC base address (AHB1).
pub const CORDIC_BASE: usize = 0x4002_1000;

const CSR: usize = 0x00;
const WDATA: usize = 0x04;
const RDATA: usize = 0x08;

const CSR_FUNC_MASK: u32 = 0xF;
const CSR_PRECISION_MASK: u32 = 0xF << 4;
const CSR_SCALE_MASK: u32 = 0x7 << 8;
const CSR_IEN: u32 = 1 << 16;
const CSR_DMAREN: u32 = 1 << 17;
const CSR_DMAWEN: u32 = 1 << 18;
const CSR_NRES: u32 = 1 << 19;
const CSR_NARGS: u32 = 1 << 20;
const CSR_RESSIZE: u32 = 1 << 21;
const CSR_ARGSIZE: u32 = 1 << 22;
const CSR_RRDY: u32 = 1 << 31;

/// Mathematical function evaluated by the rotation engine (CSR.FUNC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Function {
    Cosine = 0,
    Sine = 1,
    Phase = 2,
    Modulus = 3,
    Arctangent = 4,
    HyperbolicCosine = 5,
    HyperbolicSine = 6,
    HyperbolicArctangent = 7,
    NaturalLogarithm = 8,
    SquareRoot = 9,
}

impl Function {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & CSR_FUNC_MASK {
            0 => Self::Cosine,
            1 => Self::Sine,
            2 => Self::Phase,
            3 => Self::Modulus,
            4 => Self::Arctangent,
            5 => Self::HyperbolicCosine,
            6 => Self::HyperbolicSine,
            7 => Self::HyperbolicArctangent,
            8 => Self::NaturalLogarithm,
            _ => Self::SquareRoot,
        }
    }
}

/// Iteration count, in multiples of four (CSR.PRECISION). `Iters20` is
/// the usual accuracy/speed compromise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Precision {
    Iters4 = 1,
    Iters8 = 2,
    Iters12 = 3,
    Iters16 = 4,
    Iters20 = 5,
    Iters24 = 6,
    Iters28 = 7,
    Iters32 = 8,
    Iters36 = 9,
    Iters40 = 10,
    Iters44 = 11,
    Iters48 = 12,
    Iters52 = 13,
    Iters56 = 14,
    Iters60 = 15,
}

impl Precision {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0xF {
            1 => Self::Iters4,
            2 => Self::Iters8,
            3 => Self::Iters12,
            4 => Self::Iters16,
            5 => Self::Iters20,
            6 => Self::Iters24,
            7 => Self::Iters28,
            8 => Self::Iters32,
            9 => Self::Iters36,
            10 => Self::Iters40,
            11 => Self::Iters44,
            12 => Self::Iters48,
            13 => Self::Iters52,
            14 => Self::Iters56,
            _ => Self::Iters60,
        }
    }
}

/// Fixed-point width of arguments or results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataSize {
    /// q1.31 words.
    Bits32,
    /// q1.15 half-words, packed two per register access.
    Bits16,
}

/// Argument or result count per calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Count {
    One,
    Two,
}

/// The CORDIC register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CordicBlock {
    base: usize,
}

impl CordicBlock {
    /// Bind a register block at `base`.
    ///
    /// # Safety
    /// `base` must point at a CORDIC-shaped register block (hardware
    /// instance or RAM-backed block of at least 12 bytes).
    #[must_use]
    pub const unsafe fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// Base address this block was bound to.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Program function, precision and scale in one CSR update.
    pub fn set_function_config(&self, func: Function, precision: Precision, scale: u8) {
        let value = (func as u32)
            | ((precision as u32) << 4)
            | ((u32::from(scale) << 8) & CSR_SCALE_MASK);
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            mmio::write_field(
                self.base + CSR,
                CSR_FUNC_MASK | CSR_PRECISION_MASK | CSR_SCALE_MASK,
                value,
            );
        }
    }

    /// Currently selected function.
    #[must_use]
    pub fn function(&self) -> Function {
        // SAFETY: CSR is a valid register of the bound block.
        Function::from_raw(unsafe { mmio::read_reg(self.base + CSR) })
    }

    /// Currently selected precision.
    #[must_use]
    pub fn precision(&self) -> Precision {
        // SAFETY: CSR is a valid register of the bound block.
        Precision::from_raw(unsafe { mmio::read_reg(self.base + CSR) } >> 4)
    }

    /// Currently selected scaling factor exponent.
    #[must_use]
    pub fn scale(&self) -> u8 {
        // SAFETY: CSR is a valid register of the bound block.
        ((unsafe { mmio::read_reg(self.base + CSR) } & CSR_SCALE_MASK) >> 8) as u8
    }

    /// Argument width (CSR.ARGSIZE).
    pub fn set_arg_size(&self, size: DataSize) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            match size {
                DataSize::Bits16 => mmio::set_bits(self.base + CSR, CSR_ARGSIZE),
                DataSize::Bits32 => mmio::clear_bits(self.base + CSR, CSR_ARGSIZE),
            }
        }
    }

    /// Current argument width.
    #[must_use]
    pub fn arg_size(&self) -> DataSize {
        // SAFETY: CSR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CSR) } & CSR_ARGSIZE != 0 {
            DataSize::Bits16
        } else {
            DataSize::Bits32
        }
    }

    /// Result width (CSR.RESSIZE).
    pub fn set_result_size(&self, size: DataSize) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            match size {
                DataSize::Bits16 => mmio::set_bits(self.base + CSR, CSR_RESSIZE),
                DataSize::Bits32 => mmio::clear_bits(self.base + CSR, CSR_RESSIZE),
            }
        }
    }

    /// Current result width.
    #[must_use]
    pub fn result_size(&self) -> DataSize {
        // SAFETY: CSR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CSR) } & CSR_RESSIZE != 0 {
            DataSize::Bits16
        } else {
            DataSize::Bits32
        }
    }

    /// Number of WDATA writes per calculation (CSR.NARGS).
    pub fn set_arg_count(&self, count: Count) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            match count {
                Count::Two => mmio::set_bits(self.base + CSR, CSR_NARGS),
                Count::One => mmio::clear_bits(self.base + CSR, CSR_NARGS),
            }
        }
    }

    /// Current WDATA writes per calculation.
    #[must_use]
    pub fn arg_count(&self) -> Count {
        // SAFETY: CSR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CSR) } & CSR_NARGS != 0 {
            Count::Two
        } else {
            Count::One
        }
    }

    /// Number of RDATA reads per calculation (CSR.NRES).
    pub fn set_result_count(&self, count: Count) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            match count {
                Count::Two => mmio::set_bits(self.base + CSR, CSR_NRES),
                Count::One => mmio::clear_bits(self.base + CSR, CSR_NRES),
            }
        }
    }

    /// Current RDATA reads per calculation.
    #[must_use]
    pub fn result_count(&self) -> Count {
        // SAFETY: CSR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CSR) } & CSR_NRES != 0 {
            Count::Two
        } else {
            Count::One
        }
    }

    /// Enable or disable the result-ready interrupt (CSR.IEN).
    pub fn set_interrupt(&self, enabled: bool) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CSR, CSR_IEN);
            } else {
                mmio::clear_bits(self.base + CSR, CSR_IEN);
            }
        }
    }

    /// Whether the result-ready interrupt is enabled.
    #[must_use]
    pub fn is_interrupt_enabled(&self) -> bool {
        // SAFETY: CSR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CSR) };
        raw & CSR_IEN != 0
    }

    /// Enable or disable the read-channel DMA request (CSR.DMAREN).
    pub fn set_read_dma(&self, enabled: bool) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CSR, CSR_DMAREN);
            } else {
                mmio::clear_bits(self.base + CSR, CSR_DMAREN);
            }
        }
    }

    /// Enable or disable the write-channel DMA request (CSR.DMAWEN).
    pub fn set_write_dma(&self, enabled: bool) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CSR, CSR_DMAWEN);
            } else {
                mmio::clear_bits(self.base + CSR, CSR_DMAWEN);
            }
        }
    }

    /// Whether a result is waiting in RDATA (CSR.RRDY).
    #[must_use]
    pub fn is_result_ready(&self) -> bool {
        // SAFETY: CSR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CSR) };
        raw & CSR_RRDY != 0
    }

    /// Push one argument word. Writing the last expected argument
    /// starts the calculation.
    pub fn write_argument(&self, value: u32) {
        // SAFETY: WDATA is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + WDATA, value) }
    }

    /// Pop one result word.
    #[must_use]
    pub fn read_result(&self) -> u32 {
        // SAFETY: RDATA is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + RDATA) }
    }

    /// Reset CSR to its reset value.
    pub fn reset_registers(&self) {
        // SAFETY: CSR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + CSR, 0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_block() -> (Box<[u32; 3]>, CordicBlock) {
        let ram = Box::new([0u32; 3]);
        let cordic = unsafe { CordicBlock::from_base(ram.as_ptr() as usize) };
        (ram, cordic)
    }

    #[test]
    fn test_function_config_round_trip() {
        let (_ram, cordic) = ram_block();
        cordic.set_function_config(Function::Sine, Precision::Iters24, 3);
        assert_eq!(cordic.function(), Function::Sine);
        assert_eq!(cordic.precision(), Precision::Iters24);
        assert_eq!(cordic.scale(), 3);

        // a second config fully replaces the first
        cordic.set_function_config(Function::SquareRoot, Precision::Iters4, 0);
        assert_eq!(cordic.function(), Function::SquareRoot);
        assert_eq!(cordic.precision(), Precision::Iters4);
        assert_eq!(cordic.scale(), 0);
    }

    #[test]
    fn test_sizes_and_counts_independent() {
        let (_ram, cordic) = ram_block();
        cordic.set_arg_size(DataSize::Bits16);
        cordic.set_result_size(DataSize::Bits32);
        cordic.set_arg_count(Count::Two);
        cordic.set_result_count(Count::One);
        assert_eq!(cordic.arg_size(), DataSize::Bits16);
        assert_eq!(cordic.result_size(), DataSize::Bits32);
        assert_eq!(cordic.arg_count(), Count::Two);
        assert_eq!(cordic.result_count(), Count::One);
    }

    #[test]
    fn test_data_windows() {
        let (ram, cordic) = ram_block();
        cordic.write_argument(0x4000_0000);
        assert_eq!(ram[1], 0x4000_0000);
        // RDATA reads whatever the engine left there
        unsafe { crate::mmio::write_reg(ram.as_ptr() as usize + 8, 0x1234_5678) };
        assert_eq!(cordic.read_result(), 0x1234_5678);
    }
}
