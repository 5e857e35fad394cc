//! SPI register accessors
//!
//! Covers the STM32U5 SPI block (the FIFO-based IP with CR1/CR2 transfer
//! control and split CFG1/CFG2 configuration registers). Data register
//! access is provided at 8, 16 and 32-bit width; packing narrower frames
//! into wider FIFO accesses is the HAL's business.

use crate::mmio;

/// SPI1 base address (APB2).
pub const SPI1_BASE: usize = 0x4001_3000;
/// SPI2 base address (APB1).
pub const SPI2_BASE: usize = 0x4000_3800;
/// SPI3 base address (APB3, autonomous domain).
pub const SPI3_BASE: usize = 0x4600_2000;

const CR1: usize = 0x00;
const CR2: usize = 0x04;
const CFG1: usize = 0x08;
const CFG2: usize = 0x0C;
const IER: usize = 0x10;
const SR: usize = 0x14;
const IFCR: usize = 0x18;
const AUTOCR: usize = 0x1C;
const TXDR: usize = 0x20;
const RXDR: usize = 0x30;
const CRCPOLY: usize = 0x40;
const TXCRC: usize = 0x44;
const RXCRC: usize = 0x48;
const UDRDR: usize = 0x4C;

// CR1 bits
const CR1_SPE: u32 = 1 << 0;
const CR1_MASRX: u32 = 1 << 8;
const CR1_CSTART: u32 = 1 << 9;
const CR1_CSUSP: u32 = 1 << 10;
const CR1_HDDIR: u32 = 1 << 11;
const CR1_SSI: u32 = 1 << 12;
const CR1_IOLOCK: u32 = 1 << 16;

// CFG1 fields
const CFG1_DSIZE_MASK: u32 = 0x1F;
const CFG1_FTHLV_MASK: u32 = 0xF << 5;
const CFG1_RXDMAEN: u32 = 1 << 14;
const CFG1_TXDMAEN: u32 = 1 << 15;
const CFG1_CRCSIZE_MASK: u32 = 0x1F << 16;
const CFG1_CRCEN: u32 = 1 << 22;
const CFG1_MBR_MASK: u32 = 0x7 << 28;

// CFG2 fields
const CFG2_MSSI_MASK: u32 = 0xF;
const CFG2_MIDI_MASK: u32 = 0xF << 4;
const CFG2_IOSWP: u32 = 1 << 15;
const CFG2_COMM_MASK: u32 = 0x3 << 17;
const CFG2_MASTER: u32 = 1 << 22;
const CFG2_LSBFRST: u32 = 1 << 23;
const CFG2_CPHA: u32 = 1 << 24;
const CFG2_CPOL: u32 = 1 << 25;
const CFG2_SSM: u32 = 1 << 26;
const CFG2_SSIOP: u32 = 1 << 28;
const CFG2_SSOE: u32 = 1 << 29;
const CFG2_SSOM: u32 = 1 << 30;
const CFG2_AFCNTR: u32 = 1 << 31;

// AUTOCR fields
const AUTOCR_TRIGSEL_MASK: u32 = 0xF << 16;
const AUTOCR_TRIGPOL: u32 = 1 << 20;
const AUTOCR_TRIGEN: u32 = 1 << 21;

bitflags::bitflags! {
    /// SPI status flags (SR). The same bit positions select the matching
    /// interrupt enables in IER and, for the clearable subset, the clear
    /// bits in IFCR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiFlags: u32 {
        /// Rx packet available.
        const RXP = 1 << 0;
        /// Tx packet space available.
        const TXP = 1 << 1;
        /// Duplex packet (TXP and RXP).
        const DXP = 1 << 2;
        /// End of transfer.
        const EOT = 1 << 3;
        /// Transmission transfer filled.
        const TXTF = 1 << 4;
        /// Underrun (slave transmitter).
        const UDR = 1 << 5;
        /// Overrun.
        const OVR = 1 << 6;
        /// CRC error.
        const CRCE = 1 << 7;
        /// TI frame format error.
        const TIFRE = 1 << 8;
        /// Mode fault.
        const MODF = 1 << 9;
        /// Transfer suspended.
        const SUSP = 1 << 11;
        /// Tx transmission complete.
        const TXC = 1 << 12;
        /// Rx FIFO word not empty.
        const RXWNE = 1 << 15;
    }
}

impl SpiFlags {
    /// Flags writable to IFCR.
    pub const CLEARABLE: SpiFlags = SpiFlags::EOT
        .union(SpiFlags::TXTF)
        .union(SpiFlags::UDR)
        .union(SpiFlags::OVR)
        .union(SpiFlags::CRCE)
        .union(SpiFlags::TIFRE)
        .union(SpiFlags::MODF)
        .union(SpiFlags::SUSP);
    /// Error flags latched by the hardware.
    pub const ERRORS: SpiFlags = SpiFlags::UDR
        .union(SpiFlags::OVR)
        .union(SpiFlags::CRCE)
        .union(SpiFlags::TIFRE)
        .union(SpiFlags::MODF);
}

/// SPI operating mode (CFG2 MASTER bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Slave mode.
    Slave,
    /// Master mode.
    Master,
}

/// Transfer direction (CFG2 COMM field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Direction {
    /// Full duplex.
    FullDuplex = 0b00,
    /// Simplex transmitter.
    SimplexTx = 0b01,
    /// Simplex receiver.
    SimplexRx = 0b10,
    /// Half duplex on a single data line.
    HalfDuplex = 0b11,
}

impl Direction {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b00 => Self::FullDuplex,
            0b01 => Self::SimplexTx,
            0b10 => Self::SimplexRx,
            _ => Self::HalfDuplex,
        }
    }
}

/// Frame width in bits (CFG1 DSIZE field, encoded as width minus one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataWidth(u8);

impl DataWidth {
    /// Minimum supported frame width.
    pub const MIN_BITS: u8 = 4;
    /// Maximum supported frame width.
    pub const MAX_BITS: u8 = 32;

    /// 8-bit frames.
    pub const BITS_8: DataWidth = DataWidth(8);
    /// 16-bit frames.
    pub const BITS_16: DataWidth = DataWidth(16);
    /// 32-bit frames.
    pub const BITS_32: DataWidth = DataWidth(32);

    /// Build a width from a bit count in `4..=32`.
    #[must_use]
    pub const fn new(bits: u8) -> Option<Self> {
        if bits >= Self::MIN_BITS && bits <= Self::MAX_BITS {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Frame width in bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Hardware encoding (bits minus one).
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0 as u32 - 1
    }

    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(((raw & CFG1_DSIZE_MASK) + 1) as u8)
    }
}

/// Clock polarity (CFG2 CPOL bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPolarity {
    /// SCK idles low.
    Low,
    /// SCK idles high.
    High,
}

/// Clock phase (CFG2 CPHA bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPhase {
    /// Capture on the first clock transition.
    FirstEdge,
    /// Capture on the second clock transition.
    SecondEdge,
}

/// Shift direction (CFG2 LSBFRST bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FirstBit {
    /// Most significant bit first.
    Msb,
    /// Least significant bit first.
    Lsb,
}

/// Kernel clock divider (CFG1 MBR field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum BaudRatePrescaler {
    /// Kernel clock / 2.
    Div2 = 0b000,
    /// Kernel clock / 4.
    Div4 = 0b001,
    /// Kernel clock / 8.
    Div8 = 0b010,
    /// Kernel clock / 16.
    Div16 = 0b011,
    /// Kernel clock / 32.
    Div32 = 0b100,
    /// Kernel clock / 64.
    Div64 = 0b101,
    /// Kernel clock / 128.
    Div128 = 0b110,
    /// Kernel clock / 256.
    Div256 = 0b111,
}

impl BaudRatePrescaler {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b111 {
            0b000 => Self::Div2,
            0b001 => Self::Div4,
            0b010 => Self::Div8,
            0b011 => Self::Div16,
            0b100 => Self::Div32,
            0b101 => Self::Div64,
            0b110 => Self::Div128,
            _ => Self::Div256,
        }
    }

    /// Numeric divider value.
    #[must_use]
    pub const fn divider(self) -> u32 {
        2 << (self as u32)
    }
}

/// NSS pin management (CFG2 SSM/SSOE combination).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NssManagement {
    /// NSS managed in software (SSM set); the pin is freed for GPIO.
    Soft,
    /// NSS is a hardware input (master collision detect / slave select).
    HardInput,
    /// NSS is a hardware output driven by the master.
    HardOutput,
}

/// FIFO threshold in frames (CFG1 FTHLV field, encoded as frames minus
/// one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoThreshold(u8);

impl FifoThreshold {
    /// One-frame threshold (reset value).
    pub const ONE_FRAME: FifoThreshold = FifoThreshold(1);

    /// Build a threshold from a frame count in `1..=16`.
    #[must_use]
    pub const fn new(frames: u8) -> Option<Self> {
        if frames >= 1 && frames <= 16 {
            Some(Self(frames))
        } else {
            None
        }
    }

    /// Threshold in frames.
    #[must_use]
    pub const fn frames(self) -> u8 {
        self.0
    }

    pub(crate) const fn raw(self) -> u32 {
        self.0 as u32 - 1
    }

    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(((raw & 0xF) + 1) as u8)
    }
}

/// One SPI register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiBlock {
    base: usize,
}

impl SpiBlock {
    /// Bind a register block at `base`.
    ///
    /// # Safety
    /// `base` must point at an SPI-shaped register block (hardware
    /// instance or RAM-backed block of at least 0x50 bytes).
    #[must_use]
    pub const unsafe fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// Base address this block was bound to.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    // --- CR1: enable / transfer control -------------------------------

    /// Enable the peripheral (CR1.SPE).
    pub fn enable(&self) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR1, CR1_SPE) }
    }

    /// Disable the peripheral. Clears SPE; the FIFO is flushed by
    /// hardware.
    pub fn disable(&self) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + CR1, CR1_SPE) }
    }

    /// Whether SPE is set.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        // SAFETY: CR1 is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CR1) };
        raw & CR1_SPE != 0
    }

    /// Start a master transfer (CR1.CSTART).
    pub fn start_transfer(&self) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR1, CR1_CSTART) }
    }

    /// Request master transfer suspension (CR1.CSUSP).
    pub fn suspend_transfer(&self) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR1, CR1_CSUSP) }
    }

    /// Drive the internal slave-select level used with soft NSS.
    pub fn set_internal_ss(&self, high: bool) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe {
            if high {
                mmio::set_bits(self.base + CR1, CR1_SSI);
            } else {
                mmio::clear_bits(self.base + CR1, CR1_SSI);
            }
        }
    }

    /// Enable automatic master Rx suspension on FIFO-full risk
    /// (CR1.MASRX).
    pub fn set_rx_auto_suspend(&self, enabled: bool) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CR1, CR1_MASRX);
            } else {
                mmio::clear_bits(self.base + CR1, CR1_MASRX);
            }
        }
    }

    /// Whether master Rx auto-suspend is enabled.
    #[must_use]
    pub fn is_rx_auto_suspend_enabled(&self) -> bool {
        // SAFETY: CR1 is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CR1) };
        raw & CR1_MASRX != 0
    }

    /// Half-duplex line direction: `true` drives the transmitter.
    pub fn set_half_duplex_tx(&self, tx: bool) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe {
            if tx {
                mmio::set_bits(self.base + CR1, CR1_HDDIR);
            } else {
                mmio::clear_bits(self.base + CR1, CR1_HDDIR);
            }
        }
    }

    /// Lock the AF configuration of the SPI IOs until reset
    /// (CR1.IOLOCK, write-once).
    pub fn lock_io_config(&self) {
        // SAFETY: CR1 is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR1, CR1_IOLOCK) }
    }

    /// Whether the IO configuration is locked.
    #[must_use]
    pub fn is_io_config_locked(&self) -> bool {
        // SAFETY: CR1 is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CR1) };
        raw & CR1_IOLOCK != 0
    }

    // --- CR2: transfer size -------------------------------------------

    /// Program the number of frames of the next transfer (CR2.TSIZE).
    pub fn set_transfer_size(&self, frames: u16) {
        // SAFETY: CR2 is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CR2, 0xFFFF, u32::from(frames)) }
    }

    /// Programmed transfer size in frames.
    #[must_use]
    pub fn transfer_size(&self) -> u16 {
        // SAFETY: CR2 is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + CR2) } & 0xFFFF) as u16
    }

    // --- CFG1 ----------------------------------------------------------

    /// Set the frame width (CFG1.DSIZE).
    pub fn set_data_width(&self, width: DataWidth) {
        // SAFETY: CFG1 is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CFG1, CFG1_DSIZE_MASK, width.raw()) }
    }

    /// Current frame width.
    #[must_use]
    pub fn data_width(&self) -> DataWidth {
        // SAFETY: CFG1 is a valid register of the bound block.
        DataWidth::from_raw(unsafe { mmio::read_reg(self.base + CFG1) })
    }

    /// Set the FIFO threshold (CFG1.FTHLV).
    pub fn set_fifo_threshold(&self, threshold: FifoThreshold) {
        // SAFETY: CFG1 is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CFG1, CFG1_FTHLV_MASK, threshold.raw() << 5) }
    }

    /// Current FIFO threshold.
    #[must_use]
    pub fn fifo_threshold(&self) -> FifoThreshold {
        // SAFETY: CFG1 is a valid register of the bound block.
        FifoThreshold::from_raw(unsafe { mmio::read_reg(self.base + CFG1) } >> 5)
    }

    /// Set the kernel clock prescaler (CFG1.MBR).
    pub fn set_baud_rate_prescaler(&self, prescaler: BaudRatePrescaler) {
        // SAFETY: CFG1 is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CFG1, CFG1_MBR_MASK, (prescaler as u32) << 28) }
    }

    /// Current kernel clock prescaler.
    #[must_use]
    pub fn baud_rate_prescaler(&self) -> BaudRatePrescaler {
        // SAFETY: CFG1 is a valid register of the bound block.
        BaudRatePrescaler::from_raw(unsafe { mmio::read_reg(self.base + CFG1) } >> 28)
    }

    /// Enable hardware CRC with the given CRC frame size in bits
    /// (CFG1.CRCEN + CRCSIZE, encoded as size minus one).
    pub fn enable_crc(&self, crc_bits: u8) {
        let raw = (u32::from(crc_bits) - 1) << 16;
        // SAFETY: CFG1 is a valid register of the bound block.
        unsafe {
            mmio::write_field(self.base + CFG1, CFG1_CRCSIZE_MASK, raw);
            mmio::set_bits(self.base + CFG1, CFG1_CRCEN);
        }
    }

    /// Disable hardware CRC.
    pub fn disable_crc(&self) {
        // SAFETY: CFG1 is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + CFG1, CFG1_CRCEN) }
    }

    /// Whether hardware CRC is enabled.
    #[must_use]
    pub fn is_crc_enabled(&self) -> bool {
        // SAFETY: CFG1 is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CFG1) };
        raw & CFG1_CRCEN != 0
    }

    /// CRC frame size in bits.
    #[must_use]
    pub fn crc_size(&self) -> u8 {
        // SAFETY: CFG1 is a valid register of the bound block.
        (((unsafe { mmio::read_reg(self.base + CFG1) } & CFG1_CRCSIZE_MASK) >> 16) + 1) as u8
    }

    /// Enable or disable the Rx DMA request line.
    pub fn set_rx_dma(&self, enabled: bool) {
        // SAFETY: CFG1 is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CFG1, CFG1_RXDMAEN);
            } else {
                mmio::clear_bits(self.base + CFG1, CFG1_RXDMAEN);
            }
        }
    }

    /// Enable or disable the Tx DMA request line.
    pub fn set_tx_dma(&self, enabled: bool) {
        // SAFETY: CFG1 is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CFG1, CFG1_TXDMAEN);
            } else {
                mmio::clear_bits(self.base + CFG1, CFG1_TXDMAEN);
            }
        }
    }

    // --- CFG2 ----------------------------------------------------------

    /// Set master/slave mode (CFG2.MASTER).
    pub fn set_mode(&self, mode: Mode) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            match mode {
                Mode::Master => mmio::set_bits(self.base + CFG2, CFG2_MASTER),
                Mode::Slave => mmio::clear_bits(self.base + CFG2, CFG2_MASTER),
            }
        }
    }

    /// Current master/slave mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        // SAFETY: CFG2 is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CFG2) } & CFG2_MASTER != 0 {
            Mode::Master
        } else {
            Mode::Slave
        }
    }

    /// Set the transfer direction (CFG2.COMM).
    pub fn set_direction(&self, direction: Direction) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CFG2, CFG2_COMM_MASK, (direction as u32) << 17) }
    }

    /// Current transfer direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        // SAFETY: CFG2 is a valid register of the bound block.
        Direction::from_raw(unsafe { mmio::read_reg(self.base + CFG2) } >> 17)
    }

    /// Set the clock polarity (CFG2.CPOL).
    pub fn set_clock_polarity(&self, polarity: ClockPolarity) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            match polarity {
                ClockPolarity::High => mmio::set_bits(self.base + CFG2, CFG2_CPOL),
                ClockPolarity::Low => mmio::clear_bits(self.base + CFG2, CFG2_CPOL),
            }
        }
    }

    /// Current clock polarity.
    #[must_use]
    pub fn clock_polarity(&self) -> ClockPolarity {
        // SAFETY: CFG2 is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CFG2) } & CFG2_CPOL != 0 {
            ClockPolarity::High
        } else {
            ClockPolarity::Low
        }
    }

    /// Set the clock phase (CFG2.CPHA).
    pub fn set_clock_phase(&self, phase: ClockPhase) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            match phase {
                ClockPhase::SecondEdge => mmio::set_bits(self.base + CFG2, CFG2_CPHA),
                ClockPhase::FirstEdge => mmio::clear_bits(self.base + CFG2, CFG2_CPHA),
            }
        }
    }

    /// Current clock phase.
    #[must_use]
    pub fn clock_phase(&self) -> ClockPhase {
        // SAFETY: CFG2 is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CFG2) } & CFG2_CPHA != 0 {
            ClockPhase::SecondEdge
        } else {
            ClockPhase::FirstEdge
        }
    }

    /// Set the shift direction (CFG2.LSBFRST).
    pub fn set_first_bit(&self, first_bit: FirstBit) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            match first_bit {
                FirstBit::Lsb => mmio::set_bits(self.base + CFG2, CFG2_LSBFRST),
                FirstBit::Msb => mmio::clear_bits(self.base + CFG2, CFG2_LSBFRST),
            }
        }
    }

    /// Current shift direction.
    #[must_use]
    pub fn first_bit(&self) -> FirstBit {
        // SAFETY: CFG2 is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CFG2) } & CFG2_LSBFRST != 0 {
            FirstBit::Lsb
        } else {
            FirstBit::Msb
        }
    }

    /// Set NSS pin management (CFG2.SSM/SSOE).
    pub fn set_nss_management(&self, nss: NssManagement) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            match nss {
                NssManagement::Soft => {
                    mmio::set_bits(self.base + CFG2, CFG2_SSM);
                    mmio::clear_bits(self.base + CFG2, CFG2_SSOE);
                }
                NssManagement::HardInput => {
                    mmio::clear_bits(self.base + CFG2, CFG2_SSM | CFG2_SSOE);
                }
                NssManagement::HardOutput => {
                    mmio::clear_bits(self.base + CFG2, CFG2_SSM);
                    mmio::set_bits(self.base + CFG2, CFG2_SSOE);
                }
            }
        }
    }

    /// Current NSS pin management.
    #[must_use]
    pub fn nss_management(&self) -> NssManagement {
        // SAFETY: CFG2 is a valid register of the bound block.
        let cfg2 = unsafe { mmio::read_reg(self.base + CFG2) };
        if cfg2 & CFG2_SSM != 0 {
            NssManagement::Soft
        } else if cfg2 & CFG2_SSOE != 0 {
            NssManagement::HardOutput
        } else {
            NssManagement::HardInput
        }
    }

    /// Invert the NSS input/output polarity (CFG2.SSIOP).
    pub fn set_nss_polarity_high(&self, active_high: bool) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            if active_high {
                mmio::set_bits(self.base + CFG2, CFG2_SSIOP);
            } else {
                mmio::clear_bits(self.base + CFG2, CFG2_SSIOP);
            }
        }
    }

    /// NSS pulse management between frames (CFG2.SSOM).
    pub fn set_nss_pulse(&self, pulse: bool) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            if pulse {
                mmio::set_bits(self.base + CFG2, CFG2_SSOM);
            } else {
                mmio::clear_bits(self.base + CFG2, CFG2_SSOM);
            }
        }
    }

    /// Whether an NSS pulse is inserted between frames.
    #[must_use]
    pub fn nss_pulse(&self) -> bool {
        // SAFETY: CFG2 is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CFG2) };
        raw & CFG2_SSOM != 0
    }

    /// Swap MOSI and MISO (CFG2.IOSWP).
    pub fn set_io_swap(&self, swapped: bool) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            if swapped {
                mmio::set_bits(self.base + CFG2, CFG2_IOSWP);
            } else {
                mmio::clear_bits(self.base + CFG2, CFG2_IOSWP);
            }
        }
    }

    /// Whether MOSI/MISO are swapped.
    #[must_use]
    pub fn is_io_swapped(&self) -> bool {
        // SAFETY: CFG2 is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CFG2) };
        raw & CFG2_IOSWP != 0
    }

    /// Keep AF control of the IOs while SPE is low (CFG2.AFCNTR).
    pub fn set_keep_io_state(&self, keep: bool) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe {
            if keep {
                mmio::set_bits(self.base + CFG2, CFG2_AFCNTR);
            } else {
                mmio::clear_bits(self.base + CFG2, CFG2_AFCNTR);
            }
        }
    }

    /// Whether AF control survives peripheral disable.
    #[must_use]
    pub fn is_keep_io_state_enabled(&self) -> bool {
        // SAFETY: CFG2 is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CFG2) };
        raw & CFG2_AFCNTR != 0
    }

    /// Master inter-data idleness in clock cycles (CFG2.MIDI, 0..=15).
    pub fn set_inter_data_idleness(&self, cycles: u8) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CFG2, CFG2_MIDI_MASK, u32::from(cycles & 0xF) << 4) }
    }

    /// Current master inter-data idleness in clock cycles.
    #[must_use]
    pub fn inter_data_idleness(&self) -> u8 {
        // SAFETY: CFG2 is a valid register of the bound block.
        (((unsafe { mmio::read_reg(self.base + CFG2) }) & CFG2_MIDI_MASK) >> 4) as u8
    }

    /// Master slave-select idleness in clock cycles (CFG2.MSSI, 0..=15).
    pub fn set_ss_idleness(&self, cycles: u8) {
        // SAFETY: CFG2 is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CFG2, CFG2_MSSI_MASK, u32::from(cycles & 0xF)) }
    }

    // --- IER / SR / IFCR ----------------------------------------------

    /// Enable the interrupts selected by `flags` (bit positions shared
    /// with SR).
    pub fn enable_interrupts(&self, flags: SpiFlags) {
        // SAFETY: IER is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + IER, flags.bits()) }
    }

    /// Disable the interrupts selected by `flags`.
    pub fn disable_interrupts(&self, flags: SpiFlags) {
        // SAFETY: IER is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + IER, flags.bits()) }
    }

    /// Currently enabled interrupt sources.
    #[must_use]
    pub fn enabled_interrupts(&self) -> SpiFlags {
        // SAFETY: IER is a valid register of the bound block.
        SpiFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + IER) })
    }

    /// Snapshot of the status register.
    #[must_use]
    pub fn flags(&self) -> SpiFlags {
        // SAFETY: SR is a valid register of the bound block.
        SpiFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + SR) })
    }

    /// Whether all `flags` are asserted.
    #[must_use]
    pub fn is_flag_set(&self, flags: SpiFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Remaining frame count of the current transfer (SR.CTSIZE).
    #[must_use]
    pub fn remaining_frames(&self) -> u16 {
        // SAFETY: SR is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + SR) } >> 16) as u16
    }

    /// Clear the selected flags through IFCR.
    pub fn clear_flags(&self, flags: SpiFlags) {
        // SAFETY: IFCR is a valid register of the bound block; writes to
        // reserved bits are ignored by hardware.
        unsafe { mmio::write_reg(self.base + IFCR, (flags & SpiFlags::CLEARABLE).bits()) }
    }

    // --- Data registers ------------------------------------------------

    /// Push one byte into the Tx FIFO.
    pub fn write_data8(&self, data: u8) {
        // SAFETY: TXDR accepts byte-wide accesses.
        unsafe { core::ptr::write_volatile((self.base + TXDR) as *mut u8, data) }
    }

    /// Push one half-word into the Tx FIFO.
    pub fn write_data16(&self, data: u16) {
        // SAFETY: TXDR accepts half-word-wide accesses.
        unsafe { core::ptr::write_volatile((self.base + TXDR) as *mut u16, data) }
    }

    /// Push one word into the Tx FIFO.
    pub fn write_data32(&self, data: u32) {
        // SAFETY: TXDR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + TXDR, data) }
    }

    /// Pop one byte from the Rx FIFO.
    #[must_use]
    pub fn read_data8(&self) -> u8 {
        // SAFETY: RXDR accepts byte-wide accesses.
        unsafe { core::ptr::read_volatile((self.base + RXDR) as *const u8) }
    }

    /// Pop one half-word from the Rx FIFO.
    #[must_use]
    pub fn read_data16(&self) -> u16 {
        // SAFETY: RXDR accepts half-word-wide accesses.
        unsafe { core::ptr::read_volatile((self.base + RXDR) as *const u16) }
    }

    /// Pop one word from the Rx FIFO.
    #[must_use]
    pub fn read_data32(&self) -> u32 {
        // SAFETY: RXDR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + RXDR) }
    }

    // --- CRC / underrun / autonomous trigger ---------------------------

    /// Program the CRC polynomial.
    pub fn set_crc_polynomial(&self, poly: u32) {
        // SAFETY: CRCPOLY is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + CRCPOLY, poly) }
    }

    /// Programmed CRC polynomial.
    #[must_use]
    pub fn crc_polynomial(&self) -> u32 {
        // SAFETY: CRCPOLY is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + CRCPOLY) }
    }

    /// Transmitted CRC of the last transfer.
    #[must_use]
    pub fn tx_crc(&self) -> u32 {
        // SAFETY: TXCRC is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + TXCRC) }
    }

    /// Received CRC of the last transfer.
    #[must_use]
    pub fn rx_crc(&self) -> u32 {
        // SAFETY: RXCRC is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + RXCRC) }
    }

    /// Pattern transmitted by a slave on underrun.
    pub fn set_underrun_data(&self, data: u32) {
        // SAFETY: UDRDR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + UDRDR, data) }
    }

    /// Configure the autonomous-mode trigger (AUTOCR).
    pub fn set_trigger(&self, source: u8, rising: bool) {
        // SAFETY: AUTOCR is a valid register of the bound block.
        unsafe {
            mmio::write_field(
                self.base + AUTOCR,
                AUTOCR_TRIGSEL_MASK | AUTOCR_TRIGPOL,
                (u32::from(source & 0xF) << 16) | if rising { 0 } else { AUTOCR_TRIGPOL },
            );
        }
    }

    /// Enable or disable the autonomous-mode trigger (AUTOCR.TRIGEN).
    pub fn set_trigger_enabled(&self, enabled: bool) {
        // SAFETY: AUTOCR is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + AUTOCR, AUTOCR_TRIGEN);
            } else {
                mmio::clear_bits(self.base + AUTOCR, AUTOCR_TRIGEN);
            }
        }
    }

    /// Whether the autonomous-mode trigger is enabled.
    #[must_use]
    pub fn is_trigger_enabled(&self) -> bool {
        // SAFETY: AUTOCR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + AUTOCR) };
        raw & AUTOCR_TRIGEN != 0
    }

    /// Reset every configuration register to its documented reset value.
    pub fn reset_registers(&self) {
        // SAFETY: all offsets below are valid registers of the bound
        // block. CFG1 resets with DSIZE = 7 (8-bit frames).
        unsafe {
            mmio::write_reg(self.base + CR1, 0);
            mmio::write_reg(self.base + CR2, 0);
            mmio::write_reg(self.base + CFG1, 0x0007_0007);
            mmio::write_reg(self.base + CFG2, 0);
            mmio::write_reg(self.base + IER, 0);
            mmio::write_reg(self.base + IFCR, 0x0FF8);
            mmio::write_reg(self.base + AUTOCR, 0);
            mmio::write_reg(self.base + CRCPOLY, 0x107);
            mmio::write_reg(self.base + UDRDR, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ram_block() -> (Box<[u32; 0x20]>, SpiBlock) {
        let ram = Box::new([0u32; 0x20]);
        let spi = unsafe { SpiBlock::from_base(ram.as_ptr() as usize) };
        (ram, spi)
    }

    #[test]
    fn test_enable_disable() {
        let (_ram, spi) = ram_block();
        assert!(!spi.is_enabled());
        spi.enable();
        assert!(spi.is_enabled());
        spi.disable();
        assert!(!spi.is_enabled());
    }

    #[test]
    fn test_direction_round_trip() {
        let (_ram, spi) = ram_block();
        for dir in [
            Direction::FullDuplex,
            Direction::SimplexTx,
            Direction::SimplexRx,
            Direction::HalfDuplex,
        ] {
            spi.set_direction(dir);
            assert_eq!(spi.direction(), dir);
        }
    }

    #[test]
    fn test_prescaler_round_trip_and_divider() {
        let (_ram, spi) = ram_block();
        for (presc, div) in [
            (BaudRatePrescaler::Div2, 2),
            (BaudRatePrescaler::Div4, 4),
            (BaudRatePrescaler::Div8, 8),
            (BaudRatePrescaler::Div16, 16),
            (BaudRatePrescaler::Div32, 32),
            (BaudRatePrescaler::Div64, 64),
            (BaudRatePrescaler::Div128, 128),
            (BaudRatePrescaler::Div256, 256),
        ] {
            spi.set_baud_rate_prescaler(presc);
            assert_eq!(spi.baud_rate_prescaler(), presc);
            assert_eq!(presc.divider(), div);
        }
    }

    #[test]
    fn test_nss_management_round_trip() {
        let (_ram, spi) = ram_block();
        for nss in [
            NssManagement::Soft,
            NssManagement::HardInput,
            NssManagement::HardOutput,
        ] {
            spi.set_nss_management(nss);
            assert_eq!(spi.nss_management(), nss);
        }
    }

    #[test]
    fn test_clear_flags_masks_unclearable_bits() {
        let (ram, spi) = ram_block();
        spi.clear_flags(SpiFlags::RXP | SpiFlags::OVR | SpiFlags::EOT);
        // RXP is status-only and must not reach IFCR
        let ifcr = ram[0x18 / 4];
        assert_eq!(ifcr, (SpiFlags::OVR | SpiFlags::EOT).bits());
    }

    proptest! {
        #[test]
        fn prop_data_width_round_trip(bits in 4u8..=32) {
            let (_ram, spi) = ram_block();
            let width = DataWidth::new(bits).unwrap();
            spi.set_data_width(width);
            prop_assert_eq!(spi.data_width().bits(), bits);
        }

        #[test]
        fn prop_fifo_threshold_round_trip(frames in 1u8..=16) {
            let (_ram, spi) = ram_block();
            let th = FifoThreshold::new(frames).unwrap();
            spi.set_fifo_threshold(th);
            prop_assert_eq!(spi.fifo_threshold().frames(), frames);
        }

        #[test]
        fn prop_transfer_size_round_trip(frames in 0u16..=u16::MAX) {
            let (_ram, spi) = ram_block();
            spi.set_transfer_size(frames);
            prop_assert_eq!(spi.transfer_size(), frames);
        }
    }
}
