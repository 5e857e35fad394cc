//! CRS (clock recovery system) register accessors
//!
//! Trims the HSI48 oscillator against an external synchronization
//! signal (USB SOF, LSE or the SYNC pin). Four registers: CR, CFGR,
//! ISR and ICR.

use crate::mmio;

/// CRS base address (APB1).
pub const CRS_BASE: usize = 0x4000_6000;

const CR: usize = 0x00;
const CFGR: usize = 0x04;
const ISR: usize = 0x08;
const ICR: usize = 0x0C;

const CR_SYNCOKIE: u32 = 1 << 0;
const CR_SYNCWARNIE: u32 = 1 << 1;
const CR_ERRIE: u32 = 1 << 2;
const CR_ESYNCIE: u32 = 1 << 3;
const CR_CEN: u32 = 1 << 5;
const CR_AUTOTRIMEN: u32 = 1 << 6;
const CR_SWSYNC: u32 = 1 << 7;
const CR_TRIM_MASK: u32 = 0x7F << 8;

const CFGR_RELOAD_MASK: u32 = 0xFFFF;
const CFGR_FELIM_MASK: u32 = 0xFF << 16;
const CFGR_SYNCDIV_MASK: u32 = 0x7 << 24;
const CFGR_SYNCSRC_MASK: u32 = 0x3 << 28;
const CFGR_SYNCPOL: u32 = 1 << 31;

const ISR_FEDIR: u32 = 1 << 15;

bitflags::bitflags! {
    /// CRS event and error flags (ISR low half; the event subset shares
    /// bit positions with the CR interrupt enables and the ICR clear
    /// bits).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CrsFlags: u32 {
        /// Frequency error within limit at the last SYNC event.
        const SYNC_OK = 1 << 0;
        /// Frequency error above limit but still trimmable.
        const SYNC_WARN = 1 << 1;
        /// Error summary flag (SYNCERR, SYNCMISS or TRIMOVF).
        const ERROR = 1 << 2;
        /// Expected SYNC event (counter reached zero without SYNC).
        const EXPECTED_SYNC = 1 << 3;
        /// SYNC error (counter reset outside the tolerance window).
        const SYNC_ERROR = 1 << 8;
        /// SYNC missed (counter overflow before the SYNC event).
        const SYNC_MISS = 1 << 9;
        /// Trim value overflow or underflow during auto-trimming.
        const TRIM_OVERFLOW = 1 << 10;
    }
}

impl CrsFlags {
    /// Interrupt-enable subset (valid in CR and ICR).
    pub const EVENTS: CrsFlags = CrsFlags::SYNC_OK
        .union(CrsFlags::SYNC_WARN)
        .union(CrsFlags::ERROR)
        .union(CrsFlags::EXPECTED_SYNC);
    /// Error detail subset reported alongside `ERROR`.
    pub const ERROR_SOURCES: CrsFlags = CrsFlags::SYNC_ERROR
        .union(CrsFlags::SYNC_MISS)
        .union(CrsFlags::TRIM_OVERFLOW);
}

/// SYNC signal source (CFGR.SYNCSRC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum SyncSource {
    /// External CRS_SYNC pin.
    Gpio = 0b00,
    /// LSE oscillator.
    Lse = 0b01,
    /// USB start-of-frame.
    Usb = 0b10,
}

impl SyncSource {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b00 => Self::Gpio,
            0b01 => Self::Lse,
            _ => Self::Usb,
        }
    }
}

/// SYNC input divider (CFGR.SYNCDIV).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum SyncDivider {
    Div1 = 0b000,
    Div2 = 0b001,
    Div4 = 0b010,
    Div8 = 0b011,
    Div16 = 0b100,
    Div32 = 0b101,
    Div64 = 0b110,
    Div128 = 0b111,
}

impl SyncDivider {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b111 {
            0b000 => Self::Div1,
            0b001 => Self::Div2,
            0b010 => Self::Div4,
            0b011 => Self::Div8,
            0b100 => Self::Div16,
            0b101 => Self::Div32,
            0b110 => Self::Div64,
            _ => Self::Div128,
        }
    }
}

/// SYNC active edge (CFGR.SYNCPOL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncPolarity {
    Rising,
    Falling,
}

/// The CRS register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrsBlock {
    base: usize,
}

impl CrsBlock {
    /// Bind a register block at `base`.
    ///
    /// # Safety
    /// `base` must point at a CRS-shaped register block (hardware
    /// instance or RAM-backed block of at least 16 bytes).
    #[must_use]
    pub const unsafe fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// Base address this block was bound to.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Enable or disable the frequency error counter (CR.CEN).
    pub fn set_counter_enabled(&self, enabled: bool) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CR, CR_CEN);
            } else {
                mmio::clear_bits(self.base + CR, CR_CEN);
            }
        }
    }

    /// Whether the frequency error counter is running.
    #[must_use]
    pub fn is_counter_enabled(&self) -> bool {
        // SAFETY: CR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CR) };
        raw & CR_CEN != 0
    }

    /// Enable or disable automatic trimming (CR.AUTOTRIMEN).
    pub fn set_auto_trim_enabled(&self, enabled: bool) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe {
            if enabled {
                mmio::set_bits(self.base + CR, CR_AUTOTRIMEN);
            } else {
                mmio::clear_bits(self.base + CR, CR_AUTOTRIMEN);
            }
        }
    }

    /// Whether automatic trimming is enabled.
    #[must_use]
    pub fn is_auto_trim_enabled(&self) -> bool {
        // SAFETY: CR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CR) };
        raw & CR_AUTOTRIMEN != 0
    }

    /// Generate a software SYNC event (CR.SWSYNC, self-clearing in
    /// hardware).
    pub fn generate_software_sync(&self) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR, CR_SWSYNC) }
    }

    /// Program the HSI48 trim value (CR.TRIM, 7 bits, mid-range 0x40).
    pub fn set_trim(&self, trim: u8) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CR, CR_TRIM_MASK, u32::from(trim & 0x7F) << 8) }
    }

    /// Current trim value. Hardware updates this while auto-trimming.
    #[must_use]
    pub fn trim(&self) -> u8 {
        // SAFETY: CR is a valid register of the bound block.
        ((unsafe { mmio::read_reg(self.base + CR) } & CR_TRIM_MASK) >> 8) as u8
    }

    /// Enable the interrupts selected by `flags` (event subset only).
    pub fn enable_interrupts(&self, flags: CrsFlags) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR, (flags & CrsFlags::EVENTS).bits()) }
    }

    /// Disable the interrupts selected by `flags`.
    pub fn disable_interrupts(&self, flags: CrsFlags) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + CR, (flags & CrsFlags::EVENTS).bits()) }
    }

    /// Currently enabled interrupt sources.
    #[must_use]
    pub fn enabled_interrupts(&self) -> CrsFlags {
        // SAFETY: CR is a valid register of the bound block.
        CrsFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + CR) })
            & CrsFlags::EVENTS
    }

    /// Program the whole synchronization configuration in one CFGR
    /// write.
    pub fn set_sync_config(
        &self,
        reload: u16,
        error_limit: u8,
        divider: SyncDivider,
        source: SyncSource,
        polarity: SyncPolarity,
    ) {
        let value = u32::from(reload)
            | (u32::from(error_limit) << 16)
            | ((divider as u32) << 24)
            | ((source as u32) << 28)
            | match polarity {
                SyncPolarity::Falling => CFGR_SYNCPOL,
                SyncPolarity::Rising => 0,
            };
        // SAFETY: CFGR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + CFGR, value) }
    }

    /// Programmed counter reload value.
    #[must_use]
    pub fn reload(&self) -> u16 {
        // SAFETY: CFGR is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + CFGR) } & CFGR_RELOAD_MASK) as u16
    }

    /// Programmed frequency error limit.
    #[must_use]
    pub fn error_limit(&self) -> u8 {
        // SAFETY: CFGR is a valid register of the bound block.
        ((unsafe { mmio::read_reg(self.base + CFGR) } & CFGR_FELIM_MASK) >> 16) as u8
    }

    /// Programmed SYNC divider.
    #[must_use]
    pub fn sync_divider(&self) -> SyncDivider {
        // SAFETY: CFGR is a valid register of the bound block.
        SyncDivider::from_raw(unsafe { mmio::read_reg(self.base + CFGR) } >> 24)
    }

    /// Programmed SYNC source.
    #[must_use]
    pub fn sync_source(&self) -> SyncSource {
        // SAFETY: CFGR is a valid register of the bound block.
        SyncSource::from_raw(unsafe { mmio::read_reg(self.base + CFGR) } >> 28)
    }

    /// Programmed SYNC polarity.
    #[must_use]
    pub fn sync_polarity(&self) -> SyncPolarity {
        // SAFETY: CFGR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CFGR) } & CFGR_SYNCPOL != 0 {
            SyncPolarity::Falling
        } else {
            SyncPolarity::Rising
        }
    }

    /// Snapshot of the event and error flags.
    #[must_use]
    pub fn flags(&self) -> CrsFlags {
        // SAFETY: ISR is a valid register of the bound block.
        CrsFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + ISR) })
    }

    /// Whether all `flags` are asserted.
    #[must_use]
    pub fn is_flag_set(&self, flags: CrsFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Captured frequency error counter value (ISR.FECAP).
    #[must_use]
    pub fn frequency_error_capture(&self) -> u16 {
        // SAFETY: ISR is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + ISR) } >> 16) as u16
    }

    /// Direction of the captured frequency error: `true` means the
    /// counter was counting down (actual frequency above target).
    #[must_use]
    pub fn frequency_error_is_down(&self) -> bool {
        // SAFETY: ISR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + ISR) };
        raw & ISR_FEDIR != 0
    }

    /// Clear the selected event flags through ICR. Clearing `ERROR`
    /// also clears its detail flags.
    pub fn clear_flags(&self, flags: CrsFlags) {
        // SAFETY: ICR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + ICR, (flags & CrsFlags::EVENTS).bits()) }
    }

    /// Reset CR and CFGR to their documented reset values.
    pub fn reset_registers(&self) {
        // SAFETY: both offsets are valid registers of the bound block.
        // CR resets with TRIM mid-range, CFGR with the USB SOF profile
        // (reload 0xBB7F, FELIM 0x22).
        unsafe {
            mmio::write_reg(self.base + CR, 0x4000);
            mmio::write_reg(self.base + CFGR, 0x2022_BB7F);
        }
    }
}
