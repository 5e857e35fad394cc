//! DCACHE register accessors
//!
//! Data cache control: enable/invalidate, address-range maintenance
//! commands and the hit/miss monitor counters.

use crate::mmio;

/// DCACHE1 base address (AHB1).
pub const DCACHE1_BASE: usize = 0x4003_1400;
/// DCACHE2 base address (AHB1).
pub const DCACHE2_BASE: usize = 0x4003_1800;

const CR: usize = 0x00;
const SR: usize = 0x04;
const IER: usize = 0x08;
const FCR: usize = 0x0C;
const RHMONR: usize = 0x10;
const RMMONR: usize = 0x14;
const WHMONR: usize = 0x18;
const WMMONR: usize = 0x1C;
const CMDRSADDRR: usize = 0x20;
const CMDREADDRR: usize = 0x24;

const CR_EN: u32 = 1 << 0;
const CR_CACHEINV: u32 = 1 << 1;
const CR_CACHECMD_MASK: u32 = 0x7 << 8;
const CR_STARTCMD: u32 = 1 << 11;
const CR_RHITMEN: u32 = 1 << 16;
const CR_RMISSMEN: u32 = 1 << 17;
const CR_WHITMEN: u32 = 1 << 18;
const CR_WMISSMEN: u32 = 1 << 19;
const CR_HBURST: u32 = 1 << 31;

bitflags::bitflags! {
    /// DCACHE status flags (SR). The maskable subset shares bit
    /// positions with IER and FCR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DcacheFlags: u32 {
        /// Full-invalidate in progress.
        const BUSY = 1 << 0;
        /// Full-invalidate complete.
        const BUSY_END = 1 << 1;
        /// Cache error (eviction of a line under maintenance).
        const ERROR = 1 << 2;
        /// Command in progress.
        const CMD_BUSY = 1 << 3;
        /// Command complete.
        const CMD_END = 1 << 4;
    }
}

impl DcacheFlags {
    /// Flags with matching IER enable and FCR clear bits.
    pub const MASKABLE: DcacheFlags = DcacheFlags::BUSY_END
        .union(DcacheFlags::ERROR)
        .union(DcacheFlags::CMD_END);
}

bitflags::bitflags! {
    /// Monitor counter selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Monitors: u32 {
        const READ_HIT = CR_RHITMEN;
        const READ_MISS = CR_RMISSMEN;
        const WRITE_HIT = CR_WHITMEN;
        const WRITE_MISS = CR_WMISSMEN;
        const ALL = CR_RHITMEN | CR_RMISSMEN | CR_WHITMEN | CR_WMISSMEN;
    }
}

/// Address-range maintenance command (CR.CACHECMD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Command {
    /// Write dirty lines back to memory.
    CleanByAddr = 0b001,
    /// Drop lines without write-back.
    InvalidateByAddr = 0b010,
    /// Write back then drop.
    CleanInvalidateByAddr = 0b011,
}

/// Read burst type used for refills (CR.HBURST).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadBurst {
    Wrap,
    Increment,
}

/// One DCACHE register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DcacheBlock {
    base: usize,
}

impl DcacheBlock {
    /// Bind a register block at `base`.
    ///
    /// # Safety
    /// `base` must point at a DCACHE-shaped register block (hardware
    /// instance or RAM-backed block of at least 0x28 bytes).
    #[must_use]
    pub const unsafe fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// Base address this block was bound to.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Enable the cache (CR.EN).
    pub fn enable(&self) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR, CR_EN) }
    }

    /// Disable the cache.
    pub fn disable(&self) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + CR, CR_EN) }
    }

    /// Whether the cache is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        // SAFETY: CR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + CR) };
        raw & CR_EN != 0
    }

    /// Launch a full invalidate (CR.CACHEINV). Completion raises
    /// `BUSY_END`.
    pub fn start_full_invalidate(&self) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR, CR_CACHEINV) }
    }

    /// Set the read burst type. Only change while the cache is
    /// disabled.
    pub fn set_read_burst(&self, burst: ReadBurst) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe {
            match burst {
                ReadBurst::Increment => mmio::set_bits(self.base + CR, CR_HBURST),
                ReadBurst::Wrap => mmio::clear_bits(self.base + CR, CR_HBURST),
            }
        }
    }

    /// Current read burst type.
    #[must_use]
    pub fn read_burst(&self) -> ReadBurst {
        // SAFETY: CR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CR) } & CR_HBURST != 0 {
            ReadBurst::Increment
        } else {
            ReadBurst::Wrap
        }
    }

    /// Program an address-range command and launch it. The end address
    /// is inclusive. Completion raises `CMD_END`.
    pub fn start_command(&self, command: Command, start_addr: u32, end_addr: u32) {
        // SAFETY: all three offsets are valid registers of the bound
        // block.
        unsafe {
            mmio::write_reg(self.base + CMDRSADDRR, start_addr);
            mmio::write_reg(self.base + CMDREADDRR, end_addr);
            mmio::write_field(self.base + CR, CR_CACHECMD_MASK, (command as u32) << 8);
            mmio::set_bits(self.base + CR, CR_STARTCMD);
        }
    }

    /// Programmed command start address.
    #[must_use]
    pub fn command_start_addr(&self) -> u32 {
        // SAFETY: CMDRSADDRR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + CMDRSADDRR) }
    }

    /// Programmed command end address.
    #[must_use]
    pub fn command_end_addr(&self) -> u32 {
        // SAFETY: CMDREADDRR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + CMDREADDRR) }
    }

    /// Enable the selected monitor counters.
    pub fn enable_monitors(&self, monitors: Monitors) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR, monitors.bits()) }
    }

    /// Disable the selected monitor counters.
    pub fn disable_monitors(&self, monitors: Monitors) {
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + CR, monitors.bits()) }
    }

    /// Reset the selected monitor counters to zero. The counters only
    /// reset while their enable bit is low, so this pulses the enables.
    pub fn reset_monitors(&self, monitors: Monitors) {
        // SAFETY: CR and the monitor offsets are valid registers of the
        // bound block.
        unsafe {
            let enabled = mmio::read_reg(self.base + CR) & Monitors::ALL.bits();
            mmio::clear_bits(self.base + CR, monitors.bits());
            if monitors.contains(Monitors::READ_HIT) {
                mmio::write_reg(self.base + RHMONR, 0);
            }
            if monitors.contains(Monitors::READ_MISS) {
                mmio::write_reg(self.base + RMMONR, 0);
            }
            if monitors.contains(Monitors::WRITE_HIT) {
                mmio::write_reg(self.base + WHMONR, 0);
            }
            if monitors.contains(Monitors::WRITE_MISS) {
                mmio::write_reg(self.base + WMMONR, 0);
            }
            mmio::set_bits(self.base + CR, enabled & monitors.bits());
        }
    }

    /// Read-hit monitor value (32-bit saturating counter).
    #[must_use]
    pub fn read_hits(&self) -> u32 {
        // SAFETY: RHMONR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + RHMONR) }
    }

    /// Read-miss monitor value (16-bit saturating counter).
    #[must_use]
    pub fn read_misses(&self) -> u16 {
        // SAFETY: RMMONR is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + RMMONR) } & 0xFFFF) as u16
    }

    /// Write-hit monitor value (32-bit saturating counter).
    #[must_use]
    pub fn write_hits(&self) -> u32 {
        // SAFETY: WHMONR is a valid register of the bound block.
        unsafe { mmio::read_reg(self.base + WHMONR) }
    }

    /// Write-miss monitor value (16-bit saturating counter).
    #[must_use]
    pub fn write_misses(&self) -> u16 {
        // SAFETY: WMMONR is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + WMMONR) } & 0xFFFF) as u16
    }

    /// Enable the interrupts selected by `flags` (maskable subset).
    pub fn enable_interrupts(&self, flags: DcacheFlags) {
        // SAFETY: IER is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + IER, (flags & DcacheFlags::MASKABLE).bits()) }
    }

    /// Disable the interrupts selected by `flags`.
    pub fn disable_interrupts(&self, flags: DcacheFlags) {
        // SAFETY: IER is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + IER, (flags & DcacheFlags::MASKABLE).bits()) }
    }

    /// Currently enabled interrupt sources.
    #[must_use]
    pub fn enabled_interrupts(&self) -> DcacheFlags {
        // SAFETY: IER is a valid register of the bound block.
        DcacheFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + IER) })
    }

    /// Snapshot of the status flags.
    #[must_use]
    pub fn flags(&self) -> DcacheFlags {
        // SAFETY: SR is a valid register of the bound block.
        DcacheFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + SR) })
    }

    /// Whether all `flags` are asserted.
    #[must_use]
    pub fn is_flag_set(&self, flags: DcacheFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Clear the selected flags through FCR.
    pub fn clear_flags(&self, flags: DcacheFlags) {
        // SAFETY: FCR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + FCR, (flags & DcacheFlags::MASKABLE).bits()) }
    }

    /// Reset CR and IER to their reset values.
    pub fn reset_registers(&self) {
        // SAFETY: both offsets are valid registers of the bound block.
        unsafe {
            mmio::write_reg(self.base + CR, 0);
            mmio::write_reg(self.base + IER, 0);
            mmio::write_reg(self.base + FCR, DcacheFlags::MASKABLE.bits());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_block() -> (Box<[u32; 10]>, DcacheBlock) {
        let ram = Box::new([0u32; 10]);
        let dcache = unsafe { DcacheBlock::from_base(ram.as_ptr() as usize) };
        (ram, dcache)
    }

    #[test]
    fn test_enable_disable() {
        let (_ram, dcache) = ram_block();
        dcache.enable();
        assert!(dcache.is_enabled());
        dcache.disable();
        assert!(!dcache.is_enabled());
    }

    #[test]
    fn test_start_command_programs_range_and_launch() {
        let (ram, dcache) = ram_block();
        dcache.start_command(Command::CleanInvalidateByAddr, 0x2000_0000, 0x2000_03FF);
        assert_eq!(dcache.command_start_addr(), 0x2000_0000);
        assert_eq!(dcache.command_end_addr(), 0x2000_03FF);
        let cr = ram[0];
        assert_eq!((cr & CR_CACHECMD_MASK) >> 8, 0b011);
        assert_ne!(cr & CR_STARTCMD, 0);
    }

    #[test]
    fn test_reset_monitors_restores_enables() {
        let (ram, dcache) = ram_block();
        dcache.enable_monitors(Monitors::READ_HIT | Monitors::WRITE_MISS);
        unsafe {
            crate::mmio::write_reg(ram.as_ptr() as usize + RHMONR, 42);
        }
        dcache.reset_monitors(Monitors::READ_HIT);
        assert_eq!(dcache.read_hits(), 0);
        // enables survive the reset pulse
        assert_ne!(ram[0] & CR_RHITMEN, 0);
        assert_ne!(ram[0] & CR_WMISSMEN, 0);
    }

    #[test]
    fn test_clear_flags_limited_to_maskable() {
        let (ram, dcache) = ram_block();
        dcache.clear_flags(DcacheFlags::BUSY | DcacheFlags::ERROR | DcacheFlags::CMD_END);
        assert_eq!(
            ram[FCR / 4],
            (DcacheFlags::ERROR | DcacheFlags::CMD_END).bits()
        );
    }
}
