//! DCACHE driver.
//!
//! Cache enable/disable, blocking and interrupt-driven maintenance
//! (full invalidate plus address-range clean/invalidate) and the
//! hit/miss monitors.

use cinder_ll::dcache as ll;
use cinder_ll::dcache::DcacheFlags;

use crate::tick::Deadline;
use crate::{Error, Result};

pub use cinder_ll::dcache::{Command, DcacheBlock, Monitors, ReadBurst};

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Not initialized.
    Reset,
    /// Initialized, cache disabled.
    Idle,
    /// Cache enabled.
    Active,
    /// Interrupt-driven maintenance in progress.
    Maintenance,
}

bitflags::bitflags! {
    /// Sticky error accumulator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DcacheError: u32 {
        /// A line was evicted while a clean command was touching it.
        const EVICTION_CLEAN = 1 << 0;
    }
}

/// Monitor counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonitorCounts {
    pub read_hits: u32,
    pub read_misses: u16,
    pub write_hits: u32,
    pub write_misses: u16,
}

#[cfg(feature = "register-callbacks")]
/// Event callback invoked from `irq_handler`.
pub type Callback = fn(&mut Dcache);

#[cfg(feature = "register-callbacks")]
#[derive(Default)]
struct Callbacks {
    invalidate_complete: Option<Callback>,
    command_complete: Option<Callback>,
    error: Option<Callback>,
}

/// DCACHE driver handle.
pub struct Dcache {
    block: ll::DcacheBlock,
    state: State,
    #[cfg(feature = "get-last-errors")]
    last_errors: DcacheError,
    #[cfg(feature = "register-callbacks")]
    callbacks: Callbacks,
    #[cfg(feature = "user-data")]
    user_data: usize,
}

impl Dcache {
    /// Wrap a register block. The driver starts in [`State::Reset`].
    #[must_use]
    pub fn new(block: ll::DcacheBlock) -> Self {
        Self {
            block,
            state: State::Reset,
            #[cfg(feature = "get-last-errors")]
            last_errors: DcacheError::empty(),
            #[cfg(feature = "register-callbacks")]
            callbacks: Callbacks::default(),
            #[cfg(feature = "user-data")]
            user_data: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Reset the peripheral registers and move to [`State::Idle`].
    pub fn init(&mut self) -> Result<()> {
        if self.state == State::Maintenance {
            return Err(Error::Busy);
        }
        self.block.reset_registers();
        #[cfg(feature = "get-last-errors")]
        {
            self.last_errors = DcacheError::empty();
        }
        self.state = State::Idle;
        Ok(())
    }

    /// Disable the cache, reset the registers and return to
    /// [`State::Reset`].
    pub fn deinit(&mut self) {
        self.block.disable();
        self.block.disable_interrupts(DcacheFlags::MASKABLE);
        self.block.reset_registers();
        self.state = State::Reset;
    }

    /// Select the refill burst type. Only allowed while the cache is
    /// disabled.
    pub fn set_read_burst(&mut self, burst: ReadBurst) -> Result<()> {
        match self.state {
            State::Idle => {
                self.block.set_read_burst(burst);
                Ok(())
            }
            State::Reset => Err(Error::InvalidParam),
            _ => Err(Error::Busy),
        }
    }

    /// Configured refill burst type.
    #[must_use]
    pub fn read_burst(&self) -> ReadBurst {
        self.block.read_burst()
    }

    /// Enable the cache.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            State::Idle => {
                self.block.enable();
                self.state = State::Active;
                Ok(())
            }
            State::Reset => Err(Error::InvalidParam),
            State::Active => Ok(()),
            State::Maintenance => Err(Error::Busy),
        }
    }

    /// Disable the cache. Contents become stale; invalidate before
    /// re-enabling if memory changed underneath.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            State::Active => {
                self.block.disable();
                self.state = State::Idle;
                Ok(())
            }
            State::Reset => Err(Error::InvalidParam),
            State::Idle => Ok(()),
            State::Maintenance => Err(Error::Busy),
        }
    }

    /// Invalidate the whole cache, blocking up to `timeout_ms`.
    pub fn invalidate_all(&mut self, timeout_ms: u32) -> Result<()> {
        self.check_initialized()?;
        self.block.clear_flags(DcacheFlags::BUSY_END);
        self.block.start_full_invalidate();
        let deadline = Deadline::new(timeout_ms);
        loop {
            if self.block.is_flag_set(DcacheFlags::BUSY_END) {
                self.block.clear_flags(DcacheFlags::BUSY_END);
                return Ok(());
            }
            if deadline.expired() {
                return Err(Error::Timeout);
            }
        }
    }

    /// Invalidate the whole cache; completion is reported through the
    /// invalidate-complete callback.
    pub fn invalidate_all_it(&mut self) -> Result<()> {
        self.check_initialized()?;
        self.block.clear_flags(DcacheFlags::BUSY_END);
        self.block
            .enable_interrupts(DcacheFlags::BUSY_END | DcacheFlags::ERROR);
        self.state = State::Maintenance;
        self.block.start_full_invalidate();
        Ok(())
    }

    /// Write dirty lines in `[addr, addr + size)` back to memory,
    /// blocking up to `timeout_ms`.
    pub fn clean_range(&mut self, addr: u32, size: u32, timeout_ms: u32) -> Result<()> {
        self.run_command(Command::CleanByAddr, addr, size, timeout_ms)
    }

    /// Drop lines in `[addr, addr + size)` without write-back.
    pub fn invalidate_range(&mut self, addr: u32, size: u32, timeout_ms: u32) -> Result<()> {
        self.run_command(Command::InvalidateByAddr, addr, size, timeout_ms)
    }

    /// Write back then drop lines in `[addr, addr + size)`.
    pub fn clean_invalidate_range(&mut self, addr: u32, size: u32, timeout_ms: u32) -> Result<()> {
        self.run_command(Command::CleanInvalidateByAddr, addr, size, timeout_ms)
    }

    /// Interrupt-driven [`Dcache::clean_range`].
    pub fn clean_range_it(&mut self, addr: u32, size: u32) -> Result<()> {
        self.launch_command_it(Command::CleanByAddr, addr, size)
    }

    /// Interrupt-driven [`Dcache::invalidate_range`].
    pub fn invalidate_range_it(&mut self, addr: u32, size: u32) -> Result<()> {
        self.launch_command_it(Command::InvalidateByAddr, addr, size)
    }

    /// Interrupt-driven [`Dcache::clean_invalidate_range`].
    pub fn clean_invalidate_range_it(&mut self, addr: u32, size: u32) -> Result<()> {
        self.launch_command_it(Command::CleanInvalidateByAddr, addr, size)
    }

    /// Start counting on the selected monitors.
    pub fn start_monitors(&mut self, monitors: Monitors) -> Result<()> {
        self.check_initialized()?;
        self.block.enable_monitors(monitors);
        Ok(())
    }

    /// Stop counting on the selected monitors. Values are retained.
    pub fn stop_monitors(&mut self, monitors: Monitors) -> Result<()> {
        self.check_initialized()?;
        self.block.disable_monitors(monitors);
        Ok(())
    }

    /// Zero the selected monitors.
    pub fn reset_monitors(&mut self, monitors: Monitors) -> Result<()> {
        self.check_initialized()?;
        self.block.reset_monitors(monitors);
        Ok(())
    }

    /// Snapshot of all four monitor counters.
    #[must_use]
    pub fn monitor_counts(&self) -> MonitorCounts {
        MonitorCounts {
            read_hits: self.block.read_hits(),
            read_misses: self.block.read_misses(),
            write_hits: self.block.write_hits(),
            write_misses: self.block.write_misses(),
        }
    }

    /// Accumulated errors since the last clear.
    #[cfg(feature = "get-last-errors")]
    #[must_use]
    pub fn last_errors(&self) -> DcacheError {
        self.last_errors
    }

    /// Clear the error accumulator.
    #[cfg(feature = "get-last-errors")]
    pub fn clear_last_errors(&mut self) {
        self.last_errors = DcacheError::empty();
    }

    /// Stash an opaque user value on the driver.
    #[cfg(feature = "user-data")]
    pub fn set_user_data(&mut self, data: usize) {
        self.user_data = data;
    }

    /// Retrieve the stashed user value.
    #[cfg(feature = "user-data")]
    #[must_use]
    pub fn user_data(&self) -> usize {
        self.user_data
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_invalidate_complete_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.invalidate_complete = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_command_complete_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.command_complete = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_error_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.error = cb;
    }

    /// Service the peripheral interrupt. Call from the DCACHE IRQ.
    pub fn irq_handler(&mut self) {
        let flags = self.block.flags();
        let enabled = self.block.enabled_interrupts();
        let active = flags & enabled;

        if active.contains(DcacheFlags::ERROR) {
            self.block.clear_flags(DcacheFlags::ERROR);
            #[cfg(feature = "get-last-errors")]
            {
                self.last_errors |= DcacheError::EVICTION_CLEAN;
            }
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.error {
                cb(self);
            }
        }
        if active.contains(DcacheFlags::BUSY_END) {
            self.block.clear_flags(DcacheFlags::BUSY_END);
            self.block
                .disable_interrupts(DcacheFlags::BUSY_END | DcacheFlags::ERROR);
            self.finish_maintenance();
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.invalidate_complete {
                cb(self);
            }
        }
        if active.contains(DcacheFlags::CMD_END) {
            self.block.clear_flags(DcacheFlags::CMD_END);
            self.block
                .disable_interrupts(DcacheFlags::CMD_END | DcacheFlags::ERROR);
            self.finish_maintenance();
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.command_complete {
                cb(self);
            }
        }
    }

    // --- internals -----------------------------------------------------

    fn check_initialized(&self) -> Result<()> {
        match self.state {
            State::Reset => Err(Error::InvalidParam),
            State::Maintenance => Err(Error::Busy),
            _ => Ok(()),
        }
    }

    fn command_range(addr: u32, size: u32) -> Result<(u32, u32)> {
        if size == 0 {
            return Err(Error::InvalidParam);
        }
        let end = addr.checked_add(size - 1).ok_or(Error::InvalidParam)?;
        Ok((addr, end))
    }

    fn run_command(&mut self, command: Command, addr: u32, size: u32, timeout_ms: u32) -> Result<()> {
        self.check_initialized()?;
        let (start, end) = Self::command_range(addr, size)?;
        self.block.clear_flags(DcacheFlags::CMD_END);
        self.block.start_command(command, start, end);
        let deadline = Deadline::new(timeout_ms);
        loop {
            if self.block.is_flag_set(DcacheFlags::CMD_END) {
                self.block.clear_flags(DcacheFlags::CMD_END);
                return Ok(());
            }
            if deadline.expired() {
                return Err(Error::Timeout);
            }
        }
    }

    fn launch_command_it(&mut self, command: Command, addr: u32, size: u32) -> Result<()> {
        self.check_initialized()?;
        let (start, end) = Self::command_range(addr, size)?;
        self.block.clear_flags(DcacheFlags::CMD_END);
        self.block
            .enable_interrupts(DcacheFlags::CMD_END | DcacheFlags::ERROR);
        self.state = State::Maintenance;
        self.block.start_command(command, start, end);
        Ok(())
    }

    fn finish_maintenance(&mut self) {
        if self.state == State::Maintenance {
            self.state = if self.block.is_enabled() {
                State::Active
            } else {
                State::Idle
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_dcache() -> (Box<[u32; 10]>, Dcache) {
        let ram = Box::new([0u32; 10]);
        let dcache = Dcache::new(unsafe { ll::DcacheBlock::from_base(ram.as_ptr() as usize) });
        (ram, dcache)
    }

    fn set_sr(ram: &[u32], flags: DcacheFlags) {
        unsafe { cinder_ll::mmio::write_reg(ram.as_ptr() as usize + 0x04, flags.bits()) };
    }

    #[test]
    fn test_lifecycle() {
        let (_ram, mut dcache) = ram_dcache();
        assert_eq!(dcache.start(), Err(Error::InvalidParam));
        dcache.init().unwrap();
        dcache.start().unwrap();
        assert_eq!(dcache.state(), State::Active);
        dcache.stop().unwrap();
        assert_eq!(dcache.state(), State::Idle);
        dcache.deinit();
        assert_eq!(dcache.state(), State::Reset);
    }

    #[test]
    fn test_read_burst_only_while_disabled() {
        let (_ram, mut dcache) = ram_dcache();
        dcache.init().unwrap();
        dcache.set_read_burst(ReadBurst::Increment).unwrap();
        assert_eq!(dcache.read_burst(), ReadBurst::Increment);
        dcache.start().unwrap();
        assert_eq!(dcache.set_read_burst(ReadBurst::Wrap), Err(Error::Busy));
    }

    #[test]
    fn test_invalidate_all_times_out_without_busy_end() {
        let (_ram, mut dcache) = ram_dcache();
        dcache.init().unwrap();
        assert_eq!(dcache.invalidate_all(0), Err(Error::Timeout));
    }

    #[test]
    fn test_clean_range_completes_on_cmd_end() {
        let (ram, mut dcache) = ram_dcache();
        dcache.init().unwrap();
        set_sr(&*ram, DcacheFlags::CMD_END);
        dcache.clean_range(0x2000_0000, 0x400, 0).unwrap();
        assert_eq!(dcache.block.command_start_addr(), 0x2000_0000);
        assert_eq!(dcache.block.command_end_addr(), 0x2000_03FF);
    }

    #[test]
    fn test_range_validation() {
        let (_ram, mut dcache) = ram_dcache();
        dcache.init().unwrap();
        assert_eq!(
            dcache.clean_range(0x2000_0000, 0, 0),
            Err(Error::InvalidParam)
        );
        assert_eq!(
            dcache.clean_range(u32::MAX, 0x10, 0),
            Err(Error::InvalidParam)
        );
    }

    #[test]
    fn test_it_maintenance_state_machine() {
        let (ram, mut dcache) = ram_dcache();
        dcache.init().unwrap();
        dcache.start().unwrap();
        dcache.invalidate_range_it(0x2000_0000, 0x100).unwrap();
        assert_eq!(dcache.state(), State::Maintenance);
        assert_eq!(dcache.start(), Err(Error::Busy));

        set_sr(&*ram, DcacheFlags::CMD_END);
        dcache.irq_handler();
        // the cache was enabled, so maintenance returns to active
        assert_eq!(dcache.state(), State::Active);
    }

    #[test]
    fn test_irq_error_recorded() {
        let (ram, mut dcache) = ram_dcache();
        dcache.init().unwrap();
        dcache.invalidate_all_it().unwrap();
        set_sr(&*ram, DcacheFlags::ERROR | DcacheFlags::BUSY_END);
        dcache.irq_handler();
        #[cfg(feature = "get-last-errors")]
        assert!(dcache.last_errors().contains(DcacheError::EVICTION_CLEAN));
        assert_eq!(dcache.state(), State::Idle);
    }

    #[test]
    fn test_monitor_counts_snapshot() {
        let (ram, mut dcache) = ram_dcache();
        dcache.init().unwrap();
        dcache.start_monitors(Monitors::ALL).unwrap();
        unsafe {
            let base = ram.as_ptr() as usize;
            cinder_ll::mmio::write_reg(base + 0x10, 100);
            cinder_ll::mmio::write_reg(base + 0x14, 7);
            cinder_ll::mmio::write_reg(base + 0x18, 50);
            cinder_ll::mmio::write_reg(base + 0x1C, 3);
        }
        let counts = dcache.monitor_counts();
        assert_eq!(counts.read_hits, 100);
        assert_eq!(counts.read_misses, 7);
        assert_eq!(counts.write_hits, 50);
        assert_eq!(counts.write_misses, 3);
    }
}
