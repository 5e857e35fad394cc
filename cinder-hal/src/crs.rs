//! CRS driver.
//!
//! Trims HSI48 against a synchronization source, either automatically
//! in hardware or by letting the application read the frequency error
//! and adjust the trim itself.

use cinder_ll::crs as ll;
use cinder_ll::crs::CrsFlags;

use crate::tick::Deadline;
use crate::{Error, Result};

pub use cinder_ll::crs::{CrsBlock, SyncDivider, SyncPolarity, SyncSource};

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Not initialized.
    Reset,
    /// Initialized, counter stopped.
    Idle,
    /// Frequency error counter running.
    Active,
}

bitflags::bitflags! {
    /// Sticky synchronization error accumulator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CrsError: u32 {
        const SYNC_ERROR = 1 << 0;
        const SYNC_MISS = 1 << 1;
        const TRIM_OVERFLOW = 1 << 2;
    }
}

impl CrsError {
    fn from_flags(flags: CrsFlags) -> Self {
        let mut err = CrsError::empty();
        if flags.contains(CrsFlags::SYNC_ERROR) {
            err |= CrsError::SYNC_ERROR;
        }
        if flags.contains(CrsFlags::SYNC_MISS) {
            err |= CrsError::SYNC_MISS;
        }
        if flags.contains(CrsFlags::TRIM_OVERFLOW) {
            err |= CrsError::TRIM_OVERFLOW;
        }
        err
    }
}

/// Synchronization configuration applied by [`Crs::set_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrsConfig {
    /// Counter reload value; see [`reload_value`] to derive it from
    /// frequencies.
    pub reload: u16,
    /// Frequency error limit defining the SYNCOK window.
    pub error_limit: u8,
    /// Initial oscillator trim (7 bits, 0x40 is mid-range).
    pub trim: u8,
    pub divider: SyncDivider,
    pub source: SyncSource,
    pub polarity: SyncPolarity,
    /// Let hardware adjust the trim on every SYNC event.
    pub auto_trim: bool,
}

impl Default for CrsConfig {
    /// The USB SOF profile: 48 MHz target, 1 kHz SYNC.
    fn default() -> Self {
        Self {
            reload: reload_value(48_000_000, 1_000),
            error_limit: 0x22,
            trim: 0x40,
            divider: SyncDivider::Div1,
            source: SyncSource::Usb,
            polarity: SyncPolarity::Rising,
            auto_trim: true,
        }
    }
}

/// Derive the counter reload value from the target and SYNC
/// frequencies: `(target / sync) - 1`.
#[must_use]
pub const fn reload_value(target_hz: u32, sync_hz: u32) -> u16 {
    (target_hz / sync_hz - 1) as u16
}

/// Result of a completed synchronization event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncOutcome {
    /// Frequency error within the limit.
    Ok,
    /// Frequency error above the limit but trimmable.
    Warning,
    /// Counter expired without a SYNC event.
    Missed,
}

/// Snapshot of the trimming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncInfo {
    /// Current trim value, hardware-updated while auto-trimming.
    pub trim: u8,
    /// Captured frequency error counter value.
    pub error_capture: u16,
    /// Whether the counter was counting down at capture (actual
    /// frequency above target).
    pub error_counting_down: bool,
}

#[cfg(feature = "register-callbacks")]
/// Event callback invoked from `irq_handler`.
pub type Callback = fn(&mut Crs);

#[cfg(feature = "register-callbacks")]
#[derive(Default)]
struct Callbacks {
    sync_ok: Option<Callback>,
    sync_warn: Option<Callback>,
    expected_sync: Option<Callback>,
    error: Option<Callback>,
}

/// CRS driver handle.
pub struct Crs {
    block: ll::CrsBlock,
    state: State,
    #[cfg(feature = "get-last-errors")]
    last_errors: CrsError,
    #[cfg(feature = "register-callbacks")]
    callbacks: Callbacks,
    #[cfg(feature = "user-data")]
    user_data: usize,
}

impl Crs {
    /// Wrap the register block. The driver starts in [`State::Reset`].
    #[must_use]
    pub fn new(block: ll::CrsBlock) -> Self {
        Self {
            block,
            state: State::Reset,
            #[cfg(feature = "get-last-errors")]
            last_errors: CrsError::empty(),
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
        if self.state == State::Active {
            return Err(Error::Busy);
        }
        self.block.reset_registers();
        #[cfg(feature = "get-last-errors")]
        {
            self.last_errors = CrsError::empty();
        }
        self.state = State::Idle;
        Ok(())
    }

    /// Stop the counter, reset the registers and return to
    /// [`State::Reset`].
    pub fn deinit(&mut self) {
        self.block.set_counter_enabled(false);
        self.block.disable_interrupts(CrsFlags::EVENTS);
        self.block.clear_flags(CrsFlags::EVENTS);
        self.block.reset_registers();
        self.state = State::Reset;
    }

    /// Apply a synchronization configuration. Only allowed while the
    /// counter is stopped.
    pub fn set_config(&mut self, config: &CrsConfig) -> Result<()> {
        match self.state {
            State::Idle => {}
            State::Reset => return Err(Error::InvalidParam),
            State::Active => return Err(Error::Busy),
        }
        if config.trim > 0x7F {
            return Err(Error::InvalidParam);
        }
        self.block.set_sync_config(
            config.reload,
            config.error_limit,
            config.divider,
            config.source,
            config.polarity,
        );
        self.block.set_trim(config.trim);
        self.block.set_auto_trim_enabled(config.auto_trim);
        Ok(())
    }

    /// Read the applied configuration back from the registers.
    pub fn config(&self) -> Result<CrsConfig> {
        if self.state == State::Reset {
            return Err(Error::InvalidParam);
        }
        Ok(CrsConfig {
            reload: self.block.reload(),
            error_limit: self.block.error_limit(),
            trim: self.block.trim(),
            divider: self.block.sync_divider(),
            source: self.block.sync_source(),
            polarity: self.block.sync_polarity(),
            auto_trim: self.block.is_auto_trim_enabled(),
        })
    }

    /// Start the frequency error counter.
    pub fn start_sync(&mut self) -> Result<()> {
        match self.state {
            State::Idle => {
                self.block.clear_flags(CrsFlags::EVENTS);
                self.block.set_counter_enabled(true);
                self.state = State::Active;
                Ok(())
            }
            State::Reset => Err(Error::InvalidParam),
            State::Active => Err(Error::Busy),
        }
    }

    /// Start the counter with event and error interrupts enabled;
    /// completion is reported through the callbacks.
    pub fn start_sync_it(&mut self) -> Result<()> {
        self.start_sync()?;
        self.block.enable_interrupts(CrsFlags::EVENTS);
        Ok(())
    }

    /// Stop the frequency error counter.
    pub fn stop_sync(&mut self) -> Result<()> {
        match self.state {
            State::Active => {
                self.block.set_counter_enabled(false);
                self.block.disable_interrupts(CrsFlags::EVENTS);
                self.state = State::Idle;
                Ok(())
            }
            State::Reset => Err(Error::InvalidParam),
            State::Idle => Ok(()),
        }
    }

    /// Fire a software SYNC event, for sources without a periodic
    /// signal.
    pub fn generate_software_sync(&mut self) -> Result<()> {
        if self.state == State::Reset {
            return Err(Error::InvalidParam);
        }
        self.block.generate_software_sync();
        Ok(())
    }

    /// Update the oscillator trim directly. Rejected while
    /// auto-trimming owns the field.
    pub fn set_trim(&mut self, trim: u8) -> Result<()> {
        if self.state == State::Reset || trim > 0x7F {
            return Err(Error::InvalidParam);
        }
        if self.block.is_auto_trim_enabled() {
            return Err(Error::Busy);
        }
        self.block.set_trim(trim);
        Ok(())
    }

    /// Block until the next synchronization event resolves, up to
    /// `timeout_ms` milliseconds, and report how it went.
    pub fn poll_for_sync(&mut self, timeout_ms: u32) -> Result<SyncOutcome> {
        if self.state != State::Active {
            return Err(Error::InvalidParam);
        }
        let deadline = Deadline::new(timeout_ms);
        loop {
            let flags = self.block.flags();
            if flags.contains(CrsFlags::SYNC_OK) {
                self.block.clear_flags(CrsFlags::SYNC_OK);
                return Ok(SyncOutcome::Ok);
            }
            if flags.contains(CrsFlags::SYNC_WARN) {
                self.block.clear_flags(CrsFlags::SYNC_WARN);
                return Ok(SyncOutcome::Warning);
            }
            if flags.contains(CrsFlags::EXPECTED_SYNC) {
                self.block.clear_flags(CrsFlags::EXPECTED_SYNC);
                return Ok(SyncOutcome::Missed);
            }
            if flags.contains(CrsFlags::ERROR) {
                #[cfg(feature = "get-last-errors")]
                {
                    self.last_errors |= CrsError::from_flags(flags);
                }
                #[cfg(not(feature = "get-last-errors"))]
                let _ = CrsError::from_flags(flags);
                self.block.clear_flags(CrsFlags::ERROR);
                return Err(Error::Hardware);
            }
            if deadline.expired() {
                return Err(Error::Timeout);
            }
        }
    }

    /// Snapshot of the trimming loop.
    #[must_use]
    pub fn sync_info(&self) -> SyncInfo {
        SyncInfo {
            trim: self.block.trim(),
            error_capture: self.block.frequency_error_capture(),
            error_counting_down: self.block.frequency_error_is_down(),
        }
    }

    /// Accumulated synchronization errors since the last clear.
    #[cfg(feature = "get-last-errors")]
    #[must_use]
    pub fn last_errors(&self) -> CrsError {
        self.last_errors
    }

    /// Clear the error accumulator.
    #[cfg(feature = "get-last-errors")]
    pub fn clear_last_errors(&mut self) {
        self.last_errors = CrsError::empty();
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
    pub fn set_sync_ok_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.sync_ok = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_sync_warn_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.sync_warn = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_expected_sync_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.expected_sync = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_error_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.error = cb;
    }

    /// Service the peripheral interrupt. Call from the CRS IRQ.
    pub fn irq_handler(&mut self) {
        let flags = self.block.flags();
        let enabled = self.block.enabled_interrupts();
        let active = flags & enabled;

        if active.contains(CrsFlags::SYNC_OK) {
            self.block.clear_flags(CrsFlags::SYNC_OK);
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.sync_ok {
                cb(self);
            }
        }
        if active.contains(CrsFlags::SYNC_WARN) {
            self.block.clear_flags(CrsFlags::SYNC_WARN);
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.sync_warn {
                cb(self);
            }
        }
        if active.contains(CrsFlags::EXPECTED_SYNC) {
            self.block.clear_flags(CrsFlags::EXPECTED_SYNC);
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.expected_sync {
                cb(self);
            }
        }
        if active.contains(CrsFlags::ERROR) {
            #[cfg(feature = "get-last-errors")]
            {
                self.last_errors |= CrsError::from_flags(flags);
            }
            self.block.clear_flags(CrsFlags::ERROR);
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.error {
                cb(self);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_crs() -> (Box<[u32; 4]>, Crs) {
        let ram = Box::new([0u32; 4]);
        let crs = Crs::new(unsafe { ll::CrsBlock::from_base(ram.as_ptr() as usize) });
        (ram, crs)
    }

    #[test]
    fn test_reload_value_usb_profile() {
        assert_eq!(reload_value(48_000_000, 1_000), 0xBB7F);
    }

    #[test]
    fn test_lifecycle() {
        let (_ram, mut crs) = ram_crs();
        assert_eq!(crs.start_sync(), Err(Error::InvalidParam));
        crs.init().unwrap();
        crs.set_config(&CrsConfig::default()).unwrap();
        crs.start_sync().unwrap();
        assert_eq!(crs.state(), State::Active);
        assert_eq!(crs.set_config(&CrsConfig::default()), Err(Error::Busy));
        crs.stop_sync().unwrap();
        assert_eq!(crs.state(), State::Idle);
    }

    #[test]
    fn test_config_round_trip() {
        let (_ram, mut crs) = ram_crs();
        crs.init().unwrap();
        let config = CrsConfig {
            reload: 0x1234,
            error_limit: 0x10,
            trim: 0x20,
            divider: SyncDivider::Div8,
            source: SyncSource::Lse,
            polarity: SyncPolarity::Falling,
            auto_trim: false,
        };
        crs.set_config(&config).unwrap();
        assert_eq!(crs.config().unwrap(), config);
    }

    #[test]
    fn test_manual_trim_rejected_while_auto_trimming() {
        let (_ram, mut crs) = ram_crs();
        crs.init().unwrap();
        crs.set_config(&CrsConfig::default()).unwrap();
        assert_eq!(crs.set_trim(0x30), Err(Error::Busy));
        crs.set_config(&CrsConfig {
            auto_trim: false,
            ..CrsConfig::default()
        })
        .unwrap();
        crs.set_trim(0x30).unwrap();
        assert_eq!(crs.sync_info().trim, 0x30);
    }

    #[test]
    fn test_poll_for_sync_zero_timeout() {
        let (_ram, mut crs) = ram_crs();
        crs.init().unwrap();
        crs.set_config(&CrsConfig::default()).unwrap();
        crs.start_sync().unwrap();
        assert_eq!(crs.poll_for_sync(0), Err(Error::Timeout));
    }

    #[test]
    fn test_poll_for_sync_outcomes() {
        let (ram, mut crs) = ram_crs();
        crs.init().unwrap();
        crs.set_config(&CrsConfig::default()).unwrap();
        crs.start_sync().unwrap();

        let isr = ram.as_ptr() as usize + 0x08;
        unsafe { cinder_ll::mmio::write_reg(isr, CrsFlags::SYNC_OK.bits()) };
        assert_eq!(crs.poll_for_sync(0).unwrap(), SyncOutcome::Ok);

        unsafe { cinder_ll::mmio::write_reg(isr, CrsFlags::SYNC_WARN.bits()) };
        assert_eq!(crs.poll_for_sync(0).unwrap(), SyncOutcome::Warning);

        unsafe {
            cinder_ll::mmio::write_reg(isr, (CrsFlags::ERROR | CrsFlags::SYNC_MISS).bits());
        }
        assert_eq!(crs.poll_for_sync(0), Err(Error::Hardware));
        #[cfg(feature = "get-last-errors")]
        assert!(crs.last_errors().contains(CrsError::SYNC_MISS));
    }
}
