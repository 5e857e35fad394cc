//! GFXTIM register accessors
//!
//! Graphics timer: a clock generator deriving line and frame clocks,
//! absolute and relative frame/line counters with compares, four event
//! generators and a frame watchdog.

use crate::mmio;

/// GFXTIM base address (AHB2, graphics domain).
pub const GFXTIM_BASE: usize = 0x4601_6400;

const CR: usize = 0x00;
const CGCR: usize = 0x04;
const TCR: usize = 0x08;
const TDR: usize = 0x0C;
const ISR: usize = 0x14;
const ICR: usize = 0x18;
const IER: usize = 0x1C;
const TSR: usize = 0x20;
const LCCRR: usize = 0x24;
const FCCRR: usize = 0x28;
const AFCR: usize = 0x30;
const ALCR: usize = 0x34;
const AFCC1R: usize = 0x38;
const ALCC1R: usize = 0x3C;
const ALCC2R: usize = 0x40;
const RFC1R: usize = 0x48;
const RFC1RR: usize = 0x4C;
const RFC2R: usize = 0x50;
const RFC2RR: usize = 0x54;
const EVCR: usize = 0x60;
const EVSR: usize = 0x64;
const WDGTCR: usize = 0x70;
const WDGRR: usize = 0x74;
const WDGPAR: usize = 0x78;

const CR_LCCFR: u32 = 1 << 0;
const CR_FCCFR: u32 = 1 << 1;
const CR_TES_MASK: u32 = 0x3 << 8;
const CR_TEPOL: u32 = 1 << 12;

const CGCR_LCS: u32 = 1 << 0;
const CGCR_FCS_MASK: u32 = 0x3 << 8;

const TCR_AFCEN: u32 = 1 << 0;
const TCR_ALCEN: u32 = 1 << 1;
const TCR_RFC1EN: u32 = 1 << 16;
const TCR_RFC2EN: u32 = 1 << 17;
const TCR_RFC1CM: u32 = 1 << 24;
const TCR_RFC2CM: u32 = 1 << 25;

const WDGTCR_WDGEN: u32 = 1 << 0;
const WDGTCR_WDGCS_MASK: u32 = 0x3 << 8;

const FRAME_COUNTER_MASK: u32 = 0xF_FFFF;
const LINE_COUNTER_MASK: u32 = 0xFFF;
const CLOCK_RELOAD_MASK: u32 = 0x3F_FFFF;

bitflags::bitflags! {
    /// GFXTIM event flags (ISR). Bit positions are shared with ICR and
    /// IER.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GfxtimFlags: u32 {
        /// Absolute frame counter overflow.
        const AFC_OVERFLOW = 1 << 0;
        /// Absolute line counter overflow.
        const ALC_OVERFLOW = 1 << 1;
        /// Tearing effect detected.
        const TEARING_EFFECT = 1 << 2;
        /// Absolute frame compare 1 match.
        const AFC_COMPARE1 = 1 << 8;
        /// Absolute line compare 1 match.
        const ALC_COMPARE1 = 1 << 9;
        /// Absolute line compare 2 match.
        const ALC_COMPARE2 = 1 << 10;
        /// Relative frame counter 1 reached zero and reloaded.
        const RFC1_RELOAD = 1 << 16;
        /// Relative frame counter 2 reached zero and reloaded.
        const RFC2_RELOAD = 1 << 17;
        /// Event generator 1 fired.
        const EVENT1 = 1 << 24;
        /// Event generator 2 fired.
        const EVENT2 = 1 << 25;
        /// Event generator 3 fired.
        const EVENT3 = 1 << 26;
        /// Event generator 4 fired.
        const EVENT4 = 1 << 27;
        /// Watchdog pre-alarm threshold reached.
        const WDG_PREALARM = 1 << 30;
        /// Watchdog expired.
        const WDG_ALARM = 1 << 31;
    }
}

/// Tearing-effect input source (CR.TES).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum TearingEffectSource {
    /// Dedicated TE input pin.
    Gpio = 0b00,
    /// Display controller HSYNC.
    Hsync = 0b01,
    /// Display controller VSYNC.
    Vsync = 0b10,
}

impl TearingEffectSource {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b00 => Self::Gpio,
            0b01 => Self::Hsync,
            _ => Self::Vsync,
        }
    }
}

/// Tearing-effect active edge (CR.TEPOL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TearingEffectPolarity {
    RisingEdge,
    FallingEdge,
}

/// Line clock source (CGCR.LCS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineClockSource {
    /// Line clock counter underflow.
    CounterUnderflow,
    /// Tearing-effect event.
    TearingEffect,
}

/// Frame clock source (CGCR.FCS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum FrameClockSource {
    /// Line clock.
    LineClock = 0b00,
    /// Frame clock counter underflow.
    CounterUnderflow = 0b01,
    /// Tearing-effect event.
    TearingEffect = 0b10,
}

impl FrameClockSource {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b00 => Self::LineClock,
            0b01 => Self::CounterUnderflow,
            _ => Self::TearingEffect,
        }
    }
}

/// One of the two relative frame counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelativeTimer {
    Counter1,
    Counter2,
}

/// Relative frame counter mode (TCR.RFCxCM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelativeMode {
    /// Count down and stop at zero.
    OneShot,
    /// Reload and keep counting.
    Continuous,
}

/// One of the four event generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum EventGenerator {
    Event1 = 0,
    Event2 = 1,
    Event3 = 2,
    Event4 = 3,
}

/// Line event feeding an event generator (EVSR low nibble per lane).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum LineEvent {
    None = 0b0000,
    AlcOverflow = 0b0001,
    AlcCompare1 = 0b0010,
    AlcCompare2 = 0b0011,
    TearingEffect = 0b0100,
}

impl LineEvent {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0xF {
            0b0001 => Self::AlcOverflow,
            0b0010 => Self::AlcCompare1,
            0b0011 => Self::AlcCompare2,
            0b0100 => Self::TearingEffect,
            _ => Self::None,
        }
    }
}

/// Frame event feeding an event generator (EVSR high nibble per lane).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum FrameEvent {
    None = 0b0000,
    AfcOverflow = 0b0001,
    AfcCompare1 = 0b0010,
    Rfc1Reload = 0b0011,
    Rfc2Reload = 0b0100,
}

impl FrameEvent {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0xF {
            0b0001 => Self::AfcOverflow,
            0b0010 => Self::AfcCompare1,
            0b0011 => Self::Rfc1Reload,
            0b0100 => Self::Rfc2Reload,
            _ => Self::None,
        }
    }
}

/// Watchdog count clock (WDGTCR.WDGCS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum WatchdogClock {
    LineClock = 0b00,
    FrameClock = 0b01,
    TearingEffect = 0b10,
}

impl WatchdogClock {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        match raw & 0b11 {
            0b00 => Self::LineClock,
            0b01 => Self::FrameClock,
            _ => Self::TearingEffect,
        }
    }
}

/// The GFXTIM register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxtimBlock {
    base: usize,
}

impl GfxtimBlock {
    /// Bind a register block at `base`.
    ///
    /// # Safety
    /// `base` must point at a GFXTIM-shaped register block (hardware
    /// instance or RAM-backed block of at least 0x7C bytes).
    #[must_use]
    pub const unsafe fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// Base address this block was bound to.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    // --- Tearing effect ------------------------------------------------

    /// Select the tearing-effect input and active edge.
    pub fn set_tearing_effect(&self, source: TearingEffectSource, polarity: TearingEffectPolarity) {
        let value = ((source as u32) << 8)
            | match polarity {
                TearingEffectPolarity::FallingEdge => CR_TEPOL,
                TearingEffectPolarity::RisingEdge => 0,
            };
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CR, CR_TES_MASK | CR_TEPOL, value) }
    }

    /// Configured tearing-effect source.
    #[must_use]
    pub fn tearing_effect_source(&self) -> TearingEffectSource {
        // SAFETY: CR is a valid register of the bound block.
        TearingEffectSource::from_raw(unsafe { mmio::read_reg(self.base + CR) } >> 8)
    }

    /// Configured tearing-effect polarity.
    #[must_use]
    pub fn tearing_effect_polarity(&self) -> TearingEffectPolarity {
        // SAFETY: CR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CR) } & CR_TEPOL != 0 {
            TearingEffectPolarity::FallingEdge
        } else {
            TearingEffectPolarity::RisingEdge
        }
    }

    // --- Clock generator -----------------------------------------------

    /// Select line and frame clock sources.
    pub fn set_clock_sources(&self, line: LineClockSource, frame: FrameClockSource) {
        let value = ((frame as u32) << 8)
            | match line {
                LineClockSource::TearingEffect => CGCR_LCS,
                LineClockSource::CounterUnderflow => 0,
            };
        // SAFETY: CGCR is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + CGCR, CGCR_LCS | CGCR_FCS_MASK, value) }
    }

    /// Configured line clock source.
    #[must_use]
    pub fn line_clock_source(&self) -> LineClockSource {
        // SAFETY: CGCR is a valid register of the bound block.
        if unsafe { mmio::read_reg(self.base + CGCR) } & CGCR_LCS != 0 {
            LineClockSource::TearingEffect
        } else {
            LineClockSource::CounterUnderflow
        }
    }

    /// Configured frame clock source.
    #[must_use]
    pub fn frame_clock_source(&self) -> FrameClockSource {
        // SAFETY: CGCR is a valid register of the bound block.
        FrameClockSource::from_raw(unsafe { mmio::read_reg(self.base + CGCR) } >> 8)
    }

    /// Program the line clock counter reload value (22 bits of kernel
    /// clock cycles per line).
    pub fn set_line_clock_reload(&self, reload: u32) {
        // SAFETY: LCCRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + LCCRR, reload & CLOCK_RELOAD_MASK) }
    }

    /// Programmed line clock counter reload value.
    #[must_use]
    pub fn line_clock_reload(&self) -> u32 {
        // SAFETY: LCCRR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + LCCRR) };
        raw & CLOCK_RELOAD_MASK
    }

    /// Program the frame clock counter reload value (line clocks per
    /// frame).
    pub fn set_frame_clock_reload(&self, reload: u32) {
        // SAFETY: FCCRR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + FCCRR, reload & CLOCK_RELOAD_MASK) }
    }

    /// Programmed frame clock counter reload value.
    #[must_use]
    pub fn frame_clock_reload(&self) -> u32 {
        // SAFETY: FCCRR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + FCCRR) };
        raw & CLOCK_RELOAD_MASK
    }

    /// Force an immediate reload of the line and/or frame clock
    /// counters (self-clearing launch bits).
    pub fn force_clock_reload(&self, line: bool, frame: bool) {
        let bits = if line { CR_LCCFR } else { 0 } | if frame { CR_FCCFR } else { 0 };
        // SAFETY: CR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + CR, bits) }
    }

    // --- Absolute timer ------------------------------------------------

    /// Enable the absolute frame and/or line counters.
    pub fn enable_absolute_counters(&self, frame: bool, line: bool) {
        let bits = if frame { TCR_AFCEN } else { 0 } | if line { TCR_ALCEN } else { 0 };
        // SAFETY: TCR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + TCR, bits) }
    }

    /// Disable the absolute frame and/or line counters through TDR.
    pub fn disable_absolute_counters(&self, frame: bool, line: bool) {
        let bits = if frame { TCR_AFCEN } else { 0 } | if line { TCR_ALCEN } else { 0 };
        // SAFETY: TDR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + TDR, bits) }
    }

    /// Whether the absolute frame counter is running (TSR).
    #[must_use]
    pub fn is_absolute_frame_running(&self) -> bool {
        // SAFETY: TSR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + TSR) };
        raw & TCR_AFCEN != 0
    }

    /// Whether the absolute line counter is running (TSR).
    #[must_use]
    pub fn is_absolute_line_running(&self) -> bool {
        // SAFETY: TSR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + TSR) };
        raw & TCR_ALCEN != 0
    }

    /// Absolute frame counter value (20 bits).
    #[must_use]
    pub fn absolute_frame(&self) -> u32 {
        // SAFETY: AFCR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + AFCR) };
        raw & FRAME_COUNTER_MASK
    }

    /// Write the absolute frame counter (also how it is reset).
    pub fn set_absolute_frame(&self, value: u32) {
        // SAFETY: AFCR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + AFCR, value & FRAME_COUNTER_MASK) }
    }

    /// Absolute line counter value (12 bits).
    #[must_use]
    pub fn absolute_line(&self) -> u32 {
        // SAFETY: ALCR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + ALCR) };
        raw & LINE_COUNTER_MASK
    }

    /// Write the absolute line counter.
    pub fn set_absolute_line(&self, value: u32) {
        // SAFETY: ALCR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + ALCR, value & LINE_COUNTER_MASK) }
    }

    /// Program the absolute frame compare 1 value.
    pub fn set_frame_compare1(&self, value: u32) {
        // SAFETY: AFCC1R is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + AFCC1R, value & FRAME_COUNTER_MASK) }
    }

    /// Programmed absolute frame compare 1 value.
    #[must_use]
    pub fn frame_compare1(&self) -> u32 {
        // SAFETY: AFCC1R is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + AFCC1R) };
        raw & FRAME_COUNTER_MASK
    }

    /// Program an absolute line compare value (`1` or `2`).
    pub fn set_line_compare(&self, index: u8, value: u32) {
        let offset = if index <= 1 { ALCC1R } else { ALCC2R };
        // SAFETY: both compare offsets are valid registers of the bound
        // block.
        unsafe { mmio::write_reg(self.base + offset, value & LINE_COUNTER_MASK) }
    }

    /// Programmed absolute line compare value.
    #[must_use]
    pub fn line_compare(&self, index: u8) -> u32 {
        let offset = if index <= 1 { ALCC1R } else { ALCC2R };
        // SAFETY: both compare offsets are valid registers of the bound
        // block.
        let raw = unsafe { mmio::read_reg(self.base + offset) };
        raw & LINE_COUNTER_MASK
    }

    // --- Relative timer ------------------------------------------------

    /// Program a relative counter's reload value and mode, then enable
    /// it.
    pub fn start_relative_counter(&self, timer: RelativeTimer, reload: u16, mode: RelativeMode) {
        let (rr, en, cm) = match timer {
            RelativeTimer::Counter1 => (RFC1RR, TCR_RFC1EN, TCR_RFC1CM),
            RelativeTimer::Counter2 => (RFC2RR, TCR_RFC2EN, TCR_RFC2CM),
        };
        // SAFETY: the reload and TCR offsets are valid registers of the
        // bound block.
        unsafe {
            mmio::write_reg(self.base + rr, u32::from(reload) & LINE_COUNTER_MASK);
            match mode {
                RelativeMode::Continuous => mmio::set_bits(self.base + TCR, cm),
                RelativeMode::OneShot => mmio::clear_bits(self.base + TCR, cm),
            }
            mmio::set_bits(self.base + TCR, en);
        }
    }

    /// Disable a relative counter through TDR.
    pub fn stop_relative_counter(&self, timer: RelativeTimer) {
        let en = match timer {
            RelativeTimer::Counter1 => TCR_RFC1EN,
            RelativeTimer::Counter2 => TCR_RFC2EN,
        };
        // SAFETY: TDR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + TDR, en) }
    }

    /// Update a relative counter's reload value while it runs.
    pub fn set_relative_reload(&self, timer: RelativeTimer, reload: u16) {
        let rr = match timer {
            RelativeTimer::Counter1 => RFC1RR,
            RelativeTimer::Counter2 => RFC2RR,
        };
        // SAFETY: the reload offset is a valid register of the bound
        // block.
        unsafe { mmio::write_reg(self.base + rr, u32::from(reload) & LINE_COUNTER_MASK) }
    }

    /// Current value of a relative counter.
    #[must_use]
    pub fn relative_counter(&self, timer: RelativeTimer) -> u16 {
        let r = match timer {
            RelativeTimer::Counter1 => RFC1R,
            RelativeTimer::Counter2 => RFC2R,
        };
        // SAFETY: the counter offset is a valid register of the bound
        // block.
        (unsafe { mmio::read_reg(self.base + r) } & LINE_COUNTER_MASK) as u16
    }

    /// Whether a relative counter is running (TSR).
    #[must_use]
    pub fn is_relative_running(&self, timer: RelativeTimer) -> bool {
        let en = match timer {
            RelativeTimer::Counter1 => TCR_RFC1EN,
            RelativeTimer::Counter2 => TCR_RFC2EN,
        };
        // SAFETY: TSR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + TSR) };
        raw & en != 0
    }

    // --- Event generators ----------------------------------------------

    /// Select the line and frame events combined by a generator.
    pub fn set_event_sources(&self, generator: EventGenerator, line: LineEvent, frame: FrameEvent) {
        let shift = (generator as u32) * 8;
        let value = ((line as u32) | ((frame as u32) << 4)) << shift;
        // SAFETY: EVSR is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + EVSR, 0xFF << shift, value) }
    }

    /// Configured line event of a generator.
    #[must_use]
    pub fn event_line_source(&self, generator: EventGenerator) -> LineEvent {
        let shift = (generator as u32) * 8;
        // SAFETY: EVSR is a valid register of the bound block.
        LineEvent::from_raw(unsafe { mmio::read_reg(self.base + EVSR) } >> shift)
    }

    /// Configured frame event of a generator.
    #[must_use]
    pub fn event_frame_source(&self, generator: EventGenerator) -> FrameEvent {
        let shift = (generator as u32) * 8 + 4;
        // SAFETY: EVSR is a valid register of the bound block.
        FrameEvent::from_raw(unsafe { mmio::read_reg(self.base + EVSR) } >> shift)
    }

    /// Enable an event generator.
    pub fn enable_event_generator(&self, generator: EventGenerator) {
        // SAFETY: EVCR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + EVCR, 1 << (generator as u32)) }
    }

    /// Disable an event generator.
    pub fn disable_event_generator(&self, generator: EventGenerator) {
        // SAFETY: EVCR is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + EVCR, 1 << (generator as u32)) }
    }

    /// Whether an event generator is enabled.
    #[must_use]
    pub fn is_event_generator_enabled(&self, generator: EventGenerator) -> bool {
        // SAFETY: EVCR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + EVCR) };
        raw & (1 << (generator as u32)) != 0
    }

    // --- Watchdog ------------------------------------------------------

    /// Select the watchdog count clock. Only change while the watchdog
    /// is disabled.
    pub fn set_watchdog_clock(&self, clock: WatchdogClock) {
        // SAFETY: WDGTCR is a valid register of the bound block.
        unsafe { mmio::write_field(self.base + WDGTCR, WDGTCR_WDGCS_MASK, (clock as u32) << 8) }
    }

    /// Configured watchdog count clock.
    #[must_use]
    pub fn watchdog_clock(&self) -> WatchdogClock {
        // SAFETY: WDGTCR is a valid register of the bound block.
        WatchdogClock::from_raw(unsafe { mmio::read_reg(self.base + WDGTCR) } >> 8)
    }

    /// Program the watchdog reload and pre-alarm values.
    pub fn set_watchdog_values(&self, reload: u16, pre_alarm: u16) {
        // SAFETY: both offsets are valid registers of the bound block.
        unsafe {
            mmio::write_reg(self.base + WDGRR, u32::from(reload));
            mmio::write_reg(self.base + WDGPAR, u32::from(pre_alarm));
        }
    }

    /// Programmed watchdog reload value.
    #[must_use]
    pub fn watchdog_reload(&self) -> u16 {
        // SAFETY: WDGRR is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + WDGRR) } & 0xFFFF) as u16
    }

    /// Programmed watchdog pre-alarm value.
    #[must_use]
    pub fn watchdog_pre_alarm(&self) -> u16 {
        // SAFETY: WDGPAR is a valid register of the bound block.
        (unsafe { mmio::read_reg(self.base + WDGPAR) } & 0xFFFF) as u16
    }

    /// Enable the watchdog counter.
    pub fn enable_watchdog(&self) {
        // SAFETY: WDGTCR is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + WDGTCR, WDGTCR_WDGEN) }
    }

    /// Disable the watchdog counter.
    pub fn disable_watchdog(&self) {
        // SAFETY: WDGTCR is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + WDGTCR, WDGTCR_WDGEN) }
    }

    /// Whether the watchdog is counting.
    #[must_use]
    pub fn is_watchdog_enabled(&self) -> bool {
        // SAFETY: WDGTCR is a valid register of the bound block.
        let raw = unsafe { mmio::read_reg(self.base + WDGTCR) };
        raw & WDGTCR_WDGEN != 0
    }

    /// Refresh the watchdog by rewriting its reload value.
    pub fn refresh_watchdog(&self) {
        // SAFETY: WDGRR is a valid register of the bound block.
        unsafe {
            let reload = mmio::read_reg(self.base + WDGRR);
            mmio::write_reg(self.base + WDGRR, reload);
        }
    }

    // --- Flags / interrupts --------------------------------------------

    /// Enable the interrupts selected by `flags`.
    pub fn enable_interrupts(&self, flags: GfxtimFlags) {
        // SAFETY: IER is a valid register of the bound block.
        unsafe { mmio::set_bits(self.base + IER, flags.bits()) }
    }

    /// Disable the interrupts selected by `flags`.
    pub fn disable_interrupts(&self, flags: GfxtimFlags) {
        // SAFETY: IER is a valid register of the bound block.
        unsafe { mmio::clear_bits(self.base + IER, flags.bits()) }
    }

    /// Currently enabled interrupt sources.
    #[must_use]
    pub fn enabled_interrupts(&self) -> GfxtimFlags {
        // SAFETY: IER is a valid register of the bound block.
        GfxtimFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + IER) })
    }

    /// Snapshot of the event flags.
    #[must_use]
    pub fn flags(&self) -> GfxtimFlags {
        // SAFETY: ISR is a valid register of the bound block.
        GfxtimFlags::from_bits_truncate(unsafe { mmio::read_reg(self.base + ISR) })
    }

    /// Whether all `flags` are asserted.
    #[must_use]
    pub fn is_flag_set(&self, flags: GfxtimFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Clear the selected flags through ICR.
    pub fn clear_flags(&self, flags: GfxtimFlags) {
        // SAFETY: ICR is a valid register of the bound block.
        unsafe { mmio::write_reg(self.base + ICR, flags.bits()) }
    }

    /// Reset every configuration register to zero.
    pub fn reset_registers(&self) {
        // SAFETY: all offsets below are valid registers of the bound
        // block.
        unsafe {
            mmio::write_reg(self.base + CR, 0);
            mmio::write_reg(self.base + CGCR, 0);
            mmio::write_reg(self.base + TDR, TCR_AFCEN | TCR_ALCEN | TCR_RFC1EN | TCR_RFC2EN);
            mmio::write_reg(self.base + IER, 0);
            mmio::write_reg(self.base + ICR, GfxtimFlags::all().bits());
            mmio::write_reg(self.base + LCCRR, 0);
            mmio::write_reg(self.base + FCCRR, 0);
            mmio::write_reg(self.base + EVCR, 0);
            mmio::write_reg(self.base + EVSR, 0);
            mmio::write_reg(self.base + WDGTCR, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_block() -> (Box<[u32; 0x20]>, GfxtimBlock) {
        let ram = Box::new([0u32; 0x20]);
        let gfxtim = unsafe { GfxtimBlock::from_base(ram.as_ptr() as usize) };
        (ram, gfxtim)
    }

    #[test]
    fn test_tearing_effect_round_trip() {
        let (_ram, gfxtim) = ram_block();
        gfxtim.set_tearing_effect(TearingEffectSource::Vsync, TearingEffectPolarity::FallingEdge);
        assert_eq!(gfxtim.tearing_effect_source(), TearingEffectSource::Vsync);
        assert_eq!(
            gfxtim.tearing_effect_polarity(),
            TearingEffectPolarity::FallingEdge
        );
    }

    #[test]
    fn test_clock_generator_round_trip() {
        let (_ram, gfxtim) = ram_block();
        gfxtim.set_clock_sources(LineClockSource::CounterUnderflow, FrameClockSource::LineClock);
        gfxtim.set_line_clock_reload(0x2_0000);
        gfxtim.set_frame_clock_reload(479);
        assert_eq!(gfxtim.line_clock_source(), LineClockSource::CounterUnderflow);
        assert_eq!(gfxtim.frame_clock_source(), FrameClockSource::LineClock);
        assert_eq!(gfxtim.line_clock_reload(), 0x2_0000);
        assert_eq!(gfxtim.frame_clock_reload(), 479);
    }

    #[test]
    fn test_event_generator_lanes_independent() {
        let (_ram, gfxtim) = ram_block();
        gfxtim.set_event_sources(
            EventGenerator::Event1,
            LineEvent::AlcCompare1,
            FrameEvent::AfcOverflow,
        );
        gfxtim.set_event_sources(
            EventGenerator::Event3,
            LineEvent::TearingEffect,
            FrameEvent::Rfc2Reload,
        );
        assert_eq!(
            gfxtim.event_line_source(EventGenerator::Event1),
            LineEvent::AlcCompare1
        );
        assert_eq!(
            gfxtim.event_frame_source(EventGenerator::Event1),
            FrameEvent::AfcOverflow
        );
        assert_eq!(
            gfxtim.event_line_source(EventGenerator::Event3),
            LineEvent::TearingEffect
        );
        assert_eq!(
            gfxtim.event_frame_source(EventGenerator::Event3),
            FrameEvent::Rfc2Reload
        );
        // untouched lane stays at None
        assert_eq!(
            gfxtim.event_line_source(EventGenerator::Event2),
            LineEvent::None
        );
    }

    #[test]
    fn test_relative_counter_start_sets_mode_and_enable() {
        let (ram, gfxtim) = ram_block();
        gfxtim.start_relative_counter(RelativeTimer::Counter2, 60, RelativeMode::Continuous);
        assert_ne!(ram[TCR / 4] & TCR_RFC2EN, 0);
        assert_ne!(ram[TCR / 4] & TCR_RFC2CM, 0);
        assert_eq!(ram[RFC2RR / 4], 60);

        gfxtim.start_relative_counter(RelativeTimer::Counter2, 30, RelativeMode::OneShot);
        assert_eq!(ram[TCR / 4] & TCR_RFC2CM, 0);
        assert_eq!(ram[RFC2RR / 4], 30);
    }

    #[test]
    fn test_watchdog_config_round_trip() {
        let (_ram, gfxtim) = ram_block();
        gfxtim.set_watchdog_clock(WatchdogClock::FrameClock);
        gfxtim.set_watchdog_values(1000, 100);
        gfxtim.enable_watchdog();
        assert_eq!(gfxtim.watchdog_clock(), WatchdogClock::FrameClock);
        assert_eq!(gfxtim.watchdog_reload(), 1000);
        assert_eq!(gfxtim.watchdog_pre_alarm(), 100);
        assert!(gfxtim.is_watchdog_enabled());
    }
}
