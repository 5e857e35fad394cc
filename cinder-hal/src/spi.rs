//! SPI driver.
//!
//! Blocking transfers with millisecond timeouts, interrupt-driven
//! variants fed by [`Spi::irq_handler`], and an
//! [`embedded_hal::spi::SpiBus`] implementation for portable device
//! drivers.
//!
//! Frames wider than 8 bits are packed from byte slices little-endian,
//! so a 16-bit transfer of `n` frames takes a `2 * n` byte slice.

use cinder_ll::spi as ll;
use cinder_ll::spi::SpiFlags;

#[cfg(feature = "mutex")]
use crate::os::BusLock;
use crate::tick::Deadline;
use crate::{Error, Result};

pub use cinder_ll::spi::{
    BaudRatePrescaler, ClockPhase, ClockPolarity, DataWidth, Direction, FifoThreshold, FirstBit,
    Mode, NssManagement, SpiBlock,
};

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Not initialized.
    Reset,
    /// Initialized, no configuration applied yet.
    Init,
    /// Configured and ready for a transfer.
    Idle,
    /// Interrupt-driven transmit in progress.
    TxActive,
    /// Interrupt-driven receive in progress.
    RxActive,
    /// Interrupt-driven full-duplex transfer in progress.
    TxRxActive,
    /// Abort requested, waiting for completion.
    Abort,
    /// A hardware error was recorded; reconfigure to recover.
    Fault,
}

bitflags::bitflags! {
    /// Sticky error accumulator, one bit per hardware error source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiError: u32 {
        const MODE_FAULT = 1 << 0;
        const CRC = 1 << 1;
        const OVERRUN = 1 << 2;
        const FRAME_FORMAT = 1 << 3;
        const DMA = 1 << 4;
        const ABORT = 1 << 5;
        const UNDERRUN = 1 << 6;
    }
}

impl SpiError {
    fn from_flags(flags: SpiFlags) -> Self {
        let mut err = SpiError::empty();
        if flags.contains(SpiFlags::MODF) {
            err |= SpiError::MODE_FAULT;
        }
        if flags.contains(SpiFlags::CRCE) {
            err |= SpiError::CRC;
        }
        if flags.contains(SpiFlags::OVR) {
            err |= SpiError::OVERRUN;
        }
        if flags.contains(SpiFlags::TIFRE) {
            err |= SpiError::FRAME_FORMAT;
        }
        if flags.contains(SpiFlags::UDR) {
            err |= SpiError::UNDERRUN;
        }
        err
    }
}

/// Full peripheral configuration applied by [`Spi::set_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    pub mode: Mode,
    pub direction: Direction,
    pub data_width: DataWidth,
    pub clock_polarity: ClockPolarity,
    pub clock_phase: ClockPhase,
    pub baud_rate_prescaler: BaudRatePrescaler,
    pub first_bit: FirstBit,
    pub nss: NssManagement,
    /// Pulse NSS between frames (hardware-output NSS only).
    pub nss_pulse: bool,
    pub fifo_threshold: FifoThreshold,
}

impl Default for SpiConfig {
    /// Master, full duplex, 8-bit frames, mode 0, MSB first, soft NSS.
    fn default() -> Self {
        Self {
            mode: Mode::Master,
            direction: Direction::FullDuplex,
            data_width: DataWidth::BITS_8,
            clock_polarity: ClockPolarity::Low,
            clock_phase: ClockPhase::FirstEdge,
            baud_rate_prescaler: BaudRatePrescaler::Div8,
            first_bit: FirstBit::Msb,
            nss: NssManagement::Soft,
            nss_pulse: false,
            fifo_threshold: FifoThreshold::ONE_FRAME,
        }
    }
}

/// CRC configuration applied by [`Spi::set_crc_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrcConfig {
    pub polynomial: u32,
    /// CRC frame size in bits.
    pub size_bits: u8,
}

#[cfg(feature = "register-callbacks")]
/// Event callback. Invoked from `irq_handler` with the driver borrowed
/// mutably.
pub type Callback = fn(&mut Spi);

#[cfg(feature = "register-callbacks")]
#[derive(Default)]
struct Callbacks {
    tx_complete: Option<Callback>,
    rx_complete: Option<Callback>,
    tx_rx_complete: Option<Callback>,
    error: Option<Callback>,
    abort_complete: Option<Callback>,
}

/// Interrupt-driven transfer bookkeeping. Buffers are `'static` so the
/// interrupt handler can touch them long after the starting call
/// returned.
#[derive(Default)]
struct Transfer {
    tx: Option<&'static [u8]>,
    tx_pos: usize,
    rx: Option<&'static mut [u8]>,
    rx_pos: usize,
}

/// SPI driver handle.
pub struct Spi {
    block: ll::SpiBlock,
    state: State,
    frame_bytes: usize,
    transfer: Transfer,
    #[cfg(feature = "get-last-errors")]
    last_errors: SpiError,
    #[cfg(feature = "register-callbacks")]
    callbacks: Callbacks,
    #[cfg(feature = "mutex")]
    bus_lock: BusLock,
    #[cfg(feature = "user-data")]
    user_data: usize,
}

impl Spi {
    /// Wrap a register block. The driver starts in [`State::Reset`].
    #[must_use]
    pub fn new(block: ll::SpiBlock) -> Self {
        Self {
            block,
            state: State::Reset,
            frame_bytes: 1,
            transfer: Transfer::default(),
            #[cfg(feature = "get-last-errors")]
            last_errors: SpiError::empty(),
            #[cfg(feature = "register-callbacks")]
            callbacks: Callbacks::default(),
            #[cfg(feature = "mutex")]
            bus_lock: BusLock::new(),
            #[cfg(feature = "user-data")]
            user_data: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Reset the peripheral registers and move to [`State::Init`].
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            State::TxActive | State::RxActive | State::TxRxActive | State::Abort => {
                Err(Error::Busy)
            }
            _ => {
                self.block.reset_registers();
                self.frame_bytes = 1;
                #[cfg(feature = "get-last-errors")]
                {
                    self.last_errors = SpiError::empty();
                }
                self.state = State::Init;
                Ok(())
            }
        }
    }

    /// Disable the peripheral, reset its registers and return to
    /// [`State::Reset`].
    pub fn deinit(&mut self) {
        self.block.disable();
        self.block.disable_interrupts(SpiFlags::all());
        self.block.reset_registers();
        self.transfer = Transfer::default();
        self.state = State::Reset;
    }

    /// Apply a full configuration. Allowed from [`State::Init`],
    /// [`State::Idle`] and [`State::Fault`]; the peripheral must be
    /// quiescent.
    pub fn set_config(&mut self, config: &SpiConfig) -> Result<()> {
        match self.state {
            State::Init | State::Idle | State::Fault => {}
            State::Reset => return Err(Error::InvalidParam),
            _ => return Err(Error::Busy),
        }
        if config.nss_pulse && config.nss != NssManagement::HardOutput {
            return Err(Error::InvalidParam);
        }

        self.block.disable();
        self.block.set_mode(config.mode);
        self.block.set_direction(config.direction);
        self.block.set_data_width(config.data_width);
        self.block.set_clock_polarity(config.clock_polarity);
        self.block.set_clock_phase(config.clock_phase);
        self.block.set_baud_rate_prescaler(config.baud_rate_prescaler);
        self.block.set_first_bit(config.first_bit);
        self.block.set_nss_management(config.nss);
        self.block.set_nss_pulse(config.nss_pulse);
        self.block.set_fifo_threshold(config.fifo_threshold);
        if config.nss == NssManagement::Soft {
            // keep the internal select released until a transfer runs
            self.block.set_internal_ss(true);
        }

        self.frame_bytes = match config.data_width.bits() {
            0..=8 => 1,
            9..=16 => 2,
            _ => 4,
        };
        self.state = State::Idle;
        Ok(())
    }

    /// Read the applied configuration back from the registers.
    pub fn config(&self) -> Result<SpiConfig> {
        if self.state == State::Reset {
            return Err(Error::InvalidParam);
        }
        Ok(SpiConfig {
            mode: self.block.mode(),
            direction: self.block.direction(),
            data_width: self.block.data_width(),
            clock_polarity: self.block.clock_polarity(),
            clock_phase: self.block.clock_phase(),
            baud_rate_prescaler: self.block.baud_rate_prescaler(),
            first_bit: self.block.first_bit(),
            nss: self.block.nss_management(),
            nss_pulse: self.block.nss_pulse(),
            fifo_threshold: self.block.fifo_threshold(),
        })
    }

    /// Enable hardware CRC. Allowed in the same states as
    /// [`Spi::set_config`].
    pub fn set_crc_config(&mut self, config: &CrcConfig) -> Result<()> {
        match self.state {
            State::Init | State::Idle | State::Fault => {}
            State::Reset => return Err(Error::InvalidParam),
            _ => return Err(Error::Busy),
        }
        if !(4..=32).contains(&config.size_bits) {
            return Err(Error::InvalidParam);
        }
        self.block.disable();
        self.block.set_crc_polynomial(config.polynomial);
        self.block.enable_crc(config.size_bits);
        Ok(())
    }

    /// Disable hardware CRC.
    pub fn disable_crc(&mut self) -> Result<()> {
        match self.state {
            State::Init | State::Idle | State::Fault => {
                self.block.disable_crc();
                Ok(())
            }
            State::Reset => Err(Error::InvalidParam),
            _ => Err(Error::Busy),
        }
    }

    /// Accumulated hardware errors since the last clear.
    #[cfg(feature = "get-last-errors")]
    #[must_use]
    pub fn last_errors(&self) -> SpiError {
        self.last_errors
    }

    /// Clear the error accumulator.
    #[cfg(feature = "get-last-errors")]
    pub fn clear_last_errors(&mut self) {
        self.last_errors = SpiError::empty();
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

    /// Take exclusive use of the bus. Fails with [`Error::Busy`] if
    /// another owner holds it.
    #[cfg(feature = "mutex")]
    pub fn acquire_bus(&self) -> Result<()> {
        self.bus_lock.acquire()
    }

    /// Release the bus.
    #[cfg(feature = "mutex")]
    pub fn release_bus(&self) {
        self.bus_lock.release();
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_tx_complete_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.tx_complete = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_rx_complete_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.rx_complete = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_tx_rx_complete_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.tx_rx_complete = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_error_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.error = cb;
    }

    #[cfg(feature = "register-callbacks")]
    pub fn set_abort_complete_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.abort_complete = cb;
    }

    // --- blocking transfers --------------------------------------------

    /// Transmit `data`, blocking up to `timeout_ms` milliseconds.
    ///
    /// `data.len()` must be a whole number of frames. A timeout of zero
    /// polls each flag once; [`crate::TIMEOUT_FOREVER`] waits without
    /// bound.
    pub fn transmit(&mut self, data: &[u8], timeout_ms: u32) -> Result<()> {
        let frames = self.frame_count(data.len())?;
        self.begin_blocking(frames)?;
        let deadline = Deadline::new(timeout_ms);

        for frame in data.chunks_exact(self.frame_bytes) {
            if let Err(e) = self.wait_flag(SpiFlags::TXP, &deadline) {
                return self.end_blocking(Err(e));
            }
            self.write_frame(frame);
        }
        let result = self.wait_flag(SpiFlags::EOT, &deadline);
        self.end_blocking(result)
    }

    /// Receive into `data`, blocking up to `timeout_ms` milliseconds.
    /// In master mode the driver generates the clock.
    pub fn receive(&mut self, data: &mut [u8], timeout_ms: u32) -> Result<()> {
        let frames = self.frame_count(data.len())?;
        self.begin_blocking(frames)?;
        let deadline = Deadline::new(timeout_ms);

        let frame_bytes = self.frame_bytes;
        for frame in data.chunks_exact_mut(frame_bytes) {
            if let Err(e) = self.wait_flag(SpiFlags::RXP, &deadline) {
                return self.end_blocking(Err(e));
            }
            self.read_frame_into(frame);
        }
        let result = self.wait_flag(SpiFlags::EOT, &deadline);
        self.end_blocking(result)
    }

    /// Full-duplex transfer: clock out `tx` while capturing into `rx`.
    /// Both slices must be the same whole number of frames.
    pub fn transmit_receive(&mut self, tx: &[u8], rx: &mut [u8], timeout_ms: u32) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(Error::InvalidParam);
        }
        let frames = self.frame_count(tx.len())?;
        self.begin_blocking(frames)?;
        let deadline = Deadline::new(timeout_ms);

        let frame_bytes = self.frame_bytes;
        let mut tx_iter = tx.chunks_exact(frame_bytes);
        let mut rx_iter = rx.chunks_exact_mut(frame_bytes);
        let mut tx_left = frames;
        let mut rx_left = frames;
        while tx_left > 0 || rx_left > 0 {
            let flags = self.block.flags();
            let mut progressed = false;
            if tx_left > 0 && flags.contains(SpiFlags::TXP) {
                if let Some(frame) = tx_iter.next() {
                    self.write_frame(frame);
                }
                tx_left -= 1;
                progressed = true;
            }
            if rx_left > 0 && flags.contains(SpiFlags::RXP) {
                if let Some(frame) = rx_iter.next() {
                    self.read_frame_into(frame);
                }
                rx_left -= 1;
                progressed = true;
            }
            if !progressed && deadline.expired() {
                return self.end_blocking(Err(Error::Timeout));
            }
        }
        let result = self.wait_flag(SpiFlags::EOT, &deadline);
        self.end_blocking(result)
    }

    // --- interrupt-driven transfers ------------------------------------

    /// Start an interrupt-driven transmit. Completion is signalled
    /// through the Tx-complete callback; the buffer must stay valid for
    /// the whole transfer, hence `'static`.
    pub fn transmit_it(&mut self, data: &'static [u8]) -> Result<()> {
        let frames = self.frame_count(data.len())?;
        self.begin_it(frames, State::TxActive)?;
        self.transfer.tx = Some(data);
        self.block
            .enable_interrupts(SpiFlags::TXP | SpiFlags::EOT | SpiFlags::ERRORS);
        self.block.enable();
        self.block.start_transfer();
        Ok(())
    }

    /// Start an interrupt-driven receive.
    pub fn receive_it(&mut self, data: &'static mut [u8]) -> Result<()> {
        let frames = self.frame_count(data.len())?;
        self.begin_it(frames, State::RxActive)?;
        self.transfer.rx = Some(data);
        self.block
            .enable_interrupts(SpiFlags::RXP | SpiFlags::EOT | SpiFlags::ERRORS);
        self.block.enable();
        self.block.start_transfer();
        Ok(())
    }

    /// Start an interrupt-driven full-duplex transfer.
    pub fn transmit_receive_it(&mut self, tx: &'static [u8], rx: &'static mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(Error::InvalidParam);
        }
        let frames = self.frame_count(tx.len())?;
        self.begin_it(frames, State::TxRxActive)?;
        self.transfer.tx = Some(tx);
        self.transfer.rx = Some(rx);
        self.block
            .enable_interrupts(SpiFlags::TXP | SpiFlags::RXP | SpiFlags::EOT | SpiFlags::ERRORS);
        self.block.enable();
        self.block.start_transfer();
        Ok(())
    }

    /// Abort an interrupt-driven transfer and return to
    /// [`State::Idle`].
    pub fn abort(&mut self) -> Result<()> {
        match self.state {
            State::TxActive | State::RxActive | State::TxRxActive => {}
            _ => return Err(Error::InvalidParam),
        }
        self.state = State::Abort;
        self.block.disable_interrupts(SpiFlags::all());
        self.block.suspend_transfer();
        self.block.disable();
        self.block.clear_flags(SpiFlags::CLEARABLE);
        self.transfer = Transfer::default();
        #[cfg(feature = "get-last-errors")]
        {
            self.last_errors |= SpiError::ABORT;
        }
        self.state = State::Idle;
        Ok(())
    }

    /// Abort and fire the abort-complete callback.
    pub fn abort_it(&mut self) -> Result<()> {
        self.abort()?;
        #[cfg(feature = "register-callbacks")]
        if let Some(cb) = self.callbacks.abort_complete {
            cb(self);
        }
        Ok(())
    }

    /// Service the peripheral interrupt. Call from the SPI IRQ.
    pub fn irq_handler(&mut self) {
        let flags = self.block.flags();
        let enabled = self.block.enabled_interrupts();
        let active = flags & enabled;

        let errors = active & SpiFlags::ERRORS;
        if !errors.is_empty() {
            self.block.clear_flags(errors);
            self.block.disable_interrupts(SpiFlags::all());
            self.block.disable();
            self.transfer = Transfer::default();
            #[cfg(feature = "get-last-errors")]
            {
                self.last_errors |= SpiError::from_flags(errors);
            }
            #[cfg(not(feature = "get-last-errors"))]
            let _ = SpiError::from_flags(errors);
            self.state = State::Fault;
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.error {
                cb(self);
            }
            return;
        }

        if active.contains(SpiFlags::TXP) {
            self.pump_tx();
        }
        if active.contains(SpiFlags::RXP) {
            self.pump_rx();
        }

        if active.contains(SpiFlags::EOT) {
            // drain anything the RXP level-check missed
            self.pump_rx();
            self.block.clear_flags(SpiFlags::EOT | SpiFlags::TXTF);
            self.block.disable_interrupts(SpiFlags::all());
            self.block.disable();
            let finished = self.state;
            self.transfer = Transfer::default();
            self.state = State::Idle;
            #[cfg(feature = "register-callbacks")]
            {
                let cb = match finished {
                    State::TxActive => self.callbacks.tx_complete,
                    State::RxActive => self.callbacks.rx_complete,
                    State::TxRxActive => self.callbacks.tx_rx_complete,
                    _ => None,
                };
                if let Some(cb) = cb {
                    cb(self);
                }
            }
            #[cfg(not(feature = "register-callbacks"))]
            let _ = finished;
        }
    }

    // --- internals -----------------------------------------------------

    fn frame_count(&self, bytes: usize) -> Result<u16> {
        if self.frame_bytes == 0 || bytes == 0 || bytes % self.frame_bytes != 0 {
            return Err(Error::InvalidParam);
        }
        u16::try_from(bytes / self.frame_bytes).map_err(|_| Error::InvalidParam)
    }

    fn begin_blocking(&mut self, frames: u16) -> Result<()> {
        match self.state {
            State::Idle => {}
            State::Reset | State::Init | State::Fault => return Err(Error::InvalidParam),
            _ => return Err(Error::Busy),
        }
        self.block.clear_flags(SpiFlags::CLEARABLE);
        self.block.set_transfer_size(frames);
        self.block.enable();
        self.block.start_transfer();
        self.state = State::TxRxActive;
        Ok(())
    }

    fn end_blocking(&mut self, result: Result<()>) -> Result<()> {
        let hw_errors = self.block.flags() & SpiFlags::ERRORS;
        self.block.clear_flags(SpiFlags::CLEARABLE);
        self.block.disable();
        if !hw_errors.is_empty() {
            #[cfg(feature = "get-last-errors")]
            {
                self.last_errors |= SpiError::from_flags(hw_errors);
            }
            self.state = State::Fault;
            return Err(Error::Hardware);
        }
        self.state = State::Idle;
        result
    }

    fn begin_it(&mut self, frames: u16, next: State) -> Result<()> {
        match self.state {
            State::Idle => {}
            State::Reset | State::Init | State::Fault => return Err(Error::InvalidParam),
            _ => return Err(Error::Busy),
        }
        self.block.clear_flags(SpiFlags::CLEARABLE);
        self.block.set_transfer_size(frames);
        self.transfer = Transfer::default();
        self.state = next;
        Ok(())
    }

    fn wait_flag(&self, flag: SpiFlags, deadline: &Deadline) -> Result<()> {
        loop {
            if self.block.is_flag_set(flag) {
                return Ok(());
            }
            if self.block.is_flag_set(SpiFlags::ERRORS) {
                // end_blocking picks the detail up from SR
                return Ok(());
            }
            if deadline.expired() {
                return Err(Error::Timeout);
            }
        }
    }

    fn write_frame(&self, frame: &[u8]) {
        match frame.len() {
            1 => self.block.write_data8(frame[0]),
            2 => self
                .block
                .write_data16(u16::from_le_bytes([frame[0], frame[1]])),
            _ => self
                .block
                .write_data32(u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]])),
        }
    }

    fn read_frame_into(&self, frame: &mut [u8]) {
        match frame.len() {
            1 => frame[0] = self.block.read_data8(),
            2 => frame.copy_from_slice(&self.block.read_data16().to_le_bytes()),
            _ => frame.copy_from_slice(&self.block.read_data32().to_le_bytes()),
        }
    }

    fn pump_tx(&mut self) {
        let frame_bytes = self.frame_bytes;
        let Some(tx) = self.transfer.tx else { return };
        if self.transfer.tx_pos >= tx.len() {
            return;
        }
        let frame = &tx[self.transfer.tx_pos..self.transfer.tx_pos + frame_bytes];
        self.write_frame(frame);
        self.transfer.tx_pos += frame_bytes;
        if self.transfer.tx_pos >= tx.len() {
            self.block.disable_interrupts(SpiFlags::TXP);
        }
    }

    fn pump_rx(&mut self) {
        let frame_bytes = self.frame_bytes;
        let block = self.block;
        let Some(rx) = self.transfer.rx.as_deref_mut() else {
            return;
        };
        while self.transfer.rx_pos < rx.len() && block.is_flag_set(SpiFlags::RXP) {
            let pos = self.transfer.rx_pos;
            match frame_bytes {
                1 => rx[pos] = block.read_data8(),
                2 => rx[pos..pos + 2].copy_from_slice(&block.read_data16().to_le_bytes()),
                _ => rx[pos..pos + 4].copy_from_slice(&block.read_data32().to_le_bytes()),
            }
            self.transfer.rx_pos += frame_bytes;
        }
        if self.transfer.rx_pos >= rx.len() {
            block.disable_interrupts(SpiFlags::RXP);
        }
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

impl embedded_hal::spi::ErrorType for Spi {
    type Error = Error;
}

impl embedded_hal::spi::SpiBus<u8> for Spi {
    fn read(&mut self, words: &mut [u8]) -> Result<()> {
        self.receive(words, crate::TIMEOUT_FOREVER)
    }

    fn write(&mut self, words: &[u8]) -> Result<()> {
        self.transmit(words, crate::TIMEOUT_FOREVER)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<()> {
        let common = read.len().min(write.len());
        if common > 0 {
            self.transmit_receive(&write[..common], &mut read[..common], crate::TIMEOUT_FOREVER)?;
        }
        if write.len() > common {
            self.transmit(&write[common..], crate::TIMEOUT_FOREVER)?;
        }
        if read.len() > common {
            self.receive(&mut read[common..], crate::TIMEOUT_FOREVER)?;
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<()> {
        let frames = self.frame_count(words.len())?;
        self.begin_blocking(frames)?;
        let deadline = Deadline::new(crate::TIMEOUT_FOREVER);
        let frame_bytes = self.frame_bytes;
        for frame in words.chunks_exact_mut(frame_bytes) {
            if let Err(e) = self.wait_flag(SpiFlags::TXP, &deadline) {
                return self.end_blocking(Err(e));
            }
            self.write_frame(frame);
            if let Err(e) = self.wait_flag(SpiFlags::RXP, &deadline) {
                return self.end_blocking(Err(e));
            }
            self.read_frame_into(frame);
        }
        let result = self.wait_flag(SpiFlags::EOT, &deadline);
        self.end_blocking(result)
    }

    fn flush(&mut self) -> Result<()> {
        // blocking operations leave the FIFO drained and the
        // peripheral disabled
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_spi() -> (Box<[u32; 0x20]>, Spi) {
        let ram = Box::new([0u32; 0x20]);
        let spi = Spi::new(unsafe { ll::SpiBlock::from_base(ram.as_ptr() as usize) });
        (ram, spi)
    }

    fn configured() -> (Box<[u32; 0x20]>, Spi) {
        let (ram, mut spi) = ram_spi();
        spi.init().unwrap();
        spi.set_config(&SpiConfig::default()).unwrap();
        (ram, spi)
    }

    #[test]
    fn test_lifecycle_states() {
        let (_ram, mut spi) = ram_spi();
        assert_eq!(spi.state(), State::Reset);
        assert_eq!(spi.set_config(&SpiConfig::default()), Err(Error::InvalidParam));
        spi.init().unwrap();
        assert_eq!(spi.state(), State::Init);
        spi.set_config(&SpiConfig::default()).unwrap();
        assert_eq!(spi.state(), State::Idle);
        spi.deinit();
        assert_eq!(spi.state(), State::Reset);
    }

    #[test]
    fn test_config_round_trip() {
        let (_ram, mut spi) = ram_spi();
        spi.init().unwrap();
        let config = SpiConfig {
            mode: Mode::Slave,
            direction: Direction::HalfDuplex,
            data_width: DataWidth::BITS_16,
            clock_polarity: ClockPolarity::High,
            clock_phase: ClockPhase::SecondEdge,
            baud_rate_prescaler: BaudRatePrescaler::Div64,
            first_bit: FirstBit::Lsb,
            nss: NssManagement::HardInput,
            nss_pulse: false,
            fifo_threshold: FifoThreshold::new(4).unwrap(),
        };
        spi.set_config(&config).unwrap();
        assert_eq!(spi.config().unwrap(), config);
    }

    #[test]
    fn test_nss_pulse_round_trip_with_hard_output() {
        let (_ram, mut spi) = ram_spi();
        spi.init().unwrap();
        let config = SpiConfig {
            nss: NssManagement::HardOutput,
            nss_pulse: true,
            ..SpiConfig::default()
        };
        spi.set_config(&config).unwrap();
        assert_eq!(spi.config().unwrap(), config);
    }

    #[test]
    fn test_nss_pulse_requires_hard_output() {
        let (_ram, mut spi) = ram_spi();
        spi.init().unwrap();
        let config = SpiConfig {
            nss: NssManagement::Soft,
            nss_pulse: true,
            ..SpiConfig::default()
        };
        assert_eq!(spi.set_config(&config), Err(Error::InvalidParam));
    }

    #[test]
    fn test_transmit_zero_timeout_times_out() {
        let (_ram, mut spi) = configured();
        // RAM-backed SR never raises TXP
        assert_eq!(spi.transmit(&[1, 2, 3], 0), Err(Error::Timeout));
        // the failed transfer returns the driver to idle
        assert_eq!(spi.state(), State::Idle);
    }

    #[test]
    fn test_transmit_rejects_partial_frame() {
        let (_ram, mut spi) = ram_spi();
        spi.init().unwrap();
        spi.set_config(&SpiConfig {
            data_width: DataWidth::BITS_16,
            ..SpiConfig::default()
        })
        .unwrap();
        assert_eq!(spi.transmit(&[1, 2, 3], 0), Err(Error::InvalidParam));
    }

    #[test]
    fn test_transmit_succeeds_when_flags_preset() {
        let (ram, mut spi) = configured();
        // pre-assert TXP and EOT in the RAM-backed status register
        unsafe {
            cinder_ll::mmio::write_reg(
                ram.as_ptr() as usize + 0x14,
                (SpiFlags::TXP | SpiFlags::EOT).bits(),
            );
        }
        spi.transmit(&[0xAA, 0x55], crate::TIMEOUT_FOREVER).unwrap();
        assert_eq!(spi.state(), State::Idle);
        // last frame written lands in TXDR
        assert_eq!(ram[0x20 / 4] & 0xFF, 0x55);
    }

    #[test]
    fn test_crc_config_bounds() {
        let (_ram, mut spi) = ram_spi();
        spi.init().unwrap();
        assert_eq!(
            spi.set_crc_config(&CrcConfig {
                polynomial: 0x107,
                size_bits: 3
            }),
            Err(Error::InvalidParam)
        );
        spi.set_crc_config(&CrcConfig {
            polynomial: 0x107,
            size_bits: 8,
        })
        .unwrap();
    }

    #[test]
    fn test_transmit_it_lifecycle() {
        static DATA: [u8; 4] = [1, 2, 3, 4];
        let (ram, mut spi) = configured();
        spi.transmit_it(&DATA).unwrap();
        assert_eq!(spi.state(), State::TxActive);
        // another start while active reports busy
        assert_eq!(spi.transmit_it(&DATA), Err(Error::Busy));

        // raise TXP; the handler feeds one frame per service
        for i in 0..4 {
            unsafe {
                cinder_ll::mmio::write_reg(ram.as_ptr() as usize + 0x14, SpiFlags::TXP.bits());
            }
            spi.irq_handler();
            assert_eq!(ram[0x20 / 4] & 0xFF, u32::from(DATA[i]));
        }
        // buffer exhausted: TXP interrupt is off, EOT finishes
        unsafe {
            cinder_ll::mmio::write_reg(ram.as_ptr() as usize + 0x14, SpiFlags::EOT.bits());
        }
        spi.irq_handler();
        assert_eq!(spi.state(), State::Idle);
    }

    #[test]
    fn test_irq_error_moves_to_fault() {
        static DATA: [u8; 2] = [9, 9];
        let (ram, mut spi) = configured();
        spi.transmit_it(&DATA).unwrap();
        unsafe {
            cinder_ll::mmio::write_reg(ram.as_ptr() as usize + 0x14, SpiFlags::OVR.bits());
        }
        // OVR enable came in through ERRORS
        spi.irq_handler();
        assert_eq!(spi.state(), State::Fault);
        #[cfg(feature = "get-last-errors")]
        assert!(spi.last_errors().contains(SpiError::OVERRUN));
        // reconfiguring recovers
        spi.set_config(&SpiConfig::default()).unwrap();
        assert_eq!(spi.state(), State::Idle);
    }

    #[test]
    fn test_abort_returns_to_idle() {
        static DATA: [u8; 2] = [0, 0];
        let (_ram, mut spi) = configured();
        spi.transmit_it(&DATA).unwrap();
        spi.abort().unwrap();
        assert_eq!(spi.state(), State::Idle);
        #[cfg(feature = "get-last-errors")]
        assert!(spi.last_errors().contains(SpiError::ABORT));
        // aborting while idle is rejected
        assert_eq!(spi.abort(), Err(Error::InvalidParam));
    }

    #[cfg(feature = "mutex")]
    #[test]
    fn test_bus_lock() {
        let (_ram, spi) = ram_spi();
        spi.acquire_bus().unwrap();
        assert_eq!(spi.acquire_bus(), Err(Error::Busy));
        spi.release_bus();
        assert!(spi.acquire_bus().is_ok());
    }
}
