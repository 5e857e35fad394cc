//! CORDIC driver.
//!
//! Fixed-point calculations through the rotation engine: blocking,
//! zero-overhead (no flag polling, for back-to-back pipelined use) and
//! interrupt-driven.
//!
//! Arguments and results are raw q1.31 or packed q1.15 words exactly as
//! the hardware consumes them.

use cinder_ll::cordic as ll;

use crate::tick::Deadline;
use crate::{Error, Result};

pub use cinder_ll::cordic::{CordicBlock, Count, DataSize, Function, Precision};

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Not initialized.
    Reset,
    /// Initialized, no function configured yet.
    Init,
    /// Configured and ready for a calculation.
    Idle,
    /// Interrupt-driven calculation in progress.
    Active,
    /// Abort requested, waiting for completion.
    Abort,
}

/// Engine configuration applied by [`Cordic::set_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CordicConfig {
    pub function: Function,
    pub precision: Precision,
    /// Scaling factor exponent (0..=7); arguments are divided and
    /// results multiplied by `2^scale`.
    pub scale: u8,
    pub arg_size: DataSize,
    pub result_size: DataSize,
    /// Register writes per calculation.
    pub arg_count: Count,
    /// Register reads per calculation.
    pub result_count: Count,
}

impl Default for CordicConfig {
    /// Sine, 20 iterations, one q1.31 argument and result.
    fn default() -> Self {
        Self {
            function: Function::Sine,
            precision: Precision::Iters20,
            scale: 0,
            arg_size: DataSize::Bits32,
            result_size: DataSize::Bits32,
            arg_count: Count::One,
            result_count: Count::One,
        }
    }
}

#[cfg(feature = "register-callbacks")]
/// Event callback invoked from `irq_handler`.
pub type Callback = fn(&mut Cordic);

#[cfg(feature = "register-callbacks")]
#[derive(Default)]
struct Callbacks {
    calculate_complete: Option<Callback>,
}

/// Interrupt-driven calculation bookkeeping.
#[derive(Default)]
struct Calculation {
    args: Option<&'static [u32]>,
    arg_pos: usize,
    results: Option<&'static mut [u32]>,
    result_pos: usize,
    words_per_arg: usize,
    words_per_result: usize,
}

/// CORDIC driver handle.
pub struct Cordic {
    block: ll::CordicBlock,
    state: State,
    words_per_arg: usize,
    words_per_result: usize,
    calc: Calculation,
    #[cfg(feature = "register-callbacks")]
    callbacks: Callbacks,
    #[cfg(feature = "user-data")]
    user_data: usize,
}

impl Cordic {
    /// Wrap the register block. The driver starts in [`State::Reset`].
    #[must_use]
    pub fn new(block: ll::CordicBlock) -> Self {
        Self {
            block,
            state: State::Reset,
            words_per_arg: 1,
            words_per_result: 1,
            calc: Calculation::default(),
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

    /// Reset the peripheral registers and move to [`State::Init`].
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            State::Active | State::Abort => Err(Error::Busy),
            _ => {
                self.block.reset_registers();
                self.state = State::Init;
                Ok(())
            }
        }
    }

    /// Reset the registers and return to [`State::Reset`].
    pub fn deinit(&mut self) {
        self.block.set_interrupt(false);
        self.block.reset_registers();
        self.calc = Calculation::default();
        self.state = State::Reset;
    }

    /// Apply an engine configuration. Allowed from [`State::Init`] and
    /// [`State::Idle`].
    pub fn set_config(&mut self, config: &CordicConfig) -> Result<()> {
        match self.state {
            State::Init | State::Idle => {}
            State::Reset => return Err(Error::InvalidParam),
            _ => return Err(Error::Busy),
        }
        if config.scale > 7 {
            return Err(Error::InvalidParam);
        }
        self.block
            .set_function_config(config.function, config.precision, config.scale);
        self.block.set_arg_size(config.arg_size);
        self.block.set_result_size(config.result_size);
        self.block.set_arg_count(config.arg_count);
        self.block.set_result_count(config.result_count);

        // packed q1.15 pairs collapse two arguments into one register
        // word, so the word count is one either way; q1.31 needs NARGS
        // writes
        self.words_per_arg = match (config.arg_size, config.arg_count) {
            (DataSize::Bits32, Count::Two) => 2,
            _ => 1,
        };
        self.words_per_result = match (config.result_size, config.result_count) {
            (DataSize::Bits32, Count::Two) => 2,
            _ => 1,
        };
        self.state = State::Idle;
        Ok(())
    }

    /// Read the applied configuration back from the registers.
    pub fn config(&self) -> Result<CordicConfig> {
        if self.state == State::Reset {
            return Err(Error::InvalidParam);
        }
        Ok(CordicConfig {
            function: self.block.function(),
            precision: self.block.precision(),
            scale: self.block.scale(),
            arg_size: self.block.arg_size(),
            result_size: self.block.result_size(),
            arg_count: self.block.arg_count(),
            result_count: self.block.result_count(),
        })
    }

    /// Run `count` calculations, blocking up to `timeout_ms` for each
    /// result. `args` and `results` lengths must match the configured
    /// words-per-calculation.
    pub fn calculate(
        &mut self,
        args: &[u32],
        results: &mut [u32],
        count: usize,
        timeout_ms: u32,
    ) -> Result<()> {
        self.check_buffers(args.len(), results.len(), count)?;
        self.begin_calculation()?;
        let deadline = Deadline::new(timeout_ms);

        let mut arg_iter = args.chunks_exact(self.words_per_arg);
        let mut result_iter = results.chunks_exact_mut(self.words_per_result);
        for _ in 0..count {
            if let Some(calc_args) = arg_iter.next() {
                for &word in calc_args {
                    self.block.write_argument(word);
                }
            }
            loop {
                if self.block.is_result_ready() {
                    break;
                }
                if deadline.expired() {
                    self.state = State::Idle;
                    return Err(Error::Timeout);
                }
            }
            if let Some(calc_results) = result_iter.next() {
                for word in calc_results {
                    *word = self.block.read_result();
                }
            }
        }
        self.state = State::Idle;
        Ok(())
    }

    /// Run `count` calculations without polling the ready flag. Only
    /// sound when the precision is low enough that the AHB read-back
    /// naturally stalls until the result is ready.
    pub fn calculate_zero_overhead(
        &mut self,
        args: &[u32],
        results: &mut [u32],
        count: usize,
    ) -> Result<()> {
        self.check_buffers(args.len(), results.len(), count)?;
        self.begin_calculation()?;

        let mut arg_iter = args.chunks_exact(self.words_per_arg);
        let mut result_iter = results.chunks_exact_mut(self.words_per_result);
        for _ in 0..count {
            if let Some(calc_args) = arg_iter.next() {
                for &word in calc_args {
                    self.block.write_argument(word);
                }
            }
            if let Some(calc_results) = result_iter.next() {
                for word in calc_results {
                    *word = self.block.read_result();
                }
            }
        }
        self.state = State::Idle;
        Ok(())
    }

    /// Start an interrupt-driven run of `count` calculations. The
    /// result-ready interrupt drains results and feeds the next
    /// arguments; completion fires the calculate-complete callback.
    pub fn calculate_it(
        &mut self,
        args: &'static [u32],
        results: &'static mut [u32],
        count: usize,
    ) -> Result<()> {
        self.check_buffers(args.len(), results.len(), count)?;
        self.begin_calculation()?;
        self.state = State::Active;

        self.calc = Calculation {
            args: Some(args),
            arg_pos: 0,
            results: Some(results),
            result_pos: 0,
            words_per_arg: self.words_per_arg,
            words_per_result: self.words_per_result,
        };
        self.block.set_interrupt(true);
        // prime the first calculation; the IRQ feeds the rest
        self.feed_next_args();
        Ok(())
    }

    /// Abort an interrupt-driven run.
    pub fn abort(&mut self) -> Result<()> {
        if self.state != State::Active {
            return Err(Error::InvalidParam);
        }
        self.state = State::Abort;
        self.block.set_interrupt(false);
        // drain any result left in the FIFO so the next run starts
        // clean
        while self.block.is_result_ready() {
            let _ = self.block.read_result();
        }
        self.calc = Calculation::default();
        self.state = State::Idle;
        Ok(())
    }

    /// Service the peripheral interrupt. Call from the CORDIC IRQ.
    pub fn irq_handler(&mut self) {
        if self.state != State::Active {
            return;
        }
        while self.block.is_result_ready() {
            if !self.drain_one_result() {
                break;
            }
        }
        let done = self
            .calc
            .results
            .as_ref()
            .is_some_and(|r| self.calc.result_pos >= r.len());
        if done {
            self.block.set_interrupt(false);
            self.calc = Calculation::default();
            self.state = State::Idle;
            #[cfg(feature = "register-callbacks")]
            if let Some(cb) = self.callbacks.calculate_complete {
                cb(self);
            }
        } else {
            self.feed_next_args();
        }
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
    pub fn set_calculate_complete_callback(&mut self, cb: Option<Callback>) {
        self.callbacks.calculate_complete = cb;
    }

    // --- internals -----------------------------------------------------

    fn check_buffers(&self, arg_words: usize, result_words: usize, count: usize) -> Result<()> {
        if count == 0
            || arg_words != count * self.words_per_arg
            || result_words != count * self.words_per_result
        {
            return Err(Error::InvalidParam);
        }
        Ok(())
    }

    fn begin_calculation(&mut self) -> Result<()> {
        match self.state {
            State::Idle => Ok(()),
            State::Reset | State::Init => Err(Error::InvalidParam),
            _ => Err(Error::Busy),
        }
    }

    fn feed_next_args(&mut self) {
        let words = self.calc.words_per_arg;
        let Some(args) = self.calc.args else { return };
        if self.calc.arg_pos >= args.len() {
            return;
        }
        for &word in &args[self.calc.arg_pos..self.calc.arg_pos + words] {
            self.block.write_argument(word);
        }
        self.calc.arg_pos += words;
    }

    fn drain_one_result(&mut self) -> bool {
        let words = self.calc.words_per_result;
        let block = self.block;
        let Some(results) = self.calc.results.as_deref_mut() else {
            return false;
        };
        if self.calc.result_pos >= results.len() {
            return false;
        }
        for word in &mut results[self.calc.result_pos..self.calc.result_pos + words] {
            *word = block.read_result();
        }
        self.calc.result_pos += words;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_cordic() -> (Box<[u32; 3]>, Cordic) {
        let ram = Box::new([0u32; 3]);
        let cordic = Cordic::new(unsafe { ll::CordicBlock::from_base(ram.as_ptr() as usize) });
        (ram, cordic)
    }

    fn set_ready(ram: &[u32], result: u32) {
        let base = ram.as_ptr() as usize;
        unsafe {
            let csr = cinder_ll::mmio::read_reg(base);
            cinder_ll::mmio::write_reg(base, csr | (1 << 31));
            cinder_ll::mmio::write_reg(base + 8, result);
        }
    }

    #[test]
    fn test_lifecycle() {
        let (_ram, mut cordic) = ram_cordic();
        assert_eq!(cordic.set_config(&CordicConfig::default()), Err(Error::InvalidParam));
        cordic.init().unwrap();
        cordic.set_config(&CordicConfig::default()).unwrap();
        assert_eq!(cordic.state(), State::Idle);
        cordic.deinit();
        assert_eq!(cordic.state(), State::Reset);
    }

    #[test]
    fn test_config_round_trip() {
        let (_ram, mut cordic) = ram_cordic();
        cordic.init().unwrap();
        let config = CordicConfig {
            function: Function::Phase,
            precision: Precision::Iters32,
            scale: 2,
            arg_size: DataSize::Bits32,
            result_size: DataSize::Bits16,
            arg_count: Count::Two,
            result_count: Count::One,
        };
        cordic.set_config(&config).unwrap();
        assert_eq!(cordic.config().unwrap(), config);
    }

    #[test]
    fn test_scale_bounds() {
        let (_ram, mut cordic) = ram_cordic();
        cordic.init().unwrap();
        let config = CordicConfig {
            scale: 8,
            ..CordicConfig::default()
        };
        assert_eq!(cordic.set_config(&config), Err(Error::InvalidParam));
    }

    #[test]
    fn test_calculate_blocking() {
        let (ram, mut cordic) = ram_cordic();
        cordic.init().unwrap();
        cordic.set_config(&CordicConfig::default()).unwrap();
        set_ready(&*ram, 0x3000_0000);

        let mut results = [0u32; 1];
        cordic.calculate(&[0x1000_0000], &mut results, 1, 0).unwrap();
        assert_eq!(results[0], 0x3000_0000);
        // the argument reached WDATA
        assert_eq!(ram[1], 0x1000_0000);
        assert_eq!(cordic.state(), State::Idle);
    }

    #[test]
    fn test_calculate_timeout_without_ready() {
        let (_ram, mut cordic) = ram_cordic();
        cordic.init().unwrap();
        cordic.set_config(&CordicConfig::default()).unwrap();
        let mut results = [0u32; 1];
        assert_eq!(
            cordic.calculate(&[0], &mut results, 1, 0),
            Err(Error::Timeout)
        );
        assert_eq!(cordic.state(), State::Idle);
    }

    #[test]
    fn test_buffer_length_validation() {
        let (_ram, mut cordic) = ram_cordic();
        cordic.init().unwrap();
        cordic
            .set_config(&CordicConfig {
                arg_count: Count::Two,
                ..CordicConfig::default()
            })
            .unwrap();
        let mut results = [0u32; 2];
        // two calculations with two-word arguments need four words
        assert_eq!(
            cordic.calculate(&[0, 0, 0], &mut results, 2, 0),
            Err(Error::InvalidParam)
        );
    }

    #[test]
    fn test_calculate_it_completes_via_irq() {
        static ARGS: [u32; 2] = [0x0100_0000, 0x0200_0000];
        let (ram, mut cordic) = ram_cordic();
        cordic.init().unwrap();
        cordic.set_config(&CordicConfig::default()).unwrap();

        let results: &'static mut [u32] = Box::leak(Box::new([0u32; 2]));
        cordic.calculate_it(&ARGS, results, 2).unwrap();
        assert_eq!(cordic.state(), State::Active);
        // first argument was primed
        assert_eq!(ram[1], 0x0100_0000);

        set_ready(&*ram, 0xAAAA_0001);
        cordic.irq_handler();
        // RRDY stays set in RAM, so the handler drains everything in
        // one pass and completes
        assert_eq!(cordic.state(), State::Idle);
    }

    #[test]
    fn test_abort_from_active() {
        static ARGS: [u32; 1] = [5];
        let (_ram, mut cordic) = ram_cordic();
        cordic.init().unwrap();
        cordic.set_config(&CordicConfig::default()).unwrap();
        let results: &'static mut [u32] = Box::leak(Box::new([0u32; 1]));
        cordic.calculate_it(&ARGS, results, 1).unwrap();
        cordic.abort().unwrap();
        assert_eq!(cordic.state(), State::Idle);
        assert_eq!(cordic.abort(), Err(Error::InvalidParam));
    }
}
