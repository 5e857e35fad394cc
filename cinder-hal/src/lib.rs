//! Cinder HAL
//!
//! Stateful peripheral drivers layered over [`cinder_ll`]. Each driver
//! owns a register block, tracks a lifecycle state machine
//! (reset → init → configured/idle → active) and exposes blocking
//! operations with millisecond timeouts plus interrupt-driven variants
//! serviced from `irq_handler`.
//!
//! ```text
//!   application
//!        |
//!   cinder-hal     handles, states, timeouts, callbacks
//!        |
//!   cinder-ll      register accessors
//!        |
//!     hardware
//! ```
//!
//! Timeouts count ticks from [`tick`], which the application advances
//! from its SysTick interrupt. Optional features:
//!
//! * `register-callbacks`: runtime-registered event callbacks.
//! * `get-last-errors`: sticky per-driver error accumulators.
//! * `user-data`: an opaque user pointer slot per driver.
//! * `mutex`: bus acquire/release built on `critical-section`.
//! * `defmt`: `defmt::Format` on public types.

#![cfg_attr(not(test), no_std)]

pub mod cordic;
pub mod crs;
pub mod dcache;
mod error;
pub mod gfxtim;
pub mod gpio;
#[cfg(feature = "mutex")]
pub mod os;
pub mod spi;
pub mod tick;

pub use error::{Error, Result};

/// Wait-forever marker accepted by every blocking operation.
pub const TIMEOUT_FOREVER: u32 = u32::MAX;
