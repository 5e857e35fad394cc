//! Cinder low-layer (LL) register accessors
//!
//! Stateless, bit-accurate access to STM32U5 peripheral register blocks.
//! Each module wraps one peripheral's block as a `Copy` handle over a base
//! address plus inline accessors; no state is kept and no errors are
//! reported, so callers are responsible for argument validity.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application                            │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  cinder-hal (handles, states, timeouts) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  cinder-ll (this crate - registers)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Register blocks are addressed by value, not by singleton: every block
//! type has an `unsafe fn from_base(usize)` so the HAL can bind hardware
//! instances and host tests can bind RAM-backed blocks.

#![cfg_attr(not(test), no_std)]

pub mod cordic;
pub mod crs;
pub mod dcache;
pub mod gfxtim;
pub mod gpio;
pub mod lpgpio;
pub mod mmio;
pub mod spi;
