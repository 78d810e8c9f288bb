//! Storyloom Core — shared data model and abstractions.
//!
//! This crate defines the records the progression engine works on, the
//! persistence contract it consumes, and the determinism seams (clock and
//! randomness) it is driven through. It contains no infrastructure code.

pub mod clock;
pub mod command;
pub mod error;
pub mod model;
pub mod rng;
pub mod store;
