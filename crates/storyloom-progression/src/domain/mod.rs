//! Pure domain logic for story progression.

pub mod commands;
pub mod phase;
