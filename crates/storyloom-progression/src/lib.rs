//! Storyloom — story progression engine.
//!
//! Drives each story through rounds of PROPOSAL and VOTING phases. Durable
//! deadlines in the store are authoritative; in-memory timers only make
//! transitions happen on time and are rebuilt from the store on startup.

pub mod application;
pub mod config;
pub mod domain;
pub mod locks;
pub mod timers;
