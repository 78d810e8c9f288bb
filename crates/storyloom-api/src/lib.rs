//! Storyloom API — HTTP surface of the story progression engine.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
