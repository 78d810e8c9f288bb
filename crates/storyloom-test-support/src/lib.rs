//! Shared test mocks and utilities for the Storyloom progression engine.

mod clock;
mod rng;
mod store;

pub use clock::{FixedClock, ManualClock, TokioClock};
pub use rng::{MockRng, SequenceRng};
pub use store::{FailingStoryStore, InMemoryStoryStore};
