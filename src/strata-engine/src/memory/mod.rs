//! Memory accounting for persisted frames.

mod manager;

pub use manager::{MemoryManager, MemoryReservation, TrackingMemoryManager};
