//! In-process reference engine.

mod config;
mod engine;
mod frame;

pub use config::LocalEngineConfig;
pub use engine::LocalEngine;
pub use frame::LocalFrame;
