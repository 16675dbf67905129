//! Process-wide audio engine lifecycle
//!
//! Grounded on Kodi's `CAEFactory` (cores/AudioEngine/AEFactory.{h,cpp}):
//! a static registry owning the primary and optional secondary engine
//! instance (spec 4.1).

mod factory;

pub use factory::{AudioEngineFactory, CpalEngine, Engine, OutputConfig};
