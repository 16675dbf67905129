//! duoplay-core - dual-output audio playback core
//!
//! Time alignment, A/V clock sync, and gapless/crossfaded music playback
//! over two independent audio engine slots. See `types::EngineSlot` for
//! the primary/secondary split that runs through every module here.

pub mod audio;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod gui_sound;
pub mod message;
pub mod music;
pub mod pts_map;
pub mod sink;
pub mod streaming;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::*;
