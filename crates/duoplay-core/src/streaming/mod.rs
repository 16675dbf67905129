//! Synced streaming playback: the primary/secondary audio thread contract
//!
//! Grounded on `CDVDPlayerAudio` (DVDPlayerAudio.h/.cpp): a message-driven
//! decode loop that keeps a primary `AudioSink` locked to an external
//! reference clock, optionally mirroring output to a secondary sink.

mod player;
mod sync;

pub use player::{PlayerAtomics, StepOutcome, StreamingAudioPlayer};
pub use sync::{DualSinkAction, DualSinkAligner, RefClock, SyncAction, SyncController, SyncType};
