//! Gapless / crossfaded file-based playback
//!
//! Grounded on Kodi's `PAPlayer` (paplayer/PAPlayer.{h,cpp}).

mod player;
mod stream_info;

pub use player::{MusicPlayer, MusicPlayerConfig, NewStreamInputs, TickOutcome};
pub use stream_info::{AlbumKey, StreamInfo};
