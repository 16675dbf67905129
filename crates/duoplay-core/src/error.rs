//! Crate-wide error taxonomy
//!
//! Mirrors the error handling design: transient decode errors and
//! secondary-slot failures are recovered where they occur and never reach
//! this type; only what the spec calls "fatal" conditions surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no audio devices available")]
    NoDevices,

    #[error("engine slot already loaded")]
    AlreadyLoaded,

    #[error("engine failed CanInit check: {0}")]
    EngineInitFailed(String),

    #[error("sink rejected format: {0:?}")]
    UnsupportedFormat(crate::types::AudioFormat),

    #[error("stream build error: {0}")]
    StreamBuildError(String),

    #[error("stream playback error: {0}")]
    StreamPlayError(String),

    #[error("decoder error: {0}")]
    DecoderError(String),

    #[error("message queue aborted")]
    QueueAborted,

    #[error("settings I/O error: {0}")]
    SettingsIo(#[from] std::io::Error),

    #[error("settings parse error: {0}")]
    SettingsParse(#[from] serde_yaml::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
