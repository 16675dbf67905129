//! Cross-platform device enumeration for the engine factory
//!
//! `cpal` backs device listing here and the `CpalSink`/`CpalEngine`
//! reference backend in [`crate::sink`] and [`crate::engine`]. Building an
//! audio stream for an already-chosen device/format lives with those
//! components; this module only answers "what output devices exist".

mod device;

pub use device::{get_default_device, get_output_devices, AudioDevice};

/// Default sample rate used when no device/stream preference narrows it
/// further — matches the rate most compressed music and video audio
/// tracks are encoded at, minimizing resampling in the common case.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
