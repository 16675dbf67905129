//! AudioEngineFactory: process-wide lifecycle for the primary/secondary engines
//!
//! Grounded on Kodi's `CAEFactory` (cores/AudioEngine/AEFactory.cpp): a
//! static registry owning exactly two engine instances, `AE[0]` (primary)
//! and `AE[1]` (secondary, only when dual-output is enabled).

use std::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::sink::{AudioSink, CpalSink};
use crate::types::{AudioFormat, EngineSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnginePhase {
    Unloaded,
    Loaded,
    Started,
    Suspended,
}

/// Capability/lifecycle interface one process-wide engine instance
/// exposes. `AudioSink` instances it creates are owned by the caller
/// until `free_stream`/`free_sound`.
pub trait Engine: Send {
    fn can_init(&self) -> bool;
    fn open_stream(&mut self, format: &AudioFormat) -> CoreResult<Box<dyn AudioSink>>;
    fn open_sound(&mut self, file: &str) -> CoreResult<Box<dyn AudioSink>>;
    fn supports_raw(&self, format: &AudioFormat) -> bool;
    fn set_mute(&mut self, muted: bool);
    fn set_volume(&mut self, volume: f32);
    fn suspend(&mut self) {}
    fn resume(&mut self) {}
}

/// A `cpal`-backed engine: each `open_stream`/`open_sound` opens the
/// default output device independently (no device-sharing attempted,
/// matching the ambient stack's existing reference sink).
pub struct CpalEngine {
    muted: bool,
    volume: f32,
}

impl CpalEngine {
    pub fn new() -> Self {
        Self { muted: false, volume: 1.0 }
    }
}

impl Default for CpalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for CpalEngine {
    fn can_init(&self) -> bool {
        true
    }

    fn open_stream(&mut self, format: &AudioFormat) -> CoreResult<Box<dyn AudioSink>> {
        let mut sink = CpalSink::open_default(format.clone())?;
        sink.set_volume(if self.muted { 0.0 } else { self.volume });
        Ok(Box::new(sink))
    }

    fn open_sound(&mut self, _file: &str) -> CoreResult<Box<dyn AudioSink>> {
        // One-shot UI sounds reuse the same default-device stream path;
        // decoding the sound file itself is out of scope (AudioDecoder).
        let mut sink = CpalSink::open_default(AudioFormat {
            sample_rate: crate::audio::DEFAULT_SAMPLE_RATE,
            encoded_sample_rate: crate::audio::DEFAULT_SAMPLE_RATE,
            channel_layout: crate::types::ChannelLayout::STEREO,
            sample_format: crate::types::SampleFormat::Float32,
            is_passthrough: false,
            codec_id: crate::types::CodecId::Pcm,
        })?;
        sink.set_volume(if self.muted { 0.0 } else { self.volume });
        Ok(Box::new(sink))
    }

    fn supports_raw(&self, format: &AudioFormat) -> bool {
        !format.is_passthrough || false
    }

    fn set_mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}

/// Whether the overall output configuration is pinned to a single format
/// ("fixed") rather than following the source ("best match" / variable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputConfig {
    Fixed,
    BestMatch,
}

struct Slot {
    phase: EnginePhase,
    engine: Option<Box<dyn Engine>>,
}

impl Slot {
    fn empty() -> Self {
        Self { phase: EnginePhase::Unloaded, engine: None }
    }
}

/// Process-wide registry of the two engine slots. Per I1, at most one
/// engine occupies each slot at a time; per P6, a second `load` without
/// an intervening `unload` is a no-op.
pub struct AudioEngineFactory {
    slots: Mutex<[Slot; 2]>,
    output_config: OutputConfig,
}

impl AudioEngineFactory {
    pub fn new(output_config: OutputConfig) -> Self {
        Self { slots: Mutex::new([Slot::empty(), Slot::empty()]), output_config }
    }

    /// `Load`: instantiates the primary engine unconditionally; the
    /// secondary only if `dual_audio_enabled`. A `CanInit()` failure on
    /// either engine releases only that engine — the factory stays usable
    /// with whichever slot succeeded. Returns `false` (P6) if the primary
    /// slot is already loaded.
    pub fn load(
        &self,
        make_primary: impl FnOnce() -> Box<dyn Engine>,
        make_secondary: Option<impl FnOnce() -> Box<dyn Engine>>,
    ) -> bool {
        let mut slots = self.slots.lock().unwrap();
        if slots[0].phase != EnginePhase::Unloaded {
            return false;
        }

        let primary = make_primary();
        if primary.can_init() {
            slots[0] = Slot { phase: EnginePhase::Loaded, engine: Some(primary) };
        } else {
            log::warn!("primary engine failed CanInit; factory unusable until unload/reload");
        }

        if let Some(make_secondary) = make_secondary {
            let secondary = make_secondary();
            if secondary.can_init() {
                slots[1] = Slot { phase: EnginePhase::Loaded, engine: Some(secondary) };
            } else {
                log::warn!("secondary engine failed CanInit; continuing primary-only");
            }
        }

        true
    }

    pub fn unload(&self) {
        let mut slots = self.slots.lock().unwrap();
        slots[0] = Slot::empty();
        slots[1] = Slot::empty();
    }

    /// `Start`: requires the primary engine to be loaded; the secondary is
    /// best-effort and its absence never fails this call.
    pub fn start(&self) -> CoreResult<()> {
        let mut slots = self.slots.lock().unwrap();
        if slots[0].engine.is_none() {
            return Err(CoreError::EngineInitFailed("primary engine not loaded".into()));
        }
        slots[0].phase = EnginePhase::Started;
        if slots[1].engine.is_some() {
            slots[1].phase = EnginePhase::Started;
        }
        Ok(())
    }

    pub fn suspend(&self) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if let Some(engine) = slot.engine.as_mut() {
                engine.suspend();
                slot.phase = EnginePhase::Suspended;
            }
        }
    }

    pub fn resume(&self) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if let Some(engine) = slot.engine.as_mut() {
                engine.resume();
                slot.phase = EnginePhase::Started;
            }
        }
    }

    pub fn shutdown(&self) {
        self.unload();
    }

    pub fn has_secondary(&self) -> bool {
        self.slots.lock().unwrap()[1].engine.is_some()
    }

    /// `MakeStream`: returns `None` if the requested slot's engine is
    /// absent or rejects the format — callers must treat that as "feature
    /// unavailable for this slot" and continue with the other slot (S4).
    pub fn make_stream(&self, format: &AudioFormat, which: EngineSlot) -> Option<Box<dyn AudioSink>> {
        let mut slots = self.slots.lock().unwrap();
        let slot = &mut slots[which.index()];
        let engine = slot.engine.as_mut()?;
        match engine.open_stream(format) {
            Ok(sink) => Some(sink),
            Err(err) => {
                log::warn!("make_stream failed for slot {:?}: {:?}", which, err);
                None
            }
        }
    }

    pub fn make_sound(&self, file: &str, which: EngineSlot) -> Option<Box<dyn AudioSink>> {
        let mut slots = self.slots.lock().unwrap();
        let slot = &mut slots[which.index()];
        let engine = slot.engine.as_mut()?;
        engine.open_sound(file).ok()
    }

    /// `SupportsRaw`: a "fixed" output config disallows passthrough
    /// regardless of what the engine itself supports.
    pub fn supports_raw(&self, format: &AudioFormat, which: EngineSlot) -> bool {
        if self.output_config == OutputConfig::Fixed && format.is_passthrough {
            return false;
        }
        let slots = self.slots.lock().unwrap();
        slots[which.index()].engine.as_ref().map(|e| e.supports_raw(format)).unwrap_or(false)
    }

    /// `SetMute`/`SetVolume`: apply to both slots. Per the documented open
    /// question (a), each slot's presence is checked independently rather
    /// than assuming the secondary exists whenever the primary does.
    pub fn set_mute(&self, muted: bool) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if let Some(engine) = slot.engine.as_mut() {
                engine.set_mute(muted);
            }
        }
    }

    pub fn set_volume(&self, volume: f32) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            if let Some(engine) = slot.engine.as_mut() {
                engine.set_volume(volume);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEngine {
        can_init: bool,
        sets_volume: Option<f32>,
    }

    impl Engine for StubEngine {
        fn can_init(&self) -> bool {
            self.can_init
        }
        fn open_stream(&mut self, _format: &AudioFormat) -> CoreResult<Box<dyn AudioSink>> {
            Err(CoreError::StreamBuildError("stub engine never opens real streams".into()))
        }
        fn open_sound(&mut self, _file: &str) -> CoreResult<Box<dyn AudioSink>> {
            Err(CoreError::StreamBuildError("stub".into()))
        }
        fn supports_raw(&self, _format: &AudioFormat) -> bool {
            true
        }
        fn set_mute(&mut self, _muted: bool) {}
        fn set_volume(&mut self, volume: f32) {
            self.sets_volume = Some(volume);
        }
    }

    #[test]
    fn second_load_without_unload_is_noop() {
        let factory = AudioEngineFactory::new(OutputConfig::BestMatch);
        let loaded = factory.load(
            || Box::new(StubEngine { can_init: true, sets_volume: None }),
            None::<fn() -> Box<dyn Engine>>,
        );
        assert!(loaded);

        let second = factory.load(
            || Box::new(StubEngine { can_init: true, sets_volume: None }),
            None::<fn() -> Box<dyn Engine>>,
        );
        assert!(!second, "second Load before UnLoad must be a no-op (P6)");
    }

    #[test]
    fn secondary_canin_init_failure_keeps_primary_usable() {
        let factory = AudioEngineFactory::new(OutputConfig::BestMatch);
        factory.load(
            || Box::new(StubEngine { can_init: true, sets_volume: None }),
            Some(|| Box::new(StubEngine { can_init: false, sets_volume: None }) as Box<dyn Engine>),
        );
        assert!(factory.start().is_ok());
        assert!(!factory.has_secondary());
    }

    #[test]
    fn fixed_output_config_disallows_passthrough_regardless_of_engine() {
        let factory = AudioEngineFactory::new(OutputConfig::Fixed);
        factory.load(
            || Box::new(StubEngine { can_init: true, sets_volume: None }),
            None::<fn() -> Box<dyn Engine>>,
        );
        let format = AudioFormat {
            sample_rate: 48000,
            encoded_sample_rate: 48000,
            channel_layout: crate::types::ChannelLayout::STEREO,
            sample_format: crate::types::SampleFormat::Float32,
            is_passthrough: true,
            codec_id: crate::types::CodecId::Ac3,
        };
        assert!(!factory.supports_raw(&format, EngineSlot::Primary));
    }
}
