//! GuiSoundManager: one-shot UI sound effects, dual-sink mirrored
//!
//! Grounded on Kodi's `CGUIAudioManager` (guilib/GUIAudioManager.cpp).
//! Loading `sounds.xml` and resolving skin resource paths is the explicit
//! non-goal "UI sound manager's XML/file loading" (spec section 1) — this
//! module only owns the in-scope part: mapping action IDs and window
//! events to preloaded sound handles, deduplicating repeated loads of the
//! same file, and firing playback on both engine slots.
//!
//! The source dedups by filename through a `soundCache` keyed map with a
//! manual usage counter, decremented in `FreeSound` and evicted at zero.
//! Rust's `Rc`/`Weak` already model exactly that lifetime: every live
//! registration holds a strong `Rc`, the cache holds only a `Weak`, and a
//! sound is freed the moment its last registration (action, window event,
//! or cached python sound) drops.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::engine::AudioEngineFactory;
use crate::types::EngineSlot;

/// One loaded sound: a primary sink handle and, when dual-output is
/// enabled, a mirrored secondary handle.
pub struct CachedSound {
    primary: RefCell<Box<dyn crate::sink::AudioSink>>,
    secondary: Option<RefCell<Box<dyn crate::sink::AudioSink>>>,
}

impl CachedSound {
    /// Fire-and-forget playback: resume both handles from their preloaded
    /// sample. Decoding/loading the underlying file happened inside the
    /// engine's `MakeSound` — out of scope here.
    fn play(&self, audio2_enabled: bool) {
        self.primary.borrow_mut().resume();
        if audio2_enabled {
            if let Some(secondary) = self.secondary.as_ref() {
                secondary.borrow_mut().resume();
            }
        }
    }

    fn stop(&self) {
        self.primary.borrow_mut().pause();
        if let Some(secondary) = self.secondary.as_ref() {
            secondary.borrow_mut().pause();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowSoundEvent {
    Activate,
    Deactivate,
}

#[derive(Default)]
struct WindowSounds {
    activate: Option<Rc<CachedSound>>,
    deactivate: Option<Rc<CachedSound>>,
}

/// Maps action IDs and window events to preloaded one-shot sounds.
pub struct GuiSoundManager<'f> {
    factory: &'f AudioEngineFactory,
    enabled: bool,
    audio2_enabled: bool,
    sound_cache: HashMap<String, Weak<CachedSound>>,
    action_sounds: HashMap<i32, Rc<CachedSound>>,
    window_sounds: HashMap<i32, WindowSounds>,
    python_sounds: HashMap<String, Rc<CachedSound>>,
}

impl<'f> GuiSoundManager<'f> {
    pub fn new(factory: &'f AudioEngineFactory) -> Self {
        Self {
            factory,
            enabled: false,
            audio2_enabled: false,
            sound_cache: HashMap::new(),
            action_sounds: HashMap::new(),
            window_sounds: HashMap::new(),
            python_sounds: HashMap::new(),
        }
    }

    /// Forced off whenever no sound skin is selected; the caller (which
    /// owns the out-of-scope XML loader) drives this.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_audio2_enabled(&mut self, enabled: bool) {
        self.audio2_enabled = enabled;
    }

    /// Load (or reuse a cached) sound for `file`, opening it on the
    /// primary slot and, if dual-output is enabled, the secondary slot too
    /// (S4: a secondary-slot failure here just means no mirrored handle,
    /// never a failed load).
    fn load_sound(&mut self, file: &str) -> Option<Rc<CachedSound>> {
        if let Some(existing) = self.sound_cache.get(file).and_then(Weak::upgrade) {
            return Some(existing);
        }

        let primary = self.factory.make_sound(file, EngineSlot::Primary)?;
        let secondary = if self.audio2_enabled {
            self.factory.make_sound(file, EngineSlot::Secondary).map(RefCell::new)
        } else {
            None
        };

        let cached = Rc::new(CachedSound { primary: RefCell::new(primary), secondary });
        self.sound_cache.insert(file.to_string(), Rc::downgrade(&cached));
        Some(cached)
    }

    /// Register a sound for an action ID (would be called once per
    /// `<action>` entry by the out-of-scope XML loader).
    pub fn register_action_sound(&mut self, action_id: i32, file: &str) {
        if let Some(sound) = self.load_sound(file) {
            self.action_sounds.insert(action_id, sound);
        }
    }

    pub fn register_window_sound(&mut self, window_id: i32, event: WindowSoundEvent, file: &str) {
        let Some(sound) = self.load_sound(file) else { return };
        let entry = self.window_sounds.entry(window_id).or_default();
        match event {
            WindowSoundEvent::Activate => entry.activate = Some(sound),
            WindowSoundEvent::Deactivate => entry.deactivate = Some(sound),
        }
    }

    /// `PlayActionSound`: no-op when disabled (passthrough active, or no
    /// skin selected) or the action has no registered sound.
    pub fn play_action_sound(&self, action_id: i32) {
        if !self.enabled {
            return;
        }
        if let Some(sound) = self.action_sounds.get(&action_id) {
            sound.play(self.audio2_enabled);
        }
    }

    /// `PlayWindowSound`.
    pub fn play_window_sound(&self, window_id: i32, event: WindowSoundEvent) {
        if !self.enabled {
            return;
        }
        let Some(sounds) = self.window_sounds.get(&window_id) else { return };
        let sound = match event {
            WindowSoundEvent::Activate => sounds.activate.as_ref(),
            WindowSoundEvent::Deactivate => sounds.deactivate.as_ref(),
        };
        if let Some(sound) = sound {
            sound.play(self.audio2_enabled);
        }
    }

    /// `PlayPythonSound`: plays a sound addressed directly by file path,
    /// used by script-triggered plays. `use_cached = false` forces a fresh
    /// load even if one is already cached under this filename.
    pub fn play_python_sound(&mut self, file: &str, use_cached: bool) {
        if !self.enabled {
            return;
        }

        if use_cached {
            if let Some(sound) = self.python_sounds.get(file) {
                sound.play(self.audio2_enabled);
                return;
            }
        } else {
            self.python_sounds.remove(file);
        }

        if let Some(sound) = self.load_sound(file) {
            sound.play(self.audio2_enabled);
            self.python_sounds.insert(file.to_string(), sound);
        }
    }

    /// `Stop`: halts every currently registered sound without unloading
    /// the cache.
    pub fn stop_all(&self) {
        for sound in self.action_sounds.values() {
            sound.stop();
        }
        for sounds in self.window_sounds.values() {
            if let Some(s) = sounds.activate.as_ref() {
                s.stop();
            }
            if let Some(s) = sounds.deactivate.as_ref() {
                s.stop();
            }
        }
        for sound in self.python_sounds.values() {
            sound.stop();
        }
    }

    /// `UnLoad`: drops every registration. Sounds whose only remaining
    /// strong reference was here are freed immediately (the `Weak` in
    /// `sound_cache` simply fails to upgrade on the next `load_sound`).
    pub fn unload(&mut self) {
        self.action_sounds.clear();
        self.window_sounds.clear();
        self.python_sounds.clear();
        self.sound_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OutputConfig;

    fn factory_with_stub_engine() -> AudioEngineFactory {
        use crate::error::CoreResult;
        use crate::types::AudioFormat;

        struct StubEngine;
        impl crate::engine::Engine for StubEngine {
            fn can_init(&self) -> bool {
                true
            }
            fn open_stream(&mut self, _format: &AudioFormat) -> CoreResult<Box<dyn crate::sink::AudioSink>> {
                unreachable!("gui sounds never open streams")
            }
            fn open_sound(&mut self, _file: &str) -> CoreResult<Box<dyn crate::sink::AudioSink>> {
                Ok(Box::new(crate::sink::test_support::MemSink::new(
                    crate::sink::test_support::test_format(),
                )))
            }
            fn supports_raw(&self, _format: &AudioFormat) -> bool {
                false
            }
            fn set_mute(&mut self, _muted: bool) {}
            fn set_volume(&mut self, _volume: f32) {}
        }

        let factory = AudioEngineFactory::new(OutputConfig::BestMatch);
        factory.load(|| Box::new(StubEngine), None::<fn() -> Box<dyn crate::engine::Engine>>);
        factory
    }

    #[test]
    fn disabled_manager_never_plays() {
        let factory = factory_with_stub_engine();
        let mut mgr = GuiSoundManager::new(&factory);
        mgr.register_action_sound(1, "click.wav");
        // enabled defaults to false: playback must be a silent no-op.
        mgr.play_action_sound(1);
    }

    #[test]
    fn repeated_registration_reuses_cached_handle() {
        let factory = factory_with_stub_engine();
        let mut mgr = GuiSoundManager::new(&factory);
        mgr.set_enabled(true);
        mgr.register_action_sound(1, "click.wav");
        mgr.register_window_sound(10, WindowSoundEvent::Activate, "click.wav");
        assert!(Rc::ptr_eq(
            mgr.action_sounds.get(&1).unwrap(),
            mgr.window_sounds.get(&10).unwrap().activate.as_ref().unwrap(),
        ));
    }

    #[test]
    fn unload_clears_every_registration() {
        let factory = factory_with_stub_engine();
        let mut mgr = GuiSoundManager::new(&factory);
        mgr.set_enabled(true);
        mgr.register_action_sound(1, "click.wav");
        mgr.unload();
        assert!(mgr.action_sounds.is_empty());
        assert!(mgr.sound_cache.is_empty());
    }
}
