//! Settings consumed by this crate (spec section 6)
//!
//! Grounded on the teacher's `audio::config` pattern (a plain serde struct
//! with a builder-ish `Default`) but keyed the way the source settings
//! registry names them, so a caller's existing settings store can
//! deserialize straight into this shape. Persistence (where the YAML file
//! lives, how it's edited) is the host application's job; this module only
//! owns the shape and the derived values the core logic needs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::streaming::SyncType;
use crate::types::CodecId;

/// `audiooutput.*`/`audiooutput2.*` passthrough toggles, one set per engine
/// slot (mirrored keys in the settings registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughSettings {
    pub passthrough: bool,
    pub ac3: bool,
    pub dts: bool,
    pub eac3: bool,
    pub truehd: bool,
    pub dtshd: bool,
}

impl Default for PassthroughSettings {
    fn default() -> Self {
        Self { passthrough: false, ac3: true, dts: true, eac3: true, truehd: true, dtshd: true }
    }
}

impl PassthroughSettings {
    /// Whether this slot's settings allow passthrough for `codec`, prior to
    /// consulting the engine's own capability query or the "fixed" output
    /// config override (see `AudioEngineFactory::supports_raw`).
    pub fn allows(&self, codec: CodecId) -> bool {
        if !self.passthrough {
            return false;
        }
        match codec {
            CodecId::Ac3 => self.ac3,
            CodecId::Dts => self.dts,
            CodecId::EAc3 => self.eac3,
            CodecId::TrueHd => self.truehd,
            CodecId::DtsHd => self.dtshd,
            _ => false,
        }
    }
}

/// `audiooutput.config`: whether the overall output is pinned to a single
/// format ("fixed") or follows the source ("best match").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioOutputConfig {
    Fixed,
    BestMatch,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self::BestMatch
    }
}

impl From<AudioOutputConfig> for crate::engine::OutputConfig {
    fn from(cfg: AudioOutputConfig) -> Self {
        match cfg {
            AudioOutputConfig::Fixed => crate::engine::OutputConfig::Fixed,
            AudioOutputConfig::BestMatch => crate::engine::OutputConfig::BestMatch,
        }
    }
}

/// `videoplayer.synctype`: 0=DISCON, 1=SKIPDUP, 2=RESAMPLE, matching the
/// integer the settings registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SyncTypeSetting(pub SyncType);

impl TryFrom<i64> for SyncTypeSetting {
    type Error = String;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self(SyncType::Discon)),
            1 => Ok(Self(SyncType::SkipDup)),
            2 => Ok(Self(SyncType::Resample)),
            other => Err(format!("unknown videoplayer.synctype {other}")),
        }
    }
}

impl From<SyncTypeSetting> for i64 {
    fn from(value: SyncTypeSetting) -> Self {
        match value.0 {
            SyncType::Discon => 0,
            SyncType::SkipDup => 1,
            SyncType::Resample => 2,
        }
    }
}

/// All settings this crate reads, grouped as the registry names them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "audiooutput")]
    pub primary_passthrough: PassthroughSettings,
    #[serde(rename = "audiooutput2")]
    pub secondary_passthrough: PassthroughSettings,
    pub audiooutput_config: AudioOutputConfig,

    pub audiooutput2_enabled: bool,
    pub audiooutput2_mode: Option<String>,

    pub videoplayer_usedisplayasclock: bool,
    pub videoplayer_synctype: SyncTypeSetting,
    pub videoplayer_maxspeedadjust: f64,

    pub musicplayer_crossfade_seconds: f64,
    pub musicplayer_crossfadealbumtracks: bool,

    pub lookandfeel_soundskin: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary_passthrough: PassthroughSettings::default(),
            secondary_passthrough: PassthroughSettings::default(),
            audiooutput_config: AudioOutputConfig::default(),
            audiooutput2_enabled: false,
            audiooutput2_mode: None,
            videoplayer_usedisplayasclock: false,
            videoplayer_synctype: SyncTypeSetting(SyncType::Discon),
            videoplayer_maxspeedadjust: 0.05,
            musicplayer_crossfade_seconds: 0.0,
            musicplayer_crossfadealbumtracks: false,
            lookandfeel_soundskin: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Default config file location, mirroring the teacher's `dirs`-based
    /// per-user config path convention.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("duoplay").join("settings.yaml"))
    }

    pub fn crossfade_ms(&self) -> u32 {
        (self.musicplayer_crossfade_seconds.max(0.0) * 1000.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_yaml() {
        let mut settings = Settings::default();
        settings.musicplayer_crossfade_seconds = 3.0;
        settings.videoplayer_synctype = SyncTypeSetting(SyncType::Resample);

        let text = serde_yaml::to_string(&settings).unwrap();
        let back: Settings = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.crossfade_ms(), 3000);
        assert_eq!(back.videoplayer_synctype.0, SyncType::Resample);
    }

    #[test]
    fn passthrough_settings_require_both_global_and_codec_toggle() {
        let mut s = PassthroughSettings { passthrough: false, ..Default::default() };
        assert!(!s.allows(CodecId::Ac3));
        s.passthrough = true;
        s.ac3 = false;
        assert!(!s.allows(CodecId::Ac3));
        s.ac3 = true;
        assert!(s.allows(CodecId::Ac3));
    }
}
