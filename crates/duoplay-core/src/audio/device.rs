//! Audio output device enumeration
//!
//! Backs the factory's `EnumerateDevices` operation (spec 4.1). Listing
//! devices is in scope; presenting them to a user (settings dropdowns,
//! device pickers) is the explicit non-goal "device enumeration UX" —
//! callers outside this crate own that.
//!
//! On Linux, prefers JACK over ALSA when available, for descriptive port
//! names ("system:playback_1" vs. "hw:0,0").

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Host;

use crate::error::{CoreError, CoreResult};

/// Get the preferred audio host for the current platform.
fn preferred_host() -> Host {
    #[cfg(target_os = "linux")]
    {
        if let Some(jack_host) =
            cpal::available_hosts().into_iter().find(|h| *h == cpal::HostId::Jack)
        {
            if let Ok(host) = cpal::host_from_id(jack_host) {
                log::info!("using JACK audio host");
                return host;
            }
        }
        log::info!("JACK not available, using default host (ALSA)");
    }
    cpal::default_host()
}

/// A single enumerated output device.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

/// List every output device the preferred host reports, each with its
/// common supported sample rates and max channel count.
pub fn get_output_devices() -> CoreResult<Vec<AudioDevice>> {
    let host = preferred_host();

    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices: Vec<AudioDevice> = host
        .output_devices()
        .map_err(|e| CoreError::StreamBuildError(e.to_string()))?
        .filter_map(|device| {
            let name = device.name().ok()?;
            let is_default = default_name.as_ref() == Some(&name);

            let configs: Vec<_> = device.supported_output_configs().ok()?.collect();
            if configs.is_empty() {
                return None;
            }

            let mut sample_rates = Vec::new();
            let mut max_channels = 0u16;
            for config in &configs {
                max_channels = max_channels.max(config.channels());
                for rate in [44100, 48000, 88200, 96000, 176400, 192000] {
                    if rate >= config.min_sample_rate().0
                        && rate <= config.max_sample_rate().0
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort_unstable();

            Some(AudioDevice { name, is_default, sample_rates, max_channels })
        })
        .collect();

    if devices.is_empty() {
        return Err(CoreError::NoDevices);
    }
    Ok(devices)
}

pub fn get_default_device() -> CoreResult<AudioDevice> {
    get_output_devices()?.into_iter().find(|d| d.is_default).ok_or(CoreError::NoDevices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_does_not_panic_without_devices() {
        // CI sandboxes often expose zero output devices; this must return
        // an error cleanly rather than panic or hang.
        match get_output_devices() {
            Ok(devices) => assert!(!devices.is_empty()),
            Err(CoreError::NoDevices) => {}
            Err(other) => panic!("unexpected error enumerating devices: {other:?}"),
        }
    }
}
