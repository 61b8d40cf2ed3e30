//! Shared audio helpers for device setup and sample conversion.

use anyhow::Result;
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

/// Human-readable device name, or "Unknown".
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Pick an output configuration for `target_sample_rate`.
///
/// Only mono or stereo F32 configurations qualify. The first one covering the
/// target rate wins; otherwise the first candidate is clamped to its nearest rate.
///
/// # Errors
/// Returns an error when no F32 mono/stereo configuration exists.
pub fn find_best_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_sample_rate: u32) -> Result<SupportedStreamConfig> {
    let candidates: Vec<SupportedStreamConfigRange> =
        configs.filter(|config| config.channels() <= 2 && config.sample_format() == SampleFormat::F32).collect();

    if let Some(config) = candidates
        .iter()
        .find(|config| (config.min_sample_rate()..=config.max_sample_rate()).contains(&target_sample_rate))
    {
        return Ok((*config).with_sample_rate(target_sample_rate));
    }

    let Some(config) = candidates.first() else {
        anyhow::bail!("No F32 audio output configuration found");
    };
    let rate = target_sample_rate.clamp(config.min_sample_rate(), config.max_sample_rate());
    Ok((*config).with_sample_rate(rate))
}

/// Average interleaved frames of `channels` samples into one mono sample each.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix_to_mono(&[0.5, 1.0, -0.5, -1.0], 2);
        assert_eq!(mono, vec![0.75, -0.75]);
    }

    #[test]
    fn test_downmix_mono_is_copy() {
        assert_eq!(downmix_to_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }
}
