//! Compressed audio payloads to mono PCM.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::util::downmix_to_mono;
use crate::error::PlaybackError;

/// Decoded chunk audio.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>, // Mono
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

fn extension_hint(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/flac" => Some("flac"),
        _ => None,
    }
}

/// Decode a whole in-memory audio file into mono samples.
///
/// # Errors
/// `PlaybackError::Decode` when the format is unknown, the stream is corrupt
/// or it contains no audio.
pub fn decode(bytes: Vec<u8>, mime_type: &str) -> Result<DecodedAudio, PlaybackError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(mime_type);
    if let Some(extension) = extension_hint(mime_type) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::Decode("no audio track".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(PlaybackError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend(downmix_to_mono(buffer.samples(), spec.channels.count()));
            }
            Err(SymphoniaError::DecodeError(e)) => debug!("Skipping undecodable packet: {}", e),
            Err(e) => return Err(PlaybackError::Decode(e.to_string())),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(PlaybackError::Decode("no audio decoded".to_string()));
    }

    Ok(DecodedAudio { samples, sample_rate })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16-bit PCM WAV file.
    fn wav(channels: u16, sample_rate: u32, frames: &[Vec<i16>]) -> Vec<u8> {
        let data: Vec<u8> = frames.iter().flatten().flat_map(|s| s.to_le_bytes()).collect();
        let block_align = channels * 2;

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out
    }

    #[test]
    fn test_decode_mono_wav() {
        let frames = vec![vec![8192i16]; 800];
        let audio = decode(wav(1, 8000, &frames), "audio/wav").unwrap();

        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples.len(), 800);
        assert!((audio.duration_seconds() - 0.1).abs() < 1e-9);
        assert!((audio.samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stereo_downmixes() {
        let frames = vec![vec![16384i16, 0]; 400];
        let audio = decode(wav(2, 16000, &frames), "audio/wav").unwrap();

        assert_eq!(audio.samples.len(), 400);
        assert!((audio.samples[10] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = decode(b"definitely not audio".to_vec(), "audio/mpeg");
        assert!(matches!(result, Err(PlaybackError::Decode(_))));
    }
}
