//! Batch resampling of decoded chunks to the output device rate.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

/// Input frames per FFT pass.
const CHUNK_SIZE: usize = 1024;

/// FFT sub-chunks (higher is better quality, more CPU).
const SUB_CHUNKS: usize = 2;

/// Resample mono `samples` from `from_rate` to `to_rate`.
///
/// Blocks are zero-padded for the resampler. The resampler's output delay is
/// skipped at the start and flushed with silent blocks at the end, so the
/// result is aligned with the input and exactly the expected length.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        Fft::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1, FixedSync::Input).context("Failed to create resampler")?;

    let delay = resampler.output_delay();
    let output_frames_max = resampler.output_frames_max();
    let mut block_out = vec![0.0f32; output_frames_max];
    let mut block_in = vec![0.0f32; CHUNK_SIZE];

    let expected_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(delay + expected_len + output_frames_max);

    let mut blocks = samples.chunks(CHUNK_SIZE);
    while output.len() < delay + expected_len {
        match blocks.next() {
            Some(block) => {
                block_in[..block.len()].copy_from_slice(block);
                block_in[block.len()..].fill(0.0);
            }
            None => block_in.fill(0.0),
        }

        let input = InterleavedSlice::new(&block_in, 1, CHUNK_SIZE).context("Failed to create input adapter")?;
        let mut out = InterleavedSlice::new_mut(&mut block_out, 1, output_frames_max).context("Failed to create output adapter")?;

        let (_, frames_written) = resampler.process_into_buffer(&input, &mut out, None).map_err(|e| anyhow::anyhow!("Resampling error: {}", e))?;
        if frames_written == 0 && blocks.len() == 0 {
            break;
        }
        output.extend_from_slice(&block_out[..frames_written]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);
    Ok(output)
}
