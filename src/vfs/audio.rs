//! PCM WAV framing for the container's audio payload.

use crate::container::AudioTrack;

const HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;

/// Wrap raw PCM bytes in a canonical 44-byte RIFF/WAVE header.
pub fn wrap_wav(track: &AudioTrack) -> Vec<u8> {
    let data_len = track.data.len() as u32;
    let block_align = track.channels * BITS_PER_SAMPLE / 8;
    let byte_rate = track.sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + track.data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    // PCM format code.
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&track.channels.to_le_bytes());
    out.extend_from_slice(&track.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(&track.data);

    out
}
