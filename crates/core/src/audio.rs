//! PCM helpers and the device-agnostic capture/playback adapters.
//!
//! The wire format on both connections is mono PCM16 at 24 kHz, carried as
//! base64 inside JSON events. The adapters here own no device handles; a
//! host feeds captured frames in and drains playback frames out at whatever
//! cadence its audio stack runs.

use crate::error::RelayError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;

/// Sample rate both realtime backends speak.
pub const WIRE_SAMPLE_RATE: f64 = 24_000.0;

const RESAMPLE_CHUNK: usize = 512;

/// Decodes a base64 PCM16 fragment into samples.
pub fn decode_pcm16(base64_fragment: &str) -> Result<Vec<i16>, RelayError> {
    let bytes = BASE64
        .decode(base64_fragment)
        .map_err(|e| RelayError::MalformedEvent(format!("bad base64 audio: {e}")))?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encodes PCM16 samples as a base64 fragment.
pub fn encode_pcm16(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64.encode(&bytes)
}

pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Playback side of the audio adapter.
///
/// Response audio deltas are queued as they arrive and drained in bounded
/// blocks by the host's output callback. On barge-in everything buffered is
/// discarded so no stale audio plays after the user starts speaking.
#[derive(Debug, Default)]
pub struct Player {
    queue: VecDeque<i16>,
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a base64 response delta for playback.
    pub fn enqueue_delta(&mut self, delta_b64: &str) -> Result<(), RelayError> {
        let samples = decode_pcm16(delta_b64)?;
        self.queue.extend(samples);
        Ok(())
    }

    /// Hands out up to `max_frames` samples for the output device.
    pub fn take_frames(&mut self, max_frames: usize) -> Vec<i16> {
        let n = max_frames.min(self.queue.len());
        self.queue.drain(..n).collect()
    }

    /// Barge-in: drop everything still buffered.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn buffered(&self) -> usize {
        self.queue.len()
    }
}

/// Capture side of the audio adapter.
///
/// Accepts device-rate PCM frames and yields base64 payloads at the wire
/// rate, resampling when the device rate differs. Frames pushed while
/// stopped are discarded.
pub struct Capture {
    resampler: Option<FastFixedIn<f32>>,
    backlog: Vec<f32>,
    active: bool,
}

impl Capture {
    pub fn new(device_rate: f64) -> anyhow::Result<Self> {
        let resampler = if (device_rate - WIRE_SAMPLE_RATE).abs() < f64::EPSILON {
            None
        } else {
            Some(FastFixedIn::<f32>::new(
                WIRE_SAMPLE_RATE / device_rate,
                1.0,
                PolynomialDegree::Cubic,
                RESAMPLE_CHUNK,
                1,
            )?)
        };
        Ok(Self {
            resampler,
            backlog: Vec::new(),
            active: false,
        })
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Stops capture and drops any samples awaiting resampling.
    pub fn reset(&mut self) {
        self.active = false;
        self.backlog.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feeds captured device frames in; returns a wire-rate base64 payload
    /// once enough samples have accumulated, `None` otherwise or while
    /// stopped.
    pub fn push(&mut self, samples: &[i16]) -> anyhow::Result<Option<String>> {
        if !self.active {
            return Ok(None);
        }
        let Some(resampler) = &mut self.resampler else {
            return Ok(Some(encode_pcm16(samples)));
        };

        self.backlog.extend(pcm16_to_f32(samples));
        let mut resampled: Vec<f32> = Vec::new();
        while self.backlog.len() >= resampler.input_frames_next() {
            let take = resampler.input_frames_next();
            let chunk: Vec<f32> = self.backlog.drain(..take).collect();
            let mut out = resampler.process(&[chunk], None)?;
            resampled.append(&mut out[0]);
        }
        if resampled.is_empty() {
            Ok(None)
        } else {
            Ok(Some(encode_pcm16(&f32_to_pcm16(&resampled))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pcm16_round_trips_through_base64() {
        let samples = vec![0i16, 1000, -1000, i16::MAX, i16::MIN];
        assert_eq!(decode_pcm16(&encode_pcm16(&samples)).unwrap(), samples);
    }

    #[test]
    fn bad_base64_is_malformed() {
        assert!(decode_pcm16("!!not base64!!").is_err());
    }

    #[test]
    fn odd_byte_tail_is_ignored() {
        let encoded = BASE64.encode([0x00u8, 0x40, 0x01]);
        assert_eq!(decode_pcm16(&encoded).unwrap(), vec![16384]);
    }

    #[test]
    fn float_conversion_clamps_out_of_range() {
        let clamped = f32_to_pcm16(&[2.0, -2.0, 0.5]);
        assert_eq!(clamped[0], i16::MAX);
        assert_eq!(clamped[1], i16::MIN);
        assert_abs_diff_eq!(
            pcm16_to_f32(&clamped)[2],
            0.5,
            epsilon = 0.001
        );
    }

    #[test]
    fn player_drains_in_arrival_order() {
        let mut player = Player::new();
        player.enqueue_delta(&encode_pcm16(&[1, 2, 3])).unwrap();
        player.enqueue_delta(&encode_pcm16(&[4, 5])).unwrap();
        assert_eq!(player.take_frames(4), vec![1, 2, 3, 4]);
        assert_eq!(player.take_frames(4), vec![5]);
        assert_eq!(player.take_frames(4), Vec::<i16>::new());
    }

    #[test]
    fn clear_flushes_buffered_playback() {
        let mut player = Player::new();
        player.enqueue_delta(&encode_pcm16(&[1; 480])).unwrap();
        assert_eq!(player.buffered(), 480);
        player.clear();
        assert_eq!(player.buffered(), 0);
        assert!(player.take_frames(480).is_empty());
    }

    #[test]
    fn capture_passes_wire_rate_through_unchanged() {
        let mut capture = Capture::new(WIRE_SAMPLE_RATE).unwrap();
        capture.start();
        let frame = vec![100i16; 240];
        let payload = capture.push(&frame).unwrap().unwrap();
        assert_eq!(decode_pcm16(&payload).unwrap(), frame);
    }

    #[test]
    fn capture_discards_frames_while_stopped() {
        let mut capture = Capture::new(WIRE_SAMPLE_RATE).unwrap();
        assert!(capture.push(&[1, 2, 3]).unwrap().is_none());
        capture.start();
        capture.stop();
        assert!(capture.push(&[1, 2, 3]).unwrap().is_none());
    }

    #[test]
    fn capture_downsamples_to_wire_rate() {
        let mut capture = Capture::new(48_000.0).unwrap();
        capture.start();
        // Two seconds' worth of 48 kHz frames, fed in device-sized chunks.
        let mut produced = 0usize;
        for _ in 0..100 {
            let frame = vec![1000i16; 960];
            if let Some(payload) = capture.push(&frame).unwrap() {
                produced += decode_pcm16(&payload).unwrap().len();
            }
        }
        // 96000 input samples at a 0.5 ratio, allow for resampler latency.
        let expected = 48_000.0;
        assert_abs_diff_eq!(produced as f64, expected, epsilon = expected * 0.05);
    }
}
