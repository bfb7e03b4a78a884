// Audio mixer for the composed stream's audio tracks
//
// The composed stream carries system audio and microphone as independent
// tracks; the muxer writes a single audio lane. Frames are buffered per
// track, and each mix step takes one frame from every track that has one
// and sums their samples with clipping. Every source stamps frames from its
// own open time, so timestamps are only compared within a track.

use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

use crate::media::{AudioFrame, AudioStreamSource};

/// Configuration for the audio mixer
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Sample rate every input must match
    pub sample_rate: u32,
    /// Channel count every input must match
    pub channels: u16,
    /// Frames older than this behind their track's mix position are dropped
    pub max_buffer_delay_ms: u64,
}

impl MixerConfig {
    /// Mixer format taken from the first frame seen
    pub fn from_frame(frame: &AudioFrame) -> Self {
        Self {
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            max_buffer_delay_ms: 200,
        }
    }
}

/// Mixes frames from any number of tracks into one lane
pub struct AudioMixer {
    config: MixerConfig,
    /// Pending frames keyed by track index in the composed stream
    buffers: BTreeMap<usize, VecDeque<AudioFrame>>,
    /// Newest mixed timestamp per track, on that track's clock
    positions: BTreeMap<usize, u64>,
}

impl AudioMixer {
    pub fn new(config: MixerConfig) -> Self {
        debug!(
            "Audio mixer initialized: {}Hz, {} channels",
            config.sample_rate, config.channels
        );

        Self {
            config,
            buffers: BTreeMap::new(),
            positions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Buffer a frame from track `track`
    pub fn push(&mut self, track: usize, frame: AudioFrame) {
        if frame.sample_rate != self.config.sample_rate || frame.channels != self.config.channels {
            warn!(
                "Track {} format {}Hz/{}ch does not match mix {}Hz/{}ch, dropping frame",
                track,
                frame.sample_rate,
                frame.channels,
                self.config.sample_rate,
                self.config.channels
            );
            return;
        }

        self.buffers.entry(track).or_default().push_back(frame);
        self.cleanup_old_frames();
    }

    /// Mix everything buffered so far
    pub fn drain(&mut self) -> Vec<AudioFrame> {
        let mut mixed = Vec::new();
        while let Some(frame) = self.mix_next_chunk() {
            mixed.push(frame);
        }
        mixed
    }

    fn cleanup_old_frames(&mut self) {
        for (track, buffer) in &mut self.buffers {
            let Some(&position) = self.positions.get(track) else {
                continue;
            };
            let cutoff = position.saturating_sub(self.config.max_buffer_delay_ms);
            while buffer.front().is_some_and(|f| f.timestamp_ms < cutoff) {
                warn!(
                    "Dropping stale frame from track {} (track position {}ms)",
                    track, position
                );
                buffer.pop_front();
            }
        }
    }

    fn mix_next_chunk(&mut self) -> Option<AudioFrame> {
        let mut frames = Vec::new();
        for (track, buffer) in &mut self.buffers {
            if let Some(frame) = buffer.pop_front() {
                let position = self.positions.entry(*track).or_insert(0);
                *position = (*position).max(frame.timestamp_ms);
                frames.push(frame);
            }
        }

        match frames.len() {
            0 => None,
            1 => frames.pop(),
            _ => Some(self.mix_frames(&frames)),
        }
    }

    /// Sum samples with clipping; output takes the earliest timestamp and
    /// the longest length
    fn mix_frames(&self, frames: &[AudioFrame]) -> AudioFrame {
        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);

        let samples = (0..max_len)
            .map(|i| {
                let sum: i32 = frames
                    .iter()
                    .map(|f| f.samples.get(i).copied().unwrap_or(0) as i32)
                    .sum();
                sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
            })
            .collect();

        let source = if frames.iter().any(|f| f.source == AudioStreamSource::Microphone) {
            AudioStreamSource::Microphone
        } else {
            AudioStreamSource::System
        };

        AudioFrame {
            samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, timestamp_ms: u64, source: AudioStreamSource) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms,
            source,
        }
    }

    fn mixer() -> AudioMixer {
        AudioMixer::new(MixerConfig {
            sample_rate: 16000,
            channels: 1,
            max_buffer_delay_ms: 200,
        })
    }

    #[test]
    fn test_single_track_passes_through() {
        let mut mixer = mixer();
        mixer.push(0, frame(vec![1, 2, 3], 0, AudioStreamSource::System));
        let out = mixer.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples, vec![1, 2, 3]);
    }

    #[test]
    fn test_mix_equal_length() {
        let mut mixer = mixer();
        mixer.push(0, frame(vec![100, 200, 300], 0, AudioStreamSource::System));
        mixer.push(1, frame(vec![50, 100, 150], 0, AudioStreamSource::Microphone));

        let out = mixer.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples, vec![150, 300, 450]);
        assert_eq!(out[0].source, AudioStreamSource::Microphone);
    }

    #[test]
    fn test_mix_with_clipping() {
        let mut mixer = mixer();
        mixer.push(0, frame(vec![i16::MAX - 100, i16::MIN + 10], 0, AudioStreamSource::System));
        mixer.push(1, frame(vec![200, -50], 0, AudioStreamSource::Microphone));

        let out = mixer.drain();
        assert_eq!(out[0].samples, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_mix_different_lengths() {
        let mut mixer = mixer();
        mixer.push(0, frame(vec![100, 200], 0, AudioStreamSource::System));
        mixer.push(1, frame(vec![50, 100, 150, 200], 0, AudioStreamSource::Microphone));

        let out = mixer.drain();
        assert_eq!(out[0].samples, vec![150, 300, 150, 200]);
    }

    #[test]
    fn test_uneven_buffers_drain_completely() {
        let mut mixer = mixer();
        mixer.push(0, frame(vec![1], 0, AudioStreamSource::System));
        mixer.push(0, frame(vec![2], 100, AudioStreamSource::System));
        mixer.push(1, frame(vec![10], 0, AudioStreamSource::Microphone));

        let out = mixer.drain();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].samples, vec![11]);
        assert_eq!(out[1].samples, vec![2]);
        assert!(mixer.drain().is_empty());
    }

    fn sample_sum(frames: &[AudioFrame]) -> i64 {
        frames
            .iter()
            .flat_map(|f| f.samples.iter())
            .map(|s| *s as i64)
            .sum()
    }

    #[test]
    fn test_tracks_on_offset_clocks_are_all_mixed() {
        // System audio opened 500ms before the microphone, and the mic
        // delivers one frame behind
        let mut mixer = mixer();
        let mut mixed_samples = 0i64;
        for i in 0..50u64 {
            mixer.push(0, frame(vec![0; 4], 500 + i * 20, AudioStreamSource::System));
            if i > 0 {
                mixer.push(1, frame(vec![1; 4], (i - 1) * 20, AudioStreamSource::Microphone));
            }
            if i % 5 == 4 {
                mixed_samples += sample_sum(&mixer.drain());
            }
        }
        mixer.push(1, frame(vec![1; 4], 49 * 20, AudioStreamSource::Microphone));
        mixed_samples += sample_sum(&mixer.drain());

        assert_eq!(mixed_samples, 50 * 4, "every microphone frame reaches the mix");
    }

    #[test]
    fn test_frame_behind_its_own_track_is_dropped() {
        let mut mixer = mixer();
        mixer.push(0, frame(vec![1], 1000, AudioStreamSource::System));
        assert_eq!(mixer.drain().len(), 1);

        mixer.push(0, frame(vec![2], 500, AudioStreamSource::System));
        assert!(mixer.drain().is_empty());

        // Another track's clock is unaffected by track 0's position
        mixer.push(1, frame(vec![3], 0, AudioStreamSource::Microphone));
        assert_eq!(mixer.drain()[0].samples, vec![3]);
    }

    #[test]
    fn test_mismatched_format_is_dropped() {
        let mut mixer = mixer();
        let mut stereo = frame(vec![1, 1], 0, AudioStreamSource::System);
        stereo.channels = 2;
        mixer.push(0, stereo);
        assert!(mixer.drain().is_empty());
    }
}
