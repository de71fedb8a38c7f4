//! Audio assembly: scratch clips, concatenation and MP3 export.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm};
use std::fs;
use std::path::Path;

use crate::error::PodcastError;

/// LAME needs at most this many bytes to flush its internal buffers.
const FLUSH_BUFFER_BYTES: usize = 7200;

/// Mono 16-bit PCM audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode a raw little-endian 16-bit stream. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.samples.len(), self.sample_rate)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    samples as u64 * 1000 / sample_rate as u64
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Write a clip to a mono 16-bit WAV file.
pub fn write_clip<P: AsRef<Path>>(path: P, clip: &PcmAudio) -> Result<(), PodcastError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &clip.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a clip written by [`write_clip`].
pub fn read_clip<P: AsRef<Path>>(path: P) -> Result<PcmAudio, PodcastError> {
    let mut reader = WavReader::open(path)?;
    let sample_rate = reader.spec().sample_rate;
    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    Ok(PcmAudio::new(samples, sample_rate))
}

/// Concatenate clips in order, appending `gap_ms` of silence after every
/// clip, the last one included.
pub fn assemble_clips(clips: &[PcmAudio], gap_ms: u32, sample_rate: u32) -> Result<PcmAudio, PodcastError> {
    if let Some(clip) = clips.iter().find(|c| c.sample_rate != sample_rate) {
        return Err(PodcastError::Encoding(format!(
            "clip sample rate {} does not match episode rate {}",
            clip.sample_rate, sample_rate
        )));
    }

    let gap_samples = ms_to_samples(gap_ms, sample_rate);
    let total: usize = clips.iter().map(|c| c.samples.len() + gap_samples).sum();

    let mut combined = Vec::with_capacity(total);
    for clip in clips {
        combined.extend_from_slice(&clip.samples);
        combined.resize(combined.len() + gap_samples, 0);
    }

    Ok(PcmAudio::new(combined, sample_rate))
}

/// Map a configured bitrate onto LAME's fixed set.
pub fn lame_bitrate(kbps: u32) -> Result<Bitrate, PodcastError> {
    let bitrate = match kbps {
        64 => Bitrate::Kbps64,
        96 => Bitrate::Kbps96,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(PodcastError::ConfigError(format!(
                "Unsupported MP3 bitrate {} kbps (use 64, 96, 128, 160, 192, 256 or 320)",
                other
            )));
        }
    };
    Ok(bitrate)
}

/// Encode mono PCM to an MP3 byte stream at a constant bitrate.
pub fn encode_mp3(audio: &PcmAudio, bitrate_kbps: u32) -> Result<Vec<u8>, PodcastError> {
    let bitrate = lame_bitrate(bitrate_kbps)?;

    let mut builder = Builder::new()
        .ok_or_else(|| PodcastError::Encoding("failed to allocate LAME encoder".to_string()))?;
    builder.set_num_channels(1).map_err(encoding_error)?;
    builder.set_sample_rate(audio.sample_rate).map_err(encoding_error)?;
    builder.set_brate(bitrate).map_err(encoding_error)?;
    let mut encoder = builder.build().map_err(encoding_error)?;

    let mut mp3 = Vec::with_capacity(
        mp3lame_encoder::max_required_buffer_size(audio.samples.len()) + FLUSH_BUFFER_BYTES,
    );
    encoder
        .encode_to_vec(MonoPcm(&audio.samples), &mut mp3)
        .map_err(encoding_error)?;
    encoder
        .flush_to_vec::<FlushNoGap>(&mut mp3)
        .map_err(encoding_error)?;

    Ok(mp3)
}

/// Encode and write the episode file.
pub fn export_mp3<P: AsRef<Path>>(path: P, audio: &PcmAudio, bitrate_kbps: u32) -> Result<u64, PodcastError> {
    let mp3 = encode_mp3(audio, bitrate_kbps)?;
    fs::write(path.as_ref(), &mp3)?;
    log::info!(
        "Exported {} ({} bytes, {:.1} seconds)",
        path.as_ref().display(),
        mp3.len(),
        audio.duration_seconds()
    );
    Ok(mp3.len() as u64)
}

fn encoding_error(e: impl std::fmt::Debug) -> PodcastError {
    PodcastError::Encoding(format!("{:?}", e))
}

/// Name of the episode file for a topic and date.
pub fn episode_file_name(file_prefix: &str, date: &str) -> String {
    format!("{}-{}.mp3", file_prefix, date)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 24_000;

    fn tone(ms: u32, value: i16) -> PcmAudio {
        PcmAudio::new(vec![value; ms_to_samples(ms, RATE)], RATE)
    }

    #[test]
    fn test_assembled_duration_includes_trailing_gap() {
        let clips = vec![tone(1000, 100), tone(2000, 200)];
        let combined = assemble_clips(&clips, 300, RATE).unwrap();

        assert_eq!(combined.duration_ms(), 3600);
        assert!((combined.duration_seconds() - 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_assembled_layout() {
        let clips = vec![tone(1000, 100), tone(2000, 200)];
        let combined = assemble_clips(&clips, 300, RATE).unwrap();
        let gap = ms_to_samples(300, RATE);

        assert_eq!(combined.samples[0], 100);
        assert_eq!(combined.samples[RATE as usize], 0);
        assert_eq!(combined.samples[RATE as usize + gap], 200);
        assert!(combined.samples[combined.samples.len() - gap..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_assemble_rejects_mismatched_rate() {
        let clips = vec![PcmAudio::new(vec![1, 2], 16_000)];
        assert!(assemble_clips(&clips, 300, RATE).is_err());
    }

    #[test]
    fn test_assemble_empty_is_silent() {
        let combined = assemble_clips(&[], 300, RATE).unwrap();
        assert!(combined.samples.is_empty());
    }

    #[test]
    fn test_from_le_bytes() {
        let audio = PcmAudio::from_le_bytes(&[0x01, 0x00, 0xff, 0xff, 0x07], RATE);
        assert_eq!(audio.samples, vec![1, -1]);
    }

    #[test]
    fn test_clip_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment_0000.wav");
        let clip = PcmAudio::new(vec![0, 1000, -1000, i16::MAX, i16::MIN], RATE);

        write_clip(&path, &clip).unwrap();
        assert_eq!(read_clip(&path).unwrap(), clip);
    }

    #[test]
    fn test_lame_bitrate_mapping() {
        assert!(lame_bitrate(128).is_ok());
        assert!(matches!(lame_bitrate(127), Err(PodcastError::ConfigError(_))));
    }

    #[test]
    fn test_export_mp3_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.mp3");

        let written = export_mp3(&path, &tone(500, 0), 128).unwrap();

        assert!(written > 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), written);
    }

    #[test]
    fn test_episode_file_name() {
        assert_eq!(episode_file_name("glp1-digest", "2025-06-01"), "glp1-digest-2025-06-01.mp3");
    }
}
