//! TTS module for rendering a segmented script with two voices.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{PcmAudio, assemble_clips, read_clip, write_clip};
use crate::config::{HostsConfig, ServicesConfig, SynthesisConfig};
use crate::error::PodcastError;
use crate::pubmed::check_status;
use crate::segment::{ScriptSegment, Speaker};

/// Voice-quality settings sent with every synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl VoiceSettings {
    pub fn from_config(synthesis: &SynthesisConfig) -> Self {
        Self {
            stability: synthesis.stability,
            similarity_boost: synthesis.similarity_boost,
            style: synthesis.style,
            use_speaker_boost: synthesis.use_speaker_boost,
        }
    }
}

/// Fixed mapping from host to voice identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMap {
    host_a: String,
    host_b: String,
}

impl VoiceMap {
    pub fn new(host_a: impl Into<String>, host_b: impl Into<String>) -> Self {
        Self {
            host_a: host_a.into(),
            host_b: host_b.into(),
        }
    }

    pub fn from_hosts(hosts: &HostsConfig) -> Self {
        Self::new(&hosts.host_a_voice, &hosts.host_b_voice)
    }

    /// Get voice ID for a speaker.
    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::HostA => &self.host_a,
            Speaker::HostB => &self.host_b,
        }
    }
}

/// A speech service returning raw little-endian 16-bit mono PCM.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, PodcastError>;
}

/// ElevenLabs text-to-speech client.
pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    sample_rate: u32,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

impl ElevenLabsClient {
    pub fn new(
        services: &ServicesConfig,
        synthesis: &SynthesisConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, PodcastError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(services.speech_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: services.speech_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: services.speech_model.clone(),
            sample_rate: synthesis.sample_rate,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, PodcastError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);
        let output_format = format!("pcm_{}", self.sample_rate);

        let response = self
            .client
            .post(url)
            .query(&[("output_format", output_format.as_str())])
            .header("xi-api-key", self.api_key.trim())
            .json(&SpeechRequest {
                text,
                model_id: &self.model_id,
                voice_settings: settings,
            })
            .send()
            .await?;

        let response = check_status("ElevenLabs", response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Rendered episode waveform.
#[derive(Debug, Clone)]
pub struct RenderedEpisode {
    pub audio: PcmAudio,
    pub segment_count: usize,
}

impl RenderedEpisode {
    pub fn duration_seconds(&self) -> f64 {
        self.audio.duration_seconds()
    }
}

/// Turns script segments into one waveform, one speech request at a time.
pub struct EpisodeSynthesizer<'a> {
    speech: &'a dyn SpeechSynthesizer,
    voices: VoiceMap,
    settings: VoiceSettings,
    sample_rate: u32,
    pause_ms: u32,
    scratch_root: Option<PathBuf>,
}

impl<'a> EpisodeSynthesizer<'a> {
    pub fn new(
        speech: &'a dyn SpeechSynthesizer,
        hosts: &HostsConfig,
        synthesis: &SynthesisConfig,
    ) -> Self {
        Self {
            speech,
            voices: VoiceMap::from_hosts(hosts),
            settings: VoiceSettings::from_config(synthesis),
            sample_rate: synthesis.sample_rate,
            pause_ms: synthesis.pause_ms,
            scratch_root: None,
        }
    }

    /// Create per-run scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Synthesize every segment and assemble the episode.
    ///
    /// `on_segment` is called with the zero-based index and total before
    /// each request. The scratch directory is removed when this returns,
    /// whether or not synthesis succeeded.
    pub async fn render<F>(
        &self,
        segments: &[ScriptSegment],
        on_segment: F,
    ) -> Result<RenderedEpisode, PodcastError>
    where
        F: Fn(usize, usize, &ScriptSegment),
    {
        if segments.is_empty() {
            return Err(PodcastError::EmptyScript);
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("studycast-");
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        log::debug!("Rendering {} segments in {}", segments.len(), scratch.path().display());

        for (index, segment) in segments.iter().enumerate() {
            on_segment(index, segments.len(), segment);
            self.render_segment(scratch.path(), index, segment)
                .await
                .map_err(|e| PodcastError::Synthesis {
                    index,
                    source: Box::new(e),
                })?;
        }

        let clips = (0..segments.len())
            .map(|index| read_clip(clip_path(scratch.path(), index)))
            .collect::<Result<Vec<_>, _>>()?;
        let audio = assemble_clips(&clips, self.pause_ms, self.sample_rate)?;

        Ok(RenderedEpisode {
            audio,
            segment_count: segments.len(),
        })
    }

    async fn render_segment(
        &self,
        scratch: &Path,
        index: usize,
        segment: &ScriptSegment,
    ) -> Result<(), PodcastError> {
        let voice_id = self.voices.voice_for(segment.speaker);
        let bytes = self
            .speech
            .synthesize(voice_id, &segment.utterance, &self.settings)
            .await?;

        let clip = PcmAudio::from_le_bytes(&bytes, self.sample_rate);
        write_clip(clip_path(scratch, index), &clip)
    }
}

fn clip_path(scratch: &Path, index: usize) -> PathBuf {
    scratch.join(format!("segment_{:04}.wav", index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use std::sync::Mutex;

    /// Returns as many milliseconds of audio as the utterance's numeric value.
    struct FakeSpeech {
        sample_rate: u32,
        fail_at: Option<usize>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeSpeech {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                sample_rate: 24_000,
                fail_at,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(
            &self,
            voice_id: &str,
            text: &str,
            settings: &VoiceSettings,
        ) -> Result<Vec<u8>, PodcastError> {
            assert_eq!(settings.stability, 0.5);
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((voice_id.to_string(), text.to_string()));
                calls.len() - 1
            };
            if self.fail_at == Some(index) {
                return Err(PodcastError::Service {
                    service: "ElevenLabs",
                    status: 429,
                    body: "quota".to_string(),
                });
            }
            // utterance "1000" -> one second of audio
            let ms: usize = text.parse().unwrap_or(100);
            let samples = ms * self.sample_rate as usize / 1000;
            Ok(vec![1u8; samples * 2])
        }
    }

    fn segments() -> Vec<ScriptSegment> {
        vec![
            ScriptSegment::new(Speaker::HostA, "1000"),
            ScriptSegment::new(Speaker::HostB, "2000"),
        ]
    }

    #[test]
    fn test_speech_request_body() {
        let settings = VoiceSettings::from_config(&default_config().synthesis);
        let body = serde_json::to_value(SpeechRequest {
            text: "Hello",
            model_id: "eleven_monolingual_v1",
            voice_settings: &settings,
        })
        .unwrap();

        assert_eq!(body["text"], "Hello");
        assert_eq!(body["model_id"], "eleven_monolingual_v1");
        assert_eq!(body["voice_settings"]["similarity_boost"], 0.75);
        assert_eq!(body["voice_settings"]["use_speaker_boost"], true);
    }

    #[test]
    fn test_voice_map() {
        let voices = VoiceMap::new("voice-a", "voice-b");
        assert_eq!(voices.voice_for(Speaker::HostA), "voice-a");
        assert_eq!(voices.voice_for(Speaker::HostB), "voice-b");
    }

    #[tokio::test]
    async fn test_render_orders_clips_and_maps_voices() {
        let config = default_config();
        let speech = FakeSpeech::new(None);
        let synthesizer = EpisodeSynthesizer::new(&speech, &config.hosts, &config.synthesis);
        let progress = Mutex::new(Vec::new());

        let episode = synthesizer
            .render(&segments(), |i, total, _| progress.lock().unwrap().push((i, total)))
            .await
            .unwrap();

        assert_eq!(episode.segment_count, 2);
        assert_eq!(episode.audio.duration_ms(), 3600);
        assert_eq!(*progress.lock().unwrap(), vec![(0, 2), (1, 2)]);

        let calls = speech.calls.lock().unwrap();
        assert_eq!(calls[0].0, config.hosts.host_a_voice);
        assert_eq!(calls[1].0, config.hosts.host_b_voice);
        assert_eq!(calls[1].1, "2000");
    }

    #[tokio::test]
    async fn test_render_empty_makes_no_calls() {
        let config = default_config();
        let speech = FakeSpeech::new(None);
        let synthesizer = EpisodeSynthesizer::new(&speech, &config.hosts, &config.synthesis);

        let result = synthesizer.render(&[], |_, _, _| {}).await;

        assert!(matches!(result, Err(PodcastError::EmptyScript)));
        assert!(speech.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_render_aborts_on_first_failure() {
        let config = default_config();
        let speech = FakeSpeech::new(Some(1));
        let synthesizer = EpisodeSynthesizer::new(&speech, &config.hosts, &config.synthesis);
        let mut segs = segments();
        segs.push(ScriptSegment::new(Speaker::HostA, "500"));

        let result = synthesizer.render(&segs, |_, _, _| {}).await;

        assert!(matches!(result, Err(PodcastError::Synthesis { index: 1, .. })));
        assert_eq!(speech.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scratch_directory_removed_after_failure() {
        let config = default_config();
        let root = tempfile::tempdir().unwrap();
        let speech = FakeSpeech::new(Some(1));
        let synthesizer = EpisodeSynthesizer::new(&speech, &config.hosts, &config.synthesis)
            .with_scratch_root(root.path());
        let seen_clips = Mutex::new(0);

        let result = synthesizer
            .render(&segments(), |_, _, _| {
                *seen_clips.lock().unwrap() = count_files(root.path());
            })
            .await;

        assert!(result.is_err());
        // The first clip was on disk while the second was requested.
        assert_eq!(*seen_clips.lock().unwrap(), 1);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_scratch_directory_removed_after_success() {
        let config = default_config();
        let root = tempfile::tempdir().unwrap();
        let speech = FakeSpeech::new(None);
        let synthesizer = EpisodeSynthesizer::new(&speech, &config.hosts, &config.synthesis)
            .with_scratch_root(root.path());

        synthesizer.render(&segments(), |_, _, _| {}).await.unwrap();

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    fn count_files(root: &Path) -> usize {
        std::fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|dir| std::fs::read_dir(dir.path()).unwrap().count())
            .sum()
    }
}
