//! Pipeline orchestration.
//!
//! Runs fetch, generation, segmentation, synthesis and feed publishing in
//! order for one topic.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;

use crate::audio::{episode_file_name, export_mp3};
use crate::config::{Config, TopicProfile};
use crate::error::PodcastError;
use crate::feed::{EpisodeEntry, FeedPublisher};
use crate::pubmed::{LiteratureSearch, StudyFetcher};
use crate::script::{ScriptWriter, build_prompt};
use crate::segment::{SpeakerLabels, require_segments, segment_script};
use crate::study::StudyRecord;
use crate::tts::{EpisodeSynthesizer, SpeechSynthesizer};

const TITLE_PREVIEW_CHARS: usize = 100;

/// Callback for pipeline events.
pub type PipelineCallback = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Literature search is starting.
    FetchStart { topic: String, queries: usize },
    /// Studies were selected.
    StudiesFetched { titles: Vec<String> },
    /// Nothing to talk about this time.
    NoStudies,
    /// The prompt was sent to the text-generation service.
    ScriptRequested { prompt_chars: usize },
    /// The script came back and was split into turns.
    ScriptSegmented { script_chars: usize, segments: usize },
    /// A segment is about to be synthesized.
    SegmentStart {
        index: usize,
        total: usize,
        speaker: String,
    },
    /// The episode audio has been written.
    AudioExported { path: PathBuf, duration_seconds: f64 },
    /// The feed now lists the episode.
    FeedUpdated { path: PathBuf, guid: String },
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// No studies were found; nothing was generated.
    NoStudies,
    Published(PublishedEpisode),
}

/// A successfully produced episode.
#[derive(Debug, Clone)]
pub struct PublishedEpisode {
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
    pub entry: EpisodeEntry,
}

/// External collaborators used by the pipeline.
pub struct Services<'a> {
    pub literature: &'a dyn LiteratureSearch,
    pub writer: &'a dyn ScriptWriter,
    pub speech: &'a dyn SpeechSynthesizer,
}

/// Orchestrates one episode for a topic.
pub struct PodcastPipeline<'a> {
    config: &'a Config,
    topic: &'a TopicProfile,
    services: Services<'a>,
    labels: SpeakerLabels,
    callback: Option<PipelineCallback>,
}

impl<'a> PodcastPipeline<'a> {
    pub fn new(config: &'a Config, topic: &'a TopicProfile, services: Services<'a>) -> Self {
        Self {
            config,
            topic,
            services,
            labels: SpeakerLabels::from_hosts(&config.hosts),
            callback: None,
        }
    }

    /// Set a callback for pipeline events.
    pub fn with_callback(mut self, callback: PipelineCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Run the full pipeline.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunOutcome, PodcastError> {
        let pipeline = &self.config.pipeline;

        // Step 1: studies
        self.emit_event(PipelineEvent::FetchStart {
            topic: self.topic.name.clone(),
            queries: self.topic.search_queries.len(),
        });
        let fetcher = StudyFetcher::new(self.services.literature, pipeline);
        let studies = fetcher.fetch(&self.topic.search_queries).await?;

        if studies.is_empty() {
            self.emit_event(PipelineEvent::NoStudies);
            return Ok(RunOutcome::NoStudies);
        }
        self.emit_event(PipelineEvent::StudiesFetched {
            titles: studies.iter().map(|s| s.title.clone()).collect(),
        });

        // Step 2: script
        let script = self.generate_script(&studies).await?;

        // Step 3: audio
        let segments = require_segments(segment_script(&script, &self.labels))?;
        self.emit_event(PipelineEvent::ScriptSegmented {
            script_chars: script.chars().count(),
            segments: segments.len(),
        });

        let date = now.format("%Y-%m-%d").to_string();
        let file_name = episode_file_name(&self.topic.file_prefix, &date);
        fs::create_dir_all(&pipeline.episodes_dir)?;
        let audio_path = pipeline.episodes_dir.join(&file_name);

        let synthesizer = EpisodeSynthesizer::new(
            self.services.speech,
            &self.config.hosts,
            &self.config.synthesis,
        );
        let rendered = synthesizer
            .render(&segments, |index, total, segment| {
                self.emit_event(PipelineEvent::SegmentStart {
                    index,
                    total,
                    speaker: self.labels.label(segment.speaker).to_string(),
                });
            })
            .await?;

        export_mp3(&audio_path, &rendered.audio, self.config.synthesis.bitrate_kbps)?;
        let duration_seconds = rendered.duration_seconds();
        self.emit_event(PipelineEvent::AudioExported {
            path: audio_path.clone(),
            duration_seconds,
        });

        // Step 4: feed
        let publisher = FeedPublisher::new(
            self.config.feed.clone(),
            &pipeline.feed_path,
            &pipeline.episodes_dir,
        );
        let entry = publisher.publish(
            &format!("{} - {}", self.topic.show_title, date),
            &episode_description(&studies),
            &file_name,
            duration_seconds,
            now,
        )?;
        self.emit_event(PipelineEvent::FeedUpdated {
            path: pipeline.feed_path.clone(),
            guid: entry.guid.clone(),
        });

        Ok(RunOutcome::Published(PublishedEpisode {
            audio_path,
            duration_seconds,
            entry,
        }))
    }

    async fn generate_script(&self, studies: &[StudyRecord]) -> Result<String, PodcastError> {
        let prompt = build_prompt(
            &self.config.prompts.script_template,
            self.topic,
            &self.labels,
            studies,
        );
        self.emit_event(PipelineEvent::ScriptRequested {
            prompt_chars: prompt.chars().count(),
        });

        let script = self
            .services
            .writer
            .write_script(&prompt, self.config.services.generation_max_tokens)
            .await?;

        let debug_path = &self.config.pipeline.script_debug_path;
        if let Err(e) = fs::write(debug_path, &script) {
            log::warn!("Could not save script to {}: {}", debug_path.display(), e);
        }
        log::info!("Script generated: {} characters", script.chars().count());
        Ok(script)
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Episode description built from the covered study titles.
pub fn episode_description(studies: &[StudyRecord]) -> String {
    let titles: Vec<String> = studies
        .iter()
        .map(|s| s.title.chars().take(TITLE_PREVIEW_CHARS).collect())
        .collect();
    format!("This week's research roundup covers: {}", titles.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::feed::FeedDocument;
    use crate::tts::VoiceSettings;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    struct FakeLiterature {
        ids: Vec<&'static str>,
    }

    #[async_trait]
    impl LiteratureSearch for FakeLiterature {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>, PodcastError> {
            Ok(self.ids.iter().map(|s| s.to_string()).collect())
        }

        async fn fetch_records(&self, ids: &[String]) -> Result<Vec<StudyRecord>, PodcastError> {
            Ok(ids
                .iter()
                .map(|id| StudyRecord {
                    title: format!("Study {}", id),
                    abstract_text: "Abstract".to_string(),
                    link: String::new(),
                    published: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
                })
                .collect())
        }
    }

    struct FakeWriter {
        script: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScriptWriter for FakeWriter {
        async fn write_script(&self, prompt: &str, max_tokens: u32) -> Result<String, PodcastError> {
            assert_eq!(max_tokens, 4096);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.script.to_string())
        }
    }

    struct FakeSpeech {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(
            &self,
            _voice_id: &str,
            _text: &str,
            _settings: &VoiceSettings,
        ) -> Result<Vec<u8>, PodcastError> {
            *self.calls.lock().unwrap() += 1;
            // 500 ms of silence at 24 kHz
            Ok(vec![0u8; 24_000])
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = default_config();
        config.pipeline.request_pause_ms = 0;
        config.pipeline.episodes_dir = dir.join("episodes");
        config.pipeline.feed_path = dir.join("feed.xml");
        config.pipeline.script_debug_path = dir.join("latest_script.txt");
        config
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_run_publishes_episode() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let topic = config.select_topic(None).unwrap();
        let literature = FakeLiterature { ids: vec!["1", "2"] };
        let writer = FakeWriter {
            script: "Sure! Here's the script.\n\nDan: Welcome.\nAlex: Hi Dan.\nDan: Let's begin.",
            prompts: Mutex::new(Vec::new()),
        };
        let speech = FakeSpeech { calls: Mutex::new(0) };
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let pipeline = PodcastPipeline::new(
            &config,
            topic,
            Services {
                literature: &literature,
                writer: &writer,
                speech: &speech,
            },
        )
        .with_callback(Box::new(move |event| sink.lock().unwrap().push(event)));

        let outcome = pipeline.run(now()).await.unwrap();

        let RunOutcome::Published(episode) = outcome else {
            panic!("expected a published episode");
        };
        assert_eq!(*speech.calls.lock().unwrap(), 3);
        // 3 x (500 ms + 300 ms)
        assert!((episode.duration_seconds - 2.4).abs() < 1e-9);
        assert_eq!(
            episode.audio_path,
            dir.path().join("episodes/glp1-digest-2025-06-02.mp3")
        );
        assert!(episode.audio_path.exists());
        assert_eq!(episode.entry.title, "The GLP-1 Research Digest - 2025-06-02");
        assert_eq!(
            episode.entry.description,
            "This week's research roundup covers: Study 1; Study 2"
        );
        assert!(episode.entry.enclosure_length > 0);

        let feed = FeedDocument::load(dir.path().join("feed.xml")).unwrap();
        assert_eq!(feed.episodes(), vec![episode.entry.clone()]);

        let saved = fs::read_to_string(dir.path().join("latest_script.txt")).unwrap();
        assert!(saved.starts_with("Sure!"));
        assert!(writer.prompts.lock().unwrap()[0].contains("Title: Study 1"));

        let events = events.lock().unwrap();
        let segment_events = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::SegmentStart { .. }))
            .count();
        assert_eq!(segment_events, 3);
        assert!(matches!(events.last(), Some(PipelineEvent::FeedUpdated { .. })));
    }

    #[tokio::test]
    async fn test_run_without_studies_returns_early() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let topic = config.select_topic(Some("menopause")).unwrap();
        let literature = FakeLiterature { ids: vec![] };
        let writer = FakeWriter {
            script: "",
            prompts: Mutex::new(Vec::new()),
        };
        let speech = FakeSpeech { calls: Mutex::new(0) };

        let pipeline = PodcastPipeline::new(
            &config,
            topic,
            Services {
                literature: &literature,
                writer: &writer,
                speech: &speech,
            },
        );

        let outcome = pipeline.run(now()).await.unwrap();

        assert!(matches!(outcome, RunOutcome::NoStudies));
        assert!(writer.prompts.lock().unwrap().is_empty());
        assert!(!dir.path().join("feed.xml").exists());
    }

    #[tokio::test]
    async fn test_run_with_unlabeled_script_aborts_before_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let topic = config.select_topic(None).unwrap();
        let literature = FakeLiterature { ids: vec!["1"] };
        let writer = FakeWriter {
            script: "HOST 1: this uses the wrong labels",
            prompts: Mutex::new(Vec::new()),
        };
        let speech = FakeSpeech { calls: Mutex::new(0) };

        let pipeline = PodcastPipeline::new(
            &config,
            topic,
            Services {
                literature: &literature,
                writer: &writer,
                speech: &speech,
            },
        );

        let result = pipeline.run(now()).await;

        assert!(matches!(result, Err(PodcastError::EmptyScript)));
        assert_eq!(*speech.calls.lock().unwrap(), 0);
        assert!(!dir.path().join("feed.xml").exists());
    }

    #[test]
    fn test_episode_description_truncates_titles() {
        let long = StudyRecord {
            title: "é".repeat(150),
            abstract_text: String::new(),
            link: String::new(),
            published: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let description = episode_description(&[long]);
        let covered = description.trim_start_matches("This week's research roundup covers: ");
        assert_eq!(covered.chars().count(), 100);
    }
}
