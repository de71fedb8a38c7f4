//! Studycast Core Library
//!
//! Provides the research podcast pipeline: literature search, script
//! generation, speaker segmentation, speech synthesis and feed publishing.

pub mod audio;
pub mod config;
pub mod error;
pub mod feed;
pub mod orchestrator;
pub mod pubmed;
pub mod script;
pub mod segment;
pub mod study;
pub mod tts;
pub mod xml;

pub use config::{Config, TopicProfile, default_config};
pub use error::PodcastError;
pub use feed::{EpisodeEntry, FeedDocument, FeedPublisher};
pub use orchestrator::{PipelineEvent, PodcastPipeline, PublishedEpisode, RunOutcome, Services};
pub use pubmed::{LiteratureSearch, PubMedClient, StudyFetcher};
pub use script::{OpenAiScriptWriter, ScriptWriter};
pub use segment::{ScriptSegment, Speaker, SpeakerLabels, segment_script};
pub use study::StudyRecord;
pub use tts::{ElevenLabsClient, EpisodeSynthesizer, SpeechSynthesizer};
