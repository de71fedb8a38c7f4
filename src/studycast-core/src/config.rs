//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PodcastError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Topic key used when the selector is unset or unrecognized.
    pub default_topic: String,
    pub pipeline: PipelineConfig,
    pub services: ServicesConfig,
    pub hosts: HostsConfig,
    pub synthesis: SynthesisConfig,
    pub feed: FeedConfig,
    pub prompts: PromptsConfig,
    pub topics: Vec<TopicProfile>,
}

/// File locations and fetch limits for a single run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_studies: usize,
    /// Results requested per search query.
    pub search_limit: usize,
    /// Courtesy pause between literature requests.
    pub request_pause_ms: u64,
    pub episodes_dir: PathBuf,
    pub feed_path: PathBuf,
    pub script_debug_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_studies: 5,
            search_limit: 10,
            request_pause_ms: 400,
            episodes_dir: PathBuf::from("episodes"),
            feed_path: PathBuf::from("feed.xml"),
            script_debug_path: PathBuf::from("latest_script.txt"),
        }
    }
}

/// Endpoints, models and timeouts of the external services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub search_base: String,
    pub search_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub generation_base: String,
    pub generation_model: String,
    pub generation_max_tokens: u32,
    pub generation_timeout_secs: u64,
    pub speech_base: String,
    pub speech_model: String,
    pub speech_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            search_base: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            search_timeout_secs: 30,
            fetch_timeout_secs: 60,
            generation_base: "https://api.anthropic.com/v1".to_string(),
            generation_model: "claude-sonnet-4-20250514".to_string(),
            generation_max_tokens: 4096,
            generation_timeout_secs: 300,
            speech_base: "https://api.elevenlabs.io".to_string(),
            speech_model: "eleven_monolingual_v1".to_string(),
            speech_timeout_secs: 120,
        }
    }
}

/// Speaker labels and voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostsConfig {
    pub host_a_name: String,
    pub host_b_name: String,
    pub host_a_voice: String,
    pub host_b_voice: String,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            host_a_name: "Dan".to_string(),
            host_b_name: "Alex".to_string(),
            host_a_voice: "pNInz6obpgDQGcFmaJgB".to_string(),
            host_b_voice: "21m00Tcm4TlvDq8ikWAM".to_string(),
        }
    }
}

/// Fixed voice-quality settings and audio layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    /// Sample rate of the PCM stream requested from the speech service.
    pub sample_rate: u32,
    /// Silence appended after every clip.
    pub pause_ms: u32,
    pub bitrate_kbps: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
            sample_rate: 24_000,
            pause_ms: 300,
            bitrate_kbps: 128,
        }
    }
}

/// Channel metadata written once when the feed is created.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub author: String,
    pub summary: String,
    pub explicit: bool,
    pub category: String,
    pub subcategory: String,
    /// Prefix of every episode GUID.
    pub guid_namespace: String,
    /// Public location the episodes directory is served from.
    pub enclosure_base_url: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            title: "The GLP-1 Research Digest".to_string(),
            link: "https://dc1616dc.github.io/glp1-research-podcast".to_string(),
            description: "Weekly analysis of the latest GLP-1 and obesity medication research. \
                Hosted by Dan (registered dietitian) and Alex (science journalist)."
                .to_string(),
            language: "en-us".to_string(),
            author: "GLP-1 Research Digest".to_string(),
            summary: "Weekly analysis of the latest GLP-1 and obesity medication research \
                for healthcare professionals and informed patients."
                .to_string(),
            explicit: false,
            category: "Health & Fitness".to_string(),
            subcategory: "Nutrition".to_string(),
            guid_namespace: "glp1-research-podcast".to_string(),
            enclosure_base_url:
                "https://raw.githubusercontent.com/Dc1616DC/glp1-research-podcast/main/episodes"
                    .to_string(),
        }
    }
}

/// Prompt templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub script_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            script_template: DEFAULT_SCRIPT_TEMPLATE.to_string(),
        }
    }
}

/// A named bundle of search queries, host personas and file naming.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicProfile {
    pub key: String,
    pub name: String,
    pub description: String,
    pub file_prefix: String,
    pub show_title: String,
    pub search_queries: Vec<String>,
    pub host_personas: String,
    pub context_sentence: String,
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PodcastError> {
        if self.find_topic(&self.default_topic).is_none() {
            return Err(PodcastError::ConfigError(format!(
                "Default topic '{}' is not defined. Available topics: {}",
                self.default_topic,
                self.topic_keys().join(", ")
            )));
        }

        if let Some(topic) = self.topics.iter().find(|t| t.search_queries.is_empty()) {
            return Err(PodcastError::ConfigError(format!(
                "Topic '{}' has no search queries",
                topic.key
            )));
        }

        if self.hosts.host_a_name.trim().is_empty()
            || self.hosts.host_b_name.trim().is_empty()
            || self.hosts.host_a_name == self.hosts.host_b_name
        {
            return Err(PodcastError::ConfigError(
                "Host names must be non-empty and distinct".to_string(),
            ));
        }

        if self.synthesis.sample_rate == 0 {
            return Err(PodcastError::ConfigError(
                "Sample rate must be positive".to_string(),
            ));
        }

        crate::audio::lame_bitrate(self.synthesis.bitrate_kbps)?;
        Ok(())
    }

    /// Select a topic profile, falling back to the default topic when the
    /// selector is unset or unknown.
    pub fn select_topic(&self, selector: Option<&str>) -> Result<&TopicProfile, PodcastError> {
        if let Some(key) = selector.map(str::trim).filter(|k| !k.is_empty()) {
            if let Some(topic) = self.find_topic(key) {
                return Ok(topic);
            }
            log::warn!(
                "Unknown topic '{}', falling back to '{}'",
                key,
                self.default_topic
            );
        }

        self.find_topic(&self.default_topic).ok_or_else(|| {
            PodcastError::ConfigError(format!(
                "Default topic '{}' is not defined",
                self.default_topic
            ))
        })
    }

    fn find_topic(&self, key: &str) -> Option<&TopicProfile> {
        self.topics.iter().find(|t| t.key.eq_ignore_ascii_case(key))
    }

    /// Get all configured topic keys.
    pub fn topic_keys(&self) -> Vec<&str> {
        self.topics.iter().map(|t| t.key.as_str()).collect()
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        default_topic: "glp1".to_string(),
        pipeline: PipelineConfig::default(),
        services: ServicesConfig::default(),
        hosts: HostsConfig::default(),
        synthesis: SynthesisConfig::default(),
        feed: FeedConfig::default(),
        prompts: PromptsConfig::default(),
        topics: vec![glp1_topic(), menopause_topic()],
    }
}

fn glp1_topic() -> TopicProfile {
    TopicProfile {
        key: "glp1".to_string(),
        name: "GLP-1 Research".to_string(),
        description: "GLP-1 agonists, obesity medications and nutrition".to_string(),
        file_prefix: "glp1-digest".to_string(),
        show_title: "The GLP-1 Research Digest".to_string(),
        search_queries: vec![
            r#""GLP-1 agonist" AND ("muscle mass" OR "protein intake")"#.to_string(),
            r#"("semaglutide" OR "tirzepatide") AND nutrition"#.to_string(),
            r#""GLP-1" AND ("side effects" OR "nausea")"#.to_string(),
            r#""Anti Obesity Medications" AND protein"#.to_string(),
        ],
        host_personas: DEFAULT_HOST_PERSONAS.to_string(),
        context_sentence: "a weekly podcast that breaks down the latest GLP-1 and obesity \
            medication research for healthcare professionals and educated patients."
            .to_string(),
    }
}

fn menopause_topic() -> TopicProfile {
    TopicProfile {
        key: "menopause".to_string(),
        name: "Menopause Nutrition Research".to_string(),
        description: "Nutrition, body composition and metabolic health through menopause"
            .to_string(),
        file_prefix: "menopause-digest".to_string(),
        show_title: "The Menopause Nutrition Digest".to_string(),
        search_queries: vec![
            r#""menopause" AND ("protein intake" OR "muscle mass")"#.to_string(),
            r#"("perimenopause" OR "postmenopausal") AND nutrition"#.to_string(),
            r#""menopause" AND ("hot flashes" OR "vasomotor") AND diet"#.to_string(),
            r#""postmenopausal" AND ("bone density" OR "calcium")"#.to_string(),
        ],
        host_personas: DEFAULT_HOST_PERSONAS.to_string(),
        context_sentence: "a weekly podcast that breaks down the latest menopause and \
            midlife nutrition research for healthcare professionals and educated patients."
            .to_string(),
    }
}

const DEFAULT_HOST_PERSONAS: &str = r#"HOST 1 - {host_a}:
- Registered dietitian with 15 years of clinical experience
- Evidence-focused and appropriately skeptical
- Critical of poorly designed studies and overhyped findings
- Speaks in clear, accessible language but doesn't dumb things down
- Occasionally uses dry humor

HOST 2 - {host_b}:
- Science journalist who covers metabolic health
- Asks the questions that listeners would ask
- Helps translate complex concepts
- Curious and engaged, but defers to {host_a} on clinical matters
- Good at drawing out practical implications"#;

const DEFAULT_SCRIPT_TEMPLATE: &str = r#"You are writing a podcast script for "{show_title}," {context_sentence}

CREATE A CONVERSATIONAL SCRIPT BETWEEN TWO HOSTS:

{host_personas}

STUDIES TO COVER:
{studies}

SCRIPT REQUIREMENTS:
1. LENGTH: 2000-2500 words (approximately 15-18 minutes of audio)
2. FORMAT: Use "{host_a}:" and "{host_b}:" labels for each speaker turn
3. STRUCTURE:
   - Brief intro/welcome (30 seconds)
   - Cover each study: what they did, methodology critique, patient implications
   - {host_a} should be critical of weak methodologies (small sample sizes, short duration, industry funding bias)
   - {host_b} asks clarifying questions listeners would want answered
   - End with key takeaways

4. TONE:
   - Professional but conversational
   - Natural dialogue with some back-and-forth
   - Include brief reactions ("That's interesting..." "Right, and...")
   - Avoid sounding scripted or robotic

5. CONTENT GUIDELINES:
   - Be specific about numbers (sample sizes, effect sizes, p-values when relevant)
   - Discuss clinical relevance, not just statistical significance
   - Note limitations honestly
   - Provide actionable insights for practitioners and patients

Write the complete script now. Start directly with the dialogue (no meta-commentary)."#;
