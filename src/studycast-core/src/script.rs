//! Script generation.
//!
//! Renders the dialogue prompt from the selected topic and study list, and
//! sends it to an OpenAI-compatible chat completions endpoint.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{ServicesConfig, TopicProfile};
use crate::error::PodcastError;
use crate::segment::SpeakerLabels;
use crate::study::StudyRecord;

/// A text-generation service that drafts the dialogue.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, prompt: &str, max_tokens: u32) -> Result<String, PodcastError>;
}

/// Chat completions client for any OpenAI-compatible API.
pub struct OpenAiScriptWriter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiScriptWriter {
    pub fn new(
        services: &ServicesConfig,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, PodcastError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(services.generation_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model: services.generation_model.clone(),
        })
    }
}

#[async_trait]
impl ScriptWriter for OpenAiScriptWriter {
    async fn write_script(&self, prompt: &str, max_tokens: u32) -> Result<String, PodcastError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(max_tokens)
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: prompt.to_string().into(),
                    name: None,
                },
            )])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(PodcastError::EmptyGeneration);
        }
        Ok(content)
    }
}

/// Fill the prompt template for a topic and its studies.
pub fn build_prompt(
    template: &str,
    topic: &TopicProfile,
    labels: &SpeakerLabels,
    studies: &[StudyRecord],
) -> String {
    template
        .replace("{show_title}", &topic.show_title)
        .replace("{context_sentence}", &topic.context_sentence)
        .replace("{host_personas}", &topic.host_personas)
        .replace("{host_a}", &labels.host_a)
        .replace("{host_b}", &labels.host_b)
        // Last, so placeholder-like text inside abstracts is left alone.
        .replace("{studies}", &format_studies(studies))
}

/// List studies in the block format the prompt expects.
pub fn format_studies(studies: &[StudyRecord]) -> String {
    let mut text = String::new();
    for (i, study) in studies.iter().enumerate() {
        text.push_str(&format!(
            "\nSTUDY {}:\nTitle: {}\nAbstract: {}\nLink: {}\nPublished: {}\n---\n",
            i + 1,
            study.title,
            study.abstract_text,
            study.link,
            study.published.format("%Y-%m-%d")
        ));
    }
    text
}
