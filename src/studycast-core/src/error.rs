//! Error types for the podcast pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("{service} returned {status}: {body}")]
    Service {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Malformed XML document: {0}")]
    MalformedXml(String),

    #[error("Malformed feed document: {0}")]
    MalformedFeed(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("MP3 encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Script contains no recognizable speaker segments")]
    EmptyScript,

    #[error("Text generation returned an empty response")]
    EmptyGeneration,

    #[error("Speech synthesis failed for segment {index}: {source}")]
    Synthesis {
        index: usize,
        #[source]
        source: Box<PodcastError>,
    },
}

pub type Result<T> = std::result::Result<T, PodcastError>;
