//! Literature search against PubMed E-utilities.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::{PipelineConfig, ServicesConfig};
use crate::error::PodcastError;
use crate::study::{StudyRecord, parse_pubmed_articles, rank_studies};

/// A literature database that can be searched and fetched in batches.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    /// Return identifiers matching a boolean query, newest first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, PodcastError>;

    /// Fetch full records for a batch of identifiers.
    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<StudyRecord>, PodcastError>;
}

/// E-utilities client.
pub struct PubMedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    search_timeout: Duration,
    fetch_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    esearchresult: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

impl PubMedClient {
    pub fn new(services: &ServicesConfig, api_key: Option<String>) -> Result<Self, PodcastError> {
        let client = Client::builder()
            .user_agent(concat!("studycast/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: services.search_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            search_timeout: Duration::from_secs(services.search_timeout_secs),
            fetch_timeout: Duration::from_secs(services.fetch_timeout_secs),
        })
    }

    fn params<'a>(&'a self, extra: &[(&'a str, String)]) -> Vec<(&'a str, String)> {
        let mut params = vec![("db", "pubmed".to_string())];
        params.extend(extra.iter().cloned());
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }
}

#[async_trait]
impl LiteratureSearch for PubMedClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, PodcastError> {
        let params = self.params(&[
            ("term", query.to_string()),
            ("retmax", limit.to_string()),
            ("sort", "date".to_string()),
            ("retmode", "json".to_string()),
        ]);

        let response = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&params)
            .timeout(self.search_timeout)
            .send()
            .await?;

        let response = check_status("PubMed esearch", response).await?;
        let body: SearchResponse = response.json().await?;
        Ok(body.esearchresult.idlist)
    }

    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<StudyRecord>, PodcastError> {
        let params = self.params(&[
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ]);

        let response = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&params)
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        let response = check_status("PubMed efetch", response).await?;
        let xml = response.text().await?;
        parse_pubmed_articles(&xml, Utc::now())
    }
}

/// Turn a non-2xx response into `PodcastError::Service`.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, PodcastError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<body unavailable: {}>", e));
    Err(PodcastError::Service {
        service,
        status,
        body,
    })
}

/// Runs a topic's queries and produces the ranked study list.
pub struct StudyFetcher<'a> {
    source: &'a dyn LiteratureSearch,
    search_limit: usize,
    max_studies: usize,
    pause: Duration,
}

impl<'a> StudyFetcher<'a> {
    pub fn new(source: &'a dyn LiteratureSearch, pipeline: &PipelineConfig) -> Self {
        Self {
            source,
            search_limit: pipeline.search_limit,
            max_studies: pipeline.max_studies,
            pause: Duration::from_millis(pipeline.request_pause_ms),
        }
    }

    /// Search every query, deduplicate, fetch and rank.
    ///
    /// A failed query contributes nothing; a failed batch fetch aborts.
    pub async fn fetch(&self, queries: &[String]) -> Result<Vec<StudyRecord>, PodcastError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for (i, query) in queries.iter().enumerate() {
            if i > 0 {
                self.courtesy_pause().await;
            }

            match self.source.search(query, self.search_limit).await {
                Ok(found) => {
                    log::info!("Query '{}' returned {} results", preview(query, 40), found.len());
                    for id in found {
                        if seen.insert(id.clone()) {
                            ids.push(id);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Search failed for '{}': {}", preview(query, 30), e);
                }
            }
        }

        if ids.is_empty() {
            log::warn!("No identifiers found from any query");
            return Ok(Vec::new());
        }

        log::info!("Fetching details for {} unique articles", ids.len());
        self.courtesy_pause().await;

        let studies = self.source.fetch_records(&ids).await?;
        let studies = rank_studies(studies, self.max_studies);
        log::info!("Selected {} studies", studies.len());
        Ok(studies)
    }

    async fn courtesy_pause(&self) {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
