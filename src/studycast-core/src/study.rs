//! Study records and PubMed article parsing.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::PodcastError;
use crate::xml::{XmlElement, parse_document};

const DEFAULT_YEAR: &str = "2024";
const DEFAULT_MONTH: &str = "Jan";
const DEFAULT_DAY: &str = "1";

/// A normalized study ready to be summarized.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyRecord {
    pub title: String,
    pub abstract_text: String,
    pub link: String,
    pub published: DateTime<Utc>,
}

/// Parse an efetch `PubmedArticleSet` payload into study records.
///
/// Articles that cannot be read are skipped; a payload that is not XML at
/// all is an error.
pub fn parse_pubmed_articles(xml: &str, now: DateTime<Utc>) -> Result<Vec<StudyRecord>, PodcastError> {
    let root = parse_document(xml)?;
    let articles = root.find_all("PubmedArticle");

    let mut studies = Vec::with_capacity(articles.len());
    for (i, article) in articles.into_iter().enumerate() {
        match parse_article(article, now) {
            Some(study) => studies.push(study),
            None => log::warn!("Skipping unreadable PubMed article #{}", i + 1),
        }
    }
    Ok(studies)
}

fn parse_article(article: &XmlElement, now: DateTime<Utc>) -> Option<StudyRecord> {
    let citation = article.find("MedlineCitation")?;

    let title = citation
        .find("ArticleTitle")
        .map(|t| normalize_whitespace(&t.text()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string());

    let abstract_text = match citation.find("Abstract") {
        Some(abstract_elem) => abstract_elem
            .find_all("AbstractText")
            .iter()
            .map(|p| normalize_whitespace(&p.text()))
            .collect::<Vec<_>>()
            .join(" "),
        None => "No abstract available.".to_string(),
    };

    let link = citation
        .child("PMID")
        .map(|p| p.text().trim().to_string())
        .filter(|pmid| !pmid.is_empty())
        .map(|pmid| format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid))
        .unwrap_or_default();

    let published = match citation.find("PubDate") {
        Some(pub_date) => {
            let field = |name: &str, default: &str| {
                pub_date
                    .child(name)
                    .map(|e| e.text().trim().to_string())
                    .unwrap_or_else(|| default.to_string())
            };
            parse_pub_date(
                &field("Year", DEFAULT_YEAR),
                &field("Month", DEFAULT_MONTH),
                &field("Day", DEFAULT_DAY),
            )
            .unwrap_or(now)
        }
        None => now,
    };

    Some(StudyRecord {
        title,
        abstract_text,
        link,
        published,
    })
}

/// Parse PubMed's split date fields. Months may be abbreviated names
/// (`Mar`), full names or numbers.
pub fn parse_pub_date(year: &str, month: &str, day: &str) -> Option<DateTime<Utc>> {
    let text = format!("{} {} {}", year.trim(), month.trim(), day.trim());
    ["%Y %b %d", "%Y %B %d", "%Y %m %d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Sort newest first and keep at most `max` studies.
pub fn rank_studies(mut studies: Vec<StudyRecord>, max: usize) -> Vec<StudyRecord> {
    studies.sort_by(|a, b| b.published.cmp(&a.published));
    studies.truncate(max);
    studies
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
