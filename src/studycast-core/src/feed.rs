//! Podcast feed publishing.
//!
//! The feed is an RSS 2.0 document with the iTunes podcast extension. It is
//! loaded into an element tree, the new episode is inserted ahead of all
//! existing items and the whole document is rewritten.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FeedConfig;
use crate::error::PodcastError;
use crate::xml::{XmlElement, parse_document, write_document};

pub const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
pub const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

const RFC822_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";

/// One published episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeEntry {
    pub title: String,
    pub description: String,
    pub publish_date: String,
    pub guid: String,
    pub enclosure_url: String,
    pub enclosure_length: u64,
    pub duration_seconds: u64,
}

impl EpisodeEntry {
    fn to_element(&self, explicit: bool) -> XmlElement {
        XmlElement::new("item")
            .with_child(XmlElement::new("title").with_text(&self.title))
            .with_child(XmlElement::new("description").with_text(&self.description))
            .with_child(XmlElement::new("pubDate").with_text(&self.publish_date))
            .with_child(
                XmlElement::new("guid")
                    .with_attr("isPermaLink", "false")
                    .with_text(&self.guid),
            )
            .with_child(
                XmlElement::new("enclosure")
                    .with_attr("url", &self.enclosure_url)
                    .with_attr("type", "audio/mpeg")
                    .with_attr("length", self.enclosure_length.to_string()),
            )
            .with_child(
                XmlElement::new("itunes:duration").with_text(format_duration(self.duration_seconds)),
            )
            .with_child(XmlElement::new("itunes:summary").with_text(&self.description))
            .with_child(XmlElement::new("itunes:explicit").with_text(yes_no(explicit)))
    }

    fn from_element(item: &XmlElement) -> Self {
        let text = |name: &str| item.child(name).map(|e| e.text()).unwrap_or_default();
        let enclosure = item.child("enclosure");

        Self {
            title: text("title"),
            description: text("description"),
            publish_date: text("pubDate"),
            guid: text("guid"),
            enclosure_url: enclosure
                .and_then(|e| e.attr("url"))
                .unwrap_or_default()
                .to_string(),
            enclosure_length: enclosure
                .and_then(|e| e.attr("length"))
                .and_then(|l| l.trim().parse().ok())
                .unwrap_or(0),
            duration_seconds: parse_duration(&text("itunes:duration")).unwrap_or(0),
        }
    }
}

/// An RSS feed held as an element tree.
///
/// The `<channel>` element is kept apart from the rest of the document so
/// it can be edited directly; it is put back at its original position on
/// serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    rss: XmlElement,
    channel: XmlElement,
    channel_index: usize,
}

impl FeedDocument {
    /// Build a fresh feed carrying the full channel metadata block.
    pub fn create_new(feed: &FeedConfig, now: DateTime<Utc>) -> Self {
        let category = XmlElement::new("itunes:category")
            .with_attr("text", &feed.category)
            .with_child(XmlElement::new("itunes:category").with_attr("text", &feed.subcategory));

        let channel = XmlElement::new("channel")
            .with_child(XmlElement::new("title").with_text(&feed.title))
            .with_child(XmlElement::new("link").with_text(&feed.link))
            .with_child(XmlElement::new("description").with_text(&feed.description))
            .with_child(XmlElement::new("language").with_text(&feed.language))
            .with_child(XmlElement::new("lastBuildDate").with_text(format_rfc822(now)))
            .with_child(XmlElement::new("itunes:author").with_text(&feed.author))
            .with_child(XmlElement::new("itunes:summary").with_text(&feed.summary))
            .with_child(XmlElement::new("itunes:explicit").with_text(yes_no(feed.explicit)))
            .with_child(category);

        let rss = XmlElement::new("rss")
            .with_attr("version", "2.0")
            .with_attr("xmlns:itunes", ITUNES_NS)
            .with_attr("xmlns:content", CONTENT_NS);

        Self {
            rss,
            channel,
            channel_index: 0,
        }
    }

    /// Parse an existing feed. A document without `<rss><channel>` is rejected.
    ///
    /// Episodes carry `itunes:` elements, so the namespace is declared on the
    /// root if the file on disk lacks it.
    pub fn parse(xml: &str) -> Result<Self, PodcastError> {
        let mut rss = parse_document(xml)?;
        if rss.name != "rss" {
            return Err(PodcastError::MalformedFeed(format!(
                "expected <rss> root, found <{}>",
                rss.name
            )));
        }
        if rss.attr("xmlns:itunes").is_none() {
            rss.set_attr("xmlns:itunes", ITUNES_NS);
        }

        let (channel_index, channel) = rss
            .take_child("channel")
            .ok_or_else(|| PodcastError::MalformedFeed("missing <channel> element".to_string()))?;

        Ok(Self {
            rss,
            channel,
            channel_index,
        })
    }

    /// Load a feed from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let xml = fs::read_to_string(path.as_ref())?;
        Self::parse(&xml)
    }

    pub fn title(&self) -> String {
        self.channel.child("title").map(|t| t.text()).unwrap_or_default()
    }

    pub fn last_build_date(&self) -> Option<String> {
        self.channel.child("lastBuildDate").map(|e| e.text())
    }

    /// Set the channel build timestamp, adding the element if it is absent.
    pub fn refresh_last_build(&mut self, now: DateTime<Utc>) {
        let stamp = format_rfc822(now);
        let channel = &mut self.channel;
        match channel.child_mut("lastBuildDate") {
            Some(existing) => existing.set_text(stamp),
            None => {
                let index = channel
                    .position_of("item")
                    .unwrap_or(channel.children.len());
                channel.insert_child(index, XmlElement::new("lastBuildDate").with_text(stamp));
            }
        }
    }

    /// Insert an episode ahead of every existing item.
    pub fn insert_episode(&mut self, entry: &EpisodeEntry, explicit: bool) {
        let item = entry.to_element(explicit);
        match self.channel.position_of("item") {
            Some(index) => self.channel.insert_child(index, item),
            None => self.channel.push_child(item),
        }
    }

    /// Episodes in document order (newest first).
    pub fn episodes(&self) -> Vec<EpisodeEntry> {
        self.channel
            .children_named("item")
            .map(EpisodeEntry::from_element)
            .collect()
    }

    pub fn to_xml(&self) -> Result<String, PodcastError> {
        let mut root = self.rss.clone();
        let index = self.channel_index.min(root.children.len());
        root.insert_child(index, self.channel.clone());
        write_document(&root)
    }

    /// Rewrite the whole document at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PodcastError> {
        let xml = self.to_xml()?;
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, xml)?;
        Ok(())
    }
}

/// Adds episodes to the feed file on disk.
pub struct FeedPublisher {
    settings: FeedConfig,
    feed_path: PathBuf,
    episodes_dir: PathBuf,
}

impl FeedPublisher {
    pub fn new(
        settings: FeedConfig,
        feed_path: impl Into<PathBuf>,
        episodes_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            feed_path: feed_path.into(),
            episodes_dir: episodes_dir.into(),
        }
    }

    pub fn feed_path(&self) -> &Path {
        &self.feed_path
    }

    /// Load the feed (or create it), add the episode at the head and write
    /// the document back.
    pub fn publish(
        &self,
        title: &str,
        description: &str,
        audio_file_name: &str,
        duration_seconds: f64,
        now: DateTime<Utc>,
    ) -> Result<EpisodeEntry, PodcastError> {
        let mut feed = if self.feed_path.exists() {
            FeedDocument::load(&self.feed_path)?
        } else {
            log::info!("Creating new feed at {}", self.feed_path.display());
            FeedDocument::create_new(&self.settings, now)
        };

        feed.refresh_last_build(now);

        let entry = self.build_entry(title, description, audio_file_name, duration_seconds, now);
        feed.insert_episode(&entry, self.settings.explicit);
        feed.save(&self.feed_path)?;

        log::info!(
            "Feed updated: {} ({} episodes)",
            self.feed_path.display(),
            feed.episodes().len()
        );
        Ok(entry)
    }

    fn build_entry(
        &self,
        title: &str,
        description: &str,
        audio_file_name: &str,
        duration_seconds: f64,
        now: DateTime<Utc>,
    ) -> EpisodeEntry {
        let enclosure_length = fs::metadata(self.episodes_dir.join(audio_file_name))
            .map(|m| m.len())
            .unwrap_or(0);

        EpisodeEntry {
            title: title.to_string(),
            description: description.to_string(),
            publish_date: format_rfc822(now),
            guid: format!("{}-{}", self.settings.guid_namespace, now.format("%Y%m%d%H%M%S")),
            enclosure_url: format!(
                "{}/{}",
                self.settings.enclosure_base_url.trim_end_matches('/'),
                audio_file_name
            ),
            enclosure_length,
            duration_seconds: duration_seconds.max(0.0).floor() as u64,
        }
    }
}

pub fn format_rfc822(time: DateTime<Utc>) -> String {
    time.format(RFC822_FORMAT).to_string()
}

/// `minutes:seconds`, seconds zero-padded.
pub fn format_duration(total_seconds: u64) -> String {
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn parse_duration(text: &str) -> Option<u64> {
    let parts = text
        .trim()
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.iter().fold(0, |acc, p| acc * 60 + p))
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
