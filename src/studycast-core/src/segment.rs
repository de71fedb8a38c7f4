//! Script segmentation.
//!
//! Splits a generated dialogue into ordered speaker turns. A turn starts
//! at an exact `Label:` anchor for one of the two hosts; anything before
//! the first anchor is treated as preamble and dropped.

use regex::Regex;

use crate::config::HostsConfig;
use crate::error::PodcastError;

/// One of the two podcast hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    HostA,
    HostB,
}

/// Case-sensitive script labels for each host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerLabels {
    pub host_a: String,
    pub host_b: String,
}

impl SpeakerLabels {
    pub fn new(host_a: impl Into<String>, host_b: impl Into<String>) -> Self {
        Self {
            host_a: host_a.into(),
            host_b: host_b.into(),
        }
    }

    pub fn from_hosts(hosts: &HostsConfig) -> Self {
        Self::new(&hosts.host_a_name, &hosts.host_b_name)
    }

    pub fn label(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::HostA => &self.host_a,
            Speaker::HostB => &self.host_b,
        }
    }

    fn speaker_for(&self, label: &str) -> Option<Speaker> {
        if label == self.host_a {
            Some(Speaker::HostA)
        } else if label == self.host_b {
            Some(Speaker::HostB)
        } else {
            None
        }
    }

    fn pattern(&self) -> Option<Regex> {
        let pattern = format!(
            r"({}|{}):\s*",
            label_pattern(&self.host_a),
            label_pattern(&self.host_b)
        );
        Regex::new(&pattern).ok()
    }
}

/// Escaped label, anchored at a word boundary when it starts with a word
/// character. `\b` can never match before a leading symbol.
fn label_pattern(label: &str) -> String {
    let escaped = regex::escape(label);
    match label.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => format!(r"\b{}", escaped),
        _ => escaped,
    }
}

/// A single speaker turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSegment {
    pub speaker: Speaker,
    pub utterance: String,
}

impl ScriptSegment {
    pub fn new(speaker: Speaker, utterance: impl Into<String>) -> Self {
        Self {
            speaker,
            utterance: utterance.into(),
        }
    }
}

/// Split a script into ordered speaker segments.
///
/// Segments whose trimmed text is empty are skipped. Adjacent turns by the
/// same speaker are kept separate.
pub fn segment_script(script: &str, labels: &SpeakerLabels) -> Vec<ScriptSegment> {
    let Some(pattern) = labels.pattern() else {
        return Vec::new();
    };
    let mut segments = Vec::new();
    let mut current: Option<(Speaker, usize)> = None;

    for captures in pattern.captures_iter(script) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };

        if let Some((speaker, start)) = current.take() {
            push_segment(&mut segments, speaker, &script[start..whole.start()]);
        }

        if let Some(speaker) = labels.speaker_for(name.as_str()) {
            current = Some((speaker, whole.end()));
        }
    }

    if let Some((speaker, start)) = current {
        push_segment(&mut segments, speaker, &script[start..]);
    }

    segments
}

fn push_segment(segments: &mut Vec<ScriptSegment>, speaker: Speaker, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        segments.push(ScriptSegment::new(speaker, text));
    }
}

/// Ensure there is at least one segment to synthesize.
pub fn require_segments(segments: Vec<ScriptSegment>) -> Result<Vec<ScriptSegment>, PodcastError> {
    if segments.is_empty() {
        return Err(PodcastError::EmptyScript);
    }
    Ok(segments)
}

/// Reassemble segments into `Label: utterance` lines.
pub fn render_script(segments: &[ScriptSegment], labels: &SpeakerLabels) -> String {
    segments
        .iter()
        .map(|s| format!("{}: {}", labels.label(s.speaker), s.utterance))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> SpeakerLabels {
        SpeakerLabels::new("Dan", "Alex")
    }

    #[test]
    fn test_segment_basic_dialogue() {
        let script = "Dan: Welcome back to the show.\nAlex: Thanks, Dan. Big week.\nDan: It is.";
        let segments = segment_script(script, &labels());

        assert_eq!(
            segments,
            vec![
                ScriptSegment::new(Speaker::HostA, "Welcome back to the show."),
                ScriptSegment::new(Speaker::HostB, "Thanks, Dan. Big week."),
                ScriptSegment::new(Speaker::HostA, "It is."),
            ]
        );
    }

    #[test]
    fn test_preamble_is_discarded() {
        let script = "Here is your script:\n\nAlex: Hello everyone.";
        let segments = segment_script(script, &labels());

        assert_eq!(segments, vec![ScriptSegment::new(Speaker::HostB, "Hello everyone.")]);
    }

    #[test]
    fn test_name_inside_utterance_does_not_split() {
        let segments = segment_script("Dan: I agree with Alex on this.", &labels());

        assert_eq!(
            segments,
            vec![ScriptSegment::new(Speaker::HostA, "I agree with Alex on this.")]
        );
    }

    #[test]
    fn test_label_must_start_at_word_boundary() {
        let segments = segment_script("Alex: Ask MacDan: he knows.", &labels());

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].utterance, "Ask MacDan: he knows.");
    }

    #[test]
    fn test_label_with_leading_symbol_matches() {
        let labels = SpeakerLabels::new("*Host", "Guest");
        let segments = segment_script("*Host: Welcome.\nGuest: Thanks.\nMacGuest: no", &labels);

        assert_eq!(
            segments,
            vec![
                ScriptSegment::new(Speaker::HostA, "Welcome."),
                ScriptSegment::new(Speaker::HostB, "Thanks.\nMacGuest: no"),
            ]
        );
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let segments = segment_script("dan: quiet\nDAN: loud\nDan: right", &labels());

        assert_eq!(
            segments,
            vec![ScriptSegment::new(Speaker::HostA, "right")]
        );
    }

    #[test]
    fn test_empty_segments_are_dropped_without_stopping() {
        let script = "Dan:   \nAlex:\nDan: Still here.";
        let segments = segment_script(script, &labels());

        assert_eq!(segments, vec![ScriptSegment::new(Speaker::HostA, "Still here.")]);
    }

    #[test]
    fn test_consecutive_same_speaker_not_merged() {
        let script = "Dan: First thought.\nDan: Second thought.";
        let segments = segment_script(script, &labels());

        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.speaker == Speaker::HostA));
    }

    #[test]
    fn test_no_labels_yields_empty_script_error() {
        let segments = segment_script("Just some narration without hosts.", &labels());
        assert!(segments.is_empty());
        assert!(matches!(require_segments(segments), Err(PodcastError::EmptyScript)));
    }

    #[test]
    fn test_render_round_trip() {
        let script = "Dan: One.\nAlex: Two, with Dan mentioned.\nAlex: Three.\nDan: Four.";
        let segments = segment_script(script, &labels());
        let rendered = render_script(&segments, &labels());

        assert_eq!(rendered, script);
        assert_eq!(segment_script(&rendered, &labels()), segments);
    }

    #[test]
    fn test_custom_labels_are_escaped() {
        let labels = SpeakerLabels::new("Dr. Lee", "Sam");
        let segments = segment_script("Dr. Lee: Hi.\nSam: Hello.\nDr Lee: nope", &labels);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].utterance, "Hello.\nDr Lee: nope");
    }
}
