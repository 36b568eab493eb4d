use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{decode_entities, EnrichmentError, HttpFetch, TranscriptFetcher};

const WATCH_URL: &str = "https://www.youtube.com/watch";
const CAPTION_TRACKS_KEY: &str = "\"captionTracks\":";

static CAPTION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("Failed to compile caption regex")
});

static INLINE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("Failed to compile tag regex"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
    /// `asr` for auto-generated tracks
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_english(&self) -> bool {
        self.language_code == "en" || self.language_code.starts_with("en-")
    }

    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// Reads captions the same way the web player does: watch page, then timed-text XML.
pub struct YouTubeTranscriptFetcher {
    http: HttpFetch,
    watch_url: String,
}

impl YouTubeTranscriptFetcher {
    pub fn new(http: HttpFetch) -> Self {
        Self {
            http,
            watch_url: WATCH_URL.to_string(),
        }
    }

    /// Load watch pages from somewhere other than youtube.com.
    #[cfg(test)]
    pub fn with_watch_url(mut self, url: &str) -> Self {
        self.watch_url = url.to_string();
        self
    }
}

impl TranscriptFetcher for YouTubeTranscriptFetcher {
    fn fetch_transcript(&self, video_id: &str) -> Result<String, EnrichmentError> {
        let watch_url = url::Url::parse_with_params(&self.watch_url, &[("v", video_id)])
            .map_err(|e| EnrichmentError::Terminal(format!("invalid video id: {e}")))?;

        let html = self.http.get_text(watch_url.as_str())?;
        let tracks = parse_caption_tracks(&html)?;
        let track = pick_track(&tracks)
            .ok_or_else(|| EnrichmentError::Terminal("video has no caption tracks".into()))?;

        log::debug!(
            "{video_id}: using caption track lang={} kind={:?}",
            track.language_code,
            track.kind
        );

        let xml = self.http.get_text(&track.base_url)?;
        let transcript = parse_transcript_xml(&xml);
        if transcript.is_empty() {
            return Err(EnrichmentError::Terminal("transcript is empty".into()));
        }

        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "youtube-transcript"
    }
}

/// Pull the `captionTracks` array out of the player response embedded in the watch page.
fn parse_caption_tracks(html: &str) -> Result<Vec<CaptionTrack>, EnrichmentError> {
    let start = html
        .find(CAPTION_TRACKS_KEY)
        .ok_or_else(|| EnrichmentError::Terminal("no captions available".into()))?;
    let rest = &html[start + CAPTION_TRACKS_KEY.len()..];

    // The array is followed by the rest of the player JSON; stop after the first value.
    serde_json::Deserializer::from_str(rest)
        .into_iter::<Vec<CaptionTrack>>()
        .next()
        .ok_or_else(|| EnrichmentError::Terminal("caption tracks missing".into()))?
        .map_err(|e| EnrichmentError::Terminal(format!("malformed caption tracks: {e}")))
}

/// Manual English, then generated English, then whatever comes first.
fn pick_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks
        .iter()
        .find(|t| t.is_english() && !t.is_generated())
        .or_else(|| tracks.iter().find(|t| t.is_english()))
        .or_else(|| tracks.first())
}

fn parse_transcript_xml(xml: &str) -> String {
    let lines: Vec<String> = CAPTION_LINE
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let decoded = decode_entities(m.as_str());
            let stripped = INLINE_TAG.replace_all(&decoded, " ");
            WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
        })
        .filter(|line| !line.is_empty())
        .collect();

    lines.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATCH_PAGE: &str = r#"<script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=de","name":{"runs":[{"text":"German"}]},"languageCode":"de"},{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en&kind=asr","name":{"runs":[{"text":"English (auto-generated)"}]},"languageCode":"en","kind":"asr"}],"audioTracks":[]}}};</script>"#;

    #[test]
    fn test_parse_caption_tracks() {
        let tracks = parse_caption_tracks(WATCH_PAGE).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].language_code, "de");
        assert_eq!(
            tracks[1].base_url,
            "https://www.youtube.com/api/timedtext?v=abc&lang=en&kind=asr"
        );
    }

    #[test]
    fn test_no_captions_is_terminal() {
        let err = parse_caption_tracks("<html>no player</html>").unwrap_err();
        assert!(matches!(err, EnrichmentError::Terminal(_)));
    }

    #[test]
    fn test_pick_track_prefers_manual_english() {
        let track = |lang: &str, kind: Option<&str>| CaptionTrack {
            base_url: format!("{lang}-{kind:?}"),
            language_code: lang.to_string(),
            kind: kind.map(str::to_string),
        };

        let tracks = vec![track("de", None), track("en", Some("asr")), track("en-GB", None)];
        assert_eq!(pick_track(&tracks).unwrap().language_code, "en-GB");

        let tracks = vec![track("de", None), track("en", Some("asr"))];
        assert_eq!(pick_track(&tracks).unwrap().language_code, "en");

        let tracks = vec![track("fr", None)];
        assert_eq!(pick_track(&tracks).unwrap().language_code, "fr");

        assert!(pick_track(&[]).is_none());
    }

    #[test]
    fn test_parse_transcript_xml() {
        let xml = r##"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.5" dur="2">Hello   there</text><text start="2.5" dur="1.2">it&amp;#39;s a
<font color="#fff">test</font></text><text start="4" dur="1"></text></transcript>"##;

        assert_eq!(parse_transcript_xml(xml), "Hello there it's a test");
    }

    #[test]
    fn test_parse_empty_transcript() {
        assert_eq!(parse_transcript_xml("<transcript></transcript>"), "");
    }
}
