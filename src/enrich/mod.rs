//! Per-URL content enrichment.
//!
//! Records are classified once by URL, then expanded with whatever the matching
//! source can offer (transcripts, post captions). External failures never reach
//! the caller; each strategy falls back to the text it already has.

pub mod fetchers;

use std::sync::Arc;

use url::Url;

use crate::config::EnrichmentConfig;
use crate::memory::{truncate_chars, ActivityRecord};

pub use fetchers::{
    DisabledFetcher, EnrichmentError, HttpFetch, MediaFetcher, MediaInfo, SocialMediaFetcher,
    TranscriptFetcher, YouTubeTranscriptFetcher,
};

const YOUTUBE_MARKERS: &[&str] = &["youtube.com", "youtu.be"];

const SOCIAL_MARKERS: &[&str] = &["instagram.com/reel", "tiktok.com"];

const PRIVATE_MESSAGE_MARKERS: &[&str] = &[
    "instagram.com/direct",
    "messenger.com",
    "facebook.com/messages",
    "x.com/messages",
    "twitter.com/messages",
    "web.whatsapp.com",
    "discord.com/channels/@me",
    "linkedin.com/messaging",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    YouTube,
    SocialShortVideo,
    PrivateMessage,
    Default,
}

impl SourceKind {
    /// First matching marker family wins, in declaration order.
    pub fn classify(url: &str) -> Self {
        let url = url.to_ascii_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| url.contains(m));

        if has(YOUTUBE_MARKERS) {
            SourceKind::YouTube
        } else if has(SOCIAL_MARKERS) {
            SourceKind::SocialShortVideo
        } else if has(PRIVATE_MESSAGE_MARKERS) {
            SourceKind::PrivateMessage
        } else {
            SourceKind::Default
        }
    }
}

pub fn is_youtube_url(url: &str) -> bool {
    SourceKind::classify(url) == SourceKind::YouTube
}

/// Video identifier from the `v` query parameter, `youtu.be/<id>` or `/shorts/<id>`.
pub fn video_id(url: &str) -> Option<String> {
    let Ok(parsed) = Url::parse(url) else {
        return scan_video_id(url).map(str::to_string);
    };

    if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
        return Some(id.into_owned()).filter(|id| !id.is_empty());
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    let host = parsed.host_str().unwrap_or_default();

    let id = if host == "youtu.be" || host.ends_with(".youtu.be") {
        segments.first().copied()
    } else {
        segments
            .iter()
            .position(|s| *s == "shorts")
            .and_then(|i| segments.get(i + 1).copied())
    };

    id.filter(|id| !id.is_empty()).map(str::to_string)
}

/// Substring fallback for urls that do not parse.
fn scan_video_id(url: &str) -> Option<&str> {
    let raw = if let Some((_, rest)) = url.split_once("v=") {
        rest.split(['&', '#']).next()
    } else if let Some((_, rest)) = url.split_once("youtu.be/") {
        rest.split(['?', '&', '/', '#']).next()
    } else if let Some((_, rest)) = url.split_once("/shorts/") {
        rest.split(['?', '&', '/', '#']).next()
    } else {
        None
    };

    raw.filter(|id| !id.is_empty())
}

/// Picks and runs the enrichment strategy for a record.
pub struct Dispatcher {
    transcripts: Arc<dyn TranscriptFetcher>,
    media: Arc<dyn MediaFetcher>,
    config: EnrichmentConfig,
}

impl Dispatcher {
    pub fn new(
        transcripts: Arc<dyn TranscriptFetcher>,
        media: Arc<dyn MediaFetcher>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            transcripts,
            media,
            config,
        }
    }

    /// Dispatcher that never leaves the process.
    pub fn offline(config: EnrichmentConfig) -> Self {
        let disabled = Arc::new(DisabledFetcher);
        Self::new(disabled.clone(), disabled, config)
    }

    /// Text that represents the record in the index.
    pub fn enrich(&self, record: &ActivityRecord) -> String {
        let kind = SourceKind::classify(&record.url);
        log::debug!("{}: classified as {kind:?}", record.url);

        match kind {
            SourceKind::YouTube => self.enrich_video(record),
            SourceKind::SocialShortVideo => self.enrich_social(record),
            SourceKind::PrivateMessage => format!("CHAT LOG: {}", record.content),
            SourceKind::Default => record.content.clone(),
        }
    }

    fn enrich_video(&self, record: &ActivityRecord) -> String {
        if let Some(id) = video_id(&record.url) {
            match self.transcripts.fetch_transcript(&id) {
                Ok(transcript) => {
                    let transcript = truncate_chars(transcript.trim(), self.config.transcript_budget);
                    log::info!("{id}: transcript attached ({} chars)", transcript.chars().count());
                    return format!("VIDEO TITLE: {}\nTRANSCRIPT: {transcript}", record.title);
                }
                Err(e) => log::warn!(
                    "{id}: {} failed, falling back: {e}",
                    self.transcripts.name()
                ),
            }
        } else {
            log::debug!("{}: no video id found", record.url);
        }

        if meets(&record.content, self.config.youtube_min_content) {
            record.content.clone()
        } else {
            format!("VIDEO TITLE: {}\nURL: {}", record.title, record.url)
        }
    }

    fn enrich_social(&self, record: &ActivityRecord) -> String {
        if meets(&record.content, self.config.social_min_content) {
            return record.content.clone();
        }

        let info = match self.media.fetch_media(&record.url) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("{}: {} failed, falling back: {e}", record.url, self.media.name());
                return format!("SOCIAL POST: {}", record.title);
            }
        };

        let title = if record.title.trim().is_empty() {
            info.title.as_deref().unwrap_or_default()
        } else {
            record.title.as_str()
        };

        let details = match (info.uploader.as_deref(), info.description.as_deref()) {
            (Some(uploader), Some(description)) => format!("{uploader}: {description}"),
            (None, Some(description)) => description.to_string(),
            (Some(uploader), None) => uploader.to_string(),
            (None, None) => return format!("SOCIAL POST: {title}"),
        };

        format!("SOCIAL POST: {title}\nDETAILS: {details}")
    }
}

fn meets(content: &str, min_chars: usize) -> bool {
    content.trim().chars().count() >= min_chars
}
