pub mod social;
pub mod youtube;

pub use social::SocialMediaFetcher;
pub use youtube::YouTubeTranscriptFetcher;

use std::thread::sleep;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::config::EnrichmentConfig;

const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

/// Failure of an external enrichment source, split by whether a retry can help
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    /// Timeouts, connection errors, 5xx and 429
    #[error("retryable: {0}")]
    Retryable(String),

    /// 4xx, parse failures, source has nothing to offer
    #[error("terminal: {0}")]
    Terminal(String),

    #[error("enrichment is disabled")]
    Disabled,
}

/// Caption/uploader metadata of a short-video post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub description: Option<String>,
}

impl MediaInfo {
    pub fn has_any_data(&self) -> bool {
        [&self.title, &self.uploader, &self.description]
            .into_iter()
            .any(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

pub trait TranscriptFetcher: Send + Sync {
    /// Plain-text transcript of the video, untruncated
    fn fetch_transcript(&self, video_id: &str) -> Result<String, EnrichmentError>;

    fn name(&self) -> &'static str;
}

pub trait MediaFetcher: Send + Sync {
    fn fetch_media(&self, url: &str) -> Result<MediaInfo, EnrichmentError>;

    fn name(&self) -> &'static str;
}

/// Stand-in for both seams when outbound calls are turned off.
pub struct DisabledFetcher;

impl TranscriptFetcher for DisabledFetcher {
    fn fetch_transcript(&self, _video_id: &str) -> Result<String, EnrichmentError> {
        Err(EnrichmentError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

impl MediaFetcher for DisabledFetcher {
    fn fetch_media(&self, _url: &str) -> Result<MediaInfo, EnrichmentError> {
        Err(EnrichmentError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Blocking GET with a per-call timeout and bounded retries on transient failures.
///
/// Must be built outside of an async runtime.
#[derive(Clone)]
pub struct HttpFetch {
    client: Client,
    retries: u8,
}

impl HttpFetch {
    pub fn new(config: &EnrichmentConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT_DEFAULT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            retries: config.retries,
        })
    }

    pub fn get_text(&self, url: &str) -> Result<String, EnrichmentError> {
        let mut attempt: u8 = 0;
        loop {
            match self.get_once(url) {
                Ok(text) => return Ok(text),
                Err(EnrichmentError::Retryable(msg)) if attempt < self.retries => {
                    attempt += 1;
                    log::debug!("{url}: {msg}, retrying ({attempt}/{})", self.retries);
                    sleep(Duration::from_millis(500 * u64::from(attempt)));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn get_once(&self, url: &str) -> Result<String, EnrichmentError> {
        log::debug!("{url}: requesting");
        let resp = self
            .client
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.8")
            .send()
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        resp.text().map_err(classify_transport)
    }
}

fn classify_transport(err: reqwest::Error) -> EnrichmentError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        EnrichmentError::Retryable(err.to_string())
    } else {
        EnrichmentError::Terminal(err.to_string())
    }
}

fn classify_status(status: StatusCode) -> EnrichmentError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        EnrichmentError::Retryable(format!("status {status}"))
    } else {
        EnrichmentError::Terminal(format!("status {status}"))
    }
}

/// Decode the handful of entities that show up in caption XML and meta tags.
pub(crate) fn decode_entities(text: &str) -> String {
    // Captions are often double-escaped (`&amp;#39;`), so unescape `&amp;` first.
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            EnrichmentError::Retryable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            EnrichmentError::Retryable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            EnrichmentError::Terminal(_)
        ));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("it&amp;#39;s"), "it's");
        assert_eq!(decode_entities("a &lt;b&gt; &quot;c&quot;"), "a <b> \"c\"");
    }

    #[test]
    fn test_media_info_has_any_data() {
        assert!(!MediaInfo::default().has_any_data());
        assert!(!MediaInfo {
            title: Some("  ".into()),
            ..Default::default()
        }
        .has_any_data());
        assert!(MediaInfo {
            uploader: Some("someone".into()),
            ..Default::default()
        }
        .has_any_data());
    }

    #[test]
    fn test_disabled_fetcher_always_fails() {
        let f = DisabledFetcher;
        assert_eq!(f.fetch_transcript("abc"), Err(EnrichmentError::Disabled));
        assert_eq!(
            f.fetch_media("https://tiktok.com/@a/video/1"),
            Err(EnrichmentError::Disabled)
        );
    }
}
