use scraper::{Html, Selector};
use serde::Deserialize;

use super::{EnrichmentError, HttpFetch, MediaFetcher, MediaInfo};

const TIKTOK_OEMBED_URL: &str = "https://www.tiktok.com/oembed";

#[derive(Debug, Deserialize)]
struct OembedResponse {
    title: Option<String>,
    author_name: Option<String>,
}

/// Caption and uploader of short-video posts (TikTok, Instagram reels).
pub struct SocialMediaFetcher {
    http: HttpFetch,
    oembed_url: String,
}

impl SocialMediaFetcher {
    pub fn new(http: HttpFetch) -> Self {
        Self {
            http,
            oembed_url: TIKTOK_OEMBED_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_oembed_url(mut self, url: &str) -> Self {
        self.oembed_url = url.to_string();
        self
    }

    fn fetch_oembed(&self, url: &str) -> Result<MediaInfo, EnrichmentError> {
        let endpoint = url::Url::parse_with_params(&self.oembed_url, &[("url", url)])
            .map_err(|e| EnrichmentError::Terminal(e.to_string()))?;

        let body = self.http.get_text(endpoint.as_str())?;
        let resp: OembedResponse = serde_json::from_str(&body)
            .map_err(|e| EnrichmentError::Terminal(format!("malformed oembed response: {e}")))?;

        // TikTok puts the caption in `title`.
        Ok(MediaInfo {
            title: None,
            uploader: non_empty(resp.author_name),
            description: non_empty(resp.title),
        })
    }

    fn fetch_open_graph(&self, url: &str) -> Result<MediaInfo, EnrichmentError> {
        let html = self.http.get_text(url)?;
        Ok(parse_open_graph(&html))
    }
}

impl MediaFetcher for SocialMediaFetcher {
    fn fetch_media(&self, url: &str) -> Result<MediaInfo, EnrichmentError> {
        if url.contains("tiktok.com") {
            match self.fetch_oembed(url) {
                Ok(info) if info.has_any_data() => return Ok(info),
                Ok(_) => log::debug!("{url}: oembed returned nothing useful"),
                Err(e) => log::debug!("{url}: oembed failed: {e}"),
            }
        }

        let info = self.fetch_open_graph(url)?;
        if !info.has_any_data() {
            return Err(EnrichmentError::Terminal("page has no post metadata".into()));
        }

        Ok(info)
    }

    fn name(&self) -> &'static str {
        "social"
    }
}

fn parse_open_graph(html: &str) -> MediaInfo {
    let document = Html::parse_document(html);
    let meta_selector = Selector::parse("meta").expect("valid meta selector");
    let title_selector = Selector::parse("title").expect("valid title selector");

    let mut title = None;
    let mut uploader = None;
    let mut description = None;

    for element in document.select(&meta_selector) {
        let key = element
            .attr("property")
            .or_else(|| element.attr("name"))
            .unwrap_or_default();
        // attribute values come back with entities already decoded
        let value = element.attr("content").map(str::to_string);

        match key {
            "og:title" | "twitter:title" if title.is_none() => title = non_empty(value),
            "og:description" | "twitter:description" | "description" if description.is_none() => {
                description = non_empty(value)
            }
            "author" | "twitter:creator" if uploader.is_none() => uploader = non_empty(value),
            _ => {}
        }
    }

    if title.is_none() {
        title = non_empty(
            document
                .select(&title_selector)
                .next()
                .map(|t| t.text().collect::<String>()),
        );
    }

    MediaInfo {
        title,
        uploader,
        description,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
