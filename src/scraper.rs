//! Web scraping module for content extraction.
//!
//! Uses reqwest for fetching and scraper for HTML parsing. [`CachedFetcher`]
//! keeps fetched documents per URL until the pipeline clears it.

use async_trait::async_trait;
use lazy_static::lazy_static;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// User-Agent string identifying this scraper
const USER_AGENT: &str = concat!(
    "postcraft/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/cladam/postcraft)"
);

/// Fragments shorter than this are navigation, captions and the like
const MIN_FRAGMENT_CHARS: usize = 20;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref H1: Selector = Selector::parse("h1").expect("valid selector");
    static ref CONTENT: Selector =
        Selector::parse("p, h1, h2, h3, h4, h5, h6, li").expect("valid selector");
    static ref MAIN_AREAS: Vec<Selector> =
        ["article", "main", "[role='main']", ".content", "#content"]
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect();
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to fetch URL: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("unsupported content type: {0}")]
    NotText(String),
    #[error("no content found at URL")]
    NoContent,
}

/// Extracted content from a webpage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// The original URL
    pub url: String,
    /// Page title
    pub title: Option<String>,
    /// Main text content
    pub raw_text: String,
}

/// Anything that can turn a URL into a [`SourceDocument`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<SourceDocument, FetchError>;
}

/// Fetches pages over HTTP and extracts their readable text.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<SourceDocument, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(kind) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_text_content(kind) {
                return Err(FetchError::NotText(kind.to_string()));
            }
        }

        let html = response.text().await?;
        let doc = extract_document(url, &html)?;
        info!(
            url,
            chars = doc.raw_text.chars().count(),
            "extracted article text"
        );
        Ok(doc)
    }
}

/// A per-URL cache in front of another fetcher.
///
/// Entries live until [`CachedFetcher::clear`] is called.
pub struct CachedFetcher {
    inner: Arc<dyn Fetcher>,
    cache: Mutex<HashMap<String, SourceDocument>>,
}

impl CachedFetcher {
    pub fn new(inner: Arc<dyn Fetcher>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached document for `url`, fetching it on a miss.
    pub async fn fetch(&self, url: &str) -> Result<SourceDocument, FetchError> {
        if let Some(doc) = self.lock().get(url).cloned() {
            debug!(url, "fetch cache hit");
            return Ok(doc);
        }

        let doc = self.inner.fetch(url).await?;
        self.lock().insert(url.to_string(), doc.clone());
        Ok(doc)
    }

    /// Drop every cached document.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SourceDocument>> {
        // A poisoned map only means another caller panicked mid-insert; the data is still usable.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_text_content(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || mime == "application/xhtml+xml"
}

/// Parse an HTML page into a [`SourceDocument`]
pub fn extract_document(url: &str, html: &str) -> Result<SourceDocument, FetchError> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let text = extract_text(&document);

    if text.trim().is_empty() {
        return Err(FetchError::NoContent);
    }

    Ok(SourceDocument {
        url: url.to_string(),
        title,
        raw_text: text,
    })
}

/// Extract the page title from <title> or <h1>
fn extract_title(document: &Html) -> Option<String> {
    for selector in [&*TITLE, &*H1] {
        if let Some(element) = document.select(selector).next() {
            let title: String = element.text().collect();
            if !title.trim().is_empty() {
                return Some(title.trim().to_string());
            }
        }
    }
    None
}

/// Extract readable text content from the page
fn extract_text(document: &Html) -> String {
    // Try to find main content areas first
    for selector in MAIN_AREAS.iter() {
        if let Some(element) = document.select(selector).next() {
            let text = extract_text_from_element(&Html::parse_fragment(&element.html()));
            if !text.trim().is_empty() {
                return text;
            }
        }
    }

    extract_text_from_element(document)
}

/// Extract text from paragraphs and headings, excluding scripts and styles
fn extract_text_from_element(document: &Html) -> String {
    let mut paragraphs: Vec<String> = Vec::new();

    for element in document.select(&CONTENT) {
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if cleaned.chars().count() > MIN_FRAGMENT_CHARS {
            paragraphs.push(cleaned);
        }
    }

    paragraphs.join("\n\n")
}
