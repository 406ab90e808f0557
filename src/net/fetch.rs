use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::ProxyConfig;
use crate::net::guard::{validate_url, ResolvedUrl};

/// Raw upstream page, alive for one request only.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub html: String,
    pub content_type: String,
    pub byte_length: usize,
    /// Where the last redirect hop landed
    pub final_url: Url,
}

/// Error during fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Timeout,
    TooLarge { limit: usize },
    NotHtml { content_type: String },
    Status(u16),
    Transport(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "upstream timed out"),
            FetchError::TooLarge { limit } => {
                write!(f, "upstream body exceeds {} bytes", limit)
            }
            FetchError::NotHtml { content_type } => {
                write!(f, "upstream content-type is not HTML: {:?}", content_type)
            }
            FetchError::Status(code) => write!(f, "upstream answered HTTP {}", code),
            FetchError::Transport(msg) => write!(f, "request failed: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Source of upstream pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &ResolvedUrl) -> Result<FetchedDocument, FetchError>;
}

/// Single-attempt HTTP fetcher with a time budget and a body cap.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &ProxyConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.fetch_timeout)
            .connect_timeout(config.fetch_timeout.min(Duration::from_secs(5)))
            .redirect(guarded_redirects(config.max_redirects))
            .build()
            .map_err(|e| FetchError::Transport(format!("client error: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Follow at most `max` hops, and never into a host the guard refuses.
fn guarded_redirects(max: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max {
            return attempt.error(format!("more than {} redirects", max));
        }
        match validate_url(attempt.url()) {
            Ok(_) => attempt.follow(),
            Err(e) => {
                let reason = format!("redirect refused: {}", e);
                attempt.error(reason)
            }
        }
    })
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &ResolvedUrl) -> Result<FetchedDocument, FetchError> {
        log::debug!("GET {}", url);

        let mut response = self
            .client
            .get(url.as_str())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.to_ascii_lowercase().contains("text/html") {
            return Err(FetchError::NotHtml { content_type });
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes as u64) {
            return Err(FetchError::TooLarge {
                limit: self.max_body_bytes,
            });
        }

        let final_url = response.url().clone();

        // The buffer is dropped on every early return, so an aborted
        // transfer never reaches the rewriter.
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let byte_length = body.len();
        let (html, encoding, lossy) = charset_of(&content_type).decode(&body);
        if lossy {
            log::debug!("{} had bytes invalid in {}", final_url, encoding.name());
        }
        let html = html.into_owned();

        Ok(FetchedDocument {
            html,
            content_type,
            byte_length,
            final_url,
        })
    }
}

/// Encoding named by the `charset` parameter, UTF-8 when absent or unknown.
/// A byte-order mark still wins when decoding.
fn charset_of(content_type: &str) -> &'static Encoding {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, label)| Encoding::for_label(label.trim().trim_matches('"').as_bytes()))
        .unwrap_or(UTF_8)
}
