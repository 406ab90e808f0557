use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::dom::rewrite::{DocumentRewriter, RewriteContext, RewriteError};
use crate::engine::style::{StyleMode, StyleResolver};
use crate::net::fetch::{FetchError, HttpFetcher, PageFetcher};
use crate::net::guard::{validate, GuardError};

/// One proxied page request, already decoded from its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub target_url: String,
    pub style: StyleMode,
}

/// Error during page proxying
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// Request shape is wrong; the message is client-facing
    InvalidInput(String),
    RejectedUrl(GuardError),
    UpstreamNotHtml,
    UpstreamUnreachable(FetchError),
    UnparseableDocument,
}

impl ProxyError {
    /// Input/validation class, as opposed to upstream class.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ProxyError::InvalidInput(_) | ProxyError::RejectedUrl(_) | ProxyError::UpstreamNotHtml
        )
    }

    /// Message returned in the JSON error envelope.
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::InvalidInput(msg) => msg.clone(),
            ProxyError::RejectedUrl(_) => "Invalid or restricted URL".to_string(),
            ProxyError::UpstreamNotHtml => "Target is not an HTML page".to_string(),
            ProxyError::UpstreamUnreachable(_) => "Failed to fetch target URL".to_string(),
            ProxyError::UnparseableDocument => "Failed to parse target document".to_string(),
        }
    }
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::InvalidInput(msg) => write!(f, "[input] {}", msg),
            ProxyError::RejectedUrl(e) => write!(f, "[guard] {}", e),
            ProxyError::UpstreamNotHtml => write!(f, "[fetch] target is not HTML"),
            ProxyError::UpstreamUnreachable(e) => write!(f, "[fetch] {}", e),
            ProxyError::UnparseableDocument => write!(f, "[rewrite] document is unparseable"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<GuardError> for ProxyError {
    fn from(e: GuardError) -> Self {
        ProxyError::RejectedUrl(e)
    }
}

impl From<FetchError> for ProxyError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::NotHtml { .. } => ProxyError::UpstreamNotHtml,
            other => ProxyError::UpstreamUnreachable(other),
        }
    }
}

impl From<RewriteError> for ProxyError {
    fn from(_: RewriteError) -> Self {
        ProxyError::UnparseableDocument
    }
}

/// The proxy pipeline: Guard → Fetch → Style → Rewrite
pub struct ProxyEngine {
    fetcher: Arc<dyn PageFetcher>,
    styles: StyleResolver,
    rewriter: Arc<DocumentRewriter>,
}

impl ProxyEngine {
    pub fn new(config: &ProxyConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            styles: StyleResolver::new(config),
            rewriter: Arc::new(DocumentRewriter::new(config)),
        }
    }

    /// Engine backed by the real HTTP fetcher.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(config)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    /// Run one request through the full pipeline and return the rewritten page.
    pub async fn handle(&self, request: ProxyRequest) -> Result<String, ProxyError> {
        let target = validate(&request.target_url)?;

        let fetched = match self.fetcher.fetch(&target).await {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("fetch of {} failed: {}", target, e);
                return Err(e.into());
            }
        };
        log::debug!(
            "fetched {} ({} bytes, {})",
            fetched.final_url,
            fetched.byte_length,
            fetched.content_type
        );

        // Relative references resolve against where the redirects landed
        let base = validate(fetched.final_url.as_str()).unwrap_or(target);
        let ctx = RewriteContext::new(base, self.styles.resolve(&request.style));

        let rewriter = Arc::clone(&self.rewriter);
        let html = fetched.html;
        let rewritten = tokio::task::spawn_blocking(move || rewriter.rewrite(&html, &ctx))
            .await
            .map_err(|e| {
                log::error!("rewrite task failed: {}", e);
                ProxyError::UnparseableDocument
            })??;

        Ok(rewritten)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::net::fetch::FetchedDocument;
    use crate::net::guard::ResolvedUrl;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use url::Url;

    /// Serves one canned outcome and records what was asked for.
    pub(crate) struct FakeFetcher {
        outcome: Result<(String, String), FetchError>,
        pub(crate) requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn html(body: &str) -> Self {
            Self::respond(Ok((body.to_string(), "text/html; charset=utf-8".to_string())))
        }

        pub(crate) fn failing(err: FetchError) -> Self {
            Self::respond(Err(err))
        }

        fn respond(outcome: Result<(String, String), FetchError>) -> Self {
            Self {
                outcome,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &ResolvedUrl) -> Result<FetchedDocument, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            let (html, content_type) = self.outcome.clone()?;
            Ok(FetchedDocument {
                byte_length: html.len(),
                html,
                content_type,
                final_url: Url::parse(url.as_str()).unwrap(),
            })
        }
    }

    fn engine_with(fetcher: FakeFetcher) -> (ProxyEngine, Arc<FakeFetcher>) {
        let fetcher = Arc::new(fetcher);
        let engine = ProxyEngine::new(&ProxyConfig::default(), fetcher.clone());
        (engine, fetcher)
    }

    fn request(url: &str, style: StyleMode) -> ProxyRequest {
        ProxyRequest {
            target_url: url.to_string(),
            style,
        }
    }

    #[tokio::test]
    async fn rewrites_fetched_page() {
        let (engine, _) = engine_with(FakeFetcher::html(
            r#"<html><head></head><body><img src="a.png"></body></html>"#,
        ));
        let out = engine
            .handle(request("https://example.com/dir/", StyleMode::Default))
            .await
            .unwrap();
        assert!(out.contains(r#"src="https://example.com/dir/a.png""#));
        assert!(out.contains("/themes/pixel.css"));
    }

    #[tokio::test]
    async fn restricted_url_never_reaches_fetcher() {
        let (engine, fetcher) = engine_with(FakeFetcher::html("<p>x</p>"));
        let err = engine
            .handle(request("http://192.168.1.1/", StyleMode::Default))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::RejectedUrl(_)));
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_html_is_client_class() {
        let (engine, _) = engine_with(FakeFetcher::failing(FetchError::NotHtml {
            content_type: "application/json".into(),
        }));
        let err = engine
            .handle(request("https://example.com", StyleMode::Default))
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::UpstreamNotHtml);
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn transport_failures_are_upstream_class() {
        for failure in [
            FetchError::Timeout,
            FetchError::TooLarge { limit: 10 },
            FetchError::Status(500),
            FetchError::Transport("reset".into()),
        ] {
            let (engine, _) = engine_with(FakeFetcher::failing(failure.clone()));
            let err = engine
                .handle(request("https://example.com", StyleMode::Default))
                .await
                .unwrap_err();
            assert_eq!(err, ProxyError::UpstreamUnreachable(failure));
            assert!(!err.is_client_error());
            assert_eq!(err.public_message(), "Failed to fetch target URL");
        }
    }

    #[tokio::test]
    async fn empty_upstream_body_is_unparseable() {
        let (engine, _) = engine_with(FakeFetcher::html(""));
        let err = engine
            .handle(request("https://example.com", StyleMode::Default))
            .await
            .unwrap_err();
        assert_eq!(err, ProxyError::UnparseableDocument);
        assert!(!err.is_client_error());
    }
}
