//! HTTP surface of the proxy.
//!
//! `GET <proxy_path>?url=&theme=` serves rewritten links, `POST <proxy_path>`
//! takes a JSON body and is the only way to supply an ad-hoc stylesheet.
//! Both decode into a [`ProxyRequest`] and share [`ProxyEngine::handle`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_SECURITY_POLICY, CONTENT_TYPE, X_FRAME_OPTIONS,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::ProxyConfig;
use crate::engine::pipeline::{ProxyEngine, ProxyError, ProxyRequest};
use crate::engine::style::StyleMode;
use crate::net::fetch::FetchError;

type SharedEngine = Arc<ProxyEngine>;

const MISSING_URL: &str = "Missing URL parameter";

#[derive(Debug)]
pub enum ServeError {
    Io(std::io::Error),
    Client(FetchError),
}

impl std::fmt::Display for ServeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeError::Io(err) => write!(f, "io error: {}", err),
            ServeError::Client(err) => write!(f, "cannot build upstream client: {}", err),
        }
    }
}

impl std::error::Error for ServeError {}

impl From<std::io::Error> for ServeError {
    fn from(value: std::io::Error) -> Self {
        ServeError::Io(value)
    }
}

impl From<FetchError> for ServeError {
    fn from(value: FetchError) -> Self {
        ServeError::Client(value)
    }
}

/// Bind, serve until Ctrl-C / SIGTERM, then return.
pub async fn serve(config: ProxyConfig) -> Result<(), ServeError> {
    let engine = Arc::new(ProxyEngine::from_config(&config)?);
    let router = build_router(engine, &config);

    log::info!(
        "listening on {} (proxy at {}, default theme {})",
        config.bind,
        config.proxy_path,
        config.default_preset
    );
    let listener = TcpListener::bind(config.bind).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("server exited");
    Ok(())
}

pub fn build_router(engine: SharedEngine, config: &ProxyConfig) -> Router {
    Router::new()
        .route(&config.proxy_path, get(proxy_query).post(proxy_body))
        .route("/healthz", get(health))
        .layer(DefaultBodyLimit::max(config.max_request_bytes))
        .with_state(engine)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
    theme: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyBody {
    url: Option<String>,
    theme: Option<String>,
    custom_css: Option<String>,
}

async fn proxy_query(
    State(engine): State<SharedEngine>,
    query: Result<Query<ProxyQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            log::debug!("rejected query string: {}", rejection);
            return ProxyError::InvalidInput(format!(
                "Invalid query string: {}",
                rejection.body_text()
            ))
            .into_response();
        }
    };
    let Some(url) = query.url.filter(|u| !u.trim().is_empty()) else {
        return ProxyError::InvalidInput(MISSING_URL.into()).into_response();
    };
    let request = ProxyRequest {
        target_url: url,
        style: StyleMode::from_parts(query.theme.as_deref(), None),
    };
    run(&engine, request).await
}

/// The body is decoded by hand so a missing or wrong `Content-Type` is not
/// an error on its own.
async fn proxy_body(
    State(engine): State<SharedEngine>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            log::debug!("rejected POST body: {}", rejection);
            return ProxyError::InvalidInput(format!(
                "Invalid request body: {}",
                rejection.body_text()
            ))
            .into_response();
        }
    };
    let body: ProxyBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            log::debug!("rejected POST body: {}", e);
            return ProxyError::InvalidInput(format!("Invalid request body: {}", e)).into_response();
        }
    };
    let Some(url) = body.url.filter(|u| !u.trim().is_empty()) else {
        return ProxyError::InvalidInput(MISSING_URL.into()).into_response();
    };
    let request = ProxyRequest {
        target_url: url,
        style: StyleMode::from_parts(body.theme.as_deref(), body.custom_css.as_deref()),
    };
    run(&engine, request).await
}

async fn run(engine: &ProxyEngine, request: ProxyRequest) -> Response {
    log::info!(
        "proxy {} ({})",
        request.target_url,
        match &request.style {
            StyleMode::Default => "default theme".to_string(),
            StyleMode::Preset(name) => format!("theme {}", name),
            StyleMode::AdHoc(css) => format!("custom css, {} bytes", css.len()),
        }
    );
    match engine.handle(request).await {
        Ok(html) => html_response(html),
        Err(e) => {
            log::info!("proxy request failed: {}", e);
            e.into_response()
        }
    }
}

fn html_response(html: String) -> Response {
    (
        [
            (CONTENT_TYPE, "text/html; charset=utf-8"),
            (X_FRAME_OPTIONS, "SAMEORIGIN"),
            (CONTENT_SECURITY_POLICY, "frame-ancestors 'self'"),
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        html,
    )
        .into_response()
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::BAD_GATEWAY
        };
        let payload = json!({ "error": self.public_message() });
        (status, [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(payload)).into_response()
    }
}
