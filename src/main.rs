use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use webskin_proxy::config::{ProxyConfig, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_PRESET};
use webskin_proxy::server;

/// Re-skinning HTML proxy
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "WEBSKIN_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Route for both proxy entry points
    #[arg(long, env = "WEBSKIN_PROXY_PATH", default_value = "/proxy")]
    proxy_path: String,

    /// Prefix the preset stylesheets are served under
    #[arg(long, env = "WEBSKIN_THEMES_PATH", default_value = "/themes")]
    themes_path: String,

    /// Preset used when a request names none
    #[arg(long, env = "WEBSKIN_DEFAULT_THEME", default_value = DEFAULT_PRESET)]
    default_theme: String,

    /// Upstream fetch budget in seconds
    #[arg(long, env = "WEBSKIN_FETCH_TIMEOUT", default_value_t = 10)]
    fetch_timeout: u64,

    /// Largest upstream body accepted, in bytes
    #[arg(long, env = "WEBSKIN_MAX_BODY", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body: usize,

    /// Largest POST body accepted, in bytes
    #[arg(long, env = "WEBSKIN_MAX_REQUEST", default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    max_request: usize,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        let mut config = ProxyConfig::default()
            .with_proxy_path(self.proxy_path)
            .with_themes_path(self.themes_path)
            .with_default_preset(self.default_theme)
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout))
            .with_max_body_bytes(self.max_body)
            .with_max_request_bytes(self.max_request);
        config.bind = self.bind;
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = Args::parse().into_config();
    match server::serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
