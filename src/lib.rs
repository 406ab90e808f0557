pub mod config;
pub mod dom;
pub mod engine;
pub mod net;
pub mod server;

pub use config::ProxyConfig;
pub use engine::pipeline::{ProxyEngine, ProxyError, ProxyRequest};
pub use engine::style::{NavigationMode, StyleMode};
