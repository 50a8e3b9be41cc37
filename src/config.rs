use crate::glyph::LoadingFallback;
use crate::search::ResponseOrder;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Origin of the walker backend, without a trailing slash.
    pub base_url: String,
    /// Path the search form posts to; also the base of history URLs.
    pub search_path: String,
    pub response_order: ResponseOrder,
    pub loading_fallback: LoadingFallback,
    /// Whether `pushState` is available.
    pub history: bool,
    /// Per-request timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            search_path: "/walker".to_string(),
            response_order: ResponseOrder::default(),
            loading_fallback: LoadingFallback::default(),
            history: true,
            timeout: None,
        }
    }
}
