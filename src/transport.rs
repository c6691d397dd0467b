//! HTTP transport for Scholar pages.
//!
//! The pipeline only ever needs "GET this URL as HTML", so that is the whole
//! `Transport` trait. `HttpTransport` is the reqwest implementation with
//! browser-like headers, optional proxy and optional session cookies; tests
//! substitute in-memory transports.

use crate::access::AccessConfig;
use crate::config::HttpSettings;
use crate::error::{Result, ScholarError};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Desktop Chrome user agent sent unless overridden in the config file
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Fetches HTML documents
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and return the body of a successful, non-CAPTCHA response.
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    cookie_header: String,
}

impl HttpTransport {
    /// Build a client for one access configuration.
    ///
    /// `cookie_header` is attached to every request when non-empty.
    pub fn new(http: &HttpSettings, access: &AccessConfig, cookie_header: String) -> Result<Self> {
        let user_agent = http.user_agent.as_deref().unwrap_or(USER_AGENT);

        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(http.timeout())
            .cookie_store(true);

        if let Some(proxy_url) = access.proxy() {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                ScholarError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cookie_header,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<String> {
        debug!(url = %url, "GET");

        let mut request = self
            .client
            .get(url.as_str())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Upgrade-Insecure-Requests", "1");

        if !self.cookie_header.is_empty() {
            request = request.header("Cookie", &self.cookie_header);
        }

        let response = request.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(ScholarError::RateLimited(retry_after));
        }

        if !status.is_success() {
            return Err(ScholarError::Api {
                code: status.as_u16(),
                message: status.to_string(),
            });
        }

        let html = response.text().await?;
        if is_captcha_page(&html) {
            return Err(ScholarError::Captcha);
        }
        Ok(html)
    }
}

/// Whether Scholar served its bot check instead of the requested page.
pub fn is_captcha_page(html: &str) -> bool {
    html.contains("Solving the above CAPTCHA")
        || html.contains("unusual traffic")
        || html.contains("id=\"gs_captcha_f\"")
}
