//! Session cookies for direct Scholar requests.
//!
//! A browser-exported cookie jar (`~/.gsprofile_cookies.json`) lowers the
//! chance of being served a CAPTCHA. Cookies are only attached on direct
//! access; proxied attempts go out without them.

use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const COOKIE_FILE: &str = ".gsprofile_cookies.json";

fn default_cookie_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(COOKIE_FILE))
        .ok_or_else(|| ScholarError::Config("Cannot determine home directory".to_string()))
}

/// Cookie entry in the browser devtools export format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, alias = "httpOnly")]
    pub http_only: bool,
    #[serde(default, alias = "expirationDate")]
    pub expires: Option<f64>,
}

/// Cookie jar persisted as JSON
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    /// Jar at the default location in the home directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_cookie_path()?,
        })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cookies; a missing or unreadable file yields an empty jar.
    pub fn load(&self) -> Vec<Cookie> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Cookie file not found");
            return Vec::new();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Vec<Cookie>>(&content) {
                Ok(cookies) => {
                    info!(count = cookies.len(), path = %self.path.display(), "Loaded cookies");
                    cookies
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse cookie file");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to read cookie file");
                Vec::new()
            }
        }
    }

    /// Validate a JSON export and store it, replacing the current jar.
    pub fn import(&self, json: &str) -> Result<usize> {
        let cookies: Vec<Cookie> = serde_json::from_str(json)?;
        let content = serde_json::to_string_pretty(&cookies)?;
        std::fs::write(&self.path, content)?;
        info!(count = cookies.len(), path = %self.path.display(), "Saved cookies");
        Ok(cookies.len())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "Cleared cookies");
        }
        Ok(())
    }
}

/// `Cookie` header value for the Google cookies in `cookies`.
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .filter(|c| c.domain.contains("google"))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}
