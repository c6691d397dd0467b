//! Configuration file support for gsprofile.
//!
//! All pacing and retry policy values live here so that tests can run the
//! pipeline with zero delays. Every section is optional; missing keys fall
//! back to the defaults shown below.
//!
//! ```toml
//! profile_url = "https://scholar.google.com/citations?user=ssXOHSoAAAAJ&hl=en"
//!
//! [discovery]
//! page_size = 100
//! page_delay_secs = 2.0
//! reveal_max_iterations = 50
//! reveal_settle_ms = 2000
//! use_browser = true
//! page_load_timeout_secs = 30
//!
//! [extraction]
//! max_attempts = 3
//! retry_delay_secs = 3.0
//! request_delay_secs = 1.0
//!
//! [http]
//! timeout_secs = 30
//!
//! [access]
//! free_proxies = ["http://203.0.113.7:3128"]
//! scraperapi_key = "..."
//! tor_proxy = "socks5h://127.0.0.1:9050"
//!
//! [output]
//! directory = "output"
//! format = "xml"
//! ```

use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "gsprofile.toml";

/// Default Tor SOCKS endpoint
pub const DEFAULT_TOR_PROXY: &str = "socks5h://127.0.0.1:9050";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Profile URL used when none is given on the command line
    #[serde(default)]
    pub profile_url: Option<String>,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub extraction: ExtractionSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub access: AccessSettings,

    #[serde(default)]
    pub output: OutputSettings,
}

/// Link discovery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_page_delay")]
    pub page_delay_secs: f64,

    #[serde(default = "default_reveal_max")]
    pub reveal_max_iterations: usize,

    #[serde(default = "default_reveal_settle")]
    pub reveal_settle_ms: u64,

    #[serde(default = "default_true")]
    pub use_browser: bool,

    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,
}

impl DiscoverySettings {
    pub fn page_delay(&self) -> Duration {
        secs(self.page_delay_secs)
    }

    pub fn reveal_settle(&self) -> Duration {
        Duration::from_millis(self.reveal_settle_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_delay_secs: default_page_delay(),
            reveal_max_iterations: default_reveal_max(),
            reveal_settle_ms: default_reveal_settle(),
            use_browser: true,
            page_load_timeout_secs: default_page_load_timeout(),
        }
    }
}

/// Detail extraction retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,

    #[serde(default = "default_request_delay")]
    pub request_delay_secs: f64,
}

impl ExtractionSettings {
    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay_secs)
    }

    pub fn request_delay(&self) -> Duration {
        secs(self.request_delay_secs)
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            request_delay_secs: default_request_delay(),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Overrides the built-in desktop browser user agent
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: None,
        }
    }
}

/// Credentials and endpoints for the access methods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessSettings {
    /// Pool of public proxies for the `free` method
    #[serde(default)]
    pub free_proxies: Vec<String>,

    #[serde(default)]
    pub scraperapi_key: Option<String>,

    #[serde(default = "default_tor_proxy")]
    pub tor_proxy: String,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            free_proxies: Vec::new(),
            scraperapi_key: None,
            tor_proxy: default_tor_proxy(),
        }
    }
}

/// Output document settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            format: OutputFormat::default(),
        }
    }
}

/// Serialization format of the output document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from an explicit path, or from `gsprofile.toml` in the
    /// working directory if it exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ScholarError::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)?;
        let settings = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded config file");
        Ok(settings)
    }

    /// Settings with every delay set to zero, for tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.discovery.page_delay_secs = 0.0;
        self.discovery.reveal_settle_ms = 0;
        self.extraction.retry_delay_secs = 0.0;
        self.extraction.request_delay_secs = 0.0;
        self
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_page_size() -> usize {
    100
}

fn default_page_delay() -> f64 {
    2.0
}

fn default_reveal_max() -> usize {
    50
}

fn default_reveal_settle() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_page_load_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    3.0
}

fn default_request_delay() -> f64 {
    1.0
}

fn default_timeout() -> u64 {
    30
}

fn default_tor_proxy() -> String {
    DEFAULT_TOR_PROXY.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_policy() {
        let settings = Settings::default();
        assert_eq!(settings.discovery.page_size, 100);
        assert_eq!(settings.discovery.page_delay(), Duration::from_secs(2));
        assert_eq!(settings.discovery.reveal_max_iterations, 50);
        assert_eq!(settings.extraction.max_attempts, 3);
        assert_eq!(settings.extraction.retry_delay(), Duration::from_secs(3));
        assert_eq!(settings.extraction.request_delay(), Duration::from_secs(1));
        assert_eq!(settings.output.format, OutputFormat::Xml);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let settings = Settings::from_toml(
            r#"
            profile_url = "https://scholar.google.com/citations?user=abc"

            [discovery]
            page_size = 20

            [access]
            free_proxies = ["http://10.0.0.1:8080"]

            [output]
            format = "json"
            "#,
        )?;

        assert_eq!(settings.discovery.page_size, 20);
        assert_eq!(settings.discovery.reveal_max_iterations, 50);
        assert_eq!(settings.access.free_proxies.len(), 1);
        assert_eq!(settings.access.tor_proxy, DEFAULT_TOR_PROXY);
        assert_eq!(settings.output.format, OutputFormat::Json);
        assert!(settings.profile_url.is_some());
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Settings::from_toml("[discovery\npage_size = ").expect_err("should fail");
        assert!(matches!(err, ScholarError::ConfigFile(_)));
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[extraction]\nmax_attempts = 5")?;
        let settings = Settings::load(Some(file.path()))?;
        assert_eq!(settings.extraction.max_attempts, 5);
        Ok(())
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Settings::load(Some(Path::new("/nonexistent/gsprofile.toml")))
            .expect_err("should fail");
        assert!(matches!(err, ScholarError::Config(_)));
    }

    #[test]
    fn test_without_delays() {
        let settings = Settings::default().without_delays();
        assert_eq!(settings.discovery.page_delay(), Duration::ZERO);
        assert_eq!(settings.discovery.reveal_settle(), Duration::ZERO);
        assert_eq!(settings.extraction.retry_delay(), Duration::ZERO);
        assert_eq!(settings.extraction.request_delay(), Duration::ZERO);
    }
}
