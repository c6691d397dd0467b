//! Access methods and the fallback chain over them.
//!
//! An access method decides how requests reach Scholar: directly, through a
//! public proxy, through the ScraperAPI proxy, or through Tor. The active
//! choice is held in an explicit `AccessConfig` that is reset before every
//! attempt, so nothing configured for one method leaks into the next.

use crate::config::AccessSettings;
use crate::error::{Result, ScholarError};
use rand::seq::SliceRandom;
use std::fmt;
use std::future::Future;
use tracing::{info, warn};

/// ScraperAPI proxy-mode endpoint; the API key is the password
const SCRAPERAPI_PROXY_HOST: &str = "proxy-server.scraperapi.com:8001";

/// One way of reaching the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum AccessMethod {
    /// Random proxy from the configured public pool; the default, which
    /// falls back through every other method
    #[value(alias = "default")]
    Free,
    /// Direct connection
    None,
    /// Paid ScraperAPI proxy (needs an API key)
    #[value(name = "scraperapi")]
    ScraperApi,
    /// Local Tor SOCKS endpoint
    Tor,
}

impl AccessMethod {
    /// Fallback order used when the default method is requested
    pub const DEFAULT_CHAIN: [AccessMethod; 4] = [
        AccessMethod::Free,
        AccessMethod::None,
        AccessMethod::ScraperApi,
        AccessMethod::Tor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AccessMethod::Free => "free",
            AccessMethod::None => "none",
            AccessMethod::ScraperApi => "scraperapi",
            AccessMethod::Tor => "tor",
        }
    }

    /// Methods to try for a request: the full chain for `Free` (the default),
    /// otherwise only the requested method.
    pub fn fallback_chain(requested: AccessMethod) -> Vec<AccessMethod> {
        if requested == AccessMethod::Free {
            Self::DEFAULT_CHAIN.to_vec()
        } else {
            vec![requested]
        }
    }
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Network configuration in effect for one attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessConfig {
    method: Option<AccessMethod>,
    proxy: Option<String>,
}

/// Result of configuring a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Configured {
    Ready,
    /// Credentials are missing; the method is passed over without counting
    /// as a failed attempt.
    Skipped(String),
}

impl AccessConfig {
    pub fn method(&self) -> Option<AccessMethod> {
        self.method
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Whether requests go out without a proxy.
    pub fn is_direct(&self) -> bool {
        self.proxy.is_none()
    }

    /// Proxy the scripted browser can use.
    ///
    /// Chromium cannot authenticate against a proxy given on the command
    /// line, so credentialed proxies yield `None` and discovery falls back
    /// to paginated HTTP.
    pub fn browser_proxy(&self) -> Option<&str> {
        self.proxy().filter(|p| {
            url::Url::parse(p)
                .map(|u| u.username().is_empty() && u.password().is_none())
                .unwrap_or(false)
        })
    }

    /// Clear everything a previous attempt configured.
    pub fn reset(&mut self) {
        self.method = None;
        self.proxy = None;
    }

    /// Configure `method` from `settings`.
    pub fn configure(&mut self, method: AccessMethod, settings: &AccessSettings) -> Result<Configured> {
        let proxy = match method {
            AccessMethod::None => None,
            AccessMethod::Free => {
                let mut rng = rand::thread_rng();
                let picked = settings.free_proxies.choose(&mut rng).ok_or_else(|| {
                    ScholarError::Config("No free proxies configured in [access].free_proxies".to_string())
                })?;
                Some(picked.clone())
            }
            AccessMethod::ScraperApi => match settings.scraperapi_key.as_deref() {
                Some(key) if !key.trim().is_empty() => Some(format!(
                    "http://scraperapi:{}@{}",
                    key.trim(),
                    SCRAPERAPI_PROXY_HOST
                )),
                _ => {
                    return Ok(Configured::Skipped(
                        "scraperapi requires an API key (--scraperapi-key)".to_string(),
                    ))
                }
            },
            AccessMethod::Tor => Some(settings.tor_proxy.clone()),
        };

        if let Some(p) = &proxy {
            reqwest::Proxy::all(p.as_str()).map_err(|e| {
                ScholarError::Config(format!("Invalid proxy for {}: {}", method, e))
            })?;
        }

        self.method = Some(method);
        self.proxy = proxy;
        Ok(Configured::Ready)
    }
}

/// Outcome of one method in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    Succeeded,
    Failed(String),
    Skipped(String),
}

/// Record of one method in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub method: AccessMethod,
    pub status: AttemptStatus,
}

/// First successful attempt and the history leading to it
#[derive(Debug)]
pub struct FallbackSuccess<T> {
    pub method: AccessMethod,
    pub value: T,
    pub attempts: Vec<Attempt>,
}

/// Run `retrieve` under each method in `methods` until one succeeds.
///
/// The access configuration is reset before each method. Methods whose
/// credentials are absent are skipped. When every method fails, the error
/// names each attempted method and carries the last underlying error.
pub async fn run_with_fallback<T, F, Fut>(
    methods: &[AccessMethod],
    settings: &AccessSettings,
    mut retrieve: F,
) -> Result<FallbackSuccess<T>>
where
    F: FnMut(AccessConfig) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut access = AccessConfig::default();
    let mut attempts = Vec::with_capacity(methods.len());
    let mut last_error: Option<String> = None;

    for &method in methods {
        access.reset();

        match access.configure(method, settings) {
            Ok(Configured::Ready) => {}
            Ok(Configured::Skipped(reason)) => {
                info!(method = %method, reason = %reason, "Skipping access method");
                attempts.push(Attempt {
                    method,
                    status: AttemptStatus::Skipped(reason),
                });
                continue;
            }
            Err(e) => {
                warn!(method = %method, error = %e, "Failed to configure access method");
                last_error = Some(e.to_string());
                attempts.push(Attempt {
                    method,
                    status: AttemptStatus::Failed(e.to_string()),
                });
                continue;
            }
        }

        info!(method = %method, "Trying access method");
        match retrieve(access.clone()).await {
            Ok(value) => {
                info!(method = %method, "Access method succeeded");
                attempts.push(Attempt {
                    method,
                    status: AttemptStatus::Succeeded,
                });
                return Ok(FallbackSuccess {
                    method,
                    value,
                    attempts,
                });
            }
            Err(e) => {
                warn!(method = %method, error = %e, "Access method failed");
                last_error = Some(e.to_string());
                attempts.push(Attempt {
                    method,
                    status: AttemptStatus::Failed(e.to_string()),
                });
            }
        }
    }

    let attempted = attempts
        .iter()
        .filter(|a| matches!(a.status, AttemptStatus::Failed(_)))
        .map(|a| a.method.name())
        .collect::<Vec<_>>()
        .join(", ");

    Err(ScholarError::AccessExhausted {
        attempted: if attempted.is_empty() {
            "none".to_string()
        } else {
            attempted
        },
        last_error: last_error
            .unwrap_or_else(|| "no access method could be configured".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn settings_with_pool() -> AccessSettings {
        AccessSettings {
            free_proxies: vec!["http://10.0.0.1:3128".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_chain_order() {
        assert_eq!(
            AccessMethod::fallback_chain(AccessMethod::Free),
            vec![
                AccessMethod::Free,
                AccessMethod::None,
                AccessMethod::ScraperApi,
                AccessMethod::Tor
            ]
        );
        assert_eq!(
            AccessMethod::fallback_chain(AccessMethod::Tor),
            vec![AccessMethod::Tor]
        );
    }

    #[test]
    fn test_configure_and_reset() -> Result<()> {
        let mut access = AccessConfig::default();
        assert_eq!(
            access.configure(AccessMethod::Free, &settings_with_pool())?,
            Configured::Ready
        );
        assert_eq!(access.proxy(), Some("http://10.0.0.1:3128"));
        assert_eq!(access.method(), Some(AccessMethod::Free));

        access.reset();
        assert!(access.is_direct());
        assert_eq!(access.method(), None);
        Ok(())
    }

    #[test]
    fn test_scraperapi_without_key_is_skipped() -> Result<()> {
        let mut access = AccessConfig::default();
        let outcome = access.configure(AccessMethod::ScraperApi, &AccessSettings::default())?;
        assert!(matches!(outcome, Configured::Skipped(_)));
        assert!(access.is_direct());
        Ok(())
    }

    #[test]
    fn test_scraperapi_proxy_hidden_from_browser() -> Result<()> {
        let settings = AccessSettings {
            scraperapi_key: Some("KEY".to_string()),
            ..Default::default()
        };
        let mut access = AccessConfig::default();
        access.configure(AccessMethod::ScraperApi, &settings)?;
        assert!(access.proxy().is_some_and(|p| p.contains("KEY")));
        assert_eq!(access.browser_proxy(), None);

        access.reset();
        access.configure(AccessMethod::Tor, &settings)?;
        assert_eq!(access.browser_proxy(), Some("socks5h://127.0.0.1:9050"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fallback_stops_at_first_success() {
        let seen = RefCell::new(Vec::new());
        let result = run_with_fallback(
            &[AccessMethod::Free, AccessMethod::None, AccessMethod::Tor],
            &settings_with_pool(),
            |access| {
                seen.borrow_mut().push(access.method());
                let direct = access.is_direct();
                async move {
                    if direct {
                        Ok("records")
                    } else {
                        Err(ScholarError::Captcha)
                    }
                }
            },
        )
        .await
        .expect("second method succeeds");

        assert_eq!(result.method, AccessMethod::None);
        assert_eq!(result.value, "records");
        assert_eq!(
            seen.into_inner(),
            vec![Some(AccessMethod::Free), Some(AccessMethod::None)]
        );
        assert_eq!(result.attempts.len(), 2);
        assert!(matches!(result.attempts[0].status, AttemptStatus::Failed(_)));
        assert_eq!(result.attempts[1].status, AttemptStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_each_attempt_starts_from_reset_config() {
        let seen = RefCell::new(Vec::new());
        let settings = AccessSettings {
            free_proxies: vec!["http://10.0.0.1:3128".to_string()],
            ..Default::default()
        };
        let _ = run_with_fallback(
            &[AccessMethod::Free, AccessMethod::None],
            &settings,
            |access| {
                seen.borrow_mut().push(access.proxy().map(str::to_string));
                async { Err::<(), _>(ScholarError::Captcha) }
            },
        )
        .await;

        assert_eq!(
            seen.into_inner(),
            vec![Some("http://10.0.0.1:3128".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_all_methods_fail() {
        let err = run_with_fallback(
            &AccessMethod::DEFAULT_CHAIN,
            &settings_with_pool(),
            |access| async move {
                Err::<(), _>(ScholarError::Browser(format!("blocked via {:?}", access.method())))
            },
        )
        .await
        .expect_err("all fail");

        match err {
            ScholarError::AccessExhausted {
                attempted,
                last_error,
            } => {
                // scraperapi has no key and is skipped, not attempted
                assert_eq!(attempted, "free, none, tor");
                assert!(last_error.contains("Tor"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_free_pool_counts_as_failure() {
        let result = run_with_fallback(
            &[AccessMethod::Free, AccessMethod::None],
            &AccessSettings::default(),
            |_access| async { Ok(1) },
        )
        .await
        .expect("none succeeds");

        assert_eq!(result.method, AccessMethod::None);
        assert!(matches!(result.attempts[0].status, AttemptStatus::Failed(_)));
    }
}
