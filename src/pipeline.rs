//! End-to-end runs: discovery, sequential extraction, access fallback.
//!
//! Everything here is sequential. One request is in flight at a time and the
//! configured delays sit between them.

use crate::access::{run_with_fallback, AccessConfig, AccessMethod, FallbackSuccess};
use crate::browser::{BrowserLauncher, ChromiumLauncher};
use crate::config::Settings;
use crate::cookies::{cookie_header, Cookie};
use crate::detail::{fetch_publication, parse_publication_detail, FetchOutcome};
use crate::discovery::{discover, list_publications, ListedPublication};
use crate::error::{OptionExt, Result, ScholarError};
use crate::models::{PublicationRecord, ScrapeDocument, MISSING};
use crate::profile::{collapse_text, selector, ProfileLocation};
use crate::transport::{HttpTransport, Transport};
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

/// Per-run choices that are not part of `Settings`
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Requested method; `Free` expands to the full fallback chain
    pub access_method: AccessMethod,
    /// Allow the scripted browser for discovery
    pub use_browser: bool,
    /// Session cookies sent with direct requests
    pub cookies: Vec<Cookie>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            access_method: AccessMethod::Free,
            use_browser: true,
            cookies: Vec::new(),
        }
    }
}

/// Result of scraping one profile
#[derive(Debug, Clone, Default)]
pub struct ScrapeOutcome {
    pub document: ScrapeDocument,
    /// Detail links found by discovery
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Discover every publication of the profile and extract each one in order.
///
/// The URL is validated before anything is requested. Records that exhaust
/// their retry budget are counted in `failed` and left out of the document.
pub async fn scrape_profile(
    transport: &dyn Transport,
    launcher: Option<&dyn BrowserLauncher>,
    profile_url: &str,
    settings: &Settings,
) -> Result<ScrapeOutcome> {
    let profile = ProfileLocation::parse(profile_url)?;
    info!(user = %profile.user_id(), "Scraping author profile");

    let discovery = discover(transport, launcher, &profile, &settings.discovery).await?;
    let total = discovery.links.len();
    let mut outcome = ScrapeOutcome {
        discovered: total,
        ..Default::default()
    };

    for (index, link) in discovery.links.iter().enumerate() {
        let url = match Url::parse(link) {
            Ok(url) => url,
            Err(e) => {
                warn!(link = %link, error = %e, "Skipping malformed detail link");
                outcome.failed += 1;
                continue;
            }
        };

        match fetch_publication(transport, &url, &settings.extraction).await {
            FetchOutcome::Record(record) => {
                info!(
                    index = index + 1,
                    total,
                    title = %record.title,
                    year = record.year().unwrap_or(MISSING),
                    "Extracted publication"
                );
                outcome.document.articles.push(*record);
                outcome.succeeded += 1;
            }
            FetchOutcome::Failed { attempts, reason } => {
                warn!(
                    index = index + 1,
                    total,
                    url = %url,
                    attempts,
                    reason = %reason,
                    "Giving up on publication"
                );
                outcome.failed += 1;
            }
        }
    }

    outcome.document.author = discovery.author.map(|mut author| {
        author.total_publications = outcome.discovered;
        author
    });

    info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Profile scrape complete"
    );
    Ok(outcome)
}

/// Scrape a profile under the requested access method(s).
///
/// Each method gets a fresh transport (and browser launcher when the
/// method's proxy can be handed to Chromium). A method that yields no
/// records counts as failed so the chain moves on.
pub async fn scrape_with_fallback(
    profile_url: &str,
    settings: &Settings,
    options: &RunOptions,
) -> Result<FallbackSuccess<ScrapeOutcome>> {
    ProfileLocation::parse(profile_url)?;
    let methods = AccessMethod::fallback_chain(options.access_method);

    run_with_fallback(&methods, &settings.access, move |access| async move {
        let connection = Connection::open(&access, settings, options)?;
        let outcome =
            scrape_profile(&connection.transport, connection.launcher(), profile_url, settings)
                .await?;
        if outcome.succeeded == 0 {
            return Err(ScholarError::NoRecords(format!(
                "{} discovered, 0 extracted",
                outcome.discovered
            )));
        }
        Ok(outcome)
    })
    .await
}

/// Quick title listing from the paginated listing pages.
pub async fn list_titles(
    transport: &dyn Transport,
    profile_url: &str,
    settings: &Settings,
) -> Result<Vec<ListedPublication>> {
    let profile = ProfileLocation::parse(profile_url)?;
    let listed = list_publications(transport, &profile, &settings.discovery).await?;
    info!(count = listed.len(), "Listed publication titles");
    Ok(listed)
}

/// `list_titles` under the requested access method(s); an empty listing
/// counts as a failed method.
pub async fn list_with_fallback(
    profile_url: &str,
    settings: &Settings,
    options: &RunOptions,
) -> Result<FallbackSuccess<Vec<ListedPublication>>> {
    ProfileLocation::parse(profile_url)?;
    let methods = AccessMethod::fallback_chain(options.access_method);

    run_with_fallback(&methods, &settings.access, move |access| async move {
        let connection = Connection::open(&access, settings, options)?;
        let listed = list_titles(&connection.transport, profile_url, settings).await?;
        if listed.is_empty() {
            return Err(ScholarError::NoRecords("listing is empty".to_string()));
        }
        Ok(listed)
    })
    .await
}

/// Case-insensitive containment in either direction.
pub fn titles_match(wanted: &str, candidate: &str) -> bool {
    let wanted = wanted.trim().to_lowercase();
    let candidate = candidate.trim().to_lowercase();
    if wanted.is_empty() || candidate.is_empty() {
        return false;
    }
    candidate.contains(&wanted) || wanted.contains(&candidate)
}

fn detail_title(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let title_selector = selector("#gsc_oci_title")?;
    let title = document
        .select(&title_selector)
        .next()
        .map(|t| collapse_text(t.text()))
        .filter(|t| !t.is_empty());
    title.ok_or_parse("detail page has no title")
}

/// Scan the profile's detail pages for `title` and extract the first match.
///
/// Pages that fail to load or have no title are skipped. Returns `None`
/// when nothing matches.
pub async fn find_publication(
    transport: &dyn Transport,
    launcher: Option<&dyn BrowserLauncher>,
    profile_url: &str,
    title: &str,
    settings: &Settings,
) -> Result<Option<PublicationRecord>> {
    let profile = ProfileLocation::parse(profile_url)?;
    let discovery = discover(transport, launcher, &profile, &settings.discovery).await?;
    let total = discovery.links.len();
    info!(total, wanted = %title, "Scanning publications for title");

    for (index, link) in discovery.links.iter().enumerate() {
        let Ok(url) = Url::parse(link) else {
            continue;
        };

        let html = match transport.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %url, error = %e, "Skipping publication during scan");
                continue;
            }
        };

        match detail_title(&html) {
            Ok(candidate) if titles_match(title, &candidate) => {
                info!(index = index + 1, total, title = %candidate, "Found matching publication");
                return parse_publication_detail(&html, url.as_str()).map(Some);
            }
            Ok(candidate) => debug!(index = index + 1, title = %candidate, "No match"),
            Err(e) => debug!(url = %url, error = %e, "Skipping page without title"),
        }

        tokio::time::sleep(settings.extraction.request_delay()).await;
    }

    info!(wanted = %title, "No matching publication found");
    Ok(None)
}

/// `find_publication` under the requested access method(s). Not finding the
/// title is a successful run with `None`.
pub async fn find_with_fallback(
    profile_url: &str,
    title: &str,
    settings: &Settings,
    options: &RunOptions,
) -> Result<FallbackSuccess<Option<PublicationRecord>>> {
    ProfileLocation::parse(profile_url)?;
    let methods = AccessMethod::fallback_chain(options.access_method);

    run_with_fallback(&methods, &settings.access, move |access| async move {
        let connection = Connection::open(&access, settings, options)?;
        find_publication(
            &connection.transport,
            connection.launcher(),
            profile_url,
            title,
            settings,
        )
        .await
    })
    .await
}

/// Transport and optional browser launcher for one access configuration
struct Connection {
    transport: HttpTransport,
    launcher: Option<ChromiumLauncher>,
}

impl Connection {
    fn open(access: &AccessConfig, settings: &Settings, options: &RunOptions) -> Result<Self> {
        let cookies = if access.is_direct() {
            cookie_header(&options.cookies)
        } else {
            String::new()
        };
        let transport = HttpTransport::new(&settings.http, access, cookies)?;

        let browser_usable = access.is_direct() || access.browser_proxy().is_some();
        let launcher = if options.use_browser && settings.discovery.use_browser && browser_usable {
            Some(ChromiumLauncher::new(
                access.browser_proxy().map(str::to_string),
                settings.discovery.page_load_timeout(),
            ))
        } else {
            if options.use_browser && !browser_usable {
                debug!("Proxy needs credentials, browser discovery disabled");
            }
            None
        };

        Ok(Self {
            transport,
            launcher,
        })
    }

    fn launcher(&self) -> Option<&dyn BrowserLauncher> {
        self.launcher.as_ref().map(|l| l as &dyn BrowserLauncher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::tests::{listing_page, ScriptedTransport};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROFILE_URL: &str = "https://scholar.google.com/citations?user=abc&hl=en";

    fn detail_page(title: &str) -> String {
        format!(
            r#"<html><body>
            <div id="gsc_oci_title"><a class="gsc_oci_title_link" href="https://example.org/p">{title}</a></div>
            <div class="gs_scl"><div class="gsc_oci_field">Authors</div><div class="gsc_oci_value">Jane Doe</div></div>
            <div class="gs_scl"><div class="gsc_oci_field">Publication date</div><div class="gsc_oci_value">2019/3/4</div></div>
            </body></html>"#
        )
    }

    fn settings() -> Settings {
        Settings::default().without_delays()
    }

    fn direct_options() -> RunOptions {
        RunOptions {
            access_method: AccessMethod::None,
            use_browser: false,
            cookies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_user_makes_no_requests() {
        let transport = ScriptedTransport::new(vec![Ok(listing_page(0..1))]);

        let err = scrape_profile(
            &transport,
            None,
            "https://scholar.google.com/citations?hl=en",
            &settings(),
        )
        .await
        .expect_err("missing user");

        assert!(matches!(err, ScholarError::Validation(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_scrape_profile_in_order_with_failures() -> Result<()> {
        let transport = ScriptedTransport::new(vec![
            Ok(listing_page(0..3)),
            Ok(detail_page("First")),
            Err(ScholarError::Captcha),
            Err(ScholarError::Captcha),
            Err(ScholarError::Captcha),
            Ok(detail_page("Third")),
        ]);

        let outcome = scrape_profile(&transport, None, PROFILE_URL, &settings()).await?;

        assert_eq!(outcome.discovered, 3);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        let titles: Vec<_> = outcome
            .document
            .articles
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(titles, vec!["First", "Third"]);
        assert!(outcome.document.articles[0].source_url.ends_with("abc:0"));

        let author = outcome.document.author.expect("author parsed from listing");
        assert_eq!(author.name, "Jane Doe");
        // counts discovered publications, not successful extractions
        assert_eq!(author.total_publications, 3);
        assert_eq!(transport.request_count(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_publication_matches_either_way() -> Result<()> {
        let transport = ScriptedTransport::new(vec![
            Ok(listing_page(0..3)),
            Ok(detail_page("Walking shoes")),
            Ok(detail_page("Laterally wedged insoles in knee osteoarthritis")),
        ]);

        let record = find_publication(&transport, None, PROFILE_URL, "wedged INSOLES", &settings())
            .await?
            .expect("second page matches");
        assert_eq!(record.title, "Laterally wedged insoles in knee osteoarthritis");
        assert_eq!(record.authors, vec!["Jane Doe"]);
        // the third detail page is never requested
        assert_eq!(transport.request_count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_publication_none() -> Result<()> {
        let transport = ScriptedTransport::new(vec![
            Ok(listing_page(0..1)),
            Ok("<html><body>no title block</body></html>".to_string()),
        ]);
        let found = find_publication(&transport, None, PROFILE_URL, "anything", &settings()).await?;
        assert!(found.is_none());
        Ok(())
    }

    #[test]
    fn test_titles_match() {
        assert!(titles_match("deep learning", "Deep Learning for Gait Analysis"));
        assert!(titles_match("Deep Learning for Gait Analysis (extended)", "deep learning for gait analysis"));
        assert!(!titles_match("graph theory", "Deep Learning"));
        assert!(!titles_match("", "Deep Learning"));
    }

    #[test]
    fn test_detail_title_missing() {
        let err = detail_title("<p>none</p>").expect_err("no title");
        assert!(matches!(err, ScholarError::Parse(_)));
    }

    async fn mock_profile(server: &MockServer, listing: String) {
        Mock::given(method("GET"))
            .and(path("/citations"))
            .and(query_param("view_op", "list_works"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/citations"))
            .and(query_param("view_op", "view_citation"))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("Served paper")))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_scrape_with_fallback_direct() -> Result<()> {
        let server = MockServer::start().await;
        mock_profile(&server, listing_page(0..2)).await;

        let url = format!("{}/citations?user=abc&hl=en", server.uri());
        let success = scrape_with_fallback(&url, &settings(), &direct_options()).await?;

        assert_eq!(success.method, AccessMethod::None);
        assert_eq!(success.value.succeeded, 2);
        assert!(success.value.document.articles[1]
            .source_url
            .starts_with(&server.uri()));
        Ok(())
    }

    #[tokio::test]
    async fn test_scrape_with_fallback_empty_profile_exhausts() {
        let server = MockServer::start().await;
        mock_profile(&server, listing_page(0..0)).await;

        let url = format!("{}/citations?user=abc", server.uri());
        let err = scrape_with_fallback(&url, &settings(), &direct_options())
            .await
            .expect_err("no records");

        match err {
            ScholarError::AccessExhausted { attempted, last_error } => {
                assert_eq!(attempted, "none");
                assert!(last_error.contains("No publications"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_scrape_with_fallback_rejects_bad_url_before_network() {
        let server = MockServer::start().await;
        mock_profile(&server, listing_page(0..2)).await;

        let url = format!("{}/citations?hl=en", server.uri());
        let err = scrape_with_fallback(&url, &settings(), &direct_options())
            .await
            .expect_err("missing user");

        assert!(matches!(err, ScholarError::Validation(_)));
        let received = server.received_requests().await.unwrap_or_default();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_list_with_fallback_direct() -> Result<()> {
        let server = MockServer::start().await;
        mock_profile(&server, listing_page(0..3)).await;

        let url = format!("{}/citations?user=abc", server.uri());
        let success = list_with_fallback(&url, &settings(), &direct_options()).await?;
        assert_eq!(success.value.len(), 3);
        assert_eq!(success.value[2].title, "Paper 2");
        Ok(())
    }
}
