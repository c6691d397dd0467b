//! Publication link discovery.
//!
//! Two strategies produce the same ordered list of detail-page URLs:
//!
//! - **Incremental reveal**: open the profile in a scripted browser and click
//!   "Show more" until it disappears or is disabled (bounded by
//!   `reveal_max_iterations`), then read every publication anchor once.
//! - **Paginated**: request the `list_works` endpoint `page_size` rows at a
//!   time until a short or empty page comes back.
//!
//! The browser strategy is preferred when a launcher is available; any
//! browser failure falls back to pagination from offset zero.

use crate::browser::{BrowserLauncher, BrowserSession, RevealOutcome};
use crate::config::DiscoverySettings;
use crate::error::Result;
use crate::models::{AuthorProfile, DiscoveryResult};
use crate::profile::{collapse_text, parse_author_profile, selector, ProfileLocation};
use crate::transport::Transport;
use scraper::Html;
use tracing::{debug, info, warn};

/// Anchors linking a publication row to its detail page
const PUBLICATION_ANCHOR: &str =
    r#"a.gsc_a_at[href], a[href^="/citations?view_op=view_citation"]"#;

/// A publication anchor found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedPublication {
    pub title: String,
    /// Absolute detail-page URL
    pub url: String,
}

/// Extract publication anchors from a profile/listing page, in page order.
pub fn extract_publications(html: &str, profile: &ProfileLocation) -> Result<Vec<ListedPublication>> {
    let document = Html::parse_document(html);
    let anchor = selector(PUBLICATION_ANCHOR)?;

    let listed = document
        .select(&anchor)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let url = profile.resolve(href)?;
            Some(ListedPublication {
                title: collapse_text(a.text()),
                url: url.to_string(),
            })
        })
        .collect();

    Ok(listed)
}

/// Detail-page URLs from a profile/listing page, in page order.
pub fn extract_publication_links(html: &str, profile: &ProfileLocation) -> Result<Vec<String>> {
    Ok(extract_publications(html, profile)?
        .into_iter()
        .map(|p| p.url)
        .collect())
}

/// Discover all publication links for `profile`.
///
/// Uses the browser when `launcher` is given, falling back to pagination if
/// the browser cannot be launched or fails mid-run.
pub async fn discover(
    transport: &dyn Transport,
    launcher: Option<&dyn BrowserLauncher>,
    profile: &ProfileLocation,
    settings: &DiscoverySettings,
) -> Result<DiscoveryResult> {
    if let Some(launcher) = launcher {
        match launcher.launch().await {
            Ok(session) => match discover_incremental(session, profile, settings).await {
                Ok(result) => return Ok(result),
                Err(e) => warn!(error = %e, "Browser discovery failed, using paginated listing"),
            },
            Err(e) => warn!(error = %e, "Browser unavailable, using paginated listing"),
        }
    }

    discover_paginated(transport, profile, settings).await
}

/// Incremental-reveal strategy. The session is closed on every exit path.
pub async fn discover_incremental(
    mut session: Box<dyn BrowserSession>,
    profile: &ProfileLocation,
    settings: &DiscoverySettings,
) -> Result<DiscoveryResult> {
    let outcome = reveal_all(session.as_mut(), profile, settings).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close browser session");
    }

    let html = outcome?;
    let links = extract_publication_links(&html, profile)?;
    let author = parse_author_profile(&html, profile.user_id())?;

    info!(count = links.len(), "Discovered publications via browser");
    Ok(DiscoveryResult { links, author })
}

async fn reveal_all(
    session: &mut dyn BrowserSession,
    profile: &ProfileLocation,
    settings: &DiscoverySettings,
) -> Result<String> {
    let url = profile.profile_page_url()?;
    session.open(url.as_str()).await?;

    let mut clicks = 0;
    for iteration in 0..settings.reveal_max_iterations {
        match session.reveal_more().await? {
            RevealOutcome::Missing => {
                debug!(iteration, "Reveal control not found");
                break;
            }
            RevealOutcome::Disabled => {
                debug!(iteration, "Reveal control disabled");
                break;
            }
            RevealOutcome::Clicked => {
                clicks += 1;
                debug!(iteration, "Clicked reveal control");
                tokio::time::sleep(settings.reveal_settle()).await;
            }
        }
    }

    if clicks == settings.reveal_max_iterations {
        warn!(
            max = settings.reveal_max_iterations,
            "Reveal control still active after maximum iterations"
        );
    }

    session.page_source().await
}

/// Paginated strategy.
///
/// A failed request ends discovery with the links collected so far.
pub async fn discover_paginated(
    transport: &dyn Transport,
    profile: &ProfileLocation,
    settings: &DiscoverySettings,
) -> Result<DiscoveryResult> {
    let (listed, author) = walk_listing(transport, profile, settings).await?;
    info!(count = listed.len(), "Discovered publications via listing");
    Ok(DiscoveryResult {
        links: listed.into_iter().map(|p| p.url).collect(),
        author,
    })
}

/// Titles and detail URLs from the paginated listing, without visiting
/// any detail page.
pub async fn list_publications(
    transport: &dyn Transport,
    profile: &ProfileLocation,
    settings: &DiscoverySettings,
) -> Result<Vec<ListedPublication>> {
    let (listed, _) = walk_listing(transport, profile, settings).await?;
    Ok(listed)
}

async fn walk_listing(
    transport: &dyn Transport,
    profile: &ProfileLocation,
    settings: &DiscoverySettings,
) -> Result<(Vec<ListedPublication>, Option<AuthorProfile>)> {
    let page_size = settings.page_size.max(1);
    let mut listed: Vec<ListedPublication> = Vec::new();
    let mut author = None;
    let mut start = 0;

    loop {
        let url = profile.listing_url(start, page_size)?;
        debug!(start, url = %url, "Fetching listing page");

        let html = match transport.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(
                    start,
                    error = %e,
                    collected = listed.len(),
                    "Listing request failed, keeping partial result"
                );
                break;
            }
        };

        if start == 0 {
            author = parse_author_profile(&html, profile.user_id())?;
        }

        let page = extract_publications(&html, profile)?;
        let found = page.len();
        info!(start, count = found, "Parsed listing page");

        if found == 0 {
            break;
        }
        listed.extend(page);
        if found < page_size {
            break;
        }

        start += page_size;
        tokio::time::sleep(settings.page_delay()).await;
    }

    Ok((listed, author))
}
