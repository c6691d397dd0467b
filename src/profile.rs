//! Author profile location and profile header parsing.
//!
//! A profile location is a Scholar `citations` URL carrying a `user` query
//! parameter. Everything else the pipeline requests (listing pages, detail
//! pages) is derived from its origin, so mirrors and local test servers work
//! the same way as `scholar.google.com`.

use crate::error::{Result, ScholarError};
use crate::models::AuthorProfile;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Query parameter identifying the profile owner
const USER_PARAM: &str = "user";

/// A validated author profile location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLocation {
    url: Url,
    user_id: String,
}

impl ProfileLocation {
    /// Validate a profile URL.
    ///
    /// Fails with `ScholarError::Validation` when the string is not a URL or
    /// has no non-empty `user` parameter. No network access is performed.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim()).map_err(|e| {
            ScholarError::Validation(format!("Invalid profile URL '{}': {}", input, e))
        })?;

        let user_id = url
            .query_pairs()
            .find(|(k, _)| k == USER_PARAM)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ScholarError::Validation(format!(
                    "Failed to parse author ID from URL: {}. Ensure the URL contains a 'user' parameter.",
                    input
                ))
            })?;

        Ok(Self { url, user_id })
    }

    /// The profile URL as given
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The `user` parameter value
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Scheme, host and port of the profile URL
    pub fn base_url(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Profile page forced to English, used by the scripted browser.
    pub fn profile_page_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/citations", self.base_url()))
            .map_err(|e| ScholarError::Config(format!("Invalid base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair(USER_PARAM, &self.user_id)
            .append_pair("hl", "en");
        Ok(url)
    }

    /// Listing endpoint for one page of publications, newest first.
    pub fn listing_url(&self, start: usize, page_size: usize) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/citations", self.base_url()))
            .map_err(|e| ScholarError::Config(format!("Invalid base URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair(USER_PARAM, &self.user_id)
            .append_pair("hl", "en")
            .append_pair("cstart", &start.to_string())
            .append_pair("pagesize", &page_size.to_string())
            .append_pair("view_op", "list_works")
            .append_pair("sortby", "pubdate");

        Ok(url)
    }

    /// Resolve a (usually relative) publication href against the profile origin.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.url.join(href).ok()
    }
}

/// Parse the author header of a profile or listing page.
///
/// Returns `None` when the page has no author name block, e.g. a CAPTCHA
/// page or a bare listing fragment.
pub fn parse_author_profile(html: &str, scholar_id: &str) -> Result<Option<AuthorProfile>> {
    let document = Html::parse_document(html);

    let name_selector = selector("#gsc_prf_in")?;
    let info_selector = selector(".gsc_prf_il")?;
    let homepage_selector = selector("#gsc_prf_ivh a")?;
    let interest_selector = selector("#gsc_prf_int a")?;
    let stats_selector = selector("#gsc_rsb_st td.gsc_rsb_std")?;

    let name = match document.select(&name_selector).next() {
        Some(elem) => collapse_text(elem.text()),
        None => return Ok(None),
    };
    if name.is_empty() {
        return Ok(None);
    }

    let affiliation = document
        .select(&info_selector)
        .next()
        .map(|e| collapse_text(e.text()))
        .filter(|s| !s.is_empty());

    let verified = document
        .select(&info_selector)
        .map(|e| collapse_text(e.text()))
        .find(|s| s.starts_with("Verified email at"));
    let email_domain = verified.as_deref().and_then(parse_email_domain);

    let homepage = document
        .select(&homepage_selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|s| s.to_string());

    let interests = document
        .select(&interest_selector)
        .map(|a| collapse_text(a.text()))
        .filter(|s| !s.is_empty())
        .collect();

    // Stats table cells: citations all / since, h-index all / since, i10 all / since
    let stats: Vec<Option<u64>> = document
        .select(&stats_selector)
        .map(|td| collapse_text(td.text()).replace(',', "").parse().ok())
        .collect();

    Ok(Some(AuthorProfile {
        scholar_id: scholar_id.to_string(),
        name,
        affiliation,
        email_domain,
        homepage,
        interests,
        cited_by: stats.first().copied().flatten(),
        cited_by_5y: stats.get(1).copied().flatten(),
        total_publications: 0,
    }))
}

fn parse_email_domain(text: &str) -> Option<String> {
    let re = Regex::new(r"Verified email at\s+(\S+)").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(|c| c == '.' || c == '-').to_string())
        .filter(|d| !d.is_empty())
}

/// Sanitize a string for use as a file name.
///
/// Whitespace runs become `_`, characters that are illegal on common file
/// systems are removed, leading/trailing dots and spaces are stripped.
pub fn sanitize_filename(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = collapsed
        .chars()
        .filter(|c| !matches!(c, '/' | '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScholarError::Parse(format!("{}: {}", css, e)))
}

/// Join text nodes and collapse internal whitespace.
pub(crate) fn collapse_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
