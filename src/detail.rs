//! Publication detail pages.
//!
//! A Scholar detail page (`view_op=view_citation`) has a title block and a
//! label/value table. Known English labels map onto `PublicationRecord`
//! fields; every other label is kept in `other_metadata`.

use crate::config::ExtractionSettings;
use crate::error::{Result, ScholarError};
use crate::models::PublicationRecord;
use crate::profile::{collapse_text, selector};
use crate::transport::{is_captcha_page, Transport};
use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};
use url::Url;

/// Result of fetching one detail page under the retry policy
#[derive(Debug)]
pub enum FetchOutcome {
    Record(Box<PublicationRecord>),
    /// Every attempt failed; the record is left out of the output
    Failed { attempts: u32, reason: String },
}

impl FetchOutcome {
    pub fn into_record(self) -> Option<PublicationRecord> {
        match self {
            FetchOutcome::Record(record) => Some(*record),
            FetchOutcome::Failed { .. } => None,
        }
    }
}

/// Fetch and parse a detail page, retrying up to `max_attempts` times.
///
/// Never returns an error: exhausting the budget yields
/// `FetchOutcome::Failed`. A successful extraction is followed by
/// `request_delay` to bound the request rate.
pub async fn fetch_publication(
    transport: &dyn Transport,
    url: &Url,
    settings: &ExtractionSettings,
) -> FetchOutcome {
    let max_attempts = settings.max_attempts.max(1);
    let mut reason = String::new();

    for attempt in 1..=max_attempts {
        match fetch_once(transport, url).await {
            Ok(record) => {
                tokio::time::sleep(settings.request_delay()).await;
                return FetchOutcome::Record(Box::new(record));
            }
            Err(e) => {
                warn!(
                    url = %url,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Detail fetch failed"
                );
                reason = e.to_string();
                if attempt < max_attempts {
                    tokio::time::sleep(settings.retry_delay()).await;
                }
            }
        }
    }

    FetchOutcome::Failed {
        attempts: max_attempts,
        reason,
    }
}

async fn fetch_once(transport: &dyn Transport, url: &Url) -> Result<PublicationRecord> {
    let html = transport.fetch(url).await?;
    if is_captcha_page(&html) {
        return Err(ScholarError::Captcha);
    }
    parse_publication_detail(&html, url.as_str())
}

/// Parse a detail page into a record.
///
/// Missing pieces are left empty (`title` gets the sentinel); parsing only
/// fails if a selector cannot be built.
pub fn parse_publication_detail(html: &str, source_url: &str) -> Result<PublicationRecord> {
    let document = Html::parse_document(html);

    let title_selector = selector("#gsc_oci_title")?;
    let title_link_selector = selector("a.gsc_oci_title_link")?;
    let row_selector = selector(".gs_scl")?;
    let field_selector = selector(".gsc_oci_field")?;
    let value_selector = selector(".gsc_oci_value")?;
    let descr_selector = selector("#gsc_oci_descr")?;

    let mut record = PublicationRecord::new(source_url);

    if let Some(title_elem) = document.select(&title_selector).next() {
        let title = collapse_text(title_elem.text());
        if !title.is_empty() {
            record.title = title;
        }
    }

    record.external_link = document
        .select(&title_link_selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| external_link(source_url, href));

    for row in document.select(&row_selector) {
        let Some(field) = row.select(&field_selector).next() else {
            continue;
        };
        let label = collapse_text(field.text());
        if label.is_empty() {
            continue;
        }
        let value = row
            .select(&value_selector)
            .next()
            .map(|v| collapse_text(v.text()))
            .unwrap_or_default();

        apply_field(&mut record, &label, value);
    }

    record.abstract_text = document
        .select(&descr_selector)
        .next()
        .map(|d| collapse_text(d.text()))
        .filter(|s| !s.is_empty());

    debug!(title = %record.title, fields = record.other_metadata.len(), "Parsed detail page");
    Ok(record)
}

/// Absolute form of the title link, or `None` when it points back at the
/// Scholar host the detail page came from.
fn external_link(source_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(source_url).ok();
    let resolved = match &base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    if base.is_some_and(|b| b.host_str() == resolved.host_str()) {
        return None;
    }
    Some(resolved.to_string())
}

/// Map one label/value pair onto the record.
fn apply_field(record: &mut PublicationRecord, label: &str, value: String) {
    match label {
        "Authors" => {
            record.authors = value
                .split(", ")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        "Publication date" => record.publication_date = Some(value),
        "Journal" => record.journal = Some(value),
        "Volume" => record.volume = Some(value),
        "Pages" => record.pages = Some(value),
        "Publisher" => record.publisher = Some(value),
        _ if label.contains("Total citations") => {
            record.citations = parse_cited_by(&value);
        }
        _ => {
            record
                .other_metadata
                .insert(label.replace(' ', "_"), value);
        }
    }
}

/// Citation count from a "Cited by N" value.
fn parse_cited_by(text: &str) -> Option<u64> {
    let re = Regex::new(r"Cited by\s*([\d,]+)").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}
