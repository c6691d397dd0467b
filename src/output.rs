//! Output documents.
//!
//! XML layout (two-space indent):
//!
//! ```xml
//! <Articles>
//!   <Article>
//!     <Title>..</Title>
//!     <Authors><Author>..</Author></Authors>
//!     <PublicationDate/> <Journal/> <Volume/> <Pages/> <Publisher/> <Citations/>
//!     <OtherMetadata><Issue>5</Issue></OtherMetadata>
//!     <Abstract>..</Abstract>
//!     <SourceUrl>..</SourceUrl>
//!     <ExternalLink>..</ExternalLink>
//!   </Article>
//! </Articles>
//! ```
//!
//! JSON is the serde form of `ScrapeDocument`.

use crate::config::OutputFormat;
use crate::error::{Result, ScholarError};
use crate::models::{PublicationRecord, ScrapeDocument, MISSING};
use crate::profile::sanitize_filename;
use chrono::Local;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::info;

fn xml_err(e: impl std::fmt::Display) -> ScholarError {
    ScholarError::Xml(e.to_string())
}

/// Render `document` in `format`.
pub fn render(document: &ScrapeDocument, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Xml => to_xml(&document.articles),
        OutputFormat::Json => to_json(document),
    }
}

/// Pretty-printed JSON with the author object and the article list.
pub fn to_json(document: &ScrapeDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Pretty-printed XML for `records`; an empty slice gives an empty `<Articles>`.
pub fn to_xml(records: &[PublicationRecord]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("Articles")))
        .map_err(xml_err)?;

    for record in records {
        write_article(&mut writer, record)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("Articles")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(xml_err)
}

fn write_article(writer: &mut Writer<Cursor<Vec<u8>>>, record: &PublicationRecord) -> Result<()> {
    start(writer, "Article")?;

    text_element(writer, "Title", &record.title)?;

    if record.authors.is_empty() {
        empty(writer, "Authors")?;
    } else {
        start(writer, "Authors")?;
        for name in &record.authors {
            text_element(writer, "Author", name)?;
        }
        end(writer, "Authors")?;
    }

    optional_element(writer, "PublicationDate", record.publication_date.as_deref())?;
    optional_element(writer, "Journal", record.journal.as_deref())?;
    optional_element(writer, "Volume", record.volume.as_deref())?;
    optional_element(writer, "Pages", record.pages.as_deref())?;
    optional_element(writer, "Publisher", record.publisher.as_deref())?;
    optional_element(
        writer,
        "Citations",
        record.citations.map(|c| c.to_string()).as_deref(),
    )?;

    if record.other_metadata.is_empty() {
        empty(writer, "OtherMetadata")?;
    } else {
        start(writer, "OtherMetadata")?;
        for (label, value) in &record.other_metadata {
            text_element(writer, &xml_tag_name(label), value)?;
        }
        end(writer, "OtherMetadata")?;
    }

    text_element(
        writer,
        "Abstract",
        record.abstract_text.as_deref().unwrap_or(MISSING),
    )?;
    text_element(writer, "SourceUrl", &record.source_url)?;
    if let Some(link) = &record.external_link {
        text_element(writer, "ExternalLink", link)?;
    }

    end(writer, "Article")
}

fn start(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)
}

fn end(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

fn empty(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::Empty(BytesStart::new(name)))
        .map_err(xml_err)
}

fn text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    end(writer, name)
}

fn optional_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: Option<&str>,
) -> Result<()> {
    match text {
        Some(t) => text_element(writer, name, t),
        None => empty(writer, name),
    }
}

/// Make a field label usable as an element name.
///
/// Labels already have spaces replaced by underscores; anything else outside
/// `[A-Za-z0-9_.-]` becomes `_`, and names that cannot start an element get
/// a leading `_`.
pub fn xml_tag_name(label: &str) -> String {
    let mut name: String = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    if !starts_ok || name.to_ascii_lowercase().starts_with("xml") {
        name.insert(0, '_');
    }
    name
}

/// Default output path for a run.
///
/// XML: `<dir>/<user_id>_<YYYYmmdd_HHMMSS>.xml`;
/// JSON: `<dir>/author_<sanitized author name>.json`, using the user id
/// when the author name is unknown.
pub fn default_output_path(
    dir: &Path,
    format: OutputFormat,
    user_id: &str,
    author_name: Option<&str>,
) -> PathBuf {
    let stem = match format {
        OutputFormat::Xml => format!(
            "{}_{}",
            sanitize_filename(user_id),
            Local::now().format("%Y%m%d_%H%M%S")
        ),
        OutputFormat::Json => format!("author_{}", sanitize_filename(author_name.unwrap_or(user_id))),
    };
    dir.join(format!("{}.{}", stem, format.extension()))
}

/// Write `content` to `path`, creating parent directories.
pub fn write_document(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    info!(path = %path.display(), bytes = content.len(), "Saved output document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthorProfile;
    use tempfile::tempdir;

    fn sample_record() -> PublicationRecord {
        let mut record = PublicationRecord::new("https://scholar.google.com/citations?view_op=view_citation&citation_for_view=abc:1");
        record.title = "Gait & Posture <study>".to_string();
        record.authors = vec!["Jane Doe".to_string(), "John Roe".to_string()];
        record.publication_date = Some("2008/5/1".to_string());
        record.journal = Some("Arthritis Care".to_string());
        record.citations = Some(12);
        record.abstract_text = Some("Objective.".to_string());
        record
            .other_metadata
            .insert("Conference_name".to_string(), "ICRA".to_string());
        record
    }

    #[test]
    fn test_xml_empty_collection() -> Result<()> {
        let xml = to_xml(&[])?;
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Articles>"));
        assert!(xml.contains("</Articles>"));
        assert!(!xml.contains("<Article>"));
        Ok(())
    }

    #[test]
    fn test_xml_record_layout() -> Result<()> {
        let xml = to_xml(&[sample_record()])?;

        assert!(xml.contains("  <Article>"));
        assert!(xml.contains("<Title>Gait &amp; Posture &lt;study&gt;</Title>"));
        assert!(xml.contains("<Author>Jane Doe</Author>"));
        assert!(xml.contains("<Author>John Roe</Author>"));
        assert!(xml.contains("<PublicationDate>2008/5/1</PublicationDate>"));
        assert!(xml.contains("<Volume/>"));
        assert!(xml.contains("<Citations>12</Citations>"));
        assert!(xml.contains("<Conference_name>ICRA</Conference_name>"));
        assert!(xml.contains("<Abstract>Objective.</Abstract>"));
        assert!(xml.contains("citation_for_view=abc:1</SourceUrl>"));
        assert!(!xml.contains("<ExternalLink>"));
        Ok(())
    }

    #[test]
    fn test_xml_record_without_fields() -> Result<()> {
        let xml = to_xml(&[PublicationRecord::new("u")])?;
        assert!(xml.contains("<Title>N/A</Title>"));
        assert!(xml.contains("<Authors/>"));
        assert!(xml.contains("<OtherMetadata/>"));
        assert!(xml.contains("<Abstract>N/A</Abstract>"));
        Ok(())
    }

    #[test]
    fn test_json_empty_articles_present() -> Result<()> {
        let json = to_json(&ScrapeDocument::default())?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        assert_eq!(value["articles"], serde_json::json!([]));
        assert!(value["author"].is_null());
        Ok(())
    }

    #[test]
    fn test_json_record_fields() -> Result<()> {
        let document = ScrapeDocument {
            author: Some(AuthorProfile {
                name: "Jane Doe".to_string(),
                total_publications: 1,
                ..Default::default()
            }),
            articles: vec![sample_record()],
        };
        let value: serde_json::Value = serde_json::from_str(&render(&document, OutputFormat::Json)?)?;

        assert_eq!(value["author"]["name"], "Jane Doe");
        let article = &value["articles"][0];
        assert_eq!(article["title"], "Gait & Posture <study>");
        assert_eq!(article["authors"][1], "John Roe");
        assert_eq!(article["abstract"], "Objective.");
        assert_eq!(article["other_metadata"]["Conference_name"], "ICRA");
        assert!(article["volume"].is_null());
        Ok(())
    }

    #[test]
    fn test_xml_tag_name() {
        assert_eq!(xml_tag_name("Conference_name"), "Conference_name");
        assert_eq!(xml_tag_name("ISBN:"), "ISBN_");
        assert_eq!(xml_tag_name("2nd_edition"), "_2nd_edition");
        assert_eq!(xml_tag_name("xmlns"), "_xmlns");
    }

    #[test]
    fn test_default_output_paths() {
        let dir = Path::new("output");
        let xml = default_output_path(dir, OutputFormat::Xml, "abc", None);
        let name = xml.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("abc_"));
        assert!(name.ends_with(".xml"));

        let json = default_output_path(dir, OutputFormat::Json, "abc", Some("Jane Doe"));
        assert_eq!(json, Path::new("output/author_Jane_Doe.json"));

        let unnamed = default_output_path(dir, OutputFormat::Json, "abc", None);
        assert_eq!(unnamed, Path::new("output/author_abc.json"));
    }

    #[test]
    fn test_write_document_creates_dirs() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("out.xml");
        write_document(&path, "<Articles/>")?;
        assert_eq!(std::fs::read_to_string(&path)?, "<Articles/>");
        Ok(())
    }
}
