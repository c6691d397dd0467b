//! # rustgsprofile
//!
//! Google Scholar author-profile publication extractor.
//!
//! ## Modules
//!
//! - [`profile`] - Profile URL validation and author header parsing
//! - [`discovery`] - Publication link discovery (browser reveal or paginated listing)
//! - [`browser`] - Headless Chromium session used by discovery
//! - [`detail`] - Detail page extraction with bounded retry
//! - [`access`] - Access methods and the fallback chain
//! - [`transport`] - HTTP transport with CAPTCHA and rate-limit detection
//! - [`pipeline`] - End-to-end runs
//! - [`output`] - XML/JSON documents
//! - [`cookies`] - Cookie persistence
//! - [`config`] - TOML settings
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustgsprofile::config::Settings;
//! use rustgsprofile::output::{render, write_document};
//! use rustgsprofile::pipeline::{scrape_with_fallback, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::default();
//!     let url = "https://scholar.google.com/citations?user=XXXXXXXXXXXX&hl=en";
//!     let run = scrape_with_fallback(url, &settings, &RunOptions::default()).await?;
//!     let xml = render(&run.value.document, settings.output.format)?;
//!     write_document("output/profile.xml".as_ref(), &xml)?;
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod browser;
pub mod config;
pub mod cookies;
pub mod detail;
pub mod discovery;
pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod transport;

pub use error::{Result, ScholarError};
