//! gsprofile - Google Scholar author profile extractor
//!
//! Collects every publication of a Scholar author profile, extracts the
//! detail page of each one and writes the result as XML or JSON.
//!
//! ## Usage
//!
//! ```bash
//! gsprofile "https://scholar.google.com/citations?user=XXXXXXXXXXXX&hl=en" --format json
//! gsprofile list "https://scholar.google.com/citations?user=XXXXXXXXXXXX" --save titles.txt
//! gsprofile find "gait analysis" "https://scholar.google.com/citations?user=XXXXXXXXXXXX"
//! gsprofile cookies import cookies.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rustgsprofile::access::AccessMethod;
use rustgsprofile::config::{OutputFormat, Settings};
use rustgsprofile::cookies::CookieJar;
use rustgsprofile::models::ScrapeDocument;
use rustgsprofile::output::{default_output_path, render, write_document};
use rustgsprofile::pipeline::{find_with_fallback, list_with_fallback, scrape_with_fallback, RunOptions};
use rustgsprofile::profile::ProfileLocation;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Characters of the output document echoed after a run
const PREVIEW_CHARS: usize = 500;

// ============================================================================
// CLI Definition
// ============================================================================

/// Google Scholar author profile extractor
#[derive(Parser)]
#[command(name = "gsprofile")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    extract: ExtractArgs,
}

/// Options shared by every command that talks to Scholar
#[derive(Args, Clone)]
struct AccessArgs {
    /// Access method; `free` (the default) falls back through none, scraperapi and tor
    #[arg(long, value_enum, default_value = "free")]
    access_method: AccessMethod,

    /// ScraperAPI key (overrides the config file)
    #[arg(long)]
    scraperapi_key: Option<String>,

    /// Skip the headless browser and use paginated listing only
    #[arg(long)]
    no_browser: bool,

    /// Config file (default: ./gsprofile.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Where and how to write the output document
#[derive(Args, Clone)]
struct OutputArgs {
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Explicit output file (overrides the generated name)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Do not print the document preview
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args, Clone)]
struct ExtractArgs {
    /// Author profile URL (falls back to `profile_url` in the config file)
    url: Option<String>,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    access: AccessArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// List publication titles without visiting detail pages
    List {
        /// Author profile URL
        url: Option<String>,

        /// Save the titles to a text file
        #[arg(long)]
        save: Option<PathBuf>,

        #[command(flatten)]
        access: AccessArgs,
    },

    /// Find one publication by title and extract it
    Find {
        /// Title, or part of it (case-insensitive)
        title: String,

        /// Author profile URL
        url: Option<String>,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        access: AccessArgs,
    },

    /// Manage cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Show cookie file path
    Path,
    /// Clear stored cookies
    Clear,
    /// Import cookies exported from a browser (JSON array)
    Import {
        /// Exported cookie file
        file: PathBuf,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tokio::select! {
        result = run(cli) => match result {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted by user.");
            ExitCode::from(130)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        None => run_extract(cli.extract).await,
        Some(Commands::List { url, save, access }) => run_list(url, save, access).await,
        Some(Commands::Find {
            title,
            url,
            output,
            access,
        }) => run_find(title, url, output, access).await,
        Some(Commands::Cookies { action }) => handle_cookies(action),
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Config file plus command-line overrides
fn load_settings(access: &AccessArgs, output: Option<&OutputArgs>) -> Result<Settings> {
    let mut settings =
        Settings::load(access.config.as_deref()).context("Failed to load settings")?;

    if let Some(key) = &access.scraperapi_key {
        settings.access.scraperapi_key = Some(key.clone());
    }
    if access.no_browser {
        settings.discovery.use_browser = false;
    }
    if let Some(output) = output {
        if let Some(dir) = &output.output {
            settings.output.directory = dir.clone();
        }
        if let Some(format) = output.format {
            settings.output.format = format;
        }
    }

    Ok(settings)
}

/// Argument, then config file, then an interactive prompt on a terminal.
fn resolve_profile_url(url: Option<String>, settings: &Settings) -> Result<String> {
    if let Some(url) = url.or_else(|| settings.profile_url.clone()) {
        return Ok(url);
    }
    if !std::io::stdin().is_terminal() {
        bail!("No profile URL given (pass it as an argument or set profile_url in the config file)");
    }
    read_profile_url(&mut std::io::stdin().lock(), &mut std::io::stdout())
}

fn read_profile_url(input: &mut impl BufRead, out: &mut impl Write) -> Result<String> {
    write!(out, "Enter Google Scholar profile URL: ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let url = line.trim();
    if url.is_empty() {
        bail!("No profile URL entered");
    }
    Ok(url.to_string())
}

fn run_options(access: &AccessArgs) -> RunOptions {
    let cookies = match CookieJar::new() {
        Ok(jar) => jar.load(),
        Err(e) => {
            warn!(error = %e, "Cookie jar unavailable");
            Vec::new()
        }
    };

    RunOptions {
        access_method: access.access_method,
        use_browser: !access.no_browser,
        cookies,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_extract(args: ExtractArgs) -> Result<ExitCode> {
    let settings = load_settings(&args.access, Some(&args.output))?;
    let url = resolve_profile_url(args.url, &settings)?;
    let profile = ProfileLocation::parse(&url)?;
    let options = run_options(&args.access);

    println!("Profile: {}", url);
    println!(
        "Access method: {}, format: {:?}",
        options.access_method, settings.output.format
    );

    let run = scrape_with_fallback(&url, &settings, &options).await?;
    let outcome = run.value;
    println!("Retrieved via access method: {}", run.method);

    let format = settings.output.format;
    let path = args.output.file.clone().unwrap_or_else(|| {
        default_output_path(
            &settings.output.directory,
            format,
            profile.user_id(),
            outcome.document.author.as_ref().map(|a| a.name.as_str()),
        )
    });

    let content = render(&outcome.document, format)?;
    write_document(&path, &content).context("Failed to write output document")?;

    print_report(
        &path,
        &content,
        outcome.succeeded,
        outcome.failed,
        args.output.quiet,
    );
    Ok(ExitCode::SUCCESS)
}

async fn run_list(url: Option<String>, save: Option<PathBuf>, access: AccessArgs) -> Result<ExitCode> {
    let settings = load_settings(&access, None)?;
    let url = resolve_profile_url(url, &settings)?;
    let options = run_options(&access);

    let run = list_with_fallback(&url, &settings, &options).await?;
    let listed = run.value;

    println!("\nFound {} publications:", listed.len());
    for (i, publication) in listed.iter().enumerate() {
        println!("{:>4}. {}", i + 1, publication.title);
    }

    if let Some(path) = save {
        let content = listed
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}", i + 1, p.title))
            .collect::<Vec<_>>()
            .join("\n");
        write_document(&path, &content).context("Failed to save title list")?;
        println!("\nSaved: {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_find(
    title: String,
    url: Option<String>,
    output: OutputArgs,
    access: AccessArgs,
) -> Result<ExitCode> {
    let settings = load_settings(&access, Some(&output))?;
    let url = resolve_profile_url(url, &settings)?;
    let profile = ProfileLocation::parse(&url)?;
    let options = run_options(&access);

    println!("Searching for: {}", title);
    let run = find_with_fallback(&url, &title, &settings, &options).await?;

    let Some(record) = run.value else {
        println!("No publication matching '{}' found.", title);
        return Ok(ExitCode::FAILURE);
    };
    println!("Found: {}", record.title);

    let format = settings.output.format;
    let path = output.file.clone().unwrap_or_else(|| {
        default_output_path(&settings.output.directory, format, profile.user_id(), None)
    });

    let document = ScrapeDocument {
        author: None,
        articles: vec![record],
    };
    let content = render(&document, format)?;
    write_document(&path, &content).context("Failed to write output document")?;

    print_report(&path, &content, 1, 0, output.quiet);
    Ok(ExitCode::SUCCESS)
}

fn print_report(path: &Path, content: &str, succeeded: usize, failed: usize, quiet: bool) {
    println!("\n✓ Extraction complete.");
    println!("  Output: {}", path.display());
    println!("  Size: {:.1} KB", content.len() as f64 / 1024.0);
    println!("  Extracted: {}, failed: {}", succeeded, failed);

    if !quiet {
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        println!("\n--- Preview ---\n{}", preview);
        if content.chars().count() > PREVIEW_CHARS {
            println!("...");
        }
    }
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(action: CookieAction) -> Result<ExitCode> {
    let jar = CookieJar::new()?;

    match action {
        CookieAction::Path => {
            println!("Cookie file: {}", jar.path().display());
        }
        CookieAction::Clear => {
            jar.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let count = jar.import(&json).context("Invalid cookie export")?;
            println!("Saved {} cookies to {}", count, jar.path().display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_profile_url_trims_input() -> Result<()> {
        let mut input = Cursor::new("  https://scholar.google.com/citations?user=abc\n");
        let mut out = Vec::new();
        let url = read_profile_url(&mut input, &mut out)?;
        assert_eq!(url, "https://scholar.google.com/citations?user=abc");
        assert!(String::from_utf8_lossy(&out).contains("profile URL"));
        Ok(())
    }

    #[test]
    fn test_read_profile_url_rejects_empty_line() {
        let mut input = Cursor::new("\n");
        let mut out = Vec::new();
        assert!(read_profile_url(&mut input, &mut out).is_err());
    }

    #[test]
    fn test_resolve_profile_url_prefers_argument() -> Result<()> {
        let settings = Settings {
            profile_url: Some("https://scholar.google.com/citations?user=cfg".to_string()),
            ..Default::default()
        };
        let url = resolve_profile_url(
            Some("https://scholar.google.com/citations?user=arg".to_string()),
            &settings,
        )?;
        assert!(url.ends_with("user=arg"));
        assert!(resolve_profile_url(None, &settings)?.ends_with("user=cfg"));
        Ok(())
    }
}
