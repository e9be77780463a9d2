//! `chainscope doctor`: config validation and environment audit.
//!
//! Runs a series of checks against the local installation and prints a
//! structured report with `[ok]`, `[warn]`, `[fail]`, `[skip]`, or `[info]`
//! status indicators per item.

use std::{path::Path, process::ExitCode, time::Instant};

use {
    anyhow::Result,
    chainscope_browser::{BrowserConfig, ChromiumFactory, SessionFactory, detect::detect_browser},
    chainscope_config::{
        ChainscopeConfig,
        validate::{self, Severity},
    },
    chainscope_scrape::BarchartSource,
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Per-check result used to build the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Skip,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Skip => DIM,
            Self::Info => CYAN,
        }
    }
}

impl From<Severity> for Status {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub async fn handle_doctor(path: Option<&Path>, launch: bool) -> Result<ExitCode> {
    eprintln!("{BOLD}chainscope doctor{RESET}");
    eprintln!("{BOLD}================={RESET}\n");

    let mut sections = vec![check_config(path)];

    // Later checks run against whatever config would actually be used.
    let config = match crate::load_config(path) {
        Ok(config) => config,
        Err(e) => {
            let mut section = Section::new("Load");
            section.push(Status::Fail, format!("{e:#}"));
            section.push(Status::Info, "falling back to defaults for remaining checks");
            sections.push(section);
            ChainscopeConfig::default()
        },
    };

    sections.push(check_browser(&config));
    sections.push(check_upstream(&config));
    sections.push(check_launch(&config, launch).await);

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    Ok(if errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

// ── 1. Config validation ────────────────────────────────────────────────────

fn check_config(path: Option<&Path>) -> Section {
    let result = validate::validate(path);
    let label = result
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    let mut section = Section::new(format!("Config ({label})"));

    if !result.diagnostics.iter().any(|d| d.severity != Severity::Info) {
        section.push(Status::Ok, "No errors or warnings");
    }
    for d in &result.diagnostics {
        let msg = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        section.push(d.severity.into(), msg);
    }
    section
}

// ── 2. Browser ──────────────────────────────────────────────────────────────

fn check_browser(config: &ChainscopeConfig) -> Section {
    let mut section = Section::new("Browser");
    let detection = detect_browser(config.browser.chrome_path.as_deref());

    match (&detection.path, detection.source) {
        (Some(path), Some(source)) => {
            section.push(
                Status::Ok,
                format!("Found {} (via {source:?})", path.display()),
            );
        },
        _ => {
            section.push(Status::Fail, "No Chromium-based browser found");
            for line in detection.install_hint.lines().filter(|l| !l.trim().is_empty()) {
                section.push(Status::Info, line.trim());
            }
        },
    }

    if let Some(ref configured) = config.browser.chrome_path
        && !Path::new(configured).exists()
    {
        section.push(
            Status::Warn,
            format!("browser.chrome_path {configured} does not exist"),
        );
    }

    section.push(
        Status::Info,
        format!(
            "pool_size = {}, headless = {}, memory_limit_percent = {}",
            config.browser.pool_size, config.browser.headless, config.browser.memory_limit_percent
        ),
    );
    section
}

// ── 3. Upstream ─────────────────────────────────────────────────────────────

fn check_upstream(config: &ChainscopeConfig) -> Section {
    let mut section = Section::new("Upstream");
    match BarchartSource::from_config(&config.scrape) {
        Ok(_) => section.push(Status::Ok, format!("base_url {}", config.scrape.base_url)),
        Err(e) => section.push(
            Status::Fail,
            format!("base_url {:?} is not a valid URL: {e}", config.scrape.base_url),
        ),
    }
    section.push(
        Status::Info,
        format!(
            "attempt deadline {}s, {} attempt(s), cooldown {}s",
            config.scrape.attempt_timeout_secs,
            config.retry.max_attempts.max(1),
            config.rate_limit.cooldown_secs
        ),
    );
    section
}

// ── 4. Launch ───────────────────────────────────────────────────────────────

async fn check_launch(config: &ChainscopeConfig, launch: bool) -> Section {
    let mut section = Section::new("Launch");
    if !launch {
        section.push(Status::Skip, "pass --launch to start a browser session");
        return section;
    }

    let factory = ChromiumFactory::new(BrowserConfig::from(&config.browser));
    let started = Instant::now();
    match factory.launch("doctor").await {
        Ok(mut session) => {
            session.close().await;
            section.push(
                Status::Ok,
                format!("session started in {}ms", started.elapsed().as_millis()),
            );
        },
        Err(e) => section.push(Status::Fail, e.to_string()),
    }
    section
}
