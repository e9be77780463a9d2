//! Configuration validation.
//!
//! Detects unknown/misspelled fields and values that parse but would make
//! the scraper misbehave (zero pool, zero TTL, deadlines shorter than the
//! capture wait).

use std::path::{Path, PathBuf};

use crate::schema::ChainscopeConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "cache.default_ttl_secs"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Known keys per section, mirroring `schema.rs`.
const SECTIONS: &[(&str, &[&str])] = &[
    ("browser", &[
        "chrome_path",
        "headless",
        "pool_size",
        "memory_limit_percent",
        "idle_timeout_secs",
        "navigation_timeout_ms",
        "user_agent",
        "chrome_args",
        "viewport_width",
        "viewport_height",
    ]),
    ("scrape", &[
        "acquire_timeout_secs",
        "attempt_timeout_secs",
        "capture_wait_secs",
        "settle_ms",
        "base_url",
    ]),
    ("retry", &[
        "max_attempts",
        "base_delay_ms",
        "factor",
        "max_delay_ms",
        "jitter_pct",
    ]),
    ("cache", &[
        "default_ttl_secs",
        "quote_ttl_secs",
        "expirations_ttl_secs",
        "chain_ttl_secs",
        "sweep_interval_secs",
        "retain_stale_secs",
    ]),
    ("rate_limit", &["cooldown_secs"]),
    ("metrics", &["enabled", "labels"]),
];

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .map(|c| (c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered one.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file);

    let Some(actual_path) = config_path else {
        let mut result = ValidationResult::default();
        result.push(Severity::Info, "", "no config file found; using defaults");
        return result;
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(content) => {
            let is_toml = actual_path
                .extension()
                .and_then(|e| e.to_str())
                .is_none_or(|e| e == "toml");
            if is_toml {
                validate_toml_str(&crate::env_subst::substitute_env(&content))
            } else {
                match crate::loader::load_config(&actual_path) {
                    Ok(cfg) => validate_config(&cfg),
                    Err(e) => {
                        let mut r = ValidationResult::default();
                        r.push(Severity::Error, "", format!("failed to parse config: {e}"));
                        r
                    },
                }
            }
        },
        Err(e) => {
            let mut r = ValidationResult::default();
            r.push(Severity::Error, "", format!("failed to read config file: {e}"));
            r
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    let value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            result.push(Severity::Error, "", format!("TOML syntax error: {e}"));
            return result;
        },
    };

    if let Some(table) = value.as_table() {
        check_unknown_fields(table, &mut result);
    }

    match toml::from_str::<ChainscopeConfig>(toml_str) {
        Ok(config) => result
            .diagnostics
            .extend(validate_config(&config).diagnostics),
        Err(e) => result.push(Severity::Error, "", format!("type error: {e}")),
    }

    result
}

fn check_unknown_fields(table: &toml::value::Table, result: &mut ValidationResult) {
    for (section, value) in table {
        let Some((_, keys)) = SECTIONS.iter().find(|(name, _)| name == section) else {
            let msg = match suggest(section, SECTIONS.iter().map(|(n, _)| *n)) {
                Some(s) => format!("unknown section (did you mean \"{s}\"?)"),
                None => "unknown section".to_string(),
            };
            result.push(Severity::Error, section, msg);
            continue;
        };
        // `metrics.labels` is a free-form map.
        let Some(fields) = value.as_table() else {
            continue;
        };
        for key in fields.keys() {
            if keys.contains(&key.as_str()) {
                continue;
            }
            let path = format!("{section}.{key}");
            let msg = match suggest(key, keys.iter().copied()) {
                Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                None => "unknown field".to_string(),
            };
            result.push(Severity::Error, &path, msg);
        }
    }
}

/// Semantic checks on an already-parsed config.
#[must_use]
pub fn validate_config(config: &ChainscopeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.browser.pool_size == 0 {
        result.push(
            Severity::Error,
            "browser.pool_size",
            "pool size must be at least 1",
        );
    }
    if config.browser.memory_limit_percent > 100 {
        result.push(
            Severity::Error,
            "browser.memory_limit_percent",
            "must be between 0 and 100",
        );
    }
    if config.retry.max_attempts == 0 {
        result.push(
            Severity::Warning,
            "retry.max_attempts",
            "0 is treated as a single attempt",
        );
    }
    if !(0.0..=1.0).contains(&config.retry.jitter_pct) {
        result.push(
            Severity::Warning,
            "retry.jitter_pct",
            "clamped to the range 0.0-1.0",
        );
    }
    if config.retry.factor == 0 {
        result.push(
            Severity::Warning,
            "retry.factor",
            "0 is treated as a constant backoff",
        );
    }

    let ttls = [
        ("cache.default_ttl_secs", Some(config.cache.default_ttl_secs)),
        ("cache.quote_ttl_secs", config.cache.quote_ttl_secs),
        ("cache.expirations_ttl_secs", config.cache.expirations_ttl_secs),
        ("cache.chain_ttl_secs", config.cache.chain_ttl_secs),
    ];
    for (path, ttl) in ttls {
        if ttl == Some(0) {
            result.push(
                Severity::Warning,
                path,
                "a TTL of 0 disables caching for this kind",
            );
        }
    }

    if config.rate_limit.cooldown_secs == 0 {
        result.push(
            Severity::Warning,
            "rate_limit.cooldown_secs",
            "no cooldown: rate-limited keys will be re-scraped immediately",
        );
    }
    if config.scrape.attempt_timeout_secs <= config.scrape.capture_wait_secs {
        result.push(
            Severity::Warning,
            "scrape.attempt_timeout_secs",
            format!(
                "attempt deadline ({}s) does not leave room after the capture wait ({}s)",
                config.scrape.attempt_timeout_secs, config.scrape.capture_wait_secs
            ),
        );
    }
    if !config.scrape.base_url.starts_with("http://")
        && !config.scrape.base_url.starts_with("https://")
    {
        result.push(
            Severity::Error,
            "scrape.base_url",
            "must start with http:// or https://",
        );
    }

    result
}
