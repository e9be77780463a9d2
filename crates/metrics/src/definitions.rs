//! Metric name and label definitions.
//!
//! Centralizing names here keeps the scrape, cache and pool layers
//! consistent with what the exporter documents.

/// Scrape executor metrics
pub mod scrape {
    /// Total scrape attempts, labelled by `kind`
    pub const ATTEMPTS_TOTAL: &str = "chainscope_scrape_attempts_total";
    /// Failed scrape attempts, labelled by `kind` and `failure`
    pub const FAILURES_TOTAL: &str = "chainscope_scrape_failures_total";
    /// Duration of one scrape attempt in seconds
    pub const DURATION_SECONDS: &str = "chainscope_scrape_duration_seconds";
    /// Retries scheduled after a transient failure
    pub const RETRIES_TOTAL: &str = "chainscope_scrape_retries_total";
}

/// Result cache metrics
pub mod cache {
    /// Requests served from a fresh entry
    pub const HITS_TOTAL: &str = "chainscope_cache_hits_total";
    /// Requests with no fresh entry
    pub const MISSES_TOTAL: &str = "chainscope_cache_misses_total";
    /// Entries currently held (fresh and stale)
    pub const ENTRIES: &str = "chainscope_cache_entries";
    /// Entries held past their TTL
    pub const STALE_ENTRIES: &str = "chainscope_cache_stale_entries";
    /// Entries reclaimed by the background sweep
    pub const SWEPT_TOTAL: &str = "chainscope_cache_swept_total";
}

/// Coalescing scheduler metrics
pub mod scheduler {
    /// Callers that attached to an already in-flight scrape
    pub const COALESCED_TOTAL: &str = "chainscope_scheduler_coalesced_total";
    /// Scrapes currently in flight
    pub const IN_FLIGHT: &str = "chainscope_scheduler_in_flight";
    /// Requests short-circuited by a rate-limit cooldown
    pub const COOLDOWN_REJECTIONS_TOTAL: &str = "chainscope_scheduler_cooldown_rejections_total";
}

/// Browser session pool metrics
pub mod browser {
    /// Live browser sessions (idle and lent)
    pub const SESSIONS_ACTIVE: &str = "chainscope_browser_sessions_active";
    /// Total browser sessions launched
    pub const SESSIONS_CREATED_TOTAL: &str = "chainscope_browser_sessions_created_total";
    /// Total browser sessions discarded as unhealthy or idle
    pub const SESSIONS_DISCARDED_TOTAL: &str = "chainscope_browser_sessions_discarded_total";
    /// Time spent waiting for a session in seconds
    pub const ACQUIRE_WAIT_SECONDS: &str = "chainscope_browser_acquire_wait_seconds";
    /// Acquisitions that timed out
    pub const ACQUIRE_TIMEOUTS_TOTAL: &str = "chainscope_browser_acquire_timeouts_total";
    /// Navigation duration in seconds
    pub const NAVIGATION_DURATION_SECONDS: &str = "chainscope_browser_navigation_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const KIND: &str = "kind";
    pub const FAILURE: &str = "failure";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Scrape and navigation durations: 100ms to 2 minutes
    pub const SCRAPE_DURATION: &[f64] = &[
        0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 45.0, 60.0, 120.0,
    ];

    /// Pool acquire waits: 1ms to 60s
    pub const ACQUIRE_WAIT: &[f64] = &[
        0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];
}
