//! Scrape orchestration and response cache.
//!
//! Requests flow through three composable layers:
//!
//! ```text
//! Scheduler (cache + single-flight + cooldown)
//!   └─ Retrying (bounded backoff on transient failures)
//!        └─ ScrapeExecutor (one attempt: pool session → fetch → parse)
//! ```
//!
//! Each layer implements or consumes [`Scraper`], so tests can replace any
//! of them with a fake.

pub mod cache;
pub mod executor;
pub mod key;
pub mod outcome;
pub mod parser;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod symbol;

pub use {
    cache::{CacheEntry, CacheStats, ResultCache, TtlPolicy},
    executor::{ExecutorConfig, ScrapeExecutor, Scraper},
    key::{Expiration, InvalidExpiration, ScrapeKey, ScrapeKind},
    outcome::{FailureKind, ScrapeFailure, ScrapeOutcome},
    parser::{ParseError, parse},
    record::{ChainRow, ExpirationEntry, OptionSide, Quote, Record},
    retry::{RetryPolicy, Retrying},
    scheduler::{EntryOutcome, Scheduler, SchedulerConfig},
    service::ScrapeService,
    source::{BarchartSource, Source},
    symbol::{InvalidSymbol, Symbol, normalize},
};
