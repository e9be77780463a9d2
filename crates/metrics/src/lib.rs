//! Metrics collection and export for chainscope.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are exported in Prometheus format.
//! Without an installed recorder every macro call is a no-op.
//!
//! # Usage
//!
//! ```rust,ignore
//! use chainscope_metrics::{counter, histogram, scrape};
//!
//! counter!(scrape::ATTEMPTS_TOTAL, "kind" => "chain").increment(1);
//! histogram!(scrape::DURATION_SECONDS).record(4.2);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
