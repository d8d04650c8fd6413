//! In-process run metrics for Talon services.
//!
//! One counter per outcome and a histogram per duration, sampled by the
//! workflow runner and the trigger services. There is no exporter here —
//! callers take a [`MetricsSnapshot`] and render or ship it themselves.

pub mod metrics;

pub use metrics::{Counter, Histogram, HistogramSnapshot, MetricsSnapshot, RuntimeMetrics};
