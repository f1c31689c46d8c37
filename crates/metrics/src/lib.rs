//! Metrics collection and export for chatrelay.
//!
//! Crates record through the `metrics` facade using the names defined here.
//! Nothing is exported until [`init_metrics`] installs a recorder, which
//! requires the `prometheus` feature.
//!
//! ```rust,ignore
//! use chatrelay_metrics::{bridge, counter};
//!
//! counter!(bridge::EVENTS_RELAYED_TOTAL, "kind" => "message").increment(1);
//! ```

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
