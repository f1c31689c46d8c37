//! Metrics recorder initialization.

use std::net::SocketAddr;

use tracing::info;

use crate::error::Result;

/// Handle to the installed recorder.
#[derive(Clone, Default)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl MetricsHandle {
    /// Render the current metrics in Prometheus text format.
    ///
    /// Empty when metrics are disabled.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle
                .as_ref()
                .map(|h| h.render())
                .unwrap_or_default()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.is_some()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            false
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Address to serve `/metrics` on; no listener when `None`
    pub listen: Option<SocketAddr>,
    /// Labels added to every metric
    pub global_labels: Vec<(String, String)>,
}

/// Install the global recorder.
///
/// Call once at startup, inside a tokio runtime when `listen` is set. When
/// disabled, or built without the `prometheus` feature, nothing is installed
/// and every metric is a no-op.
///
/// # Errors
///
/// Fails if the exporter cannot be built or a recorder is already installed.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle::default());
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        Ok(MetricsHandle {
            prometheus_handle: Some(handle),
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle::default())
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use {
        crate::{buckets, error::Error},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Suffix("_duration_seconds".to_string()),
        buckets::DURATION,
    )?;
    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    let Some(addr) = config.listen else {
        let handle = builder.install_recorder()?;
        info!("prometheus recorder installed");
        return Ok(handle);
    };

    let (recorder, exporter) = builder.with_http_listener(addr).build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| Error::AlreadyInstalled)?;
    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::warn!(error = ?e, "prometheus exporter stopped");
        }
    });
    info!(%addr, "prometheus exporter listening");
    Ok(handle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn disabled_installs_nothing() {
        let handle = init_metrics(MetricsRecorderConfig::default()).unwrap();
        assert!(!handle.is_enabled());
        assert!(handle.render().is_empty());
    }
}
