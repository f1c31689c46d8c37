#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "prometheus")]
    #[error(transparent)]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),

    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

pub type Result<T> = std::result::Result<T, Error>;
