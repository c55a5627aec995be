use nbuild_types::SpecTuple;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown spec {0}")]
    UnknownSpec(SpecTuple),
    #[error("unknown package {pkg:?} in spec {spec}")]
    UnknownPackage { spec: SpecTuple, pkg: String },
    #[error("source checkout failed: {0:#}")]
    Checkout(#[source] anyhow::Error),
    #[error("storage operation failed: {0:#}")]
    Storage(#[source] anyhow::Error),
    #[error("failed to (de)serialize atom: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("index lookup failed: {0}")]
    Index(#[from] nbuild_repodata::Error),
    #[error("import task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Import(#[from] anyhow::Error),
}
