#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A provider is already at capacity; the scheduler must leave its
    /// queue intact and retry later (spec 4.6/7).
    #[error("no capacity")]
    NoCapacity,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
