#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("queue is empty")]
    QueueEmpty,
    #[error(transparent)]
    Capacity(#[from] nbuild_capacity::Error),
}
