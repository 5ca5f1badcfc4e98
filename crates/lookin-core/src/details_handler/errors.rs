use crate::ItemId;

/// A fetcher failed to produce the detail of one item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to fetch detail for {item_id}: {message}")]
pub struct FetchError {
    /// Item whose detail could not be fetched.
    pub item_id: ItemId,
    /// Fetcher-supplied reason.
    pub message: String,
}

impl FetchError {
    /// Builds a failure for `item_id`.
    pub fn new(item_id: ItemId, message: impl Into<String>) -> Self {
        Self {
            item_id,
            message: message.into(),
        }
    }
}

/// Errors returned by [`DetailsHandler`](super::DetailsHandler) operations.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The coordinator task has stopped and no longer accepts commands.
    #[error("details handler is closed")]
    Closed,
}
