use futures_util::future::BoxFuture;

use super::FetchError;
use crate::ItemId;

/// Retrieves the detail of a single hierarchy item from the inspected process.
///
/// Calls may resolve in any order relative to each other. The handler restores
/// submission order and drops results that belong to a superseded run, so
/// implementations only need to answer the one request they are given. Any
/// bound on concurrent requests is the implementation's business.
pub trait Fetcher: Send + Sync + 'static {
    /// Detail payload produced for one item.
    type Detail: Send + 'static;

    /// Starts fetching the detail of `item_id`.
    fn fetch_detail(&self, item_id: ItemId) -> BoxFuture<'static, Result<Self::Detail, FetchError>>;
}
