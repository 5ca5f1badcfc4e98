//! Scheduling core for fetching item details out of a remotely inspected view hierarchy.
//!
//! Detail requests are grouped into [`Package`]s and executed by a
//! [`DetailsHandler`](details_handler::DetailsHandler), which orders them by
//! priority, lets callers promote packages mid-run, and supersedes a run as
//! soon as a newer one starts.

mod ids;
mod package;
mod task;

pub mod details_handler;

pub use ids::{ItemId, PackageId};
pub use package::{Package, sort_by_priority};
pub use task::{Task, TaskState, TaskTransitionError};
