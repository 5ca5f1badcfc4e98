//! Priority-ordered, supersedable fetching of hierarchy item details.
//!
//! A [`DetailsHandler`] is a handle to a single coordinator task that owns the
//! live run. Starting a run bumps the generation and silently abandons the
//! previous one; fetch resolutions tagged with an older generation are
//! discarded when they arrive.

mod config;
mod errors;
mod fetcher;
mod handle;
mod messages;
mod run;
mod scheduler;

pub use config::DetailsConfig;
pub use errors::{FetchError, HandlerError};
pub use fetcher::Fetcher;
pub use handle::{DetailsHandler, RunOutcome, RunTicket};
pub use messages::{SchedulerSnapshot, SchedulerStats};
