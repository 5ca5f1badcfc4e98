use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for a [`DetailsHandler`](super::DetailsHandler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsConfig {
    /// Capacity of the coordinator's command channel.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Hand the details collected before a failure to the callback alongside the error.
    /// When false a failed run reports an empty detail list.
    #[serde(default = "default_partial_on_failure")]
    pub partial_on_failure: bool,

    /// How long shutdown waits for fetches still in flight before leaving them behind.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_command_buffer() -> usize {
    1024
}

fn default_partial_on_failure() -> bool {
    true
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl Default for DetailsConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
            partial_on_failure: default_partial_on_failure(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl DetailsConfig {
    /// The shutdown grace period as a Duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
