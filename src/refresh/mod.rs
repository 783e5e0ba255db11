mod controller;
mod scheduler;

pub use controller::{backoff_delay, run_refresh_cycle, RetryPolicy};
pub use scheduler::{spawn_supervisor, RefreshPolicy, RefreshScheduler, RefreshState};
