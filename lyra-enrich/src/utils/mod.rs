//! Utility modules for lyra-enrich

pub mod cancel;
pub mod fanout;
pub mod retry;

pub use cancel::cancellable;
pub use fanout::{run_bounded, FanoutReport};
pub use retry::{retry_on_lock, retry_with_backoff, RetryPolicy};
