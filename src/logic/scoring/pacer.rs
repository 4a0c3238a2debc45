//! Pacing between iterations.
//!
//! The loop never calls `tokio::time::sleep` directly, so tests can drive
//! iterations back to back and inspect the pauses that would have happened.

#![allow(async_fn_in_trait)]

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Batch was empty
    Idle,
    /// Connection could not be acquired
    StoreUnavailable,
    /// Short pause after every iteration
    Settle,
}

pub trait Pacer {
    async fn pause(&self, duration: Duration, reason: PauseReason);
}

/// Real timers
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration, _reason: PauseReason) {
        tokio::time::sleep(duration).await;
    }
}
