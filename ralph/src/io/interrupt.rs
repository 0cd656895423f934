//! Operator interrupt (Ctrl-C) propagation.
//!
//! The handler only raises a flag. Blocking points in the loop (waiting for
//! the agent, sleeping between iterations) poll it and bail out with
//! [`Interrupted`] before any iteration bookkeeping is written.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Poll granularity for interruptible waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Returned when the operator interrupted the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Shared interrupt flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// A flag nothing will ever raise except [`Interrupt::trigger`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process-wide Ctrl-C handler. Call once.
    pub fn install() -> Result<Self> {
        let interrupt = Self::new();
        let flag = interrupt.flag.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("install interrupt handler")?;
        Ok(interrupt)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            return Err(Interrupted.into());
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early with [`Interrupted`] if raised.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            thread::sleep(remaining.min(POLL_INTERVAL));
        }
    }
}
