//! Readiness polling.
//!
//! Services are considered ready when a probe succeeds, not after a fixed
//! sleep. `wait_until` runs the probe, sleeps `interval` between attempts and
//! gives up once `timeout` has elapsed.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl ReadinessPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Poll `probe` until it returns `Ok(true)`.
///
/// Returns the number of attempts made. A probe error aborts the wait
/// immediately; `Ok(false)` means "not yet".
pub fn wait_until<F>(name: &str, policy: ReadinessPolicy, mut probe: F) -> Result<u32>
where
    F: FnMut() -> Result<bool>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if probe()? {
            info!(attempts, elapsed = ?start.elapsed(), "{} is ready", name);
            return Ok(attempts);
        }

        if start.elapsed() + policy.interval > policy.timeout {
            return Err(ProvisionError::Readiness {
                probe: name.to_string(),
                timeout: policy.timeout,
            });
        }

        debug!(attempts, "{} not ready yet", name);
        std::thread::sleep(policy.interval);
    }
}
