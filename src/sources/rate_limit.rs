//! Serializes outbound requests with an enforced minimum inter-request
//! interval, independent of how many logical queries are in flight.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

pub(crate) const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Inter-request spacing toward the upstream host.
///
/// One instance is owned by the service and shared by handle with every
/// fetch path; there is no ambient global.
#[derive(Debug)]
pub(crate) struct RateGovernor {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateGovernor {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Blocks until at least `min_interval` has passed since the previous
    /// permitted request, then records the new request time.
    pub(crate) async fn wait(&self) {
        loop {
            let now = Instant::now();
            let mut last = self.last_request.lock().await;

            match *last {
                Some(prev) if prev + self.min_interval > now => {
                    let target = prev + self.min_interval;
                    drop(last);
                    sleep_until(target).await;
                }
                _ => {
                    *last = Some(now);
                    return;
                }
            }
        }
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
