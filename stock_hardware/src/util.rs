use std::time::Duration;

use stock_traits::Clock;

use crate::error::{HwError, Result};

/// Poll `ready` every `interval` until it reports true, or fail with
/// `DataReadyTimeout` once `timeout` has elapsed on `clock`.
///
/// The predicate is always evaluated at least once, so an already-ready
/// device never sleeps. Predicate errors are returned as-is.
pub fn poll_until<C: Clock + ?Sized>(
    mut ready: impl FnMut() -> Result<bool>,
    timeout: Duration,
    interval: Duration,
    clock: &C,
) -> Result<()> {
    let deadline = clock.now() + timeout;
    while !ready()? {
        if clock.now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        clock.sleep(interval);
    }
    Ok(())
}
