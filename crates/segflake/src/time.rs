use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Custom epoch: Wednesday, January 1, 2025 00:00:00 UTC
pub const CUSTOM_EPOCH: Duration = Duration::from_millis(1_735_689_600_000);

/// Twitter epoch: Thursday, November 4, 2010 1:42:54.657 UTC
pub const TWITTER_EPOCH: Duration = Duration::from_millis(1_288_834_974_657);

/// A wall-clock source measured from the Unix epoch.
///
/// This abstraction allows you to plug in the real system clock or a mocked
/// time source in tests. Composers also route their bounded back-off through
/// [`TimeSource::sleep`], so a mock can advance its own time instead of
/// blocking.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use segflake::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn now(&self) -> Duration {
///         Duration::from_millis(1234)
///     }
/// }
///
/// assert_eq!(FixedTime.now().as_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time since 1970-01-01 UTC.
    fn now(&self) -> Duration;

    /// Blocks the calling thread for `dur`.
    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

/// [`TimeSource`] backed by [`SystemTime::now`].
///
/// A system clock set before 1970 reads as the Unix epoch itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, dur: Duration) {
        (**self).sleep(dur);
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, dur: Duration) {
        (**self).sleep(dur);
    }
}
