//! Bounds for blocking waits.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// A point in time after which a wait gives up, or no limit at all.
///
/// Deadlines are measured on tokio's clock, so they follow
/// `tokio::time::pause` in tests.
///
/// ```
/// use std::time::Duration;
/// use bop_queue::Deadline;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let forever = Deadline::default();
/// assert!(!forever.is_reachable());
///
/// let soon = Deadline::from_duration(Duration::from_millis(5));
/// assert!(soon.is_reachable());
/// assert!(Deadline::passed().is_reached());
/// # }
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that is never reached.
    #[inline]
    pub const fn unbounded() -> Self {
        Self { at: None }
    }

    /// A deadline that has already been reached.
    #[inline]
    pub fn passed() -> Self {
        Self {
            at: Some(Instant::now()),
        }
    }

    /// A deadline `duration` from now.
    ///
    /// Durations too large to represent saturate to [`Deadline::unbounded`].
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(duration),
        }
    }

    /// A deadline at the given instant.
    #[inline]
    pub const fn from_instant(at: Instant) -> Self {
        Self { at: Some(at) }
    }

    /// Returns `true` if this deadline can ever be reached.
    #[inline]
    pub const fn is_reachable(&self) -> bool {
        self.at.is_some()
    }

    /// Returns `true` once the deadline is in the past.
    #[inline]
    pub fn is_reached(&self) -> bool {
        match self.at {
            Some(at) => at <= Instant::now(),
            None => false,
        }
    }

    /// Time remaining until the deadline, zero once it is reached, or `None`
    /// when the deadline is unbounded.
    pub fn time_left(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The instant of the deadline, `None` when unbounded.
    #[inline]
    pub const fn instant(&self) -> Option<Instant> {
        self.at
    }
}

impl From<Duration> for Deadline {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

impl From<Instant> for Deadline {
    fn from(at: Instant) -> Self {
        Self::from_instant(at)
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time_left() {
            Some(left) => f.debug_tuple("Deadline").field(&left).finish(),
            None => f.write_str("Deadline(unbounded)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unbounded_is_never_reached() {
        let deadline = Deadline::unbounded();
        assert_eq!(deadline, Deadline::default());
        assert!(!deadline.is_reachable());
        assert!(!deadline.is_reached());
        assert_eq!(deadline.time_left(), None);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!deadline.is_reached());
    }

    #[tokio::test(start_paused = true)]
    async fn duration_deadline_counts_down() {
        let deadline = Deadline::from_duration(Duration::from_millis(100));
        assert!(!deadline.is_reached());
        assert_eq!(deadline.time_left(), Some(Duration::from_millis(100)));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(deadline.time_left(), Some(Duration::from_millis(40)));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(deadline.is_reached());
        assert_eq!(deadline.time_left(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn passed_deadline_is_reached() {
        let deadline = Deadline::passed();
        assert!(deadline.is_reachable());
        assert!(deadline.is_reached());
    }

    #[tokio::test(start_paused = true)]
    async fn huge_duration_saturates_to_unbounded() {
        let deadline = Deadline::from_duration(Duration::MAX);
        assert!(!deadline.is_reachable());
    }
}
