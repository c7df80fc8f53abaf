//! Stream time.
//!
//! [`ClockTime`] is a nanosecond count used for buffer timestamps, positions,
//! durations and seek targets. Unknown times are modelled as
//! `Option<ClockTime>` rather than with a sentinel.

use std::time::Duration;

/// Time in nanoseconds.
///
/// # Examples
///
/// ```rust
/// use mediagraph::clock::ClockTime;
///
/// let t = ClockTime::from_secs(1) + ClockTime::from_millis(500);
/// assert_eq!(t.millis(), 1500);
/// assert_eq!(t.to_string(), "0:00:01.500000000");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// One second.
    pub const SECOND: Self = Self(1_000_000_000);

    /// Largest representable time.
    pub const MAX: Self = Self(u64::MAX);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// Nanoseconds.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Whole milliseconds.
    #[inline]
    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Whole seconds.
    #[inline]
    pub const fn secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Duration of one frame at `num/den` frames per second.
    ///
    /// Returns `None` for a zero or negative rate.
    pub fn frame_duration(num: i64, den: i64) -> Option<Self> {
        if num <= 0 || den <= 0 {
            return None;
        }
        let ns = (1_000_000_000u128 * den as u128) / num as u128;
        Some(Self(u64::try_from(ns).unwrap_or(u64::MAX)))
    }

    /// `self * n`, saturating.
    #[inline]
    pub const fn saturating_mul(self, n: u64) -> Self {
        Self(self.0.saturating_mul(n))
    }

    /// How many whole `unit`s fit into `self`. `None` if `unit` is zero.
    #[inline]
    pub const fn checked_div_time(self, unit: Self) -> Option<u64> {
        if unit.0 == 0 {
            None
        } else {
            Some(self.0 / unit.0)
        }
    }

    /// Subtraction clamped at zero.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for ClockTime {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<ClockTime> for Duration {
    #[inline]
    fn from(t: ClockTime) -> Self {
        Duration::from_nanos(t.0)
    }
}

/// `h:mm:ss.nnnnnnnnn`
impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.secs();
        write!(
            f,
            "{}:{:02}:{:02}.{:09}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            self.0 % 1_000_000_000
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_and_units() {
        assert_eq!(ClockTime::from_millis(1_000).nanos(), 1_000_000_000);
        assert_eq!(ClockTime::from_secs(2).millis(), 2_000);
        assert_eq!(ClockTime::from_nanos(1_999_999_999).secs(), 1);
    }

    #[test]
    fn test_arithmetic_saturates() {
        let t1 = ClockTime::from_secs(1);
        let t2 = ClockTime::from_millis(500);
        assert_eq!((t1 + t2).millis(), 1500);
        assert_eq!((t1 - t2).millis(), 500);
        assert_eq!(t2 - t1, ClockTime::ZERO);
        assert_eq!(ClockTime::MAX + t1, ClockTime::MAX);
    }

    #[test]
    fn test_frame_duration() {
        let d = ClockTime::frame_duration(30, 1).unwrap();
        assert_eq!(d.nanos(), 33_333_333);
        assert_eq!(ClockTime::frame_duration(25, 1).unwrap().millis(), 40);
        assert!(ClockTime::frame_duration(0, 1).is_none());
        assert_eq!(
            ClockTime::from_secs(1).checked_div_time(ClockTime::from_millis(40)),
            Some(25)
        );
        assert_eq!(ClockTime::SECOND.checked_div_time(ClockTime::ZERO), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ClockTime::ZERO.to_string(), "0:00:00.000000000");
        assert_eq!(
            (ClockTime::from_secs(3725) + ClockTime::from_millis(5)).to_string(),
            "1:02:05.005000000"
        );
    }

    #[test]
    fn test_duration_conversion() {
        let t: ClockTime = Duration::from_millis(250).into();
        assert_eq!(t.millis(), 250);
        let d: Duration = t.into();
        assert_eq!(d, Duration::from_millis(250));
    }
}
