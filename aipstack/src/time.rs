/*! Time structures.

The `time` module contains structures used to represent both
absolute and relative time.

 - [Instant] is used to represent absolute time.
 - [Duration] is used to represet relative time.

Unlike a desktop clock, the tick counter of a microcontroller is narrow and wraps around. An
`Instant` is therefore a point on a circle of 2<sup>32</sup> milliseconds (about 49.7 days) and
deliberately does not implement `Ord`. Two instants can only be ordered relative to some
reference point, exactly like TCP sequence numbers, see [`Instant::lt`].

[Instant]: struct.Instant.html
[Duration]: struct.Duration.html
*/
use core::{fmt, ops};
pub use core::time::Duration;

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around a `u32` value that represents a number of
/// milliseconds since an arbitrary moment in time, such as system startup. Arithmetic wraps
/// modulo 2<sup>32</sup>.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Instant {
    pub millis: u32,
}

/// An expiration time, inversion of `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    When(Instant),
    Never,
}

use Expiration::{When, Never};

impl Instant {
    /// The instant with a tick count of zero.
    pub const ZERO: Instant = Instant { millis: 0 };

    /// The value with only the most significant bit set.
    ///
    /// Half the circle, the largest distance at which two instants can still be ordered.
    pub const HALF_RANGE: u32 = 1 << 31;

    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis(millis: u32) -> Instant {
        Instant { millis }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs(secs: u32) -> Instant {
        Instant { millis: secs.wrapping_mul(1000) }
    }

    /// The fractional number of milliseconds that have passed
    /// since the beginning of time.
    pub fn millis(&self) -> u32 {
        self.millis % 1000
    }

    /// The number of whole seconds that have passed since the
    /// beginning of time.
    pub fn secs(&self) -> u32 {
        self.millis / 1000
    }

    /// The total number of milliseconds that have passed since
    /// the biginning of time.
    pub fn total_millis(&self) -> u32 {
        self.millis
    }

    /// The number of ticks from `earlier` to `self`, modulo the clock range.
    pub fn diff(self, earlier: Instant) -> u32 {
        self.millis.wrapping_sub(earlier.millis)
    }

    /// Compare two instants relative to a reference point.
    ///
    /// True if `self` comes before `other` when walking forward from `reference`.
    pub fn lt(self, other: Instant, reference: Instant) -> bool {
        self.diff(reference) < other.diff(reference)
    }

    /// Compare two instants relative to a reference point, allowing equality.
    pub fn lte(self, other: Instant, reference: Instant) -> bool {
        self.diff(reference) <= other.diff(reference)
    }

    /// Shift the instant by a raw tick count, wrapping around.
    pub fn wrapping_add(self, ticks: u32) -> Instant {
        Instant { millis: self.millis.wrapping_add(ticks) }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

/// Milliseconds of a duration, truncated to the clock width.
fn ticks(duration: Duration) -> u32 {
    duration.as_millis() as u32
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        self.wrapping_add(ticks(rhs))
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant { millis: self.millis.wrapping_sub(ticks(rhs)) }
    }
}

impl ops::SubAssign<Duration> for Instant {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Expiration {
    /// Check if the expiration will never happen.
    pub fn is_never(&self) -> bool {
        *self == Never
    }

    /// The expiration instant, if any.
    pub fn instant(&self) -> Option<Instant> {
        (*self).into()
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
    }
}

impl From<Option<Instant>> for Expiration {
    fn from(opt: Option<Instant>) -> Self {
        match opt {
            Some(instant) => When(instant),
            None => Never,
        }
    }
}

impl From<Expiration> for Option<Instant> {
    fn from(opt: Expiration) -> Self {
        match opt {
            When(instant) => Some(instant),
            Never => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_instant_ops() {
        assert_eq!(Instant::from_millis(4) + Duration::from_millis(6), Instant::from_millis(10));
        assert_eq!(Instant::from_millis(7) - Duration::from_millis(5), Instant::from_millis(2));
    }

    #[test]
    fn test_instant_wraps() {
        let late = Instant::from_millis(u32::max_value() - 1);
        let wrapped = late + Duration::from_millis(4);
        assert_eq!(wrapped, Instant::from_millis(2));
        assert_eq!(wrapped.diff(late), 4);

        let reference = late - Duration::from_millis(100);
        assert!(late.lt(wrapped, reference));
        assert!(!wrapped.lt(late, reference));
        assert!(wrapped.lte(wrapped, reference));
    }

    #[test]
    fn test_instant_getters() {
        let instant = Instant::from_millis(5674);
        assert_eq!(instant.secs(), 5);
        assert_eq!(instant.millis(), 674);
        assert_eq!(instant.total_millis(), 5674);
    }

    #[test]
    fn test_instant_display() {
        assert_eq!(format!("{}", Instant::from_millis(5674)), "5.674s");
        assert_eq!(format!("{}", Instant::from_millis(5000)), "5.000s");
    }

    #[test]
    fn test_expiration() {
        assert!(Expiration::default().is_never());
        let when = Expiration::from(Some(Instant::from_secs(3)));
        assert_eq!(when.instant(), Some(Instant::from_millis(3000)));
        assert_eq!(Option::<Instant>::from(Expiration::Never), None);
    }
}
