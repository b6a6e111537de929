//! Many logical timers on top of a single physical one.
//!
//! Every connection needs several timeouts at once (abort, output, retransmission) but the
//! platform timer facility is usually one-shot and costs something to reprogram. A
//! [`MultiTimer`] keeps one expiry time per logical timer and only ever programs the earliest of
//! them into the physical [`Timer`].
//!
//! Changes are batched. All mutation goes through an [`Update`] guard, the physical timer is
//! reconciled exactly once when the guard is dropped. Expiry is reported as an [`Expired`] guard
//! that works the same way, so the owner can re-arm timers from within the expiry handler without
//! redundant reprogramming.
//!
//! ```
//! use aipstack::time::{Duration, Instant};
//! use aipstack::timer::{Manual, MultiTimer, Timer, TimerId};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq)]
//! enum Ids { Short, Long }
//!
//! impl TimerId for Ids {
//!     type Times = [Instant; 2];
//!     const ALL: &'static [Self] = &[Ids::Short, Ids::Long];
//!     fn index(self) -> usize { self as usize }
//! }
//!
//! let mut timers = MultiTimer::<Ids, _>::new(Manual::new(Instant::ZERO));
//! {
//!     let mut update = timers.update();
//!     update.set_after(Ids::Long, Duration::from_secs(10));
//!     update.set_after(Ids::Short, Duration::from_secs(1));
//! }
//! assert_eq!(timers.backend().expiration().instant(), Some(Instant::from_secs(1)));
//!
//! assert!(timers.backend_mut().advance(Duration::from_secs(1)));
//! let expired = timers.handle_expired().expect("short timer fired");
//! assert_eq!(expired.id(), Ids::Short);
//! drop(expired);
//! assert_eq!(timers.backend().expiration().instant(), Some(Instant::from_secs(10)));
//! ```
//!
//! [`MultiTimer`]: struct.MultiTimer.html
//! [`Timer`]: trait.Timer.html
//! [`Update`]: struct.Update.html
//! [`Expired`]: struct.Expired.html
use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::time::{Duration, Expiration, Instant};

/// A physical one-shot timer provided by the platform.
pub trait Timer {
    /// The current time of the event loop.
    fn now(&self) -> Instant;

    /// Arm the timer for an absolute time, replacing any previous setting.
    fn set_at(&mut self, at: Instant);

    /// Disarm the timer.
    fn unset(&mut self);

    /// The time the timer was last armed for.
    ///
    /// This is still reported after the timer fired, until it is disarmed or armed again.
    fn expiration(&self) -> Expiration;
}

/// The set of logical timers multiplexed onto one physical timer.
///
/// Usually implemented by a field-less enum.
pub trait TimerId: Copy + Eq + fmt::Debug + 'static {
    /// Storage for one `Instant` per timer, `[Instant; COUNT]`.
    type Times: Default + AsRef<[Instant]> + AsMut<[Instant]>;

    /// All timers, in order of their index.
    ///
    /// When several timers expire at the same instant they are reported in this order.
    const ALL: &'static [Self];

    /// The number of timers. At most 31.
    const COUNT: usize = Self::ALL.len();

    /// The position of this timer within `ALL`.
    fn index(self) -> usize;
}

/// Logical timers sharing one physical timer.
///
/// Each logical timer is either unset or set to some absolute time. The physical timer always
/// runs for the earliest set timer, or is disarmed when none is set, as long as no change is
/// pending. Pending changes are tracked by a dirty bit and applied by [`do_delayed_update`],
/// which the guards call on drop.
///
/// [`do_delayed_update`]: #method.do_delayed_update
pub struct MultiTimer<Id: TimerId, T: Timer> {
    timer: T,
    /// One bit per timer, plus the dirty bit at position `Id::COUNT`.
    state: u32,
    times: Id::Times,
}

/// A batch of changes to a `MultiTimer`.
///
/// Reprograms the physical timer once when dropped.
pub struct Update<'a, Id: TimerId, T: Timer> {
    inner: &'a mut MultiTimer<Id, T>,
}

/// A logical timer that has expired.
///
/// The timer is already unset. Dereferences to an `Update` so that timers can be re-armed while
/// handling the expiry. Reprograms the physical timer once when dropped.
pub struct Expired<'a, Id: TimerId, T: Timer> {
    update: Update<'a, Id, T>,
    id: Id,
}

/// A software timer whose clock is advanced by hand.
///
/// Serves for simulation and tests, and as the reference behaviour for platform timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Manual {
    now: Instant,
    at: Expiration,
    armed: bool,
}

impl<Id: TimerId, T: Timer> MultiTimer<Id, T> {
    /// Create the timer set with all timers unset.
    pub fn new(timer: T) -> Self {
        debug_assert!(Id::COUNT < 32);
        debug_assert!(Id::ALL.iter().enumerate().all(|(idx, id)| id.index() == idx));
        MultiTimer {
            timer,
            state: 0,
            times: Id::Times::default(),
        }
    }

    fn timer_bit(id: Id) -> u32 {
        1 << id.index()
    }

    fn dirty_bit() -> u32 {
        1 << Id::COUNT
    }

    /// The physical timer.
    pub fn backend(&self) -> &T {
        &self.timer
    }

    /// Mutable access to the physical timer.
    ///
    /// Programming the physical timer directly desynchronizes it until the next update.
    pub fn backend_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// The current time of the physical timer.
    pub fn now(&self) -> Instant {
        self.timer.now()
    }

    /// Check if a logical timer is set.
    pub fn is_set(&self, id: Id) -> bool {
        self.state & Self::timer_bit(id) != 0
    }

    /// The time a logical timer is set for, if it is set.
    pub fn set_time(&self, id: Id) -> Option<Instant> {
        if self.is_set(id) {
            Some(self.times.as_ref()[id.index()])
        } else {
            None
        }
    }

    /// Check if a change has not yet been applied to the physical timer.
    pub fn is_dirty(&self) -> bool {
        self.state & Self::dirty_bit() != 0
    }

    /// Start a batch of changes.
    pub fn update(&mut self) -> Update<'_, Id, T> {
        debug_assert!(!self.is_dirty(), "previous update was not applied");
        Update { inner: self }
    }

    /// Unset all logical timers and the physical timer, immediately.
    pub fn unset_all(&mut self) {
        self.timer.unset();
        self.state = 0;
    }

    /// Apply pending changes to the physical timer.
    ///
    /// Does nothing if nothing changed since the last call.
    pub fn do_delayed_update(&mut self) {
        if !self.is_dirty() {
            return;
        }

        self.state &= !Self::dirty_bit();
        if self.state == 0 {
            self.timer.unset();
            return;
        }

        // Every set timer is assumed to lie within half the clock range around now.
        let reference = self.timer.now().wrapping_add(Instant::HALF_RANGE);
        let state = self.state;
        let times = self.times.as_ref();
        let earliest = Id::ALL.iter()
            .filter(|id| state & Self::timer_bit(**id) != 0)
            .map(|id| times[id.index()].diff(reference))
            .min()
            .unwrap_or(0);

        let at = reference.wrapping_add(earliest);
        net_trace!("timer reprogrammed for {}", at);
        self.timer.set_at(at);
    }

    /// Dispatch an expiry of the physical timer to the logical timer it was programmed for.
    ///
    /// Returns `None` if no set timer matches the expired time. This happens only when the
    /// physical timer was programmed behind our back, the physical timer is resynchronized in
    /// that case.
    pub fn handle_expired(&mut self) -> Option<Expired<'_, Id, T>> {
        debug_assert!(!self.is_dirty(), "update was not applied before returning to the event loop");

        let fired = self.timer.expiration().instant();
        let found = fired.and_then(|fired| Id::ALL.iter()
            .copied()
            .find(|&id| self.set_time(id) == Some(fired)));

        match found {
            Some(id) => {
                self.state = (self.state & !Self::timer_bit(id)) | Self::dirty_bit();
                Some(Expired { update: Update { inner: self }, id })
            },
            None => {
                net_debug!("spurious timer expiry");
                self.state |= Self::dirty_bit();
                self.do_delayed_update();
                None
            },
        }
    }
}

impl<Id: TimerId, T: Timer + fmt::Debug> fmt::Debug for MultiTimer<Id, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut map = f.debug_map();
        for &id in Id::ALL {
            map.entry(&id, &self.set_time(id));
        }
        map.finish()?;
        write!(f, " on {:?}", self.timer)
    }
}

impl<Id: TimerId, T: Timer> Update<'_, Id, T> {
    /// Set a timer to expire at an absolute time.
    pub fn set_at(&mut self, id: Id, at: Instant) {
        let inner = &mut *self.inner;
        inner.times.as_mut()[id.index()] = at;
        inner.state |= MultiTimer::<Id, T>::timer_bit(id) | MultiTimer::<Id, T>::dirty_bit();
    }

    /// Set a timer to expire some time from now.
    pub fn set_after(&mut self, id: Id, after: Duration) {
        let at = self.inner.now() + after;
        self.set_at(id, at)
    }

    /// Unset a timer, whether it is set or not.
    pub fn unset(&mut self, id: Id) {
        let inner = &mut *self.inner;
        inner.state = (inner.state & !MultiTimer::<Id, T>::timer_bit(id))
            | MultiTimer::<Id, T>::dirty_bit();
    }
}

impl<Id: TimerId, T: Timer> Deref for Update<'_, Id, T> {
    type Target = MultiTimer<Id, T>;

    fn deref(&self) -> &MultiTimer<Id, T> {
        self.inner
    }
}

impl<Id: TimerId, T: Timer> Drop for Update<'_, Id, T> {
    fn drop(&mut self) {
        self.inner.do_delayed_update()
    }
}

impl<'a, Id: TimerId, T: Timer> Expired<'a, Id, T> {
    /// The timer that expired.
    pub fn id(&self) -> Id {
        self.id
    }
}

impl<'a, Id: TimerId, T: Timer> Deref for Expired<'a, Id, T> {
    type Target = Update<'a, Id, T>;

    fn deref(&self) -> &Update<'a, Id, T> {
        &self.update
    }
}

impl<'a, Id: TimerId, T: Timer> DerefMut for Expired<'a, Id, T> {
    fn deref_mut(&mut self) -> &mut Update<'a, Id, T> {
        &mut self.update
    }
}

impl Manual {
    /// A disarmed timer whose clock shows `now`.
    pub fn new(now: Instant) -> Self {
        Manual {
            now,
            at: Expiration::Never,
            armed: false,
        }
    }

    /// Check if the timer is armed and has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Move the clock forward and report whether the timer fired.
    pub fn advance(&mut self, by: Duration) -> bool {
        self.now += by;
        self.poll()
    }

    /// Report whether the timer fired at the current time.
    ///
    /// A timer set for a time that has already passed fires on the next poll. It fires once.
    pub fn poll(&mut self) -> bool {
        match self.at {
            Expiration::When(at) if self.armed && self.now.diff(at) < Instant::HALF_RANGE => {
                self.armed = false;
                true
            },
            _ => false,
        }
    }
}

impl Timer for Manual {
    fn now(&self) -> Instant {
        self.now
    }

    fn set_at(&mut self, at: Instant) {
        self.at = Expiration::When(at);
        self.armed = true;
    }

    fn unset(&mut self) {
        self.at = Expiration::Never;
        self.armed = false;
    }

    fn expiration(&self) -> Expiration {
        self.at
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Three {
        A,
        B,
        C,
    }

    impl TimerId for Three {
        type Times = [Instant; 3];
        const ALL: &'static [Self] = &[Three::A, Three::B, Three::C];

        fn index(self) -> usize {
            self as usize
        }
    }

    fn timers_at(millis: u32) -> MultiTimer<Three, Manual> {
        MultiTimer::new(Manual::new(Instant::from_millis(millis)))
    }

    fn programmed(timers: &MultiTimer<Three, Manual>) -> Option<Instant> {
        if timers.backend().is_armed() {
            timers.backend().expiration().instant()
        } else {
            None
        }
    }

    #[test]
    fn starts_unset() {
        let timers = timers_at(0);
        assert_eq!(Three::COUNT, 3);
        assert!(Three::ALL.iter().all(|&id| !timers.is_set(id)));
        assert_eq!(programmed(&timers), None);
    }

    #[test]
    fn earliest_wins() {
        let start = 1_000;
        let mut timers = timers_at(start);
        {
            let mut update = timers.update();
            update.set_at(Three::A, Instant::from_millis(start));
            update.set_at(Three::B, Instant::from_millis(start + 5));
            update.set_at(Three::C, Instant::from_millis(start + 100));
            // Nothing is applied until the batch ends.
            assert!(update.is_dirty());
        }
        assert_eq!(programmed(&timers), Some(Instant::from_millis(start)));

        timers.update().unset(Three::A);
        assert_eq!(programmed(&timers), Some(Instant::from_millis(start + 5)));
        assert_eq!(timers.set_time(Three::A), None);
        assert_eq!(timers.set_time(Three::C), Some(Instant::from_millis(start + 100)));
    }

    #[test]
    fn last_unset_disarms() {
        let mut timers = timers_at(0);
        timers.update().set_after(Three::B, Duration::from_millis(10));
        assert!(timers.backend().is_armed());
        timers.update().unset(Three::B);
        assert!(!timers.backend().is_armed());
        assert_eq!(programmed(&timers), None);
    }

    #[test]
    fn earliest_across_wraparound() {
        let start = u32::max_value() - 10;
        let mut timers = timers_at(start);
        {
            let mut update = timers.update();
            // Numerically small but 30ms in the future.
            update.set_after(Three::A, Duration::from_millis(30));
            update.set_at(Three::B, Instant::from_millis(start + 5));
        }
        assert_eq!(programmed(&timers), Some(Instant::from_millis(start + 5)));

        timers.update().unset(Three::B);
        assert_eq!(programmed(&timers), Some(Instant::from_millis(19)));
    }

    #[test]
    fn expiry_dispatch() {
        let mut timers = timers_at(0);
        {
            let mut update = timers.update();
            update.set_after(Three::C, Duration::from_millis(20));
            update.set_after(Three::B, Duration::from_millis(20));
            update.set_after(Three::A, Duration::from_millis(50));
        }

        assert!(!timers.backend_mut().advance(Duration::from_millis(19)));
        assert!(timers.backend_mut().advance(Duration::from_millis(1)));

        // Equal times are reported in index order.
        let expired = timers.handle_expired().unwrap();
        assert_eq!(expired.id(), Three::B);
        assert!(!expired.is_set(Three::B));
        drop(expired);
        assert!(timers.backend_mut().poll());

        let mut expired = timers.handle_expired().unwrap();
        assert_eq!(expired.id(), Three::C);
        // Re-arm from within the handler.
        expired.set_after(Three::C, Duration::from_millis(100));
        drop(expired);

        assert_eq!(programmed(&timers), Some(Instant::from_millis(50)));
        assert!(timers.backend_mut().advance(Duration::from_millis(30)));
        assert_eq!(timers.handle_expired().map(|exp| exp.id()), Some(Three::A));
        assert_eq!(programmed(&timers), Some(Instant::from_millis(120)));
    }

    #[test]
    fn spurious_expiry_resyncs() {
        let mut timers = timers_at(0);
        timers.update().set_after(Three::A, Duration::from_millis(10));
        timers.backend_mut().set_at(Instant::from_millis(3));
        assert!(timers.backend_mut().advance(Duration::from_millis(3)));
        assert!(timers.handle_expired().is_none());
        assert_eq!(programmed(&timers), Some(Instant::from_millis(10)));
    }

    #[test]
    fn unset_all_clears() {
        let mut timers = timers_at(0);
        {
            let mut update = timers.update();
            update.set_after(Three::A, Duration::from_millis(1));
            update.set_after(Three::C, Duration::from_millis(2));
        }
        timers.unset_all();
        assert!(!timers.is_set(Three::A));
        assert!(!timers.is_set(Three::C));
        assert!(!timers.is_dirty());
        assert_eq!(programmed(&timers), None);
    }

    #[test]
    fn manual_fires_once() {
        let mut timer = Manual::new(Instant::ZERO);
        timer.set_at(Instant::from_millis(5));
        assert!(!timer.poll());
        assert!(timer.advance(Duration::from_millis(7)));
        assert!(!timer.poll());
        assert_eq!(timer.expiration().instant(), Some(Instant::from_millis(5)));
    }
}
