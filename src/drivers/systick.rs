//! Millisecond clock driven by the SysTick exception.
//!
//! The firmware configures SysTick to fire once per millisecond (see
//! [`SysTickClock::start`] on Cortex-M) and calls [`on_systick`] from its
//! exception handler. Instants are plain millisecond counts and wrap
//! after roughly 49 days; differences stay correct across the wrap.
use crate::hal::time;
use core::sync::atomic::{AtomicU32, Ordering};

static MILLISECONDS: AtomicU32 = AtomicU32::new(0);

/// Advances the clock by one millisecond. Call from the SysTick handler only.
pub fn on_systick() {
    // Single writer; thumbv6m has no atomic read-modify-write.
    MILLISECONDS.store(MILLISECONDS.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
}

/// Opaque wrapper around the millisecond counter at a certain point in time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tick {
    counter: u32,
}

/// Tick subtraction to obtain a time period
impl core::ops::Sub for Tick {
    type Output = time::Milliseconds;

    fn sub(self, rhs: Self) -> Self::Output {
        time::Milliseconds(self.counter.wrapping_sub(rhs.counter))
    }
}

/// Addition between any Millisecond-convertible type and the current tick.
impl<T: Into<time::Milliseconds>> core::ops::Add<T> for Tick {
    type Output = Self;

    fn add(self, rhs: T) -> Self { Self { counter: self.counter.wrapping_add(rhs.into().0) } }
}

impl time::Instant for Tick {}

#[derive(Default)]
pub struct SysTickClock;

impl time::Now for SysTickClock {
    type I = Tick;
    fn now(&self) -> Tick { Tick { counter: MILLISECONDS.load(Ordering::Relaxed) } }
}

#[cfg(target_arch = "arm")]
impl SysTickClock {
    /// Programs SysTick for a 1 kHz exception rate from the core clock.
    pub fn start(mut syst: cortex_m::peripheral::SYST, sysclk_hz: u32) -> Self {
        use cortex_m::peripheral::syst::SystClkSource;
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(sysclk_hz / 1_000 - 1);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();
        Self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::time::{Milliseconds, Seconds};

    #[test]
    fn tick_differences_and_additions() {
        // Given
        let early = Tick { counter: 1_000 };
        let late = Tick { counter: 1_500 };

        // Then
        assert_eq!(Milliseconds(500), late - early);

        // Given
        let late = late + Milliseconds(300) + Seconds(1);

        // Then
        assert_eq!(Milliseconds(1_800), late - early);
    }

    #[test]
    fn differences_survive_counter_wrap() {
        let before = Tick { counter: u32::MAX - 9 };
        let after = before + Milliseconds(20);
        assert_eq!(after - before, Milliseconds(20));
    }
}
