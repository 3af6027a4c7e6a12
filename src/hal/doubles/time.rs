use crate::hal::time;
use std::cell::Cell;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MockInstant(pub u32);

/// Clock that moves forward by a fixed step every time it is queried,
/// so polling loops make progress towards their deadlines.
pub struct MockSysTick {
    now: Cell<u32>,
    step: time::Milliseconds,
}

impl Default for MockSysTick {
    fn default() -> Self { Self::with_step(time::Milliseconds(1)) }
}

impl MockSysTick {
    pub fn with_step(step: time::Milliseconds) -> Self { Self { now: Cell::new(0), step } }

    /// Current time without advancing the clock.
    pub fn peek(&self) -> time::Milliseconds { time::Milliseconds(self.now.get()) }
}

impl time::Instant for MockInstant {}

impl time::Now for MockSysTick {
    type I = MockInstant;
    fn now(&self) -> MockInstant {
        self.now.set(self.now.get().wrapping_add(self.step.0));
        MockInstant(self.now.get())
    }
}

impl core::ops::Sub for MockInstant {
    type Output = time::Milliseconds;
    fn sub(self, rhs: Self) -> Self::Output { time::Milliseconds(self.0.wrapping_sub(rhs.0)) }
}

impl core::ops::Add<time::Milliseconds> for MockInstant {
    type Output = Self;
    fn add(self, rhs: time::Milliseconds) -> Self { MockInstant(self.0.wrapping_add(rhs.0)) }
}
