use crate::hal::exclusive::Exclusive;

/// Masks every maskable interrupt for the duration of the operation.
#[derive(Default)]
pub struct InterruptFree;

impl Exclusive for InterruptFree {
    fn exclusive<R, F: FnOnce() -> R>(&mut self, operation: F) -> R {
        cortex_m::interrupt::free(|_| operation())
    }
}
