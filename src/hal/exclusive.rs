//! Exclusive device access.
//!
//! Some flash controllers share their bus with instruction fetch, so
//! nothing asynchronous may run while they program or erase. The
//! exclusion window must stay as short as a single device call: radio
//! and watchdog services starve otherwise.

pub trait Exclusive {
    /// Runs `operation` with asynchronous interrupts held off.
    fn exclusive<R, F: FnOnce() -> R>(&mut self, operation: F) -> R;
}
