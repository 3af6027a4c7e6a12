//! Services of the surrounding firmware that an update attempt relies on.

pub trait Platform {
    /// Hands control to the cooperative scheduler so radio maintenance,
    /// watchdog feeding and similar duties keep running during long waits.
    fn yield_now(&mut self);

    /// Restarts the device. On hardware this never returns.
    fn restart(&mut self);
}
