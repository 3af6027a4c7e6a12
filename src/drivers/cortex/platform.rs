use crate::hal::platform::Platform;
use cortex_m::peripheral::SCB;

/// Cortex-M platform. Restarts through the system control block; yields
/// run a firmware supplied hook, typically a watchdog feed and radio poll.
pub struct CortexM<Y: FnMut()> {
    on_yield: Y,
}

impl<Y: FnMut()> CortexM<Y> {
    pub fn new(on_yield: Y) -> Self { Self { on_yield } }
}

impl<Y: FnMut()> Platform for CortexM<Y> {
    fn yield_now(&mut self) { (self.on_yield)() }

    fn restart(&mut self) { SCB::sys_reset() }
}
