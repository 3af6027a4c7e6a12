use crate::hal::platform::Platform;

/// Counts scheduler yields and restart requests. An optional hook runs on
/// every yield, standing in for whatever else the main loop would do
/// while an update waits on the network.
#[derive(Default)]
pub struct MockPlatform<'a> {
    pub yields: usize,
    pub restarts: usize,
    on_yield: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a> MockPlatform<'a> {
    pub fn with_yield_hook<H: FnMut() + 'a>(hook: H) -> Self {
        Self { yields: 0, restarts: 0, on_yield: Some(Box::new(hook)) }
    }
}

impl<'a> Platform for MockPlatform<'a> {
    fn yield_now(&mut self) {
        self.yields += 1;
        if let Some(hook) = self.on_yield.as_mut() {
            hook();
        }
    }

    fn restart(&mut self) { self.restarts += 1; }
}
