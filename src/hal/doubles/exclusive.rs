use crate::hal::exclusive::Exclusive;
use std::{cell::Cell, rc::Rc};

/// Stand-in for an interrupt-free section. Tracks whether a section is
/// currently open so a [`FakeFlash`](super::flash::FakeFlash) watching the
/// same flag can tell guarded device calls from unguarded ones.
#[derive(Default)]
pub struct MockExclusive {
    pub sections: usize,
    inside: Rc<Cell<bool>>,
}

impl MockExclusive {
    pub fn flag(&self) -> Rc<Cell<bool>> { self.inside.clone() }
}

impl Exclusive for MockExclusive {
    fn exclusive<R, F: FnOnce() -> R>(&mut self, operation: F) -> R {
        assert!(!self.inside.get(), "Exclusive sections must not nest");
        self.inside.set(true);
        let result = operation();
        self.inside.set(false);
        self.sections += 1;
        result
    }
}
