#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FakeError {
    /// Failure requested by the test [TESTING ONLY]
    Injected,
    OutOfBounds,
    MisalignedAccess,
    /// Programming would need to set bits that are currently clear.
    NotErased,
    Disconnected,
    Refused,
}
