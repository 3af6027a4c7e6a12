//! Error type for the update engine as a whole.
//!
//! Every failure is local to a single update attempt: it is logged, the
//! attempt's resources are released and the currently active slot keeps
//! running. A handful of variants additionally signal that the persisted
//! boot configuration itself can't be trusted (see [`Error::is_corruption`]).

use core::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The network peer could not be reached.
    ConnectError,
    /// The request did not fit in the transfer buffer.
    RequestTooLarge,
    /// The response header block did not fit in the transfer buffer.
    HeaderOverflow,
    /// The response header block did not arrive in time.
    HeaderTimeout,
    /// The response did not declare a `Content-Length`.
    MissingLength,
    /// The declared `Content-Length` is out of bounds or misaligned.
    InvalidLength,
    /// Erasing the target slot failed.
    EraseError,
    /// The peer went away, or delivered less than it advertised.
    ConnectionLost,
    /// The body did not arrive in time.
    BodyTimeout,
    /// Programming the target slot failed.
    FlashWriteError,
    /// An address or length handed to the flash writer breaks word alignment.
    MisalignedAccess,
    /// The slot selected for the update has an unusable address.
    BadSlotAddress,
    /// Another update attempt currently owns the session.
    AlreadyInProgress,
    /// The boot configuration sector could not be read.
    ConfigReadError,
    /// The boot configuration sector could not be rewritten.
    ConfigWriteError,
    /// The boot configuration record failed validation.
    BadBootConfig,
    /// Attempted to select a slot beyond the configured count.
    InvalidSlot,
    /// The vendor-driven update reported failure.
    ExternalUpdateFailed,
    /// Error caused by a faulty configuration
    ConfigurationError(&'static str),
}

impl Error {
    /// Whether this error implies the persisted boot configuration is unreliable.
    /// These must be surfaced as such rather than quietly retried.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::BadSlotAddress
                | Error::ConfigReadError
                | Error::ConfigWriteError
                | Error::BadBootConfig
        )
    }

    fn describe(&self) -> &'static str {
        match self {
            Error::ConnectError => "[Network Error] -> Could not connect to update server",
            Error::RequestTooLarge => "[Logic Error] -> Request does not fit in transfer buffer",
            Error::HeaderOverflow => "[Network Error] -> Response headers overflow buffer",
            Error::HeaderTimeout => "[Network Error] -> Timed out reading response headers",
            Error::MissingLength => "[Network Error] -> Response has no Content-Length",
            Error::InvalidLength => "[Network Error] -> Content-Length out of bounds",
            Error::EraseError => "[Device Error] -> Failed to erase target slot",
            Error::ConnectionLost => "[Network Error] -> Connection lost mid transfer",
            Error::BodyTimeout => "[Network Error] -> Timed out receiving image",
            Error::FlashWriteError => "[Device Error] -> Failed to program target slot",
            Error::MisalignedAccess => "[Device Error] -> Misaligned flash access",
            Error::BadSlotAddress => "[Corruption] -> Target slot address is invalid",
            Error::AlreadyInProgress => "[Logic Error] -> An update is already in progress",
            Error::ConfigReadError => "[Corruption] -> Boot configuration unreadable",
            Error::ConfigWriteError => "[Corruption] -> Boot configuration write failed",
            Error::BadBootConfig => "[Corruption] -> Boot configuration is invalid",
            Error::InvalidSlot => "[Logic Error] -> Slot index beyond configured count",
            Error::ExternalUpdateFailed => "[Network Error] -> External update driver failed",
            Error::ConfigurationError(text) => *text,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.describe()) }
}
