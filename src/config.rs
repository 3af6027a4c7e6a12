//! Update engine settings.
//!
//! Layout constants are fixed at compile time, as they must agree with
//! the boot stage. Network behaviour is tunable per device through
//! [`Config`].
use crate::hal::{
    network::Peer,
    time::{Milliseconds, Seconds},
};

/// Sector holding the boot configuration record.
pub const BOOT_CONFIG_SECTOR: u32 = 1;
/// Transfer buffer shared by the request, header block and body chunks.
pub const TRANSFER_BUFFER_SIZE: usize = 1536;
/// Smallest image accepted; anything shorter is assumed to be an error page.
pub const MIN_IMAGE_SIZE: usize = 250;
/// Exclusive upper bound on image size, the usable span of a slot.
pub const MAX_IMAGE_SIZE: usize = 0x79000;

pub const DEFAULT_IMAGE_PREFIX: &str = "/rom";
pub const DEFAULT_USER_AGENT: &str = "swapboot/0.1";
pub const DEFAULT_HEADER_TIMEOUT: Seconds = Seconds(3);
pub const DEFAULT_BODY_TIMEOUT: Seconds = Seconds(60);

#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Update server used by [`Updater::update`](crate::devices::updater::Updater::update).
    pub server: Option<Peer>,
    /// Image path minus the slot number and `.bin` suffix.
    pub image_prefix: &'static str,
    pub user_agent: &'static str,
    /// Budget for the whole response header block, from request sent.
    pub header_timeout: Milliseconds,
    /// Budget for the whole body, from erase complete.
    pub body_timeout: Milliseconds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            image_prefix: DEFAULT_IMAGE_PREFIX,
            user_agent: DEFAULT_USER_AGENT,
            header_timeout: DEFAULT_HEADER_TIMEOUT.into(),
            body_timeout: DEFAULT_BODY_TIMEOUT.into(),
        }
    }
}
