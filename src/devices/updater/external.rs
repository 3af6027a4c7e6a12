//! Externally driven updates.
//!
//! Some network stacks ship their own asynchronous OTA transfer. In that
//! case the updater only selects the slot, owns the session while the
//! transfer runs elsewhere, and commits or cleans up once it is told how
//! the transfer ended.
use super::*;
use crate::{
    devices::session::SessionToken,
    hal::flash::SECTOR_SIZE,
    log::debug,
};
use ufmt::{uWrite, uwrite};

/// An update in flight in an external driver. Holds the update session;
/// dropping it without finishing abandons the update and frees the session.
#[must_use = "dropping the handle abandons the update"]
pub struct ExternalUpdate<'a> {
    token: SessionToken<'a>,
    target: Target,
    image_prefix: &'static str,
    user_agent: &'static str,
}

impl<'a> ExternalUpdate<'a> {
    pub fn slot(&self) -> u8 { self.target.slot }

    /// Flash offset the driver must write the image to.
    pub fn address(&self) -> u32 { self.target.address }

    /// Sectors the driver must erase before writing, given the image length.
    pub fn sectors(&self, length: usize) -> core::ops::Range<usize> {
        crate::utilities::memory::sectors_spanned(self.target.address as usize, length, SECTOR_SIZE)
    }

    /// Path of the image to fetch, e.g. `/rom1.bin`.
    pub fn image_name<W: uWrite + ?Sized>(&self, out: &mut W) -> Result<(), W::Error> {
        uwrite!(out, "{}{}.bin", self.image_prefix, self.target.slot)
    }

    /// Request for the driver to send. Unlike the built in fetch this keeps
    /// the connection alive and names the host, as vendor drivers expect.
    pub fn request<W: uWrite + ?Sized>(&self, server: Peer, out: &mut W) -> Result<(), W::Error> {
        let [a, b, c, d] = server.address.octets();
        uwrite!(out, "GET ")?;
        self.image_name(out)?;
        uwrite!(out, " HTTP/1.1\r\nHost: {}.{}.{}.{}", a, b, c, d)?;
        if server.port != 80 {
            uwrite!(out, ":{}", server.port)?;
        }
        uwrite!(out, "\r\nConnection: keep-alive\r\nCache-Control: no-cache\r\n")?;
        uwrite!(out, "User-Agent: {}\r\nAccept: */*\r\n\r\n", self.user_agent)
    }
}

impl<'a, F, N, T, X, P> Updater<'a, F, N, T, X, P>
where
    F: BlockStorage,
    N: Client,
    T: Now,
    X: Exclusive,
    P: Platform,
{
    /// Claims the update session for an external driver and tells it which
    /// slot to fill.
    pub fn begin_external(&mut self) -> Result<ExternalUpdate<'a>, Error> {
        let session = self.session;
        let token = session.try_acquire().ok_or_else(|| {
            warn!("External update refused, another one is in progress");
            Error::AlreadyInProgress
        })?;
        let target = self.select_target().map_err(|e| {
            error!("External update not started: {:?}", e);
            e
        })?;
        debug!("External driver owns rom {}", target.slot);
        Ok(ExternalUpdate {
            token,
            target,
            image_prefix: self.config.image_prefix,
            user_agent: self.config.user_agent,
        })
    }

    /// Terminal callback of an external driver. Commits and restarts if the
    /// transfer succeeded, otherwise just ends the session.
    pub fn finish_external(
        &mut self,
        update: ExternalUpdate<'_>,
        succeeded: bool,
    ) -> Result<(), Error> {
        let ExternalUpdate { token, target, .. } = update;
        let result = if succeeded {
            boot_config::set_current_rom(&mut self.flash, &mut self.exclusive, target.slot)
        } else {
            Err(Error::ExternalUpdateFailed)
        };
        drop(token);

        match result {
            Ok(()) => {
                info!("External update complete, restarting");
                self.platform.restart();
                Ok(())
            }
            Err(e) => {
                error!("External update failed: {:?}", e);
                Err(e)
            }
        }
    }
}
