//! Update orchestrator.
//!
//! Selects the slot that isn't running, streams a new image into it and,
//! once every byte has landed, points the boot configuration at it and
//! restarts. Any failure leaves the boot configuration untouched, so the
//! device keeps running its current image.
//!
//! Two drivers share the slot selection and commit logic: the built in
//! synchronous fetch ([`Updater::run_update`]) and an externally driven
//! transfer that only reports back once it is done (see [`external`]).
use super::{
    boot_config::{self, BootConfig},
    fetch::{Fetch, Target},
    session::InProgress,
};
use crate::{
    config::Config,
    error::Error,
    hal::{
        exclusive::Exclusive,
        flash::BlockStorage,
        network::{Client, Peer},
        platform::Platform,
        time::Now,
    },
    log::{error, info, warn},
    utilities::{buffer::Buffer, guard::Guard},
};

pub mod external;

pub struct Updater<'a, F, N, T, X, P>
where
    F: BlockStorage,
    N: Client,
    T: Now,
    X: Exclusive,
    P: Platform,
{
    pub(crate) flash: F,
    pub(crate) client: N,
    pub(crate) clock: T,
    pub(crate) exclusive: X,
    pub(crate) platform: P,
    pub(crate) config: Config,
    pub(crate) session: &'a InProgress,
}

impl<'a, F, N, T, X, P> Updater<'a, F, N, T, X, P>
where
    F: BlockStorage,
    N: Client,
    T: Now,
    X: Exclusive,
    P: Platform,
{
    /// Updater with default settings. `session` is shared by every updater
    /// that may target the same slots, normally
    /// [`UPDATE_IN_PROGRESS`](super::session::UPDATE_IN_PROGRESS).
    pub fn new(
        flash: F,
        client: N,
        clock: T,
        exclusive: X,
        platform: P,
        session: &'a InProgress,
    ) -> Self {
        Self { flash, client, clock, exclusive, platform, config: Config::default(), session }
    }

    pub fn with_config(self, config: Config) -> Self { Self { config, ..self } }

    pub fn config(&self) -> &Config { &self.config }

    /// Sets the server used by [`update`](Self::update).
    pub fn set_update_server(&mut self, server: Peer) { self.config.server = Some(server); }

    /// Runs an update against the configured server and image prefix.
    pub fn update(&mut self) -> Result<(), Error> {
        let server = self.config.server.ok_or(Error::ConfigurationError("No update server set"))?;
        let prefix = self.config.image_prefix;
        self.run_update(server, prefix)
    }

    /// Fetches `<image_prefix><slot>.bin` from `peer` into the inactive
    /// slot and switches to it.
    ///
    /// On success a restart is requested, which on real hardware does not
    /// return. On failure the running slot stays selected and the error is
    /// handed back after being logged.
    pub fn run_update(&mut self, peer: Peer, image_prefix: &str) -> Result<(), Error> {
        let session = self.session;
        let token = session.try_acquire().ok_or_else(|| {
            warn!("Update refused, another one is in progress");
            Error::AlreadyInProgress
        })?;

        let result = self.fetch_into_inactive_slot(peer, image_prefix).and_then(|target| {
            boot_config::set_current_rom(&mut self.flash, &mut self.exclusive, target.slot)
        });
        drop(token);

        match result {
            Ok(()) => {
                info!("Update complete, restarting");
                self.platform.restart();
                Ok(())
            }
            Err(e) => {
                error!("Update failed: {:?}", e);
                Err(e)
            }
        }
    }

    /// Reads and checks the boot configuration, returning the slot an
    /// update has to be written into.
    fn select_target(&mut self) -> Result<Target, Error> {
        let config = BootConfig::read(&mut self.flash)?;
        config.log_summary();
        config.validate()?;
        let slot = config.upgrade_slot();
        let address = config.slot_address(slot)?;
        info!("Running rom {}, upgrading rom {} at {:#x}", config.current_rom, slot, address);
        Ok(Target { slot, address })
    }

    fn fetch_into_inactive_slot(
        &mut self,
        peer: Peer,
        image_prefix: &str,
    ) -> Result<Target, Error> {
        let target = self.select_target()?;
        let mut client = Guard::new(
            &mut self.client,
            |_: &mut N| (),
            |client: &mut N| {
                if client.is_connected() {
                    client.close();
                }
            },
        );
        Fetch {
            client: &mut *client,
            flash: &mut self.flash,
            exclusive: &mut self.exclusive,
            clock: &self.clock,
            platform: &mut self.platform,
            config: &self.config,
            peer,
            image_prefix,
            target,
            buffer: Buffer::new(),
        }
        .run()?;
        Ok(target)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::{
        doubles::{
            exclusive::MockExclusive,
            flash::FakeFlash,
            network::{image, response_headers, Event, FakePeer},
            platform::MockPlatform,
            time::MockSysTick,
        },
        flash::SECTOR_SIZE,
    };
    use crate::config::BOOT_CONFIG_SECTOR;
    use core::net::Ipv4Addr;
    use std::cell::RefCell;

    pub(super) const SLOTS: [u32; 2] = [0x2000, 0x82000];
    pub(super) const SERVER: Peer = Peer::new(Ipv4Addr::new(192, 168, 1, 10), 80);
    pub(super) const CONFIG_OFFSET: u32 = BOOT_CONFIG_SECTOR * SECTOR_SIZE as u32;

    pub(super) type TestUpdater<'a, 'p> =
        Updater<'a, FakeFlash, FakePeer, MockSysTick, MockExclusive, MockPlatform<'p>>;

    pub(super) fn provisioned_flash(current_rom: u8) -> FakeFlash {
        let mut flash = FakeFlash::new(0x100000);
        flash.preload(CONFIG_OFFSET, &BootConfig::new(&SLOTS, current_rom).to_bytes());
        flash
    }

    pub(super) fn updater<'a, 'p>(
        flash: FakeFlash,
        client: FakePeer,
        platform: MockPlatform<'p>,
        session: &'a InProgress,
    ) -> TestUpdater<'a, 'p> {
        let exclusive = MockExclusive::default();
        let mut flash = flash;
        flash.watch(exclusive.flag());
        Updater::new(flash, client, MockSysTick::default(), exclusive, platform, session)
    }

    fn config_writes(updater: &TestUpdater) -> usize {
        updater.flash.writes.iter().filter(|w| w.offset == CONFIG_OFFSET).count()
    }

    #[test]
    fn successful_update_switches_slot_and_restarts() {
        // Given
        let session = InProgress::new();
        let body = image(1024);
        let mut updater = updater(
            provisioned_flash(0),
            FakePeer::serving(&body),
            MockPlatform::default(),
            &session,
        );

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Ok(()));
        let target = SLOTS[1];
        assert_eq!(
            updater.flash.erased_sectors,
            vec![target / SECTOR_SIZE as u32, BOOT_CONFIG_SECTOR]
        );
        let image_bytes: usize =
            updater.flash.writes.iter().filter(|w| w.offset >= target).map(|w| w.length).sum();
        assert_eq!(image_bytes, 1024);
        assert_eq!(updater.flash.contents(target, 1024), &body[..]);
        assert_eq!(boot_config::current_rom(&mut updater.flash), Ok(1));
        assert_eq!(updater.platform.restarts, 1);
        assert_eq!(updater.flash.unguarded_operations, 0);
        assert!(updater.client.request().starts_with("GET /rom1.bin HTTP/1.0\r\n"));
        assert_eq!(updater.client.connects, vec![SERVER]);
        assert!(!session.is_active());
    }

    #[test]
    fn update_from_second_slot_targets_first() {
        // Given
        let session = InProgress::new();
        let mut updater = updater(
            provisioned_flash(1),
            FakePeer::serving(&image(2048)),
            MockPlatform::default(),
            &session,
        );

        // When
        updater.run_update(SERVER, "/firmware/app").unwrap();

        // Then
        assert!(updater.client.request().starts_with("GET /firmware/app0.bin "));
        assert_eq!(updater.flash.erased_sectors[0], SLOTS[0] / SECTOR_SIZE as u32);
        assert_eq!(boot_config::current_rom(&mut updater.flash), Ok(0));
    }

    #[test]
    fn connection_lost_mid_body_leaves_configuration_untouched() {
        // Given
        let session = InProgress::new();
        let body = image(1024);
        let peer = FakePeer::scripted([
            Event::Data(response_headers(body.len())),
            Event::Data(body[..512].to_vec()),
            Event::Disconnect,
        ]);
        let mut updater = updater(provisioned_flash(0), peer, MockPlatform::default(), &session);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::ConnectionLost));
        assert_eq!(config_writes(&updater), 0);
        assert!(!updater.flash.erased_sectors.contains(&BOOT_CONFIG_SECTOR));
        assert_eq!(boot_config::current_rom(&mut updater.flash), Ok(0));
        assert_eq!(updater.platform.restarts, 0);
        assert!(!session.is_active());
    }

    #[test]
    fn connection_is_closed_on_failure() {
        // Given
        let session = InProgress::new();
        let mut response = response_headers(1024);
        response.extend_from_slice(&image(100));
        let peer = FakePeer::scripted([Event::Data(response)]);
        let mut updater = updater(provisioned_flash(0), peer, MockPlatform::default(), &session);
        updater.config.body_timeout = crate::hal::time::Milliseconds(50);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::BodyTimeout));
        assert_eq!(updater.client.closes, 1);
        assert!(!updater.client.is_open());
    }

    #[test]
    fn concurrent_attempt_is_refused_without_side_effects() {
        // Given
        let session = InProgress::new();
        let nested = RefCell::new(None);
        let platform = MockPlatform::with_yield_hook(|| {
            if nested.borrow().is_some() {
                return;
            }
            let mut second = updater(
                provisioned_flash(0),
                FakePeer::serving(&image(1024)),
                MockPlatform::default(),
                &session,
            );
            let result = second.run_update(SERVER, "/rom");
            let touched =
                second.client.connects.len() + second.flash.mutations() + second.flash.reads;
            *nested.borrow_mut() = Some((result, touched));
        });
        let mut first =
            updater(provisioned_flash(0), FakePeer::serving(&image(1024)), platform, &session);

        // When
        let result = first.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Ok(()));
        drop(first);
        assert_eq!(nested.into_inner(), Some((Err(Error::AlreadyInProgress), 0)));
        assert!(!session.is_active());
    }

    #[test]
    fn invalid_declared_length_never_erases() {
        // Given
        let session = InProgress::new();
        let peer = FakePeer::scripted([Event::Data(response_headers(1022))]);
        let mut updater = updater(provisioned_flash(0), peer, MockPlatform::default(), &session);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::InvalidLength));
        assert_eq!(updater.flash.mutations(), 0);
    }

    #[test]
    fn unaligned_target_slot_is_reported_as_corruption() {
        // Given
        let session = InProgress::new();
        let mut flash = FakeFlash::new(0x100000);
        flash.preload(CONFIG_OFFSET, &BootConfig::new(&[0x2000, 0x82010], 0).to_bytes());
        let mut updater =
            updater(flash, FakePeer::serving(&image(1024)), MockPlatform::default(), &session);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::BadSlotAddress));
        assert!(result.unwrap_err().is_corruption());
        assert!(updater.client.connects.is_empty());
        assert_eq!(updater.flash.mutations(), 0);
    }

    #[test]
    fn single_slot_configuration_has_no_upgrade_target() {
        let session = InProgress::new();
        let mut flash = FakeFlash::new(0x100000);
        flash.preload(CONFIG_OFFSET, &BootConfig::new(&[0x2000], 0).to_bytes());
        let mut updater =
            updater(flash, FakePeer::serving(&image(1024)), MockPlatform::default(), &session);
        assert_eq!(updater.run_update(SERVER, "/rom"), Err(Error::BadSlotAddress));
    }

    #[test]
    fn unprovisioned_configuration_is_rejected_before_connecting() {
        let session = InProgress::new();
        let flash = FakeFlash::new(0x100000);
        let mut updater =
            updater(flash, FakePeer::serving(&image(1024)), MockPlatform::default(), &session);
        assert_eq!(updater.run_update(SERVER, "/rom"), Err(Error::BadBootConfig));
        assert!(updater.client.connects.is_empty());
    }

    #[test]
    fn retry_after_failure_matches_single_success() {
        // Given
        let body = image(4096);
        let session = InProgress::new();
        let mut single = updater(
            provisioned_flash(0),
            FakePeer::serving(&body),
            MockPlatform::default(),
            &session,
        );
        single.run_update(SERVER, "/rom").unwrap();

        let broken = FakePeer::scripted([
            Event::Data(response_headers(body.len())),
            Event::Data(body[..1000].to_vec()),
            Event::Disconnect,
        ]);
        let mut retried = updater(provisioned_flash(0), broken, MockPlatform::default(), &session);

        // When
        assert_eq!(retried.run_update(SERVER, "/rom"), Err(Error::ConnectionLost));
        retried.client = FakePeer::serving(&body);
        retried.run_update(SERVER, "/rom").unwrap();

        // Then
        assert_eq!(
            BootConfig::read(&mut retried.flash),
            BootConfig::read(&mut single.flash)
        );
        assert_eq!(retried.flash.contents(SLOTS[1], body.len()), &body[..]);
    }

    #[test]
    fn update_requires_a_server() {
        // Given
        let session = InProgress::new();
        let mut updater = updater(
            provisioned_flash(0),
            FakePeer::serving(&image(512)),
            MockPlatform::default(),
            &session,
        );

        // Then
        assert!(matches!(updater.update(), Err(Error::ConfigurationError(_))));
        assert!(updater.client.connects.is_empty());

        // When
        updater.set_update_server(SERVER);

        // Then
        assert_eq!(updater.update(), Ok(()));
        assert_eq!(updater.client.connects, vec![SERVER]);
    }

    #[test]
    fn failed_commit_is_surfaced_and_skips_restart() {
        // Given
        let session = InProgress::new();
        let mut flash = provisioned_flash(0);
        flash.locked_sectors.push(BOOT_CONFIG_SECTOR);
        let body = image(512);
        let mut updater =
            updater(flash, FakePeer::serving(&body), MockPlatform::default(), &session);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::ConfigWriteError));
        assert!(result.unwrap_err().is_corruption());
        assert_eq!(updater.flash.contents(SLOTS[1], body.len()), &body[..]);
        assert_eq!(updater.platform.restarts, 0);
        assert!(!session.is_active());
    }

    #[test]
    fn erase_failure_leaves_configuration_untouched() {
        // Given
        let session = InProgress::new();
        let mut flash = provisioned_flash(0);
        flash.locked_sectors.push(SLOTS[1] / SECTOR_SIZE as u32);
        let mut updater =
            updater(flash, FakePeer::serving(&image(1024)), MockPlatform::default(), &session);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::EraseError));
        assert!(updater.flash.writes.is_empty());
        assert!(!updater.flash.erased_sectors.contains(&BOOT_CONFIG_SECTOR));
        assert_eq!(boot_config::current_rom(&mut updater.flash), Ok(0));
        assert_eq!(updater.platform.restarts, 0);
        assert_eq!(updater.client.closes, 1);
        assert!(!session.is_active());
    }

    #[test]
    fn truncated_request_fails_before_touching_flash() {
        // Given
        let session = InProgress::new();
        let mut peer = FakePeer::serving(&image(1024));
        peer.short_writes = true;
        let mut updater = updater(provisioned_flash(0), peer, MockPlatform::default(), &session);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::ConnectionLost));
        assert_eq!(updater.flash.mutations(), 0);
        assert_eq!(updater.client.closes, 1);
        assert!(!updater.client.is_open());
        assert_eq!(updater.platform.restarts, 0);
        assert!(!session.is_active());
    }

    #[test]
    fn unreadable_configuration_is_reported_before_connecting() {
        // Given
        let session = InProgress::new();
        let flash = FakeFlash::new(SECTOR_SIZE);
        let mut updater = updater(flash, FakePeer::default(), MockPlatform::default(), &session);

        // When
        let result = updater.run_update(SERVER, "/rom");

        // Then
        assert_eq!(result, Err(Error::ConfigReadError));
        assert!(result.unwrap_err().is_corruption());
        assert!(updater.client.connects.is_empty());
        assert!(!session.is_active());
    }
}
