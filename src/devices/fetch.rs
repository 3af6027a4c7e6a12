//! Firmware fetch state machine.
//!
//! Streams one image from an HTTP server into an already selected flash
//! slot. Every state hands back the next state or the reason the attempt
//! failed; there is no retry and no resumption. Whatever the outcome, the
//! caller owns cleanup of the connection it lent to the fetch.
use crate::{
    config::{Config, MAX_IMAGE_SIZE, MIN_IMAGE_SIZE, TRANSFER_BUFFER_SIZE},
    devices::flash_writer::{erase_region, FlashWriter},
    error::Error,
    hal::{
        exclusive::Exclusive,
        flash::{BlockStorage, WORD_SIZE},
        network::{Client, Peer},
        platform::Platform,
        time::{Deadline, Now},
    },
    log::{debug, info, trace, warn},
    utilities::{buffer::Buffer, memory::is_aligned},
};
use ufmt::{uWrite, uwrite};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &[u8] = b"content-length:";

/// Slot an image is being written to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Target {
    pub slot: u8,
    pub address: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Connecting,
    SendingRequest,
    ReadingHeaders,
    ParsingContentLength,
    Erasing { length: usize },
    ReceivingBody { length: usize },
    Complete { length: usize },
}

/// Formats the image request.
pub fn write_request<W: uWrite + ?Sized>(
    out: &mut W,
    image_prefix: &str,
    slot: u8,
    user_agent: &str,
) -> Result<(), W::Error> {
    uwrite!(out, "GET {}{}.bin HTTP/1.0\r\n", image_prefix, slot)?;
    uwrite!(out, "Connection: close\r\nCache-Control: no-cache\r\n")?;
    uwrite!(out, "User-Agent: {}\r\nAccept: */*\r\n\r\n", user_agent)
}

/// Extracts and bounds checks the declared body length from a header block.
/// Field names are matched case insensitively.
pub fn parse_content_length(headers: &[u8]) -> Result<usize, Error> {
    let value = headers
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .find(|line| {
            line.len() >= CONTENT_LENGTH.len()
                && line[..CONTENT_LENGTH.len()].eq_ignore_ascii_case(CONTENT_LENGTH)
        })
        .map(|line| &line[CONTENT_LENGTH.len()..])
        .ok_or(Error::MissingLength)?;

    let start = value.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(value.len());
    let digits = &value[start..];
    let digits = &digits[..digits.iter().position(|b| !b.is_ascii_digit()).unwrap_or(digits.len())];
    if digits.is_empty() {
        return Err(Error::InvalidLength);
    }
    let length = digits
        .iter()
        .try_fold(0usize, |acc, d| acc.checked_mul(10)?.checked_add((d - b'0') as usize))
        .ok_or(Error::InvalidLength)?;

    if (MIN_IMAGE_SIZE..MAX_IMAGE_SIZE).contains(&length) && is_aligned(length, WORD_SIZE) {
        Ok(length)
    } else {
        Err(Error::InvalidLength)
    }
}

/// One fetch attempt. Borrows every capability it drives for its lifetime.
pub struct Fetch<'a, N, F, X, T, P>
where
    N: Client,
    F: BlockStorage,
    X: Exclusive,
    T: Now,
    P: Platform,
{
    pub client: &'a mut N,
    pub flash: &'a mut F,
    pub exclusive: &'a mut X,
    pub clock: &'a T,
    pub platform: &'a mut P,
    pub config: &'a Config,
    pub peer: Peer,
    pub image_prefix: &'a str,
    pub target: Target,
    pub buffer: Buffer<TRANSFER_BUFFER_SIZE>,
}

impl<'a, N, F, X, T, P> Fetch<'a, N, F, X, T, P>
where
    N: Client,
    F: BlockStorage,
    X: Exclusive,
    T: Now,
    P: Platform,
{
    /// Drives the machine to completion, returning the image length.
    pub fn run(mut self) -> Result<usize, Error> {
        let mut state = State::Connecting;
        loop {
            trace!("Fetch state: {:?}", state);
            state = match state {
                State::Complete { length } => return Ok(length),
                state => self.step(state)?,
            };
        }
    }

    /// Performs the work of a single state.
    pub fn step(&mut self, state: State) -> Result<State, Error> {
        match state {
            State::Connecting => self.connect(),
            State::SendingRequest => self.send_request(),
            State::ReadingHeaders => self.read_headers(),
            State::ParsingContentLength => {
                let length = parse_content_length(self.buffer.as_slice())?;
                info!("Server declares a {} byte image", length);
                Ok(State::Erasing { length })
            }
            State::Erasing { length } => {
                debug!("Erasing {} bytes at {:#x}", length, self.target.address);
                erase_region(&mut *self.flash, &mut *self.exclusive, self.target.address, length)?;
                Ok(State::ReceivingBody { length })
            }
            State::ReceivingBody { length } => self.receive_body(length),
            State::Complete { length } => Ok(State::Complete { length }),
        }
    }

    fn connect(&mut self) -> Result<State, Error> {
        let [a, b, c, d] = self.peer.address.octets();
        info!("Connecting to {}.{}.{}.{}:{}", a, b, c, d, self.peer.port);
        self.client.connect(self.peer).map_err(|_| Error::ConnectError)?;
        Ok(State::SendingRequest)
    }

    fn send_request(&mut self) -> Result<State, Error> {
        self.buffer.clear();
        write_request(&mut self.buffer, self.image_prefix, self.target.slot, self.config.user_agent)
            .map_err(|_| Error::RequestTooLarge)?;
        let request = self.buffer.as_slice();
        match self.client.write(request) {
            Ok(sent) if sent == request.len() => {
                debug!("Requested {}{}.bin", self.image_prefix, self.target.slot);
                Ok(State::ReadingHeaders)
            }
            _ => Err(Error::ConnectionLost),
        }
    }

    /// Reads byte by byte until the blank line closing the header block,
    /// never past the transfer buffer's capacity.
    fn read_headers(&mut self) -> Result<State, Error> {
        self.buffer.clear();
        let deadline = Deadline::new(self.clock.now(), self.config.header_timeout);
        while !self.buffer.ends_with(HEADER_TERMINATOR) {
            if deadline.has_expired(self.clock.now()) {
                return Err(Error::HeaderTimeout);
            }
            if self.buffer.is_full() {
                return Err(Error::HeaderOverflow);
            }
            match self.client.read() {
                Ok(byte) => self.buffer.push(byte).map_err(|_| Error::HeaderOverflow)?,
                Err(nb::Error::WouldBlock) => self.platform.yield_now(),
                Err(nb::Error::Other(_)) => return Err(Error::ConnectionLost),
            }
        }
        trace!("Received {} header bytes", self.buffer.len());
        Ok(State::ParsingContentLength)
    }

    /// Pipes the body into the target slot. The transfer buffer holds at
    /// most a word's worth of unwritten bytes between reads.
    fn receive_body(&mut self, length: usize) -> Result<State, Error> {
        let Self { client, flash, exclusive, clock, platform, config, target, buffer, .. } = self;
        buffer.clear();
        let mut writer = FlashWriter::new(&mut **flash, &mut **exclusive, target.address, length)?;
        let deadline = Deadline::new(clock.now(), config.body_timeout);
        let mut remaining = length;

        while remaining > 0 {
            if !client.is_connected() {
                return Err(Error::ConnectionLost);
            }
            if deadline.has_expired(clock.now()) {
                return Err(Error::BodyTimeout);
            }
            let available = client.available();
            if available == 0 {
                platform.yield_now();
                continue;
            }

            let expected = remaining - buffer.len();
            if available > expected {
                warn!("Peer has {} bytes ready, only {} still expected", available, expected);
            }
            let wanted = available.min(expected).min(buffer.spare_mut().len());
            let read = client
                .read_bytes(&mut buffer.spare_mut()[..wanted])
                .map_err(|_| Error::ConnectionLost)?;
            if read != wanted {
                return Err(Error::ConnectionLost);
            }
            buffer.advance(read).map_err(|_| Error::ConnectionLost)?;

            let pending = buffer.len();
            let leftover = writer.write(buffer.filled_mut())?;
            buffer.truncate(leftover);
            remaining -= pending - leftover;
            trace!("{} bytes left", remaining);
        }
        Ok(State::Complete { length })
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
        time::Milliseconds,
    };
    use core::net::Ipv4Addr;

    const SLOT_ADDRESS: u32 = 4 * SECTOR_SIZE as u32;
    const PEER: Peer = Peer::new(Ipv4Addr::new(10, 0, 0, 2), 80);

    struct Rig {
        client: FakePeer,
        flash: FakeFlash,
        exclusive: MockExclusive,
        clock: MockSysTick,
        platform: MockPlatform<'static>,
        config: Config,
    }

    impl Rig {
        fn new(client: FakePeer) -> Self {
            let exclusive = MockExclusive::default();
            let mut flash = FakeFlash::new(0x100000);
            flash.watch(exclusive.flag());
            Self {
                client,
                flash,
                exclusive,
                clock: MockSysTick::default(),
                platform: MockPlatform::default(),
                config: Config::default(),
            }
        }

        fn fetch(
            &mut self,
        ) -> Fetch<'_, FakePeer, FakeFlash, MockExclusive, MockSysTick, MockPlatform<'static>> {
            Fetch {
                client: &mut self.client,
                flash: &mut self.flash,
                exclusive: &mut self.exclusive,
                clock: &self.clock,
                platform: &mut self.platform,
                config: &self.config,
                peer: PEER,
                image_prefix: "/rom",
                target: Target { slot: 1, address: SLOT_ADDRESS },
                buffer: Buffer::new(),
            }
        }

        fn run(&mut self) -> Result<usize, Error> { self.fetch().run() }
    }

    #[test]
    fn request_is_minimal_http_1_0_get() {
        let mut buffer = Buffer::<TRANSFER_BUFFER_SIZE>::new();
        write_request(&mut buffer, "/rom", 0, "agent/1").unwrap();
        assert_eq!(
            buffer.as_slice(),
            &b"GET /rom0.bin HTTP/1.0\r\nConnection: close\r\nCache-Control: no-cache\r\n\
               User-Agent: agent/1\r\nAccept: */*\r\n\r\n"[..]
        );
    }

    #[test]
    fn oversized_request_is_refused_before_sending() {
        // Given
        let mut rig = Rig::new(FakePeer::serving(&image(256)));
        let prefix = "/".repeat(TRANSFER_BUFFER_SIZE);
        let mut fetch = rig.fetch();
        fetch.image_prefix = &prefix;

        // When
        let result = fetch.run();

        // Then
        assert_eq!(result, Err(Error::RequestTooLarge));
        assert!(rig.client.sent.is_empty());
    }

    #[test]
    fn content_length_parsing() {
        let headers = |field: &str| format!("HTTP/1.0 200 OK\r\n{}\r\nServer: x\r\n\r\n", field);
        let parse = |field: &str| parse_content_length(headers(field).as_bytes());

        assert_eq!(parse("Content-Length: 1024"), Ok(1024));
        assert_eq!(parse("content-length:1024"), Ok(1024));
        assert_eq!(parse("CONTENT-LENGTH: \t 252"), Ok(252));
        assert_eq!(parse("Content-Length: 1024; junk"), Ok(1024));
        assert_eq!(parse("Content-Type: application/octet-stream"), Err(Error::MissingLength));
        assert_eq!(parse("Content-Length: "), Err(Error::InvalidLength));
        assert_eq!(parse("Content-Length: 99999999999999999999999"), Err(Error::InvalidLength));
    }

    #[test]
    fn content_length_bounds() {
        let parse = |length: usize| parse_content_length(&response_headers(length));

        assert_eq!(parse(MIN_IMAGE_SIZE - 2), Err(Error::InvalidLength));
        assert_eq!(parse(252), Ok(252));
        assert_eq!(parse(250), Err(Error::InvalidLength)); // not word aligned
        assert_eq!(parse(1026), Err(Error::InvalidLength));
        assert_eq!(parse(MAX_IMAGE_SIZE - WORD_SIZE), Ok(MAX_IMAGE_SIZE - WORD_SIZE));
        assert_eq!(parse(MAX_IMAGE_SIZE), Err(Error::InvalidLength));
    }

    #[test]
    fn header_block_ends_exactly_at_blank_line() {
        // Given
        let mut response = response_headers(1024);
        response.extend_from_slice(b"BODY");
        let mut rig = Rig::new(FakePeer::scripted([Event::Data(response)]));
        let mut fetch = rig.fetch();

        // When
        fetch.step(State::Connecting).unwrap();
        fetch.step(State::SendingRequest).unwrap();
        let next = fetch.step(State::ReadingHeaders);

        // Then
        assert_eq!(next, Ok(State::ParsingContentLength));
        assert!(fetch.buffer.ends_with(HEADER_TERMINATOR));
        assert_eq!(fetch.buffer.len(), response_headers(1024).len());
        assert_eq!(fetch.client.available(), 4);
    }

    #[test]
    fn headers_larger_than_the_buffer_overflow() {
        // Given
        let endless = vec![b'X'; TRANSFER_BUFFER_SIZE + 10];
        let mut rig = Rig::new(FakePeer::scripted([Event::Data(endless)]));

        // When
        let result = rig.run();

        // Then
        assert_eq!(result, Err(Error::HeaderOverflow));
        assert_eq!(rig.client.available(), 10);
        assert!(rig.flash.erased_sectors.is_empty());
    }

    #[test]
    fn silent_server_times_out_during_headers() {
        // Given
        let mut rig = Rig::new(FakePeer::scripted([Event::Data(b"HTTP/1.0 200 OK\r\n".to_vec())]));
        rig.config.header_timeout = Milliseconds(100);

        // When
        let result = rig.run();

        // Then
        assert_eq!(result, Err(Error::HeaderTimeout));
        assert!(rig.platform.yields > 0);
        assert!(rig.clock.peek() <= Milliseconds(120));
    }

    #[test]
    fn invalid_length_never_erases() {
        let mut rig = Rig::new(FakePeer::scripted([Event::Data(response_headers(100))]));
        assert_eq!(rig.run(), Err(Error::InvalidLength));
        assert_eq!(rig.flash.mutations(), 0);
    }

    #[test]
    fn refused_connection_fails_immediately() {
        let mut rig = Rig::new(FakePeer::default());
        rig.client.refuse_connection = true;
        assert_eq!(rig.run(), Err(Error::ConnectError));
        assert_eq!(rig.client.connects, vec![PEER]);
    }

    #[test]
    fn body_lands_in_the_target_slot() {
        // Given
        let body = image(0x1800);
        let mut rig = Rig::new(FakePeer::serving(&body));

        // When
        let result = rig.run();

        // Then
        assert_eq!(result, Ok(body.len()));
        assert_eq!(rig.flash.erased_sectors, vec![4, 5]);
        assert_eq!(rig.flash.contents(SLOT_ADDRESS, body.len()), &body[..]);
        assert_eq!(rig.flash.bytes_written(), body.len());
        assert!(rig.flash.writes.iter().all(|w| w.length % WORD_SIZE == 0));
        assert_eq!(rig.flash.unguarded_operations, 0);
        assert!(rig.client.request().starts_with("GET /rom1.bin HTTP/1.0\r\n"));
    }

    #[test]
    fn surplus_data_is_left_unread() {
        // Given
        let body = image(512);
        let mut response = response_headers(body.len());
        response.extend_from_slice(&body);
        response.extend_from_slice(&[0xAB; 64]);
        let mut rig = Rig::new(FakePeer::scripted([Event::Data(response)]));

        // When
        let result = rig.run();

        // Then
        assert_eq!(result, Ok(512));
        assert_eq!(rig.flash.bytes_written(), 512);
        assert_eq!(rig.client.available(), 64);
    }

    #[test]
    fn short_read_is_a_lost_connection() {
        let mut rig = Rig::new(FakePeer::serving(&image(1024)));
        rig.client.short_reads = true;
        assert_eq!(rig.run(), Err(Error::ConnectionLost));
    }

    #[test]
    fn stalled_body_times_out() {
        // Given
        let mut response = response_headers(1024);
        response.extend_from_slice(&image(300));
        let mut rig = Rig::new(FakePeer::scripted([Event::Data(response)]));
        rig.config.body_timeout = Milliseconds(500);

        // When
        let result = rig.run();

        // Then
        assert_eq!(result, Err(Error::BodyTimeout));
        assert_eq!(rig.flash.bytes_written(), 300);
        assert!(rig.platform.yields > 0);
        assert!(rig.client.polls > rig.platform.yields);
    }
}
