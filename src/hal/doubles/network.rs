use super::error::FakeError;
use crate::hal::network::{Client, Peer};
use std::collections::VecDeque;

/// Step in the scripted behaviour of a [`FakePeer`]. The next step is only
/// taken once everything previously delivered has been read.
#[derive(Clone, Debug)]
pub enum Event {
    /// A burst of bytes becomes available at once.
    Data(Vec<u8>),
    /// One poll finds nothing available.
    Stall,
    /// The peer closes the stream.
    Disconnect,
}

/// Scripted update server.
#[derive(Default)]
pub struct FakePeer {
    script: VecDeque<Event>,
    ready: VecDeque<u8>,
    connected: bool,
    pub refuse_connection: bool,
    /// Every bulk read delivers one byte less than it reports.
    pub short_reads: bool,
    /// Every write accepts one byte less than offered.
    pub short_writes: bool,
    pub connects: Vec<Peer>,
    pub sent: Vec<u8>,
    pub closes: usize,
    pub polls: usize,
}

/// Minimal response header block declaring `length` body bytes.
pub fn response_headers(length: usize) -> Vec<u8> {
    format!("HTTP/1.0 200 OK\r\nServer: fake\r\nContent-Length: {}\r\n\r\n", length).into_bytes()
}

/// Deterministic image body of a given length.
pub fn image(length: usize) -> Vec<u8> { (0..length).map(|i| (i * 7 + i / 256) as u8).collect() }

impl FakePeer {
    pub fn scripted<I: IntoIterator<Item = Event>>(script: I) -> Self {
        Self { script: script.into_iter().collect(), ..Default::default() }
    }

    /// Serves `body` after a valid header block, splitting it into bursts of
    /// awkward, mostly unaligned sizes, with a stall between each burst.
    pub fn serving(body: &[u8]) -> Self {
        const BURSTS: [usize; 6] = [7, 301, 1, 96, 1535, 13];
        let mut script = vec![Event::Data(response_headers(body.len()))];
        let mut rest = body;
        for size in BURSTS.iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let (burst, tail) = rest.split_at((*size).min(rest.len()));
            script.push(Event::Data(burst.to_vec()));
            script.push(Event::Stall);
            rest = tail;
        }
        Self::scripted(script)
    }

    pub fn is_open(&self) -> bool { self.connected }

    pub fn request(&self) -> String { String::from_utf8_lossy(&self.sent).into_owned() }

    /// Takes the next scripted step if everything delivered so far was consumed.
    fn feed(&mut self) {
        self.polls += 1;
        if !self.connected || !self.ready.is_empty() {
            return;
        }
        match self.script.pop_front() {
            Some(Event::Data(bytes)) => self.ready.extend(bytes),
            Some(Event::Disconnect) => self.connected = false,
            Some(Event::Stall) | None => (),
        }
    }
}

impl Client for FakePeer {
    type Error = FakeError;

    fn connect(&mut self, peer: Peer) -> Result<(), Self::Error> {
        self.connects.push(peer);
        if self.refuse_connection {
            return Err(FakeError::Refused);
        }
        self.connected = true;
        Ok(())
    }

    fn available(&mut self) -> usize {
        self.feed();
        self.ready.len()
    }

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.feed();
        match self.ready.pop_front() {
            Some(byte) => Ok(byte),
            None if self.connected => Err(nb::Error::WouldBlock),
            None => Err(nb::Error::Other(FakeError::Disconnected)),
        }
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        self.feed();
        let mut count = buffer.len().min(self.ready.len());
        if self.short_reads {
            count = count.saturating_sub(1);
        }
        buffer.iter_mut().zip(self.ready.drain(..count)).for_each(|(o, i)| *o = i);
        Ok(count)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, Self::Error> {
        if !self.connected {
            return Err(FakeError::Disconnected);
        }
        let accepted = if self.short_writes { bytes.len().saturating_sub(1) } else { bytes.len() };
        self.sent.extend_from_slice(&bytes[..accepted]);
        Ok(accepted)
    }

    fn is_connected(&mut self) -> bool { self.connected }

    fn close(&mut self) {
        self.closes += 1;
        self.connected = false;
    }
}
