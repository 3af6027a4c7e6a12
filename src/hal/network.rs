//! Network client interface.
//!
//! Models a single TCP stream to an update server. Connection setup is
//! the implementer's business; the engine only asks for a connection to
//! a [`Peer`] and then drives the byte stream.
use core::{fmt, net::Ipv4Addr};

/// Address of an update server.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub const fn new(address: Ipv4Addr, port: u16) -> Self { Self { address, port } }
}

pub trait Client {
    type Error: Clone + Copy + fmt::Debug;

    /// Opens a stream to the peer, blocking until it is established or refused.
    fn connect(&mut self, peer: Peer) -> Result<(), Self::Error>;

    /// Number of received bytes ready to be read without blocking.
    fn available(&mut self) -> usize;

    /// Reads a single byte, or yields if none has arrived yet.
    fn read(&mut self) -> nb::Result<u8, Self::Error>;

    /// Reads up to `buffer.len()` bytes, returning how many were read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// Queues bytes for transmission, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Self::Error>;

    /// Whether the stream is open, or closed with received bytes still unread.
    fn is_connected(&mut self) -> bool;

    fn close(&mut self);
}
