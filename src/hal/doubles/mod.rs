//! Host-side fakes of every capability in [`crate::hal`], used by the
//! unit tests to run whole update attempts without hardware.
pub mod error;
pub mod exclusive;
pub mod flash;
pub mod network;
pub mod platform;
pub mod time;
