//! Hardware Abstraction Layer, containing the capabilities
//! the update engine consumes from the surrounding firmware.
#![macro_use]

pub mod exclusive;
pub mod flash;
pub mod network;
pub mod platform;
pub mod time;

#[cfg(not(target_arch = "arm"))]
#[doc(hidden)]
pub mod doubles;
