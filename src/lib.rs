//! # Dual-slot OTA update engine
//!
//! This crate contains the firmware update side of a dual-slot boot
//! manager: it streams a new image from a network peer into the
//! inactive flash slot and, only once every byte has landed, points
//! the persisted boot configuration at it and restarts the device.
//!
//! Hardware is reached exclusively through the capability traits in
//! [`hal`]; board bring-up (network stack, flash driver) belongs to the
//! firmware that links this library.
#![cfg_attr(test, allow(unused_imports))]
#![cfg_attr(target_arch = "arm", no_std)]
#![cfg_attr(not(any(feature = "log", feature = "defmt")), allow(unused_variables))]

extern crate static_assertions;

#[macro_use]
pub mod utilities {
    pub mod bitwise;
    pub mod buffer;
    pub mod guard;
    pub mod memory;
}

pub mod config;
pub mod devices;
pub mod drivers;
pub mod error;
pub mod hal;

#[cfg(feature = "defmt")]
pub(crate) use defmt as log;

#[cfg(all(feature = "log", not(feature = "defmt")))]
pub(crate) use ::log;

#[cfg(not(any(feature = "log", feature = "defmt")))]
pub(crate) mod log {
    macro_rules! trace {
        ($($x:tt)*) => {};
    }
    pub(crate) use trace;
    macro_rules! debug {
        ($($x:tt)*) => {};
    }
    pub(crate) use debug;
    macro_rules! info {
        ($($x:tt)*) => {};
    }
    pub(crate) use info;
    macro_rules! warner {
        ($($x:tt)*) => {};
    }
    pub(crate) use warner as warn;
    macro_rules! error {
        ($($x:tt)*) => {};
    }
    pub(crate) use error;
}
