//! Complex modules with business logic related to the problem
//! domain, that lay on top of abstract capabilities. Devices are
//! generic, while board specifics (network stack, flash chip) are
//! supplied by the firmware linking this crate.

pub mod boot_config;
pub mod fetch;
pub mod flash_writer;
pub mod session;
pub mod updater;
