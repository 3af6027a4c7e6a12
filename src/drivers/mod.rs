//! Capability implementations for supported platforms.
//!
//! Only what is generic to a core lives here. Flash and network drivers
//! are chip specific and come with the firmware that links this crate.

#[cfg(target_arch = "arm")]
pub mod cortex {
    pub mod exclusive;
    pub mod platform;
}

pub mod systick;
