//! Runtime detection of optional kernel facilities

pub mod capability;

pub use capability::{capabilities, capability_flags, probe, Capabilities, CapabilityFlags, KernelVersion};
