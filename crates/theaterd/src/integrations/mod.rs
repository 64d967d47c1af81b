//! Transports that carry coordinator commands to real hardware.

pub mod mqtt;
