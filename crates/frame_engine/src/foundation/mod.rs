//! Foundation utilities with no GPU dependencies

pub mod logging;
pub mod time;
