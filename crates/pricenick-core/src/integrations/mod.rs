//! Built-in provider integrations.

#[cfg(feature = "network")]
pub mod dmx;
pub mod static_table;
