#![forbid(unsafe_code)]

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod relay;

pub use registry::Registry;
pub use relay::Relay;

#[cfg(test)]
mod registry_tests;
