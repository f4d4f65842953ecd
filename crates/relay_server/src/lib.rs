#![forbid(unsafe_code)]

pub mod config;
pub mod server;

pub use server::registry::Registry;
pub use server::relay::{Relay, RelaySettings};
