//! Application layer: configuration and the server lifecycle.

pub mod config;
pub mod server;

pub use config::{ApiInfo, Config, JwtConfig};
pub use server::{Server, ShutdownHandle};
