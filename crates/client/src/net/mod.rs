pub mod client;
pub mod config;
pub mod input;

pub use client::{ClientError, ClientStats, NetworkClient};
pub use config::ClientConfig;
pub use input::{ConstantInput, InputSource};
