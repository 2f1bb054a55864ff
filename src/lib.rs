pub mod common;
pub mod daemon;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod swarm;

pub type Result<T> = std::result::Result<T, common::errors::HubError>;
