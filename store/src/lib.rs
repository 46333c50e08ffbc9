mod errors;
mod session;

pub mod cache;
pub mod config;
pub mod doctor;
pub mod fixtures;
pub mod fsutil;
pub mod impression;
pub mod object;

pub use errors::Error;
pub use object::{get_node, Node};
pub use session::Session;

#[cfg(test)]
mod tests;
