//! Client of DITE, the service that stores impressions and runs them on
//! registered runners.
mod errors;

pub mod client;
pub mod dispatcher;
pub mod status;

pub use client::{DiteClient, DEFAULT_TIMEOUT};
pub use dispatcher::{Dispatcher, DEFAULT_RUNNER};
pub use errors::Error;
pub use status::{RunStatus, Workflow, UNCONNECTED_LIST};

#[cfg(test)]
mod tests;
