//! Client for the notifier service: a line-oriented, message-id
//! multiplexed protocol over a single persistent TCP connection.

mod client;
mod protocol;

pub use client::*;
pub use protocol::*;

#[cfg(test)]
mod client_test;
