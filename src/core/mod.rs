//! The per-transaction state machine, the surrounding event loop, and the
//! process supervisor.

mod dispatcher;
mod listen;
mod supervisor;

pub use dispatcher::*;
pub use listen::*;
pub use supervisor::*;

#[cfg(test)]
mod listen_test;
#[cfg(test)]
mod supervisor_test;
