//! Core data model: distinguished names, entries, transactions.

mod dn;
mod entry;
mod transaction;

pub use dn::*;
pub use entry::*;
pub use transaction::*;

#[cfg(test)]
mod dn_test;
#[cfg(test)]
mod entry_test;
