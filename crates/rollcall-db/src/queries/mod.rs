//! `impl Database` blocks, one file per concern.

mod activities;
mod ledger;
mod lists;
mod stats;
mod status;
mod users;

pub use stats::RollupReport;
pub use status::ReconcileReport;

#[cfg(test)]
pub(crate) mod fixtures;
