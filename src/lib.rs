//! Drover - declarative cluster lifecycle manager
//!
//! Converges running infrastructure to a declarative cluster spec:
//! create-or-update for the head node, teardown convergence for the
//! whole node set, and the remote operations (exec, attach, rsync)
//! that ride on the same provider and updater seams.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod provider;
pub mod signal;
pub mod testing;
pub mod ui;
pub mod updater;

pub use error::{DroverError, DroverResult};
