//! Cluster lifecycle operations
//!
//! The reconciliation core: head-node create-or-update, teardown
//! convergence, remote exec/attach/rsync, and the read-only queries.
//! Everything here talks to machines through the `NodeProvider` and
//! `NodeUpdater` traits only.

pub mod orchestrate;
pub mod query;
pub mod reconcile;
pub mod selector;
pub mod teardown;

pub use orchestrate::{attach_cluster, exec_cluster, rsync_cluster, AttachOptions, ExecOptions};
pub use query::{head_node, head_node_ip, kill_node, monitor_cluster, worker_node_ips};
pub use reconcile::{reconcile_head, ReconcileFlags, ReconcileOutcome};
pub use selector::NodeSelector;
pub use teardown::{teardown, TeardownFlags};
