//! CLI argument definitions using clap derive

use crate::updater::RunEnv;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Drover - declarative cluster lifecycle manager
///
/// Converges running infrastructure to a declarative cluster spec:
/// create, update, tear down and operate clusters across pluggable
/// node providers.
#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update a cluster to match its spec
    Up(UpArgs),

    /// Tear a cluster down
    Down(DownArgs),

    /// Run a command on the cluster's head node
    Exec(ExecArgs),

    /// Open an interactive session on the head node
    Attach(AttachArgs),

    /// Sync files from the local machine to the cluster
    RsyncUp(RsyncArgs),

    /// Sync files from the cluster to the local machine
    RsyncDown(RsyncArgs),

    /// Print the head node's IP address
    HeadIp(SpecArgs),

    /// Print every worker node's IP address
    WorkerIps(SpecArgs),

    /// Kill a random worker node
    KillNode(KillNodeArgs),

    /// Tail the autoscaler monitor logs on the head node
    Monitor(MonitorArgs),

    /// Print the autoscaler's status report
    Status,

    /// Ask the autoscaler for resources
    RequestResources(RequestResourcesArgs),
}

/// Spec path plus the overrides shared by every cluster command
#[derive(Parser, Debug)]
pub struct SpecArgs {
    /// Path to the cluster spec (YAML)
    pub config: PathBuf,

    /// Override the spec's cluster name
    #[arg(long)]
    pub cluster_name: Option<String>,
}

/// Arguments for the up command
#[derive(Parser, Debug)]
pub struct UpArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Override the spec's minimum worker count
    #[arg(long)]
    pub min_workers: Option<u32>,

    /// Override the spec's maximum worker count
    #[arg(long)]
    pub max_workers: Option<u32>,

    /// Sync files and run setup, but do not restart cluster services
    #[arg(long)]
    pub no_restart: bool,

    /// Skip setup and only restart cluster services
    #[arg(long, conflicts_with = "no_restart")]
    pub restart_only: bool,

    /// Skip the resolved-config cache and re-run provider bootstrap
    #[arg(long)]
    pub no_config_cache: bool,

    /// Auto-approve all confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the down command
#[derive(Parser, Debug)]
pub struct DownArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Leave the head node running
    #[arg(long)]
    pub workers_only: bool,

    /// Spare min_workers randomly chosen workers
    #[arg(long)]
    pub keep_min_workers: bool,

    /// Auto-approve all confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the exec command
#[derive(Parser, Debug)]
pub struct ExecArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Command to run on the head node
    pub cmd: String,

    /// Where the command executes on the node
    #[arg(long, value_enum, default_value_t = RunEnv::Auto)]
    pub run_env: RunEnv,

    /// Run detached inside a screen session
    #[arg(long)]
    pub screen: bool,

    /// Run detached inside a tmux session
    #[arg(long, conflicts_with = "screen")]
    pub tmux: bool,

    /// Stop the cluster after the command finishes
    #[arg(long)]
    pub stop: bool,

    /// Create the cluster first if it is not up
    #[arg(long)]
    pub start: bool,

    /// Forward a port for the session (local and remote use the same
    /// number; repeatable)
    #[arg(short, long)]
    pub port_forward: Vec<u16>,

    /// Auto-approve all confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the attach command
#[derive(Parser, Debug)]
pub struct AttachArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Attach through screen
    #[arg(long)]
    pub screen: bool,

    /// Attach through tmux
    #[arg(long, conflicts_with = "screen")]
    pub tmux: bool,

    /// Force a fresh session instead of attaching to an existing one
    #[arg(long)]
    pub new: bool,

    /// Create the cluster first if it is not up
    #[arg(long)]
    pub start: bool,

    /// Auto-approve all confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the rsync-up and rsync-down commands
#[derive(Parser, Debug)]
pub struct RsyncArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Source path (omit both to sync the declared file mounts)
    #[arg(requires = "target")]
    pub source: Option<String>,

    /// Target path
    #[arg(requires = "source")]
    pub target: Option<String>,

    /// Sync worker nodes in addition to the head node
    #[arg(long)]
    pub all_nodes: bool,
}

/// Arguments for the kill-node command
#[derive(Parser, Debug)]
pub struct KillNodeArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Terminate the instance instead of stopping cluster services
    #[arg(long)]
    pub hard: bool,

    /// Auto-approve all confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the monitor command
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub spec: SpecArgs,

    /// Number of log lines to show before following
    #[arg(long, default_value = "100")]
    pub lines: u32,
}

/// Arguments for the request-resources command
#[derive(Parser, Debug)]
pub struct RequestResourcesArgs {
    /// Number of CPU cores to request
    #[arg(long)]
    pub cpus: Option<u64>,

    /// Resource bundles as JSON objects, e.g. '{"GPU": 1}' (repeatable)
    #[arg(long)]
    pub bundle: Vec<String>,
}
