//! SSH-backed node updater
//!
//! Drives `ssh` and `rsync` subprocesses against one node. Commands run
//! through `bash -c` on the node, optionally wrapped in a `docker exec`
//! when the cluster runs its services inside a container.

use super::{
    shell_quote, NodeUpdater, PortForward, RunEnv, RunOptions, SyncDirection, UpdaterFactory,
    UpdaterSpec,
};
use crate::config::expand_user;
use crate::error::{DroverError, DroverResult};
use crate::provider::{self, NodeProvider};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Attempts to fetch a freshly created node's IP before giving up
const IP_WAIT_ATTEMPTS: u32 = 30;
const IP_WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// Reachability probes before an update is abandoned
const READY_PROBE_ATTEMPTS: u32 = 30;
const READY_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Updater that reaches nodes over SSH
pub struct SshUpdater {
    spec: UpdaterSpec,
    provider: Arc<dyn NodeProvider>,
    node_ip: Mutex<Option<String>>,
    shutdown_next: AtomicBool,
}

impl SshUpdater {
    pub fn new(spec: UpdaterSpec, provider: Arc<dyn NodeProvider>) -> Self {
        Self {
            spec,
            provider,
            node_ip: Mutex::new(None),
            shutdown_next: AtomicBool::new(false),
        }
    }

    fn cached_ip(&self) -> Option<String> {
        self.node_ip.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Resolve the node's IP, waiting for the provider to assign one
    async fn node_ip(&self) -> DroverResult<String> {
        if let Some(ip) = self.cached_ip() {
            return Ok(ip);
        }

        let mut last_err = None;
        for attempt in 1..=IP_WAIT_ATTEMPTS {
            match provider::node_ip(
                self.provider.as_ref(),
                &self.spec.node_id,
                self.spec.use_internal_ip,
            )
            .await
            {
                Ok(ip) if !ip.is_empty() => {
                    debug!("Node {} has IP {}", self.spec.node_id, ip);
                    *self.node_ip.lock().unwrap_or_else(|e| e.into_inner()) = Some(ip.clone());
                    return Ok(ip);
                }
                Ok(_) => {
                    debug!(
                        "Node {} has no IP yet (attempt {}/{})",
                        self.spec.node_id, attempt, IP_WAIT_ATTEMPTS
                    );
                }
                Err(e) => {
                    debug!(
                        "IP lookup for {} failed (attempt {}/{}): {}",
                        self.spec.node_id, attempt, IP_WAIT_ATTEMPTS, e
                    );
                    last_err = Some(e);
                }
            }
            tokio::time::sleep(IP_WAIT_INTERVAL).await;
        }

        Err(last_err.unwrap_or_else(|| {
            DroverError::Provider(format!(
                "node {} was never assigned an IP",
                self.spec.node_id
            ))
        }))
    }

    /// Common SSH options shared by sessions and rsync transports
    fn ssh_base_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=ERROR",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "ServerAliveInterval=5",
            "-o",
            "ServerAliveCountMax=3",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(ref key) = self.spec.auth.ssh_private_key {
            args.push("-i".to_string());
            args.push(expand_user(key).to_string_lossy().into_owned());
        }
        if let Some(ref proxy) = self.spec.auth.ssh_proxy_command {
            args.push("-o".to_string());
            args.push(format!("ProxyCommand={}", proxy));
        }

        args
    }

    /// Full ssh argument vector for one remote command
    fn build_ssh_args(&self, ip: &str, cmd: &str, options: &RunOptions) -> Vec<String> {
        let mut args = self.ssh_base_args();

        for forward in &options.port_forward {
            args.push("-L".to_string());
            args.push(format!("{}:localhost:{}", forward.local, forward.remote));
        }

        if !options.with_output {
            args.push("-tt".to_string());
        }
        args.push(format!("{}@{}", self.spec.auth.ssh_user, ip));
        args.push("bash".to_string());
        args.push("-c".to_string());
        args.push(shell_quote(cmd));

        args
    }

    /// Wrap a command for the requested execution environment, appending
    /// the scheduled shutdown when one is pending
    fn finalize_command(&self, cmd: &str, run_env: RunEnv, interactive: bool) -> String {
        let containerize = match run_env {
            RunEnv::Auto => self.spec.container.is_enabled(),
            RunEnv::Host => false,
            RunEnv::Container => {
                if !self.spec.container.is_enabled() {
                    warn!("No container configured for this cluster, running on host");
                }
                self.spec.container.is_enabled()
            }
        };

        let mut finalized = if containerize {
            let name = self
                .spec
                .container
                .container_name
                .as_deref()
                .unwrap_or_default();
            let tty_flags = if interactive { "-it " } else { "" };
            format!(
                "docker exec {}{} /bin/bash -c {}",
                tty_flags,
                name,
                shell_quote(cmd)
            )
        } else {
            cmd.to_string()
        };

        if self.shutdown_next.swap(false, Ordering::SeqCst) {
            finalized.push_str("; sudo shutdown -h now");
        }

        finalized
    }

    /// The string handed to `rsync --rsh`, with space-bearing options quoted
    fn rsh_arg(&self) -> String {
        let mut parts = vec!["ssh".to_string()];
        for arg in self.ssh_base_args() {
            if arg.contains(' ') {
                parts.push(format!("\"{}\"", arg));
            } else {
                parts.push(arg);
            }
        }
        parts.join(" ")
    }

    async fn rsync_transfer(&self, source: &str, target: &str, desc: &str) -> DroverResult<()> {
        debug!("rsync {}: {} -> {}", desc, source, target);

        let output = Command::new("rsync")
            .args(["-avz", "-e", &self.rsh_arg(), source, target])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DroverError::command_failed(format!("rsync {} {}", source, target), e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DroverError::command_exec(
                format!("rsync {} {}", source, target),
                output.status.code().unwrap_or(-1),
                stderr.trim().to_string(),
            ))
        }
    }

    /// Probe the node over SSH until it accepts commands
    async fn wait_ready(&self) -> DroverResult<()> {
        let probe = RunOptions {
            exit_on_fail: true,
            with_output: true,
            run_env: RunEnv::Host,
            ..RunOptions::default()
        };

        for attempt in 1..=READY_PROBE_ATTEMPTS {
            match self.run("uptime", &probe).await {
                Ok(_) => {
                    debug!("Node {} is reachable", self.spec.node_id);
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        "Node {} not ready (attempt {}/{}): {}",
                        self.spec.node_id, attempt, READY_PROBE_ATTEMPTS, e
                    );
                }
            }
            tokio::time::sleep(READY_PROBE_INTERVAL).await;
        }

        Err(DroverError::Provider(format!(
            "node {} never became reachable over SSH",
            self.spec.node_id
        )))
    }

    async fn apply_inner(&self) -> DroverResult<()> {
        self.wait_ready().await?;

        info!(
            "Syncing {} file mount(s) to {} (runtime hash {})",
            self.spec.file_mounts.len(),
            self.spec.node_id,
            &self.spec.runtime_hash
        );
        self.sync_file_mounts(SyncDirection::Up).await?;

        let phases = [
            ("initialization", &self.spec.initialization_commands),
            ("setup", &self.spec.setup_commands),
            ("start", &self.spec.start_commands),
        ];
        for (phase, commands) in phases {
            if commands.is_empty() {
                continue;
            }
            info!(
                "Running {} {} command(s) on {}",
                commands.len(),
                phase,
                self.spec.node_id
            );
            for cmd in commands {
                let options = RunOptions {
                    exit_on_fail: true,
                    ..RunOptions::default()
                };
                self.run(cmd, &options).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl NodeUpdater for SshUpdater {
    async fn apply(&self) -> i32 {
        match self.apply_inner().await {
            Ok(()) => 0,
            Err(DroverError::CommandExecution { command, code, stderr }) => {
                error!(
                    "Update of {} failed: {} (exit {}): {}",
                    self.spec.node_id, command, code, stderr
                );
                if code != 0 {
                    code
                } else {
                    1
                }
            }
            Err(e) => {
                error!("Update of {} failed: {}", self.spec.node_id, e);
                1
            }
        }
    }

    async fn run(&self, cmd: &str, options: &RunOptions) -> DroverResult<Option<String>> {
        let ip = self.node_ip().await?;
        let finalized = self.finalize_command(cmd, options.run_env, !options.with_output);
        let args = self.build_ssh_args(&ip, &finalized, options);

        debug!("ssh {}@{}: {}", self.spec.auth.ssh_user, ip, finalized);

        let mut command = Command::new("ssh");
        command.args(&args);

        if options.with_output {
            let output = command
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|e| DroverError::command_failed(format!("ssh: {}", cmd), e))?;

            if !output.status.success() && options.exit_on_fail {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DroverError::command_exec(
                    cmd.to_string(),
                    output.status.code().unwrap_or(-1),
                    stderr.trim().to_string(),
                ));
            }
            Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
        } else {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|e| DroverError::command_failed(format!("ssh: {}", cmd), e))?;

            if !status.success() && options.exit_on_fail {
                return Err(DroverError::command_exec(
                    cmd.to_string(),
                    status.code().unwrap_or(-1),
                    String::new(),
                ));
            }
            Ok(None)
        }
    }

    async fn rsync_up(&self, source: &str, target: &str) -> DroverResult<()> {
        let ip = self.node_ip().await?;
        let local = expand_user(source).to_string_lossy().into_owned();
        let remote = format!("{}@{}:{}", self.spec.auth.ssh_user, ip, target);
        self.rsync_transfer(&local, &remote, "up").await
    }

    async fn rsync_down(&self, source: &str, target: &str) -> DroverResult<()> {
        let ip = self.node_ip().await?;
        let remote = format!("{}@{}:{}", self.spec.auth.ssh_user, ip, source);
        let local = expand_user(target).to_string_lossy().into_owned();

        if let Some(parent) = Path::new(&local).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DroverError::io(format!("creating directory {}", parent.display()), e)
                })?;
            }
        }

        self.rsync_transfer(&remote, &local, "down").await
    }

    async fn sync_file_mounts(&self, direction: SyncDirection) -> DroverResult<()> {
        for (remote, local) in &self.spec.file_mounts {
            let mut remote = remote.clone();
            let mut local = local.clone();

            // Directory mounts sync contents, not the directory itself
            if expand_user(&local).is_dir() {
                if !local.ends_with('/') {
                    local.push('/');
                }
                if !remote.ends_with('/') {
                    remote.push('/');
                }
            }

            match direction {
                SyncDirection::Up => {
                    if let Some(parent) = remote_parent(&remote) {
                        let mkdir = RunOptions {
                            exit_on_fail: true,
                            with_output: true,
                            run_env: RunEnv::Host,
                            ..RunOptions::default()
                        };
                        self.run(&format!("mkdir -p {}", shell_quote(parent)), &mkdir)
                            .await?;
                    }
                    self.rsync_up(&local, &remote).await?;
                }
                SyncDirection::Down => {
                    self.rsync_down(&remote, &local).await?;
                }
            }
        }
        Ok(())
    }

    fn remote_shell_command(&self) -> String {
        let target = match self.cached_ip() {
            Some(ip) => format!("{}@{}", self.spec.auth.ssh_user, ip),
            None => format!("{}@<node-ip>", self.spec.auth.ssh_user),
        };
        let mut parts = vec!["ssh".to_string()];
        parts.extend(self.ssh_base_args());
        parts.push(target);
        parts.join(" ")
    }

    fn is_containerized(&self) -> bool {
        self.spec.container.is_enabled()
    }

    fn schedule_remote_shutdown(&self) {
        self.shutdown_next.store(true, Ordering::SeqCst);
    }
}

/// Parent directory of a remote POSIX path, if it has one
fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Factory for SSH-backed updaters
pub struct SshUpdaterFactory;

#[async_trait]
impl UpdaterFactory for SshUpdaterFactory {
    async fn build(
        &self,
        spec: UpdaterSpec,
        provider: Arc<dyn NodeProvider>,
    ) -> DroverResult<Box<dyn NodeUpdater>> {
        Ok(Box::new(SshUpdater::new(spec, provider)))
    }
}
