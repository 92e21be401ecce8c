//! Scripted updater doubles shared by the cluster-logic tests

use crate::error::{DroverError, DroverResult};
use crate::provider::NodeProvider;
use crate::updater::{
    NodeUpdater, RunOptions, SyncDirection, UpdaterFactory, UpdaterSpec,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

/// One recorded interaction with a fake updater
#[derive(Debug, Clone, PartialEq)]
pub enum UpdaterCall {
    Apply { node: String },
    Run { node: String, cmd: String },
    RsyncUp { node: String, source: String, target: String },
    RsyncDown { node: String, source: String, target: String },
    SyncMounts { node: String, direction: SyncDirection },
    ScheduleShutdown { node: String },
}

/// Factory producing scripted updaters and recording everything they see
pub struct RecordingUpdaterFactory {
    specs: Mutex<Vec<UpdaterSpec>>,
    calls: Arc<Mutex<Vec<UpdaterCall>>>,
    exit_code: AtomicI32,
    fail_runs: AtomicBool,
    containerized: AtomicBool,
    run_output: Mutex<Option<String>>,
}

impl RecordingUpdaterFactory {
    pub fn new() -> Self {
        Self {
            specs: Mutex::new(Vec::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            exit_code: AtomicI32::new(0),
            fail_runs: AtomicBool::new(false),
            containerized: AtomicBool::new(false),
            run_output: Mutex::new(None),
        }
    }

    /// Exit code apply() will report
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    /// Make every run() call fail
    pub fn set_fail_runs(&self, fail: bool) {
        self.fail_runs.store(fail, Ordering::SeqCst);
    }

    /// Make updaters report a containerized cluster
    pub fn set_containerized(&self, containerized: bool) {
        self.containerized.store(containerized, Ordering::SeqCst);
    }

    /// Stdout returned by run() when output capture is requested
    pub fn set_run_output(&self, output: &str) {
        *self.run_output.lock().unwrap_or_else(|e| e.into_inner()) = Some(output.to_string());
    }

    /// Specs captured by build(), in build order
    pub fn captured_specs(&self) -> Vec<UpdaterSpec> {
        self.specs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every interaction recorded so far, across all built updaters
    pub fn calls(&self) -> Vec<UpdaterCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Commands passed to run(), in order
    pub fn run_commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                UpdaterCall::Run { cmd, .. } => Some(cmd),
                _ => None,
            })
            .collect()
    }
}

impl Default for RecordingUpdaterFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpdaterFactory for RecordingUpdaterFactory {
    async fn build(
        &self,
        spec: UpdaterSpec,
        _provider: Arc<dyn NodeProvider>,
    ) -> DroverResult<Box<dyn NodeUpdater>> {
        self.specs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        Ok(Box::new(FakeUpdater {
            node: spec.node_id.to_string(),
            calls: Arc::clone(&self.calls),
            exit_code: self.exit_code.load(Ordering::SeqCst),
            fail_runs: self.fail_runs.load(Ordering::SeqCst),
            containerized: self.containerized.load(Ordering::SeqCst),
            run_output: self
                .run_output
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }))
    }
}

/// Updater that records calls and returns scripted results
pub struct FakeUpdater {
    node: String,
    calls: Arc<Mutex<Vec<UpdaterCall>>>,
    exit_code: i32,
    fail_runs: bool,
    containerized: bool,
    run_output: Option<String>,
}

impl FakeUpdater {
    fn record(&self, call: UpdaterCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl NodeUpdater for FakeUpdater {
    async fn apply(&self) -> i32 {
        self.record(UpdaterCall::Apply {
            node: self.node.clone(),
        });
        self.exit_code
    }

    async fn run(&self, cmd: &str, options: &RunOptions) -> DroverResult<Option<String>> {
        self.record(UpdaterCall::Run {
            node: self.node.clone(),
            cmd: cmd.to_string(),
        });

        if self.fail_runs {
            return Err(DroverError::command_exec(
                cmd.to_string(),
                1,
                "scripted failure".to_string(),
            ));
        }

        if options.with_output {
            Ok(Some(self.run_output.clone().unwrap_or_default()))
        } else {
            Ok(None)
        }
    }

    async fn rsync_up(&self, source: &str, target: &str) -> DroverResult<()> {
        self.record(UpdaterCall::RsyncUp {
            node: self.node.clone(),
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    async fn rsync_down(&self, source: &str, target: &str) -> DroverResult<()> {
        self.record(UpdaterCall::RsyncDown {
            node: self.node.clone(),
            source: source.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    async fn sync_file_mounts(&self, direction: SyncDirection) -> DroverResult<()> {
        self.record(UpdaterCall::SyncMounts {
            node: self.node.clone(),
            direction,
        });
        Ok(())
    }

    fn remote_shell_command(&self) -> String {
        format!("ssh fake@{}", self.node)
    }

    fn is_containerized(&self) -> bool {
        self.containerized
    }

    fn schedule_remote_shutdown(&self) {
        self.record(UpdaterCall::ScheduleShutdown {
            node: self.node.clone(),
        });
    }
}
