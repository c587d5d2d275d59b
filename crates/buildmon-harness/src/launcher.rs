//! Launching external tool processes

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use buildmon_core::prelude::*;

/// One tool invocation: program, argument list, working directory, and
/// environment overrides. Overrides are merged over the ambient environment,
/// never replacing it.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Outcome of a spawn attempt, carried inside the handle.
pub(crate) enum Launched {
    Spawned(Child),
    Failed(FailureReason),
}

/// Handle to a spawn attempt.
///
/// A failed spawn is carried inside the handle instead of being returned as a
/// call-time error: spawn failures on some platforms only surface
/// asynchronously, so the supervisor reports every failure the same way, as a
/// failed process that rejects outstanding waits. Exclusively consumed by one
/// [`SupervisedProcess`](crate::SupervisedProcess).
pub struct ProcessHandle {
    pub(crate) launched: Launched,
    pub(crate) pid: Option<u32>,
}

impl ProcessHandle {
    /// Whether the OS accepted the spawn. Failure details surface through the
    /// supervisor built on this handle.
    pub fn spawned(&self) -> bool {
        matches!(self.launched, Launched::Spawned(_))
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

/// Spawn the tool described by `spec` immediately.
///
/// stdout and stderr are piped for the supervisor; stdin is closed since the
/// harness never writes to the tool. `kill_on_drop` guarantees the child does
/// not outlive the supervision tasks.
pub fn launch(spec: &LaunchSpec) -> ProcessHandle {
    info!("Spawning: {} {}", spec.program, spec.args.join(" "));

    let result = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true) // Critical: cleanup on drop
        .spawn();

    match result {
        Ok(child) => {
            let pid = child.id();
            info!("Process started with PID: {:?}", pid);
            ProcessHandle {
                launched: Launched::Spawned(child),
                pid,
            }
        }
        Err(e) => {
            warn!("Failed to spawn {}: {}", spec.program, e);
            ProcessHandle {
                launched: Launched::Failed(FailureReason::Spawn {
                    program: spec.program.clone(),
                    reason: e.to_string(),
                    not_found: e.kind() == std::io::ErrorKind::NotFound,
                }),
                pid: None,
            }
        }
    }
}
