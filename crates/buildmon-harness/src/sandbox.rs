//! Sandboxed project directories for driving a watch-mode tool
//!
//! A [`Sandbox`] is a throwaway copy of a fixture project, plus entry points
//! for running the tool against it in its three modes (build / serve / test).
//! Everything here is plain I/O glue around the supervisor core.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use buildmon_core::prelude::*;

use crate::launcher::{self, LaunchSpec};
use crate::ports;
use crate::supervisor::SupervisedProcess;

/// Which tool to run and which fixture tree to copy into each sandbox.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Tool binary, e.g. `ember`. Resolved through `PATH` like any command.
    pub program: String,
    /// Project tree copied into every fresh sandbox.
    pub fixture_dir: PathBuf,
}

impl HarnessConfig {
    pub fn new(program: impl Into<String>, fixture_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            fixture_dir: fixture_dir.into(),
        }
    }
}

/// A temporary project directory with at most one serve process and one test
/// process running against it.
///
/// The directory is removed on [`teardown`](Self::teardown), or on drop as a
/// fallback.
pub struct Sandbox {
    root: TempDir,
    program: String,
    port: u16,
    watched: Option<SupervisedProcess>,
    watched_test: Option<SupervisedProcess>,
}

impl Sandbox {
    /// Copy the fixture into a fresh temp directory and allocate a serve port
    /// from the process-wide allocator.
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        let root = tempfile::Builder::new().prefix("skeleton-app-").tempdir()?;
        copy_tree(&config.fixture_dir, root.path())?;

        let port = ports::next_port();
        info!(
            "sandbox created at {} (port {})",
            root.path().display(),
            port
        );

        Ok(Self {
            root,
            program: config.program.clone(),
            port,
            watched: None,
            watched_test: None,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn spawn_tool(
        &self,
        args: Vec<String>,
        env: HashMap<String, String>,
        port: Option<u16>,
    ) -> SupervisedProcess {
        let mut spec = LaunchSpec::new(&self.program, self.root.path()).args(args);
        spec.env = env;
        let handle = launcher::launch(&spec);
        match port {
            Some(port) => SupervisedProcess::with_port(handle, port),
            None => SupervisedProcess::new(handle),
        }
    }

    /// Run `<program> build`. The returned supervisor reaches `Terminated`
    /// when the one-shot build exits; await it with
    /// [`wait_until_exit`](SupervisedProcess::wait_until_exit).
    pub fn build(&self) -> SupervisedProcess {
        self.spawn_tool(vec!["build".to_string()], HashMap::new(), None)
    }

    /// Start `<program> serve --port <port> <extra_args...>`.
    ///
    /// Starting a second serve process is a usage error, reported here before
    /// anything is spawned.
    pub fn serve(
        &mut self,
        extra_args: &[&str],
        env: HashMap<String, String>,
    ) -> Result<&SupervisedProcess> {
        if self.watched.is_some() {
            return Err(Error::AlreadyServing);
        }

        let mut args = vec![
            "serve".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        args.extend(extra_args.iter().map(|s| s.to_string()));

        let process = self.spawn_tool(args, env, Some(self.port));
        Ok(self.watched.insert(process))
    }

    /// Start `<program> test <extra_args...>`.
    ///
    /// Starting a second test process is a usage error, reported here before
    /// anything is spawned.
    pub fn test(
        &mut self,
        extra_args: &[&str],
        env: HashMap<String, String>,
    ) -> Result<&SupervisedProcess> {
        if self.watched_test.is_some() {
            return Err(Error::AlreadyTesting);
        }

        let mut args = vec!["test".to_string()];
        args.extend(extra_args.iter().map(|s| s.to_string()));

        let process = self.spawn_tool(args, env, None);
        Ok(self.watched_test.insert(process))
    }

    /// The running serve process, if any.
    pub fn watched(&self) -> Option<&SupervisedProcess> {
        self.watched.as_ref()
    }

    /// The running test process, if any.
    pub fn watched_test(&self) -> Option<&SupervisedProcess> {
        self.watched_test.as_ref()
    }

    /// Read `package.json`, apply `f`, and write it back pretty-printed with
    /// two-space indentation.
    pub fn update_manifest(&self, f: impl FnOnce(&mut serde_json::Value)) -> Result<()> {
        let path = self.root.path().join("package.json");
        let text = fs::read_to_string(&path)?;
        let mut manifest: serde_json::Value = serde_json::from_str(&text)?;

        f(&mut manifest);

        let mut out = serde_json::to_string_pretty(&manifest)?;
        out.push('\n');
        fs::write(&path, out)?;
        Ok(())
    }

    /// Write a file relative to the sandbox root, creating parent directories.
    pub fn write_file(&self, rel_path: impl AsRef<Path>, contents: &str) -> Result<()> {
        let full = self.root.path().join(rel_path.as_ref());
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, contents)?;
        Ok(())
    }

    /// Read a file relative to the sandbox root.
    pub fn read_file(&self, rel_path: impl AsRef<Path>) -> Result<String> {
        Ok(fs::read_to_string(self.root.path().join(rel_path.as_ref()))?)
    }

    /// Delete a file relative to the sandbox root.
    pub fn remove_file(&self, rel_path: impl AsRef<Path>) -> Result<()> {
        fs::remove_file(self.root.path().join(rel_path.as_ref()))?;
        Ok(())
    }

    /// Kill any live processes and remove the sandbox directory.
    pub fn teardown(mut self) -> Result<()> {
        if let Some(process) = self.watched.take() {
            process.kill();
        }
        if let Some(process) = self.watched_test.take() {
            process.kill();
        }
        self.root.close()?;
        Ok(())
    }
}

/// Recursively copy a fixture tree. Permission bits come along via `fs::copy`,
/// so executable fixture scripts stay executable.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        return Err(Error::missing_fixture(from));
    }

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&dest)?;
            copy_tree(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
