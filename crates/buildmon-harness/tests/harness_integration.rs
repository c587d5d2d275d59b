//! End-to-end tests driving a fake watch-mode tool through the sandbox

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

use buildmon_harness::{HarnessConfig, Sandbox};

/// A stand-in for the real tool: a shell script implementing the three modes.
const FAKE_TOOL: &str = r##"#!/bin/sh
case "$1" in
  build)
    sleep 0.05
    echo "Build successful (12ms)"
    ;;
  serve)
    echo "Serving on http://localhost:$3/"
    sleep 0.2
    echo "Build successful (103ms)"
    sleep 60
    ;;
  test)
    echo "ok 1 renders"
    echo "# done"
    ;;
esac
"##;

/// Build a fixture project containing the fake tool and a manifest.
fn create_fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{"name":"skeleton-app","version":"1.0.0"}"#,
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("bin")).unwrap();

    let tool = dir.path().join("bin/fake-tool");
    fs::write(&tool, FAKE_TOOL).unwrap();
    make_executable(&tool);

    dir
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

fn config(fixture: &TempDir) -> HarnessConfig {
    // Absolute path: the tool is not on PATH in the test environment.
    HarnessConfig::new(
        fixture.path().join("bin/fake-tool").to_string_lossy(),
        fixture.path(),
    )
}

#[tokio::test]
async fn build_completion_resolves_and_rearms() {
    let fixture = create_fixture();
    let sandbox = Sandbox::new(&config(&fixture)).unwrap();

    let process = sandbox.build();
    timeout(Duration::from_secs(5), process.wait_for_build())
        .await
        .expect("build marker should arrive within the window")
        .unwrap();

    // One-shot build exits cleanly after the marker.
    let code = timeout(Duration::from_secs(5), process.wait_until_exit())
        .await
        .expect("build process should exit")
        .unwrap();
    assert_eq!(code, Some(0));

    // A second build wait armed with no further output stays pending.
    let second = process.wait_for_build();
    assert!(timeout(Duration::from_millis(300), second).await.is_err());

    sandbox.teardown().unwrap();
}

#[tokio::test]
async fn serve_reports_startup_then_rebuild() {
    let fixture = create_fixture();
    let mut sandbox = Sandbox::new(&config(&fixture)).unwrap();
    let port = sandbox.port();

    let process = sandbox.serve(&[], HashMap::new()).unwrap();

    // The serve banner carries the port the sandbox passed on the command line.
    let output = timeout(
        Duration::from_secs(5),
        process.wait_for_output(&format!("localhost:{}", port)),
    )
    .await
    .expect("serve banner should appear")
    .unwrap();
    assert!(output.contains("Serving on"));

    // The initial watch-mode build completes shortly after startup.
    timeout(Duration::from_secs(5), process.wait_for_build())
        .await
        .expect("initial build should complete")
        .unwrap();

    sandbox.teardown().unwrap();
}

#[tokio::test]
async fn test_mode_output_is_observable() {
    let fixture = create_fixture();
    let mut sandbox = Sandbox::new(&config(&fixture)).unwrap();

    let process = sandbox.test(&[], HashMap::new()).unwrap();
    let output = timeout(Duration::from_secs(5), process.wait_for_output("# done"))
        .await
        .expect("test run should finish")
        .unwrap();
    assert!(output.contains("ok 1 renders"));

    sandbox.teardown().unwrap();
}

#[tokio::test]
async fn manifest_edits_survive_alongside_processes() {
    let fixture = create_fixture();
    let mut sandbox = Sandbox::new(&config(&fixture)).unwrap();

    sandbox.serve(&[], HashMap::new()).unwrap();
    sandbox
        .update_manifest(|manifest| {
            manifest["scripts"] = serde_json::json!({ "start": "fake-tool serve" });
        })
        .unwrap();

    let manifest: serde_json::Value =
        serde_json::from_str(&sandbox.read_file("package.json").unwrap()).unwrap();
    assert_eq!(manifest["scripts"]["start"], "fake-tool serve");

    sandbox.teardown().unwrap();
}

#[tokio::test]
async fn teardown_kills_the_serve_process() {
    let fixture = create_fixture();
    let mut sandbox = Sandbox::new(&config(&fixture)).unwrap();

    sandbox.serve(&[], HashMap::new()).unwrap();
    let root = sandbox.root().to_path_buf();
    assert!(root.exists());

    sandbox.teardown().unwrap();
    assert!(!root.exists());
}
