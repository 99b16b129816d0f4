use mirrorperf_cli::commands::{self, Exit};
use mirrorperf_config::{HarnessConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_tree(root: &Path, layer: &[u8]) {
    let blobs = root.join("blobs").join("sha256");
    fs::create_dir_all(&blobs).unwrap();
    fs::write(blobs.join("layer"), layer).unwrap();
    fs::write(root.join("index.json"), "{}").unwrap();
}

#[tokio::test]
async fn compare_exits_one_on_mismatch() {
    let dir = TempDir::new().unwrap();
    let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
    write_tree(&a, b"same");
    write_tree(&b, b"same");
    write_tree(&c, b"different");

    assert_eq!(commands::compare::execute(a.clone(), b).await.unwrap(), Exit::Success);
    assert_eq!(commands::compare::execute(a, c).await.unwrap(), Exit::Mismatch);
}

#[tokio::test]
async fn analyze_missing_directory_is_a_run_failure() {
    let dir = TempDir::new().unwrap();
    write_tree(dir.path(), b"layer");
    assert_eq!(
        commands::analyze::execute(dir.path().to_path_buf(), true).await.unwrap(),
        Exit::Success
    );

    let err = commands::analyze::execute(dir.path().join("absent"), false)
        .await
        .unwrap_err();
    assert_eq!(commands::exit_for_error(&err), Exit::RunFailed);
}

#[tokio::test]
async fn run_with_invalid_config_exits_two() {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig {
        workspace_root: dir.path().to_path_buf(),
        ..HarnessConfig::default()
    };

    let err = commands::run::execute(config).await.unwrap_err();
    assert_eq!(commands::exit_for_error(&err), Exit::ConfigError);
}

#[test]
#[serial]
fn config_file_from_environment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("perf.toml");
    fs::write(&path, "registry_url = \"registry.lab:5000\"\niterations = 5\n").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let loaded = commands::load_config(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    let config = loaded.unwrap();
    assert_eq!(config.registry_url, "registry.lab:5000");
    assert_eq!(config.iterations, 5);
}

#[test]
#[serial]
fn broken_config_file_exits_two() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("perf.toml");
    fs::write(&path, "iterations = \"many\"").unwrap();

    let err = commands::load_config(Some(path)).unwrap_err();
    assert_eq!(commands::exit_for_error(&err), Exit::ConfigError);
}

#[cfg(unix)]
#[tokio::test]
async fn relative_workspace_paths_resolve_from_the_tool_directory() {
    use mirrorperf_runner::MirrorExecutor;
    use std::os::unix::fs::PermissionsExt;

    let scratch = TempDir::new_in(".").unwrap();
    let relative = PathBuf::from(scratch.path().file_name().unwrap()).join("ws");
    let tool = scratch.path().join("fake-mirror.sh");
    fs::write(
        &tool,
        "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-c\" ]; then test -f \"$2\" || exit 3; fi\n  shift\ndone\n",
    )
    .unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

    let config = HarnessConfig {
        workspace_root: relative.clone(),
        mirror_binary: tool.canonicalize().unwrap().to_string_lossy().into_owned(),
        ..HarnessConfig::default()
    };
    let (config, executor) = commands::run::prepare(config).unwrap();
    assert!(config.workspace_root.is_absolute());
    assert_eq!(executor.working_dir(), Some(config.workspace_root.as_path()));

    let imageset = config.layout().config_dir().join("imageset.yaml");
    fs::create_dir_all(imageset.parent().unwrap()).unwrap();
    fs::write(&imageset, "kind: ImageSetConfiguration\n").unwrap();

    let output = executor
        .execute(&["-c".to_string(), imageset.display().to_string()])
        .await
        .unwrap();
    assert!(output.success());

    // The same file named relative to the process directory is not found
    // once the tool runs from inside the workspace.
    let unanchored = HarnessConfig {
        workspace_root: relative,
        ..HarnessConfig::default()
    }
    .layout()
    .config_dir()
    .join("imageset.yaml");
    let err = executor
        .execute(&["-c".to_string(), unanchored.display().to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.output().unwrap().exit_code, 3);
}
