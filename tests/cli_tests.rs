//! Command-line tests against the built binary
//!
//! `check-secret` is exercised end to end: a stub instance metadata service
//! listens on localhost and a fake `aws` script on `PATH` prints the secret.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use serde_json::json;

const BIN: &str = env!("CARGO_BIN_EXE_wpprovision");

/// Serve IMDSv2 answers for one instance until the test process exits.
fn spawn_metadata_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind metadata stub");
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let request = String::from_utf8_lossy(&request);
            let path = request.split_whitespace().nth(1).unwrap_or("");

            let body = match path {
                "/latest/api/token" => Some("stub-token"),
                "/latest/meta-data/placement/region" => Some("us-east-1"),
                "/latest/meta-data/public-hostname" => {
                    Some("ec2-3-1-2-3.compute-1.amazonaws.com")
                }
                "/latest/meta-data/public-ipv4" => Some("3.1.2.3"),
                _ => None,
            };
            let response = match body {
                Some(body) => format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ),
                None => {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                }
            };
            let _ = stream.write_all(response.as_bytes());
        }
    });

    endpoint
}

/// Accept connections and never answer them.
///
/// The receiver yields once per accepted connection.
fn spawn_stalled_stub() -> (String, mpsc::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stalled stub");
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
            let _ = tx.send(());
        }
    });

    (endpoint, rx)
}

/// A bin directory holding an `aws` stand-in that prints `secret`, or fails
/// like a missing secret when `secret` is None.
fn fake_aws(dir: &Path, secret: Option<&serde_json::Value>) -> PathBuf {
    let bin = dir.join("bin");
    fs::create_dir_all(&bin).unwrap();

    let script = match secret {
        Some(secret) => format!("#!/bin/sh\nprintf '%s\\n' '{secret}'\n"),
        None => "#!/bin/sh\necho 'An error occurred (ResourceNotFoundException)' >&2\nexit 254\n"
            .to_string(),
    };
    let aws = bin.join("aws");
    fs::write(&aws, script).unwrap();
    fs::set_permissions(&aws, fs::Permissions::from_mode(0o755)).unwrap();
    bin
}

fn write_config(dir: &Path, endpoint: &str) -> PathBuf {
    let path = dir.join("provision.json");
    let config = json!({
        "metadata_endpoint": endpoint,
        "log_file": dir.join("install.log"),
        "http_timeout_secs": 5,
    });
    fs::write(&path, config.to_string()).unwrap();
    path
}

fn wpprovision_command(args: &[&str], path_env: Option<&Path>) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.args(args).env("NO_COLOR", "1").env("RUST_LOG", "info");
    for proxy in [
        "HTTP_PROXY",
        "http_proxy",
        "HTTPS_PROXY",
        "https_proxy",
        "ALL_PROXY",
        "all_proxy",
    ] {
        cmd.env_remove(proxy);
    }
    if let Some(path) = path_env {
        cmd.env("PATH", path);
    }
    cmd
}

fn wpprovision(args: &[&str], path_env: Option<&Path>) -> Output {
    wpprovision_command(args, path_env)
        .output()
        .expect("failed to run wpprovision")
}

fn secret() -> serde_json::Value {
    json!({
        "root_password": "r00t",
        "db_name": "wordpress",
        "db_user": "wp_user",
        "db_password": "secret",
        "wp_admin_user": "admin",
        "wp_admin_password": "admin-pass",
        "wp_admin_email": "admin@example.com",
    })
}

// =============================================================================
// Offline subcommands
// =============================================================================

#[test]
fn test_plan_lists_steps_in_order() {
    let output = wpprovision(&["plan"], None);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 13, "{stdout}");
    assert!(lines[0].contains("fetch-metadata"));
    assert!(lines[4].contains("bootstrap-database"));
    assert!(lines[12].contains("restart-services"));
}

#[test]
fn test_init_config_then_validate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provision.json");
    let path_arg = path.to_str().unwrap();

    let output = wpprovision(&["init-config", path_arg], None);
    assert!(output.status.success());
    assert!(path.is_file());

    let output = wpprovision(&["validate", path_arg], None);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Configuration file is valid"));

    let output = wpprovision(&["init-config", path_arg], None);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("refusing to overwrite"));
}

#[test]
fn test_validate_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provision.json");
    fs::write(&path, r#"{ "document_root": "relative/html" }"#).unwrap();

    let output = wpprovision(&["validate", path.to_str().unwrap()], None);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("document_root"));

    let output = wpprovision(&["validate", "/nonexistent/provision.json"], None);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_run_reports_missing_programs() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");
    let bin = fake_aws(dir.path(), Some(&secret()));

    let output = wpprovision(
        &["run", "--config", config.to_str().unwrap(), "--skip-root-check"],
        Some(&bin),
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing required programs"), "{stderr}");
    assert!(stderr.contains("systemctl"));
    assert!(!stderr.contains("aws,"), "aws is on PATH: {stderr}");
}

#[test]
fn test_log_file_is_appended_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");
    let bin = fake_aws(dir.path(), Some(&secret()));
    let args = ["run", "--config", config.to_str().unwrap(), "--skip-root-check"];

    assert_eq!(wpprovision(&args, Some(&bin)).status.code(), Some(1));
    let log_path = dir.path().join("install.log");
    let first = fs::read_to_string(&log_path).unwrap();
    assert!(first.contains("wpprovision starting"), "{first}");
    assert!(first.contains("pre-flight check failed"), "{first}");
    assert!(first.contains("systemctl"));
    assert!(!first.contains("\x1b["), "log file must not hold colour codes");

    assert_eq!(wpprovision(&args, Some(&bin)).status.code(), Some(1));
    let second = fs::read_to_string(&log_path).unwrap();
    assert!(second.starts_with(&first), "log file was truncated");
    assert_eq!(second.matches("wpprovision starting").count(), 2);
    assert_eq!(second.matches("pre-flight check failed").count(), 2);
}

// =============================================================================
// check-secret
// =============================================================================

#[test]
fn test_check_secret_accepts_complete_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = spawn_metadata_stub();
    let config = write_config(dir.path(), &endpoint);
    let bin = fake_aws(dir.path(), Some(&secret()));

    let output = wpprovision(
        &["check-secret", "--config", config.to_str().unwrap()],
        Some(&bin),
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{stderr}");
    assert!(
        String::from_utf8_lossy(&output.stdout)
            .contains("Secret `wordpress/bootstrap` is complete and valid")
    );
    assert!(!stderr.contains("admin-pass"), "secret leaked to logs");
}

#[test]
fn test_check_secret_names_missing_key() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = spawn_metadata_stub();
    let config = write_config(dir.path(), &endpoint);

    let mut incomplete = secret();
    incomplete.as_object_mut().unwrap().remove("wp_admin_email");
    let bin = fake_aws(dir.path(), Some(&incomplete));

    let output = wpprovision(
        &["check-secret", "--config", config.to_str().unwrap()],
        Some(&bin),
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("wp_admin_email"));
}

#[test]
fn test_check_secret_missing_secret_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = spawn_metadata_stub();
    let config = write_config(dir.path(), &endpoint);
    let bin = fake_aws(dir.path(), None);

    let output = wpprovision(
        &[
            "check-secret",
            "--config",
            config.to_str().unwrap(),
            "--secret-id",
            "prod/missing",
        ],
        Some(&bin),
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("prod/missing"), "{stderr}");
    assert!(stderr.contains("ResourceNotFoundException"));
}

// =============================================================================
// Signals
// =============================================================================

#[test]
fn test_sigterm_exits_with_signal_code() {
    let dir = tempfile::tempdir().unwrap();
    let (endpoint, connected) = spawn_stalled_stub();
    let config = dir.path().join("provision.json");
    let body = json!({
        "metadata_endpoint": endpoint,
        "log_file": dir.path().join("install.log"),
        "http_timeout_secs": 60,
    });
    fs::write(&config, body.to_string()).unwrap();
    let bin = fake_aws(dir.path(), Some(&secret()));

    let args = ["check-secret", "--config", config.to_str().unwrap()];
    let mut child = wpprovision_command(&args, Some(&bin))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn wpprovision");

    // Blocked on the metadata request from here on
    connected
        .recv_timeout(Duration::from_secs(20))
        .expect("wpprovision never contacted the metadata stub");

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).expect("SIGTERM failed");

    let status = child.wait().expect("wait for wpprovision");
    assert_eq!(status.code(), Some(128 + Signal::SIGTERM as i32));
}
