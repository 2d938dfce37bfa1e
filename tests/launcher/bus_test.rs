//! Tests for coordination service detection and start.

use std::time::Duration;

use humanoid::bus::{coordinator_address, ensure_running, is_reachable, BusStatus};
use humanoid::config::{BusConfig, LauncherConfig, RuntimePaths};
use humanoid::environment::LaunchEnvironment;
use humanoid::error::LaunchError;
use humanoid::profile::resolve;
use tokio::net::TcpListener;

fn environment() -> LaunchEnvironment {
    let paths = RuntimePaths::new("/srv/robot");
    let profile = resolve(None, &paths.config_dir).expect("default profile");
    LaunchEnvironment::build(&profile, &LauncherConfig::default(), &paths, None)
}

fn bus_config(start_command: &[&str], grace_secs: u64) -> BusConfig {
    BusConfig {
        grace_secs,
        probe_timeout_ms: 500,
        start_command: start_command.iter().map(|s| (*s).to_owned()).collect(),
        probe_uri: None,
    }
}

/// A loopback port with nothing listening on it.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

#[test]
fn coordinator_address_extracts_host_and_port() {
    assert_eq!(
        coordinator_address("http://192.168.1.100:11311").expect("parse"),
        ("192.168.1.100".to_owned(), 11311)
    );
    assert_eq!(
        coordinator_address("http://robot-master:12000/").expect("parse"),
        ("robot-master".to_owned(), 12000)
    );
    assert_eq!(
        coordinator_address("http://192.168.2.100").expect("parse"),
        ("192.168.2.100".to_owned(), 11311)
    );
}

#[test]
fn malformed_coordinator_is_unavailable() {
    let err = coordinator_address("not a uri").expect_err("must fail");
    assert!(matches!(err, LaunchError::DependencyUnavailable { .. }));
}

#[tokio::test]
async fn probe_sees_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    assert!(is_reachable("127.0.0.1", port, Duration::from_millis(500)).await);
    drop(listener);
    assert!(!is_reachable("127.0.0.1", port, Duration::from_millis(500)).await);
}

#[tokio::test]
async fn running_service_is_not_started_again() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let uri = format!("http://127.0.0.1:{}", listener.local_addr().expect("addr").port());

    // The start command does not exist; reaching it would fail the call.
    let config = bus_config(&["/nonexistent/roscore"], 0);
    let status = ensure_running(&uri, &config, &environment())
        .await
        .expect("already running");

    assert_eq!(status, BusStatus::AlreadyRunning);
}

#[tokio::test]
async fn unreachable_after_grace_is_fatal() {
    let uri = format!("http://127.0.0.1:{}", free_port().await);
    let config = bus_config(&["true"], 0);

    let err = ensure_running(&uri, &config, &environment())
        .await
        .expect_err("must fail");

    match err {
        LaunchError::DependencyUnavailable { uri: reported, .. } => assert_eq!(reported, uri),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unspawnable_start_command_is_fatal() {
    let uri = format!("http://127.0.0.1:{}", free_port().await);
    let config = bus_config(&["/nonexistent/roscore"], 0);

    let err = ensure_running(&uri, &config, &environment())
        .await
        .expect_err("must fail");

    assert!(err.to_string().contains("/nonexistent/roscore"));
}

#[tokio::test]
async fn service_coming_up_within_grace_is_started() {
    let port = free_port().await;
    let uri = format!("http://127.0.0.1:{port}");
    let config = bus_config(&["true"], 1);

    // Stands in for the coordination service binding late.
    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("rebind");
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(listener);
    });

    let status = ensure_running(&uri, &config, &environment())
        .await
        .expect("started");

    assert_eq!(status, BusStatus::Started);
    late.abort();
}
