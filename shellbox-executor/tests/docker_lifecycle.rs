//! Integration tests for container lifecycle and exec against a real engine.
//!
//! These tests require a Docker daemon and the `ubuntu:latest` image.
//! Run with: `cargo test --test docker_lifecycle -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use shellbox_core::{EnvironmentStatus, SessionId};
use shellbox_executor::{
    DockerBackend, EnvironmentConfig, EnvironmentRuntime, ExecChannel, ExecutorError,
    LifecycleManager, TeardownOutcome,
};

fn session(id: &str) -> SessionId {
    SessionId::parse(id).expect("valid session id")
}

fn setup() -> (LifecycleManager<DockerBackend>, ExecChannel<DockerBackend>) {
    let backend = Arc::new(DockerBackend::with_defaults());
    let config = EnvironmentConfig::default();
    (
        LifecycleManager::new(Arc::clone(&backend), config.clone()),
        ExecChannel::with_timeout(backend, config, Duration::from_secs(30)),
    )
}

#[tokio::test]
#[ignore = "requires a Docker daemon at /var/run/docker.sock"]
async fn health_check_reaches_engine() {
    DockerBackend::with_defaults()
        .health_check()
        .await
        .expect("engine should answer /_ping");
}

#[tokio::test]
#[ignore = "requires a Docker daemon at /var/run/docker.sock"]
async fn echo_in_fresh_environment() {
    let (lifecycle, channel) = setup();
    let env = lifecycle.create(&session("it-echo")).await.expect("create failed");

    let output = channel.run(&env, "echo hi").await.expect("run failed");
    assert_eq!(output.result.stdout, "hi");
    assert_eq!(output.result.stderr, "");
    assert_eq!(output.result.exit_code, Some(0));

    assert!(lifecycle.destroy(&env).await.is_removed());
}

#[tokio::test]
#[ignore = "requires a Docker daemon at /var/run/docker.sock"]
async fn missing_command_reports_stderr() {
    let (lifecycle, channel) = setup();
    let env = lifecycle.create(&session("it-bad")).await.expect("create failed");

    let output = channel.run(&env, "bad_cmd_xyz").await.expect("run failed");
    assert_eq!(output.result.stdout, "");
    assert!(!output.result.stderr.is_empty(), "stderr should explain the failure");
    assert_ne!(output.result.exit_code, Some(0));

    lifecycle.destroy(&env).await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon at /var/run/docker.sock"]
async fn large_output_is_reassembled() {
    let (lifecycle, channel) = setup();
    let env = lifecycle.create(&session("it-large")).await.expect("create failed");

    let output = channel
        .run(&env, "seq 1 20000; seq 1 500 >&2")
        .await
        .expect("run failed");
    assert_eq!(output.result.stdout.lines().count(), 20000);
    assert_eq!(output.result.stderr.lines().last(), Some("500"));

    lifecycle.destroy(&env).await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon at /var/run/docker.sock"]
async fn network_is_disabled() {
    let (lifecycle, channel) = setup();
    let env = lifecycle.create(&session("it-net")).await.expect("create failed");

    let output = channel
        .run(&env, "ls /sys/class/net")
        .await
        .expect("run failed");
    assert_eq!(output.result.stdout, "lo", "only loopback should exist");

    lifecycle.destroy(&env).await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon at /var/run/docker.sock"]
async fn deadline_interrupts_long_command() {
    let backend = Arc::new(DockerBackend::with_defaults());
    let config = EnvironmentConfig::default();
    let lifecycle = LifecycleManager::new(Arc::clone(&backend), config.clone());
    let channel = ExecChannel::with_timeout(backend, config, Duration::from_secs(1));
    let env = lifecycle.create(&session("it-timeout")).await.expect("create failed");

    let result = channel.run(&env, "sleep 30").await;
    assert!(matches!(result, Err(ExecutorError::Timeout(_))));

    lifecycle.destroy(&env).await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon at /var/run/docker.sock"]
async fn destroy_moves_environment_to_removed() {
    let (lifecycle, _) = setup();
    let env = lifecycle.create(&session("it-destroy")).await.expect("create failed");
    assert_eq!(env.status(), EnvironmentStatus::Running);

    let outcome = lifecycle.destroy(&env).await;
    assert!(matches!(outcome, TeardownOutcome::Removed), "got {outcome:?}");
    assert_eq!(env.status(), EnvironmentStatus::Removed);
}
