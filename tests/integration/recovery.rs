use relayctl::core::{HealthCheckFailure, RelayError, find_relay_error};
use relayctl::installer::RollbackOutcome;
use relayctl::orchestrator::{InstallRequest, UpgradeRequest, WorkflowOutcome};
use relayctl::test_utils::{ArtifactKind, TestHost};

async fn installed(latest: &str) -> TestHost {
    let env = TestHost::new(latest);
    let outcome = env
        .orchestrator()
        .install(InstallRequest {
            config: TestHost::config(),
            version: None,
        })
        .await
        .unwrap();
    assert!(outcome.is_success());
    env
}

/// What a failed workflow must leave untouched.
#[derive(Debug, PartialEq)]
struct HostState {
    binary: Option<String>,
    version: Option<String>,
    config: Option<String>,
    definition: Option<String>,
    running: bool,
}

fn capture(env: &TestHost) -> HostState {
    HostState {
        binary: env.binary_content(),
        version: env.installed_version(),
        config: std::fs::read_to_string(&env.layout.config).ok(),
        definition: env.host.definition(),
        running: env.host.running(),
    }
}

#[tokio::test]
async fn test_unhealthy_upgrade_rolls_back() {
    let env = installed("v1.2.0").await;
    env.releases.set_latest("v1.3.0");
    env.releases.set_artifact("v1.3.0", ArtifactKind::Unhealthy);

    let outcome = env.orchestrator().upgrade(UpgradeRequest::default()).await.unwrap();

    assert!(!outcome.is_success());
    match outcome {
        WorkflowOutcome::RolledBack {
            attempted,
            restored,
            cause,
        } => {
            assert_eq!(attempted, "v1.3.0");
            assert_eq!(restored.as_deref(), Some("v1.2.0"));
            assert_eq!(
                cause,
                RelayError::HealthCheck(HealthCheckFailure::PortNotListening {
                    port: 8443
                })
            );
        }
        other => panic!("expected a rollback, got {other:?}"),
    }

    assert_eq!(env.installed_version().as_deref(), Some("v1.2.0"));
    assert!(env.binary_content().unwrap().contains("relay-server v1.2.0"));
    assert!(env.host.running());
}

#[tokio::test]
async fn test_download_failure_leaves_host_unchanged() {
    let env = installed("v1.2.0").await;
    let before = capture(&env);
    let commands_before = env.host.commands();

    env.releases.set_latest("v1.3.0");
    env.releases.set_artifact("v1.3.0", ArtifactKind::DownloadFails);
    let err = env.orchestrator().upgrade(UpgradeRequest::default()).await.unwrap_err();

    assert!(matches!(find_relay_error(&err), Some(RelayError::Download { .. })));
    assert_eq!(capture(&env), before);
    assert_eq!(env.host.commands(), commands_before);
}

#[tokio::test]
async fn test_artifact_without_binary_is_rejected() {
    let env = installed("v1.2.0").await;
    let before = capture(&env);

    env.releases.set_latest("v1.3.0");
    env.releases.set_artifact("v1.3.0", ArtifactKind::MissingBinary);
    let err = env.orchestrator().upgrade(UpgradeRequest::default()).await.unwrap_err();

    assert!(matches!(find_relay_error(&err), Some(RelayError::ArtifactLayout { .. })));
    assert_eq!(capture(&env), before);
}

#[tokio::test]
async fn test_resolution_failure_aborts_before_download() {
    let env = TestHost::new("v1.2.0");
    env.releases.fail_resolution();

    let err = env
        .orchestrator()
        .install(InstallRequest {
            config: TestHost::config(),
            version: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(find_relay_error(&err), Some(RelayError::VersionResolution { .. })));
    assert!(env.releases.fetches().is_empty());
    assert!(env.host.commands().is_empty());
    assert!(env.binary_content().is_none());
}

#[tokio::test]
async fn test_failed_fresh_install_cleans_up() {
    let env = TestHost::new("v1.2.0");
    env.releases.set_artifact("v1.2.0", ArtifactKind::Unhealthy);

    let outcome = env
        .orchestrator()
        .install(InstallRequest {
            config: TestHost::config(),
            version: None,
        })
        .await
        .unwrap();

    assert!(matches!(outcome, WorkflowOutcome::Failed { .. }));
    assert!(!env.host.running());
    assert!(!env.host.enabled());
    assert!(env.host.definition().is_none());
    assert!(env.binary_content().is_none());
    assert!(env.installed_version().is_none());
    assert!(!env.layout.config.exists());
}

#[tokio::test]
async fn test_rollback_without_backup() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();

    let outcome = orchestrator.backups().rollback(None).await.unwrap();
    assert_eq!(outcome, RollbackOutcome::NoBackupAvailable);
}

#[tokio::test]
async fn test_manual_rollback_after_upgrade() {
    let env = installed("v1.2.0").await;
    let orchestrator = env.orchestrator();
    env.releases.set_latest("v1.3.0");
    assert!(orchestrator.upgrade(UpgradeRequest::default()).await.unwrap().is_success());

    let outcome = orchestrator.rollback_to_latest_backup().await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(env.installed_version().as_deref(), Some("v1.2.0"));
    assert!(env.binary_content().unwrap().contains("v1.2.0"));
    assert!(env.host.running());
}

#[tokio::test]
async fn test_unrecordable_version_rolls_back() {
    let env = installed("v1.2.0").await;
    env.releases.set_latest("v1.3.0");
    env.host.block_path_on_next_start(&env.layout.installed_version);

    let outcome = env.orchestrator().upgrade(UpgradeRequest::default()).await.unwrap();

    match outcome {
        WorkflowOutcome::RolledBack {
            attempted,
            restored,
            cause,
        } => {
            assert_eq!(attempted, "v1.3.0");
            assert_eq!(restored.as_deref(), Some("v1.2.0"));
            assert!(matches!(cause, RelayError::Install { .. }));
        }
        other => panic!("expected a rollback, got {other:?}"),
    }
    assert!(env.binary_content().unwrap().contains("relay-server v1.2.0"));
    assert!(env.host.running());
}

#[tokio::test]
async fn test_unrecordable_version_on_fresh_install_fails_stopped() {
    let env = TestHost::new("v1.2.0");
    env.host.block_path_on_next_start(&env.layout.installed_version);

    let outcome = env
        .orchestrator()
        .install(InstallRequest {
            config: TestHost::config(),
            version: None,
        })
        .await
        .unwrap();

    assert!(matches!(outcome, WorkflowOutcome::Failed { cause: RelayError::Install { .. }, .. }));
    assert!(!env.host.running());
    assert!(env.binary_content().is_none());
}
