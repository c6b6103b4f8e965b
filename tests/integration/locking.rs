use relayctl::core::{RelayError, find_relay_error};
use relayctl::lock::InstanceLock;
use relayctl::orchestrator::InstallRequest;
use relayctl::test_utils::TestHost;

#[tokio::test]
async fn test_held_lock_rejects_mutation() {
    let env = TestHost::new("v1.2.0");
    let guard = InstanceLock::acquire(&env.layout.lock).await.unwrap();
    assert!(guard.is_held());

    let err = env
        .orchestrator()
        .install(InstallRequest {
            config: TestHost::config(),
            version: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(find_relay_error(&err), Some(RelayError::LockContention { .. })));
    assert!(env.releases.fetches().is_empty());
    assert!(env.host.commands().is_empty());
    assert!(env.binary_content().is_none());
    assert!(!env.layout.config.exists());
}

#[tokio::test]
async fn test_lock_is_released_after_workflow() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();

    orchestrator
        .install(InstallRequest {
            config: TestHost::config(),
            version: None,
        })
        .await
        .unwrap();

    // Acquirable again once the workflow returned.
    let guard = InstanceLock::acquire(&env.layout.lock).await.unwrap();
    drop(guard);
    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_every_mutating_workflow_locks() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();
    orchestrator
        .install(InstallRequest {
            config: TestHost::config(),
            version: None,
        })
        .await
        .unwrap();

    let _guard = InstanceLock::acquire(&env.layout.lock).await.unwrap();

    let contended = |err: anyhow::Error| {
        matches!(find_relay_error(&err), Some(RelayError::LockContention { .. }))
    };
    assert!(contended(orchestrator.upgrade(Default::default()).await.unwrap_err()));
    assert!(contended(orchestrator.restart().await.unwrap_err()));
    assert!(contended(orchestrator.stop().await.unwrap_err()));
    assert!(contended(orchestrator.uninstall(true).await.unwrap_err()));
    assert!(contended(orchestrator.rollback_to_latest_backup().await.unwrap_err()));
    assert!(env.host.running());
}
