use relayctl::config::ServiceConfig;
use relayctl::orchestrator::{InstallRequest, UpgradeRequest, WorkflowOutcome};
use relayctl::test_utils::TestHost;

fn request(config: ServiceConfig) -> InstallRequest {
    InstallRequest {
        config,
        version: None,
    }
}

#[tokio::test]
async fn test_fresh_install() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();

    let outcome = orchestrator.install(request(TestHost::config())).await.unwrap();

    assert!(matches!(&outcome, WorkflowOutcome::Committed { tag } if tag == "v1.2.0"));
    assert_eq!(env.installed_version().as_deref(), Some("v1.2.0"));
    assert!(env.binary_content().unwrap().contains("relay-server v1.2.0"));
    assert!(env.host.running());
    assert!(env.host.enabled());

    let stored = std::fs::read_to_string(&env.layout.config).unwrap();
    assert!(stored.contains("PORT=8443"));
    assert!(stored.contains("CREDENTIAL=abc123"));
    assert!(stored.contains("MASK_DOMAIN=www.microsoft.com"));

    let unit = env.host.definition().unwrap();
    assert!(unit.contains(&format!("ExecStart={}", env.layout.binary.display())));
    assert!(unit.contains(&format!("EnvironmentFile={}", env.layout.config.display())));
}

#[tokio::test]
async fn test_install_explicit_version() {
    let env = TestHost::new("v2.0.0");
    let outcome = env
        .orchestrator()
        .install(InstallRequest {
            config: TestHost::config(),
            version: Some("v1.2.0".to_string()),
        })
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(env.releases.fetches(), vec!["v1.2.0"]);
    assert_eq!(env.installed_version().as_deref(), Some("v1.2.0"));
}

#[tokio::test]
async fn test_service_definition_does_not_depend_on_parameters() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();

    orchestrator.install(request(TestHost::config())).await.unwrap();
    let first = env.host.definition().unwrap();

    let rotated = ServiceConfig::new(9443, "rotated-secret", None).unwrap();
    orchestrator.install(request(rotated.clone())).await.unwrap();
    let second = env.host.definition().unwrap();

    assert_eq!(first, second);
    assert_eq!(orchestrator.config_store().read().await.unwrap(), rotated);
}

#[tokio::test]
async fn test_reinstall_stops_before_replacing() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();
    orchestrator.install(request(TestHost::config())).await.unwrap();
    let before = env.host.commands().len();

    orchestrator.install(request(TestHost::config())).await.unwrap();

    let commands = &env.host.commands()[before..];
    assert_eq!(commands.first().map(String::as_str), Some("stop"));
    assert!(commands.contains(&"restart".to_string()));
    assert!(env.host.running());

    // The reinstall backed up the binary it replaced.
    let backups = orchestrator.backups().list_backups().await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].tag.as_deref(), Some("v1.2.0"));
}

#[tokio::test]
async fn test_upgrade_to_latest() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();
    orchestrator.install(request(TestHost::config())).await.unwrap();

    env.releases.set_latest("v1.3.0");
    let outcome = orchestrator.upgrade(UpgradeRequest::default()).await.unwrap();

    assert!(matches!(&outcome, WorkflowOutcome::Committed { tag } if tag == "v1.3.0"));
    assert!(env.binary_content().unwrap().contains("v1.3.0"));
    assert_eq!(env.installed_version().as_deref(), Some("v1.3.0"));
    assert_eq!(orchestrator.config_store().read().await.unwrap(), TestHost::config());
}

#[tokio::test]
async fn test_forced_upgrade_reinstalls_current_version() {
    let env = TestHost::new("v1.2.0");
    let orchestrator = env.orchestrator();
    orchestrator.install(request(TestHost::config())).await.unwrap();

    let outcome = orchestrator
        .upgrade(UpgradeRequest {
            version: None,
            force: true,
        })
        .await
        .unwrap();

    assert!(matches!(&outcome, WorkflowOutcome::Committed { tag } if tag == "v1.2.0"));
    assert_eq!(env.releases.fetches(), vec!["v1.2.0", "v1.2.0"]);
}

#[tokio::test]
async fn test_explicit_downgrade() {
    let env = TestHost::new("v1.3.0");
    let orchestrator = env.orchestrator();
    orchestrator.install(request(TestHost::config())).await.unwrap();

    let outcome = orchestrator
        .upgrade(UpgradeRequest {
            version: Some("v1.2.0".to_string()),
            force: false,
        })
        .await
        .unwrap();

    assert!(matches!(&outcome, WorkflowOutcome::Committed { tag } if tag == "v1.2.0"));
    assert_eq!(env.installed_version().as_deref(), Some("v1.2.0"));
}
