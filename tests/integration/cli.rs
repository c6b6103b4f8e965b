use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Writes a settings file whose paths all live under `root`.
fn sandbox_settings(root: &Path) -> std::path::PathBuf {
    let settings = format!(
        "[paths]\n\
         binary = '{root}/bin/relay-server'\n\
         config = '{root}/etc/relay.env'\n\
         installed_version = '{root}/etc/installed_version'\n\
         unit_dir = '{root}/systemd'\n\
         backup_dir = '{root}/backups'\n\
         lock = '{root}/relayctl.lock'\n",
        root = root.display()
    );
    let path = root.join("relayctl.toml");
    std::fs::write(&path, settings).unwrap();
    path
}

fn relayctl() -> Command {
    let mut cmd = Command::cargo_bin("relayctl").unwrap();
    cmd.env_remove("RELAYCTL_CONFIG").env_remove("RELAY_CREDENTIAL").arg("--no-progress");
    cmd
}

#[test]
fn test_help_lists_commands() {
    relayctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("upgrade"))
        .stdout(predicate::str::contains("uninstall"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn test_install_requires_credential() {
    relayctl()
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--credential"));
}

#[test]
fn test_export_with_explicit_public_ip() {
    let temp = TempDir::new().unwrap();
    let settings = sandbox_settings(temp.path());
    std::fs::create_dir_all(temp.path().join("etc")).unwrap();
    std::fs::write(
        temp.path().join("etc/relay.env"),
        "PORT=8443\nCREDENTIAL=abc123\nMASK_DOMAIN=www.microsoft.com\n",
    )
    .unwrap();

    relayctl()
        .arg("--config")
        .arg(&settings)
        .args(["export", "--public-ip", "203.0.113.7"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "anytls://abc123@203.0.113.7:8443?sni=www.microsoft.com&insecure=1#",
        ))
        .stdout(predicate::str::contains(r#""server":"203.0.113.7""#));
}

#[test]
fn test_settings_from_environment() {
    let temp = TempDir::new().unwrap();
    let settings = sandbox_settings(temp.path());
    std::fs::create_dir_all(temp.path().join("etc")).unwrap();
    std::fs::write(temp.path().join("etc/relay.env"), "PORT=9443\nCREDENTIAL=xyz\n").unwrap();

    relayctl()
        .env("RELAYCTL_CONFIG", &settings)
        .args(["export", "--public-ip", "2001:db8::1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("anytls://xyz@[2001:db8::1]:9443"));
}

#[test]
fn test_export_without_installation_fails() {
    let temp = TempDir::new().unwrap();
    let settings = sandbox_settings(temp.path());

    relayctl()
        .arg("--config")
        .arg(&settings)
        .args(["export", "--public-ip", "203.0.113.7"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_invalid_settings_file_fails() {
    let temp = TempDir::new().unwrap();
    let settings = temp.path().join("relayctl.toml");
    std::fs::write(&settings, "[health]\nattempts = \"many\"\n").unwrap();

    relayctl()
        .arg("--config")
        .arg(&settings)
        .args(["export", "--public-ip", "203.0.113.7"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("settings"));
}
