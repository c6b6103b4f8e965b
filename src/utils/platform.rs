//! Host platform queries: release architecture naming, privilege, host name.

use crate::core::RelayError;
use anyhow::Result;

/// Maps a Rust target architecture name to the name release artifacts use.
pub fn release_arch(rust_arch: &str) -> Result<&'static str> {
    let arch = match rust_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "armv7",
        "x86" => "386",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        other => {
            return Err(RelayError::UnsupportedArchitecture {
                arch: other.to_string(),
            }
            .into());
        }
    };
    Ok(arch)
}

/// Release architecture of the running host.
pub fn host_arch() -> Result<&'static str> {
    release_arch(std::env::consts::ARCH)
}

/// Whether the process runs with an effective uid of 0.
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Fails with [`RelayError::PermissionDenied`] unless running as root.
pub fn ensure_root() -> Result<()> {
    if is_root() {
        Ok(())
    } else {
        Err(RelayError::PermissionDenied.into())
    }
}

/// Host name used to label exported connection descriptors.
pub fn host_name() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .find_map(|path| std::fs::read_to_string(path).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "relay".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::find_relay_error;

    #[test]
    fn test_release_arch_mapping() {
        assert_eq!(release_arch("x86_64").unwrap(), "amd64");
        assert_eq!(release_arch("aarch64").unwrap(), "arm64");
        assert_eq!(release_arch("arm").unwrap(), "armv7");
        assert_eq!(release_arch("x86").unwrap(), "386");
    }

    #[test]
    fn test_unsupported_arch() {
        let err = release_arch("mips").unwrap_err();
        assert!(matches!(
            find_relay_error(&err),
            Some(RelayError::UnsupportedArchitecture { arch }) if arch == "mips"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_root_matches_effective_uid() {
        let euid = unsafe { libc::geteuid() };
        assert_eq!(is_root(), euid == 0);
        assert_eq!(ensure_root().is_ok(), euid == 0);
    }

    #[test]
    fn test_host_name_not_empty() {
        assert!(!host_name().is_empty());
    }
}
