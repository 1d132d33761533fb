use crate::models::{DeployError, DeployResult};
use crate::utils::validate_hostname;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Initial credential used to open the first authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Credential {
    Password(String),
    /// Path to an existing private key file.
    KeyFile(PathBuf),
}

/// Permission/ACL model of the remote account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlatformKind {
    UnixLike,
    WindowsRestricted,
    WindowsAdmin,
}

impl PlatformKind {
    pub fn is_windows(&self) -> bool {
        matches!(
            self,
            PlatformKind::WindowsRestricted | PlatformKind::WindowsAdmin
        )
    }
}

/// One remote deployment target. Read-only input to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    /// Skips remote platform detection when the caller already knows.
    pub platform_hint: Option<PlatformKind>,
}

impl Target {
    pub fn new(host: &str, port: u16, username: &str, credential: Credential) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            credential,
            platform_hint: None,
        }
    }

    /// Reject hostnames and usernames that could smuggle shell syntax into
    /// remote commands.
    pub fn validate(&self) -> DeployResult<()> {
        validate_hostname(&self.host)?;
        if self.username.is_empty() || self.username.len() > 64 {
            return Err(DeployError::InvalidTarget {
                message: format!("Invalid username: {:?}", self.username),
            });
        }
        if self
            .username
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_' | '\\' | '@'))
        {
            return Err(DeployError::InvalidTarget {
                message: format!("Username contains invalid characters: {}", self.username),
            });
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Remote account environment, discovered fresh at the start of every
/// deployment attempt. Never cached across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnvironment {
    pub platform_kind: PlatformKind,
    /// Absolute home directory as reported by the remote shell.
    pub home_directory: String,
    pub ssh_dir_exists: bool,
    pub authorized_keys_exists: bool,
}

impl RemoteEnvironment {
    /// Directory holding this deployment's authorized-keys store. For
    /// administrators on Win32-OpenSSH that is the machine-wide store
    /// directory, not the profile `.ssh`.
    pub fn ssh_dir(&self) -> String {
        match self.platform_kind {
            PlatformKind::UnixLike => format!("{}/.ssh", self.home_directory),
            PlatformKind::WindowsRestricted => format!("{}\\.ssh", self.home_directory),
            PlatformKind::WindowsAdmin => "C:\\ProgramData\\ssh".to_string(),
        }
    }

    /// Authorized-keys store this deployment writes to. Administrators on
    /// Win32-OpenSSH share a machine-wide store instead of a per-user file.
    pub fn authorized_keys_path(&self) -> String {
        match self.platform_kind {
            PlatformKind::UnixLike => format!("{}/.ssh/authorized_keys", self.home_directory),
            PlatformKind::WindowsRestricted => {
                format!("{}\\.ssh\\authorized_keys", self.home_directory)
            }
            PlatformKind::WindowsAdmin => {
                "C:\\ProgramData\\ssh\\administrators_authorized_keys".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str, user: &str) -> Target {
        Target::new(host, 22, user, Credential::Password("pw".to_string()))
    }

    #[test]
    fn validates_hostnames() {
        assert!(target("example.com", "deploy").validate().is_ok());
        assert!(target("10.0.0.5", "deploy").validate().is_ok());
        assert!(target("host; rm -rf /", "deploy").validate().is_err());
        assert!(target("", "deploy").validate().is_err());
    }

    #[test]
    fn validates_usernames() {
        assert!(target("example.com", "deploy-user").validate().is_ok());
        assert!(target("example.com", "DOMAIN\\user").validate().is_ok());
        assert!(target("example.com", "user$(id)").validate().is_err());
        assert!(target("example.com", "").validate().is_err());
    }

    #[test]
    fn authorized_keys_path_per_platform() {
        let unix = RemoteEnvironment {
            platform_kind: PlatformKind::UnixLike,
            home_directory: "/home/deploy".to_string(),
            ssh_dir_exists: true,
            authorized_keys_exists: false,
        };
        assert_eq!(
            unix.authorized_keys_path(),
            "/home/deploy/.ssh/authorized_keys"
        );

        let admin = RemoteEnvironment {
            platform_kind: PlatformKind::WindowsAdmin,
            home_directory: "C:\\Users\\deploy".to_string(),
            ssh_dir_exists: false,
            authorized_keys_exists: false,
        };
        assert_eq!(
            admin.authorized_keys_path(),
            "C:\\ProgramData\\ssh\\administrators_authorized_keys"
        );
        // The directory probed and secured must be the machine-wide store,
        // not the profile .ssh
        assert_eq!(admin.ssh_dir(), "C:\\ProgramData\\ssh");
    }
}
