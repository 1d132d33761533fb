//! Platform-conditional remote command builders.
//!
//! Unix and Windows accounts restrict the `.ssh` directory and the
//! authorized-keys store differently (mode bits vs. ACLs). Each
//! [`PlatformKind`] maps to one strategy value so the engine never branches
//! on platform itself.

use crate::models::{PlatformKind, RemoteEnvironment};
use crate::utils::{cmd_quote, ps_quote, sh_quote};

/// Remote commands for one permission model. All commands must exit zero;
/// best-effort extras carry their own `|| true` guard.
pub trait PlatformStrategy: Send + Sync {
    /// Create the directory holding the authorized-keys store.
    fn create_dir_commands(&self, env: &RemoteEnvironment) -> Vec<String>;

    /// Restrict the store's directory to the owning account.
    fn secure_dir_commands(&self, env: &RemoteEnvironment, username: &str) -> Vec<String>;

    /// Restrict the authorized-keys file to owner read/write.
    fn secure_file_commands(&self, env: &RemoteEnvironment, username: &str) -> Vec<String>;

    /// Print the current authorized-keys content.
    fn read_keys_command(&self, env: &RemoteEnvironment) -> String;

    /// Append one public key line, as a single shell invocation. When the
    /// existing content does not end in a newline, `prefix_newline` makes the
    /// same invocation emit a separator first so the last existing line is
    /// never corrupted.
    fn append_key_command(
        &self,
        env: &RemoteEnvironment,
        key_line: &str,
        prefix_newline: bool,
    ) -> String;
}

pub fn strategy_for(kind: PlatformKind) -> &'static dyn PlatformStrategy {
    match kind {
        PlatformKind::UnixLike => &UnixStrategy,
        PlatformKind::WindowsRestricted => &WindowsUserStrategy,
        PlatformKind::WindowsAdmin => &WindowsAdminStrategy,
    }
}

struct UnixStrategy;

impl PlatformStrategy for UnixStrategy {
    fn create_dir_commands(&self, env: &RemoteEnvironment) -> Vec<String> {
        vec![format!("mkdir -p {}", sh_quote(&env.ssh_dir()))]
    }

    fn secure_dir_commands(&self, env: &RemoteEnvironment, _username: &str) -> Vec<String> {
        vec![format!("chmod 700 {}", sh_quote(&env.ssh_dir()))]
    }

    fn secure_file_commands(&self, env: &RemoteEnvironment, _username: &str) -> Vec<String> {
        let path = sh_quote(&env.authorized_keys_path());
        vec![
            format!("chmod 600 {}", path),
            // SELinux relabel where applicable, never fatal
            format!(
                "command -v restorecon >/dev/null 2>&1 && restorecon {} >/dev/null 2>&1 || true",
                path
            ),
        ]
    }

    fn read_keys_command(&self, env: &RemoteEnvironment) -> String {
        format!("cat {}", sh_quote(&env.authorized_keys_path()))
    }

    fn append_key_command(
        &self,
        env: &RemoteEnvironment,
        key_line: &str,
        prefix_newline: bool,
    ) -> String {
        let format_arg = if prefix_newline { "'\\n%s\\n'" } else { "'%s\\n'" };
        format!(
            "printf {} {} >> {}",
            format_arg,
            sh_quote(key_line),
            sh_quote(&env.authorized_keys_path())
        )
    }
}

// Non-elevated Windows account: per-user store under the profile, ACL
// restricted to the account itself plus SYSTEM.
struct WindowsUserStrategy;

impl PlatformStrategy for WindowsUserStrategy {
    fn create_dir_commands(&self, env: &RemoteEnvironment) -> Vec<String> {
        let dir = cmd_quote(&env.ssh_dir());
        vec![format!("if not exist {} mkdir {}", dir, dir)]
    }

    fn secure_dir_commands(&self, env: &RemoteEnvironment, username: &str) -> Vec<String> {
        vec![icacls_restrict(&env.ssh_dir(), &[username, "SYSTEM"])]
    }

    fn secure_file_commands(&self, env: &RemoteEnvironment, username: &str) -> Vec<String> {
        vec![icacls_restrict(
            &env.authorized_keys_path(),
            &[username, "SYSTEM"],
        )]
    }

    fn read_keys_command(&self, env: &RemoteEnvironment) -> String {
        format!("type {}", cmd_quote(&env.authorized_keys_path()))
    }

    fn append_key_command(
        &self,
        env: &RemoteEnvironment,
        key_line: &str,
        prefix_newline: bool,
    ) -> String {
        windows_append(&env.authorized_keys_path(), key_line, prefix_newline)
    }
}

// Elevated Windows account: Win32-OpenSSH reads administrators from the
// machine-wide store, which must be readable by Administrators and SYSTEM
// only.
struct WindowsAdminStrategy;

impl PlatformStrategy for WindowsAdminStrategy {
    fn create_dir_commands(&self, env: &RemoteEnvironment) -> Vec<String> {
        // C:\ProgramData\ssh exists on any host running sshd; create it only
        // if missing
        let dir = cmd_quote(&env.ssh_dir());
        vec![format!("if not exist {} mkdir {}", dir, dir)]
    }

    fn secure_dir_commands(&self, env: &RemoteEnvironment, _username: &str) -> Vec<String> {
        vec![icacls_restrict(&env.ssh_dir(), &["Administrators", "SYSTEM"])]
    }

    fn secure_file_commands(&self, env: &RemoteEnvironment, _username: &str) -> Vec<String> {
        vec![icacls_restrict(
            &env.authorized_keys_path(),
            &["Administrators", "SYSTEM"],
        )]
    }

    fn read_keys_command(&self, env: &RemoteEnvironment) -> String {
        format!("type {}", cmd_quote(&env.authorized_keys_path()))
    }

    fn append_key_command(
        &self,
        env: &RemoteEnvironment,
        key_line: &str,
        prefix_newline: bool,
    ) -> String {
        windows_append(&env.authorized_keys_path(), key_line, prefix_newline)
    }
}

/// Strip inherited ACLs and grant full control to the named principals only.
fn icacls_restrict(path: &str, principals: &[&str]) -> String {
    let grants: Vec<String> = principals
        .iter()
        .map(|p| format!("/grant {}", cmd_quote(&format!("{}:F", p))))
        .collect();
    format!(
        "icacls {} /inheritance:r {}",
        cmd_quote(path),
        grants.join(" ")
    )
}

/// Single Add-Content invocation; creates the file when missing.
fn windows_append(path: &str, key_line: &str, prefix_newline: bool) -> String {
    let value = if prefix_newline {
        format!("([Environment]::NewLine + {})", ps_quote(key_line))
    } else {
        ps_quote(key_line)
    };
    format!(
        "powershell -NoProfile -Command \"Add-Content -Path {} -Value {}\"",
        ps_quote(path),
        value
    )
}
