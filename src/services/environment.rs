use crate::models::{DeployError, DeployResult, PlatformKind, RemoteEnvironment};
use crate::services::session::SessionOps;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Oldest OpenSSH with ed25519 support.
const MIN_OPENSSH: (u32, u32) = (6, 5);

/// Local SSH tooling discovered by [`probe_local`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCapabilities {
    /// Version banner, e.g. `OpenSSH_9.6p1`.
    pub ssh_version: String,
    pub version: (u32, u32),
}

/// Check that `ssh` and `ssh-keygen` are runnable and recent enough. Fails
/// fast naming the missing tool; no partial capability is assumed.
pub async fn probe_local() -> DeployResult<LocalCapabilities> {
    // ssh prints its version banner on stderr
    let output = Command::new("ssh")
        .arg("-V")
        .output()
        .await
        .map_err(|e| missing_tool("ssh", e))?;
    let banner = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let version = parse_openssh_version(&banner).ok_or_else(|| DeployError::ProbeError {
        message: format!("Unrecognized ssh version banner: {}", banner),
    })?;
    if version < MIN_OPENSSH {
        return Err(DeployError::ToolingTooOld {
            tool: "ssh".to_string(),
            found: format!("{}.{}", version.0, version.1),
            required: format!("{}.{}", MIN_OPENSSH.0, MIN_OPENSSH.1),
        });
    }

    // Exit status does not matter here, only that the binary runs. Bare
    // ssh-keygen would go interactive, so probe it with an invalid flag.
    Command::new("ssh-keygen")
        .arg("-?")
        .output()
        .await
        .map_err(|e| missing_tool("ssh-keygen", e))?;

    let ssh_version = banner
        .split_whitespace()
        .next()
        .unwrap_or(&banner)
        .trim_end_matches(',')
        .to_string();
    log::info!("[environment] Local tooling: {}", ssh_version);

    Ok(LocalCapabilities {
        ssh_version,
        version,
    })
}

fn missing_tool(tool: &str, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::ToolingMissing {
            tool: tool.to_string(),
        }
    } else {
        DeployError::IoError {
            message: format!("{}: {}", tool, e),
        }
    }
}

/// Pull `(major, minor)` out of an `OpenSSH_X.Y...` banner. Windows builds
/// report `OpenSSH_for_Windows_X.Y`, so scan for the first digit.
pub fn parse_openssh_version(banner: &str) -> Option<(u32, u32)> {
    let rest = banner.split("OpenSSH_").nth(1)?;
    let digits_at = rest.find(|c: char| c.is_ascii_digit())?;
    let version_token: String = rest[digits_at..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = version_token.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Discover the remote account's environment over an open session, using
/// read-only commands only. Called fresh at the start of every deployment
/// attempt; results are never cached across runs.
///
/// A `platform_hint` skips platform-kind detection but the home directory
/// and store existence are still probed.
pub async fn probe_remote<S: SessionOps + ?Sized>(
    session: &mut S,
    platform_hint: Option<PlatformKind>,
) -> DeployResult<RemoteEnvironment> {
    let platform_kind = match platform_hint {
        Some(kind) => kind,
        None => detect_platform_kind(session).await?,
    };

    let env = match platform_kind {
        PlatformKind::UnixLike => probe_unix(session).await?,
        kind => probe_windows(session, kind).await?,
    };

    log::info!(
        "[environment] Remote: {:?}, home {}, ssh dir exists: {}, store exists: {}",
        env.platform_kind,
        env.home_directory,
        env.ssh_dir_exists,
        env.authorized_keys_exists
    );
    Ok(env)
}

async fn detect_platform_kind<S: SessionOps + ?Sized>(
    session: &mut S,
) -> DeployResult<PlatformKind> {
    let uname = session
        .run("uname -s")
        .await
        .map_err(|e| probe_failed("uname -s", &e))?;
    if uname.success() && !uname.stdout_trimmed().is_empty() {
        return Ok(PlatformKind::UnixLike);
    }

    // Not a POSIX shell; an elevated cmd.exe session can open \\localhost
    // admin resources, a restricted one cannot. On any ambiguity fall back
    // to the more restrictive model instead of assuming elevation.
    let net_session = session
        .run("net session")
        .await
        .map_err(|e| probe_failed("net session", &e))?;
    if net_session.success() {
        Ok(PlatformKind::WindowsAdmin)
    } else {
        Ok(PlatformKind::WindowsRestricted)
    }
}

async fn probe_unix<S: SessionOps + ?Sized>(session: &mut S) -> DeployResult<RemoteEnvironment> {
    let home = session
        .run("printf '%s' \"$HOME\"")
        .await
        .map_err(|e| probe_failed("$HOME", &e))?;
    let home_directory = home.stdout_trimmed().to_string();
    if !home.success() || home_directory.is_empty() {
        return Err(DeployError::ProbeError {
            message: "could not resolve remote home directory".to_string(),
        });
    }

    let mut env = RemoteEnvironment {
        platform_kind: PlatformKind::UnixLike,
        home_directory,
        ssh_dir_exists: false,
        authorized_keys_exists: false,
    };

    env.ssh_dir_exists = remote_path_exists(session, &format!("test -d {}", sh(&env.ssh_dir())))
        .await?;
    env.authorized_keys_exists = remote_path_exists(
        session,
        &format!("test -f {}", sh(&env.authorized_keys_path())),
    )
    .await?;
    Ok(env)
}

async fn probe_windows<S: SessionOps + ?Sized>(
    session: &mut S,
    platform_kind: PlatformKind,
) -> DeployResult<RemoteEnvironment> {
    let home = session
        .run("echo %USERPROFILE%")
        .await
        .map_err(|e| probe_failed("%USERPROFILE%", &e))?;
    let home_directory = home.stdout_trimmed().to_string();
    if !home.success() || home_directory.is_empty() || home_directory == "%USERPROFILE%" {
        return Err(DeployError::ProbeError {
            message: "could not resolve remote profile directory".to_string(),
        });
    }

    let mut env = RemoteEnvironment {
        platform_kind,
        home_directory,
        ssh_dir_exists: false,
        authorized_keys_exists: false,
    };

    env.ssh_dir_exists = remote_path_exists(
        session,
        &format!("if exist \"{}\\*\" (exit 0) else (exit 1)", env.ssh_dir()),
    )
    .await?;
    env.authorized_keys_exists = remote_path_exists(
        session,
        &format!(
            "if exist \"{}\" (exit 0) else (exit 1)",
            env.authorized_keys_path()
        ),
    )
    .await?;
    Ok(env)
}

async fn remote_path_exists<S: SessionOps + ?Sized>(
    session: &mut S,
    command: &str,
) -> DeployResult<bool> {
    let output = session
        .run(command)
        .await
        .map_err(|e| probe_failed(command, &e))?;
    Ok(output.success())
}

fn probe_failed(what: &str, e: &DeployError) -> DeployError {
    DeployError::ProbeError {
        message: format!("{}: {}", what, e),
    }
}

fn sh(path: &str) -> String {
    crate::utils::sh_quote(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_banners() {
        assert_eq!(
            parse_openssh_version("OpenSSH_9.6p1 Ubuntu-3ubuntu13"),
            Some((9, 6))
        );
        assert_eq!(
            parse_openssh_version("OpenSSH_for_Windows_8.1p1, LibreSSL 3.0.2"),
            Some((8, 1))
        );
        assert_eq!(parse_openssh_version("OpenSSH_6.5, OpenSSL"), Some((6, 5)));
        assert_eq!(parse_openssh_version("garbage"), None);
    }

    #[test]
    fn version_ordering_matches_tuples() {
        assert!((6, 4) < MIN_OPENSSH);
        assert!((7, 0) > MIN_OPENSSH);
    }
}
