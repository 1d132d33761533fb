use crate::models::{Credential, DeployError, DeployResult, Target};
use async_trait::async_trait;
use russh::client;
use russh::keys::key::PublicKey;
use russh::ChannelMsg;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::time::timeout;

/// Timeouts applied to session operations. Connection establishment and each
/// remote command are bounded separately.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Captured output of one remote command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Primitives the deployment engine needs from an open session. The russh
/// implementation is [`RemoteSession`]; tests substitute scripted fakes.
#[async_trait]
pub trait SessionOps: Send {
    /// Run a remote command and collect its output. A non-zero exit status is
    /// data, not an error; only transport failures and timeouts are errors.
    async fn run(&mut self, command: &str) -> DeployResult<CommandOutput>;

    /// Write `data` to `remote_path` as a single operation, optionally
    /// chmod-ing it in the same shell invocation. POSIX remotes only.
    async fn put_file(
        &mut self,
        data: &[u8],
        remote_path: &str,
        mode: Option<u32>,
    ) -> DeployResult<()>;

    /// Release the session. Idempotent, safe after failures.
    async fn close(&mut self);
}

// Accepts any server key. Known-hosts management is the operator's concern.
struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// An authenticated russh session against one target. Exclusively owned by
/// the pipeline invocation that opened it.
pub struct RemoteSession {
    handle: client::Handle<ClientHandler>,
    command_timeout: Duration,
    closed: bool,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("command_timeout", &self.command_timeout)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl RemoteSession {
    /// Open and authenticate a session using the target's initial credential.
    ///
    /// Failures before authentication (TCP, DNS, timeout) come back as
    /// `ConnectError` and are retryable; a rejected credential is `AuthError`
    /// and is not.
    pub async fn open(target: &Target, options: &SessionOptions) -> DeployResult<RemoteSession> {
        target.validate()?;

        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let addr = target.address();
        log::debug!("[session] Connecting to {}", addr);

        let connect_result = timeout(
            options.connect_timeout,
            client::connect(Arc::new(config), addr.as_str(), ClientHandler),
        )
        .await;

        let mut handle = match connect_result {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(DeployError::ConnectError {
                    message: format!("{}: {}", addr, e),
                })
            }
            Err(_) => {
                return Err(DeployError::ConnectError {
                    message: format!(
                        "{}: connection timed out after {}s",
                        addr,
                        options.connect_timeout.as_secs()
                    ),
                })
            }
        };

        let authenticated = match &target.credential {
            Credential::Password(password) => handle
                .authenticate_password(&target.username, password)
                .await
                .map_err(|e| classify_auth_failure(&target.username, e))?,
            Credential::KeyFile(path) => {
                let key_content =
                    fs::read_to_string(path)
                        .await
                        .map_err(|e| DeployError::InvalidKey {
                            message: format!("Cannot read {}: {}", path.display(), e),
                        })?;
                let key_pair = russh_keys::decode_secret_key(&key_content, None).map_err(|e| {
                    DeployError::InvalidKey {
                        message: format!("{}: {}", path.display(), e),
                    }
                })?;
                handle
                    .authenticate_publickey(&target.username, Arc::new(key_pair))
                    .await
                    .map_err(|e| classify_auth_failure(&target.username, e))?
            }
        };

        if !authenticated {
            return Err(DeployError::AuthError {
                username: target.username.clone(),
                message: "credential rejected by server".to_string(),
            });
        }

        log::info!("[session] Authenticated {}@{}", target.username, addr);

        Ok(RemoteSession {
            handle,
            command_timeout: options.command_timeout,
            closed: false,
        })
    }

    /// Drive one exec channel to completion, collecting output and exit
    /// status.
    async fn exec_collect(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> DeployResult<CommandOutput> {
        let mut channel =
            self.handle
                .channel_open_session()
                .await
                .map_err(|e| DeployError::ConnectError {
                    message: format!("channel open failed: {}", e),
                })?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| DeployError::ConnectError {
                message: format!("exec failed: {}", e),
            })?;

        if let Some(data) = stdin {
            channel
                .data(data)
                .await
                .map_err(|e| DeployError::TransferError {
                    message: e.to_string(),
                })?;
            channel.eof().await.map_err(|e| DeployError::TransferError {
                message: e.to_string(),
            })?;
        }

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code: Option<u32> = None;

        let collected = timeout(self.command_timeout, async {
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => {
                        stdout.push_str(&String::from_utf8_lossy(&data));
                    }
                    ChannelMsg::ExtendedData { data, ext: 1 } => {
                        stderr.push_str(&String::from_utf8_lossy(&data));
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        exit_code = Some(exit_status);
                    }
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
        })
        .await;

        if collected.is_err() {
            return Err(DeployError::RunTimeout {
                seconds: self.command_timeout.as_secs(),
            });
        }

        Ok(CommandOutput {
            // A channel torn down without an explicit status is a failure
            exit_code: exit_code.unwrap_or(255),
            stdout,
            stderr,
        })
    }
}

/// An `Err` from an authenticate call is usually the transport dropping
/// mid-handshake, which stays retryable; only a definitive method rejection
/// counts as a bad credential. `Ok(false)` is handled by the caller.
fn classify_auth_failure(username: &str, e: russh::Error) -> DeployError {
    match e {
        russh::Error::NoAuthMethod | russh::Error::NotAuthenticated => DeployError::AuthError {
            username: username.to_string(),
            message: e.to_string(),
        },
        other => DeployError::ConnectError {
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl SessionOps for RemoteSession {
    async fn run(&mut self, command: &str) -> DeployResult<CommandOutput> {
        log::debug!("[session] run: {}", command);
        self.exec_collect(command, None).await
    }

    async fn put_file(
        &mut self,
        data: &[u8],
        remote_path: &str,
        mode: Option<u32>,
    ) -> DeployResult<()> {
        let quoted = crate::utils::sh_quote(remote_path);
        let command = match mode {
            Some(mode) => format!("cat > {} && chmod {:o} {}", quoted, mode, quoted),
            None => format!("cat > {}", quoted),
        };
        log::debug!("[session] put_file: {} ({} bytes)", remote_path, data.len());

        let output = self.exec_collect(&command, Some(data)).await?;
        if !output.success() {
            return Err(DeployError::TransferError {
                message: format!(
                    "writing {} exited with status {}: {}",
                    remote_path,
                    output.exit_code,
                    output.stderr.trim()
                ),
            });
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await;
        log::debug!("[session] Closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_during_auth_stays_retryable() {
        let e = classify_auth_failure("deploy", russh::Error::Disconnect);
        assert_eq!(e.kind(), "ConnectError");
        assert!(e.is_retryable());

        let e = classify_auth_failure("deploy", russh::Error::HUP);
        assert_eq!(e.kind(), "ConnectError");
    }

    #[test]
    fn method_rejection_during_auth_is_auth_error() {
        let e = classify_auth_failure("deploy", russh::Error::NoAuthMethod);
        assert_eq!(e.kind(), "AuthError");
        assert!(!e.is_retryable());
    }
}
