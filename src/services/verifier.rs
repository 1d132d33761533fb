use crate::models::{
    Credential, DeployError, DeployResult, KeyPair, Target, VerificationOutcome,
};
use crate::services::session::{RemoteSession, SessionOps, SessionOptions};

/// Marker echoed by the remote no-op; works under both sh and cmd.exe.
const VERIFY_MARKER: &str = "keydeploy-verify-ok";

/// Confirm key-based login works: open a brand-new session authenticated by
/// the key pair alone (no password fallback) and run a trivial command to
/// prove the session is usable, not merely connected.
///
/// The caller records this separately from the deployment outcome; a failure
/// here means "installed but not yet usable", not "installation failed".
pub async fn verify(
    target: &Target,
    key: &KeyPair,
    options: &SessionOptions,
) -> VerificationOutcome {
    let key_only_target = Target {
        credential: Credential::KeyFile(key.private_path.clone()),
        ..target.clone()
    };

    let mut session = match RemoteSession::open(&key_only_target, options).await {
        Ok(session) => session,
        Err(e) => {
            log::warn!(
                "[verifier] Key login to {}@{} failed: {}",
                target.username,
                target.host,
                e
            );
            return VerificationOutcome::Failure {
                reason: DeployError::VerificationFailure {
                    message: e.to_string(),
                },
            };
        }
    };

    let outcome = match run_noop(&mut session).await {
        Ok(()) => VerificationOutcome::Success,
        Err(e) => VerificationOutcome::Failure {
            reason: DeployError::VerificationFailure {
                message: e.to_string(),
            },
        },
    };
    session.close().await;

    if outcome.is_success() {
        log::info!(
            "[verifier] Key login verified for {}@{}",
            target.username,
            target.host
        );
    }
    outcome
}

/// The no-op check itself, split out so it can run against any session.
pub async fn run_noop<S: SessionOps + ?Sized>(session: &mut S) -> DeployResult<()> {
    let output = session.run(&format!("echo {}", VERIFY_MARKER)).await?;
    if !output.success() {
        return Err(DeployError::RunNonZeroExit {
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    if !output.stdout.contains(VERIFY_MARKER) {
        return Err(DeployError::VerificationFailure {
            message: format!("unexpected no-op output: {:?}", output.stdout_trimmed()),
        });
    }
    Ok(())
}
