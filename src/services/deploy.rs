//! The deployment state machine.
//!
//! `Start → Probed → DirectoryEnsured → KeyStaged → PermissionsApplied →
//! Done(Deployed | AlreadyPresent)`, with `Failed(reason, last_state)`
//! reachable from every transition. Each transition records a step in the
//! result, so a stopped run can be reconstructed exactly.

use crate::models::{
    DeployError, DeployOutcome, DeployResult, DeploymentResult, EngineState, KeyPair,
    RemoteEnvironment, StepName, StepOutcome, StepRecord, Target, VerificationOutcome,
};
use crate::services::environment;
use crate::services::platform::strategy_for;
use crate::services::session::{CommandOutput, RemoteSession, SessionOps, SessionOptions};
use crate::services::verifier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the caller and running
/// pipelines. Checked between state-machine transitions only, never
/// mid-transition, so a cancelled run cannot leave a half-written store.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub session: SessionOptions,
    /// Run the key-only login verification after a successful deployment.
    pub verify: bool,
    pub cancel: CancelFlag,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            verify: true,
            cancel: CancelFlag::new(),
        }
    }
}

/// Everything the state machine produced for one target, before the
/// verification pass.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub outcome: DeployOutcome,
    pub permission_note: Option<String>,
    pub steps: Vec<StepRecord>,
}

struct StepLog {
    steps: Vec<StepRecord>,
}

impl StepLog {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn ok(&mut self, step: StepName) {
        self.steps.push(StepRecord {
            step,
            outcome: StepOutcome::Ok,
        });
    }

    fn ok_with_note(&mut self, step: StepName, note: &str) {
        self.steps.push(StepRecord {
            step,
            outcome: StepOutcome::OkWithNote {
                note: note.to_string(),
            },
        });
    }

    fn failed(&mut self, step: StepName, error: DeployError) {
        self.steps.push(StepRecord {
            step,
            outcome: StepOutcome::Failed { error },
        });
    }
}

/// Run the four-transition state machine over an already-open session.
/// Generic over [`SessionOps`] so each transition is testable in isolation.
pub async fn run_pipeline<S: SessionOps + ?Sized>(
    session: &mut S,
    key: &KeyPair,
    target: &Target,
    cancel: &CancelFlag,
) -> PipelineOutcome {
    let mut log = StepLog::new();
    let mut note: Option<String> = None;

    macro_rules! fail {
        ($reason:expr, $state:expr) => {
            return PipelineOutcome {
                outcome: DeployOutcome::Failed {
                    reason: $reason,
                    last_state: $state,
                },
                permission_note: note,
                steps: log.steps,
            }
        };
    }

    if cancel.is_cancelled() {
        fail!(DeployError::Cancelled, EngineState::Start);
    }

    // Start -> Probed
    let env = match environment::probe_remote(session, target.platform_hint).await {
        Ok(env) => {
            log.ok(StepName::Probe);
            env
        }
        Err(e) => {
            let reason = as_probe_error(e);
            log.failed(StepName::Probe, reason.clone());
            fail!(reason, EngineState::Start);
        }
    };

    if cancel.is_cancelled() {
        fail!(DeployError::Cancelled, EngineState::Probed);
    }

    // Probed -> DirectoryEnsured
    if let Err(e) = ensure_directory(session, &env, &target.username).await {
        log.failed(StepName::EnsureDirectory, e.clone());
        fail!(e, EngineState::Probed);
    }
    log.ok(StepName::EnsureDirectory);

    if cancel.is_cancelled() {
        fail!(DeployError::Cancelled, EngineState::DirectoryEnsured);
    }

    // DirectoryEnsured -> KeyStaged, or straight to Done(AlreadyPresent)
    match stage_key(session, &env, key).await {
        Ok(StageResult::AlreadyPresent) => {
            log.ok(StepName::StageKey);
            log::info!(
                "[deploy] {} already authorized on {} ({})",
                key.fingerprint,
                target.host,
                target.username
            );
            return PipelineOutcome {
                outcome: DeployOutcome::AlreadyPresent,
                permission_note: note,
                steps: log.steps,
            };
        }
        Ok(StageResult::Appended) => log.ok(StepName::StageKey),
        Err(e) => {
            log.failed(StepName::StageKey, e.clone());
            fail!(e, EngineState::DirectoryEnsured);
        }
    }

    if cancel.is_cancelled() {
        fail!(DeployError::Cancelled, EngineState::KeyStaged);
    }

    // KeyStaged -> PermissionsApplied. Tightening permissions on a store
    // that already existed (and so was already usable by sshd) is best
    // effort; on a freshly created store a failure is fatal.
    if let Err(e) = apply_permissions(session, &env, &target.username).await {
        if env.authorized_keys_exists {
            let message = format!("permission tightening skipped: {}", e);
            log.ok_with_note(StepName::ApplyPermissions, &message);
            note = Some(message);
        } else {
            log.failed(StepName::ApplyPermissions, e.clone());
            fail!(e, EngineState::KeyStaged);
        }
    } else {
        log.ok(StepName::ApplyPermissions);
    }

    log::info!(
        "[deploy] Installed {} for {}@{}",
        key.fingerprint,
        target.username,
        target.host
    );
    PipelineOutcome {
        outcome: DeployOutcome::Deployed,
        permission_note: note,
        steps: log.steps,
    }
}

fn as_probe_error(e: DeployError) -> DeployError {
    match e {
        e @ DeployError::ProbeError { .. } => e,
        other => DeployError::ProbeError {
            message: other.to_string(),
        },
    }
}

async fn ensure_directory<S: SessionOps + ?Sized>(
    session: &mut S,
    env: &RemoteEnvironment,
    username: &str,
) -> DeployResult<()> {
    let strategy = strategy_for(env.platform_kind);

    if !env.ssh_dir_exists {
        for command in strategy.create_dir_commands(env) {
            run_checked(session, &command)
                .await
                .map_err(|e| DeployError::DirectoryError {
                    message: e.to_string(),
                })?;
        }
    }
    for command in strategy.secure_dir_commands(env, username) {
        run_checked(session, &command)
            .await
            .map_err(|e| DeployError::DirectoryError {
                message: e.to_string(),
            })?;
    }
    Ok(())
}

enum StageResult {
    Appended,
    AlreadyPresent,
}

async fn stage_key<S: SessionOps + ?Sized>(
    session: &mut S,
    env: &RemoteEnvironment,
    key: &KeyPair,
) -> DeployResult<StageResult> {
    let strategy = strategy_for(env.platform_kind);

    if env.authorized_keys_exists {
        let existing = run_checked(session, &strategy.read_keys_command(env))
            .await
            .map_err(|e| DeployError::WriteError {
                message: format!("could not read existing store: {}", e),
            })?;

        if crate::utils::contains_key(&existing.stdout, &key.public_key_material) {
            return Ok(StageResult::AlreadyPresent);
        }

        // Existing lines are preserved verbatim: the new line is appended in
        // one shell invocation, never a rewrite of the whole file. A store
        // whose last line has no trailing newline gets a separator in that
        // same invocation.
        let needs_separator =
            !existing.stdout.is_empty() && !existing.stdout.ends_with('\n');
        run_checked(
            session,
            &strategy.append_key_command(env, &key.public_key_material, needs_separator),
        )
        .await
        .map_err(|e| DeployError::WriteError {
            message: e.to_string(),
        })?;
        return Ok(StageResult::Appended);
    }

    // No store yet: create it in a single write, already owner-restricted
    if env.platform_kind.is_windows() {
        run_checked(
            session,
            &strategy.append_key_command(env, &key.public_key_material, false),
        )
        .await
        .map_err(|e| DeployError::WriteError {
            message: e.to_string(),
        })?;
    } else {
        let content = format!("{}\n", key.public_key_material);
        session
            .put_file(content.as_bytes(), &env.authorized_keys_path(), Some(0o600))
            .await
            .map_err(|e| DeployError::WriteError {
                message: e.to_string(),
            })?;
    }
    Ok(StageResult::Appended)
}

async fn apply_permissions<S: SessionOps + ?Sized>(
    session: &mut S,
    env: &RemoteEnvironment,
    username: &str,
) -> DeployResult<()> {
    let strategy = strategy_for(env.platform_kind);
    for command in strategy.secure_file_commands(env, username) {
        run_checked(session, &command)
            .await
            .map_err(|e| DeployError::PermissionError {
                message: e.to_string(),
            })?;
    }
    Ok(())
}

/// Run a command and require a zero exit status.
async fn run_checked<S: SessionOps + ?Sized>(
    session: &mut S,
    command: &str,
) -> DeployResult<CommandOutput> {
    let output = session.run(command).await?;
    if !output.success() {
        return Err(DeployError::RunNonZeroExit {
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Assemble the caller-facing result from the pipeline and the (optional)
/// verification pass. Verification never overwrites a deployment outcome.
pub fn assemble_result(
    key: &KeyPair,
    target: &Target,
    pipeline: PipelineOutcome,
    verification: Option<VerificationOutcome>,
) -> DeploymentResult {
    let verified = matches!(verification, Some(VerificationOutcome::Success));
    DeploymentResult {
        host: target.host.clone(),
        port: target.port,
        username: target.username.clone(),
        fingerprint: key.fingerprint.clone(),
        outcome: pipeline.outcome,
        verified,
        permission_note: pipeline.permission_note,
        steps: pipeline.steps,
    }
}

/// Deploy one key pair to one target: open a session with the initial
/// credential, run the state machine, release the session on every exit
/// path, then verify with the key as sole credential.
pub async fn deploy_to_target(
    key: &KeyPair,
    target: &Target,
    options: &DeployOptions,
) -> DeploymentResult {
    let mut session = match RemoteSession::open(target, &options.session).await {
        Ok(session) => session,
        Err(e) => {
            log::warn!("[deploy] Could not open session to {}: {}", target.host, e);
            return assemble_result(
                key,
                target,
                PipelineOutcome {
                    outcome: DeployOutcome::Failed {
                        reason: e,
                        last_state: EngineState::Start,
                    },
                    permission_note: None,
                    steps: Vec::new(),
                },
                None,
            );
        }
    };

    let pipeline = run_pipeline(&mut session, key, target, &options.cancel).await;
    session.close().await;

    let verification = if pipeline.outcome.is_success() && options.verify {
        Some(verifier::verify(target, key, &options.session).await)
    } else {
        None
    };

    assemble_result(key, target, pipeline, verification)
}

/// Deploy one key pair to many targets, one independent pipeline per target.
/// Targets share nothing but the read-only key pair; a failure on one target
/// never aborts the batch. Every target yields exactly one result, in input
/// order.
pub async fn deploy_to_all(
    key: Arc<KeyPair>,
    targets: Vec<Target>,
    options: &DeployOptions,
) -> Vec<DeploymentResult> {
    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        let key = Arc::clone(&key);
        let options = options.clone();
        let fallback = target.clone();
        let handle = tokio::spawn(async move { deploy_to_target(&key, &target, &options).await });
        handles.push((handle, fallback));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (handle, target) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            // A panicked or aborted task still produces a Failed result
            Err(e) => {
                log::error!("[deploy] Task for {} did not complete: {}", target.host, e);
                results.push(assemble_result(
                    &key,
                    &target,
                    PipelineOutcome {
                        outcome: DeployOutcome::Failed {
                            reason: DeployError::IoError {
                                message: format!("deployment task did not complete: {}", e),
                            },
                            last_state: EngineState::Start,
                        },
                        permission_note: None,
                        steps: Vec::new(),
                    },
                    None,
                ));
            }
        }
    }
    results
}
