use crate::models::DeployError;
use serde::{Deserialize, Serialize};

/// States of the deployment state machine. `Failed` captures the last state
/// reached before the failing transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    Start,
    Probed,
    DirectoryEnsured,
    KeyStaged,
    PermissionsApplied,
}

/// One transition of the state machine, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StepName {
    Probe,
    EnsureDirectory,
    StageKey,
    ApplyPermissions,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StepOutcome {
    Ok,
    /// Step completed but with a recorded caveat (best-effort hardening
    /// that could not be applied).
    OkWithNote { note: String },
    Failed { error: DeployError },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: StepName,
    pub outcome: StepOutcome,
}

/// Terminal outcome of one deployment pipeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DeployOutcome {
    /// The public key line was appended and permissions applied.
    Deployed,
    /// An identical key line was already installed; nothing was written.
    AlreadyPresent,
    Failed {
        reason: DeployError,
        last_state: EngineState,
    },
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Deployed | DeployOutcome::AlreadyPresent)
    }
}

/// Outcome of the post-deployment key-only login check.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum VerificationOutcome {
    Success,
    Failure { reason: DeployError },
}

impl VerificationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationOutcome::Success)
    }
}

/// One result per target. Produced once, never mutated after completion.
/// This is the sole data surface the caller-side presentation layer
/// consumes; it is one-way output, so only serialization is derived.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Fingerprint of the key pair this deployment installed, for later
    /// idempotent re-runs.
    pub fingerprint: String,
    pub outcome: DeployOutcome,
    /// Result of the independent key-only login verification. A failure here
    /// never overwrites a `Deployed` outcome.
    pub verified: bool,
    /// Set when a best-effort permission tightening on a pre-existing store
    /// was skipped.
    pub permission_note: Option<String>,
    /// Ordered transition log; reconstructs exactly where a run stopped.
    pub steps: Vec<StepRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_keeps_last_state() {
        let outcome = DeployOutcome::Failed {
            reason: DeployError::PermissionError {
                message: "chmod: operation not permitted".to_string(),
            },
            last_state: EngineState::KeyStaged,
        };
        assert!(!outcome.is_success());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["lastState"], "keyStaged");
        assert_eq!(json["reason"]["type"], "PermissionError");
    }

    #[test]
    fn already_present_is_success() {
        assert!(DeployOutcome::AlreadyPresent.is_success());
    }

    #[test]
    fn full_result_serializes_for_presentation() {
        let result = DeploymentResult {
            host: "10.0.0.5".to_string(),
            port: 22,
            username: "deploy".to_string(),
            fingerprint: "SHA256:abc".to_string(),
            outcome: DeployOutcome::Failed {
                reason: DeployError::ProbeError {
                    message: "uname -s: timed out".to_string(),
                },
                last_state: EngineState::Start,
            },
            verified: false,
            permission_note: None,
            steps: vec![StepRecord {
                step: StepName::Probe,
                outcome: StepOutcome::Failed {
                    error: DeployError::ProbeError {
                        message: "uname -s: timed out".to_string(),
                    },
                },
            }],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["result"], "failed");
        assert_eq!(json["steps"][0]["step"], "probe");
        assert_eq!(json["steps"][0]["outcome"]["status"], "failed");
        assert_eq!(json["steps"][0]["outcome"]["error"]["type"], "ProbeError");
    }
}
