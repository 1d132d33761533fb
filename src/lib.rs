//! Deployment engine for SSH public-key authentication.
//!
//! Takes a local key pair and one or more remote targets (host, port, user,
//! initial credential) to a verified passwordless-login end state: ensure the
//! remote `.ssh` directory, append the public key to the authorized-keys
//! store, normalize ownership and permissions per platform, then verify a
//! fresh key-only login. Every run produces one [`DeploymentResult`] per
//! target with an ordered step log.
//!
//! ```no_run
//! use keydeploy::{
//!     deploy_to_target, Credential, DeployOptions, KeyPairProvider, KeyRequest, Target,
//! };
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), keydeploy::DeployError> {
//! let key = KeyPairProvider::obtain(Path::new("/home/me/.ssh/id_ed25519"), &KeyRequest::default())
//!     .await?;
//! let target = Target::new("10.0.0.5", 22, "deploy", Credential::Password("hunter2".into()));
//! let result = deploy_to_target(&key, &target, &DeployOptions::default()).await;
//! println!("{}", serde_json::to_string_pretty(&result).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod services;
pub mod utils;

pub use models::{
    Credential, DeployError, DeployOutcome, DeployResult, DeploymentResult, EngineState,
    KeyAlgorithm, KeyPair, PlatformKind, RemoteEnvironment, StepName, StepOutcome, StepRecord,
    Target, VerificationOutcome,
};
pub use services::{
    deploy_to_all, deploy_to_target, probe_local, probe_remote, run_pipeline, verify, CancelFlag,
    CommandOutput, DeployOptions, KeyPairProvider, KeyRequest, LocalCapabilities, RemoteSession,
    SessionOps, SessionOptions,
};
