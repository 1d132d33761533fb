pub mod deploy;
pub mod environment;
pub mod key_provider;
pub mod platform;
pub mod session;
pub mod verifier;

pub use deploy::{
    deploy_to_all, deploy_to_target, run_pipeline, CancelFlag, DeployOptions, PipelineOutcome,
};
pub use environment::{probe_local, probe_remote, LocalCapabilities};
pub use key_provider::{KeyPairProvider, KeyRequest};
pub use platform::{strategy_for, PlatformStrategy};
pub use session::{CommandOutput, RemoteSession, SessionOps, SessionOptions};
pub use verifier::verify;
