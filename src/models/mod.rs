pub mod error;
pub mod key_pair;
pub mod result;
pub mod target;

pub use error::{DeployError, DeployResult};
pub use key_pair::{KeyAlgorithm, KeyPair};
pub use result::{
    DeployOutcome, DeploymentResult, EngineState, StepName, StepOutcome, StepRecord,
    VerificationOutcome,
};
pub use target::{Credential, PlatformKind, RemoteEnvironment, Target};
