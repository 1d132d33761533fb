use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeployError {
    // Local tooling errors
    #[error("Required tool not found: {tool}")]
    ToolingMissing { tool: String },

    #[error("Tool version too old: {tool} {found} (need {required}+)")]
    ToolingTooOld {
        tool: String,
        found: String,
        required: String,
    },

    #[error("Key generation failed: {message}")]
    GenerationError { message: String },

    #[error("Invalid key material: {message}")]
    InvalidKey { message: String },

    // Connection errors
    #[error("Connection failed: {message}")]
    ConnectError { message: String },

    #[error("Authentication rejected for {username}: {message}")]
    AuthError { username: String, message: String },

    // Remote execution errors
    #[error("Remote command timed out after {seconds}s")]
    RunTimeout { seconds: u64 },

    #[error("Remote command exited with status {code}: {stderr}")]
    RunNonZeroExit { code: u32, stderr: String },

    #[error("File transfer failed: {message}")]
    TransferError { message: String },

    // Deployment step errors
    #[error("Remote environment probe failed: {message}")]
    ProbeError { message: String },

    #[error("Could not ensure remote .ssh directory: {message}")]
    DirectoryError { message: String },

    #[error("Could not write authorized keys: {message}")]
    WriteError { message: String },

    #[error("Could not set remote permissions: {message}")]
    PermissionError { message: String },

    #[error("Key login verification failed: {message}")]
    VerificationFailure { message: String },

    // Input and system errors
    #[error("Invalid target: {message}")]
    InvalidTarget { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Deployment cancelled")]
    Cancelled,
}

impl From<std::io::Error> for DeployError {
    fn from(e: std::io::Error) -> Self {
        DeployError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<ssh_key::Error> for DeployError {
    fn from(e: ssh_key::Error) -> Self {
        DeployError::InvalidKey {
            message: e.to_string(),
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;

// Serialized as {type, message} for the presentation layer
impl serde::Serialize for DeployError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DeployError", 2)?;
        state.serialize_field("type", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl DeployError {
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::ToolingMissing { .. } => "ToolingMissing",
            DeployError::ToolingTooOld { .. } => "ToolingTooOld",
            DeployError::GenerationError { .. } => "GenerationError",
            DeployError::InvalidKey { .. } => "InvalidKey",
            DeployError::ConnectError { .. } => "ConnectError",
            DeployError::AuthError { .. } => "AuthError",
            DeployError::RunTimeout { .. } => "RunTimeout",
            DeployError::RunNonZeroExit { .. } => "RunNonZeroExit",
            DeployError::TransferError { .. } => "TransferError",
            DeployError::ProbeError { .. } => "ProbeError",
            DeployError::DirectoryError { .. } => "DirectoryError",
            DeployError::WriteError { .. } => "WriteError",
            DeployError::PermissionError { .. } => "PermissionError",
            DeployError::VerificationFailure { .. } => "VerificationFailure",
            DeployError::InvalidTarget { .. } => "InvalidTarget",
            DeployError::IoError { .. } => "IoError",
            DeployError::HomeDirNotFound => "HomeDirNotFound",
            DeployError::Cancelled => "Cancelled",
        }
    }

    /// ConnectError is a network-layer failure and safe to retry; AuthError
    /// needs a new credential from the operator first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeployError::ConnectError { .. } | DeployError::RunTimeout { .. }
        )
    }
}
