use crate::models::{DeployError, DeployResult, KeyAlgorithm, KeyPair};
use ssh_key::PublicKey;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Key generation request. `bits` is ignored for fixed-size algorithms.
#[derive(Debug, Clone)]
pub struct KeyRequest {
    pub algorithm: KeyAlgorithm,
    pub bits: Option<u32>,
    pub comment: Option<String>,
}

impl Default for KeyRequest {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Ed25519,
            bits: None,
            comment: None,
        }
    }
}

/// Obtains a usable local key pair: reuses the files at `preferred_path` when
/// both exist, otherwise drives `ssh-keygen` to create them. Either way the
/// public key material is read fresh from disk.
pub struct KeyPairProvider;

impl KeyPairProvider {
    /// Conventional location for a new key pair: `~/.ssh/id_<algorithm>`.
    pub fn default_key_path(algorithm: KeyAlgorithm) -> DeployResult<PathBuf> {
        let home = dirs::home_dir().ok_or(DeployError::HomeDirNotFound)?;
        Ok(home.join(".ssh").join(format!("id_{}", algorithm)))
    }

    pub async fn obtain(preferred_path: &Path, request: &KeyRequest) -> DeployResult<KeyPair> {
        let public_path = public_path_for(preferred_path);

        let private_exists = fs::try_exists(preferred_path).await.unwrap_or(false);
        let public_exists = fs::try_exists(&public_path).await.unwrap_or(false);

        match (private_exists, public_exists) {
            (true, true) => {
                log::info!(
                    "[key_provider] Reusing existing key pair at {}",
                    preferred_path.display()
                );
                Self::load(preferred_path, &public_path).await
            }
            (false, false) => {
                Self::generate(preferred_path, &public_path, request).await?;
                Self::load(preferred_path, &public_path).await
            }
            // A half-present pair is never returned; the operator has to
            // resolve it (or point at a different path)
            (true, false) => Err(DeployError::GenerationError {
                message: format!(
                    "{} exists but {} is missing",
                    preferred_path.display(),
                    public_path.display()
                ),
            }),
            (false, true) => Err(DeployError::GenerationError {
                message: format!(
                    "{} exists but {} is missing",
                    public_path.display(),
                    preferred_path.display()
                ),
            }),
        }
    }

    /// Read the pair back from disk and derive its handle. Material is never
    /// cached in memory between calls, so external edits are picked up.
    async fn load(private_path: &Path, public_path: &Path) -> DeployResult<KeyPair> {
        let material = fs::read_to_string(public_path)
            .await
            .map_err(|e| DeployError::InvalidKey {
                message: format!("Cannot read {}: {}", public_path.display(), e),
            })?;
        let material = material.trim().to_string();

        let public_key = PublicKey::from_openssh(&material)?;
        let fingerprint = public_key.fingerprint(ssh_key::HashAlg::Sha256).to_string();
        let algorithm = KeyAlgorithm::from(public_key.algorithm().as_str());

        Ok(KeyPair {
            private_path: private_path.to_path_buf(),
            public_path: public_path.to_path_buf(),
            public_key_material: material,
            fingerprint,
            algorithm,
        })
    }

    async fn generate(
        private_path: &Path,
        public_path: &Path,
        request: &KeyRequest,
    ) -> DeployResult<()> {
        if let Some(parent) = private_path.parent() {
            if !fs::try_exists(parent).await.unwrap_or(false) {
                fs::create_dir_all(parent).await?;
                #[cfg(unix)]
                {
                    let perms = std::fs::Permissions::from_mode(0o700);
                    fs::set_permissions(parent, perms).await?;
                }
            }
        }

        let mut cmd = Command::new("ssh-keygen");
        cmd.arg("-t")
            .arg(request.algorithm.keygen_arg())
            .arg("-f")
            .arg(private_path)
            .arg("-N")
            .arg("")
            .arg("-q");
        if let Some(bits) = request.bits {
            if request.algorithm.accepts_bit_size() {
                cmd.arg("-b").arg(bits.to_string());
            }
        }
        if let Some(comment) = &request.comment {
            cmd.arg("-C").arg(comment);
        }

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployError::ToolingMissing {
                    tool: "ssh-keygen".to_string(),
                }
            } else {
                DeployError::GenerationError {
                    message: e.to_string(),
                }
            }
        })?;

        if !output.status.success() {
            Self::remove_partial(private_path, public_path).await;
            return Err(DeployError::GenerationError {
                message: format!(
                    "ssh-keygen exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        // ssh-keygen must have produced exactly the two files
        let private_ok = fs::try_exists(private_path).await.unwrap_or(false);
        let public_ok = fs::try_exists(public_path).await.unwrap_or(false);
        if !private_ok || !public_ok {
            Self::remove_partial(private_path, public_path).await;
            return Err(DeployError::GenerationError {
                message: "ssh-keygen succeeded but key files are missing".to_string(),
            });
        }

        Self::normalize_local_permissions(private_path, public_path).await;

        log::info!(
            "[key_provider] Generated {} key pair at {}",
            request.algorithm,
            private_path.display()
        );
        Ok(())
    }

    /// No partial key pair ever survives a failed generation.
    async fn remove_partial(private_path: &Path, public_path: &Path) {
        let _ = fs::remove_file(private_path).await;
        let _ = fs::remove_file(public_path).await;
    }

    #[cfg(unix)]
    async fn normalize_local_permissions(private_path: &Path, public_path: &Path) {
        for (path, mode) in [(private_path, 0o600), (public_path, 0o644)] {
            let perms = std::fs::Permissions::from_mode(mode);
            if let Err(e) = fs::set_permissions(path, perms).await {
                log::warn!(
                    "[key_provider] Could not set mode on {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    #[cfg(not(unix))]
    async fn normalize_local_permissions(private_path: &Path, _public_path: &Path) {
        // Restrict the private key to the current account via ACL; best
        // effort, ssh.exe refuses keys it considers too open
        let result = Command::new("icacls")
            .arg(private_path)
            .arg("/inheritance:r")
            .arg("/grant:r")
            .arg(format!("{}:F", whoami::username()))
            .output()
            .await;
        match result {
            Ok(output) if !output.status.success() => {
                log::warn!(
                    "[key_provider] icacls failed on {}: {}",
                    private_path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                log::warn!("[key_provider] Could not run icacls: {}", e);
            }
            _ => {}
        }
    }
}

fn public_path_for(private_path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.pub", private_path.display()))
}
