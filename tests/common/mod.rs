//! Common test utilities: scripted stand-ins for a remote host.

use async_trait::async_trait;
use keydeploy::{
    CommandOutput, Credential, DeployError, DeployResult, KeyAlgorithm, KeyPair, SessionOps,
    Target,
};

/// A key pair handle pointing at the fake remote's home; the private key
/// file never needs to exist for pipeline tests.
pub fn key_pair() -> KeyPair {
    KeyPair {
        private_path: "/home/tester/.ssh/id_ed25519".into(),
        public_path: "/home/tester/.ssh/id_ed25519.pub".into(),
        public_key_material: KEY_ALICE.to_string(),
        fingerprint: "SHA256:4BJWdlDT1DdPV9AEWnqGmZJHoclPpfPmMdjnGUsqCGY".to_string(),
        algorithm: KeyAlgorithm::Ed25519,
    }
}

pub fn target() -> Target {
    Target::new("10.0.0.5", 22, "deploy", Credential::Password("hunter2".into()))
}

pub const KEY_ALICE: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFlXOQk34tnLe4gTVThVboRl89gl4sC9wNcw+PtGp1Mk alice@example";
pub const KEY_BOB: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl bob@example";

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn exit(code: u32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// How an injected failure presents itself.
pub enum Fault {
    /// Command runs but exits non-zero.
    Exit(u32, &'static str),
    /// Transport-level error from the session itself.
    Transport(DeployError),
}

/// In-memory model of a POSIX remote account. Understands exactly the
/// command shapes the engine issues; anything else panics so drift is
/// caught immediately.
pub struct FakeUnixHost {
    pub home: String,
    pub ssh_dir_exists: bool,
    /// `None` means the authorized-keys file does not exist.
    pub authorized_keys: Option<String>,
    /// Injected failures, matched by substring against each command.
    pub faults: Vec<(&'static str, Fault)>,
    /// Simulates a server that installed the key but refuses key logins.
    pub verify_blocked: bool,
    pub commands_seen: Vec<String>,
    pub closed: bool,
}

impl FakeUnixHost {
    pub fn new() -> Self {
        Self {
            home: "/home/tester".to_string(),
            ssh_dir_exists: false,
            authorized_keys: None,
            faults: Vec::new(),
            verify_blocked: false,
            commands_seen: Vec::new(),
            closed: false,
        }
    }

    pub fn with_authorized_keys(content: &str) -> Self {
        let mut host = Self::new();
        host.ssh_dir_exists = true;
        host.authorized_keys = Some(content.to_string());
        host
    }

    pub fn fault(mut self, pattern: &'static str, fault: Fault) -> Self {
        self.faults.push((pattern, fault));
        self
    }

    pub fn keys_content(&self) -> &str {
        self.authorized_keys.as_deref().unwrap_or("")
    }

    fn ssh_dir(&self) -> String {
        format!("{}/.ssh", self.home)
    }

    fn keys_path(&self) -> String {
        format!("{}/.ssh/authorized_keys", self.home)
    }

    fn injected(&self, command: &str) -> Option<DeployResult<CommandOutput>> {
        for (pattern, fault) in &self.faults {
            if command.contains(pattern) {
                return Some(match fault {
                    Fault::Exit(code, stderr) => Ok(exit(*code, stderr)),
                    Fault::Transport(e) => Err(e.clone()),
                });
            }
        }
        None
    }
}

#[async_trait]
impl SessionOps for FakeUnixHost {
    async fn run(&mut self, command: &str) -> DeployResult<CommandOutput> {
        self.commands_seen.push(command.to_string());

        if let Some(response) = self.injected(command) {
            return response;
        }

        if command == "uname -s" {
            return Ok(ok("Linux\n"));
        }
        if command == "printf '%s' \"$HOME\"" {
            return Ok(ok(&self.home.clone()));
        }
        if command == format!("test -d '{}'", self.ssh_dir()) {
            return Ok(if self.ssh_dir_exists {
                ok("")
            } else {
                exit(1, "")
            });
        }
        if command == format!("test -f '{}'", self.keys_path()) {
            return Ok(if self.authorized_keys.is_some() {
                ok("")
            } else {
                exit(1, "")
            });
        }
        if command == format!("mkdir -p '{}'", self.ssh_dir()) {
            self.ssh_dir_exists = true;
            return Ok(ok(""));
        }
        if command.starts_with("chmod 700 ") || command.starts_with("chmod 600 ") {
            return Ok(ok(""));
        }
        if command.starts_with("command -v restorecon") {
            return Ok(ok(""));
        }
        if command == format!("cat '{}'", self.keys_path()) {
            return match &self.authorized_keys {
                Some(content) => Ok(ok(&content.clone())),
                None => Ok(exit(1, "No such file or directory")),
            };
        }
        if let Some(rest) = command.strip_prefix("printf '%s\\n' '") {
            let suffix = format!("' >> '{}'", self.keys_path());
            if let Some(key_line) = rest.strip_suffix(suffix.as_str()) {
                let store = self.authorized_keys.get_or_insert_with(String::new);
                store.push_str(key_line);
                store.push('\n');
                return Ok(ok(""));
            }
        }
        if let Some(rest) = command.strip_prefix("printf '\\n%s\\n' '") {
            let suffix = format!("' >> '{}'", self.keys_path());
            if let Some(key_line) = rest.strip_suffix(suffix.as_str()) {
                let store = self.authorized_keys.get_or_insert_with(String::new);
                store.push('\n');
                store.push_str(key_line);
                store.push('\n');
                return Ok(ok(""));
            }
        }
        if command == "echo keydeploy-verify-ok" {
            return Ok(if self.verify_blocked {
                exit(1, "This service allows sftp connections only.")
            } else {
                ok("keydeploy-verify-ok\n")
            });
        }

        panic!("FakeUnixHost got unexpected command: {}", command);
    }

    async fn put_file(
        &mut self,
        data: &[u8],
        remote_path: &str,
        _mode: Option<u32>,
    ) -> DeployResult<()> {
        self.commands_seen.push(format!("put_file {}", remote_path));

        if let Some(response) = self.injected(remote_path) {
            return response.map(|_| ());
        }

        assert_eq!(remote_path, self.keys_path());
        self.authorized_keys = Some(String::from_utf8(data.to_vec()).unwrap());
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// A session answering from an ordered rule table; unexpected commands
/// panic. Used for platform detection scenarios the unix fake cannot model.
pub struct RuleSession {
    pub rules: Vec<(&'static str, CommandOutput)>,
    pub commands_seen: Vec<String>,
}

impl RuleSession {
    pub fn new(rules: Vec<(&'static str, CommandOutput)>) -> Self {
        Self {
            rules,
            commands_seen: Vec::new(),
        }
    }
}

#[async_trait]
impl SessionOps for RuleSession {
    async fn run(&mut self, command: &str) -> DeployResult<CommandOutput> {
        self.commands_seen.push(command.to_string());
        for (pattern, output) in &self.rules {
            if command.contains(pattern) {
                return Ok(output.clone());
            }
        }
        panic!("RuleSession got unexpected command: {}", command);
    }

    async fn put_file(
        &mut self,
        _data: &[u8],
        remote_path: &str,
        _mode: Option<u32>,
    ) -> DeployResult<()> {
        panic!("RuleSession got unexpected put_file: {}", remote_path);
    }

    async fn close(&mut self) {}
}
