//! Engine configuration
//!
//! Read once at startup from TOML; runtime changes are governance-mediated.
//! Validation happens eagerly so a bad deployment fails before it serves a
//! single request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crypto::Ed25519VerifyingKey;
use crate::errors::{MirrorError, Result};

/// Sandbox resource quotas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxQuotas {
    /// Wall-clock bound per execution, in milliseconds
    pub time_ms: u64,
    /// Output size cap in bytes
    pub output_bytes: u64,
    /// Concurrent executions; admissions beyond this queue FIFO
    pub max_concurrent: usize,
    /// How long a queued admission may wait, in milliseconds
    pub admission_timeout_ms: u64,
}

impl Default for SandboxQuotas {
    fn default() -> Self {
        Self {
            time_ms: 30_000,
            output_bytes: 1_048_576,
            max_concurrent: 4,
            admission_timeout_ms: 10_000,
        }
    }
}

impl SandboxQuotas {
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_ms)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// This deployment's instance identifier
    pub instance_id: String,
    /// Root for event logs and structured stores
    pub data_dir: PathBuf,
    /// Audit-trail storage path
    pub audit_path: PathBuf,
    /// Endpoint this instance advertises to peers during discovery
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bootstrap peer endpoints contacted at startup
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Genesis hashes considered the same constitutional lineage
    #[serde(default)]
    pub trusted_genesis_hashes: Vec<String>,
    /// Hex-encoded guardian public keys forming the initial trust set
    #[serde(default)]
    pub guardian_public_keys: Vec<String>,
    /// Default voting period for proposals, in seconds
    pub default_voting_period_secs: u64,
    /// Default M for M-of-N governance
    pub default_threshold: usize,
    /// Per-request processing deadline, in milliseconds
    pub request_deadline_ms: u64,
    /// Heartbeats older than this are surfaced as stale, in seconds
    pub heartbeat_stale_after_secs: u64,
    #[serde(default)]
    pub sandbox: SandboxQuotas,
    /// Interpreter the sandbox invokes as `{interpreter} {code} {entrypoint}`
    #[serde(default = "default_sandbox_interpreter")]
    pub sandbox_interpreter: PathBuf,
}

fn default_sandbox_interpreter() -> PathBuf {
    PathBuf::from("/usr/bin/python3")
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            instance_id: "mirror-local".to_string(),
            data_dir: PathBuf::from("data"),
            audit_path: PathBuf::from("data/audit.log"),
            endpoint: None,
            bootstrap_peers: Vec::new(),
            trusted_genesis_hashes: Vec::new(),
            guardian_public_keys: Vec::new(),
            default_voting_period_secs: 7 * 24 * 3600,
            default_threshold: 1,
            request_deadline_ms: 30_000,
            heartbeat_stale_after_secs: 48 * 3600,
            sandbox: SandboxQuotas::default(),
            sandbox_interpreter: default_sandbox_interpreter(),
        }
    }
}

impl MirrorConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Validate field ranges and key encodings
    pub fn validate(&self) -> Result<()> {
        crate::identifiers::InstanceId::new(self.instance_id.clone())?;
        if self.default_threshold == 0 {
            return Err(MirrorError::invalid("default_threshold must be at least 1"));
        }
        if self.request_deadline_ms == 0 {
            return Err(MirrorError::invalid("request_deadline_ms must be positive"));
        }
        if self.sandbox.time_ms == 0 || self.sandbox.output_bytes == 0 {
            return Err(MirrorError::invalid("sandbox quotas must be positive"));
        }
        if self.sandbox.max_concurrent == 0 {
            return Err(MirrorError::invalid(
                "sandbox.max_concurrent must be at least 1",
            ));
        }
        for key in &self.guardian_public_keys {
            Ed25519VerifyingKey::from_hex(key).map_err(|e| {
                MirrorError::invalid(format!("guardian public key {key:?} is invalid: {e}"))
            })?;
        }
        for hash in &self.trusted_genesis_hashes {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(MirrorError::invalid(format!(
                    "trusted genesis hash {hash:?} is not a hex SHA-256 digest"
                )));
            }
        }
        Ok(())
    }

    /// Parsed guardian key bundle
    pub fn guardian_keys(&self) -> Result<Vec<Ed25519VerifyingKey>> {
        self.guardian_public_keys
            .iter()
            .map(|k| Ed25519VerifyingKey::from_hex(k))
            .collect()
    }

    /// Per-request deadline duration
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    /// Heartbeat staleness threshold
    pub fn heartbeat_stale_after(&self) -> Duration {
        Duration::from_secs(self.heartbeat_stale_after_secs)
    }

    /// Default proposal voting period
    pub fn default_voting_period(&self) -> Duration {
        Duration::from_secs(self.default_voting_period_secs)
    }
}
