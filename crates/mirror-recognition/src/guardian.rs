//! Guardians: holders of long-term signing keys in the governance council

use serde::{Deserialize, Serialize};
use std::fmt;

use mirror_core::{Ed25519VerifyingKey, GuardianId, Result, Timestamp};

/// How a guardian came to sit on the council
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianRole {
    Founder,
    Elected,
    Appointed,
    Emeritus,
}

impl GuardianRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Founder => "founder",
            Self::Elected => "elected",
            Self::Appointed => "appointed",
            Self::Emeritus => "emeritus",
        }
    }
}

impl fmt::Display for GuardianRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Council membership state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianStatus {
    Active,
    Removed,
}

/// A council member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guardian {
    pub guardian_id: GuardianId,
    pub name: String,
    /// Hex-encoded long-term public key
    pub public_key: String,
    pub role: GuardianRole,
    pub joined_at: Timestamp,
    pub voting_weight: u32,
    pub status: GuardianStatus,
}

impl Guardian {
    pub fn new(
        name: impl Into<String>,
        public_key: &Ed25519VerifyingKey,
        role: GuardianRole,
        joined_at: Timestamp,
    ) -> Self {
        Self {
            guardian_id: GuardianId::new(),
            name: name.into(),
            public_key: public_key.to_hex(),
            role,
            joined_at,
            voting_weight: 1,
            status: GuardianStatus::Active,
        }
    }

    /// Parsed verifying key for signature checks
    pub fn verifying_key(&self) -> Result<Ed25519VerifyingKey> {
        Ed25519VerifyingKey::from_hex(&self.public_key)
    }

    pub fn is_active(&self) -> bool {
        self.status == GuardianStatus::Active
    }
}
