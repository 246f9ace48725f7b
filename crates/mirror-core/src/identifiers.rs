//! Core identifier types used across the Mirror platform
//!
//! Uuid-backed newtypes for entities minted by the engine, plus string
//! newtypes for externally assigned instance and user identifiers (these
//! appear in storage paths and must stay path-safe).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::MirrorError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Create from a UUID
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            pub fn uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Event identifier for journal and audit events
    EventId,
    "event"
);
uuid_id!(
    /// Reflection identifier
    ReflectionId,
    "reflection"
);
uuid_id!(
    /// Recognition certificate identifier
    CertificateId,
    "cert"
);
uuid_id!(
    /// Revocation record identifier
    RevocationId,
    "revocation"
);
uuid_id!(
    /// Rotating operational key identifier
    RokId,
    "rok"
);
uuid_id!(
    /// Guardian identifier
    GuardianId,
    "guardian"
);
uuid_id!(
    /// Constitutional proposal identifier
    ProposalId,
    "proposal"
);
uuid_id!(
    /// Update manifest identifier
    UpdateId,
    "update"
);
uuid_id!(
    /// Worker manifest identifier
    WorkerId,
    "worker"
);
uuid_id!(
    /// P2P message identifier, used for gossip deduplication
    MessageId,
    "msg"
);

/// Validate that an externally supplied identifier is safe to embed in a
/// storage path segment.
fn validate_path_segment(kind: &str, value: &str) -> Result<(), MirrorError> {
    if value.is_empty() {
        return Err(MirrorError::invalid(format!("{kind} must not be empty")));
    }
    if value.len() > 128 {
        return Err(MirrorError::invalid(format!("{kind} exceeds 128 bytes")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(MirrorError::invalid(format!(
            "{kind} contains characters outside [A-Za-z0-9._-]: {value:?}"
        )));
    }
    Ok(())
}

/// Instance identifier assigned at deployment time
///
/// Appears in storage paths (`events/{instance}/{user}.log`) and in every
/// event, certificate, and p2p envelope minted by this deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a validated instance identifier
    pub fn new(value: impl Into<String>) -> Result<Self, MirrorError> {
        let value = value.into();
        validate_path_segment("instance id", &value)?;
        Ok(Self(value))
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for InstanceId {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// User identifier assigned by the authentication boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a validated user identifier
    pub fn new(value: impl Into<String>) -> Result<Self, MirrorError> {
        let value = value.into();
        validate_path_segment("user id", &value)?;
        Ok(Self(value))
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_display_with_prefix() {
        let id = EventId::new();
        assert!(id.to_string().starts_with("event-"));
        let id = CertificateId::new();
        assert!(id.to_string().starts_with("cert-"));
    }

    #[test]
    fn instance_id_rejects_path_traversal() {
        assert!(InstanceId::new("alpha-1").is_ok());
        assert!(InstanceId::new("../etc").is_err());
        assert!(InstanceId::new("a/b").is_err());
        assert!(InstanceId::new("").is_err());
    }

    #[test]
    fn user_id_roundtrips_serde() {
        let user = UserId::new("u1").unwrap();
        let json = serde_json::to_string(&user).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(user, back);
    }
}
