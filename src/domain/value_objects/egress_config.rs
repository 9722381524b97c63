//! EgressConfig value object
//! Immutable desired-state snapshot for one egress, delivered by the
//! control plane and superseded wholesale on change

use crate::domain::{BackendKind, SupervisorError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a logical egress endpoint, assigned by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EgressId(String);

impl EgressId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EgressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EgressId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Desired configuration of one egress backend
///
/// The parameter map is a `BTreeMap` so iteration order, and therefore
/// every rendered artifact and the fingerprint, is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressConfig {
    pub id: EgressId,
    pub kind: BackendKind,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl EgressConfig {
    pub fn new(id: impl Into<EgressId>, kind: BackendKind) -> Self {
        Self {
            id: id.into(),
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Fetch a required parameter
    pub fn require(&self, key: &str) -> Result<&str, SupervisorError> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SupervisorError::MissingParameter {
                id: self.id.to_string(),
                param: key.to_string(),
            })
    }

    /// The TCP port this backend listens on
    pub fn listen_port(&self) -> Result<u16, SupervisorError> {
        let raw = self.require("port")?;
        raw.parse().map_err(|_| SupervisorError::InvalidConfig {
            id: self.id.to_string(),
            reason: format!("invalid port '{}'", raw),
        })
    }

    /// SHA-256 digest over the canonical `(kind, params)` encoding
    ///
    /// Identical logical parameters always produce the same fingerprint,
    /// which is what drives change detection in the supervisor diff.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.to_string().as_bytes());
        for (key, value) in &self.params {
            hasher.update(b"\x1f");
            hasher.update(key.as_bytes());
            hasher.update(b"\x1e");
            hasher.update(value.as_bytes());
        }
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl From<String> for EgressId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
