//! TUF role names
//!
//! Roles form a closed set: the four top-level roles plus delegated targets
//! roles, which are addressed by a path under `targets/`.

use crate::error::{NotaryError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const DELEGATION_PREFIX: &str = "targets/";

/// A TUF role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleName {
    /// Trust anchor: keys and thresholds for all top-level roles
    Root,
    /// Maps artifact paths to hashes and delegates to sub-roles
    Targets,
    /// Pins the checksums of root, targets and delegated roles
    Snapshot,
    /// Pins the checksum of the snapshot
    Timestamp,
    /// Delegated targets role, e.g. `targets/releases`
    Delegation(String),
}

impl RoleName {
    /// The four top-level roles
    pub const BASE_ROLES: [RoleName; 4] = [
        RoleName::Root,
        RoleName::Targets,
        RoleName::Snapshot,
        RoleName::Timestamp,
    ];

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        match self {
            RoleName::Root => "root",
            RoleName::Targets => "targets",
            RoleName::Snapshot => "snapshot",
            RoleName::Timestamp => "timestamp",
            RoleName::Delegation(path) => path,
        }
    }

    /// Whether this is a delegated targets role
    pub fn is_delegation(&self) -> bool {
        matches!(self, RoleName::Delegation(_))
    }

    /// Roles whose signing keys may be held by the server
    pub fn is_server_managed(&self) -> bool {
        matches!(self, RoleName::Snapshot | RoleName::Timestamp)
    }

    /// The role that delegates to this one
    ///
    /// `targets/a/b` -> `targets/a`, `targets/a` -> `targets`. Top-level roles
    /// have no parent.
    pub fn parent(&self) -> Option<RoleName> {
        match self {
            RoleName::Delegation(path) => match path.rsplit_once('/') {
                Some((parent, _)) if parent == "targets" => Some(RoleName::Targets),
                Some((parent, _)) => Some(RoleName::Delegation(parent.to_string())),
                None => None,
            },
            _ => None,
        }
    }

    /// Nesting depth in the targets tree (`targets` is 0)
    pub fn depth(&self) -> usize {
        match self {
            RoleName::Delegation(path) => path.matches('/').count(),
            _ => 0,
        }
    }

    /// The `_type` value carried by documents of this role
    pub fn document_type(&self) -> &'static str {
        match self {
            RoleName::Root => "Root",
            RoleName::Targets | RoleName::Delegation(_) => "Targets",
            RoleName::Snapshot => "Snapshot",
            RoleName::Timestamp => "Timestamp",
        }
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl FromStr for RoleName {
    type Err = NotaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "root" => Ok(RoleName::Root),
            "targets" => Ok(RoleName::Targets),
            "snapshot" => Ok(RoleName::Snapshot),
            "timestamp" => Ok(RoleName::Timestamp),
            _ => {
                let rest = s
                    .strip_prefix(DELEGATION_PREFIX)
                    .ok_or_else(|| NotaryError::InvalidRole(s.to_string()))?;
                if rest.split('/').all(valid_segment) {
                    Ok(RoleName::Delegation(s.to_string()))
                } else {
                    Err(NotaryError::InvalidRole(s.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RoleName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
