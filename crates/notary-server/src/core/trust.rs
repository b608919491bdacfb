//! Trusted key sets
//!
//! Keys and thresholds are derived per validation call from the root that is
//! (or is about to become) current, and from the delegations of a parent
//! targets role for delegated roles.

use notary_core::{Delegations, RawDocument, RoleName, Root, TufKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use super::validation::{HierarchyEdge, HierarchyProblem, ValidationError};

/// Keys allowed to sign one role, and how many of them must
#[derive(Debug, Clone, PartialEq)]
pub struct RoleTrust {
    keys: BTreeMap<String, TufKey>,
    threshold: u32,
}

impl RoleTrust {
    /// Resolve `keyids` against `available`, checking the threshold is reachable
    fn resolve(
        keyids: &[String],
        threshold: u32,
        available: &BTreeMap<String, TufKey>,
    ) -> Result<Self, String> {
        if threshold == 0 {
            return Err("threshold must be at least 1".into());
        }

        let mut keys = BTreeMap::new();
        for key_id in keyids {
            let key = available
                .get(key_id)
                .ok_or_else(|| format!("key {} is not listed", key_id))?;
            keys.insert(key_id.clone(), key.clone());
        }

        if (keys.len() as u32) < threshold {
            return Err(format!(
                "threshold {} exceeds the {} distinct keys listed",
                threshold,
                keys.len()
            ));
        }
        Ok(Self { keys, threshold })
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Check that `document` carries at least `threshold` valid signatures
    /// from distinct trusted keys
    pub fn verify(&self, role: &RoleName, document: &RawDocument) -> Result<(), ValidationError> {
        let message = document
            .canonical_bytes()
            .map_err(|e| ValidationError::Malformed {
                role: role.clone(),
                reason: e.to_string(),
            })?;

        let mut valid: HashSet<&str> = HashSet::new();
        for signature in &document.signatures {
            if valid.contains(signature.keyid.as_str()) {
                continue;
            }
            let Some(key) = self.keys.get(&signature.keyid) else {
                continue;
            };
            match key.verify(&message, signature) {
                Ok(()) => {
                    valid.insert(signature.keyid.as_str());
                }
                Err(e) => {
                    debug!(role = %role, keyid = %signature.keyid, error = %e, "Signature did not verify");
                }
            }
        }

        let count = valid.len() as u32;
        if count < self.threshold {
            warn!(
                role = %role,
                valid = count,
                threshold = self.threshold,
                "SECURITY: Insufficient signatures on metadata"
            );
            return Err(ValidationError::InsufficientSignatures {
                role: role.clone(),
                threshold: self.threshold,
                valid: count,
            });
        }
        Ok(())
    }
}

/// Keys and thresholds for the top-level roles, taken from a root document
#[derive(Debug, Clone, PartialEq)]
pub struct TrustedKeySet {
    roles: HashMap<RoleName, RoleTrust>,
}

impl TrustedKeySet {
    /// Derive the key set from `root`
    ///
    /// Every top-level role must be defined with a reachable threshold, and
    /// every listed key must sit under its own key id.
    pub fn from_root(root: &Root) -> Result<Self, ValidationError> {
        for (key_id, key) in &root.keys {
            if key.key_id() != *key_id {
                return Err(ValidationError::BadRoot {
                    reason: format!("key listed as {} has a different key id", key_id),
                });
            }
        }

        let mut roles = HashMap::new();
        for role in RoleName::BASE_ROLES {
            let entry = root.role_keys(&role).ok_or_else(|| ValidationError::BadRoot {
                reason: format!("no keys defined for {}", role),
            })?;
            let trust = RoleTrust::resolve(&entry.keyids, entry.threshold, &root.keys)
                .map_err(|reason| ValidationError::BadRoot {
                    reason: format!("{}: {}", role, reason),
                })?;
            roles.insert(role, trust);
        }

        Ok(Self { roles })
    }

    /// Verify a top-level role document against this key set
    pub fn verify(&self, role: &RoleName, document: &RawDocument) -> Result<(), ValidationError> {
        match self.roles.get(role) {
            Some(trust) => trust.verify(role, document),
            None => Err(ValidationError::BadRoot {
                reason: format!("no keys defined for {}", role),
            }),
        }
    }

    /// Whether a signature from `key_id` alone satisfies `role`
    pub fn can_sign_alone(&self, role: &RoleName, key_id: &str) -> bool {
        self.roles
            .get(role)
            .map(|trust| trust.threshold == 1 && trust.contains(key_id))
            .unwrap_or(false)
    }
}

/// Keys a parent targets role trusts for one of its delegations
pub fn delegation_trust(
    parent: &RoleName,
    delegations: &Delegations,
    role: &RoleName,
) -> Result<RoleTrust, ValidationError> {
    let delegated = delegations.role(role).ok_or_else(|| {
        warn!(parent = %parent, role = %role, "SECURITY: Metadata for undelegated role");
        ValidationError::BadHierarchy(HierarchyEdge {
            parent: parent.clone(),
            child: role.clone(),
            problem: HierarchyProblem::NotDelegated,
        })
    })?;

    RoleTrust::resolve(&delegated.keyids, delegated.threshold, &delegations.keys).map_err(
        |reason| ValidationError::Malformed {
            role: parent.clone(),
            reason: format!("delegation {}: {}", role, reason),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::{default_expires, DelegatedRole, KeyPair, Signed, Targets};

    fn root_for(keys: &[(&RoleName, &KeyPair)]) -> Root {
        let mut root = Root::new(1, default_expires(&RoleName::Root));
        for (role, kp) in keys {
            root.add_key(role, kp.public_key());
        }
        root
    }

    fn raw(targets: Targets, signers: &[&KeyPair]) -> RawDocument {
        let mut signed = Signed::new(targets);
        for kp in signers {
            signed = signed.sign(kp).unwrap();
        }
        RawDocument::from_slice(&signed.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_from_root_requires_every_role() {
        let kp = KeyPair::generate();
        let root = root_for(&[(&RoleName::Root, &kp), (&RoleName::Targets, &kp)]);

        match TrustedKeySet::from_root(&root) {
            Err(ValidationError::BadRoot { reason }) => assert!(reason.contains("snapshot")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unreachable_threshold_rejected() {
        let kp = KeyPair::generate();
        let mut root = root_for(
            &RoleName::BASE_ROLES
                .iter()
                .map(|r| (r, &kp))
                .collect::<Vec<_>>(),
        );
        root.roles.get_mut("targets").unwrap().threshold = 2;

        assert!(matches!(
            TrustedKeySet::from_root(&root),
            Err(ValidationError::BadRoot { .. })
        ));
    }

    #[test]
    fn test_threshold_counts_distinct_keys() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let mut root = root_for(&[
            (&RoleName::Root, &a),
            (&RoleName::Targets, &a),
            (&RoleName::Targets, &b),
            (&RoleName::Snapshot, &a),
            (&RoleName::Timestamp, &a),
        ]);
        root.roles.get_mut("targets").unwrap().threshold = 2;
        let trusted = TrustedKeySet::from_root(&root).unwrap();

        let targets = Targets::new(1, default_expires(&RoleName::Targets));

        // The same key twice is still one signature
        let doubled = raw(targets.clone(), &[&a, &a]);
        assert_eq!(
            trusted.verify(&RoleName::Targets, &doubled),
            Err(ValidationError::InsufficientSignatures {
                role: RoleName::Targets,
                threshold: 2,
                valid: 1,
            })
        );

        let both = raw(targets, &[&a, &b]);
        assert!(trusted.verify(&RoleName::Targets, &both).is_ok());
    }

    #[test]
    fn test_untrusted_signer_ignored() {
        let trusted_key = KeyPair::generate();
        let stranger = KeyPair::generate();
        let root = root_for(
            &RoleName::BASE_ROLES
                .iter()
                .map(|r| (r, &trusted_key))
                .collect::<Vec<_>>(),
        );
        let trusted = TrustedKeySet::from_root(&root).unwrap();

        let doc = raw(Targets::new(1, default_expires(&RoleName::Targets)), &[&stranger]);
        assert!(matches!(
            trusted.verify(&RoleName::Targets, &doc),
            Err(ValidationError::InsufficientSignatures { valid: 0, .. })
        ));
    }

    #[test]
    fn test_can_sign_alone() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let root = root_for(
            &RoleName::BASE_ROLES
                .iter()
                .map(|r| (r, &kp))
                .collect::<Vec<_>>(),
        );
        let trusted = TrustedKeySet::from_root(&root).unwrap();

        assert!(trusted.can_sign_alone(&RoleName::Snapshot, kp.key_id()));
        assert!(!trusted.can_sign_alone(&RoleName::Snapshot, other.key_id()));
    }

    #[test]
    fn test_delegation_trust() {
        let kp = KeyPair::generate();
        let releases = RoleName::Delegation("targets/releases".into());
        let mut delegations = Delegations::default();
        delegations.keys.insert(kp.key_id().to_string(), kp.public_key());
        delegations.roles.push(DelegatedRole {
            name: releases.clone(),
            keyids: vec![kp.key_id().to_string()],
            threshold: 1,
            paths: vec![],
        });

        let trust = delegation_trust(&RoleName::Targets, &delegations, &releases).unwrap();
        assert!(trust.contains(kp.key_id()));

        let other = RoleName::Delegation("targets/other".into());
        match delegation_trust(&RoleName::Targets, &delegations, &other) {
            Err(ValidationError::BadHierarchy(edge)) => {
                assert_eq!(edge.problem, HierarchyProblem::NotDelegated);
                assert_eq!(edge.child, other);
            }
            unexpected => panic!("unexpected: {unexpected:?}"),
        }
    }
}
