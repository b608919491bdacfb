//! Parsing of `/v2/<gun>/_trust/tuf/...` paths
//!
//! Repository names may themselves contain `/`, so the path is split on the
//! `_trust/tuf/` marker rather than matched segment by segment.

use notary_core::{is_valid_checksum, RoleName};

const TUF_MARKER: &str = "/_trust/tuf/";

/// What a TUF path addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TufTarget {
    /// The repository itself: `.../_trust/tuf/`
    Repository,
    /// `<role>.json` or `<role>.<checksum>.json`
    Metadata {
        role: RoleName,
        checksum: Option<String>,
    },
    /// `<role>.key`; the role is validated by the key service
    Key { role: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TufPath {
    pub gun: String,
    pub target: TufTarget,
}

impl TufPath {
    /// Parse the part of a request path after `/v2/`
    ///
    /// Returns `None` for anything that is not a TUF path.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        let (gun, rest) = format!("/{}", path)
            .split_once(TUF_MARKER)
            .map(|(gun, rest)| (gun.trim_start_matches('/').to_string(), rest.to_string()))?;
        if gun.is_empty() {
            return None;
        }

        let target = if rest.is_empty() {
            TufTarget::Repository
        } else if let Some(role) = rest.strip_suffix(".key") {
            TufTarget::Key {
                role: role.to_string(),
            }
        } else {
            parse_metadata(rest.strip_suffix(".json")?)?
        };

        Some(Self { gun, target })
    }
}

/// `<role>` or `<role>.<checksum>`; role names may contain dots
fn parse_metadata(name: &str) -> Option<TufTarget> {
    if let Some((role, checksum)) = name.rsplit_once('.') {
        if is_valid_checksum(checksum) {
            return Some(TufTarget::Metadata {
                role: role.parse().ok()?,
                checksum: Some(checksum.to_ascii_lowercase()),
            });
        }
    }

    Some(TufTarget::Metadata {
        role: name.parse().ok()?,
        checksum: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::sha256_hex;

    #[test]
    fn test_current_metadata() {
        let path = TufPath::parse("docker.io/library/alpine/_trust/tuf/root.json").unwrap();
        assert_eq!(path.gun, "docker.io/library/alpine");
        assert_eq!(
            path.target,
            TufTarget::Metadata {
                role: RoleName::Root,
                checksum: None
            }
        );
    }

    #[test]
    fn test_pinned_metadata() {
        let checksum = sha256_hex(b"snapshot");
        let path = TufPath::parse(&format!("gun/_trust/tuf/snapshot.{}.json", checksum)).unwrap();
        assert_eq!(
            path.target,
            TufTarget::Metadata {
                role: RoleName::Snapshot,
                checksum: Some(checksum)
            }
        );
    }

    #[test]
    fn test_delegated_role() {
        let path = TufPath::parse("gun/_trust/tuf/targets/releases.json").unwrap();
        assert_eq!(
            path.target,
            TufTarget::Metadata {
                role: RoleName::Delegation("targets/releases".into()),
                checksum: None
            }
        );
    }

    #[test]
    fn test_key_and_repository() {
        assert_eq!(
            TufPath::parse("gun/_trust/tuf/timestamp.key").unwrap().target,
            TufTarget::Key {
                role: "timestamp".into()
            }
        );
        assert_eq!(
            TufPath::parse("gun/_trust/tuf/.key").unwrap().target,
            TufTarget::Key { role: "".into() }
        );
        assert_eq!(
            TufPath::parse("gun/_trust/tuf/").unwrap().target,
            TufTarget::Repository
        );
    }

    #[test]
    fn test_rejects_non_tuf_paths() {
        for path in [
            "gun/root.json",
            "_trust/tuf/root.json",
            "gun/_trust/tuf/root.txt",
            "gun/_trust/tuf/bogus.json",
        ] {
            assert!(TufPath::parse(path).is_none(), "{path}");
        }
    }
}
