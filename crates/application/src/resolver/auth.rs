//! Auth inheritance resolution

use quiver_domain::AuthConfig;

/// Resolves a leaf request's auth against the collection root's.
///
/// `Inherit` substitutes the root's config verbatim; anything else is taken
/// as-is. A root that itself says `Inherit` degrades to `None`.
#[must_use]
pub fn resolve_auth(leaf: &AuthConfig, collection_root: &AuthConfig) -> AuthConfig {
    if leaf.is_inherit() {
        if collection_root.is_inherit() {
            AuthConfig::None
        } else {
            collection_root.clone()
        }
    } else {
        leaf.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inherit_takes_collection_auth() {
        let root = AuthConfig::bearer("root-token");
        assert_eq!(resolve_auth(&AuthConfig::Inherit, &root), root);
    }

    #[test]
    fn test_leaf_auth_wins_over_root() {
        let root = AuthConfig::bearer("root-token");
        let leaf = AuthConfig::basic("alice", "pw");
        assert_eq!(resolve_auth(&leaf, &root), leaf);
    }

    #[test]
    fn test_inherit_with_inherit_root_is_none() {
        assert_eq!(
            resolve_auth(&AuthConfig::Inherit, &AuthConfig::Inherit),
            AuthConfig::None
        );
    }

    #[test]
    fn test_explicit_none_stays_none() {
        let root = AuthConfig::bearer("root-token");
        assert_eq!(resolve_auth(&AuthConfig::None, &root), AuthConfig::None);
    }
}
