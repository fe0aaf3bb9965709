//! Request context resolution
//!
//! Walks the collection tree path for a target request and merges headers,
//! variables, scripts, and auth into one effective request descriptor.
//! Lookups degrade to safe defaults; a partial tree never makes the
//! resolver raise.

mod auth;
mod headers;
mod scripts;
mod variables;

pub use auth::resolve_auth;
pub use headers::merge_headers;
pub use scripts::{line_separator, merge_scripts};
pub use variables::{layered_vars, merge_vars};

use uuid::Uuid;

use quiver_domain::{
    AuthConfig, Collection, CollectionItem, DomainError, DomainResult, Header, LayeredVariables,
    RequestSpec, ScriptChains, VariableSet,
};

/// The effective request descriptor produced by one resolve pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    /// The leaf request, untouched.
    pub spec: RequestSpec,
    /// Merged headers in first-seen order.
    pub headers: Vec<Header>,
    /// Merged request- and response-kind variables.
    pub vars: VariableSet,
    /// Unmerged scope layers for qualified lookups.
    pub layered: LayeredVariables,
    /// The assembled script chains.
    pub chains: ScriptChains,
    /// Auth with inheritance already applied.
    pub auth: AuthConfig,
}

/// Resolves the request with the given id against the collection tree.
///
/// # Errors
///
/// Returns [`DomainError::ItemNotFound`] when the id does not name a request
/// in the tree. Malformed or partial scopes never error; they contribute
/// their defaults.
pub fn resolve(collection: &Collection, request_id: Uuid) -> DomainResult<ResolvedRequest> {
    let tree_path = collection
        .tree_path(request_id)
        .ok_or_else(|| DomainError::ItemNotFound(request_id.to_string()))?;

    let spec = match tree_path.last() {
        Some(CollectionItem::Request(request)) => (*request).clone(),
        _ => return Err(DomainError::ItemNotFound(request_id.to_string())),
    };

    let headers = merge_headers(&collection.root.headers, &tree_path);
    let vars = merge_vars(&collection.root.vars, &tree_path);
    let layered = layered_vars(&collection.root.vars, &tree_path);
    let chains = merge_scripts(&collection.root.hooks, &tree_path);
    let auth = resolve_auth(&spec.auth, &collection.root.auth);

    Ok(ResolvedRequest {
        spec,
        headers,
        vars,
        layered,
        chains,
        auth,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quiver_domain::{Folder, ScriptHooks, Variable};

    fn build_collection() -> (Collection, Uuid) {
        let mut collection = Collection::new("API", "/tmp/api");
        collection.root.headers = vec![Header::new("Accept", "application/json")];
        collection.root.vars.req = vec![Variable::request("host", "api.example.com")];
        collection.root.hooks = ScriptHooks {
            pre_request: Some("let x = 1;".to_string()),
            post_response: Some("log(\"done\");".to_string()),
            tests: None,
        };
        collection.root.auth = AuthConfig::bearer("root-token");

        let mut folder = Folder::new("Users");
        folder.root.headers = vec![Header::new("Accept", "application/xml")];
        folder.root.hooks.pre_request = Some("x = 2;".to_string());

        let mut request = RequestSpec::get("List", "https://api.example.com/users");
        request.auth = AuthConfig::Inherit;
        request.hooks.pre_request = Some("let y = x * 10;".to_string());
        let request_id = request.id;

        folder.items.push(CollectionItem::Request(request));
        collection.add_item(CollectionItem::Folder(folder));
        (collection, request_id)
    }

    #[test]
    fn test_resolve_full_descriptor() {
        let (collection, request_id) = build_collection();
        let resolved = resolve(&collection, request_id).unwrap();

        assert_eq!(resolved.spec.name, "List");
        assert_eq!(resolved.headers.len(), 1);
        assert_eq!(resolved.headers[0].value, "application/xml");
        assert_eq!(resolved.vars.req[0].name, "host");
        assert_eq!(
            resolved.chains.pre_request,
            vec!["let x = 1;", "x = 2;", "let y = x * 10;"]
        );
        assert_eq!(resolved.chains.post_response, vec!["log(\"done\");"]);
        assert_eq!(resolved.auth, AuthConfig::bearer("root-token"));
    }

    #[test]
    fn test_resolve_unknown_id() {
        let (collection, _) = build_collection();
        let result = resolve(&collection, Uuid::now_v7());
        assert!(matches!(result, Err(DomainError::ItemNotFound(_))));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (collection, request_id) = build_collection();
        let first = resolve(&collection, request_id).unwrap();
        let second = resolve(&collection, request_id).unwrap();
        assert_eq!(first, second);

        let first_json = serde_json::to_string(&first.chains).unwrap();
        let second_json = serde_json::to_string(&second.chains).unwrap();
        assert_eq!(first_json, second_json);
    }
}
