//! Variable cascade merge and scope layering

use indexmap::IndexMap;

use quiver_domain::{CollectionItem, LayeredVariables, Variable, VariableKind, VariableSet};

/// Merges one kind of variable across the cascade with the same
/// leaf-wins-by-value, first-seen-position semantics as headers.
fn merge_kind(
    collection_vars: &[Variable],
    tree_path: &[&CollectionItem],
    kind: VariableKind,
) -> Vec<Variable> {
    let mut merged: IndexMap<String, String> = IndexMap::new();

    let mut absorb = |vars: &[Variable]| {
        for var in vars {
            if var.enabled && var.kind == kind {
                merged.insert(var.name.clone(), var.value.clone());
            }
        }
    };

    absorb(collection_vars);
    for item in tree_path {
        match item {
            CollectionItem::Folder(folder) => {
                absorb(select(&folder.root.vars, kind));
            }
            CollectionItem::Request(request) => {
                absorb(select(&request.vars, kind));
            }
        }
    }

    merged
        .into_iter()
        .map(|(name, value)| Variable {
            name,
            value,
            enabled: true,
            kind,
        })
        .collect()
}

const fn select(set: &VariableSet, kind: VariableKind) -> &Vec<Variable> {
    match kind {
        VariableKind::Request => &set.req,
        VariableKind::Response => &set.res,
    }
}

/// Merges request- and response-kind variables independently.
#[must_use]
pub fn merge_vars(collection_vars: &VariableSet, tree_path: &[&CollectionItem]) -> VariableSet {
    VariableSet {
        req: merge_kind(&collection_vars.req, tree_path, VariableKind::Request),
        res: merge_kind(&collection_vars.res, tree_path, VariableKind::Response),
    }
}

/// Extracts the unmerged request-kind layers: collection flat, one array per
/// folder outer→inner, and the leaf request's own. Enabled entries only.
#[must_use]
pub fn layered_vars(
    collection_vars: &VariableSet,
    tree_path: &[&CollectionItem],
) -> LayeredVariables {
    let enabled = |vars: &[Variable]| -> Vec<Variable> {
        vars.iter().filter(|v| v.enabled).cloned().collect()
    };

    let mut layered = LayeredVariables {
        collection: enabled(&collection_vars.req),
        folders: Vec::new(),
        request: Vec::new(),
    };

    for item in tree_path {
        match item {
            CollectionItem::Folder(folder) => {
                layered.folders.push(enabled(&folder.root.vars.req));
            }
            CollectionItem::Request(request) => {
                layered.request = enabled(&request.vars.req);
            }
        }
    }

    layered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quiver_domain::{Folder, RequestSpec};

    fn pairs(vars: &[Variable]) -> Vec<(&str, &str)> {
        vars.iter()
            .map(|v| (v.name.as_str(), v.value.as_str()))
            .collect()
    }

    #[test]
    fn test_leaf_wins_first_seen_position() {
        let collection = VariableSet {
            req: vec![
                Variable::request("base", "https://api.example.com"),
                Variable::request("env", "prod"),
            ],
            res: vec![],
        };

        let mut folder = Folder::new("F");
        folder.root.vars.req = vec![Variable::request("env", "staging")];

        let mut request = RequestSpec::new("R");
        request.vars.req = vec![Variable::request("env", "local")];

        let folder_item = CollectionItem::Folder(folder);
        let request_item = CollectionItem::Request(request);
        let path = vec![&folder_item, &request_item];

        let merged = merge_vars(&collection, &path);
        assert_eq!(
            pairs(&merged.req),
            vec![("base", "https://api.example.com"), ("env", "local")]
        );
    }

    #[test]
    fn test_kinds_merge_independently() {
        let collection = VariableSet {
            req: vec![Variable::request("x", "1")],
            res: vec![Variable::response("x", "from-response")],
        };

        let merged = merge_vars(&collection, &[]);
        assert_eq!(pairs(&merged.req), vec![("x", "1")]);
        assert_eq!(pairs(&merged.res), vec![("x", "from-response")]);
    }

    #[test]
    fn test_disabled_variables_are_ignored() {
        let collection = VariableSet {
            req: vec![Variable::request("a", "1").disabled()],
            res: vec![],
        };
        let merged = merge_vars(&collection, &[]);
        assert!(merged.req.is_empty());
    }

    #[test]
    fn test_layers_preserved_unmerged() {
        let collection = VariableSet {
            req: vec![Variable::request("region", "global")],
            res: vec![],
        };

        let mut outer = Folder::new("Outer");
        outer.root.vars.req = vec![Variable::request("region", "eu")];
        let mut inner = Folder::new("Inner");
        inner.root.vars.req = vec![Variable::request("region", "eu-west")];
        let mut request = RequestSpec::new("R");
        request.vars.req = vec![Variable::request("attempt", "1")];

        let outer_item = CollectionItem::Folder(outer);
        let inner_item = CollectionItem::Folder(inner);
        let request_item = CollectionItem::Request(request);
        let path = vec![&outer_item, &inner_item, &request_item];

        let layered = layered_vars(&collection, &path);
        assert_eq!(pairs(&layered.collection), vec![("region", "global")]);
        assert_eq!(layered.folders.len(), 2);
        assert_eq!(pairs(&layered.folders[0]), vec![("region", "eu")]);
        assert_eq!(pairs(&layered.folders[1]), vec![("region", "eu-west")]);
        assert_eq!(pairs(&layered.request), vec![("attempt", "1")]);
        assert_eq!(layered.folder_var("region"), Some("eu-west"));
    }
}
