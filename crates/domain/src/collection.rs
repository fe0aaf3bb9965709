//! Collection tree types
//!
//! A collection holds folders and requests plus a root node with
//! collection-wide defaults. The tree is read-only input to the core; each
//! resolve walks it fresh.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::auth::AuthConfig;
use crate::request::{Header, RequestSpec};
use crate::scripting::ScriptHooks;
use crate::variable::VariableSet;

/// The default bundle a collection root or folder contributes to the cascade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeDefaults {
    /// Headers applied to every request below this scope.
    #[serde(default)]
    pub headers: Vec<Header>,
    /// Variables declared at this scope.
    #[serde(default)]
    pub vars: VariableSet,
    /// Script hooks contributed by this scope.
    #[serde(default)]
    pub hooks: ScriptHooks,
    /// Default auth; requests opt in with `AuthConfig::Inherit`.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// A folder containing requests and other folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier
    pub id: Uuid,
    /// Folder name
    pub name: String,
    /// Defaults this folder contributes to the cascade
    #[serde(default)]
    pub root: ScopeDefaults,
    /// Items in this folder
    #[serde(default)]
    pub items: Vec<CollectionItem>,
}

impl Folder {
    /// Creates a new empty folder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            root: ScopeDefaults::default(),
            items: Vec::new(),
        }
    }
}

/// An item in a collection (either a folder or a request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionItem {
    /// A folder containing other items
    Folder(Folder),
    /// A request specification
    Request(RequestSpec),
}

impl CollectionItem {
    /// Returns the ID of this item.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        match self {
            Self::Folder(f) => f.id,
            Self::Request(r) => r.id,
        }
    }

    /// Returns the name of this item.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(f) => &f.name,
            Self::Request(r) => &r.name,
        }
    }
}

/// A collection of requests organized in folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier
    pub id: Uuid,
    /// Collection name
    pub name: String,
    /// Directory the collection lives in; scripts and relative file paths
    /// are confined to it.
    pub pathname: PathBuf,
    /// Collection-wide defaults
    #[serde(default)]
    pub root: ScopeDefaults,
    /// Items in this collection
    #[serde(default)]
    pub items: Vec<CollectionItem>,
}

impl Collection {
    /// Creates a new empty collection rooted at the given directory.
    #[must_use]
    pub fn new(name: impl Into<String>, pathname: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            pathname: pathname.into(),
            root: ScopeDefaults::default(),
            items: Vec::new(),
        }
    }

    /// Adds an item to the collection root.
    pub fn add_item(&mut self, item: CollectionItem) {
        self.items.push(item);
    }

    /// Returns the total number of requests in the collection (recursive).
    #[must_use]
    pub fn request_count(&self) -> usize {
        fn count_in_items(items: &[CollectionItem]) -> usize {
            items.iter().fold(0, |acc, item| {
                acc + match item {
                    CollectionItem::Request(_) => 1,
                    CollectionItem::Folder(f) => count_in_items(&f.items),
                }
            })
        }
        count_in_items(&self.items)
    }

    /// Finds a request anywhere in the tree by name.
    #[must_use]
    pub fn find_request_by_name(&self, name: &str) -> Option<&RequestSpec> {
        fn find_in<'a>(items: &'a [CollectionItem], name: &str) -> Option<&'a RequestSpec> {
            items.iter().find_map(|item| match item {
                CollectionItem::Request(r) if r.name == name => Some(r),
                CollectionItem::Request(_) => None,
                CollectionItem::Folder(f) => find_in(&f.items, name),
            })
        }
        find_in(&self.items, name)
    }

    /// Computes the tree path from the collection root to the item with the
    /// given id: enclosing folders outermost-first, the target item last.
    ///
    /// Returns `None` when the id is not present in the tree.
    #[must_use]
    pub fn tree_path(&self, target: Uuid) -> Option<Vec<&CollectionItem>> {
        fn walk<'a>(
            items: &'a [CollectionItem],
            target: Uuid,
            trail: &mut Vec<&'a CollectionItem>,
        ) -> bool {
            for item in items {
                if item.id() == target {
                    trail.push(item);
                    return true;
                }
                if let CollectionItem::Folder(folder) = item {
                    trail.push(item);
                    if walk(&folder.items, target, trail) {
                        return true;
                    }
                    trail.pop();
                }
            }
            false
        }

        let mut trail = Vec::new();
        walk(&self.items, target, &mut trail).then_some(trail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_collection() -> (Collection, Uuid) {
        let mut collection = Collection::new("Sample", "/tmp/sample");

        collection.add_item(CollectionItem::Request(RequestSpec::new("Ping")));

        let mut inner = Folder::new("Admin");
        let target = RequestSpec::new("Delete User");
        let target_id = target.id;
        inner.items.push(CollectionItem::Request(target));

        let mut outer = Folder::new("Users");
        outer
            .items
            .push(CollectionItem::Request(RequestSpec::new("List Users")));
        outer.items.push(CollectionItem::Folder(inner));
        collection.add_item(CollectionItem::Folder(outer));

        (collection, target_id)
    }

    #[test]
    fn test_request_count() {
        let (collection, _) = sample_collection();
        assert_eq!(collection.request_count(), 3);
    }

    #[test]
    fn test_tree_path_order() {
        let (collection, target_id) = sample_collection();
        let path = collection.tree_path(target_id).unwrap_or_default();

        let names: Vec<&str> = path.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["Users", "Admin", "Delete User"]);
    }

    #[test]
    fn test_tree_path_missing_item() {
        let (collection, _) = sample_collection();
        assert!(collection.tree_path(Uuid::now_v7()).is_none());
    }

    #[test]
    fn test_find_request_by_name() {
        let (collection, target_id) = sample_collection();
        let found = collection.find_request_by_name("Delete User");
        assert_eq!(found.map(|r| r.id), Some(target_id));
        assert!(collection.find_request_by_name("Nope").is_none());
    }
}
