//! Header cascade merge
//!
//! Final order is "first scope to introduce the name"; final value is "most
//! specific enabled scope that set it". Re-setting an existing name updates
//! the value in place instead of moving the entry to the end.

use indexmap::IndexMap;
use uuid::Uuid;

use quiver_domain::{CollectionItem, Header};

#[derive(Debug, Clone)]
struct MergedValue {
    value: String,
    scope_id: Option<Uuid>,
}

/// Merges headers across `[collection root, folder_1..folder_n, request]`.
///
/// Collection-root entries require a non-empty name; every level contributes
/// enabled entries only. Folder-sourced wins record the folder id for
/// traceability.
#[must_use]
pub fn merge_headers(collection_headers: &[Header], tree_path: &[&CollectionItem]) -> Vec<Header> {
    let mut merged: IndexMap<String, MergedValue> = IndexMap::new();

    for header in collection_headers {
        if header.enabled && !header.name.is_empty() {
            merged.insert(
                header.name.clone(),
                MergedValue {
                    value: header.value.clone(),
                    scope_id: None,
                },
            );
        }
    }

    for item in tree_path {
        match item {
            CollectionItem::Folder(folder) => {
                for header in &folder.root.headers {
                    if header.enabled {
                        merged.insert(
                            header.name.clone(),
                            MergedValue {
                                value: header.value.clone(),
                                scope_id: Some(folder.id),
                            },
                        );
                    }
                }
            }
            CollectionItem::Request(request) => {
                for header in request.headers.enabled() {
                    merged.insert(
                        header.name.clone(),
                        MergedValue {
                            value: header.value.clone(),
                            scope_id: None,
                        },
                    );
                }
            }
        }
    }

    merged
        .into_iter()
        .map(|(name, entry)| Header {
            name,
            value: entry.value,
            enabled: true,
            scope_id: entry.scope_id,
        })
        .collect()
}
