//! Script chain assembly
//!
//! Pre-request runs outermost scope first so specific scripts can rely on
//! broader setup; post-response unwinds innermost first, mirroring
//! interceptor semantics. Test scripts are concatenated innermost-first into
//! a single source string.

use quiver_domain::{CollectionItem, ScriptChains, ScriptHooks};

/// The platform line separator used to join test scripts.
#[must_use]
pub const fn line_separator() -> &'static str {
    if cfg!(windows) { "\r\n" } else { "\n" }
}

fn non_empty(script: Option<&String>) -> Option<String> {
    script
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn hooks_of<'a>(item: &'a CollectionItem) -> &'a ScriptHooks {
    match item {
        CollectionItem::Folder(folder) => &folder.root.hooks,
        CollectionItem::Request(request) => &request.hooks,
    }
}

/// Assembles the three chains for a tree path.
///
/// Empty or whitespace-only entries are dropped before assembly, so a scope
/// without a hook simply contributes nothing.
#[must_use]
pub fn merge_scripts(collection_hooks: &ScriptHooks, tree_path: &[&CollectionItem]) -> ScriptChains {
    let mut pre_request = Vec::new();
    let mut post_response = Vec::new();
    let mut tests = Vec::new();

    if let Some(script) = non_empty(collection_hooks.pre_request.as_ref()) {
        pre_request.push(script);
    }
    if let Some(script) = non_empty(collection_hooks.post_response.as_ref()) {
        post_response.push(script);
    }
    if let Some(script) = non_empty(collection_hooks.tests.as_ref()) {
        tests.push(script);
    }

    let mut request_hooks: Option<&ScriptHooks> = None;
    for item in tree_path {
        match item {
            CollectionItem::Folder(_) => {
                let hooks = hooks_of(item);
                if let Some(script) = non_empty(hooks.pre_request.as_ref()) {
                    pre_request.push(script);
                }
                if let Some(script) = non_empty(hooks.post_response.as_ref()) {
                    post_response.push(script);
                }
                if let Some(script) = non_empty(hooks.tests.as_ref()) {
                    tests.push(script);
                }
            }
            CollectionItem::Request(_) => {
                request_hooks = Some(hooks_of(item));
            }
        }
    }

    if let Some(hooks) = request_hooks {
        if let Some(script) = non_empty(hooks.pre_request.as_ref()) {
            pre_request.push(script);
        }

        // Unwind order: the request contributes first, then the collected
        // outer scopes in reverse.
        post_response.reverse();
        if let Some(script) = non_empty(hooks.post_response.as_ref()) {
            post_response.insert(0, script);
        }

        tests.reverse();
        if let Some(script) = non_empty(hooks.tests.as_ref()) {
            tests.insert(0, script);
        }
    } else {
        post_response.reverse();
        tests.reverse();
    }

    ScriptChains {
        pre_request,
        post_response,
        tests: tests.join(line_separator()),
    }
}
