//! End-to-end pipeline tests: resolve a collection tree, run the chains
//! through the script runtime, and drive a full request lifecycle against a
//! mock transport. The same scripts run on the in-process and isolated
//! backends to pin down the shared capability surface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use quiver_application::engine::{ExecutionContext, ExecutionPhase, VariableMap};
use quiver_application::ports::{
    HttpTransport, ScriptEngine, TransportError, TrustStore, TrustStoreError,
};
use quiver_application::transport::TransportRequest;
use quiver_application::{
    RunOptions, RunRequest, SharedVariableStore, into_transport, resolve,
};
use quiver_domain::{
    Collection, CollectionItem, ConsoleLevel, FilesystemAccess, Folder, RequestSpec, ResponseSpec,
    SandboxMode, ScriptHooks, ScriptingConfig, TestStatus,
};
use quiver_infrastructure::ScriptRuntime;

fn context_for(script_collection: &Collection, request: TransportRequest) -> ExecutionContext {
    ExecutionContext::new(request, script_collection.pathname.clone())
}

fn basic_request() -> TransportRequest {
    TransportRequest {
        method: "GET".to_string(),
        url: "https://api.example.com/users".to_string(),
        ..TransportRequest::default()
    }
}

fn cascade_collection() -> (Collection, uuid::Uuid) {
    let mut collection = Collection::new("Cascade", "/tmp/cascade");
    collection.root.hooks = ScriptHooks {
        pre_request: Some("let x = 1;".to_string()),
        post_response: None,
        tests: None,
    };

    let mut folder = Folder::new("Group");
    folder.root.hooks.pre_request = Some("x = 2;".to_string());

    let mut request = RequestSpec::get("Target", "https://api.example.com/users");
    request.hooks.pre_request = Some(
        "let y = x * 10; qv.set_env_var(\"x\", x); qv.set_env_var(\"y\", y);".to_string(),
    );
    let id = request.id;

    folder.items.push(CollectionItem::Request(request));
    collection.add_item(CollectionItem::Folder(folder));
    (collection, id)
}

async fn run_cascade(mode: SandboxMode) -> VariableMap {
    let (collection, id) = cascade_collection();
    let resolved = resolve(&collection, id).unwrap();
    let script = resolved.chains.joined_pre_request();
    let transport = into_transport(&resolved, &collection.pathname);

    let runtime = ScriptRuntime::new(mode);
    let result = runtime
        .run(
            ExecutionPhase::PreRequest,
            &script,
            context_for(&collection, transport),
        )
        .await
        .unwrap();
    result.env_vars
}

#[tokio::test]
async fn test_cascade_example_unrestricted() {
    let env = run_cascade(SandboxMode::Unrestricted).await;
    assert_eq!(env.get("x").unwrap(), &serde_json::json!(2));
    assert_eq!(env.get("y").unwrap(), &serde_json::json!(20));
}

#[tokio::test]
async fn test_cascade_example_isolated_matches() {
    let env = run_cascade(SandboxMode::Isolated).await;
    assert_eq!(env.get("x").unwrap(), &serde_json::json!(2));
    assert_eq!(env.get("y").unwrap(), &serde_json::json!(20));
}

#[tokio::test]
async fn test_failed_assertion_does_not_stop_later_tests() {
    let collection = Collection::new("T", "/tmp/t");
    let script = r#"
        test("status is 200", || {
            expect(404).to_equal(200);
        });
        test("still runs", || {
            expect(1).to_equal(1);
        });
    "#;

    let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);
    let result = runtime
        .run(
            ExecutionPhase::Tests,
            script,
            context_for(&collection, basic_request())
                .with_response(ResponseSpec::new(404, HashMap::new(), vec![], Duration::ZERO)),
        )
        .await
        .unwrap();

    assert_eq!(result.test_results.len(), 2);

    let first = &result.test_results[0];
    assert_eq!(first.description, "status is 200");
    assert_eq!(first.status, TestStatus::Fail);
    assert!(first.error.is_some());
    assert_eq!(first.actual, Some(serde_json::json!(404)));
    assert_eq!(first.expected, Some(serde_json::json!(200)));

    let second = &result.test_results[1];
    assert_eq!(second.status, TestStatus::Pass);
}

#[tokio::test]
async fn test_response_accessors_in_tests_phase() {
    let collection = Collection::new("T", "/tmp/t");
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    let response = ResponseSpec::new(
        200,
        headers,
        br#"{"token": "abc"}"#.to_vec(),
        Duration::from_millis(12),
    );

    let script = r#"
        test("body parses by content type", || {
            let body = res.get_body();
            expect(body.token).to_equal("abc");
        });
        test("status is success", || {
            expect(res.get_status()).to_equal(200);
        });
    "#;

    let runtime = ScriptRuntime::new(SandboxMode::Isolated);
    let result = runtime
        .run(
            ExecutionPhase::Tests,
            script,
            context_for(&collection, basic_request()).with_response(response),
        )
        .await
        .unwrap();

    assert!(result.test_results.iter().all(|t| t.status == TestStatus::Pass));
    runtime.dispose();
}

#[tokio::test]
async fn test_unknown_module_fails_in_script_without_crashing() {
    let collection = Collection::new("M", "/tmp/m");
    let script = r#"
        qv.set_env_var("before", true);
        let out = child_process::exec("rm -rf /");
        qv.set_env_var("after", true);
    "#;

    let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);
    let result = runtime
        .run(
            ExecutionPhase::PreRequest,
            script,
            context_for(&collection, basic_request()),
        )
        .await
        .unwrap();

    // Partial mutations before the failing import are preserved.
    assert_eq!(result.env_vars.get("before").unwrap(), &serde_json::json!(true));
    assert!(result.env_vars.get("after").is_none());
}

#[tokio::test]
async fn test_filesystem_containment() {
    let dir = tempfile::tempdir().unwrap();
    let collection_dir = dir.path().join("collection");
    std::fs::create_dir(&collection_dir).unwrap();
    std::fs::write(collection_dir.join("inside.txt"), "visible").unwrap();
    std::fs::write(dir.path().join("outside.txt"), "secret").unwrap();

    let collection = Collection::new("F", &collection_dir);
    let config = ScriptingConfig {
        filesystem_access: FilesystemAccess { allow: true },
        module_whitelist: vec!["fs".to_string()],
        additional_context_roots: vec![],
    };

    let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);

    let mut context = context_for(&collection, basic_request());
    context.config = config.clone();
    let result = runtime
        .run(
            ExecutionPhase::PreRequest,
            r#"qv.set_env_var("inside", fs::read_text("inside.txt"));"#,
            context,
        )
        .await
        .unwrap();
    assert_eq!(
        result.env_vars.get("inside").unwrap(),
        &serde_json::json!("visible")
    );

    // Path traversal out of the collection directory is denied even though
    // filesystem access is allowed.
    let mut context = context_for(&collection, basic_request());
    context.config = config;
    let result = runtime
        .run(
            ExecutionPhase::PreRequest,
            r#"qv.set_env_var("escaped", fs::read_text("../outside.txt"));"#,
            context,
        )
        .await
        .unwrap();
    assert!(result.env_vars.get("escaped").is_none());
}

#[tokio::test]
async fn test_fixed_allowlist_modules_available() {
    let collection = Collection::new("B", "/tmp/b");
    let script = r#"
        qv.set_env_var("encoded", base64::encode("quiver"));
        qv.set_env_var("parsed", json::parse("{\"n\": 7}"));
    "#;

    let runtime = ScriptRuntime::new(SandboxMode::Isolated);
    let result = runtime
        .run(
            ExecutionPhase::PreRequest,
            script,
            context_for(&collection, basic_request()),
        )
        .await
        .unwrap();

    assert_eq!(
        result.env_vars.get("encoded").unwrap(),
        &serde_json::json!("cXVpdmVy")
    );
    assert_eq!(
        result.env_vars.get("parsed").unwrap(),
        &serde_json::json!({"n": 7})
    );
    runtime.dispose();
}

#[tokio::test]
async fn test_timer_shim_orders_by_delay() {
    let collection = Collection::new("W", "/tmp/w");
    let script = r#"
        set_timeout(|| {
            let cur = qv.get_env_var("order");
            if cur == () { cur = ""; }
            qv.set_env_var("order", cur + "b");
        }, 40);
        set_timeout(|| {
            let cur = qv.get_env_var("order");
            if cur == () { cur = ""; }
            qv.set_env_var("order", cur + "a");
        }, 10);
        sleep(5);
    "#;

    let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);
    let result = runtime
        .run(
            ExecutionPhase::PreRequest,
            script,
            context_for(&collection, basic_request()),
        )
        .await
        .unwrap();

    assert_eq!(result.env_vars.get("order").unwrap(), &serde_json::json!("ab"));
}

#[tokio::test]
async fn test_console_severity_and_order() {
    let collection = Collection::new("L", "/tmp/l");
    let seen: Arc<Mutex<Vec<(ConsoleLevel, Vec<serde_json::Value>)>>> =
        Arc::new(Mutex::new(vec![]));
    let sink_seen = Arc::clone(&seen);

    let mut context = context_for(&collection, basic_request());
    context.console = Some(Arc::new(move |level, args| {
        sink_seen.lock().unwrap().push((level, args));
    }));

    let runtime = ScriptRuntime::new(SandboxMode::Isolated);
    runtime
        .run(
            ExecutionPhase::PreRequest,
            r#"
                log("one", 1);
                warn("two");
                error("three");
            "#,
            context,
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].0, ConsoleLevel::Log);
    assert_eq!(seen[0].1, vec![serde_json::json!("one"), serde_json::json!(1)]);
    assert_eq!(seen[1].0, ConsoleLevel::Warn);
    assert_eq!(seen[2].0, ConsoleLevel::Error);
    runtime.dispose();
}

#[tokio::test]
async fn test_next_request_pointer() {
    let collection = Collection::new("N", "/tmp/n");
    let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);
    let result = runtime
        .run(
            ExecutionPhase::PreRequest,
            r#"qv.set_next_request("Create User");"#,
            context_for(&collection, basic_request()),
        )
        .await
        .unwrap();

    assert_eq!(result.next_request_name.as_deref(), Some("Create User"));
}

// --- full lifecycle through the use case -------------------------------

struct CapturingTransport {
    sent: Arc<Mutex<Vec<TransportRequest>>>,
}

#[async_trait]
impl HttpTransport for CapturingTransport {
    async fn execute(&self, request: &TransportRequest) -> Result<ResponseSpec, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Ok(ResponseSpec::new(
            200,
            headers,
            br#"{"id": 99}"#.to_vec(),
            Duration::from_millis(3),
        ))
    }
}

struct TrustAll;

impl TrustStore for TrustAll {
    fn exists(&self, _path: &std::path::Path) -> bool {
        true
    }
    fn add(&self, _path: &std::path::Path) -> Result<(), TrustStoreError> {
        Ok(())
    }
    fn get_all(&self) -> Vec<std::path::PathBuf> {
        vec![]
    }
}

#[tokio::test]
async fn test_full_lifecycle_with_real_runtime() {
    let mut collection = Collection::new("Life", "/tmp/life");
    let mut request = RequestSpec::get("Create", "https://api.example.com/items");
    request.hooks = ScriptHooks {
        pre_request: Some(r#"req.set_header("x-trace", "from-script");"#.to_string()),
        post_response: Some(r#"qv.set_env_var("created_id", res.get_body().id);"#.to_string()),
        tests: Some(
            r#"test("created", || { expect(res.get_status()).to_equal(200); });"#.to_string(),
        ),
    };
    let id = request.id;
    collection.add_item(CollectionItem::Request(request));

    let sent = Arc::new(Mutex::new(vec![]));
    let use_case = RunRequest::new(
        Arc::new(ScriptRuntime::new(SandboxMode::Unrestricted)),
        Arc::new(CapturingTransport {
            sent: Arc::clone(&sent),
        }),
        Arc::new(TrustAll),
    );
    let store = SharedVariableStore::new();

    let outcome = use_case
        .execute(&collection, id, &store, &RunOptions::default())
        .await
        .unwrap();

    // Pre-request mutation reached the wire.
    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header("x-trace"), Some("from-script"));

    // Post-response mutation reached the shared store.
    let snapshot = store.snapshot().await;
    assert_eq!(
        snapshot.env_vars.get("created_id").unwrap(),
        &serde_json::json!(99)
    );

    // Tests ran against the response.
    assert_eq!(outcome.test_results.len(), 1);
    assert_eq!(outcome.test_results[0].status, TestStatus::Pass);
}
