//! Capability bridge
//!
//! One host-side implementation of the capability surface scripts see:
//! request/response accessors, variable stores, console, next-request, and
//! test-result recording. In-process backends dispatch against it directly;
//! the isolated backend marshals the same calls over its serialization
//! boundary. Keeping a single dispatch point is what makes the surface
//! identical across backends.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quiver_application::engine::{ConsoleSink, ExecutionContext, VariableMap};
use quiver_application::transport::{TransportBody, TransportRequest};
use quiver_domain::{ConsoleLevel, LayeredVariables, ResponseSpec, TestResult};

/// A capability invocation in marshalled form: a method name plus JSON
/// arguments. This is the exact shape that crosses the isolated backend's
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCall {
    /// Method name, e.g. `req.get_url`.
    pub method: String,
    /// Arguments as JSON values.
    pub args: Vec<Value>,
}

impl CapabilityCall {
    /// Creates a call.
    #[must_use]
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

/// The mutable state one script invocation runs against.
#[derive(Debug, Clone)]
pub struct ScriptState {
    /// The request snapshot scripts read and mutate.
    pub request: TransportRequest,
    /// The response snapshot, post-response/tests phases only.
    pub response: Option<ResponseSpec>,
    /// Environment variables.
    pub env_vars: VariableMap,
    /// Collection variables.
    pub collection_vars: VariableMap,
    /// Unmerged scope layers for qualified lookups.
    pub layered_vars: LayeredVariables,
    /// Process environment snapshot.
    pub process_env: HashMap<String, String>,
    /// The collection root directory.
    pub collection_path: PathBuf,
    /// Next-request pointer recorded by the script.
    pub next_request_name: Option<String>,
    /// Test results in registration order.
    pub test_results: Vec<TestResult>,
}

impl ScriptState {
    /// Builds the invocation state from an execution context.
    #[must_use]
    pub fn from_context(context: &ExecutionContext) -> Self {
        Self {
            request: context.request.clone(),
            response: context.response.clone(),
            env_vars: context.env_vars.clone(),
            collection_vars: context.collection_vars.clone(),
            layered_vars: context.layered_vars.clone(),
            process_env: context.process_env.clone(),
            collection_path: context.collection_path.clone(),
            next_request_name: None,
            test_results: Vec::new(),
        }
    }
}

fn arg(call: &CapabilityCall, index: usize) -> Value {
    call.args.get(index).cloned().unwrap_or(Value::Null)
}

fn arg_str(call: &CapabilityCall, index: usize) -> Result<String, String> {
    match arg(call, index) {
        Value::String(s) => Ok(s),
        other => Err(format!(
            "{}: expected a string argument, got {other}",
            call.method
        )),
    }
}

fn console_level(method: &str) -> Option<ConsoleLevel> {
    match method {
        "console.log" => Some(ConsoleLevel::Log),
        "console.debug" => Some(ConsoleLevel::Debug),
        "console.info" => Some(ConsoleLevel::Info),
        "console.warn" => Some(ConsoleLevel::Warn),
        "console.error" => Some(ConsoleLevel::Error),
        _ => None,
    }
}

/// Sniffs whether a content type should be treated as JSON.
fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn request_body_value(request: &TransportRequest, raw: bool) -> Value {
    match &request.body {
        TransportBody::None => Value::Null,
        TransportBody::Json { value } => value.clone(),
        TransportBody::Raw { content } => {
            if !raw && is_json_content_type(request.header("content-type")) {
                serde_json::from_str(content)
                    .unwrap_or_else(|_| Value::String(content.clone()))
            } else {
                Value::String(content.clone())
            }
        }
        TransportBody::Form { fields } => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
        TransportBody::Multipart { .. } => Value::Null,
    }
}

fn response_body_value(response: &ResponseSpec, raw: bool) -> Value {
    let text = response.body_text();
    if !raw && is_json_content_type(response.get_header("content-type")) {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    } else {
        Value::String(text)
    }
}

/// Dispatches one capability call against the invocation state.
///
/// # Errors
///
/// Returns a plain message for unknown methods, bad argument shapes, or a
/// phase mismatch (response accessors outside the post-response phase).
/// Messages are the only error shape that may cross an isolation boundary.
#[allow(clippy::too_many_lines)]
pub fn dispatch(
    state: &mut ScriptState,
    console: Option<&ConsoleSink>,
    call: &CapabilityCall,
) -> Result<Value, String> {
    if let Some(level) = console_level(&call.method) {
        if let Some(sink) = console {
            (sink.as_ref())(level, call.args.clone());
        }
        return Ok(Value::Null);
    }

    match call.method.as_str() {
        // Request accessors.
        "req.get_url" => Ok(Value::String(state.request.url.clone())),
        "req.set_url" => {
            state.request.url = arg_str(call, 0)?;
            Ok(Value::Null)
        }
        "req.get_method" => Ok(Value::String(state.request.method.clone())),
        "req.set_method" => {
            state.request.method = arg_str(call, 0)?;
            Ok(Value::Null)
        }
        "req.get_header" => {
            let name = arg_str(call, 0)?;
            Ok(state
                .request
                .header(&name)
                .map_or(Value::Null, |v| Value::String(v.to_string())))
        }
        "req.set_header" => {
            let name = arg_str(call, 0)?;
            let value = arg_str(call, 1)?;
            state.request.headers.insert(name, value);
            Ok(Value::Null)
        }
        "req.get_headers" => Ok(Value::Object(
            state
                .request
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )),
        "req.set_headers" => {
            let Value::Object(entries) = arg(call, 0) else {
                return Err("req.set_headers: expected an object".to_string());
            };
            state.request.headers = entries
                .into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, value)
                })
                .collect();
            Ok(Value::Null)
        }
        "req.get_body" => Ok(request_body_value(&state.request, false)),
        "req.get_body_raw" => Ok(request_body_value(&state.request, true)),
        "req.set_body" => {
            state.request.body = match arg(call, 0) {
                Value::Null => TransportBody::None,
                Value::String(content) => TransportBody::Raw { content },
                value => TransportBody::Json { value },
            };
            Ok(Value::Null)
        }
        "req.get_timeout" => Ok(state
            .request
            .timeout_ms
            .map_or(Value::Null, |t| Value::Number(t.into()))),
        "req.set_timeout" => {
            let timeout = arg(call, 0)
                .as_u64()
                .ok_or_else(|| "req.set_timeout: expected a non-negative number".to_string())?;
            state.request.timeout_ms = Some(timeout);
            Ok(Value::Null)
        }
        "req.set_max_redirects" => {
            let max = arg(call, 0)
                .as_u64()
                .ok_or_else(|| "req.set_max_redirects: expected a non-negative number".to_string())?;
            state.request.max_redirects = u32::try_from(max).ok();
            Ok(Value::Null)
        }
        "req.get_auth_mode" => Ok(Value::String(state.request.auth_mode().to_string())),

        // Response accessors (post-response phase only).
        "res.get_status" | "res.get_header" | "res.get_headers" | "res.get_body"
        | "res.get_body_raw" => {
            let Some(response) = &state.response else {
                return Err(format!("{}: no response in this phase", call.method));
            };
            match call.method.as_str() {
                "res.get_status" => Ok(Value::Number(response.status.into())),
                "res.get_header" => {
                    let name = arg_str(call, 0)?;
                    Ok(response
                        .get_header(&name)
                        .map_or(Value::Null, |v| Value::String(v.to_string())))
                }
                "res.get_headers" => Ok(Value::Object(
                    response
                        .headers
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                )),
                "res.get_body" => Ok(response_body_value(response, false)),
                _ => Ok(response_body_value(response, true)),
            }
        }

        // Variable accessors.
        "vars.get_env" => {
            let name = arg_str(call, 0)?;
            Ok(state.env_vars.get(&name).cloned().unwrap_or(Value::Null))
        }
        "vars.set_env" => {
            let name = arg_str(call, 0)?;
            state.env_vars.insert(name, arg(call, 1));
            Ok(Value::Null)
        }
        "vars.get_collection" => {
            let name = arg_str(call, 0)?;
            Ok(state
                .collection_vars
                .get(&name)
                .cloned()
                .unwrap_or(Value::Null))
        }
        "vars.set_collection" => {
            let name = arg_str(call, 0)?;
            state.collection_vars.insert(name, arg(call, 1));
            Ok(Value::Null)
        }
        "vars.get_folder" => {
            let name = arg_str(call, 0)?;
            Ok(state
                .layered_vars
                .folder_var(&name)
                .map_or(Value::Null, |v| Value::String(v.to_string())))
        }
        "vars.get_request" => {
            let name = arg_str(call, 0)?;
            Ok(state
                .layered_vars
                .request_var(&name)
                .map_or(Value::Null, |v| Value::String(v.to_string())))
        }
        "vars.get_process_env" => {
            let name = arg_str(call, 0)?;
            Ok(state
                .process_env
                .get(&name)
                .map_or(Value::Null, |v| Value::String(v.clone())))
        }
        "vars.get_collection_path" => Ok(Value::String(
            state.collection_path.to_string_lossy().into_owned(),
        )),
        "vars.set_next_request" => {
            state.next_request_name = Some(arg_str(call, 0)?);
            Ok(Value::Null)
        }

        // Test recording (the engine-side shim runs the callback and records
        // the destructured outcome here).
        "test.record" => {
            let result: TestResult = serde_json::from_value(arg(call, 0))
                .map_err(|e| format!("test.record: malformed result: {e}"))?;
            state.test_results.push(result);
            Ok(Value::Null)
        }

        other => Err(format!("unknown capability: {other}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn state() -> ScriptState {
        let mut request = TransportRequest::default();
        request.method = "GET".to_string();
        request.url = "https://api.example.com/users".to_string();
        request
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        request.body = TransportBody::Raw {
            content: r#"{"id": 1}"#.to_string(),
        };

        ScriptState {
            request,
            response: None,
            env_vars: VariableMap::new(),
            collection_vars: VariableMap::new(),
            layered_vars: LayeredVariables::default(),
            process_env: HashMap::new(),
            collection_path: PathBuf::from("/tmp/c"),
            next_request_name: None,
            test_results: Vec::new(),
        }
    }

    fn call(method: &str, args: Vec<Value>) -> CapabilityCall {
        CapabilityCall::new(method, args)
    }

    #[test]
    fn test_request_url_roundtrip() {
        let mut s = state();
        dispatch(
            &mut s,
            None,
            &call("req.set_url", vec![Value::String("https://x.dev".into())]),
        )
        .unwrap();
        let url = dispatch(&mut s, None, &call("req.get_url", vec![])).unwrap();
        assert_eq!(url, Value::String("https://x.dev".to_string()));
    }

    #[test]
    fn test_body_parsed_by_content_type() {
        let mut s = state();
        let body = dispatch(&mut s, None, &call("req.get_body", vec![])).unwrap();
        assert_eq!(body, serde_json::json!({"id": 1}));

        let raw = dispatch(&mut s, None, &call("req.get_body_raw", vec![])).unwrap();
        assert_eq!(raw, Value::String(r#"{"id": 1}"#.to_string()));
    }

    #[test]
    fn test_set_body_object_becomes_json() {
        let mut s = state();
        dispatch(
            &mut s,
            None,
            &call("req.set_body", vec![serde_json::json!({"a": true})]),
        )
        .unwrap();
        assert_eq!(
            s.request.body,
            TransportBody::Json {
                value: serde_json::json!({"a": true})
            }
        );
    }

    #[test]
    fn test_response_accessors_require_response() {
        let mut s = state();
        let err = dispatch(&mut s, None, &call("res.get_status", vec![])).unwrap_err();
        assert!(err.contains("no response"));

        s.response = Some(ResponseSpec::new(
            201,
            HashMap::new(),
            vec![],
            Duration::from_millis(1),
        ));
        let status = dispatch(&mut s, None, &call("res.get_status", vec![])).unwrap();
        assert_eq!(status, Value::Number(201.into()));
    }

    #[test]
    fn test_env_vars_roundtrip() {
        let mut s = state();
        dispatch(
            &mut s,
            None,
            &call(
                "vars.set_env",
                vec![Value::String("token".into()), serde_json::json!("abc")],
            ),
        )
        .unwrap();
        let got = dispatch(
            &mut s,
            None,
            &call("vars.get_env", vec![Value::String("token".into())]),
        )
        .unwrap();
        assert_eq!(got, serde_json::json!("abc"));
    }

    #[test]
    fn test_next_request_recorded() {
        let mut s = state();
        dispatch(
            &mut s,
            None,
            &call(
                "vars.set_next_request",
                vec![Value::String("Create User".into())],
            ),
        )
        .unwrap();
        assert_eq!(s.next_request_name.as_deref(), Some("Create User"));
    }

    #[test]
    fn test_console_forwards_to_sink_in_order() {
        let seen: Arc<Mutex<Vec<(ConsoleLevel, Vec<Value>)>>> = Arc::new(Mutex::new(vec![]));
        let sink_seen = Arc::clone(&seen);
        let sink: ConsoleSink = Arc::new(move |level, args| {
            sink_seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((level, args));
        });

        let mut s = state();
        dispatch(
            &mut s,
            Some(&sink),
            &call("console.warn", vec![serde_json::json!("careful")]),
        )
        .unwrap();
        dispatch(
            &mut s,
            Some(&sink),
            &call("console.log", vec![serde_json::json!(1), serde_json::json!(2)]),
        )
        .unwrap();

        let seen = seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, ConsoleLevel::Warn);
        assert_eq!(seen[1].1, vec![serde_json::json!(1), serde_json::json!(2)]);
    }

    #[test]
    fn test_console_without_sink_is_noop() {
        let mut s = state();
        let result = dispatch(&mut s, None, &call("console.log", vec![serde_json::json!("x")]));
        assert_eq!(result, Ok(Value::Null));
    }

    #[test]
    fn test_unknown_capability_is_an_error() {
        let mut s = state();
        assert!(dispatch(&mut s, None, &call("req.delete_everything", vec![])).is_err());
    }
}
